//! # tdg-digest
//!
//! Digest registry for treedigest: maps digest names to incremental hashers.
//!
//! Every supported algorithm is exposed through the [`BlockDigest`] trait so
//! the pipeline can feed file blocks to any mix of hashers without knowing
//! which algorithm is behind each one. Hashers are reset by recreation: a new
//! instance per file, obtained from [`DigestKind::hasher`].

use thiserror::Error;

/// Errors from digest-name validation.
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("no valid digests selected")]
    NoDigestsSelected,
}

/// An incremental hasher fed one block at a time, in order.
///
/// `finalize_hex` consumes the accumulated state and leaves the hasher in an
/// unspecified state; callers obtain a fresh instance per file.
pub trait BlockDigest: Send {
    fn update(&mut self, input: &[u8]);
    fn finalize_hex(&mut self) -> String;
}

/// The constant returned by the `noop` pseudo-digest.
pub const NOOP_DIGEST: &str = "00000000000000000000000000000000";

/// Every digest the registry knows, in canonical listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestKind {
    Noop,
    Crc32,
    Adler32,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Blake2b,
    Blake2s,
    Blake3,
}

impl DigestKind {
    pub const ALL: &'static [DigestKind] = &[
        DigestKind::Noop,
        DigestKind::Crc32,
        DigestKind::Adler32,
        DigestKind::Md5,
        DigestKind::Sha1,
        DigestKind::Sha224,
        DigestKind::Sha256,
        DigestKind::Sha384,
        DigestKind::Sha512,
        DigestKind::Sha3_224,
        DigestKind::Sha3_256,
        DigestKind::Sha3_384,
        DigestKind::Sha3_512,
        DigestKind::Blake2b,
        DigestKind::Blake2s,
        DigestKind::Blake3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DigestKind::Noop => "noop",
            DigestKind::Crc32 => "crc32",
            DigestKind::Adler32 => "adler32",
            DigestKind::Md5 => "md5",
            DigestKind::Sha1 => "sha1",
            DigestKind::Sha224 => "sha224",
            DigestKind::Sha256 => "sha256",
            DigestKind::Sha384 => "sha384",
            DigestKind::Sha512 => "sha512",
            DigestKind::Sha3_224 => "sha3_224",
            DigestKind::Sha3_256 => "sha3_256",
            DigestKind::Sha3_384 => "sha3_384",
            DigestKind::Sha3_512 => "sha3_512",
            DigestKind::Blake2b => "blake2b",
            DigestKind::Blake2s => "blake2s",
            DigestKind::Blake3 => "blake3",
        }
    }

    pub fn from_name(name: &str) -> Option<DigestKind> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Length of the hex string this digest renders to.
    ///
    /// Sentinel fields in reports (`-` for directories, `?` for unreadable
    /// entries) are padded to this width.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestKind::Noop => NOOP_DIGEST.len(),
            DigestKind::Crc32 | DigestKind::Adler32 => 8,
            DigestKind::Md5 => 32,
            DigestKind::Sha1 => 40,
            DigestKind::Sha224 | DigestKind::Sha3_224 => 56,
            DigestKind::Sha256 | DigestKind::Sha3_256 => 64,
            DigestKind::Sha384 | DigestKind::Sha3_384 => 96,
            DigestKind::Sha512 | DigestKind::Sha3_512 => 128,
            DigestKind::Blake2b => 128,
            DigestKind::Blake2s => 64,
            DigestKind::Blake3 => 64,
        }
    }

    /// Create a fresh incremental hasher for this digest.
    pub fn hasher(&self) -> Box<dyn BlockDigest> {
        match self {
            DigestKind::Noop => Box::new(Noop),
            DigestKind::Crc32 => Box::new(Crc32::default()),
            DigestKind::Adler32 => Box::new(Adler32::new()),
            DigestKind::Md5 => Box::new(RustCrypto(md5::Md5::default())),
            DigestKind::Sha1 => Box::new(RustCrypto(sha1::Sha1::default())),
            DigestKind::Sha224 => Box::new(RustCrypto(sha2::Sha224::default())),
            DigestKind::Sha256 => Box::new(RustCrypto(sha2::Sha256::default())),
            DigestKind::Sha384 => Box::new(RustCrypto(sha2::Sha384::default())),
            DigestKind::Sha512 => Box::new(RustCrypto(sha2::Sha512::default())),
            DigestKind::Sha3_224 => Box::new(RustCrypto(sha3::Sha3_224::default())),
            DigestKind::Sha3_256 => Box::new(RustCrypto(sha3::Sha3_256::default())),
            DigestKind::Sha3_384 => Box::new(RustCrypto(sha3::Sha3_384::default())),
            DigestKind::Sha3_512 => Box::new(RustCrypto(sha3::Sha3_512::default())),
            DigestKind::Blake2b => Box::new(RustCrypto(blake2::Blake2b512::default())),
            DigestKind::Blake2s => Box::new(RustCrypto(blake2::Blake2s256::default())),
            DigestKind::Blake3 => Box::new(Blake3(blake3::Hasher::new())),
        }
    }
}

impl std::str::FromStr for DigestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown digest: {s}"))
    }
}

impl std::fmt::Display for DigestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// All supported digest names, for help text.
pub fn supported_names() -> Vec<&'static str> {
    DigestKind::ALL.iter().map(|k| k.name()).collect()
}

/// Validate a user-supplied digest list.
///
/// Unknown names are dropped with a warning; the result keeps the input order
/// with duplicates removed. An empty result is an error.
pub fn validate_digests<S: AsRef<str>>(names: &[S]) -> Result<Vec<DigestKind>, DigestError> {
    let mut selected = Vec::new();
    for name in names {
        let name = name.as_ref().trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        match DigestKind::from_name(&name) {
            Some(kind) if selected.contains(&kind) => {
                tracing::warn!(digest = %name, "duplicate digest dropped");
            }
            Some(kind) => selected.push(kind),
            None => tracing::warn!(digest = %name, "unknown digest dropped"),
        }
    }
    if selected.is_empty() {
        return Err(DigestError::NoDigestsSelected);
    }
    Ok(selected)
}

/// Wrapper over any RustCrypto hash exposing the `digest::Digest` trait.
struct RustCrypto<D: digest::Digest + Default + Send>(D);

impl<D: digest::Digest + Default + Send> BlockDigest for RustCrypto<D> {
    fn update(&mut self, input: &[u8]) {
        digest::Digest::update(&mut self.0, input);
    }

    fn finalize_hex(&mut self) -> String {
        let inner = std::mem::take(&mut self.0);
        hex::encode(digest::Digest::finalize(inner))
    }
}

struct Blake3(blake3::Hasher);

impl BlockDigest for Blake3 {
    fn update(&mut self, input: &[u8]) {
        self.0.update(input);
    }

    fn finalize_hex(&mut self) -> String {
        self.0.finalize().to_hex().to_string()
    }
}

#[derive(Default)]
struct Crc32(crc32fast::Hasher);

impl BlockDigest for Crc32 {
    fn update(&mut self, input: &[u8]) {
        self.0.update(input);
    }

    fn finalize_hex(&mut self) -> String {
        let inner = std::mem::take(&mut self.0);
        format!("{:08x}", inner.finalize())
    }
}

const ADLER_MOD: u32 = 65521;

/// Adler-32 rolling checksum (RFC 1950).
struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    fn new() -> Self {
        Self { a: 1, b: 0 }
    }
}

impl BlockDigest for Adler32 {
    fn update(&mut self, input: &[u8]) {
        // 5552 is the largest n with 255n(n+1)/2 + (n+1)(ADLER_MOD-1) < 2^32
        for chunk in input.chunks(5552) {
            for &byte in chunk {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= ADLER_MOD;
            self.b %= ADLER_MOD;
        }
    }

    fn finalize_hex(&mut self) -> String {
        format!("{:08x}", (self.b << 16) | self.a)
    }
}

/// Consumes bytes and returns a constant, for pipeline benchmarking.
struct Noop;

impl BlockDigest for Noop {
    fn update(&mut self, _input: &[u8]) {}

    fn finalize_hex(&mut self) -> String {
        NOOP_DIGEST.to_string()
    }
}
