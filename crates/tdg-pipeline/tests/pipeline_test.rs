use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tdg_digest::{BlockDigest, DigestKind};
use tdg_pipeline::{HasherFactory, Pipeline, PipelineConfig, PipelineError};

fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    f.write_all(data).unwrap();
    path
}

fn test_config(block_size: usize, pool_size: usize, digests: Vec<DigestKind>) -> PipelineConfig {
    PipelineConfig {
        block_size,
        pool_size,
        shared_buffers: false,
        digests,
        worker_grace: Duration::from_secs(10),
        ..PipelineConfig::default()
    }
}

/// Deterministic multi-block payload: b[i] = i mod 256.
fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn reference_sha256(data: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(data))
}

fn reference_md5(data: &[u8]) -> String {
    use md5::Digest;
    hex::encode(md5::Md5::digest(data))
}

#[test]
fn empty_file_yields_empty_input_digests() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty", b"");

    let mut pipeline = Pipeline::new(test_config(
        64 * 1024,
        2,
        vec![DigestKind::Md5, DigestKind::Sha256],
    ))
    .unwrap();
    let result = pipeline.digest_file(&path).unwrap();

    assert_eq!(result.bytes, 0);
    assert_eq!(
        result.digest("md5").unwrap(),
        "d41d8cd98f00b204e9800998ecf8427e"
    );
    assert_eq!(
        result.digest("sha256").unwrap(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn single_block_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "hello", b"hello");

    let mut pipeline = Pipeline::new(test_config(
        64 * 1024,
        2,
        vec![DigestKind::Md5, DigestKind::Sha1, DigestKind::Sha256],
    ))
    .unwrap();
    let result = pipeline.digest_file(&path).unwrap();

    assert_eq!(result.bytes, 5);
    assert_eq!(
        result.digest("md5").unwrap(),
        "5d41402abc4b2a76b9719d911017c592"
    );
    assert_eq!(
        result.digest("sha1").unwrap(),
        "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
    );
    assert_eq!(
        result.digest("sha256").unwrap(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn multi_block_file_matches_single_shot_reference() {
    let dir = TempDir::new().unwrap();
    // 2.5 blocks: two full plus one short
    let data = patterned(256 * 1024 * 2 + 128 * 1024);
    let path = write_file(&dir, "multi", &data);

    let mut pipeline = Pipeline::new(test_config(
        256 * 1024,
        4,
        vec![DigestKind::Md5, DigestKind::Sha256],
    ))
    .unwrap();
    let result = pipeline.digest_file(&path).unwrap();

    assert_eq!(result.bytes, data.len() as u64);
    assert_eq!(result.digest("md5").unwrap(), reference_md5(&data));
    assert_eq!(result.digest("sha256").unwrap(), reference_sha256(&data));
}

#[test]
fn pool_saturation_completes_without_deadlock() {
    let dir = TempDir::new().unwrap();
    // 128 blocks through 2 buffers
    let data = patterned(8 * 1024 * 1024);
    let path = write_file(&dir, "big", &data);

    let mut pipeline = Pipeline::new(test_config(
        64 * 1024,
        2,
        vec![DigestKind::Sha256, DigestKind::Noop],
    ))
    .unwrap();
    let result = pipeline.digest_file(&path).unwrap();

    assert_eq!(result.bytes, data.len() as u64);
    assert_eq!(result.digest("sha256").unwrap(), reference_sha256(&data));
    // every lease was returned
    assert_eq!(pipeline.pool().outstanding(), 0);
}

#[test]
fn digest_file_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let data = patterned(700 * 1024);
    let path = write_file(&dir, "repeat", &data);

    let mut pipeline = Pipeline::new(test_config(
        128 * 1024,
        3,
        vec![DigestKind::Sha1, DigestKind::Blake3, DigestKind::Crc32],
    ))
    .unwrap();
    let first = pipeline.digest_file(&path).unwrap();
    let second = pipeline.digest_file(&path).unwrap();

    assert_eq!(first.digests, second.digests);
    assert_eq!(first.bytes, second.bytes);
}

#[test]
fn files_are_independent_across_reuse() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a", b"hello");
    let b = write_file(&dir, "b", b"");

    let mut pipeline = Pipeline::new(test_config(64 * 1024, 2, vec![DigestKind::Md5])).unwrap();
    let first = pipeline.digest_file(&a).unwrap();
    let second = pipeline.digest_file(&b).unwrap();

    assert_eq!(
        first.digest("md5").unwrap(),
        "5d41402abc4b2a76b9719d911017c592"
    );
    // state from the first file must not leak into the second
    assert_eq!(
        second.digest("md5").unwrap(),
        "d41d8cd98f00b204e9800998ecf8427e"
    );
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::new(test_config(64 * 1024, 2, vec![DigestKind::Md5])).unwrap();
    let err = pipeline
        .digest_file(&dir.path().join("nope"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Read(_)));
    assert!(!err.is_fatal());
}

/// Hasher that panics on its nth `update` call.
struct FailingHasher {
    updates: usize,
    fail_at: usize,
}

impl BlockDigest for FailingHasher {
    fn update(&mut self, _input: &[u8]) {
        self.updates += 1;
        if self.updates >= self.fail_at {
            panic!("injected hasher failure");
        }
    }

    fn finalize_hex(&mut self) -> String {
        "dead".to_string()
    }
}

#[test]
fn worker_failure_fails_the_file_and_recovers() {
    let dir = TempDir::new().unwrap();
    let long = patterned(5 * 64 * 1024);
    let failing_path = write_file(&dir, "failing", &long);
    let ok_path = write_file(&dir, "ok", b"hello");

    let flaky: HasherFactory = Arc::new(|| {
        Box::new(FailingHasher {
            updates: 0,
            fail_at: 3,
        }) as Box<dyn BlockDigest>
    });
    let md5: HasherFactory = Arc::new(|| DigestKind::Md5.hasher());
    let config = test_config(64 * 1024, 4, vec![]);
    let mut pipeline = Pipeline::with_factories(
        config,
        vec![("flaky".to_string(), flaky), ("md5".to_string(), md5)],
    )
    .unwrap();

    let err = pipeline.digest_file(&failing_path).unwrap_err();
    assert!(matches!(err, PipelineError::Worker { ref digest, .. } if digest == "flaky"));
    assert!(!err.is_fatal());
    assert_eq!(pipeline.pool().outstanding(), 0);

    // the next file goes through a reset worker set; a 1-block file never
    // reaches the injected failure point
    let result = pipeline.digest_file(&ok_path).unwrap();
    assert_eq!(
        result.digest("md5").unwrap(),
        "5d41402abc4b2a76b9719d911017c592"
    );
}

#[test]
fn interrupt_mid_file_releases_everything() {
    let dir = TempDir::new().unwrap();
    let data = patterned(4 * 1024 * 1024);
    let path = write_file(&dir, "interruptible", &data);

    let config = test_config(64 * 1024, 2, vec![DigestKind::Sha256]);
    let flag = Arc::clone(&config.interrupt);
    let mut pipeline = Pipeline::new(config).unwrap();

    // raised before the first block: the coordinator must stop producing,
    // drain, and report the interrupt
    flag.store(true, Ordering::Relaxed);
    let err = pipeline.digest_file(&path).unwrap_err();
    assert!(matches!(err, PipelineError::Interrupted));
    assert_eq!(pipeline.pool().outstanding(), 0);

    // lowering the flag makes the same pipeline usable again
    flag.store(false, Ordering::Relaxed);
    let result = pipeline.digest_file(&path).unwrap();
    assert_eq!(result.digest("sha256").unwrap(), reference_sha256(&data));
}

#[test]
fn shared_memory_buffers_digest_identically() {
    let dir = TempDir::new().unwrap();
    let data = patterned(300 * 1024);
    let path = write_file(&dir, "shm", &data);

    let mut heap = Pipeline::new(test_config(64 * 1024, 2, vec![DigestKind::Sha256])).unwrap();
    let mut shm = Pipeline::new(PipelineConfig {
        shared_buffers: true,
        ..test_config(64 * 1024, 2, vec![DigestKind::Sha256])
    })
    .unwrap();

    let a = heap.digest_file(&path).unwrap();
    let b = shm.digest_file(&path).unwrap();
    assert_eq!(a.digests, b.digests);
}
