//! Report writers: the main multi-digest report and the single-digest
//! alternate report.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tdg_digest::DigestKind;

use crate::{EntryKind, EntryMeta};

const RULE: &str = "#------------------------------------------------------------------------------";

/// Walk totals printed in the report footer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportTotals {
    pub files: u64,
    pub dirs: u64,
    pub ignored: u64,
    pub errors: u64,
    pub bytes_read: u64,
}

/// Writer for the main report: every selected digest on every line.
pub struct ReportWriter {
    out: BufWriter<File>,
    digests: Vec<DigestKind>,
}

impl ReportWriter {
    pub fn create(
        path: &Path,
        base_path: &str,
        digests: &[DigestKind],
    ) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        write_header(
            &mut out,
            base_path,
            "#         Digests               |accessT |modifyT |createT |attr|watr|   size   |relative name",
        )?;
        Ok(Self {
            out,
            digests: digests.to_vec(),
        })
    }

    pub fn file_entry(
        &mut self,
        meta: &EntryMeta,
        rel_path: &str,
        digests: &[(String, String)],
    ) -> io::Result<()> {
        let pairs = digests
            .iter()
            .map(|(name, hex)| format!("{name}:{hex}"))
            .collect::<Vec<_>>()
            .join(",");
        self.entry(EntryKind::File, &pairs, meta, rel_path)
    }

    pub fn dir_entry(&mut self, meta: &EntryMeta, rel_path: &str) -> io::Result<()> {
        let pairs = self.sentinel_pairs('-');
        self.entry(EntryKind::Dir, &pairs, meta, rel_path)
    }

    pub fn unreadable_entry(&mut self, meta: &EntryMeta, rel_path: &str) -> io::Result<()> {
        let pairs = self.sentinel_pairs('?');
        self.entry(EntryKind::Unreadable, &pairs, meta, rel_path)
    }

    fn sentinel_pairs(&self, fill: char) -> String {
        self.digests
            .iter()
            .map(|kind| format!("{}:{}", kind.name(), fill.to_string().repeat(kind.hex_len())))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn entry(
        &mut self,
        kind: EntryKind,
        pairs: &str,
        meta: &EntryMeta,
        rel_path: &str,
    ) -> io::Result<()> {
        writeln!(
            self.out,
            "{};{{{}}};{:08x};{:08x};{:08x};{:04x};{:04x};{:>10};{}",
            kind.as_char(),
            pairs,
            meta.atime,
            meta.mtime,
            meta.ctime,
            meta.attr_std,
            meta.attr_win,
            meta.size,
            rel_path,
        )
    }

    pub fn finish(&mut self, totals: &ReportTotals) -> io::Result<()> {
        write_footer(&mut self.out, totals)
    }
}

/// Writer for the alternate report: one chosen digest per line, in the
/// seven-field shape the legacy reader understands.
pub struct AltReportWriter {
    out: BufWriter<File>,
    digest: DigestKind,
}

impl AltReportWriter {
    pub fn create(path: &Path, base_path: &str, digest: DigestKind) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        let header = format!(
            "#        {} signature          |accessT |modifyT |createT |watr|   size   |relative name",
            digest.name()
        );
        write_header(&mut out, base_path, &header)?;
        Ok(Self { out, digest })
    }

    pub fn digest(&self) -> DigestKind {
        self.digest
    }

    pub fn file_entry(
        &mut self,
        meta: &EntryMeta,
        rel_path: &str,
        hex: &str,
    ) -> io::Result<()> {
        self.entry(hex, meta, rel_path)
    }

    pub fn dir_entry(&mut self, meta: &EntryMeta, rel_path: &str) -> io::Result<()> {
        self.entry(&"-".repeat(self.digest.hex_len()), meta, rel_path)
    }

    pub fn unreadable_entry(&mut self, meta: &EntryMeta, rel_path: &str) -> io::Result<()> {
        self.entry(&"?".repeat(self.digest.hex_len()), meta, rel_path)
    }

    fn entry(&mut self, hex: &str, meta: &EntryMeta, rel_path: &str) -> io::Result<()> {
        writeln!(
            self.out,
            "{};{:08x};{:08x};{:08x};{:04x};{:>10};{}",
            hex, meta.atime, meta.mtime, meta.ctime, meta.attr_win, meta.size, rel_path,
        )
    }

    pub fn finish(&mut self, totals: &ReportTotals) -> io::Result<()> {
        write_footer(&mut self.out, totals)
    }
}

fn write_header(out: &mut impl Write, base_path: &str, columns: &str) -> io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "#")?;
    writeln!(out, "#  Base path: {base_path}")?;
    writeln!(out, "#")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "{columns}")?;
    writeln!(out, "{RULE}")?;
    writeln!(out)
}

fn write_footer(out: &mut impl Write, totals: &ReportTotals) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "#")?;
    writeln!(
        out,
        "#  Processed: {} file(s), {} folder(s) ({} ignored, {} errors) comprising {} bytes",
        group_thousands(totals.files),
        group_thousands(totals.dirs),
        group_thousands(totals.ignored),
        group_thousands(totals.errors),
        group_thousands(totals.bytes_read),
    )?;
    writeln!(out, "#")?;
    writeln!(out, "{RULE}")?;
    out.flush()
}

/// Render a count with comma separators, e.g. `1234567` → `1,234,567`.
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_meta() -> EntryMeta {
        EntryMeta {
            atime: 0x61f34f5a,
            mtime: 0x61f34f5b,
            ctime: 0x61f34f5c,
            attr_std: 0x81a4,
            attr_win: 0x0020,
            size: 1234,
        }
    }

    #[test]
    fn grouping_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn file_line_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.thd");
        let mut writer =
            ReportWriter::create(&path, "/data", &[DigestKind::Md5, DigestKind::Crc32]).unwrap();
        writer
            .file_entry(
                &sample_meta(),
                "sub/file.bin",
                &[
                    (
                        "md5".to_string(),
                        "5d41402abc4b2a76b9719d911017c592".to_string(),
                    ),
                    ("crc32".to_string(), "3610a686".to_string()),
                ],
            )
            .unwrap();
        writer.finish(&ReportTotals::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(
            "F;{md5:5d41402abc4b2a76b9719d911017c592,crc32:3610a686};\
             61f34f5a;61f34f5b;61f34f5c;81a4;0020;      1234;sub/file.bin"
        ));
        assert!(text.contains("#  Base path: /data"));
    }

    #[test]
    fn dir_and_unreadable_sentinels_match_digest_width() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.thd");
        let mut writer =
            ReportWriter::create(&path, "/data", &[DigestKind::Md5, DigestKind::Crc32]).unwrap();
        writer.dir_entry(&sample_meta(), "sub").unwrap();
        writer.unreadable_entry(&sample_meta(), "sub/locked").unwrap();
        writer.finish(&ReportTotals::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(&format!("D;{{md5:{},crc32:{}}}", "-".repeat(32), "-".repeat(8))));
        assert!(text.contains(&format!("?;{{md5:{},crc32:{}}}", "?".repeat(32), "?".repeat(8))));
    }

    #[test]
    fn alt_report_is_legacy_shaped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alt.thd");
        let mut writer = AltReportWriter::create(&path, "/data", DigestKind::Md5).unwrap();
        writer
            .file_entry(
                &sample_meta(),
                "a.txt",
                "5d41402abc4b2a76b9719d911017c592",
            )
            .unwrap();
        writer.dir_entry(&sample_meta(), "sub").unwrap();
        writer.finish(&ReportTotals::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(
            "5d41402abc4b2a76b9719d911017c592;61f34f5a;61f34f5b;61f34f5c;0020;      1234;a.txt"
        ));
        assert!(text.contains(&format!("{};61f34f5a", "-".repeat(32))));
        assert!(text.contains("md5 signature"));
    }

    #[test]
    fn footer_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.thd");
        let mut writer = ReportWriter::create(&path, "/", &[DigestKind::Md5]).unwrap();
        writer
            .finish(&ReportTotals {
                files: 12,
                dirs: 3,
                ignored: 1,
                errors: 0,
                bytes_read: 1048576,
            })
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(
            "#  Processed: 12 file(s), 3 folder(s) (1 ignored, 0 errors) comprising 1,048,576 bytes"
        ));
    }
}
