//! # tdg-report
//!
//! Report I/O for treedigest: the per-entry line format, the main and
//! alternate report writers, and the reader used for `--update` baselines
//! (which also understands the older seven-field report format).
//!
//! One line per filesystem entry:
//!
//! ```text
//! T;{D1:hex,D2:hex,...};aaaaaaaa;mmmmmmmm;cccccccc;SSSS;WWWW;      size;relative/name
//! ```
//!
//! Times are 8-hex-digit seconds since the epoch, attribute words are 4 hex
//! digits, the size is right-justified in 10 columns, and the relative path
//! always uses forward slashes. Directory entries carry `-` sentinels in
//! each digest slot, unreadable entries `?`.

pub mod reader;
pub mod writer;

pub use reader::{read_report, ParsedEntry, ReportFile};
pub use writer::{AltReportWriter, ReportTotals, ReportWriter};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry type column: file, directory, or unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Unreadable,
}

impl EntryKind {
    pub fn as_char(&self) -> char {
        match self {
            EntryKind::File => 'F',
            EntryKind::Dir => 'D',
            EntryKind::Unreadable => '?',
        }
    }

    pub fn from_char(c: char) -> Option<EntryKind> {
        match c {
            'F' => Some(EntryKind::File),
            'D' => Some(EntryKind::Dir),
            '?' => Some(EntryKind::Unreadable),
            _ => None,
        }
    }
}

/// Filesystem metadata carried on every report line.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryMeta {
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub attr_std: u32,
    pub attr_win: u32,
    pub size: u64,
}

impl EntryMeta {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            atime: unix_seconds(meta.accessed()),
            mtime: unix_seconds(meta.modified()),
            ctime: creation_seconds(meta),
            attr_std: std_attributes(meta),
            attr_win: os_attributes(meta),
            size: meta.len(),
        }
    }
}

fn unix_seconds(time: std::io::Result<std::time::SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn creation_seconds(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    // created() is not available on every filesystem; the inode change time
    // fills the creation column as the closest equivalent
    match meta.created() {
        Ok(t) => unix_seconds(Ok(t)),
        Err(_) => meta.ctime().max(0) as u64,
    }
}

#[cfg(not(unix))]
fn creation_seconds(meta: &std::fs::Metadata) -> u64 {
    unix_seconds(meta.created())
}

#[cfg(unix)]
fn std_attributes(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0xffff
}

#[cfg(not(unix))]
fn std_attributes(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(windows)]
fn os_attributes(meta: &std::fs::Metadata) -> u32 {
    use std::os::windows::fs::MetadataExt;
    meta.file_attributes() & 0xffff
}

#[cfg(not(windows))]
fn os_attributes(_meta: &std::fs::Metadata) -> u32 {
    0
}
