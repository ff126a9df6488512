//! Report reader for `--update` baselines.
//!
//! Understands two on-disk shapes: the current nine-field format and the
//! older seven-field format whose md5 column doubles as the type marker (a
//! leading `?` means unreadable, `-` means directory). A file is expected to
//! be in one format; lines in the other format are skipped with a single
//! warning.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{EntryKind, ReportError};

static ELEMENT_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?);\{(.+?)\};(.+?);(.+?);(.+?);(.+?);(.+?);(.+?);(.*)$").unwrap()
});
static LEGACY_PAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?);(.+?);(.+?);(.+?);(.+?);(.+?);(.*)$").unwrap());
static BASEPATH_PAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s+Base path:\s+(.*)$").unwrap());
static COMMENT_PAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#\s*(.*?)\s*$").unwrap());

/// One entry recovered from a prior report.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub id: usize,
    pub kind: EntryKind,
    pub digests: HashMap<String, String>,
    pub atime: String,
    pub mtime: String,
    pub ctime: String,
    pub attr_std: String,
    pub attr_win: String,
    pub size: String,
    pub full_name: String,
    pub dir_name: String,
    pub file_name: String,
}

impl ParsedEntry {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.trim().parse().ok()
    }

    /// Modify time parsed from its 8-hex-digit column.
    pub fn mtime_secs(&self) -> Option<u64> {
        u64::from_str_radix(self.mtime.trim(), 16).ok()
    }
}

/// A parsed report: the base path from the header plus all usable entries.
#[derive(Debug, Default)]
pub struct ReportFile {
    pub base_path: String,
    pub entries: Vec<ParsedEntry>,
}

impl ReportFile {
    /// Index entries by relative name for baseline lookups.
    pub fn into_index(self) -> HashMap<String, ParsedEntry> {
        self.entries
            .into_iter()
            .map(|e| (e.full_name.clone(), e))
            .collect()
    }

    /// Digest names present in the report (from its first entry).
    pub fn digest_names(&self) -> Vec<String> {
        self.entries
            .first()
            .map(|e| e.digests.keys().cloned().collect())
            .unwrap_or_default()
    }
}

pub fn read_report(path: &Path) -> Result<ReportFile, ReportError> {
    tracing::info!(file = %path.display(), "reading report");
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut report = ReportFile::default();
    let mut is_legacy: Option<bool> = None;
    let mut mixed_warned = false;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }

        let parsed = if let Some(caps) = ELEMENT_PAT.captures(line) {
            match is_legacy {
                Some(true) => {
                    if !mixed_warned {
                        tracing::warn!("legacy format; skipping new formatted lines");
                        mixed_warned = true;
                    }
                    continue;
                }
                _ => {
                    is_legacy = Some(false);
                    parse_element(&caps)
                }
            }
        } else if let Some(caps) = LEGACY_PAT.captures(line) {
            match is_legacy {
                Some(false) => {
                    if !mixed_warned {
                        tracing::warn!("new format; skipping legacy formatted lines");
                        mixed_warned = true;
                    }
                    continue;
                }
                _ => {
                    is_legacy = Some(true);
                    Some(parse_legacy(&caps))
                }
            }
        } else if let Some(caps) = BASEPATH_PAT.captures(line) {
            report.base_path = caps[1].to_string();
            tracing::debug!(base_path = %report.base_path, "report base path");
            continue;
        } else if let Some(caps) = COMMENT_PAT.captures(line) {
            tracing::debug!(comment = &caps[1], "report comment");
            continue;
        } else {
            continue;
        };

        let Some(mut entry) = parsed else { continue };
        if !matches!(entry.kind, EntryKind::File | EntryKind::Dir) {
            tracing::warn!(
                kind = %entry.kind.as_char(),
                name = %entry.full_name,
                "ignoring entry type"
            );
            continue;
        }
        entry.id = report.entries.len();
        report.entries.push(entry);
    }
    Ok(report)
}

fn parse_element(caps: &regex::Captures<'_>) -> Option<ParsedEntry> {
    let kind = EntryKind::from_char(caps[1].trim().chars().next()?)?;
    let mut digests = HashMap::new();
    for pair in caps[2].split(',') {
        let (name, value) = pair.trim().split_once(':')?;
        digests.insert(name.trim().to_string(), value.trim().to_string());
    }
    let full_name = caps[9].to_string();
    let (dir_name, file_name) = split_name(&full_name);
    Some(ParsedEntry {
        id: 0,
        kind,
        digests,
        atime: caps[3].to_string(),
        mtime: caps[4].to_string(),
        ctime: caps[5].to_string(),
        attr_std: caps[6].to_string(),
        attr_win: caps[7].to_string(),
        size: caps[8].to_string(),
        full_name,
        dir_name,
        file_name,
    })
}

fn parse_legacy(caps: &regex::Captures<'_>) -> ParsedEntry {
    let md5 = caps[1].to_string();
    let kind = if md5.starts_with('?') {
        EntryKind::Unreadable
    } else if md5.starts_with('-') {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    let full_name = caps[7].to_string();
    let (dir_name, file_name) = split_name(&full_name);
    let mut digests = HashMap::new();
    digests.insert("md5".to_string(), md5);
    ParsedEntry {
        id: 0,
        kind,
        digests,
        atime: caps[2].to_string(),
        mtime: caps[3].to_string(),
        ctime: caps[4].to_string(),
        attr_std: "0000".to_string(),
        attr_win: caps[5].to_string(),
        size: caps[6].to_string(),
        full_name,
        dir_name,
        file_name,
    }
}

fn split_name(full_name: &str) -> (String, String) {
    match full_name.rsplit_once('/') {
        Some((dir, file)) => (dir.to_string(), file.to_string()),
        None => (String::new(), full_name.to_string()),
    }
}
