//! Directory traversal: one report line per entry, files routed through the
//! digest pipeline, directories and failures emitted as marker lines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use tdg_digest::DigestKind;
use tdg_pipeline::Pipeline;
use tdg_report::{AltReportWriter, EntryMeta, ParsedEntry, ReportWriter};

use crate::counters::WalkCounters;
use crate::exclude::ExcludeList;
use crate::path::relative_path;
use crate::WalkError;

pub struct WalkConfig {
    /// Canonicalized scan root.
    pub root: PathBuf,
    pub excluded_files: ExcludeList,
    pub excluded_dirs: ExcludeList,
    /// Entries from a prior report, keyed by relative name (`--update`).
    pub baseline: HashMap<String, ParsedEntry>,
    /// Digests selected for this run, in report order.
    pub selected: Vec<DigestKind>,
}

/// Drives one full tree scan through the pipeline and into the report.
pub struct Walker<'a> {
    config: WalkConfig,
    pipeline: &'a mut Pipeline,
    writer: &'a mut ReportWriter,
    alt: Option<&'a mut AltReportWriter>,
    pub counters: WalkCounters,
}

impl<'a> Walker<'a> {
    pub fn new(
        config: WalkConfig,
        pipeline: &'a mut Pipeline,
        writer: &'a mut ReportWriter,
        alt: Option<&'a mut AltReportWriter>,
    ) -> Self {
        Self {
            config,
            pipeline,
            writer,
            alt,
            counters: WalkCounters::default(),
        }
    }

    /// Walk the tree depth-first in name order. Transient per-file failures
    /// become `?` lines; fatal pipeline errors and interrupts propagate.
    pub fn process_tree(&mut self) -> Result<(), WalkError> {
        let root = self.config.root.clone();
        let mut iter = WalkDir::new(&root).sort_by_file_name().into_iter();
        while let Some(entry) = iter.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.counters.add_error();
                    if let Some(path) = err.path() {
                        let rel = relative_path(&root, path);
                        tracing::warn!(path = %rel, %err, "unreadable entry");
                        self.writer.unreadable_entry(&EntryMeta::default(), &rel)?;
                        if let Some(alt) = self.alt.as_deref_mut() {
                            alt.unreadable_entry(&EntryMeta::default(), &rel)?;
                        }
                    } else {
                        tracing::warn!(%err, "walk error");
                    }
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let rel = relative_path(&root, entry.path());

            if entry.file_type().is_dir() {
                if self.config.excluded_dirs.matches(&rel) {
                    tracing::debug!(path = %rel, "directory excluded");
                    self.counters.add_ignored();
                    iter.skip_current_dir();
                    continue;
                }
                let meta = entry
                    .metadata()
                    .map(|m| EntryMeta::from_metadata(&m))
                    .unwrap_or_default();
                self.writer.dir_entry(&meta, &rel)?;
                if let Some(alt) = self.alt.as_deref_mut() {
                    alt.dir_entry(&meta, &rel)?;
                }
                self.counters.add_dir();
            } else if entry.file_type().is_file() {
                if self.config.excluded_files.matches(&rel) {
                    tracing::debug!(path = %rel, "file excluded");
                    self.counters.add_ignored();
                    continue;
                }
                self.process_file(entry.path(), &rel)?;
            } else {
                // symlinks and special files carry no content to digest
                tracing::debug!(path = %rel, "skipping non-regular entry");
                self.counters.add_ignored();
            }
        }
        Ok(())
    }

    fn process_file(&mut self, path: &Path, rel: &str) -> Result<(), WalkError> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => EntryMeta::from_metadata(&meta),
            Err(err) => {
                tracing::warn!(path = %rel, %err, "stat failed");
                self.counters.add_error();
                self.writer.unreadable_entry(&EntryMeta::default(), rel)?;
                if let Some(alt) = self.alt.as_deref_mut() {
                    alt.unreadable_entry(&EntryMeta::default(), rel)?;
                }
                return Ok(());
            }
        };

        if let Some(digests) = self.baseline_digests(rel, &meta) {
            tracing::debug!(path = %rel, "reusing baseline digests");
            self.write_file_entry(&meta, rel, &digests)?;
            self.counters.add_file();
            return Ok(());
        }

        match self.pipeline.digest_file(path) {
            Ok(result) => {
                self.write_file_entry(&meta, rel, &result.digests)?;
                self.counters.add_file();
                self.counters.add_bytes(result.bytes);
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(tdg_pipeline::PipelineError::Interrupted) => {
                Err(tdg_pipeline::PipelineError::Interrupted.into())
            }
            Err(err) => {
                tracing::warn!(path = %rel, %err, "file failed");
                self.counters.add_error();
                self.writer.unreadable_entry(&meta, rel)?;
                if let Some(alt) = self.alt.as_deref_mut() {
                    alt.unreadable_entry(&meta, rel)?;
                }
                Ok(())
            }
        }
    }

    /// A baseline entry is reused only when it is a file entry whose size and
    /// mtime still match and which carries every selected digest.
    fn baseline_digests(&self, rel: &str, meta: &EntryMeta) -> Option<Vec<(String, String)>> {
        let prev = self.config.baseline.get(rel)?;
        if prev.kind != tdg_report::EntryKind::File {
            return None;
        }
        if prev.size_bytes()? != meta.size || prev.mtime_secs()? != meta.mtime {
            return None;
        }
        self.config
            .selected
            .iter()
            .map(|kind| {
                prev.digests
                    .get(kind.name())
                    .map(|hex| (kind.name().to_string(), hex.clone()))
            })
            .collect()
    }

    fn write_file_entry(
        &mut self,
        meta: &EntryMeta,
        rel: &str,
        digests: &[(String, String)],
    ) -> Result<(), WalkError> {
        self.writer.file_entry(meta, rel, digests)?;
        if let Some(alt) = self.alt.as_deref_mut() {
            let name = alt.digest().name();
            match digests.iter().find(|(n, _)| n == name) {
                Some((_, hex)) => alt.file_entry(meta, rel, hex)?,
                None => alt.unreadable_entry(meta, rel)?,
            }
        }
        Ok(())
    }
}
