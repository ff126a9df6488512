//! Run counters. The only mutable state shared across the walk, so they are
//! atomics rather than part of any config structure.

use std::sync::atomic::{AtomicU64, Ordering};

use tdg_report::ReportTotals;

#[derive(Debug, Default)]
pub struct WalkCounters {
    files: AtomicU64,
    dirs: AtomicU64,
    ignored: AtomicU64,
    errors: AtomicU64,
    bytes_read: AtomicU64,
}

impl WalkCounters {
    pub fn add_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_dir(&self) {
        self.dirs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn totals(&self) -> ReportTotals {
        ReportTotals {
            files: self.files.load(Ordering::Relaxed),
            dirs: self.dirs.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}
