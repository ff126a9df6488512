//! # tdg-walk
//!
//! The directory-walk driver: feeds the digest pipeline one file at a time,
//! turns each result into a report line, and keeps the run counters. Also
//! owns path normalization and the exclusion lists.

pub mod counters;
pub mod exclude;
pub mod path;
pub mod walker;

pub use counters::WalkCounters;
pub use exclude::ExcludeList;
pub use path::{relative_path, root_suffix, unixify_path};
pub use walker::{WalkConfig, Walker};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error(transparent)]
    Pipeline(#[from] tdg_pipeline::PipelineError),

    #[error("report write failed: {0}")]
    Write(#[from] std::io::Error),
}

impl WalkError {
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            WalkError::Pipeline(tdg_pipeline::PipelineError::Interrupted)
        )
    }
}
