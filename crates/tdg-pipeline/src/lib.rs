//! # tdg-pipeline
//!
//! Parallel streaming digest pipeline: one producer reading a file in
//! block-sized chunks into a bounded pool of reusable buffers, one worker
//! thread per selected digest hashing every block in order, and a coordinator
//! that fans blocks out, collects acknowledgements, and recycles buffers.
//!
//! # Architecture
//!
//! ```text
//! Producer → Buffer Pool → broadcast Arc<Block> → Workers (one per digest)
//! (reads)    (bounded)      (no copies)            (ack → buffer recycled)
//! ```
//!
//! Peak memory is `pool_size × block_size` regardless of file length. A
//! buffer is recycled only after every worker has acknowledged the block it
//! carries, so a worker never observes a buffer being overwritten.

mod buffer;
mod coordinator;
mod producer;
mod worker;

pub use buffer::{Block, BufferPool, PoolBuffer};
pub use coordinator::Pipeline;
pub use producer::read_block;
pub use worker::HasherFactory;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use tdg_digest::DigestKind;

/// Errors from pool management and worker-protocol invariants. These are
/// fatal: the pipeline is torn down when one surfaces.
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("pool size {0} out of range (2..=32)")]
    PoolSize(usize),

    #[error("buffer allocation failed: {0}")]
    Alloc(#[from] std::io::Error),

    #[error("buffer {0} is not checked out")]
    InvalidBuffer(usize),

    #[error("block in buffer {0} still referenced after full acknowledgement")]
    StillShared(usize),

    #[error("digest worker {digest} broke protocol: {message}")]
    Protocol { digest: String, message: String },
}

/// Errors surfaced by [`Pipeline::digest_file`].
///
/// `Read` and `Worker` abort only the current file; `Buffer` and `Closed` are
/// fatal; `Stuck` fails the file and forces a teardown/re-init before the
/// next one.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("digest worker {digest} failed: {message}")]
    Worker { digest: String, message: String },

    #[error("digest worker {digest} did not respond within the grace period")]
    Stuck { digest: String },

    #[error("digest worker {digest} channel closed")]
    Closed { digest: String },

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("interrupted")]
    Interrupted,
}

impl PipelineError {
    /// Fatal errors abort the whole walk; transient ones only the current
    /// file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Buffer(_) | PipelineError::Closed { .. }
        )
    }

    /// Errors after which the worker set must be rebuilt before reuse.
    pub(crate) fn poisons_pipeline(&self) -> bool {
        matches!(
            self,
            PipelineError::Stuck { .. }
                | PipelineError::Closed { .. }
                | PipelineError::Buffer(BufferError::Protocol { .. })
                | PipelineError::Buffer(BufferError::StillShared(_))
        )
    }
}

/// Immutable pipeline configuration, fixed at initialization. Changing the
/// pool geometry requires a teardown and re-init.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Block size in bytes. Files are read and hashed in chunks of this size.
    pub block_size: usize,
    /// Number of pool buffers, bounding in-flight blocks (2..=32).
    pub pool_size: usize,
    /// Back buffers with anonymous shared mappings instead of heap memory.
    pub shared_buffers: bool,
    /// Digests to run, one worker each, in report order.
    pub digests: Vec<DigestKind>,
    /// How long to wait on a worker before declaring it stuck.
    pub worker_grace: Duration,
    /// Cooperative interrupt flag, checked once per block.
    pub interrupt: Arc<AtomicBool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: 16 * 1024 * 1024,
            pool_size: 4,
            shared_buffers: true,
            digests: vec![
                DigestKind::Md5,
                DigestKind::Sha1,
                DigestKind::Sha256,
                DigestKind::Sha3_256,
            ],
            worker_grace: Duration::from_secs(30),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Digests and byte count for one processed file, in selection order.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub digests: Vec<(String, String)>,
    pub bytes: u64,
}

impl FileResult {
    pub fn digest(&self, name: &str) -> Option<&str> {
        self.digests
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, hex)| hex.as_str())
    }
}
