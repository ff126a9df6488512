//! Digest workers: one message-loop thread per selected digest.
//!
//! A worker runs an incremental hash to completion for one file at a time.
//! `Init` recreates the hasher, `Process` feeds one block and acknowledges
//! it, `Result` finalizes, `Quit` exits. A hasher panic turns into an
//! `Error` reply; a failed worker keeps acknowledging block consumption (so
//! buffer recycling never stalls) but discards the hashing work until the
//! next `Init` resets it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use tdg_digest::BlockDigest;

use crate::buffer::Block;
use crate::{BufferError, PipelineError};

/// Creates a fresh hasher per `Init`. The pipeline builds these from
/// [`tdg_digest::DigestKind`]; custom factories are the hook for benchmarks
/// and fault-injection tests.
pub type HasherFactory = Arc<dyn Fn() -> Box<dyn BlockDigest> + Send + Sync>;

pub(crate) enum WorkerCommand {
    Init,
    Process(Arc<Block>),
    /// Advisory: the buffer is about to be recycled. Workers have already
    /// dropped their block reference by the time they acknowledged it.
    Free {
        buffer_id: usize,
    },
    Result,
    Quit,
}

pub(crate) enum WorkerReply {
    Ready,
    Ack(u64),
    Digest { hex: String },
    Error { message: String },
}

/// How a worker disposed of one block.
pub(crate) enum AckOutcome {
    Acked,
    /// The worker consumed the block but its hasher had failed.
    Failed { message: String },
}

pub(crate) struct WorkerHandle {
    name: String,
    cmd_tx: Sender<WorkerCommand>,
    reply_rx: Receiver<WorkerReply>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(name: String, factory: HasherFactory, channel_cap: usize) -> Self {
        let (cmd_tx, cmd_rx) = bounded(channel_cap);
        let (reply_tx, reply_rx) = bounded(channel_cap);
        let loop_name = name.clone();
        let join = std::thread::spawn(move || worker_loop(&loop_name, factory, cmd_rx, reply_tx));
        Self {
            name,
            cmd_tx,
            reply_rx,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, cmd: WorkerCommand) -> Result<(), PipelineError> {
        self.cmd_tx.send(cmd).map_err(|_| PipelineError::Closed {
            digest: self.name.clone(),
        })
    }

    fn recv(&self, grace: Duration) -> Result<WorkerReply, PipelineError> {
        match self.reply_rx.recv_timeout(grace) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::Stuck {
                digest: self.name.clone(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Closed {
                digest: self.name.clone(),
            }),
        }
    }

    /// Wait for the `Ready` that answers `Init`, discarding replies left over
    /// from an aborted file.
    pub fn await_ready(&self, grace: Duration) -> Result<(), PipelineError> {
        loop {
            match self.recv(grace)? {
                WorkerReply::Ready => return Ok(()),
                stale => {
                    tracing::debug!(
                        worker = %self.name,
                        reply = stale.tag(),
                        "discarding stale reply before init"
                    );
                }
            }
        }
    }

    /// Wait for the acknowledgement of block `seq`.
    pub fn await_ack(&self, seq: u64, grace: Duration) -> Result<AckOutcome, PipelineError> {
        match self.recv(grace)? {
            WorkerReply::Ack(n) if n == seq => Ok(AckOutcome::Acked),
            WorkerReply::Error { message } => Ok(AckOutcome::Failed { message }),
            WorkerReply::Ack(n) => Err(self.protocol(format!("acked block {n}, expected {seq}"))),
            other => Err(self.protocol(format!("sent {} while hashing", other.tag()))),
        }
    }

    /// Wait for the final digest that answers `Result`.
    pub fn await_digest(&self, grace: Duration) -> Result<String, PipelineError> {
        match self.recv(grace)? {
            WorkerReply::Digest { hex } => Ok(hex),
            WorkerReply::Error { message } => Err(PipelineError::Worker {
                digest: self.name.clone(),
                message,
            }),
            other => Err(self.protocol(format!("sent {} while finalizing", other.tag()))),
        }
    }

    fn protocol(&self, message: String) -> PipelineError {
        PipelineError::Buffer(BufferError::Protocol {
            digest: self.name.clone(),
            message,
        })
    }

    /// Wait up to `grace` for the thread to finish, then abandon it. Threads
    /// cannot be force-terminated; a stuck worker is left detached and its
    /// resources are rebuilt by the caller.
    pub fn join_with_grace(mut self, grace: Duration) {
        let Some(handle) = self.join.take() else {
            return;
        };
        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(worker = %self.name, "worker did not exit; abandoning thread");
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let _ = handle.join();
    }
}

impl WorkerReply {
    fn tag(&self) -> &'static str {
        match self {
            WorkerReply::Ready => "ready",
            WorkerReply::Ack(_) => "ack",
            WorkerReply::Digest { .. } => "digest",
            WorkerReply::Error { .. } => "error",
        }
    }
}

fn worker_loop(
    name: &str,
    factory: HasherFactory,
    cmd_rx: Receiver<WorkerCommand>,
    reply_tx: Sender<WorkerReply>,
) {
    let mut hasher: Option<Box<dyn BlockDigest>> = None;
    let mut failed = false;

    while let Ok(cmd) = cmd_rx.recv() {
        let reply = match cmd {
            WorkerCommand::Init => {
                hasher = Some(factory());
                failed = false;
                WorkerReply::Ready
            }
            WorkerCommand::Process(block) => {
                let seq = block.seq();
                match hasher.take() {
                    Some(mut h) if !failed => {
                        let update = catch_unwind(AssertUnwindSafe(|| h.update(block.bytes())));
                        drop(block);
                        match update {
                            Ok(()) => {
                                hasher = Some(h);
                                WorkerReply::Ack(seq)
                            }
                            Err(panic) => {
                                failed = true;
                                let message = panic_message(panic);
                                tracing::warn!(worker = %name, %message, "hasher failed");
                                WorkerReply::Error { message }
                            }
                        }
                    }
                    // Failed or uninitialized: discard the work but still
                    // acknowledge consumption so the buffer can be recycled.
                    other => {
                        hasher = other;
                        drop(block);
                        WorkerReply::Ack(seq)
                    }
                }
            }
            WorkerCommand::Free { buffer_id } => {
                tracing::trace!(worker = %name, buffer_id, "buffer recycled");
                continue;
            }
            WorkerCommand::Result => match hasher.take() {
                Some(mut h) => match catch_unwind(AssertUnwindSafe(|| h.finalize_hex())) {
                    Ok(hex) => WorkerReply::Digest { hex },
                    Err(panic) => {
                        failed = true;
                        WorkerReply::Error {
                            message: panic_message(panic),
                        }
                    }
                },
                None => WorkerReply::Error {
                    message: "no digest state to finalize".to_string(),
                },
            },
            WorkerCommand::Quit => break,
        };
        if reply_tx.send(reply).is_err() {
            break;
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "hasher panicked".to_string()
    }
}
