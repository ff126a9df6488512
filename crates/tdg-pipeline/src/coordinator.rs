//! Per-file coordinator: leases buffers, drives the producer, fans blocks
//! out to the workers, and collects the final digests.
//!
//! The coordinator owns the ordering contract. A buffer is recycled only
//! after every worker has acknowledged the block it carries; with a pool of
//! `P` buffers at most `P` blocks are in flight, overlapping disk reads with
//! hashing while keeping peak memory at `P × block_size`.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::buffer::{Block, BufferPool};
use crate::producer::read_block;
use crate::worker::{AckOutcome, HasherFactory, WorkerCommand, WorkerHandle};
use crate::{BufferError, FileResult, PipelineConfig, PipelineError};

/// Process-wide digest pipeline: a buffer pool plus one worker per selected
/// digest, created once and reused across files.
pub struct Pipeline {
    config: PipelineConfig,
    factories: Vec<(String, HasherFactory)>,
    pool: BufferPool,
    workers: Vec<WorkerHandle>,
    poisoned: bool,
}

impl Pipeline {
    /// Build the pipeline for the configured digest set.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let factories = config
            .digests
            .iter()
            .map(|kind| {
                let kind = *kind;
                let factory: HasherFactory = Arc::new(move || kind.hasher());
                (kind.name().to_string(), factory)
            })
            .collect();
        Self::with_factories(config, factories)
    }

    /// Build the pipeline from explicit hasher factories. This is the entry
    /// point for custom hashers and fault injection.
    pub fn with_factories(
        config: PipelineConfig,
        factories: Vec<(String, HasherFactory)>,
    ) -> Result<Self, PipelineError> {
        let pool = BufferPool::new(config.pool_size, config.block_size, config.shared_buffers)?;
        let workers = spawn_workers(&factories, config.pool_size);
        Ok(Self {
            config,
            factories,
            pool,
            workers,
            poisoned: false,
        })
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn interrupted(&self) -> bool {
        self.config.interrupt.load(Ordering::Relaxed)
    }

    /// Digest one file, returning every selected digest plus the byte count.
    ///
    /// Transient errors (`Read`, `Worker`) leave the pipeline usable for the
    /// next file; the worker set resets itself on the next `Init`.
    pub fn digest_file(&mut self, path: &Path) -> Result<FileResult, PipelineError> {
        if self.poisoned {
            self.respawn()?;
        }
        if self.interrupted() {
            return Err(PipelineError::Interrupted);
        }
        let mut file = File::open(path)?;
        let outcome = self.process(&mut file);
        if let Err(err) = &outcome {
            if err.poisons_pipeline() {
                self.poisoned = true;
            }
        }
        outcome
    }

    fn process(&mut self, file: &mut File) -> Result<FileResult, PipelineError> {
        for worker in &self.workers {
            worker.send(WorkerCommand::Init)?;
        }
        for worker in &self.workers {
            worker.await_ready(self.config.worker_grace)?;
        }

        let mut in_flight: VecDeque<Arc<Block>> = VecDeque::new();
        let mut bytes = 0u64;
        if let Err(err) = self.stream_blocks(file, &mut in_flight, &mut bytes) {
            self.drain(&mut in_flight);
            return Err(err);
        }

        for worker in &self.workers {
            worker.send(WorkerCommand::Result)?;
        }
        let mut digests = Vec::with_capacity(self.workers.len());
        let mut failure = None;
        for worker in &self.workers {
            // Keep collecting even after a failure so every reply channel
            // drains before the next file's Init.
            match worker.await_digest(self.config.worker_grace) {
                Ok(hex) => digests.push((worker.name().to_string(), hex)),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(FileResult { digests, bytes }),
        }
    }

    /// Read, publish, and retire blocks until EOF, keeping up to `pool_size`
    /// blocks in flight.
    fn stream_blocks(
        &mut self,
        file: &mut File,
        in_flight: &mut VecDeque<Arc<Block>>,
        bytes: &mut u64,
    ) -> Result<(), PipelineError> {
        let mut seq = 0u64;
        let mut eof = false;
        while !eof || !in_flight.is_empty() {
            if self.interrupted() {
                return Err(PipelineError::Interrupted);
            }
            while !eof && in_flight.len() < self.pool.size() {
                let mut buf = self.pool.acquire();
                match read_block(file, buf.as_mut_slice()) {
                    Ok(0) => {
                        self.pool.release(buf)?;
                        eof = true;
                    }
                    Ok(len) => {
                        let block = Arc::new(Block::new(seq, buf, len));
                        for worker in &self.workers {
                            worker.send(WorkerCommand::Process(Arc::clone(&block)))?;
                        }
                        in_flight.push_back(block);
                        *bytes += len as u64;
                        seq += 1;
                    }
                    Err(err) => {
                        self.pool.release(buf)?;
                        return Err(PipelineError::Read(err));
                    }
                }
            }
            if let Some(block) = in_flight.pop_front() {
                self.retire(block)?;
            }
        }
        Ok(())
    }

    /// Await every worker's acknowledgement of the oldest block, then recycle
    /// its buffer. The ACK-before-free rule is what makes buffer reuse safe.
    fn retire(&mut self, block: Arc<Block>) -> Result<(), PipelineError> {
        let seq = block.seq();
        let buffer_id = block.buffer_id();
        let mut failure = None;
        for worker in &self.workers {
            match worker.await_ack(seq, self.config.worker_grace)? {
                AckOutcome::Acked => {}
                AckOutcome::Failed { message } => {
                    failure.get_or_insert(PipelineError::Worker {
                        digest: worker.name().to_string(),
                        message,
                    });
                }
            }
        }
        for worker in &self.workers {
            worker.send(WorkerCommand::Free { buffer_id })?;
        }
        let block = Arc::try_unwrap(block)
            .map_err(|_| PipelineError::Buffer(BufferError::StillShared(buffer_id)))?;
        self.pool.release(block.into_buffer())?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Best-effort drain after an aborted file: collect outstanding
    /// acknowledgements so every buffer returns to the pool. Anything that
    /// cannot be reclaimed poisons the pipeline for a rebuild.
    fn drain(&mut self, in_flight: &mut VecDeque<Arc<Block>>) {
        while let Some(block) = in_flight.pop_front() {
            let seq = block.seq();
            for worker in &self.workers {
                if worker.await_ack(seq, self.config.worker_grace).is_err() {
                    self.poisoned = true;
                }
            }
            match Arc::try_unwrap(block) {
                Ok(block) => {
                    if self.pool.release(block.into_buffer()).is_err() {
                        self.poisoned = true;
                    }
                }
                Err(_) => self.poisoned = true,
            }
        }
    }

    /// Tear down and re-initialize the worker set and pool after a stuck or
    /// broken worker. Buffers held by an abandoned thread are replaced, not
    /// reclaimed.
    fn respawn(&mut self) -> Result<(), PipelineError> {
        tracing::warn!("reinitializing digest pipeline");
        for worker in std::mem::take(&mut self.workers) {
            let _ = worker.send(WorkerCommand::Quit);
            worker.join_with_grace(self.config.worker_grace);
        }
        self.pool = BufferPool::new(
            self.config.pool_size,
            self.config.block_size,
            self.config.shared_buffers,
        )?;
        self.workers = spawn_workers(&self.factories, self.config.pool_size);
        self.poisoned = false;
        Ok(())
    }

    /// Stop every worker and wait for them within the grace period.
    pub fn shutdown(&mut self) {
        for worker in std::mem::take(&mut self.workers) {
            let _ = worker.send(WorkerCommand::Quit);
            worker.join_with_grace(self.config.worker_grace);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_workers(factories: &[(String, HasherFactory)], pool_size: usize) -> Vec<WorkerHandle> {
    // Each in-flight block costs a worker queue two commands (Process, then
    // the advisory Free); the headroom covers the control commands. The pool,
    // not the channels, is what exerts backpressure.
    let channel_cap = 2 * pool_size + 4;
    factories
        .iter()
        .map(|(name, factory)| {
            WorkerHandle::spawn(name.clone(), Arc::clone(factory), channel_cap)
        })
        .collect()
}
