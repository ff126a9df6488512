//! Fixed pool of reusable block buffers.
//!
//! Buffers are allocated once at pipeline startup and reused across blocks
//! and files. At any instant a buffer is either free in the pool or checked
//! out by the coordinator; the pool itself is the only structure that needs
//! locking, the buffer bytes are handed off exclusively by protocol.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use crate::BufferError;

enum Backing {
    Heap(Box<[u8]>),
    Shared(memmap2::MmapMut),
}

/// One reusable buffer, owned by the pool when free and moved out while
/// checked out.
pub struct PoolBuffer {
    id: usize,
    data: Backing,
}

impl PoolBuffer {
    fn heap(id: usize, block_size: usize) -> Self {
        Self {
            id,
            data: Backing::Heap(vec![0u8; block_size].into_boxed_slice()),
        }
    }

    fn shared(id: usize, block_size: usize) -> Result<Self, BufferError> {
        Ok(Self {
            id,
            data: Backing::Shared(memmap2::MmapMut::map_anon(block_size)?),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.as_slice().len()
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            Backing::Heap(b) => b,
            Backing::Shared(m) => m,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.data {
            Backing::Heap(b) => b,
            Backing::Shared(m) => m,
        }
    }
}

/// One file block: a checked-out buffer plus its sequence number and valid
/// length. Broadcast to workers as `Arc<Block>`; the coordinator reclaims the
/// buffer with `Arc::try_unwrap` once every worker has acknowledged.
pub struct Block {
    seq: u64,
    len: usize,
    buf: PoolBuffer,
}

impl Block {
    pub(crate) fn new(seq: u64, buf: PoolBuffer, len: usize) -> Self {
        debug_assert!(len <= buf.capacity());
        Self { seq, len, buf }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buffer_id(&self) -> usize {
        self.buf.id()
    }

    /// The valid bytes of this block.
    pub fn bytes(&self) -> &[u8] {
        &self.buf.as_slice()[..self.len]
    }

    pub(crate) fn into_buffer(self) -> PoolBuffer {
        self.buf
    }
}

struct PoolState {
    free: Vec<PoolBuffer>,
    checked_out: HashSet<usize>,
}

/// Bounded set of block buffers. `acquire` blocks until a buffer is free;
/// `release` returns one and wakes a waiter.
pub struct BufferPool {
    state: Mutex<PoolState>,
    available: Condvar,
    pool_size: usize,
    block_size: usize,
}

impl BufferPool {
    pub fn new(pool_size: usize, block_size: usize, shared: bool) -> Result<Self, BufferError> {
        if !(2..=32).contains(&pool_size) {
            return Err(BufferError::PoolSize(pool_size));
        }
        let mut free = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            free.push(if shared {
                PoolBuffer::shared(id, block_size)?
            } else {
                PoolBuffer::heap(id, block_size)
            });
        }
        Ok(Self {
            state: Mutex::new(PoolState {
                free,
                checked_out: HashSet::with_capacity(pool_size),
            }),
            available: Condvar::new(),
            pool_size,
            block_size,
        })
    }

    /// Check out a buffer, blocking until one is free.
    pub fn acquire(&self) -> PoolBuffer {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(buf) = state.free.pop() {
                state.checked_out.insert(buf.id());
                return buf;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Return a checked-out buffer to the free set.
    pub fn release(&self, buf: PoolBuffer) -> Result<(), BufferError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.checked_out.remove(&buf.id()) {
            return Err(BufferError::InvalidBuffer(buf.id()));
        }
        state.free.push(buf);
        self.available.notify_one();
        Ok(())
    }

    /// Scoped acquisition: the buffer is released on every exit path.
    pub fn with_buffer<T, E: From<BufferError>>(
        &self,
        f: impl FnOnce(&mut PoolBuffer) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut buf = self.acquire();
        let result = f(&mut buf);
        self.release(buf)?;
        result
    }

    /// Configured number of buffers.
    pub fn size(&self) -> usize {
        self.pool_size
    }

    /// Configured buffer capacity in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .checked_out
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_bounds() {
        assert!(matches!(
            BufferPool::new(1, 1024, false),
            Err(BufferError::PoolSize(1))
        ));
        assert!(matches!(
            BufferPool::new(33, 1024, false),
            Err(BufferError::PoolSize(33))
        ));
        assert!(BufferPool::new(2, 1024, false).is_ok());
        assert!(BufferPool::new(32, 1024, false).is_ok());
    }

    #[test]
    fn acquire_release_cycle() {
        let pool = BufferPool::new(2, 64, false).unwrap();
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.outstanding(), 2);
        assert_ne!(a.id(), b.id());
        pool.release(a).unwrap();
        assert_eq!(pool.outstanding(), 1);
        pool.release(b).unwrap();
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn release_of_foreign_buffer_is_rejected() {
        let pool_a = BufferPool::new(2, 64, false).unwrap();
        let pool_b = BufferPool::new(2, 64, false).unwrap();
        let stray = pool_a.acquire();
        let own = pool_b.acquire();
        pool_b.release(own).unwrap();
        // `stray` was never checked out of pool_b
        assert!(matches!(
            pool_b.release(stray),
            Err(BufferError::InvalidBuffer(_))
        ));
    }

    #[test]
    fn with_buffer_releases_on_error() {
        let pool = BufferPool::new(2, 64, false).unwrap();
        let result: Result<(), BufferError> = pool.with_buffer(|buf| {
            buf.as_mut_slice()[0] = 0xAB;
            Err(BufferError::PoolSize(0))
        });
        assert!(result.is_err());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn shared_backing_is_writable() {
        let pool = BufferPool::new(2, 4096, true).unwrap();
        let mut buf = pool.acquire();
        buf.as_mut_slice()[..5].copy_from_slice(b"hello");
        assert_eq!(&buf.as_slice()[..5], b"hello");
        pool.release(buf).unwrap();
    }

    #[test]
    fn acquire_blocks_until_release() {
        use std::sync::Arc;
        use std::time::Duration;

        let pool = Arc::new(BufferPool::new(2, 64, false).unwrap());
        let a = pool.acquire();
        let _b = pool.acquire();

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let buf = pool.acquire();
                pool.release(buf).unwrap();
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        pool.release(a).unwrap();
        waiter.join().unwrap();
    }
}
