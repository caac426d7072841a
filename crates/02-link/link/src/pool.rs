//! Fixed-block frame pool.
//!
//! Frames are assembled in blocks sized for the largest possible frame, so a
//! steady-state link recycles a small set of allocations instead of hitting
//! the allocator per frame. The pool is a cache, not a hard cap: when every
//! block is checked out a fresh one is allocated, and returned blocks grow
//! the cache back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

struct PoolShared {
    free: Mutex<Vec<Box<[u8]>>>,
    block_size: usize,
    outstanding: AtomicUsize,
}

/// Shared pool of frame-sized blocks.
#[derive(Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    /// Creates a pool with `capacity` preallocated blocks of `block_size`
    /// bytes each.
    pub fn new(block_size: usize, capacity: usize) -> Self {
        let free = (0..capacity)
            .map(|_| vec![0u8; block_size].into_boxed_slice())
            .collect();
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
                block_size,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Checks a zeroed block out of the pool.
    pub fn acquire(&self) -> PooledBuf {
        let block = {
            let mut free = self.shared.free.lock();
            free.pop()
        };
        let mut block = block.unwrap_or_else(|| {
            log::debug!("frame pool empty, allocating overflow block");
            vec![0u8; self.shared.block_size].into_boxed_slice()
        });
        block.fill(0);
        self.shared.outstanding.fetch_add(1, Ordering::Relaxed);
        PooledBuf {
            block: Some(block),
            len: 0,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Size of every block in the pool.
    pub fn block_size(&self) -> usize {
        self.shared.block_size
    }

    /// Blocks currently checked out. Zero after a clean drain means no leak.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Relaxed)
    }

    /// Blocks sitting in the free cache.
    pub fn idle(&self) -> usize {
        self.shared.free.lock().len()
    }
}

/// A block checked out of a [`FramePool`]; returns itself on drop.
pub struct PooledBuf {
    block: Option<Box<[u8]>>,
    len: usize,
    shared: Arc<PoolShared>,
}

impl PooledBuf {
    /// Valid bytes written into the block so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes have been marked valid.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Marks the first `len` bytes as valid.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the block size.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity(), "len {len} exceeds block size");
        self.len = len;
    }

    /// The valid prefix of the block.
    pub fn as_slice(&self) -> &[u8] {
        &self.block.as_ref().expect("block present")[..self.len]
    }

    /// The whole block, for assembly before `set_len`.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.block.as_mut().expect("block present")
    }

    /// The whole block read-only, e.g. for padded bus writes that travel
    /// past the valid length.
    pub fn bytes(&self) -> &[u8] {
        self.block.as_ref().expect("block present")
    }

    /// Block capacity.
    pub fn capacity(&self) -> usize {
        self.block.as_ref().expect("block present").len()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.shared.free.lock().push(block);
            self.shared.outstanding.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
