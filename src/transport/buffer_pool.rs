// src/transport/buffer_pool.rs
//! Reusable encode buffers
//!
//! The send loop encodes each record into a pooled `Vec<u8>` and returns it
//! once the record is written, so steady-state sending does not allocate.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Buffers larger than this are freed instead of pooled
const MAX_POOLED_CAPACITY: usize = 1024 * 1024;

/// Initial capacity of a freshly allocated buffer
const INITIAL_CAPACITY: usize = 8 * 1024;

/// Lock-free pool of byte buffers
pub struct BufferPool {
    buffers: ArrayQueue<Vec<u8>>,
    reused: AtomicU64,
    allocated: AtomicU64,
}

impl BufferPool {
    /// Create a pool retaining at most `size` idle buffers
    pub fn new(size: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(size.max(1)),
            reused: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
        }
    }

    /// Take an empty buffer
    pub fn acquire(&self) -> Vec<u8> {
        match self.buffers.pop() {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(INITIAL_CAPACITY)
            }
        }
    }

    /// Give a buffer back; it is dropped when the pool is full or the buffer grew too large
    pub fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let _ = self.buffers.push(buf);
    }

    /// Idle buffers currently pooled
    pub fn idle(&self) -> usize {
        self.buffers.len()
    }

    /// (reused, allocated) acquisition counts
    pub fn counts(&self) -> (u64, u64) {
        (
            self.reused.load(Ordering::Relaxed),
            self.allocated.load(Ordering::Relaxed),
        )
    }
}
