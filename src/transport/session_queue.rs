// src/transport/session_queue.rs
//! Bounded hand-off queue between the simulation thread and the send loop
//!
//! Producers wait at most a fixed timeout for a free slot and otherwise drop
//! the incoming item; queued items are never reordered or displaced. The
//! capacity is a hard memory ceiling.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Bounded FIFO with timed push
pub struct SessionQueue<T> {
    /// Producer side
    tx: Sender<T>,
    
    /// Consumer side
    rx: Receiver<T>,
    
    /// Closed queues refuse pushes
    closed: AtomicBool,
    
    /// Push counter
    push_count: AtomicU64,
    
    /// Pop counter
    pop_count: AtomicU64,
    
    /// Drop counter (queue full past the timeout, or closed)
    drop_count: AtomicU64,
    
    /// Items discarded by `drain`
    discard_count: AtomicU64,
}

impl<T> SessionQueue<T> {
    /// Create a new queue
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            closed: AtomicBool::new(false),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
            discard_count: AtomicU64::new(0),
        }
    }
    
    /// Push, waiting at most `timeout` for a free slot.
    ///
    /// On timeout the item is handed back and counted as dropped.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        if self.closed.load(Ordering::Acquire) {
            self.drop_count.fetch_add(1, Ordering::Relaxed);
            return Err(item);
        }
        
        match self.tx.send_timeout(item, timeout) {
            Ok(()) => {
                self.push_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(item)) | Err(SendTimeoutError::Disconnected(item)) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                Err(item)
            }
        }
    }
    
    /// Pop, waiting at most `timeout` for an item
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => {
                self.pop_count.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
    
    /// Try to pop an item (non-blocking)
    pub fn try_pop(&self) -> Option<T> {
        let item = self.rx.try_recv().ok()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }
    
    /// Refuse further pushes and discard everything queued
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.drain()
    }
    
    /// Accept pushes again after `close`
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }
    
    /// Discard everything currently queued
    pub fn drain(&self) -> usize {
        let discarded = self.rx.try_iter().count();
        self.discard_count.fetch_add(discarded as u64, Ordering::Relaxed);
        discarded
    }
    
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
    
    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            discard_count: self.discard_count.load(Ordering::Relaxed),
            current_size: self.len(),
            capacity: self.capacity(),
        }
    }
    
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
    
    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }
    
    pub fn len(&self) -> usize {
        self.rx.len()
    }
    
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total items accepted
    pub push_count: u64,
    
    /// Total items taken by the consumer
    pub pop_count: u64,
    
    /// Total items refused (full past the timeout, or closed)
    pub drop_count: u64,
    
    /// Total items discarded on close
    pub discard_count: u64,
    
    /// Current queue size
    pub current_size: usize,
    
    /// Queue capacity
    pub capacity: usize,
}

impl QueueStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }
    
    /// Share of offered items that were dropped, in percent
    pub fn drop_rate(&self) -> f64 {
        let offered = self.push_count + self.drop_count;
        if offered == 0 {
            0.0
        } else {
            (self.drop_count as f64 / offered as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    
    const SHORT: Duration = Duration::from_millis(20);
    
    #[test]
    fn test_queue_creation() {
        let queue: SessionQueue<u32> = SessionQueue::new(10);
        assert_eq!(queue.capacity(), 10);
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
    }
    
    #[test]
    fn test_fifo_order() {
        let queue = SessionQueue::new(4);
        for i in 0..3 {
            queue.push_timeout(i, SHORT).unwrap();
        }
        assert_eq!(queue.try_pop(), Some(0));
        assert_eq!(queue.pop_timeout(SHORT), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.pop_timeout(SHORT), None);
    }
    
    #[test]
    fn test_full_queue_drops_incoming() {
        let queue = SessionQueue::new(2);
        queue.push_timeout("a", SHORT).unwrap();
        queue.push_timeout("b", SHORT).unwrap();
        assert!(queue.is_full());
        
        let started = Instant::now();
        assert_eq!(queue.push_timeout("c", SHORT), Err("c"));
        assert!(started.elapsed() < Duration::from_secs(1));
        
        // Queued items are untouched
        assert_eq!(queue.try_pop(), Some("a"));
        assert_eq!(queue.try_pop(), Some("b"));
        
        let stats = queue.stats();
        assert_eq!(stats.push_count, 2);
        assert_eq!(stats.drop_count, 1);
        assert!((stats.drop_rate() - 100.0 / 3.0).abs() < 1e-9);
    }
    
    #[test]
    fn test_push_waits_for_free_slot() {
        let queue = Arc::new(SessionQueue::new(1));
        queue.push_timeout(1, SHORT).unwrap();
        
        let consumer = {
            let q = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                q.try_pop()
            })
        };
        
        assert!(queue.push_timeout(2, Duration::from_secs(2)).is_ok());
        assert_eq!(consumer.join().unwrap(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
    }
    
    #[test]
    fn test_close_discards_and_refuses() {
        let queue = SessionQueue::new(4);
        queue.push_timeout(1, SHORT).unwrap();
        queue.push_timeout(2, SHORT).unwrap();
        
        assert_eq!(queue.close(), 2);
        assert!(queue.is_closed());
        assert_eq!(queue.push_timeout(3, SHORT), Err(3));
        assert_eq!(queue.stats().discard_count, 2);
        
        queue.reopen();
        assert!(queue.push_timeout(4, SHORT).is_ok());
    }
    
    #[test]
    fn test_stats() {
        let queue = SessionQueue::new(10);
        queue.push_timeout(1, SHORT).unwrap();
        queue.push_timeout(2, SHORT).unwrap();
        queue.try_pop();
        
        let stats = queue.stats();
        assert_eq!(stats.push_count, 2);
        assert_eq!(stats.pop_count, 1);
        assert_eq!(stats.current_size, 1);
        assert!((stats.fill_percentage() - 10.0).abs() < 1e-9);
    }
}
