//! Per-subscriber bounded FIFO with an explicit overflow policy (spec §4.2,
//! §9 design note). Built on a `Mutex<VecDeque<_>>` plus two `Notify`
//! handles (one for "item available", one for "space available") because
//! `tokio::sync::mpsc` has no way to evict the oldest queued item, which
//! `FullMode::DropOldest` requires.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::{CoordinationError, CoordinationResult};

/// Backpressure policy applied when a subscriber's mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullMode {
    /// Publish suspends until space frees up or the publish is cancelled.
    Wait,
    /// The oldest queued item is evicted to make room for the new one.
    DropOldest,
    /// The new item is silently discarded; the queue is left unchanged.
    DropNewest,
    /// Equivalent in effect to `DropNewest` but recorded distinctly so
    /// metrics/logging can tell a policy-level "refuse the write" apart
    /// from "prefer recency" semantics.
    DropWrite,
}

pub struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    full_mode: FullMode,
    item_available: Notify,
    space_available: Notify,
    closed: AtomicBool,
}

impl<T> Mailbox<T> {
    pub fn new(capacity: usize, full_mode: FullMode) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            full_mode,
            item_available: Notify::new(),
            space_available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.item_available.notify_waiters();
        self.space_available.notify_waiters();
    }

    /// Enqueues `item`, applying the configured `FullMode` when full.
    /// Only `FullMode::Wait` can suspend.
    pub async fn send(&self, item: T) -> CoordinationResult<()> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(CoordinationError::bus_disposed("mailbox is closed"));
            }
            {
                let mut queue = self.queue.lock().expect("mailbox mutex poisoned");
                if queue.len() < self.capacity {
                    queue.push_back(item);
                    drop(queue);
                    self.item_available.notify_one();
                    return Ok(());
                }
                match self.full_mode {
                    FullMode::DropNewest | FullMode::DropWrite => {
                        return Ok(());
                    }
                    FullMode::DropOldest => {
                        queue.pop_front();
                        queue.push_back(item);
                        drop(queue);
                        self.item_available.notify_one();
                        return Ok(());
                    }
                    FullMode::Wait => {
                        // fall through to wait below
                    }
                }
            }
            self.space_available.notified().await;
        }
    }

    /// Dequeues the next item, or `None` once the mailbox is closed and
    /// drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut queue = self.queue.lock().expect("mailbox mutex poisoned");
                if let Some(item) = queue.pop_front() {
                    drop(queue);
                    self.space_available.notify_one();
                    return Some(item);
                }
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.item_available.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("mailbox mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_newest_discards_overflow() {
        let mailbox: Mailbox<u32> = Mailbox::new(1, FullMode::DropNewest);
        mailbox.send(1).await.unwrap();
        mailbox.send(2).await.unwrap();
        assert_eq!(mailbox.recv().await, Some(1));
    }

    #[tokio::test]
    async fn drop_oldest_evicts_front() {
        let mailbox: Mailbox<u32> = Mailbox::new(1, FullMode::DropOldest);
        mailbox.send(1).await.unwrap();
        mailbox.send(2).await.unwrap();
        assert_eq!(mailbox.recv().await, Some(2));
    }

    #[tokio::test]
    async fn wait_mode_blocks_until_drained() {
        let mailbox: std::sync::Arc<Mailbox<u32>> = std::sync::Arc::new(Mailbox::new(1, FullMode::Wait));
        mailbox.send(1).await.unwrap();

        let writer = std::sync::Arc::clone(&mailbox);
        let send_task = tokio::spawn(async move {
            writer.send(2).await.unwrap();
        });

        // second send should not have completed yet: queue is full.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!send_task.is_finished());

        assert_eq!(mailbox.recv().await, Some(1));
        send_task.await.unwrap();
        assert_eq!(mailbox.recv().await, Some(2));
    }

    #[tokio::test]
    async fn closed_mailbox_drains_then_returns_none() {
        let mailbox: Mailbox<u32> = Mailbox::new(4, FullMode::Wait);
        mailbox.send(1).await.unwrap();
        mailbox.close();
        assert_eq!(mailbox.recv().await, Some(1));
        assert_eq!(mailbox.recv().await, None);
    }
}
