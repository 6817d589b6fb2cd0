// src/exec/queue.rs

//! Thread-safe FIFO between the control thread and the workers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::backend::QueueItem;
use crate::errors::{LaunchError, Result};

#[derive(Debug, PartialEq)]
pub enum Popped {
    Item(QueueItem),
    TimedOut,
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: QueueItem) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LaunchError::QueueClosed);
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Wait for the next item. `None` waits forever.
    ///
    /// Items still queued when the queue is closed are handed out before
    /// `Closed` is reported.
    pub fn pop(&self, timeout: Option<Duration>) -> Popped {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Popped::Item(item);
            }
            if state.closed {
                return Popped::Closed;
            }
            match deadline {
                None => self.available.wait(&mut state),
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out()
                        && state.items.is_empty()
                        && !state.closed
                    {
                        return Popped::TimedOut;
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Reject further pushes and wake every waiting worker.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<QueueItem> {
        self.state.lock().items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameKey;

    #[test]
    fn pop_times_out_when_empty() {
        let queue = JobQueue::new();
        assert_eq!(queue.pop(Some(Duration::from_millis(10))), Popped::TimedOut);
    }

    #[test]
    fn closed_queue_still_yields_queued_items() {
        let queue = JobQueue::new();
        queue
            .push(QueueItem::Checkpoint(NameKey::from("t")))
            .unwrap();
        queue.close();

        assert!(matches!(queue.pop(None), Popped::Item(_)));
        assert_eq!(queue.pop(None), Popped::Closed);
        assert!(queue.push(QueueItem::Checkpoint(NameKey::from("t"))).is_err());
    }
}
