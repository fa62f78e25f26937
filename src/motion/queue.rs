//! Pending command queue shared by callers and the worker thread.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::command::MotionCommand;

/// Heap entry keyed by `(tier, sequence)`. The sequence number keeps equal
/// tiers in arrival order.
struct Pending {
    tier: u8,
    seq: u64,
    command: MotionCommand,
}

impl Pending {
    fn key(&self) -> (u8, u64) {
        (self.tier, self.seq)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // BinaryHeap is a max-heap; the smallest key must compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Pending>,
    next_seq: u64,
}

/// Priority queue with a blocking, timed pop.
#[derive(Default)]
pub(crate) struct PendingQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

impl PendingQueue {
    pub fn push(&self, command: MotionCommand) {
        {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Pending {
                tier: command.priority().tier(),
                seq,
                command,
            });
        }
        self.available.notify_one();
    }

    /// Pops the first command, waiting up to `timeout` if none is pending.
    ///
    /// Returns early with `None` when [`wake()`](Self::wake) is called.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<MotionCommand> {
        let mut inner = self.inner.lock();
        if inner.heap.is_empty() {
            let _ = self.available.wait_for(&mut inner, timeout);
        }
        inner.heap.pop().map(|pending| pending.command)
    }

    /// Wakes a worker blocked in `pop_timeout`.
    pub fn wake(&self) {
        self.available.notify_all();
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.heap.len();
        inner.heap.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }
}
