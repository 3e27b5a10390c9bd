//! In-memory FIFO container for pending hits.
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::hits::Hit;

const LOCK_MESSAGE: &str = "thread holding hit queue lock should not panic";

/// A thread-safe, insertion-ordered queue of [`Hit`]s.
///
/// None of the operations block: callers that need backpressure compare [`HitQueue::size`]
/// against their own capacity.
#[derive(Debug, Default)]
pub struct HitQueue {
    items: Mutex<VecDeque<Hit>>,
}

impl HitQueue {
    /// Create a new empty queue.
    pub fn new() -> HitQueue {
        HitQueue::default()
    }

    /// Append a hit at the back of the queue.
    pub fn add(&self, hit: Hit) {
        self.items.lock().expect(LOCK_MESSAGE).push_back(hit);
    }

    /// Return up to `count` oldest hits without removing them. Used to build a batch before
    /// delivery is confirmed.
    pub fn get(&self, count: usize) -> Vec<Hit> {
        let items = self.items.lock().expect(LOCK_MESSAGE);
        items.iter().take(count).cloned().collect()
    }

    /// Pop and return up to `count` oldest hits.
    pub fn remove(&self, count: usize) -> Vec<Hit> {
        let mut items = self.items.lock().expect(LOCK_MESSAGE);
        let count = count.min(items.len());
        items.drain(..count).collect()
    }

    /// Current number of queued hits.
    pub fn size(&self) -> usize {
        self.items.lock().expect(LOCK_MESSAGE).len()
    }
}
