//! Working memory: a bounded FIFO of the most recent messages.
//! `push` enforces the invariant "size never exceeds capacity at any
//! externally observable moment" by evicting the oldest entry before the
//! new one is appended, within the same call.

use std::collections::VecDeque;

use crate::core::Message;

/// Bounded FIFO conversation buffer.
pub struct WorkingMemory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl WorkingMemory {
    pub fn new(capacity: usize) -> Self {
        WorkingMemory {
            messages: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append `message`, evicting the oldest entry first if at capacity.
    /// Returns the evicted message, if any, so the caller can decide
    /// whether to promote it to episodic memory.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of current messages, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Replace the entire buffer (used by the compression path's atomic
    /// swap back to a single summary message).
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages.into_iter().collect();
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_capacity() {
        let mut mem = WorkingMemory::new(3);
        for i in 0..10 {
            mem.push(Message::user(format!("msg {i}")));
            assert!(mem.len() <= 3);
        }
        assert_eq!(mem.len(), 3);
    }

    #[test]
    fn capacity_one_evicts_previous_every_time() {
        let mut mem = WorkingMemory::new(1);
        assert!(mem.push(Message::user("a")).is_none());
        let evicted = mem.push(Message::user("b"));
        assert_eq!(evicted.unwrap().content, "a");
        let evicted = mem.push(Message::user("c"));
        assert_eq!(evicted.unwrap().content, "b");
        assert_eq!(mem.len(), 1);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut mem = WorkingMemory::new(5);
        for i in 0..5 {
            mem.push(Message::user(format!("{i}")));
        }
        let snapshot = mem.snapshot();
        assert_eq!(snapshot[0].content, "0");
        assert_eq!(snapshot[4].content, "4");
    }
}
