//! FIFO of decoded records between the receive path and the consumer.

use std::collections::VecDeque;

use crate::record::LogRecord;

/// Simple FIFO with O(1) push, pop and len.
///
/// Records enter from the decode callback during a drain pass and leave
/// through `next`, so every decoded record is popped exactly once or
/// discarded by `drain_all` on close.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: VecDeque<LogRecord>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. `None` is a no-op, so decode callbacks that skip a
    /// message can feed their output straight through.
    pub fn push(&mut self, record: Option<LogRecord>) {
        if let Some(record) = record {
            self.inner.push_back(record);
        }
    }

    /// Remove and return the oldest record.
    pub fn pop(&mut self) -> Option<LogRecord> {
        self.inner.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Discard everything, returning how many records were dropped.
    pub fn drain_all(&mut self) -> usize {
        let n = self.inner.len();
        self.inner.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mark: u32) -> LogRecord {
        LogRecord {
            mark,
            ..LogRecord::default()
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut q = MessageQueue::new();
        q.push(Some(record(1)));
        q.push(Some(record(2)));
        q.push(Some(record(3)));
        assert_eq!(q.pop().unwrap().mark, 1);
        assert_eq!(q.pop().unwrap().mark, 2);
        assert_eq!(q.pop().unwrap().mark, 3);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_push_none_is_noop() {
        let mut q = MessageQueue::new();
        q.push(None);
        assert!(q.is_empty());
        q.push(Some(record(5)));
        q.push(None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_conservation() {
        // every push is matched by exactly one pop, len tracks the difference
        let mut q = MessageQueue::new();
        for i in 0..100 {
            q.push(Some(record(i)));
        }
        assert_eq!(q.len(), 100);
        let mut popped = 0;
        while let Some(r) = q.pop() {
            assert_eq!(r.mark, popped);
            popped += 1;
        }
        assert_eq!(popped, 100);
        assert!(q.is_empty());
    }

    #[test]
    fn test_drain_all() {
        let mut q = MessageQueue::new();
        q.push(Some(record(1)));
        q.push(Some(record(2)));
        assert_eq!(q.drain_all(), 2);
        assert!(q.is_empty());
        assert_eq!(q.drain_all(), 0);
    }
}
