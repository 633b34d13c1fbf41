use crate::types::WithTimestamp;
use std::{collections::VecDeque, time::Duration};

/// A bounded buffer of pending messages kept sorted by timestamp,
/// holding at most one message per timestamp.
#[derive(Debug)]
pub struct Buffer<T>
where
    T: WithTimestamp,
{
    buffer: VecDeque<T>,
    capacity: usize,
}

/// What happened to the buffer when a message was accepted.
#[derive(Debug, PartialEq, Eq)]
pub enum Pushed<T> {
    /// The message was stored without displacing anything.
    Inserted,
    /// A pending message with the same timestamp was replaced.
    Replaced(T),
    /// The buffer overflowed and its oldest message was evicted.
    Evicted(T),
}

impl<T> Buffer<T>
where
    T: WithTimestamp,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.buffer.back()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.buffer.pop_front()
    }

    /// Checks whether a message with exactly this timestamp is pending.
    pub fn contains(&self, ts: Duration) -> bool {
        self.position(ts).is_ok()
    }

    /// Removes and returns the message with exactly this timestamp.
    pub fn take(&mut self, ts: Duration) -> Option<T> {
        let index = self.position(ts).ok()?;
        self.buffer.remove(index)
    }

    /// Drops messages older than a specific timestamp and returns the
    /// number of dropped messages.
    pub fn drop_before(&mut self, ts: Duration) -> usize {
        let mut count = 0;

        while let Some(front) = self.buffer.front() {
            if front.timestamp() >= ts {
                break;
            }
            self.buffer.pop_front();
            count += 1;
        }

        count
    }

    /// Push a message into the buffer.
    ///
    /// A message whose timestamp is already pending replaces the older
    /// one. When the buffer is full, the message with the smallest
    /// timestamp is evicted, which may be the new message itself.
    pub fn push(&mut self, item: T) -> Pushed<T> {
        let index = match self.position(item.timestamp()) {
            Ok(index) => {
                let old = std::mem::replace(&mut self.buffer[index], item);
                return Pushed::Replaced(old);
            }
            Err(index) => index,
        };

        self.buffer.insert(index, item);
        if self.buffer.len() <= self.capacity {
            return Pushed::Inserted;
        }
        match self.buffer.pop_front() {
            Some(oldest) => Pushed::Evicted(oldest),
            None => Pushed::Inserted,
        }
    }

    fn position(&self, ts: Duration) -> Result<usize, usize> {
        self.buffer.binary_search_by_key(&ts, |item| item.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestMessage {
        timestamp: Duration,
        data: String,
    }

    impl TestMessage {
        fn new(timestamp_ms: u64, data: &str) -> Self {
            Self {
                timestamp: Duration::from_millis(timestamp_ms),
                data: data.to_string(),
            }
        }
    }

    impl WithTimestamp for TestMessage {
        fn timestamp(&self) -> Duration {
            self.timestamp
        }
    }

    fn create_message(timestamp_ms: u64) -> TestMessage {
        TestMessage::new(timestamp_ms, &format!("msg_{}", timestamp_ms))
    }

    fn timestamps(buffer: &Buffer<TestMessage>) -> Vec<u64> {
        buffer
            .buffer
            .iter()
            .map(|msg| msg.timestamp.as_millis() as u64)
            .collect()
    }

    #[test]
    fn test_buffer_with_capacity() {
        let buffer: Buffer<TestMessage> = Buffer::with_capacity(5);
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_keeps_timestamp_order() {
        let mut buffer = Buffer::with_capacity(5);

        for ts in [3000, 1000, 2000] {
            let pushed = buffer.push(create_message(ts));
            assert_eq!(pushed, Pushed::Inserted);
        }

        assert_eq!(timestamps(&buffer), vec![1000, 2000, 3000]);
        assert_eq!(
            buffer.front().unwrap().timestamp(),
            Duration::from_millis(1000)
        );
        assert_eq!(
            buffer.back().unwrap().timestamp(),
            Duration::from_millis(3000)
        );
    }

    #[test]
    fn test_buffer_same_timestamp_replaces() {
        let mut buffer = Buffer::with_capacity(3);

        buffer.push(TestMessage::new(1000, "first"));
        let pushed = buffer.push(TestMessage::new(1000, "second"));

        assert_eq!(pushed, Pushed::Replaced(TestMessage::new(1000, "first")));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.front().unwrap().data, "second");
    }

    #[test]
    fn test_buffer_overflow_drops_oldest() {
        let mut buffer = Buffer::with_capacity(2);

        buffer.push(create_message(1000));
        buffer.push(create_message(2000));
        let pushed = buffer.push(create_message(3000));

        assert_eq!(pushed, Pushed::Evicted(create_message(1000)));
        assert_eq!(timestamps(&buffer), vec![2000, 3000]);
    }

    #[test]
    fn test_buffer_overflow_evicts_stale_newcomer() {
        let mut buffer = Buffer::with_capacity(2);

        buffer.push(create_message(2000));
        buffer.push(create_message(3000));
        let pushed = buffer.push(create_message(1000));

        assert_eq!(pushed, Pushed::Evicted(create_message(1000)));
        assert_eq!(timestamps(&buffer), vec![2000, 3000]);
    }

    #[test]
    fn test_buffer_contains_and_take() {
        let mut buffer = Buffer::with_capacity(3);
        for ts in [1000, 2000, 3000] {
            buffer.push(create_message(ts));
        }

        assert!(buffer.contains(Duration::from_millis(2000)));
        assert!(!buffer.contains(Duration::from_millis(2500)));

        let taken = buffer.take(Duration::from_millis(2000)).unwrap();
        assert_eq!(taken, create_message(2000));
        assert!(buffer.take(Duration::from_millis(2000)).is_none());
        assert_eq!(timestamps(&buffer), vec![1000, 3000]);
    }

    #[test]
    fn test_buffer_drop_before_empty() {
        let mut buffer: Buffer<TestMessage> = Buffer::with_capacity(3);
        let dropped = buffer.drop_before(Duration::from_millis(1000));
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_buffer_drop_before_multiple_messages() {
        let mut buffer = Buffer::with_capacity(5);
        for ts in [1000, 1500, 2000, 2500, 3000] {
            buffer.push(create_message(ts));
        }

        let dropped = buffer.drop_before(Duration::from_millis(2200));
        assert_eq!(dropped, 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(
            buffer.pop_front().unwrap().timestamp(),
            Duration::from_millis(2500)
        );
    }
}
