//! Event queue shared by the watch source and the dispatch engine
//!
//! The watch source is the only writer and the dispatch engine the only
//! reader. A single lock covers every access; insertion order is delivery
//! order.

use crate::events::RawEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Mutex-guarded FIFO of decoded events
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<RawEvent>>,
    pushed: Notify,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event
    pub fn push(&self, event: RawEvent) {
        self.events.lock().push_back(event);
        self.pushed.notify_one();
    }

    /// Append a decoded buffer under one lock, returning how many were queued
    pub fn push_all(&self, events: impl IntoIterator<Item = RawEvent>) -> usize {
        let queued = {
            let mut guard = self.events.lock();
            let before = guard.len();
            guard.extend(events);
            guard.len() - before
        };
        if queued > 0 {
            self.pushed.notify_one();
        }
        queued
    }

    /// Take everything currently queued, oldest first
    pub fn take_all(&self) -> VecDeque<RawEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Resolves after the next push, or immediately if a push happened since
    /// the last wait
    pub async fn pushed(&self) {
        self.pushed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EntryType;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(RawEvent::added(EntryType::File, "/w/1"));
        let queued = queue.push_all(vec![
            RawEvent::modified(EntryType::File, "/w/1"),
            RawEvent::removed(EntryType::File, "/w/1"),
        ]);
        assert_eq!(queued, 2);
        assert_eq!(queue.len(), 3);

        let drained: Vec<_> = queue.take_all().into_iter().collect();
        assert_eq!(
            drained,
            vec![
                RawEvent::added(EntryType::File, "/w/1"),
                RawEvent::modified(EntryType::File, "/w/1"),
                RawEvent::removed(EntryType::File, "/w/1"),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_all_empty_is_noop() {
        let queue = EventQueue::new();
        assert_eq!(queue.push_all(Vec::new()), 0);
        assert!(queue.take_all().is_empty());
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = std::sync::Arc::new(EventQueue::new());
        let producer = std::sync::Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(RawEvent::added(EntryType::File, "/w/late"));
        });

        tokio::time::timeout(Duration::from_secs(2), queue.pushed())
            .await
            .expect("push should wake the waiter");
        assert_eq!(queue.len(), 1);
    }
}
