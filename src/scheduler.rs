//! Render-thread-confined, time-ordered message queue.
//!
//! The owning component posts and cancels on the render thread with an
//! explicit `now`; other threads append through a cloneable [`MessagePost`]
//! handle whose envelopes are stamped when the queue is next pumped.
//! Delivery happens only when the render thread drains due messages at a
//! frame boundary, so handlers never race with rendering and never need the
//! render gate.

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// A tagged value the scheduler can order and cancel by kind.
pub trait Message: Send + 'static {
    type Kind: Copy + Eq + fmt::Debug + Send;

    fn kind(&self) -> Self::Kind;
}

struct Entry<M> {
    due: Instant,
    seq: u64,
    message: M,
}

struct Posted<M> {
    message: M,
    delay: Duration,
}

/// Cross-thread posting handle. Posting is append-only and requires no lock;
/// a post to a scheduler that has been dropped is silently discarded.
pub struct MessagePost<M: Message> {
    tx: Sender<Posted<M>>,
}

impl<M: Message> Clone for MessagePost<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M: Message> MessagePost<M> {
    pub fn post(&self, message: M) {
        self.post_delayed(message, Duration::ZERO);
    }

    pub fn post_delayed(&self, message: M, delay: Duration) {
        let _ = self.tx.send(Posted { message, delay });
    }
}

pub struct MessageScheduler<M: Message> {
    /// Sorted ascending by `(due, seq)`; equal due times keep post order.
    queue: Vec<Entry<M>>,
    seq: u64,
    ingest_tx: Sender<Posted<M>>,
    ingest_rx: Receiver<Posted<M>>,
}

impl<M: Message> Default for MessageScheduler<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> MessageScheduler<M> {
    pub fn new() -> Self {
        let (ingest_tx, ingest_rx) = unbounded();
        Self {
            queue: Vec::new(),
            seq: 0,
            ingest_tx,
            ingest_rx,
        }
    }

    pub fn poster(&self) -> MessagePost<M> {
        MessagePost {
            tx: self.ingest_tx.clone(),
        }
    }

    pub fn post(&mut self, message: M, now: Instant) {
        self.schedule(message, now);
    }

    pub fn post_delayed(&mut self, message: M, delay: Duration, now: Instant) {
        self.schedule(message, now + delay);
    }

    /// Removes every pending message of the given kind. Cross-thread posts
    /// still in the ingest lane become cancellable after the next drain.
    pub fn cancel(&mut self, kind: M::Kind) {
        self.queue.retain(|entry| entry.message.kind() != kind);
    }

    /// Unconditional teardown: drops everything pending, ingest included.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        while self.ingest_rx.try_recv().is_ok() {}
    }

    pub fn has_pending(&self, kind: M::Kind) -> bool {
        self.queue.iter().any(|entry| entry.message.kind() == kind)
    }

    /// Earliest deadline currently queued, for precise frame sleeps.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.first().map(|entry| entry.due)
    }

    /// Drains the ingest lane, then removes and returns every message due at
    /// `now`, in `(due, seq)` order. Messages the caller posts while handling
    /// the returned batch are delivered no earlier than the next drain.
    pub fn take_due(&mut self, now: Instant) -> Vec<M> {
        self.ingest(now);
        let ready = self.queue.partition_point(|entry| entry.due <= now);
        self.queue
            .drain(..ready)
            .map(|entry| entry.message)
            .collect()
    }

    fn ingest(&mut self, now: Instant) {
        while let Ok(posted) = self.ingest_rx.try_recv() {
            self.schedule(posted.message, now + posted.delay);
        }
    }

    fn schedule(&mut self, message: M, due: Instant) {
        let seq = self.seq;
        self.seq += 1;
        let at = self.queue.partition_point(|entry| entry.due <= due);
        self.queue.insert(at, Entry { due, seq, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestMessage {
        Tick(u32),
        Refresh,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestKind {
        Tick,
        Refresh,
    }

    impl Message for TestMessage {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            match self {
                TestMessage::Tick(_) => TestKind::Tick,
                TestMessage::Refresh => TestKind::Refresh,
            }
        }
    }

    #[test]
    fn immediate_messages_deliver_in_post_order() {
        let mut scheduler = MessageScheduler::new();
        let t0 = Instant::now();
        scheduler.post(TestMessage::Tick(1), t0);
        scheduler.post(TestMessage::Tick(2), t0);
        scheduler.post(TestMessage::Tick(3), t0);

        assert_eq!(
            scheduler.take_due(t0),
            vec![
                TestMessage::Tick(1),
                TestMessage::Tick(2),
                TestMessage::Tick(3)
            ]
        );
        assert!(scheduler.take_due(t0).is_empty());
    }

    #[test]
    fn delayed_messages_deliver_in_deadline_order() {
        let mut scheduler = MessageScheduler::new();
        let t0 = Instant::now();
        scheduler.post_delayed(TestMessage::Tick(2), Duration::from_millis(20), t0);
        scheduler.post_delayed(TestMessage::Tick(1), Duration::from_millis(10), t0);

        assert!(scheduler.take_due(t0 + Duration::from_millis(5)).is_empty());
        assert_eq!(
            scheduler.take_due(t0 + Duration::from_millis(10)),
            vec![TestMessage::Tick(1)]
        );
        assert_eq!(
            scheduler.take_due(t0 + Duration::from_millis(25)),
            vec![TestMessage::Tick(2)]
        );
    }

    #[test]
    fn cancel_then_repost_restarts_the_timer() {
        let mut scheduler = MessageScheduler::new();
        let t0 = Instant::now();
        scheduler.post_delayed(TestMessage::Refresh, Duration::from_millis(10), t0);

        let t1 = t0 + Duration::from_millis(5);
        scheduler.cancel(TestKind::Refresh);
        scheduler.post_delayed(TestMessage::Refresh, Duration::from_millis(10), t1);

        // Nothing fires at the original deadline; exactly one at the new one.
        assert!(scheduler.take_due(t0 + Duration::from_millis(10)).is_empty());
        assert_eq!(
            scheduler.take_due(t1 + Duration::from_millis(10)),
            vec![TestMessage::Refresh]
        );
    }

    #[test]
    fn cancel_removes_every_instance_of_the_kind() {
        let mut scheduler = MessageScheduler::new();
        let t0 = Instant::now();
        scheduler.post(TestMessage::Tick(1), t0);
        scheduler.post_delayed(TestMessage::Tick(2), Duration::from_millis(5), t0);
        scheduler.post(TestMessage::Refresh, t0);

        scheduler.cancel(TestKind::Tick);
        assert!(!scheduler.has_pending(TestKind::Tick));
        assert_eq!(
            scheduler.take_due(t0 + Duration::from_millis(10)),
            vec![TestMessage::Refresh]
        );
    }

    #[test]
    fn cross_thread_posts_arrive_on_drain() {
        let mut scheduler = MessageScheduler::new();
        let poster = scheduler.poster();
        let handle = std::thread::spawn(move || {
            poster.post(TestMessage::Tick(9));
        });
        handle.join().unwrap();

        let now = Instant::now();
        assert_eq!(scheduler.take_due(now), vec![TestMessage::Tick(9)]);
    }

    #[test]
    fn next_due_reports_earliest_deadline() {
        let mut scheduler = MessageScheduler::new();
        let t0 = Instant::now();
        assert!(scheduler.next_due().is_none());
        scheduler.post_delayed(TestMessage::Tick(1), Duration::from_millis(30), t0);
        scheduler.post_delayed(TestMessage::Refresh, Duration::from_millis(10), t0);
        assert_eq!(scheduler.next_due(), Some(t0 + Duration::from_millis(10)));
    }
}
