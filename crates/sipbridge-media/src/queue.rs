//! Bounded, age-aware frame queues shared between the engine callback
//! thread and the egress pacing task.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{MediaError, Result};
use crate::frame::{QueuedFrame, RelayFrame};

/// Identifies one relay session: the audio path from one call to one
/// listening browser.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RelayId {
    pub call_id: String,
    pub listener_id: String,
}

impl RelayId {
    pub fn new(call_id: impl Into<String>, listener_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            listener_id: listener_id.into(),
        }
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c-{}_ws-{}", self.call_id, self.listener_id)
    }
}

/// Bounded buffer of arrival-stamped audio frames.
///
/// `push` is called from the telephony engine's real-time callback thread
/// and never blocks or fails the caller; `pop` is only ever called by the
/// single egress consumer of this queue. The one internal lock is held for
/// a handful of pointer moves.
pub struct FrameQueue {
    frames: Mutex<VecDeque<QueuedFrame>>,
    capacity: usize,
    closed: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            closed: AtomicBool::new(false),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue for the real-time producer.
    ///
    /// At capacity the incoming frame is dropped and the drop counter
    /// incremented; the queue contents are left unchanged and the caller
    /// never observes an error.
    pub fn push(&self, samples: Vec<i16>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let frame = QueuedFrame::new(samples);
        {
            let mut frames = self.frames.lock();
            if frames.len() >= self.capacity {
                drop(frames);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 50 == 1 {
                    debug!("frame queue full, dropping frame. dropped={}", dropped);
                }
                return;
            }
            frames.push_back(frame);
        }
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return the first frame no older than `max_age`,
    /// discarding stale frames along the way. An empty queue yields
    /// `expected_samples` of synthetic silence rather than an error.
    pub fn pop(&self, max_age: Duration, expected_samples: usize) -> Result<RelayFrame> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MediaError::QueueClosed);
        }
        let mut frames = self.frames.lock();
        while let Some(frame) = frames.pop_front() {
            let age = frame.queued_at.elapsed();
            if age <= max_age {
                return Ok(RelayFrame {
                    samples: frame.samples,
                    sample_count: frame.sample_count,
                    age,
                    synthetic: false,
                    pts: 0,
                    clock_rate: 0,
                });
            }
            trace!("dropping stale frame. age={:?} max_age={:?}", age, max_age);
        }
        drop(frames);
        Ok(RelayFrame::silence(expected_samples))
    }

    /// Mark the queue closed and discard its contents. A paced consumer
    /// observes closure on its next `pop` and exits instead of busy-polling
    /// a deleted queue.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.frames.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames accepted since creation
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Frames dropped at capacity since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Lazily-created frame queues keyed by relay session.
///
/// A queue comes into existence on first reference by either side and is
/// shared between the producer and its single consumer; removal closes the
/// queue so both sides observe teardown.
pub struct QueueRegistry {
    queues: DashMap<RelayId, Arc<FrameQueue>>,
    capacity: usize,
}

impl QueueRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Fetch the queue for `id`, creating it on first reference.
    pub fn get_or_create(&self, id: &RelayId) -> Arc<FrameQueue> {
        self.queues
            .entry(id.clone())
            .or_insert_with(|| {
                debug!("creating frame queue. relay_id={}", id);
                Arc::new(FrameQueue::new(self.capacity))
            })
            .clone()
    }

    /// Push one frame to every queue currently registered for `call_id`.
    /// Runs on the engine callback thread; returns the number of queues
    /// reached.
    pub fn push_for_call(&self, call_id: &str, samples: &[i16]) -> usize {
        let mut reached = 0;
        for entry in self.queues.iter() {
            if entry.key().call_id == call_id {
                entry.value().push(samples.to_vec());
                reached += 1;
            }
        }
        reached
    }

    /// Close and discard the queue for `id`, if present.
    pub fn remove(&self, id: &RelayId) {
        if let Some((_, queue)) = self.queues.remove(id) {
            debug!("removing frame queue. relay_id={}", id);
            queue.close();
        }
    }

    /// Close and discard every queue belonging to `call_id`.
    pub fn remove_call(&self, call_id: &str) {
        let ids: Vec<RelayId> = self
            .queues
            .iter()
            .filter(|entry| entry.key().call_id == call_id)
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.remove(&id);
        }
    }

    /// Number of live queues
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_at_capacity_drops_and_counts() {
        let queue = FrameQueue::new(5);
        for i in 0..8 {
            queue.push(vec![i as i16; 160]);
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.pushed(), 5);
        assert_eq!(queue.dropped(), 3);

        // contents are the first five pushed, unchanged by the overflow
        let frame = queue.pop(Duration::from_secs(1), 160).unwrap();
        assert!(!frame.synthetic);
        assert_eq!(frame.samples[0], 0);
    }

    #[test]
    fn pop_empty_returns_synthetic_silence() {
        let queue = FrameQueue::new(5);
        let frame = queue.pop(Duration::from_millis(100), 160).unwrap();
        assert!(frame.synthetic);
        assert_eq!(frame.sample_count, 160);
        assert!(frame.is_silent());
    }

    #[test]
    fn pop_discards_frames_older_than_max_age() {
        let queue = FrameQueue::new(5);
        queue.push(vec![1; 160]);
        queue.push(vec![2; 160]);
        std::thread::sleep(Duration::from_millis(10));
        queue.push(vec![3; 160]);

        // the first two frames are now past a 5 ms budget
        let frame = queue.pop(Duration::from_millis(5), 160).unwrap();
        assert!(!frame.synthetic);
        assert_eq!(frame.samples[0], 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_all_stale_returns_synthetic() {
        let queue = FrameQueue::new(5);
        queue.push(vec![1; 160]);
        std::thread::sleep(Duration::from_millis(10));
        let frame = queue.pop(Duration::from_millis(1), 160).unwrap();
        assert!(frame.synthetic);
        assert_eq!(frame.sample_count, 160);
    }

    #[test]
    fn closed_queue_rejects_pop_and_ignores_push() {
        let queue = FrameQueue::new(5);
        queue.push(vec![1; 160]);
        queue.close();
        assert!(queue.is_empty());
        queue.push(vec![2; 160]);
        assert!(queue.is_empty());
        assert!(matches!(
            queue.pop(Duration::from_secs(1), 160),
            Err(MediaError::QueueClosed)
        ));
    }

    #[test]
    fn registry_creates_on_first_reference_and_shares() {
        let registry = QueueRegistry::new(5);
        let id = RelayId::new("c1", "b1");
        let producer_side = registry.get_or_create(&id);
        let consumer_side = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&producer_side, &consumer_side));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn push_for_call_fans_out_to_listener_queues_only() {
        let registry = QueueRegistry::new(5);
        let a = registry.get_or_create(&RelayId::new("c1", "b1"));
        let b = registry.get_or_create(&RelayId::new("c1", "b2"));
        let other = registry.get_or_create(&RelayId::new("c2", "b3"));

        let reached = registry.push_for_call("c1", &[7; 160]);
        assert_eq!(reached, 2);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(other.len(), 0);
    }

    #[test]
    fn remove_call_closes_every_queue_of_that_call() {
        let registry = QueueRegistry::new(5);
        let a = registry.get_or_create(&RelayId::new("c1", "b1"));
        let b = registry.get_or_create(&RelayId::new("c1", "b2"));
        let other = registry.get_or_create(&RelayId::new("c2", "b1"));

        registry.remove_call("c1");
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert!(!other.is_closed());
        assert_eq!(registry.len(), 1);
    }
}
