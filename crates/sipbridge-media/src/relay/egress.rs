//! Paced egress: pulls queued frames at the format's frame cadence and
//! hands them to the browser transport, substituting silence on underrun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::format::AudioFormat;
use crate::frame::RelayFrame;
use crate::queue::{FrameQueue, RelayId};

/// Snapshot of one track's delivery counters.
#[derive(Debug, Clone, Default)]
pub struct RelayTrackStats {
    /// Frames emitted
    pub total_frames: u64,
    /// Synthetic frames emitted on underrun
    pub synthetic_frames: u64,
    /// Frames replaced because their sample count was wrong
    pub malformed_frames: u64,
    /// Summed queued age of real frames
    pub queued_age_sum: Duration,
}

impl RelayTrackStats {
    /// Mean time real frames spent queued
    pub fn mean_queued_age(&self) -> Duration {
        let real = self.total_frames - self.synthetic_frames;
        if real == 0 {
            Duration::ZERO
        } else {
            self.queued_age_sum / real as u32
        }
    }
}

struct Pacing {
    start: Option<Instant>,
    pts: u64,
}

/// Pull-model audio track feeding one browser from one call's queue.
///
/// Each [`next_frame`](Self::next_frame) call sleeps until the frame's
/// deadline — `start + frame_index × frame_time`, anchored at the first
/// call — then pops the queue with the configured age budget. Pacing is
/// relative to the fixed start anchor, so a late wakeup shortens the next
/// sleep instead of accumulating drift.
pub struct RelayTrack {
    id: String,
    relay_id: RelayId,
    format: AudioFormat,
    max_frame_age: Duration,
    stats_log_interval: u64,
    queue: Arc<FrameQueue>,
    stopped: AtomicBool,
    // Only the single consumer touches these; the locks exist to keep the
    // track shareable behind an Arc.
    pacing: Mutex<Pacing>,
    stats: Mutex<RelayTrackStats>,
}

impl RelayTrack {
    pub fn new(relay_id: RelayId, queue: Arc<FrameQueue>, config: &RelayConfig) -> Self {
        let id = format!("track-{}", uuid::Uuid::new_v4());
        debug!("creating relay track. id={} relay_id={}", id, relay_id);
        Self {
            id,
            relay_id,
            format: config.format,
            max_frame_age: config.max_frame_age(),
            stats_log_interval: config.stats_log_interval,
            queue,
            stopped: AtomicBool::new(false),
            pacing: Mutex::new(Pacing {
                start: None,
                pts: 0,
            }),
            stats: Mutex::new(RelayTrackStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn relay_id(&self) -> &RelayId {
        &self.relay_id
    }

    /// Mark the track ended; the consumer sees `None` from the next
    /// `next_frame` call.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!("stopping relay track. id={}", self.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RelayTrackStats {
        self.stats.lock().clone()
    }

    /// The next paced frame, or `None` once the track is stopped or its
    /// queue torn down.
    ///
    /// A frame with the wrong sample count is counted and replaced with
    /// silence; the transport never sees an error for it.
    pub async fn next_frame(&self) -> Option<RelayFrame> {
        if self.is_stopped() {
            return None;
        }
        let expected = self.format.samples_per_frame();

        let (deadline, pts) = {
            let mut pacing = self.pacing.lock();
            match pacing.start {
                None => {
                    pacing.start = Some(Instant::now());
                    (None, 0)
                }
                Some(start) => {
                    pacing.pts += expected as u64;
                    let deadline = start + self.format.samples_to_duration(pacing.pts);
                    (Some(deadline), pacing.pts)
                }
            }
        };
        if let Some(deadline) = deadline {
            tokio::time::sleep_until(deadline).await;
        }
        if self.is_stopped() {
            return None;
        }

        let mut frame = match self.queue.pop(self.max_frame_age, expected) {
            Ok(frame) => frame,
            Err(_) => {
                debug!("queue closed, ending relay track. id={}", self.id);
                self.stop();
                return None;
            }
        };
        if frame.sample_count != expected {
            warn!(
                "frame sample count mismatch, substituting silence. got={} expected={} track={}",
                frame.sample_count, expected, self.id
            );
            self.stats.lock().malformed_frames += 1;
            frame = RelayFrame::silence(expected);
        }
        frame.pts = pts;
        frame.clock_rate = self.format.clock_rate;

        self.update_stats(&frame);
        Some(frame)
    }

    fn update_stats(&self, frame: &RelayFrame) {
        let mut stats = self.stats.lock();
        stats.total_frames += 1;
        if frame.synthetic {
            stats.synthetic_frames += 1;
        } else {
            stats.queued_age_sum += frame.age;
        }
        if stats.total_frames % self.stats_log_interval == 0 {
            debug!(
                "track stats. id={} total={} synthetic={} malformed={} mean_age={:?}",
                self.id,
                stats.total_frames,
                stats.synthetic_frames,
                stats.malformed_frames,
                stats.mean_queued_age()
            );
        }
    }
}
