//! Relay tuning knobs.

use std::time::Duration;

use crate::format::AudioFormat;

/// Configuration for the frame queues and egress tracks of one bridge.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Audio format on both sides of the relay
    pub format: AudioFormat,

    /// Maximum frames buffered per listener queue
    pub queue_capacity: usize,

    /// Age budget for queued frames, in frame times. Frames older than
    /// this are discarded by the egress side instead of played late.
    pub max_age_frames: u32,

    /// Emit a per-track stats line every this many egressed frames
    pub stats_log_interval: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            queue_capacity: 5,
            max_age_frames: 5,
            stats_log_interval: 100,
        }
    }
}

impl RelayConfig {
    /// Oldest a queued frame may be before egress discards it
    /// (100 ms in the reference configuration)
    pub fn max_frame_age(&self) -> Duration {
        self.format.frame_time * self.max_age_frames
    }
}
