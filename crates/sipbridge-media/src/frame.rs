//! Frame types on either side of the queue.

use std::time::{Duration, Instant};

/// A frame as pushed by the ingress side, stamped at arrival time.
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    /// Raw signed 16-bit PCM samples
    pub samples: Vec<i16>,
    /// Sample count (cached, equals `samples.len()`)
    pub sample_count: usize,
    /// When the frame entered the queue
    pub queued_at: Instant,
}

impl QueuedFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        let sample_count = samples.len();
        Self {
            samples,
            sample_count,
            queued_at: Instant::now(),
        }
    }
}

/// A frame as handed to the browser transport by the egress track.
#[derive(Debug, Clone)]
pub struct RelayFrame {
    /// Raw signed 16-bit PCM samples
    pub samples: Vec<i16>,
    /// Sample count
    pub sample_count: usize,
    /// Time the frame spent queued; zero for synthetic frames
    pub age: Duration,
    /// True for zero-fill produced on underrun or as a malformed-frame
    /// replacement
    pub synthetic: bool,
    /// Presentation timestamp in samples since track start,
    /// monotonically increasing
    pub pts: u64,
    /// Time base denominator for `pts` (the format clock rate)
    pub clock_rate: u32,
}

impl RelayFrame {
    /// All-zero frame of `sample_count` samples, flagged synthetic.
    pub fn silence(sample_count: usize) -> Self {
        Self {
            samples: vec![0; sample_count],
            sample_count,
            age: Duration::ZERO,
            synthetic: true,
            pts: 0,
            clock_rate: 0,
        }
    }

    /// True when every sample is zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }
}
