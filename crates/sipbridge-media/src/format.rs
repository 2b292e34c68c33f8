//! Negotiated audio format description.

use std::time::Duration;

/// The raw linear PCM format shared by both sides of the relay.
///
/// One fixed format per deployment; the relay never transcodes. The
/// default is the reference configuration: 8 kHz, mono, 16-bit, 20 ms
/// frames (160 samples per frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample clock rate in Hz
    pub clock_rate: u32,
    /// Channel count (the relay only carries mono today)
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Duration of one frame
    pub frame_time: Duration,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            clock_rate: 8000,
            channels: 1,
            bits_per_sample: 16,
            frame_time: Duration::from_millis(20),
        }
    }
}

impl AudioFormat {
    /// Samples carried by one frame of this format
    pub fn samples_per_frame(&self) -> usize {
        (self.clock_rate as u128 * self.frame_time.as_nanos() / 1_000_000_000) as usize
    }

    /// Duration of `samples` samples at this clock rate
    pub fn samples_to_duration(&self, samples: u64) -> Duration {
        Duration::from_secs_f64(samples as f64 / self.clock_rate as f64)
    }
}
