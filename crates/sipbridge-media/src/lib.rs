//! Real-time audio relay between the telephony engine and the browser
//! transport.
//!
//! The telephony engine delivers audio frames on its own callback thread at
//! whatever jitter the network hands it; the browser transport consumes
//! frames on a strict wall-clock cadence. This crate decouples the two
//! clock domains with a small per-listener jitter buffer:
//!
//! - [`FrameQueue`] — bounded buffer of arrival-stamped frames with
//!   age-based eviction (capacity 5 frames, 100 ms budget by default).
//! - [`IngressPort`] — engine-side sink; fans each delivered frame out to
//!   the listener queues of its call without ever blocking the producer.
//! - [`RelayTrack`] — pull-model egress; paces one frame per frame-time
//!   anchored at track start, drops stale frames, and substitutes
//!   synthetic silence on underrun.
//!
//! Overload (queue full), staleness and malformed frames are counted and
//! absorbed, never surfaced as errors: the paths on both sides of the
//! queue carry real-time deadlines that an error would only make worse.

pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod queue;
pub mod relay;

pub use config::RelayConfig;
pub use error::{MediaError, Result};
pub use format::AudioFormat;
pub use frame::{QueuedFrame, RelayFrame};
pub use queue::{FrameQueue, QueueRegistry, RelayId};
pub use relay::{IngressPort, RelayTrack, RelayTrackStats};
