//! The two halves of the audio relay.
//!
//! Ingress runs on the telephony engine's callback thread and only ever
//! enqueues; egress runs as a paced pull loop on the async runtime and
//! only ever dequeues. The frame queue between them is the sole shared
//! state.

pub mod egress;
pub mod ingress;

pub use egress::{RelayTrack, RelayTrackStats};
pub use ingress::IngressPort;
