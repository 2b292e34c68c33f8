//! Engine-side sink: receives frames on the telephony engine's callback
//! thread and fans them out to the listener queues of its call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::queue::QueueRegistry;

/// Media sink attached to one call's audio handle.
///
/// The engine invokes [`deliver`](Self::deliver) once per received frame,
/// on its own real-time thread. The port must therefore never block, never
/// allocate unboundedly and never call back into the engine: it copies the
/// samples into each listener queue and returns.
pub struct IngressPort {
    call_id: String,
    queues: Arc<QueueRegistry>,
    total_frames: AtomicU64,
}

impl IngressPort {
    pub fn new(call_id: impl Into<String>, queues: Arc<QueueRegistry>) -> Self {
        Self {
            call_id: call_id.into(),
            queues,
            total_frames: AtomicU64::new(0),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Accept one frame from the engine. A full listener queue drops the
    /// frame for that listener only; a call with no listeners discards it.
    pub fn deliver(&self, samples: &[i16]) {
        let reached = self.queues.push_for_call(&self.call_id, samples);
        let total = self.total_frames.fetch_add(1, Ordering::Relaxed) + 1;
        if reached == 0 && total % 250 == 1 {
            trace!(
                "no listener queues for call {}, discarding frame. total={}",
                self.call_id,
                total
            );
        }
    }

    /// Frames delivered by the engine since attach
    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }
}
