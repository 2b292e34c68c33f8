//! The opaque telephony engine surface.
//!
//! SIP parsing, SDP negotiation and RTP transport live behind these
//! traits; the bridge only ever answers, hangs up, reads call info and
//! attaches an audio sink.
//!
//! The engine requires every thread to run a one-time registration
//! handshake before calling in, and behaves undefined afterwards if one
//! does not. Rather than a convention, that precondition is a capability
//! here: engine entry points take an [`EngineThreadGuard`], and the only
//! way to get one is [`EngineGuardProvider::acquire`], which performs the
//! handshake once per thread. The guard is `!Send`, so it cannot leak to a
//! thread that never registered.

use std::cell::RefCell;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, SessionError};
use crate::types::CallInfoSnapshot;

/// Response the bridge sends when auto-answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerCode {
    /// Provisional "ringing" indication
    Ringing,
    /// Accept the call
    Accepted,
}

/// Receives raw frames from a call's audio media, on the engine's
/// callback thread. Implementations must not block and must not call back
/// into the engine.
pub trait AudioSink: Send + Sync {
    fn on_frame(&self, samples: &[i16]);
}

/// A call's audio media handle.
pub trait CallAudio: Send + Sync {
    /// Start delivering received audio to `sink`.
    fn start_transmit(&self, sink: Arc<dyn AudioSink>) -> Result<()>;
    /// Stop delivery.
    fn stop_transmit(&self) -> Result<()>;
}

/// One call as the engine exposes it.
///
/// All methods are engine calls: they require the thread-registration
/// capability. They are synchronous and quick (FFI-style), so holding the
/// guard across them is fine from any registered thread.
pub trait EngineCall: Send + Sync {
    fn info(&self, guard: &EngineThreadGuard) -> Result<CallInfoSnapshot>;
    fn answer(&self, code: AnswerCode, guard: &EngineThreadGuard) -> Result<()>;
    fn hangup(&self, guard: &EngineThreadGuard) -> Result<()>;
    fn audio(&self, guard: &EngineThreadGuard) -> Result<Arc<dyn CallAudio>>;
}

/// The engine's per-thread registration handshake.
pub trait ThreadRegistrar: Send + Sync {
    /// Register the current thread with the engine. Called at most once
    /// per thread per registrar.
    fn register_current_thread(&self, name: &str) -> std::result::Result<(), String>;
}

/// Proof that the current thread is registered with the engine.
///
/// Deliberately `!Send`: the token never outlives its thread's
/// registration.
pub struct EngineThreadGuard {
    _not_send: PhantomData<*const ()>,
}

thread_local! {
    // registrars (by Arc address) this thread has completed the handshake with
    static REGISTERED_WITH: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Hands out [`EngineThreadGuard`]s, running the registration handshake
/// the first time each thread asks.
#[derive(Clone)]
pub struct EngineGuardProvider {
    registrar: Arc<dyn ThreadRegistrar>,
}

impl EngineGuardProvider {
    pub fn new(registrar: Arc<dyn ThreadRegistrar>) -> Self {
        Self { registrar }
    }

    /// Acquire the engine-call capability for the current thread.
    ///
    /// A failed handshake is fatal to the calling operation path — the
    /// error must not be swallowed and retried around, because the engine's
    /// behaviour after an unregistered call is undefined.
    pub fn acquire(&self) -> Result<EngineThreadGuard> {
        let key = Arc::as_ptr(&self.registrar) as *const () as usize;
        REGISTERED_WITH.with(|registered| {
            if !registered.borrow().contains(&key) {
                let thread = std::thread::current();
                let name = thread.name().unwrap_or("unnamed");
                debug!("registering thread with telephony engine. thread_name={}", name);
                self.registrar
                    .register_current_thread(name)
                    .map_err(SessionError::EngineThread)?;
                registered.borrow_mut().insert(key);
            }
            Ok(EngineThreadGuard {
                _not_send: PhantomData,
            })
        })
    }
}

// The media ingress port is exactly an engine audio sink: copy the frame
// into the listener queues and return.
impl AudioSink for sipbridge_media::IngressPort {
    fn on_frame(&self, samples: &[i16]) {
        self.deliver(samples);
    }
}
