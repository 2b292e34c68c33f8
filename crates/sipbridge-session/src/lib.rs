//! Session orchestration for the telephony-to-browser call bridge.
//!
//! Calls arrive on an opaque telephony engine and browsers connect over an
//! opaque real-time transport; this crate owns everything in between:
//!
//! - the registry of [`CallState`](state::CallState) and
//!   [`BrowserState`](state::BrowserState) records behind one
//!   mutual-exclusion discipline,
//! - the call lifecycle state machine
//!   (`Incoming → Early → Confirmed → Disconnected`) and its event
//!   dispatch,
//! - join/leave orchestration wiring the audio relay and the signaling
//!   session together,
//! - the thread-capability token guarding every call into the telephony
//!   engine.
//!
//! Three execution contexts meet here. The engine's callback thread feeds
//! [`EngineEventDispatcher`](dispatcher::EngineEventDispatcher) and must
//! never block; the async runtime runs the [`CallManager`](manager::CallManager)
//! event loop and all transport I/O; arbitrary caller threads issue
//! commands through the manager's async API. The registry lock is held
//! only across map mutation and cascades — never across I/O.

pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod events;
pub mod manager;
pub mod notify;
pub mod state;
pub mod types;

pub use dispatcher::{DispatchedEvent, EngineEventDispatcher};
pub use engine::{
    AnswerCode, AudioSink, CallAudio, EngineCall, EngineGuardProvider, EngineThreadGuard,
    ThreadRegistrar,
};
pub use errors::{Result, SessionError};
pub use events::{CallEvent, CallEventBus, CallEventHandler};
pub use manager::{CallManager, ManagerConfig};
pub use notify::SipNotification;
pub use state::{BrowserState, CallState};
pub use types::{BrowserId, CallDirection, CallId, CallInfoSnapshot, CallLifecycleState};
