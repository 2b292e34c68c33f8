//! Session layer errors.

use crate::types::{BrowserId, CallId};

/// Session result type
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors from registry operations and engine calls.
///
/// Registry errors (duplicate or unknown ids) reject the operation and
/// leave the registry unchanged. `EngineThread` is a failed thread
/// registration handshake: the operation path terminates, it is never
/// absorbed, because engine behaviour after an unregistered call is
/// undefined.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("call already exists: {0}")]
    DuplicateCall(CallId),

    #[error("unknown call: {0}")]
    UnknownCall(CallId),

    #[error("browser already exists: {0}")]
    DuplicateBrowser(BrowserId),

    #[error("unknown browser: {0}")]
    UnknownBrowser(BrowserId),

    #[error("browser {0} is not in a call")]
    NotInCall(BrowserId),

    #[error("engine thread registration failed: {0}")]
    EngineThread(String),

    #[error("telephony engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Signaling(#[from] sipbridge_signaling::SignalingError),

    #[error(transparent)]
    Media(#[from] sipbridge_media::MediaError),
}
