//! Media relay errors.

/// Media relay result type
pub type Result<T> = std::result::Result<T, MediaError>;

/// Errors surfaced by the relay layer.
///
/// Only teardown conditions are represented here. A full queue, a stale
/// frame or a frame with the wrong sample count is counted and absorbed by
/// the queue and track themselves — the real-time producer and the paced
/// consumer both have contracts that an error return would violate.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// The queue was torn down while a consumer was still attached
    #[error("frame queue closed")]
    QueueClosed,
}
