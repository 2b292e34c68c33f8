//! Signaling errors.

/// Signaling result type
pub type Result<T> = std::result::Result<T, SignalingError>;

/// Errors from the negotiation and delivery paths.
///
/// A transport send failure is transient: callers log it and continue with
/// the remaining recipients rather than aborting a broadcast.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// The peer connection rejected an operation
    #[error("peer connection error: {0}")]
    Peer(String),

    /// Delivering to the browser transport failed
    #[error("transport send failed: {0}")]
    Transport(String),

    /// A wire message could not be encoded or decoded
    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
