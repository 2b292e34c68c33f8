//! Per-browser signaling: PeerConnection orchestration and the wire
//! envelopes the bridge exchanges with browsers.
//!
//! The browser media engine (ICE, DTLS, SRTP, SDP generation) is an
//! external collaborator consumed only through the [`PeerConnection`]
//! trait. What lives here is the negotiation lifecycle around it: when to
//! run an offer/answer cycle, how track changes batch into renegotiations,
//! and whether the connection is ready to carry audio.

pub mod error;
pub mod messages;
pub mod peer;
pub mod session;
pub mod transport;

pub use error::{Result, SignalingError};
pub use messages::{Channel, Envelope, RtcMessage};
pub use peer::{
    ConnectionState, IceCandidateInit, IceGatheringState, MediaKind, PeerConnection, PeerEvent,
    SdpType, SenderInfo, SessionDescription, SignalingState,
};
pub use session::{SignalingConfig, SignalingSession};
pub use transport::BrowserTransport;
