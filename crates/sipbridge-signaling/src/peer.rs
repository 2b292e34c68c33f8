//! Opaque browser media engine surface.
//!
//! SDP generation, ICE, DTLS and SRTP all belong to the engine behind this
//! trait; the bridge only sequences offers and answers and attaches or
//! detaches outbound audio tracks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sipbridge_media::RelayTrack;

use crate::error::Result;

/// Which side of an offer/answer exchange a description is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// An SDP blob with its role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate as browsers serialize it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(rename = "usernameFragment")]
    pub username_fragment: Option<String>,
}

/// Peer connection transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// True while the connection is still worth negotiating over
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Offer/answer exchange state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// ICE gathering progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Kind of media a sender carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Snapshot of one outbound sender
#[derive(Debug, Clone)]
pub struct SenderInfo {
    pub id: String,
    pub kind: MediaKind,
    /// Whether the sender's track is still producing
    pub live: bool,
}

/// The browser media engine's per-connection handle.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Attach an outbound audio track; returns the new sender's id.
    async fn add_track(&self, track: Arc<RelayTrack>) -> Result<String>;
    /// Stop and remove one outbound sender.
    async fn stop_sender(&self, sender_id: &str) -> Result<()>;
    async fn senders(&self) -> Vec<SenderInfo>;

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()>;

    fn connection_state(&self) -> ConnectionState;
    fn signaling_state(&self) -> SignalingState;

    async fn close(&self) -> Result<()>;
}

/// State-change and ICE events the engine surfaces to the session
#[derive(Debug, Clone)]
pub enum PeerEvent {
    ConnectionStateChanged(ConnectionState),
    SignalingStateChanged(SignalingState),
    IceGatheringStateChanged(IceGatheringState),
    IceCandidate(IceCandidateInit),
    NegotiationNeeded,
}
