//! Outbound message envelopes.
//!
//! Everything sent to a browser is one JSON envelope
//! `{"channel": "sip"|"rtc", "message": {...}}`; the message payload is a
//! type-tagged object.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::peer::IceCandidateInit;

/// Which subsystem a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Call lifecycle and registry notifications
    Sip,
    /// Offer/answer and ICE exchange
    Rtc,
}

/// The one wire envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: Channel,
    pub message: serde_json::Value,
    #[serde(rename = "callId", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl Envelope {
    pub fn new(channel: Channel, message: &impl Serialize) -> Result<Self> {
        Ok(Self {
            channel,
            message: serde_json::to_value(message)?,
            call_id: None,
        })
    }

    pub fn sip(message: &impl Serialize) -> Result<Self> {
        Self::new(Channel::Sip, message)
    }

    pub fn rtc(message: &impl Serialize) -> Result<Self> {
        Self::new(Channel::Rtc, message)
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages on the `rtc` channel, both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RtcMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: IceCandidateInit },
}
