//! Core identifier and snapshot types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Call identifier, assigned by the telephony engine
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Browser connection identifier
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserId(pub String);

impl BrowserId {
    /// Fresh id for a new connection
    pub fn new() -> Self {
        Self(format!("ws-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BrowserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Call lifecycle states as the engine reports them.
///
/// A closed variant set: the bridge never invents states, it only follows
/// the engine's `Incoming → Early → Confirmed → Disconnected` progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallLifecycleState {
    Incoming,
    Early,
    Confirmed,
    Disconnected,
}

impl CallLifecycleState {
    /// Disconnected is terminal; the call leaves the registry there.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallLifecycleState::Disconnected)
    }
}

impl fmt::Display for CallLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallLifecycleState::Incoming => "INCOMING",
            CallLifecycleState::Early => "EARLY",
            CallLifecycleState::Confirmed => "CONFIRMED",
            CallLifecycleState::Disconnected => "DISCONNECTED",
        };
        f.write_str(s)
    }
}

/// Who originated the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Fixed per-event call snapshot.
///
/// Every lifecycle event carries one of these; handlers receive typed
/// fields instead of reaching back into the engine object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInfoSnapshot {
    pub call_id: CallId,
    pub state: CallLifecycleState,
    /// Engine reason text for the last transition ("Ringing", "Accepted", ...)
    pub last_reason: String,
    pub local_uri: String,
    pub remote_uri: String,
    pub direction: CallDirection,
    /// Seconds the call has been connected
    pub connected_duration: f64,
    /// Seconds since the call was created
    pub total_duration: f64,
    /// Remote audio stream count
    pub remote_audio_count: u32,
}

impl CallInfoSnapshot {
    /// Minimal snapshot for a call in a given state; the engine fills in
    /// the rest as events arrive.
    pub fn new(call_id: impl Into<CallId>, state: CallLifecycleState) -> Self {
        Self {
            call_id: call_id.into(),
            state,
            last_reason: String::new(),
            local_uri: String::new(),
            remote_uri: String::new(),
            direction: CallDirection::Inbound,
            connected_duration: 0.0,
            total_duration: 0.0,
            remote_audio_count: 0,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.last_reason = reason.into();
        self
    }

    pub fn with_direction(mut self, direction: CallDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_uris(
        mut self,
        local_uri: impl Into<String>,
        remote_uri: impl Into<String>,
    ) -> Self {
        self.local_uri = local_uri.into();
        self.remote_uri = remote_uri.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_terminality() {
        assert!(!CallLifecycleState::Incoming.is_terminal());
        assert!(!CallLifecycleState::Early.is_terminal());
        assert!(!CallLifecycleState::Confirmed.is_terminal());
        assert!(CallLifecycleState::Disconnected.is_terminal());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = CallInfoSnapshot::new("c1", CallLifecycleState::Confirmed)
            .with_reason("Accepted")
            .with_uris("sip:panel@10.0.0.2", "sip:door@10.0.0.3");
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["callId"], "c1");
        assert_eq!(value["state"], "CONFIRMED");
        assert_eq!(value["lastReason"], "Accepted");
        assert_eq!(value["remoteUri"], "sip:door@10.0.0.3");
    }
}
