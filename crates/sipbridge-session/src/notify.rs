//! Notifications the bridge pushes to browsers on the `sip` channel.

use serde::{Deserialize, Serialize};

use crate::types::{CallId, CallInfoSnapshot, CallLifecycleState};

/// Type-tagged payloads for `{"channel": "sip", ...}` envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SipNotification {
    /// Registry snapshot sent to a browser on connect and on request
    CallList { calls: Vec<CallInfoSnapshot> },
    /// The browser's join completed and media is being wired up
    CallAnswered { call: CallInfoSnapshot },
    /// The call a browser was listening to ended
    CallDisconnected { call_id: CallId },
    /// Broadcast on every lifecycle transition of any call
    OnCallStatus {
        call_status: CallLifecycleState,
        call_id: CallId,
        local_uri: String,
        remote_uri: String,
    },
}

impl SipNotification {
    pub fn on_call_status(info: &CallInfoSnapshot) -> Self {
        SipNotification::OnCallStatus {
            call_status: info.state,
            call_id: info.call_id.clone(),
            local_uri: info.local_uri.clone(),
            remote_uri: info.remote_uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_call_status_wire_shape() {
        let info = CallInfoSnapshot::new("c7", CallLifecycleState::Confirmed)
            .with_uris("sip:panel@10.0.0.2", "sip:door@10.0.0.3");
        let value = serde_json::to_value(SipNotification::on_call_status(&info)).unwrap();
        assert_eq!(value["type"], "on_call_status");
        assert_eq!(value["call_status"], "CONFIRMED");
        assert_eq!(value["call_id"], "c7");
        assert_eq!(value["remote_uri"], "sip:door@10.0.0.3");
    }

    #[test]
    fn call_list_wire_shape() {
        let value = serde_json::to_value(SipNotification::CallList {
            calls: vec![CallInfoSnapshot::new("c1", CallLifecycleState::Early)],
        })
        .unwrap();
        assert_eq!(value["type"], "call_list");
        assert_eq!(value["calls"][0]["callId"], "c1");
    }
}
