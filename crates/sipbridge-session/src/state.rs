//! In-memory state for active calls and connected browsers.

use std::collections::HashMap;
use std::sync::Arc;

use sipbridge_media::{IngressPort, RelayTrack};
use sipbridge_signaling::{BrowserTransport, SignalingSession};
use tokio::task::JoinHandle;

use crate::engine::{CallAudio, EngineCall};
use crate::types::{BrowserId, CallId, CallInfoSnapshot};

/// Registry entry for one engine call.
pub struct CallState {
    pub call_id: CallId,
    /// Opaque engine handle, only usable from a registered thread.
    pub call: Arc<dyn EngineCall>,
    /// Last lifecycle snapshot taken on the engine thread.
    pub info: CallInfoSnapshot,
    /// True once the call reached CONFIRMED with an accepted final response.
    pub connected: bool,
    /// Frame fan-in from the engine, created lazily on the first join.
    pub ingress: Option<Arc<IngressPort>>,
    /// Transmit handle held while at least one listener is attached.
    pub audio: Option<Arc<dyn CallAudio>>,
    /// Browsers currently receiving this call's audio.
    pub listeners: HashMap<BrowserId, Arc<RelayTrack>>,
}

impl CallState {
    pub fn new(call_id: CallId, call: Arc<dyn EngineCall>, info: CallInfoSnapshot) -> Self {
        Self {
            call_id,
            call,
            info,
            connected: false,
            ingress: None,
            audio: None,
            listeners: HashMap::new(),
        }
    }

    pub fn has_listener(&self, browser_id: &BrowserId) -> bool {
        self.listeners.contains_key(browser_id)
    }
}

/// Registry entry for one connected browser.
pub struct BrowserState {
    pub browser_id: BrowserId,
    pub transport: Arc<dyn BrowserTransport>,
    pub signaling: Arc<SignalingSession>,
    /// At most one call per browser at a time.
    pub current_call: Option<CallId>,
    /// Periodic transport ping, aborted when the browser is removed.
    pub keepalive: Option<JoinHandle<()>>,
}

impl BrowserState {
    pub fn new(
        browser_id: BrowserId,
        transport: Arc<dyn BrowserTransport>,
        signaling: Arc<SignalingSession>,
    ) -> Self {
        Self {
            browser_id,
            transport,
            signaling,
            current_call: None,
            keepalive: None,
        }
    }
}

impl Drop for BrowserState {
    fn drop(&mut self) {
        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
    }
}
