//! Shared mocks for the session integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sipbridge_session::{
    AnswerCode, AudioSink, BrowserId, CallAudio, CallId, CallInfoSnapshot, CallManager,
    EngineCall, EngineThreadGuard, ManagerConfig, Result, SessionError, ThreadRegistrar,
};
use sipbridge_signaling::{
    BrowserTransport, ConnectionState, IceCandidateInit, MediaKind, PeerConnection,
    SenderInfo, SessionDescription, SignalingError, SignalingState,
};

pub struct MockRegistrar {
    pub registrations: AtomicU64,
}

impl Default for MockRegistrar {
    fn default() -> Self {
        Self {
            registrations: AtomicU64::new(0),
        }
    }
}

impl ThreadRegistrar for MockRegistrar {
    fn register_current_thread(&self, _name: &str) -> std::result::Result<(), String> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records what the bridge sends; can be flipped into a failing state.
pub struct MockTransport {
    pub sent: Mutex<Vec<String>>,
    pub pings: AtomicU64,
    pub fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            pings: AtomicU64::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Message type tags of every sent envelope, in order.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|text| {
                let value: serde_json::Value = serde_json::from_str(text).ok()?;
                Some(value["message"]["type"].as_str()?.to_string())
            })
            .collect()
    }

    pub fn count_of(&self, message_type: &str) -> usize {
        self.sent_types()
            .iter()
            .filter(|t| *t == message_type)
            .count()
    }

    /// Parsed envelopes of one message type.
    pub fn envelopes_of(&self, message_type: &str) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["message"]["type"] == message_type)
            .collect()
    }
}

#[async_trait]
impl BrowserTransport for MockTransport {
    async fn send_text(&self, text: &str) -> sipbridge_signaling::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SignalingError::Transport("send refused".into()));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn ping(&self) -> sipbridge_signaling::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SignalingError::Transport("ping refused".into()));
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Browser media engine stub with settable states and recorded senders.
pub struct MockPeer {
    pub connection: Mutex<ConnectionState>,
    pub signaling: Mutex<SignalingState>,
    pub sender_list: Mutex<Vec<SenderInfo>>,
    pub offers: AtomicU64,
    pub closed: AtomicBool,
    pub fail_add_track: AtomicBool,
    next_sender: AtomicU64,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidateInit>>,
}

impl MockPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connection: Mutex::new(ConnectionState::Connected),
            signaling: Mutex::new(SignalingState::Stable),
            sender_list: Mutex::new(Vec::new()),
            offers: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            fail_add_track: AtomicBool::new(false),
            next_sender: AtomicU64::new(0),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
        })
    }

    pub fn live_audio_senders(&self) -> usize {
        self.sender_list
            .lock()
            .iter()
            .filter(|s| s.kind == MediaKind::Audio && s.live)
            .count()
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_offer(&self) -> sipbridge_signaling::Result<SessionDescription> {
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("v=0 offer-{}", n)))
    }

    async fn create_answer(&self) -> sipbridge_signaling::Result<SessionDescription> {
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> sipbridge_signaling::Result<()> {
        *self.local.lock() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> sipbridge_signaling::Result<()> {
        *self.remote.lock() = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn add_track(
        &self,
        _track: Arc<sipbridge_media::RelayTrack>,
    ) -> sipbridge_signaling::Result<String> {
        if self.fail_add_track.load(Ordering::SeqCst) {
            return Err(SignalingError::Peer("addTrack rejected".into()));
        }
        let id = format!("sender-{}", self.next_sender.fetch_add(1, Ordering::SeqCst));
        self.sender_list.lock().push(SenderInfo {
            id: id.clone(),
            kind: MediaKind::Audio,
            live: true,
        });
        Ok(id)
    }

    async fn stop_sender(&self, sender_id: &str) -> sipbridge_signaling::Result<()> {
        for sender in self.sender_list.lock().iter_mut() {
            if sender.id == sender_id {
                sender.live = false;
            }
        }
        Ok(())
    }

    async fn senders(&self) -> Vec<SenderInfo> {
        self.sender_list.lock().clone()
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidateInit,
    ) -> sipbridge_signaling::Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        *self.connection.lock()
    }

    fn signaling_state(&self) -> SignalingState {
        *self.signaling.lock()
    }

    async fn close(&self) -> sipbridge_signaling::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        *self.connection.lock() = ConnectionState::Closed;
        Ok(())
    }
}

/// Call audio handle holding the attached sink so tests can feed frames
/// through it like the engine would.
pub struct MockCallAudio {
    sink: Mutex<Option<Arc<dyn AudioSink>>>,
    pub started: AtomicU64,
    pub stopped: AtomicU64,
}

impl MockCallAudio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(None),
            started: AtomicU64::new(0),
            stopped: AtomicU64::new(0),
        })
    }

    /// Deliver one frame to the attached sink, if any.
    pub fn deliver(&self, samples: &[i16]) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_frame(samples);
        }
    }
}

impl CallAudio for MockCallAudio {
    fn start_transmit(&self, sink: Arc<dyn AudioSink>) -> Result<()> {
        *self.sink.lock() = Some(sink);
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_transmit(&self) -> Result<()> {
        self.sink.lock().take();
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine call handle with a mutable info snapshot.
pub struct MockEngineCall {
    pub current_info: Mutex<CallInfoSnapshot>,
    pub answers: Mutex<Vec<AnswerCode>>,
    pub hangups: AtomicU64,
    pub media: Arc<MockCallAudio>,
    pub refuse_info: AtomicBool,
}

impl MockEngineCall {
    pub fn new(info: CallInfoSnapshot) -> Arc<Self> {
        Arc::new(Self {
            current_info: Mutex::new(info),
            answers: Mutex::new(Vec::new()),
            hangups: AtomicU64::new(0),
            media: MockCallAudio::new(),
            refuse_info: AtomicBool::new(false),
        })
    }

    pub fn set_info(&self, info: CallInfoSnapshot) {
        *self.current_info.lock() = info;
    }
}

impl EngineCall for MockEngineCall {
    fn info(&self, _guard: &EngineThreadGuard) -> Result<CallInfoSnapshot> {
        if self.refuse_info.load(Ordering::SeqCst) {
            return Err(SessionError::Engine("call gone".into()));
        }
        Ok(self.current_info.lock().clone())
    }

    fn answer(&self, code: AnswerCode, _guard: &EngineThreadGuard) -> Result<()> {
        self.answers.lock().push(code);
        Ok(())
    }

    fn hangup(&self, _guard: &EngineThreadGuard) -> Result<()> {
        self.hangups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn audio(&self, _guard: &EngineThreadGuard) -> Result<Arc<dyn CallAudio>> {
        Ok(self.media.clone())
    }
}

pub fn new_manager() -> (
    Arc<CallManager>,
    sipbridge_session::EngineEventDispatcher,
) {
    CallManager::new(Arc::new(MockRegistrar::default()), ManagerConfig::default())
}

/// Register a browser with fresh transport and peer mocks.
pub async fn connect_browser(
    manager: &CallManager,
    id: &str,
) -> (BrowserId, Arc<MockTransport>, Arc<MockPeer>) {
    let browser_id = BrowserId::from(id);
    let transport = MockTransport::new();
    let peer = MockPeer::new();
    manager
        .add_browser(browser_id.clone(), transport.clone(), peer.clone())
        .await
        .unwrap();
    (browser_id, transport, peer)
}

/// Track a call directly in the registry, bypassing the dispatcher.
pub async fn track_call(
    manager: &CallManager,
    id: &str,
) -> (CallId, Arc<MockEngineCall>) {
    use sipbridge_session::CallLifecycleState;
    let call_id = CallId::from(id);
    let info = CallInfoSnapshot::new(id, CallLifecycleState::Confirmed)
        .with_reason("Accepted")
        .with_uris("sip:bridge@10.0.0.2", "sip:door@10.0.0.3");
    let call = MockEngineCall::new(info.clone());
    manager.add_call(call.clone(), info).await.unwrap();
    (call_id, call)
}
