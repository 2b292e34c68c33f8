//! End-to-end demo with an in-process fake engine and browser.
//!
//! A scripted "engine" thread walks one inbound call through its
//! lifecycle and streams tone frames; a fake browser joins, receives the
//! paced track and prints every envelope the bridge sends it.
//!
//! Run with: `cargo run --example bridge_demo`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use sipbridge_media::RelayTrack;
use sipbridge_session::{
    AnswerCode, AudioSink, BrowserId, CallAudio, CallDirection, CallId, CallInfoSnapshot,
    CallLifecycleState, CallManager, EngineCall, EngineThreadGuard, ManagerConfig, Result,
    ThreadRegistrar,
};
use sipbridge_signaling::{
    BrowserTransport, ConnectionState, IceCandidateInit, PeerConnection, SenderInfo,
    SessionDescription, SignalingState,
};

struct DemoRegistrar;

impl ThreadRegistrar for DemoRegistrar {
    fn register_current_thread(&self, name: &str) -> std::result::Result<(), String> {
        info!("engine registered thread: {}", name);
        Ok(())
    }
}

struct DemoAudio {
    sink: Mutex<Option<Arc<dyn AudioSink>>>,
}

impl DemoAudio {
    fn deliver(&self, samples: &[i16]) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_frame(samples);
        }
    }
}

impl CallAudio for DemoAudio {
    fn start_transmit(&self, sink: Arc<dyn AudioSink>) -> Result<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop_transmit(&self) -> Result<()> {
        self.sink.lock().take();
        Ok(())
    }
}

struct DemoCall {
    info: Mutex<CallInfoSnapshot>,
    audio: Arc<DemoAudio>,
}

impl DemoCall {
    fn set_state(&self, state: CallLifecycleState, reason: &str) {
        let mut info = self.info.lock();
        info.state = state;
        info.last_reason = reason.to_string();
    }
}

impl EngineCall for DemoCall {
    fn info(&self, _guard: &EngineThreadGuard) -> Result<CallInfoSnapshot> {
        Ok(self.info.lock().clone())
    }

    fn answer(&self, code: AnswerCode, _guard: &EngineThreadGuard) -> Result<()> {
        info!("engine: answering with {:?}", code);
        Ok(())
    }

    fn hangup(&self, _guard: &EngineThreadGuard) -> Result<()> {
        info!("engine: hangup requested");
        Ok(())
    }

    fn audio(&self, _guard: &EngineThreadGuard) -> Result<Arc<dyn CallAudio>> {
        Ok(self.audio.clone())
    }
}

struct DemoTransport;

#[async_trait]
impl BrowserTransport for DemoTransport {
    async fn send_text(&self, text: &str) -> sipbridge_signaling::Result<()> {
        info!("-> browser: {}", text);
        Ok(())
    }

    async fn ping(&self) -> sipbridge_signaling::Result<()> {
        Ok(())
    }
}

/// Accepts the offered track and consumes it at the paced cadence.
struct DemoPeer {
    senders: Mutex<Vec<SenderInfo>>,
    next_sender: AtomicU64,
}

#[async_trait]
impl PeerConnection for DemoPeer {
    async fn create_offer(&self) -> sipbridge_signaling::Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0 demo-offer"))
    }

    async fn create_answer(&self) -> sipbridge_signaling::Result<SessionDescription> {
        Ok(SessionDescription::answer("v=0 demo-answer"))
    }

    async fn set_local_description(
        &self,
        _desc: SessionDescription,
    ) -> sipbridge_signaling::Result<()> {
        Ok(())
    }

    async fn set_remote_description(
        &self,
        _desc: SessionDescription,
    ) -> sipbridge_signaling::Result<()> {
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        None
    }

    async fn add_track(&self, track: Arc<RelayTrack>) -> sipbridge_signaling::Result<String> {
        tokio::spawn(async move {
            let mut total = 0u64;
            let mut synthetic = 0u64;
            while let Some(frame) = track.next_frame().await {
                total += 1;
                if frame.synthetic {
                    synthetic += 1;
                }
            }
            info!(
                "browser track ended. frames={} synthetic={}",
                total, synthetic
            );
        });
        let id = format!("sender-{}", self.next_sender.fetch_add(1, Ordering::SeqCst));
        self.senders.lock().push(SenderInfo {
            id: id.clone(),
            kind: sipbridge_signaling::MediaKind::Audio,
            live: true,
        });
        Ok(id)
    }

    async fn stop_sender(&self, sender_id: &str) -> sipbridge_signaling::Result<()> {
        for sender in self.senders.lock().iter_mut() {
            if sender.id == sender_id {
                sender.live = false;
            }
        }
        Ok(())
    }

    async fn senders(&self) -> Vec<SenderInfo> {
        self.senders.lock().clone()
    }

    async fn add_ice_candidate(
        &self,
        _candidate: IceCandidateInit,
    ) -> sipbridge_signaling::Result<()> {
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn signaling_state(&self) -> SignalingState {
        SignalingState::Stable
    }

    async fn close(&self) -> sipbridge_signaling::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| "info,sipbridge_session=debug,sipbridge_media=debug".into(),
        ))
        .init();

    let (manager, dispatcher) = CallManager::new(Arc::new(DemoRegistrar), ManagerConfig::default());
    let loop_manager = manager.clone();
    tokio::spawn(async move { loop_manager.run().await });

    let call = Arc::new(DemoCall {
        info: Mutex::new(
            CallInfoSnapshot::new("demo-1", CallLifecycleState::Incoming)
                .with_direction(CallDirection::Inbound)
                .with_uris("sip:bridge@10.0.0.2", "sip:door@10.0.0.3"),
        ),
        audio: Arc::new(DemoAudio {
            sink: Mutex::new(None),
        }),
    });

    // the engine's callback thread
    let engine_call = call.clone();
    let engine = std::thread::spawn(move || {
        dispatcher.on_call_state(engine_call.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        engine_call.set_state(CallLifecycleState::Early, "Ringing");
        dispatcher.on_call_state(engine_call.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        engine_call.set_state(CallLifecycleState::Confirmed, "Accepted");
        dispatcher.on_call_state(engine_call.clone()).unwrap();

        // stream one second of tone frames at the 20 ms cadence
        let tone: Vec<i16> = (0..160).map(|i| ((i % 16) * 1000) as i16).collect();
        for _ in 0..50 {
            engine_call.audio.deliver(&tone);
            std::thread::sleep(Duration::from_millis(20));
        }

        engine_call.set_state(CallLifecycleState::Disconnected, "Normal call clearing");
        dispatcher.on_call_state(engine_call).unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let browser_id = BrowserId::new();
    manager
        .add_browser(browser_id.clone(), Arc::new(DemoTransport), Arc::new(DemoPeer {
            senders: Mutex::new(Vec::new()),
            next_sender: AtomicU64::new(0),
        }))
        .await
        .unwrap();

    // wait for the call to confirm, then listen in
    tokio::time::sleep(Duration::from_millis(250)).await;
    manager
        .join_call(&browser_id, &CallId::from("demo-1"))
        .await
        .unwrap();

    let _ = tokio::task::spawn_blocking(move || engine.join()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.shutdown().await;
    info!("demo finished");
}
