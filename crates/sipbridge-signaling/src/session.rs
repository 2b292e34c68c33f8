//! Per-browser negotiation lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sipbridge_media::RelayTrack;

use crate::error::Result;
use crate::messages::{Envelope, RtcMessage};
use crate::peer::{
    ConnectionState, IceCandidateInit, MediaKind, PeerConnection, PeerEvent, SessionDescription,
    SignalingState,
};
use crate::transport::BrowserTransport;

/// Negotiation tuning knobs.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// How often the pending-renegotiation flag is polled
    pub negotiation_poll_interval: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            negotiation_poll_interval: Duration::from_millis(200),
        }
    }
}

/// Orchestrates one browser's PeerConnection.
///
/// Two independent flags drive everything:
///
/// - `ready_to_transmit` — derived on every connection or signaling state
///   change: connected, stable, and at least one live outbound audio
///   sender.
/// - `negotiation_needed` — set whenever tracks are added or removed. A
///   fixed-interval poll task runs one offer cycle per pending need while
///   the connection is active, so several track changes batch into a
///   single renegotiation.
///
/// `add_track` is the exception: attaching a track kicks off a cycle
/// immediately so a joining browser hears audio without waiting out a poll
/// tick.
pub struct SignalingSession {
    id: String,
    pc: Arc<dyn PeerConnection>,
    transport: Arc<dyn BrowserTransport>,
    ready_to_transmit: AtomicBool,
    negotiation_needed: AtomicBool,
    closed: AtomicBool,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingSession {
    /// Create the session and start its negotiation poll task.
    pub fn new(
        pc: Arc<dyn PeerConnection>,
        transport: Arc<dyn BrowserTransport>,
        config: SignalingConfig,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            id: format!("rtc-{}", uuid::Uuid::new_v4()),
            pc,
            transport,
            ready_to_transmit: AtomicBool::new(false),
            negotiation_needed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            poll_task: Mutex::new(None),
        });
        debug!("initialising signaling session. id={}", session.id);

        let poller = session.clone();
        let handle = tokio::spawn(async move {
            poller.poll_loop(config.negotiation_poll_interval).await;
        });
        *session.poll_task.lock() = Some(handle);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ready_to_transmit(&self) -> bool {
        self.ready_to_transmit.load(Ordering::Acquire)
    }

    pub fn negotiation_pending(&self) -> bool {
        self.negotiation_needed.load(Ordering::Acquire)
    }

    /// Attach an outbound audio track and renegotiate immediately.
    pub async fn add_track(&self, track: Arc<RelayTrack>) -> Result<String> {
        let sender_id = self.pc.add_track(track).await?;
        debug!(
            "added track to peer connection. session={} sender={}",
            self.id, sender_id
        );
        self.renegotiate().await?;
        Ok(sender_id)
    }

    /// Stop every live outbound audio sender and mark negotiation needed,
    /// batching with any other pending track changes instead of
    /// renegotiating synchronously.
    pub async fn stop_sender(&self) -> Result<()> {
        for sender in self.pc.senders().await {
            if sender.kind == MediaKind::Audio && sender.live {
                debug!(
                    "stopping audio sender. session={} sender={}",
                    self.id, sender.id
                );
                self.pc.stop_sender(&sender.id).await?;
            }
        }
        self.negotiation_needed.store(true, Ordering::Release);
        self.refresh_ready().await;
        Ok(())
    }

    /// Feed one engine event into the session.
    pub async fn handle_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::ConnectionStateChanged(state) => {
                debug!("connection state change. session={} state={}", self.id, state);
                self.refresh_ready().await;
            }
            PeerEvent::SignalingStateChanged(state) => {
                debug!("signaling state change. session={} state={}", self.id, state);
                self.refresh_ready().await;
            }
            PeerEvent::IceGatheringStateChanged(state) => {
                debug!("ice gathering state change. session={} state={:?}", self.id, state);
            }
            PeerEvent::IceCandidate(candidate) => {
                // best effort: trickle our candidate to the browser
                if let Err(e) = self
                    .send_rtc(&RtcMessage::IceCandidate { candidate })
                    .await
                {
                    warn!("failed to send ice candidate. session={} error={}", self.id, e);
                }
            }
            PeerEvent::NegotiationNeeded => {
                self.negotiation_needed.store(true, Ordering::Release);
            }
        }
    }

    /// Browser-initiated offer: answer it.
    pub async fn handle_offer(&self, sdp: String) -> Result<()> {
        debug!("processing browser offer. session={}", self.id);
        self.pc
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        let answer = self.pc.create_answer().await?;
        self.pc.set_local_description(answer.clone()).await?;
        self.send_rtc(&RtcMessage::Answer { sdp: answer.sdp }).await
    }

    /// Browser's answer to an offer of ours.
    pub async fn handle_answer(&self, sdp: String) -> Result<()> {
        debug!("processing browser answer. session={}", self.id);
        self.pc
            .set_remote_description(SessionDescription::answer(sdp))
            .await
    }

    /// Browser-trickled ICE candidate.
    pub async fn handle_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        debug!("adding ice candidate. session={}", self.id);
        self.pc.add_ice_candidate(candidate).await
    }

    /// One offer cycle: create, set local, send to the browser.
    pub async fn renegotiate(&self) -> Result<()> {
        let offer = self.pc.create_offer().await?;
        self.pc.set_local_description(offer.clone()).await?;
        debug!("sending offer to browser. session={}", self.id);
        self.send_rtc(&RtcMessage::Offer { sdp: offer.sdp }).await
    }

    /// Stop the poll task and close the peer connection.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing signaling session. id={}", self.id);
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
        }
        self.ready_to_transmit.store(false, Ordering::Release);
        if let Err(e) = self.pc.close().await {
            warn!("error closing peer connection. session={} error={}", self.id, e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn poll_loop(&self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.is_closed() || !self.pc.connection_state().is_active() {
                debug!("negotiation poll loop exiting. session={}", self.id);
                return;
            }
            // exactly one cycle per pending need
            if self.negotiation_needed.swap(false, Ordering::AcqRel) {
                if let Err(e) = self.renegotiate().await {
                    warn!(
                        "renegotiation failed. session={} error={}",
                        self.id, e
                    );
                }
            }
        }
    }

    async fn refresh_ready(&self) {
        let live_audio = self
            .pc
            .senders()
            .await
            .iter()
            .filter(|s| s.kind == MediaKind::Audio && s.live)
            .count();
        let ready = self.pc.connection_state() == ConnectionState::Connected
            && self.pc.signaling_state() == SignalingState::Stable
            && live_audio > 0;
        let was = self.ready_to_transmit.swap(ready, Ordering::AcqRel);
        if was != ready {
            debug!(
                "ready_to_transmit={} session={} connection_state={} signaling_state={} live_audio_senders={}",
                ready,
                self.id,
                self.pc.connection_state(),
                self.pc.signaling_state(),
                live_audio
            );
        }
    }

    async fn send_rtc(&self, message: &RtcMessage) -> Result<()> {
        let text = Envelope::rtc(message)?.to_json()?;
        self.transport.send_text(&text).await
    }
}
