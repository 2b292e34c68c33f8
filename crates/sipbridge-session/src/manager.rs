//! Central call/browser registry and join/leave orchestration.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sipbridge_media::{IngressPort, QueueRegistry, RelayConfig, RelayId, RelayTrack};
use sipbridge_signaling::{
    BrowserTransport, Envelope, PeerConnection, RtcMessage, SignalingConfig, SignalingSession,
};

use crate::dispatcher::{DispatchedEvent, EngineEventDispatcher};
use crate::engine::{EngineCall, EngineGuardProvider, ThreadRegistrar};
use crate::errors::{Result, SessionError};
use crate::events::{CallEventBus, CallEventHandler};
use crate::notify::SipNotification;
use crate::state::{BrowserState, CallState};
use crate::types::{BrowserId, CallId, CallInfoSnapshot, CallLifecycleState};

/// Manager tuning knobs.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub relay: RelayConfig,
    pub signaling: SignalingConfig,
    /// Transport ping cadence for idle browser connections
    pub keepalive_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            signaling: SignalingConfig::default(),
            keepalive_interval: Duration::from_secs(20),
        }
    }
}

struct Registry {
    calls: HashMap<CallId, CallState>,
    browsers: HashMap<BrowserId, BrowserState>,
}

/// Owns the call and browser registries and every orchestration path
/// between them.
///
/// One instance per process, constructed at startup and drained at
/// shutdown. The registry lock covers map mutation and the
/// invariant-preserving cascades only; notification and signaling I/O
/// always happen after it is released.
pub struct CallManager {
    config: ManagerConfig,
    guards: EngineGuardProvider,
    queues: Arc<QueueRegistry>,
    registry: RwLock<Registry>,
    bus: CallEventBus,
    // taken once by the event loop
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<DispatchedEvent>>>,
}

impl CallManager {
    /// Build the manager and the engine-thread dispatcher feeding it.
    pub fn new(
        registrar: Arc<dyn ThreadRegistrar>,
        config: ManagerConfig,
    ) -> (Arc<Self>, EngineEventDispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let guards = EngineGuardProvider::new(registrar);
        let dispatcher = EngineEventDispatcher::new(guards.clone(), tx);
        let manager = Arc::new(Self {
            queues: Arc::new(QueueRegistry::new(config.relay.queue_capacity)),
            config,
            guards,
            registry: RwLock::new(Registry {
                calls: HashMap::new(),
                browsers: HashMap::new(),
            }),
            bus: CallEventBus::new(),
            event_rx: Mutex::new(Some(rx)),
        });
        (manager, dispatcher)
    }

    /// Consume engine events until the dispatcher side is dropped.
    pub async fn run(&self) {
        let mut rx = match self.event_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("call manager event loop already running");
                return;
            }
        };
        info!("call manager event loop started");
        while let Some(dispatched) = rx.recv().await {
            self.apply_event(dispatched).await;
        }
        info!("call manager event loop stopped");
    }

    /// Apply one engine lifecycle event: create-or-update the call record
    /// (removal on DISCONNECTED), run subscribed handlers, then broadcast
    /// the status snapshot to every connected browser.
    pub async fn apply_event(&self, dispatched: DispatchedEvent) {
        let DispatchedEvent { call, event } = dispatched;
        let info = event.info.clone();
        let call_id = info.call_id.clone();
        debug!(
            "call lifecycle event. call_id={} state={} reason={}",
            call_id, info.state, info.last_reason
        );

        if info.state.is_terminal() {
            let detached = {
                let mut reg = self.registry.write().await;
                self.remove_call_locked(&mut reg, &call_id)
            };
            self.notify_detached(&call_id, detached).await;
        } else {
            let mut reg = self.registry.write().await;
            let connected =
                info.state == CallLifecycleState::Confirmed && info.last_reason == "Accepted";
            match reg.calls.entry(call_id.clone()) {
                Entry::Occupied(mut entry) => {
                    let state = entry.get_mut();
                    state.info = info.clone();
                    state.connected |= connected;
                }
                Entry::Vacant(entry) => {
                    info!("tracking call. call_id={} state={}", call_id, info.state);
                    let mut state = CallState::new(call_id.clone(), call, info.clone());
                    state.connected = connected;
                    entry.insert(state);
                }
            }
        }

        self.bus.dispatch(&event).await;
        self.broadcast(&SipNotification::on_call_status(&info), None)
            .await;
    }

    /// Track a call the engine has not (yet) reported through the
    /// dispatcher. Rejects an id already present.
    pub async fn add_call(
        &self,
        call: Arc<dyn EngineCall>,
        info: CallInfoSnapshot,
    ) -> Result<()> {
        let call_id = info.call_id.clone();
        let mut reg = self.registry.write().await;
        if reg.calls.contains_key(&call_id) {
            return Err(SessionError::DuplicateCall(call_id));
        }
        info!("tracking call. call_id={} state={}", call_id, info.state);
        reg.calls
            .insert(call_id.clone(), CallState::new(call_id, call, info));
        Ok(())
    }

    /// Drop a call from the registry, cascading listener detachment.
    /// No-op if the id is unknown.
    pub async fn remove_call(&self, call_id: &CallId) {
        let detached = {
            let mut reg = self.registry.write().await;
            self.remove_call_locked(&mut reg, call_id)
        };
        self.notify_detached(call_id, detached).await;
    }

    /// Register a browser connection, start its keepalive, and send it the
    /// current call list.
    pub async fn add_browser(
        &self,
        browser_id: BrowserId,
        transport: Arc<dyn BrowserTransport>,
        pc: Arc<dyn PeerConnection>,
    ) -> Result<()> {
        let signaling =
            SignalingSession::new(pc, transport.clone(), self.config.signaling.clone());
        let mut state = BrowserState::new(browser_id.clone(), transport, signaling);
        state.keepalive = Some(self.spawn_keepalive(browser_id.clone(), state.transport.clone()));

        let mut reg = self.registry.write().await;
        if reg.browsers.contains_key(&browser_id) {
            drop(reg);
            state.signaling.close().await;
            return Err(SessionError::DuplicateBrowser(browser_id));
        }
        reg.browsers.insert(browser_id.clone(), state);
        drop(reg);

        info!("browser connected. browser_id={}", browser_id);
        self.send_call_list(&browser_id).await
    }

    /// Unregister a browser, detaching it from its current call first.
    pub async fn remove_browser(&self, browser_id: &BrowserId) -> Result<()> {
        let browser = {
            let mut reg = self.registry.write().await;
            let mut browser = reg
                .browsers
                .remove(browser_id)
                .ok_or_else(|| SessionError::UnknownBrowser(browser_id.clone()))?;
            if let Some(call_id) = browser.current_call.take() {
                self.detach_listener(&mut reg.calls, browser_id, &call_id);
            }
            browser
        };
        info!("browser disconnected. browser_id={}", browser_id);
        browser.signaling.close().await;
        Ok(())
    }

    /// Attach a browser as a listener of a call.
    ///
    /// Idempotent for a browser already listening to this call. A browser
    /// in a different call is moved: detached there first, its old sender
    /// stopped, then attached here. The call's ingress port is created on
    /// the first join ever; the joining browser alone receives the
    /// `call_answered` snapshot.
    pub async fn join_call(&self, browser_id: &BrowserId, call_id: &CallId) -> Result<()> {
        let (track, signaling, transport, stored_info, moved) = {
            let mut reg = self.registry.write().await;
            let Registry { calls, browsers } = &mut *reg;
            let browser = browsers
                .get_mut(browser_id)
                .ok_or_else(|| SessionError::UnknownBrowser(browser_id.clone()))?;
            let call = calls
                .get_mut(call_id)
                .ok_or_else(|| SessionError::UnknownCall(call_id.clone()))?;

            if browser.current_call.as_ref() == Some(call_id) && call.has_listener(browser_id) {
                debug!(
                    "browser already listening. browser_id={} call_id={}",
                    browser_id, call_id
                );
                return Ok(());
            }

            // First join of this call: attach the engine-side sink before
            // touching any listener state, so a refusal leaves the
            // registry unchanged.
            if call.ingress.is_none() {
                let audio = {
                    let guard = self.guards.acquire()?;
                    call.call.audio(&guard)?
                };
                let ingress = Arc::new(IngressPort::new(call_id.as_str(), self.queues.clone()));
                audio.start_transmit(ingress.clone())?;
                debug!("created ingress port. call_id={}", call_id);
                call.ingress = Some(ingress);
                call.audio = Some(audio);
            }

            let relay_id = RelayId::new(call_id.as_str(), browser_id.as_str());
            let queue = self.queues.get_or_create(&relay_id);
            let track = Arc::new(RelayTrack::new(relay_id, queue, &self.config.relay));
            call.listeners.insert(browser_id.clone(), track.clone());

            let previous = browser.current_call.replace(call_id.clone());
            let signaling = browser.signaling.clone();
            let transport = browser.transport.clone();
            let stored_info = call.info.clone();
            let moved = match previous {
                Some(prev) if prev != *call_id => {
                    self.detach_listener(calls, browser_id, &prev);
                    true
                }
                _ => false,
            };
            (track, signaling, transport, stored_info, moved)
        };

        if moved {
            // the old call's sender goes away with the next offer cycle
            if let Err(e) = signaling.stop_sender().await {
                warn!(
                    "failed to stop previous sender. browser_id={} error={}",
                    browser_id, e
                );
            }
        }

        if let Err(e) = signaling.add_track(track).await {
            warn!(
                "track attach failed, rolling back join. browser_id={} call_id={} error={}",
                browser_id, call_id, e
            );
            let mut reg = self.registry.write().await;
            if let Some(browser) = reg.browsers.get_mut(browser_id) {
                if browser.current_call.as_ref() == Some(call_id) {
                    browser.current_call = None;
                }
            }
            self.detach_listener(&mut reg.calls, browser_id, call_id);
            return Err(e.into());
        }

        info!(
            "browser joined call. browser_id={} call_id={}",
            browser_id, call_id
        );
        let call_info = match self.call_info(call_id).await {
            Ok(info) => info,
            Err(_) => stored_info,
        };
        self.send_to(
            &transport,
            &SipNotification::CallAnswered { call: call_info },
            Some(call_id),
        )
        .await
    }

    /// Detach a browser from its current call and tell it so. The call
    /// itself keeps running; ending it is [`end_call`](Self::end_call).
    pub async fn leave_call(&self, browser_id: &BrowserId) -> Result<()> {
        let (call_id, signaling, transport) = {
            let mut reg = self.registry.write().await;
            let browser = reg
                .browsers
                .get_mut(browser_id)
                .ok_or_else(|| SessionError::UnknownBrowser(browser_id.clone()))?;
            let call_id = browser
                .current_call
                .take()
                .ok_or_else(|| SessionError::NotInCall(browser_id.clone()))?;
            let signaling = browser.signaling.clone();
            let transport = browser.transport.clone();
            self.detach_listener(&mut reg.calls, browser_id, &call_id);
            (call_id, signaling, transport)
        };
        info!(
            "browser left call. browser_id={} call_id={}",
            browser_id, call_id
        );
        if let Err(e) = signaling.stop_sender().await {
            warn!(
                "failed to stop sender. browser_id={} error={}",
                browser_id, e
            );
        }
        if let Err(e) = self
            .send_to(
                &transport,
                &SipNotification::CallDisconnected {
                    call_id: call_id.clone(),
                },
                Some(&call_id),
            )
            .await
        {
            warn!(
                "failed to send disconnect notice. browser_id={} error={}",
                browser_id, e
            );
        }
        Ok(())
    }

    /// Hang the call up at the engine. Teardown then follows the engine's
    /// DISCONNECTED event through the normal cascade.
    pub async fn end_call(&self, call_id: &CallId) -> Result<()> {
        let call = {
            let reg = self.registry.read().await;
            reg.calls
                .get(call_id)
                .ok_or_else(|| SessionError::UnknownCall(call_id.clone()))?
                .call
                .clone()
        };
        info!("hanging up call. call_id={}", call_id);
        {
            let guard = self.guards.acquire()?;
            call.hangup(&guard)?;
        }
        Ok(())
    }

    /// Hang up the call a browser is currently listening to. This is the
    /// per-connection form of [`end_call`](Self::end_call).
    pub async fn end_current_call(&self, browser_id: &BrowserId) -> Result<()> {
        let call_id = {
            let reg = self.registry.read().await;
            reg.browsers
                .get(browser_id)
                .ok_or_else(|| SessionError::UnknownBrowser(browser_id.clone()))?
                .current_call
                .clone()
                .ok_or_else(|| SessionError::NotInCall(browser_id.clone()))?
        };
        self.end_call(&call_id).await
    }

    /// Send a notification to one browser or to all of them. A failed
    /// delivery is logged and skipped; the rest still receive it.
    pub async fn broadcast(&self, notification: &SipNotification, target: Option<&BrowserId>) {
        let targets: Vec<(BrowserId, Arc<dyn BrowserTransport>)> = {
            let reg = self.registry.read().await;
            reg.browsers
                .iter()
                .filter(|(id, _)| target.map_or(true, |t| t == *id))
                .map(|(id, browser)| (id.clone(), browser.transport.clone()))
                .collect()
        };
        for (browser_id, transport) in targets {
            if let Err(e) = self.send_to(&transport, notification, None).await {
                warn!(
                    "notification delivery failed. browser_id={} error={}",
                    browser_id, e
                );
            }
        }
    }

    /// Snapshot every call and send the list to the requesting browser.
    /// Snapshots are taken live from the engine where possible, falling
    /// back to the last event's snapshot per call.
    pub async fn send_call_list(&self, browser_id: &BrowserId) -> Result<()> {
        let (transport, entries) = {
            let reg = self.registry.read().await;
            let browser = reg
                .browsers
                .get(browser_id)
                .ok_or_else(|| SessionError::UnknownBrowser(browser_id.clone()))?;
            let entries: Vec<(Arc<dyn EngineCall>, CallInfoSnapshot)> = reg
                .calls
                .values()
                .map(|call| (call.call.clone(), call.info.clone()))
                .collect();
            (browser.transport.clone(), entries)
        };
        let calls = {
            let guard = self.guards.acquire()?;
            entries
                .into_iter()
                .map(|(call, stored)| call.info(&guard).unwrap_or(stored))
                .collect::<Vec<_>>()
        };
        debug!(
            "sending call list. browser_id={} calls={}",
            browser_id,
            calls.len()
        );
        self.send_to(&transport, &SipNotification::CallList { calls }, None)
            .await
    }

    /// Route an rtc-channel message from a browser into its signaling
    /// session.
    pub async fn handle_rtc_message(
        &self,
        browser_id: &BrowserId,
        message: RtcMessage,
    ) -> Result<()> {
        let signaling = {
            let reg = self.registry.read().await;
            reg.browsers
                .get(browser_id)
                .ok_or_else(|| SessionError::UnknownBrowser(browser_id.clone()))?
                .signaling
                .clone()
        };
        match message {
            RtcMessage::Offer { sdp } => signaling.handle_offer(sdp).await?,
            RtcMessage::Answer { sdp } => signaling.handle_answer(sdp).await?,
            RtcMessage::IceCandidate { candidate } => {
                signaling.handle_ice_candidate(candidate).await?
            }
        }
        Ok(())
    }

    /// Current info for one call, live from the engine with a stale
    /// fallback to the last event snapshot.
    pub async fn call_info(&self, call_id: &CallId) -> Result<CallInfoSnapshot> {
        let (call, stored) = {
            let reg = self.registry.read().await;
            let state = reg
                .calls
                .get(call_id)
                .ok_or_else(|| SessionError::UnknownCall(call_id.clone()))?;
            (state.call.clone(), state.info.clone())
        };
        let fresh = {
            let guard = self.guards.acquire()?;
            call.info(&guard)
        };
        match fresh {
            Ok(info) => Ok(info),
            Err(e) => {
                debug!(
                    "live call info unavailable, using last snapshot. call_id={} error={}",
                    call_id, e
                );
                Ok(stored)
            }
        }
    }

    pub async fn subscribe(
        &self,
        state: CallLifecycleState,
        handler: Arc<dyn CallEventHandler>,
    ) {
        self.bus.subscribe(state, handler).await;
    }

    pub async fn subscribe_all(&self, handler: Arc<dyn CallEventHandler>) {
        self.bus.subscribe_all(handler).await;
    }

    pub async fn call_count(&self) -> usize {
        self.registry.read().await.calls.len()
    }

    pub async fn browser_count(&self) -> usize {
        self.registry.read().await.browsers.len()
    }

    pub async fn is_connected(&self, call_id: &CallId) -> bool {
        self.registry
            .read()
            .await
            .calls
            .get(call_id)
            .map_or(false, |call| call.connected)
    }

    pub async fn is_listener(&self, browser_id: &BrowserId, call_id: &CallId) -> bool {
        self.registry
            .read()
            .await
            .calls
            .get(call_id)
            .map_or(false, |call| call.has_listener(browser_id))
    }

    /// Live relay queue count, one per (call, listener) pair.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Drain both registries: stop every track and transmit path, close
    /// every signaling session.
    pub async fn shutdown(&self) {
        info!("shutting down call manager");
        let (calls, browsers) = {
            let mut reg = self.registry.write().await;
            (
                std::mem::take(&mut reg.calls),
                std::mem::take(&mut reg.browsers),
            )
        };
        for (call_id, call) in calls {
            for track in call.listeners.values() {
                track.stop();
            }
            self.queues.remove_call(call_id.as_str());
            if let Some(audio) = call.audio {
                if let Err(e) = audio.stop_transmit() {
                    warn!("failed to stop transmit. call_id={} error={}", call_id, e);
                }
            }
        }
        for browser in browsers.values() {
            browser.signaling.close().await;
        }
    }

    /// Remove `call_id` and cascade-detach its listeners while the
    /// registry is locked. Returns the signaling/transport pairs of the
    /// detached browsers for post-lock notification.
    fn remove_call_locked(
        &self,
        reg: &mut Registry,
        call_id: &CallId,
    ) -> Vec<(Arc<SignalingSession>, Arc<dyn BrowserTransport>)> {
        let Some(call) = reg.calls.remove(call_id) else {
            return Vec::new();
        };
        debug!(
            "removing call. call_id={} listeners={}",
            call_id,
            call.listeners.len()
        );
        let mut detached = Vec::new();
        for (browser_id, track) in call.listeners {
            track.stop();
            if let Some(browser) = reg.browsers.get_mut(&browser_id) {
                browser.current_call = None;
                detached.push((browser.signaling.clone(), browser.transport.clone()));
            }
        }
        self.queues.remove_call(call_id.as_str());
        if let Some(audio) = call.audio {
            if let Err(e) = audio.stop_transmit() {
                warn!("failed to stop transmit. call_id={} error={}", call_id, e);
            }
        }
        detached
    }

    /// Remove one listener from one call: stop its track, discard its
    /// queue, and release the ingress path when the last listener leaves.
    fn detach_listener(
        &self,
        calls: &mut HashMap<CallId, CallState>,
        browser_id: &BrowserId,
        call_id: &CallId,
    ) {
        let Some(call) = calls.get_mut(call_id) else {
            return;
        };
        if let Some(track) = call.listeners.remove(browser_id) {
            track.stop();
            self.queues.remove(track.relay_id());
            debug!(
                "detached listener. call_id={} browser_id={}",
                call_id, browser_id
            );
        }
        if call.listeners.is_empty() {
            if let Some(audio) = call.audio.take() {
                if let Err(e) = audio.stop_transmit() {
                    warn!("failed to stop transmit. call_id={} error={}", call_id, e);
                }
            }
            call.ingress = None;
        }
    }

    async fn notify_detached(
        &self,
        call_id: &CallId,
        detached: Vec<(Arc<SignalingSession>, Arc<dyn BrowserTransport>)>,
    ) {
        for (signaling, transport) in detached {
            if let Err(e) = signaling.stop_sender().await {
                warn!("failed to stop sender. call_id={} error={}", call_id, e);
            }
            if let Err(e) = self
                .send_to(
                    &transport,
                    &SipNotification::CallDisconnected {
                        call_id: call_id.clone(),
                    },
                    Some(call_id),
                )
                .await
            {
                warn!(
                    "failed to send disconnect notice. call_id={} error={}",
                    call_id, e
                );
            }
        }
    }

    async fn send_to(
        &self,
        transport: &Arc<dyn BrowserTransport>,
        notification: &SipNotification,
        call_id: Option<&CallId>,
    ) -> Result<()> {
        let mut envelope = Envelope::sip(notification)?;
        if let Some(id) = call_id {
            envelope = envelope.with_call_id(id.as_str());
        }
        transport.send_text(&envelope.to_json()?).await?;
        Ok(())
    }

    fn spawn_keepalive(
        &self,
        browser_id: BrowserId,
        transport: Arc<dyn BrowserTransport>,
    ) -> JoinHandle<()> {
        let period = self.config.keepalive_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = transport.ping().await {
                    warn!(
                        "keepalive ping failed, stopping. browser_id={} error={}",
                        browser_id, e
                    );
                    return;
                }
            }
        })
    }
}
