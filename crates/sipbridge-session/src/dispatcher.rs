//! Engine-thread event intake.
//!
//! The telephony engine invokes [`EngineEventDispatcher::on_call_state`]
//! from its own callback thread. Everything done here must be quick and
//! must never block: snapshot the call, apply the auto-respond policy
//! while still on the registered thread, and hand the event off to the
//! manager's async loop over an unbounded channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{AnswerCode, EngineCall, EngineGuardProvider};
use crate::errors::Result;
use crate::events::CallEvent;
use crate::types::{CallDirection, CallLifecycleState};

/// One lifecycle event, snapshotted on the engine thread, crossing into
/// the async runtime together with the engine handle it concerns.
pub struct DispatchedEvent {
    pub call: Arc<dyn EngineCall>,
    pub event: CallEvent,
}

/// Sits on the engine callback thread side of the bridge.
pub struct EngineEventDispatcher {
    guards: EngineGuardProvider,
    tx: mpsc::UnboundedSender<DispatchedEvent>,
}

impl EngineEventDispatcher {
    pub fn new(guards: EngineGuardProvider, tx: mpsc::UnboundedSender<DispatchedEvent>) -> Self {
        Self { guards, tx }
    }

    /// Engine callback: a call changed lifecycle state.
    ///
    /// Auto-respond happens here, synchronously, because answering needs
    /// the thread capability and must not wait for the async loop:
    /// a fresh INCOMING call gets a provisional ringing response, and an
    /// inbound call reaching EARLY with the engine reporting "Ringing"
    /// gets accepted.
    pub fn on_call_state(&self, call: Arc<dyn EngineCall>) -> Result<()> {
        let guard = self.guards.acquire()?;
        let info = call.info(&guard)?;

        match info.state {
            CallLifecycleState::Incoming => {
                debug!("auto-answering with ringing. call_id={}", info.call_id);
                call.answer(AnswerCode::Ringing, &guard)?;
            }
            CallLifecycleState::Early
                if info.last_reason == "Ringing" && info.direction == CallDirection::Inbound =>
            {
                debug!("auto-accepting inbound call. call_id={}", info.call_id);
                call.answer(AnswerCode::Accepted, &guard)?;
            }
            _ => {}
        }

        let event = CallEvent::new(info);
        if self
            .tx
            .send(DispatchedEvent { call, event })
            .is_err()
        {
            warn!("call event dropped, manager loop has shut down");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CallAudio, EngineThreadGuard, ThreadRegistrar};
    use crate::errors::SessionError;
    use crate::types::CallInfoSnapshot;
    use parking_lot::Mutex;

    struct NoopRegistrar;

    impl ThreadRegistrar for NoopRegistrar {
        fn register_current_thread(&self, _name: &str) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    struct ScriptedCall {
        info: CallInfoSnapshot,
        answers: Mutex<Vec<AnswerCode>>,
    }

    impl ScriptedCall {
        fn new(info: CallInfoSnapshot) -> Arc<Self> {
            Arc::new(Self {
                info,
                answers: Mutex::new(Vec::new()),
            })
        }
    }

    impl EngineCall for ScriptedCall {
        fn info(&self, _guard: &EngineThreadGuard) -> Result<CallInfoSnapshot> {
            Ok(self.info.clone())
        }

        fn answer(&self, code: AnswerCode, _guard: &EngineThreadGuard) -> Result<()> {
            self.answers.lock().push(code);
            Ok(())
        }

        fn hangup(&self, _guard: &EngineThreadGuard) -> Result<()> {
            Ok(())
        }

        fn audio(&self, _guard: &EngineThreadGuard) -> Result<Arc<dyn CallAudio>> {
            Err(SessionError::Engine("no media".into()))
        }
    }

    fn dispatcher() -> (EngineEventDispatcher, mpsc::UnboundedReceiver<DispatchedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EngineEventDispatcher::new(EngineGuardProvider::new(Arc::new(NoopRegistrar)), tx),
            rx,
        )
    }

    #[test]
    fn incoming_gets_provisional_ringing() {
        let (dispatcher, mut rx) = dispatcher();
        let call = ScriptedCall::new(CallInfoSnapshot::new("c1", CallLifecycleState::Incoming));

        dispatcher.on_call_state(call.clone()).unwrap();

        assert_eq!(*call.answers.lock(), vec![AnswerCode::Ringing]);
        let dispatched = rx.try_recv().unwrap();
        assert_eq!(dispatched.event.kind(), CallLifecycleState::Incoming);
    }

    #[test]
    fn inbound_early_ringing_gets_accepted() {
        let (dispatcher, _rx) = dispatcher();
        let call = ScriptedCall::new(
            CallInfoSnapshot::new("c1", CallLifecycleState::Early).with_reason("Ringing"),
        );

        dispatcher.on_call_state(call.clone()).unwrap();

        assert_eq!(*call.answers.lock(), vec![AnswerCode::Accepted]);
    }

    #[test]
    fn outbound_early_is_left_alone() {
        let (dispatcher, mut rx) = dispatcher();
        let call = ScriptedCall::new(
            CallInfoSnapshot::new("c1", CallLifecycleState::Early)
                .with_reason("Ringing")
                .with_direction(CallDirection::Outbound),
        );

        dispatcher.on_call_state(call.clone()).unwrap();

        assert!(call.answers.lock().is_empty());
        // the event is still forwarded, only the answer is withheld
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn early_without_ringing_reason_is_not_accepted() {
        let (dispatcher, _rx) = dispatcher();
        let call = ScriptedCall::new(
            CallInfoSnapshot::new("c1", CallLifecycleState::Early).with_reason("Session Progress"),
        );

        dispatcher.on_call_state(call.clone()).unwrap();

        assert!(call.answers.lock().is_empty());
    }
}
