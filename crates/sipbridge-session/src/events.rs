//! Lifecycle events and their subscription bus.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{CallInfoSnapshot, CallLifecycleState};

/// One call lifecycle transition as observed by the dispatcher.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub info: CallInfoSnapshot,
    pub at: DateTime<Utc>,
}

impl CallEvent {
    pub fn new(info: CallInfoSnapshot) -> Self {
        Self {
            info,
            at: Utc::now(),
        }
    }

    pub fn kind(&self) -> CallLifecycleState {
        self.info.state
    }
}

/// Handler invoked from the manager's event loop.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    async fn on_call_event(&self, event: &CallEvent);
}

struct Subscription {
    /// `None` subscribes to every variant
    filter: Option<CallLifecycleState>,
    handler: Arc<dyn CallEventHandler>,
}

/// Tagged-event subscription over the closed lifecycle variant set.
///
/// Handlers register for one variant or for all of them; dispatch is an
/// exhaustive enum match rather than comparison against engine state text.
pub struct CallEventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl CallEventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to one lifecycle variant.
    pub async fn subscribe(&self, state: CallLifecycleState, handler: Arc<dyn CallEventHandler>) {
        self.subscriptions.write().await.push(Subscription {
            filter: Some(state),
            handler,
        });
    }

    /// Subscribe to every lifecycle variant.
    pub async fn subscribe_all(&self, handler: Arc<dyn CallEventHandler>) {
        self.subscriptions.write().await.push(Subscription {
            filter: None,
            handler,
        });
    }

    /// Deliver `event` to every matching subscriber, in subscription order.
    pub async fn dispatch(&self, event: &CallEvent) {
        let subscriptions = self.subscriptions.read().await;
        let mut delivered = 0usize;
        for subscription in subscriptions.iter() {
            let matches = match subscription.filter {
                None => true,
                Some(state) => state == event.kind(),
            };
            if matches {
                subscription.handler.on_call_event(event).await;
                delivered += 1;
            }
        }
        debug!(
            "dispatched call event. call_id={} state={} subscribers={}",
            event.info.call_id,
            event.kind(),
            delivered
        );
    }
}
