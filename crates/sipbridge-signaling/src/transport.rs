//! The outbound browser transport seam.

use async_trait::async_trait;

use crate::error::Result;

/// One browser's outbound message channel (a websocket in practice).
///
/// The bridge only ever writes: envelopes via `send_text` and periodic
/// `ping`s so an idle transport's timeout fires keepalives instead of
/// teardown.
#[async_trait]
pub trait BrowserTransport: Send + Sync {
    /// Deliver one serialized envelope to the browser.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Keepalive for idle connections.
    async fn ping(&self) -> Result<()>;

    /// Remote address for logs, when the transport knows it.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}
