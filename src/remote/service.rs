use anyhow::Result;
use tokio::sync::mpsc;

use super::messages::{OpenRequest, ServiceEvent};
use crate::audio::OutboundFrame;

/// The remote conversational speech service.
///
/// The concrete transport (managed duplex stream) is supplied by the
/// embedding application; this crate only depends on the session contract.
#[async_trait::async_trait]
pub trait SpeechService: Send + Sync {
    /// Open a bidirectional session.
    ///
    /// Events are delivered on `events` in arrival order, starting with
    /// `ServiceEvent::Opened` once the handshake completes. A rejected open
    /// returns an error instead.
    async fn open(
        &self,
        request: &OpenRequest,
        events: mpsc::Sender<ServiceEvent>,
    ) -> Result<Box<dyn SpeechSession>>;
}

/// One open session on the remote service
#[async_trait::async_trait]
pub trait SpeechSession: Send + Sync {
    /// Stream one captured audio frame to the service (best-effort)
    async fn send_audio(&self, frame: &OutboundFrame) -> Result<()>;

    /// Send an out-of-band text hint (e.g. the priming message that makes
    /// the agent speak first)
    async fn send_text_hint(&self, text: &str) -> Result<()>;

    /// Cleanly close the session
    async fn close(&self) -> Result<()>;
}
