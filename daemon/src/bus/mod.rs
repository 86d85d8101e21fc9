pub mod client;
pub mod hub;
pub mod local;

pub use client::HubBus;
pub use hub::HubServer;
pub use local::{LocalBus, LocalHub};

use shared::{EnvelopeError, ExtensionNotification, HubMessage, NewContextRequest, RecognizedCommand};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

/// Publish/subscribe transport shared by every modality.
///
/// Delivery is at-most-once: `publish` hands the message to the transport
/// and returns, with no retry and no delivery acknowledgement.
pub trait CommandBus: Send + Sync {
    fn session(&self) -> &NewContextRequest;

    fn publish(&self, command: &RecognizedCommand) -> Result<(), BusError>;

    fn subscribe(&self) -> broadcast::Receiver<ExtensionNotification>;
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Hub rejected session '{0}'")]
    Rejected(String),

    #[error("Hub closed the connection before acknowledging session '{0}'")]
    HandshakeClosed(String),

    #[error("Unexpected message during handshake: {0}")]
    UnexpectedMessage(String),

    #[error("Bus session is closed")]
    Closed,
}

/// How modalities reach the routing hub.
#[derive(Clone)]
pub enum Connector {
    Tcp { address: String, capacity: usize },
    InProcess(LocalHub),
}

impl Connector {
    /// Perform the session handshake. There is no timeout and no retry.
    pub async fn open(&self, session: NewContextRequest) -> Result<Arc<dyn CommandBus>, BusError> {
        match self {
            Self::Tcp { address, capacity } => {
                let bus = HubBus::connect(address, session, *capacity).await?;
                Ok(Arc::new(bus))
            }
            Self::InProcess(hub) => Ok(Arc::new(hub.open(session))),
        }
    }
}

/// Write one line-delimited hub message.
pub(crate) async fn write_message<W>(writer: &mut W, message: &HubMessage) -> Result<(), BusError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
