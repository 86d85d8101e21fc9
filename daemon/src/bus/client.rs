use shared::{
    ContextStatus, ExtensionNotification, HubMessage, NewContextRequest, RecognizedCommand,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{write_message, BusError, CommandBus};

/// A modality's session with the routing hub over TCP.
///
/// After the handshake a writer task drains outbound messages and a reader
/// task fans inbound notifications out to subscribers. Once the hub goes
/// away every subscriber sees `RecvError::Closed`.
pub struct HubBus {
    session: NewContextRequest,
    outbound: mpsc::UnboundedSender<HubMessage>,
    inbound: Inbound,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl HubBus {
    pub async fn connect(
        address: &str,
        session: NewContextRequest,
        capacity: usize,
    ) -> Result<Self, BusError> {
        info!(
            "Connecting to hub at {} as '{}' ({})",
            address, session.session_id, session.source
        );
        let stream = TcpStream::connect(address).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_message(
            &mut write_half,
            &HubMessage::NewContextRequest(session.clone()),
        )
        .await?;

        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| BusError::HandshakeClosed(session.session_id.clone()))?;

        match serde_json::from_str::<HubMessage>(&line)? {
            HubMessage::NewContextResponse { session_id, status } if session_id == session.session_id => {
                if status == ContextStatus::Rejected {
                    return Err(BusError::Rejected(session_id));
                }
            }
            other => return Err(BusError::UnexpectedMessage(format!("{:?}", other))),
        }
        info!("Session '{}' acknowledged by hub", session.session_id);

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<HubMessage>();
        let inbound = Inbound::new(capacity);

        let writer_session = session.session_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = write_message(&mut write_half, &message).await {
                    error!("Session '{}' failed to write to hub: {}", writer_session, e);
                    break;
                }
            }
            debug!("Hub writer for '{}' stopped", writer_session);
        });

        let reader_inbound = inbound.clone();
        let reader_session = session.session_id.clone();
        let reader = tokio::spawn(async move {
            let Some(inbound_tx) = reader_inbound.sender() else {
                return;
            };
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<HubMessage>(&line) {
                        Ok(HubMessage::ExtensionNotification(note)) => {
                            // Nobody listening is fine; delivery is at-most-once.
                            let _ = inbound_tx.send(note);
                        }
                        Ok(other) => debug!("Ignoring hub message: {:?}", other),
                        Err(e) => warn!("Discarding unparseable hub message: {}", e),
                    },
                    Ok(None) => {
                        info!("Hub closed session '{}'", reader_session);
                        break;
                    }
                    Err(e) => {
                        error!("Session '{}' failed to read from hub: {}", reader_session, e);
                        break;
                    }
                }
            }
            drop(inbound_tx);
            reader_inbound.close();
        });

        Ok(Self {
            session,
            outbound,
            inbound,
            writer,
            reader,
        })
    }

    pub fn shutdown(&self) {
        self.writer.abort();
        self.reader.abort();
        self.inbound.close();
        debug!("Session '{}' shut down", self.session.session_id);
    }
}

/// Inbound fan-out shared by the bus and its reader task. Clearing it drops
/// the last sender, which closes every subscriber.
#[derive(Clone)]
struct Inbound(Arc<Mutex<Option<broadcast::Sender<ExtensionNotification>>>>);

impl Inbound {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self(Arc::new(Mutex::new(Some(tx))))
    }

    fn sender(&self) -> Option<broadcast::Sender<ExtensionNotification>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn close(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn subscribe(&self) -> broadcast::Receiver<ExtensionNotification> {
        match self.sender() {
            Some(tx) => tx.subscribe(),
            // Sender dropped right away: the receiver reports `Closed`.
            None => broadcast::channel(1).1,
        }
    }
}

impl CommandBus for HubBus {
    fn session(&self) -> &NewContextRequest {
        &self.session
    }

    fn publish(&self, command: &RecognizedCommand) -> Result<(), BusError> {
        let note = ExtensionNotification::wrap(&self.session, command)?;
        self.outbound
            .send(HubMessage::ExtensionNotification(note))
            .map_err(|_| BusError::Closed)
    }

    fn subscribe(&self) -> broadcast::Receiver<ExtensionNotification> {
        self.inbound.subscribe()
    }
}

impl Drop for HubBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}
