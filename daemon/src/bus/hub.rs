use shared::{ContextStatus, HubMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::{write_message, BusError};

struct Route {
    session_id: String,
    tx: mpsc::UnboundedSender<HubMessage>,
}

type Routes = Arc<Mutex<HashMap<u64, Route>>>;

/// Minimal routing hub: acknowledges sessions and forwards every
/// notification to all other registered sessions.
pub struct HubServer {
    listener: TcpListener,
    routes: Routes,
    next_id: AtomicU64,
}

impl HubServer {
    pub async fn bind(address: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("Hub listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            routes: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let routes = Arc::clone(&self.routes);
                    debug!("Hub accepted connection {} from {}", id, addr);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(routes.clone(), id, stream).await {
                            error!("Hub connection {} failed: {}", id, e);
                        }
                        routes.lock().await.remove(&id);
                    });
                }
                Err(e) => {
                    error!("Hub failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(routes: Routes, id: u64, stream: TcpStream) -> Result<(), BusError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let Some(first) = lines.next_line().await? else {
            return Ok(());
        };

        let request = match serde_json::from_str::<HubMessage>(&first) {
            Ok(HubMessage::NewContextRequest(request)) => request,
            Ok(other) => {
                warn!("Connection {} sent {:?} before a handshake", id, other);
                let reply = HubMessage::NewContextResponse {
                    session_id: String::new(),
                    status: ContextStatus::Rejected,
                };
                return write_message(&mut write_half, &reply).await;
            }
            Err(e) => {
                warn!("Connection {} sent an unparseable handshake: {}", id, e);
                return Ok(());
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<HubMessage>();
        {
            let mut routes = routes.lock().await;
            if routes.values().any(|r| r.session_id == request.session_id) {
                warn!("Session '{}' is already registered", request.session_id);
                let reply = HubMessage::NewContextResponse {
                    session_id: request.session_id,
                    status: ContextStatus::Rejected,
                };
                return write_message(&mut write_half, &reply).await;
            }
            // The ack must be first in the queue, ahead of any forwarded notification.
            tx.send(HubMessage::NewContextResponse {
                session_id: request.session_id.clone(),
                status: ContextStatus::Accepted,
            })
            .map_err(|_| BusError::Closed)?;
            routes.insert(
                id,
                Route {
                    session_id: request.session_id.clone(),
                    tx: tx.clone(),
                },
            );
        }
        drop(tx);
        info!(
            "Hub registered session '{}' from {} ({}, {})",
            request.session_id, request.source, request.medium, request.mode
        );

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = write_message(&mut write_half, &message).await {
                    debug!("Hub writer for connection {} stopped: {}", id, e);
                    break;
                }
            }
        });

        while let Some(line) = lines.next_line().await? {
            match serde_json::from_str::<HubMessage>(&line) {
                Ok(HubMessage::ExtensionNotification(note)) => {
                    let routes = routes.lock().await;
                    for (other_id, route) in routes.iter() {
                        if *other_id != id {
                            let _ = route
                                .tx
                                .send(HubMessage::ExtensionNotification(note.clone()));
                        }
                    }
                }
                Ok(other) => debug!("Hub ignoring {:?} from '{}'", other, request.session_id),
                Err(e) => warn!(
                    "Hub discarding unparseable message from '{}': {}",
                    request.session_id, e
                ),
            }
        }

        info!("Session '{}' disconnected", request.session_id);
        routes.lock().await.remove(&id);
        writer.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn start_hub() -> String {
        let hub = HubServer::bind("127.0.0.1:0").await.unwrap();
        let address = hub.local_addr().unwrap().to_string();
        tokio::spawn(hub.run());
        address
    }

    #[tokio::test]
    async fn test_notification_before_handshake_is_rejected() {
        let address = start_hub().await;
        let stream = TcpStream::connect(&address).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(
                br#"{"type":"ExtensionNotification","source":"X","target":"Y","context":"c","extension":"command","data":"{}"}
"#,
            )
            .await
            .unwrap();

        let reply: HubMessage =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(
            reply,
            HubMessage::NewContextResponse {
                status: ContextStatus::Rejected,
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sessions_join_while_notifications_flow() {
        use crate::bus::{CommandBus, HubBus};
        use shared::{Modality, NewContextRequest, RecognizedCommand};

        let address = start_hub().await;
        let request = |id: String| NewContextRequest {
            source: "ASR".to_string(),
            target: "FUSION".to_string(),
            session_id: id,
            medium: "acoustic".to_string(),
            mode: "command".to_string(),
        };

        let publisher = HubBus::connect(&address, request("speech-1".to_string()), 8)
            .await
            .unwrap();
        let flood = tokio::spawn(async move {
            let command = RecognizedCommand::new(Modality::Speech, "RELOAD", 0.9);
            loop {
                publisher.publish(&command).unwrap();
                tokio::task::yield_now().await;
            }
        });

        for i in 0..200 {
            let bus = HubBus::connect(&address, request(format!("late-{}", i)), 8).await;
            assert!(bus.is_ok(), "session {} failed: {:?}", i, bus.err());
        }
        flood.abort();
    }

    #[tokio::test]
    async fn test_handshake_is_acknowledged() {
        let address = start_hub().await;
        let stream = TcpStream::connect(&address).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(
                br#"{"type":"NewContextRequest","source":"ASR","target":"FUSION","sessionId":"speech-1","medium":"acoustic","mode":"command"}
"#,
            )
            .await
            .unwrap();

        let reply: HubMessage =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(
            reply,
            HubMessage::NewContextResponse {
                session_id: "speech-1".to_string(),
                status: ContextStatus::Accepted,
            }
        );
    }
}
