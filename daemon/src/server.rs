use shared::ipc::{Command, Response};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::state::DaemonState;

/// Control socket: one JSON `Command` per connection, one JSON `Response` back.
pub struct DaemonServer {
    socket_path: PathBuf,
    state: Arc<DaemonState>,
}

impl DaemonServer {
    pub fn new(socket_path: PathBuf, state: Arc<DaemonState>) -> Self {
        Self { socket_path, state }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let socket_path = self.socket_path.clone();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        info!("Starting control socket at {}", socket_path.display());

        let listener = UnixListener::bind(&socket_path)?;
        debug!("Listener bound successfully");

        loop {
            let state = Arc::clone(&self.state);
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("Connection accepted");
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(state, stream).await {
                            error!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        state: Arc<DaemonState>,
        mut stream: tokio::net::UnixStream,
    ) -> anyhow::Result<()> {
        let mut buffer = vec![0u8; 1024];
        let n = stream.read(&mut buffer).await?;

        if n == 0 {
            return Ok(());
        }

        buffer.truncate(n);

        let response = match serde_json::from_slice::<Command>(&buffer) {
            Ok(command) => {
                info!("Received command: {:?}", command);
                if state.rate_limiter.check() {
                    Self::execute(&state, command).await
                } else {
                    warn!("Control command rate limited");
                    Response::Error("Rate limit exceeded, try again shortly".to_string())
                }
            }
            Err(e) => {
                warn!("Invalid control command: {}", e);
                Response::Error(format!("Invalid command: {}", e))
            }
        };

        let response_json = serde_json::to_vec(&response)?;
        stream.write_all(&response_json).await?;

        debug!("Sent response: {:?}", response);

        Ok(())
    }

    async fn execute(state: &DaemonState, command: Command) -> Response {
        match command {
            Command::Status => Response::Status(state.get_status().await),
            Command::Pause => {
                state.pause().await;
                Response::Ok
            }
            Command::Resume => {
                state.resume().await;
                Response::Ok
            }
            Command::Send(manual) => match state.send(&manual) {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error(e.to_string()),
            },
        }
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CommandBus, LocalHub};
    use crate::config::{Config, RateLimitConfig};
    use crate::gesture::GestureStabilizer;
    use crate::reactor::GameRoundState;
    use shared::ipc::ManualCommand;
    use std::path::Path;
    use std::time::Duration;
    use tokio::net::UnixStream;
    use tokio::sync::watch;

    struct Running {
        _dir: tempfile::TempDir,
        socket: PathBuf,
        state: Arc<DaemonState>,
        hub: LocalHub,
        _stabilizer: GestureStabilizer,
        _round: watch::Sender<GameRoundState>,
    }

    async fn start(rate_limit: RateLimitConfig) -> Running {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("fusiond.sock");
        let config = Config {
            rate_limit,
            ..Config::default()
        };
        let hub = LocalHub::new(16);
        let speech_bus = Arc::new(hub.open(config.sessions.speech.request()));
        let stabilizer = GestureStabilizer::new(15);
        let (round_tx, round_rx) = watch::channel(GameRoundState::default());
        let state = Arc::new(DaemonState::new(
            config,
            stabilizer.subscribe(),
            round_rx,
            speech_bus,
        ));

        let server = DaemonServer::new(socket.clone(), state.clone());
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        wait_for_socket(&socket).await;

        Running {
            _dir: dir,
            socket,
            state,
            hub,
            _stabilizer: stabilizer,
            _round: round_tx,
        }
    }

    async fn wait_for_socket(path: &Path) {
        for _ in 0..100 {
            if UnixStream::connect(path).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("control socket never came up");
    }

    async fn request(path: &Path, payload: &[u8]) -> Response {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    async fn send(path: &Path, command: &Command) -> Response {
        request(path, &serde_json::to_vec(command).unwrap()).await
    }

    #[tokio::test]
    async fn test_status_pause_resume() {
        let running = start(RateLimitConfig::default()).await;

        match send(&running.socket, &Command::Status).await {
            Response::Status(status) => {
                assert!(status.is_running);
                assert!(!status.is_paused);
                assert_eq!(status.money, 800);
            }
            other => panic!("unexpected response {:?}", other),
        }

        assert_eq!(send(&running.socket, &Command::Pause).await, Response::Ok);
        assert!(*running.state.is_paused.lock().await);
        assert_eq!(send(&running.socket, &Command::Resume).await, Response::Ok);
        assert!(!*running.state.is_paused.lock().await);
    }

    #[tokio::test]
    async fn test_send_reaches_bus() {
        let running = start(RateLimitConfig::default()).await;
        let dispatcher = running
            .hub
            .open(Config::default().sessions.dispatcher.request());
        let mut rx = dispatcher.subscribe();

        let command = Command::Send(ManualCommand {
            label: "HEY".to_string(),
            confidence: 0.7,
        });
        assert_eq!(send(&running.socket, &command).await, Response::Ok);

        let note = rx.recv().await.unwrap();
        assert_eq!(note.context, "speech-1");
    }

    #[tokio::test]
    async fn test_invalid_requests_get_errors() {
        let running = start(RateLimitConfig::default()).await;

        let response = request(&running.socket, b"{not json").await;
        assert!(matches!(response, Response::Error(_)));

        let command = Command::Send(ManualCommand {
            label: String::new(),
            confidence: 0.7,
        });
        assert!(matches!(
            send(&running.socket, &command).await,
            Response::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_flood() {
        let running = start(RateLimitConfig {
            commands_per_second: 1,
            burst_capacity: 2,
            enabled: true,
        })
        .await;

        assert!(matches!(
            send(&running.socket, &Command::Status).await,
            Response::Status(_)
        ));
        assert!(matches!(
            send(&running.socket, &Command::Status).await,
            Response::Status(_)
        ));
        match send(&running.socket, &Command::Status).await {
            Response::Error(msg) => assert!(msg.contains("Rate limit")),
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }
}
