use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use super::stabilizer::{DiscreteEvent, GestureStabilizer, SensorFrame};
use crate::bus::CommandBus;

/// Gesture adapter: sensor frames in, discrete commands out on its bus session.
pub struct GestureModality {
    stabilizer: GestureStabilizer,
    bus: Arc<dyn CommandBus>,
}

impl GestureModality {
    pub fn new(stabilizer: GestureStabilizer, bus: Arc<dyn CommandBus>) -> Self {
        Self { stabilizer, bus }
    }

    pub fn stabilizer(&self) -> &GestureStabilizer {
        &self.stabilizer
    }

    pub fn handle_frame(&mut self, frame: Option<&SensorFrame>) -> Option<DiscreteEvent> {
        let event = self.stabilizer.observe_frame(frame)?;
        let command = event.to_command();
        match self.bus.publish(&command) {
            Ok(()) => info!(
                "Published gesture {} (progress {:.2})",
                command.label, command.confidence
            ),
            Err(e) => error!("Failed to publish gesture {}: {}", command.label, e),
        }
        Some(event)
    }

    /// Consume newline-delimited JSON frames until the reader is exhausted.
    /// A `null` line is an absent frame.
    pub async fn consume<R>(&mut self, reader: R) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut fired = 0;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Option<SensorFrame>>(line) {
                Ok(frame) => {
                    if self.handle_frame(frame.as_ref()).is_some() {
                        fired += 1;
                    }
                }
                Err(e) => warn!("Skipping malformed sensor frame: {}", e),
            }
        }
        Ok(fired)
    }

    /// Serve sensor providers on a Unix socket, one connection at a time.
    pub async fn run(mut self, socket_path: PathBuf) -> anyhow::Result<()> {
        remove_stale_socket(&socket_path)?;
        let listener = UnixListener::bind(&socket_path)?;
        info!("Waiting for sensor frames on {}", socket_path.display());

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    info!("Sensor provider connected");
                    match self.consume(BufReader::new(stream)).await {
                        Ok(fired) => debug!("Sensor provider finished, {} gestures fired", fired),
                        Err(e) => error!("Sensor connection failed: {}", e),
                    }
                    // The subject is gone along with its provider.
                    self.stabilizer.lose_tracking();
                }
                Err(e) => error!("Error accepting sensor connection: {}", e),
            }
        }
    }
}

fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
