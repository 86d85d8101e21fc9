use crate::bus::CommandBus;
use crate::config::Config;
use crate::gesture::{GestureSnapshot, Tracking};
use crate::rate_limit::CommandRateLimiter;
use crate::reactor::GameRoundState;
use shared::ipc::{ManualCommand, StatusInfo};
use shared::{Modality, RecognizedCommand, EMPTY_SLOT};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Everything the control socket can observe or touch.
pub struct DaemonState {
    pub config: Config,
    pub is_paused: Arc<Mutex<bool>>,
    pub gestures: watch::Receiver<GestureSnapshot>,
    pub round: watch::Receiver<GameRoundState>,
    pub speech_bus: Arc<dyn CommandBus>,
    pub rate_limiter: CommandRateLimiter,
}

impl DaemonState {
    pub fn new(
        config: Config,
        gestures: watch::Receiver<GestureSnapshot>,
        round: watch::Receiver<GameRoundState>,
        speech_bus: Arc<dyn CommandBus>,
    ) -> Self {
        let rate_limiter = CommandRateLimiter::from_config(&config.rate_limit);
        Self {
            config,
            is_paused: Arc::new(Mutex::new(false)),
            gestures,
            round,
            speech_bus,
            rate_limiter,
        }
    }

    pub async fn pause(&self) {
        *self.is_paused.lock().await = true;
        tracing::info!("Dispatch paused");
    }

    pub async fn resume(&self) {
        *self.is_paused.lock().await = false;
        tracing::info!("Dispatch resumed");
    }

    pub async fn get_status(&self) -> StatusInfo {
        let is_paused = *self.is_paused.lock().await;
        let gestures = self.gestures.borrow().clone();
        let round = self.round.borrow().clone();
        StatusInfo {
            is_running: true,
            is_paused,
            hub: self.config.hub.address(),
            tracking: gestures.tracking != Tracking::Untracked,
            active_gesture: gestures.active_gesture().map(|g| g.label().to_string()),
            round_number: round.round_number,
            bomb_planted: round.bomb_planted,
            money: round.money,
        }
    }

    /// Publish a manual command as if it had been recognized by speech.
    pub fn send(&self, manual: &ManualCommand) -> anyhow::Result<()> {
        let label = manual.label.trim();
        if label.is_empty() || label == EMPTY_SLOT {
            anyhow::bail!("Command label must not be empty");
        }
        if !manual.confidence.is_finite() {
            anyhow::bail!("Confidence must be a finite number");
        }

        let command = RecognizedCommand::new(Modality::Speech, label, manual.confidence);
        self.speech_bus.publish(&command)?;
        tracing::info!(
            "Injected command '{}' (confidence {:.2})",
            command.label,
            command.confidence
        );
        Ok(())
    }
}
