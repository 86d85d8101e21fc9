pub mod game_state;
pub mod telemetry;

pub use game_state::{
    Advisory, AdvisoryPolicy, GameRoundState, GameStateReactor, ReactorOutcome,
};
pub use telemetry::{BombState, RoundPhase, TelemetrySnapshot};

use crate::dispatch::SpeechGate;
use tokio::sync::mpsc;
use tracing::info;

/// Speak advisories in arrival order until every sender is gone.
pub async fn speak_advisories(mut rx: mpsc::UnboundedReceiver<Advisory>, speech: SpeechGate) {
    while let Some(advisory) = rx.recv().await {
        info!("Advisory: {:?}", advisory);
        speech.say(&advisory.message()).await;
    }
}
