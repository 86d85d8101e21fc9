use shared::{ExtensionNotification, Modality};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use super::actions::ActionKind;
use super::speech::SpeechGate;
use crate::output::ActionExecutor;

/// Commands below this confidence are answered with a repeat prompt.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Executed(ActionKind),
    /// Speech output was active; the command was dropped.
    Suppressed,
    RepeatRequested,
    /// Confident but unknown label.
    Ignored(String),
    Malformed,
    Failed,
}

pub struct CommandDispatcher {
    speech: SpeechGate,
    executor: Arc<dyn ActionExecutor>,
    repeat_prompt: String,
    sources: HashMap<String, Modality>,
}

impl CommandDispatcher {
    pub fn new(
        speech: SpeechGate,
        executor: Arc<dyn ActionExecutor>,
        repeat_prompt: impl Into<String>,
    ) -> Self {
        Self {
            speech,
            executor,
            repeat_prompt: repeat_prompt.into(),
            sources: HashMap::new(),
        }
    }

    /// Tag notifications from `source` with `modality`. Unknown sources count as speech.
    pub fn with_source(mut self, source: impl Into<String>, modality: Modality) -> Self {
        self.sources.insert(source.into(), modality);
        self
    }

    pub async fn handle(&self, note: &ExtensionNotification) -> DispatchOutcome {
        let modality = self
            .sources
            .get(&note.source)
            .copied()
            .unwrap_or(Modality::Speech);

        let command = match note.unwrap_command(modality) {
            Ok(command) => command,
            Err(e) => {
                warn!("Discarding malformed command from '{}': {}", note.source, e);
                return DispatchOutcome::Malformed;
            }
        };

        // Held until the action is submitted, so a concurrent speaker cannot
        // flip the busy flag between the check and the submission.
        let mut speech = self.speech.lock().await;

        if speech.is_busy() {
            debug!("Speech active, dropping '{}'", command.label);
            return DispatchOutcome::Suppressed;
        }

        if command.confidence < CONFIDENCE_THRESHOLD {
            info!(
                "Low confidence {:.2} for '{}', asking to repeat",
                command.confidence, command.label
            );
            if let Err(e) = speech.speak(&self.repeat_prompt) {
                error!("Speech engine failed: {}", e);
            }
            return DispatchOutcome::RepeatRequested;
        }

        let Some(kind) = ActionKind::from_label(&command.label) else {
            debug!("No action mapped to '{}'", command.label);
            return DispatchOutcome::Ignored(command.label);
        };

        info!(
            "Accepted {} command '{}' (confidence {:.2})",
            modality.as_str(),
            command.label,
            command.confidence
        );

        match self.executor.run(kind.sequence()) {
            Ok(()) => DispatchOutcome::Executed(kind),
            Err(e) => {
                error!("Failed to submit '{}': {}", command.label, e);
                DispatchOutcome::Failed
            }
        }
    }

    /// Consume notifications until the bus closes. Nothing is dispatched while paused.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<ExtensionNotification>,
        is_paused: Arc<Mutex<bool>>,
    ) {
        info!("Command dispatcher started");
        loop {
            match rx.recv().await {
                Ok(note) => {
                    if *is_paused.lock().await {
                        debug!("Dispatcher paused, dropping notification from '{}'", note.source);
                        continue;
                    }
                    let outcome = self.handle(&note).await;
                    debug!("Dispatch outcome: {:?}", outcome);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dispatcher lagged, dropped {} commands", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Command bus closed, stopping dispatcher");
                    break;
                }
            }
        }
    }
}
