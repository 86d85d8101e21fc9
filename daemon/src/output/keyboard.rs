use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatch::actions::{ActionSequence, Key, KeyMode};

/// Boundary to the input-injection engine. Submitting is all the caller does;
/// timing and raw key events are the executor's business.
pub trait ActionExecutor: Send + Sync {
    fn run(&self, sequence: ActionSequence) -> Result<(), ExecutorError>;
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Action executor is not running")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub pressed: bool,
}

/// Executes sequences one after another on a single worker task, so steps of
/// two sequences never interleave.
pub struct VirtualKeyboard {
    tx: mpsc::UnboundedSender<ActionSequence>,
    worker: JoinHandle<()>,
}

impl VirtualKeyboard {
    pub fn spawn() -> Self {
        Self::with_sink(None)
    }

    /// Raw key events are also forwarded to `sink` when given.
    pub fn with_sink(sink: Option<mpsc::UnboundedSender<KeyEvent>>) -> Self {
        info!("Creating VirtualKeyboard");
        let (tx, mut rx) = mpsc::unbounded_channel::<ActionSequence>();
        let worker = tokio::spawn(async move {
            while let Some(sequence) = rx.recv().await {
                Self::perform(&sequence, sink.as_ref()).await;
            }
            debug!("VirtualKeyboard worker stopped");
        });
        Self { tx, worker }
    }

    pub fn shutdown(&self) {
        self.worker.abort();
    }

    async fn perform(sequence: &ActionSequence, sink: Option<&mpsc::UnboundedSender<KeyEvent>>) {
        for step in &sequence.steps {
            if step.delay_before_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.delay_before_ms)).await;
            }
            match step.mode {
                KeyMode::Press => {
                    Self::emit(step.key, true, sink);
                    Self::emit(step.key, false, sink);
                }
                KeyMode::Down => Self::emit(step.key, true, sink),
                KeyMode::Up => Self::emit(step.key, false, sink),
            }
        }
        if sequence.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sequence.settle_ms)).await;
        }
    }

    fn emit(key: Key, pressed: bool, sink: Option<&mpsc::UnboundedSender<KeyEvent>>) {
        info!("Key {:?} {}", key, if pressed { "down" } else { "up" });
        if let Some(sink) = sink {
            let _ = sink.send(KeyEvent { key, pressed });
        }
    }
}

impl ActionExecutor for VirtualKeyboard {
    fn run(&self, sequence: ActionSequence) -> Result<(), ExecutorError> {
        self.tx.send(sequence).map_err(|_| ExecutorError::Stopped)
    }
}

impl Drop for VirtualKeyboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::actions::ActionKind;

    fn key_events(rx: &mut mpsc::UnboundedReceiver<KeyEvent>) -> Vec<KeyEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_crouch_releases_after_hold() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let keyboard = VirtualKeyboard::with_sink(Some(sink));
        keyboard.run(ActionKind::Crouch.sequence()).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            key_events(&mut rx),
            vec![KeyEvent {
                key: Key::LControl,
                pressed: true
            }]
        );

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(
            key_events(&mut rx),
            vec![KeyEvent {
                key: Key::LControl,
                pressed: false
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequences_do_not_interleave() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let keyboard = VirtualKeyboard::with_sink(Some(sink));
        keyboard.run(ActionKind::Hey.sequence()).unwrap();
        keyboard.run(ActionKind::Reload.sequence()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let pressed: Vec<_> = key_events(&mut rx)
            .into_iter()
            .filter(|e| e.pressed)
            .map(|e| e.key)
            .collect();
        assert_eq!(pressed, vec![Key::X, Key::Digit3, Key::R]);
    }

    #[tokio::test]
    async fn test_run_after_shutdown_fails() {
        let keyboard = VirtualKeyboard::spawn();
        keyboard.shutdown();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = keyboard.run(ActionKind::Reload.sequence());
        assert!(matches!(result, Err(ExecutorError::Stopped)));
    }
}
