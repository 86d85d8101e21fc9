use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{error, info};

/// Speech-feedback collaborator. Playback internals stay behind this trait.
pub trait SpeechEngine: Send {
    fn is_busy(&self) -> bool;

    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Single point of access to the speech engine.
///
/// Holding the guard across "check busy, decide, act" makes that sequence
/// atomic with respect to every other speaker.
#[derive(Clone)]
pub struct SpeechGate {
    engine: Arc<Mutex<Box<dyn SpeechEngine>>>,
}

impl SpeechGate {
    pub fn new(engine: impl SpeechEngine + 'static) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Box::new(engine))),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn SpeechEngine>> {
        self.engine.lock().await
    }

    pub async fn is_busy(&self) -> bool {
        self.engine.lock().await.is_busy()
    }

    pub async fn say(&self, text: &str) {
        if let Err(e) = self.engine.lock().await.speak(text) {
            error!("Speech engine failed to speak '{}': {}", text, e);
        }
    }
}

/// Default engine: logs each utterance and stays busy for an estimated
/// playback time, queueing new utterances behind the current one.
pub struct LoggedSpeech {
    word_duration: Duration,
    busy_until: Option<Instant>,
}

impl LoggedSpeech {
    pub fn new(word_duration: Duration) -> Self {
        Self {
            word_duration,
            busy_until: None,
        }
    }
}

impl SpeechEngine for LoggedSpeech {
    fn is_busy(&self) -> bool {
        self.busy_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        let words = text.split_whitespace().count().max(1) as u32;
        let now = Instant::now();
        let start = self.busy_until.filter(|t| *t > now).unwrap_or(now);
        self.busy_until = Some(start + self.word_duration * words);
        info!("Speaking: '{}'", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_logged_speech_busy_for_estimated_duration() {
        let mut speech = LoggedSpeech::new(Duration::from_millis(100));
        assert!(!speech.is_busy());

        speech.speak("bomb has been planted").unwrap();
        assert!(speech.is_busy());

        tokio::time::advance(Duration::from_millis(399)).await;
        assert!(speech.is_busy());
        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!speech.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logged_speech_queues_utterances() {
        let mut speech = LoggedSpeech::new(Duration::from_millis(100));
        speech.speak("one two").unwrap();
        speech.speak("three").unwrap();

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(speech.is_busy());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!speech.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_shares_one_engine() {
        let gate = SpeechGate::new(LoggedSpeech::new(Duration::from_millis(50)));
        let other = gate.clone();
        assert!(!other.is_busy().await);
        gate.say("hello").await;
        assert!(other.is_busy().await);
    }
}
