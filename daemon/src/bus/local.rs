use shared::{ExtensionNotification, NewContextRequest, RecognizedCommand};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{BusError, CommandBus};

/// In-process stand-in for the routing hub, used when every modality lives in one daemon.
#[derive(Clone)]
pub struct LocalHub {
    tx: broadcast::Sender<ExtensionNotification>,
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn open(&self, session: NewContextRequest) -> LocalBus {
        info!(
            "Session '{}' ({}) registered on in-process hub",
            session.session_id, session.source
        );
        LocalBus {
            session,
            tx: self.tx.clone(),
        }
    }
}

pub struct LocalBus {
    session: NewContextRequest,
    tx: broadcast::Sender<ExtensionNotification>,
}

impl CommandBus for LocalBus {
    fn session(&self) -> &NewContextRequest {
        &self.session
    }

    fn publish(&self, command: &RecognizedCommand) -> Result<(), BusError> {
        let note = ExtensionNotification::wrap(&self.session, command)?;
        if self.tx.send(note).is_err() {
            debug!("No subscribers for '{}', command dropped", command.label);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ExtensionNotification> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Modality;

    fn session(source: &str) -> NewContextRequest {
        NewContextRequest {
            source: source.to_string(),
            target: "FUSION".to_string(),
            session_id: format!("{}-1", source.to_lowercase()),
            medium: "visual".to_string(),
            mode: "command".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_other_session() {
        let hub = LocalHub::new(16);
        let gestures = hub.open(session("GESTURES"));
        let dispatcher = hub.open(session("GUI"));
        let mut rx = dispatcher.subscribe();

        gestures
            .publish(&RecognizedCommand::new(Modality::Gestures, "DAB", 1.0))
            .unwrap();

        let note = rx.recv().await.unwrap();
        assert_eq!(note.source, "GESTURES");
        assert_eq!(note.context, "gestures-1");
        let cmd = note.unwrap_command(Modality::Gestures).unwrap();
        assert_eq!(cmd.label, "DAB");
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let hub = LocalHub::new(4);
        let bus = hub.open(session("ASR"));
        assert!(bus
            .publish(&RecognizedCommand::new(Modality::Speech, "RELOAD", 0.9))
            .is_ok());
    }

    #[tokio::test]
    async fn test_ordering_preserved_for_one_producer() {
        let hub = LocalHub::new(16);
        let bus = hub.open(session("ASR"));
        let mut rx = bus.subscribe();
        for label in ["HEY", "HOLD", "RELOAD"] {
            bus.publish(&RecognizedCommand::new(Modality::Speech, label, 0.9))
                .unwrap();
        }
        for expected in ["HEY", "HOLD", "RELOAD"] {
            let cmd = rx
                .recv()
                .await
                .unwrap()
                .unwrap_command(Modality::Speech)
                .unwrap();
            assert_eq!(cmd.label, expected);
        }
    }
}
