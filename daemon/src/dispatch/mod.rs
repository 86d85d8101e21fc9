pub mod actions;
pub mod dispatcher;
pub mod speech;

pub use actions::{ActionKind, ActionSequence, ActionStep, Key, KeyMode};
pub use dispatcher::{CommandDispatcher, DispatchOutcome, CONFIDENCE_THRESHOLD};
pub use speech::{LoggedSpeech, SpeechEngine, SpeechGate};
