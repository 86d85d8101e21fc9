pub mod envelope;
pub mod ipc;

pub use envelope::{
    ContextStatus, EnvelopeError, ExtensionNotification, HubMessage, Modality, NewContextRequest,
    RecognizedCommand, RecognizedPayload, EMPTY_SLOT, SLOT_COUNT,
};
pub use ipc::{Command, IpcError, ManualCommand, Response, StatusInfo};
