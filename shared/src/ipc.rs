use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Pause,
    Resume,
    Send(ManualCommand),
}

/// A command injected through the control socket, published as a speech-modality result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManualCommand {
    pub label: String,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Error(String),
    Status(StatusInfo),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub is_running: bool,
    pub is_paused: bool,
    pub hub: String,
    pub tracking: bool,
    pub active_gesture: Option<String>,
    pub round_number: u32,
    pub bomb_planted: bool,
    pub money: i32,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused: is fusiond running?")]
    ConnectionRefused,

    #[error("Connection timeout")]
    Timeout,
}
