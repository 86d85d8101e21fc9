use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of string slots every recognized command carries on the wire.
pub const SLOT_COUNT: usize = 8;

/// Placeholder for slots the producing modality does not populate.
pub const EMPTY_SLOT: &str = "EMP";

/// Extension tag carried by command notifications.
pub const COMMAND_EXTENSION: &str = "command";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Speech,
    Gestures,
    Telemetry,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speech => "speech",
            Self::Gestures => "gestures",
            Self::Telemetry => "telemetry",
        }
    }
}

/// A command recognized by one modality, before it is flattened onto the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedCommand {
    pub modality: Modality,
    /// For gestures this is the raw progress value, not a probability.
    pub confidence: f64,
    pub label: String,
    /// Producer-specific slots 2..8. Anything past six entries is dropped.
    pub extras: Vec<String>,
}

impl RecognizedCommand {
    pub fn new(modality: Modality, label: impl Into<String>, confidence: f64) -> Self {
        Self {
            modality,
            confidence,
            label: label.into(),
            extras: Vec::new(),
        }
    }

    pub fn to_payload(&self) -> RecognizedPayload {
        let mut recognized: [String; SLOT_COUNT] = std::array::from_fn(|_| EMPTY_SLOT.to_string());
        recognized[0] = self.confidence.to_string();
        recognized[1] = self.label.clone();
        for (slot, extra) in recognized[2..].iter_mut().zip(&self.extras) {
            *slot = extra.clone();
        }
        RecognizedPayload { recognized }
    }

    pub fn from_payload(
        modality: Modality,
        payload: &RecognizedPayload,
    ) -> Result<Self, EnvelopeError> {
        let raw_confidence = payload.recognized[0].trim();
        let confidence: f64 = raw_confidence
            .parse()
            .map_err(|_| EnvelopeError::InvalidConfidence(raw_confidence.to_string()))?;
        if !confidence.is_finite() {
            return Err(EnvelopeError::InvalidConfidence(raw_confidence.to_string()));
        }

        let label = payload.recognized[1].trim();
        if label.is_empty() || label == EMPTY_SLOT {
            return Err(EnvelopeError::MissingLabel);
        }

        let extras = payload.recognized[2..]
            .iter()
            .filter(|slot| slot.as_str() != EMPTY_SLOT)
            .cloned()
            .collect();

        Ok(Self {
            modality,
            confidence,
            label: label.to_string(),
            extras,
        })
    }
}

/// The `{"recognized": [...]}` object embedded in a notification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawPayload")]
pub struct RecognizedPayload {
    pub recognized: [String; SLOT_COUNT],
}

#[derive(Deserialize)]
struct RawPayload {
    recognized: Vec<String>,
}

impl TryFrom<RawPayload> for RecognizedPayload {
    type Error = EnvelopeError;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        let found = raw.recognized.len();
        let recognized = raw
            .recognized
            .try_into()
            .map_err(|_| EnvelopeError::SlotCount {
                expected: SLOT_COUNT,
                found,
            })?;
        Ok(Self { recognized })
    }
}

impl RecognizedPayload {
    /// Parse with a typed error for the arity check instead of a generic JSON one.
    pub fn parse(data: &str) -> Result<Self, EnvelopeError> {
        let raw: RawPayload = serde_json::from_str(data)?;
        raw.try_into()
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Handshake a modality sends before it may publish.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewContextRequest {
    pub source: String,
    pub target: String,
    pub session_id: String,
    pub medium: String,
    pub mode: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    Accepted,
    Rejected,
}

/// Outer routing wrapper. `data` holds the JSON-encoded [`RecognizedPayload`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtensionNotification {
    pub source: String,
    pub target: String,
    pub context: String,
    pub extension: String,
    pub data: String,
}

impl ExtensionNotification {
    pub fn wrap(session: &NewContextRequest, command: &RecognizedCommand) -> Result<Self, EnvelopeError> {
        Ok(Self {
            source: session.source.clone(),
            target: session.target.clone(),
            context: session.session_id.clone(),
            extension: COMMAND_EXTENSION.to_string(),
            data: command.to_payload().to_json()?,
        })
    }

    /// Unwrap both layers back into a validated command.
    pub fn unwrap_command(&self, modality: Modality) -> Result<RecognizedCommand, EnvelopeError> {
        let payload = RecognizedPayload::parse(&self.data)?;
        RecognizedCommand::from_payload(modality, &payload)
    }
}

/// Line-delimited messages exchanged with the routing hub.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum HubMessage {
    NewContextRequest(NewContextRequest),
    #[serde(rename_all = "camelCase")]
    NewContextResponse {
        session_id: String,
        status: ContextStatus,
    },
    ExtensionNotification(ExtensionNotification),
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected {expected} recognized slots, found {found}")]
    SlotCount { expected: usize, found: usize },

    #[error("Confidence slot is not a number: '{0}'")]
    InvalidConfidence(String),

    #[error("Label slot is empty")]
    MissingLabel,
}
