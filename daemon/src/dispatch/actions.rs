use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    LControl,
    Return,
    A,
    B,
    D,
    R,
    X,
    Y,
    Z,
    Digit3,
    Digit4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Down immediately followed by up.
    Press,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionStep {
    pub key: Key,
    pub delay_before_ms: u64,
    pub mode: KeyMode,
}

impl ActionStep {
    const fn new(key: Key, delay_before_ms: u64, mode: KeyMode) -> Self {
        Self {
            key,
            delay_before_ms,
            mode,
        }
    }
}

/// Ordered timed steps handed to the action executor as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSequence {
    pub steps: Vec<ActionStep>,
    /// Pause after the last step before the next sequence may start.
    pub settle_ms: u64,
}

impl ActionSequence {
    pub fn duration(&self) -> Duration {
        let total: u64 = self.steps.iter().map(|s| s.delay_before_ms).sum();
        Duration::from_millis(total + self.settle_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Crouch,
    Dab,
    Hey,
    Hold,
    Reload,
}

impl ActionKind {
    /// Exact, case-sensitive match on the command label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "CROUCH" => Some(Self::Crouch),
            "DAB" => Some(Self::Dab),
            "HEY" => Some(Self::Hey),
            "HOLD" => Some(Self::Hold),
            "RELOAD" => Some(Self::Reload),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Crouch => "CROUCH",
            Self::Dab => "DAB",
            Self::Hey => "HEY",
            Self::Hold => "HOLD",
            Self::Reload => "RELOAD",
        }
    }

    pub fn sequence(&self) -> ActionSequence {
        use Key::*;
        use KeyMode::*;

        let (steps, settle_ms) = match self {
            Self::Crouch => (
                vec![
                    ActionStep::new(LControl, 0, Down),
                    ActionStep::new(LControl, 1000, Up),
                ],
                0,
            ),
            // Types "dab" into chat and confirms it.
            Self::Dab => (
                vec![
                    ActionStep::new(Y, 0, Press),
                    ActionStep::new(D, 100, Press),
                    ActionStep::new(A, 50, Press),
                    ActionStep::new(B, 50, Press),
                    ActionStep::new(Return, 50, Press),
                ],
                50,
            ),
            Self::Hey => (
                vec![
                    ActionStep::new(X, 0, Press),
                    ActionStep::new(Digit3, 25, Press),
                ],
                0,
            ),
            Self::Hold => (
                vec![
                    ActionStep::new(Z, 0, Press),
                    ActionStep::new(Digit4, 25, Press),
                ],
                0,
            ),
            Self::Reload => (vec![ActionStep::new(R, 0, Press)], 0),
        };

        ActionSequence { steps, settle_ms }
    }
}
