//! Turns per-frame continuous gesture progress into discrete command edges.
//!
//! A channel is "triggered" once its progress reaches 1.0. The first
//! completion after a reset fires immediately; every repeat firing of the
//! same channel waits for `window` further triggered frames. Only one
//! gesture is active per tracked subject, and every evaluation pass
//! publishes an immutable [`GestureSnapshot`] through a `watch` channel so
//! readers never see a half-updated state.

use serde::Deserialize;
use shared::{Modality, RecognizedCommand};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info};

/// Progress at or above which a channel counts as triggered.
pub const TRIGGER_PROGRESS: f32 = 1.0;

const CHANNEL_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Crouch,
    Dab,
    Hey,
    Hold,
    Reload,
}

impl Gesture {
    /// Evaluation order within a frame.
    pub const ALL: [Gesture; CHANNEL_COUNT] = [
        Gesture::Crouch,
        Gesture::Dab,
        Gesture::Hey,
        Gesture::Hold,
        Gesture::Reload,
    ];

    /// Command label published on the bus.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Crouch => "CROUCH",
            Self::Dab => "DAB",
            Self::Hey => "HEY",
            Self::Hold => "HOLD",
            Self::Reload => "RELOAD",
        }
    }

    /// Name of the gesture in the trained sensor database.
    pub fn sensor_name(&self) -> &'static str {
        match self {
            Self::Crouch => "CrouchContinuous",
            Self::Dab => "Dab",
            Self::Hey => "Hey_Right",
            Self::Hold => "Hold_Right",
            Self::Reload => "Reload_Right",
        }
    }

    /// Accepts either the bus label or the sensor database name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|g| g.sensor_name() == name || g.label().eq_ignore_ascii_case(name))
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// One sensor frame as delivered by the frame provider.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SensorFrame {
    #[serde(default)]
    pub tracking_id: Option<u64>,
    #[serde(default)]
    pub tracking_lost: bool,
    #[serde(default)]
    pub progress: HashMap<String, f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscreteEvent {
    pub gesture: Gesture,
    /// The literal progress value at firing time.
    pub confidence: f32,
}

impl DiscreteEvent {
    pub fn to_command(&self) -> RecognizedCommand {
        // Widen through the shortest decimal so 1.05 stays "1.05" on the wire.
        let confidence = self
            .confidence
            .to_string()
            .parse()
            .unwrap_or_else(|_| f64::from(self.confidence));
        RecognizedCommand::new(Modality::Gestures, self.gesture.label(), confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tracking {
    /// No subject in view. Distinct from `Idle` so consumers can tell
    /// "no gesture" from "no subject".
    Untracked,
    Idle,
    Active(Gesture),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GestureSnapshot {
    pub tracking: Tracking,
    pub tracking_id: Option<u64>,
    pub progress: f32,
}

impl GestureSnapshot {
    pub fn untracked() -> Self {
        Self {
            tracking: Tracking::Untracked,
            tracking_id: None,
            progress: 0.0,
        }
    }

    pub fn active_gesture(&self) -> Option<Gesture> {
        match self.tracking {
            Tracking::Active(gesture) => Some(gesture),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GestureChannel {
    progress: f32,
    counter: u32,
    fired_since_reset: bool,
}

pub struct GestureStabilizer {
    window: u32,
    channels: [GestureChannel; CHANNEL_COUNT],
    tracking_id: Option<u64>,
    tracked: bool,
    active: Option<Gesture>,
    last_progress: f32,
    snapshot_tx: watch::Sender<GestureSnapshot>,
}

impl GestureStabilizer {
    pub fn new(window: u32) -> Self {
        let (snapshot_tx, _) = watch::channel(GestureSnapshot::untracked());
        debug!("GestureStabilizer initialized: window={} frames", window);
        Self {
            window,
            channels: [GestureChannel::default(); CHANNEL_COUNT],
            tracking_id: None,
            tracked: false,
            active: None,
            last_progress: 0.0,
            snapshot_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GestureSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> GestureSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Last progress recorded for a channel.
    pub fn progress(&self, gesture: Gesture) -> f32 {
        self.channels[gesture.index()].progress
    }

    /// Feed one progress value for one channel.
    pub fn observe(&mut self, gesture: Gesture, progress: f32) -> Option<DiscreteEvent> {
        self.tracked = true;
        let event = self.evaluate(gesture, progress);
        self.publish();
        event
    }

    /// Feed a whole frame. `None` means the sensor delivered nothing this cycle.
    pub fn observe_frame(&mut self, frame: Option<&SensorFrame>) -> Option<DiscreteEvent> {
        let frame = frame?;

        if frame.tracking_lost {
            self.lose_tracking();
            return None;
        }

        if let Some(id) = frame.tracking_id {
            self.track(id);
        }
        self.tracked = true;

        let mut readings = [None; CHANNEL_COUNT];
        for (name, &progress) in &frame.progress {
            match Gesture::from_name(name) {
                Some(gesture) => readings[gesture.index()] = Some(progress),
                None => debug!("Ignoring progress for unknown gesture '{}'", name),
            }
        }

        let mut fired = None;
        for gesture in Gesture::ALL {
            let Some(progress) = readings[gesture.index()] else {
                continue;
            };

            if fired.is_some() {
                // One discrete event per pass; later channels only record progress.
                self.channels[gesture.index()].progress = progress.max(0.0);
                continue;
            }
            fired = self.evaluate(gesture, progress);
        }

        self.publish();
        fired
    }

    /// Associate the stabilizer with a subject. A new id starts from a clean slate.
    pub fn track(&mut self, tracking_id: u64) {
        if self.tracking_id != Some(tracking_id) {
            if self.tracking_id.is_some() {
                info!("Tracking id changed to {}, resetting gesture channels", tracking_id);
            }
            self.reset_channels();
            self.tracking_id = Some(tracking_id);
        }
    }

    pub fn lose_tracking(&mut self) {
        info!("Tracking id lost, resetting gesture channels");
        self.reset_channels();
        self.tracking_id = None;
        self.tracked = false;
        self.publish();
    }

    fn evaluate(&mut self, gesture: Gesture, progress: f32) -> Option<DiscreteEvent> {
        if progress.is_nan() {
            return None;
        }
        let progress = progress.max(0.0);
        self.last_progress = progress;

        let window = self.window;
        let channel = &mut self.channels[gesture.index()];
        channel.progress = progress;

        if progress < TRIGGER_PROGRESS {
            return None;
        }

        if channel.fired_since_reset {
            channel.counter += 1;
            if channel.counter < window {
                return None;
            }
        }

        channel.counter = 0;
        channel.fired_since_reset = true;
        self.active = Some(gesture);

        debug!("Gesture {} fired at progress {:.2}", gesture.label(), progress);
        Some(DiscreteEvent {
            gesture,
            confidence: progress,
        })
    }

    fn reset_channels(&mut self) {
        self.channels = [GestureChannel::default(); CHANNEL_COUNT];
        self.active = None;
        self.last_progress = 0.0;
    }

    fn publish(&self) {
        let tracking = match (self.tracked, self.active) {
            (false, _) => Tracking::Untracked,
            (true, Some(gesture)) => Tracking::Active(gesture),
            (true, None) => Tracking::Idle,
        };
        self.snapshot_tx.send_replace(GestureSnapshot {
            tracking,
            tracking_id: self.tracking_id,
            progress: self.last_progress,
        });
    }
}
