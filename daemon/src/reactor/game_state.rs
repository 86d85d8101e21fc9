use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::telemetry::{BombState, RoundPhase, TelemetrySnapshot};
use crate::config::TelemetryConfig;

/// Money a player starts a match with.
const STARTING_MONEY: i32 = 800;

/// Round state mirrored from telemetry. Written only by [`GameStateReactor`].
#[derive(Debug, Clone, PartialEq)]
pub struct GameRoundState {
    pub round_number: u32,
    pub money: i32,
    pub bomb_planted: bool,
    pub armor: i32,
    pub health: i32,
    pub ammo_clip: i32,
    pub ammo_clip_max: i32,
    pub round_kills: i32,
    pub match_kills: i32,
    pub match_deaths: i32,
    pub spectators: i32,
    /// Last round number advice was scheduled for. Never decreases.
    pub round_counter: u32,
}

impl Default for GameRoundState {
    fn default() -> Self {
        Self {
            round_number: 0,
            money: STARTING_MONEY,
            bomb_planted: false,
            armor: 0,
            health: 0,
            ammo_clip: 0,
            ammo_clip_max: 0,
            round_kills: 0,
            match_kills: 0,
            match_deaths: 0,
            spectators: 0,
            round_counter: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    BombPlanted,
    BuyArmor { armor: i32 },
    BuyKit { money: i32 },
}

impl Advisory {
    pub fn message(&self) -> String {
        match self {
            Self::BombPlanted => {
                "The bomb has been planted, it will explode in 45 seconds".to_string()
            }
            Self::BuyArmor { armor } => {
                format!("Your armor is at {}, consider buying a helmet", armor)
            }
            Self::BuyKit { money } => format!("You have {} dollars, you can buy a kit", money),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdvisoryPolicy {
    pub settle_delay: Duration,
    pub armor_threshold: i32,
    pub money_threshold: i32,
}

impl From<&TelemetryConfig> for AdvisoryPolicy {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            armor_threshold: config.armor_threshold,
            money_threshold: config.money_threshold,
        }
    }
}

impl AdvisoryPolicy {
    pub fn evaluate(&self, state: &GameRoundState) -> Vec<Advisory> {
        let mut advice = Vec::new();
        if state.armor <= self.armor_threshold {
            advice.push(Advisory::BuyArmor { armor: state.armor });
        }
        if state.money >= self.money_threshold {
            advice.push(Advisory::BuyKit { money: state.money });
        }
        advice
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactorOutcome {
    pub immediate: Vec<Advisory>,
    /// Round whose purchase advice was scheduled by this snapshot.
    pub scheduled_round: Option<u32>,
}

/// Watches telemetry for bomb plants and round changes.
pub struct GameStateReactor {
    state: GameRoundState,
    policy: AdvisoryPolicy,
    state_tx: watch::Sender<GameRoundState>,
    advisories: mpsc::UnboundedSender<Advisory>,
    pending: HashMap<u32, JoinHandle<()>>,
}

impl GameStateReactor {
    pub fn new(policy: AdvisoryPolicy, advisories: mpsc::UnboundedSender<Advisory>) -> Self {
        let state = GameRoundState::default();
        let (state_tx, _) = watch::channel(state.clone());
        Self {
            state,
            policy,
            state_tx,
            advisories,
            pending: HashMap::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GameRoundState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &GameRoundState {
        &self.state
    }

    pub fn on_snapshot(&mut self, snapshot: &TelemetrySnapshot) -> ReactorOutcome {
        let mut next = self.state.clone();
        let mut outcome = ReactorOutcome::default();

        if !next.bomb_planted
            && snapshot.phase == RoundPhase::Live
            && snapshot.bomb == BombState::Planted
            && snapshot.previous_bomb == BombState::Undefined
        {
            info!("Bomb has been planted");
            next.bomb_planted = true;
            outcome.immediate.push(Advisory::BombPlanted);
        } else if next.bomb_planted && snapshot.phase == RoundPhase::FreezeTime {
            debug!("Freeze time observed, clearing bomb plant");
            next.bomb_planted = false;
        }

        next.money = snapshot.money;
        next.round_number = snapshot.round_number;
        next.ammo_clip = snapshot.ammo_clip;
        next.ammo_clip_max = snapshot.ammo_clip_max;
        next.health = snapshot.health;
        next.armor = snapshot.armor;
        next.round_kills = snapshot.round_kills;
        next.match_kills = snapshot.match_kills;
        next.match_deaths = snapshot.match_deaths;
        next.spectators = snapshot.spectators;

        let advanced = next.round_counter < next.round_number;
        if advanced {
            next.round_counter = next.round_number;
        }

        self.state = next;
        self.state_tx.send_replace(self.state.clone());

        if advanced && self.schedule(self.state.round_number) {
            outcome.scheduled_round = Some(self.state.round_number);
        }

        for advisory in &outcome.immediate {
            let _ = self.advisories.send(advisory.clone());
        }
        outcome
    }

    /// At most one evaluation per round number. It reads whatever state is
    /// current once the settle delay has passed.
    fn schedule(&mut self, round: u32) -> bool {
        self.pending.retain(|_, handle| !handle.is_finished());
        if self.pending.contains_key(&round) {
            return false;
        }

        let policy = self.policy.clone();
        let state_rx = self.state_tx.subscribe();
        let advisories = self.advisories.clone();
        info!(
            "Round {} started, evaluating purchase advice in {:?}",
            round, policy.settle_delay
        );

        let handle = tokio::spawn(async move {
            tokio::time::sleep(policy.settle_delay).await;
            let state = state_rx.borrow().clone();
            let advice = policy.evaluate(&state);
            debug!("Round {} purchase advice: {:?}", round, advice);
            for advisory in advice {
                if advisories.send(advisory).is_err() {
                    break;
                }
            }
        });
        self.pending.insert(round, handle);
        true
    }

    pub fn stop(&mut self) {
        for (round, handle) in self.pending.drain() {
            debug!("Cancelling advice for round {}", round);
            handle.abort();
        }
    }

    /// Single writer loop: one snapshot at a time, never blocked by pending advice.
    pub async fn run(mut self, mut rx: mpsc::Receiver<TelemetrySnapshot>) {
        info!("Game state reactor started");
        while let Some(snapshot) = rx.recv().await {
            self.on_snapshot(&snapshot);
        }
        info!("Telemetry channel closed, stopping game state reactor");
        self.stop();
    }
}

impl Drop for GameStateReactor {
    fn drop(&mut self) {
        self.stop();
    }
}
