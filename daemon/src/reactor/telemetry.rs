//! Game-state-integration push model and the HTTP endpoint that receives it.
//!
//! The game posts its whole state as JSON on every change. Only the fields
//! the reactor mirrors are modelled; everything else is ignored and every
//! modelled field defaults when absent.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Live,
    FreezeTime,
    Over,
    #[default]
    #[serde(other)]
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BombState {
    Planted,
    Exploded,
    Defused,
    #[default]
    #[serde(other)]
    Undefined,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiPayload {
    pub map: GsiMap,
    pub round: GsiRound,
    pub player: GsiPlayer,
    pub previously: GsiPreviously,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiMap {
    pub round: u32,
    pub current_spectators: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiRound {
    pub phase: RoundPhase,
    pub bomb: BombState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiPlayer {
    pub state: GsiPlayerState,
    pub match_stats: GsiMatchStats,
    pub weapons: HashMap<String, GsiWeapon>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiPlayerState {
    pub health: i32,
    pub armor: i32,
    pub money: i32,
    pub round_kills: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiMatchStats {
    pub kills: i32,
    pub deaths: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiWeapon {
    pub state: String,
    pub ammo_clip: i32,
    pub ammo_clip_max: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GsiPreviously {
    pub round: GsiRound,
}

/// Flat, read-only view of one telemetry push.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub phase: RoundPhase,
    pub bomb: BombState,
    /// Bomb state the previous push reported; `Undefined` when it did not change.
    pub previous_bomb: BombState,
    pub round_number: u32,
    pub money: i32,
    pub health: i32,
    pub armor: i32,
    pub ammo_clip: i32,
    pub ammo_clip_max: i32,
    pub round_kills: i32,
    pub match_kills: i32,
    pub match_deaths: i32,
    pub spectators: i32,
}

impl From<GsiPayload> for TelemetrySnapshot {
    fn from(payload: GsiPayload) -> Self {
        let active = payload
            .player
            .weapons
            .values()
            .find(|w| w.state == "active");

        Self {
            phase: payload.round.phase,
            bomb: payload.round.bomb,
            previous_bomb: payload.previously.round.bomb,
            round_number: payload.map.round,
            money: payload.player.state.money,
            health: payload.player.state.health,
            armor: payload.player.state.armor,
            ammo_clip: active.map(|w| w.ammo_clip).unwrap_or_default(),
            ammo_clip_max: active.map(|w| w.ammo_clip_max).unwrap_or_default(),
            round_kills: payload.player.state.round_kills,
            match_kills: payload.player.match_stats.kills,
            match_deaths: payload.player.match_stats.deaths,
            spectators: payload.map.current_spectators,
        }
    }
}

pub fn router(tx: mpsc::Sender<TelemetrySnapshot>) -> Router {
    Router::new().route("/", post(ingest)).with_state(tx)
}

async fn ingest(
    State(tx): State<mpsc::Sender<TelemetrySnapshot>>,
    Json(payload): Json<GsiPayload>,
) -> StatusCode {
    let snapshot = TelemetrySnapshot::from(payload);
    debug!("Telemetry push for round {}", snapshot.round_number);
    match tx.send(snapshot).await {
        Ok(()) => StatusCode::OK,
        Err(_) => {
            warn!("Game state reactor is gone, dropping telemetry");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening for game telemetry on {}", listener.local_addr()?);
    Ok(listener)
}

pub async fn serve(listener: TcpListener, tx: mpsc::Sender<TelemetrySnapshot>) -> anyhow::Result<()> {
    axum::serve(listener, router(tx)).await?;
    Ok(())
}
