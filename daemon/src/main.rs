use anyhow::{Context, Result};
use fusiond::bus::{Connector, HubServer, LocalHub};
use fusiond::config::{self, Transport};
use fusiond::dispatch::{CommandDispatcher, LoggedSpeech, SpeechGate};
use fusiond::gesture::{GestureModality, GestureStabilizer};
use fusiond::output::VirtualKeyboard;
use fusiond::reactor::{self, telemetry, AdvisoryPolicy, GameStateReactor};
use fusiond::server::DaemonServer;
use fusiond::state::DaemonState;
use shared::Modality;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("fusion daemon (fusiond) starting...");

    let config = config::load_config()?;

    let connector = match config.hub.transport {
        Transport::InProcess => {
            info!("Using in-process hub");
            Connector::InProcess(LocalHub::new(config.hub.broadcast_capacity))
        }
        Transport::Tcp => {
            let address = config.hub.address();
            if config.hub.embedded {
                let hub = HubServer::bind(&address)
                    .await
                    .with_context(|| format!("Failed to bind hub on {}", address))?;
                tokio::spawn(async move {
                    if let Err(e) = hub.run().await {
                        error!("Hub stopped: {}", e);
                    }
                });
            }
            Connector::Tcp {
                address,
                capacity: config.hub.broadcast_capacity,
            }
        }
    };

    // A session the hub refuses leaves that modality dead, so startup fails.
    let sessions = &config.sessions;
    let dispatcher_bus = connector
        .open(sessions.dispatcher.request())
        .await
        .context("Dispatcher handshake failed")?;
    let gestures_bus = connector
        .open(sessions.gestures.request())
        .await
        .context("Gesture handshake failed")?;
    let speech_bus = connector
        .open(sessions.speech.request())
        .await
        .context("Speech handshake failed")?;

    let speech = SpeechGate::new(LoggedSpeech::new(Duration::from_millis(
        config.speech.word_duration_ms,
    )));
    let keyboard = Arc::new(VirtualKeyboard::spawn());

    let dispatcher = CommandDispatcher::new(
        speech.clone(),
        keyboard.clone(),
        config.speech.repeat_prompt.clone(),
    )
    .with_source(sessions.gestures.source.clone(), Modality::Gestures)
    .with_source(sessions.speech.source.clone(), Modality::Speech);

    let stabilizer = GestureStabilizer::new(config.gestures.hysteresis_frames);
    let gesture_rx = stabilizer.subscribe();
    let gestures = GestureModality::new(stabilizer, gestures_bus.clone());

    let (advice_tx, advice_rx) = mpsc::unbounded_channel();
    let game = GameStateReactor::new(AdvisoryPolicy::from(&config.telemetry), advice_tx);
    let round_rx = game.subscribe();
    let (snapshot_tx, snapshot_rx) = mpsc::channel(64);

    let telemetry_listener = telemetry::bind(config.telemetry.port)
        .await
        .with_context(|| {
            format!(
                "Failed to bind telemetry endpoint on port {}",
                config.telemetry.port
            )
        })?;

    let state = Arc::new(DaemonState::new(
        config.clone(),
        gesture_rx,
        round_rx,
        speech_bus,
    ));

    tokio::spawn(dispatcher.run(dispatcher_bus.subscribe(), state.is_paused.clone()));
    tokio::spawn(game.run(snapshot_rx));
    tokio::spawn(reactor::speak_advisories(advice_rx, speech));
    tokio::spawn(async move {
        if let Err(e) = telemetry::serve(telemetry_listener, snapshot_tx).await {
            error!("Telemetry endpoint stopped: {}", e);
        }
    });

    let frame_socket = PathBuf::from(&config.gestures.frame_socket);
    tokio::spawn(async move {
        if let Err(e) = gestures.run(frame_socket).await {
            error!("Gesture modality stopped: {}", e);
        }
    });

    let server = DaemonServer::new(config.control.socket_path(), state);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    keyboard.shutdown();
    drop(dispatcher_bus);
    drop(gestures_bus);

    Ok(())
}
