use anyhow::Result;
use serde::{Deserialize, Serialize};
use shared::NewContextRequest;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default = "Config::default")]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    InProcess,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HubConfig {
    #[serde(default = "default_hub_host")]
    pub host: String,
    #[serde(default = "default_hub_port")]
    pub port: u16,
    #[serde(default = "default_embedded")]
    pub embedded: bool,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: default_hub_host(),
            port: default_hub_port(),
            embedded: default_embedded(),
            transport: Transport::default(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl HubConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_hub_host() -> String {
    "localhost".to_string()
}
fn default_hub_port() -> u16 {
    8000
}
fn default_embedded() -> bool {
    true
}
fn default_broadcast_capacity() -> usize {
    100
}

/// Identity a modality announces in its `NewContextRequest`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    pub source: String,
    pub target: String,
    pub session_id: String,
    pub medium: String,
    pub mode: String,
}

impl SessionConfig {
    fn new(source: &str, session_id: &str, medium: &str) -> Self {
        Self {
            source: source.to_string(),
            target: "FUSION".to_string(),
            session_id: session_id.to_string(),
            medium: medium.to_string(),
            mode: "command".to_string(),
        }
    }

    pub fn request(&self) -> NewContextRequest {
        NewContextRequest {
            source: self.source.clone(),
            target: self.target.clone(),
            session_id: self.session_id.clone(),
            medium: self.medium.clone(),
            mode: self.mode.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionsConfig {
    #[serde(default = "default_gestures_session")]
    pub gestures: SessionConfig,
    #[serde(default = "default_speech_session")]
    pub speech: SessionConfig,
    #[serde(default = "default_dispatcher_session")]
    pub dispatcher: SessionConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            gestures: default_gestures_session(),
            speech: default_speech_session(),
            dispatcher: default_dispatcher_session(),
        }
    }
}

fn default_gestures_session() -> SessionConfig {
    SessionConfig::new("GESTURES", "gestures-1", "visual")
}
fn default_speech_session() -> SessionConfig {
    SessionConfig::new("ASR", "speech-1", "acoustic")
}
fn default_dispatcher_session() -> SessionConfig {
    SessionConfig::new("GUI", "dispatcher-1", "visual")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GestureConfig {
    #[serde(default = "default_hysteresis_frames")]
    pub hysteresis_frames: u32,
    #[serde(default = "default_frame_socket")]
    pub frame_socket: String,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            hysteresis_frames: default_hysteresis_frames(),
            frame_socket: default_frame_socket(),
        }
    }
}

fn default_hysteresis_frames() -> u32 {
    15
}
fn default_frame_socket() -> String {
    "/tmp/fusiond-frames.sock".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_port")]
    pub port: u16,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_seconds: u64,
    #[serde(default = "default_armor_threshold")]
    pub armor_threshold: i32,
    #[serde(default = "default_money_threshold")]
    pub money_threshold: i32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            port: default_telemetry_port(),
            settle_delay_seconds: default_settle_delay(),
            armor_threshold: default_armor_threshold(),
            money_threshold: default_money_threshold(),
        }
    }
}

impl TelemetryConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_seconds)
    }
}

fn default_telemetry_port() -> u16 {
    3000
}
fn default_settle_delay() -> u64 {
    17
}
fn default_armor_threshold() -> i32 {
    70
}
fn default_money_threshold() -> i32 {
    4500
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SpeechConfig {
    #[serde(default = "default_word_duration_ms")]
    pub word_duration_ms: u64,
    #[serde(default = "default_repeat_prompt")]
    pub repeat_prompt: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            word_duration_ms: default_word_duration_ms(),
            repeat_prompt: default_repeat_prompt(),
        }
    }
}

fn default_word_duration_ms() -> u64 {
    350
}
fn default_repeat_prompt() -> String {
    "Sorry, could you repeat that?".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct ControlConfig {
    /// Falls back to the runtime directory when unset.
    #[serde(default)]
    pub socket_path: Option<String>,
}

impl ControlConfig {
    pub fn socket_path(&self) -> PathBuf {
        match &self.socket_path {
            Some(path) => PathBuf::from(path),
            None => dirs::runtime_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("fusiond.sock"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RateLimitConfig {
    #[serde(default = "default_commands_per_second")]
    pub commands_per_second: u32,
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            commands_per_second: default_commands_per_second(),
            burst_capacity: default_burst_capacity(),
            enabled: default_rate_limit_enabled(),
        }
    }
}

fn default_commands_per_second() -> u32 {
    10
}
fn default_burst_capacity() -> u32 {
    20
}
fn default_rate_limit_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            sessions: SessionsConfig::default(),
            gestures: GestureConfig::default(),
            telemetry: TelemetryConfig::default(),
            speech: SpeechConfig::default(),
            control: ControlConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    match get_config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::warn!("No config directory available, using defaults");
            Ok(Config::default())
        }
    }
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

    tracing::info!("Config loaded successfully");
    Ok(config)
}

fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fusion").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.hub.host, "localhost");
        assert_eq!(config.hub.port, 8000);
        assert!(config.hub.embedded);
        assert_eq!(config.hub.transport, Transport::Tcp);
        assert_eq!(config.hub.address(), "localhost:8000");

        assert_eq!(config.sessions.gestures.source, "GESTURES");
        assert_eq!(config.sessions.gestures.session_id, "gestures-1");
        assert_eq!(config.sessions.speech.medium, "acoustic");
        assert_eq!(config.sessions.dispatcher.source, "GUI");

        assert_eq!(config.gestures.hysteresis_frames, 15);
        assert_eq!(config.telemetry.port, 3000);
        assert_eq!(config.telemetry.settle_delay(), Duration::from_secs(17));
        assert_eq!(config.telemetry.armor_threshold, 70);
        assert_eq!(config.telemetry.money_threshold, 4500);

        assert_eq!(config.speech.word_duration_ms, 350);
        assert!(config.control.socket_path.is_none());

        assert_eq!(config.rate_limit.commands_per_second, 10);
        assert_eq!(config.rate_limit.burst_capacity, 20);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[hub]"));
        assert!(toml_str.contains("[gestures]"));
        assert!(toml_str.contains("[telemetry]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_with_missing_fields_uses_defaults() {
        let toml_str = r#"
            [hub]
            port = 9876
            transport = "inprocess"

            [gestures]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.hub.port, 9876);
        assert_eq!(config.hub.host, "localhost");
        assert_eq!(config.hub.transport, Transport::InProcess);
        assert_eq!(config.gestures.hysteresis_frames, 15);
        assert_eq!(config.telemetry.settle_delay_seconds, 17);
    }

    #[test]
    fn test_config_with_custom_session() {
        let toml_str = r#"
            [sessions.gestures]
            source = "KINECT"
            target = "HUB"
            session_id = "kinect-7"
            medium = "visual"
            mode = "command"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let request = config.sessions.gestures.request();
        assert_eq!(request.source, "KINECT");
        assert_eq!(request.session_id, "kinect-7");
        assert_eq!(config.sessions.speech, default_speech_session());
    }

    #[test]
    fn test_config_with_invalid_types() {
        let toml_str = r#"
            [gestures]
            hysteresis_frames = "many"
        "#;
        let result: Result<Config, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_control_socket_override() {
        let control = ControlConfig {
            socket_path: Some("/tmp/custom.sock".to_string()),
        };
        assert_eq!(control.socket_path(), PathBuf::from("/tmp/custom.sock"));
        assert!(ControlConfig::default()
            .socket_path()
            .ends_with("fusiond.sock"));
    }

    #[test]
    fn test_load_config_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\nsettle_delay_seconds = 5\nport = 3100").unwrap();
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.telemetry.settle_delay_seconds, 5);
        assert_eq!(config.telemetry.port, 3100);
    }

    #[test]
    fn test_load_config_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml content [unclosed").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
