pub mod bus;
pub mod config;
pub mod dispatch;
pub mod gesture;
pub mod output;
pub mod rate_limit;
pub mod reactor;
pub mod server;
pub mod state;

pub use bus::{CommandBus, Connector, HubServer, LocalHub};
pub use dispatch::{CommandDispatcher, LoggedSpeech, SpeechGate};
pub use gesture::{GestureModality, GestureStabilizer};
pub use output::VirtualKeyboard;
pub use rate_limit::CommandRateLimiter;
pub use reactor::GameStateReactor;
pub use server::DaemonServer;
pub use state::DaemonState;
