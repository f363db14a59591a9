// Library interface for rover-console
// The binary and the integration tests both drive the session through these modules

pub mod channel;
pub mod config;
pub mod console;
pub mod control;
pub mod errors;
pub mod event_log;
pub mod frames;
pub mod replay;
pub mod safety;
pub mod session;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use channel::{Channel, ChannelClient, ChannelSettings, Command, Inbound, MockChannel};
pub use config::ConsoleConfig;
pub use control::{ControlStateMachine, DriveMode, PerceptionMode, Rejection};
pub use errors::ConsoleError;
pub use session::{Session, SessionSettings};
