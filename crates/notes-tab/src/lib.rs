//! notes-tab library: the native host for one editor tab.
//!
//! Exposes the tab session and its plumbing so the binary and the
//! integration tests share one implementation.

pub mod commands;
pub mod config;
pub mod connection;
pub mod debounce;
pub mod message;
pub mod relay;
pub mod relay_channel;
pub mod storage;
pub mod tab;

// Re-export key types for convenience
pub use commands::{Command, CommandError};
pub use config::{ConfigError, TabConfig};
pub use debounce::Debouncer;
pub use message::JoinMessage;
pub use relay::RelayServer;
pub use relay_channel::{RelayBinding, RelayBroadcast};
pub use storage::FileStorage;
pub use tab::Tab;
