use notes_core::DEFAULT_CHANNEL;
use std::path::PathBuf;
use std::time::Duration;

/// Default relay listen address.
pub const DEFAULT_RELAY_LISTEN: &str = "127.0.0.1:4517";

/// Default data directory (tilde expanded at load).
pub const DEFAULT_DATA_DIR: &str = "~/.notes-tab";

/// Quiet period before a title edit is committed.
pub const DEFAULT_TITLE_DELAY_MS: u64 = 500;

/// Quiet period before a content edit is committed and broadcast.
pub const DEFAULT_CONTENT_DELAY_MS: u64 = 1000;

/// Settings for one tab process.
#[derive(Debug, Clone)]
pub struct TabConfig {
    /// Directory holding the persisted store
    pub data_dir: PathBuf,
    /// Relay to join (None = single-tab mode)
    pub relay_url: Option<String>,
    /// Replication channel name
    pub channel: String,
    pub title_delay: Duration,
    pub content_delay: Duration,
}

impl TabConfig {
    /// Build a config from raw option values, expanding `~` in the data dir.
    pub fn new(
        data_dir: &str,
        relay_url: Option<String>,
        channel: &str,
        title_delay_ms: u64,
        content_delay_ms: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            data_dir: expand_tilde(data_dir),
            relay_url: relay_url.filter(|url| !url.trim().is_empty()),
            channel: channel.trim().to_string(),
            title_delay: Duration::from_millis(title_delay_ms),
            content_delay: Duration::from_millis(content_delay_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        if self.title_delay.is_zero() {
            return Err(ConfigError::ZeroDelay("title"));
        }
        if self.content_delay.is_zero() {
            return Err(ConfigError::ZeroDelay("content"));
        }
        if let Some(url) = &self.relay_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::InvalidRelayUrl(url.clone()));
            }
        }
        Ok(())
    }
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            data_dir: expand_tilde(DEFAULT_DATA_DIR),
            relay_url: None,
            channel: DEFAULT_CHANNEL.to_string(),
            title_delay: Duration::from_millis(DEFAULT_TITLE_DELAY_MS),
            content_delay: Duration::from_millis(DEFAULT_CONTENT_DELAY_MS),
        }
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Channel name must not be empty")]
    EmptyChannel,

    #[error("The {0} debounce delay must be greater than zero")]
    ZeroDelay(&'static str),

    #[error("Relay URL must start with ws:// or wss://, got {0}")]
    InvalidRelayUrl(String),
}
