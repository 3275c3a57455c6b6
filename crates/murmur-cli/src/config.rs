//! Configuration system for the MURMUR CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// MURMUR configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat session configuration
    pub chat: ChatConfig,
    /// Group key configuration
    pub group: GroupConfig,
    /// Engine tuning
    pub engine: EngineSection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Chat session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Multicast group address
    #[serde(default = "default_group_addr")]
    pub multicast_addr: String,
    /// UDP port shared by all group members
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username to chat under; prompted for when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Group key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Pre-shared group key, hex encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// File holding the hex-encoded group key
    #[serde(default = "default_key_path")]
    pub key_file: PathBuf,
}

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Seconds between presence rebroadcasts
    #[serde(default = "default_announce_secs")]
    pub announce_interval_secs: u64,
    /// Inbound datagram buffer size in bytes
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_group_addr() -> String {
    "239.255.42.7".to_string()
}

fn default_port() -> u16 {
    50407
}

fn default_key_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".murmur/group_key")
}

fn default_announce_secs() -> u64 {
    3
}

fn default_recv_buffer() -> usize {
    2048
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            multicast_addr: default_group_addr(),
            port: default_port(),
            username: None,
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            key: None,
            key_file: default_key_path(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            announce_interval_secs: default_announce_secs(),
            recv_buffer_size: default_recv_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("murmur/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Parse the multicast group address
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_multicast_addr(&self) -> anyhow::Result<Ipv4Addr> {
        Ok(self.chat.multicast_addr.parse()?)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let addr = self.parse_multicast_addr()?;
        if !addr.is_multicast() {
            anyhow::bail!(
                "Group address {} is not in the multicast range (224.0.0.0/4)",
                addr
            );
        }

        if self.chat.port == 0 {
            anyhow::bail!("Port must be non-zero");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.engine.announce_interval_secs == 0 {
            anyhow::bail!("Announce interval must be at least 1 second");
        }

        // Must fit at least an envelope header plus a small message
        if self.engine.recv_buffer_size < 64 || self.engine.recv_buffer_size > 64 * 1024 {
            anyhow::bail!("Receive buffer size must be between 64 bytes and 64KB");
        }

        Ok(())
    }
}
