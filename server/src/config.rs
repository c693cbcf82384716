//! Server configuration loaded from a TOML file
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable server with the stock channel list and no accounts.

use serde::{Deserialize, Serialize};
use shared::Privileges;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub channels: Vec<ChannelConfig>,
    pub accounts: Vec<AccountConfig>,
    pub beatmaps: Vec<BeatmapConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Sessions that have not polled for this long are logged out
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    /// Upper bound on any call to an external collaborator
    pub collaborator_timeout_ms: u64,
    /// Window after startup in which unknown tokens are told the server restarted
    pub restart_grace_secs: u64,
    pub welcome_message: String,
    pub command_prefix: String,
    /// Accepted client builds; empty accepts every build
    pub allowed_builds: Vec<String>,
    pub first_match_id: i16,
    pub journal_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub id: i32,
    pub username: String,
    pub country: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub auto_join: bool,
    #[serde(default)]
    pub staff: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: i32,
    pub username: String,
    /// Hex MD5 of the password, as the client sends it
    pub password_md5: String,
    #[serde(default = "default_privileges")]
    pub privileges: u32,
    #[serde(default)]
    pub country: u8,
    #[serde(default)]
    pub friends: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatmapConfig {
    pub id: i32,
    pub hash: String,
    pub title: String,
    #[serde(default)]
    pub mode: u8,
}

fn default_true() -> bool {
    true
}

fn default_privileges() -> u32 {
    (Privileges::USER | Privileges::VERIFIED).bits()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            idle_timeout_secs: 30,
            sweep_interval_secs: 5,
            collaborator_timeout_ms: 2000,
            restart_grace_secs: 20,
            welcome_message: "Welcome to bancho!".to_string(),
            command_prefix: "!".to_string(),
            allowed_builds: Vec::new(),
            first_match_id: 1000,
            journal_path: None,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            id: 1,
            username: "BanchoBot".to_string(),
            country: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let channel = |name: &str, topic: &str| ChannelConfig {
            name: name.to_string(),
            topic: topic.to_string(),
            public: true,
            read_only: false,
            auto_join: false,
            staff: false,
        };

        Self {
            server: ServerConfig::default(),
            bot: BotConfig::default(),
            channels: vec![
                ChannelConfig {
                    auto_join: true,
                    ..channel("#osu", "General discussion.")
                },
                channel("#lobby", "Multiplayer lobby discussion."),
                ChannelConfig {
                    read_only: true,
                    auto_join: true,
                    ..channel("#announce", "Server announcements.")
                },
                ChannelConfig {
                    public: false,
                    staff: true,
                    ..channel("#staff", "Staff only.")
                },
            ],
            accounts: Vec::new(),
            beatmaps: Vec::new(),
        }
    }
}

impl Config {
    /// Reads and parses a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.server.sweep_interval_secs.max(1))
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.server.collaborator_timeout_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.server.restart_grace_secs)
    }
}
