//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Protocol server and account settings.
    pub online: OnlineConfig,
    /// On-disk locations for downloaded and persisted data.
    pub paths: PathsConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Protocol server and account configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OnlineConfig {
    /// Server host name, without scheme or subdomain (e.g. `example.net`).
    pub server: String,
    /// Account name used for password logins.
    pub username: String,
    /// Plaintext password. Hashed and cleared on the next login attempt.
    pub password: String,
    /// MD5 hex digest of the password, 32 characters when set.
    pub password_md5: String,
    /// Long-lived token from the browser login flow. Empty for password logins.
    pub oauth_token: String,
    /// Log in automatically on startup.
    pub autologin: bool,
    /// Use `https://` for every request.
    pub use_https: bool,
    /// Submit scores when the server expresses no preference.
    pub submit_scores: bool,
    /// Alternate base URL for beatmap set downloads. Empty uses the server.
    pub beatmap_mirror_override: String,
    /// Custom URI scheme registered for browser login redirects.
    pub uri_scheme: String,
    /// Show a toast when a friend changes activity or goes offline.
    pub notify_friend_status: bool,
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for replays, avatars, and extracted beatmap sets.
    pub data_dir: PathBuf,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log the id of every received packet.
    pub debug_network: bool,
}

// --- Default implementations ---

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            username: String::new(),
            password: String::new(),
            password_md5: String::new(),
            oauth_token: String::new(),
            autologin: false,
            use_https: true,
            submit_scores: true,
            beatmap_mirror_override: String::new(),
            uri_scheme: "cadence".to_string(),
            notify_friend_status: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|dir| dir.join("cadence"))
                .unwrap_or_else(|| PathBuf::from("data")),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_network: false,
        }
    }
}

impl OnlineConfig {
    /// `https://` or `http://` depending on [`use_https`](Self::use_https).
    pub fn scheme(&self) -> &'static str {
        if self.use_https { "https://" } else { "http://" }
    }
}

impl PathsConfig {
    /// Directory holding replays downloaded from `server`.
    pub fn replays_dir(&self, server: &str) -> PathBuf {
        self.data_dir.join("replays").join(server)
    }

    /// Directory holding cached avatars from `server`.
    pub fn avatars_dir(&self, server: &str) -> PathBuf {
        self.data_dir.join("avatars").join(server)
    }

    /// Directory an extracted beatmap set lives in.
    pub fn beatmapset_dir(&self, set_id: i32) -> PathBuf {
        self.data_dir.join("maps").join(set_id.to_string())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
