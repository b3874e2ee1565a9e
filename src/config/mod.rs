mod context;

pub use context::{ContextConfig, Viewport};

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{PilothouseError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Browser launch configuration
    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default wait for switch-page requests (ms)
    #[serde(default = "default_switch_timeout_ms")]
    pub switch_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            switch_timeout_ms: default_switch_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9377
}

fn default_switch_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Default headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Base directory for per-browser user data dirs
    pub data_dir: Option<String>,

    /// Extra browser arguments appended to every launch
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: default_headless(),
            data_dir: None,
            extra_args: Vec::new(),
        }
    }
}

fn default_headless() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(&config_path))
            // Merge environment variables (PILOTHOUSE_*)
            .merge(Env::prefixed("PILOTHOUSE_").split("_"))
            .extract()
            .map_err(|e| PilothouseError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pilothouse")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilothouseError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory browser profiles live under
    pub fn data_dir(&self) -> PathBuf {
        match self.browser.data_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pilothouse")
                .join("profiles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_loopback() {
        let config = Config::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9377);
        assert!(config.browser.headless);
    }

    #[test]
    fn data_dir_expands_tilde() {
        let config = Config {
            browser: BrowserConfig {
                data_dir: Some("~/pilothouse-profiles".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let dir = config.data_dir();
        assert!(!dir.to_string_lossy().contains('~'));
        assert!(dir.to_string_lossy().ends_with("pilothouse-profiles"));
    }

    #[test]
    fn toml_round_trips() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();

        assert_eq!(back.server.port, config.server.port);
        assert_eq!(back.server.switch_timeout_ms, config.server.switch_timeout_ms);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let back: Config = toml::from_str("[server]\nport = 7000\n").unwrap();

        assert_eq!(back.server.port, 7000);
        assert_eq!(back.server.host, "127.0.0.1");
        assert!(back.browser.headless);
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_defaults() {
        std::env::set_var("PILOTHOUSE_SERVER_PORT", "7999");
        let config = Config::load().unwrap();
        std::env::remove_var("PILOTHOUSE_SERVER_PORT");

        assert_eq!(config.server.port, 7999);
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_browser_section() {
        std::env::set_var("PILOTHOUSE_BROWSER_HEADLESS", "false");
        let config = Config::load().unwrap();
        std::env::remove_var("PILOTHOUSE_BROWSER_HEADLESS");

        assert!(!config.browser.headless);
    }
}
