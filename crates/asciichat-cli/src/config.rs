//! ASCII Chat CLI Configuration Management
//!
//! Configuration is layered with the following priority:
//! command line arguments > configuration file > defaults.
//!
//! The configuration file is TOML. When `--config` is not given, the file at
//! `<config dir>/asciichat/config.toml` is used if it exists.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use asciichat_core::{ConnectionConfig, PaletteColor, UserInfo};
use asciichat_runtime::{SessionConfig, SessionRole};

use crate::cli::Cli;

pub const DEFAULT_PORT: u16 = 5000;
pub const MIN_WIDTH: u16 = 40;
pub const MAX_WIDTH: u16 = 300;

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the ASCII chat CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub identity: IdentityConfig,
    pub session: SessionSettings,
    pub cli: CliConfig,
}

/// Where to listen or which peer to dial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub port: u16,
    /// Bind address in host mode
    pub bind: String,
    /// Peer host to dial; host mode when absent
    pub connect: Option<String>,
    pub connect_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

/// Identity announced to the peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub chat_color: String,
    pub theme_color: String,
}

/// Session tunables exposed to users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How long host mode waits for a peer
    pub accept_wait_secs: u64,
    pub video_queue_capacity: usize,
    pub max_consecutive_failures: u32,
    pub stats_interval_ms: u64,
}

/// Console front end options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub verbose: bool,
    pub colored_output: bool,
    /// Print received video frames instead of only counting them
    pub show_video: bool,
    /// Test-pattern width in characters
    pub width: u16,
    pub fps: u32,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: "0.0.0.0".to_string(),
            connect: None,
            connect_timeout_secs: 10,
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let identity = UserInfo::default();
        Self {
            name: identity.name,
            chat_color: identity.chat_color.to_string(),
            theme_color: identity.theme_color.to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            accept_wait_secs: 300,
            video_queue_capacity: 5,
            max_consecutive_failures: 5,
            stats_interval_ms: 1000,
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            colored_output: true,
            show_video: false,
            width: 80,
            fps: 15,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load from `path`, or from the default location when it exists
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileSystem(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents).map_err(|e| {
            ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML text; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/asciichat/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("asciichat").join("config.toml"))
    }

    /// Layer command line arguments on top, then validate the result
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if cli.host {
            self.network.connect = None;
        }
        if let Some(connect) = &cli.connect {
            self.network.connect = Some(connect.clone());
        }
        if let Some(port) = cli.port {
            self.network.port = port;
        }
        if let Some(bind) = &cli.bind {
            self.network.bind = bind.clone();
        }
        if let Some(name) = &cli.name {
            self.identity.name = name.clone();
        }
        if let Some(color) = &cli.chat_color {
            self.identity.chat_color = color.clone();
        }
        if let Some(color) = &cli.theme_color {
            self.identity.theme_color = color.clone();
        }
        if let Some(width) = cli.width {
            self.cli.width = width;
        }
        if let Some(fps) = cli.fps {
            self.cli.fps = fps;
        }
        if cli.verbose {
            self.cli.verbose = true;
        }
        self.validate()
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.port == 0 {
            return Err(ConfigError::Validation(
                "Invalid port number: 0 (must be 1-65535)".to_string(),
            ));
        }
        if self.network.bind.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Bind address must not be empty".to_string(),
            ));
        }
        if let Some(connect) = &self.network.connect {
            if connect.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Peer host must not be empty".to_string(),
                ));
            }
        }
        if self.network.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }
        if self.network.heartbeat_interval_secs == 0
            || self.network.heartbeat_timeout_secs <= self.network.heartbeat_interval_secs
        {
            return Err(ConfigError::Validation(format!(
                "Heartbeat timeout ({}s) must exceed a non-zero interval ({}s)",
                self.network.heartbeat_timeout_secs, self.network.heartbeat_interval_secs
            )));
        }

        if self.identity.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Display name must not be empty".to_string(),
            ));
        }
        parse_color(&self.identity.chat_color)?;
        parse_color(&self.identity.theme_color)?;

        if self.session.accept_wait_secs == 0 {
            return Err(ConfigError::Validation(
                "Accept wait must be greater than 0".to_string(),
            ));
        }
        if self.session.video_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "Video queue capacity must be at least 1".to_string(),
            ));
        }
        if self.session.max_consecutive_failures == 0 {
            return Err(ConfigError::Validation(
                "Failure limit must be at least 1".to_string(),
            ));
        }
        if self.session.stats_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Statistics interval must be greater than 0".to_string(),
            ));
        }

        if !(MIN_WIDTH..=MAX_WIDTH).contains(&self.cli.width) {
            return Err(ConfigError::Validation(format!(
                "Invalid width: {} (must be {}-{})",
                self.cli.width, MIN_WIDTH, MAX_WIDTH
            )));
        }
        if self.cli.fps == 0 || self.cli.fps > 60 {
            return Err(ConfigError::Validation(format!(
                "Invalid frame rate: {} (must be 1-60)",
                self.cli.fps
            )));
        }

        Ok(())
    }

    /// Identity announced during the handshake
    pub fn local_identity(&self) -> Result<UserInfo, ConfigError> {
        Ok(UserInfo::new(
            self.identity.name.trim(),
            parse_color(&self.identity.chat_color)?,
            parse_color(&self.identity.theme_color)?,
        ))
    }

    /// Translate into the runtime's session configuration
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let role = match &self.network.connect {
            Some(host) => SessionRole::Dial {
                remote: host_port(host, self.network.port),
            },
            None => SessionRole::Listen {
                bind: host_port(&self.network.bind, self.network.port),
            },
        };

        let connection = ConnectionConfig::default()
            .with_heartbeat(
                Duration::from_secs(self.network.heartbeat_interval_secs),
                Duration::from_secs(self.network.heartbeat_timeout_secs),
            )
            .with_connect_timeout(Duration::from_secs(self.network.connect_timeout_secs))
            .with_video_queue_capacity(self.session.video_queue_capacity);

        let config = SessionConfig {
            role,
            ..SessionConfig::default()
        }
        .with_local(self.local_identity()?)
        .with_connection(connection)
        .with_accept_wait(Duration::from_secs(self.session.accept_wait_secs))
        .with_stats_interval(Duration::from_millis(self.session.stats_interval_ms))
        .with_max_consecutive_failures(self.session.max_consecutive_failures);

        config
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(config)
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = AppConfig {
            network: NetworkConfig {
                connect: Some("192.168.1.20".to_string()),
                ..Default::default()
            },
            identity: IdentityConfig {
                name: "alice".to_string(),
                chat_color: "cyan".to_string(),
                theme_color: "magenta".to_string(),
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

/// `host:port`, bracketing IPv6 literals such as `::1`
fn host_port(host: &str, port: u16) -> String {
    let host = host.trim();
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn parse_color(name: &str) -> Result<PaletteColor, ConfigError> {
    name.parse().map_err(|_| {
        let valid: Vec<&str> = PaletteColor::ALL.iter().map(|c| c.name()).collect();
        ConfigError::Validation(format!(
            "Invalid color '{}'. Valid colors: {}",
            name,
            valid.join(", ")
        ))
    })
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.port, 5000);
        assert_eq!(config.network.bind, "0.0.0.0");
        assert_eq!(config.network.connect, None);
        assert_eq!(config.identity.chat_color, "white");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [network]
            port = 6000

            [identity]
            name = "alice"
            chat_color = "Cyan"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.port, 6000);
        assert_eq!(config.network.bind, "0.0.0.0");
        assert_eq!(config.identity.name, "alice");
        assert_eq!(config.cli.fps, 15);
        assert_eq!(
            config.local_identity().unwrap().chat_color,
            PaletteColor::Cyan
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.cli.width = 39;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        config.cli.width = 301;
        assert!(config.validate().is_err());
        config.cli.width = 300;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.identity.chat_color = "orange".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.heartbeat_timeout_secs = config.network.heartbeat_interval_secs;
        assert!(config.validate().is_err());

        assert!(AppConfig::from_toml_str("[network]\nport = \"five\"").is_err());
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let mut config =
            AppConfig::from_toml_str("[network]\nconnect = \"10.0.0.9\"\nport = 6000").unwrap();
        let cli = Cli::try_parse_from(["asciichat", "--host", "--name", "bob", "--width", "120"])
            .unwrap();
        config.apply_cli(&cli).unwrap();

        assert_eq!(config.network.connect, None);
        assert_eq!(config.network.port, 6000);
        assert_eq!(config.identity.name, "bob");
        assert_eq!(config.cli.width, 120);

        let cli = Cli::try_parse_from(["asciichat", "--host", "--width", "20"]).unwrap();
        assert!(config.apply_cli(&cli).is_err());
    }

    #[test]
    fn test_session_config_roles() {
        let mut config = AppConfig::default();
        let session = config.session_config().unwrap();
        assert_eq!(
            session.role,
            SessionRole::Listen {
                bind: "0.0.0.0:5000".to_string()
            }
        );

        config.network.connect = Some("10.0.0.2".to_string());
        config.identity.name = "carol".to_string();
        let session = config.session_config().unwrap();
        assert_eq!(
            session.role,
            SessionRole::Dial {
                remote: "10.0.0.2:5000".to_string()
            }
        );
        assert_eq!(session.local.name, "carol");
        assert_eq!(session.connection.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let mut config = AppConfig::default();
        config.network.bind = "::".to_string();
        assert_eq!(
            config.session_config().unwrap().role,
            SessionRole::Listen {
                bind: "[::]:5000".to_string()
            }
        );

        config.network.connect = Some(" ::1 ".to_string());
        let role = config.session_config().unwrap().role;
        assert_eq!(
            role,
            SessionRole::Dial {
                remote: "[::1]:5000".to_string()
            }
        );
        let SessionRole::Dial { remote } = role else {
            unreachable!();
        };
        assert!(remote.parse::<std::net::SocketAddr>().is_ok());

        config.network.connect = Some("[fe80::1]".to_string());
        assert_eq!(
            config.session_config().unwrap().role,
            SessionRole::Dial {
                remote: "[fe80::1]:5000".to_string()
            }
        );
    }

    #[test]
    fn test_example_config_parses() {
        let example = AppConfig::example_config();
        let config = AppConfig::from_toml_str(&example).unwrap();
        assert_eq!(config.identity.name, "alice");
        assert_eq!(config.network.connect.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("asciichat-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[cli]\nfps = 10\nshow_video = true\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cli.fps, 10);
        assert!(config.cli.show_video);

        std::fs::write(&path, "[cli]\nfps = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Validation(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/asciichat.toml")));
        assert!(matches!(result, Err(ConfigError::FileSystem(_))));
    }
}
