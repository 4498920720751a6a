//! Configuration module
//!
//! Handles loading and saving station configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::console::Pairings;
use crate::input::DeviceId;
use crate::network::StationConfig;
use crate::protocol::{Mode, BASE_CHANNEL, DISCOVERY_PORT};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Control loop settings
    #[serde(default)]
    pub control: ControlConfig,

    /// Input settings
    #[serde(default)]
    pub input: InputConfig,

    /// Peer id to input device pairings applied at startup
    #[serde(default)]
    pub pairings: BTreeMap<String, DeviceId>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port peers announce themselves on
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// First channel handed out
    #[serde(default = "default_base_channel")]
    pub base_channel: u16,
    /// Interface to bind to (default: all)
    pub bind_address: Option<IpAddr>,
    /// Read timeout per transport tick in ms
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Seconds without an announcement before a peer is dropped
    #[serde(default = "default_liveness_window")]
    pub liveness_window_secs: u64,
    /// Allow sending to broadcast addresses
    #[serde(default = "default_true")]
    pub broadcast: bool,
}

fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}

fn default_base_channel() -> u16 {
    BASE_CHANNEL
}

/// Bounds for `read_timeout_ms`; one transport tick must stay short
const READ_TIMEOUT_RANGE_MS: (u64, u64) = (1, 100);

fn default_read_timeout() -> u64 {
    100
}

fn default_liveness_window() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            base_channel: default_base_channel(),
            bind_address: None,
            read_timeout_ms: default_read_timeout(),
            liveness_window_secs: default_liveness_window(),
            broadcast: default_true(),
        }
    }
}

impl NetworkConfig {
    /// Read timeout forced into 1..=100 ms
    pub fn clamped_read_timeout_ms(&self) -> u64 {
        let (min, max) = READ_TIMEOUT_RANGE_MS;
        let clamped = self.read_timeout_ms.clamp(min, max);
        if clamped != self.read_timeout_ms {
            tracing::warn!(
                configured = self.read_timeout_ms,
                used = clamped,
                "read_timeout_ms out of range"
            );
        }
        clamped
    }
}

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control frames per second sent to each paired peer
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Wait after the final stop broadcast before closing (ms)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
    /// Mode on startup
    #[serde(default)]
    pub initial_mode: Mode,
}

fn default_tick_hz() -> u32 {
    60
}

fn default_shutdown_grace() -> u64 {
    500
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            shutdown_grace_ms: default_shutdown_grace(),
            initial_mode: Mode::default(),
        }
    }
}

impl ControlConfig {
    /// Interval between control ticks; a zero rate is treated as 1 Hz
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }
}

/// Input configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// Device ids reported by the built-in neutral source
    #[serde(default)]
    pub devices: Vec<DeviceId>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("minibot-station/config.toml")),
            Some(PathBuf::from("./station.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Runtime settings for the network core
    pub fn station_config(&self) -> StationConfig {
        StationConfig {
            discovery_port: self.network.discovery_port,
            base_channel: self.network.base_channel,
            bind_address: self
                .network
                .bind_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            read_timeout: Duration::from_millis(self.network.clamped_read_timeout_ms()),
            liveness_window: Duration::from_secs(self.network.liveness_window_secs),
            broadcast: self.network.broadcast,
            shutdown_grace: Duration::from_millis(self.control.shutdown_grace_ms),
            initial_mode: self.control.initial_mode,
        }
    }

    /// Pairings from the config file
    pub fn initial_pairings(&self) -> Pairings {
        self.pairings
            .iter()
            .map(|(peer_id, device)| (peer_id.clone(), *device))
            .collect()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        input: InputConfig {
            devices: vec![0, 1],
        },
        pairings: {
            let mut m = BTreeMap::new();
            m.insert("Robot1".to_string(), 0);
            m.insert("Robot2".to_string(), 1);
            m
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.discovery_port, DISCOVERY_PORT);

        let station = config.station_config();
        assert_eq!(station.base_channel, BASE_CHANNEL);
        assert_eq!(station.read_timeout, Duration::from_millis(100));
        assert_eq!(station.liveness_window, Duration::from_secs(10));
        assert_eq!(station.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.network.liveness_window_secs = 3;
        config.control.initial_mode = Mode::Autonomous;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.liveness_window_secs, 3);
        assert_eq!(loaded.control.initial_mode, Mode::Autonomous);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/station.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            "[network]\nbind_address = \"127.0.0.1\"\n\n[control]\ninitial_mode = \"active\"\n",
        )
        .unwrap();
        assert_eq!(config.network.discovery_port, DISCOVERY_PORT);
        assert_eq!(config.network.bind_address, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(config.control.initial_mode, Mode::Active);
        assert_eq!(config.control.tick_interval(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn test_read_timeout_is_clamped() {
        let mut config = Config::default();

        config.network.read_timeout_ms = 0;
        assert_eq!(config.station_config().read_timeout, Duration::from_millis(1));

        config.network.read_timeout_ms = 5_000;
        assert_eq!(config.station_config().read_timeout, Duration::from_millis(100));

        config.network.read_timeout_ms = 40;
        assert_eq!(config.station_config().read_timeout, Duration::from_millis(40));
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.input.devices, vec![0, 1]);
        assert_eq!(parsed.initial_pairings().device_for("Robot2"), Some(1));
    }
}
