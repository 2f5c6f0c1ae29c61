//! Configuration loading and validation.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML config file,
//! command line arguments, then (on the relay server) per-request overrides.
//! The merged result is immutable for the rest of the run.

use crate::relay::CommandRequest;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Mac address must be provided")]
    MissingMacAddress,
    #[error("{name} must be within [0, {range}]")]
    OffsetOutOfRange { name: &'static str, range: i32 },
    #[error("Reading {path} failed: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Parsing {path} failed: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// The action selected on the command line. Exactly one is ever active;
/// `Status` is the direct-run default (connect and print the height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Status,
    Watch,
    MoveTo,
    Scan,
    Server,
    TcpServer,
    Forward,
}

impl Action {
    /// Scan and forward run without a desk connection.
    pub fn requires_connection(self) -> bool {
        !matches!(self, Action::Scan | Action::Forward)
    }
}

/// Fully merged runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mac_address: String,
    /// Height of the tabletop above ground at the lowest position (mm).
    pub base_height: i32,
    /// How far above `base_height` the desk can extend (mm).
    pub movement_range: i32,
    pub adapter_name: String,
    pub scan_timeout: u64,
    pub connection_timeout: u64,
    pub movement_timeout: u64,
    /// Consecutive zero-speed telemetry samples before a move is treated as
    /// stalled. 0 disables stall detection.
    pub stall_limit: u32,
    pub server_address: String,
    pub server_port: u16,
    /// Named target heights (mm).
    pub favourites: HashMap<String, i32>,
    pub sit_height_offset: Option<i32>,
    pub stand_height_offset: Option<i32>,

    // Action selection (command line only).
    pub watch: bool,
    pub scan: bool,
    pub server: bool,
    pub tcp_server: bool,
    pub forward: bool,
    pub move_to: Option<String>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mac_address: String::new(),
            base_height: 620,
            movement_range: 650,
            adapter_name: "hci0".to_string(),
            scan_timeout: 5,
            connection_timeout: 10,
            movement_timeout: 30,
            stall_limit: 4,
            server_address: "127.0.0.1".to_string(),
            server_port: 9123,
            favourites: HashMap::new(),
            sit_height_offset: None,
            stand_height_offset: None,
            watch: false,
            scan: false,
            server: false,
            tcp_server: false,
            forward: false,
            move_to: None,
            debug: false,
        }
    }
}

/// What the YAML config file may contain. Every field is optional; present
/// fields override the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub mac_address: Option<String>,
    pub base_height: Option<i32>,
    pub movement_range: Option<i32>,
    pub adapter_name: Option<String>,
    pub scan_timeout: Option<u64>,
    pub connection_timeout: Option<u64>,
    pub movement_timeout: Option<u64>,
    pub stall_limit: Option<u32>,
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
    pub favourites: Option<HashMap<String, i32>>,
    pub sit_height_offset: Option<i32>,
    pub stand_height_offset: Option<i32>,
}

/// Default config file location, e.g. `~/.config/linak-controller/config.yaml`.
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("linak-controller");
    path.push("config.yaml");
    path
}

impl Config {
    /// Load the config file (when present), then validate. The caller layers
    /// CLI arguments in between via [`crate::cli::Cli::apply`].
    pub fn load(path: &PathBuf) -> Result<FileConfig, ConfigError> {
        if !path.is_file() {
            warn!("No custom config file provided or not found!");
            return Ok(FileConfig::default());
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.mac_address {
            self.mac_address = v;
        }
        if let Some(v) = file.base_height {
            self.base_height = v;
        }
        if let Some(v) = file.movement_range {
            self.movement_range = v;
        }
        if let Some(v) = file.adapter_name {
            self.adapter_name = v;
        }
        if let Some(v) = file.scan_timeout {
            self.scan_timeout = v;
        }
        if let Some(v) = file.connection_timeout {
            self.connection_timeout = v;
        }
        if let Some(v) = file.movement_timeout {
            self.movement_timeout = v;
        }
        if let Some(v) = file.stall_limit {
            self.stall_limit = v;
        }
        if let Some(v) = file.server_address {
            self.server_address = v;
        }
        if let Some(v) = file.server_port {
            self.server_port = v;
        }
        if let Some(v) = file.favourites {
            self.favourites = v;
        }
        if file.sit_height_offset.is_some() {
            self.sit_height_offset = file.sit_height_offset;
        }
        if file.stand_height_offset.is_some() {
            self.stand_height_offset = file.stand_height_offset;
        }
    }

    /// Validate the merged configuration and normalize it: the mac address
    /// is required (for actions that connect) and uppercased, height offsets
    /// must sit inside the movement range and become `sit`/`stand`
    /// favourites.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.mac_address.is_empty() && self.action().requires_connection() {
            return Err(ConfigError::MissingMacAddress);
        }
        self.mac_address = self.mac_address.to_uppercase();

        if let Some(offset) = self.sit_height_offset {
            if !(0..=self.movement_range).contains(&offset) {
                return Err(ConfigError::OffsetOutOfRange {
                    name: "Sit height offset",
                    range: self.movement_range,
                });
            }
            self.favourites
                .entry("sit".to_string())
                .or_insert(self.base_height + offset);
        }

        if let Some(offset) = self.stand_height_offset {
            if !(0..=self.movement_range).contains(&offset) {
                return Err(ConfigError::OffsetOutOfRange {
                    name: "Stand height offset",
                    range: self.movement_range,
                });
            }
            self.favourites
                .entry("stand".to_string())
                .or_insert(self.base_height + offset);
        }

        Ok(())
    }

    /// Which top-level action this configuration selects.
    pub fn action(&self) -> Action {
        if self.forward {
            Action::Forward
        } else if self.scan {
            Action::Scan
        } else if self.server {
            Action::Server
        } else if self.tcp_server {
            Action::TcpServer
        } else if self.watch {
            Action::Watch
        } else if self.move_to.is_some() {
            Action::MoveTo
        } else {
            Action::Status
        }
    }

    /// Merge a relay request's override keys over this configuration,
    /// producing the config the forwarded command runs with.
    pub fn merge_request(&self, request: &CommandRequest) -> Config {
        let mut merged = self.clone();
        merged.server = false;
        merged.tcp_server = false;
        if request.move_to.is_some() {
            merged.move_to = request.move_to.clone();
            merged.watch = false;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_match_shipped_config() {
        let config = Config::default();
        assert_eq!(config.base_height, 620);
        assert_eq!(config.movement_range, 650);
        assert_eq!(config.adapter_name, "hci0");
        assert_eq!(config.server_port, 9123);
        assert_eq!(config.movement_timeout, 30);
        assert!(config.favourites.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let file: FileConfig = serde_yaml::from_str(
            "mac_address: ee:ff:00:11:22:33\nbase_height: 600\nfavourites:\n  high: 1100\n",
        )
        .unwrap();
        let mut config = Config::default();
        config.apply_file(file);
        assert_eq!(config.mac_address, "ee:ff:00:11:22:33");
        assert_eq!(config.base_height, 600);
        assert_eq!(config.favourites["high"], 1100);
        // Untouched fields keep their defaults.
        assert_eq!(config.movement_range, 650);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(serde_yaml::from_str::<FileConfig>("mac_adress: oops\n").is_err());
    }

    #[test]
    fn missing_mac_fails_validation() {
        let mut config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingMacAddress)
        ));
    }

    #[test]
    fn scan_and_forward_do_not_require_mac() {
        let mut config = Config::default();
        config.scan = true;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.forward = true;
        config.move_to = Some("100".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mac_is_uppercased() {
        let mut config = valid();
        config.validate().unwrap();
        assert_eq!(config.mac_address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn offsets_must_stay_in_movement_range() {
        let mut config = valid();
        config.sit_height_offset = Some(651);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OffsetOutOfRange { range: 650, .. })
        ));

        let mut config = valid();
        config.stand_height_offset = Some(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn offsets_become_favourites() {
        let mut config = valid();
        config.sit_height_offset = Some(80);
        config.stand_height_offset = Some(500);
        config.validate().unwrap();
        assert_eq!(config.favourites["sit"], 700);
        assert_eq!(config.favourites["stand"], 1120);
    }

    #[test]
    fn explicit_favourites_win_over_offsets() {
        let mut config = valid();
        config.favourites.insert("sit".to_string(), 695);
        config.sit_height_offset = Some(80);
        config.validate().unwrap();
        assert_eq!(config.favourites["sit"], 695);
    }

    #[test]
    fn request_overrides_merge_over_base() {
        let mut base = valid();
        base.server = true;
        let request = CommandRequest {
            move_to: Some("100".to_string()),
        };
        let merged = base.merge_request(&request);
        assert_eq!(merged.move_to.as_deref(), Some("100"));
        assert!(!merged.server);
        assert_eq!(merged.action(), Action::MoveTo);
        // Base config is untouched.
        assert!(base.move_to.is_none());
    }

    #[test]
    fn empty_request_keeps_base_command() {
        let base = valid();
        let merged = base.merge_request(&CommandRequest::default());
        assert_eq!(merged.action(), Action::Status);
    }

    #[test]
    fn forward_takes_precedence_over_move_to() {
        let mut config = valid();
        config.forward = true;
        config.move_to = Some("sit".to_string());
        assert_eq!(config.action(), Action::Forward);
    }
}
