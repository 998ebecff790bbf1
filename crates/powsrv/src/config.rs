//! Layered server configuration.
//!
//! Precedence, lowest first: built-in defaults, the TOML file given with
//! `--config`, `POWSRV_*` environment variables, command-line flags. clap
//! folds the last two together, so [`Overrides`] carries both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use powsrv_frame::MAX_MIN_WEIGHT_MAGNITUDE;
use powsrv_server::{DeviceSpec, SelectionPolicy, DEFAULT_MAX_MIN_WEIGHT_MAGNITUDE};
use powsrv_transport::Endpoint;
use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub pow: PowSection,
    pub devices: Vec<DeviceEntry>,
    pub log: LogSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            pow: PowSection::default(),
            devices: vec![DeviceEntry::default()],
            log: LogSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub endpoint: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::DEFAULT_UNIX_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PowSection {
    pub max_min_weight_magnitude: u8,
    pub selection: Selection,
    pub fixed_device: usize,
}

impl Default for PowSection {
    fn default() -> Self {
        Self {
            max_min_weight_magnitude: DEFAULT_MAX_MIN_WEIGHT_MAGNITUDE,
            selection: Selection::RoundRobin,
            fixed_device: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    #[default]
    RoundRobin,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceEntry {
    pub kind: DeviceKind,
    /// CPU worker threads; 0 means available parallelism.
    pub threads: usize,
    /// Relay target endpoint.
    pub upstream: Option<String>,
    /// Relay deadline per PoW request.
    pub timeout_ms: u64,
}

impl Default for DeviceEntry {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            threads: 0,
            upstream: None,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub level: Option<LogLevel>,
}

/// Values from the environment or the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub pow_type: Option<DeviceKind>,
    pub max_mwm: Option<u8>,
    pub threads: Option<usize>,
    pub upstream: Option<String>,
    pub selection: Option<Selection>,
    pub fixed_device: Option<usize>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, or the file at `path` when given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Layer `overrides` on top. `pow_type` replaces the device list with a
    /// single device of that kind before `threads`/`upstream` are applied.
    pub fn apply(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(endpoint) = &overrides.endpoint {
            self.server.endpoint = endpoint.clone();
        }
        if let Some(max) = overrides.max_mwm {
            self.pow.max_min_weight_magnitude = max;
        }
        if let Some(selection) = overrides.selection {
            self.pow.selection = selection;
        }
        if let Some(index) = overrides.fixed_device {
            self.pow.fixed_device = index;
        }
        if let Some(kind) = overrides.pow_type {
            self.devices = vec![DeviceEntry {
                kind,
                ..DeviceEntry::default()
            }];
        }
        if let Some(threads) = overrides.threads {
            for device in self.devices.iter_mut().filter(|d| d.kind == DeviceKind::Cpu) {
                device.threads = threads;
            }
        }
        if let Some(upstream) = &overrides.upstream {
            let mut relays = self
                .devices
                .iter_mut()
                .filter(|d| d.kind == DeviceKind::Relay)
                .peekable();
            if relays.peek().is_none() {
                return Err(ConfigError::Invalid(
                    "--upstream needs a relay device (use --pow-type relay)".to_string(),
                ));
            }
            for device in relays {
                device.upstream = Some(upstream.clone());
            }
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        self.server
            .endpoint
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("server.endpoint: {err}")))
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        match self.pow.selection {
            Selection::RoundRobin => SelectionPolicy::RoundRobin,
            Selection::Fixed => SelectionPolicy::Fixed(self.pow.fixed_device),
        }
    }

    pub fn device_specs(&self) -> Result<Vec<DeviceSpec>, ConfigError> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, device)| match device.kind {
                DeviceKind::Cpu => Ok(DeviceSpec::Cpu {
                    threads: device.threads,
                }),
                DeviceKind::Relay => {
                    let upstream = device.upstream.as_deref().ok_or_else(|| {
                        ConfigError::Invalid(format!("devices[{index}]: relay needs upstream"))
                    })?;
                    let upstream = upstream.parse().map_err(|err| {
                        ConfigError::Invalid(format!("devices[{index}].upstream: {err}"))
                    })?;
                    if device.timeout_ms == 0 {
                        return Err(ConfigError::Invalid(format!(
                            "devices[{index}].timeout_ms must be greater than zero"
                        )));
                    }
                    Ok(DeviceSpec::Relay {
                        upstream,
                        timeout: Duration::from_millis(device.timeout_ms),
                    })
                }
            })
            .collect()
    }

    /// Check everything `serve` will need before any device is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pow.max_min_weight_magnitude > MAX_MIN_WEIGHT_MAGNITUDE {
            return Err(ConfigError::Invalid(format!(
                "pow.max_min_weight_magnitude must be at most {MAX_MIN_WEIGHT_MAGNITUDE}, got {}",
                self.pow.max_min_weight_magnitude
            )));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".to_string()));
        }
        if self.pow.selection == Selection::Fixed && self.pow.fixed_device >= self.devices.len() {
            return Err(ConfigError::Invalid(format!(
                "pow.fixed_device {} out of range ({} devices)",
                self.pow.fixed_device,
                self.devices.len()
            )));
        }
        self.endpoint()?;
        self.device_specs()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.endpoint, "/tmp/powSrv.sock");
        assert_eq!(config.pow.max_min_weight_magnitude, 20);
        assert_eq!(config.devices, vec![DeviceEntry::default()]);
        assert_eq!(config.selection_policy(), SelectionPolicy::RoundRobin);
        config.validate().unwrap();
    }

    #[test]
    fn full_difficulty_is_allowed_when_set() {
        let mut config = Config::default();
        config.pow.max_min_weight_magnitude = 243;
        config.validate().unwrap();

        config.pow.max_min_weight_magnitude = 244;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_full_file() {
        let config: Config = toml::from_str(
            r#"
            [server]
            endpoint = "tcp://127.0.0.1:5000"

            [pow]
            max_min_weight_magnitude = 14
            selection = "fixed"
            fixed_device = 1

            [[devices]]
            kind = "cpu"
            threads = 2

            [[devices]]
            kind = "relay"
            upstream = "unix:///run/upstream.sock"
            timeout_ms = 1500

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.endpoint().unwrap(),
            Endpoint::Tcp("127.0.0.1:5000".to_string())
        );
        assert_eq!(config.selection_policy(), SelectionPolicy::Fixed(1));
        assert_eq!(config.log.level, Some(LogLevel::Debug));
        assert_eq!(
            config.device_specs().unwrap(),
            vec![
                DeviceSpec::Cpu { threads: 2 },
                DeviceSpec::Relay {
                    upstream: Endpoint::Unix(PathBuf::from("/run/upstream.sock")),
                    timeout: Duration::from_millis(1500),
                },
            ]
        );
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[pow]\nmax_min_weight_magnitude = 9\n").unwrap();
        assert_eq!(config.pow.max_min_weight_magnitude, 9);
        assert_eq!(config.server, ServerSection::default());
        assert_eq!(config.devices.len(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[pow]\nmax_mwm = 9\n").is_err());
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config: Config =
            toml::from_str("[server]\nendpoint = \"/tmp/a.sock\"\n[pow]\nselection = \"fixed\"\n")
                .unwrap();
        config
            .apply(&Overrides {
                endpoint: Some("/tmp/b.sock".to_string()),
                max_mwm: Some(20),
                selection: Some(Selection::RoundRobin),
                threads: Some(4),
                ..Overrides::default()
            })
            .unwrap();

        assert_eq!(config.server.endpoint, "/tmp/b.sock");
        assert_eq!(config.pow.max_min_weight_magnitude, 20);
        assert_eq!(config.selection_policy(), SelectionPolicy::RoundRobin);
        assert_eq!(config.devices[0].threads, 4);
    }

    #[test]
    fn pow_type_replaces_devices() {
        let mut config = Config::default();
        config
            .apply(&Overrides {
                pow_type: Some(DeviceKind::Relay),
                upstream: Some("tcp://10.0.0.2:5000".to_string()),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].kind, DeviceKind::Relay);
        config.validate().unwrap();
    }

    #[test]
    fn upstream_without_relay_is_invalid() {
        let mut config = Config::default();
        let err = config
            .apply(&Overrides {
                upstream: Some("tcp://10.0.0.2:5000".to_string()),
                ..Overrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = Config::default();
        config.pow.max_min_weight_magnitude = 244;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pow.selection = Selection::Fixed;
        config.pow.fixed_device = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.devices[0].kind = DeviceKind::Relay;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.endpoint = "tcp://nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/powsrv.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
