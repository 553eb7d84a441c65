//! Host configuration — TOML-based, platform-aware paths.
//!
//! Only link parameters live here. Device parameters belong to the devices
//! themselves (see `save_settings` / `load_settings`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::ScanOptions;
use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_PROBE_DELAY, DEFAULT_READ_TIMEOUT};
use crate::reconnect::ReconnectPolicy;
use crate::transport::SerialConnector;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# NanoKicker host configuration.\n\n";

/// Highest baud rate accepted by [`Config::validate`].
pub const MAX_BAUD_RATE: u32 = 4_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial port of the motherboard. Empty = must be given on the command line.
    #[serde(default)]
    pub port: String,

    /// Baud rate. USB CDC ports ignore it.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Pause after each discovery probe, in milliseconds.
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,

    /// Polling interval for `watch`, in milliseconds.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Wait after the first failed reconnect, in milliseconds. Doubles per failure.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Longest wait between reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT.as_millis() as u64
}
fn default_probe_delay_ms() -> u64 {
    DEFAULT_PROBE_DELAY.as_millis() as u64
}
fn default_watch_interval_ms() -> u64 {
    2000
}
fn default_reconnect_initial_ms() -> u64 {
    ReconnectPolicy::default().initial.as_millis() as u64
}
fn default_reconnect_max_ms() -> u64 {
    ReconnectPolicy::default().max.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: String::new(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            probe_delay_ms: default_probe_delay_ms(),
            watch_interval_ms: default_watch_interval_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `read_timeout_ms` is zero.
    ZeroReadTimeout,
    /// `baud_rate` is zero or above [`MAX_BAUD_RATE`].
    InvalidBaudRate(u32),
    /// `watch_interval_ms` is zero.
    ZeroWatchInterval,
    /// `reconnect_initial_ms` is zero.
    ZeroReconnectDelay,
    /// `reconnect_max_ms` is below `reconnect_initial_ms`.
    ReconnectMaxBelowInitial { initial_ms: u64, max_ms: u64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroReadTimeout => write!(f, "read_timeout_ms must be greater than 0"),
            ValidationError::InvalidBaudRate(b) => {
                write!(f, "Invalid baud_rate {b} (expected 1-{MAX_BAUD_RATE})")
            }
            ValidationError::ZeroWatchInterval => {
                write!(f, "watch_interval_ms must be greater than 0")
            }
            ValidationError::ZeroReconnectDelay => {
                write!(f, "reconnect_initial_ms must be greater than 0")
            }
            ValidationError::ReconnectMaxBelowInitial { initial_ms, max_ms } => write!(
                f,
                "reconnect_max_ms ({max_ms}) must not be below reconnect_initial_ms ({initial_ms})"
            ),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nanokicker"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.read_timeout_ms == 0 {
            errors.push(ValidationError::ZeroReadTimeout);
        }
        if self.baud_rate == 0 || self.baud_rate > MAX_BAUD_RATE {
            errors.push(ValidationError::InvalidBaudRate(self.baud_rate));
        }
        if self.watch_interval_ms == 0 {
            errors.push(ValidationError::ZeroWatchInterval);
        }
        if self.reconnect_initial_ms == 0 {
            errors.push(ValidationError::ZeroReconnectDelay);
        } else if self.reconnect_max_ms < self.reconnect_initial_ms {
            errors.push(ValidationError::ReconnectMaxBelowInitial {
                initial_ms: self.reconnect_initial_ms,
                max_ms: self.reconnect_max_ms,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The configured port, or `None` when unset.
    pub fn port(&self) -> Option<&str> {
        let p = self.port.trim();
        (!p.is_empty()).then_some(p)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Serial connector using these link parameters.
    pub fn connector(&self) -> SerialConnector {
        SerialConnector {
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout(),
        }
    }

    /// Backoff bounds for reconnecting after a link loss.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
        }
    }

    /// Scan pacing from config; cancellation is left to the caller.
    pub fn scan_options(&self) -> ScanOptions<'static> {
        ScanOptions {
            probe_delay: self.probe_delay(),
            cancel: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.port, "");
        assert_eq!(c.baud_rate, 115_200);
        assert_eq!(c.read_timeout(), Duration::from_secs(1));
        assert_eq!(c.probe_delay(), Duration::from_millis(50));
        assert_eq!(c.watch_interval(), Duration::from_secs(2));
        assert_eq!(c.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(c.port(), None);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("port = \"/dev/ttyACM0\"").unwrap();
        assert_eq!(c.port(), Some("/dev/ttyACM0"));
        assert_eq!(c.baud_rate, 115_200);
        assert_eq!(c.read_timeout_ms, 1000);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("baud_rate = \"fast\"");
        assert!(result.is_err());
    }

    #[test]
    fn whitespace_port_is_unset() {
        let c = Config {
            port: "   ".into(),
            ..Config::default()
        };
        assert_eq!(c.port(), None);
    }

    // ── Derived settings ──

    #[test]
    fn connector_uses_link_parameters() {
        let c = Config {
            baud_rate: 9600,
            read_timeout_ms: 250,
            ..Config::default()
        };
        let conn = c.connector();
        assert_eq!(conn.baud_rate, 9600);
        assert_eq!(conn.read_timeout, Duration::from_millis(250));
    }

    #[test]
    fn scan_options_use_probe_delay() {
        let c = Config {
            probe_delay_ms: 5,
            ..Config::default()
        };
        let opts = c.scan_options();
        assert_eq!(opts.probe_delay, Duration::from_millis(5));
        assert!(opts.cancel.is_none());
    }

    #[test]
    fn reconnect_policy_uses_configured_bounds() {
        let c: Config =
            toml::from_str("reconnect_initial_ms = 250\nreconnect_max_ms = 5000").unwrap();
        let policy = c.reconnect_policy();
        assert_eq!(policy.initial, Duration::from_millis(250));
        assert_eq!(policy.max, Duration::from_secs(5));
    }

    // ── Validation ──

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let c = Config {
            baud_rate: 0,
            read_timeout_ms: 0,
            watch_interval_ms: 0,
            ..Config::default()
        };
        let errors = c.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroReadTimeout,
                ValidationError::InvalidBaudRate(0),
                ValidationError::ZeroWatchInterval,
            ]
        );
    }

    #[test]
    fn validate_reconnect_bounds() {
        let c = Config {
            reconnect_initial_ms: 0,
            ..Config::default()
        };
        assert_eq!(c.validate(), Err(vec![ValidationError::ZeroReconnectDelay]));

        let c = Config {
            reconnect_initial_ms: 2000,
            reconnect_max_ms: 500,
            ..Config::default()
        };
        assert_eq!(
            c.validate(),
            Err(vec![ValidationError::ReconnectMaxBelowInitial {
                initial_ms: 2000,
                max_ms: 500,
            }])
        );

        let c = Config {
            reconnect_initial_ms: 500,
            reconnect_max_ms: 500,
            ..Config::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_baud_rate_upper_bound() {
        let c = Config {
            baud_rate: MAX_BAUD_RATE + 1,
            ..Config::default()
        };
        assert!(c.validate().is_err());
        let c = Config {
            baud_rate: MAX_BAUD_RATE,
            ..Config::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validation_error_display() {
        assert_eq!(
            ValidationError::InvalidBaudRate(0).to_string(),
            "Invalid baud_rate 0 (expected 1-4000000)"
        );
        assert_eq!(
            ValidationError::ZeroReadTimeout.to_string(),
            "read_timeout_ms must be greater than 0"
        );
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let c = Config {
            port: "COM4".into(),
            probe_delay_ms: 10,
            ..Config::default()
        };
        c.save_to(&path).unwrap();
        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, c);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# NanoKicker"));
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let (config, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();
        let (config, warnings) = Config::load_from(&path);
        assert_eq!(config, Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
    }
}
