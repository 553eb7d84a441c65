//! CLI subcommands — discovery, parameter get/set, storage, live watch.

mod config_cmd;
mod get;
mod scan;
mod set;
mod storage;
mod watch;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::INTERRUPTED;
pub(super) use nanokicker_lib::KickerError;
pub(super) use nanokicker_lib::board::Board;
pub(super) use nanokicker_lib::config::Config;
pub(super) use nanokicker_lib::discovery::ScanOptions;
pub(super) use nanokicker_lib::error::Result;
pub(super) use nanokicker_lib::kicker::{Parameter, Parameters, ReadReport};
pub(super) use nanokicker_lib::protocol::{MAX_DEVICES, Mode, Slot};

/// Global options shared by every subcommand.
pub struct Options {
    pub json: bool,
    pub port: Option<String>,
    pub config_path: Option<PathBuf>,
}

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{s}");
    Ok(())
}

// ── Shared setup ──

/// Load config from `custom_path` or the default location, logging parse warnings.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    config
}

/// `--port` wins over the config file. No port anywhere is an input error.
pub(super) fn resolve_port(port: Option<&str>, config: &Config) -> Result<String> {
    port.map(str::trim)
        .filter(|p| !p.is_empty())
        .or_else(|| config.port())
        .map(str::to_string)
        .ok_or_else(|| {
            KickerError::InvalidInput(
                "no serial port given (use --port or set `port` in the config file)".into(),
            )
        })
}

pub(super) fn check_config(config: &Config) -> Result<()> {
    config.validate().map_err(|errors| {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        KickerError::Config(msgs.join("; "))
    })
}

/// Load and validate config, then connect to the motherboard.
pub(super) fn open_board(opts: &Options) -> Result<(Board, Config)> {
    let config = load_config(opts.config_path.as_deref());
    check_config(&config)?;
    let port = resolve_port(opts.port.as_deref(), &config)?;
    let mut board = Board::new(config.connector());
    board.connect(&port)?;
    Ok((board, config))
}

/// Sleep for `total`, waking early on Ctrl+C.
pub(super) fn sleep_interruptible(total: Duration) {
    let step = Duration::from_millis(50);
    let mut left = total;
    while !left.is_zero() && !INTERRUPTED.load(std::sync::atomic::Ordering::SeqCst) {
        let nap = left.min(step);
        std::thread::sleep(nap);
        left -= nap;
    }
}

fn parse_slot(s: &str) -> std::result::Result<Slot, String> {
    let id: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a device slot number"))?;
    Slot::new(id).ok_or_else(|| format!("slot {id} out of range (0-{})", MAX_DEVICES - 1))
}

// ── Parameter formatting ──

pub(super) fn format_param(params: &Parameters, param: Parameter) -> String {
    fn or_unknown<T>(v: Option<T>, f: impl FnOnce(T) -> String) -> String {
        v.map_or_else(|| "?".to_string(), f)
    }
    match param {
        Parameter::Mode => or_unknown(params.mode, |m| m.to_string()),
        Parameter::Frequency => or_unknown(params.frequency, |hz| format!("{hz} Hz")),
        Parameter::Amplitude => or_unknown(params.amplitude, |a| a.to_string()),
        Parameter::StartupEnabled => {
            or_unknown(params.startup_enabled, |on| if on { "on" } else { "off" }.into())
        }
        Parameter::Vin => or_unknown(params.vin, |v| format!("{v} V")),
        Parameter::Vout => or_unknown(params.vout, |v| format!("{v} V")),
        Parameter::PotRange => or_unknown(params.pot_range, |v| v.to_string()),
        Parameter::RgTrim => or_unknown(params.r_g_trim, |v| v.to_string()),
        Parameter::RfTrim => or_unknown(params.r_f_trim, |v| v.to_string()),
        Parameter::Wiper => or_unknown(params.wiper, |v| v.to_string()),
    }
}

/// One-line summary used by `watch`.
pub(super) fn summary_line(params: &Parameters) -> String {
    [
        Parameter::Mode,
        Parameter::Frequency,
        Parameter::Amplitude,
        Parameter::StartupEnabled,
    ]
    .iter()
    .map(|&p| format!("{p}={}", format_param(params, p)))
    .collect::<Vec<_>>()
    .join("  ")
}

/// Print every parameter as an indented key-value block.
pub(super) fn print_params(params: &Parameters) {
    let keys: Vec<String> = Parameter::READ_ORDER
        .iter()
        .map(|p| format!("{p}:"))
        .collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let w = kv_width(&[], &key_refs);
    for (param, key) in Parameter::READ_ORDER.iter().zip(&keys) {
        kv_indent(key, format_param(params, *param), w);
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ScanOutput {
    pub port: String,
    pub probed: usize,
    pub cancelled: bool,
    pub count: usize,
    pub devices: Vec<ScannedDeviceJson>,
}

#[derive(Serialize)]
pub(super) struct ScannedDeviceJson {
    pub slot: Slot,
    pub mode: Option<Mode>,
}

#[derive(Serialize)]
pub(super) struct DeviceOutput {
    pub slot: Slot,
    pub parameters: Parameters,
    pub read: ReadSummaryJson,
}

#[derive(Serialize)]
pub(super) struct ReadSummaryJson {
    pub values: usize,
    pub empty: usize,
    pub failed: Vec<FailedReadJson>,
}

#[derive(Serialize)]
pub(super) struct FailedReadJson {
    pub parameter: String,
    pub error: String,
}

impl From<&ReadReport> for ReadSummaryJson {
    fn from(r: &ReadReport) -> Self {
        ReadSummaryJson {
            values: r.read,
            empty: r.empty,
            failed: r
                .failed
                .iter()
                .map(|(p, e)| FailedReadJson {
                    parameter: p.to_string(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub(super) struct SetOutput {
    pub slot: Slot,
    pub applied: Vec<&'static str>,
    pub parameters: Parameters,
}

#[derive(Serialize)]
pub(super) struct ParameterOutput {
    pub slot: Slot,
    pub parameter: String,
    pub value: serde_json::Value,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
}

#[derive(Subcommand)]
pub enum Command {
    /// Probe every slot and list the devices found
    Scan,

    /// Read parameters from one device
    Get {
        /// Device slot (0-19)
        #[arg(value_parser = parse_slot)]
        slot: Slot,
        /// Read only this parameter (mode, frequency, amplitude, startup, vin,
        /// vout, pot-range, rg-trim, rf-trim, wiper)
        param: Option<Parameter>,
    },

    /// Write parameters to one device
    Set {
        /// Device slot (0-19)
        #[arg(value_parser = parse_slot)]
        slot: Slot,
        #[command(flatten)]
        values: set::SetArgs,
    },

    /// Store a device's current settings in its non-volatile memory
    Save {
        /// Device slot (0-19)
        #[arg(value_parser = parse_slot)]
        slot: Slot,
    },

    /// Restore a device's settings from non-volatile memory and re-read them
    Load {
        /// Device slot (0-19)
        #[arg(value_parser = parse_slot)]
        slot: Slot,
    },

    /// Poll all devices and print changes; reconnects if the link drops
    Watch,

    /// Show current configuration and file path
    Config {
        /// Write the effective configuration (including --port) to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, opts: &Options) -> Result<()> {
    match cmd {
        Command::Scan => scan::cmd_scan(opts),
        Command::Get { slot, param } => get::cmd_get(opts, slot, param),
        Command::Set { slot, values } => set::cmd_set(opts, slot, &values),
        Command::Save { slot } => {
            if opts.json {
                warn_json_unsupported("save");
            }
            storage::cmd_save(opts, slot)
        }
        Command::Load { slot } => storage::cmd_load(opts, slot),
        Command::Watch => {
            if opts.json {
                warn_json_unsupported("watch");
            }
            watch::cmd_watch(opts)
        }
        Command::Config { save } => config_cmd::cmd_config(opts, save),
    }
}


#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Short:", "Longer key:"], &[]);
        // "Longer key:" = 11 + PADDING = 13
        assert_eq!(w, 13);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["A:"], &["Very long indent key:"]);
        // "Very long indent key:" = 21 + PADDING + 2 = 25
        assert_eq!(w, 25);
    }

    #[test]
    fn values_align_across_levels() {
        let w = kv_width(&["Top:"], &["Indent:"]);
        let top = format_kv("Top:", "V", w);
        let indent = format!("  {:<width$}{}", "Indent:", "V", width = w - 2);
        assert_eq!(top.find('V'), indent.find('V'));
    }

    #[test]
    fn format_kv_exact_width() {
        let result = format_kv("ExactWidth:", "val", 10);
        assert_eq!(result, "ExactWidth:val");
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn format_param_units_and_unknowns() {
        let p = Parameters {
            mode: Some(Mode::Sine),
            frequency: Some(1000),
            startup_enabled: Some(false),
            vin: Some(12.5),
            ..Parameters::default()
        };
        assert_eq!(format_param(&p, Parameter::Mode), "sine");
        assert_eq!(format_param(&p, Parameter::Frequency), "1000 Hz");
        assert_eq!(format_param(&p, Parameter::StartupEnabled), "off");
        assert_eq!(format_param(&p, Parameter::Vin), "12.5 V");
        assert_eq!(format_param(&p, Parameter::Amplitude), "?");
        assert_eq!(format_param(&p, Parameter::Wiper), "?");
    }

    #[test]
    fn summary_line_has_core_parameters() {
        let p = Parameters {
            mode: Some(Mode::Square),
            amplitude: Some(2.5),
            ..Parameters::default()
        };
        assert_eq!(
            summary_line(&p),
            "mode=square  frequency=?  amplitude=2.5  startup=?"
        );
    }
}


#[cfg(test)]
mod json_output_tests {
    use super::*;
    use nanokicker_lib::link::LinkError;

    #[test]
    fn scan_output_shape() {
        let output = ScanOutput {
            port: "/dev/ttyACM0".into(),
            probed: 20,
            cancelled: false,
            count: 1,
            devices: vec![ScannedDeviceJson {
                slot: Slot::new(3).unwrap(),
                mode: None,
            }],
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["devices"][0]["slot"], 3);
        assert!(parsed["devices"][0]["mode"].is_null());
    }

    #[test]
    fn device_output_includes_failures() {
        let report = ReadReport {
            read: 1,
            empty: 0,
            failed: vec![(Parameter::Frequency, LinkError::NotConnected)],
        };
        let output = DeviceOutput {
            slot: Slot::new(0).unwrap(),
            parameters: Parameters::default(),
            read: (&report).into(),
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["read"]["values"], 1);
        assert_eq!(parsed["read"]["failed"][0]["parameter"], "frequency");
        assert_eq!(
            parsed["read"]["failed"][0]["error"],
            "Not connected to motherboard"
        );
        assert!(parsed["parameters"].is_object());
    }

    #[test]
    fn set_output_lists_applied_values() {
        let output = SetOutput {
            slot: Slot::new(4).unwrap(),
            applied: vec!["frequency", "mode"],
            parameters: Parameters {
                frequency: Some(440),
                ..Parameters::default()
            },
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["slot"], 4);
        assert_eq!(parsed["applied"], serde_json::json!(["frequency", "mode"]));
        assert_eq!(parsed["parameters"]["frequency"], 440);
        assert!(parsed.get("read").is_none());
    }

    #[test]
    fn config_output_complete() {
        let output = ConfigOutput {
            config_file: Some("/home/user/.config/nanokicker/config.toml".into()),
            config_file_exists: true,
            settings: Config::default(),
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert!(parsed["config_file"].is_string());
        assert_eq!(parsed["settings"]["baud_rate"], 115_200);
        assert_eq!(parsed["settings"]["port"], "");
    }
}
