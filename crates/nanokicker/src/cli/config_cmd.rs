//! `config` subcommand — show current configuration and file path.

use std::path::PathBuf;

use super::{Config, ConfigOutput, Result, check_config, kv, kv_indent, kv_width, print_json};

fn config_path(opts: &super::Options) -> Option<PathBuf> {
    opts.config_path.clone().or_else(Config::path)
}

/// The loaded config with `--port` applied on top.
fn effective_config(opts: &super::Options) -> Config {
    let mut config = super::load_config(opts.config_path.as_deref());
    if let Some(port) = opts.port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        config.port = port.to_string();
    }
    config
}

pub(super) fn cmd_config(opts: &super::Options, save: bool) -> Result<()> {
    let config = effective_config(opts);
    let path = config_path(opts);

    if save {
        check_config(&config)?;
        let Some(p) = &path else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            )
            .into());
        };
        config.save_to(p)?;
        log::info!("[config] wrote {}", p.display());
    }

    let exists = path.as_ref().is_some_and(|p| p.exists());

    if opts.json {
        return print_json(&ConfigOutput {
            config_file: path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: exists,
            settings: config,
        });
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "port:",
            "baud_rate:",
            "read_timeout_ms:",
            "probe_delay_ms:",
            "watch_interval_ms:",
            "reconnect_initial_ms:",
            "reconnect_max_ms:",
        ],
    );

    match &path {
        Some(p) if save => kv("Config file:", format_args!("{} (saved)", p.display()), w),
        Some(p) if exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("port:", config.port().unwrap_or("(not set)"), w);
    kv_indent("baud_rate:", config.baud_rate, w);
    kv_indent("read_timeout_ms:", config.read_timeout_ms, w);
    kv_indent("probe_delay_ms:", config.probe_delay_ms, w);
    kv_indent("watch_interval_ms:", config.watch_interval_ms, w);
    kv_indent("reconnect_initial_ms:", config.reconnect_initial_ms, w);
    kv_indent("reconnect_max_ms:", config.reconnect_max_ms, w);

    if let Err(errors) = config.validate() {
        println!();
        println!("Problems:");
        for e in errors {
            println!("  {e}");
        }
    }
    Ok(())
}
