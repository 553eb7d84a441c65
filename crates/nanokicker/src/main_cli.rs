//! NanoKicker CLI — control NanoKicker function generators over the motherboard's serial link.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

mod cli;

/// Shared shutdown flag — set by Ctrl+C handler.
pub static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(
    name = "nanokicker-cli",
    version,
    about = "Control NanoKicker function generators on a serial motherboard"
)]
struct Args {
    /// Output as JSON (for scan, get, set, config)
    #[arg(long, global = true)]
    json: bool,

    /// Serial port of the motherboard (overrides the config file)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Path to an alternative config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (shows every frame on the wire)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    ctrlc::set_handler(move || {
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
    .ok();

    let opts = cli::Options {
        json: args.json,
        port: args.port,
        config_path: args.config,
    };
    if let Err(e) = cli::run(args.command, &opts) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
