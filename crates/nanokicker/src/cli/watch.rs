//! `watch` subcommand — poll every device, print changes, survive link loss.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use nanokicker_lib::link::LinkEvent;
use nanokicker_lib::reconnect::{ReconnectState, try_reconnect};

use super::{
    Board, Config, INTERRUPTED, Parameters, Result, ScanOptions, Slot, open_board,
    sleep_interruptible, summary_line,
};

/// State for the `watch` command, created during setup.
struct WatchCtx {
    board: Board,
    port: String,
    config: Config,
    reconnect: ReconnectState,
    last: BTreeMap<Slot, Parameters>,
}

/// One polling pass over the registry. Returns the lines to print.
///
/// A device is reported when its cached parameters differ from the last pass.
/// A link loss stops the pass and forgets every device.
fn poll_devices(board: &mut Board, last: &mut BTreeMap<Slot, Parameters>) -> Vec<String> {
    let mut lines = Vec::new();
    for slot in board.registry().slots() {
        let Some((kicker, link)) = board.kicker_mut(slot) else {
            continue;
        };
        let report = kicker.read_all_parameters(link);
        if report.link_lost() {
            break;
        }
        let params = kicker.params();
        if last.get(&slot) != Some(params) {
            lines.push(format!("  [{slot:>2}] {}", summary_line(params)));
            last.insert(slot, params.clone());
        }
    }
    for event in board.poll_events() {
        match event {
            LinkEvent::Lost { port, reason } => {
                lines.push(format!("[link]  lost {port}: {reason}"));
                lines.push("[link]  will attempt reconnection...".into());
            }
        }
        last.clear();
    }
    lines
}

fn watch_setup(opts: &super::Options) -> Result<WatchCtx> {
    let (board, config) = open_board(opts)?;
    let port = board.port().unwrap_or_default().to_string();
    let reconnect = ReconnectState::new(config.reconnect_policy());
    Ok(WatchCtx {
        board,
        port,
        config,
        reconnect,
        last: BTreeMap::new(),
    })
}

fn watch_loop(ctx: &mut WatchCtx) {
    let options = ScanOptions {
        cancel: Some(&INTERRUPTED),
        ..ctx.config.scan_options()
    };

    match ctx.board.scan(&options) {
        Ok(report) => println!("[scan]  {} device(s) found", report.found),
        Err(e) => log::warn!("[scan]  {e}"),
    }

    while !INTERRUPTED.load(Ordering::SeqCst) {
        if !ctx.board.is_connected() {
            match try_reconnect(&mut ctx.board, &mut ctx.reconnect, &ctx.port, &options) {
                Some(report) => println!(
                    "[link]  reconnected to {}, {} device(s) found",
                    ctx.port, report.found
                ),
                None => {
                    sleep_interruptible(Duration::from_millis(250));
                    continue;
                }
            }
        }

        for line in poll_devices(&mut ctx.board, &mut ctx.last) {
            println!("{line}");
        }
        sleep_interruptible(ctx.config.watch_interval());
    }
}

pub(super) fn cmd_watch(opts: &super::Options) -> Result<()> {
    let mut ctx = watch_setup(opts)?;

    println!("NanoKicker watch on {}", ctx.port);
    println!(
        "  Polling every {:.1}s. Press Ctrl+C to stop.",
        ctx.config.watch_interval().as_secs_f64()
    );
    println!();

    watch_loop(&mut ctx);

    println!();
    ctx.board.disconnect();
    println!("Done.");
    Ok(())
}
