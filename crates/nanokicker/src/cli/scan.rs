//! `scan` subcommand — probe every slot and list the devices found.

use nanokicker_lib::discovery::ScanReport;

use super::{
    Board, INTERRUPTED, Result, ScanOptions, ScanOutput, ScannedDeviceJson, open_board, print_json,
};

fn scan_output(board: &Board, report: &ScanReport) -> ScanOutput {
    let devices: Vec<ScannedDeviceJson> = board
        .registry()
        .iter()
        .map(|k| ScannedDeviceJson {
            slot: k.slot(),
            mode: k.params().mode,
        })
        .collect();
    ScanOutput {
        port: board.port().unwrap_or_default().to_string(),
        probed: report.probed,
        cancelled: report.cancelled,
        count: devices.len(),
        devices,
    }
}

pub(super) fn cmd_scan(opts: &super::Options) -> Result<()> {
    let (mut board, config) = open_board(opts)?;
    let options = ScanOptions {
        cancel: Some(&INTERRUPTED),
        ..config.scan_options()
    };
    let report = board.scan(&options)?;
    let output = scan_output(&board, &report);

    if opts.json {
        return print_json(&output);
    }

    if output.cancelled {
        println!("Scan cancelled after {} slot(s).", output.probed);
    }
    if output.devices.is_empty() {
        println!("No NanoKicker devices found on {}.", output.port);
        return Ok(());
    }

    println!(
        "Found {} NanoKicker device{} on {}:",
        output.count,
        if output.count == 1 { "" } else { "s" },
        output.port
    );
    println!();
    for dev in &output.devices {
        let mode = dev
            .mode
            .map_or_else(|| "unknown".to_string(), |m| m.to_string());
        println!("  [{:>2}] mode: {mode}", dev.slot);
    }
    Ok(())
}
