//! `save` / `load` subcommands — device non-volatile storage.

use nanokicker_lib::kicker::Kicker;
use nanokicker_lib::link::Link;

use super::get::{print_device, read_all};
use super::{DeviceOutput, ReadReport, Result, Slot, open_board, print_json};

pub(super) fn cmd_save(opts: &super::Options, slot: Slot) -> Result<()> {
    let (mut board, _config) = open_board(opts)?;
    let (kicker, link) = board.attach(slot);
    kicker.save_settings(link)?;
    match link.last_diagnostic() {
        Some(d) => println!("Device {slot} reported: {d}"),
        None => println!("Saved settings on device {slot}."),
    }
    Ok(())
}

/// Restore from non-volatile memory, then refresh the whole cache.
fn load_and_refresh(kicker: &mut Kicker, link: &mut Link) -> Result<ReadReport> {
    kicker.load_settings(link)?;
    if let Some(d) = link.last_diagnostic() {
        log::warn!("device {}: load: {d}", kicker.slot());
    }
    read_all(kicker, link)
}

pub(super) fn cmd_load(opts: &super::Options, slot: Slot) -> Result<()> {
    let (mut board, _config) = open_board(opts)?;
    let (kicker, link) = board.attach(slot);
    let report = load_and_refresh(kicker, link)?;

    if opts.json {
        return print_json(&DeviceOutput {
            slot,
            parameters: kicker.params().clone(),
            read: (&report).into(),
        });
    }
    println!("Loaded settings on device {slot}.");
    println!();
    print_device(slot, kicker.params(), Some(&report));
    Ok(())
}
