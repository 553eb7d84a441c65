//! Device discovery — probe every slot with a "get mode" transaction.
//!
//! A slot is occupied when its probe returns a full 4-byte value that is not
//! a known no-device sentinel. Anything shorter means the slot is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::kicker::Kicker;
use crate::link::{Link, Result};
use crate::protocol::{Action, DEFAULT_PROBE_DELAY, Slot, is_no_device_sentinel};
use crate::registry::Registry;

/// Pacing and cancellation for a scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions<'a> {
    /// Pause after every probe.
    pub probe_delay: Duration,
    /// Checked before each probe; once set, the remaining slots are skipped.
    pub cancel: Option<&'a AtomicBool>,
}

impl Default for ScanOptions<'_> {
    fn default() -> Self {
        ScanOptions {
            probe_delay: DEFAULT_PROBE_DELAY,
            cancel: None,
        }
    }
}

impl ScanOptions<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Slots that were actually probed.
    pub probed: usize,
    /// Slots classified as occupied.
    pub found: usize,
    pub cancelled: bool,
}

/// Probe every slot and rebuild `registry` from the results.
///
/// The registry is cleared first. While disconnected the scan sends nothing
/// and leaves it empty. A lost link aborts the scan with `LinkLost` and the
/// registry is cleared again, since nothing learned on that link is trusted.
pub fn scan(link: &mut Link, registry: &mut Registry, options: &ScanOptions) -> Result<ScanReport> {
    registry.clear();
    let mut report = ScanReport::default();

    if !link.is_connected() {
        log::debug!("scan skipped: not connected");
        return Ok(report);
    }

    for slot in Slot::all() {
        if options.cancelled() {
            log::info!("scan cancelled after {} slot(s)", report.probed);
            report.cancelled = true;
            break;
        }

        let reply = match link.transact(slot, Action::GetMode, 0) {
            Ok(reply) => reply,
            Err(e) => {
                registry.clear();
                return Err(e);
            }
        };
        report.probed += 1;

        match reply {
            Some(raw) if !is_no_device_sentinel(raw) => {
                log::debug!("slot {slot}: device present (mode {raw})");
                let mut kicker = Kicker::new(slot);
                kicker.seed_mode(raw);
                registry.insert(kicker);
                report.found += 1;
            }
            Some(raw) => log::debug!("slot {slot}: no device (sentinel {raw:#010X})"),
            None => log::debug!("slot {slot}: no device"),
        }

        if !options.probe_delay.is_zero() {
            std::thread::sleep(options.probe_delay);
        }
    }

    log::info!(
        "scan found {} device(s) in {} probed slot(s)",
        report.found,
        report.probed
    );
    Ok(report)
}
