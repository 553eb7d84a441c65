//! `set` subcommand — write parameters to a device.

use clap::Args;
use nanokicker_lib::kicker::Kicker;
use nanokicker_lib::link::Link;

use super::{KickerError, Mode, Result, SetOutput, Slot, open_board, print_json};
use super::get::print_device;

#[derive(Args, Debug, Default, Clone)]
pub struct SetArgs {
    /// Output frequency in Hz
    #[arg(long)]
    pub frequency: Option<u32>,
    /// Output amplitude
    #[arg(long, allow_negative_numbers = true)]
    pub amplitude: Option<f32>,
    /// Waveform: off, sine, square, triangle (or 0, 1, 2, 4)
    #[arg(long)]
    pub mode: Option<Mode>,
    /// Digital potentiometer wiper position
    #[arg(long)]
    pub wiper: Option<u32>,
    /// Enable the output at power-up (true/false)
    #[arg(long)]
    pub startup: Option<bool>,
    /// Input voltage
    #[arg(long, allow_negative_numbers = true)]
    pub vin: Option<f32>,
    /// Output voltage
    #[arg(long, allow_negative_numbers = true)]
    pub vout: Option<f32>,
    /// Potentiometer range
    #[arg(long, allow_negative_numbers = true)]
    pub pot_range: Option<f32>,
    /// Gain resistor trim
    #[arg(long, allow_negative_numbers = true)]
    pub rg_trim: Option<f32>,
    /// Feedback resistor trim
    #[arg(long, allow_negative_numbers = true)]
    pub rf_trim: Option<f32>,
}

impl SetArgs {
    fn floats(&self) -> [(&'static str, Option<f32>); 6] {
        [
            ("amplitude", self.amplitude),
            ("vin", self.vin),
            ("vout", self.vout),
            ("pot-range", self.pot_range),
            ("rg-trim", self.rg_trim),
            ("rf-trim", self.rf_trim),
        ]
    }

    fn is_empty(&self) -> bool {
        self.frequency.is_none()
            && self.mode.is_none()
            && self.wiper.is_none()
            && self.startup.is_none()
            && self.floats().iter().all(|(_, v)| v.is_none())
    }

    /// Reject an empty request or a non-finite float before anything is sent.
    pub(super) fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(KickerError::InvalidInput(
                "nothing to set (give at least one of --frequency, --amplitude, --mode, \
                 --wiper, --startup, --vin, --vout, --pot-range, --rg-trim, --rf-trim)"
                    .into(),
            ));
        }
        for (name, value) in self.floats() {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(KickerError::InvalidInput(format!(
                    "--{name} must be a finite number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Send the requested values: frequency, amplitude, mode, then the advanced
/// settings. Stops at the first link error. Returns the names applied.
pub(super) fn apply(kicker: &mut Kicker, link: &mut Link, args: &SetArgs) -> Result<Vec<&'static str>> {
    args.validate()?;
    let mut applied = Vec::new();
    let slot = kicker.slot();
    let mut note = |name: &'static str, link: &Link| {
        if let Some(d) = link.last_diagnostic() {
            log::warn!("device {slot}: {name}: {d}");
        }
        applied.push(name);
    };

    if let Some(hz) = args.frequency {
        kicker.set_frequency(link, hz)?;
        note("frequency", &*link);
    }
    if let Some(a) = args.amplitude {
        kicker.set_amplitude(link, a)?;
        note("amplitude", &*link);
    }
    if let Some(m) = args.mode {
        kicker.set_mode(link, m)?;
        note("mode", &*link);
    }
    if let Some(w) = args.wiper {
        kicker.set_wiper(link, w)?;
        note("wiper", &*link);
    }
    if let Some(on) = args.startup {
        kicker.set_startup_enabled(link, on)?;
        note("startup", &*link);
    }
    if let Some(v) = args.vin {
        kicker.set_vin(link, v)?;
        note("vin", &*link);
    }
    if let Some(v) = args.vout {
        kicker.set_vout(link, v)?;
        note("vout", &*link);
    }
    if let Some(v) = args.pot_range {
        kicker.set_pot_range(link, v)?;
        note("pot-range", &*link);
    }
    if let Some(v) = args.rg_trim {
        kicker.set_r_g_trim(link, v)?;
        note("rg-trim", &*link);
    }
    if let Some(v) = args.rf_trim {
        kicker.set_r_f_trim(link, v)?;
        note("rf-trim", &*link);
    }
    Ok(applied)
}

pub(super) fn cmd_set(opts: &super::Options, slot: Slot, args: &SetArgs) -> Result<()> {
    args.validate()?;
    let (mut board, _config) = open_board(opts)?;
    let (kicker, link) = board.attach(slot);
    let applied = apply(kicker, link, args)?;

    if opts.json {
        return print_json(&SetOutput {
            slot,
            applied,
            parameters: kicker.params().clone(),
        });
    }
    println!("Set {} on device {slot}.", applied.join(", "));
    println!();
    print_device(slot, kicker.params(), None);
    Ok(())
}
