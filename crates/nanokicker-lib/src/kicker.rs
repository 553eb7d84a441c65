//! NanoKicker device handle — cached parameters and typed get/set operations.
//!
//! A [`Kicker`] owns the cached parameter set for one slot and borrows the
//! [`Link`] for each transaction. Setters update the cache before sending, so
//! a set that fails on the wire still shows the requested value until the next
//! read. Getters only touch the cache when a full value comes back.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::link::{Link, LinkError, Result};
use crate::protocol::{Action, Mode, Slot, float_to_wire, wire_to_float};

// ── Parameters ──

/// Cached device state. `None` means never read or written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parameters {
    pub mode: Option<Mode>,
    pub frequency: Option<u32>,
    pub amplitude: Option<f32>,
    pub startup_enabled: Option<bool>,
    pub vin: Option<f32>,
    pub vout: Option<f32>,
    pub pot_range: Option<f32>,
    pub r_g_trim: Option<f32>,
    pub r_f_trim: Option<f32>,
    pub wiper: Option<u32>,
}

/// One readable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Mode,
    Frequency,
    Amplitude,
    StartupEnabled,
    Vin,
    Vout,
    PotRange,
    RgTrim,
    RfTrim,
    Wiper,
}

impl Parameter {
    /// Order used by [`Kicker::read_all_parameters`].
    pub const READ_ORDER: [Parameter; 10] = [
        Parameter::Mode,
        Parameter::Frequency,
        Parameter::Amplitude,
        Parameter::StartupEnabled,
        Parameter::Vin,
        Parameter::Vout,
        Parameter::PotRange,
        Parameter::RgTrim,
        Parameter::RfTrim,
        Parameter::Wiper,
    ];

    pub fn getter(self) -> Action {
        match self {
            Parameter::Mode => Action::GetMode,
            Parameter::Frequency => Action::GetFrequency,
            Parameter::Amplitude => Action::GetAmplitude,
            Parameter::StartupEnabled => Action::GetStartupEnabled,
            Parameter::Vin => Action::GetVin,
            Parameter::Vout => Action::GetVout,
            Parameter::PotRange => Action::GetPotRange,
            Parameter::RgTrim => Action::GetRgTrim,
            Parameter::RfTrim => Action::GetRfTrim,
            Parameter::Wiper => Action::GetWiper,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Parameter::Mode => "mode",
            Parameter::Frequency => "frequency",
            Parameter::Amplitude => "amplitude",
            Parameter::StartupEnabled => "startup",
            Parameter::Vin => "vin",
            Parameter::Vout => "vout",
            Parameter::PotRange => "pot-range",
            Parameter::RgTrim => "rg-trim",
            Parameter::RfTrim => "rf-trim",
            Parameter::Wiper => "wiper",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Parameter::READ_ORDER
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Parameter::READ_ORDER.iter().map(|p| p.name()).collect();
                format!("unknown parameter '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Outcome of [`Kicker::read_all_parameters`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadReport {
    /// Getters that returned a value.
    pub read: usize,
    /// Getters that got no value back (short reply or timeout).
    pub empty: usize,
    /// Getters whose transaction failed.
    pub failed: Vec<(Parameter, LinkError)>,
}

impl ReadReport {
    pub fn is_complete(&self) -> bool {
        self.empty == 0 && self.failed.is_empty()
    }

    /// Whether any getter hit a lost link.
    pub fn link_lost(&self) -> bool {
        self.failed
            .iter()
            .any(|(_, e)| matches!(e, LinkError::LinkLost(_)))
    }
}

// ── Kicker ──

#[derive(Debug, Clone, PartialEq)]
pub struct Kicker {
    slot: Slot,
    params: Parameters,
}

impl Kicker {
    pub fn new(slot: Slot) -> Self {
        Kicker {
            slot,
            params: Parameters::default(),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Seed the cached mode from a discovery probe.
    pub(crate) fn seed_mode(&mut self, raw: u32) {
        self.params.mode = self.decode_mode(raw);
    }

    fn decode_mode(&self, raw: u32) -> Option<Mode> {
        let mode = Mode::from_wire(raw);
        if mode.is_none() {
            log::warn!("device {} reported unknown mode {raw}", self.slot);
        }
        mode
    }

    fn send(&self, link: &mut Link, action: Action, value: u32) -> Result<()> {
        link.transact(self.slot, action, value).map(|_| ())
    }

    fn fetch(&self, link: &mut Link, action: Action) -> Result<Option<u32>> {
        link.transact(self.slot, action, 0)
    }

    // ── Setters ──

    pub fn set_mode(&mut self, link: &mut Link, mode: Mode) -> Result<()> {
        self.params.mode = Some(mode);
        self.send(link, Action::SetMode, mode.to_wire())
    }

    /// Output frequency in Hz.
    pub fn set_frequency(&mut self, link: &mut Link, hz: u32) -> Result<()> {
        self.params.frequency = Some(hz);
        self.send(link, Action::SetFrequency, hz)
    }

    pub fn set_amplitude(&mut self, link: &mut Link, amplitude: f32) -> Result<()> {
        self.params.amplitude = Some(amplitude);
        self.send(link, Action::SetAmplitude, float_to_wire(amplitude))
    }

    /// Digital potentiometer wiper position.
    pub fn set_wiper(&mut self, link: &mut Link, wiper: u32) -> Result<()> {
        self.params.wiper = Some(wiper);
        self.send(link, Action::SetWiper, wiper)
    }

    /// Whether the output starts enabled at power-up.
    pub fn set_startup_enabled(&mut self, link: &mut Link, enabled: bool) -> Result<()> {
        self.params.startup_enabled = Some(enabled);
        self.send(link, Action::SetStartupEnabled, u32::from(enabled))
    }

    pub fn set_vin(&mut self, link: &mut Link, vin: f32) -> Result<()> {
        self.params.vin = Some(vin);
        self.send(link, Action::SetVin, float_to_wire(vin))
    }

    pub fn set_vout(&mut self, link: &mut Link, vout: f32) -> Result<()> {
        self.params.vout = Some(vout);
        self.send(link, Action::SetVout, float_to_wire(vout))
    }

    pub fn set_pot_range(&mut self, link: &mut Link, range: f32) -> Result<()> {
        self.params.pot_range = Some(range);
        self.send(link, Action::SetPotRange, float_to_wire(range))
    }

    pub fn set_r_g_trim(&mut self, link: &mut Link, trim: f32) -> Result<()> {
        self.params.r_g_trim = Some(trim);
        self.send(link, Action::SetRgTrim, float_to_wire(trim))
    }

    pub fn set_r_f_trim(&mut self, link: &mut Link, trim: f32) -> Result<()> {
        self.params.r_f_trim = Some(trim);
        self.send(link, Action::SetRfTrim, float_to_wire(trim))
    }

    /// Store the device's current settings in its non-volatile memory.
    pub fn save_settings(&self, link: &mut Link) -> Result<()> {
        self.send(link, Action::SaveSettings, 0)
    }

    /// Restore settings from non-volatile memory.
    ///
    /// The device state may change wholesale; follow with
    /// [`read_all_parameters`](Kicker::read_all_parameters).
    pub fn load_settings(&self, link: &mut Link) -> Result<()> {
        self.send(link, Action::LoadSettings, 0)
    }

    // ── Getters ──
    //
    // Each returns the value just read, or `None` if the device sent none.
    // The cache is only updated on `Some`.

    pub fn get_mode(&mut self, link: &mut Link) -> Result<Option<Mode>> {
        let Some(raw) = self.fetch(link, Action::GetMode)? else {
            return Ok(None);
        };
        let mode = self.decode_mode(raw);
        if mode.is_some() {
            self.params.mode = mode;
        }
        Ok(mode)
    }

    pub fn get_frequency(&mut self, link: &mut Link) -> Result<Option<u32>> {
        let value = self.fetch(link, Action::GetFrequency)?;
        if value.is_some() {
            self.params.frequency = value;
        }
        Ok(value)
    }

    pub fn get_amplitude(&mut self, link: &mut Link) -> Result<Option<f32>> {
        let value = self.fetch(link, Action::GetAmplitude)?.map(wire_to_float);
        if value.is_some() {
            self.params.amplitude = value;
        }
        Ok(value)
    }

    pub fn get_wiper(&mut self, link: &mut Link) -> Result<Option<u32>> {
        let value = self.fetch(link, Action::GetWiper)?;
        if value.is_some() {
            self.params.wiper = value;
        }
        Ok(value)
    }

    pub fn get_startup_enabled(&mut self, link: &mut Link) -> Result<Option<bool>> {
        let value = self.fetch(link, Action::GetStartupEnabled)?.map(|v| v != 0);
        if value.is_some() {
            self.params.startup_enabled = value;
        }
        Ok(value)
    }

    pub fn get_vin(&mut self, link: &mut Link) -> Result<Option<f32>> {
        let value = self.fetch_float(link, Action::GetVin)?;
        if value.is_some() {
            self.params.vin = value;
        }
        Ok(value)
    }

    pub fn get_vout(&mut self, link: &mut Link) -> Result<Option<f32>> {
        let value = self.fetch_float(link, Action::GetVout)?;
        if value.is_some() {
            self.params.vout = value;
        }
        Ok(value)
    }

    pub fn get_pot_range(&mut self, link: &mut Link) -> Result<Option<f32>> {
        let value = self.fetch_float(link, Action::GetPotRange)?;
        if value.is_some() {
            self.params.pot_range = value;
        }
        Ok(value)
    }

    pub fn get_r_g_trim(&mut self, link: &mut Link) -> Result<Option<f32>> {
        let value = self.fetch_float(link, Action::GetRgTrim)?;
        if value.is_some() {
            self.params.r_g_trim = value;
        }
        Ok(value)
    }

    pub fn get_r_f_trim(&mut self, link: &mut Link) -> Result<Option<f32>> {
        let value = self.fetch_float(link, Action::GetRfTrim)?;
        if value.is_some() {
            self.params.r_f_trim = value;
        }
        Ok(value)
    }

    fn fetch_float(&self, link: &mut Link, action: Action) -> Result<Option<f32>> {
        Ok(self.fetch(link, action)?.map(wire_to_float))
    }

    /// Read one parameter. Returns whether a value came back.
    pub fn read_parameter(&mut self, link: &mut Link, param: Parameter) -> Result<bool> {
        match param {
            Parameter::Mode => self.get_mode(link).map(|v| v.is_some()),
            Parameter::Frequency => self.get_frequency(link).map(|v| v.is_some()),
            Parameter::Amplitude => self.get_amplitude(link).map(|v| v.is_some()),
            Parameter::StartupEnabled => self.get_startup_enabled(link).map(|v| v.is_some()),
            Parameter::Vin => self.get_vin(link).map(|v| v.is_some()),
            Parameter::Vout => self.get_vout(link).map(|v| v.is_some()),
            Parameter::PotRange => self.get_pot_range(link).map(|v| v.is_some()),
            Parameter::RgTrim => self.get_r_g_trim(link).map(|v| v.is_some()),
            Parameter::RfTrim => self.get_r_f_trim(link).map(|v| v.is_some()),
            Parameter::Wiper => self.get_wiper(link).map(|v| v.is_some()),
        }
    }

    /// Run every getter in [`Parameter::READ_ORDER`], one round trip each.
    ///
    /// A failing getter is recorded and the rest still run; its cached value
    /// is left as it was.
    pub fn read_all_parameters(&mut self, link: &mut Link) -> ReadReport {
        log::debug!("reading all parameters for device {}", self.slot);
        let mut report = ReadReport::default();
        for param in Parameter::READ_ORDER {
            match self.read_parameter(link, param) {
                Ok(true) => report.read += 1,
                Ok(false) => report.empty += 1,
                Err(e) => {
                    log::debug!("device {}: {param} read failed: {e}", self.slot);
                    report.failed.push((param, e));
                }
            }
        }
        report
    }
}

fn fmt_opt<T: fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "?".to_string(), |v| v.to_string())
}

impl fmt::Display for Kicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NanoKicker #{} (mode={}, frequency={}, amplitude={})",
            self.slot,
            fmt_opt(&self.params.mode),
            fmt_opt(&self.params.frequency),
            fmt_opt(&self.params.amplitude),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::float_to_wire;
    use crate::transport::mock::{MockConnector, Reply};

    fn setup(slot: u8) -> (Kicker, Link, MockConnector) {
        let conn = MockConnector::new();
        let mut link = Link::new(conn.clone());
        link.connect("mock0").unwrap();
        (Kicker::new(Slot::new(slot).unwrap()), link, conn)
    }

    // ── Setters ──

    #[test]
    fn set_frequency_frame() {
        let (mut k, mut link, conn) = setup(3);
        k.set_frequency(&mut link, 1000).unwrap();
        assert_eq!(conn.frames(), vec![vec![0x03, 0x02, 0x00, 0x00, 0x03, 0xE8]]);
        assert_eq!(k.params().frequency, Some(1000));
    }

    #[test]
    fn set_amplitude_frame_uses_float_bits() {
        let (mut k, mut link, conn) = setup(0);
        k.set_amplitude(&mut link, 2.5).unwrap();
        assert_eq!(conn.frames(), vec![vec![0x00, 0x03, 0x40, 0x20, 0x00, 0x00]]);
        assert_eq!(k.params().amplitude, Some(2.5));
    }

    #[test]
    fn setter_action_codes() {
        let (mut k, mut link, conn) = setup(7);
        k.set_mode(&mut link, Mode::Triangle).unwrap();
        k.set_wiper(&mut link, 128).unwrap();
        k.set_startup_enabled(&mut link, true).unwrap();
        k.set_vin(&mut link, 12.0).unwrap();
        k.set_vout(&mut link, 5.0).unwrap();
        k.set_pot_range(&mut link, 10_000.0).unwrap();
        k.set_r_g_trim(&mut link, 1.5).unwrap();
        k.set_r_f_trim(&mut link, -0.25).unwrap();
        k.save_settings(&mut link).unwrap();
        k.load_settings(&mut link).unwrap();

        let frames = conn.frames();
        let actions: Vec<u8> = frames.iter().map(|f| f[1]).collect();
        assert_eq!(actions, vec![1, 4, 11, 12, 13, 14, 15, 16, 17, 18]);
        assert!(frames.iter().all(|f| f[0] == 7));
        assert_eq!(frames[0][2..], 4u32.to_be_bytes());
        assert_eq!(frames[2][2..], 1u32.to_be_bytes());
        assert_eq!(frames[3][2..], float_to_wire(12.0).to_be_bytes());
        assert_eq!(frames[8][2..], [0, 0, 0, 0]);
    }

    #[test]
    fn failed_setter_keeps_optimistic_cache() {
        let (mut k, mut link, conn) = setup(1);
        conn.state().fail_next_write = true;
        let err = k.set_frequency(&mut link, 440).unwrap_err();
        assert!(matches!(err, LinkError::LinkLost(_)));
        assert_eq!(k.params().frequency, Some(440));
    }

    #[test]
    fn setter_while_disconnected_fails() {
        let (mut k, mut link, _conn) = setup(1);
        link.disconnect();
        assert_eq!(k.set_mode(&mut link, Mode::Sine), Err(LinkError::NotConnected));
    }

    // ── Getters ──

    #[test]
    fn getters_update_cache() {
        let (mut k, mut link, conn) = setup(2);
        conn.push_value(1);
        conn.push_value(1000);
        conn.push_value(float_to_wire(3.3));
        conn.push_value(1);
        assert_eq!(k.get_mode(&mut link), Ok(Some(Mode::Sine)));
        assert_eq!(k.get_frequency(&mut link), Ok(Some(1000)));
        assert_eq!(k.get_amplitude(&mut link), Ok(Some(3.3)));
        assert_eq!(k.get_startup_enabled(&mut link), Ok(Some(true)));
        assert_eq!(k.params().mode, Some(Mode::Sine));
        assert_eq!(k.params().frequency, Some(1000));
        assert_eq!(k.params().amplitude, Some(3.3));
        assert_eq!(k.params().startup_enabled, Some(true));
    }

    #[test]
    fn short_read_leaves_cache_untouched() {
        let (mut k, mut link, conn) = setup(2);
        k.set_frequency(&mut link, 500).unwrap();
        for short in [vec![], vec![0x2D], vec![0x2D, 0x32], vec![0x2D, 0x32, 0x0D]] {
            conn.push_reply(Reply::Bytes(short));
            assert_eq!(k.get_frequency(&mut link), Ok(None));
            assert_eq!(k.params().frequency, Some(500));
        }
    }

    #[test]
    fn unknown_mode_is_not_cached() {
        let (mut k, mut link, conn) = setup(2);
        k.set_mode(&mut link, Mode::Square).unwrap();
        conn.push_value(3);
        assert_eq!(k.get_mode(&mut link), Ok(None));
        assert_eq!(k.params().mode, Some(Mode::Square));
    }

    #[test]
    fn startup_nonzero_is_enabled() {
        let (mut k, mut link, conn) = setup(0);
        conn.push_value(0);
        assert_eq!(k.get_startup_enabled(&mut link), Ok(Some(false)));
        conn.push_value(5);
        assert_eq!(k.get_startup_enabled(&mut link), Ok(Some(true)));
    }

    // ── Bulk read ──

    #[test]
    fn read_all_uses_fixed_order() {
        let (mut k, mut link, conn) = setup(4);
        for v in [2, 1000, float_to_wire(1.0), 1] {
            conn.push_value(v);
        }
        for v in [12.0f32, 5.0, 10.0, 0.5, 0.75] {
            conn.push_value(float_to_wire(v));
        }
        conn.push_value(64);

        let report = k.read_all_parameters(&mut link);
        assert!(report.is_complete());
        assert_eq!(report.read, 10);

        let actions: Vec<u8> = conn.frames().iter().map(|f| f[1]).collect();
        assert_eq!(actions, vec![21, 22, 23, 31, 32, 33, 34, 35, 36, 24]);

        let p = k.params();
        assert_eq!(p.mode, Some(Mode::Square));
        assert_eq!(p.vin, Some(12.0));
        assert_eq!(p.vout, Some(5.0));
        assert_eq!(p.pot_range, Some(10.0));
        assert_eq!(p.r_g_trim, Some(0.5));
        assert_eq!(p.r_f_trim, Some(0.75));
        assert_eq!(p.wiper, Some(64));
    }

    #[test]
    fn read_all_continues_past_empty_replies() {
        let (mut k, mut link, conn) = setup(4);
        conn.push_value(1);
        conn.push_reply(Reply::Bytes(b"err".to_vec()));
        conn.push_value(float_to_wire(2.0));
        let report = k.read_all_parameters(&mut link);
        assert_eq!(report.read, 2);
        assert_eq!(report.empty, 8);
        assert!(report.failed.is_empty());
        assert_eq!(conn.frames().len(), 10);
        assert_eq!(k.params().frequency, None);
        assert_eq!(k.params().amplitude, Some(2.0));
    }

    #[test]
    fn read_all_records_failures_after_link_loss() {
        let (mut k, mut link, conn) = setup(4);
        conn.push_value(1);
        conn.push_reply(Reply::Drop);
        let report = k.read_all_parameters(&mut link);
        assert_eq!(report.read, 1);
        assert_eq!(report.failed.len(), 9);
        assert!(report.link_lost());
        assert_eq!(report.failed[0].0, Parameter::Frequency);
        assert!(
            report.failed[1..]
                .iter()
                .all(|(_, e)| *e == LinkError::NotConnected)
        );
        assert_eq!(k.params().mode, Some(Mode::Sine));
    }

    // ── Parameter names ──

    #[test]
    fn read_order_matches_getter_codes() {
        let codes: Vec<u8> = Parameter::READ_ORDER
            .iter()
            .map(|p| p.getter().code())
            .collect();
        assert_eq!(codes, vec![21, 22, 23, 31, 32, 33, 34, 35, 36, 24]);
    }

    #[test]
    fn parameter_from_str() {
        assert_eq!("Frequency".parse::<Parameter>(), Ok(Parameter::Frequency));
        assert_eq!("pot_range".parse::<Parameter>(), Ok(Parameter::PotRange));
        assert_eq!("rf-trim".parse::<Parameter>(), Ok(Parameter::RfTrim));
        assert!("phase".parse::<Parameter>().is_err());
    }

    #[test]
    fn display_shows_unknowns() {
        let mut k = Kicker::new(Slot::new(9).unwrap());
        assert_eq!(
            k.to_string(),
            "NanoKicker #9 (mode=?, frequency=?, amplitude=?)"
        );
        k.seed_mode(2);
        assert_eq!(
            k.to_string(),
            "NanoKicker #9 (mode=square, frequency=?, amplitude=?)"
        );
    }

    #[test]
    fn parameters_serialize_nulls_for_unknown() {
        let p = Parameters {
            mode: Some(Mode::Sine),
            frequency: Some(100),
            ..Parameters::default()
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["mode"], "sine");
        assert_eq!(json["frequency"], 100);
        assert!(json["amplitude"].is_null());
        assert!(json["wiper"].is_null());
    }
}
