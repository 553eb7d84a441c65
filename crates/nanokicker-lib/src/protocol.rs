//! Wire protocol for the NanoKicker motherboard.
//!
//! The host writes fixed 6-byte command frames; the motherboard firmware relays
//! each one to the addressed kicker and answers with either a 4-byte binary
//! value (getters) or a line of diagnostic text (setters and storage actions).
//!
//! ## Framing
//!
//! - Command: `[device_id:u8][action:u8][value:u32 BE]` — no terminator.
//! - Binary reply: `[value:u32 BE]` — no terminator.
//! - Text reply: free-form text ending in a line break.
//!
//! The stream carries no message boundaries and no response-type tag, so the
//! reply kind is fixed per [`Action`] (see [`Action::response`]).
//!
//! ## Float parameters
//!
//! Float parameters travel as the little-endian bytes of an IEEE-754 `f32`
//! reinterpreted as a `u32`. That `u32` is then framed big-endian like any
//! other value. The two byte orders are independent of each other.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

// ── Limits and defaults ──

/// Number of addressable device slots on the motherboard (ids `0..20`).
pub const MAX_DEVICES: u8 = 20;

/// Length of a command frame in bytes.
pub const COMMAND_LEN: usize = 6;

/// Length of a binary reply in bytes.
pub const RESPONSE_LEN: usize = 4;

/// Default per-call read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after each discovery probe.
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_millis(50);

/// Default baud rate. The motherboard enumerates as USB CDC and ignores it.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Substring that marks a firmware text reply as an error report.
pub const ERROR_MARKER: &str = "error";

/// Full-length replies observed from firmware when no kicker answers a slot.
///
/// These are diagnostic text bytes misread as an integer and change with
/// firmware revisions. Short reads are the primary absence signal; this list
/// only catches text that happens to be exactly four bytes long.
pub const NO_DEVICE_SENTINELS: &[u32] = &[0xFEFF_FFFF];

/// Whether a full-length reply is a known "no device" sentinel.
pub fn is_no_device_sentinel(value: u32) -> bool {
    NO_DEVICE_SENTINELS.contains(&value)
}

// ── Slots ──

/// A validated device slot id (`0..MAX_DEVICES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Slot(u8);

impl Slot {
    /// Validate a raw device id. Returns `None` outside `0..MAX_DEVICES`.
    pub fn new(id: u8) -> Option<Self> {
        (id < MAX_DEVICES).then_some(Slot(id))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    /// Every slot in probe order.
    pub fn all() -> impl Iterator<Item = Slot> {
        (0..MAX_DEVICES).map(Slot)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Actions ──

/// Reply kind the firmware sends for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// 4-byte big-endian value.
    Binary,
    /// One line of diagnostic text.
    Text,
}

/// Firmware action codes. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    SetMode = 1,
    SetFrequency = 2,
    SetAmplitude = 3,
    SetWiper = 4,
    SetStartupEnabled = 11,
    SetVin = 12,
    SetVout = 13,
    SetPotRange = 14,
    SetRgTrim = 15,
    SetRfTrim = 16,
    SaveSettings = 17,
    LoadSettings = 18,
    GetMode = 21,
    GetFrequency = 22,
    GetAmplitude = 23,
    GetWiper = 24,
    GetStartupEnabled = 31,
    GetVin = 32,
    GetVout = 33,
    GetPotRange = 34,
    GetRgTrim = 35,
    GetRfTrim = 36,
}

impl Action {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Reply kind the firmware answers this action with.
    pub fn response(self) -> ResponseKind {
        if self.code() >= Action::GetMode.code() {
            ResponseKind::Binary
        } else {
            ResponseKind::Text
        }
    }
}

// ── Command frame ──

/// A single command frame. Built per call and consumed by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub device_id: u8,
    pub action: u8,
    pub value: u32,
}

impl Command {
    pub fn new(slot: Slot, action: Action, value: u32) -> Self {
        Command {
            device_id: slot.id(),
            action: action.code(),
            value,
        }
    }

    /// Serialize to the 6-byte wire frame.
    pub fn encode(&self) -> [u8; COMMAND_LEN] {
        let mut frame = [0u8; COMMAND_LEN];
        frame[0] = self.device_id;
        frame[1] = self.action;
        frame[2..].copy_from_slice(&self.value.to_be_bytes());
        frame
    }
}

/// Format bytes as lowercase hex without separators (for logs).
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a binary reply. Returns `None` unless exactly [`RESPONSE_LEN`] bytes.
pub fn decode_response(bytes: &[u8]) -> Option<u32> {
    let raw: [u8; RESPONSE_LEN] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

// ── Value encodings ──

/// Reinterpret the little-endian bytes of `value` as a `u32` command value.
pub fn float_to_wire(value: f32) -> u32 {
    u32::from_le_bytes(value.to_le_bytes())
}

/// Inverse of [`float_to_wire`].
pub fn wire_to_float(value: u32) -> f32 {
    f32::from_le_bytes(value.to_le_bytes())
}

// ── Mode ──

/// Waveform mode. Wire value 3 is reserved by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Off,
    Sine,
    Square,
    Triangle,
}

impl Mode {
    pub fn to_wire(self) -> u32 {
        match self {
            Mode::Off => 0,
            Mode::Sine => 1,
            Mode::Square => 2,
            Mode::Triangle => 4,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Mode::Off),
            1 => Some(Mode::Sine),
            2 => Some(Mode::Square),
            4 => Some(Mode::Triangle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Sine => "sine",
            Mode::Square => "square",
            Mode::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts a mode name (case-insensitive) or its wire number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Mode::from_wire(n)
                .ok_or_else(|| format!("invalid mode number {n} (expected 0, 1, 2 or 4)"));
        }
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Mode::Off),
            "sine" => Ok(Mode::Sine),
            "square" => Ok(Mode::Square),
            "triangle" => Ok(Mode::Triangle),
            _ => Err(format!(
                "invalid mode '{s}' (expected off, sine, square or triangle)"
            )),
        }
    }
}
