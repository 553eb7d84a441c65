//! NanoKicker — host control for NanoKicker function generators on a serial motherboard.

pub mod board;
pub mod config;
pub mod discovery;
pub mod error;
pub mod kicker;
pub mod link;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod transport;

pub use error::KickerError;
