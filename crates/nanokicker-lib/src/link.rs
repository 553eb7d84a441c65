//! Link to the motherboard — owns the transport and runs command transactions.
//!
//! A transaction is: discard stale input, write one frame, read the reply the
//! action is paired with. Binary replies are all-or-nothing: anything shorter
//! than four bytes is firmware text, never a truncated value. Any transport
//! failure tears the connection down, emits one [`LinkEvent::Lost`] and
//! returns [`LinkError::LinkLost`]; the transaction is not retried.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::protocol::{
    Action, COMMAND_LEN, Command, ERROR_MARKER, MAX_DEVICES, RESPONSE_LEN, ResponseKind, Slot,
    decode_response, hex,
};
use crate::transport::{Connector, Transport, TransportError};

// ── Error type ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Operation attempted while disconnected.
    NotConnected,
    /// The transport could not be opened.
    ConnectFailed { port: String, reason: String },
    /// The open transport failed mid-transaction. The link is now disconnected.
    LinkLost(String),
    /// Device id outside `0..MAX_DEVICES`. Nothing was sent.
    InvalidDeviceId(u8),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::NotConnected => write!(f, "Not connected to motherboard"),
            LinkError::ConnectFailed { port, reason } => {
                write!(f, "Failed to connect to {port}: {reason}")
            }
            LinkError::LinkLost(e) => write!(f, "Connection to motherboard lost: {e}"),
            LinkError::InvalidDeviceId(id) => write!(
                f,
                "Invalid device id {id} (expected 0-{})",
                MAX_DEVICES - 1
            ),
        }
    }
}

impl std::error::Error for LinkError {}

pub type Result<T> = std::result::Result<T, LinkError>;

// ── Events ──

/// Notification emitted by the link outside the normal call/return path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The transport failed; the link closed it and is now disconnected.
    Lost { port: String, reason: String },
}

// ── Link ──

struct Connection {
    port: String,
    transport: Box<dyn Transport>,
}

/// The single connection to a motherboard.
///
/// All transactions take `&mut self`, so at most one is ever in flight.
pub struct Link {
    connector: Box<dyn Connector>,
    conn: Option<Connection>,
    events_tx: Sender<LinkEvent>,
    events_rx: Option<Receiver<LinkEvent>>,
    last_diagnostic: Option<String>,
}

impl Link {
    pub fn new(connector: impl Connector + 'static) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Link {
            connector: Box::new(connector),
            conn: None,
            events_tx,
            events_rx: Some(events_rx),
            last_diagnostic: None,
        }
    }

    /// Take the receiving end of the event channel. Single consumer: returns
    /// `None` after the first call.
    pub fn take_events(&mut self) -> Option<Receiver<LinkEvent>> {
        self.events_rx.take()
    }

    /// Open `port`. An already open transport is closed first.
    pub fn connect(&mut self, port: &str) -> Result<()> {
        if self.conn.is_some() {
            log::info!("replacing existing connection");
            self.disconnect();
        }
        match self.connector.open(port) {
            Ok(transport) => {
                log::info!("connected to {port}");
                self.conn = Some(Connection {
                    port: port.to_string(),
                    transport,
                });
                Ok(())
            }
            Err(e) => Err(LinkError::ConnectFailed {
                port: port.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Close the transport if open. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.transport.close();
            log::info!("disconnected from {}", conn.port);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Port identifier of the open connection.
    pub fn port(&self) -> Option<&str> {
        self.conn.as_ref().map(|c| c.port.as_str())
    }

    /// Firmware text received in place of a value, or an error line, from the
    /// most recent transaction.
    pub fn last_diagnostic(&self) -> Option<&str> {
        self.last_diagnostic.as_deref()
    }

    /// Run one transaction against `device_id`.
    ///
    /// Returns `Some(value)` for a full binary reply and `None` for a short
    /// binary reply or any text-reply action.
    pub fn send_command(&mut self, device_id: u8, action: Action, value: u32) -> Result<Option<u32>> {
        let slot = Slot::new(device_id).ok_or(LinkError::InvalidDeviceId(device_id))?;
        self.transact(slot, action, value)
    }

    /// [`send_command`](Link::send_command) with an already validated slot.
    pub fn transact(&mut self, slot: Slot, action: Action, value: u32) -> Result<Option<u32>> {
        self.last_diagnostic = None;
        let conn = self.conn.as_mut().ok_or(LinkError::NotConnected)?;
        let frame = Command::new(slot, action, value).encode();
        log::debug!("[{}] -> {} ({action:?})", conn.port, hex(&frame));

        match exchange(conn.transport.as_mut(), &frame, action.response()) {
            Ok((value, diagnostic)) => {
                self.last_diagnostic = diagnostic;
                Ok(value)
            }
            Err(e) => Err(self.lose(e)),
        }
    }

    /// Tear down after a transport failure and notify the event consumer.
    fn lose(&mut self, err: TransportError) -> LinkError {
        let reason = err.to_string();
        if let Some(mut conn) = self.conn.take() {
            conn.transport.close();
            log::warn!("link to {} lost: {reason}", conn.port);
            // Receiver may already be gone; the error return still reports it.
            let _ = self.events_tx.send(LinkEvent::Lost {
                port: conn.port,
                reason: reason.clone(),
            });
        }
        LinkError::LinkLost(reason)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("port", &self.port())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Write a frame and read the reply. Returns the value and any diagnostic text.
fn exchange(
    t: &mut dyn Transport,
    frame: &[u8; COMMAND_LEN],
    kind: ResponseKind,
) -> std::result::Result<(Option<u32>, Option<String>), TransportError> {
    t.discard_input()?;
    t.write(frame)?;

    match kind {
        ResponseKind::Binary => {
            let bytes = t.read_exact(RESPONSE_LEN)?;
            if let Some(value) = decode_response(&bytes) {
                log::debug!("<- {} ({value})", hex(&bytes));
                return Ok((Some(value), None));
            }
            if bytes.is_empty() {
                log::debug!("<- (no reply)");
                return Ok((None, None));
            }
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            log::debug!("<- unexpected {} byte reply: {text:?}", bytes.len());
            Ok((None, Some(text)))
        }
        ResponseKind::Text => {
            let line = t.read_line()?;
            let line = line.trim();
            if line.to_ascii_lowercase().contains(ERROR_MARKER) {
                log::warn!("motherboard error: {line}");
                return Ok((None, Some(line.to_string())));
            }
            if !line.is_empty() {
                log::debug!("<- {line}");
            }
            Ok((None, None))
        }
    }
}
