//! The motherboard as a whole: one link plus the devices found on it.

use std::fmt;
use std::sync::mpsc::Receiver;

use crate::discovery::{self, ScanOptions, ScanReport};
use crate::kicker::Kicker;
use crate::link::{Link, LinkEvent, Result};
use crate::protocol::Slot;
use crate::registry::Registry;
use crate::transport::Connector;

/// Shown by [`Board::registry`] while the link is down.
static NO_DEVICES: Registry = Registry::new();

/// Owns the [`Link`] and the [`Registry`] and keeps them consistent: the
/// registry is emptied whenever the link goes away.
///
/// A loss reported by any transaction takes effect immediately. Readers see
/// no devices while disconnected, and the stale handles are dropped on the
/// next `&mut self` call. The loss event itself stays queued for
/// [`poll_events`](Board::poll_events).
pub struct Board {
    link: Link,
    registry: Registry,
    events: Option<Receiver<LinkEvent>>,
}

impl Board {
    /// Create a disconnected board. The board consumes the link's event
    /// channel; use [`poll_events`](Board::poll_events) to observe it.
    pub fn new(connector: impl Connector + 'static) -> Self {
        let mut link = Link::new(connector);
        let events = link.take_events();
        Board {
            link,
            registry: Registry::new(),
            events,
        }
    }

    pub fn connect(&mut self, port: &str) -> Result<()> {
        self.registry.clear();
        self.link.connect(port)
    }

    /// Close the link and forget every device. Idempotent.
    pub fn disconnect(&mut self) {
        self.link.disconnect();
        self.registry.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn port(&self) -> Option<&str> {
        self.link.port()
    }

    /// Forget the devices if the link has gone away since the last call.
    fn sync(&mut self) {
        if !self.link.is_connected() && !self.registry.is_empty() {
            log::debug!("link down, dropping {} device(s)", self.registry.len());
            self.registry.clear();
        }
    }

    /// Rebuild the registry by probing every slot.
    pub fn scan(&mut self, options: &ScanOptions) -> Result<ScanReport> {
        discovery::scan(&mut self.link, &mut self.registry, options)
    }

    /// Discovered devices. Empty while the link is down.
    pub fn registry(&self) -> &Registry {
        if self.link.is_connected() {
            &self.registry
        } else {
            &NO_DEVICES
        }
    }

    pub fn link_mut(&mut self) -> &mut Link {
        self.sync();
        &mut self.link
    }

    pub fn kicker(&self, slot: Slot) -> Option<&Kicker> {
        self.registry().get(slot)
    }

    /// A discovered device together with the link to drive it.
    pub fn kicker_mut(&mut self, slot: Slot) -> Option<(&mut Kicker, &mut Link)> {
        self.sync();
        let kicker = self.registry.get_mut(slot)?;
        Some((kicker, &mut self.link))
    }

    /// Like [`kicker_mut`](Board::kicker_mut), but registers an empty handle
    /// for `slot` when it was not discovered.
    pub fn attach(&mut self, slot: Slot) -> (&mut Kicker, &mut Link) {
        self.sync();
        (self.registry.entry(slot), &mut self.link)
    }

    pub fn parts_mut(&mut self) -> (&mut Link, &mut Registry) {
        self.sync();
        (&mut self.link, &mut self.registry)
    }

    /// Drain pending link events.
    pub fn poll_events(&mut self) -> Vec<LinkEvent> {
        self.sync();
        match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.link.port() {
            None => write!(f, "Motherboard (disconnected)"),
            Some(port) => {
                let slots: Vec<String> = self
                    .registry()
                    .slots()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                write!(
                    f,
                    "Motherboard on {port} ({} device{}",
                    slots.len(),
                    if slots.len() == 1 { "" } else { "s" }
                )?;
                if !slots.is_empty() {
                    write!(f, ": {}", slots.join(", "))?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("link", &self.link)
            .field("slots", &self.registry().slots())
            .finish()
    }
}
