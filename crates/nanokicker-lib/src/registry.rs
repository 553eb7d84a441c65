//! Slot → device handle map produced by discovery.

use std::collections::BTreeMap;

use crate::kicker::Kicker;
use crate::protocol::Slot;

/// Devices found on the motherboard, ordered by slot.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    devices: BTreeMap<Slot, Kicker>,
}

impl Registry {
    pub const fn new() -> Self {
        Registry {
            devices: BTreeMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Insert a handle, replacing any existing one for the same slot.
    pub fn insert(&mut self, kicker: Kicker) {
        self.devices.insert(kicker.slot(), kicker);
    }

    pub fn get(&self, slot: Slot) -> Option<&Kicker> {
        self.devices.get(&slot)
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Kicker> {
        self.devices.get_mut(&slot)
    }

    /// The handle for `slot`, created empty if absent.
    pub fn entry(&mut self, slot: Slot) -> &mut Kicker {
        self.devices.entry(slot).or_insert_with(|| Kicker::new(slot))
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.devices.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Kicker> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Kicker> {
        self.devices.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u8) -> Slot {
        Slot::new(id).unwrap()
    }

    #[test]
    fn slots_are_ordered_and_unique() {
        let mut reg = Registry::new();
        reg.insert(Kicker::new(slot(7)));
        reg.insert(Kicker::new(slot(2)));
        reg.insert(Kicker::new(slot(7)));
        assert_eq!(reg.slots(), vec![slot(2), slot(7)]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn entry_creates_once() {
        let mut reg = Registry::new();
        reg.entry(slot(4)).seed_mode(1);
        reg.entry(slot(4));
        assert_eq!(reg.len(), 1);
        assert!(reg.get(slot(4)).unwrap().params().mode.is_some());
    }

    #[test]
    fn clear_empties() {
        let mut reg = Registry::new();
        reg.insert(Kicker::new(slot(0)));
        reg.clear();
        assert!(reg.is_empty());
        assert!(reg.get(slot(0)).is_none());
    }
}
