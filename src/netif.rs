// Author: Lukas Bower
// Purpose: Link-connectivity query surface and a bounded simulated interface table.

//! Network interface query abstractions.
//!
//! The link monitor only needs one answer from the stack: whether an
//! interface currently has carrier. [`NetifQuery`] captures that read;
//! [`NetifTable`] is a heapless rendition used by host simulations, tests and
//! benches where no real PHY is present.

use core::fmt::Write as FmtWrite;

use heapless::{String as HeaplessString, Vec as HeaplessVec};
use log::debug;
use thiserror::Error;

/// Maximum length of an interface name stored in a [`NetifTable`].
pub const NETIF_NAME_CAPACITY: usize = 16;

/// Bounded interface name.
pub type NetifName = HeaplessString<NETIF_NAME_CAPACITY>;

/// Synchronous, side-effect free link query exposed by a network stack.
pub trait NetifQuery {
    /// Handle identifying an interface. Monitors copy it; they never own the
    /// interface behind it.
    type Netif: Copy + core::fmt::Debug;

    /// Returns `true` while `netif` reports an established physical link.
    fn is_connected(&self, netif: Self::Netif) -> bool;
}

/// Handle into a [`NetifTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetifId(u16);

impl NetifId {
    /// Position of the interface inside its table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for NetifId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "netif{}", self.0)
    }
}

/// Errors surfaced by [`NetifTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetifError {
    /// Every interface entry is already in use.
    #[error("interface table is full")]
    TableFull,
    /// The interface name does not fit [`NETIF_NAME_CAPACITY`].
    #[error("interface name exceeds {} bytes", NETIF_NAME_CAPACITY)]
    NameTooLong,
    /// The handle does not refer to an interface in this table.
    #[error("unknown interface {0}")]
    UnknownInterface(NetifId),
}

#[derive(Debug, Clone)]
struct NetifEntry {
    name: NetifName,
    connected: bool,
}

/// Fixed-capacity table of simulated interfaces with a settable link flag.
#[derive(Debug, Clone, Default)]
pub struct NetifTable<const N: usize> {
    entries: HeaplessVec<NetifEntry, N>,
}

impl<const N: usize> NetifTable<N> {
    /// Create an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: HeaplessVec::new(),
        }
    }

    /// Add an interface with the supplied initial link state.
    pub fn add(&mut self, name: &str, connected: bool) -> Result<NetifId, NetifError> {
        let mut stored = NetifName::new();
        stored.push_str(name).map_err(|_| NetifError::NameTooLong)?;
        let id = u16::try_from(self.entries.len()).map_err(|_| NetifError::TableFull)?;
        self.entries
            .push(NetifEntry {
                name: stored,
                connected,
            })
            .map_err(|_| NetifError::TableFull)?;
        Ok(NetifId(id))
    }

    /// Update the physical link flag of `netif`.
    pub fn set_connected(&mut self, netif: NetifId, connected: bool) -> Result<(), NetifError> {
        let entry = self
            .entries
            .get_mut(netif.index())
            .ok_or(NetifError::UnknownInterface(netif))?;
        if entry.connected != connected {
            debug!(
                "netif: {} carrier {}",
                entry.name,
                if connected { "up" } else { "down" }
            );
        }
        entry.connected = connected;
        Ok(())
    }

    /// Look up an interface by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NetifId> {
        self.entries
            .iter()
            .position(|entry| entry.name.as_str() == name)
            .and_then(|index| u16::try_from(index).ok())
            .map(NetifId)
    }

    /// Name of `netif`, if it exists.
    #[must_use]
    pub fn name(&self, netif: NetifId) -> Option<&str> {
        self.entries.get(netif.index()).map(|entry| entry.name.as_str())
    }

    /// Number of interfaces in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the table holds no interfaces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render `netif` for log lines, falling back to the numeric handle.
    #[must_use]
    pub fn label(&self, netif: NetifId) -> NetifName {
        match self.name(netif) {
            Some(name) => {
                let mut label = NetifName::new();
                let _ = label.push_str(name);
                label
            }
            None => {
                let mut label = NetifName::new();
                let _ = write!(label, "{netif}");
                label
            }
        }
    }
}

impl<const N: usize> NetifQuery for NetifTable<N> {
    type Netif = NetifId;

    fn is_connected(&self, netif: NetifId) -> bool {
        self.entries
            .get(netif.index())
            .is_some_and(|entry| entry.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_toggle_link() {
        let mut table: NetifTable<2> = NetifTable::new();
        let eth0 = table.add("eth0", false).unwrap();
        assert!(!table.is_connected(eth0));

        table.set_connected(eth0, true).unwrap();
        assert!(table.is_connected(eth0));
        assert_eq!(table.find("eth0"), Some(eth0));
        assert_eq!(table.name(eth0), Some("eth0"));
    }

    #[test]
    fn full_table_rejects_new_interface() {
        let mut table: NetifTable<1> = NetifTable::new();
        table.add("eth0", true).unwrap();
        assert_eq!(table.add("wlan0", true), Err(NetifError::TableFull));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn long_names_are_rejected() {
        let mut table: NetifTable<1> = NetifTable::new();
        assert_eq!(
            table.add("an-interface-name-that-is-far-too-long", false),
            Err(NetifError::NameTooLong)
        );
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_handles_report_disconnected() {
        let mut other: NetifTable<4> = NetifTable::new();
        other.add("a", true).unwrap();
        let foreign = other.add("b", true).unwrap();

        let mut table: NetifTable<4> = NetifTable::new();
        table.add("eth0", true).unwrap();
        assert!(!table.is_connected(foreign));
        assert_eq!(
            table.set_connected(foreign, false),
            Err(NetifError::UnknownInterface(foreign))
        );
        assert_eq!(table.label(foreign).as_str(), "netif1");
    }
}
