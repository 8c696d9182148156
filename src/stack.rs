// Author: Lukas Bower
// Purpose: Owning pump that ties the poll scheduler, link monitors and interface query together.

//! Cooperative network stack pump.
//!
//! [`NetStack`] is the single owner of the poll registry, the link monitor
//! pool and the interface query. Each [`NetStack::tick`] walks the registry
//! once and routes every registered context to the service that owns it.
//! Application code registers and releases monitors between ticks through the
//! `link_*` methods.

use core::fmt;

use log::{info, trace};

use crate::config::StackConfig;
use crate::link::{LinkDescriptor, LinkError, LinkParams, LinkService, LinkTelemetry};
use crate::netif::NetifQuery;
use crate::poll::{PollMetrics, PollScheduler};

/// Services that may own entries in the stack's poll registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackService {
    /// A link-state monitor slot.
    Link(LinkDescriptor),
}

impl From<LinkDescriptor> for StackService {
    fn from(descriptor: LinkDescriptor) -> Self {
        Self::Link(descriptor)
    }
}

/// Snapshot of pump counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StackTelemetry {
    /// Completed ticks.
    pub ticks: u64,
    /// Poll entries dispatched across all ticks.
    pub dispatched: u64,
    /// Registrations refused by the poll registry.
    pub poll_refused: u32,
    /// Link monitor counters.
    pub link: LinkTelemetry,
}

/// Cooperative pump owning the poll registry, link monitors and interfaces.
pub struct NetStack<Q, P, const LINKS: usize, const POLLS: usize>
where
    Q: NetifQuery,
{
    netifs: Q,
    scheduler: PollScheduler<StackService, POLLS>,
    link: LinkService<Q::Netif, P, LINKS>,
}

impl<Q, P, const LINKS: usize, const POLLS: usize> NetStack<Q, P, LINKS, POLLS>
where
    Q: NetifQuery,
{
    /// Build a pump using the full compile-time capacities.
    pub fn new(netifs: Q) -> Self {
        Self {
            netifs,
            scheduler: PollScheduler::new(),
            link: LinkService::new(),
        }
    }

    /// Build a pump whose pools are capped by `config`.
    pub fn from_config(netifs: Q, config: &StackConfig) -> Self {
        let stack = Self {
            netifs,
            scheduler: PollScheduler::with_limit(config.poll.max_services),
            link: LinkService::with_limit(config.link.max_monitors),
        };
        info!(
            "stack: {} link monitors, {} poll entries",
            stack.link.capacity(),
            stack.scheduler.capacity()
        );
        stack
    }

    /// Interface query consulted by the link monitors.
    pub fn netifs(&self) -> &Q {
        &self.netifs
    }

    /// Mutable access to the interfaces, used by the embedding environment
    /// to reflect carrier changes.
    pub fn netifs_mut(&mut self) -> &mut Q {
        &mut self.netifs
    }

    /// Register a link monitor and hook it into the tick.
    pub fn link_register(
        &mut self,
        params: LinkParams<Q::Netif, P>,
    ) -> Result<LinkDescriptor, LinkError> {
        self.link.register(&mut self.scheduler, params)
    }

    /// Release a link monitor. Unknown descriptors are ignored.
    pub fn link_release(&mut self, descriptor: LinkDescriptor) {
        self.link.release(&mut self.scheduler, descriptor);
    }

    /// Returns `true` while `descriptor` is an active monitor.
    pub fn link_is_active(&self, descriptor: LinkDescriptor) -> bool {
        self.link.is_active(descriptor)
    }

    /// Last link state observed by `descriptor`.
    pub fn link_is_connected(&self, descriptor: LinkDescriptor) -> Option<bool> {
        self.link.is_connected(descriptor)
    }

    /// Link monitor pool, for inspection.
    pub fn link(&self) -> &LinkService<Q::Netif, P, LINKS> {
        &self.link
    }

    /// Poll registry, for inspection.
    pub fn scheduler(&self) -> &PollScheduler<StackService, POLLS> {
        &self.scheduler
    }

    /// Run one cooperative tick. Returns the number of link transitions
    /// delivered to callbacks.
    pub fn tick(&mut self) -> usize {
        let mut transitions = 0usize;
        let link = &mut self.link;
        let netifs = &self.netifs;
        let dispatched = self.scheduler.tick(|service| match service {
            StackService::Link(descriptor) => {
                if link.poll(descriptor, netifs) {
                    transitions += 1;
                }
            }
        });
        trace!("stack: tick dispatched={dispatched} transitions={transitions}");
        transitions
    }

    /// Run `ticks` consecutive ticks and return the transitions delivered.
    pub fn run_ticks(&mut self, ticks: usize) -> usize {
        (0..ticks).map(|_| self.tick()).sum()
    }

    /// Counters for the pump and its services.
    pub fn telemetry(&self) -> StackTelemetry {
        let PollMetrics {
            ticks,
            dispatched,
            refused,
        } = self.scheduler.metrics();
        StackTelemetry {
            ticks,
            dispatched,
            poll_refused: refused,
            link: self.link.telemetry(),
        }
    }
}

impl<Q, P, const LINKS: usize, const POLLS: usize> fmt::Debug for NetStack<Q, P, LINKS, POLLS>
where
    Q: NetifQuery,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetStack")
            .field("link", &self.link)
            .field("poll_entries", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::netif::{NetifId, NetifTable};

    type Log = Rc<RefCell<Vec<(NetifId, bool)>>>;

    fn record(netif: NetifId, connected: bool, log: &Log) {
        log.borrow_mut().push((netif, connected));
    }

    #[test]
    fn tick_routes_contexts_to_link_monitors() {
        let mut table: NetifTable<2> = NetifTable::new();
        let eth0 = table.add("eth0", true).unwrap();
        let log = Log::default();
        let mut stack: NetStack<_, Log, 2, 4> = NetStack::new(table);

        let descriptor = stack
            .link_register(LinkParams::new(eth0, record, log.clone()))
            .unwrap();
        assert_eq!(stack.scheduler().len(), 1);
        assert_eq!(stack.tick(), 1);
        assert_eq!(stack.tick(), 0);
        assert_eq!(stack.link_is_connected(descriptor), Some(true));
        assert_eq!(*log.borrow(), vec![(eth0, true)]);

        let telemetry = stack.telemetry();
        assert_eq!(telemetry.ticks, 2);
        assert_eq!(telemetry.dispatched, 2);
        assert_eq!(telemetry.link.transitions, 1);
    }

    #[test]
    fn config_limits_are_applied() {
        let mut config = StackConfig::default();
        config.link.max_monitors = 1;
        config.poll.max_services = 1;
        let table: NetifTable<2> = NetifTable::new();
        let stack: NetStack<_, Log, 4, 4> = NetStack::from_config(table, &config);
        assert_eq!(stack.link().capacity(), 1);
        assert_eq!(stack.scheduler().capacity(), 1);
    }

    #[test]
    fn poll_registry_exhaustion_surfaces_as_scheduler_error() {
        let mut config = StackConfig::default();
        config.poll.max_services = 1;
        let mut table: NetifTable<2> = NetifTable::new();
        let eth0 = table.add("eth0", false).unwrap();
        let log = Log::default();
        let mut stack: NetStack<_, Log, 4, 4> = NetStack::from_config(table, &config);

        stack
            .link_register(LinkParams::new(eth0, record, log.clone()))
            .unwrap();
        assert_eq!(
            stack.link_register(LinkParams::new(eth0, record, log.clone())),
            Err(LinkError::SchedulerExhausted)
        );
        assert_eq!(stack.link().active_count(), 1);
        assert_eq!(stack.telemetry().poll_refused, 1);
    }
}
