// Author: Lukas Bower
// Purpose: Link-state monitor pool polled by the cooperative scheduler.

//! Link-state monitoring service.
//!
//! A [`LinkService`] owns a fixed pool of monitor slots. Each active slot is
//! bound to one interface handle and registered with a [`PollRegistry`]; on
//! every tick the owner of the registry hands the slot's [`LinkDescriptor`]
//! back to [`LinkService::poll`], which compares the interface's carrier with
//! the last observed value and invokes the user callback once per change.
//!
//! A freshly registered monitor always starts from "disconnected", so an
//! interface that already has carrier is reported on the first tick.
//!
//! Descriptors pair the slot index with a generation counter bumped on every
//! claim. A descriptor kept after [`LinkService::release`] therefore never
//! matches the next occupant of the same slot: releasing it is a no-op and
//! [`LinkService::is_active`] reports `false`.
//!
//! Callbacks run synchronously inside the tick. They receive the interface
//! handle, the new link state and a shared reference to the parameter given
//! at registration, and have no path back into the service, so a callback
//! cannot register or release monitors while it is being delivered.

use core::fmt;

use log::{debug, warn};
use thiserror::Error;

use crate::netif::NetifQuery;
use crate::poll::{PollRegistry, PollToken};

/// Default number of monitor slots provisioned by the stack.
pub const DEFAULT_LINK_CAPACITY: usize = 4;

/// User callback invoked when a monitored interface changes link state.
pub type LinkCallback<N, P> = fn(netif: N, connected: bool, param: &P);

/// Errors returned by [`LinkService::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The interface handle or the callback was not supplied.
    #[error("link monitor requires an interface and a callback")]
    InvalidArgument,
    /// Every monitor slot is in use.
    #[error("no free link monitor slot")]
    ResourceExhausted,
    /// The poll registry refused the registration.
    #[error("poll scheduler has no free service entry")]
    SchedulerExhausted,
}

/// Registration parameters for a link monitor.
#[derive(Clone)]
pub struct LinkParams<N, P> {
    /// Interface to monitor.
    pub netif: Option<N>,
    /// Callback fired on each observed transition.
    pub callback: Option<LinkCallback<N, P>>,
    /// Opaque value handed to the callback unchanged.
    pub callback_param: P,
}

impl<N, P> LinkParams<N, P> {
    /// Fully populated parameters.
    pub fn new(netif: N, callback: LinkCallback<N, P>, callback_param: P) -> Self {
        Self {
            netif: Some(netif),
            callback: Some(callback),
            callback_param,
        }
    }
}

impl<N, P: Default> Default for LinkParams<N, P> {
    fn default() -> Self {
        Self {
            netif: None,
            callback: None,
            callback_param: P::default(),
        }
    }
}

impl<N: fmt::Debug, P> fmt::Debug for LinkParams<N, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkParams")
            .field("netif", &self.netif)
            .field("callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Opaque handle identifying one monitor registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkDescriptor {
    index: u16,
    generation: u32,
}

impl LinkDescriptor {
    /// Slot position backing this descriptor.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot at the time of registration.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for LinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}.{}", self.index, self.generation)
    }
}

/// Counters maintained by a [`LinkService`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkTelemetry {
    /// Polls serviced for active monitors.
    pub polls: u64,
    /// Transitions delivered to callbacks.
    pub transitions: u64,
    /// Registrations rejected for any reason.
    pub rejected: u32,
}

struct ActiveMonitor<N, P> {
    netif: N,
    connected: bool,
    callback: LinkCallback<N, P>,
    callback_param: P,
    poll_token: PollToken,
}

struct MonitorSlot<N, P> {
    generation: u32,
    active: Option<ActiveMonitor<N, P>>,
}

impl<N, P> MonitorSlot<N, P> {
    const fn free() -> Self {
        Self {
            generation: 0,
            active: None,
        }
    }
}

/// Fixed-capacity pool of link monitors.
pub struct LinkService<N, P, const CAP: usize> {
    slots: [MonitorSlot<N, P>; CAP],
    limit: usize,
    telemetry: LinkTelemetry,
}

impl<N, P, const CAP: usize> LinkService<N, P, CAP>
where
    N: Copy + fmt::Debug,
{
    /// Create a pool using the full compile-time capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(CAP)
    }

    /// Create a pool accepting at most `limit` concurrent monitors.
    ///
    /// `limit` is clamped to `CAP`.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            slots: core::array::from_fn(|_| MonitorSlot::free()),
            limit: limit.min(CAP),
            telemetry: LinkTelemetry::default(),
        }
    }

    /// Maximum number of concurrent monitors.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.limit
    }

    /// Number of active monitors.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.active.is_some()).count()
    }

    /// Service counters.
    #[must_use]
    pub const fn telemetry(&self) -> LinkTelemetry {
        self.telemetry
    }

    /// Start monitoring `params.netif`.
    ///
    /// On success exactly one poll entry is registered with `registry`, using
    /// the returned descriptor as its context. Failures leave the pool and the
    /// registry untouched.
    pub fn register<R, C>(
        &mut self,
        registry: &mut R,
        params: LinkParams<N, P>,
    ) -> Result<LinkDescriptor, LinkError>
    where
        R: PollRegistry<C> + ?Sized,
        C: From<LinkDescriptor>,
    {
        let LinkParams {
            netif,
            callback,
            callback_param,
        } = params;
        let (Some(netif), Some(callback)) = (netif, callback) else {
            return Err(self.reject(LinkError::InvalidArgument));
        };

        let Some(index) = self.free_slot() else {
            warn!("link: no free monitor slot for {netif:?} ({} in use)", self.limit);
            return Err(self.reject(LinkError::ResourceExhausted));
        };
        let Ok(index_tag) = u16::try_from(index) else {
            return Err(self.reject(LinkError::ResourceExhausted));
        };

        let descriptor = LinkDescriptor {
            index: index_tag,
            generation: self.slots[index].generation.wrapping_add(1),
        };
        let Some(poll_token) = registry.register_poll(C::from(descriptor)) else {
            warn!("link: scheduler refused poll entry for {netif:?}");
            return Err(self.reject(LinkError::SchedulerExhausted));
        };

        let slot = &mut self.slots[index];
        slot.generation = descriptor.generation;
        slot.active = Some(ActiveMonitor {
            netif,
            connected: false,
            callback,
            callback_param,
            poll_token,
        });
        debug!("link: {descriptor} monitoring {netif:?}");
        Ok(descriptor)
    }

    /// Observe the link of the monitor behind `descriptor`.
    ///
    /// Called by the scheduler owner once per tick. Returns `true` when a
    /// transition was delivered to the callback. Stale descriptors are
    /// ignored.
    pub fn poll<Q>(&mut self, descriptor: LinkDescriptor, query: &Q) -> bool
    where
        Q: NetifQuery<Netif = N> + ?Sized,
    {
        let Some(monitor) = Self::lookup_mut(&mut self.slots, descriptor) else {
            return false;
        };
        self.telemetry.polls = self.telemetry.polls.saturating_add(1);

        let connected = query.is_connected(monitor.netif);
        if connected == monitor.connected {
            return false;
        }
        monitor.connected = connected;
        self.telemetry.transitions = self.telemetry.transitions.saturating_add(1);
        debug!(
            "link: {descriptor} {:?} {}",
            monitor.netif,
            if connected { "connected" } else { "disconnected" }
        );
        (monitor.callback)(monitor.netif, connected, &monitor.callback_param);
        true
    }

    /// Stop monitoring and free the slot for reuse.
    ///
    /// Released, stale or foreign descriptors are ignored. Once this returns
    /// the registry no longer holds an entry for `descriptor`.
    pub fn release<R, C>(&mut self, registry: &mut R, descriptor: LinkDescriptor)
    where
        R: PollRegistry<C> + ?Sized,
    {
        let Some(slot) = self.slots.get_mut(descriptor.index()) else {
            return;
        };
        if slot.generation != descriptor.generation {
            return;
        }
        if let Some(monitor) = slot.active.take() {
            registry.unregister_poll(monitor.poll_token);
            debug!("link: {descriptor} released");
        }
    }

    /// Returns `true` while `descriptor` refers to an active monitor.
    #[must_use]
    pub fn is_active(&self, descriptor: LinkDescriptor) -> bool {
        self.lookup(descriptor).is_some()
    }

    /// Last link state observed for `descriptor`.
    #[must_use]
    pub fn is_connected(&self, descriptor: LinkDescriptor) -> Option<bool> {
        self.lookup(descriptor).map(|monitor| monitor.connected)
    }

    /// Interface bound to `descriptor`.
    #[must_use]
    pub fn netif(&self, descriptor: LinkDescriptor) -> Option<N> {
        self.lookup(descriptor).map(|monitor| monitor.netif)
    }

    /// Poll token backing `descriptor`, for registry diagnostics.
    #[must_use]
    pub fn poll_token(&self, descriptor: LinkDescriptor) -> Option<PollToken> {
        self.lookup(descriptor).map(|monitor| monitor.poll_token)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots[..self.limit]
            .iter()
            .position(|slot| slot.active.is_none())
    }

    fn reject(&mut self, error: LinkError) -> LinkError {
        self.telemetry.rejected = self.telemetry.rejected.saturating_add(1);
        error
    }

    fn lookup(&self, descriptor: LinkDescriptor) -> Option<&ActiveMonitor<N, P>> {
        let slot = self.slots.get(descriptor.index())?;
        if slot.generation != descriptor.generation {
            return None;
        }
        slot.active.as_ref()
    }

    fn lookup_mut(
        slots: &mut [MonitorSlot<N, P>; CAP],
        descriptor: LinkDescriptor,
    ) -> Option<&mut ActiveMonitor<N, P>> {
        let slot = slots.get_mut(descriptor.index())?;
        if slot.generation != descriptor.generation {
            return None;
        }
        slot.active.as_mut()
    }
}

impl<N, P, const CAP: usize> Default for LinkService<N, P, CAP>
where
    N: Copy + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, P, const CAP: usize> fmt::Debug for LinkService<N, P, CAP>
where
    N: Copy + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkService")
            .field("capacity", &self.limit)
            .field("active", &self.active_count())
            .field("telemetry", &self.telemetry)
            .finish()
    }
}
