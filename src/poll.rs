// Author: Lukas Bower
// Purpose: Fixed-capacity poll registry driving cooperative per-tick services.

//! Cooperative poll registry.
//!
//! Services register an opaque context and receive it back once per scheduler
//! tick until they unregister. The registry never allocates: entries live in a
//! heapless vector sized at compile time, optionally capped lower at runtime.
//! Dispatch happens in registration order while the registry is mutably
//! borrowed, so no registration change can interleave with a tick.

use core::num::NonZeroU32;

use heapless::Vec as HeaplessVec;
use log::{debug, warn};

/// Default number of poll entries provisioned by [`PollScheduler`] users.
pub const DEFAULT_POLL_CAPACITY: usize = 8;

/// Opaque handle identifying one registration inside a poll registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollToken(NonZeroU32);

impl PollToken {
    /// Raw token value, for diagnostics only.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// Registration surface a service uses to hook into the scheduler tick.
pub trait PollRegistry<C> {
    /// Register `context` for dispatch on every tick.
    ///
    /// Returns `None` when the registry has no free entry.
    fn register_poll(&mut self, context: C) -> Option<PollToken>;

    /// Remove a registration. Unknown or already removed tokens are ignored.
    fn unregister_poll(&mut self, token: PollToken);
}

/// Counters maintained by the scheduler across ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollMetrics {
    /// Number of completed ticks.
    pub ticks: u64,
    /// Total contexts dispatched across all ticks.
    pub dispatched: u64,
    /// Registrations refused because the registry was full.
    pub refused: u32,
}

#[derive(Debug, Clone, Copy)]
struct PollEntry<C> {
    token: PollToken,
    context: C,
}

/// Heapless poll registry dispatching contexts in registration order.
#[derive(Debug)]
pub struct PollScheduler<C, const N: usize> {
    entries: HeaplessVec<PollEntry<C>, N>,
    limit: usize,
    next_token: u32,
    metrics: PollMetrics,
}

impl<C: Copy, const N: usize> PollScheduler<C, N> {
    /// Create an empty registry using the full compile-time capacity.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(N)
    }

    /// Create an empty registry that accepts at most `limit` entries.
    ///
    /// `limit` is clamped to `N`.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            entries: HeaplessVec::new(),
            limit: if limit < N { limit } else { N },
            next_token: 0,
            metrics: PollMetrics {
                ticks: 0,
                dispatched: 0,
                refused: 0,
            },
        }
    }

    /// Maximum number of concurrent registrations.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.limit
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` while `token` refers to a live registration.
    #[must_use]
    pub fn is_registered(&self, token: PollToken) -> bool {
        self.entries.iter().any(|entry| entry.token == token)
    }

    /// Scheduler counters.
    #[must_use]
    pub const fn metrics(&self) -> PollMetrics {
        self.metrics
    }

    /// Run one cooperative tick, handing every registered context to
    /// `dispatch` in registration order. Returns the number of dispatches.
    pub fn tick<F>(&mut self, mut dispatch: F) -> usize
    where
        F: FnMut(C),
    {
        for entry in self.entries.iter() {
            dispatch(entry.context);
        }
        let count = self.entries.len();
        self.metrics.ticks = self.metrics.ticks.saturating_add(1);
        self.metrics.dispatched = self.metrics.dispatched.saturating_add(count as u64);
        count
    }

    fn allocate_token(&mut self) -> Option<PollToken> {
        let value = self.next_token.checked_add(1)?;
        self.next_token = value;
        NonZeroU32::new(value).map(PollToken)
    }
}

impl<C: Copy, const N: usize> Default for PollScheduler<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Copy, const N: usize> PollRegistry<C> for PollScheduler<C, N> {
    fn register_poll(&mut self, context: C) -> Option<PollToken> {
        if self.entries.len() >= self.limit {
            self.metrics.refused = self.metrics.refused.saturating_add(1);
            warn!("poll: registry full ({} entries)", self.limit);
            return None;
        }
        let token = self.allocate_token()?;
        if self.entries.push(PollEntry { token, context }).is_err() {
            self.metrics.refused = self.metrics.refused.saturating_add(1);
            return None;
        }
        debug!("poll: registered token {}", token.get());
        Some(token)
    }

    fn unregister_poll(&mut self, token: PollToken) {
        if let Some(position) = self.entries.iter().position(|entry| entry.token == token) {
            self.entries.remove(position);
            debug!("poll: unregistered token {}", token.get());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_in_registration_order() {
        let mut scheduler: PollScheduler<u8, 4> = PollScheduler::new();
        scheduler.register_poll(3).unwrap();
        scheduler.register_poll(1).unwrap();
        scheduler.register_poll(2).unwrap();

        let mut seen = Vec::new();
        assert_eq!(scheduler.tick(|ctx| seen.push(ctx)), 3);
        assert_eq!(seen, vec![3, 1, 2]);
        assert_eq!(scheduler.metrics().ticks, 1);
        assert_eq!(scheduler.metrics().dispatched, 3);
    }

    #[test]
    fn refuses_registration_past_limit() {
        let mut scheduler: PollScheduler<u8, 4> = PollScheduler::with_limit(2);
        assert_eq!(scheduler.capacity(), 2);
        assert!(scheduler.register_poll(0).is_some());
        assert!(scheduler.register_poll(1).is_some());
        assert!(scheduler.register_poll(2).is_none());
        assert_eq!(scheduler.metrics().refused, 1);
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn limit_is_clamped_to_capacity() {
        let scheduler: PollScheduler<u8, 2> = PollScheduler::with_limit(16);
        assert_eq!(scheduler.capacity(), 2);
    }

    #[test]
    fn unregister_stops_dispatch_and_keeps_order() {
        let mut scheduler: PollScheduler<u8, 4> = PollScheduler::new();
        let _a = scheduler.register_poll(10).unwrap();
        let b = scheduler.register_poll(20).unwrap();
        let _c = scheduler.register_poll(30).unwrap();

        scheduler.unregister_poll(b);
        assert!(!scheduler.is_registered(b));

        let mut seen = Vec::new();
        scheduler.tick(|ctx| seen.push(ctx));
        assert_eq!(seen, vec![10, 30]);
    }

    #[test]
    fn stale_token_does_not_remove_new_registration() {
        let mut scheduler: PollScheduler<u8, 1> = PollScheduler::new();
        let first = scheduler.register_poll(1).unwrap();
        scheduler.unregister_poll(first);
        let second = scheduler.register_poll(2).unwrap();
        assert_ne!(first, second);

        scheduler.unregister_poll(first);
        assert!(scheduler.is_registered(second));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn empty_tick_still_counts() {
        let mut scheduler: PollScheduler<u8, 1> = PollScheduler::default();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.tick(|_| unreachable!()), 0);
        assert_eq!(scheduler.metrics().ticks, 1);
    }
}
