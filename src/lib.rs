// Author: Lukas Bower
// Purpose: Crate root for the cooperative link-state monitoring service.
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Link-state monitoring for cooperative, single-threaded network stacks.
//!
//! The crate is organised around a poll-driven pump:
//!
//! - [`poll`] provides the fixed-capacity registry that hands each registered
//!   context back once per tick.
//! - [`netif`] defines the carrier query the monitors consult, plus a bounded
//!   table of simulated interfaces.
//! - [`link`] holds the monitor pool: register, poll, release and query.
//! - [`stack`] owns all three and advances them one tick at a time.
//! - [`config`] and [`sim`] load runtime limits and scripted link flaps for
//!   host-mode runs.

pub mod config;
pub mod link;
pub mod netif;
pub mod poll;
pub mod sim;
pub mod stack;

pub use config::{ConfigError, LinkConfig, PollConfig, StackConfig};
pub use link::{
    LinkCallback, LinkDescriptor, LinkError, LinkParams, LinkService, LinkTelemetry,
    DEFAULT_LINK_CAPACITY,
};
pub use netif::{NetifError, NetifId, NetifQuery, NetifTable};
pub use poll::{PollMetrics, PollRegistry, PollScheduler, PollToken, DEFAULT_POLL_CAPACITY};
pub use stack::{NetStack, StackService, StackTelemetry};
