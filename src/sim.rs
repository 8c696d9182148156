// Author: Lukas Bower
// Purpose: Replay scripted carrier changes through the stack for host-side verification.

//! Host-mode link flap simulation.
//!
//! A [`Scenario`] names a set of interfaces, their initial carrier, and the
//! ticks at which the carrier flips. [`run_scenario`] builds a [`NetStack`]
//! over a [`NetifTable`], registers a monitor per interface and records every
//! transition the monitors deliver.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::config::{ConfigError, StackConfig};
use crate::link::{LinkError, LinkParams};
use crate::netif::{NetifError, NetifId, NetifTable};
use crate::stack::{NetStack, StackTelemetry};

/// Interfaces available to a simulated stack.
pub const SIM_NETIF_CAPACITY: usize = 8;
/// Monitor slots provisioned for a simulated stack.
pub const SIM_LINK_CAPACITY: usize = 8;
/// Poll entries provisioned for a simulated stack.
pub const SIM_POLL_CAPACITY: usize = 16;

type TransitionLog = Rc<RefCell<Vec<(NetifId, bool)>>>;
type SimStack = NetStack<
    NetifTable<SIM_NETIF_CAPACITY>,
    TransitionLog,
    SIM_LINK_CAPACITY,
    SIM_POLL_CAPACITY,
>;

/// Errors produced while loading or running a scenario.
#[derive(Debug, Error)]
pub enum SimError {
    /// Scenario file could not be read.
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),
    /// Scenario document is not valid TOML for this schema.
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),
    /// Embedded stack configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Interface table rejected an interface.
    #[error(transparent)]
    Netif(#[from] NetifError),
    /// Two interfaces share a name.
    #[error("interface {0:?} declared twice")]
    DuplicateInterface(String),
}

/// Carrier change applied before the given tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkStep {
    /// Zero-based tick index.
    pub tick: usize,
    /// Carrier state from this tick on.
    pub connected: bool,
}

fn default_monitor() -> bool {
    true
}

/// Scripted interface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceScript {
    /// Interface name.
    pub name: String,
    /// Carrier state before the first tick.
    #[serde(default)]
    pub connected: bool,
    /// Whether a link monitor is registered for this interface.
    #[serde(default = "default_monitor")]
    pub monitor: bool,
    /// Carrier changes.
    #[serde(default)]
    pub steps: Vec<LinkStep>,
}

/// Complete simulation input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Number of ticks to run.
    pub ticks: usize,
    /// Stack limits.
    #[serde(default)]
    pub stack: StackConfig,
    /// Interfaces, in registration order.
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceScript>,
}

impl Scenario {
    /// Parse a scenario document.
    pub fn from_toml_str(text: &str) -> Result<Self, SimError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Transition delivered by a monitor during a simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Tick in which the callback fired.
    pub tick: usize,
    /// Interface name.
    pub interface: String,
    /// New carrier state.
    pub connected: bool,
}

impl fmt::Display for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {}: {} link {}",
            self.tick,
            self.interface,
            if self.connected { "up" } else { "down" }
        )
    }
}

/// Monitor registration that the stack refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMonitor {
    /// Interface name.
    pub interface: String,
    /// Reason reported by the link service.
    pub error: LinkError,
}

/// Outcome of [`run_scenario`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimReport {
    /// Transitions in delivery order.
    pub transitions: Vec<TransitionRecord>,
    /// Monitors that could not be registered.
    pub rejected: Vec<RejectedMonitor>,
    /// Stack counters after the final tick.
    pub telemetry: StackTelemetry,
}

fn record_transition(netif: NetifId, connected: bool, log: &TransitionLog) {
    log.borrow_mut().push((netif, connected));
}

/// Run `scenario` to completion.
pub fn run_scenario(scenario: &Scenario) -> Result<SimReport, SimError> {
    scenario.stack.validate()?;

    let mut table = NetifTable::<SIM_NETIF_CAPACITY>::new();
    let mut seen = BTreeSet::new();
    let mut netifs = Vec::with_capacity(scenario.interfaces.len());
    for script in &scenario.interfaces {
        if !seen.insert(script.name.as_str()) {
            return Err(SimError::DuplicateInterface(script.name.clone()));
        }
        netifs.push(table.add(&script.name, script.connected)?);
    }

    let mut stack = SimStack::from_config(table, &scenario.stack);
    let log = TransitionLog::default();
    let mut report = SimReport::default();

    for (script, netif) in scenario.interfaces.iter().zip(&netifs) {
        if !script.monitor {
            continue;
        }
        let params = LinkParams::new(*netif, record_transition, Rc::clone(&log));
        if let Err(error) = stack.link_register(params) {
            warn!("sim: monitor for {} rejected: {error}", script.name);
            report.rejected.push(RejectedMonitor {
                interface: script.name.clone(),
                error,
            });
        }
    }

    for tick in 0..scenario.ticks {
        for (script, netif) in scenario.interfaces.iter().zip(&netifs) {
            for step in script.steps.iter().filter(|step| step.tick == tick) {
                stack.netifs_mut().set_connected(*netif, step.connected)?;
            }
        }
        stack.tick();
        for (netif, connected) in log.borrow_mut().drain(..) {
            report.transitions.push(TransitionRecord {
                tick,
                interface: stack.netifs().label(netif).as_str().to_owned(),
                connected,
            });
        }
    }

    report.telemetry = stack.telemetry();
    info!(
        "sim: {} ticks, {} transitions, {} rejected monitors",
        scenario.ticks,
        report.transitions.len(),
        report.rejected.len()
    );
    Ok(report)
}
