// Author: Lukas Bower
// Purpose: Command-line driver replaying link flap scenarios through the monitor stack.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use linkwatch::sim::{run_scenario, Scenario};

#[derive(Parser)]
#[command(about = "Replay scripted link flaps through the link monitor")]
struct Cli {
    /// Scenario file (TOML)
    #[arg(long, env = "LINKWATCH_SCENARIO")]
    scenario: PathBuf,
    /// Override the number of ticks declared by the scenario
    #[arg(long)]
    ticks: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut scenario = Scenario::load(&cli.scenario)
        .with_context(|| format!("loading {}", cli.scenario.display()))?;
    if let Some(ticks) = cli.ticks {
        scenario.ticks = ticks;
    }

    let report = run_scenario(&scenario)?;
    for rejected in &report.rejected {
        println!("rejected: {} ({})", rejected.interface, rejected.error);
    }
    for transition in &report.transitions {
        println!("{transition}");
    }
    println!(
        "ticks={} polls={} transitions={}",
        report.telemetry.ticks, report.telemetry.link.polls, report.telemetry.link.transitions
    );
    Ok(())
}
