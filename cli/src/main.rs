use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use economy_simulator_core_rs::orchestrator::{
    BankConfig, FirmConfig, HouseholdConfig, Orchestrator, SimulationConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "economy-sim",
    about = "Step an agent-based economy of households, firms and banks through its update pipeline"
)]
struct Cli {
    /// Path to a JSON simulation config (built-in demo economy when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Number of steps to run (overrides the config)
    #[arg(short, long)]
    steps: Option<usize>,

    /// RNG seed (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Print step reports as JSON lines
    #[arg(long)]
    json: bool,
}

fn demo_config() -> SimulationConfig {
    SimulationConfig {
        rng_seed: 42,
        num_steps: 10,
        households: vec![
            HouseholdConfig::new("HH_1", 10.0, 0.2),
            HouseholdConfig::new("HH_2", 8.0, 0.4),
            HouseholdConfig::new("HH_3", 12.0, 0.1),
        ],
        firms: vec![FirmConfig::new("FIRM_1"), FirmConfig::new("FIRM_2")],
        banks: vec![
            BankConfig::new("BANK_1", 0.001, 0.004),
            BankConfig::new("BANK_2", 0.002, 0.005),
        ],
        updater: Default::default(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path))?;
            serde_json::from_str::<SimulationConfig>(&config_str)
                .with_context(|| format!("Failed to parse simulation config: {}", path))?
        }
        None => demo_config(),
    };
    if let Some(steps) = cli.steps {
        config.num_steps = steps;
    }
    if let Some(seed) = cli.seed {
        config.rng_seed = seed;
    }

    let mut orchestrator =
        Orchestrator::new(config).context("Failed to initialise simulation")?;
    tracing::info!(config_hash = orchestrator.config_hash(), "starting run");

    while orchestrator.current_step() < orchestrator.num_steps() {
        let step = orchestrator.current_step();
        let report = orchestrator
            .tick()
            .with_context(|| format!("Step {} failed", step))?;

        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "step {:>4}  wage {:>10.4}  goods {:>8.2}  labour trades {:>3}  goods trades {:>3}  netted {:>4}  purged {:>3}",
                report.time,
                report.price_of_labour,
                report.price_of_goods,
                report.labour_trades,
                report.goods_trades,
                report.entries_netted,
                report.entries_purged,
            );
        }
    }

    let env = orchestrator.environment();
    println!(
        "entries {}  total net worth {:.6}  digest {}",
        env.num_transactions(),
        env.total_net_worth()?,
        orchestrator.ledger_digest()?
    );

    Ok(())
}
