//! Link-state routing simulator
//!
//! Runs the reference scenarios, prints generated topologies, and computes
//! routing tables for topology files.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use linkstate_core::{Algorithm, SimulationIdentity};
use linkstate_logging::{LinkStateSubscriberBuilder, LogConfig};
use linkstate_node::ProtocolConfig;

use linkstate_simulation::{LockstepSimulation, ScenarioName, Topology, scenarios, topology};

/// Message limit when running a topology to convergence
const MAX_STEPS: usize = 1_000_000;

#[derive(Parser)]
#[command(
    name = "linkstate-sim",
    about = "Distributed link-state routing simulator",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Protocol configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario on the reference network and print every table
    Scenario {
        name: ScenarioName,

        /// Routing algorithm
        #[arg(short, long, default_value = "link-state")]
        algorithm: Algorithm,
    },

    /// Generate and print a topology
    Topology {
        kind: TopologyKind,

        /// Number of nodes (max 26)
        #[arg(short, long, default_value = "6")]
        nodes: usize,
    },

    /// Converge a topology and print one node's routing table
    Table {
        /// Node to print, e.g. H
        node: SimulationIdentity,

        /// Topology file (TOML); the reference network if omitted
        #[arg(short, long)]
        topology: Option<PathBuf>,

        /// Routing algorithm
        #[arg(short, long, default_value = "link-state")]
        algorithm: Algorithm,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyKind {
    Linear,
    Ring,
    Star,
    Mesh,
    Sample,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::development();
    log_config.default_level = if cli.verbose { "debug" } else { "warn" }.to_string();
    let mut logging = LinkStateSubscriberBuilder::new().with_config(log_config);
    if let Some(dir) = &cli.log_dir {
        if let Some(file) = LogConfig::simulation(dir).file {
            logging = logging.with_file_output(file);
        }
    }
    let _log_guard = logging.try_init().context("failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => ProtocolConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ProtocolConfig::default(),
    };

    match cli.command {
        Commands::Scenario { name, algorithm } => {
            let report = scenarios::run(name, config.with_algorithm(algorithm))?;
            println!("{}", report);
        }
        Commands::Topology { kind, nodes } => {
            let topology = match kind {
                TopologyKind::Linear => topology::linear(nodes)?,
                TopologyKind::Ring => topology::ring(nodes)?,
                TopologyKind::Star => topology::star(nodes)?,
                TopologyKind::Mesh => topology::mesh(nodes)?,
                TopologyKind::Sample => topology::sample()?,
            };
            println!("{}", topology.visualize());
        }
        Commands::Table {
            node,
            topology: path,
            algorithm,
        } => {
            let topology = match path {
                Some(path) => Topology::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => topology::sample()?,
            };
            anyhow::ensure!(topology.contains(&node), "node {} is not in the topology", node);

            let mut sim = LockstepSimulation::new(topology, config.with_algorithm(algorithm))?;
            sim.initialize();
            let steps = sim.run_until_quiet(MAX_STEPS)?;
            let table = sim
                .routing_table(&node)
                .with_context(|| format!("no table for {}", node))?;
            println!("{}", table);
            println!("({} messages to converge)", steps);
        }
    }

    Ok(())
}
