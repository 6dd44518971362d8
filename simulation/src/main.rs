//! meshsim - encrypted mesh flooding simulator
//!
//! Serves the browser front-end, runs one-off floods from the command line,
//! generates topology files and replays the built-in scenarios.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};

use meshsim_core::{EngineConfig, RunConfig, Topology, TopologyBuilder, TopologyFormat};
use meshsim_logging::{LogConfig, MeshsimSubscriberBuilder};
use meshsim_simulation::scenarios::{self, Scenario};
use meshsim_simulation::server::{self, ServerConfig};
use meshsim_simulation::SimulationManager;

#[derive(Parser)]
#[command(
    name = "meshsim",
    about = "Encrypted message flooding across a simulated mesh",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP/WebSocket front-end
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Directory holding topology files
        #[arg(long, default_value = "topologies")]
        topology_dir: PathBuf,

        /// Directory of static assets to serve at /
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Send one message through a topology and print its events
    Run {
        /// Topology file (.json, .toml, .yaml or .yml)
        #[arg(short, long)]
        topology: PathBuf,

        /// Per-edge loss probability
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,

        /// Initial hop budget
        #[arg(long, default_value_t = 5)]
        ttl: i32,

        /// Origin node
        #[arg(long)]
        from: String,

        /// Final recipient
        #[arg(long)]
        to: String,

        /// Stop after this many quiet milliseconds
        #[arg(long, default_value_t = 500)]
        settle_ms: u64,

        /// Seed for loss and latency draws
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a generated topology
    Generate {
        /// Shape of the topology
        #[arg(short, long, value_enum, default_value = "ring")]
        kind: TopologyKind,

        /// Number of nodes
        #[arg(short, long, default_value_t = 6)]
        nodes: usize,

        /// Edge probability for random topologies
        #[arg(long, default_value_t = 0.4)]
        edge_probability: f64,

        /// Seed for random topologies
        #[arg(long)]
        seed: Option<u64>,

        /// Attach nodes a random topology leaves isolated to one random peer
        #[arg(long)]
        connect_isolated: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Run built-in scenarios (all of them if none is named)
    Scenario {
        #[arg(value_enum)]
        scenario: Option<Scenario>,

        /// Stop each scenario after this many quiet milliseconds
        #[arg(long, default_value_t = 300)]
        settle_ms: u64,

        /// Seed for loss and latency draws
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyKind {
    Ring,
    Line,
    Star,
    Full,
    Random,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Toml,
    Yaml,
}

impl From<OutputFormat> for TopologyFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => TopologyFormat::Json,
            OutputFormat::Toml => TopologyFormat::Toml,
            OutputFormat::Yaml => TopologyFormat::Yaml,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig::default()
    };
    let _guard = MeshsimSubscriberBuilder::new()
        .with_config(log_config)
        .with_json_console(cli.json_logs)
        .init();

    match cli.command {
        Commands::Serve {
            addr,
            topology_dir,
            static_dir,
        } => {
            let manager = Arc::new(SimulationManager::new(EngineConfig::default()));
            let config = ServerConfig {
                addr,
                topology_dir,
                static_dir,
            };
            server::serve(config, manager).await?;
        }
        Commands::Run {
            topology,
            drop_rate,
            ttl,
            from,
            to,
            settle_ms,
            seed,
        } => {
            let topology = Topology::load(&topology)
                .with_context(|| format!("loading {}", topology.display()))?;
            let mut engine = EngineConfig::default();
            if let Some(seed) = seed {
                engine = engine.with_seed(seed);
            }

            let manager = SimulationManager::new(engine);
            let result = run_once(&manager, topology, RunConfig::new(drop_rate, ttl), &from, &to, settle_ms).await;
            manager.shutdown().await;
            result?;
        }
        Commands::Generate {
            kind,
            nodes,
            edge_probability,
            seed,
            connect_isolated,
            format,
        } => {
            if nodes == 0 {
                bail!("--nodes must be at least 1");
            }
            if !(0.0..=1.0).contains(&edge_probability) {
                bail!("--edge-probability must be between 0.0 and 1.0");
            }

            let mut builder = TopologyBuilder::new(nodes).connect_isolated(connect_isolated);
            if let Some(seed) = seed {
                builder = builder.with_seed(seed);
            }
            let topology = match kind {
                TopologyKind::Ring => builder.ring(),
                TopologyKind::Line => builder.line(),
                TopologyKind::Star => builder.star(),
                TopologyKind::Full => builder.full_mesh(),
                TopologyKind::Random => builder.random(edge_probability),
            };
            eprintln!("{}", topology.visualize());
            println!("{}", topology.to_string_as(format.into())?);
        }
        Commands::Scenario {
            scenario,
            settle_ms,
            seed,
        } => {
            let manager = SimulationManager::new(scenarios::scenario_engine(seed));
            let selected = match scenario {
                Some(scenario) => vec![scenario],
                None => Scenario::ALL.to_vec(),
            };

            for scenario in selected {
                match scenario.run(&manager, Duration::from_millis(settle_ms)).await {
                    Ok(trace) => println!("{}", trace.render()),
                    Err(e) => {
                        manager.shutdown().await;
                        return Err(e.into());
                    }
                }
            }
            manager.shutdown().await;
        }
    }

    Ok(())
}

/// Configure, send one message and print its events as JSON lines
async fn run_once(
    manager: &SimulationManager,
    topology: Topology,
    run_config: RunConfig,
    from: &str,
    to: &str,
    settle_ms: u64,
) -> anyhow::Result<()> {
    manager.configure(topology, run_config).await?;
    let mut observer = manager.subscribe().await?;
    manager.send(from, to).await?;

    let events = scenarios::collect_until_quiet(&mut observer, Duration::from_millis(settle_ms)).await;
    for event in events {
        println!("{}", event.to_json()?);
    }
    Ok(())
}
