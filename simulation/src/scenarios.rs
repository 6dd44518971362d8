//! Built-in scenarios
//!
//! Small fixed topologies that exercise each outcome of the flooding
//! protocol: direct delivery, relaying, hop budget exhaustion and total
//! network loss.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use tracing::info;

use meshsim_core::{EngineConfig, Event, EventKind, MeshResult, NodeSpec, RunConfig, Topology};

use crate::hub::Observer;
use crate::simulation::SimulationManager;

/// Quiet period after which a scenario is considered settled
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

/// The built-in scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// A and B are neighbors; A sends to B
    Direct,
    /// A -> B -> C line; A sends to C with enough hops
    Relay,
    /// A -> B -> C line with a single hop; the copy dies at C
    TtlExhaustion,
    /// Every edge loses every copy
    Lossy,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Direct,
        Scenario::Relay,
        Scenario::TtlExhaustion,
        Scenario::Lossy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Relay => "relay",
            Self::TtlExhaustion => "ttl-exhaustion",
            Self::Lossy => "lossy",
        }
    }

    pub fn topology(&self) -> Topology {
        match self {
            Self::Direct => Topology::new(vec![
                NodeSpec::new("A", ["B"]),
                NodeSpec::new("B", ["A"]),
            ]),
            Self::Relay | Self::TtlExhaustion => Topology::new(vec![
                NodeSpec::new("A", ["B"]),
                NodeSpec::new("B", ["C"]),
                NodeSpec::new("C", Vec::<&str>::new()),
            ]),
            Self::Lossy => Topology::new(vec![
                NodeSpec::new("A", ["B", "C"]),
                NodeSpec::new("B", ["A", "C"]),
                NodeSpec::new("C", ["A", "B"]),
            ]),
        }
    }

    pub fn run_config(&self) -> RunConfig {
        match self {
            Self::Direct | Self::Relay => RunConfig::new(0.0, 2),
            Self::TtlExhaustion => RunConfig::new(0.0, 1),
            Self::Lossy => RunConfig::new(1.0, 3),
        }
    }

    /// Origin and final recipient of the scenario's message
    pub fn route(&self) -> (&'static str, &'static str) {
        match self {
            Self::Direct => ("A", "B"),
            Self::Relay | Self::TtlExhaustion | Self::Lossy => ("A", "C"),
        }
    }

    /// Configure, send the scenario's message and collect its events
    pub async fn run(&self, manager: &SimulationManager, settle: Duration) -> MeshResult<ScenarioTrace> {
        info!(scenario = self.name(), "Running scenario");

        let summary = manager.configure(self.topology(), self.run_config()).await?;
        let mut observer = manager.subscribe().await?;
        let (from, to) = self.route();
        manager.send(from, to).await?;

        let events = collect_until_quiet(&mut observer, settle).await;
        manager.unsubscribe(observer.id()).await;

        Ok(ScenarioTrace {
            scenario: *self,
            generation: summary.generation,
            events: events
                .into_iter()
                .filter(|e| e.generation == summary.generation)
                .collect(),
        })
    }
}

/// Events observed while running one scenario
#[derive(Debug, Clone)]
pub struct ScenarioTrace {
    pub scenario: Scenario,
    pub generation: u64,
    pub events: Vec<Arc<Event>>,
}

impl ScenarioTrace {
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Events that happened at `node`
    pub fn at<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Arc<Event>> + 'a {
        self.events
            .iter()
            .filter(move |e| e.is_to(node) || (e.to.is_none() && e.from.as_str() == node))
    }

    /// One line per event: `kind from -> to (ttl)`
    pub fn render(&self) -> String {
        let mut out = format!("Scenario {} (generation {})\n", self.scenario.name(), self.generation);
        for event in &self.events {
            let to = event.to.as_ref().map(|t| t.as_str()).unwrap_or("*");
            out.push_str(&format!("  {:<16} {} -> {} (ttl {})", event.kind.as_str(), event.from, to, event.ttl));
            if let Some(text) = event.payload_str("plaintext").or_else(|| event.payload_str("error")) {
                out.push_str(&format!(" {text:?}"));
            }
            out.push('\n');
        }
        out
    }
}

/// Drain an observer until no event arrives for `quiet`
pub async fn collect_until_quiet(observer: &mut Observer, quiet: Duration) -> Vec<Arc<Event>> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(quiet, observer.recv()).await {
        events.push(event);
    }
    events
}

/// Engine configuration used by the scenario runner
pub fn scenario_engine(seed: Option<u64>) -> EngineConfig {
    let config = EngineConfig::default().with_max_latency(Duration::from_millis(20));
    match seed {
        Some(seed) => config.with_seed(seed),
        None => config,
    }
}
