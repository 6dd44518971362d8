//! # Meshsim Simulation
//!
//! The concurrent routing engine of the meshsim flooding simulator, plus
//! the front-end and scenarios built on top of it.
//!
//! ## Architecture
//!
//! - **Hub** (`hub.rs`): single dispatch loop that fans events out to
//!   observers in one global order, evicting observers that fall behind
//! - **Node** (`node.rs`): one actor task per mesh participant; decrypts
//!   messages addressed to it and relays the rest with TTL decremented
//! - **Fabric** (`fabric.rs`): node registry plus one fan-out worker per
//!   node applying per-edge loss and latency
//! - **Simulation** (`simulation.rs`): per-configuration context and the
//!   single-slot manager that replaces it on reconfiguration
//! - **Scenarios** (`scenarios.rs`): built-in demonstration runs
//! - **Server** (`server.rs`): axum HTTP/WebSocket front-end
//!
//! ## Example
//!
//! ```rust,ignore
//! use meshsim_simulation::*;
//!
//! let manager = SimulationManager::new(EngineConfig::default());
//! let mut observer = manager.subscribe().await?;
//!
//! let topology = Topology::load("topologies/line.json")?;
//! manager.configure(topology, RunConfig::new(0.1, 4)).await?;
//! manager.send("A", "C").await?;
//!
//! while let Some(event) = observer.recv().await {
//!     println!("{}", event.to_json()?);
//! }
//! ```

pub mod fabric;
pub mod hub;
pub mod node;
pub mod scenarios;
pub mod server;
pub mod simulation;

// Re-export main types
pub use fabric::NetworkFabric;
pub use hub::{EventHub, EventPublisher, Observer, ObserverId};
pub use node::{Inbox, NodeActor, NodeHandle, NodeState};
pub use scenarios::{Scenario, ScenarioTrace};
pub use simulation::{ConfigureSummary, PreparedSimulation, Simulation, SimulationManager, greeting};

// Re-export core types for convenience
pub use meshsim_core::{EngineConfig, Event, EventKind, MeshError, MeshResult, Message, NodeId, RunConfig, Topology};
