//! Simulation context and the single-slot manager
//!
//! A [`Simulation`] owns everything built for one configuration: the public
//! key directory, the node actors (through the fabric) and the fabric's
//! workers. The [`SimulationManager`] keeps at most one of them alive and
//! owns the long-lived [`EventHub`] that observers subscribe to.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use meshsim_core::{
    EngineConfig, MeshError, MeshResult, Message, NodeId, RunConfig, Topology,
};
use meshsim_crypto::{KeyDirectory, KeyPair, SecretKey};

use crate::fabric::NetworkFabric;
use crate::hub::{EventHub, EventPublisher, Observer, ObserverId};
use crate::node::{Inbox, NodeActor};

/// Plaintext carried by messages injected through `send`
pub fn greeting(from: &str, to: &str) -> String {
    format!("Hello from {from} → {to}")
}

/// Validated topology plus freshly generated keys, not yet running
///
/// Building this has no side effects, so a failure here leaves any active
/// simulation untouched.
pub struct PreparedSimulation {
    topology: Topology,
    run_config: RunConfig,
    directory: Arc<KeyDirectory>,
    secrets: Vec<SecretKey>,
}

impl PreparedSimulation {
    /// Validate the inputs and generate one key pair per node
    pub fn new(topology: Topology, run_config: RunConfig) -> MeshResult<Self> {
        run_config.validate()?;
        topology.validate()?;

        let mut publics = Vec::with_capacity(topology.node_count());
        let mut secrets = Vec::with_capacity(topology.node_count());
        for spec in &topology.nodes {
            let (public, secret) = KeyPair::generate()?.into_parts();
            publics.push((spec.id.clone(), public));
            secrets.push(secret);
        }

        Ok(Self {
            topology,
            run_config,
            directory: Arc::new(publics.into_iter().collect()),
            secrets,
        })
    }

    /// Spawn the actors, register them and connect the fabric
    pub fn launch(
        self,
        generation: u64,
        engine: &EngineConfig,
        publisher: EventPublisher,
    ) -> MeshResult<Simulation> {
        let mut fabric = NetworkFabric::new(
            self.run_config.drop_rate,
            generation,
            publisher.clone(),
            engine,
        );

        for (spec, secret) in self.topology.nodes.iter().zip(self.secrets) {
            let node = NodeActor::spawn(
                spec.id.clone(),
                spec.neighbors.clone(),
                secret,
                Arc::clone(&self.directory),
                publisher.clone(),
                generation,
                engine,
            );
            fabric.add_node(node)?;
        }
        fabric.connect();

        Ok(Simulation {
            generation,
            run_config: self.run_config,
            node_ids: self.topology.node_ids(),
            directory: self.directory,
            fabric,
        })
    }
}

/// One running configuration
pub struct Simulation {
    generation: u64,
    run_config: RunConfig,
    node_ids: Vec<NodeId>,
    directory: Arc<KeyDirectory>,
    fabric: NetworkFabric,
}

impl Simulation {
    /// Validate, generate keys, spawn and connect in one step
    pub fn build(
        generation: u64,
        topology: Topology,
        run_config: RunConfig,
        engine: &EngineConfig,
        publisher: EventPublisher,
    ) -> MeshResult<Self> {
        PreparedSimulation::new(topology, run_config)?.launch(generation, engine, publisher)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn run_config(&self) -> RunConfig {
        self.run_config
    }

    /// Node ids in topology order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn directory(&self) -> &KeyDirectory {
        &self.directory
    }

    /// Seal the greeting from `from` to `to` and pick the origin's inbox
    ///
    /// Split from delivery so callers can release locks before a
    /// potentially blocking enqueue.
    pub fn prepare_send(&self, from: &str, to: &str) -> MeshResult<(Inbox, Message)> {
        let origin = self
            .fabric
            .node(from)
            .ok_or_else(|| MeshError::UnknownNode(NodeId::new(from)))?;
        if !self.fabric.contains(to) {
            return Err(MeshError::UnknownNode(NodeId::new(to)));
        }
        let recipient = self
            .directory
            .get(to)
            .ok_or_else(|| MeshError::UnknownNode(NodeId::new(to)))?;

        let sealed = origin.seal_for(greeting(from, to).as_bytes(), recipient)?;
        let message = Message::new(
            origin.id().clone(),
            NodeId::new(to),
            self.run_config.ttl,
            sealed.ciphertext,
            sealed.nonce,
        );
        Ok((origin.inbox(), message))
    }

    /// Inject the greeting from `from` to `to` at its origin
    pub async fn send(&self, from: &str, to: &str) -> MeshResult<()> {
        let (inbox, message) = self.prepare_send(from, to)?;
        inbox.deliver(message).await
    }

    /// Inbox of the node a pre-built message originates from
    pub fn inbox_for(&self, message: &Message) -> MeshResult<Inbox> {
        self.fabric
            .node(message.from.as_str())
            .map(|node| node.inbox())
            .ok_or_else(|| MeshError::UnknownNode(message.from.clone()))
    }

    /// Enqueue a pre-built message into its sender's inbound queue
    pub async fn inject(&self, message: Message) -> MeshResult<()> {
        self.inbox_for(&message)?.deliver(message).await
    }

    /// Stop workers and actors and wait for all of them; idempotent
    pub async fn shutdown(&mut self) {
        self.fabric.shutdown().await;
    }
}

/// Result of a successful (re)configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigureSummary {
    pub generation: u64,
    pub nodes: Vec<NodeId>,
}

#[derive(Default)]
struct Slot {
    active: Option<Simulation>,
    last_generation: u64,
}

/// Holds the one active simulation and the shared event hub
pub struct SimulationManager {
    engine: EngineConfig,
    hub: EventHub,
    slot: Mutex<Slot>,
}

impl SimulationManager {
    /// Create a manager; spawns the hub on the current runtime
    pub fn new(engine: EngineConfig) -> Self {
        let hub = EventHub::spawn(&engine);
        Self {
            engine,
            hub,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Replace the active simulation
    ///
    /// Inputs are validated and keys generated first; on failure the active
    /// simulation keeps running. Otherwise the prior simulation is torn down
    /// completely before the new one starts.
    #[instrument(skip(self, topology), fields(nodes = topology.node_count()))]
    pub async fn configure(
        &self,
        topology: Topology,
        run_config: RunConfig,
    ) -> MeshResult<ConfigureSummary> {
        let prepared = PreparedSimulation::new(topology, run_config)?;

        let mut slot = self.slot.lock().await;
        if let Some(mut previous) = slot.active.take() {
            previous.shutdown().await;
        }

        let generation = slot.last_generation + 1;
        let simulation = prepared.launch(generation, &self.engine, self.hub.publisher())?;
        slot.last_generation = generation;

        let summary = ConfigureSummary {
            generation,
            nodes: simulation.node_ids().to_vec(),
        };
        slot.active = Some(simulation);

        info!(
            generation,
            drop_rate = run_config.drop_rate,
            ttl = run_config.ttl,
            "Simulation configured"
        );
        Ok(summary)
    }

    /// Inject the greeting from `from` to `to`
    pub async fn send(&self, from: &str, to: &str) -> MeshResult<()> {
        let (inbox, message) = {
            let slot = self.slot.lock().await;
            let simulation = slot.active.as_ref().ok_or(MeshError::SimulationNotConfigured)?;
            simulation.prepare_send(from, to)?
        };
        inbox.deliver(message).await
    }

    /// Enqueue a pre-built message at its sender
    pub async fn inject(&self, message: Message) -> MeshResult<()> {
        let inbox = {
            let slot = self.slot.lock().await;
            let simulation = slot.active.as_ref().ok_or(MeshError::SimulationNotConfigured)?;
            simulation.inbox_for(&message)?
        };
        inbox.deliver(message).await
    }

    /// Ids of the active simulation's nodes; empty when unconfigured
    pub async fn node_ids(&self) -> Vec<NodeId> {
        let slot = self.slot.lock().await;
        slot.active
            .as_ref()
            .map(|s| s.node_ids().to_vec())
            .unwrap_or_default()
    }

    /// Generation of the active simulation, if any
    pub async fn generation(&self) -> Option<u64> {
        let slot = self.slot.lock().await;
        slot.active.as_ref().map(Simulation::generation)
    }

    pub async fn is_configured(&self) -> bool {
        self.slot.lock().await.active.is_some()
    }

    pub async fn subscribe(&self) -> MeshResult<Observer> {
        self.hub.subscribe().await
    }

    pub async fn unsubscribe(&self, id: ObserverId) {
        self.hub.unsubscribe(id).await;
    }

    /// Tear down the active simulation, then the hub
    pub async fn shutdown(&self) {
        let previous = self.slot.lock().await.active.take();
        if let Some(mut simulation) = previous {
            simulation.shutdown().await;
        } else {
            warn!("Shutdown requested with no active simulation");
        }
        self.hub.shutdown().await;
    }
}
