//! Lossy, delayed fan-out between node actors
//!
//! The fabric owns the node registry. Nodes are registered before
//! [`NetworkFabric::connect`]; after that the registry is frozen and shared
//! read-only with one fan-out worker per node. Each worker takes messages
//! off its node's outbound queue and gives every neighbor an independent
//! drop decision and delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use meshsim_core::{EngineConfig, Event, EventKind, MeshError, MeshResult, Message, NodeId};

use crate::hub::EventPublisher;
use crate::node::NodeHandle;

/// Registry of live nodes plus their fan-out workers
pub struct NetworkFabric {
    nodes: HashMap<NodeId, NodeHandle>,
    drop_rate: f64,
    max_latency: Duration,
    seed: Option<u64>,
    generation: u64,
    publisher: EventPublisher,
    shutdown_tx: broadcast::Sender<()>,
    workers: Vec<JoinHandle<()>>,
    connected: bool,
    shut_down: bool,
}

impl NetworkFabric {
    pub fn new(drop_rate: f64, generation: u64, publisher: EventPublisher, config: &EngineConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            nodes: HashMap::new(),
            drop_rate,
            max_latency: config.max_latency,
            seed: config.seed,
            generation,
            publisher,
            shutdown_tx,
            workers: Vec::new(),
            connected: false,
            shut_down: false,
        }
    }

    /// Register a node under its id
    pub fn add_node(&mut self, node: NodeHandle) -> MeshResult<()> {
        if self.connected {
            return Err(MeshError::Config(
                "cannot add nodes to a connected fabric".to_string(),
            ));
        }
        if self.nodes.contains_key(node.id()) {
            return Err(MeshError::DuplicateNode(node.id().clone()));
        }
        self.nodes.insert(node.id().clone(), node);
        Ok(())
    }

    /// Look up a live node
    pub fn node(&self, id: &str) -> Option<&NodeHandle> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Freeze the registry and start one fan-out worker per node
    pub fn connect(&mut self) {
        if self.connected || self.shut_down {
            return;
        }
        self.connected = true;

        let targets: Arc<HashMap<NodeId, mpsc::Sender<Message>>> = Arc::new(
            self.nodes
                .iter()
                .map(|(id, node)| (id.clone(), node.inbox().sender()))
                .collect(),
        );

        // Sorted so a fixed seed always maps to the same worker
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();

        for (index, id) in ids.iter().enumerate() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let Some(outbound) = node.take_outbound() else {
                continue;
            };
            let rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed ^ index as u64),
                None => StdRng::from_rng(&mut rand::rng()),
            };

            let worker = FanOutWorker {
                node: id.clone(),
                neighbors: node.neighbors().into(),
                outbound,
                targets: Arc::clone(&targets),
                drop_rate: self.drop_rate,
                max_latency: self.max_latency,
                rng,
                publisher: self.publisher.clone(),
                generation: self.generation,
                shutdown_rx: self.shutdown_tx.subscribe(),
            };
            self.workers.push(tokio::spawn(worker.run()));
        }

        info!(
            nodes = self.nodes.len(),
            drop_rate = self.drop_rate,
            generation = self.generation,
            "Fabric connected"
        );
    }

    /// Stop every worker and node and wait for them; idempotent
    ///
    /// Pending delays are cancelled without delivering.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let _ = self.shutdown_tx.send(());
        for node in self.nodes.values_mut() {
            node.stop().await;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }

        info!(generation = self.generation, "Fabric shut down");
    }
}

struct FanOutWorker {
    node: NodeId,
    neighbors: Arc<[NodeId]>,
    outbound: mpsc::Receiver<Message>,
    targets: Arc<HashMap<NodeId, mpsc::Sender<Message>>>,
    drop_rate: f64,
    max_latency: Duration,
    rng: StdRng,
    publisher: EventPublisher,
    generation: u64,
    shutdown_rx: broadcast::Receiver<()>,
}

impl FanOutWorker {
    async fn run(mut self) {
        trace!(node = %self.node, "Fan-out worker started");

        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break,
                message = self.outbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            if !self.fan_out(&message).await {
                break;
            }
        }

        debug!(node = %self.node, "Fan-out worker stopped");
    }

    /// Deliver one message to every neighbor; false on shutdown
    ///
    /// `delivered` is only emitted once the neighbor's queue has reserved a
    /// slot, so a copy lost to shutdown or a stopped neighbor never shows up
    /// as delivered.
    async fn fan_out(&mut self, message: &Message) -> bool {
        let neighbors = Arc::clone(&self.neighbors);

        for neighbor in neighbors.iter() {
            let Some(target) = self.targets.get(neighbor).cloned() else {
                continue;
            };

            if self.rng.random::<f64>() < self.drop_rate {
                self.emit(EventKind::DroppedNetwork, neighbor, message.ttl).await;
                continue;
            }

            let delay = self.latency();
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.shutdown_rx.recv() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let reserved = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => return false,
                reserved = target.reserve() => reserved,
            };
            match reserved {
                Ok(permit) => {
                    self.emit(EventKind::Delivered, neighbor, message.ttl).await;
                    permit.send(message.delivered());
                }
                Err(_) => {
                    trace!(from = %self.node, to = %neighbor, "Neighbor stopped, copy discarded");
                }
            }
        }
        true
    }

    fn latency(&mut self) -> Duration {
        if self.max_latency.is_zero() {
            Duration::ZERO
        } else {
            self.rng.random_range(Duration::ZERO..self.max_latency)
        }
    }

    async fn emit(&self, kind: EventKind, neighbor: &NodeId, ttl: i32) {
        let event = Event::new(kind, self.node.clone(), Some(neighbor.clone()), ttl, self.generation);
        if let Err(e) = self.publisher.publish(event).await {
            trace!(node = %self.node, error = %e, "Event dropped");
        }
    }
}
