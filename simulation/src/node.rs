//! Node actors
//!
//! One task per mesh participant. The actor owns its private key, its
//! bounded inbound queue and the producing side of its outbound queue. It
//! drains the inbound queue in FIFO order and for every message either
//! drops it (hop budget spent), opens it (final recipient) or relays it.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use meshsim_core::{EngineConfig, Event, EventKind, MeshError, MeshResult, Message, NodeId};
use meshsim_crypto::{KeyDirectory, PublicKey, SealedBox, SecretKey, open, seal};

use crate::hub::EventPublisher;

/// Lifecycle of a node actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on the inbound queue
    Idle,
    /// A message was dequeued
    Processing,
    /// Opening a message addressed to this node
    Decrypting,
    /// Handing a message to the fan-out worker
    Forwarding,
    /// Discarding a message whose hop budget is spent
    Dropping,
    /// Inbound queue closed; terminal
    Stopped,
}

/// Producer side of a node's inbound queue
///
/// Cloneable, so callers can enqueue without holding on to the node.
#[derive(Debug, Clone)]
pub struct Inbox {
    id: NodeId,
    tx: mpsc::Sender<Message>,
}

impl Inbox {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Enqueue a message, waiting while the queue is full
    pub async fn deliver(&self, message: Message) -> MeshResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| MeshError::NodeStopped(self.id.clone()))
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Message> {
        self.tx.clone()
    }
}

/// Owner-side handle of a running node actor
#[derive(Debug)]
pub struct NodeHandle {
    id: NodeId,
    neighbors: Arc<[NodeId]>,
    inbox: Inbox,
    secret: Arc<SecretKey>,
    outbound_rx: Option<mpsc::Receiver<Message>>,
    stop_tx: broadcast::Sender<()>,
    state_rx: watch::Receiver<NodeState>,
    task: Option<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> NodeState {
        *self.state_rx.borrow()
    }

    /// Enqueue a message into this node's inbound queue
    pub async fn receive(&self, message: Message) -> MeshResult<()> {
        self.inbox.deliver(message).await
    }

    /// Seal a payload from this node to `recipient`
    ///
    /// The private key stays inside the node; only the box leaves.
    pub fn seal_for(&self, plaintext: &[u8], recipient: &PublicKey) -> MeshResult<SealedBox> {
        Ok(seal(plaintext, &self.secret, recipient)?)
    }

    /// Take the consuming side of the outbound queue (once)
    pub(crate) fn take_outbound(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.outbound_rx.take()
    }

    /// Stop accepting inbound messages and wait for the actor to exit
    ///
    /// A message already being processed completes; queued ones are
    /// discarded. Calling this more than once is harmless.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Per-node processing loop
pub struct NodeActor {
    id: NodeId,
    generation: u64,
    secret: Arc<SecretKey>,
    directory: Arc<KeyDirectory>,
    inbound_rx: mpsc::Receiver<Message>,
    outbound_tx: mpsc::Sender<Message>,
    publisher: EventPublisher,
    stop_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<NodeState>,
}

impl NodeActor {
    /// Spawn an actor and return its handle
    pub fn spawn(
        id: NodeId,
        neighbors: Vec<NodeId>,
        secret: SecretKey,
        directory: Arc<KeyDirectory>,
        publisher: EventPublisher,
        generation: u64,
        config: &EngineConfig,
    ) -> NodeHandle {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let (state_tx, state_rx) = watch::channel(NodeState::Idle);
        let secret = Arc::new(secret);

        let actor = Self {
            id: id.clone(),
            generation,
            secret: Arc::clone(&secret),
            directory,
            inbound_rx,
            outbound_tx,
            publisher,
            stop_rx,
            state_tx,
        };
        let task = tokio::spawn(actor.run());

        NodeHandle {
            inbox: Inbox {
                id: id.clone(),
                tx: inbound_tx,
            },
            id,
            neighbors: neighbors.into(),
            secret,
            outbound_rx: Some(outbound_rx),
            stop_tx,
            state_rx,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        trace!(node = %self.id, "Node actor started");

        loop {
            let message = tokio::select! {
                biased;
                _ = self.stop_rx.recv() => break,
                message = self.inbound_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            if !self.process(message).await {
                break;
            }
        }

        // Wakes producers blocked on a full queue; dropping self closes outbound
        self.inbound_rx.close();
        self.set_state(NodeState::Stopped);
        debug!(node = %self.id, "Node actor stopped");
    }

    /// Handle one message; false if a stop arrived while it was in flight
    async fn process(&mut self, message: Message) -> bool {
        self.set_state(NodeState::Processing);
        self.emit(EventKind::Received, &message, None).await;

        if message.is_expired() {
            self.set_state(NodeState::Dropping);
            self.emit(EventKind::DroppedTtl, &message, None).await;
        } else if message.to == self.id {
            self.set_state(NodeState::Decrypting);
            self.decrypt(&message).await;
        } else if message.is_origination() {
            // The origin hands its own message to fan-out as-is
            return self.dispatch(message).await;
        } else {
            self.set_state(NodeState::Forwarding);
            let next = message.forwarded();
            let event = Event::new(EventKind::Forwarded, self.id.clone(), None, next.ttl, self.generation);
            self.publish(event).await;
            return self.dispatch(next).await;
        }

        self.set_state(NodeState::Idle);
        true
    }

    async fn decrypt(&mut self, message: &Message) {
        let opened = match self.directory.get(message.from.as_str()) {
            Some(sender) => open(&message.ciphertext, &message.nonce, sender, &self.secret)
                .map_err(|e| e.to_string()),
            None => Err(format!("no public key for sender {}", message.from)),
        };

        match opened {
            Ok(plaintext) => {
                let plaintext = String::from_utf8_lossy(&plaintext).into_owned();
                self.emit(EventKind::Decrypted, message, Some(("plaintext", plaintext)))
                    .await;
            }
            Err(error) => {
                debug!(node = %self.id, from = %message.from, error = %error, "Decryption failed");
                self.emit(EventKind::DecryptFailed, message, Some(("error", error)))
                    .await;
            }
        }
    }

    async fn dispatch(&mut self, message: Message) -> bool {
        tokio::select! {
            biased;
            _ = self.stop_rx.recv() => false,
            sent = self.outbound_tx.send(message) => {
                if sent.is_err() {
                    trace!(node = %self.id, "Fan-out worker gone, message discarded");
                }
                self.set_state(NodeState::Idle);
                true
            }
        }
    }

    /// Emit an event about `message` concerning this node
    async fn emit(&self, kind: EventKind, message: &Message, payload: Option<(&str, String)>) {
        let mut event = Event::new(
            kind,
            message.from.clone(),
            Some(self.id.clone()),
            message.ttl,
            self.generation,
        );
        if let Some((key, value)) = payload {
            event = event.with_payload(key, value);
        }
        self.publish(event).await;
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.publisher.publish(event).await {
            trace!(node = %self.id, error = %e, "Event dropped");
        }
    }

    fn set_state(&self, state: NodeState) {
        self.state_tx.send_replace(state);
    }
}
