//! Ordered event fan-in and observer broadcast
//!
//! Every node actor and fan-out worker publishes into one bounded mailbox.
//! A single dispatch task drains it and copies each event into every
//! observer's own bounded queue. An observer whose queue is full is evicted
//! on the spot, so one slow consumer never stalls the dispatch loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use meshsim_core::{EngineConfig, Event, MeshError, MeshResult};

/// Identifier of a connected observer
pub type ObserverId = Uuid;

/// Cloneable publishing side of the hub
///
/// `publish` waits while the mailbox is full; events are never dropped on
/// the way in.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<Event>,
}

impl EventPublisher {
    /// Queue an event for dispatch
    pub async fn publish(&self, event: Event) -> MeshResult<()> {
        self.tx.send(event).await.map_err(|_| MeshError::HubClosed)
    }
}

/// Receiving side of one observer session
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next event in dispatch order; `None` once unsubscribed or evicted
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Observer::recv`]
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }
}

enum Control {
    Register {
        tx: mpsc::Sender<Arc<Event>>,
        ack: oneshot::Sender<ObserverId>,
    },
    Unregister(ObserverId),
    Count(oneshot::Sender<usize>),
}

/// The event hub: one dispatch task plus handles to reach it
pub struct EventHub {
    publisher: EventPublisher,
    control_tx: mpsc::Sender<Control>,
    observer_capacity: usize,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventHub {
    /// Spawn the dispatch task on the current runtime
    pub fn spawn(config: &EngineConfig) -> Self {
        let (publish_tx, publish_rx) = mpsc::channel(config.hub_mailbox_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let dispatcher = Dispatcher {
            publish_rx,
            control_rx,
            shutdown_rx,
            observers: HashMap::new(),
        };
        let task = tokio::spawn(dispatcher.run());

        Self {
            publisher: EventPublisher { tx: publish_tx },
            control_tx,
            observer_capacity: config.observer_capacity.max(1),
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Handle for producers
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Publish through the hub's own handle
    pub async fn publish(&self, event: Event) -> MeshResult<()> {
        self.publisher.publish(event).await
    }

    /// Register a new observer
    ///
    /// The observer sees every event dispatched after this call returns.
    pub async fn subscribe(&self) -> MeshResult<Observer> {
        let (tx, rx) = mpsc::channel(self.observer_capacity);
        let (ack, ack_rx) = oneshot::channel();
        self.control_tx
            .send(Control::Register { tx, ack })
            .await
            .map_err(|_| MeshError::HubClosed)?;
        let id = ack_rx.await.map_err(|_| MeshError::HubClosed)?;
        Ok(Observer { id, rx })
    }

    /// Remove an observer and release its queue; unknown ids are ignored
    pub async fn unsubscribe(&self, id: ObserverId) {
        let _ = self.control_tx.send(Control::Unregister(id)).await;
    }

    /// Number of currently connected observers
    pub async fn observer_count(&self) -> MeshResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Count(tx))
            .await
            .map_err(|_| MeshError::HubClosed)?;
        rx.await.map_err(|_| MeshError::HubClosed)
    }

    /// Stop the dispatch task after draining queued events; idempotent
    pub async fn shutdown(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(());
        let _ = task.await;
    }
}

struct Dispatcher {
    publish_rx: mpsc::Receiver<Event>,
    control_rx: mpsc::Receiver<Control>,
    shutdown_rx: broadcast::Receiver<()>,
    observers: HashMap<ObserverId, mpsc::Sender<Arc<Event>>>,
}

impl Dispatcher {
    async fn run(mut self) {
        debug!("Event hub started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break,
                Some(control) = self.control_rx.recv() => self.handle_control(control),
                event = self.publish_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        // Flush whatever producers managed to queue before the signal
        self.publish_rx.close();
        while let Ok(event) = self.publish_rx.try_recv() {
            self.dispatch(event);
        }

        info!(observers = self.observers.len(), "Event hub stopped");
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Register { tx, ack } => {
                let id = Uuid::new_v4();
                self.observers.insert(id, tx);
                debug!(observer = %id, "Observer registered");
                let _ = ack.send(id);
            }
            Control::Unregister(id) => {
                if self.observers.remove(&id).is_some() {
                    debug!(observer = %id, "Observer unregistered");
                }
            }
            Control::Count(reply) => {
                let _ = reply.send(self.observers.len());
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let event = Arc::new(event);
        self.observers.retain(|id, tx| match tx.try_send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(observer = %id, "Observer queue full, disconnecting");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(observer = %id, "Observer gone");
                false
            }
        });
    }
}
