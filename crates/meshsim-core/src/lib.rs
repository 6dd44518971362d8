//! # Meshsim Core
//!
//! Core types, topology handling and errors for the meshsim flooding
//! simulator.
//!
//! This crate carries no concurrency of its own. It defines the values that
//! travel between the node actors, the network fabric and the event hub:
//!
//! - [`NodeId`]: identifier of a mesh participant
//! - [`Message`]: an encrypted packet with its remaining hop budget
//! - [`Event`]: an append-only record of one hop, drop or decryption outcome
//! - [`Topology`]: the declared node set and adjacency
//! - [`RunConfig`] / [`EngineConfig`]: per-run parameters and engine tunables
//! - [`MeshError`]: the error taxonomy surfaced to callers

pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod topology;

// Re-export main types
pub use config::{EngineConfig, RunConfig};
pub use error::{MeshError, MeshResult, TopologyError};
pub use event::{Event, EventKind, Payload};
pub use identity::NodeId;
pub use message::{Message, NONCE_SIZE};
pub use topology::{NodeSpec, Topology, TopologyBuilder, TopologyFormat, list_topology_files};
