//! Error types for meshsim

use std::path::PathBuf;

use thiserror::Error;

use crate::identity::NodeId;

/// Top-level error type surfaced to callers of the simulator
///
/// Configuration-time and request-time failures are returned synchronously.
/// Failures during live flooding never appear here: they become events.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key generation failed: {0}")]
    KeyGen(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Authentication failed")]
    Authentication,

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Duplicate node: {0}")]
    DuplicateNode(NodeId),

    #[error("Simulation not configured")]
    SimulationNotConfigured,

    #[error("Node stopped: {0}")]
    NodeStopped(NodeId),

    #[error("Event hub closed")]
    HubClosed,
}

impl MeshError {
    /// True for errors caused by the caller's input rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownNode(_)
                | Self::DuplicateNode(_)
                | Self::SimulationNotConfigured
        )
    }
}

impl From<TopologyError> for MeshError {
    fn from(e: TopologyError) -> Self {
        MeshError::Config(e.to_string())
    }
}

/// Errors raised while loading or validating a topology
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Topology has no nodes")]
    Empty,

    #[error("Node at position {0} has an empty id")]
    EmptyId(usize),

    #[error("Duplicate node id: {0}")]
    DuplicateId(NodeId),

    #[error("Node {node} references undeclared neighbor {neighbor}")]
    UnknownNeighbor { node: NodeId, neighbor: NodeId },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported topology format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse topology: {0}")]
    Parse(String),
}

/// Result type alias for meshsim operations
pub type MeshResult<T> = Result<T, MeshError>;
