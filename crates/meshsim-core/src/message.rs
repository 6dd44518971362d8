//! Encrypted messages travelling through the mesh

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

/// Nonce size of the authenticated box (24 bytes, XChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 24;

/// An encrypted packet travelling through the mesh
///
/// Everything except `ttl` and `hops` is fixed at injection. Each hop works
/// on its own clone, so no two queues ever alias the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Original sender
    pub from: NodeId,
    /// Final recipient
    pub to: NodeId,
    /// Remaining hop budget
    pub ttl: i32,
    /// When the message was injected
    pub timestamp: DateTime<Utc>,
    /// Box ciphertext including the authentication tag
    pub ciphertext: Vec<u8>,
    /// Nonce used to seal `ciphertext`
    pub nonce: [u8; NONCE_SIZE],
    /// Number of fabric deliveries this copy has been through
    #[serde(default)]
    pub hops: u32,
}

impl Message {
    /// Build a fresh message at its origin (zero hops)
    pub fn new(
        from: NodeId,
        to: NodeId,
        ttl: i32,
        ciphertext: Vec<u8>,
        nonce: [u8; NONCE_SIZE],
    ) -> Self {
        Self {
            from,
            to,
            ttl,
            timestamp: Utc::now(),
            ciphertext,
            nonce,
            hops: 0,
        }
    }

    /// True while the message sits at its origin and has not crossed an edge
    pub fn is_origination(&self) -> bool {
        self.hops == 0
    }

    /// True once the hop budget is spent
    pub fn is_expired(&self) -> bool {
        self.ttl <= 0
    }

    /// Copy with TTL decremented by one, as produced by a relaying node
    pub fn forwarded(&self) -> Self {
        let mut next = self.clone();
        next.ttl -= 1;
        next
    }

    /// Copy as it arrives at a neighbor: TTL untouched, one more hop
    pub fn delivered(&self) -> Self {
        let mut next = self.clone();
        next.hops += 1;
        next
    }
}
