//! Simulation events
//!
//! Every state transition of a node actor or fan-out worker produces
//! exactly one [`Event`]. Events are append-only: once emitted they are
//! shared read-only with every observer.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::identity::NodeId;

/// Open string-keyed payload attached to an event
pub type Payload = Map<String, Value>;

/// Kinds of events emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A node dequeued a message from its inbound queue
    Received,
    /// A message arrived with no hop budget left and was discarded
    DroppedTtl,
    /// The final recipient opened the box
    Decrypted,
    /// The final recipient failed to authenticate the box
    DecryptFailed,
    /// A relaying node decremented TTL and queued the message for fan-out
    Forwarded,
    /// The fabric lost the copy on one edge
    DroppedNetwork,
    /// The fabric handed the copy to a neighbor's inbound queue
    Delivered,
}

impl EventKind {
    /// All kinds, in the order they are documented
    pub const ALL: [EventKind; 7] = [
        EventKind::Received,
        EventKind::DroppedTtl,
        EventKind::Decrypted,
        EventKind::DecryptFailed,
        EventKind::Forwarded,
        EventKind::DroppedNetwork,
        EventKind::Delivered,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::DroppedTtl => "dropped_ttl",
            Self::Decrypted => "decrypted",
            Self::DecryptFailed => "decrypt_failed",
            Self::Forwarded => "forwarded",
            Self::DroppedNetwork => "dropped_network",
            Self::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observable step of the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Original sender, or the relaying node for fabric events
    pub from: NodeId,
    /// Node the event concerns; `None` when a message fans out to all neighbors
    #[serde(serialize_with = "serialize_to", deserialize_with = "deserialize_to")]
    pub to: Option<NodeId>,
    /// TTL carried by the message at the time of the event
    pub ttl: i32,
    /// Extra detail, such as `plaintext` or `error`
    pub payload: Payload,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    /// Configuration generation that emitted the event
    pub generation: u64,
}

impl Event {
    /// Create an event stamped with the current time and an empty payload
    pub fn new(
        kind: EventKind,
        from: NodeId,
        to: Option<NodeId>,
        ttl: i32,
        generation: u64,
    ) -> Self {
        Self {
            kind,
            from,
            to,
            ttl,
            payload: Payload::new(),
            timestamp: Utc::now().timestamp_millis(),
            generation,
        }
    }

    /// Attach a payload entry
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Look up a string payload entry
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// True if the event concerns the given node as its `to`
    pub fn is_to(&self, node: &str) -> bool {
        self.to.as_ref().is_some_and(|to| to.as_str() == node)
    }

    /// Serialize to a JSON string for observers
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn serialize_to<S: Serializer>(to: &Option<NodeId>, serializer: S) -> Result<S::Ok, S::Error> {
    match to {
        Some(id) => serializer.serialize_str(id.as_str()),
        None => serializer.serialize_str(""),
    }
}

fn deserialize_to<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NodeId>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(if raw.is_empty() { None } else { Some(NodeId::from(raw)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::new(EventKind::Decrypted, "A".into(), Some("B".into()), 1, 3)
            .with_payload("plaintext", "Hello from A → B");
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "decrypted");
        assert_eq!(value["from"], "A");
        assert_eq!(value["to"], "B");
        assert_eq!(value["ttl"], 1);
        assert_eq!(value["payload"]["plaintext"], "Hello from A → B");
        assert_eq!(value["generation"], 3);
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_broadcast_event_has_empty_to() {
        let event = Event::new(EventKind::Forwarded, "B".into(), None, 0, 1);
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["to"], "");
        assert!(value["payload"].as_object().unwrap().is_empty());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back.to, None);
    }

    #[test]
    fn test_payload_lookup() {
        let event = Event::new(EventKind::DecryptFailed, "A".into(), Some("C".into()), 2, 1)
            .with_payload("error", "authentication failed");
        assert_eq!(event.payload_str("error"), Some("authentication failed"));
        assert_eq!(event.payload_str("plaintext"), None);
        assert!(event.is_to("C"));
        assert!(!event.is_to("A"));
    }
}
