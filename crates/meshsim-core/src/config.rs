//! Run and engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};

/// Default inbound queue capacity per node
pub const DEFAULT_INBOUND_CAPACITY: usize = 10;

/// Default outbound queue capacity per node
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 10;

/// Default upper bound of the per-edge latency
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(100);

/// Default capacity of the event hub's publish mailbox
pub const DEFAULT_HUB_MAILBOX_CAPACITY: usize = 256;

/// Default capacity of each observer's queue
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// Parameters supplied with every (re)configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Probability in [0, 1] that a single edge traversal is lost
    pub drop_rate: f64,
    /// Initial hop budget of injected messages
    pub ttl: i32,
}

impl RunConfig {
    /// Create a run configuration
    pub fn new(drop_rate: f64, ttl: i32) -> Self {
        Self { drop_rate, ttl }
    }

    /// Reject out-of-range drop rates and hop budgets
    pub fn validate(&self) -> MeshResult<()> {
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(MeshError::Config(
                "dropRate must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.ttl < 1 {
            return Err(MeshError::Config("ttl must be >= 1".to_string()));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            ttl: 5,
        }
    }
}

/// Tunables of the routing engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bounded inbound queue capacity per node
    pub inbound_capacity: usize,
    /// Bounded outbound queue capacity per node
    pub outbound_capacity: usize,
    /// Exclusive upper bound of the uniform per-edge delay
    pub max_latency: Duration,
    /// Capacity of the event hub's publish mailbox
    pub hub_mailbox_capacity: usize,
    /// Capacity of each observer's queue before it is evicted
    pub observer_capacity: usize,
    /// Seed for fan-out randomness; `None` draws from the OS
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_latency: DEFAULT_MAX_LATENCY,
            hub_mailbox_capacity: DEFAULT_HUB_MAILBOX_CAPACITY,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Set the per-node queue capacities
    pub fn with_queue_capacity(mut self, inbound: usize, outbound: usize) -> Self {
        self.inbound_capacity = inbound.max(1);
        self.outbound_capacity = outbound.max(1);
        self
    }

    /// Set the latency upper bound (zero disables the delay)
    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }

    /// Set the event hub capacities
    pub fn with_hub_capacity(mut self, mailbox: usize, observer: usize) -> Self {
        self.hub_mailbox_capacity = mailbox.max(1);
        self.observer_capacity = observer.max(1);
        self
    }

    /// Fix the fan-out random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_validation() {
        assert!(RunConfig::new(0.0, 1).validate().is_ok());
        assert!(RunConfig::new(1.0, 10).validate().is_ok());
        assert!(RunConfig::new(-0.1, 1).validate().is_err());
        assert!(RunConfig::new(1.01, 1).validate().is_err());
        assert!(RunConfig::new(f64::NAN, 1).validate().is_err());
        assert!(RunConfig::new(0.5, 0).validate().is_err());
        assert!(RunConfig::new(0.5, -3).validate().is_err());
    }

    #[test]
    fn test_run_config_camel_case() {
        let config: RunConfig = serde_json::from_str(r#"{"dropRate":0.25,"ttl":4}"#).unwrap();
        assert_eq!(config, RunConfig::new(0.25, 4));
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.inbound_capacity, 10);
        assert_eq!(config.max_latency, Duration::from_millis(100));
        assert_eq!(config.hub_mailbox_capacity, 256);
        assert_eq!(config.observer_capacity, 256);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_engine_builders_clamp_zero() {
        let config = EngineConfig::default()
            .with_queue_capacity(0, 0)
            .with_hub_capacity(0, 4)
            .with_max_latency(Duration::ZERO)
            .with_seed(7);
        assert_eq!(config.inbound_capacity, 1);
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.hub_mailbox_capacity, 1);
        assert_eq!(config.observer_capacity, 4);
        assert_eq!(config.seed, Some(7));
        assert!(config.max_latency.is_zero());
    }
}
