//! Configuration for the node runtime
//!
//! [`ProtocolConfig`] can be built in code with the `with_*` setters or
//! loaded from TOML:
//!
//! ```toml
//! algorithm = "link-state"
//! refresh_interval_ms = 10000
//! age_tick_interval_ms = 1000
//! max_age_ticks = 60
//! quiet_period_ms = 3000
//!
//! [delivery]
//! mode = "reliable"
//! ack_timeout_ms = 250
//! retry_budget = 3
//! ```

use std::path::Path;
use std::time::Duration;

use linkstate_core::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// How routing messages are delivered to neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Send once; flooding redundancy and refresh cover losses
    #[default]
    BestEffort,
    /// Track every send until acknowledged, retransmit, then demote the adjacency
    Reliable {
        /// Wait this long for an ACK before resending
        ack_timeout_ms: u64,
        /// Retransmissions allowed before the neighbor is marked unreachable
        retry_budget: u32,
    },
}

impl DeliveryMode {
    /// Whether acknowledgments are tracked
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Reliable { .. })
    }
}

/// Configuration for a routing node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Hosted routing algorithm
    pub algorithm: Algorithm,
    /// Interval between periodic self-advertisements
    pub refresh_interval_ms: u64,
    /// Interval between age ticks
    pub age_tick_interval_ms: u64,
    /// Lifetime of an advertisement, in age ticks
    pub max_age_ticks: u32,
    /// Time without a topology change before the node reports Stable
    pub quiet_period_ms: u64,
    /// Delivery mode for routing messages
    pub delivery: DeliveryMode,
    /// Frames queued per neighbor before sends are dropped
    pub send_queue_capacity: usize,
    /// Commands queued for the event loop
    pub command_channel_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::LinkState,
            refresh_interval_ms: 10_000,
            age_tick_interval_ms: 1_000,
            max_age_ticks: 60,
            quiet_period_ms: 3_000,
            delivery: DeliveryMode::BestEffort,
            send_queue_capacity: 256,
            command_channel_capacity: 1024,
        }
    }
}

impl ProtocolConfig {
    /// Short timers for tests and in-process simulations
    pub fn fast() -> Self {
        Self {
            refresh_interval_ms: 1_000,
            age_tick_interval_ms: 50,
            max_age_ticks: 40,
            quiet_period_ms: 200,
            ..Self::default()
        }
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(source: &str) -> NodeResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Reject configurations a node cannot run with
    pub fn validate(&self) -> NodeResult<()> {
        if self.refresh_interval_ms == 0 {
            return Err(NodeError::Config("refresh_interval_ms must be positive".into()));
        }
        if self.age_tick_interval_ms == 0 {
            return Err(NodeError::Config("age_tick_interval_ms must be positive".into()));
        }
        if self.max_age_ticks == 0 {
            return Err(NodeError::Config("max_age_ticks must be positive".into()));
        }
        if self.send_queue_capacity == 0 || self.command_channel_capacity == 0 {
            return Err(NodeError::Config("channel capacities must be positive".into()));
        }

        let lifetime = self.age_tick_interval_ms.saturating_mul(u64::from(self.max_age_ticks));
        if self.refresh_interval_ms >= lifetime {
            return Err(NodeError::Config(format!(
                "refresh interval {}ms must be shorter than advertisement lifetime {}ms",
                self.refresh_interval_ms, lifetime
            )));
        }

        if let DeliveryMode::Reliable {
            ack_timeout_ms,
            retry_budget,
        } = self.delivery
        {
            if ack_timeout_ms == 0 {
                return Err(NodeError::Config("ack_timeout_ms must be positive".into()));
            }
            if retry_budget == 0 {
                return Err(NodeError::Config("retry_budget must be positive".into()));
            }
        }
        Ok(())
    }

    /// Set the routing algorithm
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the periodic refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the age tick interval
    pub fn with_age_tick_interval(mut self, interval: Duration) -> Self {
        self.age_tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the advertisement lifetime in ticks
    pub fn with_max_age_ticks(mut self, ticks: u32) -> Self {
        self.max_age_ticks = ticks;
        self
    }

    /// Set the quiet period before Stable
    pub fn with_quiet_period(mut self, period: Duration) -> Self {
        self.quiet_period_ms = period.as_millis() as u64;
        self
    }

    /// Set the delivery mode
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Switch to reliable delivery
    pub fn with_reliable_delivery(mut self, ack_timeout: Duration, retry_budget: u32) -> Self {
        self.delivery = DeliveryMode::Reliable {
            ack_timeout_ms: ack_timeout.as_millis() as u64,
            retry_budget,
        };
        self
    }

    /// Set the per-neighbor send queue capacity
    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    /// Set the event loop command channel capacity
    pub fn with_command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn age_tick_interval(&self) -> Duration {
        Duration::from_millis(self.age_tick_interval_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Ack timeout, when delivery is reliable
    pub fn ack_timeout(&self) -> Option<Duration> {
        match self.delivery {
            DeliveryMode::Reliable { ack_timeout_ms, .. } => Some(Duration::from_millis(ack_timeout_ms)),
            DeliveryMode::BestEffort => None,
        }
    }
}
