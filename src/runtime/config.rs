use crate::processor::worker::RoleLayout;
use crate::runtime::telemetry;
use anyhow::{bail, Result};
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 1;
const DEFAULT_HANDLING_CONCURRENCY: usize = 1;
const DEFAULT_ACK_CAPACITY: usize = 64;

/// Whether handler roles may drain the bridge while the store is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Handlers always receive from the bridge.
    #[default]
    Always,
    /// Handlers skip an iteration while the store is empty but the bridge still holds items,
    /// giving pullers a chance to refill first. Items can stay stranded in the bridge for as
    /// long as the source yields nothing.
    PreferRefill,
}

/// Runtime configuration for the item engine.
///
/// All instances must be constructed via [`EngineConfig::builder`] or [`EngineConfig::new`]
/// so invariants are validated before any role observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    capacity: usize,
    throttle: Duration,
    roles: RoleLayout,
    handling_concurrency: usize,
    drain_policy: DrainPolicy,
    ack_capacity: usize,
    shutdown_grace: Duration,
    metrics_interval: Duration,
}

pub struct EngineConfigParams {
    pub capacity: usize,
    pub throttle: Duration,
    pub roles: RoleLayout,
    pub handling_concurrency: usize,
    pub drain_policy: DrainPolicy,
    pub ack_capacity: usize,
    pub shutdown_grace: Duration,
    pub metrics_interval: Duration,
}

impl EngineConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// A capacity of zero is clamped to one rather than rejected.
    pub fn new(params: EngineConfigParams) -> Result<Self> {
        let EngineConfigParams {
            capacity,
            throttle,
            roles,
            handling_concurrency,
            drain_policy,
            ack_capacity,
            shutdown_grace,
            metrics_interval,
        } = params;

        let config = Self {
            capacity: capacity.max(1),
            throttle,
            roles,
            handling_concurrency,
            drain_policy,
            ack_capacity,
            shutdown_grace,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Effective bridge capacity, never below one.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Delay applied before every role iteration.
    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Number of puller, filler and handler roles spawned on start.
    pub fn roles(&self) -> RoleLayout {
        self.roles
    }

    /// Maximum number of `handling` calls running at once across all handler roles.
    pub fn handling_concurrency(&self) -> usize {
        self.handling_concurrency
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        self.drain_policy
    }

    /// Depth of the acknowledgement channel between handlers and the `on_ack` dispatcher.
    pub fn ack_capacity(&self) -> usize {
        self.ack_capacity
    }

    /// How long `stop` waits for running roles before abandoning them.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            bail!("capacity must be greater than 0");
        }

        if self.roles.pullers() == 0 {
            bail!("roles must include at least one puller");
        }

        if self.handling_concurrency == 0 {
            bail!("handling_concurrency must be greater than 0");
        }

        if self.ack_capacity == 0 {
            bail!("ack_capacity must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            throttle: Duration::ZERO,
            roles: RoleLayout::default(),
            handling_concurrency: DEFAULT_HANDLING_CONCURRENCY,
            drain_policy: DrainPolicy::default(),
            ack_capacity: DEFAULT_ACK_CAPACITY,
            shutdown_grace: Duration::ZERO,
            metrics_interval: telemetry::DEFAULT_METRICS_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EngineConfigBuilder {
    capacity: Option<usize>,
    throttle: Option<Duration>,
    roles: Option<RoleLayout>,
    handling_concurrency: Option<usize>,
    drain_policy: Option<DrainPolicy>,
    ack_capacity: Option<usize>,
    shutdown_grace: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl EngineConfigBuilder {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn roles(mut self, roles: RoleLayout) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn handling_concurrency(mut self, permits: usize) -> Self {
        self.handling_concurrency = Some(permits);
        self
    }

    pub fn drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.drain_policy = Some(policy);
        self
    }

    pub fn ack_capacity(mut self, capacity: usize) -> Self {
        self.ack_capacity = Some(capacity);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let params = EngineConfigParams {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            throttle: self.throttle.unwrap_or(defaults.throttle),
            roles: self.roles.unwrap_or(defaults.roles),
            handling_concurrency: self
                .handling_concurrency
                .unwrap_or(defaults.handling_concurrency),
            drain_policy: self.drain_policy.unwrap_or(defaults.drain_policy),
            ack_capacity: self.ack_capacity.unwrap_or(defaults.ack_capacity),
            shutdown_grace: self.shutdown_grace.unwrap_or(defaults.shutdown_grace),
            metrics_interval: self.metrics_interval.unwrap_or(defaults.metrics_interval),
        };

        EngineConfig::new(params)
    }
}
