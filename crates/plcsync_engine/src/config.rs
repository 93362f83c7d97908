//! Configuration for the gateway.

use std::time::Duration;

/// Default provenance marker stamped on every gateway write.
pub const DEFAULT_MARKER: &str = "server";

/// Configuration for a gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Time between two device polls.
    pub poll_interval: Duration,
    /// Value written to `changer_id` on every gateway write.
    pub provenance_marker: String,
    /// How often the listener re-checks the stop flag while idle.
    pub listener_poll: Duration,
    /// Sleep granularity of the poll loop.
    pub shutdown_slice: Duration,
}

impl GatewayConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            provenance_marker: DEFAULT_MARKER.to_string(),
            listener_poll: Duration::from_millis(100),
            shutdown_slice: Duration::from_millis(50),
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the provenance marker.
    pub fn with_provenance_marker(mut self, marker: impl Into<String>) -> Self {
        self.provenance_marker = marker.into();
        self
    }

    /// Sets the listener wake-up interval.
    pub fn with_listener_poll(mut self, interval: Duration) -> Self {
        self.listener_poll = interval;
        self
    }

    /// Sets the poll loop sleep granularity.
    pub fn with_shutdown_slice(mut self, slice: Duration) -> Self {
        self.shutdown_slice = slice;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}
