//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tunables for the transport and correlator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client-side timeout applied to non-blocking operations.
    ///
    /// `None` (the default) waits for the engine indefinitely. Blocking
    /// operations (`waitForIncomingMessage`, `waitForInvite`) ignore this.
    pub request_timeout: Option<Duration>,
    /// Capacity of the shared broadcast bus.
    pub bus_capacity: usize,
    /// Capacity of each link's inbound and outbound queues.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { request_timeout: None, bus_capacity: 1024, channel_capacity: 256 }
    }
}

impl ClientConfig {
    /// Timeout for `op` under this configuration.
    pub fn timeout_for(&self, op: parley_proto::Operation) -> Option<Duration> {
        if op.is_blocking() { None } else { self.request_timeout }
    }
}
