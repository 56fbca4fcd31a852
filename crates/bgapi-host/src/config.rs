//! Host client configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Timeouts and tunables for the host client.
///
/// BGAPI defines no native timeout notification, so every suspension
/// point carries a client-side deadline: a silently dead link must fail
/// the pending operation instead of hanging it forever.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HostConfig {
    /// Maximum time to wait for the response to a single command.
    pub command_timeout: Duration,
    /// Maximum time to wait for a connection to be established.
    pub connect_timeout: Duration,
    /// Maximum time for one discovery/read/write procedure to complete.
    pub procedure_timeout: Duration,
    /// Connection interval range requested on connect, in 1.25ms units.
    pub conn_interval: (u16, u16),
    /// Supervision timeout requested on connect, in 10ms units.
    pub supervision_timeout: u16,
    /// Slave latency requested on connect.
    pub latency: u16,
    /// Capacity of each per-class event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            procedure_timeout: Duration::from_secs(15),
            conn_interval: (0x0020, 0x0030),
            supervision_timeout: 100,
            latency: 0,
            event_channel_capacity: 64,
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-command response timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the connection-establishment timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the multi-round-trip procedure timeout
    pub fn with_procedure_timeout(mut self, timeout: Duration) -> Self {
        self.procedure_timeout = timeout;
        self
    }
}
