//! Client configuration.

use std::time::Duration;

/// Default time allowed for the transport to open.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for the close frame to flush on a local close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default outbound channel capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Tunables for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connecting fails with `Closed` if the transport is not open by then.
    pub open_timeout: Duration,
    /// Upper bound on flushing the close frame before the transport is dropped.
    pub close_timeout: Duration,
    /// Frames queued for the writer task before `send` waits.
    pub outbound_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.open_timeout, DEFAULT_OPEN_TIMEOUT);
        assert_eq!(config.close_timeout, DEFAULT_CLOSE_TIMEOUT);
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
    }
}
