//! Request dispatch configuration.

use std::time::Duration;

/// Limits applied to every channel and pending request of one event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestConfig {
    /// Capacity of each channel's outbound queue.
    pub queue_size: usize,
    /// Age after which a pending request is reaped.
    pub request_timeout: Duration,
    /// Interval between reaper sweeps.
    pub clear_interval: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            queue_size: 30,
            request_timeout: Duration::from_secs(5 * 60),
            clear_interval: Duration::from_secs(5 * 60),
        }
    }
}
