use std::time::Duration;

use pktlink_frame::FrameConfig;

/// Per-connection behavior.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Longest a worker blocks waiting for input before checking timers and
    /// the shutdown flag.
    pub poll_timeout: Duration,
    /// Minimum spacing between status publications.
    pub status_interval: Duration,
    /// Framing options for both directions.
    pub frame: FrameConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            status_interval: Duration::from_millis(100),
            frame: FrameConfig::default(),
        }
    }
}
