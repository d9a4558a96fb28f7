use std::time::Duration;

/// Timing and buffering knobs for one scale.
///
/// The defaults are the values the device needs; tests shrink or pause them.
#[derive(Debug, Clone)]
pub struct ScaleConfig {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// Pause after each command write. The scale drops commands sent closer together.
    pub command_spacing: Duration,
    /// Minimum time between a link loss and the next connection attempt.
    pub reconnect_cooldown: Duration,
    pub settle_delay: Duration,
    pub notification_buffer: usize,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            write_timeout: Duration::from_secs(5),
            command_spacing: Duration::from_millis(100),
            reconnect_cooldown: Duration::from_secs(5),
            settle_delay: Duration::from_millis(100),
            notification_buffer: 32,
        }
    }
}

impl ScaleConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_command_spacing(mut self, spacing: Duration) -> Self {
        self.command_spacing = spacing;
        self
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_notification_buffer(mut self, capacity: usize) -> Self {
        self.notification_buffer = capacity.max(1);
        self
    }
}
