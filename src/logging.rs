use tracing::{debug, trace, warn};
use tracing_subscriber::EnvFilter;

use crate::decoding::TelemetryFrame;
use crate::error::DecodeError;

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bookoo_ultra={default_level},{default_level}")));
    // a second init (tests, embedding apps) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

impl TelemetryFrame {
    pub(crate) fn log(&self) {
        trace!(
            weight = self.weight_grams,
            unit = self.unit.symbol(),
            timer = self.timer_seconds,
            flow_rate = self.flow_rate,
            battery = self.battery_percent,
            standby = self.standby_minutes,
            buzzer = self.buzzer_gear,
            smoothing = self.flow_smoothing,
            stop_condition = self.stop_condition,
            "telemetry"
        );
    }
}

impl DecodeError {
    /// Length errors are routine on this characteristic; anything else
    /// means a corrupted or unknown frame.
    pub(crate) fn log(&self, buffer: &[u8]) {
        match self {
            DecodeError::FrameTooShort { .. } | DecodeError::FrameTooLong { .. } => {
                debug!("{self}: {buffer:02X?}")
            }
            _ => warn!("{self}: {buffer:02X?}"),
        }
    }
}
