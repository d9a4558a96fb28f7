use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::ScaleConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::constants::{Command, StopCondition, MODEL};
use crate::error::{Result, ScaleError};
use crate::state::{DeviceStateSnapshot, Readings, Setting, SettingKind, SupportedSettings};
use crate::transport::{Endpoint, Transport};

/// A Bookoo Themis Ultra scale.
///
/// Actions connect on demand and queue their command; they return once the
/// command is queued, not once it is written.
pub struct BookooScale<T: Transport> {
    connection: Arc<ConnectionManager<T>>,
    name: Option<String>,
    supported: SupportedSettings,
    enqueue_lock: Mutex<()>,
}

impl<T: Transport> BookooScale<T> {
    pub fn new(transport: Arc<T>, address: impl Into<String>) -> Self {
        Self::with_config(transport, address, ScaleConfig::default())
    }

    pub fn with_config(transport: Arc<T>, address: impl Into<String>, config: ScaleConfig) -> Self {
        Self {
            connection: Arc::new(ConnectionManager::new(transport, address, config)),
            name: None,
            supported: SupportedSettings::themis_ultra(),
            enqueue_lock: Mutex::new(()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_supported_settings(mut self, supported: SupportedSettings) -> Self {
        self.supported = supported;
        self
    }

    /// Called after every telemetry update and on link loss.
    pub fn set_notify_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.connection.device().set_notify_hook(hook);
    }

    pub fn address(&self) -> String {
        self.connection.address().to_uppercase()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn model(&self) -> &'static str {
        MODEL
    }

    pub fn supported_settings(&self) -> &SupportedSettings {
        &self.supported
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    /// Reconnect on its own after a link loss, once per reconnect cooldown,
    /// until [`disconnect`](Self::disconnect) is called.
    pub fn spawn_keep_alive(&self) -> JoinHandle<()> {
        let interval = self.connection.config().reconnect_cooldown;
        self.connection.spawn_keep_alive(interval)
    }

    pub fn handle_link_lost(&self, notify: bool) {
        self.connection.handle_link_lost(notify)
    }

    pub fn connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn pending_commands(&self) -> usize {
        self.connection.dispatcher().map_or(0, |d| d.pending())
    }

    pub fn weight(&self) -> Option<f64> {
        self.connection.device().weight()
    }

    pub fn timer(&self) -> Option<f64> {
        self.connection.device().timer()
    }

    pub fn flow_rate(&self) -> Option<f64> {
        self.connection.device().flow_rate()
    }

    pub fn flow_rate_smoothing(&self) -> Option<bool> {
        self.device_state().map(|d| d.flow_rate_smoothing != 0)
    }

    pub fn stop_condition(&self) -> Option<StopCondition> {
        self.device_state()
            .and_then(|d| StopCondition::from_value(d.stop_condition))
    }

    pub fn device_state(&self) -> Option<DeviceStateSnapshot> {
        self.connection.device().device_state()
    }

    pub fn readings(&self) -> Option<Arc<Readings>> {
        self.connection.device().readings()
    }

    /// Current value of a setting, if the scale has reported one and supports it.
    pub fn setting(&self, kind: SettingKind) -> Option<Setting> {
        if !self.supported.supports(kind) {
            return None;
        }
        self.device_state().map(|d| d.setting(kind))
    }

    pub async fn tare(&self) -> Result<()> {
        self.send(Command::Tare).await
    }

    pub async fn start_timer(&self) -> Result<()> {
        self.send(Command::StartTimer).await
    }

    pub async fn stop_timer(&self) -> Result<()> {
        self.send(Command::StopTimer).await
    }

    pub async fn reset_timer(&self) -> Result<()> {
        self.send(Command::ResetTimer).await
    }

    pub async fn tare_and_start_timer(&self) -> Result<()> {
        self.send(Command::TareAndStartTimer).await
    }

    /// Beeper volume, 0 (silent) to 5.
    pub async fn set_beep_level(&self, level: u8) -> Result<()> {
        check_range("beep level", level, self.supported.beep_levels.as_ref())?;
        self.send(Command::SetBeepLevel(level)).await
    }

    /// Minutes of inactivity before the scale switches itself off, 5 to 30.
    pub async fn set_auto_off_duration(&self, minutes: u8) -> Result<()> {
        check_range("auto-off minutes", minutes, self.supported.auto_off_minutes.as_ref())?;
        self.send(Command::SetAutoOff(minutes)).await
    }

    pub async fn set_flow_rate_smoothing(&self, enabled: bool) -> Result<()> {
        if !self.supported.flow_smoothing {
            return Err(ScaleError::Unsupported("flow rate smoothing"));
        }
        self.send(Command::SetFlowSmoothing(enabled)).await
    }

    pub async fn calibrate(&self) -> Result<()> {
        self.send(Command::Calibrate).await
    }

    pub async fn set_auto_mode_stop_condition(&self, condition: StopCondition) -> Result<()> {
        if !self.supported.stop_condition {
            return Err(ScaleError::Unsupported("stop condition"));
        }
        self.send(Command::SetStopCondition(condition)).await
    }

    pub async fn apply_setting(&self, setting: Setting) -> Result<()> {
        match setting {
            Setting::BeepLevel(level) => self.set_beep_level(level).await,
            Setting::AutoOffMinutes(minutes) => self.set_auto_off_duration(minutes).await,
            Setting::FlowSmoothing(enabled) => self.set_flow_rate_smoothing(enabled).await,
            Setting::StopCondition(condition) => self.set_auto_mode_stop_condition(condition).await,
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        // held across connect-and-enqueue only, never across the write
        let _guard = self.enqueue_lock.lock().await;
        if !self.connection.is_connected() {
            self.connection.connect().await?;
        }
        let dispatcher = self.connection.dispatcher().ok_or(ScaleError::NotConnected)?;
        debug!(command = command.name(), "sending command");
        dispatcher.enqueue(Endpoint::Command, command.encode())
    }
}

fn check_range(setting: &'static str, value: u8, range: Option<&RangeInclusive<u8>>) -> Result<()> {
    let range = range.ok_or(ScaleError::Unsupported(setting))?;
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ScaleError::OutOfRange {
            setting,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}
