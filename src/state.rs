use std::ops::RangeInclusive;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::{
    StopCondition, Unit, AUTO_OFF_MAX, AUTO_OFF_MIN, BEEP_LEVEL_MAX, BEEP_LEVEL_MIN,
};
use crate::decoding::TelemetryFrame;

pub type NotifyHook = Arc<dyn Fn() + Send + Sync>;

/// Settings the scale reported in its last telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStateSnapshot {
    pub battery_level: u8,
    pub units: Unit,
    pub buzzer_gear: u8,
    pub auto_off_minutes: u16,
    pub flow_rate_smoothing: u8,
    pub stop_condition: u8,
}

impl DeviceStateSnapshot {
    pub fn weight_unit(&self) -> Unit {
        self.units
    }

    pub fn setting(&self, kind: SettingKind) -> Setting {
        match kind {
            SettingKind::BeepLevel => Setting::BeepLevel(self.buzzer_gear),
            SettingKind::AutoOffMinutes => {
                Setting::AutoOffMinutes(u8::try_from(self.auto_off_minutes).unwrap_or(u8::MAX))
            }
            SettingKind::FlowSmoothing => Setting::FlowSmoothing(self.flow_rate_smoothing != 0),
            SettingKind::StopCondition => Setting::StopCondition(
                StopCondition::from_value(self.stop_condition).unwrap_or(StopCondition::FlowStopped),
            ),
        }
    }
}

impl From<&TelemetryFrame> for DeviceStateSnapshot {
    fn from(frame: &TelemetryFrame) -> Self {
        Self {
            battery_level: frame.battery_percent,
            units: frame.unit,
            buzzer_gear: frame.buzzer_gear,
            auto_off_minutes: frame.standby_minutes,
            flow_rate_smoothing: frame.flow_smoothing,
            stop_condition: frame.stop_condition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKind {
    BeepLevel,
    AutoOffMinutes,
    FlowSmoothing,
    StopCondition,
}

/// A configurable value, tagged by what it configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    BeepLevel(u8),
    AutoOffMinutes(u8),
    FlowSmoothing(bool),
    StopCondition(StopCondition),
}

impl Setting {
    pub fn kind(&self) -> SettingKind {
        match self {
            Setting::BeepLevel(_) => SettingKind::BeepLevel,
            Setting::AutoOffMinutes(_) => SettingKind::AutoOffMinutes,
            Setting::FlowSmoothing(_) => SettingKind::FlowSmoothing,
            Setting::StopCondition(_) => SettingKind::StopCondition,
        }
    }
}

/// Which settings a scale model accepts, and in what range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedSettings {
    pub beep_levels: Option<RangeInclusive<u8>>,
    pub auto_off_minutes: Option<RangeInclusive<u8>>,
    pub flow_smoothing: bool,
    pub stop_condition: bool,
}

impl SupportedSettings {
    pub fn themis_ultra() -> Self {
        Self {
            beep_levels: Some(BEEP_LEVEL_MIN..=BEEP_LEVEL_MAX),
            auto_off_minutes: Some(AUTO_OFF_MIN..=AUTO_OFF_MAX),
            flow_smoothing: true,
            stop_condition: true,
        }
    }

    pub fn supports(&self, kind: SettingKind) -> bool {
        match kind {
            SettingKind::BeepLevel => self.beep_levels.is_some(),
            SettingKind::AutoOffMinutes => self.auto_off_minutes.is_some(),
            SettingKind::FlowSmoothing => self.flow_smoothing,
            SettingKind::StopCondition => self.stop_condition,
        }
    }
}

impl Default for SupportedSettings {
    fn default() -> Self {
        Self::themis_ultra()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub weight: f64,
    pub timer: f64,
    pub flow_rate: f64,
    pub device: DeviceStateSnapshot,
}

/// Latest telemetry of one scale.
///
/// Every frame replaces the whole `Readings` value under one lock, so readers
/// never see weight from one frame next to battery from another.
#[derive(Default)]
pub struct DeviceState {
    readings: RwLock<Option<Arc<Readings>>>,
    hook: RwLock<Option<NotifyHook>>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notify_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.write() = Some(Arc::new(hook));
    }

    pub fn clear_notify_hook(&self) {
        *self.hook.write() = None;
    }

    pub fn apply(&self, frame: &TelemetryFrame) {
        let readings = Readings {
            weight: frame.weight_grams,
            timer: frame.timer_seconds,
            flow_rate: frame.flow_rate,
            device: DeviceStateSnapshot::from(frame),
        };
        *self.readings.write() = Some(Arc::new(readings));
        self.notify();
    }

    /// Fire the hook without changing any reading.
    pub fn notify(&self) {
        // clone out so a hook that re-registers itself does not deadlock
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub fn readings(&self) -> Option<Arc<Readings>> {
        self.readings.read().clone()
    }

    pub fn weight(&self) -> Option<f64> {
        self.readings.read().as_ref().map(|r| r.weight)
    }

    pub fn timer(&self) -> Option<f64> {
        self.readings.read().as_ref().map(|r| r.timer)
    }

    pub fn flow_rate(&self) -> Option<f64> {
        self.readings.read().as_ref().map(|r| r.flow_rate)
    }

    pub fn device_state(&self) -> Option<DeviceStateSnapshot> {
        self.readings.read().as_ref().map(|r| r.device)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn frame(weight: f64, battery: u8) -> TelemetryFrame {
        TelemetryFrame {
            timer_seconds: 12.5,
            unit: Unit::Grams,
            weight_grams: weight,
            flow_rate: 1.25,
            battery_percent: battery,
            standby_minutes: 15,
            buzzer_gear: 2,
            flow_smoothing: 1,
            stop_condition: 0,
        }
    }

    #[test]
    fn empty_until_first_frame() {
        let state = DeviceState::new();
        assert!(state.weight().is_none());
        assert!(state.timer().is_none());
        assert!(state.flow_rate().is_none());
        assert!(state.device_state().is_none());
    }

    #[test]
    fn apply_replaces_everything_and_notifies_once() {
        let state = DeviceState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        state.set_notify_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.apply(&frame(18.2, 80));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        state.apply(&frame(36.4, 79));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(state.weight(), Some(36.4));
        assert_eq!(state.timer(), Some(12.5));
        let device = state.device_state().unwrap();
        assert_eq!(device.battery_level, 79);
        assert_eq!(device.weight_unit(), Unit::Grams);
        assert_eq!(device.auto_off_minutes, 15);
    }

    #[test]
    fn apply_without_hook_is_fine() {
        let state = DeviceState::new();
        state.apply(&frame(1.0, 50));
        state.notify();
        assert_eq!(state.weight(), Some(1.0));
    }

    #[test]
    fn settings_read_back_from_snapshot() {
        let snapshot = DeviceStateSnapshot::from(&frame(0.0, 100));
        assert_eq!(snapshot.setting(SettingKind::BeepLevel), Setting::BeepLevel(2));
        assert_eq!(snapshot.setting(SettingKind::AutoOffMinutes), Setting::AutoOffMinutes(15));
        assert_eq!(snapshot.setting(SettingKind::FlowSmoothing), Setting::FlowSmoothing(true));
        assert_eq!(
            snapshot.setting(SettingKind::StopCondition),
            Setting::StopCondition(StopCondition::FlowStopped)
        );
    }

    #[test]
    fn themis_supports_everything() {
        let supported = SupportedSettings::default();
        assert!(supported.supports(SettingKind::FlowSmoothing));
        assert_eq!(supported.beep_levels, Some(0..=5));
        assert_eq!(supported.auto_off_minutes, Some(5..=30));
    }
}
