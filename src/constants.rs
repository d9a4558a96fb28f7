use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

pub const HEADER1: u8 = 0xaa;
pub const HEADER2: u8 = 0x55;

pub const PRODUCT_ID: u8 = 0xb1;
pub const COMMAND_TYPE: u8 = 0x0b;

pub const TELEMETRY_LEN: usize = 20;
pub const COMMAND_LEN: usize = 6;

pub const SERVICE_UUID: Uuid = uuid_from_u16(0xFFE0);
pub const WEIGHT_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0xFF11);
pub const COMMAND_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0xFF12);

/// Advertised local-name prefixes of Themis scales.
pub const SCALE_NAME_PREFIXES: [&str; 2] = ["BOOKOO_SC", "BOOKOO"];

pub const MODEL: &str = "Themis";

pub(crate) const SIGN_PLUS: u8 = 0x2b;
pub(crate) const SIGN_NONE: u8 = 0x00;
pub(crate) const SIGN_MINUS: u8 = 0x2d;

pub const BEEP_LEVEL_MIN: u8 = 0;
pub const BEEP_LEVEL_MAX: u8 = 5;
pub const AUTO_OFF_MIN: u8 = 5;
pub const AUTO_OFF_MAX: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Grams,
    Ounces,
}

impl Unit {
    pub fn value(&self) -> u8 {
        match *self {
            Unit::Ounces => 0x01,
            Unit::Grams => 0x02,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match *self {
            Unit::Grams => "g",
            Unit::Ounces => "oz",
        }
    }
}

impl TryFrom<u8> for Unit {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Unit::Ounces),
            0x02 => Ok(Unit::Grams),
            other => Err(other),
        }
    }
}

/// What ends a shot in the scale's automatic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopCondition {
    FlowStopped,
    ContainerRemoved,
}

impl StopCondition {
    pub fn value(&self) -> u8 {
        match *self {
            StopCondition::FlowStopped => 0,
            StopCondition::ContainerRemoved => 1,
        }
    }

    pub fn from_value(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StopCondition::FlowStopped),
            1 => Some(StopCondition::ContainerRemoved),
            _ => None,
        }
    }
}

/// Host-to-scale instructions. Arguments are validated by the scale
/// actions before one of these is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Tare,
    SetBeepLevel(u8),
    SetAutoOff(u8),
    StartTimer,
    StopTimer,
    ResetTimer,
    TareAndStartTimer,
    SetFlowSmoothing(bool),
    Calibrate,
    SetStopCondition(StopCondition),
}

impl Command {
    pub fn code(&self) -> u8 {
        match *self {
            Command::Tare => 0x01,
            Command::SetBeepLevel(_) => 0x02,
            Command::SetAutoOff(_) => 0x03,
            Command::StartTimer => 0x04,
            Command::StopTimer => 0x05,
            Command::ResetTimer => 0x06,
            Command::TareAndStartTimer => 0x07,
            Command::SetFlowSmoothing(_) => 0x08,
            Command::Calibrate => 0x09,
            Command::SetStopCondition(_) => 0x0b,
        }
    }

    /// `(data2, data3)` for this command.
    pub fn data(&self) -> (u8, u8) {
        match *self {
            Command::SetBeepLevel(level) => (0, level),
            Command::SetAutoOff(minutes) => (0, minutes),
            Command::SetFlowSmoothing(enabled) => (u8::from(enabled), 0),
            Command::SetStopCondition(condition) => (condition.value(), 0),
            _ => (0, 0),
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Command::Tare => "tare",
            Command::SetBeepLevel(_) => "set beep level",
            Command::SetAutoOff(_) => "set auto-off",
            Command::StartTimer => "start timer",
            Command::StopTimer => "stop timer",
            Command::ResetTimer => "reset timer",
            Command::TareAndStartTimer => "tare and start timer",
            Command::SetFlowSmoothing(_) => "set flow smoothing",
            Command::Calibrate => "calibrate",
            Command::SetStopCondition(_) => "set stop condition",
        }
    }
}
