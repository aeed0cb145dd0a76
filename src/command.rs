//! Logical changes to the device state.
//!
//! A [`Change`] is checked against a fresh status snapshot and turned into the command
//! bytes of the one write that carries it. The blocking and async facades share this path.

use crate::error::Result;
use crate::protocol::*;
use crate::validation;
use std::fmt;

/// Partial update of one schedule period edge; unset fields keep the device value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodUpdate {
    pub enabled: Option<bool>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
}

impl PeriodUpdate {
    pub fn new(enabled: Option<bool>, hour: Option<u8>, minute: Option<u8>) -> Self {
        Self {
            enabled,
            hour,
            minute,
        }
    }

    pub fn apply_to(&self, current: &PeriodEdge) -> PeriodEdge {
        PeriodEdge {
            enabled: self.enabled.unwrap_or(current.enabled),
            hour: self.hour.unwrap_or(current.hour),
            minute: self.minute.unwrap_or(current.minute),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
    KeyLock(KeyLock),
    Power(bool),
    OperationMode(OperationMode),
    FanMode(FanMode),
    TargetTemp(u8),
    Hysteresis(Hysteresis),
    Calibration(f32),
    CoolingMaxTemp(u8),
    CoolingMinTemp(u8),
    HeatingMaxTemp(u8),
    HeatingMinTemp(u8),
    FanControl(FanControl),
    FrostProtection(FrostProtection),
    Clock(Clock),
    Schedule(WeeklySchedule),
    Period(ScheduleEdge, PeriodUpdate),
}

impl Change {
    /// Validates the change against `status` and builds the write command.
    ///
    /// Writes cover whole words or blocks, so every other field in the written block is
    /// taken from `status`.
    pub fn request(&self, status: &Status) -> Result<Vec<u8>> {
        let mut options = status.options();
        let request = match *self {
            Change::KeyLock(key_lock) => {
                validation::key_lock(key_lock)?;
                let remote_lock = key_lock != KeyLock::AllUnlocked;
                SetLockPower::request(remote_lock, key_lock, status.power_state)
            }
            Change::Power(power) => {
                SetLockPower::request(status.remote_lock, status.key_lock, power)
            }
            Change::OperationMode(mode) => {
                validation::operation_mode(status, mode)?;
                SetModeFan::request(mode, status.fan_mode)
            }
            Change::FanMode(fan) => {
                validation::fan_mode(status, fan)?;
                SetModeFan::request(status.operation_mode, fan)
            }
            Change::TargetTemp(temp) => {
                validation::target_temp(status, temp)?;
                SetTargetTemp::request(temp)
            }
            Change::Hysteresis(hysteresis) => {
                validation::hysteresis(hysteresis)?;
                options.hysteresis = hysteresis;
                SetOptions::request(&options)
            }
            Change::Calibration(calibration) => {
                validation::calibration(calibration)?;
                options.calibration = calibration;
                SetOptions::request(&options)
            }
            Change::CoolingMaxTemp(temp) => {
                validation::cooling_max_temp(status, temp)?;
                options.cooling_max_temp = temp;
                SetOptions::request(&options)
            }
            Change::CoolingMinTemp(temp) => {
                validation::cooling_min_temp(status, temp)?;
                options.cooling_min_temp = temp;
                SetOptions::request(&options)
            }
            Change::HeatingMaxTemp(temp) => {
                validation::heating_max_temp(status, temp)?;
                options.heating_max_temp = temp;
                SetOptions::request(&options)
            }
            Change::HeatingMinTemp(temp) => {
                validation::heating_min_temp(status, temp)?;
                options.heating_min_temp = temp;
                SetOptions::request(&options)
            }
            Change::FanControl(fan_control) => {
                validation::fan_control(fan_control)?;
                options.fan_control = fan_control;
                SetOptions::request(&options)
            }
            Change::FrostProtection(frost_protection) => {
                validation::frost_protection(frost_protection)?;
                options.frost_protection = frost_protection;
                SetOptions::request(&options)
            }
            Change::Clock(clock) => {
                validation::clock(&clock)?;
                SetTime::request(&clock)
            }
            Change::Schedule(schedule) => {
                validation::schedule(schedule)?;
                SetWeeklySchedule::request(schedule)
            }
            Change::Period(edge, update) => {
                let value = update.apply_to(&status.period(edge));
                validation::period_edge(status, edge, &value)?;
                let mut periods = status.periods();
                periods[edge.index()] = value;
                SetDailySchedule::request(&periods)
            }
        };
        Ok(request)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Change::KeyLock(v) => write!(f, "key lock {v}"),
            Change::Power(v) => write!(f, "power {}", if *v { "on" } else { "off" }),
            Change::OperationMode(v) => write!(f, "operation mode {v}"),
            Change::FanMode(v) => write!(f, "fan mode {v}"),
            Change::TargetTemp(v) => write!(f, "target temperature {v}°"),
            Change::Hysteresis(v) => write!(f, "hysteresis {v}°"),
            Change::Calibration(v) => write!(f, "calibration {v}°"),
            Change::CoolingMaxTemp(v) => write!(f, "cooling maximum {v}°"),
            Change::CoolingMinTemp(v) => write!(f, "cooling minimum {v}°"),
            Change::HeatingMaxTemp(v) => write!(f, "heating maximum {v}°"),
            Change::HeatingMinTemp(v) => write!(f, "heating minimum {v}°"),
            Change::FanControl(v) => write!(f, "fan control {v}"),
            Change::FrostProtection(v) => write!(f, "frost protection {v}"),
            Change::Clock(v) => write!(f, "clock {v}"),
            Change::Schedule(v) => write!(f, "weekly schedule {v}"),
            Change::Period(edge, update) => write!(f, "{edge} {update:?}"),
        }
    }
}
