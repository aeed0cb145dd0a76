//! Pre-flight checks run against the latest status snapshot before a write is built.
//!
//! Every check fails with [`Error::Validation`] and never touches the transport.

use crate::error::{Error, Result};
use crate::protocol::*;
use std::fmt::Display;

fn admitted(what: &str, known: bool, value: impl Display) -> Result<()> {
    if !known {
        return Err(Error::validation(format!("{value} is not a valid {what}")));
    }
    Ok(())
}

pub fn key_lock(value: KeyLock) -> Result<()> {
    admitted("key lock", value.is_known(), value)
}

pub fn operation_mode(status: &Status, mode: OperationMode) -> Result<()> {
    admitted("operation mode", mode.is_known(), mode)?;
    if mode == OperationMode::Fan && status.fan_mode == FanMode::Auto {
        return Err(Error::validation(
            "Can't set operation mode to fan while fan mode is auto",
        ));
    }
    Ok(())
}

pub fn fan_mode(status: &Status, fan: FanMode) -> Result<()> {
    admitted("fan mode", fan.is_known(), fan)?;
    if fan == FanMode::Auto && status.operation_mode == OperationMode::Fan {
        return Err(Error::validation(
            "Can't set fan mode to auto while operation mode is fan",
        ));
    }
    Ok(())
}

pub fn target_temp(status: &Status, temp: u8) -> Result<()> {
    let (min, max) = match status.operation_mode {
        OperationMode::Fan => {
            return Err(Error::validation(
                "Can't set a target temperature in fan operation mode",
            ))
        }
        OperationMode::Heat => (status.heating_min_temp, status.heating_max_temp),
        OperationMode::Cool => (status.cooling_min_temp, status.cooling_max_temp),
        OperationMode::Unknown(_) => {
            return Err(Error::validation(format!(
                "Can't set a target temperature in {} operation mode",
                status.operation_mode
            )))
        }
    };
    if temp < min || temp > max {
        return Err(Error::validation(format!(
            "Target temperature {temp}° out of range {min}°..{max}° for {} mode",
            status.operation_mode
        )));
    }
    Ok(())
}

pub fn hysteresis(value: Hysteresis) -> Result<()> {
    admitted("hysteresis", value.is_known(), value)
}

pub fn calibration(value: f32) -> Result<()> {
    if !value.is_finite() || !(CALIBRATION_MIN..=CALIBRATION_MAX).contains(&value) {
        return Err(Error::validation(format!(
            "Calibration {value} out of range {CALIBRATION_MIN}..{CALIBRATION_MAX}"
        )));
    }
    Ok(())
}

pub fn fan_control(value: FanControl) -> Result<()> {
    admitted("fan control", value.is_known(), value)
}

pub fn frost_protection(value: FrostProtection) -> Result<()> {
    admitted("frost protection", value.is_known(), value)
}

pub fn schedule(value: WeeklySchedule) -> Result<()> {
    admitted("weekly schedule", value.is_known(), value)
}

fn max_temp(label: &str, value: u8, current_min: u8, target: u8) -> Result<()> {
    if value > MAX_TEMP {
        return Err(Error::validation(format!(
            "Can't set {label} maximum temperature ({value}°) higher than device's maximum ({MAX_TEMP}°)"
        )));
    }
    if value < MIN_TEMP {
        return Err(Error::validation(format!(
            "Can't set {label} maximum temperature ({value}°) lower than device's minimum ({MIN_TEMP}°)"
        )));
    }
    if value < current_min {
        return Err(Error::validation(format!(
            "Can't set {label} maximum temperature ({value}°) lower than minimum ({current_min}°)"
        )));
    }
    if value < target {
        return Err(Error::validation(format!(
            "Can't set {label} maximum temperature ({value}°) lower than target ({target}°)"
        )));
    }
    Ok(())
}

fn min_temp(label: &str, value: u8, current_max: u8, target: u8) -> Result<()> {
    if value < MIN_TEMP {
        return Err(Error::validation(format!(
            "Can't set {label} minimum temperature ({value}°) lower than device's minimum ({MIN_TEMP}°)"
        )));
    }
    if value > MAX_TEMP {
        return Err(Error::validation(format!(
            "Can't set {label} minimum temperature ({value}°) higher than device's maximum ({MAX_TEMP}°)"
        )));
    }
    if value > current_max {
        return Err(Error::validation(format!(
            "Can't set {label} minimum temperature ({value}°) higher than maximum ({current_max}°)"
        )));
    }
    if value > target {
        return Err(Error::validation(format!(
            "Can't set {label} minimum temperature ({value}°) higher than target ({target}°)"
        )));
    }
    Ok(())
}

pub fn cooling_max_temp(status: &Status, value: u8) -> Result<()> {
    max_temp("cooling", value, status.cooling_min_temp, status.target_temp)
}

pub fn cooling_min_temp(status: &Status, value: u8) -> Result<()> {
    min_temp("cooling", value, status.cooling_max_temp, status.target_temp)
}

pub fn heating_max_temp(status: &Status, value: u8) -> Result<()> {
    max_temp("heating", value, status.heating_min_temp, status.target_temp)
}

pub fn heating_min_temp(status: &Status, value: u8) -> Result<()> {
    min_temp("heating", value, status.heating_max_temp, status.target_temp)
}

pub fn clock(clock: &Clock) -> Result<()> {
    if clock.hour > 23 || clock.minute > 59 || clock.second > 59 {
        return Err(Error::validation(format!("Invalid time of day {clock}")));
    }
    if !(1..=7).contains(&clock.weekday) {
        return Err(Error::validation(format!(
            "Invalid weekday {}, expected 1 (Monday) to 7 (Sunday)",
            clock.weekday
        )));
    }
    Ok(())
}

/// Checks `value` for `edge` against its neighbours in the snapshot: the four edges must
/// strictly increase across the day.
pub fn period_edge(status: &Status, edge: ScheduleEdge, value: &PeriodEdge) -> Result<()> {
    if value.hour > 23 || value.minute > 59 {
        return Err(Error::validation(format!(
            "Invalid time {:02}:{:02} for {edge}",
            value.hour, value.minute
        )));
    }
    if let Some(previous) = edge.previous() {
        let bound = status.period(previous);
        if value.time() <= bound.time() {
            return Err(Error::validation(format!(
                "{edge} ({:02}:{:02}) must be later than {previous} ({:02}:{:02})",
                value.hour, value.minute, bound.hour, bound.minute
            )));
        }
    }
    if let Some(next) = edge.next() {
        let bound = status.period(next);
        if value.time() >= bound.time() {
            return Err(Error::validation(format!(
                "{edge} ({:02}:{:02}) must be earlier than {next} ({:02}:{:02})",
                value.hour, value.minute, bound.hour, bound.minute
            )));
        }
    }
    Ok(())
}
