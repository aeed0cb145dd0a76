//! Blocking client for a Hysen 2-pipe fan coil controller.
//!
//! # Example
//!
//! ```
//! use hysen2pfc_lib::{emulator::Emulator, Hysen2pfc, OperationMode};
//! use std::time::Duration;
//!
//! let mut device = Hysen2pfc::new(Emulator::default());
//! device.set_timeout(Duration::from_millis(500));
//! device.connect()?;
//!
//! device.set_operation_mode(OperationMode::Heat)?;
//! device.set_target_temp(24)?;
//! let status = device.get_status()?;
//! assert_eq!(status.target_temp, 24);
//! # Ok::<(), hysen2pfc_lib::Error>(())
//! ```

use crate::command::{Change, PeriodUpdate};
use crate::error::{Error, Result};
use crate::protocol::*;
use crate::transport::{ConnectionState, Transport};
use chrono::{Datelike, Timelike};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Hysen2pfc<T: Transport> {
    transport: T,
    timeout: Duration,
    status: Status,
    state: ConnectionState,
}

impl<T: Transport> Hysen2pfc<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            status: Status::default(),
            state: ConnectionState::Disconnected,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Opens the transport session.
    pub fn connect(&mut self) -> Result<()> {
        match self.transport.connect(self.timeout) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err.into())
            }
        }
    }

    fn round_trip(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_request(request);
        log::trace!("send: {:02X?}", frame);
        let raw = self
            .transport
            .send_packet(PACKET_TYPE, &frame, self.timeout)
            .map_err(Error::from)
            .inspect_err(|err| {
                if matches!(err, Error::Connection(_)) {
                    self.state = ConnectionState::Disconnected;
                }
            })?;
        let transport = &self.transport;
        let payload = decode_response(request, &raw, |p| transport.decrypt(p))?;
        log::trace!("receive: {:02X?}", payload);
        Ok(payload)
    }

    /// Cached status from the last successful read.
    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn get_status(&mut self) -> Result<Status> {
        let payload = self.round_trip(&Status::request())?;
        let status = Status::decode(&payload)?;
        self.status = status.clone();
        Ok(status)
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.get_status().map(|_| ())
    }

    /// Re-reads the device, checks `change` against that state and writes it.
    ///
    /// The cached status is not updated from the write, call [`Self::get_status`] to see
    /// the result.
    pub fn apply(&mut self, change: Change) -> Result<()> {
        log::debug!("Apply {change}");
        self.refresh()?;
        let request = change.request(&self.status)?;
        self.round_trip(&request)?;
        Ok(())
    }

    pub fn set_key_lock(&mut self, key_lock: KeyLock) -> Result<()> {
        self.apply(Change::KeyLock(key_lock))
    }

    pub fn set_power(&mut self, power: bool) -> Result<()> {
        self.apply(Change::Power(power))
    }

    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()> {
        self.apply(Change::OperationMode(mode))
    }

    pub fn set_fan_mode(&mut self, fan: FanMode) -> Result<()> {
        self.apply(Change::FanMode(fan))
    }

    pub fn set_target_temp(&mut self, temp: u8) -> Result<()> {
        self.apply(Change::TargetTemp(temp))
    }

    pub fn set_hysteresis(&mut self, hysteresis: Hysteresis) -> Result<()> {
        self.apply(Change::Hysteresis(hysteresis))
    }

    pub fn set_calibration(&mut self, calibration: f32) -> Result<()> {
        self.apply(Change::Calibration(calibration))
    }

    pub fn set_cooling_max_temp(&mut self, temp: u8) -> Result<()> {
        self.apply(Change::CoolingMaxTemp(temp))
    }

    pub fn set_cooling_min_temp(&mut self, temp: u8) -> Result<()> {
        self.apply(Change::CoolingMinTemp(temp))
    }

    pub fn set_heating_max_temp(&mut self, temp: u8) -> Result<()> {
        self.apply(Change::HeatingMaxTemp(temp))
    }

    pub fn set_heating_min_temp(&mut self, temp: u8) -> Result<()> {
        self.apply(Change::HeatingMinTemp(temp))
    }

    pub fn set_fan_control(&mut self, fan_control: FanControl) -> Result<()> {
        self.apply(Change::FanControl(fan_control))
    }

    pub fn set_frost_protection(&mut self, frost_protection: FrostProtection) -> Result<()> {
        self.apply(Change::FrostProtection(frost_protection))
    }

    pub fn set_time(&mut self, clock: Clock) -> Result<()> {
        self.apply(Change::Clock(clock))
    }

    /// Sets the device clock from a host timestamp.
    pub fn sync_clock<D: Datelike + Timelike>(&mut self, now: &D) -> Result<()> {
        self.set_time(Clock::from_datetime(now))
    }

    pub fn set_schedule(&mut self, schedule: WeeklySchedule) -> Result<()> {
        self.apply(Change::Schedule(schedule))
    }

    pub fn set_period1_on(&mut self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period1On, update))
    }

    pub fn set_period1_off(&mut self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period1Off, update))
    }

    pub fn set_period2_on(&mut self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period2On, update))
    }

    pub fn set_period2_off(&mut self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period2Off, update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{Emulator, Fault};

    fn device(status: &Status) -> (Hysen2pfc<Emulator>, Emulator) {
        let emulator = Emulator::new(status);
        (Hysen2pfc::new(emulator.clone()), emulator)
    }

    #[test]
    fn connect_tracks_state() {
        let (mut device, emulator) = device(&Status::default());
        assert_eq!(device.connection_state(), ConnectionState::Disconnected);
        device.connect().unwrap();
        assert_eq!(device.connection_state(), ConnectionState::Connected);
        assert!(emulator.is_connected());

        emulator.inject(Fault::Connection);
        assert!(matches!(device.get_status(), Err(Error::Connection(_))));
        assert_eq!(device.connection_state(), ConnectionState::Disconnected);

        emulator.inject(Fault::Connection);
        assert!(device.connect().is_err());
        device.connect().unwrap();
        assert_eq!(device.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn setter_refreshes_first() {
        let (mut device, emulator) = device(&Status::default());
        device.set_power(false).unwrap();
        assert_eq!(
            emulator.requests(),
            vec![Status::request(), vec![0x01, 0x06, 0x00, 0x00, 0x00, 0x00]]
        );
        // the cache holds the state read before the write
        assert!(device.status().power_state);
        assert!(!device.get_status().unwrap().power_state);
    }

    #[test]
    fn failed_read_keeps_cache() {
        let status = Status {
            target_temp: 25,
            ..Default::default()
        };
        let (mut device, emulator) = device(&status);
        device.refresh().unwrap();
        emulator.set_status(&Status::default());
        emulator.inject(Fault::CorruptChecksum);
        assert!(matches!(device.get_status(), Err(Error::Checksum { .. })));
        assert_eq!(device.status().target_temp, 25);
    }

    #[test]
    fn sync_clock_writes_host_time() {
        let (mut device, emulator) = device(&Status::default());
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(7, 45, 30)
            .unwrap();
        device.sync_clock(&now).unwrap();
        let status = device.get_status().unwrap();
        assert!(!status.clock_drifted(&Clock::from_datetime(&now)));
        assert_eq!(status.clock_weekday, 3);
        assert_eq!(emulator.requests()[1], vec![0x01, 0x10, 0x00, 0x07, 0x00, 0x02, 0x04, 0x07, 0x2D, 0x1E, 0x03]);
    }
}
