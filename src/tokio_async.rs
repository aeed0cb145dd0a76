//! Asynchronous client for a Hysen 2-pipe fan coil controller, for applications built on
//! the Tokio runtime.
//!
//! All methods take `&self`. An internal mutex is held for the whole refresh, validate and
//! write sequence of a call, so concurrent callers are queued and never interleave their
//! requests on the half-duplex link. Every round trip is bounded by the configured timeout.
//!
//! # Example
//!
//! ```
//! use hysen2pfc_lib::{emulator::Emulator, tokio_async::Hysen2pfc, FanMode};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), hysen2pfc_lib::Error> {
//!     let mut device = Hysen2pfc::new(Emulator::default());
//!     device.set_timeout(Duration::from_millis(500));
//!     device.connect().await?;
//!
//!     device.set_fan_mode(FanMode::High).await?;
//!     println!("Status: {:?}", device.get_status().await?);
//!     Ok(())
//! }
//! ```

use crate::command::{Change, PeriodUpdate};
use crate::device::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::protocol::*;
use crate::transport::{AsyncTransport, ConnectionState};
use chrono::{Datelike, Timelike};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Inner<T> {
    transport: T,
    status: Status,
    state: ConnectionState,
}

impl<T: AsyncTransport> Inner<T> {
    async fn round_trip(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let frame = encode_request(request);
        log::trace!("send: {:02X?}", frame);
        let raw = match tokio::time::timeout(
            timeout,
            self.transport.send_packet(PACKET_TYPE, &frame),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                let err = Error::from(err);
                if matches!(err, Error::Connection(_)) {
                    self.state = ConnectionState::Disconnected;
                }
                return Err(err);
            }
            Err(_) => {
                log::debug!("Request timed out after {timeout:?}");
                return Err(Error::Timeout);
            }
        };
        let transport = &self.transport;
        let payload = decode_response(request, &raw, |p| transport.decrypt(p))?;
        log::trace!("receive: {:02X?}", payload);
        Ok(payload)
    }

    async fn get_status(&mut self, timeout: Duration) -> Result<Status> {
        let payload = self.round_trip(&Status::request(), timeout).await?;
        let status = Status::decode(&payload)?;
        self.status = status.clone();
        Ok(status)
    }
}

#[derive(Debug)]
pub struct Hysen2pfc<T: AsyncTransport> {
    inner: Mutex<Inner<T>>,
    timeout: Duration,
}

impl<T: AsyncTransport> Hysen2pfc<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                status: Status::default(),
                state: ConnectionState::Disconnected,
            }),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().transport
    }

    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let result = match tokio::time::timeout(self.timeout, inner.transport.connect()).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Timeout),
        };
        inner.state = if result.is_ok() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        result
    }

    /// Cached status from the last successful read.
    pub async fn status(&self) -> Status {
        self.inner.lock().await.status.clone()
    }

    pub async fn get_status(&self) -> Result<Status> {
        self.inner.lock().await.get_status(self.timeout).await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.get_status().await.map(|_| ())
    }

    /// Re-reads the device, checks `change` against that state and writes it, holding the
    /// lock throughout.
    pub async fn apply(&self, change: Change) -> Result<()> {
        log::debug!("Apply {change}");
        let mut inner = self.inner.lock().await;
        let status = inner.get_status(self.timeout).await?;
        let request = change.request(&status)?;
        inner.round_trip(&request, self.timeout).await?;
        Ok(())
    }

    pub async fn set_key_lock(&self, key_lock: KeyLock) -> Result<()> {
        self.apply(Change::KeyLock(key_lock)).await
    }

    pub async fn set_power(&self, power: bool) -> Result<()> {
        self.apply(Change::Power(power)).await
    }

    pub async fn set_operation_mode(&self, mode: OperationMode) -> Result<()> {
        self.apply(Change::OperationMode(mode)).await
    }

    pub async fn set_fan_mode(&self, fan: FanMode) -> Result<()> {
        self.apply(Change::FanMode(fan)).await
    }

    pub async fn set_target_temp(&self, temp: u8) -> Result<()> {
        self.apply(Change::TargetTemp(temp)).await
    }

    pub async fn set_hysteresis(&self, hysteresis: Hysteresis) -> Result<()> {
        self.apply(Change::Hysteresis(hysteresis)).await
    }

    pub async fn set_calibration(&self, calibration: f32) -> Result<()> {
        self.apply(Change::Calibration(calibration)).await
    }

    pub async fn set_cooling_max_temp(&self, temp: u8) -> Result<()> {
        self.apply(Change::CoolingMaxTemp(temp)).await
    }

    pub async fn set_cooling_min_temp(&self, temp: u8) -> Result<()> {
        self.apply(Change::CoolingMinTemp(temp)).await
    }

    pub async fn set_heating_max_temp(&self, temp: u8) -> Result<()> {
        self.apply(Change::HeatingMaxTemp(temp)).await
    }

    pub async fn set_heating_min_temp(&self, temp: u8) -> Result<()> {
        self.apply(Change::HeatingMinTemp(temp)).await
    }

    pub async fn set_fan_control(&self, fan_control: FanControl) -> Result<()> {
        self.apply(Change::FanControl(fan_control)).await
    }

    pub async fn set_frost_protection(&self, frost_protection: FrostProtection) -> Result<()> {
        self.apply(Change::FrostProtection(frost_protection)).await
    }

    pub async fn set_time(&self, clock: Clock) -> Result<()> {
        self.apply(Change::Clock(clock)).await
    }

    pub async fn sync_clock<D: Datelike + Timelike>(&self, now: &D) -> Result<()> {
        self.set_time(Clock::from_datetime(now)).await
    }

    pub async fn set_schedule(&self, schedule: WeeklySchedule) -> Result<()> {
        self.apply(Change::Schedule(schedule)).await
    }

    pub async fn set_period1_on(&self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period1On, update))
            .await
    }

    pub async fn set_period1_off(&self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period1Off, update))
            .await
    }

    pub async fn set_period2_on(&self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period2On, update))
            .await
    }

    pub async fn set_period2_off(&self, update: PeriodUpdate) -> Result<()> {
        self.apply(Change::Period(ScheduleEdge::Period2Off, update))
            .await
    }
}
