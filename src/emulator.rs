//! In-memory fan coil controller speaking the wire protocol behind the transport traits.
//!
//! The emulated device keeps the 16 register words, answers reads, applies writes with the
//! echo the real device sends, and replies with exception responses to malformed or unknown
//! commands. Packets are not encrypted, [`Transport::decrypt`] returns its input.
//!
//! Handles are cheap clones sharing one device, so a test can keep one handle to inject
//! faults and inspect traffic while a facade owns another.

use crate::protocol::*;
use crate::transport::{Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[cfg(feature = "tokio-async")]
use crate::transport::AsyncTransport;

const ROOM_TEMP_BYTE: usize = 4;
const VALVE_BYTE: usize = 1;
const VALVE_MASK: u8 = 1 << VALVE_BIT;
const VALVE_COUNTER_BYTES: std::ops::Range<usize> = 28..32;
/// Exchanges kept in the log, older ones are dropped first.
pub const EXCHANGE_LOG_CAPACITY: usize = 1024;

/// One-shot failure applied to the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No answer, the request is not executed.
    Timeout,
    /// The session drops, the request is not executed.
    Connection,
    /// The transport answers with a non-zero status code, the request is not executed.
    TransportCode(u16),
    /// The request is executed but the response CRC is damaged.
    CorruptChecksum,
    /// The request is executed but the echo is damaged.
    WrongEcho,
    /// The device rejects the request with the given exception code.
    Exception(ExceptionCode),
}

/// One request executed by the emulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Command bytes, unwrapped from the request frame.
    pub request: Vec<u8>,
    /// Command payload of the response, before framing.
    pub response: Vec<u8>,
}

#[derive(Debug)]
struct Device {
    registers: [u8; 32],
    faults: VecDeque<Fault>,
    exchanges: VecDeque<Exchange>,
    latency: Duration,
    connected: bool,
}

impl Device {
    fn read(&self, register: u8, words: u8) -> Vec<u8> {
        let start = 2 * register as usize;
        let end = start + 2 * words as usize;
        let mut payload = vec![HEADER, FUNCTION_READ, 2 * words];
        payload.extend_from_slice(&self.registers[start..end]);
        payload
    }

    fn write(&mut self, register: u8, data: &[u8]) {
        let start = 2 * register as usize;
        for (address, value) in (start..).zip(data.iter().copied()) {
            match address {
                ROOM_TEMP_BYTE => {}
                VALVE_BYTE => {
                    self.registers[address] =
                        (value & !VALVE_MASK) | (self.registers[address] & VALVE_MASK)
                }
                a if VALVE_COUNTER_BYTES.contains(&a) => {}
                a => self.registers[a] = value,
            }
        }
    }

    fn execute(&mut self, command: &[u8]) -> Vec<u8> {
        let in_range =
            |register: u8, words: u8| register as usize + words as usize <= REGISTER_WORDS as usize;
        match command {
            [HEADER, FUNCTION_READ, 0x00, register, 0x00, words] => {
                if *words == 0 || !in_range(*register, *words) {
                    return exception(FUNCTION_READ, ExceptionCode::LengthMissingOrTooBig);
                }
                self.read(*register, *words)
            }
            [HEADER, FUNCTION_WRITE_WORD, 0x00, register, high, low] => {
                if !in_range(*register, 1) {
                    return exception(FUNCTION_WRITE_WORD, ExceptionCode::LengthMissingOrTooBig);
                }
                self.write(*register, &[*high, *low]);
                command.to_vec()
            }
            [HEADER, FUNCTION_WRITE_WORDS, 0x00, register, 0x00, words, bytes, data @ ..] => {
                if *bytes as usize != 2 * *words as usize || data.len() != *bytes as usize {
                    return exception(FUNCTION_WRITE_WORDS, ExceptionCode::WrongLength);
                }
                if *words == 0 || !in_range(*register, *words) {
                    return exception(FUNCTION_WRITE_WORDS, ExceptionCode::LengthMissingOrTooBig);
                }
                self.write(*register, data);
                command[0..6].to_vec()
            }
            [HEADER, function @ (FUNCTION_READ | FUNCTION_WRITE_WORD | FUNCTION_WRITE_WORDS), ..] => {
                exception(*function, ExceptionCode::WrongLength)
            }
            [_, function, ..] => exception(*function, ExceptionCode::UnknownCommand),
            _ => exception(0x00, ExceptionCode::LengthMissingOrTooBig),
        }
    }
}

fn exception(function: u8, code: ExceptionCode) -> Vec<u8> {
    vec![HEADER, function | EXCEPTION_FLAG, code.into()]
}

/// Strips length and CRC from a request frame. A frame that does not hold together is
/// answered as if its command were empty.
fn unframe(frame: &[u8]) -> &[u8] {
    let Some(len) = frame
        .get(0..2)
        .map(|len| u16::from_le_bytes([len[0], len[1]]) as usize)
    else {
        return &[];
    };
    if len < 2 || frame.len() != len + 2 {
        log::debug!("Emulator got a frame with bad length: {frame:02X?}");
        return &[];
    }
    let command = &frame[2..len];
    if crc16_modbus(command).to_le_bytes() != frame[len..len + 2] {
        log::debug!("Emulator got a frame with bad checksum: {frame:02X?}");
        return &[];
    }
    command
}

fn response_packet(code: u16, frame: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; RESPONSE_PAYLOAD_OFFSET];
    raw[RESPONSE_ERROR_OFFSET..RESPONSE_ERROR_OFFSET + 2].copy_from_slice(&code.to_le_bytes());
    raw.extend_from_slice(frame);
    raw
}

#[derive(Debug, Clone)]
pub struct Emulator {
    device: Arc<Mutex<Device>>,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new(&Status::default())
    }
}

impl Emulator {
    pub fn new(status: &Status) -> Self {
        Self {
            device: Arc::new(Mutex::new(Device {
                registers: status.registers(),
                faults: VecDeque::new(),
                exchanges: VecDeque::new(),
                latency: Duration::ZERO,
                connected: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current device state, decoded from the registers.
    pub fn status(&self) -> crate::Result<Status> {
        let device = self.lock();
        Status::decode(&device.read(0x00, REGISTER_WORDS))
    }

    /// Overwrites every register, read-only ones included.
    pub fn set_status(&self, status: &Status) {
        self.lock().registers = status.registers();
    }

    /// Queues a fault for the next request not yet faulted.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Response delay. A delay longer than the request timeout makes the request time out.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Logged exchanges, oldest first. The log holds the last [`EXCHANGE_LOG_CAPACITY`].
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().exchanges.iter().cloned().collect()
    }

    /// Command bytes of every logged request, oldest first.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.lock()
            .exchanges
            .iter()
            .map(|exchange| exchange.request.clone())
            .collect()
    }

    pub fn clear_exchanges(&self) {
        self.lock().exchanges.clear();
    }

    fn open(&self) -> Result<(), TransportError> {
        let mut device = self.lock();
        if device.faults.front() == Some(&Fault::Connection) {
            device.faults.pop_front();
            return Err(TransportError::Connection(
                "emulated device refused the session".to_string(),
            ));
        }
        device.connected = true;
        Ok(())
    }

    fn handle(&self, command: u8, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut device = self.lock();
        if command != PACKET_TYPE {
            return Err(TransportError::Connection(format!(
                "unsupported packet type {command:#04X}"
            )));
        }
        let fault = device.faults.pop_front();
        match fault {
            Some(Fault::Timeout) => return Err(TransportError::Timeout),
            Some(Fault::Connection) => {
                device.connected = false;
                return Err(TransportError::Connection(
                    "emulated device dropped the session".to_string(),
                ));
            }
            Some(Fault::TransportCode(code)) => return Ok(response_packet(code, &[])),
            _ => {}
        }

        let request = unframe(frame).to_vec();
        let mut response = match fault {
            Some(Fault::Exception(code)) => {
                exception(request.get(1).copied().unwrap_or_default(), code)
            }
            _ => device.execute(&request),
        };
        if fault == Some(Fault::WrongEcho) {
            if let Some(byte) = response.get_mut(2) {
                *byte ^= 0xFF;
            }
        }
        log::trace!("Emulator exchange - request={request:02X?} response={response:02X?}");
        if device.exchanges.len() == EXCHANGE_LOG_CAPACITY {
            device.exchanges.pop_front();
        }
        device.exchanges.push_back(Exchange {
            request,
            response: response.clone(),
        });

        let mut reply = encode_request(&response);
        if fault == Some(Fault::CorruptChecksum) {
            if let Some(last) = reply.last_mut() {
                *last ^= 0x01;
            }
        }
        Ok(response_packet(0, &reply))
    }
}

impl Transport for Emulator {
    fn connect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        self.open()
    }

    fn send_packet(
        &mut self,
        command: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let latency = self.lock().latency;
        if latency > timeout {
            return Err(TransportError::Timeout);
        }
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.handle(command, payload)
    }

    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(payload.to_vec())
    }
}

#[cfg(feature = "tokio-async")]
impl AsyncTransport for Emulator {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.open()
    }

    async fn send_packet(
        &mut self,
        command: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.handle(command, payload)
    }

    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(payload.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn round_trip(emulator: &mut Emulator, command: &[u8]) -> crate::Result<Vec<u8>> {
        let raw = Transport::send_packet(emulator, PACKET_TYPE, &encode_request(command), TIMEOUT)?;
        decode_response(command, &raw, |p| Transport::decrypt(&*emulator, p))
    }

    #[test]
    fn read_returns_registers() {
        let status = Status {
            room_temp: 21,
            time_valve_on: 3600,
            ..Default::default()
        };
        let mut emulator = Emulator::new(&status);
        let payload = round_trip(&mut emulator, &Status::request()).unwrap();
        assert_eq!(Status::decode(&payload).unwrap(), status);
    }

    #[test]
    fn writes_keep_read_only_registers() {
        let status = Status {
            room_temp: 21,
            valve_state: true,
            time_valve_on: 3600,
            ..Default::default()
        };
        let mut emulator = Emulator::new(&status);
        round_trip(&mut emulator, &SetTargetTemp::request(25)).unwrap();
        round_trip(&mut emulator, &SetLockPower::request(false, KeyLock::AllUnlocked, false))
            .unwrap();
        let current = emulator.status().unwrap();
        assert_eq!(current.target_temp, 25);
        assert_eq!(current.room_temp, 21);
        assert!(current.valve_state);
        assert!(!current.power_state);
        assert_eq!(current.time_valve_on, 3600);
    }

    #[test]
    fn malformed_requests_get_exceptions() {
        let mut emulator = Emulator::default();
        assert!(matches!(
            round_trip(&mut emulator, &[0x01, 0x03, 0x00, 0x0F, 0x00, 0x02]),
            Err(crate::Error::Exception {
                function: 0x03,
                code: ExceptionCode::LengthMissingOrTooBig
            })
        ));
        assert!(matches!(
            round_trip(&mut emulator, &[0x01, 0x10, 0x00, 0x09, 0x00, 0x01, 0x04, 0x00, 0x01]),
            Err(crate::Error::Exception {
                function: 0x10,
                code: ExceptionCode::WrongLength
            })
        ));
        assert!(matches!(
            round_trip(&mut emulator, &[0x01, 0x2B, 0x00]),
            Err(crate::Error::Exception {
                function: 0x2B,
                code: ExceptionCode::UnknownCommand
            })
        ));
    }

    #[test]
    fn faults_are_one_shot() {
        let mut emulator = Emulator::default();
        emulator.inject(Fault::CorruptChecksum);
        emulator.inject(Fault::TransportCode(0xFFFB));
        assert!(matches!(
            round_trip(&mut emulator, &Status::request()),
            Err(crate::Error::Checksum { .. })
        ));
        assert!(matches!(
            round_trip(&mut emulator, &Status::request()),
            Err(crate::Error::Transport(0xFFFB))
        ));
        assert!(round_trip(&mut emulator, &Status::request()).is_ok());
        assert_eq!(emulator.requests().len(), 2);
    }

    #[test]
    fn latency_over_timeout() {
        let mut emulator = Emulator::default();
        emulator.set_latency(Duration::from_secs(2));
        assert_eq!(
            Transport::send_packet(&mut emulator, PACKET_TYPE, &[], TIMEOUT),
            Err(TransportError::Timeout)
        );
        assert!(emulator.exchanges().is_empty());
    }

    #[test]
    fn exchange_log_is_bounded() {
        let mut emulator = Emulator::default();
        for _ in 0..EXCHANGE_LOG_CAPACITY {
            round_trip(&mut emulator, &Status::request()).unwrap();
        }
        round_trip(&mut emulator, &SetTargetTemp::request(23)).unwrap();

        let requests = emulator.requests();
        assert_eq!(requests.len(), EXCHANGE_LOG_CAPACITY);
        assert_eq!(requests.last(), Some(&SetTargetTemp::request(23)));
        emulator.clear_exchanges();
        assert!(emulator.exchanges().is_empty());
    }
}
