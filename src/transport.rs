//! Contract between the device facades and the encrypted point-to-point link.
//!
//! The link owns key exchange, packet encryption and socket I/O. The protocol layer only
//! needs one request/response primitive plus the decryption of the response payload.

use std::time::Duration;

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,
    #[error("{0}")]
    Connection(String),
}

/// Connection state as tracked by a device facade.
///
/// Informational only, reconnection is left to the owner of the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Blocking transport.
pub trait Transport {
    /// Opens and authenticates the session.
    fn connect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    /// Sends one packet of type `command` and returns the raw response packet.
    fn send_packet(
        &mut self,
        command: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Decrypts the payload part of a raw response packet.
    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).connect(timeout)
    }

    fn send_packet(
        &mut self,
        command: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).send_packet(command, payload, timeout)
    }

    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).decrypt(payload)
    }
}

/// Asynchronous transport. Timeouts are applied by the caller.
#[cfg(feature = "tokio-async")]
#[allow(async_fn_in_trait)]
pub trait AsyncTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_packet(&mut self, command: u8, payload: &[u8])
        -> Result<Vec<u8>, TransportError>;

    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;
}
