use crate::protocol::ExceptionCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested value violates a device invariant, nothing was sent.
    #[error("Validation error: {reason}")]
    Validation { reason: String },
    #[error("Checksum error - calculated={calculated:#06X} received={received:#06X}")]
    Checksum { calculated: u16, received: u16 },
    #[error("Framing error: {0}")]
    Framing(String),
    #[error("Echo mismatch - request={request:02X?} response={response:02X?}")]
    EchoMismatch { request: Vec<u8>, response: Vec<u8> },
    #[error("Device exception for function {function:#04X}: {code}")]
    Exception { function: u8, code: ExceptionCode },
    #[error("Transport reported error code {0:#06X}")]
    Transport(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Connection error: {0}")]
    Connection(String),
}

impl Error {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
        }
    }

    /// Whether the caller may simply repeat the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout | Error::Connection(_))
    }
}

impl From<crate::transport::TransportError> for Error {
    fn from(err: crate::transport::TransportError) -> Error {
        match err {
            crate::transport::TransportError::Timeout => Error::Timeout,
            crate::transport::TransportError::Connection(reason) => Error::Connection(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
