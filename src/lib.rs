#![cfg_attr(docsrs, feature(doc_cfg))]
//! # hysen2pfc_lib
//!
//! Protocol driver for the Hysen HY03AC-1-Wifi 2-pipe fan coil controller and its
//! derivatives. The controller speaks a CRC-checked, word-aligned binary protocol tunneled
//! through an encrypted Broadlink session.
//!
//! The crate builds and verifies the protocol frames, decodes the status register block,
//! and checks every write against the device invariants (temperature limit ordering,
//! schedule period ordering, fan mode exclusivity) before anything is sent. The encrypted
//! session itself is supplied by the caller through the [`Transport`] trait.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `hysen2pfc` command-line tool.
//!
//! ### Client Features
//! - The **synchronous** client [`Hysen2pfc`] is always available.
//! - `tokio-async`: Enables the **asynchronous** client using `tokio`.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for serializing/deserializing data structures.
//! - `bin-dependencies`: Enables all features required by the `hysen2pfc` binary executable.
//!
//! ## Testing
//!
//! The asynchronous client tests need the `tokio-async` feature and are skipped otherwise:
//!
//! ```text
//! cargo test --features tokio-async
//! ```

/// Logical changes, checked and turned into write commands.
pub mod command;
/// Synchronous client.
pub mod device;
/// In-memory device speaking the wire protocol, for tests and dry runs.
pub mod emulator;
/// Contains error types for the library.
mod error;
/// Frame codec, register model and command builders.
pub mod protocol;
/// Transport contract.
pub mod transport;
/// Pre-flight checks for every write.
pub mod validation;

pub use command::{Change, PeriodUpdate};
pub use device::Hysen2pfc;
pub use error::{Error, Result};
pub use protocol::{
    Clock, FanControl, FanMode, FrostProtection, Hysteresis, KeyLock, OperationMode,
    PeriodEdge, ScheduleEdge, Status, WeeklySchedule,
};
pub use transport::{ConnectionState, Transport, TransportError};

/// Asynchronous client.
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-async")))]
#[cfg(feature = "tokio-async")]
pub mod tokio_async;
