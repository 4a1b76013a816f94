#![deny(missing_docs)]
//! # onewire-core
//! A bus-independent implementation of the 1-Wire protocol.
//!
//! This crate provides a trait-based interface for 1-Wire communication, allowing you to implement the protocol on various bus masters.
//! [OneWire] trait defines the two primitives a master has to provide, the reset pulse and the bit-level touch, and builds
//! byte I/O and device selection on top of them.
//!
//! The crate also provides the search algorithm for discovering devices on the 1-Wire bus, implemented in [OneWireSearch],
//! and the table-driven Dallas/Maxim CRC-8 in [OneWireCrc].

pub mod consts;
mod error;
mod rom;
mod search;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod traits;
mod utils;
pub use error::OneWireError;
pub use rom::{Rom, RomParseError};
pub use search::{OneWireSearch, SearchState, discover};
pub use traits::{OneWire, OneWireStatus};
pub use utils::{CRC8_TABLE, OneWireCrc};

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
