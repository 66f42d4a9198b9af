//! Sluice Core - Backend abstractions shared by the pool and its users
//!
//! This crate defines:
//!
//! - `Connection` - Trait for a live backend session
//! - `ConnectOptions` - Parameters for establishing one session
//! - `SluiceError` - Errors raised by backends

mod connection;
mod error;

pub use connection::*;
pub use error::*;
