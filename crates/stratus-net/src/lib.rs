//! Distributed sample generation for statistical verification.
//!
//! One process verifies; any number of worker processes connect to it over
//! TCP and stream path samples for the property under test. The protocol is
//! deliberately small: fixed-size little-endian frames, a registration
//! handshake, and start/stop/quit campaign control.

pub mod client;
pub mod server;
pub mod wire;

use std::io;

use thiserror::Error;

pub use client::run_client;
pub use server::SampleBroker;
pub use wire::{ClientMsg, ServerMsg, WireError};

#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("sampling failed: {0}")]
    Sample(String),
}
