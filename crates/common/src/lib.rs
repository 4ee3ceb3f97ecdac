//! Common utilities for usb-reset-check
//!
//! This crate provides shared functionality between the reconnect core and
//! the command-line runner: error handling, logging setup and async test
//! helpers.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
