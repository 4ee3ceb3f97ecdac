//! Collaborator traits the reconnect check drives
//!
//! The check never talks to hardware directly. Everything it needs from the
//! device under test is expressed through these three capabilities so that
//! the same state machine runs against `adb`, a lab harness, or
//! [`MockDut`](crate::mock::MockDut).

use crate::error::{CommandError, DeviceError};
use async_trait::async_trait;
use std::time::Duration;

/// Named property lookup on the device under test
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Read a property as raw text, `None` if it is not set
    async fn property(&self, name: &str) -> Result<Option<String>, DeviceError>;

    /// Read an integer property, returning `default` on any failure
    async fn int_property(&self, name: &str, default: i64) -> i64 {
        match self.property(name).await {
            Ok(Some(value)) => value.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}

/// Session with a device under test
#[async_trait]
pub trait DeviceSession: PropertyStore {
    /// Serial number identifying the device
    async fn serial_number(&self) -> Result<String, DeviceError>;

    /// Block until the device disappears from the host
    ///
    /// Fails with [`DeviceError::UnavailableTimeout`] if it is still visible
    /// after `timeout`.
    async fn wait_for_unavailable(&self, timeout: Duration) -> Result<(), DeviceError>;

    /// Block until the device is visible to the host again
    ///
    /// Fails with [`DeviceError::UnavailableTimeout`] if it is still missing
    /// after `timeout`.
    async fn wait_for_available(&self, timeout: Duration) -> Result<(), DeviceError>;
}

/// Shell-level command transport to the device under test
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Run `command` and return its raw output
    async fn execute(&self, command: &str) -> Result<String, CommandError>;
}
