//! Scripted in-memory device under test
//!
//! [`MockDut`] implements every collaborator trait. Issuing a command
//! through it starts a [`ResetScript`] that flips the device's visibility
//! on a `tokio::time` schedule, so checks can be exercised under paused
//! time without hardware.
//!
//! # Example
//!
//! ```
//! use reconnect::mock::{MockDut, ResetScript};
//! use std::time::Duration;
//!
//! let dut = MockDut::new("SN000001")
//!     .with_property("ro.hw_timeout_multiplier", "3")
//!     .with_script(ResetScript::reconnects(
//!         Duration::from_millis(200),
//!         Duration::from_millis(600),
//!     ));
//! assert!(dut.is_available());
//! ```

use crate::device::{CommandChannel, DeviceSession, PropertyStore};
use crate::error::{CommandError, DeviceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// What the device does after a reset command is issued
///
/// Offsets are measured from the moment the command is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScript {
    /// Drops off the host, then comes back
    Reconnects {
        disconnect_after: Duration,
        reconnect_after: Duration,
    },
    /// Drops off the host and never comes back
    StaysDisconnected { disconnect_after: Duration },
    /// Ignores the reset
    NeverDisconnects,
    /// Every availability wait fails with a transport error
    TransportFailure,
}

impl ResetScript {
    pub fn reconnects(disconnect_after: Duration, reconnect_after: Duration) -> Self {
        ResetScript::Reconnects {
            disconnect_after,
            reconnect_after,
        }
    }
}

/// Scripted device implementing [`DeviceSession`], [`PropertyStore`] and
/// [`CommandChannel`]
pub struct MockDut {
    serial: String,
    properties: Mutex<HashMap<String, String>>,
    property_error: Option<DeviceError>,
    reply: Result<String, CommandError>,
    script: ResetScript,
    available: Arc<watch::Sender<bool>>,
    commands: Mutex<Vec<String>>,
    property_reads: AtomicUsize,
}

impl MockDut {
    /// Visible device that ignores resets and replies with empty output
    pub fn new(serial: impl Into<String>) -> Self {
        let (available, _) = watch::channel(true);
        Self {
            serial: serial.into(),
            properties: Mutex::new(HashMap::new()),
            property_error: None,
            reply: Ok(String::new()),
            script: ResetScript::NeverDisconnects,
            available: Arc::new(available),
            commands: Mutex::new(Vec::new()),
            property_reads: AtomicUsize::new(0),
        }
    }

    pub fn with_script(mut self, script: ResetScript) -> Self {
        self.script = script;
        self
    }

    pub fn with_property(self, name: &str, value: &str) -> Self {
        self.set_property(name, value);
        self
    }

    /// Make every property read fail
    pub fn with_property_error(mut self, error: DeviceError) -> Self {
        self.property_error = Some(error);
        self
    }

    /// Output returned for every command
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Ok(reply.into());
        self
    }

    /// Error returned for every command
    ///
    /// [`CommandError::LinkLost`] still starts the reset script, since the
    /// command reached the device.
    pub fn with_command_error(mut self, error: CommandError) -> Self {
        self.reply = Err(error);
        self
    }

    pub fn set_property(&self, name: &str, value: &str) {
        if let Ok(mut properties) = self.properties.lock() {
            properties.insert(name.to_string(), value.to_string());
        }
    }

    /// Commands issued so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    pub fn property_reads(&self) -> usize {
        self.property_reads.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }

    /// Start the reset script as if a reset command had just been issued
    pub fn trigger_reset(&self) {
        let available = Arc::clone(&self.available);
        let start = Instant::now();

        match self.script.clone() {
            ResetScript::Reconnects {
                disconnect_after,
                reconnect_after,
            } => {
                tokio::spawn(async move {
                    tokio::time::sleep_until(start + disconnect_after).await;
                    available.send_replace(false);
                    tokio::time::sleep_until(start + reconnect_after).await;
                    available.send_replace(true);
                });
            }
            ResetScript::StaysDisconnected { disconnect_after } => {
                tokio::spawn(async move {
                    tokio::time::sleep_until(start + disconnect_after).await;
                    available.send_replace(false);
                });
            }
            ResetScript::NeverDisconnects | ResetScript::TransportFailure => {}
        }
    }

    async fn wait_for(&self, want: bool, timeout: Duration) -> Result<(), DeviceError> {
        if self.script == ResetScript::TransportFailure {
            return Err(DeviceError::Transport(format!(
                "device {} connection refused",
                self.serial
            )));
        }

        let mut rx = self.available.subscribe();
        let waited = tokio::time::timeout(timeout, async move {
            rx.wait_for(|available| *available == want)
                .await
                .map(|_| ())
        })
        .await;

        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeviceError::Transport("availability channel closed".into())),
            Err(_) => Err(DeviceError::UnavailableTimeout { timeout }),
        }
    }
}

#[async_trait]
impl PropertyStore for MockDut {
    async fn property(&self, name: &str) -> Result<Option<String>, DeviceError> {
        self.property_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.property_error {
            return Err(error.clone());
        }
        let properties = self
            .properties
            .lock()
            .map_err(|_| DeviceError::Transport("property table poisoned".into()))?;
        Ok(properties.get(name).cloned())
    }
}

#[async_trait]
impl DeviceSession for MockDut {
    async fn serial_number(&self) -> Result<String, DeviceError> {
        Ok(self.serial.clone())
    }

    async fn wait_for_unavailable(&self, timeout: Duration) -> Result<(), DeviceError> {
        self.wait_for(false, timeout).await
    }

    async fn wait_for_available(&self, timeout: Duration) -> Result<(), DeviceError> {
        self.wait_for(true, timeout).await
    }
}

#[async_trait]
impl CommandChannel for MockDut {
    async fn execute(&self, command: &str) -> Result<String, CommandError> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }

        match &self.reply {
            Ok(output) => {
                self.trigger_reset();
                Ok(output.clone())
            }
            Err(CommandError::LinkLost(reason)) => {
                self.trigger_reset();
                Err(CommandError::LinkLost(reason.clone()))
            }
            Err(e) => Err(e.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_script_flips_availability() {
        let dut = MockDut::new("SN1").with_script(ResetScript::reconnects(
            Duration::from_millis(100),
            Duration::from_millis(400),
        ));
        dut.execute("svc usb resetUsbGadget").await.unwrap();

        dut.wait_for_unavailable(Duration::from_secs(1)).await.unwrap();
        assert!(!dut.is_available());
        dut.wait_for_available(Duration::from_secs(1)).await.unwrap();
        assert!(dut.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let dut = MockDut::new("SN1");
        let err = dut
            .wait_for_unavailable(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::UnavailableTimeout {
                timeout: Duration::from_millis(500)
            }
        );
    }

    #[tokio::test]
    async fn test_properties_and_reads() {
        let dut = MockDut::new("SN1").with_property("ro.hw_timeout_multiplier", "2");
        assert_eq!(
            dut.property("ro.hw_timeout_multiplier").await.unwrap(),
            Some("2".to_string())
        );
        assert_eq!(dut.int_property("ro.hw_timeout_multiplier", 1).await, 2);
        assert_eq!(dut.int_property("ro.missing", 7).await, 7);
        assert_eq!(dut.property_reads(), 3);
    }

    #[tokio::test]
    async fn test_rejected_command_does_not_reset() {
        let dut = MockDut::new("SN1")
            .with_script(ResetScript::StaysDisconnected {
                disconnect_after: Duration::ZERO,
            })
            .with_command_error(CommandError::Rejected("no route".into()));

        assert!(dut.execute("svc usb resetUsbPort").await.is_err());
        tokio::task::yield_now().await;
        assert!(dut.is_available());
        assert_eq!(dut.commands().len(), 1);
    }
}
