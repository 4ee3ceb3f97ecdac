//! Device access through the `adb` command-line tool

use async_trait::async_trait;
use common::{Error, Result};
use reconnect::{
    CommandChannel, CommandError, DeviceError, DeviceSession, NOT_SUPPORTED_PHRASES, OutputClass,
    PropertyStore, classify,
};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// adb error lines meaning the link dropped while a command was in flight
const LINK_LOST_ERRORS: &[&str] = &[
    "error: closed",
    "error: device offline",
    "error: no devices/emulators found",
    "error: protocol fault",
    "adb: protocol fault",
];

/// adb error lines meaning the command never reached the device
const REJECTED_ERRORS: &[&str] = &[
    "error: device '",
    "error: more than one device",
    "error: device unauthorized",
    "error: device still authorizing",
    "error: insufficient permissions",
    "adb: ",
];

/// A device reachable with `adb -s <serial>`
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: PathBuf,
    serial: String,
    poll_interval: Duration,
}

impl AdbDevice {
    pub fn new(adb: impl Into<PathBuf>, serial: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            adb: adb.into(),
            serial: serial.into(),
            poll_interval,
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    async fn adb(&self, args: &[&str]) -> Result<Output> {
        trace!("adb -s {} {}", self.serial, args.join(" "));
        Command::new(&self.adb)
            .arg("-s")
            .arg(&self.serial)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Process(format!("failed to execute {}: {}", self.adb.display(), e)))
    }

    /// Whether `adb get-state` currently reports the device as online
    async fn is_online(&self) -> std::result::Result<bool, DeviceError> {
        let output = self
            .adb(&["get-state"])
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "device")
    }

    async fn wait_until(&self, online: bool, timeout: Duration) -> std::result::Result<(), DeviceError> {
        let poll = async {
            loop {
                if self.is_online().await? == online {
                    return Ok::<(), DeviceError>(());
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| DeviceError::UnavailableTimeout { timeout })?
    }
}

#[async_trait]
impl PropertyStore for AdbDevice {
    async fn property(&self, name: &str) -> std::result::Result<Option<String>, DeviceError> {
        let output = self
            .adb(&["shell", "getprop", name])
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        if !output.status.success() {
            return Err(DeviceError::Transport(format!(
                "getprop {} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // getprop prints an empty line for unset properties
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }
}

#[async_trait]
impl DeviceSession for AdbDevice {
    async fn serial_number(&self) -> std::result::Result<String, DeviceError> {
        Ok(self.serial.clone())
    }

    async fn wait_for_unavailable(&self, timeout: Duration) -> std::result::Result<(), DeviceError> {
        self.wait_until(false, timeout).await
    }

    async fn wait_for_available(&self, timeout: Duration) -> std::result::Result<(), DeviceError> {
        self.wait_until(true, timeout).await
    }
}

#[async_trait]
impl CommandChannel for AdbDevice {
    async fn execute(&self, command: &str) -> std::result::Result<String, CommandError> {
        let output = self
            .adb(&["shell", command])
            .await
            .map_err(|e| CommandError::Rejected(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            "`{}` exited with {} ({} bytes stdout, {} bytes stderr)",
            command,
            output.status,
            stdout.len(),
            stderr.len()
        );

        if !output.status.success()
            && let Some(error) = classify_failure(&stderr)
        {
            return Err(error);
        }

        // Remote commands report "not supported" on either stream
        Ok(format!("{}{}", stdout, stderr))
    }
}

/// Map an adb-level failure to a command error
///
/// Only adb's own error lines count. Returns `None` when stderr came from
/// the remote command, including "not supported" replies, in which case the
/// output is passed on for classification.
pub fn classify_failure(stderr: &str) -> Option<CommandError> {
    let text = stderr.trim();
    if classify(text, NOT_SUPPORTED_PHRASES) == OutputClass::NotSupported {
        return None;
    }

    for line in text.lines().map(|line| line.trim().to_ascii_lowercase()) {
        if LINK_LOST_ERRORS.iter().any(|error| line.starts_with(error)) {
            return Some(CommandError::LinkLost(text.to_string()));
        }
        if REJECTED_ERRORS.iter().any(|error| line.starts_with(error)) {
            return Some(CommandError::Rejected(text.to_string()));
        }
    }

    None
}

/// Parse `adb devices` output into `(serial, state)` pairs
pub fn parse_devices(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            Some((serial.to_string(), state.to_string()))
        })
        .collect()
}

/// List every device the adb server reports, with its state
pub async fn list_devices(adb: &Path) -> Result<Vec<(String, String)>> {
    let output = Command::new(adb)
        .arg("devices")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Process(format!("failed to execute {}: {}", adb.display(), e)))?;

    if !output.status.success() {
        return Err(Error::Process(format!(
            "adb devices failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
}

/// Serials of devices that are online
pub async fn list_serials(adb: &Path) -> Result<Vec<String>> {
    Ok(list_devices(adb)
        .await?
        .into_iter()
        .filter(|(_, state)| state == "device")
        .map(|(serial, _)| serial)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let text = "* daemon not running; starting now at tcp:5037\n\
                    * daemon started successfully\n\
                    List of devices attached\n\
                    R58M123ABC\tdevice\n\
                    emulator-5554\toffline\n\
                    \n\
                    0123456789\tunauthorized usb:1-1 transport_id:3\n";

        let devices = parse_devices(text);
        assert_eq!(
            devices,
            vec![
                ("R58M123ABC".to_string(), "device".to_string()),
                ("emulator-5554".to_string(), "offline".to_string()),
                ("0123456789".to_string(), "unauthorized".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_devices_empty() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_classify_link_lost() {
        assert_eq!(
            classify_failure("error: closed\n"),
            Some(CommandError::LinkLost("error: closed".to_string()))
        );
        assert!(matches!(
            classify_failure("error: device offline"),
            Some(CommandError::LinkLost(_))
        ));
        assert!(matches!(
            classify_failure("adb: protocol fault (couldn't read status)"),
            Some(CommandError::LinkLost(_))
        ));
    }

    #[test]
    fn test_classify_rejected() {
        assert!(matches!(
            classify_failure("error: device 'XYZ' not found"),
            Some(CommandError::Rejected(_))
        ));
        assert!(matches!(
            classify_failure("adb: usage: unknown command"),
            Some(CommandError::Rejected(_))
        ));
    }

    #[test]
    fn test_classify_remote_output_passes_through() {
        assert_eq!(classify_failure("No USB ports\n"), None);
        assert_eq!(classify_failure(""), None);
        assert_eq!(classify_failure("usb: port closed by hal\n"), None);
        assert_eq!(classify_failure("Error: reset failed\n"), None);
    }

    #[test]
    fn test_classify_not_supported_error_reply_passes_through() {
        assert_eq!(
            classify_failure("Error: There is no available reset USB port\n"),
            None
        );
        assert_eq!(classify_failure("error: No USB ports"), None);
    }

    #[test]
    fn test_classify_adb_error_among_remote_lines() {
        assert!(matches!(
            classify_failure("resetting gadget\nerror: closed\n"),
            Some(CommandError::LinkLost(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_adb_binary_is_transport_error() {
        let device = AdbDevice::new(
            "/nonexistent/usb-reset-check/adb",
            "SN1",
            Duration::from_millis(10),
        );

        let err = device.property("ro.serialno").await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));

        let err = device
            .wait_for_available(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));

        let err = device.execute("true").await.unwrap_err();
        assert!(matches!(err, CommandError::Rejected(_)));
    }
}
