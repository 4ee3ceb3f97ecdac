//! Reconnect check error types

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`DeviceSession`](crate::DeviceSession) or
/// [`PropertyStore`](crate::PropertyStore)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The device did not reach the requested availability within the timeout
    #[error("Device availability wait timed out after {} ms", timeout.as_millis())]
    UnavailableTimeout { timeout: Duration },

    /// The host-side transport to the device failed
    #[error("Device transport error: {0}")]
    Transport(String),

    /// A property exists but its value is unusable
    #[error("Invalid value for property {name}: {value:?}")]
    InvalidProperty { name: String, value: String },
}

/// Failures reported by a [`CommandChannel`](crate::CommandChannel)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command could not be issued at all
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The command was issued but the link dropped before its output arrived
    #[error("Link lost while waiting for command output: {0}")]
    LinkLost(String),
}

/// Fatal errors of a reconnect check
///
/// These indicate a broken calling contract or host-side failure, never a
/// DUT defect. DUT defects are reported as a failing [`Verdict`](crate::Verdict).
#[derive(Debug, Error)]
pub enum CheckError {
    /// No device session was supplied
    #[error("Target device does not exist")]
    NoDevice,

    /// The reset command could not be issued
    #[error("Failed to issue reset command: {0}")]
    Command(#[from] CommandError),

    /// Observed state contradicts the transition ordering
    #[error("Internal consistency fault: {0}")]
    InternalConsistency(String),
}

/// Type alias for reconnect check results
pub type Result<T> = std::result::Result<T, CheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_in_millis() {
        let err = DeviceError::UnavailableTimeout {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "Device availability wait timed out after 5000 ms"
        );
    }

    #[test]
    fn test_command_error_converts_to_check_error() {
        let err: CheckError = CommandError::Rejected("adb not found".into()).into();
        assert!(matches!(err, CheckError::Command(CommandError::Rejected(_))));
        assert!(err.to_string().contains("adb not found"));
    }
}
