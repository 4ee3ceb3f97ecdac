//! Reset command variants
//!
//! Gadget reset and port reset exercise different layers of the USB stack
//! and recover at different speeds, so each carries its own timing policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shell command resetting the USB gadget function
pub const GADGET_RESET_COMMAND: &str = "svc usb resetUsbGadget";

/// Shell command resetting the USB port
pub const PORT_RESET_COMMAND: &str = "svc usb resetUsbPort";

/// When a "not supported" reply ends the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortCircuit {
    /// As soon as the command output is classified
    BeforePostIssueDelay,
    /// Only after the post-issue delay has elapsed
    AfterPostIssueDelay,
}

/// Timing policy for one reset command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetVariant {
    /// Short name used in logs and reports
    pub name: String,
    /// Command issued through the command channel
    pub command: String,
    /// Pause between observing the disconnect and waiting for reconnect
    pub settle_delay: Duration,
    /// Pause between starting the watcher and issuing the command
    pub start_delay: Duration,
    /// Pause after the command returns before waiting on transitions
    pub post_issue_delay: Duration,
    /// Allowance added on top of the scaled timeout
    pub extra_recovery: Duration,
    pub short_circuit: ShortCircuit,
}

impl ResetVariant {
    /// `svc usb resetUsbGadget`
    pub fn gadget() -> Self {
        Self {
            name: "gadget".to_string(),
            command: GADGET_RESET_COMMAND.to_string(),
            settle_delay: Duration::from_millis(300),
            start_delay: Duration::from_millis(100),
            post_issue_delay: Duration::ZERO,
            extra_recovery: Duration::ZERO,
            short_circuit: ShortCircuit::BeforePostIssueDelay,
        }
    }

    /// `svc usb resetUsbPort`
    pub fn port() -> Self {
        Self {
            name: "port".to_string(),
            command: PORT_RESET_COMMAND.to_string(),
            settle_delay: Duration::from_millis(500),
            start_delay: Duration::from_millis(100),
            post_issue_delay: Duration::from_millis(100),
            extra_recovery: Duration::from_millis(1000),
            short_circuit: ShortCircuit::AfterPostIssueDelay,
        }
    }

    /// Arbitrary command with gadget timings
    pub fn custom(command: impl Into<String>) -> Self {
        Self {
            name: "custom".to_string(),
            command: command.into(),
            ..Self::gadget()
        }
    }

    /// Preset for a known command, otherwise [`ResetVariant::custom`]
    pub fn for_command(command: &str) -> Self {
        match command.trim() {
            GADGET_RESET_COMMAND => Self::gadget(),
            PORT_RESET_COMMAND => Self::port(),
            other => Self::custom(other),
        }
    }

    /// Look up a preset by name
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "gadget" => Some(Self::gadget()),
            "port" => Some(Self::port()),
            _ => None,
        }
    }

    pub fn with_extra_recovery(mut self, extra_recovery: Duration) -> Self {
        self.extra_recovery = extra_recovery;
        self
    }
}
