//! Reconnect check data model
//!
//! Connectivity states, reset outcomes, timeout budgets and the verdict
//! handed back to test runners.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Connectivity of the device under test as seen by one observation session
///
/// Values are ordered: each is reachable only from its predecessor, and a
/// session never moves backwards.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Reset issued (or about to be), device still visible
    #[default]
    AwaitingInitialDisconnect,
    /// Device disappeared, waiting for it to come back
    AwaitingReconnect,
    /// Device came back
    Reconnected,
}

impl ConnectivityState {
    /// The only state reachable from `self`, if any
    pub fn successor(self) -> Option<Self> {
        match self {
            ConnectivityState::AwaitingInitialDisconnect => {
                Some(ConnectivityState::AwaitingReconnect)
            }
            ConnectivityState::AwaitingReconnect => Some(ConnectivityState::Reconnected),
            ConnectivityState::Reconnected => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectivityState::Reconnected
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::AwaitingInitialDisconnect => write!(f, "AwaitingInitialDisconnect"),
            ConnectivityState::AwaitingReconnect => write!(f, "AwaitingReconnect"),
            ConnectivityState::Reconnected => write!(f, "Reconnected"),
        }
    }
}

/// State change published by the connectivity watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State entered
    pub state: ConnectivityState,
    /// When the watcher observed it
    pub at: Instant,
}

/// A transition as recorded in the session report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub state: ConnectivityState,
    /// Time since the reset command was issued
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Classification of the reset command's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputClass {
    /// Normal reset attempt
    Supported,
    /// The device reported that this reset is unavailable on its configuration
    NotSupported,
    /// No output could be collected because the link dropped mid-command
    Unknown,
}

/// Result of issuing the reset command, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    output: String,
    class: OutputClass,
    issued_at: SystemTime,
}

impl ResetOutcome {
    pub fn new(output: impl Into<String>, class: OutputClass, issued_at: SystemTime) -> Self {
        Self {
            output: output.into(),
            class,
            issued_at,
        }
    }

    /// Trimmed command output, possibly empty
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn class(&self) -> OutputClass {
        self.class
    }

    /// Wall-clock time the command was issued
    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }

    pub fn is_not_supported(&self) -> bool {
        self.class == OutputClass::NotSupported
    }
}

/// Environment-adjusted timeout for one session
///
/// `timeout = base * multiplier`, and the coordinator's deadline is
/// `timeout + extra_recovery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutBudget {
    #[serde(with = "duration_ms")]
    base: Duration,
    multiplier: u32,
    #[serde(with = "duration_ms")]
    extra_recovery: Duration,
}

impl TimeoutBudget {
    /// Create a budget; a multiplier of zero is treated as one
    pub fn new(base: Duration, multiplier: u32) -> Self {
        Self {
            base,
            multiplier: multiplier.max(1),
            extra_recovery: Duration::ZERO,
        }
    }

    /// Add an allowance for slower recovery paths
    pub fn with_extra_recovery(mut self, extra_recovery: Duration) -> Self {
        self.extra_recovery = extra_recovery;
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn extra_recovery(&self) -> Duration {
        self.extra_recovery
    }

    /// Scaled timeout applied to each availability wait
    pub fn timeout(&self) -> Duration {
        self.base.saturating_mul(self.multiplier)
    }

    /// Total time the coordinator waits after issuing the reset
    pub fn window(&self) -> Duration {
        self.timeout().saturating_add(self.extra_recovery)
    }
}

/// Everything observed during one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Name of the reset variant that was run
    pub variant: String,
    /// Last state observed by the coordinator
    pub final_state: ConnectivityState,
    /// Transitions in the order they were observed
    pub transitions: Vec<TransitionRecord>,
    pub budget: TimeoutBudget,
    pub outcome: ResetOutcome,
}

/// Verdict classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Pass,
    Skip,
    Fail,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictKind::Pass => write!(f, "PASS"),
            VerdictKind::Skip => write!(f, "SKIP"),
            VerdictKind::Fail => write!(f, "FAIL"),
        }
    }
}

/// Final result of a reconnect check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    /// Human-readable reason, suitable for direct display
    pub reason: String,
    pub report: SessionReport,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        self.kind == VerdictKind::Pass
    }

    pub fn is_skip(&self) -> bool {
        self.kind == VerdictKind::Skip
    }

    pub fn is_fail(&self) -> bool {
        self.kind == VerdictKind::Fail
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.report.variant, self.reason)
    }
}

/// Serialize durations as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(ConnectivityState::AwaitingInitialDisconnect < ConnectivityState::AwaitingReconnect);
        assert!(ConnectivityState::AwaitingReconnect < ConnectivityState::Reconnected);
        assert_eq!(
            ConnectivityState::default(),
            ConnectivityState::AwaitingInitialDisconnect
        );
    }

    #[test]
    fn test_successor_chain() {
        let mut state = ConnectivityState::AwaitingInitialDisconnect;
        let mut steps = 0;
        while let Some(next) = state.successor() {
            assert!(next > state);
            state = next;
            steps += 1;
        }
        assert_eq!(steps, 2);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_budget_scaling() {
        let budget = TimeoutBudget::new(Duration::from_millis(5000), 3);
        assert_eq!(budget.timeout(), Duration::from_millis(15000));
        assert_eq!(budget.window(), Duration::from_millis(15000));

        let budget = budget.with_extra_recovery(Duration::from_millis(1000));
        assert_eq!(budget.timeout(), Duration::from_millis(15000));
        assert_eq!(budget.window(), Duration::from_millis(16000));
    }

    #[test]
    fn test_budget_zero_multiplier_clamped() {
        let budget = TimeoutBudget::new(Duration::from_millis(5000), 0);
        assert_eq!(budget.multiplier(), 1);
        assert_eq!(budget.timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_budget_serializes_millis() {
        let budget = TimeoutBudget::new(Duration::from_secs(5), 2)
            .with_extra_recovery(Duration::from_millis(250));
        let json = serde_json::to_value(budget).unwrap();
        assert_eq!(json["base"], 5000);
        assert_eq!(json["multiplier"], 2);
        assert_eq!(json["extra_recovery"], 250);
    }
}
