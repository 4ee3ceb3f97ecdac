//! Reconnect check entry point

use crate::device::{CommandChannel, DeviceSession};
use crate::error::{CheckError, Result};
use crate::evaluator::evaluate;
use crate::invoker::ResetInvoker;
use crate::machine::ReconnectStateMachine;
use crate::timeout::{DEFAULT_BASE_TIMEOUT, TimeoutPolicy};
use crate::types::Verdict;
use crate::variant::ResetVariant;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Verifies that a reset command makes a device disconnect and reconnect
pub struct ReconnectCheck {
    device: Arc<dyn DeviceSession>,
    channel: Arc<dyn CommandChannel>,
    policy: TimeoutPolicy,
    base_timeout: Duration,
    not_supported_phrases: Vec<String>,
}

impl ReconnectCheck {
    /// Bind a check to a device
    ///
    /// A missing device session is a calling-contract violation and fails
    /// with [`CheckError::NoDevice`].
    pub fn new(
        device: Option<Arc<dyn DeviceSession>>,
        channel: Arc<dyn CommandChannel>,
    ) -> Result<Self> {
        let device = device.ok_or(CheckError::NoDevice)?;
        Ok(Self {
            device,
            channel,
            policy: TimeoutPolicy::default(),
            base_timeout: DEFAULT_BASE_TIMEOUT,
            not_supported_phrases: Vec::new(),
        })
    }

    pub fn with_base_timeout(mut self, base_timeout: Duration) -> Self {
        self.base_timeout = base_timeout;
        self
    }

    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Extra replies to treat as "reset not supported"
    pub fn with_not_supported_phrases(mut self, phrases: Vec<String>) -> Self {
        self.not_supported_phrases = phrases;
        self
    }

    /// Run one session for `variant` and render its verdict
    pub async fn run(&self, variant: &ResetVariant) -> Result<Verdict> {
        let serial = match self.device.serial_number().await {
            Ok(serial) => serial,
            Err(e) => {
                warn!("Could not read device serial number: {}", e);
                "unknown".to_string()
            }
        };
        info!("Reset {} on device [{}]", variant.name, serial);

        let budget = self
            .policy
            .budget(self.base_timeout, variant.extra_recovery, self.device.as_ref())
            .await;
        info!(
            "Timeout budget: {} ms x{} + {} ms recovery",
            budget.base().as_millis(),
            budget.multiplier(),
            budget.extra_recovery().as_millis()
        );

        let invoker = ResetInvoker::new(Arc::clone(&self.channel))
            .with_phrases(self.not_supported_phrases.iter().cloned());
        let report = ReconnectStateMachine::new(
            Arc::clone(&self.device),
            invoker,
            variant.clone(),
            budget,
        )
        .run()
        .await?;

        let verdict = evaluate(report)?;
        info!("{}", verdict);
        Ok(verdict)
    }
}

/// Issue `reset_command` once and verify the device drops off and returns
///
/// Timings come from the matching preset (see [`ResetVariant::for_command`]).
/// A non-zero `extra_recovery` replaces the preset's allowance; zero keeps
/// it, so the port preset retains its own recovery time.
pub async fn run_reconnect_check(
    device: Option<Arc<dyn DeviceSession>>,
    channel: Arc<dyn CommandChannel>,
    reset_command: &str,
    base_timeout: Duration,
    extra_recovery: Duration,
) -> Result<Verdict> {
    let mut variant = ResetVariant::for_command(reset_command);
    if !extra_recovery.is_zero() {
        variant = variant.with_extra_recovery(extra_recovery);
    }
    ReconnectCheck::new(device, channel)?
        .with_base_timeout(base_timeout)
        .run(&variant)
        .await
}
