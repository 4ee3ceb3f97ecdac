//! Verdict rendering

use crate::error::{CheckError, Result};
use crate::types::{ConnectivityState, OutputClass, SessionReport, Verdict, VerdictKind};

/// Turn a finished session into a verdict
///
/// Fails only when the report contradicts itself, which means the
/// coordinator is broken rather than the device.
pub fn evaluate(report: SessionReport) -> Result<Verdict> {
    check_consistency(&report)?;

    let window_ms = report.budget.window().as_millis();
    let (kind, reason) = match (report.outcome.class(), report.final_state) {
        (OutputClass::NotSupported, _) => (
            VerdictKind::Skip,
            format!(
                "{} reset not supported on this device: {}",
                report.variant,
                report.outcome.output()
            ),
        ),
        (_, ConnectivityState::Reconnected) => (
            VerdictKind::Pass,
            format!("usb disconnected and reconnected within {} ms", window_ms),
        ),
        (_, ConnectivityState::AwaitingInitialDisconnect) => (
            VerdictKind::Fail,
            format!("usb never disconnected within {} ms", window_ms),
        ),
        (_, ConnectivityState::AwaitingReconnect) => (
            VerdictKind::Fail,
            format!(
                "usb disconnected, but never reconnected within {} ms",
                window_ms
            ),
        ),
    };

    Ok(Verdict {
        kind,
        reason,
        report,
    })
}

/// Transitions must be the ordered chain leading to the final state
fn check_consistency(report: &SessionReport) -> Result<()> {
    let mut expected = ConnectivityState::default();
    let mut last_elapsed = None;

    for record in &report.transitions {
        let next = expected.successor().filter(|next| *next == record.state);
        let Some(next) = next else {
            return Err(CheckError::InternalConsistency(format!(
                "recorded transition to {} follows {}",
                record.state, expected
            )));
        };
        if last_elapsed.is_some_and(|last| record.elapsed < last) {
            return Err(CheckError::InternalConsistency(format!(
                "transition to {} recorded out of time order",
                record.state
            )));
        }
        expected = next;
        last_elapsed = Some(record.elapsed);
    }

    if expected != report.final_state {
        return Err(CheckError::InternalConsistency(format!(
            "final state {} does not match recorded transitions ending at {}",
            report.final_state, expected
        )));
    }
    Ok(())
}
