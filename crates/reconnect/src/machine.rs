//! Reconnect state machine
//!
//! Coordinates one observation session: starts the connectivity watcher,
//! issues the reset, then follows the watcher's transitions until the
//! device is back or the session deadline passes.
//!
//! ```text
//!   AwaitingInitialDisconnect ──(device gone)──▶ AwaitingReconnect ──(device back)──▶ Reconnected
//! ```
//!
//! The machine never asserts a result. It reports the last state it saw and
//! leaves the verdict to [`evaluate`](crate::evaluate).

use crate::device::DeviceSession;
use crate::error::{CheckError, Result};
use crate::invoker::ResetInvoker;
use crate::types::{
    ConnectivityState, ResetOutcome, SessionReport, TimeoutBudget, Transition, TransitionRecord,
};
use crate::variant::{ResetVariant, ShortCircuit};
use crate::watcher::ConnectivityWatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Stand-in deadline for windows too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Scheduler yields granted at the deadline so a watcher woken on the same
/// tick can publish
const DEADLINE_YIELDS: usize = 3;

/// Drives one reset/observe session
pub struct ReconnectStateMachine {
    device: Arc<dyn DeviceSession>,
    invoker: ResetInvoker,
    variant: ResetVariant,
    budget: TimeoutBudget,
}

impl ReconnectStateMachine {
    pub fn new(
        device: Arc<dyn DeviceSession>,
        invoker: ResetInvoker,
        variant: ResetVariant,
        budget: TimeoutBudget,
    ) -> Self {
        Self {
            device,
            invoker,
            variant,
            budget,
        }
    }

    /// Run the session to completion
    ///
    /// The watcher task is always joined before this returns.
    pub async fn run(self) -> Result<SessionReport> {
        let watcher = ConnectivityWatcher::new(
            Arc::clone(&self.device),
            self.budget.timeout(),
            self.budget.window(),
            self.variant.settle_delay,
        );
        let (handle, events) = watcher.spawn();

        let result = self.drive(events).await;
        handle.shutdown().await;
        result
    }

    async fn drive(self, mut events: mpsc::Receiver<Transition>) -> Result<SessionReport> {
        // Give the watcher a head start before the link can drop
        tokio::time::sleep(self.variant.start_delay).await;

        let issued = Instant::now();
        let outcome = self.invoker.invoke(&self.variant.command).await?;
        let mut observation = Observation::new(issued);

        if outcome.is_not_supported()
            && self.variant.short_circuit == ShortCircuit::BeforePostIssueDelay
        {
            return skip(observation, &mut events, self.variant, self.budget, outcome);
        }

        if !self.variant.post_issue_delay.is_zero() {
            tokio::time::sleep(self.variant.post_issue_delay).await;
        }

        if outcome.is_not_supported() {
            return skip(observation, &mut events, self.variant, self.budget, outcome);
        }

        let deadline = issued
            .checked_add(self.budget.window())
            .unwrap_or_else(|| issued + FAR_FUTURE);
        while !observation.state.is_terminal() {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(transition) => observation.advance(transition)?,
                    None => {
                        debug!("Watcher finished at {}", observation.state);
                        break;
                    }
                },

                _ = tokio::time::sleep_until(deadline) => {
                    // Anything observed up to the deadline still counts
                    for _ in 0..DEADLINE_YIELDS {
                        tokio::task::yield_now().await;
                        observation.drain_until(&mut events, deadline)?;
                        if observation.state.is_terminal() {
                            break;
                        }
                    }
                    debug!(
                        "Deadline of {} ms reached at {}",
                        self.budget.window().as_millis(),
                        observation.state
                    );
                    break;
                }
            }
        }

        Ok(observation.into_report(self.variant, self.budget, outcome))
    }
}

fn skip(
    mut observation: Observation,
    events: &mut mpsc::Receiver<Transition>,
    variant: ResetVariant,
    budget: TimeoutBudget,
    outcome: ResetOutcome,
) -> Result<SessionReport> {
    info!(
        "{} reset not supported on this device: {:?}",
        variant.name,
        outcome.output()
    );
    observation.drain(events)?;
    Ok(observation.into_report(variant, budget, outcome))
}

/// Coordinator-side view of the session
#[derive(Debug)]
struct Observation {
    issued: Instant,
    state: ConnectivityState,
    transitions: Vec<TransitionRecord>,
}

impl Observation {
    fn new(issued: Instant) -> Self {
        Self {
            issued,
            state: ConnectivityState::default(),
            transitions: Vec::new(),
        }
    }

    /// Apply a transition; only the immediate successor is accepted
    fn advance(&mut self, transition: Transition) -> Result<()> {
        if self.state.successor() != Some(transition.state) {
            return Err(CheckError::InternalConsistency(format!(
                "transition {} -> {} breaks the connectivity ordering",
                self.state, transition.state
            )));
        }

        let elapsed = transition.at.saturating_duration_since(self.issued);
        info!(
            "Connectivity {} -> {} after {} ms",
            self.state,
            transition.state,
            elapsed.as_millis()
        );
        self.state = transition.state;
        self.transitions.push(TransitionRecord {
            state: transition.state,
            elapsed,
        });
        Ok(())
    }

    fn drain(&mut self, events: &mut mpsc::Receiver<Transition>) -> Result<()> {
        while let Ok(transition) = events.try_recv() {
            self.advance(transition)?;
        }
        Ok(())
    }

    /// Drain transitions observed no later than `deadline`
    fn drain_until(
        &mut self,
        events: &mut mpsc::Receiver<Transition>,
        deadline: Instant,
    ) -> Result<()> {
        while let Ok(transition) = events.try_recv() {
            if transition.at > deadline {
                debug!("Ignoring {} observed after the deadline", transition.state);
                break;
            }
            self.advance(transition)?;
        }
        Ok(())
    }

    fn into_report(
        self,
        variant: ResetVariant,
        budget: TimeoutBudget,
        outcome: ResetOutcome,
    ) -> SessionReport {
        SessionReport {
            variant: variant.name,
            final_state: self.state,
            transitions: self.transitions,
            budget,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_accepts_successors() {
        let issued = Instant::now();
        let mut observation = Observation::new(issued);

        observation
            .advance(Transition {
                state: ConnectivityState::AwaitingReconnect,
                at: issued + Duration::from_millis(200),
            })
            .unwrap();
        observation
            .advance(Transition {
                state: ConnectivityState::Reconnected,
                at: issued + Duration::from_millis(900),
            })
            .unwrap();

        assert_eq!(observation.state, ConnectivityState::Reconnected);
        assert_eq!(observation.transitions.len(), 2);
        assert_eq!(
            observation.transitions[1].elapsed,
            Duration::from_millis(900)
        );
    }

    #[test]
    fn test_observation_rejects_skipped_state() {
        let issued = Instant::now();
        let mut observation = Observation::new(issued);

        let err = observation
            .advance(Transition {
                state: ConnectivityState::Reconnected,
                at: issued,
            })
            .unwrap_err();
        assert!(matches!(err, CheckError::InternalConsistency(_)));
        assert_eq!(observation.state, ConnectivityState::AwaitingInitialDisconnect);
    }

    #[test]
    fn test_observation_rejects_repeated_state() {
        let issued = Instant::now();
        let mut observation = Observation::new(issued);
        let disconnect = Transition {
            state: ConnectivityState::AwaitingReconnect,
            at: issued,
        };

        observation.advance(disconnect).unwrap();
        assert!(observation.advance(disconnect).is_err());
    }

    #[test]
    fn test_drain_until_stops_at_deadline() {
        let issued = Instant::now();
        let deadline = issued + Duration::from_millis(5000);
        let mut observation = Observation::new(issued);
        let (tx, mut rx) = mpsc::channel(2);

        tx.try_send(Transition {
            state: ConnectivityState::AwaitingReconnect,
            at: deadline,
        })
        .unwrap();
        tx.try_send(Transition {
            state: ConnectivityState::Reconnected,
            at: deadline + Duration::from_millis(1),
        })
        .unwrap();

        observation.drain_until(&mut rx, deadline).unwrap();
        assert_eq!(observation.state, ConnectivityState::AwaitingReconnect);
        assert_eq!(observation.transitions.len(), 1);
    }

    #[test]
    fn test_disconnect_before_issue_clamps_to_zero() {
        let issued = Instant::now();
        let mut observation = Observation::new(issued + Duration::from_millis(50));

        observation
            .advance(Transition {
                state: ConnectivityState::AwaitingReconnect,
                at: issued,
            })
            .unwrap();
        assert_eq!(observation.transitions[0].elapsed, Duration::ZERO);
    }
}
