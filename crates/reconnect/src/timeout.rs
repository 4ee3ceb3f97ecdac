//! Environment-adjusted timeouts
//!
//! Slow hardware and emulators advertise a timeout multiplier property.
//! Every session re-reads it; any problem reading it degrades to a
//! multiplier of 1 and never aborts the check.

use crate::device::PropertyStore;
use crate::types::TimeoutBudget;
use std::time::Duration;
use tracing::{debug, warn};

/// Property holding the hardware timeout multiplier
pub const HW_TIMEOUT_MULTIPLIER_PROPERTY: &str = "ro.hw_timeout_multiplier";

/// Default base timeout for a single availability wait
pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Computes timeout budgets from a base duration and a device property
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    property: String,
}

impl TimeoutPolicy {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }

    /// Name of the property the multiplier is read from
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Read the multiplier, falling back to 1 on any failure
    pub async fn multiplier<P: PropertyStore + ?Sized>(&self, props: &P) -> u32 {
        match props.property(&self.property).await {
            Ok(Some(raw)) => match parse_multiplier(&raw) {
                Some(multiplier) => {
                    debug!("{} = {}", self.property, multiplier);
                    multiplier
                }
                None => {
                    warn!(
                        "Ignoring unusable {} value {:?}, using multiplier 1",
                        self.property, raw
                    );
                    1
                }
            },
            Ok(None) => 1,
            Err(e) => {
                warn!(
                    "Failed to read {}: {}, using multiplier 1",
                    self.property, e
                );
                1
            }
        }
    }

    /// `base * multiplier`
    pub async fn adjusted_timeout<P: PropertyStore + ?Sized>(
        &self,
        base: Duration,
        props: &P,
    ) -> Duration {
        base.saturating_mul(self.multiplier(props).await)
    }

    /// Budget for one session
    pub async fn budget<P: PropertyStore + ?Sized>(
        &self,
        base: Duration,
        extra_recovery: Duration,
        props: &P,
    ) -> TimeoutBudget {
        TimeoutBudget::new(base, self.multiplier(props).await).with_extra_recovery(extra_recovery)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(HW_TIMEOUT_MULTIPLIER_PROPERTY)
    }
}

/// Parse a multiplier property value
///
/// Accepts a decimal integer of at least 1, surrounding whitespace allowed.
pub fn parse_multiplier(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|m| *m >= 1)
}

/// `base` scaled by the default multiplier property of `props`
pub async fn adjusted_timeout<P: PropertyStore + ?Sized>(base: Duration, props: &P) -> Duration {
    TimeoutPolicy::default().adjusted_timeout(base, props).await
}
