//! USB reset reconnect verification
//!
//! Issues a USB reset command to a device under test and verifies that the
//! device disappears from the host and comes back within an
//! environment-adjusted timeout.
//!
//! A background [`ConnectivityWatcher`] races the foreground reset command.
//! The [`ReconnectStateMachine`] follows the watcher's transitions until the
//! device is back or the deadline passes, and [`evaluate`] turns what was
//! observed into a pass, skip or fail [`Verdict`].
//!
//! # Example
//!
//! ```
//! use reconnect::mock::{MockDut, ResetScript};
//! use reconnect::{DeviceSession, CommandChannel, run_reconnect_check};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dut = Arc::new(MockDut::new("SN000001").with_script(ResetScript::reconnects(
//!     Duration::from_millis(50),
//!     Duration::from_millis(400),
//! )));
//!
//! let device: Arc<dyn DeviceSession> = dut.clone();
//! let channel: Arc<dyn CommandChannel> = dut;
//! let verdict = run_reconnect_check(
//!     Some(device),
//!     channel,
//!     "svc usb resetUsbGadget",
//!     Duration::from_millis(2000),
//!     Duration::ZERO,
//! )
//! .await
//! .unwrap();
//! assert!(verdict.is_pass());
//! # }
//! ```

pub mod check;
pub mod device;
pub mod error;
pub mod evaluator;
pub mod invoker;
pub mod machine;
pub mod mock;
pub mod timeout;
pub mod types;
pub mod variant;
pub mod watcher;

pub use check::{ReconnectCheck, run_reconnect_check};
pub use device::{CommandChannel, DeviceSession, PropertyStore};
pub use error::{CheckError, CommandError, DeviceError, Result};
pub use evaluator::evaluate;
pub use invoker::{NOT_SUPPORTED_PHRASES, ResetInvoker, classify};
pub use machine::ReconnectStateMachine;
pub use timeout::{
    DEFAULT_BASE_TIMEOUT, HW_TIMEOUT_MULTIPLIER_PROPERTY, TimeoutPolicy, adjusted_timeout,
    parse_multiplier,
};
pub use types::{
    ConnectivityState, OutputClass, ResetOutcome, SessionReport, TimeoutBudget, Transition,
    TransitionRecord, Verdict, VerdictKind,
};
pub use variant::{GADGET_RESET_COMMAND, PORT_RESET_COMMAND, ResetVariant, ShortCircuit};
pub use watcher::{ConnectivityWatcher, WatcherHandle};
