//! Reset command issuance

use crate::device::CommandChannel;
use crate::error::{CommandError, Result};
use crate::types::{OutputClass, ResetOutcome};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// Replies meaning the reset is unavailable on this device configuration
pub const NOT_SUPPORTED_PHRASES: &[&str] = &["No USB ports", "There is no available reset USB port"];

/// Issues the reset command exactly once and classifies its reply
pub struct ResetInvoker {
    channel: Arc<dyn CommandChannel>,
    not_supported: Vec<String>,
}

impl ResetInvoker {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            channel,
            not_supported: NOT_SUPPORTED_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Recognise additional "not supported" replies
    pub fn with_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_supported.extend(phrases.into_iter().map(Into::into));
        self
    }

    /// Issue `command` and classify the reply
    ///
    /// A link drop while waiting for output is expected when the reset
    /// works, so it yields an [`OutputClass::Unknown`] outcome. Any other
    /// channel failure is fatal.
    pub async fn invoke(self, command: &str) -> Result<ResetOutcome> {
        info!("Invoke shell command [{}]", command);
        let issued_at = SystemTime::now();

        match self.channel.execute(command).await {
            Ok(raw) => {
                let output = raw.trim();
                let class = classify(output, self.not_supported.as_slice());
                info!("Reset command returned {:?}: {:?}", class, output);
                Ok(ResetOutcome::new(output, class, issued_at))
            }
            Err(CommandError::LinkLost(reason)) => {
                warn!("Link dropped while resetting: {}", reason);
                Ok(ResetOutcome::new("", OutputClass::Unknown, issued_at))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Classify reset output against known "not supported" phrases
///
/// Matching is case-insensitive. Anything else, including empty output,
/// is a normal reset attempt.
pub fn classify<S: AsRef<str>>(output: &str, not_supported: &[S]) -> OutputClass {
    let lowered = output.to_lowercase();
    let matched = not_supported
        .iter()
        .map(|phrase| phrase.as_ref())
        .filter(|phrase| !phrase.is_empty())
        .any(|phrase| lowered.contains(&phrase.to_lowercase()));

    if matched {
        OutputClass::NotSupported
    } else {
        OutputClass::Supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckError;
    use crate::mock::MockDut;

    #[test]
    fn test_classify_known_phrases() {
        assert_eq!(
            classify("No USB ports", NOT_SUPPORTED_PHRASES),
            OutputClass::NotSupported
        );
        assert_eq!(
            classify(
                "Error: There is no available reset USB port",
                NOT_SUPPORTED_PHRASES
            ),
            OutputClass::NotSupported
        );
        assert_eq!(
            classify("no usb ports", NOT_SUPPORTED_PHRASES),
            OutputClass::NotSupported
        );
    }

    #[test]
    fn test_classify_other_output_is_supported() {
        assert_eq!(classify("", NOT_SUPPORTED_PHRASES), OutputClass::Supported);
        assert_eq!(
            classify("Resetting USB gadget", NOT_SUPPORTED_PHRASES),
            OutputClass::Supported
        );
    }

    #[test]
    fn test_empty_phrase_never_matches() {
        assert_eq!(classify("anything", &[""]), OutputClass::Supported);
    }

    #[tokio::test]
    async fn test_invoke_trims_output() {
        let dut = Arc::new(MockDut::new("SN1").with_reply("  done \n"));
        let outcome = ResetInvoker::new(dut.clone())
            .invoke("svc usb resetUsbGadget")
            .await
            .unwrap();

        assert_eq!(outcome.output(), "done");
        assert_eq!(outcome.class(), OutputClass::Supported);
        assert_eq!(dut.commands(), vec!["svc usb resetUsbGadget".to_string()]);
    }

    #[tokio::test]
    async fn test_invoke_custom_phrase() {
        let dut = Arc::new(MockDut::new("SN1").with_reply("gadget HAL missing"));
        let outcome = ResetInvoker::new(dut)
            .with_phrases(["HAL missing"])
            .invoke("svc usb resetUsbGadget")
            .await
            .unwrap();

        assert!(outcome.is_not_supported());
    }

    #[tokio::test]
    async fn test_invoke_link_lost_is_unknown() {
        let dut = Arc::new(
            MockDut::new("SN1").with_command_error(CommandError::LinkLost("device offline".into())),
        );
        let outcome = ResetInvoker::new(dut)
            .invoke("svc usb resetUsbPort")
            .await
            .unwrap();

        assert_eq!(outcome.class(), OutputClass::Unknown);
        assert_eq!(outcome.output(), "");
    }

    #[tokio::test]
    async fn test_invoke_rejected_is_fatal() {
        let dut = Arc::new(
            MockDut::new("SN1").with_command_error(CommandError::Rejected("adb: not found".into())),
        );
        let err = ResetInvoker::new(dut)
            .invoke("svc usb resetUsbPort")
            .await
            .unwrap_err();

        assert!(matches!(err, CheckError::Command(CommandError::Rejected(_))));
    }
}
