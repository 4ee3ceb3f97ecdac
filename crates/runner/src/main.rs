//! usb-reset-check
//!
//! Issues a USB reset to an Android device over adb and verifies that the
//! device drops off the host and reconnects within its timeout budget.

mod adb;
mod config;

use adb::AdbDevice;
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use common::setup_logging;
use reconnect::{
    CommandChannel, DeviceSession, ReconnectCheck, ResetVariant, TimeoutPolicy, Verdict,
    VerdictKind,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Exit status for a fatal error (no verdict produced)
const EXIT_FATAL: u8 = 2;

/// Exit status when interrupted with Ctrl+C
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    /// `svc usb resetUsbGadget`
    Gadget,
    /// `svc usb resetUsbPort`
    Port,
}

impl VariantArg {
    fn name(self) -> &'static str {
        match self {
            VariantArg::Gadget => "gadget",
            VariantArg::Port => "port",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "usb-reset-check")]
#[command(
    author,
    version,
    about = "Verify that a USB reset makes a device disconnect and reconnect"
)]
#[command(long_about = "
Issues a USB reset command to an Android device through adb, then watches
the device leave and rejoin the host. The timeout budget is scaled by the
device's ro.hw_timeout_multiplier property.

EXAMPLES:
    # Gadget reset on the only attached device
    usb-reset-check

    # Port reset on a specific device
    usb-reset-check --serial R58M123ABC --variant port

    # Arbitrary reset command with a longer recovery allowance
    usb-reset-check --command 'svc usb resetUsbGadget' --extra-recovery-ms 2000

    # Machine-readable verdict
    usb-reset-check --json

EXIT STATUS:
    0  pass, or reset not supported on this device
    1  device did not disconnect or did not reconnect in time
    2  the check could not be run

CONFIGURATION:
    Configuration files are looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usb-reset-check/config.toml
    3. /etc/usb-reset-check/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Serial of the device under test (defaults to the only attached device)
    #[arg(short, long, value_name = "SERIAL")]
    serial: Option<String>,

    /// Reset preset to run
    #[arg(short, long, value_enum, default_value_t = VariantArg::Gadget)]
    variant: VariantArg,

    /// Run this shell command instead of a preset
    #[arg(long, value_name = "CMD", conflicts_with = "variant")]
    command: Option<String>,

    /// Base timeout before the hardware multiplier is applied
    #[arg(long, value_name = "MS")]
    base_timeout_ms: Option<u64>,

    /// Extra time allowed for the device to come back
    #[arg(long, value_name = "MS")]
    extra_recovery_ms: Option<u64>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tokio::select! {
        result = run(args) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(EXIT_FATAL)
            }
        },
        _ = signal::ctrl_c() => {
            warn!("Interrupted, abandoning check");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = config::RunnerConfig::default();
        let path = config::RunnerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        config::RunnerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::RunnerConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.runner.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-reset-check v{}", env!("CARGO_PKG_VERSION"));

    let adb_path = config.adb_path();

    if args.list_devices {
        list_devices_mode(&adb_path).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let serial = match args.serial {
        Some(serial) => serial,
        None => only_device(&adb_path).await?,
    };

    let variant = select_variant(&args.command, args.variant, args.extra_recovery_ms, &config)?;
    let base_timeout = args
        .base_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeouts.base());
    if base_timeout.is_zero() {
        bail!("--base-timeout-ms must be greater than 0");
    }

    let device = Arc::new(AdbDevice::new(adb_path, serial, config.poll_interval()));
    info!("Using device [{}]", device.serial());

    let session: Arc<dyn DeviceSession> = device.clone();
    let channel: Arc<dyn CommandChannel> = device;
    let check = ReconnectCheck::new(Some(session), channel)?
        .with_base_timeout(base_timeout)
        .with_policy(TimeoutPolicy::new(config.timeouts.multiplier_property.clone()))
        .with_not_supported_phrases(config.invoker.not_supported_phrases.clone());

    let verdict = check.run(&variant).await?;
    print_verdict(&verdict, args.json)?;

    Ok(exit_code(&verdict))
}

/// Resolve the reset variant from the command line and configuration
fn select_variant(
    command: &Option<String>,
    preset: VariantArg,
    extra_recovery_ms: Option<u64>,
    config: &config::RunnerConfig,
) -> Result<ResetVariant> {
    let variant = match command {
        Some(command) if command.trim().is_empty() => bail!("--command must not be empty"),
        Some(command) => ResetVariant::for_command(command),
        None => config
            .variant(preset.name())
            .ok_or_else(|| anyhow!("Unknown reset variant: {}", preset.name()))?,
    };

    Ok(match extra_recovery_ms {
        Some(ms) => variant.with_extra_recovery(Duration::from_millis(ms)),
        None => variant,
    })
}

/// Serial of the single online device
async fn only_device(adb: &Path) -> Result<String> {
    let serials = adb::list_serials(adb)
        .await
        .context("Failed to list attached devices")?;

    match serials.as_slice() {
        [serial] => Ok(serial.clone()),
        [] => bail!("No device attached, connect one or pass --serial"),
        many => bail!(
            "{} devices attached ({}), pick one with --serial",
            many.len(),
            many.join(", ")
        ),
    }
}

/// List attached devices and exit
async fn list_devices_mode(adb: &Path) -> Result<()> {
    let devices = adb::list_devices(adb)
        .await
        .context("Failed to list attached devices")?;

    if devices.is_empty() {
        println!("No devices attached.");
    } else {
        println!("Found {} device(s):\n", devices.len());
        for (serial, state) in devices {
            println!("  {:<24} {}", serial, state);
        }
    }

    Ok(())
}

fn print_verdict(verdict: &Verdict, json: bool) -> Result<()> {
    if json {
        let text =
            serde_json::to_string_pretty(verdict).context("Failed to serialize verdict")?;
        println!("{}", text);
    } else {
        println!("{}", verdict);
        for transition in &verdict.report.transitions {
            println!(
                "  +{:>6} ms  {}",
                transition.elapsed.as_millis(),
                transition.state
            );
        }
    }
    Ok(())
}

fn exit_code(verdict: &Verdict) -> ExitCode {
    match verdict.kind {
        VerdictKind::Pass | VerdictKind::Skip => ExitCode::SUCCESS,
        VerdictKind::Fail => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["usb-reset-check"]).unwrap();
        assert_eq!(args.variant, VariantArg::Gadget);
        assert!(args.serial.is_none());
        assert!(args.command.is_none());
        assert!(!args.json);
    }

    #[test]
    fn test_args_port_variant() {
        let args = Args::try_parse_from([
            "usb-reset-check",
            "--serial",
            "R58M123ABC",
            "--variant",
            "port",
            "--extra-recovery-ms",
            "2000",
        ])
        .unwrap();
        assert_eq!(args.variant, VariantArg::Port);
        assert_eq!(args.serial.as_deref(), Some("R58M123ABC"));
        assert_eq!(args.extra_recovery_ms, Some(2000));
    }

    #[test]
    fn test_args_command_conflicts_with_variant() {
        let result = Args::try_parse_from([
            "usb-reset-check",
            "--variant",
            "port",
            "--command",
            "svc usb resetUsbPort",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_select_variant_from_preset() {
        let config = config::RunnerConfig::default();
        let variant = select_variant(&None, VariantArg::Port, None, &config).unwrap();
        assert_eq!(variant, ResetVariant::port());
    }

    #[test]
    fn test_select_variant_from_command() {
        let config = config::RunnerConfig::default();
        let command = Some("svc usb resetUsbPort".to_string());
        let variant = select_variant(&command, VariantArg::Gadget, None, &config).unwrap();
        assert_eq!(variant.name, "port");

        let command = Some("echo reset".to_string());
        let variant = select_variant(&command, VariantArg::Gadget, Some(750), &config).unwrap();
        assert_eq!(variant.name, "custom");
        assert_eq!(variant.command, "echo reset");
        assert_eq!(variant.extra_recovery, Duration::from_millis(750));
    }

    #[test]
    fn test_select_variant_rejects_blank_command() {
        let config = config::RunnerConfig::default();
        let command = Some("   ".to_string());
        assert!(select_variant(&command, VariantArg::Gadget, None, &config).is_err());
    }
}
