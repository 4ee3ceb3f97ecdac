//! Runner configuration management

use anyhow::{Context, Result, anyhow};
use reconnect::{HW_TIMEOUT_MULTIPLIER_PROPERTY, ResetVariant, ShortCircuit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub runner: RunnerSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub invoker: InvokerSettings,
    /// Per-variant timing overrides
    #[serde(default)]
    pub variants: VariantOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    pub log_level: String,
    /// Path to the adb binary (`~` is expanded)
    #[serde(default = "RunnerSettings::default_adb_path")]
    pub adb_path: String,
    /// How often `adb get-state` is polled while waiting on availability
    #[serde(default = "RunnerSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl RunnerSettings {
    fn default_adb_path() -> String {
        "adb".to_string()
    }

    fn default_poll_interval() -> u64 {
        250
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Base timeout before the hardware multiplier is applied
    #[serde(default = "TimeoutSettings::default_base")]
    pub base_ms: u64,
    /// Property holding the hardware timeout multiplier
    #[serde(default = "TimeoutSettings::default_property")]
    pub multiplier_property: String,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            base_ms: Self::default_base(),
            multiplier_property: Self::default_property(),
        }
    }
}

impl TimeoutSettings {
    fn default_base() -> u64 {
        5000
    }

    fn default_property() -> String {
        HW_TIMEOUT_MULTIPLIER_PROPERTY.to_string()
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokerSettings {
    /// Replies treated as "reset not supported" in addition to the built-in ones
    #[serde(default)]
    pub not_supported_phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantOverrides {
    #[serde(default)]
    pub gadget: Option<VariantSettings>,
    #[serde(default)]
    pub port: Option<VariantSettings>,
}

/// Timing overrides for one reset variant; unset fields keep the preset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSettings {
    #[serde(default)]
    pub settle_delay_ms: Option<u64>,
    #[serde(default)]
    pub start_delay_ms: Option<u64>,
    #[serde(default)]
    pub post_issue_delay_ms: Option<u64>,
    #[serde(default)]
    pub extra_recovery_ms: Option<u64>,
    #[serde(default)]
    pub short_circuit: Option<ShortCircuit>,
}

impl VariantSettings {
    pub fn apply(&self, mut variant: ResetVariant) -> ResetVariant {
        if let Some(ms) = self.settle_delay_ms {
            variant.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.start_delay_ms {
            variant.start_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.post_issue_delay_ms {
            variant.post_issue_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.extra_recovery_ms {
            variant.extra_recovery = Duration::from_millis(ms);
        }
        if let Some(short_circuit) = self.short_circuit {
            variant.short_circuit = short_circuit;
        }
        variant
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            runner: RunnerSettings {
                log_level: "info".to_string(),
                adb_path: RunnerSettings::default_adb_path(),
                poll_interval_ms: RunnerSettings::default_poll_interval(),
            },
            timeouts: TimeoutSettings::default(),
            invoker: InvokerSettings::default(),
            variants: VariantOverrides::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-reset-check/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-reset-check").join("config.toml")
        } else {
            PathBuf::from(".config/usb-reset-check/config.toml")
        }
    }

    /// adb binary with `~` expanded
    pub fn adb_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.runner.adb_path).as_ref())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.runner.poll_interval_ms)
    }

    /// Preset `name` with this configuration's overrides applied
    pub fn variant(&self, name: &str) -> Option<ResetVariant> {
        let preset = ResetVariant::by_name(name)?;
        let overrides = match name {
            "gadget" => self.variants.gadget.as_ref(),
            "port" => self.variants.port.as_ref(),
            _ => None,
        };
        Some(match overrides {
            Some(settings) => settings.apply(preset),
            None => preset,
        })
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.runner.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.runner.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.runner.adb_path.trim().is_empty() {
            return Err(anyhow!("adb_path must not be empty"));
        }

        if self.runner.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }

        if self.timeouts.base_ms == 0 {
            return Err(anyhow!("timeouts.base_ms must be greater than 0"));
        }

        if self.timeouts.multiplier_property.trim().is_empty() {
            return Err(anyhow!("timeouts.multiplier_property must not be empty"));
        }

        if self
            .invoker
            .not_supported_phrases
            .iter()
            .any(|phrase| phrase.trim().is_empty())
        {
            return Err(anyhow!("Empty phrase in invoker.not_supported_phrases"));
        }

        Ok(())
    }
}
