//! Runtime configuration.
//!
//! Policy constants for polling and self-correction live here rather than
//! in the controllers. Configuration is read from `.reel/config.toml`
//! under the workspace root, then overridden from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Directory holding workspace-local settings.
pub const CONFIG_DIR: &str = ".reel";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Polling policy for a render job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderPolicy {
    /// Overall wall-clock budget for one job (default: 5 minutes)
    pub deadline_secs: u64,
    /// Pause between successful status checks (default: 1500 ms)
    pub poll_interval_ms: u64,
    /// Consecutive failed checks before giving up (default: 5)
    pub max_consecutive_failures: u32,
    /// Multiplier applied to the interval after a failed check (default: 2)
    pub failure_backoff_factor: u32,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            deadline_secs: 5 * 60,
            poll_interval_ms: 1500,
            max_consecutive_failures: 5,
            failure_backoff_factor: 2,
        }
    }
}

impl RenderPolicy {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wait applied after a failed check.
    pub fn failure_backoff(&self) -> Duration {
        self.poll_interval().saturating_mul(self.failure_backoff_factor)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.deadline_secs == 0 {
            return Err(ConfigError::invalid("render.deadline_secs", "must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("render.poll_interval_ms", "must be greater than zero"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::invalid(
                "render.max_consecutive_failures",
                "must be at least 1",
            ));
        }
        if self.failure_backoff_factor < 2 {
            return Err(ConfigError::invalid(
                "render.failure_backoff_factor",
                "must be at least 2",
            ));
        }
        Ok(())
    }
}

/// Self-correction policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorrectionPolicy {
    /// Automatic corrective regenerations before the user must step in
    pub max_attempts: u32,
    /// Quiet period after a manual keystroke before compiling
    pub edit_debounce_ms: u64,
    /// Delay between scheduling a correction and sending it
    pub dispatch_delay_ms: u64,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            edit_debounce_ms: 500,
            dispatch_delay_ms: 100,
        }
    }
}

impl CorrectionPolicy {
    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("correction.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Render service endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the render API
    pub base_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Effective configuration for the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReelConfig {
    pub service: ServiceConfig,
    pub render: RenderPolicy,
    pub correction: CorrectionPolicy,
}

impl ReelConfig {
    /// Path of the settings file for a workspace.
    pub fn path_for(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from an explicit TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the workspace settings if present, falling back to defaults,
    /// then apply environment overrides.
    pub fn discover(workspace_root: &Path) -> ConfigResult<Self> {
        let path = Self::path_for(workspace_root);
        let config = if path.exists() {
            Self::load(&path)?
        } else {
            debug!("No configuration at {:?}, using defaults", path);
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Apply `REEL_*` environment variables on top of this configuration.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REEL_SERVICE_URL").filter(|v| !v.is_empty()) {
            self.service.base_url = url;
        }
        if let Some(secs) = lookup("REEL_RENDER_DEADLINE_SECS") {
            self.render.deadline_secs = secs.parse().map_err(|_| {
                ConfigError::invalid("REEL_RENDER_DEADLINE_SECS", format!("not a number: {}", secs))
            })?;
        }
        if let Some(max) = lookup("REEL_MAX_CORRECTIONS") {
            self.correction.max_attempts = max.parse().map_err(|_| {
                ConfigError::invalid("REEL_MAX_CORRECTIONS", format!("not a number: {}", max))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.service.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("service.base_url", "must not be empty"));
        }
        self.render.validate()?;
        self.correction.validate()
    }

    /// Write this configuration as TOML.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_constants() {
        let config = ReelConfig::default();
        assert_eq!(config.render.deadline(), Duration::from_secs(300));
        assert_eq!(config.render.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.render.max_consecutive_failures, 5);
        assert_eq!(config.render.failure_backoff(), Duration::from_millis(3000));
        assert_eq!(config.correction.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_failure_backoff_saturates() {
        let policy = RenderPolicy {
            poll_interval_ms: u64::MAX,
            failure_backoff_factor: u32::MAX,
            ..RenderPolicy::default()
        };
        assert_eq!(policy.failure_backoff(), Duration::MAX);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_backoff_factor_below_two_rejected() {
        let policy = RenderPolicy {
            failure_backoff_factor: 1,
            ..RenderPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let policy = CorrectionPolicy {
            max_attempts: 0,
            ..CorrectionPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ReelConfig = toml::from_str(
            r#"
            [render]
            deadline_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.render.deadline_secs, 60);
        assert_eq!(config.render.poll_interval_ms, 1500);
        assert_eq!(config.correction.max_attempts, 3);
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let config = ReelConfig::default()
            .with_overrides(|key| match key {
                "REEL_SERVICE_URL" => Some("https://render.example.com".to_string()),
                "REEL_MAX_CORRECTIONS" => Some("5".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.service.base_url, "https://render.example.com");
        assert_eq!(config.correction.max_attempts, 5);

        let bad = ReelConfig::default().with_overrides(|key| match key {
            "REEL_RENDER_DEADLINE_SECS" => Some("soon".to_string()),
            _ => None,
        });
        assert!(bad.is_err());
    }
}
