//! Runtime configuration.
//!
//! Values come from a TOML document with per-field defaults, then
//! `RECAPFLOW_*` environment variables override individual settings.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::budget::BudgetConfig;
use crate::errors::ConfigError;
use crate::invoker::ModelSelection;
use crate::notify::FIELD_CHAR_LIMIT;
use crate::pipeline::{DrainConfig, OrchestratorBuilder, RetryPolicy, StageCosts};
use crate::recovery::BlobRecoveryStore;
use crate::storage::BlobStore;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RECAPFLOW_";

fn default_model_retry() -> RetryPolicy {
    RetryPolicy::model_default()
}

fn default_notification_retry() -> RetryPolicy {
    RetryPolicy::notification_default()
}

fn default_preferences() -> Vec<String> {
    vec![
        "gemini-2.5-pro".to_string(),
        "gemini-2.5-flash".to_string(),
        "gemini-2.0-flash".to_string(),
    ]
}

fn default_inline_limit() -> usize {
    20 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_field_limit() -> usize {
    FIELD_CHAR_LIMIT
}

fn default_secondary_timeout_secs() -> u64 {
    5
}

fn default_artifact_root() -> Vec<String> {
    vec!["recordings".to_string()]
}

fn default_recovery_root() -> Vec<String> {
    vec!["recovery".to_string()]
}

/// Model selection and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Catalog lookup or fixed list.
    #[serde(default)]
    pub selection: ModelSelection,
    /// Models in order of preference, most capable first.
    #[serde(default = "default_preferences")]
    pub preferences: Vec<String>,
    /// Per-model retry policy.
    #[serde(default = "default_model_retry")]
    pub retry: RetryPolicy,
    /// Largest media sent inline to the provider.
    #[serde(default = "default_inline_limit")]
    pub inline_media_limit_bytes: usize,
    /// Per-request HTTP timeout for the model API.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            selection: ModelSelection::default(),
            preferences: default_preferences(),
            retry: default_model_retry(),
            inline_media_limit_bytes: default_inline_limit(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Chat delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Delivery retry policy.
    #[serde(default = "default_notification_retry")]
    pub retry: RetryPolicy,
    /// Character limit per message field.
    #[serde(default = "default_field_limit")]
    pub field_limit: usize,
    /// Timeout for best-effort messages.
    #[serde(default = "default_secondary_timeout_secs")]
    pub secondary_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            retry: default_notification_retry(),
            field_limit: default_field_limit(),
            secondary_timeout_secs: default_secondary_timeout_secs(),
        }
    }
}

/// Blob store path roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root segments for artifacts and execution logs.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: Vec<String>,
    /// Root segments for recovery records.
    #[serde(default = "default_recovery_root")]
    pub recovery_root: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_artifact_root(),
            recovery_root: default_recovery_root(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecapflowConfig {
    /// Execution budget.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,
    /// Notification settings.
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Storage roots.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Worst-case stage costs.
    #[serde(default)]
    pub stage_costs: StageCosts,
    /// Recording pickup.
    #[serde(default)]
    pub drain: DrainConfig,
}

impl RecapflowConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads, parses, applies environment overrides and validates.
    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .apply_env_overrides()
            .context("applying environment overrides")?;
        config.validate().context("validating config")?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Applies `RECAPFLOW_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = get("HARD_CEILING_SECS") {
            self.budget.hard_ceiling_secs = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = get("SAFETY_MARGIN_SECS") {
            self.budget.safety_margin_secs = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = get("MODEL_SELECTION") {
            self.model.selection = match value.trim().to_ascii_lowercase().as_str() {
                "auto" => ModelSelection::Auto,
                "fixed" => ModelSelection::Fixed,
                _ => return Err(ConfigError::Env { key, value }),
            };
        }
        if let Some((_, value)) = get("MODELS") {
            self.model.preferences = split_list(&value, ',');
        }
        if let Some((key, value)) = get("MODEL_MAX_ATTEMPTS") {
            self.model.retry.max_attempts = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = get("NOTIFICATION_MAX_ATTEMPTS") {
            self.notification.retry.max_attempts = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = get("FIELD_LIMIT") {
            self.notification.field_limit = parse_number(&key, &value)?;
        }
        if let Some((_, value)) = get("ARTIFACT_ROOT") {
            self.storage.artifact_root = split_list(&value, '/');
        }
        if let Some((_, value)) = get("RECOVERY_ROOT") {
            self.storage.recovery_root = split_list(&value, '/');
        }
        if let Some((key, value)) = get("LOOKBACK_DAYS") {
            self.drain.lookback_days = parse_number(&key, &value)?;
        }
        Ok(())
    }

    /// Rejects settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.budget.safety_margin_secs >= self.budget.hard_ceiling_secs {
            return invalid("budget.safety_margin_secs must be below budget.hard_ceiling_secs");
        }
        if self.model.retry.max_attempts == 0 {
            return invalid("model.retry.max_attempts must be at least 1");
        }
        if self.notification.retry.max_attempts == 0 {
            return invalid("notification.retry.max_attempts must be at least 1");
        }
        if self.model.selection == ModelSelection::Fixed && self.model.preferences.is_empty() {
            return invalid("model.preferences cannot be empty with fixed selection");
        }
        if self.model.request_timeout_secs == 0 {
            return invalid("model.request_timeout_secs must be positive");
        }
        if self.notification.field_limit == 0 {
            return invalid("notification.field_limit must be positive");
        }
        if self.storage.artifact_root.is_empty() || self.storage.recovery_root.is_empty() {
            return invalid("storage roots cannot be empty");
        }
        if self.storage.artifact_root == self.storage.recovery_root {
            return invalid("storage.recovery_root must differ from storage.artifact_root");
        }
        Ok(())
    }

    /// Timeout for best-effort messages.
    #[must_use]
    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_secs(self.notification.secondary_timeout_secs)
    }

    /// Copies every tunable onto an orchestrator builder.
    #[must_use]
    pub fn apply_to(&self, builder: OrchestratorBuilder) -> OrchestratorBuilder {
        builder
            .budget(self.budget.clone())
            .stage_costs(self.stage_costs.clone())
            .models(self.model.selection, self.model.preferences.clone())
            .model_policy(self.model.retry.clone())
            .notification_policy(self.notification.retry.clone())
            .field_limit(self.notification.field_limit)
            .secondary_timeout(self.secondary_timeout())
            .artifact_root(self.storage.artifact_root.clone())
    }

    /// A recovery store rooted at `storage.recovery_root`.
    #[must_use]
    pub fn recovery_store(&self, store: Arc<dyn BlobStore>) -> BlobRecoveryStore {
        BlobRecoveryStore::new(store, self.storage.recovery_root.clone())
    }

    /// A Gemini provider honouring the model request timeout and inline
    /// media limit.
    #[cfg(feature = "http")]
    pub fn gemini_provider(
        &self,
        api_key: impl Into<String>,
    ) -> Result<crate::invoker::GeminiModelProvider, crate::errors::ProviderError> {
        let timeout = Duration::from_secs(self.model.request_timeout_secs);
        Ok(crate::invoker::GeminiModelProvider::new(api_key, timeout)?
            .with_inline_limit(self.model.inline_media_limit_bytes))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn split_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BackoffStrategy;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RecapflowConfig::default();
        assert_eq!(config.budget.hard_ceiling_secs, 360);
        assert_eq!(config.budget.safety_margin_secs, 5);
        assert_eq!(config.model.retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.notification.retry.backoff, BackoffStrategy::Linear);
        assert_eq!(config.notification.field_limit, FIELD_CHAR_LIMIT);
        assert_eq!(config.model.request_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RecapflowConfig::from_toml_str(
            r#"
            [budget]
            hard_ceiling_secs = 540

            [model]
            selection = "fixed"
            preferences = ["gemini-2.5-flash"]

            [model.retry]
            max_attempts = 5

            [storage]
            artifact_root = ["team", "meetings"]
            "#,
        )
        .unwrap();

        assert_eq!(config.budget.hard_ceiling_secs, 540);
        assert_eq!(config.budget.safety_margin_secs, 5);
        assert_eq!(config.model.selection, ModelSelection::Fixed);
        assert_eq!(config.model.retry.max_attempts, 5);
        assert_eq!(config.storage.artifact_root, vec!["team", "meetings"]);
        assert_eq!(config.storage.recovery_root, vec!["recovery"]);
        assert_eq!(config.stage_costs, StageCosts::default());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = RecapflowConfig::from_toml_str("[budget\nx = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RECAPFLOW_HARD_CEILING_SECS", "900"),
            ("RECAPFLOW_MODEL_SELECTION", "Fixed"),
            ("RECAPFLOW_MODELS", "a, b ,,c"),
            ("RECAPFLOW_ARTIFACT_ROOT", "shared/meetings/"),
        ]
        .into_iter()
        .collect();

        let mut config = RecapflowConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.budget.hard_ceiling_secs, 900);
        assert_eq!(config.model.selection, ModelSelection::Fixed);
        assert_eq!(config.model.preferences, vec!["a", "b", "c"]);
        assert_eq!(config.storage.artifact_root, vec!["shared", "meetings"]);
    }

    #[test]
    fn test_bad_override_names_the_variable() {
        let mut config = RecapflowConfig::default();
        let err = config
            .apply_overrides(|key| (key == "RECAPFLOW_FIELD_LIMIT").then(|| "lots".to_string()))
            .unwrap_err();
        match err {
            ConfigError::Env { key, value } => {
                assert_eq!(key, "RECAPFLOW_FIELD_LIMIT");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects() {
        let mut margin = RecapflowConfig::default();
        margin.budget.safety_margin_secs = 360;
        assert!(margin.validate().is_err());

        let mut attempts = RecapflowConfig::default();
        attempts.model.retry.max_attempts = 0;
        assert!(attempts.validate().is_err());

        let mut fixed = RecapflowConfig::default();
        fixed.model.selection = ModelSelection::Fixed;
        fixed.model.preferences.clear();
        assert!(fixed.validate().is_err());

        let mut timeout = RecapflowConfig::default();
        timeout.model.request_timeout_secs = 0;
        assert!(timeout.validate().is_err());

        let mut roots = RecapflowConfig::default();
        roots.storage.recovery_root = roots.storage.artifact_root.clone();
        assert!(roots.validate().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[drain]\nlookback_days = 7").unwrap();

        let config = RecapflowConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.drain.lookback_days, 7);

        let missing = RecapflowConfig::load_from_path("/nonexistent/recapflow.toml").unwrap_err();
        assert!(format!("{missing:#}").contains("reading config file"));
    }
}
