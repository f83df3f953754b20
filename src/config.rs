use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::backoff::RetryPolicy;
use crate::errors::{InvsyncError, InvsyncResult};
use crate::perception::stability::SettleConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Interaction retries are short: UI state changes within seconds.
    #[serde(deserialize_with = "interaction_retry")]
    pub retry: RetryPolicy,
    /// Per-attempt budget for an element to become actionable.
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub capture_snapshots: bool,
    pub settle: SettleConfig,
    /// Applied to each recognizer call on the fallback path.
    #[serde(deserialize_with = "recognition_retry")]
    pub recognition_retry: RetryPolicy,
    /// Wait between opening a dropdown and looking for its option.
    pub option_open_delay_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3, 250, 2_000, 2.0),
            timeout_ms: 10_000,
            poll_interval_ms: 100,
            capture_snapshots: true,
            settle: SettleConfig::default(),
            recognition_retry: RetryPolicy::new(1, 200, 1_000, 2.0),
            option_open_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// 0–100.
    pub fuzzy_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: crate::matching::DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub per_item_timeout_ms: u64,
    /// Failed/processed fraction above which remaining items are skipped.
    pub error_threshold: f64,
    pub abort_on_error: bool,
    #[serde(deserialize_with = "item_retry")]
    pub item_retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            batch_size: 25,
            per_item_timeout_ms: 120_000,
            error_threshold: 0.5,
            abort_on_error: true,
            item_retry: RetryPolicy::new(2, 1_000, 10_000, 2.0),
        }
    }
}

// A partial `*_retry` table keeps its own section's defaults for the keys it omits.
fn interaction_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    RetryPolicy::deserialize_over(deserializer, InteractionConfig::default().retry)
}

fn recognition_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    RetryPolicy::deserialize_over(deserializer, InteractionConfig::default().recognition_retry)
}

fn item_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    RetryPolicy::deserialize_over(deserializer, BatchConfig::default().item_retry)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub dir: Option<PathBuf>,
    pub persist: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: None,
            persist: true,
        }
    }
}

impl SnapshotConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::perception::screenshot::default_snapshot_dir)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Batch runs write a JSONL journal here when set.
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Checks cross-field constraints the types cannot express.
    pub fn validate(&self) -> InvsyncResult<()> {
        for (name, policy) in [
            ("interaction.retry", &self.interaction.retry),
            ("interaction.recognition_retry", &self.interaction.recognition_retry),
            ("batch.item_retry", &self.batch.item_retry),
        ] {
            validate_policy(name, policy)?;
        }

        if self.batch.max_concurrency == 0 {
            return Err(InvsyncError::Config("batch.max_concurrency must be at least 1".into()));
        }
        if self.batch.batch_size == 0 {
            return Err(InvsyncError::Config("batch.batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.batch.error_threshold) {
            return Err(InvsyncError::Config(format!(
                "batch.error_threshold must be within 0.0..=1.0, got {}",
                self.batch.error_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.matcher.fuzzy_threshold) {
            return Err(InvsyncError::Config(format!(
                "matcher.fuzzy_threshold must be within 0..=100, got {}",
                self.matcher.fuzzy_threshold
            )));
        }
        if self.interaction.timeout_ms >= self.batch.per_item_timeout_ms {
            return Err(InvsyncError::Config(format!(
                "interaction.timeout_ms ({}) must be smaller than batch.per_item_timeout_ms ({})",
                self.interaction.timeout_ms, self.batch.per_item_timeout_ms
            )));
        }
        Ok(())
    }

    /// `INVSYNC_*` variables win over the file.
    pub fn apply_env_overrides(&mut self) -> InvsyncResult<()> {
        if let Some(v) = env_parse::<usize>("INVSYNC_MAX_CONCURRENCY")? {
            self.batch.max_concurrency = v;
        }
        if let Some(v) = env_parse::<usize>("INVSYNC_BATCH_SIZE")? {
            self.batch.batch_size = v;
        }
        if let Some(v) = env_parse::<f64>("INVSYNC_FUZZY_THRESHOLD")? {
            self.matcher.fuzzy_threshold = v;
        }
        if let Some(v) = env_parse::<bool>("INVSYNC_ABORT_ON_ERROR")? {
            self.batch.abort_on_error = v;
        }
        Ok(())
    }
}

fn validate_policy(name: &str, policy: &RetryPolicy) -> InvsyncResult<()> {
    if policy.factor < 1.0 || !policy.factor.is_finite() {
        return Err(InvsyncError::Config(format!(
            "{name}.factor must be a finite value >= 1, got {}",
            policy.factor
        )));
    }
    if policy.min_delay_ms > policy.max_delay_ms {
        return Err(InvsyncError::Config(format!(
            "{name}.min_delay_ms ({}) exceeds max_delay_ms ({})",
            policy.min_delay_ms, policy.max_delay_ms
        )));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> InvsyncResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| InvsyncError::Config(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("INVSYNC_CONFIG") {
        let candidate = PathBuf::from(explicit);
        tracing::debug!(path = %candidate.display(), "config path from INVSYNC_CONFIG");
        return Some(candidate);
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Parse, apply env overrides and validate a specific file.
pub fn load_config_from(path: &Path) -> InvsyncResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    config.apply_env_overrides()?;
    config.validate()?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load `.env`, then `config.toml` if one is found, else defaults.
pub fn load_config() -> InvsyncResult<AppConfig> {
    let _ = dotenvy::dotenv();

    match resolve_config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::info!("no config.toml found, using defaults");
            let mut config = AppConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

pub fn save_config(config: &AppConfig, path: &Path) -> InvsyncResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
