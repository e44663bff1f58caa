// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Prescient Configuration
//
// YAML configuration for the prediction subsystem:
// - Pattern store roots and lock behaviour
// - Resource loader timeouts and parallelism
// - Resource cache capacity
// - Eviction policy and scheduler
// - Per-task-type default resource rankings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    DefaultRankings, EvictionPolicy, HitRateTrendRule, HitRateWindow, PolicyKind,
};
use crate::infrastructure::{LockOptions, LoaderSettings};

pub const CONFIG_PATH_ENV: &str = "PRESCIENT_CONFIG_PATH";
pub const STORE_ROOT_ENV: &str = "PRESCIENT_STORE_ROOT";
pub const LOCK_TIMEOUT_ENV: &str = "PRESCIENT_LOCK_TIMEOUT_MS";
pub const EVICTION_POLICY_ENV: &str = "PRESCIENT_EVICTION_POLICY";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to write config at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescientConfig {
    pub store: StoreConfig,
    pub loader: LoaderConfig,
    pub cache: CacheConfig,
    pub eviction: EvictionConfig,

    /// Task type → ordered resource ids, layered over the built-in table
    pub default_resources: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Candidate store roots, in priority order. `~/` expands to the home directory.
    pub roots: Vec<PathBuf>,

    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub lock_retry_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,

    pub max_parallel_probable: usize,

    /// Directory holding `<id>.md` or `<id>/SKILL.md`
    pub skills_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Resident resources
    pub capacity: usize,

    /// Warn once when resident bytes cross this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_budget: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    pub policy: PolicyKind,

    /// Store capacity that `target_free_fraction` is measured against
    pub max_records: usize,

    pub min_retained: usize,

    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Cache lookups remembered by the adaptive policy
    pub window: usize,

    pub min_samples: usize,

    pub trend_threshold: f64,

    pub target_free_fraction: f64,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    pub enabled: bool,
}

fn default_store_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".prescient").join("store"))
        .unwrap_or_else(|| PathBuf::from(".prescient/store"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            roots: vec![default_store_root()],
            lock_timeout: crate::infrastructure::file_lock::DEFAULT_LOCK_TIMEOUT,
            lock_retry_interval: crate::infrastructure::file_lock::DEFAULT_LOCK_RETRY,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_timeout: crate::infrastructure::loader::DEFAULT_LOAD_TIMEOUT,
            max_parallel_probable: crate::infrastructure::loader::DEFAULT_MAX_PARALLEL_PROBABLE,
            skills_dir: PathBuf::from("skills"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: crate::infrastructure::DEFAULT_CACHE_CAPACITY,
            byte_budget: None,
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        let rule = HitRateTrendRule::default();
        Self {
            policy: PolicyKind::Recency,
            max_records: 1000,
            min_retained: 50,
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
            window: 100,
            min_samples: rule.min_samples,
            trend_threshold: rule.decline_threshold,
            target_free_fraction: 0.2,
            interval: Duration::from_secs(60 * 60),
            enabled: true,
        }
    }
}

impl Default for PrescientConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            loader: LoaderConfig::default(),
            cache: CacheConfig::default(),
            eviction: EvictionConfig::default(),
            default_resources: HashMap::new(),
        }
    }
}

impl PrescientConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml_string()?).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Discover configuration file using precedence order
    /// 1. PRESCIENT_CONFIG_PATH environment variable
    /// 2. ./prescient.yaml (working directory)
    /// 3. ~/.prescient/config.yaml (user home)
    /// 4. /etc/prescient/config.yaml (Unix) or C:\ProgramData\Prescient\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!("{} points at missing file {:?}, ignoring", CONFIG_PATH_ENV, path);
        }

        let cwd = PathBuf::from("./prescient.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".prescient").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Prescient\\config.yaml");
        #[cfg(not(windows))]
        let system_config = PathBuf::from("/etc/prescient/config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// An explicit path must exist and parse.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match cli_path.or_else(Self::discover_config) {
            Some(path) => {
                tracing::info!("Loading configuration from {:?}", path);
                Self::from_yaml_file(&path)?
            }
            None => {
                tracing::debug!("No configuration file found in standard locations, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. Invalid values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(STORE_ROOT_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::info!("Environment override: {}={}", STORE_ROOT_ENV, root);
            self.store.roots = std::env::split_paths(&root).collect();
        }

        if let Some(val) = lookup(LOCK_TIMEOUT_ENV) {
            match val.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => {
                    tracing::info!("Environment override: {}={}", LOCK_TIMEOUT_ENV, ms);
                    self.store.lock_timeout = Duration::from_millis(ms);
                }
                _ => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected a positive number of milliseconds. Ignoring.",
                    LOCK_TIMEOUT_ENV,
                    val
                ),
            }
        }

        if let Some(val) = lookup(EVICTION_POLICY_ENV) {
            match PolicyKind::parse(&val) {
                Some(policy) => {
                    tracing::info!("Environment override: {}={}", EVICTION_POLICY_ENV, policy);
                    self.eviction.policy = policy;
                }
                None => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected recency/frequency/time_to_live/adaptive. Ignoring.",
                    EVICTION_POLICY_ENV,
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.store.roots.is_empty() {
            return invalid("store.roots must list at least one directory".into());
        }
        if let Some(root) = self.store.roots.iter().find(|r| r.as_os_str().is_empty()) {
            return invalid(format!("store.roots contains an empty path: {:?}", root));
        }
        if self.store.lock_timeout.is_zero() {
            return invalid("store.lock_timeout must be greater than zero".into());
        }
        if self.loader.load_timeout.is_zero() {
            return invalid("loader.load_timeout must be greater than zero".into());
        }
        if self.loader.max_parallel_probable == 0 {
            return invalid("loader.max_parallel_probable must be greater than zero".into());
        }
        if self.cache.capacity == 0 {
            return invalid("cache.capacity must be greater than zero".into());
        }
        if self.eviction.max_records == 0 {
            return invalid("eviction.max_records must be greater than zero".into());
        }
        if self.eviction.min_retained > self.eviction.max_records {
            return invalid(format!(
                "eviction.min_retained ({}) cannot exceed eviction.max_records ({})",
                self.eviction.min_retained, self.eviction.max_records
            ));
        }
        if self.eviction.window < 2 {
            return invalid("eviction.window must hold at least two samples".into());
        }
        if !(0.0..=1.0).contains(&self.eviction.target_free_fraction) {
            return invalid("eviction.target_free_fraction must be within [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.eviction.trend_threshold) {
            return invalid("eviction.trend_threshold must be within [0, 1]".into());
        }
        if self.eviction.enabled && self.eviction.interval.is_zero() {
            return invalid("eviction.interval must be greater than zero when enabled".into());
        }
        for (task_type, resources) in &self.default_resources {
            if task_type.trim().is_empty() {
                return invalid("default_resources contains an empty task type".into());
            }
            if resources.iter().any(|r| r.trim().is_empty()) {
                return invalid(format!("default_resources.{} contains an empty resource id", task_type));
            }
        }
        Ok(())
    }

    /// Store roots with a leading `~` expanded.
    pub fn candidate_roots(&self) -> Vec<PathBuf> {
        self.store.roots.iter().map(|root| expand_home(root)).collect()
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: self.store.lock_timeout,
            retry_interval: self.store.lock_retry_interval,
        }
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            load_timeout: self.loader.load_timeout,
            max_parallel_probable: self.loader.max_parallel_probable,
        }
    }

    pub fn skills_dir(&self) -> PathBuf {
        expand_home(&self.loader.skills_dir)
    }

    pub fn default_rankings(&self) -> DefaultRankings {
        DefaultRankings::with_overrides(&self.default_resources)
    }

    pub fn hit_rate_window(&self) -> Arc<HitRateWindow> {
        Arc::new(HitRateWindow::new(self.eviction.window))
    }

    pub fn eviction_policy(&self, window: Arc<HitRateWindow>) -> EvictionPolicy {
        let ttl = chrono::Duration::from_std(self.eviction.ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        EvictionPolicy::new(self.eviction.policy, ttl, window).with_rule(Arc::new(HitRateTrendRule {
            min_samples: self.eviction.min_samples,
            decline_threshold: self.eviction.trend_threshold,
        }))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PrescientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.eviction.policy, PolicyKind::Recency);
        assert_eq!(config.store.roots.len(), 1);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
store:
  roots: ["/var/lib/prescient", "~/.prescient/store"]
  lock_timeout: 2s
loader:
  load_timeout: 500ms
  max_parallel_probable: 2
  skills_dir: /opt/skills
cache:
  capacity: 8
  byte_budget: 1048576
eviction:
  policy: adaptive
  max_records: 200
  min_retained: 10
  ttl: 7d
  interval: 15m
default_resources:
  migration: [schema-diff, rollback-plan]
"#;
        let config = PrescientConfig::from_yaml_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.store.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.store.lock_retry_interval, crate::infrastructure::file_lock::DEFAULT_LOCK_RETRY);
        assert_eq!(config.loader.load_timeout, Duration::from_millis(500));
        assert_eq!(config.cache.byte_budget, Some(1_048_576));
        assert_eq!(config.eviction.policy, PolicyKind::Adaptive);
        assert_eq!(config.eviction.ttl, Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(config.eviction.window, 100);
        assert_eq!(config.default_rankings().for_task_type("migration")[0].resource_id, "schema-diff");
        assert_eq!(config.candidate_roots()[0], PathBuf::from("/var/lib/prescient"));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = PrescientConfig::default();
        config.cache.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PrescientConfig::default();
        config.eviction.max_records = 10;
        config.eviction.min_retained = 11;
        assert!(config.validate().is_err());

        let mut config = PrescientConfig::default();
        config.store.roots.clear();
        assert!(config.validate().is_err());

        let mut config = PrescientConfig::default();
        config.store.roots = vec![PathBuf::new()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (STORE_ROOT_ENV, "/tmp/prescient-a"),
            (LOCK_TIMEOUT_ENV, "250"),
            (EVICTION_POLICY_ENV, "lfu"),
        ]);
        let mut config = PrescientConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.roots, vec![PathBuf::from("/tmp/prescient-a")]);
        assert_eq!(config.store.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.eviction.policy, PolicyKind::Frequency);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            (LOCK_TIMEOUT_ENV, "soon"),
            (EVICTION_POLICY_ENV, "random"),
        ]);
        let mut config = PrescientConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.lock_timeout, crate::infrastructure::file_lock::DEFAULT_LOCK_TIMEOUT);
        assert_eq!(config.eviction.policy, PolicyKind::Recency);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            PrescientConfig::load_or_default(Some(missing)),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("prescient.yaml");
        let mut config = PrescientConfig::default();
        config.cache.capacity = 3;
        config.to_yaml_file(&path).unwrap();
        assert_eq!(PrescientConfig::from_yaml_file(&path).unwrap().cache.capacity, 3);
    }
}
