//! Tracker configuration and on-disk layout.
//!
//! Values come from explicit overrides first, then `LESSONPATH_*`
//! environment variables, then built-in defaults. Resolution takes a lookup
//! function so it can be exercised without touching the process
//! environment.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::core::{CoreError, CoreResult};
use crate::entitlement::SubscriptionStatus;
use crate::merge::MergeStrategy;
use crate::unlock::DEFAULT_FREE_LESSON_COUNT;

pub const FREE_LESSONS_VAR: &str = "LESSONPATH_FREE_LESSONS";
pub const MERGE_STRATEGY_VAR: &str = "LESSONPATH_MERGE_STRATEGY";
pub const REMOTE_TIMEOUT_VAR: &str = "LESSONPATH_REMOTE_TIMEOUT_MS";
pub const DATA_DIR_VAR: &str = "LESSONPATH_DATA_DIR";
pub const USER_VAR: &str = "LESSONPATH_USER";
pub const SUBSCRIPTION_VAR: &str = "LESSONPATH_SUBSCRIPTION";

const DEFAULT_DATA_DIR: &str = ".lessonpath";
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`crate::core::ProgressTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Lessons open without a subscription.
    pub free_lesson_count: usize,
    pub merge_strategy: MergeStrategy,
    /// How long the SQLite remote waits on a locked database.
    pub remote_busy_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            free_lesson_count: DEFAULT_FREE_LESSON_COUNT,
            merge_strategy: MergeStrategy::default(),
            remote_busy_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

impl TrackerConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset or empty keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get(FREE_LESSONS_VAR) {
            config.free_lesson_count = raw
                .trim()
                .parse()
                .map_err(|e| config_error(FREE_LESSONS_VAR, &raw, e))?;
        }
        if let Some(raw) = get(MERGE_STRATEGY_VAR) {
            config.merge_strategy = raw
                .parse()
                .map_err(|e: String| config_error(MERGE_STRATEGY_VAR, &raw, e))?;
        }
        if let Some(raw) = get(REMOTE_TIMEOUT_VAR) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e| config_error(REMOTE_TIMEOUT_VAR, &raw, e))?;
            config.remote_busy_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

fn config_error(key: &str, raw: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::Config {
        detail: format!("{key}={raw:?}: {err}"),
    }
}

/// Where the tracker keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data directory.
    ///
    /// Resolution order:
    /// 1. Explicit override (`--data-dir`)
    /// 2. `LESSONPATH_DATA_DIR` environment variable
    /// 3. `$HOME/.lessonpath`
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, |key| env::var(key).ok())
    }

    pub fn resolve_with(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|s| !s.is_empty()) {
            return Ok(Self::new(dir));
        }
        if let Some(home) = lookup("HOME").filter(|s| !s.is_empty()) {
            return Ok(Self::new(Path::new(&home).join(DEFAULT_DATA_DIR)));
        }
        bail!("No data directory. Use --data-dir <path>, or set {DATA_DIR_VAR} or HOME.")
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn progress_path(&self) -> PathBuf {
        self.root.join("progress.json")
    }

    #[must_use]
    pub fn remote_db_path(&self) -> PathBuf {
        self.root.join("remote.db")
    }

    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.json")
    }
}

/// Resolve the signed-in user: explicit override, then `LESSONPATH_USER`.
#[must_use]
pub fn resolve_user_id(explicit: Option<&str>) -> Option<String> {
    resolve_user_id_with(explicit, |key| env::var(key).ok())
}

pub fn resolve_user_id_with(
    explicit: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| lookup(USER_VAR))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the subscription status: explicit override, then
/// `LESSONPATH_SUBSCRIPTION`, then none.
pub fn resolve_subscription(
    explicit: Option<SubscriptionStatus>,
) -> CoreResult<SubscriptionStatus> {
    resolve_subscription_with(explicit, |key| env::var(key).ok())
}

pub fn resolve_subscription_with(
    explicit: Option<SubscriptionStatus>,
    lookup: impl Fn(&str) -> Option<String>,
) -> CoreResult<SubscriptionStatus> {
    if let Some(status) = explicit {
        return Ok(status);
    }
    match lookup(SUBSCRIPTION_VAR) {
        Some(raw) => raw
            .parse()
            .map_err(|e: String| config_error(SUBSCRIPTION_VAR, &raw, e)),
        None => Ok(SubscriptionStatus::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.free_lesson_count, 15);
        assert_eq!(config.merge_strategy, MergeStrategy::HighestXp);
        assert_eq!(config.remote_busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides() {
        let config = TrackerConfig::from_lookup(lookup(&[
            (FREE_LESSONS_VAR, "3"),
            (MERGE_STRATEGY_VAR, "union"),
            (REMOTE_TIMEOUT_VAR, "250"),
        ]))
        .unwrap();
        assert_eq!(config.free_lesson_count, 3);
        assert_eq!(config.merge_strategy, MergeStrategy::Union);
        assert_eq!(config.remote_busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = TrackerConfig::from_lookup(lookup(&[(FREE_LESSONS_VAR, "lots")])).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(err.to_string().contains(FREE_LESSONS_VAR));

        assert!(TrackerConfig::from_lookup(lookup(&[(MERGE_STRATEGY_VAR, "newest")])).is_err());
    }

    #[test]
    fn test_data_layout_resolution_order() {
        let env = lookup(&[(DATA_DIR_VAR, "/env/dir"), ("HOME", "/home/ada")]);
        let explicit = DataLayout::resolve_with(Some(Path::new("/flag")), &env).unwrap();
        assert_eq!(explicit.root(), Path::new("/flag"));

        let from_env = DataLayout::resolve_with(None, &env).unwrap();
        assert_eq!(from_env.progress_path(), PathBuf::from("/env/dir/progress.json"));

        let home = DataLayout::resolve_with(None, lookup(&[("HOME", "/home/ada")])).unwrap();
        assert_eq!(home.remote_db_path(), PathBuf::from("/home/ada/.lessonpath/remote.db"));

        assert!(DataLayout::resolve_with(None, lookup(&[])).is_err());
    }

    #[test]
    fn test_user_resolution() {
        let env = lookup(&[(USER_VAR, "ada")]);
        assert_eq!(resolve_user_id_with(Some("bob"), &env), Some("bob".to_string()));
        assert_eq!(resolve_user_id_with(None, &env), Some("ada".to_string()));
        assert_eq!(resolve_user_id_with(None, lookup(&[(USER_VAR, "  ")])), None);
    }

    #[test]
    fn test_subscription_resolution() {
        let env = lookup(&[(SUBSCRIPTION_VAR, "trialing")]);
        assert_eq!(
            resolve_subscription_with(None, &env).unwrap(),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            resolve_subscription_with(Some(SubscriptionStatus::Canceled), &env).unwrap(),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            resolve_subscription_with(None, lookup(&[])).unwrap(),
            SubscriptionStatus::None
        );
        assert!(resolve_subscription_with(None, lookup(&[(SUBSCRIPTION_VAR, "gold")])).is_err());
    }
}
