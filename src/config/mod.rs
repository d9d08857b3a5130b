// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! Configuration module

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adaptive::AdaptiveConfig;
use crate::analysis::AnalyzerConfig;
use crate::detection::CoordinatorConfig;
use crate::error::ConfigError;
use crate::memory::MemoryConfig;

/// Longest interval, age or delay any component accepts (one year)
pub const MAX_PERIOD_SECS: u64 = 365 * 24 * 60 * 60;

/// Whole seconds as a signed duration, saturating at [`MAX_PERIOD_SECS`]
pub(crate) fn period_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_PERIOD_SECS) as i64)
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Fusion coordinator
    pub coordinator: CoordinatorConfig,

    /// Adaptive processing controller
    pub adaptive: AdaptiveConfig,

    /// Pattern analyzer
    pub analyzer: AnalyzerConfig,

    /// Pooled allocator
    pub memory: MemoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            coordinator: CoordinatorConfig::default(),
            adaptive: AdaptiveConfig::default(),
            analyzer: AnalyzerConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Check every component section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;
        self.adaptive.validate()?;
        self.analyzer.validate()?;
        self.memory.validate()
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("trailsense"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Configuration pushed from another task.
///
/// Readers take an `Arc` snapshot and keep it for the whole cycle, so a
/// concurrent `replace` is seen from the next snapshot on and never
/// half-applied. Writers are expected to validate before replacing.
#[derive(Debug)]
pub struct SharedConfig<T> {
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for SharedConfig<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> SharedConfig<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(value))),
        }
    }

    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&*self.inner.read())
    }

    pub fn replace(&self, value: T) {
        *self.inner.write() = Arc::new(value);
    }

    /// Copy-on-write edit
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut guard = self.inner.write();
        let mut next: T = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionMethod;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("trailsense-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_period_saturates() {
        assert_eq!(period_secs(90), Duration::seconds(90));
        assert_eq!(period_secs(u64::MAX), Duration::seconds(MAX_PERIOD_SECS as i64));
        assert!(period_secs(u64::MAX) > Duration::zero());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::default_path().ends_with("config.toml"));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.coordinator.method = DetectionMethod::HybridAi;
        config.adaptive.dormant_interval_secs = 45;
        config.memory.temp.block_count = 12;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let parsed: Config = toml::from_str("log_level = \"debug\"\n[coordinator]\nmethod = \"pir-only\"\n").unwrap();
        assert_eq!(parsed.log_level, "debug");
        assert_eq!(parsed.coordinator.method, DetectionMethod::PirOnly);
        assert_eq!(parsed.adaptive, AdaptiveConfig::default());
    }

    #[test]
    fn test_load_or_create() {
        let path = temp_path("config.toml");
        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(created, loaded);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let path = temp_path("bad.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[coordinator]\nalert_threshold = 3.0\n").unwrap();
        assert!(Config::load(&path).is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_shared_config_snapshot() {
        let shared = SharedConfig::new(CoordinatorConfig::default());
        let handle = shared.clone();

        let before = shared.snapshot();
        handle.update(|c| c.method = DetectionMethod::PirOnly);

        assert_eq!(before.method, DetectionMethod::Adaptive);
        assert_eq!(shared.snapshot().method, DetectionMethod::PirOnly);

        handle.replace(CoordinatorConfig::default());
        assert_eq!(shared.snapshot().method, DetectionMethod::Adaptive);
    }
}
