//! Engine configuration
//!
//! Loaded from a JSON file; every field has a default so a missing file or a
//! partial file still yields a usable config. `TUITION_LEDGER_DB` overrides the
//! database path.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Env var that overrides `database_path`
pub const DB_PATH_ENV: &str = "TUITION_LEDGER_DB";

/// What to do when co-attending students disagree on lessons per week
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonsPerWeekPolicy {
    /// Abort the rebuild
    Reject,

    /// Schedule the largest requested count
    #[default]
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub wal_mode: bool,
    pub busy_timeout_ms: u64,
    pub lessons_per_week_policy: LessonsPerWeekPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tuition-ledger.db"),
            wal_mode: true,
            busy_timeout_ms: 5_000,
            lessons_per_week_policy: LessonsPerWeekPolicy::Max,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    /// A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        self.apply_db_override(std::env::var(DB_PATH_ENV).ok());
    }

    /// Replace `database_path` unless the override is absent or blank
    pub fn apply_db_override(&mut self, db_path: Option<String>) {
        if let Some(db_path) = db_path.filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(db_path);
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
