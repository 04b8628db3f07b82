//! Runtime configuration for the coordination core.
//!
//! Credentials and tunables are read from the environment (optionally
//! loaded from a `.env` file via `dotenvy`, mirroring the original
//! system's `load_dotenv()`), with numeric defaults overridable by an
//! optional `marketcore.toml` in the current directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::CapabilityClass;

/// Environment variable prefix per capability class, e.g. `EXA_API_KEY`,
/// `EXA_API_KEY_1`, `EXA_API_KEY_2`, ... Multiple keys per class are
/// collected until a suffix is missing.
const MAX_KEYS_PER_CLASS: u32 = 5;

#[derive(Debug, Deserialize, Default)]
struct FileOverrides {
    study_minutes_default: Option<u64>,
    stage1_target_bytes: Option<u64>,
    progress_cleanup_minutes: Option<u64>,
    session_max_age_days: Option<u64>,
    artifact_root: Option<PathBuf>,
    rate_recovery_seconds: Option<u64>,
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub artifact_root: PathBuf,
    pub study_minutes_default: Duration,
    pub stage1_target_bytes: u64,
    pub progress_cleanup: Duration,
    pub session_max_age_days: u64,
    pub rate_recovery: Duration,
    pub health_check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("market_analyses"),
            study_minutes_default: Duration::from_secs(5 * 60),
            stage1_target_bytes: 500 * 1024,
            progress_cleanup: Duration::from_secs(10 * 60),
            session_max_age_days: 30,
            rate_recovery: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Config {
    /// Load configuration from the environment and, if present, a
    /// `marketcore.toml` file in `project_dir`.
    pub fn load(project_dir: &std::path::Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();

        let toml_path = project_dir.join("marketcore.toml");
        if toml_path.exists() {
            let text = std::fs::read_to_string(&toml_path)
                .with_context(|| format!("failed to read {}", toml_path.display()))?;
            let overrides: FileOverrides =
                toml::from_str(&text).context("failed to parse marketcore.toml")?;
            if let Some(v) = overrides.study_minutes_default {
                cfg.study_minutes_default = Duration::from_secs(v.clamp(2, 10) * 60);
            }
            if let Some(v) = overrides.stage1_target_bytes {
                cfg.stage1_target_bytes = v;
            }
            if let Some(v) = overrides.progress_cleanup_minutes {
                cfg.progress_cleanup = Duration::from_secs(v * 60);
            }
            if let Some(v) = overrides.session_max_age_days {
                cfg.session_max_age_days = v;
            }
            if let Some(v) = overrides.artifact_root {
                cfg.artifact_root = v;
            }
            if let Some(v) = overrides.rate_recovery_seconds {
                cfg.rate_recovery = Duration::from_secs(v);
            }
        }

        if let Ok(v) = std::env::var("ARTIFACT_ROOT") {
            cfg.artifact_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("STUDY_MINUTES_DEFAULT") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.study_minutes_default = Duration::from_secs(n.clamp(2, 10) * 60);
            }
        }
        if let Ok(v) = std::env::var("STAGE1_TARGET_BYTES") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.stage1_target_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("RATE_RECOVERY_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.rate_recovery = Duration::from_secs(n);
            }
        }

        Ok(cfg)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.artifact_root).context("failed to create artifact root")?;
        std::fs::create_dir_all(self.artifact_root.join("errors"))
            .context("failed to create errors directory")?;
        std::fs::create_dir_all(self.artifact_root.join("sessions/active"))
            .context("failed to create sessions/active directory")?;
        std::fs::create_dir_all(self.artifact_root.join("sessions/completed"))
            .context("failed to create sessions/completed directory")?;
        std::fs::create_dir_all(self.artifact_root.join("sessions/metadata"))
            .context("failed to create sessions/metadata directory")?;
        std::fs::create_dir_all(self.artifact_root.join("reports"))
            .context("failed to create reports directory")?;
        Ok(())
    }
}

/// Read every credential configured for a capability class from the
/// environment, e.g. `EXA_API_KEY`, `EXA_API_KEY_1`, `EXA_API_KEY_2`, ...
///
/// A class with no configured credentials simply yields an empty vec —
/// the registry then has no endpoints in that class, per the design's
/// "missing credentials simply mean the class has no endpoints" rule.
pub fn credentials_for_class(class: CapabilityClass) -> Vec<String> {
    let env_prefix = class.env_prefix();
    let mut keys = Vec::new();

    if let Ok(v) = std::env::var(format!("{env_prefix}_API_KEY")) {
        if !v.trim().is_empty() {
            keys.push(v);
        }
    }
    for i in 1..=MAX_KEYS_PER_CLASS {
        if let Ok(v) = std::env::var(format!("{env_prefix}_API_KEY_{i}")) {
            if !v.trim().is_empty() {
                keys.push(v);
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = Config::default();
        assert_eq!(cfg.stage1_target_bytes, 500 * 1024);
        assert_eq!(cfg.study_minutes_default, Duration::from_secs(300));
    }

    #[test]
    fn load_applies_toml_overrides() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("marketcore.toml"),
            "stage1_target_bytes = 1024\nstudy_minutes_default = 7\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.stage1_target_bytes, 1024);
        assert_eq!(cfg.study_minutes_default, Duration::from_secs(7 * 60));
    }

    #[test]
    fn load_without_toml_uses_defaults() {
        let dir = tempdir().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.stage1_target_bytes, Config::default().stage1_target_bytes);
    }

    #[test]
    fn ensure_directories_creates_full_tree() {
        let dir = tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.artifact_root = dir.path().join("store");
        cfg.ensure_directories().unwrap();
        assert!(cfg.artifact_root.join("sessions/active").exists());
        assert!(cfg.artifact_root.join("reports").exists());
    }

    #[test]
    fn credentials_for_class_empty_when_unset() {
        // SAFETY: test-only env var scoped to a name unused elsewhere.
        unsafe {
            std::env::remove_var("TAVILY_API_KEY");
        }
        for i in 1..=MAX_KEYS_PER_CLASS {
            unsafe {
                std::env::remove_var(format!("TAVILY_API_KEY_{i}"));
            }
        }
        let keys = credentials_for_class(CapabilityClass::Tavily);
        assert!(keys.is_empty());
    }
}
