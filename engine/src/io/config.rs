//! Engine configuration stored as TOML (conventionally `hack.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::ResourceLimits;
use crate::io::watchdog::WatchdogConfig;
use crate::job::ExecutionSettings;
use crate::lang::{LanguageDescriptor, LanguageRegistry};

/// Engine configuration (TOML).
///
/// Missing fields default to values suitable for a single developer machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory of every job's private working directory.
    pub workspace_root: PathBuf,

    /// Wall-clock budget for one build.
    pub build_timeout_secs: u64,

    /// Memory ceiling for one build.
    pub build_memory_limit_mb: u64,

    /// Captured stdout/stderr beyond this many bytes is drained and dropped.
    pub output_limit_bytes: usize,

    /// Default wall-clock budget for one candidate's stress loop.
    pub stress_timeout_secs: u64,

    pub watchdog: WatchdogConfig,

    /// Extra languages; an entry whose id matches a built-in replaces it.
    pub languages: Vec<LanguageDescriptor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("hack-workspace"),
            build_timeout_secs: 60,
            build_memory_limit_mb: 2048,
            output_limit_bytes: 64 * 1024 * 1024,
            stress_timeout_secs: 30,
            watchdog: WatchdogConfig::default(),
            languages: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            return Err(anyhow!("workspace_root must be non-empty"));
        }
        if self.build_timeout_secs == 0 {
            return Err(anyhow!("build_timeout_secs must be > 0"));
        }
        if self.build_memory_limit_mb == 0 {
            return Err(anyhow!("build_memory_limit_mb must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.stress_timeout_secs == 0 {
            return Err(anyhow!("stress_timeout_secs must be > 0"));
        }
        self.watchdog.validate()?;
        for language in &self.languages {
            language.validate()?;
        }
        Ok(())
    }

    pub fn build_limits(&self) -> Result<ResourceLimits> {
        ResourceLimits::from_millis_and_mb(
            self.build_timeout_secs.saturating_mul(1000),
            self.build_memory_limit_mb,
        )
        .context("build limits")
    }

    pub fn stress_timeout(&self) -> Duration {
        Duration::from_secs(self.stress_timeout_secs)
    }

    pub fn execution_settings(&self) -> Result<ExecutionSettings> {
        Ok(ExecutionSettings {
            workspace_root: self.workspace_root.clone(),
            build_limits: self.build_limits()?,
            output_limit_bytes: self.output_limit_bytes,
            watchdog: self.watchdog.clone(),
        })
    }

    /// Built-in languages extended by `languages`.
    pub fn language_registry(&self) -> Result<LanguageRegistry> {
        LanguageRegistry::from_descriptors(&self.languages)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::StrategyKind;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/hack.toml");
        let cfg = EngineConfig {
            workspace_root: temp.path().join("work"),
            languages: vec![crate::test_support::native_sh_language()],
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert!(!path.with_extension("toml.tmp").exists());
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_and_extends_languages() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hack.toml");
        fs::write(
            &path,
            r#"
stress_timeout_secs = 5

[watchdog]
mode = "off"

[[languages]]
id = "pypy"
extension = ".py"
kind = "interpreted"
run = ["pypy3", "{{ source }}"]
time_multiplier = 2.0
"#,
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.stress_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.build_timeout_secs, 60);
        assert_eq!(cfg.watchdog, WatchdogConfig::Off);

        let registry = cfg.language_registry().expect("registry");
        let pypy = registry.lookup("PyPy").expect("pypy");
        assert_eq!(pypy.kind, StrategyKind::Interpreted);
        assert_eq!(pypy.time_multiplier, 2.0);
        assert!(registry.lookup("cpp").is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hack.toml");
        fs::write(&path, "build_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("build_timeout_secs must be > 0"));

        fs::write(&path, "[watchdog]\nmode = \"procfs\"\npoll_interval_ms = 0\n").expect("write");
        assert!(load_config(&path).is_err());
    }
}
