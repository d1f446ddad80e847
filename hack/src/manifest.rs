//! Manifest parsing: one problem with its reference solution plus the
//! candidates to stress-test against it.
//!
//! Source paths are relative to the manifest's directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use engine::problem::{CandidateSpec, ProblemSpec};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Manifest {
    /// Contest identifier; names the default verdict log.
    pub contest: String,
    /// Per-candidate stress budget, overriding the config.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub problem: ProblemEntry,
    #[serde(default)]
    pub candidates: Vec<CandidateEntry>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProblemEntry {
    pub code: String,
    pub language: String,
    pub reference: PathBuf,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    pub generator: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CandidateEntry {
    pub id: String,
    pub language: String,
    pub source: PathBuf,
    #[serde(default)]
    pub time_multiplier: Option<f64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
        let mut manifest: Manifest = toml::from_str(&contents)
            .with_context(|| format!("parse manifest {}", path.display()))?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        manifest
            .validate()
            .with_context(|| format!("validate manifest {}", path.display()))?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.contest.trim().is_empty() {
            bail!("contest must be non-empty");
        }
        if self.timeout_secs == Some(0) {
            bail!("timeout_secs must be > 0");
        }
        if self.problem.time_limit_ms == 0 || self.problem.memory_limit_mb == 0 {
            bail!("problem limits must be > 0");
        }
        if self.candidates.is_empty() {
            bail!("candidates must be a non-empty array");
        }
        for (index, candidate) in self.candidates.iter().enumerate() {
            if candidate.id.trim().is_empty() {
                bail!("candidates[{index}].id must be non-empty");
            }
            if let Some(multiplier) = candidate.time_multiplier
                && (multiplier.is_nan() || multiplier <= 0.0)
            {
                bail!("candidates[{index}].time_multiplier must be > 0");
            }
            if candidate.memory_limit_mb == Some(0) {
                bail!("candidates[{index}].memory_limit_mb must be > 0");
            }
        }
        Ok(())
    }

    /// Default verdict log next to the manifest.
    pub fn default_sink_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}_hack.log", self.contest))
    }

    pub fn problem_spec(&self) -> Result<ProblemSpec> {
        Ok(ProblemSpec {
            code: self.problem.code.clone(),
            reference_source: self.read_source(&self.problem.reference)?,
            language: self.problem.language.clone(),
            time_limit_ms: self.problem.time_limit_ms,
            memory_limit_mb: self.problem.memory_limit_mb,
            generator: self.problem.generator.clone(),
        })
    }

    pub fn candidate_spec(&self, entry: &CandidateEntry) -> Result<CandidateSpec> {
        Ok(CandidateSpec {
            id: entry.id.clone(),
            source: self.read_source(&entry.source)?,
            language: entry.language.clone(),
            time_multiplier: entry.time_multiplier.unwrap_or(1.0),
            memory_limit_mb: entry.memory_limit_mb,
        })
    }

    fn read_source(&self, relative: &Path) -> Result<String> {
        let path = self.base_dir.join(relative);
        fs::read_to_string(&path).with_context(|| format!("read source {}", path.display()))
    }
}
