//! Execution context: one program's lifecycle from source to cleanup.
//!
//! ```text
//! New ──prepare ok──▶ Prepared ──purge──▶ Purged
//!  │                   ▲     │
//!  │                   └─run─┘
//!  └──prepare err──▶ Error
//! ```
//!
//! A job owns a private working directory exclusively. Dropping a job purges
//! it, so artifacts never outlive the job on any exit path.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ProcessResult, ResourceLimits};
use crate::error::{EngineError, EngineResult};
use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;
use crate::io::watchdog::WatchdogConfig;
use crate::lang::{Artifact, LanguageRegistry, Strategy, StrategyEnv, strategy_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    New,
    Prepared,
    Error,
    Purged,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::New => "new",
            JobState::Prepared => "prepared",
            JobState::Error => "error",
            JobState::Purged => "purged",
        };
        f.write_str(name)
    }
}

/// Engine-wide settings every job inherits.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Parent of every job's private working directory.
    pub workspace_root: PathBuf,
    pub build_limits: ResourceLimits,
    pub output_limit_bytes: usize,
    pub watchdog: WatchdogConfig,
}

impl ExecutionSettings {
    pub fn new(workspace_root: PathBuf, build_limits: ResourceLimits) -> Self {
        Self {
            workspace_root,
            build_limits,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            watchdog: WatchdogConfig::default(),
        }
    }
}

pub struct Job {
    label: String,
    language: String,
    source: String,
    limits: ResourceLimits,
    settings: ExecutionSettings,
    state: JobState,
    workdir: Option<TempDir>,
    strategy: Option<Box<dyn Strategy>>,
    failure: Option<String>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label)
            .field("language", &self.language)
            .field("state", &self.state)
            .field("workdir", &self.workdir())
            .finish_non_exhaustive()
    }
}

impl Job {
    /// `label` prefixes the working directory name, e.g. `reference` or a submission id.
    pub fn new(
        label: impl Into<String>,
        language: impl Into<String>,
        source: impl Into<String>,
        limits: ResourceLimits,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            label: label.into(),
            language: language.into(),
            source: source.into(),
            limits,
            settings,
            state: JobState::New,
            workdir: None,
            strategy: None,
            failure: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Message of the failure that moved the job to `Error`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.strategy.as_ref().and_then(|s| s.artifact())
    }

    /// `New → Prepared`, or `New → Error` with the failure retained.
    #[instrument(skip_all, fields(job = %self.label, language = %self.language))]
    pub fn prepare(&mut self, registry: &LanguageRegistry) -> EngineResult<&Artifact> {
        if self.state != JobState::New {
            return Err(EngineError::NotReady {
                state: self.state.to_string(),
            });
        }
        match self.try_prepare(registry) {
            Ok(()) => {
                self.state = JobState::Prepared;
                info!(workdir = ?self.workdir(), "job prepared");
                self.artifact().ok_or(EngineError::NotReady {
                    state: "prepared without artifact".to_string(),
                })
            }
            Err(err) => {
                warn!(err = %err, "job preparation failed");
                self.failure = Some(err.to_string());
                if let Err(cleanup) = self.release() {
                    warn!(err = %cleanup, "cleanup after failed preparation failed");
                }
                self.state = JobState::Error;
                Err(err)
            }
        }
    }

    fn try_prepare(&mut self, registry: &LanguageRegistry) -> EngineResult<()> {
        let descriptor = registry.lookup(&self.language)?;

        let root = &self.settings.workspace_root;
        fs::create_dir_all(root)
            .map_err(|e| EngineError::io(format!("create {}", root.display()), e))?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize_label(&self.label)))
            .tempdir_in(root)
            .map_err(|e| EngineError::io(format!("create workdir in {}", root.display()), e))?;

        let env = StrategyEnv {
            workdir: workdir.path().to_path_buf(),
            limits: self.limits,
            build_limits: self.settings.build_limits,
            output_limit_bytes: self.settings.output_limit_bytes,
            watchdog: self.settings.watchdog.clone(),
        };
        self.workdir = Some(workdir);
        let strategy = self.strategy.insert(strategy_for(descriptor, env));
        strategy.prepare(&self.source)?;
        Ok(())
    }

    /// Run the prepared artifact. The state does not change.
    pub fn run(&self, stdin: &str) -> EngineResult<ProcessResult> {
        match (&self.state, &self.strategy) {
            (JobState::Prepared, Some(strategy)) => strategy.run(stdin),
            _ => Err(EngineError::NotReady {
                state: self.state.to_string(),
            }),
        }
    }

    /// `Prepared → Purged`. A no-op in every other state.
    pub fn purge(&mut self) -> EngineResult<()> {
        if self.state != JobState::Prepared {
            return Ok(());
        }
        self.state = JobState::Purged;
        let result = self.release();
        debug!(job = %self.label, ok = result.is_ok(), "job purged");
        result
    }

    /// Remove strategy artifacts and the working directory, even if the
    /// former fails.
    fn release(&mut self) -> EngineResult<()> {
        let artifacts = match self.strategy.as_mut() {
            Some(strategy) => strategy.purge(),
            None => Ok(()),
        };
        self.strategy = None;
        let dir = match self.workdir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(|e| {
                    warn!(path = %path.display(), err = %e, "failed to remove workdir");
                    EngineError::io(format!("remove {}", path.display()), e)
                })
            }
            None => Ok(()),
        };
        artifacts.and(dir)
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if let Err(err) = self.purge() {
            warn!(job = %self.label, err = %err, "purge on drop failed");
        }
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RunStatus;
    use crate::test_support::{sh_registry, test_settings};

    fn limits() -> ResourceLimits {
        ResourceLimits::from_millis_and_mb(5_000, 256).expect("limits")
    }

    #[test]
    fn run_before_prepare_is_not_ready() {
        let temp = tempfile::tempdir().expect("tempdir");
        let job = Job::new("ref", "sh", "echo hi", limits(), test_settings(temp.path()));
        let err = job.run("").expect_err("not ready");
        assert!(matches!(err, EngineError::NotReady { ref state } if state == "new"));
    }

    #[test]
    fn prepared_job_runs_repeatedly() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut job = Job::new(
            "ref",
            "sh",
            "read n\necho $((n + 1))\n",
            limits(),
            test_settings(temp.path()),
        );
        job.prepare(&sh_registry()).expect("prepare");
        assert_eq!(job.state(), JobState::Prepared);
        for n in 1..=3 {
            let result = job.run(&format!("{n}\n")).expect("run");
            assert_eq!(result.status, RunStatus::Success);
            assert_eq!(result.stdout.trim(), (n + 1).to_string());
        }
        assert_eq!(job.state(), JobState::Prepared);
    }

    #[test]
    fn purge_is_idempotent_and_removes_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut job = Job::new("cand", "sh", "echo 1", limits(), test_settings(temp.path()));
        job.prepare(&sh_registry()).expect("prepare");
        let workdir = job.workdir().expect("workdir").to_path_buf();
        assert!(workdir.is_dir());

        job.purge().expect("purge");
        assert_eq!(job.state(), JobState::Purged);
        assert!(!workdir.exists());
        job.purge().expect("second purge");
        assert_eq!(job.state(), JobState::Purged);
        assert!(matches!(job.run(""), Err(EngineError::NotReady { .. })));
    }

    #[test]
    fn purge_on_new_job_is_a_noop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut job = Job::new("cand", "sh", "", limits(), test_settings(temp.path()));
        job.purge().expect("purge");
        assert_eq!(job.state(), JobState::New);
    }

    #[test]
    fn unsupported_language_leaves_nothing_on_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("work");
        let mut job = Job::new("cand", "cobol", "DISPLAY 1.", limits(), test_settings(&root));
        let err = job.prepare(&sh_registry()).expect_err("unsupported");
        assert!(matches!(err, EngineError::UnsupportedLanguage(_)));
        assert_eq!(job.state(), JobState::Error);
        assert_eq!(job.failure(), Some("unsupported language: cobol"));
        assert!(!root.exists());
    }

    #[test]
    fn error_state_is_terminal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut job = Job::new("cand", "cobol", "", limits(), test_settings(temp.path()));
        job.prepare(&sh_registry()).expect_err("unsupported");
        assert!(matches!(
            job.prepare(&sh_registry()),
            Err(EngineError::NotReady { ref state }) if state == "error"
        ));
        job.purge().expect("purge");
        assert_eq!(job.state(), JobState::Error);
    }

    #[test]
    fn failed_build_cleans_its_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("work");
        let mut job = Job::new("cand", "broken-native", "x", limits(), test_settings(&root));
        let err = job.prepare(&sh_registry()).expect_err("build fails");
        assert!(matches!(err, EngineError::Build { .. }));
        assert_eq!(job.state(), JobState::Error);
        let leftovers = fs::read_dir(&root).expect("read root").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn drop_purges_prepared_job() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workdir = {
            let mut job = Job::new("ref", "sh", "echo 1", limits(), test_settings(temp.path()));
            job.prepare(&sh_registry()).expect("prepare");
            job.workdir().expect("workdir").to_path_buf()
        };
        assert!(!workdir.exists());
    }

    #[test]
    fn sibling_jobs_get_distinct_workdirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut a = Job::new("same", "sh", "echo a", limits(), test_settings(temp.path()));
        let mut b = Job::new("same", "sh", "echo b", limits(), test_settings(temp.path()));
        a.prepare(&sh_registry()).expect("prepare a");
        b.prepare(&sh_registry()).expect("prepare b");
        assert_ne!(a.workdir(), b.workdir());
        assert_eq!(a.run("").expect("a").stdout, "a\n");
        assert_eq!(b.run("").expect("b").stdout, "b\n");
    }

    #[test]
    fn labels_are_sanitized_for_paths() {
        assert_eq!(sanitize_label("123/../x y"), "123____x_y");
        assert_eq!(sanitize_label(""), "job");
    }
}
