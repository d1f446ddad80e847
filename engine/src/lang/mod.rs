//! Language build/run strategies.
//!
//! A [`Strategy`] turns source text into a runnable [`Artifact`] inside a
//! private working directory, runs it against stdin through the
//! resource-limited process runner, and removes whatever it created. The set
//! of strategies is closed: one per [`StrategyKind`].

pub mod descriptor;
pub mod interpreted;
pub mod managed;
pub mod native;
pub mod registry;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::types::{BYTES_PER_MB, ProcessResult, ResourceLimits, RunStatus};
use crate::error::{EngineError, EngineResult};
use crate::io::process::{ProcessRequest, execute};
use crate::io::watchdog::WatchdogConfig;
use crate::template::TemplateVars;

pub use descriptor::{EntryPointProbe, LanguageDescriptor, StrategyKind};
pub use registry::LanguageRegistry;

use interpreted::InterpretedStrategy;
use managed::ManagedStrategy;
use native::NativeStrategy;

/// Runnable form of a prepared program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Executable(PathBuf),
    EntryPoint { class_dir: PathBuf, name: String },
    Script(PathBuf),
}

/// Where and under which ceilings a strategy builds and runs.
#[derive(Debug, Clone)]
pub struct StrategyEnv {
    pub workdir: PathBuf,
    pub limits: ResourceLimits,
    pub build_limits: ResourceLimits,
    pub output_limit_bytes: usize,
    pub watchdog: WatchdogConfig,
}

impl StrategyEnv {
    pub fn run_request(&self, argv: Vec<String>) -> ProcessRequest {
        ProcessRequest::new(argv, self.workdir.clone(), self.limits)
            .with_watchdog(self.watchdog.clone())
            .with_output_limit(self.output_limit_bytes)
    }

    pub fn build_request(&self, argv: Vec<String>) -> ProcessRequest {
        ProcessRequest::new(argv, self.workdir.clone(), self.build_limits)
            .with_watchdog(self.watchdog.clone())
            .with_output_limit(self.output_limit_bytes)
    }

    /// Variables every template may use.
    pub fn base_vars(&self, source: &Path) -> TemplateVars {
        TemplateVars::new()
            .with_path("source", source)
            .with_path("workdir", &self.workdir)
            .with(
                "memory_mb",
                self.limits.memory_limit().div_ceil(BYTES_PER_MB).to_string(),
            )
    }
}

/// Capability set shared by every language family.
pub trait Strategy: Send {
    /// Write `source` into the working directory and build it if needed.
    fn prepare(&mut self, source: &str) -> EngineResult<Artifact>;

    /// Run the prepared artifact with `stdin` under the run limits.
    fn run(&self, stdin: &str) -> EngineResult<ProcessResult>;

    /// Remove every file this strategy created. Keeps going past failures
    /// and reports the first one.
    fn purge(&mut self) -> EngineResult<()>;

    fn artifact(&self) -> Option<&Artifact>;
}

/// Instantiate the strategy for a descriptor's family.
pub fn strategy_for(descriptor: &LanguageDescriptor, env: StrategyEnv) -> Box<dyn Strategy> {
    match descriptor.kind {
        StrategyKind::Native => Box::new(NativeStrategy::new(descriptor.clone(), env)),
        StrategyKind::Managed => Box::new(ManagedStrategy::new(descriptor.clone(), env)),
        StrategyKind::Interpreted => Box::new(InterpretedStrategy::new(descriptor.clone(), env)),
    }
}

pub(crate) fn write_source(
    descriptor: &LanguageDescriptor,
    env: &StrategyEnv,
    source: &str,
) -> EngineResult<PathBuf> {
    let path = env.workdir.join(descriptor.source_file_name(source));
    fs::write(&path, source)
        .map_err(|e| EngineError::io(format!("write source {}", path.display()), e))?;
    Ok(path)
}

/// Translate a build process result into success or a build failure.
pub(crate) fn check_build(result: &ProcessResult) -> EngineResult<()> {
    match result.status {
        RunStatus::Success => Ok(()),
        RunStatus::LimitExceeded(kind) => Err(EngineError::LimitExceeded { kind }),
        RunStatus::RuntimeError => Err(EngineError::Build {
            message: match (result.exit_code, result.signal) {
                (Some(code), _) => format!("compiler exited with code {code}"),
                (None, Some(signal)) => format!("compiler killed by signal {signal}"),
                (None, None) => "compiler failed".to_string(),
            },
            stderr: result.stderr.clone(),
        }),
        RunStatus::SpawnError => Err(EngineError::Build {
            message: result
                .error
                .clone()
                .unwrap_or_else(|| "compiler could not be started".to_string()),
            stderr: result.stderr.clone(),
        }),
    }
}

/// Remove each path, logging failures and remembering the first.
pub(crate) fn remove_files<'a>(paths: impl IntoIterator<Item = &'a Path>) -> EngineResult<()> {
    let mut first_error = None;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), err = %e, "failed to remove artifact");
                if first_error.is_none() {
                    first_error = Some(EngineError::io(format!("remove {}", path.display()), e));
                }
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LimitKind;

    #[test]
    fn build_failure_keeps_compiler_stderr() {
        let mut result = ProcessResult::spawn_error("spawn g++");
        result.status = RunStatus::RuntimeError;
        result.exit_code = Some(1);
        result.stderr = "error: expected ';'".to_string();
        let err = check_build(&result).expect_err("build error");
        match err {
            EngineError::Build { message, stderr } => {
                assert_eq!(message, "compiler exited with code 1");
                assert_eq!(stderr, "error: expected ';'");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn build_timeout_is_a_limit_violation() {
        let mut result = ProcessResult::spawn_error("");
        result.status = RunStatus::LimitExceeded(LimitKind::Time);
        assert!(matches!(
            check_build(&result),
            Err(EngineError::LimitExceeded {
                kind: LimitKind::Time
            })
        ));
    }

    #[test]
    fn removing_missing_files_is_fine() {
        let temp = tempfile::tempdir().expect("tempdir");
        let present = temp.path().join("a.out");
        fs::write(&present, b"x").expect("write");
        let missing = temp.path().join("missing");
        remove_files([present.as_path(), missing.as_path()]).expect("remove");
        assert!(!present.exists());
    }
}
