//! Shared value types for process execution and limits.
//!
//! Memory is measured in bytes everywhere inside the engine. Conversions to
//! kilobytes happen only where an external interface demands them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const BYTES_PER_KB: u64 = 1024;
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Which ceiling a process violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    Time,
    Memory,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Time => f.write_str("time"),
            LimitKind::Memory => f.write_str("memory"),
        }
    }
}

/// Wall-clock and peak resident memory ceilings for one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    time_limit: Duration,
    memory_limit: u64,
}

impl ResourceLimits {
    /// Both limits must be positive.
    pub fn new(time_limit: Duration, memory_limit_bytes: u64) -> EngineResult<Self> {
        if time_limit.is_zero() {
            return Err(EngineError::InvalidLimits(
                "time_limit must be > 0".to_string(),
            ));
        }
        if memory_limit_bytes == 0 {
            return Err(EngineError::InvalidLimits(
                "memory_limit must be > 0".to_string(),
            ));
        }
        Ok(Self {
            time_limit,
            memory_limit: memory_limit_bytes,
        })
    }

    pub fn from_millis_and_mb(time_ms: u64, memory_mb: u64) -> EngineResult<Self> {
        Self::new(
            Duration::from_millis(time_ms),
            memory_mb.saturating_mul(BYTES_PER_MB),
        )
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    /// Memory limit rounded up to whole kilobytes.
    pub fn memory_limit_kb(&self) -> u64 {
        self.memory_limit.div_ceil(BYTES_PER_KB)
    }

    /// Scale both limits, e.g. by a language's slowness multipliers.
    pub fn scaled(&self, time_factor: f64, memory_factor: f64) -> EngineResult<Self> {
        if !(time_factor > 0.0 && memory_factor > 0.0) {
            return Err(EngineError::InvalidLimits(format!(
                "multipliers must be > 0 (time {time_factor}, memory {memory_factor})"
            )));
        }
        let time = self.time_limit.mul_f64(time_factor);
        let memory = (self.memory_limit as f64 * memory_factor).ceil() as u64;
        Self::new(time, memory)
    }
}

/// Classified outcome of one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    LimitExceeded(LimitKind),
    /// Non-zero exit or death by signal without a limit violation.
    RuntimeError,
    /// The process could not be started or supervised.
    SpawnError,
}

/// Everything observed about one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub elapsed: Duration,
    /// Peak resident set in bytes, when the watchdog could observe it.
    pub peak_memory: Option<u64>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// Supervisor-side failure description for `SpawnError`.
    pub error: Option<String>,
}

impl ProcessResult {
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::SpawnError,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            signal: None,
            elapsed: Duration::ZERO,
            peak_memory: None,
            stdout_truncated: 0,
            stderr_truncated: 0,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Map a failed result onto the engine taxonomy. `None` on success.
    pub fn failure(&self) -> Option<EngineError> {
        match self.status {
            RunStatus::Success => None,
            RunStatus::LimitExceeded(kind) => Some(EngineError::LimitExceeded { kind }),
            RunStatus::RuntimeError => Some(EngineError::Runtime {
                exit_code: self.exit_code,
                signal: self.signal,
                stderr: self.stderr.clone(),
            }),
            RunStatus::SpawnError => Some(EngineError::io(
                "spawn process",
                std::io::Error::other(self.error.clone().unwrap_or_default()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limits_are_rejected() {
        assert!(ResourceLimits::new(Duration::ZERO, 1).is_err());
        assert!(ResourceLimits::new(Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn scaling_applies_multipliers() {
        let limits = ResourceLimits::from_millis_and_mb(1000, 256).expect("limits");
        let scaled = limits.scaled(2.5, 2.0).expect("scaled");
        assert_eq!(scaled.time_limit(), Duration::from_millis(2500));
        assert_eq!(scaled.memory_limit(), 512 * BYTES_PER_MB);
        assert!(limits.scaled(0.0, 1.0).is_err());
    }

    #[test]
    fn memory_kb_rounds_up() {
        let limits = ResourceLimits::new(Duration::from_secs(1), 1025).expect("limits");
        assert_eq!(limits.memory_limit_kb(), 2);
    }

    #[test]
    fn failure_maps_status_to_error() {
        let mut result = ProcessResult::spawn_error("boom");
        assert!(result.failure().is_some());
        result.status = RunStatus::LimitExceeded(LimitKind::Time);
        assert!(matches!(
            result.failure(),
            Some(EngineError::LimitExceeded {
                kind: LimitKind::Time
            })
        ));
        result.status = RunStatus::Success;
        assert!(result.failure().is_none());
    }
}
