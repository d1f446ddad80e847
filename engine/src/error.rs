//! Structured failure taxonomy shared by every engine component.
//!
//! Components never let a failure escape unclassified: process execution,
//! strategies, jobs and oracles all report through [`EngineError`], and the
//! stress loop folds any of them into a verdict via [`EngineError::kind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::LimitKind;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Compilation exited unsuccessfully.
    #[error("build failed: {message}")]
    Build { message: String, stderr: String },

    /// Managed build produced no unit with an entry point.
    #[error("no entry point found among compiled units")]
    NoEntryPoint,

    /// Managed build produced more than one unit with an entry point.
    #[error("ambiguous entry point: {}", candidates.join(", "))]
    AmbiguousEntryPoint { candidates: Vec<String> },

    #[error("{kind} limit exceeded")]
    LimitExceeded { kind: LimitKind },

    #[error("process exited abnormally (exit code {exit_code:?}, signal {signal:?})")]
    Runtime {
        exit_code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
    },

    /// The oracle itself failed while comparing outputs.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("unknown generator: {0}")]
    UnknownGenerator(String),

    /// Lifecycle misuse, e.g. `run` before `prepare`.
    #[error("job not ready (state: {state})")]
    NotReady { state: String },

    #[error("invalid limits: {0}")]
    InvalidLimits(String),

    #[error("command template: {0}")]
    Template(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Flat classification of [`EngineError`], stable for serialized verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BuildError,
    LimitExceeded,
    RuntimeError,
    ValidationError,
    UnsupportedLanguage,
    NotReady,
    InternalError,
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build { .. } | Self::NoEntryPoint | Self::AmbiguousEntryPoint { .. } => {
                ErrorKind::BuildError
            }
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::Runtime { .. } => ErrorKind::RuntimeError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::UnknownGenerator(_)
            | Self::InvalidLimits(_)
            | Self::Template(_)
            | Self::Io { .. } => ErrorKind::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_point_failures_classify_as_build_errors() {
        assert_eq!(EngineError::NoEntryPoint.kind(), ErrorKind::BuildError);
        let ambiguous = EngineError::AmbiguousEntryPoint {
            candidates: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(ambiguous.kind(), ErrorKind::BuildError);
        assert_eq!(ambiguous.to_string(), "ambiguous entry point: A, B");
    }

    #[test]
    fn limit_message_names_the_kind() {
        let err = EngineError::LimitExceeded {
            kind: LimitKind::Memory,
        };
        assert_eq!(err.to_string(), "memory limit exceeded");
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }
}
