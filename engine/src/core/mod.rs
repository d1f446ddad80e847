//! Deterministic, pure types shared by the engine.
//!
//! Core modules are free of I/O side effects: limits, process results,
//! sanitized output and verdicts.

pub mod lines;
pub mod types;
pub mod verdict;
