//! Differential stress-testing engine.
//!
//! Given a trusted reference solution and a candidate solution, the engine
//! generates seeded inputs, runs both programs under wall-clock and memory
//! ceilings, and reports the first input on which the candidate's answer is
//! rejected by the generator's oracle.
//!
//! - **[`core`]**: Pure data: limits, process results, sanitized lines, verdicts.
//! - **[`io`]**: Configuration, child processes and their supervision.
//! - **[`lang`]**: Per-language build/run strategies behind one trait.
//! - **[`job`]**: Lifecycle of one program from source to cleanup.
//! - **[`generator`]**: Seeded inputs and output oracles.
//! - **[`stress`]**: The generate → run → compare loop.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod generator;
pub mod io;
pub mod job;
pub mod lang;
pub mod logging;
pub mod problem;
pub mod stress;
pub mod template;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
