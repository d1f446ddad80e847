//! Side-effecting parts of the engine: configuration, child processes and
//! their resource supervision.

pub mod config;
pub mod process;
pub mod watchdog;
