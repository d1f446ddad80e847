//! Memory ceiling enforcement.
//!
//! Two mechanisms are supported. `procfs` samples every member of the child's
//! process group between wait slices, taking the summed resident sets and the
//! kernel-maintained high-water mark (`VmHWM`), so a spike in a single member
//! is visible even if it happened between samples. `helper` delegates both ceilings to an external watchdog
//! command that wraps the program and reports violations on stderr.

use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{BYTES_PER_KB, LimitKind, ResourceLimits};
use crate::error::EngineResult;
use crate::template::{CommandTemplate, TemplateVars};

/// Extra wall-clock granted to a helper watchdog before the engine kills it.
pub const HELPER_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WatchdogConfig {
    Procfs {
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
    Helper {
        /// Prefix such as `["perl", "timeout.pl", "-t", "{{ time_secs }}", "-m", "{{ memory_kb }}"]`.
        command: CommandTemplate,
        time_marker: String,
        memory_marker: String,
    },
    Off,
}

fn default_poll_interval_ms() -> u64 {
    5
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig::Procfs {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatchdogConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            WatchdogConfig::Procfs { poll_interval_ms } => {
                if *poll_interval_ms == 0 {
                    return Err(anyhow!("watchdog.poll_interval_ms must be > 0"));
                }
            }
            WatchdogConfig::Helper {
                command,
                time_marker,
                memory_marker,
            } => {
                if command.is_empty() {
                    return Err(anyhow!("watchdog.command must be a non-empty array"));
                }
                if time_marker.is_empty() || memory_marker.is_empty() {
                    return Err(anyhow!("watchdog markers must be non-empty"));
                }
            }
            WatchdogConfig::Off => {}
        }
        Ok(())
    }

    /// Interval between peak-memory samples, if this mode samples at all.
    pub fn poll_interval(&self) -> Option<Duration> {
        match self {
            WatchdogConfig::Procfs { poll_interval_ms } => {
                Some(Duration::from_millis(*poll_interval_ms))
            }
            _ => None,
        }
    }

    /// Final argument vector, with the helper prefix when one is configured.
    pub fn wrap(&self, argv: Vec<String>, limits: &ResourceLimits) -> EngineResult<Vec<String>> {
        let WatchdogConfig::Helper { command, .. } = self else {
            return Ok(argv);
        };
        let vars = TemplateVars::new()
            .with("time_secs", format_secs(limits.time_limit()))
            .with("memory_kb", limits.memory_limit_kb().to_string());
        let mut wrapped = command.render(&vars)?;
        wrapped.extend(argv);
        Ok(wrapped)
    }

    /// How long the engine waits before killing the child itself.
    pub fn hard_deadline(&self, limits: &ResourceLimits) -> Duration {
        match self {
            WatchdogConfig::Helper { .. } => limits.time_limit() + HELPER_GRACE,
            _ => limits.time_limit(),
        }
    }

    /// Violation reported by a helper watchdog on stderr.
    pub fn helper_violation(&self, stderr: &str) -> Option<LimitKind> {
        let WatchdogConfig::Helper {
            time_marker,
            memory_marker,
            ..
        } = self
        else {
            return None;
        };
        if stderr.contains(memory_marker.as_str()) {
            Some(LimitKind::Memory)
        } else if stderr.contains(time_marker.as_str()) {
            Some(LimitKind::Time)
        } else {
            None
        }
    }
}

fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.3}")
    }
}

/// Memory held by a process group in bytes.
///
/// This is the larger of the members' summed resident sets and the biggest
/// single `VmHWM`, so forked helpers and short spikes are both seen. Returns
/// `None` when no member is left or on platforms without procfs.
#[cfg(target_os = "linux")]
pub fn group_memory_bytes(pgid: i32) -> Option<u64> {
    let entries = std::fs::read_dir("/proc").ok()?;
    let mut members = 0usize;
    let mut total_rss = 0u64;
    let mut max_hwm = 0u64;
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        if parse_pgrp(&stat) != Some(pgid) {
            continue;
        }
        // The member may have exited since the stat read.
        let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) else {
            continue;
        };
        members += 1;
        total_rss += parse_status_kb(&status, "VmRSS:").unwrap_or(0);
        max_hwm = max_hwm.max(parse_status_kb(&status, "VmHWM:").unwrap_or(0));
    }
    (members > 0).then_some(total_rss.max(max_hwm) * BYTES_PER_KB)
}

#[cfg(not(target_os = "linux"))]
pub fn group_memory_bytes(_pgid: i32) -> Option<u64> {
    None
}

/// Process group id from `/proc/<pid>/stat`. The command name may contain
/// spaces and parentheses, so fields are counted after the last `)`.
fn parse_pgrp(stat: &str) -> Option<i32> {
    let (_, rest) = stat.rsplit_once(')')?;
    // state ppid pgrp
    rest.split_whitespace().nth(2)?.parse().ok()
}

fn parse_status_kb(status: &str, key: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with(key))?;
    line.trim_start_matches(key)
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}
