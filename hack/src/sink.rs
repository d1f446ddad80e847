//! Verdict publication.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use engine::core::verdict::Verdict;

/// One published verdict with enough context to find the submission again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub contest: String,
    pub problem: String,
    pub submission_id: String,
    pub generator: String,
    pub recorded_at: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl VerdictRecord {
    pub fn new(
        contest: &str,
        problem: &str,
        submission_id: &str,
        generator: &str,
        verdict: Verdict,
    ) -> Self {
        Self {
            contest: contest.to_string(),
            problem: problem.to_string(),
            submission_id: submission_id.to_string(),
            generator: generator.to_string(),
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            verdict,
        }
    }
}

pub trait VerdictSink {
    fn publish(&mut self, record: &VerdictRecord) -> Result<()>;
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VerdictSink for JsonlSink {
    fn publish(&mut self, record: &VerdictRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record).context("serialize verdict")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = JsonlSink::new(temp.path().join("logs/1843_hack.log"));
        sink.publish(&VerdictRecord::new(
            "1843",
            "C",
            "1",
            "alpha",
            Verdict::Exhausted { seeds_tried: 12 },
        ))
        .expect("publish");
        sink.publish(&VerdictRecord::new(
            "1843",
            "C",
            "2",
            "alpha",
            Verdict::Exhausted { seeds_tried: 3 },
        ))
        .expect("publish");

        let contents = fs::read_to_string(sink.path()).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(value["status"], "exhausted");
        assert_eq!(value["seeds_tried"], 12);
        assert_eq!(value["submission_id"], "1");
        let second: VerdictRecord = serde_json::from_str(lines[1]).expect("record");
        assert_eq!(second.verdict, Verdict::Exhausted { seeds_tried: 3 });
    }
}
