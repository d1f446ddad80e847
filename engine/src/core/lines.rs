//! Line-oriented normalization of program output.
//!
//! Streams are trimmed as a whole, split into lines, and each line trimmed.
//! Oracles read the result front to back through a [`LineCursor`]; the
//! underlying sequence is never mutated.

use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedLines {
    lines: Vec<String>,
}

impl SanitizedLines {
    pub fn from_raw(raw: &str) -> Self {
        let lines = raw
            .trim()
            .lines()
            .map(|line| line.trim().to_string())
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn cursor(&self) -> LineCursor<'_> {
        LineCursor {
            lines: &self.lines,
            pos: 0,
        }
    }
}

/// Forward-only reader over sanitized lines.
#[derive(Debug, Clone)]
pub struct LineCursor<'a> {
    lines: &'a [String],
    pos: usize,
}

impl<'a> LineCursor<'a> {
    pub fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.get(self.pos)?;
        self.pos += 1;
        Some(line.as_str())
    }

    /// Like [`Self::next_line`], but running out is an oracle failure.
    pub fn expect_line(&mut self) -> EngineResult<&'a str> {
        let pos = self.pos;
        self.next_line()
            .ok_or_else(|| EngineError::Validation(format!("missing line {}", pos + 1)))
    }

    /// Parse the next line as a single value.
    pub fn parse_line<T: FromStr>(&mut self) -> EngineResult<T> {
        let pos = self.pos;
        let line = self.expect_line()?;
        line.parse::<T>()
            .map_err(|_| EngineError::Validation(format!("line {}: cannot parse {line:?}", pos + 1)))
    }

    /// Parse every whitespace-separated token of the next line.
    pub fn parse_tokens<T: FromStr>(&mut self) -> EngineResult<Vec<T>> {
        let pos = self.pos;
        let line = self.expect_line()?;
        line.split_whitespace()
            .map(|token| {
                token.parse::<T>().map_err(|_| {
                    EngineError::Validation(format!("line {}: cannot parse {token:?}", pos + 1))
                })
            })
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.lines.len().saturating_sub(self.pos)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
