//! Seeded input generation and output validation.
//!
//! A generator is a small transaction object: [`Generator::generate`] resets
//! its state with a fresh input, and [`Generator::validate`] records both
//! outputs of that input and asks the oracle whether the candidate's answer is
//! acceptable. Inputs depend only on the seed.

mod builtin;
mod registry;

use std::fmt::{Display, Write as _};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::core::lines::SanitizedLines;
use crate::error::{EngineError, EngineResult};

pub use builtin::{AlphaGenerator, BetaGenerator, PermutationGenerator};
pub use registry::GeneratorRegistry;

/// Raw streams of the current transaction.
#[derive(Debug, Clone, Default)]
pub struct GeneratorState {
    input: String,
    reference: String,
    candidate: String,
    sanitized: Option<SanitizedCase>,
}

/// Line-normalized view of one input and the two outputs it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedCase {
    pub input: SanitizedLines,
    pub reference: SanitizedLines,
    pub candidate: SanitizedLines,
}

impl GeneratorState {
    /// Start a new transaction with `input`; previous outputs are dropped.
    pub fn reset(&mut self, input: String) {
        self.input = input;
        self.reference.clear();
        self.candidate.clear();
        self.sanitized = None;
    }

    pub fn record_outputs(&mut self, reference: &str, candidate: &str) {
        self.reference = reference.to_string();
        self.candidate = candidate.to_string();
        self.sanitized = None;
    }

    /// Normalize all three streams. Calling it again returns the same view.
    pub fn sanitize(&mut self) -> &SanitizedCase {
        self.sanitized.get_or_insert_with(|| SanitizedCase {
            input: SanitizedLines::from_raw(&self.input),
            reference: SanitizedLines::from_raw(&self.reference),
            candidate: SanitizedLines::from_raw(&self.candidate),
        })
    }

    pub fn sanitized(&self) -> Option<&SanitizedCase> {
        self.sanitized.as_ref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }
}

/// Line-oriented text builder for generated inputs.
#[derive(Debug, Default)]
pub struct InputBuilder {
    buf: String,
}

impl InputBuilder {
    /// Append one line of space-separated values.
    pub fn line<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.buf.push(' ');
            }
            // Writing into a String cannot fail.
            let _ = write!(self.buf, "{value}");
        }
        self.buf.push('\n');
        self
    }

    pub fn value(&mut self, value: impl Display) -> &mut Self {
        self.line([value])
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

pub trait Generator: Send {
    fn name(&self) -> &str;

    fn state(&self) -> &GeneratorState;

    fn state_mut(&mut self) -> &mut GeneratorState;

    /// Write one input drawing randomness only from `rng`.
    fn write_input(&self, rng: &mut StdRng, out: &mut InputBuilder);

    /// Decide whether the candidate's answer is acceptable. Defaults to exact
    /// equality of sanitized lines; semantic oracles may read the input and
    /// treat the reference output as a hint only.
    fn judge(&self, case: &SanitizedCase) -> EngineResult<bool> {
        Ok(case.reference == case.candidate)
    }

    fn generate(&mut self, seed: u64) -> String {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = InputBuilder::default();
        self.write_input(&mut rng, &mut out);
        let input = out.finish();
        self.state_mut().reset(input.clone());
        input
    }

    fn validate(&mut self, reference: &str, candidate: &str) -> EngineResult<bool> {
        let state = self.state_mut();
        state.record_outputs(reference, candidate);
        state.sanitize();
        let case = self
            .state()
            .sanitized()
            .ok_or_else(|| EngineError::Validation("outputs were not sanitized".to_string()))?;
        self.judge(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_joins_values_with_spaces() {
        let mut out = InputBuilder::default();
        out.value(2).line([1, 2, 3]).line(Vec::<u32>::new());
        assert_eq!(out.finish(), "2\n1 2 3\n\n");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut state = GeneratorState::default();
        state.reset("3\n 1 2 3 \n".to_string());
        state.record_outputs("6\n\n", "  6");
        let first = state.sanitize().clone();
        let second = state.sanitize().clone();
        assert_eq!(first, second);
        assert_eq!(first.reference, first.candidate);
        assert_eq!(first.input.lines(), ["3", "1 2 3"]);

        let resanitized = SanitizedLines::from_raw(&first.input.lines().join("\n"));
        assert_eq!(resanitized, first.input);
    }

    #[test]
    fn reset_drops_previous_outputs() {
        let mut state = GeneratorState::default();
        state.reset("1\n".to_string());
        state.record_outputs("a", "b");
        state.sanitize();
        state.reset("2\n".to_string());
        assert!(state.sanitized().is_none());
        let case = state.sanitize();
        assert!(case.reference.is_empty());
        assert!(case.candidate.is_empty());
    }

    #[test]
    fn default_oracle_ignores_surrounding_whitespace() {
        let mut generator = BetaGenerator::default();
        generator.generate(1);
        assert!(generator.validate("1\n2\n", "  1\r\n2  \n\n").expect("validate"));
        assert!(!generator.validate("1\n2\n", "1\n3\n").expect("validate"));
        assert!(!generator.validate("1\n2\n", "1 2\n").expect("validate"));
    }
}
