//! Generators available without configuration.

use std::collections::HashSet;

use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{EngineError, EngineResult};
use crate::generator::{Generator, GeneratorState, InputBuilder, SanitizedCase};

/// T test cases, each with N distinct values up to 2·10^9 followed by two
/// unconstrained arrays of sizes M and K.
#[derive(Debug, Default)]
pub struct AlphaGenerator {
    state: GeneratorState,
}

impl Generator for AlphaGenerator {
    fn name(&self) -> &str {
        "alpha"
    }

    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    fn write_input(&self, rng: &mut StdRng, out: &mut InputBuilder) {
        let tests = rng.gen_range(1..=1_000u32);
        out.value(tests);
        for _ in 0..tests {
            let n = rng.gen_range(1..=100usize);
            let m = rng.gen_range(1..=100usize);
            let k = rng.gen_range(1..=100usize);
            out.line([n, m, k]);

            let mut seen = HashSet::with_capacity(n);
            let mut distinct = Vec::with_capacity(n);
            while distinct.len() < n {
                let value = rng.gen_range(1..=2_000_000_000u64);
                if seen.insert(value) {
                    distinct.push(value);
                }
            }
            out.line(distinct);
            out.line((0..m).map(|_| rng.gen_range(1..=1_000_000_000u64)).collect::<Vec<_>>());
            out.line((0..k).map(|_| rng.gen_range(1..=1_000_000_000u64)).collect::<Vec<_>>());
        }
    }
}

/// T queries of a single integer up to 10^9.
#[derive(Debug, Default)]
pub struct BetaGenerator {
    state: GeneratorState,
}

impl Generator for BetaGenerator {
    fn name(&self) -> &str {
        "beta"
    }

    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    fn write_input(&self, rng: &mut StdRng, out: &mut InputBuilder) {
        let tests = rng.gen_range(1..=1_000u32);
        out.value(tests);
        for _ in 0..tests {
            out.value(rng.gen_range(1..=1_000_000_000u64));
        }
    }
}

const MAX_PERMUTATION_LEN: u32 = 12;

/// T test cases of one N each. An answer is a permutation of `1..=N` in which
/// no two adjacent values are consecutive integers, or `-1` when none exists.
///
/// Many answers are valid, so the candidate is checked directly and the
/// reference output only tells whether an answer exists.
#[derive(Debug, Default)]
pub struct PermutationGenerator {
    state: GeneratorState,
}

impl PermutationGenerator {
    fn is_valid_answer(n: usize, tokens: &[&str]) -> bool {
        if tokens.len() != n {
            return false;
        }
        let mut seen = vec![false; n + 1];
        let mut prev: Option<usize> = None;
        for token in tokens {
            let Ok(value) = token.parse::<usize>() else {
                return false;
            };
            if value == 0 || value > n || seen[value] {
                return false;
            }
            seen[value] = true;
            if let Some(p) = prev
                && p.abs_diff(value) == 1
            {
                return false;
            }
            prev = Some(value);
        }
        true
    }
}

impl Generator for PermutationGenerator {
    fn name(&self) -> &str {
        "permutation"
    }

    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    fn write_input(&self, rng: &mut StdRng, out: &mut InputBuilder) {
        let tests = rng.gen_range(1..=20u32);
        out.value(tests);
        for _ in 0..tests {
            out.value(rng.gen_range(1..=MAX_PERMUTATION_LEN));
        }
    }

    fn judge(&self, case: &SanitizedCase) -> EngineResult<bool> {
        let mut input = case.input.cursor();
        let mut reference = case.reference.cursor();
        let mut candidate = case.candidate.cursor();

        let tests: usize = input.parse_line()?;
        for test in 1..=tests {
            let n: usize = input.parse_line()?;
            let expected = reference.expect_line().map_err(|_| {
                EngineError::Validation(format!("reference output ends before test {test}"))
            })?;
            let Some(answer) = candidate.next_line() else {
                return Ok(false);
            };
            let tokens: Vec<&str> = answer.split_whitespace().collect();
            if expected == "-1" {
                if tokens != ["-1"] {
                    return Ok(false);
                }
            } else if !Self::is_valid_answer(n, &tokens) {
                return Ok(false);
            }
        }
        Ok(candidate.is_exhausted())
    }
}
