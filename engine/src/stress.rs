//! Differential stress-testing control loop.
//!
//! For consecutive seeds: generate an input, run the reference and then the
//! candidate on it, and ask the generator's oracle whether the candidate's
//! answer is acceptable. The loop stops at the first mismatch, the first
//! execution failure, or when the wall-clock budget runs out.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::core::types::ProcessResult;
use crate::core::verdict::{Evidence, Side, Verdict};
use crate::error::EngineResult;
use crate::generator::Generator;
use crate::job::Job;
use crate::lang::LanguageRegistry;

pub const DEFAULT_STRESS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressOptions {
    /// Wall-clock budget for the whole loop.
    pub timeout: Duration,
    /// First seed tried; later seeds count up from here.
    pub start_seed: u64,
    /// Stop with `Exhausted` after this many accepted seeds.
    pub max_seeds: Option<u64>,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STRESS_TIMEOUT,
            start_seed: 1,
            max_seeds: None,
        }
    }
}

impl StressOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Progress of one accepted seed, handed to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub seed: u64,
    pub reference_elapsed: Duration,
    pub candidate_elapsed: Duration,
}

/// Run the stress loop over two prepared jobs.
///
/// Always produces exactly one verdict; failures of either program or of the
/// oracle become [`Verdict::ExecutionError`].
#[instrument(skip_all, fields(reference = %reference.label(), candidate = %candidate.label(), generator = %generator.name()))]
pub fn stress_test<F: FnMut(&SeedReport)>(
    reference: &Job,
    candidate: &Job,
    generator: &mut dyn Generator,
    options: &StressOptions,
    mut on_seed: F,
) -> Verdict {
    let deadline = Instant::now() + options.timeout;
    let mut seed = options.start_seed;
    let mut seeds_tried = 0u64;

    let verdict = loop {
        if Instant::now() >= deadline {
            break Verdict::Exhausted { seeds_tried };
        }
        if options.max_seeds.is_some_and(|max| seeds_tried >= max) {
            break Verdict::Exhausted { seeds_tried };
        }

        let input = generator.generate(seed);
        let reference_run = reference.run(&input);
        let candidate_run = candidate.run(&input);

        let reference_out = match checked(reference_run) {
            Ok(result) => result,
            Err(err) => break Verdict::execution_error(Side::Reference, Some(seed), &err),
        };
        let candidate_out = match checked(candidate_run) {
            Ok(result) => result,
            Err(err) => break Verdict::execution_error(Side::Candidate, Some(seed), &err),
        };

        match generator.validate(&reference_out.stdout, &candidate_out.stdout) {
            Err(err) => break Verdict::execution_error(Side::Oracle, Some(seed), &err),
            Ok(false) => {
                break Verdict::Hacked {
                    seed,
                    evidence: Evidence {
                        input,
                        reference_output: reference_out.stdout,
                        candidate_output: candidate_out.stdout,
                    },
                };
            }
            Ok(true) => {}
        }

        seeds_tried += 1;
        debug!(
            seed,
            reference_ms = reference_out.elapsed.as_millis() as u64,
            candidate_ms = candidate_out.elapsed.as_millis() as u64,
            "seed accepted"
        );
        on_seed(&SeedReport {
            seed,
            reference_elapsed: reference_out.elapsed,
            candidate_elapsed: candidate_out.elapsed,
        });

        match seed.checked_add(1) {
            Some(next) => seed = next,
            None => break Verdict::Exhausted { seeds_tried },
        }
    };

    info!(status = status_name(&verdict), seed = ?verdict.seed(), "stress test finished");
    verdict
}

fn checked(run: EngineResult<ProcessResult>) -> EngineResult<ProcessResult> {
    let result = run?;
    match result.failure() {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

fn status_name(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Hacked { .. } => "hacked",
        Verdict::Exhausted { .. } => "exhausted",
        Verdict::ExecutionError { .. } => "execution_error",
    }
}

/// A reference job shared by a sequence of candidate tests.
///
/// The session owns every job it touches: candidates are purged as soon as
/// their verdict is known, the reference on [`StressSession::finish`], and
/// anything still alive when the session is dropped.
#[derive(Debug)]
pub struct StressSession {
    reference: Job,
    candidate: Option<Job>,
}

impl StressSession {
    /// Prepare `reference`. On failure the verdict blames the reference.
    pub fn open(mut reference: Job, registry: &LanguageRegistry) -> Result<Self, Verdict> {
        if let Err(err) = reference.prepare(registry) {
            return Err(Verdict::execution_error(Side::Reference, None, &err));
        }
        Ok(Self {
            reference,
            candidate: None,
        })
    }

    pub fn reference(&self) -> &Job {
        &self.reference
    }

    /// Prepare `candidate`, stress it against the reference and purge it.
    pub fn test<F: FnMut(&SeedReport)>(
        &mut self,
        candidate: Job,
        registry: &LanguageRegistry,
        generator: &mut dyn Generator,
        options: &StressOptions,
        on_seed: F,
    ) -> Verdict {
        let candidate = self.candidate.insert(candidate);
        let verdict = match candidate.prepare(registry) {
            Err(err) => Verdict::execution_error(Side::Candidate, None, &err),
            Ok(_) => stress_test(&self.reference, candidate, generator, options, on_seed),
        };
        if let Some(mut done) = self.candidate.take()
            && let Err(err) = done.purge()
        {
            warn!(job = %done.label(), err = %err, "candidate purge failed");
        }
        verdict
    }

    /// Purge every job. Failures are returned but the session is consumed
    /// either way.
    pub fn finish(mut self) -> EngineResult<()> {
        self.purge_all()
    }

    fn purge_all(&mut self) -> EngineResult<()> {
        let candidate = match self.candidate.as_mut() {
            Some(job) => job.purge(),
            None => Ok(()),
        };
        let reference = self.reference.purge();
        candidate.and(reference)
    }
}

impl Drop for StressSession {
    fn drop(&mut self) {
        if let Err(err) = self.purge_all() {
            warn!(err = %err, "session purge on drop failed");
        }
    }
}

/// Convenience for one-off runs: prepare both jobs, stress them and purge.
pub fn run_once<F: FnMut(&SeedReport)>(
    reference: Job,
    candidate: Job,
    registry: &LanguageRegistry,
    generator: &mut dyn Generator,
    options: &StressOptions,
    on_seed: F,
) -> Verdict {
    let mut session = match StressSession::open(reference, registry) {
        Ok(session) => session,
        Err(verdict) => return verdict,
    };
    let verdict = session.test(candidate, registry, generator, options, on_seed);
    if let Err(err) = session.finish() {
        warn!(err = %err, "purge after stress test failed");
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorKind};
    use crate::generator::SanitizedCase;
    use crate::test_support::{SUM_SCRIPT, pair_generator, sh_job, sh_registry};

    fn prepared(label: &str, source: &str, root: &std::path::Path) -> Job {
        let mut job = sh_job(label, source, root);
        job.prepare(&sh_registry()).expect("prepare");
        job
    }

    #[test]
    fn max_seeds_bounds_an_agreeing_pair() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reference = prepared("ref", SUM_SCRIPT, temp.path());
        let candidate = prepared("cand", SUM_SCRIPT, temp.path());
        let mut seen = Vec::new();
        let options = StressOptions {
            start_seed: 40,
            max_seeds: Some(3),
            ..StressOptions::default()
        };
        let verdict = stress_test(
            &reference,
            &candidate,
            &mut pair_generator(),
            &options,
            |report| seen.push(report.seed),
        );
        assert_eq!(verdict, Verdict::Exhausted { seeds_tried: 3 });
        assert_eq!(seen, vec![40, 41, 42]);
    }

    #[test]
    fn zero_budget_tries_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reference = prepared("ref", SUM_SCRIPT, temp.path());
        let candidate = prepared("cand", "echo 0\n", temp.path());
        let verdict = stress_test(
            &reference,
            &candidate,
            &mut pair_generator(),
            &StressOptions::with_timeout(Duration::ZERO),
            |_| {},
        );
        assert_eq!(verdict, Verdict::Exhausted { seeds_tried: 0 });
    }

    #[test]
    fn failing_oracle_is_blamed_on_the_oracle() {
        fn broken(_: &SanitizedCase) -> EngineResult<bool> {
            Err(EngineError::Validation("bad reference".to_string()))
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let reference = prepared("ref", SUM_SCRIPT, temp.path());
        let candidate = prepared("cand", SUM_SCRIPT, temp.path());
        let mut generator = pair_generator().with_judge(broken);
        let verdict = stress_test(
            &reference,
            &candidate,
            &mut generator,
            &StressOptions::default(),
            |_| {},
        );
        assert!(matches!(
            verdict,
            Verdict::ExecutionError {
                side: Side::Oracle,
                kind: ErrorKind::ValidationError,
                seed: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn crashing_reference_is_blamed_on_the_reference() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reference = prepared("ref", "exit 3\n", temp.path());
        let candidate = prepared("cand", "exit 4\n", temp.path());
        let verdict = stress_test(
            &reference,
            &candidate,
            &mut pair_generator(),
            &StressOptions::default(),
            |_| {},
        );
        assert!(matches!(
            verdict,
            Verdict::ExecutionError {
                side: Side::Reference,
                kind: ErrorKind::RuntimeError,
                ..
            }
        ));
    }

    #[test]
    fn session_purges_candidates_between_tests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry = sh_registry();
        let mut session =
            StressSession::open(sh_job("ref", SUM_SCRIPT, temp.path()), &registry).expect("open");
        let options = StressOptions {
            max_seeds: Some(2),
            ..StressOptions::default()
        };

        let first = session.test(
            sh_job("good", SUM_SCRIPT, temp.path()),
            &registry,
            &mut pair_generator(),
            &options,
            |_| {},
        );
        assert_eq!(first, Verdict::Exhausted { seeds_tried: 2 });
        let second = session.test(
            sh_job("bad", "echo 0\n", temp.path()),
            &registry,
            &mut pair_generator(),
            &options,
            |_| {},
        );
        assert!(second.is_hacked());

        // only the reference workdir is left
        assert_eq!(std::fs::read_dir(temp.path()).expect("read").count(), 1);
        session.finish().expect("finish");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read").count(), 0);
    }

    #[test]
    fn unpreparable_reference_yields_reference_verdict() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reference = Job::new(
            "ref",
            "cobol",
            "",
            crate::test_support::test_limits(),
            crate::test_support::test_settings(temp.path()),
        );
        let verdict = StressSession::open(reference, &sh_registry()).expect_err("unsupported");
        assert!(matches!(
            verdict,
            Verdict::ExecutionError {
                side: Side::Reference,
                kind: ErrorKind::UnsupportedLanguage,
                seed: None,
                ..
            }
        ));
    }
}
