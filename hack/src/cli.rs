//! CLI command implementations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use engine::core::verdict::{Side, Verdict};
use engine::error::ErrorKind;
use engine::exit_codes;
use engine::generator::GeneratorRegistry;
use engine::io::config::{EngineConfig, load_config};
use engine::stress::{StressOptions, StressSession};

use crate::manifest::Manifest;
use crate::sink::{JsonlSink, VerdictRecord, VerdictSink};

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "hack.toml";

fn config_or_default(path: Option<&Path>) -> Result<EngineConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));
    load_config(path).with_context(|| format!("load config {}", path.display()))
}

pub struct RunArgs {
    pub manifest: PathBuf,
    pub config: Option<PathBuf>,
    pub sink: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Stress-test every candidate of a manifest and publish one verdict each.
///
/// Returns the exit code: `HACKED` if any candidate was hacked, otherwise
/// `EXEC_ERROR` if any run failed, otherwise `OK`.
pub fn run_manifest(args: &RunArgs) -> Result<i32> {
    let config = config_or_default(args.config.as_deref())?;
    let registry = config.language_registry()?;
    let settings = config.execution_settings()?;
    let generators = GeneratorRegistry::with_builtins();

    let manifest = Manifest::load(&args.manifest)?;
    let problem = manifest.problem_spec()?;
    // Fail fast on a typo before any build starts.
    generators.create(&problem.generator)?;

    let timeout = args
        .timeout_secs
        .or(manifest.timeout_secs)
        .map_or_else(|| config.stress_timeout(), Duration::from_secs);
    let options = StressOptions::with_timeout(timeout);
    let mut sink = JsonlSink::new(
        args.sink
            .clone()
            .unwrap_or_else(|| manifest.default_sink_path()),
    );
    info!(contest = %manifest.contest, problem = %problem.code, candidates = manifest.candidates.len(), "starting hack run");

    let mut session = match problem.reference_job(&registry, &settings) {
        Ok(job) => StressSession::open(job, &registry),
        Err(err) => Err(Verdict::execution_error(Side::Reference, None, &err)),
    };

    let mut hacked = false;
    let mut failed = false;
    for entry in &manifest.candidates {
        let verdict = match session.as_mut() {
            Err(reference_failure) => reference_failure.clone(),
            Ok(session) => match manifest.candidate_spec(entry) {
                Err(err) => {
                    warn!(candidate = %entry.id, err = %format!("{err:#}"), "candidate source unreadable");
                    Verdict::ExecutionError {
                        side: Side::Candidate,
                        kind: ErrorKind::InternalError,
                        seed: None,
                        message: format!("{err:#}"),
                    }
                }
                Ok(candidate) => {
                    let mut generator = generators.create(&problem.generator)?;
                    match candidate.job(&problem, &registry, &settings) {
                        Err(err) => Verdict::execution_error(Side::Candidate, None, &err),
                        Ok(job) => session.test(job, &registry, generator.as_mut(), &options, |report| {
                            debug!(candidate = %entry.id, seed = report.seed, "seed passed");
                        }),
                    }
                }
            },
        };

        hacked |= verdict.is_hacked();
        failed |= matches!(verdict, Verdict::ExecutionError { .. });
        println!("{}", summary_line(&entry.id, &verdict));
        sink.publish(&VerdictRecord::new(
            &manifest.contest,
            &problem.code,
            &entry.id,
            &problem.generator,
            verdict,
        ))?;
    }

    if let Ok(session) = session
        && let Err(err) = session.finish()
    {
        warn!(err = %err, "reference purge failed");
    }

    Ok(if hacked {
        exit_codes::HACKED
    } else if failed {
        exit_codes::EXEC_ERROR
    } else {
        exit_codes::OK
    })
}

fn summary_line(candidate: &str, verdict: &Verdict) -> String {
    match verdict {
        Verdict::Hacked { seed, .. } => format!("hack: candidate={candidate} verdict=hacked seed={seed}"),
        Verdict::Exhausted { seeds_tried } => {
            format!("hack: candidate={candidate} verdict=exhausted seeds={seeds_tried}")
        }
        Verdict::ExecutionError {
            side,
            kind,
            seed,
            message,
        } => {
            let first_line = message.lines().next().unwrap_or_default();
            let seed = seed.map_or_else(|| "-".to_string(), |s| s.to_string());
            format!(
                "hack: candidate={candidate} verdict=execution_error side={side:?} kind={kind:?} seed={seed} message={first_line:?}"
            )
        }
    }
}

/// Print the input a generator produces for `seed`.
pub fn generate(generator_id: &str, seed: u64) -> Result<()> {
    let mut generator = GeneratorRegistry::with_builtins().create(generator_id)?;
    print!("{}", generator.generate(seed));
    Ok(())
}

/// List registered languages.
pub fn list_languages(config: Option<&Path>) -> Result<()> {
    let config = config_or_default(config)?;
    let registry = config.language_registry()?;
    for language in registry.iter() {
        println!(
            "{} kind={:?} extension={} time_x={} memory_x={} aliases={}",
            language.id,
            language.kind,
            language.extension,
            language.time_multiplier,
            language.memory_multiplier,
            language.aliases.join(",")
        );
    }
    Ok(())
}

/// List generator ids.
pub fn list_generators() {
    for id in GeneratorRegistry::with_builtins().ids() {
        println!("{id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lines_are_single_line() {
        let verdict = Verdict::ExecutionError {
            side: Side::Candidate,
            kind: ErrorKind::RuntimeError,
            seed: Some(4),
            message: "process exited abnormally\nTraceback".to_string(),
        };
        let line = summary_line("77", &verdict);
        assert!(!line.contains('\n'));
        assert!(line.contains("seed=4"));
        assert!(line.contains("kind=RuntimeError"));
        assert_eq!(
            summary_line("77", &Verdict::Exhausted { seeds_tried: 9 }),
            "hack: candidate=77 verdict=exhausted seeds=9"
        );
    }
}
