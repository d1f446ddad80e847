//! Problem and candidate metadata as handed over by a source provider, and
//! the resource limits derived from them.

use serde::{Deserialize, Serialize};

use crate::core::types::ResourceLimits;
use crate::error::EngineResult;
use crate::job::{ExecutionSettings, Job};
use crate::lang::LanguageRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSpec {
    /// Short problem code, e.g. `1843C`.
    pub code: String,
    pub reference_source: String,
    /// Language id or alias of the reference solution.
    pub language: String,
    /// Nominal time limit before language multipliers.
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    /// Generator id in the generator registry.
    pub generator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub id: String,
    pub source: String,
    pub language: String,
    /// Extra allowance on top of the language multiplier.
    #[serde(default = "default_time_multiplier")]
    pub time_multiplier: f64,
    /// Overrides the problem's memory limit when set.
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

fn default_time_multiplier() -> f64 {
    1.0
}

impl ProblemSpec {
    pub fn nominal_limits(&self) -> EngineResult<ResourceLimits> {
        ResourceLimits::from_millis_and_mb(self.time_limit_ms, self.memory_limit_mb)
    }

    /// Nominal limits scaled by the reference language's multipliers.
    pub fn reference_limits(&self, registry: &LanguageRegistry) -> EngineResult<ResourceLimits> {
        let language = registry.lookup(&self.language)?;
        self.nominal_limits()?
            .scaled(language.time_multiplier, language.memory_multiplier)
    }

    pub fn reference_job(
        &self,
        registry: &LanguageRegistry,
        settings: &ExecutionSettings,
    ) -> EngineResult<Job> {
        Ok(Job::new(
            "reference",
            self.language.clone(),
            self.reference_source.clone(),
            self.reference_limits(registry)?,
            settings.clone(),
        ))
    }
}

impl CandidateSpec {
    /// `time = problem × language × candidate`; memory is the candidate's
    /// own limit (or the problem's) × the language memory multiplier.
    pub fn limits(
        &self,
        problem: &ProblemSpec,
        registry: &LanguageRegistry,
    ) -> EngineResult<ResourceLimits> {
        let language = registry.lookup(&self.language)?;
        let memory_mb = self.memory_limit_mb.unwrap_or(problem.memory_limit_mb);
        ResourceLimits::from_millis_and_mb(problem.time_limit_ms, memory_mb)?.scaled(
            language.time_multiplier * self.time_multiplier,
            language.memory_multiplier,
        )
    }

    pub fn job(
        &self,
        problem: &ProblemSpec,
        registry: &LanguageRegistry,
        settings: &ExecutionSettings,
    ) -> EngineResult<Job> {
        Ok(Job::new(
            self.id.clone(),
            self.language.clone(),
            self.source.clone(),
            self.limits(problem, registry)?,
            settings.clone(),
        ))
    }
}
