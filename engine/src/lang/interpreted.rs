//! Languages run directly from source by an interpreter.

use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::core::types::ProcessResult;
use crate::error::{EngineError, EngineResult};
use crate::io::process::execute;
use crate::lang::{Artifact, LanguageDescriptor, Strategy, StrategyEnv, remove_files, write_source};

pub struct InterpretedStrategy {
    descriptor: LanguageDescriptor,
    env: StrategyEnv,
    artifact: Option<Artifact>,
}

impl InterpretedStrategy {
    pub fn new(descriptor: LanguageDescriptor, env: StrategyEnv) -> Self {
        Self {
            descriptor,
            env,
            artifact: None,
        }
    }
}

impl Strategy for InterpretedStrategy {
    #[instrument(skip_all, fields(language = %self.descriptor.id))]
    fn prepare(&mut self, source: &str) -> EngineResult<Artifact> {
        let script = write_source(&self.descriptor, &self.env, source)?;
        debug!(script = %script.display(), "script written");
        let artifact = Artifact::Script(script);
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }

    fn run(&self, stdin: &str) -> EngineResult<ProcessResult> {
        let Some(Artifact::Script(script)) = &self.artifact else {
            return Err(EngineError::NotReady {
                state: "unwritten".to_string(),
            });
        };
        let argv = self.descriptor.run.render(&self.env.base_vars(script))?;
        Ok(execute(&self.env.run_request(argv), Some(stdin.as_bytes())))
    }

    fn purge(&mut self) -> EngineResult<()> {
        let script: Option<PathBuf> = match self.artifact.take() {
            Some(Artifact::Script(path)) => Some(path),
            _ => None,
        };
        remove_files(script.iter().map(PathBuf::as_path))
    }

    fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }
}
