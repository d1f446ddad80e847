//! Ahead-of-time compiled languages (C, C++ and friends).

use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::core::types::ProcessResult;
use crate::error::{EngineError, EngineResult};
use crate::io::process::execute;
use crate::lang::{
    Artifact, LanguageDescriptor, Strategy, StrategyEnv, check_build, remove_files, write_source,
};
use crate::template::TemplateVars;

const EXECUTABLE_NAME: &str = "solution.bin";

pub struct NativeStrategy {
    descriptor: LanguageDescriptor,
    env: StrategyEnv,
    source_path: Option<PathBuf>,
    artifact: Option<Artifact>,
}

impl NativeStrategy {
    pub fn new(descriptor: LanguageDescriptor, env: StrategyEnv) -> Self {
        Self {
            descriptor,
            env,
            source_path: None,
            artifact: None,
        }
    }

    fn vars(&self, source: &std::path::Path) -> TemplateVars {
        self.env
            .base_vars(source)
            .with_path("executable", &self.env.workdir.join(EXECUTABLE_NAME))
    }
}

impl Strategy for NativeStrategy {
    #[instrument(skip_all, fields(language = %self.descriptor.id))]
    fn prepare(&mut self, source: &str) -> EngineResult<Artifact> {
        let source_path = write_source(&self.descriptor, &self.env, source)?;
        self.source_path = Some(source_path.clone());

        let build = self
            .descriptor
            .build
            .as_ref()
            .ok_or_else(|| EngineError::Template("missing build command".to_string()))?;
        let argv = build.render(&self.vars(&source_path))?;
        debug!(?argv, "building native executable");
        check_build(&execute(&self.env.build_request(argv), None))?;

        let executable = self.env.workdir.join(EXECUTABLE_NAME);
        if !executable.is_file() {
            return Err(EngineError::Build {
                message: format!("build produced no executable at {}", executable.display()),
                stderr: String::new(),
            });
        }
        let artifact = Artifact::Executable(executable);
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }

    fn run(&self, stdin: &str) -> EngineResult<ProcessResult> {
        let (Some(source_path), Some(Artifact::Executable(_))) = (&self.source_path, &self.artifact)
        else {
            return Err(EngineError::NotReady {
                state: "unbuilt".to_string(),
            });
        };
        let argv = self.descriptor.run.render(&self.vars(source_path))?;
        Ok(execute(&self.env.run_request(argv), Some(stdin.as_bytes())))
    }

    fn purge(&mut self) -> EngineResult<()> {
        let executable = self.env.workdir.join(EXECUTABLE_NAME);
        let mut paths = vec![executable];
        paths.extend(self.source_path.take());
        self.artifact = None;
        remove_files(paths.iter().map(PathBuf::as_path))
    }

    fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }
}
