//! Languages compiled to units launched by a managed runtime (Java).
//!
//! After a successful build every compiled unit is probed, in file-name
//! order, and exactly one of them must expose an entry point.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::core::types::ProcessResult;
use crate::error::{EngineError, EngineResult};
use crate::io::process::execute;
use crate::lang::{
    Artifact, EntryPointProbe, LanguageDescriptor, Strategy, StrategyEnv, check_build,
    remove_files, write_source,
};
use crate::template::TemplateVars;

const CLASS_DIR: &str = "classes";

pub struct ManagedStrategy {
    descriptor: LanguageDescriptor,
    env: StrategyEnv,
    source_path: Option<PathBuf>,
    units: Vec<PathBuf>,
    artifact: Option<Artifact>,
}

impl ManagedStrategy {
    pub fn new(descriptor: LanguageDescriptor, env: StrategyEnv) -> Self {
        Self {
            descriptor,
            env,
            source_path: None,
            units: Vec::new(),
            artifact: None,
        }
    }

    fn class_dir(&self) -> PathBuf {
        self.env.workdir.join(CLASS_DIR)
    }

    fn vars(&self, source: &Path) -> TemplateVars {
        self.env
            .base_vars(source)
            .with_path("class_dir", &self.class_dir())
    }

    /// Compiled units sorted by file name.
    fn compiled_units(&self, extension: &str) -> EngineResult<Vec<PathBuf>> {
        let class_dir = self.class_dir();
        let entries = fs::read_dir(&class_dir)
            .map_err(|e| EngineError::io(format!("read {}", class_dir.display()), e))?;
        let mut units = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| EngineError::io(format!("read entry in {}", class_dir.display()), e))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
                units.push(path);
            }
        }
        units.sort();
        Ok(units)
    }

    fn find_entry_point(&self, probe: &EntryPointProbe, source: &Path) -> EngineResult<String> {
        let marker = Regex::new(&probe.marker)
            .map_err(|e| EngineError::Template(format!("entry point marker: {e}")))?;
        let mut entry_points = Vec::new();
        for unit in &self.units {
            let Some(name) = unit.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let vars = self
                .vars(source)
                .with("unit", name.clone())
                .with_path("unit_path", unit);
            let argv = probe.command.render(&vars)?;
            let result = execute(&self.env.build_request(argv), None);
            check_build(&result)?;
            if marker.is_match(&result.stdout) {
                entry_points.push(name);
            }
        }
        debug!(units = self.units.len(), ?entry_points, "probed compiled units");
        match entry_points.len() {
            0 => Err(EngineError::NoEntryPoint),
            1 => Ok(entry_points.remove(0)),
            _ => Err(EngineError::AmbiguousEntryPoint {
                candidates: entry_points,
            }),
        }
    }
}

impl Strategy for ManagedStrategy {
    #[instrument(skip_all, fields(language = %self.descriptor.id))]
    fn prepare(&mut self, source: &str) -> EngineResult<Artifact> {
        let source_path = write_source(&self.descriptor, &self.env, source)?;
        self.source_path = Some(source_path.clone());
        let class_dir = self.class_dir();
        fs::create_dir_all(&class_dir)
            .map_err(|e| EngineError::io(format!("create {}", class_dir.display()), e))?;

        let (Some(build), Some(probe)) = (&self.descriptor.build, &self.descriptor.entry_point)
        else {
            return Err(EngineError::Template(
                "managed language needs build and entry_point".to_string(),
            ));
        };
        let argv = build.render(&self.vars(&source_path))?;
        debug!(?argv, "building managed units");
        check_build(&execute(&self.env.build_request(argv), None))?;

        self.units = self.compiled_units(&probe.unit_extension)?;
        let name = self.find_entry_point(probe, &source_path)?;
        info!(entry_point = %name, "resolved entry point");
        let artifact = Artifact::EntryPoint {
            class_dir,
            name,
        };
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }

    fn run(&self, stdin: &str) -> EngineResult<ProcessResult> {
        let (Some(source_path), Some(Artifact::EntryPoint { name, .. })) =
            (&self.source_path, &self.artifact)
        else {
            return Err(EngineError::NotReady {
                state: "unbuilt".to_string(),
            });
        };
        let vars = self.vars(source_path).with("entry_point", name.clone());
        let argv = self.descriptor.run.render(&vars)?;
        Ok(execute(&self.env.run_request(argv), Some(stdin.as_bytes())))
    }

    fn purge(&mut self) -> EngineResult<()> {
        let mut paths: Vec<PathBuf> = std::mem::take(&mut self.units);
        paths.extend(self.source_path.take());
        self.artifact = None;
        let files = remove_files(paths.iter().map(PathBuf::as_path));

        let class_dir = self.class_dir();
        let dir = match fs::remove_dir_all(&class_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %class_dir.display(), err = %e, "failed to remove class directory");
                Err(EngineError::io(format!("remove {}", class_dir.display()), e))
            }
        };
        files.and(dir)
    }

    fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }
}
