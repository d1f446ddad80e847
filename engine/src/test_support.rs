//! Test-only helpers: stand-in languages built from POSIX tools and scripted
//! generators, so engine tests run without real compilers.

use std::path::Path;

use rand::Rng;
use rand::rngs::StdRng;

use crate::core::types::ResourceLimits;
use crate::error::EngineResult;
use crate::generator::{Generator, GeneratorState, InputBuilder, SanitizedCase};
use crate::job::{ExecutionSettings, Job};
use crate::lang::{EntryPointProbe, LanguageDescriptor, LanguageRegistry, StrategyKind};
use crate::template::CommandTemplate;

fn descriptor(id: &str, extension: &str, kind: StrategyKind) -> LanguageDescriptor {
    LanguageDescriptor {
        id: id.to_string(),
        aliases: Vec::new(),
        extension: extension.to_string(),
        kind,
        build: None,
        run: CommandTemplate::new(["sh", "{{ source }}"]),
        entry_point: None,
        time_multiplier: 1.0,
        memory_multiplier: 1.0,
        source_stem: "solution".to_string(),
        source_name_pattern: None,
    }
}

/// Interpreted: scripts run with `sh`.
pub fn sh_language() -> LanguageDescriptor {
    descriptor("sh", ".sh", StrategyKind::Interpreted)
}

/// Native: "compiles" by copying the script into place and marking it executable.
pub fn native_sh_language() -> LanguageDescriptor {
    LanguageDescriptor {
        build: Some(CommandTemplate::new([
            "sh",
            "-c",
            "cp \"$0\" \"$1\" && chmod +x \"$1\"",
            "{{ source }}",
            "{{ executable }}",
        ])),
        run: CommandTemplate::new(["{{ executable }}"]),
        ..descriptor("shc", ".sh", StrategyKind::Native)
    }
}

/// Native whose build always fails with `syntax error` on stderr.
pub fn broken_native_language() -> LanguageDescriptor {
    LanguageDescriptor {
        build: Some(CommandTemplate::new([
            "sh",
            "-c",
            "echo 'syntax error' >&2; exit 1",
        ])),
        run: CommandTemplate::new(["{{ executable }}"]),
        ..descriptor("broken-native", ".txt", StrategyKind::Native)
    }
}

/// Managed: each source line `name kind` becomes `class_dir/name.unit`
/// containing `kind`; units containing `main` are entry points.
pub fn units_language() -> LanguageDescriptor {
    LanguageDescriptor {
        build: Some(CommandTemplate::new([
            "sh",
            "-c",
            "while read name kind; do echo \"$kind\" > \"$1/$name.unit\"; done < \"$0\"",
            "{{ source }}",
            "{{ class_dir }}",
        ])),
        run: CommandTemplate::new(["sh", "-c", "echo \"running $0\"", "{{ entry_point }}"]),
        entry_point: Some(EntryPointProbe {
            unit_extension: "unit".to_string(),
            command: CommandTemplate::new(["cat", "{{ unit_path }}"]),
            marker: "(?m)^main$".to_string(),
        }),
        source_stem: "Main".to_string(),
        ..descriptor("units", ".src", StrategyKind::Managed)
    }
}

/// Registry with every stand-in language and none of the built-ins.
pub fn sh_registry() -> LanguageRegistry {
    let mut registry = LanguageRegistry::empty();
    for language in [
        sh_language(),
        native_sh_language(),
        broken_native_language(),
        units_language(),
    ] {
        registry.register(language).expect("stand-in language is valid");
    }
    registry
}

/// 5 s / 256 MB: generous enough for `sh` on a loaded CI machine.
pub fn test_limits() -> ResourceLimits {
    ResourceLimits::from_millis_and_mb(5_000, 256).expect("limits")
}

pub fn test_settings(workspace_root: &Path) -> ExecutionSettings {
    let build_limits = ResourceLimits::from_millis_and_mb(10_000, 512).expect("build limits");
    let mut settings = ExecutionSettings::new(workspace_root.to_path_buf(), build_limits);
    settings.output_limit_bytes = 1 << 20;
    settings
}

/// An `sh` job with default test limits.
pub fn sh_job(label: &str, source: &str, workspace_root: &Path) -> Job {
    Job::new(label, "sh", source, test_limits(), test_settings(workspace_root))
}

type WriteInput = fn(&mut StdRng, &mut InputBuilder);
type Judge = fn(&SanitizedCase) -> EngineResult<bool>;

/// Generator whose input and optional oracle are plain functions.
pub struct ScriptedGenerator {
    name: String,
    state: GeneratorState,
    write: WriteInput,
    judge: Option<Judge>,
}

impl ScriptedGenerator {
    pub fn new(name: &str, write: WriteInput) -> Self {
        Self {
            name: name.to_string(),
            state: GeneratorState::default(),
            write,
            judge: None,
        }
    }

    pub fn with_judge(mut self, judge: Judge) -> Self {
        self.judge = Some(judge);
        self
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    fn write_input(&self, rng: &mut StdRng, out: &mut InputBuilder) {
        (self.write)(rng, out);
    }

    fn judge(&self, case: &SanitizedCase) -> EngineResult<bool> {
        match self.judge {
            Some(judge) => judge(case),
            None => Ok(case.reference == case.candidate),
        }
    }
}

/// Two integers `a b` in `1..=1000` per input.
pub fn pair_generator() -> ScriptedGenerator {
    ScriptedGenerator::new("pair", |rng, out| {
        out.line([rng.gen_range(1..=1_000u32), rng.gen_range(1..=1_000u32)]);
    })
}

/// Reference solution for [`pair_generator`] inputs.
pub const SUM_SCRIPT: &str = "read a b\necho $((a + b))\n";
