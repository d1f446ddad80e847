//! Language descriptors and the built-in language table.

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::template::CommandTemplate;

/// Build/run family a language belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Ahead-of-time compiled to a native executable.
    Native,
    /// Compiled to units that a managed runtime launches by entry point.
    Managed,
    /// Run straight from source by an interpreter.
    Interpreted,
}

/// How a managed build finds its single entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointProbe {
    /// Extension of compiled units, without the dot (e.g. `class`).
    pub unit_extension: String,
    /// Inspects one unit; may use `{{ unit }}`, `{{ unit_path }}` and `{{ class_dir }}`.
    pub command: CommandTemplate,
    /// Regex matched against the probe's stdout to recognise an entry point.
    pub marker: String,
}

/// Static description of one supported language.
///
/// Templates may reference `source`, `workdir`, `executable`, `class_dir`,
/// `entry_point` and `memory_mb`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// File extension including the leading dot.
    pub extension: String,
    pub kind: StrategyKind,
    #[serde(default)]
    pub build: Option<CommandTemplate>,
    pub run: CommandTemplate,
    #[serde(default)]
    pub entry_point: Option<EntryPointProbe>,
    #[serde(default = "default_multiplier")]
    pub time_multiplier: f64,
    #[serde(default = "default_multiplier")]
    pub memory_multiplier: f64,
    /// Source file stem used when `source_name_pattern` does not match.
    #[serde(default = "default_source_stem")]
    pub source_stem: String,
    /// Regex whose first capture group names the source file stem, for
    /// languages that tie file names to declarations.
    #[serde(default)]
    pub source_name_pattern: Option<String>,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_source_stem() -> String {
    "solution".to_string()
}

impl LanguageDescriptor {
    pub fn matches(&self, identifier: &str) -> bool {
        let wanted = identifier.trim();
        self.id.eq_ignore_ascii_case(wanted)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(wanted))
    }

    /// Source file name for `source`, honouring `source_name_pattern`.
    pub fn source_file_name(&self, source: &str) -> String {
        let stem = self
            .source_name_pattern
            .as_deref()
            .and_then(|pattern| Regex::new(pattern).ok())
            .and_then(|re| {
                re.captures(source)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_else(|| self.source_stem.clone());
        format!("{stem}{}", self.extension)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("language id must be non-empty"));
        }
        if !self.extension.starts_with('.') {
            return Err(anyhow!("{}: extension must start with '.'", self.id));
        }
        if self.run.is_empty() {
            return Err(anyhow!("{}: run command must be non-empty", self.id));
        }
        if !(self.time_multiplier > 0.0 && self.memory_multiplier > 0.0) {
            return Err(anyhow!("{}: multipliers must be > 0", self.id));
        }
        if let Some(pattern) = &self.source_name_pattern {
            Regex::new(pattern).map_err(|e| anyhow!("{}: source_name_pattern: {e}", self.id))?;
        }
        match self.kind {
            StrategyKind::Native | StrategyKind::Managed if self.build.is_none() => {
                return Err(anyhow!("{}: compiled languages need a build command", self.id));
            }
            StrategyKind::Interpreted if self.build.is_some() => {
                return Err(anyhow!("{}: interpreted languages have no build step", self.id));
            }
            _ => {}
        }
        match (&self.kind, &self.entry_point) {
            (StrategyKind::Managed, None) => {
                return Err(anyhow!("{}: managed languages need an entry_point probe", self.id));
            }
            (StrategyKind::Managed, Some(probe)) => {
                Regex::new(&probe.marker)
                    .map_err(|e| anyhow!("{}: entry_point.marker: {e}", self.id))?;
                if probe.command.is_empty() {
                    return Err(anyhow!("{}: entry_point.command must be non-empty", self.id));
                }
            }
            (_, Some(_)) => {
                return Err(anyhow!("{}: only managed languages take an entry_point", self.id));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Languages available without any configuration.
pub fn builtin_languages() -> Vec<LanguageDescriptor> {
    vec![
        LanguageDescriptor {
            id: "c".to_string(),
            aliases: vec!["gnu c11".to_string(), "gcc".to_string()],
            extension: ".c".to_string(),
            kind: StrategyKind::Native,
            build: Some(CommandTemplate::new([
                "gcc",
                "-DONLINE_JUDGE",
                "-O2",
                "-x",
                "c",
                "{{ source }}",
                "-o",
                "{{ executable }}",
                "-lm",
            ])),
            run: CommandTemplate::new(["{{ executable }}"]),
            entry_point: None,
            time_multiplier: 1.0,
            memory_multiplier: 1.0,
            source_stem: default_source_stem(),
            source_name_pattern: None,
        },
        LanguageDescriptor {
            id: "cpp".to_string(),
            aliases: vec![
                "c++".to_string(),
                "c++17".to_string(),
                "gnu c++17".to_string(),
                "g++".to_string(),
            ],
            extension: ".cpp".to_string(),
            kind: StrategyKind::Native,
            build: Some(CommandTemplate::new([
                "g++",
                "-DONLINE_JUDGE",
                "-std=c++17",
                "-Wshadow",
                "-Wall",
                "-O2",
                "-Wno-unused-result",
                "-x",
                "c++",
                "{{ source }}",
                "-o",
                "{{ executable }}",
            ])),
            run: CommandTemplate::new(["{{ executable }}"]),
            entry_point: None,
            time_multiplier: 1.0,
            memory_multiplier: 1.0,
            source_stem: default_source_stem(),
            source_name_pattern: None,
        },
        LanguageDescriptor {
            id: "java".to_string(),
            aliases: vec!["java 8".to_string(), "java 11".to_string(), "java 21".to_string()],
            extension: ".java".to_string(),
            kind: StrategyKind::Managed,
            build: Some(CommandTemplate::new([
                "javac",
                "-encoding",
                "UTF-8",
                "-d",
                "{{ class_dir }}",
                "{{ source }}",
            ])),
            run: CommandTemplate::new([
                "java",
                "-Xmx{{ memory_mb }}m",
                "-Xss64m",
                "-XX:+UseSerialGC",
                "-cp",
                "{{ class_dir }}",
                "{{ entry_point }}",
            ]),
            entry_point: Some(EntryPointProbe {
                unit_extension: "class".to_string(),
                command: CommandTemplate::new(["javap", "-cp", "{{ class_dir }}", "{{ unit }}"]),
                marker: r"public\s+static\s+void\s+main\s*\(".to_string(),
            }),
            time_multiplier: 2.0,
            memory_multiplier: 2.0,
            source_stem: "Main".to_string(),
            source_name_pattern: Some(r"public\s+(?:final\s+)?class\s+([A-Za-z_$][\w$]*)".to_string()),
        },
        LanguageDescriptor {
            id: "python".to_string(),
            aliases: vec!["python3".to_string(), "py".to_string(), "python 3".to_string()],
            extension: ".py".to_string(),
            kind: StrategyKind::Interpreted,
            build: None,
            run: CommandTemplate::new(["python3", "-B", "{{ source }}"]),
            entry_point: None,
            time_multiplier: 3.0,
            memory_multiplier: 1.0,
            source_stem: default_source_stem(),
            source_name_pattern: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn java() -> LanguageDescriptor {
        builtin_languages()
            .into_iter()
            .find(|d| d.id == "java")
            .expect("java")
    }

    #[test]
    fn builtins_validate() {
        for descriptor in builtin_languages() {
            descriptor.validate().expect("builtin descriptor");
        }
    }

    #[test]
    fn matches_aliases_case_insensitively() {
        let cpp = builtin_languages()
            .into_iter()
            .find(|d| d.id == "cpp")
            .expect("cpp");
        assert!(cpp.matches("GNU C++17"));
        assert!(cpp.matches(" cpp "));
        assert!(!cpp.matches("c"));
    }

    #[test]
    fn java_source_is_named_after_public_class() {
        let java = java();
        assert_eq!(
            java.source_file_name("import java.util.*;\npublic class Solver {\n}"),
            "Solver.java"
        );
        assert_eq!(java.source_file_name("class Hidden {}"), "Main.java");
    }

    #[test]
    fn managed_without_probe_is_invalid() {
        let mut java = java();
        java.entry_point = None;
        assert!(java.validate().is_err());
    }

    #[test]
    fn interpreted_with_build_is_invalid() {
        let mut python = builtin_languages()
            .into_iter()
            .find(|d| d.id == "python")
            .expect("python");
        python.build = Some(CommandTemplate::new(["true"]));
        assert!(python.validate().is_err());
    }
}
