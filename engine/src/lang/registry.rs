//! Explicit language registry, populated once at startup.

use anyhow::{Context, Result};

use crate::error::{EngineError, EngineResult};
use crate::lang::descriptor::{LanguageDescriptor, builtin_languages};

#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: Vec<LanguageDescriptor>,
}

impl LanguageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        Self {
            languages: builtin_languages(),
        }
    }

    /// Add a descriptor, replacing any existing one with the same id.
    pub fn register(&mut self, descriptor: LanguageDescriptor) -> Result<()> {
        descriptor
            .validate()
            .with_context(|| format!("register language {}", descriptor.id))?;
        self.languages.retain(|d| !d.id.eq_ignore_ascii_case(&descriptor.id));
        self.languages.push(descriptor);
        Ok(())
    }

    /// Builtins extended or overridden by `extra`.
    pub fn from_descriptors(extra: &[LanguageDescriptor]) -> Result<Self> {
        let mut registry = Self::with_builtins();
        for descriptor in extra {
            registry.register(descriptor.clone())?;
        }
        Ok(registry)
    }

    pub fn lookup(&self, identifier: &str) -> EngineResult<&LanguageDescriptor> {
        self.languages
            .iter()
            .find(|d| d.matches(identifier))
            .ok_or_else(|| EngineError::UnsupportedLanguage(identifier.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageDescriptor> {
        self.languages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::StrategyKind;
    use crate::template::CommandTemplate;

    #[test]
    fn unknown_language_fails_fast() {
        let registry = LanguageRegistry::with_builtins();
        let err = registry.lookup("brainfuck").expect_err("unsupported");
        assert!(matches!(err, EngineError::UnsupportedLanguage(ref id) if id == "brainfuck"));
    }

    #[test]
    fn lookup_resolves_aliases() {
        let registry = LanguageRegistry::with_builtins();
        assert_eq!(registry.lookup("Python3").expect("python").id, "python");
    }

    #[test]
    fn register_overrides_builtin_by_id() {
        let mut python = LanguageRegistry::with_builtins()
            .lookup("python")
            .expect("python")
            .clone();
        python.run = CommandTemplate::new(["pypy3", "{{ source }}"]);
        let registry = LanguageRegistry::from_descriptors(&[python]).expect("registry");
        assert_eq!(registry.iter().filter(|d| d.id == "python").count(), 1);
        assert_eq!(registry.lookup("py").expect("py").run.args()[0], "pypy3");
    }

    #[test]
    fn register_rejects_invalid_descriptor() {
        let mut registry = LanguageRegistry::empty();
        let mut bad = LanguageRegistry::with_builtins()
            .lookup("c")
            .expect("c")
            .clone();
        bad.kind = StrategyKind::Interpreted;
        assert!(registry.register(bad).is_err());
        assert!(registry.lookup("c").is_err());
    }
}
