//! Argument-vector command templates.
//!
//! Each argument is rendered independently with minijinja, so a path that
//! contains spaces stays a single argument and no shell is involved. Unknown
//! placeholders are errors.

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0[0].trim().is_empty()
    }

    pub fn render(&self, vars: &TemplateVars) -> EngineResult<Vec<String>> {
        if self.is_empty() {
            return Err(EngineError::Template("empty command".to_string()));
        }
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        self.0
            .iter()
            .map(|arg| {
                env.render_str(arg, &vars.0)
                    .map_err(|e| EngineError::Template(format!("{arg:?}: {e}")))
            })
            .collect()
    }
}

/// Named values available to a [`CommandTemplate`].
#[derive(Debug, Clone, Default)]
pub struct TemplateVars(BTreeMap<&'static str, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    pub fn with_path(self, name: &'static str, path: &Path) -> Self {
        self.with(name, path.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_argument_separately() {
        let template = CommandTemplate::new(["g++", "-o", "{{ executable }}", "{{ source }}"]);
        let vars = TemplateVars::new()
            .with("executable", "/tmp/a b/solution")
            .with("source", "/tmp/a b/solution.cpp");
        let argv = template.render(&vars).expect("render");
        assert_eq!(
            argv,
            vec!["g++", "-o", "/tmp/a b/solution", "/tmp/a b/solution.cpp"]
        );
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let template = CommandTemplate::new(["run", "{{ missing }}"]);
        let err = template.render(&TemplateVars::new()).expect_err("strict");
        assert!(matches!(err, EngineError::Template(_)));
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(CommandTemplate::default().render(&TemplateVars::new()).is_err());
    }
}
