use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::generator::{AlphaGenerator, BetaGenerator, Generator, PermutationGenerator};

type Constructor = Box<dyn Fn() -> Box<dyn Generator> + Send + Sync>;

/// Explicit map from generator id to constructor, populated once at startup.
#[derive(Default)]
pub struct GeneratorRegistry {
    entries: BTreeMap<String, Constructor>,
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl GeneratorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("alpha", || Box::new(AlphaGenerator::default()));
        registry.register("beta", || Box::new(BetaGenerator::default()));
        registry.register("permutation", || Box::new(PermutationGenerator::default()));
        registry
    }

    /// Register `constructor` under `id`, replacing any previous entry.
    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn() -> Box<dyn Generator> + Send + Sync + 'static,
    {
        self.entries.insert(normalize(id), Box::new(constructor));
    }

    /// Build a fresh generator. Ids are case-insensitive and accept a
    /// trailing `Generator`, so `AlphaGenerator` names `alpha`.
    pub fn create(&self, id: &str) -> EngineResult<Box<dyn Generator>> {
        self.entries
            .get(&normalize(id))
            .map(|constructor| constructor())
            .ok_or_else(|| EngineError::UnknownGenerator(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&normalize(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn normalize(id: &str) -> String {
    let lower = id.trim().to_ascii_lowercase();
    match lower.strip_suffix("generator") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}
