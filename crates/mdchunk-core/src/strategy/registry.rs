use super::{ChunkingStrategy, DocumentStrategy, ElementStrategy, HierarchicalStrategy};
use crate::error::{ChunkerError, Result};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use std::collections::BTreeMap;
use std::fmt;

/// Name to prototype map of chunking strategies.
///
/// [`get`](Self::get) always returns a fresh clone; prototypes are never
/// handed out, so callers can configure what they get freely.
#[derive(Clone)]
pub struct StrategyRegistry {
    prototypes: BTreeMap<String, Box<dyn ChunkingStrategy>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StrategyRegistry {
    /// Registry without any strategy.
    pub const fn empty() -> Self {
        Self {
            prototypes: BTreeMap::new(),
        }
    }

    /// Registry holding `element`, `hierarchical` and `document`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ElementStrategy::new()));
        registry.register(Box::new(HierarchicalStrategy::new()));
        registry.register(Box::new(DocumentStrategy::new()));
        registry
    }

    /// Add or replace a prototype under its own name.
    pub fn register(&mut self, strategy: Box<dyn ChunkingStrategy>) {
        self.prototypes.insert(strategy.name().to_string(), strategy);
    }

    /// Clone of the prototype registered as `name`.
    pub fn get(&self, name: &str) -> Result<Box<dyn ChunkingStrategy>> {
        self.prototypes
            .get(name)
            .map(|prototype| prototype.clone_box())
            .ok_or_else(|| {
                let err = ChunkerError::strategy_not_found(name);
                match self.suggest(name) {
                    Some(suggestion) => err.with_context("suggestion", suggestion),
                    None => err,
                }
            })
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.prototypes.keys().map(String::as_str).collect()
    }

    /// `(name, description)` pairs in sorted order.
    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.prototypes
            .iter()
            .map(|(name, strategy)| (name.as_str(), strategy.describe()))
            .collect()
    }

    /// Closest registered name to a misspelled one.
    fn suggest(&self, name: &str) -> Option<&str> {
        let matcher = SkimMatcherV2::default();
        let query = name.to_ascii_lowercase();
        self.prototypes
            .keys()
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(candidate, &query)
                    .map(|score| (score, candidate.as_str()))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, candidate)| candidate)
    }
}
