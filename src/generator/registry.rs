//! Variant registry: tag -> generator constructor, resolved once at startup.

use std::collections::HashMap;

use super::{Generator, GeneratorConfig, SyntheticGenerator};
use crate::error::{Error, Result};

/// Constructor for one generator variant.
pub type GeneratorCtor = Box<dyn Fn(&GeneratorConfig) -> Result<Box<dyn Generator>>>;

/// Maps variant tags to constructors so that architecture choice happens in
/// exactly one place instead of string dispatch at call sites.
pub struct GeneratorRegistry {
    ctors: HashMap<String, GeneratorCtor>,
}

impl GeneratorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("synthetic", |cfg| {
            Ok(Box::new(SyntheticGenerator::from_config(cfg)?) as Box<dyn Generator>)
        });
        registry
    }

    /// Register a variant constructor under a tag.
    pub fn register<F>(&mut self, tag: &str, ctor: F)
    where
        F: Fn(&GeneratorConfig) -> Result<Box<dyn Generator>> + 'static,
    {
        self.ctors.insert(tag.to_string(), Box::new(ctor));
    }

    /// Build the variant named by `cfg.variant`.
    pub fn build(&self, cfg: &GeneratorConfig) -> Result<Box<dyn Generator>> {
        let ctor = self
            .ctors
            .get(&cfg.variant)
            .ok_or_else(|| Error::UnknownVariant(cfg.variant.clone()))?;
        ctor(cfg)
    }

    /// Registered variant tags.
    pub fn variants(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
