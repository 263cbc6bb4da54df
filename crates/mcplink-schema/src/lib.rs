//! # JSON Schema Validator
//!
//! Validates instances against JSON Schema drafts 2020-12 (default), 2019-09,
//! and 07, detected per document from `$schema`. Built for checking MCP tool
//! arguments against `inputSchema` and structured tool output against
//! `outputSchema`, so it favors precise error paths over raw throughput.
//!
//! Supported surface: type/const/enum with integer–number cross-equality,
//! the numeric/string/array/object keyword sets, `allOf`/`anyOf`/`oneOf`/
//! `not`, `if`/`then`/`else`, `dependentRequired`/`dependentSchemas`,
//! `$ref`/`$dynamicRef` with `$anchor`/`$dynamicAnchor` and JSON Pointer
//! fragments, and `unevaluatedProperties`/`unevaluatedItems` fed by the
//! evaluated sets every other applicator accumulates. External (network)
//! `$ref` targets are refused.
//!
//! `format` is annotation-only unless [`ValidatorOptions::assert_formats`] is
//! set, matching the 2020-12 default. Content checks (`contentEncoding`,
//! `contentMediaType`, `contentSchema`) assert by default and can be turned
//! off.

mod content;
mod dialect;
mod eval;
mod formats;
mod outcome;
mod pattern;
mod resolver;

pub use dialect::Dialect;
pub use outcome::{Annotation, ValidationIssue, ValidationOutcome};
pub use pattern::{PATTERN_TIME_BUDGET, PatternCache};

use std::sync::{Arc, Mutex};

use serde_json::Value;

use resolver::Registry;

/// Knobs for a [`Validator`].
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Treat `format` as an assertion instead of an annotation.
    pub assert_formats: bool,
    /// Assert `contentEncoding`/`contentMediaType`/`contentSchema`.
    pub assert_content: bool,
    /// Dialect assumed when a schema carries no `$schema`.
    pub default_dialect: Dialect,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            assert_formats: false,
            assert_content: true,
            default_dialect: Dialect::Draft202012,
        }
    }
}

/// Schemas analyzed (anchors, ids, dynamic anchors) are cached up to this
/// many entries, evicting least-recently used.
const SCHEMA_CACHE_CAPACITY: usize = 1000;

/// A reusable validator.
///
/// Holds the compiled-pattern cache and an LRU of analyzed schemas, both
/// shared across calls; `validate` itself is pure.
#[derive(Debug)]
pub struct Validator {
    options: ValidatorOptions,
    patterns: PatternCache,
    registry_cache: Mutex<RegistryCache>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// A validator with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ValidatorOptions::default())
    }

    /// A validator with explicit options.
    #[must_use]
    pub fn with_options(options: ValidatorOptions) -> Self {
        Self {
            options,
            patterns: PatternCache::new(),
            registry_cache: Mutex::new(RegistryCache::new(SCHEMA_CACHE_CAPACITY)),
        }
    }

    /// Validate `instance` against `schema`.
    pub fn validate(&self, instance: &Value, schema: &Value) -> ValidationOutcome {
        let registry = self.registry_for(schema);
        eval::run_root(instance, schema, &registry, &self.options, &self.patterns)
    }

    fn registry_for(&self, schema: &Value) -> Arc<Registry> {
        let key = mcplink_protocol::json::canonical(schema);
        let mut cache = self.registry_cache.lock().expect("registry cache poisoned");
        if let Some(registry) = cache.get(&key) {
            return registry;
        }
        let registry = Arc::new(Registry::build(schema));
        cache.insert(key, Arc::clone(&registry));
        registry
    }
}

/// Count-bounded LRU of analyzed schemas.
#[derive(Debug)]
struct RegistryCache {
    capacity: usize,
    entries: std::collections::HashMap<String, Arc<Registry>>,
    order: std::collections::VecDeque<String>,
}

impl RegistryCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: std::collections::HashMap::new(),
            order: std::collections::VecDeque::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<Registry>> {
        let registry = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(registry)
    }

    fn insert(&mut self, key: String, registry: Arc<Registry>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key.clone(), registry);
        self.order.retain(|k| k != &key);
        self.order.push_back(key);
    }

    fn touch(&mut self, key: &str) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(position).expect("position just found");
            self.order.push_back(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_cache_evicts_least_recently_used() {
        let mut cache = RegistryCache::new(2);
        let r = Arc::new(Registry::build(&json!({})));
        cache.insert("a".into(), Arc::clone(&r));
        cache.insert("b".into(), Arc::clone(&r));
        assert!(cache.get("a").is_some()); // refresh a
        cache.insert("c".into(), Arc::clone(&r)); // evicts b
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }
}
