//! Compiled-regex caching with safety screening.
//!
//! The engine underneath (the `regex` crate) is linear-time by construction,
//! so a pattern cannot backtrack exponentially; the screening below
//! additionally refuses the classic nested-unbounded-quantifier shapes
//! (`(x+)+`, `([^x]*)*`) outright, and compilation is size-bounded so a
//! pathological pattern cannot eat memory instead. The cache itself is
//! count-bounded at 1000 entries, evicting least-recently used, so untrusted
//! schemas cannot grow it without limit. The evaluation budget for a single
//! match defaults to two seconds; with a linear-time engine and the
//! compile-size cap it is unreachable in practice and exists as a contract
//! for callers supplying their own engines.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;

/// Upper bound on the compiled size of one pattern (bytes).
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

/// Compiled (and refused) patterns are cached up to this many entries,
/// evicting least-recently used.
const PATTERN_CACHE_CAPACITY: usize = 1000;

/// Evaluation budget for a single pattern match.
pub const PATTERN_TIME_BUDGET: Duration = Duration::from_secs(2);

type CachedPattern = Result<Arc<Regex>, String>;

/// Count-bounded cache of compiled patterns, including negative entries for
/// patterns that were refused or failed to compile.
#[derive(Debug)]
pub struct PatternCache {
    entries: Mutex<PatternEntries>,
}

#[derive(Debug)]
struct PatternEntries {
    capacity: usize,
    map: HashMap<String, CachedPattern>,
    order: VecDeque<String>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCache {
    /// An empty cache with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(PATTERN_CACHE_CAPACITY)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(PatternEntries {
                capacity,
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Compile (or fetch) a pattern.
    ///
    /// # Errors
    ///
    /// A description when the pattern is refused by the safety screen or
    /// rejected by the engine.
    pub fn compile(&self, pattern: &str) -> CachedPattern {
        let mut entries = self.entries.lock().expect("pattern cache poisoned");
        if let Some(cached) = entries.map.get(pattern).cloned() {
            entries.touch(pattern);
            return cached;
        }

        let compiled = if has_nested_unbounded_quantifier(pattern) {
            Err(format!(
                "pattern '{pattern}' refused: nested unbounded quantifier"
            ))
        } else {
            regex::RegexBuilder::new(pattern)
                .size_limit(COMPILED_SIZE_LIMIT)
                .build()
                .map(Arc::new)
                .map_err(|e| format!("pattern '{pattern}' rejected: {e}"))
        };

        entries.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

impl PatternEntries {
    fn insert(&mut self, key: String, value: CachedPattern) {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.map.insert(key.clone(), value);
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

/// Detect a quantified group that is itself quantified: a `)` bearing `+` or
/// `*` whose last inner element also bears an unbounded quantifier.
fn has_nested_unbounded_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    for i in 1..bytes.len() {
        if bytes[i] != b')' {
            continue;
        }
        let outer_quantified = matches!(bytes.get(i + 1), Some(b'+' | b'*'));
        let inner_quantified = matches!(bytes[i - 1], b'+' | b'*')
            && !is_escaped(bytes, i - 1);
        if outer_quantified && inner_quantified && !is_escaped(bytes, i) {
            return true;
        }
    }
    false
}

fn is_escaped(bytes: &[u8], index: usize) -> bool {
    let mut backslashes = 0;
    let mut i = index;
    while i > 0 && bytes[i - 1] == b'\\' {
        backslashes += 1;
        i -= 1;
    }
    backslashes % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_caches_ordinary_patterns() {
        let cache = PatternCache::new();
        let a = cache.compile("^[a-z]+$").unwrap();
        let b = cache.compile("^[a-z]+$").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_match("hello"));
    }

    #[test]
    fn refuses_nested_unbounded_quantifiers() {
        let cache = PatternCache::new();
        for pattern in ["(x+)+", "([^x]*)*", "(a*)+y", "^(ab+)+$"] {
            let err = cache.compile(pattern).unwrap_err();
            assert!(err.contains("refused"), "{pattern} not refused: {err}");
        }
    }

    #[test]
    fn escaped_parens_are_not_groups() {
        let cache = PatternCache::new();
        assert!(cache.compile(r"x+\)+").is_ok());
    }

    #[test]
    fn bounded_nesting_is_allowed() {
        let cache = PatternCache::new();
        assert!(cache.compile("(abc)+").is_ok());
        assert!(cache.compile("(a|b)*c").is_ok());
    }

    #[test]
    fn invalid_patterns_report_engine_errors() {
        let cache = PatternCache::new();
        assert!(cache.compile("(unclosed").is_err());
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = PatternCache::with_capacity(2);
        let a = cache.compile("a+").unwrap();
        cache.compile("b+").unwrap();
        // Refresh "a+", then insert a third pattern: "b+" is the one evicted.
        let a_again = cache.compile("a+").unwrap();
        assert!(Arc::ptr_eq(&a, &a_again));
        cache.compile("c+").unwrap();

        let entries = cache.entries.lock().unwrap();
        assert!(entries.map.contains_key("a+"));
        assert!(!entries.map.contains_key("b+"));
        assert!(entries.map.contains_key("c+"));
        assert_eq!(entries.map.len(), 2);
    }

    #[test]
    fn negative_entries_are_bounded_too() {
        let cache = PatternCache::with_capacity(2);
        cache.compile("(one").unwrap_err();
        cache.compile("(two").unwrap_err();
        cache.compile("(three").unwrap_err();
        assert_eq!(cache.entries.lock().unwrap().map.len(), 2);
    }
}
