//! Validation results.

use std::collections::HashMap;

use serde_json::Value;

/// One validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Stable machine-readable code (`type-mismatch`, `required-missing`,
    /// `unevaluated-properties-found`, ...)
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// JSON Pointer into the instance
    pub instance_path: String,
    /// The keyword that failed
    pub keyword: String,
}

/// One annotation a keyword attached (e.g. an unasserted `format`).
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// JSON Pointer into the instance
    pub instance_path: String,
    /// The annotating keyword
    pub keyword: String,
    /// The annotation value
    pub value: Value,
}

/// The result of a validation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    /// Whether the instance conforms
    pub is_valid: bool,
    /// Failures, in evaluation order
    pub errors: Vec<ValidationIssue>,
    /// Annotations collected along the way
    pub annotations: Vec<Annotation>,
}

impl ValidationOutcome {
    /// Group errors by instance path.
    pub fn errors_by_path(&self) -> HashMap<&str, Vec<&ValidationIssue>> {
        let mut map: HashMap<&str, Vec<&ValidationIssue>> = HashMap::new();
        for issue in &self.errors {
            map.entry(issue.instance_path.as_str()).or_default().push(issue);
        }
        map
    }

    /// Group annotations by instance path.
    pub fn annotations_by_path(&self) -> HashMap<&str, Vec<&Annotation>> {
        let mut map: HashMap<&str, Vec<&Annotation>> = HashMap::new();
        for annotation in &self.annotations {
            map.entry(annotation.instance_path.as_str())
                .or_default()
                .push(annotation);
        }
        map
    }
}
