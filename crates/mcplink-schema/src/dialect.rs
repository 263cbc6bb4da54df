//! Dialect detection.

use serde_json::Value;

/// The JSON Schema drafts this validator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Draft 2020-12: `prefixItems` + schema-form `items`, `$dynamicRef`
    Draft202012,
    /// Draft 2019-09: `$recursiveRef` era; treated as 2020-12 minus
    /// `prefixItems` (array-form `items` still applies positionally)
    Draft201909,
    /// Draft 07: array-form `items` + `additionalItems`, `$ref` replaces
    /// siblings, `definitions`
    Draft07,
}

impl Dialect {
    /// Detect the dialect of a schema document from its `$schema`, falling
    /// back to `default` when absent or unrecognized.
    pub fn detect(schema: &Value, default: Self) -> Self {
        let Some(Value::String(meta)) = schema.get("$schema") else {
            return default;
        };
        if meta.contains("2020-12") {
            Self::Draft202012
        } else if meta.contains("2019-09") {
            Self::Draft201909
        } else if meta.contains("draft-07") || meta.contains("draft-06") || meta.contains("draft-04")
        {
            Self::Draft07
        } else {
            default
        }
    }

    /// Whether `$ref` replaces its sibling keywords (draft-07 behavior).
    pub fn ref_replaces_siblings(self) -> bool {
        matches!(self, Self::Draft07)
    }

    /// Whether `prefixItems` is the positional-items keyword.
    pub fn uses_prefix_items(self) -> bool {
        matches!(self, Self::Draft202012)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_known_dialects() {
        let cases = [
            ("https://json-schema.org/draft/2020-12/schema", Dialect::Draft202012),
            ("https://json-schema.org/draft/2019-09/schema", Dialect::Draft201909),
            ("http://json-schema.org/draft-07/schema#", Dialect::Draft07),
        ];
        for (meta, expected) in cases {
            let schema = json!({"$schema": meta});
            assert_eq!(Dialect::detect(&schema, Dialect::Draft202012), expected);
        }
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(
            Dialect::detect(&json!({}), Dialect::Draft202012),
            Dialect::Draft202012
        );
        assert_eq!(
            Dialect::detect(&json!({"$schema": "urn:custom"}), Dialect::Draft07),
            Dialect::Draft07
        );
    }
}
