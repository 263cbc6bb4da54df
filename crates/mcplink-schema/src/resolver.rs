//! Reference resolution: `$id`, `$anchor`, `$dynamicAnchor`, JSON Pointers.
//!
//! A schema document is analyzed once into a [`Registry`]: every embedded
//! resource (`$id`), named anchor, and dynamic anchor is mapped to the JSON
//! Pointer of its schema object. `$ref` resolution then works on pointers
//! alone. External (network) targets are refused by design; everything must
//! resolve within the document.

use std::collections::HashMap;

use serde_json::Value;
use url::Url;

/// Where references resolve inside one schema document.
#[derive(Debug, Default)]
pub struct Registry {
    /// `$anchor` (and `$dynamicAnchor` fallback) name → schema pointer
    pub anchors: HashMap<String, String>,
    /// `$id` value (as written and absolute when resolvable) → schema pointer
    pub ids: HashMap<String, String>,
    /// Resource pointer → dynamic anchors declared in that resource
    pub resource_dynamic: HashMap<String, HashMap<String, String>>,
}

impl Registry {
    /// Analyze a schema document.
    pub fn build(root: &Value) -> Self {
        let mut registry = Self::default();
        registry
            .resource_dynamic
            .insert(String::new(), HashMap::new());
        registry.walk(root, String::new(), String::new(), None);
        registry
    }

    fn walk(
        &mut self,
        node: &Value,
        pointer: String,
        resource: String,
        base_uri: Option<Url>,
    ) {
        match node {
            Value::Object(obj) => {
                let mut resource = resource;
                let mut base_uri = base_uri;

                if let Some(Value::String(id)) = obj.get("$id") {
                    // A new schema resource: record the id, both as written
                    // and joined against the enclosing base when absolute.
                    self.ids.insert(id.clone(), pointer.clone());
                    let joined = match &base_uri {
                        Some(base) => base.join(id).ok(),
                        None => Url::parse(id).ok(),
                    };
                    if let Some(joined) = joined {
                        self.ids.insert(joined.to_string(), pointer.clone());
                        base_uri = Some(joined);
                    }
                    resource = pointer.clone();
                    self.resource_dynamic
                        .entry(resource.clone())
                        .or_default();
                }

                if let Some(Value::String(anchor)) = obj.get("$anchor") {
                    self.anchors.insert(anchor.clone(), pointer.clone());
                }
                if let Some(Value::String(anchor)) = obj.get("$dynamicAnchor") {
                    // Dynamic anchors double as static fallbacks.
                    self.anchors
                        .entry(anchor.clone())
                        .or_insert_with(|| pointer.clone());
                    self.resource_dynamic
                        .entry(resource.clone())
                        .or_default()
                        .insert(anchor.clone(), pointer.clone());
                }

                for (key, value) in obj {
                    let child = format!("{pointer}/{}", escape_pointer_token(key));
                    self.walk(value, child, resource.clone(), base_uri.clone());
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let child = format!("{pointer}/{index}");
                    self.walk(item, child, resource.clone(), base_uri.clone());
                }
            }
            _ => {}
        }
    }

    /// Find the pointer a reference resolves to, given the pointer of the
    /// referencing schema. Returns `Err` with a reason for refusal.
    pub fn resolve_ref(&self, reference: &str) -> Result<String, String> {
        // Pure fragment references.
        if let Some(fragment) = reference.strip_prefix('#') {
            if fragment.is_empty() {
                return Ok(String::new()); // root
            }
            if fragment.starts_with('/') {
                return Ok(percent_decode(fragment));
            }
            return self
                .anchors
                .get(fragment)
                .cloned()
                .ok_or_else(|| format!("unknown anchor '{fragment}'"));
        }

        // Non-fragment references must name a resource embedded in this
        // document; anything else would need the network.
        let (uri, fragment) = match reference.split_once('#') {
            Some((uri, fragment)) => (uri, Some(fragment)),
            None => (reference, None),
        };

        let base = self
            .ids
            .get(uri)
            .cloned()
            .ok_or_else(|| format!("external reference '{uri}' refused"))?;

        match fragment {
            None | Some("") => Ok(base),
            Some(fragment) if fragment.starts_with('/') => {
                Ok(format!("{base}{}", percent_decode(fragment)))
            }
            Some(anchor) => self
                .anchors
                .get(anchor)
                .cloned()
                .ok_or_else(|| format!("unknown anchor '{anchor}'")),
        }
    }

    /// Resolve a dynamic reference: the *outermost* dynamic scope declaring
    /// the anchor wins; the static anchor table is the fallback.
    pub fn resolve_dynamic(
        &self,
        anchor: &str,
        dynamic_scopes: &[String],
    ) -> Result<String, String> {
        for scope in dynamic_scopes {
            if let Some(pointer) = self
                .resource_dynamic
                .get(scope)
                .and_then(|anchors| anchors.get(anchor))
            {
                return Ok(pointer.clone());
            }
        }
        self.anchors
            .get(anchor)
            .cloned()
            .ok_or_else(|| format!("unknown dynamic anchor '{anchor}'"))
    }
}

/// Follow a JSON Pointer (`""`, `/a/b/0`) into a value.
pub fn resolve_pointer<'v>(root: &'v Value, pointer: &str) -> Option<&'v Value> {
    if pointer.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for token in pointer.split('/').skip(1) {
        let token = unescape_pointer_token(token);
        current = match current {
            Value::Object(obj) => obj.get(token.as_ref())?,
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Escape a key for embedding in a JSON Pointer (`~` → `~0`, `/` → `~1`).
pub fn escape_pointer_token(token: &str) -> std::borrow::Cow<'_, str> {
    if token.contains(['~', '/']) {
        std::borrow::Cow::Owned(token.replace('~', "~0").replace('/', "~1"))
    } else {
        std::borrow::Cow::Borrowed(token)
    }
}

fn unescape_pointer_token(token: &str) -> std::borrow::Cow<'_, str> {
    if token.contains('~') {
        std::borrow::Cow::Owned(token.replace("~1", "/").replace("~0", "~"))
    } else {
        std::borrow::Cow::Borrowed(token)
    }
}

/// Minimal percent-decoding for pointer fragments in URIs.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn pointer_resolution_decodes_escapes() {
        let doc = json!({"a/b": {"~x": [10, 20]}});
        assert_eq!(resolve_pointer(&doc, "/a~1b/~0x/1"), Some(&json!(20)));
        assert_eq!(resolve_pointer(&doc, ""), Some(&doc));
        assert_eq!(resolve_pointer(&doc, "/missing"), None);
    }

    #[test]
    fn anchors_and_ids_are_collected() {
        let schema = json!({
            "$id": "https://example.com/root",
            "$defs": {
                "named": {"$anchor": "here", "type": "string"},
                "embedded": {
                    "$id": "https://example.com/other",
                    "$dynamicAnchor": "node"
                }
            }
        });
        let registry = Registry::build(&schema);

        assert_eq!(registry.anchors["here"], "/$defs/named");
        assert_eq!(registry.ids["https://example.com/other"], "/$defs/embedded");
        assert_eq!(
            registry.resolve_ref("#here").unwrap(),
            "/$defs/named".to_string()
        );
        assert_eq!(
            registry.resolve_ref("https://example.com/other").unwrap(),
            "/$defs/embedded".to_string()
        );
    }

    #[test]
    fn external_references_are_refused() {
        let registry = Registry::build(&json!({"type": "object"}));
        let err = registry.resolve_ref("https://elsewhere.test/schema").unwrap_err();
        assert!(err.contains("refused"));
    }

    #[test]
    fn dynamic_resolution_prefers_outermost_scope() {
        let schema = json!({
            "$defs": {
                "outer": {"$id": "urn:outer", "$dynamicAnchor": "node"},
                "inner": {"$id": "urn:inner", "$dynamicAnchor": "node"}
            }
        });
        let registry = Registry::build(&schema);

        let resolved = registry
            .resolve_dynamic(
                "node",
                &["/$defs/outer".to_string(), "/$defs/inner".to_string()],
            )
            .unwrap();
        assert_eq!(resolved, "/$defs/outer");

        // Falls back to the static table with no matching scope.
        let resolved = registry.resolve_dynamic("node", &[]).unwrap();
        assert_eq!(resolved, "/$defs/outer");
    }
}
