//! The recursive schema evaluator.
//!
//! One pass per schema node, in keyword-class order: references, type,
//! const/enum, type-specific keywords, composition, conditionals, dependent
//! schemas, and finally `unevaluated*` against the evaluated sets everything
//! before it accumulated. Child evaluations for speculative keywords
//! (`anyOf` branches, `not`, `if`, `contains` probes) roll their errors and
//! annotations back so only asserting branches surface diagnostics.

use std::collections::HashSet;

use serde_json::{Map, Value};

use mcplink_protocol::json;

use crate::content;
use crate::dialect::Dialect;
use crate::formats;
use crate::outcome::{Annotation, ValidationIssue, ValidationOutcome};
use crate::pattern::PatternCache;
use crate::resolver::{Registry, escape_pointer_token, resolve_pointer};
use crate::ValidatorOptions;

/// Recursion limit across `$ref` chains and instance depth.
const MAX_DEPTH: usize = 128;

/// Tolerance for `multipleOf` on floating-point quotients.
const MULTIPLE_OF_EPSILON: f64 = 1e-10;

/// What one schema node contributed for `unevaluated*`.
#[derive(Debug, Default)]
struct NodeResult {
    valid: bool,
    props: HashSet<String>,
    items: HashSet<usize>,
}

impl NodeResult {
    fn pass() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    fn fail() -> Self {
        Self::default()
    }

    fn absorb(&mut self, other: NodeResult) {
        self.props.extend(other.props);
        self.items.extend(other.items);
    }
}

/// Evaluation context flowing down the instance/schema walk.
#[derive(Debug, Clone)]
struct Ctx {
    instance_path: String,
    dynamic_scopes: Vec<String>,
    dialect: Dialect,
    depth: usize,
}

impl Ctx {
    fn for_instance_child(&self, token: &str) -> Self {
        let mut child = self.clone();
        child.instance_path = format!("{}/{}", self.instance_path, escape_pointer_token(token));
        child.depth += 1;
        child
    }

    fn for_index_child(&self, index: usize) -> Self {
        let mut child = self.clone();
        child.instance_path = format!("{}/{index}", self.instance_path);
        child.depth += 1;
        child
    }

    fn deeper(&self) -> Self {
        let mut child = self.clone();
        child.depth += 1;
        child
    }
}

struct Engine<'a> {
    root: &'a Value,
    registry: &'a Registry,
    options: &'a ValidatorOptions,
    patterns: &'a PatternCache,
    errors: Vec<ValidationIssue>,
    annotations: Vec<Annotation>,
}

/// Entry point used by [`crate::Validator`].
pub(crate) fn run_root(
    instance: &Value,
    schema: &Value,
    registry: &Registry,
    options: &ValidatorOptions,
    patterns: &PatternCache,
) -> ValidationOutcome {
    let mut engine = Engine {
        root: schema,
        registry,
        options,
        patterns,
        errors: Vec::new(),
        annotations: Vec::new(),
    };
    let ctx = Ctx {
        instance_path: String::new(),
        dynamic_scopes: vec![String::new()],
        dialect: Dialect::detect(schema, options.default_dialect),
        depth: 0,
    };

    let result = engine.eval(instance, schema, "", &ctx);

    ValidationOutcome {
        is_valid: result.valid,
        errors: engine.errors,
        annotations: engine.annotations,
    }
}

impl Engine<'_> {
    fn issue(&mut self, ctx: &Ctx, keyword: &str, code: &str, message: String) {
        self.errors.push(ValidationIssue {
            code: code.to_string(),
            message,
            instance_path: ctx.instance_path.clone(),
            keyword: keyword.to_string(),
        });
    }

    fn annotate(&mut self, ctx: &Ctx, keyword: &str, value: Value) {
        self.annotations.push(Annotation {
            instance_path: ctx.instance_path.clone(),
            keyword: keyword.to_string(),
            value,
        });
    }

    /// Evaluate speculatively: diagnostics are rolled back unless `keep`.
    fn eval_probe(
        &mut self,
        instance: &Value,
        schema: &Value,
        schema_ptr: &str,
        ctx: &Ctx,
    ) -> NodeResult {
        let error_mark = self.errors.len();
        let annotation_mark = self.annotations.len();
        let result = self.eval(instance, schema, schema_ptr, ctx);
        self.errors.truncate(error_mark);
        self.annotations.truncate(annotation_mark);
        result
    }

    fn eval(
        &mut self,
        instance: &Value,
        schema: &Value,
        schema_ptr: &str,
        ctx: &Ctx,
    ) -> NodeResult {
        if ctx.depth > MAX_DEPTH {
            self.issue(
                ctx,
                "$ref",
                "schema-recursion-limit",
                "schema nesting or reference chain exceeds the recursion limit".to_string(),
            );
            return NodeResult::fail();
        }

        match schema {
            Value::Bool(true) => NodeResult::pass(),
            Value::Bool(false) => {
                self.issue(
                    ctx,
                    "schema",
                    "schema-validation-disabled",
                    "schema 'false' permits nothing".to_string(),
                );
                NodeResult::fail()
            }
            Value::Object(obj) => self.eval_object_schema(instance, obj, schema_ptr, ctx),
            _ => {
                self.issue(
                    ctx,
                    "schema",
                    "schema-invalid",
                    "schema must be an object or boolean".to_string(),
                );
                NodeResult::fail()
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn eval_object_schema(
        &mut self,
        instance: &Value,
        schema: &Map<String, Value>,
        schema_ptr: &str,
        ctx: &Ctx,
    ) -> NodeResult {
        // A `$schema` on an embedded resource switches the dialect for its
        // subtree; `$id` opens a dynamic scope.
        let mut ctx = ctx.clone();
        if schema.contains_key("$schema") {
            ctx.dialect = Dialect::detect(&Value::Object(schema.clone()), ctx.dialect);
        }
        if schema.contains_key("$id") && ctx.dynamic_scopes.last().map(String::as_str) != Some(schema_ptr)
        {
            ctx.dynamic_scopes.push(schema_ptr.to_string());
        }
        let ctx = &ctx;

        let mut result = NodeResult::pass();

        // --- references -------------------------------------------------
        if let Some(Value::String(reference)) = schema.get("$ref") {
            let followed = self.follow_ref(instance, reference, false, ctx);
            if ctx.dialect.ref_replaces_siblings() {
                return followed;
            }
            result.valid &= followed.valid;
            result.absorb(followed);
        }
        if let Some(Value::String(reference)) = schema.get("$dynamicRef") {
            let followed = self.follow_ref(instance, reference, true, ctx);
            result.valid &= followed.valid;
            result.absorb(followed);
        }

        // --- type -------------------------------------------------------
        if let Some(type_spec) = schema.get("type") {
            let names: Vec<&str> = match type_spec {
                Value::String(name) => vec![name.as_str()],
                Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            if !names.is_empty() && !names.iter().any(|n| type_matches(instance, n)) {
                self.issue(
                    ctx,
                    "type",
                    "type-mismatch",
                    format!(
                        "expected {}, got {}",
                        names.join(" or "),
                        type_name(instance)
                    ),
                );
                result.valid = false;
            }
        }

        // --- const / enum ----------------------------------------------
        if let Some(expected) = schema.get("const") {
            if !json::eq(instance, expected) {
                self.issue(
                    ctx,
                    "const",
                    "const-mismatch",
                    format!("value must equal {expected}"),
                );
                result.valid = false;
            }
        }
        if let Some(Value::Array(variants)) = schema.get("enum") {
            if !variants.iter().any(|variant| json::eq(instance, variant)) {
                self.issue(
                    ctx,
                    "enum",
                    "enum-mismatch",
                    "value is not one of the enumerated values".to_string(),
                );
                result.valid = false;
            }
        }

        // --- type-specific ----------------------------------------------
        match instance {
            Value::Number(_) => {
                if !self.check_number(instance, schema, ctx) {
                    result.valid = false;
                }
            }
            Value::String(text) => {
                if !self.check_string(text, schema, ctx) {
                    result.valid = false;
                }
            }
            Value::Array(items) => {
                let array_result = self.check_array(items, schema, schema_ptr, ctx);
                result.valid &= array_result.valid;
                result.absorb(array_result);
            }
            Value::Object(object) => {
                let object_result = self.check_object(object, schema, schema_ptr, ctx);
                result.valid &= object_result.valid;
                result.absorb(object_result);
            }
            _ => {}
        }

        // --- composition ------------------------------------------------
        if let Some(Value::Array(schemas)) = schema.get("allOf") {
            for (index, subschema) in schemas.iter().enumerate() {
                let sub = self.eval(
                    instance,
                    subschema,
                    &format!("{schema_ptr}/allOf/{index}"),
                    &ctx.deeper(),
                );
                result.valid &= sub.valid;
                result.absorb(sub);
            }
        }
        if let Some(Value::Array(schemas)) = schema.get("anyOf") {
            let mut any_passed = false;
            for (index, subschema) in schemas.iter().enumerate() {
                let sub = self.eval_probe(
                    instance,
                    subschema,
                    &format!("{schema_ptr}/anyOf/{index}"),
                    &ctx.deeper(),
                );
                if sub.valid {
                    any_passed = true;
                    result.absorb(sub);
                }
            }
            if !any_passed {
                self.issue(
                    ctx,
                    "anyOf",
                    "any-of-unmatched",
                    "value matches none of the anyOf schemas".to_string(),
                );
                result.valid = false;
            }
        }
        if let Some(Value::Array(schemas)) = schema.get("oneOf") {
            let mut passing = Vec::new();
            for (index, subschema) in schemas.iter().enumerate() {
                let sub = self.eval_probe(
                    instance,
                    subschema,
                    &format!("{schema_ptr}/oneOf/{index}"),
                    &ctx.deeper(),
                );
                if sub.valid {
                    passing.push(sub);
                }
            }
            if passing.len() == 1 {
                result.absorb(passing.pop().expect("length checked"));
            } else {
                self.issue(
                    ctx,
                    "oneOf",
                    "one-of-mismatch",
                    format!("value matches {} oneOf schemas, expected exactly 1", passing.len()),
                );
                result.valid = false;
            }
        }
        if let Some(subschema) = schema.get("not") {
            let sub = self.eval_probe(instance, subschema, &format!("{schema_ptr}/not"), &ctx.deeper());
            if sub.valid {
                self.issue(
                    ctx,
                    "not",
                    "not-matched",
                    "value must not match the 'not' schema".to_string(),
                );
                result.valid = false;
            }
            // `not` never contributes evaluated sets.
        }

        // --- conditionals ----------------------------------------------
        if let Some(condition) = schema.get("if") {
            let if_result =
                self.eval_probe(instance, condition, &format!("{schema_ptr}/if"), &ctx.deeper());
            if if_result.valid {
                result.absorb(if_result);
                if let Some(then_schema) = schema.get("then") {
                    let sub = self.eval(
                        instance,
                        then_schema,
                        &format!("{schema_ptr}/then"),
                        &ctx.deeper(),
                    );
                    result.valid &= sub.valid;
                    result.absorb(sub);
                }
            } else if let Some(else_schema) = schema.get("else") {
                let sub = self.eval(
                    instance,
                    else_schema,
                    &format!("{schema_ptr}/else"),
                    &ctx.deeper(),
                );
                result.valid &= sub.valid;
                result.absorb(sub);
            }
        }

        // --- dependent schemas ------------------------------------------
        if let (Some(Value::Object(dependents)), Value::Object(object)) =
            (schema.get("dependentSchemas"), instance)
        {
            for (key, subschema) in dependents {
                if object.contains_key(key) {
                    let sub = self.eval(
                        instance,
                        subschema,
                        &format!("{schema_ptr}/dependentSchemas/{}", escape_pointer_token(key)),
                        &ctx.deeper(),
                    );
                    result.valid &= sub.valid;
                    result.absorb(sub);
                }
            }
        }

        // --- unevaluated* (must run after everything above) -------------
        if let (Some(subschema), Value::Object(object)) =
            (schema.get("unevaluatedProperties"), instance)
        {
            let residual: Vec<&String> = object
                .keys()
                .filter(|key| !result.props.contains(*key))
                .collect();
            match subschema {
                Value::Bool(false) => {
                    if !residual.is_empty() {
                        let mut names: Vec<String> =
                            residual.iter().map(|s| (*s).clone()).collect();
                        names.sort();
                        self.issue(
                            ctx,
                            "unevaluatedProperties",
                            "unevaluated-properties-found",
                            format!("unevaluated properties: [{}]", names.join(", ")),
                        );
                        result.valid = false;
                    }
                }
                _ => {
                    for key in residual {
                        let sub = self.eval(
                            &object[key],
                            subschema,
                            &format!("{schema_ptr}/unevaluatedProperties"),
                            &ctx.for_instance_child(key),
                        );
                        if sub.valid {
                            result.props.insert(key.clone());
                        } else {
                            result.valid = false;
                        }
                    }
                }
            }
        }
        if let (Some(subschema), Value::Array(items)) = (schema.get("unevaluatedItems"), instance) {
            let residual: Vec<usize> = (0..items.len())
                .filter(|index| !result.items.contains(index))
                .collect();
            match subschema {
                Value::Bool(false) => {
                    if !residual.is_empty() {
                        self.issue(
                            ctx,
                            "unevaluatedItems",
                            "unevaluated-items-found",
                            format!("unevaluated items at indices {residual:?}"),
                        );
                        result.valid = false;
                    }
                }
                _ => {
                    for index in residual {
                        let sub = self.eval(
                            &items[index],
                            subschema,
                            &format!("{schema_ptr}/unevaluatedItems"),
                            &ctx.for_index_child(index),
                        );
                        if sub.valid {
                            result.items.insert(index);
                        } else {
                            result.valid = false;
                        }
                    }
                }
            }
        }

        result
    }

    fn follow_ref(
        &mut self,
        instance: &Value,
        reference: &str,
        dynamic: bool,
        ctx: &Ctx,
    ) -> NodeResult {
        let resolved = if dynamic {
            match reference.strip_prefix('#') {
                // A dynamic fragment that is a plain anchor name resolves
                // through the dynamic scope; anything else degrades to $ref.
                Some(name) if !name.is_empty() && !name.starts_with('/') => {
                    self.registry.resolve_dynamic(name, &ctx.dynamic_scopes)
                }
                _ => self.registry.resolve_ref(reference),
            }
        } else {
            self.registry.resolve_ref(reference)
        };

        let keyword = if dynamic { "$dynamicRef" } else { "$ref" };
        let pointer = match resolved {
            Ok(pointer) => pointer,
            Err(reason) => {
                self.issue(ctx, keyword, "schema-ref-unresolved", reason);
                return NodeResult::fail();
            }
        };

        let Some(target) = resolve_pointer(self.root, &pointer) else {
            self.issue(
                ctx,
                keyword,
                "schema-ref-unresolved",
                format!("reference '{reference}' points at nothing"),
            );
            return NodeResult::fail();
        };

        self.eval(instance, target, &pointer, &ctx.deeper())
    }

    fn check_number(&mut self, instance: &Value, schema: &Map<String, Value>, ctx: &Ctx) -> bool {
        let Some(value) = instance.as_f64() else {
            return true;
        };
        let mut valid = true;

        let bounds = [
            ("minimum", "below-minimum", false),
            ("maximum", "above-maximum", true),
            ("exclusiveMinimum", "below-exclusive-minimum", false),
            ("exclusiveMaximum", "above-exclusive-maximum", true),
        ];
        for (keyword, code, is_upper) in bounds {
            let Some(bound) = schema.get(keyword).and_then(Value::as_f64) else {
                continue;
            };
            let exclusive = keyword.starts_with("exclusive");
            let ok = match (is_upper, exclusive) {
                (false, false) => value >= bound,
                (false, true) => value > bound,
                (true, false) => value <= bound,
                (true, true) => value < bound,
            };
            if !ok {
                self.issue(ctx, keyword, code, format!("{value} violates {keyword} {bound}"));
                valid = false;
            }
        }

        if let Some(divisor) = schema.get("multipleOf").and_then(Value::as_f64) {
            if divisor > 0.0 {
                let quotient = value / divisor;
                if (quotient - quotient.round()).abs() > MULTIPLE_OF_EPSILON {
                    self.issue(
                        ctx,
                        "multipleOf",
                        "not-multiple-of",
                        format!("{value} is not a multiple of {divisor}"),
                    );
                    valid = false;
                }
            }
        }

        valid
    }

    fn check_string(&mut self, text: &str, schema: &Map<String, Value>, ctx: &Ctx) -> bool {
        let mut valid = true;
        // Length is in Unicode scalar values, not bytes.
        let length = text.chars().count();

        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if (length as u64) < min {
                self.issue(
                    ctx,
                    "minLength",
                    "string-too-short",
                    format!("length {length} is below minLength {min}"),
                );
                valid = false;
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if (length as u64) > max {
                self.issue(
                    ctx,
                    "maxLength",
                    "string-too-long",
                    format!("length {length} is above maxLength {max}"),
                );
                valid = false;
            }
        }

        if let Some(Value::String(pattern)) = schema.get("pattern") {
            match self.patterns.compile(pattern) {
                Ok(regex) => {
                    if !regex.is_match(text) {
                        self.issue(
                            ctx,
                            "pattern",
                            "pattern-mismatch",
                            format!("value does not match pattern '{pattern}'"),
                        );
                        valid = false;
                    }
                }
                Err(reason) => {
                    self.issue(ctx, "pattern", "schema-pattern-rejected", reason);
                    valid = false;
                }
            }
        }

        if let Some(Value::String(format)) = schema.get("format") {
            self.annotate(ctx, "format", Value::String(format.clone()));
            if self.options.assert_formats {
                if let Some(false) = formats::check(format, text, self.patterns) {
                    self.issue(
                        ctx,
                        "format",
                        "format-mismatch",
                        format!("value is not a valid {format}"),
                    );
                    valid = false;
                }
            }
        }

        valid &= self.check_content(text, schema, ctx);
        valid
    }

    fn check_content(&mut self, text: &str, schema: &Map<String, Value>, ctx: &Ctx) -> bool {
        let encoding = schema.get("contentEncoding").and_then(Value::as_str);
        let media_type = schema.get("contentMediaType").and_then(Value::as_str);
        if encoding.is_none() && media_type.is_none() {
            return true;
        }

        if let Some(encoding) = encoding {
            self.annotate(ctx, "contentEncoding", Value::String(encoding.to_string()));
        }
        if let Some(media_type) = media_type {
            self.annotate(ctx, "contentMediaType", Value::String(media_type.to_string()));
        }
        if !self.options.assert_content {
            return true;
        }

        let decoded = match encoding {
            None => Ok(text.as_bytes().to_vec()),
            Some(encoding) => match content::decode(encoding, text) {
                None => return true, // unknown encodings assert nothing
                Some(decoded) => decoded,
            },
        };
        let bytes = match decoded {
            Ok(bytes) => bytes,
            Err(reason) => {
                self.issue(ctx, "contentEncoding", "content-encoding-invalid", reason);
                return false;
            }
        };

        let mut valid = true;
        if let Some(media_type) = media_type {
            if let Some(Err(reason)) = content::check_media_type(media_type, &bytes) {
                self.issue(ctx, "contentMediaType", "content-media-type-invalid", reason);
                valid = false;
            }

            if let Some(content_schema) = schema.get("contentSchema") {
                if media_type == "application/json" {
                    if let Some(decoded_value) = content::parse_json(&bytes) {
                        let sub =
                            self.eval(&decoded_value, content_schema, "", &ctx.deeper());
                        if !sub.valid {
                            self.issue(
                                ctx,
                                "contentSchema",
                                "content-schema-mismatch",
                                "decoded content does not match contentSchema".to_string(),
                            );
                            valid = false;
                        }
                    }
                }
            }
        }
        valid
    }

    fn check_array(
        &mut self,
        items: &[Value],
        schema: &Map<String, Value>,
        schema_ptr: &str,
        ctx: &Ctx,
    ) -> NodeResult {
        let mut result = NodeResult::pass();

        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                self.issue(
                    ctx,
                    "minItems",
                    "too-few-items",
                    format!("{} items is below minItems {min}", items.len()),
                );
                result.valid = false;
            }
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
            if (items.len() as u64) > max {
                self.issue(
                    ctx,
                    "maxItems",
                    "too-many-items",
                    format!("{} items is above maxItems {max}", items.len()),
                );
                result.valid = false;
            }
        }

        if schema.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
            let mut seen = HashSet::new();
            for (index, item) in items.iter().enumerate() {
                if !seen.insert(json::canonical(item)) {
                    self.issue(
                        ctx,
                        "uniqueItems",
                        "duplicate-items",
                        format!("item {index} duplicates an earlier item"),
                    );
                    result.valid = false;
                    break;
                }
            }
        }

        // Positional items: 2020-12 prefixItems, older drafts' array items.
        let (positional, rest_schema, rest_keyword): (Option<&Vec<Value>>, Option<&Value>, &str) =
            if ctx.dialect.uses_prefix_items() {
                (
                    schema.get("prefixItems").and_then(Value::as_array),
                    schema.get("items"),
                    "items",
                )
            } else {
                match schema.get("items") {
                    Some(Value::Array(positional)) => {
                        (Some(positional), schema.get("additionalItems"), "additionalItems")
                    }
                    other => (None, other, "items"),
                }
            };

        let positional_keyword = if ctx.dialect.uses_prefix_items() {
            "prefixItems"
        } else {
            "items"
        };
        let positional_len = positional.map_or(0, Vec::len);
        if let Some(positional) = positional {
            for (index, subschema) in positional.iter().enumerate().take(items.len()) {
                let sub = self.eval(
                    &items[index],
                    subschema,
                    &format!("{schema_ptr}/{positional_keyword}/{index}"),
                    &ctx.for_index_child(index),
                );
                result.valid &= sub.valid;
                result.items.insert(index);
            }
        }
        if let Some(rest_schema) = rest_schema {
            for index in positional_len..items.len() {
                let sub = self.eval(
                    &items[index],
                    rest_schema,
                    &format!("{schema_ptr}/{rest_keyword}"),
                    &ctx.for_index_child(index),
                );
                result.valid &= sub.valid;
                result.items.insert(index);
            }
        }

        if let Some(contains_schema) = schema.get("contains") {
            let mut matches = 0u64;
            for (index, item) in items.iter().enumerate() {
                let sub = self.eval_probe(
                    item,
                    contains_schema,
                    &format!("{schema_ptr}/contains"),
                    &ctx.for_index_child(index),
                );
                if sub.valid {
                    matches += 1;
                    result.items.insert(index);
                }
            }
            let min = schema
                .get("minContains")
                .and_then(Value::as_u64)
                .unwrap_or(1);
            let max = schema.get("maxContains").and_then(Value::as_u64);
            if matches < min {
                self.issue(
                    ctx,
                    "contains",
                    "contains-too-few",
                    format!("{matches} items match 'contains', expected at least {min}"),
                );
                result.valid = false;
            }
            if let Some(max) = max {
                if matches > max {
                    self.issue(
                        ctx,
                        "maxContains",
                        "contains-too-many",
                        format!("{matches} items match 'contains', expected at most {max}"),
                    );
                    result.valid = false;
                }
            }
        }

        result
    }

    fn check_object(
        &mut self,
        object: &Map<String, Value>,
        schema: &Map<String, Value>,
        schema_ptr: &str,
        ctx: &Ctx,
    ) -> NodeResult {
        let mut result = NodeResult::pass();

        if let Some(min) = schema.get("minProperties").and_then(Value::as_u64) {
            if (object.len() as u64) < min {
                self.issue(
                    ctx,
                    "minProperties",
                    "too-few-properties",
                    format!("{} properties is below minProperties {min}", object.len()),
                );
                result.valid = false;
            }
        }
        if let Some(max) = schema.get("maxProperties").and_then(Value::as_u64) {
            if (object.len() as u64) > max {
                self.issue(
                    ctx,
                    "maxProperties",
                    "too-many-properties",
                    format!("{} properties is above maxProperties {max}", object.len()),
                );
                result.valid = false;
            }
        }

        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    self.issue(
                        ctx,
                        "required",
                        "required-missing",
                        format!("missing required property '{name}'"),
                    );
                    result.valid = false;
                }
            }
        }

        if let Some(Value::Object(dependencies)) = schema.get("dependentRequired") {
            for (trigger, needed) in dependencies {
                if !object.contains_key(trigger) {
                    continue;
                }
                let Some(needed) = needed.as_array() else { continue };
                for name in needed.iter().filter_map(Value::as_str) {
                    if !object.contains_key(name) {
                        self.issue(
                            ctx,
                            "dependentRequired",
                            "dependent-required-missing",
                            format!("property '{trigger}' requires '{name}'"),
                        );
                        result.valid = false;
                    }
                }
            }
        }

        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (name, subschema) in properties {
                if let Some(value) = object.get(name) {
                    let sub = self.eval(
                        value,
                        subschema,
                        &format!("{schema_ptr}/properties/{}", escape_pointer_token(name)),
                        &ctx.for_instance_child(name),
                    );
                    result.valid &= sub.valid;
                    result.props.insert(name.clone());
                }
            }
        }

        if let Some(Value::Object(pattern_properties)) = schema.get("patternProperties") {
            for (pattern, subschema) in pattern_properties {
                let regex = match self.patterns.compile(pattern) {
                    Ok(regex) => regex,
                    Err(reason) => {
                        self.issue(ctx, "patternProperties", "schema-pattern-rejected", reason);
                        result.valid = false;
                        continue;
                    }
                };
                for (name, value) in object {
                    if regex.is_match(name) {
                        let sub = self.eval(
                            value,
                            subschema,
                            &format!(
                                "{schema_ptr}/patternProperties/{}",
                                escape_pointer_token(pattern)
                            ),
                            &ctx.for_instance_child(name),
                        );
                        result.valid &= sub.valid;
                        result.props.insert(name.clone());
                    }
                }
            }
        }

        if let Some(additional) = schema.get("additionalProperties") {
            let matched_so_far = result.props.clone();
            for (name, value) in object {
                if matched_so_far.contains(name) {
                    continue;
                }
                let sub = self.eval(
                    value,
                    additional,
                    &format!("{schema_ptr}/additionalProperties"),
                    &ctx.for_instance_child(name),
                );
                result.valid &= sub.valid;
                result.props.insert(name.clone());
            }
        }

        if let Some(name_schema) = schema.get("propertyNames") {
            for name in object.keys() {
                let name_value = Value::String(name.clone());
                let sub = self.eval(
                    &name_value,
                    name_schema,
                    &format!("{schema_ptr}/propertyNames"),
                    &ctx.for_instance_child(name),
                );
                if !sub.valid {
                    result.valid = false;
                }
            }
        }

        result
    }
}

fn type_matches(instance: &Value, name: &str) -> bool {
    match name {
        "null" => instance.is_null(),
        "boolean" => instance.is_boolean(),
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        // An integer instance is also a number.
        "number" => instance.is_number(),
        // A number with an integral value is an integer.
        "integer" => match instance {
            Value::Number(n) => {
                n.is_i64()
                    || n.is_u64()
                    || n.as_f64().is_some_and(|f| f.fract() == 0.0 && f.is_finite())
            }
            _ => false,
        },
        _ => false,
    }
}

fn type_name(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
