//! Configuration templates.
//!
//! Step configuration may reference the run configuration with `${path}`
//! (or `${config.path}`), where `path` is a dotted key path.
//!
//! # Syntax
//!
//! - `"${config.extraction.limit}"` - the whole string is replaced by the
//!   referenced value, keeping its JSON type
//! - `"model-${config.model}"` - embedded references are replaced by the
//!   value's text
//! - `$${escaped}` - produces a literal `${escaped}`
//!
//! References that cannot be resolved are left as written.

use serde_json::{Map, Value};

/// A segment of a template string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    /// `${path}`, holding `path` as written.
    Reference(String),
}

/// Split a string into literal text and `${...}` references.
pub fn parse_template(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(escaped) = tail.strip_prefix("$${") {
            match escaped.find('}') {
                Some(end) => {
                    literal.push_str("${");
                    literal.push_str(&escaped[..=end]);
                    rest = &escaped[end + 1..];
                }
                None => {
                    literal.push_str(tail);
                    rest = "";
                }
            }
        } else if let Some(body) = tail.strip_prefix("${") {
            match body.find('}') {
                Some(end) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Reference(body[..end].trim().to_string()));
                    rest = &body[end + 1..];
                }
                None => {
                    literal.push_str(tail);
                    rest = "";
                }
            }
        } else {
            literal.push('$');
            rest = &tail[1..];
        }
    }
    literal.push_str(rest);

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Look up a dotted path in the run configuration.
///
/// A leading `config.` is stripped. Returns `None` for a missing key or when
/// the path runs into a non-map value.
pub fn lookup<'a>(path: &str, config: &'a Value) -> Option<&'a Value> {
    let path = path.strip_prefix("config.").unwrap_or(path);
    path.split('.')
        .try_fold(config, |current, key| current.as_object()?.get(key))
}

/// Resolve every template string inside `template` against `config`.
pub fn resolve_template(template: &Value, config: &Value) -> Value {
    match template {
        Value::String(s) => resolve_string(s, config),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_template(v, config)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_template(v, config)))
                .collect::<Map<_, _>>(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(input: &str, config: &Value) -> Value {
    let segments = parse_template(input);

    if let [Segment::Reference(path)] = segments.as_slice() {
        return lookup(path, config)
            .cloned()
            .unwrap_or_else(|| Value::String(input.to_string()));
    }

    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Reference(path) => match lookup(&path, config) {
                Some(value) => out.push_str(&scalar_text(value)),
                None => {
                    out.push_str("${");
                    out.push_str(&path);
                    out.push('}');
                }
            },
        }
    }
    Value::String(out)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// References used anywhere inside a template, in first-seen order.
pub fn references(template: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_references(template, &mut found);
    found
}

fn collect_references(template: &Value, found: &mut Vec<String>) {
    match template {
        Value::String(s) => {
            for segment in parse_template(s) {
                if let Segment::Reference(path) = segment {
                    if !found.contains(&path) {
                        found.push(path);
                    }
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
        _ => {}
    }
}
