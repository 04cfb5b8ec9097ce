//! Deterministic mutation enumeration: candidate fields x value candidates,
//! bounded by `maxMutations`, in a fixed order the findings pipeline and the
//! tests rely on.

use crate::api::ScanConfig;
use crate::body::{get_primitive_deep, safe_stringify, set_deep};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Field names commonly writable through mass assignment, probed first.
pub const BUILTIN_CANDIDATE_FIELDS: [&str; 10] = [
    "isAdmin",
    "admin",
    "is_staff",
    "isStaff",
    "isSuperuser",
    "role",
    "roles",
    "permissions",
    "tier",
    "plan",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ValueCandidate {
    Fixed(Value),
    /// Resolved against the existing value at the field; skipped when the
    /// existing value is not numeric.
    NumericDelta(i64),
}

#[derive(Debug, Clone)]
pub struct Mutation {
    pub field: String,
    pub value: Value,
    /// Canonical serialization of the baseline object with `field` set.
    pub body_text: String,
}

fn numeric_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("static regex is valid"))
}

/// Built-ins (when enabled) then configured fields, trimmed, de-duplicated
/// preserving first occurrence.
pub fn candidate_fields(config: &ScanConfig) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    let mut push = |name: &str| {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|f| f == name) {
            out.push(name.to_string());
        }
    };
    if config.include_built_in_candidates {
        for field in BUILTIN_CANDIDATE_FIELDS {
            push(field);
        }
    }
    for field in &config.candidate_fields {
        push(field);
    }
    out
}

/// Mode-driven candidates first, then parsed custom values; falls back to
/// `[true]` when nothing is enabled.
pub fn value_candidates(config: &ScanConfig) -> Vec<ValueCandidate> {
    let modes = &config.value_modes;
    let mut out: Vec<ValueCandidate> = vec![];
    if modes.boolean_true {
        out.push(ValueCandidate::Fixed(Value::Bool(true)));
    }
    if modes.string_admin {
        out.push(ValueCandidate::Fixed(Value::String("admin".to_string())));
    }
    if modes.number_one {
        out.push(ValueCandidate::Fixed(Value::from(1)));
    }
    if modes.number_plus_one {
        out.push(ValueCandidate::NumericDelta(1));
    }
    if modes.number_minus_one {
        out.push(ValueCandidate::NumericDelta(-1));
    }
    for raw in &config.custom_values {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(ValueCandidate::Fixed(parse_custom_value(trimmed)));
    }
    if out.is_empty() {
        out.push(ValueCandidate::Fixed(Value::Bool(true)));
    }
    out
}

/// Custom-value coercion: `true`/`false`/`null` literals, finite numeric
/// literals, bracket-wrapped JSON, and everything else as a literal string.
fn parse_custom_value(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if numeric_literal_re().is_match(text) {
        if !text.contains('.')
            && let Ok(i) = text.parse::<i64>()
        {
            return Value::from(i);
        }
        if let Ok(f) = text.parse::<f64>()
            && f.is_finite()
            && let Some(n) = serde_json::Number::from_f64(f)
        {
            return Value::Number(n);
        }
    }
    let json_wrapped = (text.starts_with('{') && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'));
    if json_wrapped
        && let Ok(v) = serde_json::from_str::<Value>(text)
    {
        return v;
    }
    Value::String(text.to_string())
}

fn resolve_delta(existing: Option<&Value>, delta: i64) -> Option<Value> {
    match existing? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return i.checked_add(delta).map(Value::from);
            }
            let next = n.as_f64()? + delta as f64;
            if !next.is_finite() {
                return None;
            }
            serde_json::Number::from_f64(next).map(Value::Number)
        }
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
            .parse::<i64>()
            .ok()?
            .checked_add(delta)
            .map(|n| Value::String(n.to_string())),
        _ => None,
    }
}

/// Enumerate mutations: fields outer, values inner, stopping at
/// `maxMutations`. Call only with a validated config.
pub fn build_mutations(baseline: &Map<String, Value>, config: &ScanConfig) -> Vec<Mutation> {
    let fields = candidate_fields(config);
    let values = value_candidates(config);
    let max = config.max_mutations.max(0) as usize;
    let baseline_value = Value::Object(baseline.clone());

    let mut out: Vec<Mutation> = vec![];
    'fields: for field in &fields {
        if !config.mutate_existing_fields && baseline.contains_key(field) {
            continue;
        }
        for candidate in &values {
            if out.len() >= max {
                break 'fields;
            }
            let existing = get_primitive_deep(&baseline_value, field);
            let value = match candidate {
                ValueCandidate::Fixed(v) => v.clone(),
                ValueCandidate::NumericDelta(delta) => match resolve_delta(existing, *delta) {
                    Some(v) => v,
                    None => continue,
                },
            };
            if config.mutate_existing_fields
                && let Some(existing) = existing
                && safe_stringify(existing) == safe_stringify(&value)
            {
                continue;
            }
            let mutated = set_deep(baseline, field, value.clone());
            let body_text = serde_json::to_string(&Value::Object(mutated)).unwrap_or_default();
            out.push(Mutation {
                field: field.clone(),
                value,
                body_text,
            });
        }
    }
    out
}
