//! Three-valued AND/OR/NOT condition tree evaluator (spec §4.2).
//!
//! Mirrors `optimizely/helpers/condition_tree_evaluator.py`: `and`/`or`/`not`
//! over a recursive expression, with missing/incomparable leaves collapsing
//! to `Unknown` rather than `false` so the operators above them can still
//! short-circuit correctly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::user::UserContext;

/// Three-valued logic result of evaluating a condition or subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    True,
    False,
    Unknown,
}

impl Tri {
    pub fn from_bool(b: bool) -> Tri {
        if b {
            Tri::True
        } else {
            Tri::False
        }
    }

    pub fn is_true(self) -> bool {
        matches!(self, Tri::True)
    }
}

/// A parsed leaf matcher: `{type, name, match?, value}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    #[serde(rename = "type", default)]
    pub leaf_type: String,
    pub name: String,
    #[serde(rename = "match", default)]
    pub match_type: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// A parsed audience/rollout condition expression.
#[derive(Debug, Clone)]
pub enum ConditionExpr {
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    /// `Not` over zero children is unknown, per spec.
    Not(Option<Box<ConditionExpr>>),
    Leaf(Leaf),
    /// A leaf referencing another audience by id, expanded by the resolver.
    AudienceId(String),
}

/// Parses the recursive JSON grammar: a leaf object, or an array whose head
/// is `"and"|"or"|"not"`; an array without a recognized head is legacy `or`.
pub fn parse_condition(value: &Value) -> ConditionExpr {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return ConditionExpr::Or(vec![]);
            }
            let head = items[0].as_str();
            match head {
                Some("and") => ConditionExpr::And(items[1..].iter().map(parse_condition).collect()),
                Some("or") => ConditionExpr::Or(items[1..].iter().map(parse_condition).collect()),
                Some("not") => {
                    let child = items.get(1).map(|v| Box::new(parse_condition(v)));
                    ConditionExpr::Not(child)
                }
                _ => ConditionExpr::Or(items.iter().map(parse_condition).collect()),
            }
        }
        Value::String(s) => ConditionExpr::AudienceId(s.clone()),
        Value::Number(n) => ConditionExpr::AudienceId(n.to_string()),
        Value::Object(_) => {
            let leaf: Leaf = serde_json::from_value(value.clone()).unwrap_or(Leaf {
                leaf_type: String::new(),
                name: String::new(),
                match_type: None,
                value: Value::Null,
            });
            ConditionExpr::Leaf(leaf)
        }
        Value::Null => ConditionExpr::Or(vec![]),
        Value::Bool(_) => ConditionExpr::Or(vec![]),
    }
}

/// Evaluates an already-parsed expression against the leaf evaluator
/// closure. A missing expression (`None`) is the empty expression, which is
/// `true` (no restriction).
pub fn evaluate(expr: Option<&ConditionExpr>, leaf_eval: &mut dyn FnMut(&Leaf) -> Tri) -> Tri {
    match expr {
        None => Tri::True,
        Some(e) => evaluate_expr(e, leaf_eval),
    }
}

fn evaluate_expr(expr: &ConditionExpr, leaf_eval: &mut dyn FnMut(&Leaf) -> Tri) -> Tri {
    match expr {
        ConditionExpr::And(children) => and_evaluator(children, leaf_eval),
        ConditionExpr::Or(children) => or_evaluator(children, leaf_eval),
        ConditionExpr::Not(child) => not_evaluator(child.as_deref(), leaf_eval),
        ConditionExpr::Leaf(leaf) => leaf_eval(leaf),
        // An unresolved audience-id leaf (resolver didn't substitute it) is
        // unknown rather than a hard failure.
        ConditionExpr::AudienceId(_) => Tri::Unknown,
    }
}

fn and_evaluator(children: &[ConditionExpr], leaf_eval: &mut dyn FnMut(&Leaf) -> Tri) -> Tri {
    let mut saw_unknown = false;
    for child in children {
        match evaluate_expr(child, leaf_eval) {
            Tri::False => return Tri::False,
            Tri::Unknown => saw_unknown = true,
            Tri::True => {}
        }
    }
    if saw_unknown {
        Tri::Unknown
    } else {
        Tri::True
    }
}

fn or_evaluator(children: &[ConditionExpr], leaf_eval: &mut dyn FnMut(&Leaf) -> Tri) -> Tri {
    let mut saw_unknown = false;
    for child in children {
        match evaluate_expr(child, leaf_eval) {
            Tri::True => return Tri::True,
            Tri::Unknown => saw_unknown = true,
            Tri::False => {}
        }
    }
    if saw_unknown {
        Tri::Unknown
    } else {
        Tri::False
    }
}

fn not_evaluator(child: Option<&ConditionExpr>, leaf_eval: &mut dyn FnMut(&Leaf) -> Tri) -> Tri {
    match child {
        None => Tri::Unknown,
        Some(c) => match evaluate_expr(c, leaf_eval) {
            Tri::True => Tri::False,
            Tri::False => Tri::True,
            Tri::Unknown => Tri::Unknown,
        },
    }
}

/// Matchers supported on `custom_attribute` leaves (spec §4.2).
const MATCH_EXACT: &str = "exact";
const MATCH_SUBSTRING: &str = "substring";
const MATCH_EXISTS: &str = "exists";
const MATCH_GT: &str = "gt";
const MATCH_GE: &str = "ge";
const MATCH_LT: &str = "lt";
const MATCH_LE: &str = "le";
const MATCH_SEMVER_EQ: &str = "semver_eq";
const MATCH_SEMVER_GT: &str = "semver_gt";
const MATCH_SEMVER_GE: &str = "semver_ge";
const MATCH_SEMVER_LT: &str = "semver_lt";
const MATCH_SEMVER_LE: &str = "semver_le";
const MATCH_QUALIFIED: &str = "qualified";

const LEAF_TYPE_CUSTOM_ATTRIBUTE: &str = "custom_attribute";
const LEAF_TYPE_THIRD_PARTY_DIMENSION: &str = "third_party_dimension";
const THIRD_PARTY_ODP_AUDIENCES: &str = "odp.audiences";

/// Evaluates a single leaf condition against `attributes`/`user`.
pub fn evaluate_leaf(
    leaf: &Leaf,
    attributes: &HashMap<String, Value>,
    user: &UserContext,
) -> Tri {
    match leaf.leaf_type.as_str() {
        LEAF_TYPE_CUSTOM_ATTRIBUTE => evaluate_custom_attribute(leaf, attributes, user),
        LEAF_TYPE_THIRD_PARTY_DIMENSION if leaf.name == THIRD_PARTY_ODP_AUDIENCES => {
            evaluate_qualified(leaf, user)
        }
        _ => Tri::Unknown,
    }
}

fn evaluate_custom_attribute(
    leaf: &Leaf,
    attributes: &HashMap<String, Value>,
    user: &UserContext,
) -> Tri {
    let match_type = leaf.match_type.as_deref().unwrap_or(MATCH_EXACT);

    if match_type == MATCH_QUALIFIED {
        return evaluate_qualified(leaf, user);
    }

    if match_type == MATCH_EXISTS {
        return Tri::from_bool(
            attributes
                .get(&leaf.name)
                .map(|v| !v.is_null())
                .unwrap_or(false),
        );
    }

    let attr_value = match attributes.get(&leaf.name) {
        Some(v) if !v.is_null() => v,
        _ => return Tri::Unknown,
    };

    match match_type {
        MATCH_EXACT => exact_match(attr_value, &leaf.value),
        MATCH_SUBSTRING => substring_match(attr_value, &leaf.value),
        MATCH_GT => numeric_compare(attr_value, &leaf.value, |a, b| a > b),
        MATCH_GE => numeric_compare(attr_value, &leaf.value, |a, b| a >= b),
        MATCH_LT => numeric_compare(attr_value, &leaf.value, |a, b| a < b),
        MATCH_LE => numeric_compare(attr_value, &leaf.value, |a, b| a <= b),
        MATCH_SEMVER_EQ => semver_compare(attr_value, &leaf.value, std::cmp::Ordering::is_eq),
        MATCH_SEMVER_GT => semver_compare(attr_value, &leaf.value, std::cmp::Ordering::is_gt),
        MATCH_SEMVER_GE => semver_compare(attr_value, &leaf.value, std::cmp::Ordering::is_ge),
        MATCH_SEMVER_LT => semver_compare(attr_value, &leaf.value, std::cmp::Ordering::is_lt),
        MATCH_SEMVER_LE => semver_compare(attr_value, &leaf.value, std::cmp::Ordering::is_le),
        _ => Tri::Unknown,
    }
}

fn evaluate_qualified(leaf: &Leaf, user: &UserContext) -> Tri {
    let segment = match leaf.value.as_str() {
        Some(s) => s,
        None => return Tri::Unknown,
    };
    match &user.qualified_segments {
        Some(segments) => Tri::from_bool(segments.iter().any(|s| s == segment)),
        None => Tri::False,
    }
}

fn exact_match(attr: &Value, expected: &Value) -> Tri {
    match (attr, expected) {
        (Value::String(a), Value::String(b)) => Tri::from_bool(a == b),
        (Value::Bool(a), Value::Bool(b)) => Tri::from_bool(a == b),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Tri::from_bool(a == b),
            _ => Tri::Unknown,
        },
        _ => Tri::Unknown,
    }
}

fn substring_match(attr: &Value, expected: &Value) -> Tri {
    match (attr.as_str(), expected.as_str()) {
        (Some(a), Some(b)) => Tri::from_bool(a.contains(b)),
        _ => Tri::Unknown,
    }
}

fn as_finite_numeric(v: &Value) -> Option<f64> {
    if v.is_boolean() {
        return None;
    }
    v.as_f64().filter(|f| f.is_finite())
}

fn numeric_compare(attr: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> Tri {
    match (as_finite_numeric(attr), as_finite_numeric(expected)) {
        (Some(a), Some(b)) => Tri::from_bool(op(a, b)),
        _ => Tri::Unknown,
    }
}

fn semver_compare(
    attr: &Value,
    expected: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Tri {
    let (attr_str, expected_str) = match (attr.as_str(), expected.as_str()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Tri::Unknown,
    };
    match (parse_semver_loose(attr_str), parse_semver_loose(expected_str)) {
        (Some(a), Some(b)) => Tri::from_bool(accept(a.cmp(&b))),
        _ => Tri::Unknown,
    }
}

/// Parses a version string for semver precedence comparison. Tolerates a
/// bare `major.minor` or `major` the way datafile version targets often
/// appear, by zero-filling missing components.
fn parse_semver_loose(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim();
    if let Ok(v) = semver::Version::parse(trimmed) {
        return Some(v);
    }
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut filled = parts.clone();
    while filled.len() < 3 {
        filled.push("0");
    }
    let candidate = filled.join(".");
    semver::Version::parse(&candidate).ok()
}

#[cfg(test)]
mod condition_tree_tests;
