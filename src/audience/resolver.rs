//! Audience resolver (spec §4.3): evaluates an experiment/rollout rule's
//! audience expression (or flat audience-id list) against user attributes,
//! expanding audience-id leaves into their referenced audience's conditions.

use serde_json::Value;
use std::collections::HashMap;

use super::condition_tree::{evaluate_leaf, ConditionExpr, Tri};
use crate::user::UserContext;

/// A parsed audience entity (spec §3): a name plus its own condition tree.
#[derive(Debug, Clone)]
pub struct ParsedAudience {
    pub id: String,
    pub name: String,
    pub conditions: ConditionExpr,
}

/// Resolves `true`/`false` for a rule's audience restriction. `unknown`
/// collapses to `false` at this boundary: a user who can't be evaluated does
/// not enter the experiment (spec §4.3).
///
/// If both `audience_conditions` and `audience_ids` are available, prefer
/// `audience_conditions`; a flat id list is implicitly OR'd.
pub fn resolve_audience(
    audience_conditions: Option<&ConditionExpr>,
    audience_ids: &[String],
    audiences: &HashMap<String, ParsedAudience>,
    attributes: &HashMap<String, Value>,
    user: &UserContext,
) -> bool {
    let tri = match audience_conditions {
        Some(expr) => eval_expr(expr, audiences, attributes, user),
        None if !audience_ids.is_empty() => {
            let or_expr = ConditionExpr::Or(
                audience_ids
                    .iter()
                    .map(|id| ConditionExpr::AudienceId(id.clone()))
                    .collect(),
            );
            eval_expr(&or_expr, audiences, attributes, user)
        }
        None => Tri::True,
    };
    tri.is_true()
}

fn eval_expr(
    expr: &ConditionExpr,
    audiences: &HashMap<String, ParsedAudience>,
    attributes: &HashMap<String, Value>,
    user: &UserContext,
) -> Tri {
    match expr {
        ConditionExpr::And(children) => {
            let mut saw_unknown = false;
            for child in children {
                match eval_expr(child, audiences, attributes, user) {
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
        ConditionExpr::Or(children) => {
            let mut saw_unknown = false;
            for child in children {
                match eval_expr(child, audiences, attributes, user) {
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
        ConditionExpr::Not(child) => match child {
            None => Tri::Unknown,
            Some(c) => match eval_expr(c, audiences, attributes, user) {
                Tri::True => Tri::False,
                Tri::False => Tri::True,
                Tri::Unknown => Tri::Unknown,
            },
        },
        ConditionExpr::Leaf(leaf) => evaluate_leaf(leaf, attributes, user),
        // Audiences do not reference audiences, so this recursion always
        // terminates after one expansion.
        ConditionExpr::AudienceId(id) => match audiences.get(id) {
            Some(audience) => eval_expr(&audience.conditions, audiences, attributes, user),
            None => Tri::Unknown,
        },
    }
}

#[cfg(test)]
mod resolver_tests;
