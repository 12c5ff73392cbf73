use super::*;
use crate::audience::condition_tree::{parse_condition, Leaf};
use serde_json::json;

fn attr_audience(id: &str, name: &str, match_type: &str, value: Value) -> ParsedAudience {
    ParsedAudience {
        id: id.to_string(),
        name: name.to_string(),
        conditions: ConditionExpr::Leaf(Leaf {
            leaf_type: "custom_attribute".into(),
            name: name.to_string(),
            match_type: Some(match_type.to_string()),
            value,
        }),
    }
}

#[test]
fn empty_expression_is_true() {
    let audiences = HashMap::new();
    let attrs = HashMap::new();
    let user = UserContext::new("u1");
    assert!(resolve_audience(None, &[], &audiences, &attrs, &user));
}

#[test]
fn flat_id_list_is_or() {
    let mut audiences = HashMap::new();
    audiences.insert("1".to_string(), attr_audience("1", "a1", "exact", json!("x")));
    audiences.insert("2".to_string(), attr_audience("2", "a2", "exact", json!("y")));

    let mut attrs = HashMap::new();
    attrs.insert("a2".to_string(), json!("y"));
    let user = UserContext::new("u1");

    assert!(resolve_audience(
        None,
        &["1".to_string(), "2".to_string()],
        &audiences,
        &attrs,
        &user
    ));
}

#[test]
fn unknown_collapses_to_false() {
    let mut audiences = HashMap::new();
    audiences.insert("1".to_string(), attr_audience("1", "a1", "exact", json!("x")));
    let attrs = HashMap::new(); // a1 missing -> Unknown
    let user = UserContext::new("u1");

    assert!(!resolve_audience(
        None,
        &["1".to_string()],
        &audiences,
        &attrs,
        &user
    ));
}

#[test]
fn prefers_conditions_over_flat_ids() {
    let mut audiences = HashMap::new();
    audiences.insert("1".to_string(), attr_audience("1", "a1", "exact", json!("x")));
    audiences.insert("2".to_string(), attr_audience("2", "a2", "exact", json!("y")));

    let mut attrs = HashMap::new();
    attrs.insert("a1".to_string(), json!("x"));
    let user = UserContext::new("u1");

    // audience_conditions says "2" only; audience_ids (legacy fallback) says "1".
    let conditions = parse_condition(&json!(["and", "2"]));
    assert!(!resolve_audience(
        Some(&conditions),
        &["1".to_string()],
        &audiences,
        &attrs,
        &user
    ));
}

#[test]
fn nested_and_or_not_through_audience_ids() {
    let mut audiences = HashMap::new();
    audiences.insert("1".to_string(), attr_audience("1", "country", "exact", json!("US")));
    audiences.insert("2".to_string(), attr_audience("2", "plan", "exact", json!("pro")));

    let mut attrs = HashMap::new();
    attrs.insert("country".to_string(), json!("US"));
    attrs.insert("plan".to_string(), json!("free"));
    let user = UserContext::new("u1");

    let conditions = parse_condition(&json!(["and", "1", ["not", "2"]]));
    assert!(resolve_audience(
        Some(&conditions),
        &[],
        &audiences,
        &attrs,
        &user
    ));
}
