//! User context (spec §3): mutable per-call attribute bag plus forced
//! decisions and ODP qualified segments.

use serde_json::Value;
use std::collections::HashMap;

/// Key for a forced decision: a flag key plus an optional rule key. `None`
/// means "flag-level" (applies to the flag's feature-test decisions as a
/// whole rather than one experiment or rollout rule).
pub type ForcedDecisionKey = (String, Option<String>);

/// Per-(flag, user) runtime overrides and attribute bag (spec §3, §4.4).
/// Attributes are copied in on construction/mutation; a snapshot taken at
/// the start of a `decide` call stays immutable for that call.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub attributes: HashMap<String, Value>,
    pub qualified_segments: Option<Vec<String>>,
    forced_decisions: HashMap<ForcedDecisionKey, String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        UserContext {
            user_id: user_id.into(),
            attributes: HashMap::new(),
            qualified_segments: None,
            forced_decisions: HashMap::new(),
        }
    }

    pub fn with_attributes(user_id: impl Into<String>, attributes: HashMap<String, Value>) -> Self {
        UserContext {
            user_id: user_id.into(),
            attributes,
            qualified_segments: None,
            forced_decisions: HashMap::new(),
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Immutable snapshot of attributes for use across a single decide call.
    pub fn attribute_snapshot(&self) -> HashMap<String, Value> {
        self.attributes.clone()
    }

    /// Sets a forced decision for `(flag_key, rule_key)`. `rule_key` of
    /// `None` is the flag-level override.
    pub fn set_forced_decision(
        &mut self,
        flag_key: impl Into<String>,
        rule_key: Option<String>,
        variation_key: impl Into<String>,
    ) {
        self.forced_decisions
            .insert((flag_key.into(), rule_key), variation_key.into());
    }

    pub fn get_forced_decision(&self, flag_key: &str, rule_key: Option<&str>) -> Option<&str> {
        self.forced_decisions
            .get(&(flag_key.to_string(), rule_key.map(str::to_string)))
            .map(String::as_str)
    }

    pub fn remove_forced_decision(&mut self, flag_key: &str, rule_key: Option<&str>) -> bool {
        self.forced_decisions
            .remove(&(flag_key.to_string(), rule_key.map(str::to_string)))
            .is_some()
    }
}
