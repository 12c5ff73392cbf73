//! Raw datafile entity shapes (spec §3, §6), deserialized straight off the
//! wire. `ProjectConfig` (in `project_config.rs`) compiles these into the
//! indexed, query-ready form the decision service consults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::audience::ConditionExpr;
use crate::bucketer::TrafficAllocationEntry;

/// Datafile schema major versions this crate understands (spec §6). Anything
/// else is refused at parse time.
pub const SUPPORTED_VERSIONS: [&str; 2] = ["2", "4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentStatus {
    #[serde(rename = "Running")]
    Running,
    #[serde(rename = "Paused")]
    Paused,
    #[serde(rename = "Not started")]
    NotStarted,
    #[serde(rename = "Archived")]
    Archived,
}

impl ExperimentStatus {
    pub fn is_running(self) -> bool {
        matches!(self, ExperimentStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationVariable {
    pub id: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variation {
    pub id: String,
    pub key: String,
    #[serde(default, rename = "featureEnabled")]
    pub feature_enabled: Option<bool>,
    #[serde(default)]
    pub variables: Vec<VariationVariable>,
}

/// Per-experiment CMAB configuration: which attributes feed the bandit and
/// an optional retry policy (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmabConfig {
    #[serde(rename = "attributeIds")]
    pub attribute_ids: Vec<String>,
    #[serde(rename = "trafficAllocation", default)]
    pub traffic_allocation: Vec<TrafficAllocationEntry>,
}

fn default_audience_conditions() -> Value {
    Value::Null
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub key: String,
    pub status: ExperimentStatus,
    #[serde(default, rename = "layerId")]
    pub layer_id: Option<String>,
    #[serde(default, rename = "audienceIds")]
    pub audience_ids: Vec<String>,
    /// Raw JSON; legacy datafiles encode this as a JSON *string* that must
    /// be decoded before parsing (spec §6), so this field stays untyped
    /// until `ProjectConfig::compile` resolves it into a `ConditionExpr`.
    #[serde(default = "default_audience_conditions", rename = "audienceConditions")]
    pub audience_conditions_raw: Value,
    pub variations: Vec<Variation>,
    #[serde(default, rename = "forcedVariations")]
    pub forced_variations: HashMap<String, String>,
    #[serde(default, rename = "trafficAllocation")]
    pub traffic_allocation: Vec<TrafficAllocationEntry>,
    #[serde(default, rename = "groupId")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub cmab: Option<CmabConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub policy: String,
    #[serde(default, rename = "trafficAllocation")]
    pub traffic_allocation: Vec<TrafficAllocationEntry>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
}

impl Group {
    pub fn is_mutually_exclusive(&self) -> bool {
        self.policy == "random"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub id: String,
    pub key: String,
    #[serde(default, rename = "rolloutId")]
    pub rollout_id: Option<String>,
    #[serde(default, rename = "experimentIds")]
    pub experiment_ids: Vec<String>,
    #[serde(default)]
    pub variables: Vec<VariationVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rollout {
    pub id: String,
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holdout {
    pub id: String,
    pub key: String,
    pub status: ExperimentStatus,
    #[serde(default, rename = "audienceIds")]
    pub audience_ids: Vec<String>,
    #[serde(default = "default_audience_conditions", rename = "audienceConditions")]
    pub audience_conditions_raw: Value,
    #[serde(default)]
    pub variations: Vec<Variation>,
    #[serde(default, rename = "trafficAllocation")]
    pub traffic_allocation: Vec<TrafficAllocationEntry>,
    #[serde(default, rename = "includedFlags")]
    pub included_flags: Vec<String>,
    #[serde(default, rename = "excludedFlags")]
    pub excluded_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audience {
    pub id: String,
    pub name: String,
    /// Legacy form: a JSON-encoded string that must be decoded before
    /// parsing into a condition tree (spec §6).
    #[serde(default)]
    pub conditions: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntity {
    pub id: String,
    pub key: String,
    #[serde(default, rename = "experimentIds")]
    pub experiment_ids: Vec<String>,
}

/// The raw, as-parsed-from-JSON datafile (spec §3, §6). `ProjectConfig`
/// compiles this into indexed, query-ready form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datafile {
    pub version: String,
    pub revision: String,
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(default, rename = "sdkKey")]
    pub sdk_key: Option<String>,
    #[serde(default, rename = "environmentKey")]
    pub environment_key: Option<String>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default, rename = "featureFlags")]
    pub feature_flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub rollouts: Vec<Rollout>,
    #[serde(default)]
    pub holdouts: Vec<Holdout>,
    #[serde(default)]
    pub audiences: Vec<Audience>,
    #[serde(default, rename = "typedAudiences")]
    pub typed_audiences: Vec<Audience>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub events: Vec<EventEntity>,
}

impl Datafile {
    /// The shape gate named in spec §6: recognized top-level keys and a
    /// supported major version. This is *not* schema validation (explicitly
    /// out of scope) — only the version check, which is load-bearing for
    /// parsing at all.
    pub fn parse(raw: &str) -> Result<Datafile, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing `version` field".to_string())?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(format!("unsupported datafile version: {version}"));
        }
        serde_json::from_value(value).map_err(|e| format!("failed to parse datafile: {e}"))
    }
}

/// Decodes an audience's `conditions` field, which may be a JSON string
/// (legacy) or an already-parsed array/object (current), into a
/// `ConditionExpr`.
pub fn decode_conditions(raw: &Value) -> ConditionExpr {
    match raw {
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(s).unwrap_or(Value::Null);
            crate::audience::parse_condition(&parsed)
        }
        other => crate::audience::parse_condition(other),
    }
}
