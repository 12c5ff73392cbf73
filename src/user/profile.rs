//! User profile persistence (spec §3, §4.5 step 6): sticky bucketing across
//! repeat decisions via a pluggable lookup/save service, grounded on
//! `optimizely/user_profile_service.py` and `optimizely/decision_service.py`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::XDecideResult;

/// The reserved user attribute holding a client-supplied bucket map
/// (`$opt_experiment_bucket_map`). When present, it is consulted before the
/// user profile service and takes precedence over any stored entry for the
/// same experiment id.
pub const EXPERIMENT_BUCKET_MAP_ATTRIBUTE: &str = "$opt_experiment_bucket_map";

/// The single field a bucket map entry carries today; kept as its own type
/// since the attribute's on-wire shape is `{"<experiment_id>": {"variation_id": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentBucketEntry {
    pub variation_id: String,
}

/// A user's sticky-bucketing record: which variation they were already
/// bucketed into per experiment id. Persisted opaquely by whatever
/// `UserProfileService` the host application supplies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub experiment_bucket_map: HashMap<String, ExperimentBucketEntry>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        UserProfile {
            user_id: user_id.into(),
            experiment_bucket_map: HashMap::new(),
        }
    }

    pub fn variation_for(&self, experiment_id: &str) -> Option<&str> {
        self.experiment_bucket_map
            .get(experiment_id)
            .map(|entry| entry.variation_id.as_str())
    }

    pub fn set_variation(&mut self, experiment_id: impl Into<String>, variation_id: impl Into<String>) {
        self.experiment_bucket_map.insert(
            experiment_id.into(),
            ExperimentBucketEntry {
                variation_id: variation_id.into(),
            },
        );
    }
}

/// Storage seam for sticky bucketing. A lookup failure is non-fatal to the
/// decision pipeline (spec §4.5 step 6: treat it as "nothing stored" and log
/// it, not as a pipeline-aborting error), so callers should prefer to log
/// `Err` results from `lookup`/`save` rather than propagate them.
pub trait UserProfileService: Send + Sync {
    fn lookup(&self, user_id: &str) -> XDecideResult<Option<UserProfile>>;
    fn save(&self, profile: UserProfile) -> XDecideResult<()>;
}

/// An in-memory `UserProfileService`, handy for tests and for host
/// applications that don't need cross-process persistence.
#[derive(Debug, Default)]
pub struct InMemoryUserProfileService {
    profiles: std::sync::Mutex<HashMap<String, UserProfile>>,
}

impl InMemoryUserProfileService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserProfileService for InMemoryUserProfileService {
    fn lookup(&self, user_id: &str) -> XDecideResult<Option<UserProfile>> {
        let profiles = self.profiles.lock().expect("user profile lock poisoned");
        Ok(profiles.get(user_id).cloned())
    }

    fn save(&self, profile: UserProfile) -> XDecideResult<()> {
        let mut profiles = self.profiles.lock().expect("user profile lock poisoned");
        profiles.insert(profile.user_id.clone(), profile);
        Ok(())
    }
}

/// Parses the `$opt_experiment_bucket_map` reserved attribute into entries
/// keyed by experiment id, per spec's supplemented-feature description. Any
/// shape mismatch (not an object, or an entry missing `variation_id`) is
/// silently skipped rather than failing the whole decode.
pub fn parse_experiment_bucket_map_attribute(value: &serde_json::Value) -> HashMap<String, ExperimentBucketEntry> {
    let mut map = HashMap::new();
    let Some(obj) = value.as_object() else {
        return map;
    };
    for (experiment_id, entry) in obj {
        if let Some(variation_id) = entry.get("variation_id").and_then(|v| v.as_str()) {
            map.insert(
                experiment_id.clone(),
                ExperimentBucketEntry {
                    variation_id: variation_id.to_string(),
                },
            );
        }
    }
    map
}

#[cfg(test)]
mod profile_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_memory_service_round_trips() {
        let service = InMemoryUserProfileService::new();
        assert_eq!(service.lookup("u1").unwrap(), None);

        let mut profile = UserProfile::new("u1");
        profile.set_variation("exp_1", "var_a");
        service.save(profile.clone()).unwrap();

        assert_eq!(service.lookup("u1").unwrap(), Some(profile));
    }

    #[test]
    fn variation_for_missing_experiment_is_none() {
        let profile = UserProfile::new("u1");
        assert_eq!(profile.variation_for("exp_1"), None);
    }

    #[test]
    fn parses_bucket_map_attribute() {
        let value = json!({
            "exp_1": {"variation_id": "var_a"},
            "exp_2": {"not_variation_id": "oops"},
        });
        let parsed = parse_experiment_bucket_map_attribute(&value);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("exp_1").unwrap().variation_id, "var_a");
    }

    #[test]
    fn non_object_attribute_yields_empty_map() {
        let parsed = parse_experiment_bucket_map_attribute(&json!("not an object"));
        assert!(parsed.is_empty());
    }
}
