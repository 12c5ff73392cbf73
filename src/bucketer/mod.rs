//! Deterministic traffic-allocation bucketer (spec §4.1).
//!
//! Bucketing id hashing, `findBucket`, and the group/experiment and holdout
//! bucketing rules all live here; nothing above this layer reaches into the
//! hash directly.

mod murmurhash;

pub use murmurhash::{bucket_value, generate_bucket_value, hash32};

/// One entry of a sorted traffic allocation list (spec §6).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrafficAllocationEntry {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "endOfRange")]
    pub end_of_range: u32,
}

pub const MAX_TRAFFIC_VALUE: u32 = murmurhash::MAX_TRAFFIC_VALUE;

/// Reserved attribute key that overrides the hashed bucketing id.
pub const BUCKETING_ID_ATTRIBUTE: &str = "$opt_bucketing_id";

/// Finds the first traffic-allocation entry whose `end_of_range` exceeds
/// `bucket`, per spec §4.1. A zero-length `entity_id` is a deliberate gap and
/// resolves to no entity, same as falling off the end of the list.
pub fn find_bucket(bucket: u32, traffic_allocation: &[TrafficAllocationEntry]) -> Option<String> {
    for entry in traffic_allocation {
        if entry.end_of_range > bucket {
            if entry.entity_id.is_empty() {
                return None;
            }
            return Some(entry.entity_id.clone());
        }
    }
    None
}

/// Inputs needed to test group membership before bucketing an experiment
/// that belongs to a mutually-exclusive group.
pub struct GroupBucketingInput<'a> {
    pub group_id: &'a str,
    pub traffic_allocation: &'a [TrafficAllocationEntry],
}

/// Buckets a user into a variation of `experiment_id`, honoring mutual
/// exclusion against `group` when the experiment belongs to one (spec §4.1).
///
/// Step 1: bucket with the group id as parent against the group's traffic
/// allocation; a mismatch against `experiment_id` is a hard no. Step 2:
/// bucket with the experiment id as parent against the experiment's own
/// traffic allocation.
pub fn bucket_experiment_in_group(
    bucketing_id: &str,
    experiment_id: &str,
    experiment_traffic_allocation: &[TrafficAllocationEntry],
    group: Option<&GroupBucketingInput<'_>>,
) -> Option<String> {
    if let Some(group) = group {
        let group_bucket = generate_bucket_value(bucketing_id, group.group_id);
        match find_bucket(group_bucket, group.traffic_allocation) {
            Some(entity_id) if entity_id == experiment_id => {}
            _ => return None,
        }
    }

    let experiment_bucket = generate_bucket_value(bucketing_id, experiment_id);
    find_bucket(experiment_bucket, experiment_traffic_allocation)
}

/// Buckets a user into a holdout's own traffic allocation, keyed by the
/// holdout id directly (spec §4.1). An empty id or empty variation list
/// already falls out of `find_bucket` returning `None`.
pub fn bucket_holdout(
    bucketing_id: &str,
    holdout_id: &str,
    holdout_traffic_allocation: &[TrafficAllocationEntry],
) -> Option<String> {
    if holdout_id.is_empty() || holdout_traffic_allocation.is_empty() {
        return None;
    }
    let bucket = generate_bucket_value(bucketing_id, holdout_id);
    find_bucket(bucket, holdout_traffic_allocation)
}

/// Resolves the value that should be hashed for a user: the
/// `$opt_bucketing_id` attribute when present and a string, else the user id
/// (spec §4.1).
pub fn resolve_bucketing_id<'a>(
    user_id: &'a str,
    attributes: &'a std::collections::HashMap<String, serde_json::Value>,
) -> &'a str {
    match attributes.get(BUCKETING_ID_ATTRIBUTE) {
        Some(serde_json::Value::String(s)) => s.as_str(),
        _ => user_id,
    }
}
