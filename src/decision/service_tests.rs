use super::*;
use crate::errors::{XDecideError, XDecideResult};
use crate::notification::{NotificationHub, NotificationType};
use crate::user::InMemoryUserProfileService;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn holdout_datafile() -> String {
    r#"{
        "version": "4", "revision": "1", "accountId": "a", "projectId": "p",
        "featureFlags": [{"id": "flag_1", "key": "feature_one", "experimentIds": []}],
        "holdouts": [
            {
                "id": "holdout_1", "key": "global_holdout", "status": "Running",
                "variations": [{"id": "h_var", "key": "held_out"}],
                "trafficAllocation": [{"entityId": "h_var", "endOfRange": 10000}],
                "includedFlags": [], "excludedFlags": []
            }
        ]
    }"#
    .to_string()
}

fn experiment_datafile() -> String {
    r#"{
        "version": "4", "revision": "1", "accountId": "a", "projectId": "p",
        "audiences": [
            {"id": "aud_1", "name": "US", "conditions": "[\"and\", {\"type\": \"custom_attribute\", \"name\": \"country\", \"match\": \"exact\", \"value\": \"US\"}]"}
        ],
        "experiments": [
            {
                "id": "exp_1", "key": "experiment_one", "status": "Running",
                "audienceIds": ["aud_1"],
                "variations": [{"id": "var_1", "key": "control"}, {"id": "var_2", "key": "treatment"}],
                "forcedVariations": {"user_whitelisted": "var_2"},
                "trafficAllocation": [{"entityId": "var_1", "endOfRange": 5000}, {"entityId": "var_2", "endOfRange": 10000}]
            }
        ],
        "featureFlags": [{"id": "flag_1", "key": "feature_one", "rolloutId": "rollout_1", "experimentIds": ["exp_1"]}],
        "rollouts": [
            {
                "id": "rollout_1",
                "experiments": [
                    {"id": "rule_1", "key": "rule_one", "status": "Running",
                     "variations": [{"id": "rv_1", "key": "on"}],
                     "trafficAllocation": [{"entityId": "rv_1", "endOfRange": 10000}]}
                ]
            }
        ]
    }"#
    .to_string()
}

fn cmab_datafile() -> String {
    r#"{
        "version": "4", "revision": "1", "accountId": "a", "projectId": "p",
        "experiments": [
            {
                "id": "exp_cmab", "key": "bandit_experiment", "status": "Running",
                "variations": [{"id": "var_a", "key": "a"}, {"id": "var_b", "key": "b"}],
                "trafficAllocation": [],
                "cmab": {"attributeIds": ["age"], "trafficAllocation": []}
            }
        ],
        "featureFlags": [{"id": "flag_1", "key": "feature_one", "experimentIds": ["exp_cmab"]}]
    }"#
    .to_string()
}

fn rollout_skip_datafile() -> String {
    r#"{
        "version": "4", "revision": "1", "accountId": "a", "projectId": "p",
        "audiences": [
            {"id": "aud_1", "name": "US", "conditions": "[\"and\", {\"type\": \"custom_attribute\", \"name\": \"country\", \"match\": \"exact\", \"value\": \"US\"}]"}
        ],
        "featureFlags": [{"id": "flag_1", "key": "feature_one", "rolloutId": "rollout_1", "experimentIds": []}],
        "rollouts": [
            {
                "id": "rollout_1",
                "experiments": [
                    {"id": "rule_0", "key": "rule_zero", "status": "Running", "audienceIds": ["aud_1"],
                     "variations": [{"id": "rv_0", "key": "zero"}],
                     "trafficAllocation": [{"entityId": "", "endOfRange": 10000}]},
                    {"id": "rule_1", "key": "rule_one", "status": "Running",
                     "variations": [{"id": "rv_1", "key": "one"}],
                     "trafficAllocation": [{"entityId": "rv_1", "endOfRange": 10000}]},
                    {"id": "rule_2", "key": "everyone_else", "status": "Running",
                     "variations": [{"id": "rv_2", "key": "everyone"}],
                     "trafficAllocation": [{"entityId": "rv_2", "endOfRange": 10000}]}
                ]
            }
        ]
    }"#
    .to_string()
}

fn no_rollout_datafile() -> String {
    r#"{
        "version": "4", "revision": "1", "accountId": "a", "projectId": "p",
        "featureFlags": [{"id": "flag_1", "key": "feature_one", "experimentIds": []}]
    }"#
    .to_string()
}

fn service_without_collaborators() -> DecisionService {
    DecisionService::new(None, None)
}

#[test]
fn unknown_flag_yields_null_decision() {
    let config = ProjectConfig::compile(&no_rollout_datafile()).unwrap();
    let user = UserContext::new("u1");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "does_not_exist", DecideOptions::INCLUDE_REASONS);
    assert!(decision.is_null());
    assert!(decision.reasons.iter().any(|r| r.contains("not found")));
}

#[test]
fn flag_with_no_rollout_is_a_null_decision() {
    let config = ProjectConfig::compile(&no_rollout_datafile()).unwrap();
    let user = UserContext::new("u1");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert!(decision.is_null());
    assert_eq!(decision.source, DecisionSource::Rollout);
}

#[test]
fn holdout_bucketing_wins_before_any_experiment() {
    let config = ProjectConfig::compile(&holdout_datafile()).unwrap();
    let user = UserContext::new("u1");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::Holdout);
    assert_eq!(decision.variation.unwrap().key, "held_out");
}

#[test]
fn forced_decision_wins_over_audience_and_bucketing() {
    let config = ProjectConfig::compile(&experiment_datafile()).unwrap();
    let mut user = UserContext::new("u_forced");
    user.set_forced_decision("feature_one", Some("exp_1".to_string()), "var_2");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::FeatureTest);
    assert_eq!(decision.variation.unwrap().key, "treatment");
}

#[test]
fn whitelisted_user_bypasses_audience() {
    let config = ProjectConfig::compile(&experiment_datafile()).unwrap();
    let user = UserContext::new("user_whitelisted");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::FeatureTest);
    assert_eq!(decision.variation.unwrap().key, "treatment");
}

#[test]
fn failing_audience_falls_through_to_rollout() {
    let config = ProjectConfig::compile(&experiment_datafile()).unwrap();
    let user = UserContext::new("u_no_country");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::Rollout);
    assert_eq!(decision.variation.unwrap().key, "on");
}

#[test]
fn passing_audience_buckets_and_saves_sticky_profile() {
    let config = ProjectConfig::compile(&experiment_datafile()).unwrap();
    let mut user = UserContext::new("u_us");
    user.set_attribute("country", json!("US"));
    let ups = Arc::new(InMemoryUserProfileService::new());
    let service = DecisionService::new(Some(ups.clone()), None);

    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::FeatureTest);

    let saved = ups.lookup("u_us").unwrap().unwrap();
    assert_eq!(saved.variation_for("exp_1"), decision.variation.as_ref().map(|v| v.id.as_str()));
}

#[test]
fn sticky_profile_is_honored_on_a_later_call() {
    let config = ProjectConfig::compile(&experiment_datafile()).unwrap();
    let ups = Arc::new(InMemoryUserProfileService::new());
    let mut profile = UserProfile::new("u_sticky");
    profile.set_variation("exp_1", "var_1");
    ups.save(profile).unwrap();

    // This user would fail the audience check (no `country` attribute), but
    // the sticky entry should resolve before the audience is ever checked.
    let user = UserContext::new("u_sticky");
    let service = DecisionService::new(Some(ups), None);
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::FeatureTest);
    assert_eq!(decision.variation.unwrap().key, "control");
}

#[test]
fn experiment_bucket_map_attribute_takes_precedence_over_user_profile_service() {
    let config = ProjectConfig::compile(&experiment_datafile()).unwrap();
    let ups = Arc::new(InMemoryUserProfileService::new());
    let mut profile = UserProfile::new("u_both");
    profile.set_variation("exp_1", "var_1");
    ups.save(profile).unwrap();

    let mut user = UserContext::new("u_both");
    user.set_attribute(
        EXPERIMENT_BUCKET_MAP_ATTRIBUTE,
        json!({"exp_1": {"variation_id": "var_2"}}),
    );
    let service = DecisionService::new(Some(ups), None);
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.variation.unwrap().key, "treatment");
}

struct FakeCmabClient {
    response: XDecideResult<String>,
}

impl CmabClient for FakeCmabClient {
    fn fetch_decision(
        &self,
        _rule_id: &str,
        _user_id: &str,
        _attributes: &HashMap<String, Value>,
        _cmab_uuid: &str,
    ) -> XDecideResult<String> {
        self.response.clone()
    }
}

#[test]
fn cmab_success_resolves_the_predicted_variation() {
    let config = ProjectConfig::compile(&cmab_datafile()).unwrap();
    let user = UserContext::new("u1");
    let client = FakeCmabClient {
        response: Ok("var_b".to_string()),
    };
    let service = DecisionService::new(None, Some(Box::new(client)));
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::FeatureTest);
    assert_eq!(decision.variation.unwrap().key, "b");
}

#[test]
fn cmab_failure_yields_no_experiment_decision() {
    let config = ProjectConfig::compile(&cmab_datafile()).unwrap();
    let user = UserContext::new("u1");
    let client = FakeCmabClient {
        response: Err(XDecideError::CmabRequestFailed("boom".to_string())),
    };
    let service = DecisionService::new(None, Some(Box::new(client)));
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert!(decision.is_null());
}

#[test]
fn cmab_experiment_without_a_client_configured_yields_no_decision() {
    let config = ProjectConfig::compile(&cmab_datafile()).unwrap();
    let user = UserContext::new("u1");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert!(decision.is_null());
}

#[test]
fn rollout_audience_miss_on_non_last_rule_tries_the_next_rule_normally() {
    let config = ProjectConfig::compile(&rollout_skip_datafile()).unwrap();
    let user = UserContext::new("u1"); // fails rule_zero's audience (no `country`)
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::Rollout);
    assert_eq!(decision.variation.unwrap().key, "one");
}

#[test]
fn rollout_bucket_miss_on_non_last_rule_skips_directly_to_everyone_else() {
    let config = ProjectConfig::compile(&rollout_skip_datafile()).unwrap();
    let mut user = UserContext::new("u1");
    user.set_attribute("country", json!("US"));
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::Rollout);
    // rule_zero's audience passes but its bucket is an empty gap; rule_one
    // would bucket successfully but must never be tried once rule_zero's
    // audience matched — the pipeline skips straight to "everyone_else".
    assert_eq!(decision.variation.unwrap().key, "everyone");
}

#[test]
fn include_reasons_populates_decision_reasons() {
    let config = ProjectConfig::compile(&holdout_datafile()).unwrap();
    let user = UserContext::new("u1");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::INCLUDE_REASONS);
    assert!(!decision.reasons.is_empty());
}

#[test]
fn reasons_are_empty_without_the_option() {
    let config = ProjectConfig::compile(&holdout_datafile()).unwrap();
    let user = UserContext::new("u1");
    let service = service_without_collaborators();
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert!(decision.reasons.is_empty());
}

#[test]
fn non_rollout_decision_emits_decision_and_activate_notifications() {
    let config = ProjectConfig::compile(&holdout_datafile()).unwrap();
    let user = UserContext::new("u1");
    let hub = NotificationHub::new();
    let decision_count = Arc::new(AtomicUsize::new(0));
    let activate_count = Arc::new(AtomicUsize::new(0));
    let decision_count_clone = decision_count.clone();
    let activate_count_clone = activate_count.clone();
    hub.subscribe(
        NotificationType::Decision,
        Arc::new(move |_payload| {
            decision_count_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    hub.subscribe(
        NotificationType::Activate,
        Arc::new(move |_payload| {
            activate_count_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let service = DecisionService::new(None, None).with_notifications(hub);
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::Holdout);
    assert_eq!(decision_count.load(Ordering::SeqCst), 1);
    // a holdout decision carries a synthetic experiment, so Activate fires too.
    assert_eq!(activate_count.load(Ordering::SeqCst), 1);
}

#[test]
fn rollout_decision_does_not_emit_notifications() {
    let config = ProjectConfig::compile(&rollout_skip_datafile()).unwrap();
    let user = UserContext::new("u1");
    let hub = NotificationHub::new();
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    hub.subscribe(
        NotificationType::Decision,
        Arc::new(move |_payload| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let service = DecisionService::new(None, None).with_notifications(hub);
    let decision = service.decide(&config, &user, "feature_one", DecideOptions::default());
    assert_eq!(decision.source, DecisionSource::Rollout);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}
