use super::*;

fn sample_datafile() -> String {
    r#"{
        "version": "4",
        "revision": "7",
        "accountId": "acct_1",
        "projectId": "proj_1",
        "sdkKey": "sdk_1",
        "audiences": [
            {"id": "aud_1", "name": "US users", "conditions": "[\"and\", {\"type\": \"custom_attribute\", \"name\": \"country\", \"match\": \"exact\", \"value\": \"US\"}]"}
        ],
        "experiments": [
            {
                "id": "exp_1",
                "key": "experiment_one",
                "status": "Running",
                "audienceIds": ["aud_1"],
                "variations": [
                    {"id": "var_1", "key": "control"},
                    {"id": "var_2", "key": "treatment"}
                ],
                "forcedVariations": {"user_x": "var_2"},
                "trafficAllocation": [
                    {"entityId": "var_1", "endOfRange": 5000},
                    {"entityId": "var_2", "endOfRange": 10000}
                ]
            }
        ],
        "featureFlags": [
            {"id": "flag_1", "key": "feature_one", "rolloutId": "rollout_1", "experimentIds": ["exp_1"]}
        ],
        "rollouts": [
            {
                "id": "rollout_1",
                "experiments": [
                    {
                        "id": "rule_1", "key": "rule_one", "status": "Running",
                        "variations": [{"id": "rv_1", "key": "on", "featureEnabled": true}],
                        "trafficAllocation": [{"entityId": "rv_1", "endOfRange": 10000}]
                    }
                ]
            }
        ],
        "holdouts": [
            {
                "id": "holdout_1", "key": "global_holdout", "status": "Running",
                "variations": [{"id": "h_var", "key": "held_out"}],
                "trafficAllocation": [{"entityId": "h_var", "endOfRange": 1000}],
                "includedFlags": [],
                "excludedFlags": []
            }
        ]
    }"#
    .to_string()
}

#[test]
fn compiles_basic_indexes() {
    let config = ProjectConfig::compile(&sample_datafile()).unwrap();
    assert_eq!(config.revision, "7");
    assert!(config.get_experiment_by_key("experiment_one").is_some());
    assert!(config.get_flag_by_key("feature_one").is_some());
    assert!(config.get_audience("aud_1").is_some());
}

#[test]
fn flag_experiments_resolved_in_order() {
    let config = ProjectConfig::compile(&sample_datafile()).unwrap();
    let experiments = config.experiments_for_flag("feature_one");
    assert_eq!(experiments.len(), 1);
    assert_eq!(experiments[0].key, "experiment_one");
}

#[test]
fn global_holdout_applies_to_every_flag() {
    let config = ProjectConfig::compile(&sample_datafile()).unwrap();
    let holdouts = config.holdouts_for_flag("feature_one");
    assert_eq!(holdouts.len(), 1);
    assert_eq!(holdouts[0].key, "global_holdout");
}

#[test]
fn rollout_for_flag_resolves_rule_order() {
    let config = ProjectConfig::compile(&sample_datafile()).unwrap();
    let rollout = config.rollout_for_flag("feature_one").unwrap();
    assert_eq!(rollout.len(), 1);
    assert_eq!(rollout[0].key, "rule_one");
}

#[test]
fn unknown_experiment_reference_is_dropped_not_fatal() {
    let mut raw = sample_datafile();
    raw = raw.replace(r#""experimentIds": ["exp_1"]"#, r#""experimentIds": ["exp_1", "missing"]"#);
    let config = ProjectConfig::compile(&raw).unwrap();
    assert_eq!(config.experiments_for_flag("feature_one").len(), 1);
}

#[test]
fn duplicate_experiment_key_first_wins() {
    let mut raw = sample_datafile();
    // Duplicate the experiment under a second group referencing the same key.
    raw = raw.replace(
        r#""holdouts": ["#,
        r#""groups": [{"id": "g1", "policy": "random", "trafficAllocation": [], "experiments": [
            {"id": "exp_dup", "key": "experiment_one", "status": "Running", "variations": [], "trafficAllocation": []}
        ]}], "holdouts": ["#,
    );
    let config = ProjectConfig::compile(&raw).unwrap();
    assert_eq!(config.get_experiment_by_key("experiment_one").unwrap().id, "exp_1");
    assert!(config.get_experiment_by_id("exp_dup").is_none());
}

#[test]
fn included_and_excluded_flags_gate_holdout_scope() {
    let mut raw = sample_datafile();
    raw = raw.replace(r#""includedFlags": [],"#, r#""includedFlags": ["flag_2"],"#);
    raw = raw.replace(
        r#""featureFlags": [
            {"id": "flag_1", "key": "feature_one", "rolloutId": "rollout_1", "experimentIds": ["exp_1"]}
        ],"#,
        r#""featureFlags": [
            {"id": "flag_1", "key": "feature_one", "rolloutId": "rollout_1", "experimentIds": ["exp_1"]},
            {"id": "flag_2", "key": "feature_two", "experimentIds": []}
        ],"#,
    );
    let config = ProjectConfig::compile(&raw).unwrap();
    assert!(config.holdouts_for_flag("feature_one").is_empty());
    assert_eq!(config.holdouts_for_flag("feature_two").len(), 1);
}
