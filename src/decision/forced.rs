//! Forced-decision resolution (spec §4.4): two independent override
//! surfaces, datafile whitelisting and runtime forced decisions, both
//! validated against the live `ProjectConfig` so a stale override never
//! resolves to a variation that no longer exists.

use crate::config::datafile::{Experiment, Variation};
use crate::user::UserContext;

/// Looks up `experiment.forcedVariations[user_id]` and resolves it to a live
/// `Variation`. An id with no matching variation is treated as absent
/// (spec §4.4: "invalid keys are ignored").
pub fn resolve_whitelist<'a>(experiment: &'a Experiment, user_id: &str) -> Option<&'a Variation> {
    let variation_key = experiment.forced_variations.get(user_id)?;
    experiment
        .variations
        .iter()
        .find(|v| &v.key == variation_key || &v.id == variation_key)
}

/// Looks up a runtime forced decision at `(flag_key, rule_key)` and resolves
/// it against `variations`. `rule_key` is `None` for the flag-level
/// override, `Some(experiment_id)`/`Some(rule_id)` for a specific
/// experiment or rollout rule (spec §4.4).
pub fn resolve_forced_decision<'a>(
    user: &UserContext,
    flag_key: &str,
    rule_key: Option<&str>,
    variations: &'a [Variation],
) -> Option<&'a Variation> {
    let variation_key = user.get_forced_decision(flag_key, rule_key)?;
    variations.iter().find(|v| v.key == variation_key || v.id == variation_key)
}

#[cfg(test)]
mod forced_tests {
    use super::*;
    use crate::config::datafile::ExperimentStatus;
    use std::collections::HashMap;

    fn experiment_with_whitelist() -> Experiment {
        let mut forced = HashMap::new();
        forced.insert("user_a".to_string(), "var_b".to_string());
        Experiment {
            id: "exp_1".into(),
            key: "exp_one".into(),
            status: ExperimentStatus::Running,
            layer_id: None,
            audience_ids: vec![],
            audience_conditions_raw: serde_json::Value::Null,
            variations: vec![
                Variation {
                    id: "var_a".into(),
                    key: "var_a".into(),
                    feature_enabled: None,
                    variables: vec![],
                },
                Variation {
                    id: "var_b".into(),
                    key: "var_b".into(),
                    feature_enabled: None,
                    variables: vec![],
                },
            ],
            forced_variations: forced,
            traffic_allocation: vec![],
            group_id: None,
            cmab: None,
        }
    }

    #[test]
    fn whitelist_resolves_known_user() {
        let experiment = experiment_with_whitelist();
        let resolved = resolve_whitelist(&experiment, "user_a").unwrap();
        assert_eq!(resolved.id, "var_b");
    }

    #[test]
    fn whitelist_ignores_unknown_user() {
        let experiment = experiment_with_whitelist();
        assert!(resolve_whitelist(&experiment, "user_z").is_none());
    }

    #[test]
    fn whitelist_ignores_invalid_variation_key() {
        let mut experiment = experiment_with_whitelist();
        experiment
            .forced_variations
            .insert("user_c".to_string(), "no_such_variation".to_string());
        assert!(resolve_whitelist(&experiment, "user_c").is_none());
    }

    #[test]
    fn forced_decision_resolves_against_live_variations() {
        let mut user = UserContext::new("u1");
        user.set_forced_decision("flag_one", Some("exp_1".to_string()), "var_b");
        let variations = experiment_with_whitelist().variations;
        let resolved = resolve_forced_decision(&user, "flag_one", Some("exp_1"), &variations).unwrap();
        assert_eq!(resolved.id, "var_b");
    }

    #[test]
    fn stale_forced_decision_does_not_resolve() {
        let mut user = UserContext::new("u1");
        user.set_forced_decision("flag_one", Some("exp_1".to_string()), "var_removed");
        let variations = experiment_with_whitelist().variations;
        assert!(resolve_forced_decision(&user, "flag_one", Some("exp_1"), &variations).is_none());
    }
}
