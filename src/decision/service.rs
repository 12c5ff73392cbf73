//! Decision service pipeline (spec §4.5): the ordered holdout → feature
//! experiment → rollout walk that resolves a flag decision for a user.
//! Grounded on `optimizely/decision_service.py`.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::audience::resolve_audience;
use crate::bucketer::{bucket_experiment_in_group, bucket_holdout, resolve_bucketing_id, GroupBucketingInput};
use crate::cmab::CmabClient;
use crate::config::datafile::{decode_conditions, Experiment, Variation};
use crate::config::project_config::ProjectConfig;
use crate::decision::forced::{resolve_forced_decision, resolve_whitelist};
use crate::decision::options::DecideOptions;
use crate::decision::types::{Decision, DecisionSource};
use crate::notification::{ActivateNotification, DecisionNotification, NotificationHub, NotificationPayload, NotificationType};
use crate::user::{parse_experiment_bucket_map_attribute, UserContext, UserProfile, UserProfileService, EXPERIMENT_BUCKET_MAP_ATTRIBUTE};

/// Runs the ordered pipeline of spec §4.5 against one `ProjectConfig`
/// snapshot. Holds the optional collaborators (user profile service, CMAB
/// client) the pipeline delegates to; both are trait objects so callers can
/// supply fakes or omit them entirely.
pub struct DecisionService {
    user_profile_service: Option<Arc<dyn UserProfileService>>,
    cmab_client: Option<Box<dyn CmabClient>>,
    notifications: Option<NotificationHub>,
}

impl DecisionService {
    pub fn new(user_profile_service: Option<Arc<dyn UserProfileService>>, cmab_client: Option<Box<dyn CmabClient>>) -> Self {
        DecisionService {
            user_profile_service,
            cmab_client,
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, notifications: NotificationHub) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Resolves a decision for `flag_key` (spec §4.5 steps 1–10). Never
    /// errors: an unresolvable flag, missing collaborator, or any swallowed
    /// sub-failure all fall through to a null decision with a reason
    /// attached when `INCLUDE_REASONS` is set.
    pub fn decide(&self, config: &ProjectConfig, user: &UserContext, flag_key: &str, options: DecideOptions) -> Decision {
        let include_reasons = options.include_reasons();

        if config.get_flag_by_key(flag_key).is_none() {
            return Decision::null(DecisionSource::Rollout).with_reason(include_reasons, format!("flag `{flag_key}` not found"));
        }

        let attributes = user.attribute_snapshot();

        let decision = if let Some(decision) = self.decide_holdouts(config, user, flag_key, &attributes, options) {
            decision
        } else if let Some(decision) = config
            .experiments_for_flag(flag_key)
            .iter()
            .find_map(|experiment| self.decide_experiment(config, user, flag_key, experiment, &attributes, options))
        {
            decision
        } else {
            self.decide_rollout(config, user, flag_key, &attributes, options)
        };

        self.notify_decision(user, flag_key, &decision);
        decision
    }

    /// Control flow per spec §2: a non-rollout decision emits an impression
    /// through the notification hub before the result reaches the caller.
    fn notify_decision(&self, user: &UserContext, flag_key: &str, decision: &Decision) {
        let Some(hub) = &self.notifications else {
            return;
        };
        if decision.source == DecisionSource::Rollout {
            return;
        }

        hub.send(
            NotificationType::Decision,
            NotificationPayload::Decision(DecisionNotification::from_decision(flag_key, &user.user_id, decision)),
        );

        if let Some(experiment) = &decision.experiment {
            hub.send(
                NotificationType::Activate,
                NotificationPayload::Activate(ActivateNotification {
                    experiment_key: experiment.key.clone(),
                    user_id: user.user_id.clone(),
                    variation_key: decision.variation.as_ref().map(|v| v.key.clone()),
                }),
            );
        }
    }

    fn decide_holdouts(
        &self,
        config: &ProjectConfig,
        user: &UserContext,
        flag_key: &str,
        attributes: &HashMap<String, Value>,
        options: DecideOptions,
    ) -> Option<Decision> {
        let include_reasons = options.include_reasons();
        for holdout in config.holdouts_for_flag(flag_key) {
            if !holdout.status.is_running() {
                continue;
            }
            let conditions = rule_conditions(&holdout.audience_conditions_raw);
            let meets_audience = resolve_audience(
                conditions.as_ref(),
                &holdout.audience_ids,
                &config.audiences_by_id,
                attributes,
                user,
            );
            if !meets_audience {
                continue;
            }
            let bucketing_id = resolve_bucketing_id(&user.user_id, attributes);
            let Some(variation_id) = bucket_holdout(bucketing_id, &holdout.id, &holdout.traffic_allocation) else {
                continue;
            };
            let Some(variation) = ProjectConfig::variation_in(&holdout.variations, &variation_id) else {
                warn!("holdout `{}` bucketed to unknown variation `{variation_id}`", holdout.key);
                continue;
            };
            debug!("user `{}` bucketed into holdout `{}`", user.user_id, holdout.key);
            let holdout_as_experiment = Experiment {
                id: holdout.id.clone(),
                key: holdout.key.clone(),
                status: holdout.status,
                layer_id: None,
                audience_ids: holdout.audience_ids.clone(),
                audience_conditions_raw: holdout.audience_conditions_raw.clone(),
                variations: holdout.variations.clone(),
                forced_variations: HashMap::new(),
                traffic_allocation: holdout.traffic_allocation.clone(),
                group_id: None,
                cmab: None,
            };
            return Some(
                Decision::variation(holdout_as_experiment, variation.clone(), DecisionSource::Holdout)
                    .with_reason(include_reasons, format!("bucketed into holdout `{}`", holdout.key)),
            );
        }
        None
    }

    /// Steps 3–8 of spec §4.5 for a single feature experiment.
    fn decide_experiment(
        &self,
        config: &ProjectConfig,
        user: &UserContext,
        flag_key: &str,
        experiment: &Experiment,
        attributes: &HashMap<String, Value>,
        options: DecideOptions,
    ) -> Option<Decision> {
        let include_reasons = options.include_reasons();

        if !experiment.status.is_running() {
            return None;
        }

        if let Some(variation) = resolve_forced_decision(user, flag_key, Some(&experiment.id), &experiment.variations) {
            debug!("user `{}` has a forced decision for experiment `{}`", user.user_id, experiment.key);
            return Some(
                Decision::variation(experiment.clone(), variation.clone(), DecisionSource::FeatureTest)
                    .with_reason(include_reasons, format!("forced decision for experiment `{}`", experiment.key)),
            );
        }

        if let Some(variation) = resolve_whitelist(experiment, &user.user_id) {
            debug!("user `{}` is whitelisted into experiment `{}`", user.user_id, experiment.key);
            return Some(
                Decision::variation(experiment.clone(), variation.clone(), DecisionSource::FeatureTest)
                    .with_reason(include_reasons, format!("whitelisted into experiment `{}`", experiment.key)),
            );
        }

        if !options.ignore_user_profile_service() {
            if let Some(variation) = self.lookup_sticky_variation(experiment, user, attributes) {
                debug!("user `{}` has a sticky bucketing entry for experiment `{}`", user.user_id, experiment.key);
                return Some(
                    Decision::variation(experiment.clone(), variation.clone(), DecisionSource::FeatureTest)
                        .with_reason(include_reasons, format!("previously bucketed into experiment `{}`", experiment.key)),
                );
            }
        }

        let conditions = rule_conditions(&experiment.audience_conditions_raw);
        let meets_audience = resolve_audience(
            conditions.as_ref(),
            &experiment.audience_ids,
            &config.audiences_by_id,
            attributes,
            user,
        );
        if !meets_audience {
            return None;
        }

        let variation = self.bucket_experiment(config, user, experiment, attributes)?;

        if !options.ignore_user_profile_service() {
            self.save_sticky_variation(experiment, user, &variation.id);
        }

        Some(
            Decision::variation(experiment.clone(), variation, DecisionSource::FeatureTest)
                .with_reason(include_reasons, format!("bucketed into experiment `{}`", experiment.key)),
        )
    }

    /// Spec §4.5 step 8: CMAB prediction when the experiment carries a CMAB
    /// configuration, else ordinary group+experiment bucketing.
    fn bucket_experiment(
        &self,
        config: &ProjectConfig,
        user: &UserContext,
        experiment: &Experiment,
        attributes: &HashMap<String, Value>,
    ) -> Option<Variation> {
        let bucketing_id = resolve_bucketing_id(&user.user_id, attributes).to_string();

        if let Some(cmab) = &experiment.cmab {
            let client = self.cmab_client.as_ref()?;
            let cmab_attributes: HashMap<String, Value> = attributes
                .iter()
                .filter(|(key, _)| cmab.attribute_ids.contains(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let cmab_uuid = uuid::Uuid::new_v4().to_string();
            return match client.fetch_decision(&experiment.id, &user.user_id, &cmab_attributes, &cmab_uuid) {
                Ok(variation_id) => ProjectConfig::variation_in(&experiment.variations, &variation_id).cloned(),
                Err(e) => {
                    warn!("cmab prediction failed for experiment `{}`: {e}", experiment.key);
                    None
                }
            };
        }

        let group = experiment
            .group_id
            .as_ref()
            .and_then(|id| config.groups_by_id.get(id))
            .map(|group| GroupBucketingInput {
                group_id: &group.id,
                traffic_allocation: &group.traffic_allocation,
            });
        let variation_id = bucket_experiment_in_group(&bucketing_id, &experiment.id, &experiment.traffic_allocation, group.as_ref())?;
        ProjectConfig::variation_in(&experiment.variations, &variation_id).cloned()
    }

    /// Step 6: the `$opt_experiment_bucket_map` attribute takes precedence
    /// over a user-profile-service-sourced entry for the same experiment id.
    fn lookup_sticky_variation(&self, experiment: &Experiment, user: &UserContext, attributes: &HashMap<String, Value>) -> Option<Variation> {
        if let Some(bucket_map_attr) = attributes.get(EXPERIMENT_BUCKET_MAP_ATTRIBUTE) {
            let bucket_map = parse_experiment_bucket_map_attribute(bucket_map_attr);
            if let Some(entry) = bucket_map.get(&experiment.id) {
                if let Some(variation) = ProjectConfig::variation_in(&experiment.variations, &entry.variation_id) {
                    return Some(variation.clone());
                }
            }
        }

        let service = self.user_profile_service.as_ref()?;
        match service.lookup(&user.user_id) {
            Ok(Some(profile)) => {
                let variation_id = profile.variation_for(&experiment.id)?;
                match ProjectConfig::variation_in(&experiment.variations, variation_id) {
                    Some(variation) => Some(variation.clone()),
                    None => {
                        warn!(
                            "stored variation `{variation_id}` for experiment `{}` no longer exists; discarding",
                            experiment.key
                        );
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("user profile lookup failed for `{}`: {e}", user.user_id);
                None
            }
        }
    }

    fn save_sticky_variation(&self, experiment: &Experiment, user: &UserContext, variation_id: &str) {
        let Some(service) = self.user_profile_service.as_ref() else {
            return;
        };
        let mut profile = match service.lookup(&user.user_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::new(user.user_id.clone()),
            Err(e) => {
                warn!("user profile lookup before save failed for `{}`: {e}", user.user_id);
                UserProfile::new(user.user_id.clone())
            }
        };
        profile.set_variation(experiment.id.clone(), variation_id.to_string());
        if let Err(e) = service.save(profile) {
            warn!("user profile save failed for `{}`: {e}", user.user_id);
        }
    }

    /// Spec §4.5 step 9: walk rollout rules in order; a miss on a non-last
    /// rule skips straight to the last rule rather than trying the rest.
    fn decide_rollout(&self, config: &ProjectConfig, user: &UserContext, flag_key: &str, attributes: &HashMap<String, Value>, options: DecideOptions) -> Decision {
        let include_reasons = options.include_reasons();
        let Some(rules) = config.rollout_for_flag(flag_key) else {
            return Decision::null(DecisionSource::Rollout).with_reason(include_reasons, "no rollout for this flag".to_string());
        };
        if rules.is_empty() {
            return Decision::null(DecisionSource::Rollout).with_reason(include_reasons, "rollout has no rules".to_string());
        }

        let last_index = rules.len() - 1;
        let mut index = 0;
        loop {
            let rule = &rules[index];
            let is_last = index == last_index;

            if let Some(variation) = resolve_forced_decision(user, flag_key, Some(&rule.id), &rule.variations) {
                return Decision::variation(rule.clone(), variation.clone(), DecisionSource::Rollout)
                    .with_reason(include_reasons, format!("forced decision for rollout rule `{}`", rule.key));
            }

            let conditions = rule_conditions(&rule.audience_conditions_raw);
            let meets_audience = resolve_audience(conditions.as_ref(), &rule.audience_ids, &config.audiences_by_id, attributes, user);

            if meets_audience {
                let bucketing_id = resolve_bucketing_id(&user.user_id, attributes);
                if let Some(variation_id) = bucket_experiment_in_group(bucketing_id, &rule.id, &rule.traffic_allocation, None) {
                    if let Some(variation) = ProjectConfig::variation_in(&rule.variations, &variation_id) {
                        return Decision::variation(rule.clone(), variation.clone(), DecisionSource::Rollout)
                            .with_reason(include_reasons, format!("bucketed into rollout rule `{}`", rule.key));
                    }
                }
                if is_last {
                    break;
                }
                index = last_index;
                continue;
            }

            if is_last {
                break;
            }
            index += 1;
        }

        Decision::null(DecisionSource::Rollout).with_reason(include_reasons, "no rollout rule produced a variation".to_string())
    }
}

fn rule_conditions(raw: &Value) -> Option<crate::audience::ConditionExpr> {
    if raw.is_null() {
        None
    } else {
        Some(decode_conditions(raw))
    }
}

#[cfg(test)]
mod service_tests;
