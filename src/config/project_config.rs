//! Compiled project configuration (spec §3): dual key/id indexes and the
//! precomputed maps the decision service walks without re-scanning the
//! datafile on every call.

use std::collections::HashMap;

use log::warn;

use crate::audience::ParsedAudience;
use crate::config::datafile::{self, Datafile, Experiment, FeatureFlag, Group, Holdout, Rollout, Variation};
use crate::errors::{XDecideError, XDecideResult};

/// An immutable, indexed snapshot of a datafile (spec §3). Built once by
/// `ProjectConfig::compile` and held behind `arc_swap::ArcSwap` by the config
/// manager; readers take one snapshot per `decide` call.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub revision: String,
    pub sdk_key: Option<String>,
    pub environment_key: Option<String>,
    pub account_id: String,
    pub project_id: String,

    pub experiments_by_key: HashMap<String, Experiment>,
    pub experiments_by_id: HashMap<String, Experiment>,
    pub feature_flags_by_key: HashMap<String, FeatureFlag>,
    pub feature_flags_by_id: HashMap<String, FeatureFlag>,
    pub audiences_by_id: HashMap<String, ParsedAudience>,
    pub rollouts_by_id: HashMap<String, Rollout>,
    pub groups_by_id: HashMap<String, Group>,
    pub holdouts_by_id: HashMap<String, Holdout>,

    /// flag id -> experiments (in datafile order) that reference it.
    pub flag_experiments: HashMap<String, Vec<Experiment>>,
    /// flag id -> holdouts that apply to it (global, or opted-in minus
    /// opted-out), in datafile order.
    pub flag_holdouts: HashMap<String, Vec<Holdout>>,
    /// experiment id -> the group it belongs to, if any.
    pub experiment_group: HashMap<String, Group>,
    /// rollout id -> its experiments in rule order.
    pub rollout_experiments: HashMap<String, Vec<Experiment>>,
}

impl ProjectConfig {
    /// Parses and compiles a raw datafile body into an indexed
    /// `ProjectConfig`, checking the invariants named in spec §3. A violated
    /// invariant is logged and the offending reference is dropped rather
    /// than failing the whole parse, except for duplicate keys, which spec
    /// §3 explicitly says resolve by "first wins".
    pub fn compile(raw: &str) -> XDecideResult<ProjectConfig> {
        let datafile = Datafile::parse(raw).map_err(XDecideError::InvalidDatafile)?;
        Ok(Self::from_datafile(datafile))
    }

    fn from_datafile(datafile: Datafile) -> ProjectConfig {
        let mut audiences_by_id = HashMap::new();
        for audience in datafile.audiences.iter().chain(datafile.typed_audiences.iter()) {
            let conditions = datafile::decode_conditions(&audience.conditions);
            audiences_by_id.insert(
                audience.id.clone(),
                ParsedAudience {
                    id: audience.id.clone(),
                    name: audience.name.clone(),
                    conditions,
                },
            );
        }
        // typed_audiences overrides by id (spec §3): re-insert after the
        // base pass so typed entries win on key collision.
        for audience in &datafile.typed_audiences {
            let conditions = datafile::decode_conditions(&audience.conditions);
            audiences_by_id.insert(
                audience.id.clone(),
                ParsedAudience {
                    id: audience.id.clone(),
                    name: audience.name.clone(),
                    conditions,
                },
            );
        }

        let mut experiments_by_key = HashMap::new();
        let mut experiments_by_id = HashMap::new();
        insert_experiments_first_wins(&mut experiments_by_key, &mut experiments_by_id, datafile.experiments.clone());
        // Group-member experiments are also globally unique experiment
        // entities (spec §3): fold them in under the same first-wins rule.
        for group in &datafile.groups {
            insert_experiments_first_wins(&mut experiments_by_key, &mut experiments_by_id, group.experiments.clone());
        }
        for rollout in &datafile.rollouts {
            insert_experiments_first_wins(&mut experiments_by_key, &mut experiments_by_id, rollout.experiments.clone());
        }

        let mut feature_flags_by_key = HashMap::new();
        let mut feature_flags_by_id = HashMap::new();
        for flag in datafile.feature_flags {
            feature_flags_by_key.insert(flag.key.clone(), flag.clone());
            feature_flags_by_id.insert(flag.id.clone(), flag);
        }

        let mut rollouts_by_id = HashMap::new();
        let mut rollout_experiments = HashMap::new();
        for rollout in datafile.rollouts {
            rollout_experiments.insert(rollout.id.clone(), rollout.experiments.clone());
            rollouts_by_id.insert(rollout.id.clone(), rollout);
        }

        let mut groups_by_id = HashMap::new();
        let mut experiment_group = HashMap::new();
        for group in datafile.groups {
            for exp in &group.experiments {
                experiment_group.insert(exp.id.clone(), group.clone());
            }
            groups_by_id.insert(group.id.clone(), group);
        }

        let mut holdouts_by_id = HashMap::new();
        let mut holdouts_in_order = Vec::new();
        let mut seen_holdout_keys = std::collections::HashSet::new();
        for holdout in datafile.holdouts.clone() {
            if !seen_holdout_keys.insert(holdout.key.clone()) {
                warn!("duplicate holdout key `{}`: first definition wins", holdout.key);
                continue;
            }
            holdouts_by_id.insert(holdout.id.clone(), holdout.clone());
            holdouts_in_order.push(holdout);
        }

        let flag_experiments = build_flag_experiments(&feature_flags_by_id, &experiments_by_id);
        let flag_holdouts = build_flag_holdouts(&feature_flags_by_id, &holdouts_in_order);

        ProjectConfig {
            revision: datafile.revision,
            sdk_key: datafile.sdk_key,
            environment_key: datafile.environment_key,
            account_id: datafile.account_id,
            project_id: datafile.project_id,
            experiments_by_key,
            experiments_by_id,
            feature_flags_by_key,
            feature_flags_by_id,
            audiences_by_id,
            rollouts_by_id,
            groups_by_id,
            holdouts_by_id,
            flag_experiments,
            flag_holdouts,
            experiment_group,
            rollout_experiments,
        }
    }

    pub fn get_experiment_by_key(&self, key: &str) -> Option<&Experiment> {
        self.experiments_by_key.get(key)
    }

    pub fn get_experiment_by_id(&self, id: &str) -> Option<&Experiment> {
        self.experiments_by_id.get(id)
    }

    pub fn get_flag_by_key(&self, key: &str) -> Option<&FeatureFlag> {
        self.feature_flags_by_key.get(key)
    }

    pub fn get_audience(&self, id: &str) -> Option<&ParsedAudience> {
        self.audiences_by_id.get(id)
    }

    /// Experiments (in datafile order) that reference `flag_key`.
    pub fn experiments_for_flag(&self, flag_key: &str) -> &[Experiment] {
        self.feature_flags_by_key
            .get(flag_key)
            .and_then(|flag| self.flag_experiments.get(&flag.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Holdouts (in datafile order) that apply to `flag_key`, honoring
    /// include/exclude lists (spec §3).
    pub fn holdouts_for_flag(&self, flag_key: &str) -> &[Holdout] {
        self.feature_flags_by_key
            .get(flag_key)
            .and_then(|flag| self.flag_holdouts.get(&flag.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rollout_for_flag(&self, flag_key: &str) -> Option<&[Experiment]> {
        let flag = self.feature_flags_by_key.get(flag_key)?;
        let rollout_id = flag.rollout_id.as_ref()?;
        self.rollout_experiments.get(rollout_id).map(Vec::as_slice)
    }

    pub fn group_for_experiment(&self, experiment_id: &str) -> Option<&Group> {
        self.experiment_group.get(experiment_id)
    }

    pub fn variation_in(variations: &[Variation], variation_id_or_key: &str) -> Option<&Variation> {
        variations
            .iter()
            .find(|v| v.id == variation_id_or_key || v.key == variation_id_or_key)
    }
}

fn insert_experiments_first_wins(
    by_key: &mut HashMap<String, Experiment>,
    by_id: &mut HashMap<String, Experiment>,
    experiments: Vec<Experiment>,
) {
    for exp in experiments {
        if by_key.contains_key(&exp.key) {
            warn!("duplicate experiment key `{}`: first definition wins", exp.key);
            continue;
        }
        by_id.insert(exp.id.clone(), exp.clone());
        by_key.insert(exp.key.clone(), exp);
    }
}

fn build_flag_experiments(
    flags: &HashMap<String, FeatureFlag>,
    experiments: &HashMap<String, Experiment>,
) -> HashMap<String, Vec<Experiment>> {
    let mut map = HashMap::new();
    for flag in flags.values() {
        let mut list = Vec::new();
        for exp_id in &flag.experiment_ids {
            match experiments.get(exp_id) {
                Some(exp) => list.push(exp.clone()),
                None => warn!("flag `{}` references unknown experiment id `{}`", flag.key, exp_id),
            }
        }
        map.insert(flag.id.clone(), list);
    }
    map
}

fn build_flag_holdouts(
    flags: &HashMap<String, FeatureFlag>,
    holdouts_in_order: &[Holdout],
) -> HashMap<String, Vec<Holdout>> {
    let mut map = HashMap::new();
    for flag in flags.values() {
        let mut list = Vec::new();
        for holdout in holdouts_in_order {
            let is_global = holdout.included_flags.is_empty();
            let opted_in = is_global || holdout.included_flags.contains(&flag.id);
            let opted_out = holdout.excluded_flags.contains(&flag.id);
            if opted_in && !opted_out {
                list.push(holdout.clone());
            }
        }
        map.insert(flag.id.clone(), list);
    }
    map
}

#[cfg(test)]
mod project_config_tests;
