pub mod datafile;
pub mod manager;
pub mod project_config;

pub use datafile::{
    decode_conditions, Attribute, Audience, CmabConfig, Datafile, EventEntity, Experiment, ExperimentStatus,
    FeatureFlag, Group, Holdout, Rollout, Variation, VariationVariable, SUPPORTED_VERSIONS,
};
pub use manager::{ConfigManager, ConfigManagerOptions};
pub use project_config::ProjectConfig;
