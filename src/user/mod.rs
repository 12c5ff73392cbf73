pub mod context;
pub mod profile;

pub use context::{ForcedDecisionKey, UserContext};
pub use profile::{
    parse_experiment_bucket_map_attribute, ExperimentBucketEntry, InMemoryUserProfileService, UserProfile,
    UserProfileService, EXPERIMENT_BUCKET_MAP_ATTRIBUTE,
};
