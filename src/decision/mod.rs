pub mod forced;
pub mod options;
pub mod service;
pub mod types;

pub use forced::{resolve_forced_decision, resolve_whitelist};
pub use options::{DecideOptions, SegmentOptions};
pub use service::DecisionService;
pub use types::{Decision, DecisionSource};
