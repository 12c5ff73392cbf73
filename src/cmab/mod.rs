pub mod client;

pub use client::{CmabClient, CmabRetryConfig, DefaultCmabClient};
