pub mod config;
pub mod event;
pub mod event_api_client;
pub mod event_manager;
pub mod lru_cache;
pub mod segment_api_client;
pub mod segment_manager;

pub use config::{OdpConfig, OdpConfigState};
pub use event::{OdpEvent, KEY_FOR_USER_ID};
pub use event_api_client::{DefaultEventApiClient, EventApiClient};
pub use event_manager::{OdpEventManager, OdpEventManagerOptions, Signal};
pub use lru_cache::{segment_cache_key, LruTtlCache};
pub use segment_api_client::{DefaultSegmentApiClient, SegmentApiClient};
pub use segment_manager::OdpSegmentManager;
