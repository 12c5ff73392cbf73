//! ODP event shape (spec §3, §4.9), grounded on `optimizely/odp/odp_event.py`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The identifier key events are canonicalized to, regardless of how the
/// caller spelled it (`fs-user-id`, `FS_USER_ID`, ...).
pub const KEY_FOR_USER_ID: &str = "fs_user_id";

const SDK_NAME: &str = "xdecide-core";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdpEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub action: String,
    pub identifiers: HashMap<String, String>,
    pub data: HashMap<String, Value>,
}

impl OdpEvent {
    /// Builds an event, normalizing identifier keys and merging in the SDK
    /// identifying fields plus a freshly generated idempotence id (spec §3).
    pub fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        identifiers: HashMap<String, String>,
        data: HashMap<String, Value>,
    ) -> Self {
        OdpEvent {
            event_type: event_type.into(),
            action: action.into(),
            identifiers: normalize_identifiers(identifiers),
            data: with_common_event_data(data),
        }
    }
}

fn with_common_event_data(mut data: HashMap<String, Value>) -> HashMap<String, Value> {
    data.entry("idempotence_id".to_string())
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    data.entry("data_source_type".to_string())
        .or_insert_with(|| Value::String("sdk".to_string()));
    data.entry("data_source".to_string())
        .or_insert_with(|| Value::String(SDK_NAME.to_string()));
    data.entry("data_source_version".to_string())
        .or_insert_with(|| Value::String(SDK_VERSION.to_string()));
    data
}

/// Canonicalizes a key matching `fs_user_id` case- or dash-insensitively to
/// the exact `fs_user_id` spelling (spec §4.9).
fn normalize_identifiers(identifiers: HashMap<String, String>) -> HashMap<String, String> {
    let mut normalized = HashMap::with_capacity(identifiers.len());
    let mut canonical_value: Option<String> = None;
    for (key, value) in identifiers {
        if key == KEY_FOR_USER_ID {
            canonical_value = Some(value);
            continue;
        }
        let lowered = key.to_lowercase().replace('-', "_");
        if lowered == KEY_FOR_USER_ID {
            canonical_value = Some(value);
            continue;
        }
        normalized.insert(key, value);
    }
    if let Some(value) = canonical_value {
        normalized.insert(KEY_FOR_USER_ID.to_string(), value);
    }
    normalized
}
