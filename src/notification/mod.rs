//! Notification hub (spec §4.12): multicast of decision/config/track events
//! to registered listeners, grounded on `optimizely/event_listener.py`'s
//! type-keyed registry and Design Notes §9 ("duck-typed protocols" replaced
//! with explicit capability interfaces — here, typed payload enums).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::error;
use serde::Serialize;

use crate::decision::{Decision, DecisionSource};

/// The six notification types spec §4.12 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    Activate,
    Track,
    Decision,
    ConfigUpdate,
    Log,
    OdpEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateNotification {
    pub experiment_key: String,
    pub user_id: String,
    pub variation_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackNotification {
    pub event_key: String,
    pub user_id: String,
    pub event_tags: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionNotification {
    pub flag_key: String,
    pub user_id: String,
    pub variation_key: Option<String>,
    pub source: DecisionSource,
    pub enabled: bool,
}

impl DecisionNotification {
    pub fn from_decision(flag_key: &str, user_id: &str, decision: &Decision) -> Self {
        DecisionNotification {
            flag_key: flag_key.to_string(),
            user_id: user_id.to_string(),
            variation_key: decision.variation.as_ref().map(|v| v.key.clone()),
            source: decision.source,
            enabled: decision
                .variation
                .as_ref()
                .and_then(|v| v.feature_enabled)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigUpdateNotification {
    pub revision: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OdpEventNotification {
    pub event_type: String,
    pub action: String,
}

/// The payload carried by a single `send` call, one variant per
/// `NotificationType`.
#[derive(Debug, Clone)]
pub enum NotificationPayload {
    Activate(ActivateNotification),
    Track(TrackNotification),
    Decision(DecisionNotification),
    ConfigUpdate(ConfigUpdateNotification),
    Log(LogEvent),
    OdpEvent(OdpEventNotification),
}

pub type Listener = Arc<dyn Fn(&NotificationPayload) + Send + Sync>;

/// Registry of listeners keyed by notification type (spec §4.12). Cloning a
/// `NotificationHub` shares the same registry (it's an `Arc<Mutex<..>>>`
/// underneath), matching how the config manager and decision service both
/// need a handle to the same hub.
#[derive(Clone, Default)]
pub struct NotificationHub {
    listeners: Arc<Mutex<HashMap<NotificationType, Vec<(u64, Listener)>>>>,
    next_id: Arc<Mutex<u64>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `notification_type`, returning an id usable
    /// to remove just this listener later.
    pub fn subscribe(&self, notification_type: NotificationType, listener: Listener) -> u64 {
        let mut next_id = self.next_id.lock().expect("notification id lock poisoned");
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let mut listeners = self.listeners.lock().expect("notification listeners lock poisoned");
        listeners.entry(notification_type).or_default().push((id, listener));
        id
    }

    /// Invokes every listener registered for `payload`'s type with a
    /// snapshot of the listener list. A panicking or erroring listener is
    /// caught and logged; it does not stop the remaining listeners (spec
    /// §4.12).
    pub fn send(&self, notification_type: NotificationType, payload: NotificationPayload) {
        let snapshot = {
            let listeners = self.listeners.lock().expect("notification listeners lock poisoned");
            listeners.get(&notification_type).cloned().unwrap_or_default()
        };
        for (id, listener) in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&payload)));
            if result.is_err() {
                error!("notification listener {id} for {notification_type:?} panicked");
            }
        }
    }

    pub fn clear(&self, notification_type: NotificationType) {
        let mut listeners = self.listeners.lock().expect("notification listeners lock poisoned");
        listeners.remove(&notification_type);
    }

    pub fn clear_all(&self) {
        let mut listeners = self.listeners.lock().expect("notification listeners lock poisoned");
        listeners.clear();
    }

    pub fn remove(&self, notification_type: NotificationType, id: u64) {
        let mut listeners = self.listeners.lock().expect("notification listeners lock poisoned");
        if let Some(list) = listeners.get_mut(&notification_type) {
            list.retain(|(entry_id, _)| *entry_id != id);
        }
    }
}
