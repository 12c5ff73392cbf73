//! ODP configuration state machine (spec §3, §4.7), grounded on
//! `optimizely/odp/odp_config.py`.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdpConfigState {
    Undetermined,
    Integrated,
    NotIntegrated,
}

#[derive(Debug, Default)]
struct OdpConfigFields {
    api_key: Option<String>,
    api_host: Option<String>,
    segments_to_check: Vec<String>,
}

/// Atomic holder for the ODP integration triple, guarded by a single mutex
/// (spec §4.7, §5). `update` reports whether anything actually changed so
/// callers can decide whether to flush queued events.
pub struct OdpConfig {
    fields: Mutex<OdpConfigFields>,
    state: Mutex<OdpConfigState>,
}

impl Default for OdpConfig {
    fn default() -> Self {
        OdpConfig {
            fields: Mutex::new(OdpConfigFields::default()),
            state: Mutex::new(OdpConfigState::Undetermined),
        }
    }
}

impl OdpConfig {
    pub fn new(api_key: Option<String>, api_host: Option<String>, segments_to_check: Vec<String>) -> Self {
        let state = if api_key.is_some() && api_host.is_some() {
            OdpConfigState::Integrated
        } else {
            OdpConfigState::Undetermined
        };
        OdpConfig {
            fields: Mutex::new(OdpConfigFields {
                api_key,
                api_host,
                segments_to_check,
            }),
            state: Mutex::new(state),
        }
    }

    /// Overrides the configuration. Returns `true` iff any field differs
    /// from the previous value (spec §4.7).
    pub fn update(&self, api_key: Option<String>, api_host: Option<String>, segments_to_check: Vec<String>) -> bool {
        let mut fields = self.fields.lock().expect("odp config fields lock poisoned");
        let mut state = self.state.lock().expect("odp config state lock poisoned");

        *state = if api_key.is_some() && api_host.is_some() {
            OdpConfigState::Integrated
        } else {
            OdpConfigState::NotIntegrated
        };

        let changed = fields.api_key != api_key || fields.api_host != api_host || fields.segments_to_check != segments_to_check;
        if changed {
            fields.api_key = api_key;
            fields.api_host = api_host;
            fields.segments_to_check = segments_to_check;
        }
        changed
    }

    pub fn api_host(&self) -> Option<String> {
        self.fields.lock().expect("odp config fields lock poisoned").api_host.clone()
    }

    pub fn api_key(&self) -> Option<String> {
        self.fields.lock().expect("odp config fields lock poisoned").api_key.clone()
    }

    pub fn segments_to_check(&self) -> Vec<String> {
        self.fields
            .lock()
            .expect("odp config fields lock poisoned")
            .segments_to_check
            .clone()
    }

    pub fn state(&self) -> OdpConfigState {
        *self.state.lock().expect("odp config state lock poisoned")
    }

    pub fn is_integrated(&self) -> bool {
        self.state() == OdpConfigState::Integrated
    }
}
