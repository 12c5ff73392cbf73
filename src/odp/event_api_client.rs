//! REST event ingest client (spec §4.9, §6), grounded on
//! `optimizely/odp/zaius_rest_api_manager.py`.

use std::time::Duration;

use log::error;

use crate::odp::event::OdpEvent;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends a batch of ODP events. Returns `true` if the caller should retry
/// (network error or 5xx), `false` otherwise (success, or a permanent 4xx).
pub trait EventApiClient: Send + Sync {
    fn send_odp_events(&self, api_key: &str, api_host: &str, events: &[OdpEvent]) -> bool;
}

pub struct DefaultEventApiClient {
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl DefaultEventApiClient {
    pub fn new() -> Result<Self, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start odp event runtime: {e}"))?;
        Ok(DefaultEventApiClient {
            http_client: reqwest::Client::new(),
            runtime,
        })
    }
}

impl EventApiClient for DefaultEventApiClient {
    fn send_odp_events(&self, api_key: &str, api_host: &str, events: &[OdpEvent]) -> bool {
        let url = format!("{api_host}/v3/events");
        let client = &self.http_client;

        let result = self.runtime.block_on(async {
            client
                .post(&url)
                .header("content-type", "application/json")
                .header("x-api-key", api_key)
                .json(events)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
        });

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    false
                } else if status.is_server_error() {
                    error!("odp event send failed with server error {status}");
                    true
                } else {
                    error!("odp event send failed with client error {status}");
                    false
                }
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                error!("odp event send network error: {e}");
                true
            }
            Err(e) => {
                error!("odp event send failed: {e}");
                false
            }
        }
    }
}
