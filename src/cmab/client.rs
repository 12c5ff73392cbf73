//! Contextual multi-armed bandit prediction client (spec §4.10), grounded on
//! `optimizely/cmab/cmab_client.py`'s `DefaultCmabClient`/`CmabRetryConfig`.

use std::collections::HashMap;
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{XDecideError, XDecideResult};

const CMAB_PREDICTION_ENDPOINT: &str = "https://prediction.cmab.optimizely.com/predict";
const MAX_WAIT_TIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct CmabRetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for CmabRetryConfig {
    fn default() -> Self {
        CmabRetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct CmabAttribute<'a> {
    id: &'a str,
    value: &'a Value,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct CmabInstance<'a> {
    #[serde(rename = "visitorId")]
    visitor_id: &'a str,
    #[serde(rename = "experimentId")]
    experiment_id: &'a str,
    attributes: Vec<CmabAttribute<'a>>,
    #[serde(rename = "cmabUUID")]
    cmab_uuid: &'a str,
}

#[derive(Debug, Serialize)]
struct CmabRequestBody<'a> {
    instances: [CmabInstance<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct CmabPrediction {
    variation_id: String,
}

#[derive(Debug, Deserialize)]
struct CmabResponseBody {
    #[serde(default)]
    predictions: Vec<CmabPrediction>,
}

/// A client capable of fetching a CMAB variation prediction. An explicit
/// trait (rather than a concrete `reqwest::Client` dependency everywhere) so
/// the decision service can be exercised with a fake in tests, per Design
/// Notes §9's "explicit capability interfaces" pattern.
pub trait CmabClient: Send + Sync {
    fn fetch_decision(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &HashMap<String, Value>,
        cmab_uuid: &str,
    ) -> XDecideResult<String>;
}

/// HTTP-backed `CmabClient` (spec §4.10, §6). Reuses a single-threaded tokio
/// runtime to `block_on` the async `reqwest` call, keeping `fetch_decision`
/// a synchronous call so it slots directly into the (synchronous) decision
/// pipeline.
pub struct DefaultCmabClient {
    http_client: reqwest::Client,
    retry_config: Option<CmabRetryConfig>,
    runtime: tokio::runtime::Runtime,
}

impl DefaultCmabClient {
    pub fn new(retry_config: Option<CmabRetryConfig>) -> XDecideResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| XDecideError::InvalidInput(format!("failed to start cmab runtime: {e}")))?;
        Ok(DefaultCmabClient {
            http_client: reqwest::Client::new(),
            retry_config,
            runtime,
        })
    }

    fn do_fetch(&self, rule_id: &str, user_id: &str, attributes: &HashMap<String, Value>, cmab_uuid: &str) -> Option<String> {
        let cmab_attributes: Vec<CmabAttribute> = attributes
            .iter()
            .map(|(key, value)| CmabAttribute {
                id: key,
                value,
                kind: "custom_attribute",
            })
            .collect();
        let body = CmabRequestBody {
            instances: [CmabInstance {
                visitor_id: user_id,
                experiment_id: rule_id,
                attributes: cmab_attributes,
                cmab_uuid,
            }],
        };
        let url = format!("{CMAB_PREDICTION_ENDPOINT}/{rule_id}");

        let client = &self.http_client;
        let result = self.runtime.block_on(async {
            let response = client.post(&url).json(&body).timeout(MAX_WAIT_TIME).send().await?;
            if !response.status().is_success() {
                error!("CMAB request failed with status code: {}", response.status());
                return Ok::<Option<String>, reqwest::Error>(None);
            }
            let parsed: Result<CmabResponseBody, reqwest::Error> = response.json().await;
            Ok(parsed.ok().and_then(|b| b.predictions.into_iter().next()).map(|p| p.variation_id))
        });

        match result {
            Ok(variation_id) => variation_id,
            Err(e) => {
                error!("error fetching cmab decision: {e}");
                None
            }
        }
    }

    fn do_fetch_with_retry(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &HashMap<String, Value>,
        cmab_uuid: &str,
        retry_config: CmabRetryConfig,
    ) -> Option<String> {
        let mut backoff = retry_config.initial_backoff;
        for attempt in 0..=retry_config.max_retries {
            if let Some(variation_id) = self.do_fetch(rule_id, user_id, attributes, cmab_uuid) {
                return Some(variation_id);
            }
            if attempt < retry_config.max_retries {
                info!("retrying cmab request (attempt: {}) after {backoff:?}", attempt + 1);
                std::thread::sleep(backoff);
                backoff = next_backoff(backoff, attempt, retry_config);
            }
        }
        error!("exhausted all retries for cmab request");
        None
    }
}

/// `min(backoff * multiplier^(attempt+1), max_backoff)`, per spec §4.10.
fn next_backoff(backoff: Duration, attempt: u32, retry_config: CmabRetryConfig) -> Duration {
    let scaled = backoff.as_secs_f64() * retry_config.backoff_multiplier.powi((attempt + 1) as i32);
    Duration::from_secs_f64(scaled.min(retry_config.max_backoff.as_secs_f64()))
}

impl CmabClient for DefaultCmabClient {
    fn fetch_decision(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &HashMap<String, Value>,
        cmab_uuid: &str,
    ) -> XDecideResult<String> {
        let variation_id = match self.retry_config {
            Some(retry_config) => self.do_fetch_with_retry(rule_id, user_id, attributes, cmab_uuid, retry_config),
            None => self.do_fetch(rule_id, user_id, attributes, cmab_uuid),
        };
        variation_id.ok_or_else(|| XDecideError::CmabRequestFailed(format!("no prediction for rule {rule_id}")))
    }
}

#[cfg(test)]
mod client_tests;
