//! GraphQL-backed qualified-segment fetch (spec §4.8, §6), grounded on
//! `optimizely/odp/zaius_graphql_api_manager.py`.

use std::time::Duration;

use log::{debug, error};
use serde_json::Value;

use crate::errors::{XDecideError, XDecideResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const INVALID_IDENTIFIER_EXCEPTION: &str = "INVALID_IDENTIFIER_EXCEPTION";

/// Fetches qualified segments for a user from ODP. Implemented as a trait so
/// the segment manager can be tested without a live network dependency.
pub trait SegmentApiClient: Send + Sync {
    fn fetch_segments(
        &self,
        api_key: &str,
        api_host: &str,
        user_key: &str,
        user_value: &str,
        segments_to_check: &[String],
    ) -> XDecideResult<Vec<String>>;
}

pub struct DefaultSegmentApiClient {
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl DefaultSegmentApiClient {
    pub fn new() -> XDecideResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| XDecideError::InvalidInput(format!("failed to start odp segment runtime: {e}")))?;
        Ok(DefaultSegmentApiClient {
            http_client: reqwest::Client::new(),
            runtime,
        })
    }
}

fn make_subset_filter(segments: &[String]) -> String {
    if segments.is_empty() {
        return "(subset:[])".to_string();
    }
    let quoted: Vec<String> = segments.iter().map(|s| format!("\"{s}\"")).collect();
    format!("(subset:[{}])", quoted.join(", "))
}

impl SegmentApiClient for DefaultSegmentApiClient {
    fn fetch_segments(
        &self,
        api_key: &str,
        api_host: &str,
        user_key: &str,
        user_value: &str,
        segments_to_check: &[String],
    ) -> XDecideResult<Vec<String>> {
        let url = format!("{api_host}/v3/graphql");
        let query = format!(
            "query {{customer({user_key}: \"{user_value}\") {{audiences{} {{edges {{node {{name state}}}}}}}}}}",
            make_subset_filter(segments_to_check)
        );
        let payload = serde_json::json!({ "query": query });

        let client = &self.http_client;
        let response_body: Result<Value, String> = self.runtime.block_on(async {
            let response = client
                .post(&url)
                .header("content-type", "application/json")
                .header("x-api-key", api_key)
                .json(&payload)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(|e| format!("network error: {e}"))?;

            let status = response.status();
            let body: Value = response.json().await.map_err(|e| format!("decode error: {e}"))?;
            if !status.is_success() {
                return Err(format!("http status {status}"));
            }
            Ok(body)
        });

        let body = response_body.map_err(|msg| {
            error!("fetch_qualified_segments failed: {msg}");
            XDecideError::OdpRequestFailed(msg)
        })?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            let code = errors
                .first()
                .and_then(|e| e.get("extensions"))
                .and_then(|e| e.get("code"))
                .and_then(Value::as_str);
            return match code {
                Some(INVALID_IDENTIFIER_EXCEPTION) => {
                    debug!("odp reported an unknown user identifier; treating as no segments");
                    Ok(Vec::new())
                }
                Some(other) => Err(XDecideError::OdpRequestFailed(other.to_string())),
                None => Err(XDecideError::OdpRequestFailed("decode error".to_string())),
            };
        }

        let edges = body
            .pointer("/data/customer/audiences/edges")
            .and_then(Value::as_array)
            .ok_or_else(|| XDecideError::OdpRequestFailed("decode error".to_string()))?;

        let segments = edges
            .iter()
            .filter_map(|edge| {
                let node = edge.get("node")?;
                let state = node.get("state")?.as_str()?;
                if state == "qualified" {
                    node.get("name")?.as_str().map(String::from)
                } else {
                    None
                }
            })
            .collect();

        Ok(segments)
    }
}
