//! Cache-through qualified-segment manager (spec §4.8), grounded on
//! `optimizely/odp/odp_segment_manager.py`.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::decision::SegmentOptions;
use crate::errors::{XDecideError, XDecideResult};
use crate::odp::config::OdpConfig;
use crate::odp::lru_cache::{segment_cache_key, LruTtlCache};
use crate::odp::segment_api_client::SegmentApiClient;

pub struct OdpSegmentManager {
    odp_config: Arc<OdpConfig>,
    cache: LruTtlCache<Vec<String>>,
    api_client: Box<dyn SegmentApiClient>,
}

impl OdpSegmentManager {
    pub fn new(odp_config: Arc<OdpConfig>, cache_capacity: usize, cache_timeout: Duration, api_client: Box<dyn SegmentApiClient>) -> Self {
        OdpSegmentManager {
            odp_config,
            cache: LruTtlCache::new(cache_capacity, cache_timeout),
            api_client,
        }
    }

    /// Spec §4.8 step by step: require credentials, short-circuit an empty
    /// segment list, consult the cache unless bypassed, and on a fresh
    /// network fetch cache the result (never a failure).
    pub fn fetch_qualified_segments(&self, user_key: &str, user_value: &str, options: SegmentOptions) -> XDecideResult<Vec<String>> {
        let api_key = self.odp_config.api_key();
        let api_host = self.odp_config.api_host();
        let (api_key, api_host) = match (api_key, api_host) {
            (Some(k), Some(h)) => (k, h),
            _ => return Err(XDecideError::OdpNotIntegrated),
        };

        let segments_to_check = self.odp_config.segments_to_check();
        if segments_to_check.is_empty() {
            debug!("no segments configured for this project; returning empty list");
            return Ok(Vec::new());
        }

        let cache_key = segment_cache_key(user_key, user_value);
        let ignore_cache = options.contains(SegmentOptions::IGNORE_CACHE);
        let reset_cache = options.contains(SegmentOptions::RESET_CACHE);

        if reset_cache {
            self.cache.reset();
        }

        if !ignore_cache && !reset_cache {
            if let Some(segments) = self.cache.lookup(&cache_key) {
                debug!("odp cache hit");
                return Ok(segments);
            }
        }

        debug!("making a call to odp server");
        let segments = self.api_client.fetch_segments(&api_key, &api_host, user_key, user_value, &segments_to_check)?;

        if !ignore_cache {
            self.cache.save(&cache_key, segments.clone());
        }

        Ok(segments)
    }
}

#[cfg(test)]
mod segment_manager_tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSegmentClient {
        calls: Arc<Mutex<u32>>,
        response: XDecideResult<Vec<String>>,
    }

    impl SegmentApiClient for FakeSegmentClient {
        fn fetch_segments(
            &self,
            _api_key: &str,
            _api_host: &str,
            _user_key: &str,
            _user_value: &str,
            _segments_to_check: &[String],
        ) -> XDecideResult<Vec<String>> {
            *self.calls.lock().unwrap() += 1;
            self.response.clone()
        }
    }

    fn integrated_config() -> Arc<OdpConfig> {
        let config = Arc::new(OdpConfig::default());
        config.update(Some("key".into()), Some("host".into()), vec!["a".into(), "b".into()]);
        config
    }

    #[test]
    fn requires_api_key_and_host() {
        let config = Arc::new(OdpConfig::default());
        let client = FakeSegmentClient {
            calls: Arc::new(Mutex::new(0)),
            response: Ok(vec![]),
        };
        let manager = OdpSegmentManager::new(config, 10, Duration::from_secs(60), Box::new(client));
        let result = manager.fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::default());
        assert_eq!(result, Err(XDecideError::OdpNotIntegrated));
    }

    #[test]
    fn empty_segments_to_check_short_circuits_network() {
        let config = Arc::new(OdpConfig::default());
        config.update(Some("key".into()), Some("host".into()), vec![]);
        let client = FakeSegmentClient {
            calls: Arc::new(Mutex::new(0)),
            response: Ok(vec!["a".to_string()]),
        };
        let manager = OdpSegmentManager::new(config, 10, Duration::from_secs(60), Box::new(client));
        let result = manager.fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn second_call_hits_cache_without_network() {
        let calls = Arc::new(Mutex::new(0));
        let client = FakeSegmentClient {
            calls: calls.clone(),
            response: Ok(vec!["a".to_string()]),
        };
        let manager = OdpSegmentManager::new(integrated_config(), 10, Duration::from_secs(60), Box::new(client));

        let first = manager.fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::default()).unwrap();
        let second = manager.fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::default()).unwrap();
        assert_eq!(first, vec!["a".to_string()]);
        assert_eq!(second, vec!["a".to_string()]);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn ignore_cache_refetches_without_overwriting_cache() {
        let client = FakeSegmentClient {
            calls: Arc::new(Mutex::new(0)),
            response: Ok(vec!["a".to_string()]),
        };
        let manager = OdpSegmentManager::new(integrated_config(), 10, Duration::from_secs(60), Box::new(client));

        manager.fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::default()).unwrap();
        manager
            .fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::IGNORE_CACHE)
            .unwrap();
        // Cache still holds the original value from the first (cached) call.
        assert_eq!(manager.cache.peek(&segment_cache_key("fs_user_id", "u1")), Some(vec!["a".to_string()]));
    }

    #[test]
    fn network_failure_is_not_cached() {
        let client = FakeSegmentClient {
            calls: Arc::new(Mutex::new(0)),
            response: Err(XDecideError::OdpRequestFailed("boom".to_string())),
        };
        let manager = OdpSegmentManager::new(integrated_config(), 10, Duration::from_secs(60), Box::new(client));
        let result = manager.fetch_qualified_segments("fs_user_id", "u1", SegmentOptions::default());
        assert!(result.is_err());
        assert_eq!(manager.cache.peek(&segment_cache_key("fs_user_id", "u1")), None);
    }
}
