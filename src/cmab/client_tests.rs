use super::*;

#[test]
fn backoff_grows_and_caps_at_max() {
    let config = CmabRetryConfig {
        max_retries: 5,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
        backoff_multiplier: 2.0,
    };
    let first = next_backoff(config.initial_backoff, 0, config);
    assert_eq!(first, Duration::from_millis(200));

    let second = next_backoff(first, 1, config);
    assert_eq!(second, Duration::from_millis(800));

    // Would be 3.2s uncapped; clamps to max_backoff.
    let third = next_backoff(second, 2, config);
    assert_eq!(third, Duration::from_secs(1));
}

#[test]
fn default_retry_config_matches_spec_constants() {
    let config = CmabRetryConfig::default();
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.initial_backoff, Duration::from_millis(100));
    assert_eq!(config.max_backoff, Duration::from_secs(10));
    assert_eq!(config.backoff_multiplier, 2.0);
}

struct FakeCmabClient {
    response: XDecideResult<String>,
}

impl CmabClient for FakeCmabClient {
    fn fetch_decision(
        &self,
        _rule_id: &str,
        _user_id: &str,
        _attributes: &HashMap<String, Value>,
        _cmab_uuid: &str,
    ) -> XDecideResult<String> {
        self.response.clone()
    }
}

#[test]
fn fake_client_satisfies_trait_object_usage() {
    let fake = FakeCmabClient {
        response: Ok("var_1".to_string()),
    };
    let boxed: Box<dyn CmabClient> = Box::new(fake);
    let result = boxed.fetch_decision("rule_1", "user_1", &HashMap::new(), "uuid-1");
    assert_eq!(result.unwrap(), "var_1");
}
