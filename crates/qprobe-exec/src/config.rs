//! Execution configuration.
//!
//! Settings resolve as explicit value > environment variable > default, once,
//! before the dispatcher is built. Nothing reads the environment afterwards.

use std::env;
use std::time::Duration;

use qprobe_codec::decode_identity;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://rpc.qubic.org";
pub const DEFAULT_TICK_OFFSET: u32 = 5;
pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "QPROBE_API_URL";
pub const ENV_CONTRACT_INDEX: &str = "QPROBE_CONTRACT_INDEX";
pub const ENV_TEST_IDENTITY: &str = "QPROBE_TEST_IDENTITY";
pub const ENV_TEST_SEED: &str = "QPROBE_TEST_SEED";
pub const ENV_TICK_OFFSET: &str = "QPROBE_TICK_OFFSET";
pub const ENV_DELAY_MS: &str = "QPROBE_DELAY_MS";

/// Immutable settings threaded into the dispatcher and batch runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Base URL of the ledger HTTP API
    pub api_url: String,
    pub contract_index: u32,
    /// Destination identity; derived from `contract_index` when absent
    pub contract_address: Option<String>,
    /// Identity that signs mutation transactions
    pub test_identity: String,
    pub test_seed: String,
    /// Ticks added to the current tick when scheduling a transaction
    pub tick_offset: u32,
    /// Start-time stagger between consecutive tests
    pub delay_between_tests: Duration,
    pub request_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            contract_index: 0,
            contract_address: None,
            test_identity: String::new(),
            test_seed: String::new(),
            tick_offset: DEFAULT_TICK_OFFSET,
            delay_between_tests: Duration::from_millis(DEFAULT_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Explicitly supplied settings, typically from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub contract_index: Option<u32>,
    /// Used when neither the flag nor the environment names a contract
    pub default_contract_index: Option<u32>,
    pub contract_address: Option<String>,
    pub test_identity: Option<String>,
    pub test_seed: Option<String>,
    pub tick_offset: Option<u32>,
    pub delay_ms: Option<u64>,
}

impl ExecutionConfig {
    /// Resolve from overrides and the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| env::var(key).ok())
    }

    /// Resolve with an explicit variable lookup.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let contract_index = match overrides.contract_index {
            Some(index) => Some(index),
            None => var(ENV_CONTRACT_INDEX)
                .map(|raw| parse_setting(ENV_CONTRACT_INDEX, &raw, "an unsigned integer"))
                .transpose()?
                .or(overrides.default_contract_index),
        };
        let tick_offset = match overrides.tick_offset {
            Some(offset) => offset,
            None => var(ENV_TICK_OFFSET)
                .map(|raw| parse_setting(ENV_TICK_OFFSET, &raw, "an unsigned integer"))
                .transpose()?
                .unwrap_or(defaults.tick_offset),
        };
        let delay_between_tests = match overrides.delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => var(ENV_DELAY_MS)
                .map(|raw| parse_setting(ENV_DELAY_MS, &raw, "milliseconds"))
                .transpose()?
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay_between_tests),
        };

        let config = ExecutionConfig {
            api_url: overrides
                .api_url
                .or_else(|| var(ENV_API_URL))
                .unwrap_or(defaults.api_url),
            contract_index: contract_index.ok_or(ConfigError::Missing(ENV_CONTRACT_INDEX))?,
            contract_address: overrides.contract_address,
            test_identity: overrides
                .test_identity
                .or_else(|| var(ENV_TEST_IDENTITY))
                .ok_or(ConfigError::Missing(ENV_TEST_IDENTITY))?,
            test_seed: overrides
                .test_seed
                .or_else(|| var(ENV_TEST_SEED))
                .ok_or(ConfigError::Missing(ENV_TEST_SEED))?,
            tick_offset,
            delay_between_tests,
            request_timeout: defaults.request_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every setting; the first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("api_url", &self.api_url)?;

        decode_identity(&self.test_identity).map_err(|source| ConfigError::InvalidIdentity {
            name: "test_identity",
            source,
        })?;
        if let Some(address) = &self.contract_address {
            decode_identity(address).map_err(|source| ConfigError::InvalidIdentity {
                name: "contract_address",
                source,
            })?;
        }

        if !is_valid_seed(&self.test_seed) {
            return Err(ConfigError::InvalidValue {
                name: "test_seed",
                expected: "55 lowercase letters",
                value: format!("<{} characters>", self.test_seed.chars().count()),
            });
        }

        if self.tick_offset == 0 {
            return Err(ConfigError::InvalidValue {
                name: "tick_offset",
                expected: "at least 1",
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

pub fn is_valid_seed(seed: &str) -> bool {
    seed.len() == 55 && seed.bytes().all(|b| b.is_ascii_lowercase())
}

fn parse_setting<T: std::str::FromStr>(
    name: &'static str,
    raw: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name,
        expected,
        value: raw.to_string(),
    })
}

fn validate_http_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        name,
        value: raw.to_string(),
    };
    let parsed = raw.parse::<reqwest::Url>().map_err(|_| invalid())?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qprobe_codec::PLACEHOLDER_IDENTITY;
    use std::collections::HashMap;

    fn seed() -> String {
        "a".repeat(55)
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, String)> {
        vec![
            (ENV_API_URL, "http://localhost:8080".to_string()),
            (ENV_CONTRACT_INDEX, "4".to_string()),
            (ENV_TEST_IDENTITY, PLACEHOLDER_IDENTITY.to_string()),
            (ENV_TEST_SEED, seed()),
        ]
    }

    fn lookup(pairs: &[(&'static str, String)]) -> impl Fn(&str) -> Option<String> {
        let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        env_of(&borrowed)
    }

    #[test]
    fn defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.tick_offset, 5);
        assert_eq!(config.delay_between_tests, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn resolves_from_env() {
        let config = ExecutionConfig::resolve_with(ConfigOverrides::default(), lookup(&full_env()))
            .unwrap();
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.contract_index, 4);
        assert_eq!(config.tick_offset, DEFAULT_TICK_OFFSET);
    }

    #[test]
    fn flag_beats_env() {
        let overrides = ConfigOverrides {
            api_url: Some("https://example.org/".to_string()),
            tick_offset: Some(12),
            delay_ms: Some(0),
            ..Default::default()
        };
        let config = ExecutionConfig::resolve_with(overrides, lookup(&full_env())).unwrap();
        assert_eq!(config.api_base(), "https://example.org");
        assert_eq!(config.tick_offset, 12);
        assert_eq!(config.delay_between_tests, Duration::ZERO);
    }

    #[test]
    fn catalog_index_is_last_resort() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != ENV_CONTRACT_INDEX);
        let overrides = ConfigOverrides {
            default_contract_index: Some(9),
            ..Default::default()
        };
        let config = ExecutionConfig::resolve_with(overrides, lookup(&env)).unwrap();
        assert_eq!(config.contract_index, 9);

        let overrides = ConfigOverrides {
            default_contract_index: Some(9),
            ..Default::default()
        };
        let config = ExecutionConfig::resolve_with(overrides, lookup(&full_env())).unwrap();
        assert_eq!(config.contract_index, 4);
    }

    #[test]
    fn missing_seed() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != ENV_TEST_SEED);
        let err = ExecutionConfig::resolve_with(ConfigOverrides::default(), lookup(&env)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_TEST_SEED));
    }

    #[test]
    fn bad_env_number() {
        let mut env = full_env();
        env.push((ENV_TICK_OFFSET, "soon".to_string()));
        let err = ExecutionConfig::resolve_with(ConfigOverrides::default(), lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("QPROBE_TICK_OFFSET"), "{}", err);
    }

    #[test]
    fn rejects_non_http_url() {
        let config = ExecutionConfig {
            api_url: "ftp://example.org".to_string(),
            test_identity: PLACEHOLDER_IDENTITY.to_string(),
            test_seed: seed(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn rejects_bad_identity_and_seed() {
        let mut config = ExecutionConfig {
            test_identity: "SHORT".to_string(),
            test_seed: seed(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIdentity { name: "test_identity", .. })
        ));

        config.test_identity = PLACEHOLDER_IDENTITY.to_string();
        config.test_seed = "A".repeat(55);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("55 lowercase letters"));
        assert!(!err.to_string().contains("AAAA"), "seed must not be echoed");
    }

    #[test]
    fn rejects_zero_tick_offset() {
        let config = ExecutionConfig {
            test_identity: PLACEHOLDER_IDENTITY.to_string(),
            test_seed: seed(),
            tick_offset: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("tick_offset"));
    }
}
