use serde::Serialize;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Runtime configuration, read from the environment with sensible defaults.
/// Timer lengths are part of the product behavior and rarely change, but
/// staying env-driven keeps staging backends one variable away.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Base URL of the analysis backend.
    pub api_base_url: String,
    /// Preparation countdown after the question audio ends.
    pub prep_secs: u32,
    /// Maximum recording length.
    pub record_secs: u32,
    /// Seconds before recording at which the microphone is re-warmed.
    pub warmup_lead_secs: u32,
    /// Timeout for non-streaming API requests, in seconds.
    pub request_timeout_secs: u64,
    /// Report polling cadence, in seconds.
    pub poll_interval_secs: u64,
    /// Report polling budget before giving up.
    pub poll_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            prep_secs: 15,
            record_secs: 45,
            warmup_lead_secs: 5,
            request_timeout_secs: 15,
            poll_interval_secs: 3,
            poll_max_attempts: 40,
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    /// A `.env` file in the working directory is honored when present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            api_base_url: env::var("PRACTICE_API_BASE_URL").unwrap_or(defaults.api_base_url),
            prep_secs: env_parsed("PRACTICE_PREP_SECS", defaults.prep_secs),
            record_secs: env_parsed("PRACTICE_RECORD_SECS", defaults.record_secs),
            warmup_lead_secs: env_parsed("PRACTICE_WARMUP_LEAD_SECS", defaults.warmup_lead_secs),
            request_timeout_secs: env_parsed(
                "PRACTICE_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            poll_interval_secs: env_parsed(
                "PRACTICE_POLL_INTERVAL_SECS",
                defaults.poll_interval_secs,
            ),
            poll_max_attempts: env_parsed(
                "PRACTICE_POLL_MAX_ATTEMPTS",
                defaults.poll_max_attempts,
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn env_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_product_timers() {
        let config = AppConfig::default();
        assert_eq!(config.prep_secs, 15);
        assert_eq!(config.record_secs, 45);
        assert_eq!(config.warmup_lead_secs, 5);
    }

    #[test]
    fn unparsable_values_fall_back_to_the_default() {
        assert_eq!(env_parsed("PRACTICE_TEST_UNSET_KEY", 7u32), 7);
    }
}
