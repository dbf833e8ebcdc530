//! Engine configuration
//!
//! Defaults match the signing network's public deployment. Every value can
//! be overridden from the environment (a `.env` file is loaded first when
//! present).

use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;

use crate::redact::redact_url;
use crate::retry::RetryConfig;
use crate::submitter::SubmitterConfig;

/// Timing and retry configuration of the transfer engine
#[derive(Clone, Deserialize)]
pub struct EngineConfig {
    /// Delay between network queries while waiting, and after a failed
    /// deposit watch
    #[serde(default = "default_network_delay")]
    pub network_delay_ms: u64,
    /// Idle delay of the deposit watch while nobody subscribes
    #[serde(default = "default_listener_poll")]
    pub listener_poll_ms: u64,
    /// Fixed backoff of the lifecycle drivers
    #[serde(default = "default_driver_backoff")]
    pub driver_backoff_ms: u64,
    /// Attempts to register a gateway with the network
    #[serde(default = "default_gateway_submit_retries")]
    pub gateway_submit_retries: u32,
    /// Submit/query attempts when submitting a network transaction
    #[serde(default = "default_network_submit_attempts")]
    pub network_submit_attempts: u32,
    /// Poll interval of the default confirmation waiter
    #[serde(default = "default_confirmation_poll")]
    pub confirmation_poll_ms: u64,
    /// Best-effort mirror of gateway registrations
    #[serde(default)]
    pub secondary_gateway_endpoint: Option<String>,
}

/// Custom Debug that redacts the mirror endpoint (may contain an API key).
impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("network_delay_ms", &self.network_delay_ms)
            .field("listener_poll_ms", &self.listener_poll_ms)
            .field("driver_backoff_ms", &self.driver_backoff_ms)
            .field("gateway_submit_retries", &self.gateway_submit_retries)
            .field("network_submit_attempts", &self.network_submit_attempts)
            .field("confirmation_poll_ms", &self.confirmation_poll_ms)
            .field(
                "secondary_gateway_endpoint",
                &self.secondary_gateway_endpoint.as_deref().map(redact_url),
            )
            .finish()
    }
}

/// Default functions
fn default_network_delay() -> u64 {
    15_000
}

fn default_listener_poll() -> u64 {
    1_000
}

fn default_driver_backoff() -> u64 {
    10_000
}

fn default_gateway_submit_retries() -> u32 {
    5
}

fn default_network_submit_attempts() -> u32 {
    4
}

fn default_confirmation_poll() -> u64 {
    15_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network_delay_ms: default_network_delay(),
            listener_poll_ms: default_listener_poll(),
            driver_backoff_ms: default_driver_backoff(),
            gateway_submit_retries: default_gateway_submit_retries(),
            network_submit_attempts: default_network_submit_attempts(),
            confirmation_poll_ms: default_confirmation_poll(),
            secondary_gateway_endpoint: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .wrap_err_with(|| format!("{} must be a valid number", key)),
                None => Ok(default),
            }
        }

        let config = EngineConfig {
            network_delay_ms: parse(&lookup, "NETWORK_DELAY_MS", default_network_delay())?,
            listener_poll_ms: parse(&lookup, "LISTENER_POLL_MS", default_listener_poll())?,
            driver_backoff_ms: parse(&lookup, "DRIVER_BACKOFF_MS", default_driver_backoff())?,
            gateway_submit_retries: parse(
                &lookup,
                "GATEWAY_SUBMIT_RETRIES",
                default_gateway_submit_retries(),
            )?,
            network_submit_attempts: parse(
                &lookup,
                "NETWORK_SUBMIT_ATTEMPTS",
                default_network_submit_attempts(),
            )?,
            confirmation_poll_ms: parse(
                &lookup,
                "CONFIRMATION_POLL_MS",
                default_confirmation_poll(),
            )?,
            secondary_gateway_endpoint: lookup("SECONDARY_GATEWAY_ENDPOINT")
                .filter(|v| !v.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.network_delay_ms == 0 {
            return Err(eyre!("network_delay_ms must be greater than 0"));
        }
        if self.listener_poll_ms == 0 {
            return Err(eyre!("listener_poll_ms must be greater than 0"));
        }
        if self.gateway_submit_retries == 0 {
            return Err(eyre!("gateway_submit_retries must be at least 1"));
        }
        if self.network_submit_attempts == 0 {
            return Err(eyre!("network_submit_attempts must be at least 1"));
        }
        if let Some(endpoint) = &self.secondary_gateway_endpoint {
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                eyre!(
                    "secondary_gateway_endpoint {} is not a valid URL: {}",
                    redact_url(endpoint),
                    e
                )
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(eyre!("secondary_gateway_endpoint must be http(s)"));
            }
        }
        Ok(())
    }

    pub fn network_delay(&self) -> Duration {
        Duration::from_millis(self.network_delay_ms)
    }

    pub fn listener_poll_interval(&self) -> Duration {
        Duration::from_millis(self.listener_poll_ms)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    /// Retry policy of the lifecycle drivers; unbounded by default
    pub fn driver_retry(&self, max_retries: Option<u32>) -> RetryConfig {
        RetryConfig::fixed(max_retries, Duration::from_millis(self.driver_backoff_ms))
    }

    /// Retry policy of the gateway registration
    pub fn gateway_submit_retry(&self) -> RetryConfig {
        RetryConfig::fixed(Some(self.gateway_submit_retries), Duration::from_secs(1))
    }

    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            network_delay: self.network_delay(),
            submit_attempts: self.network_submit_attempts,
        }
    }
}
