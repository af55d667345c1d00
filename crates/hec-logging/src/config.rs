// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_MAX_EVENTS_BYTES, DEFAULT_MAX_EVENTS_COUNT,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_URL,
};
use crate::errors::ConfigError;
use crate::serializer::EnvelopeMetadata;

/// How flushes of one dispatcher relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// One post in flight at a time, batches delivered in submission order.
    Sequential,
    /// Posts run concurrently with no ordering between batches.
    #[default]
    Parallel,
}

impl FromStr for SendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(SendMode::Sequential),
            "parallel" => Ok(SendMode::Parallel),
            other => Err(ConfigError::Invalid(format!(
                "Invalid send mode '{other}'. Must be one of: sequential, parallel"
            ))),
        }
    }
}

impl Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendMode::Sequential => write!(f, "sequential"),
            SendMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Configuration of one HEC sender.
#[derive(Debug, Clone)]
pub struct HecConfig {
    /// Collector base URL, e.g. `https://hec.example.com:8088`
    pub url: String,
    /// HEC token, sent as `Authorization: Splunk <token>`
    pub token: String,
    /// Envelope fields added to every event
    pub metadata: EnvelopeMetadata,
    pub max_events_count: usize,
    pub max_events_bytes: usize,
    /// Zero flushes on every append
    pub batch_interval_ms: u64,
    pub send_mode: SendMode,
    pub request_timeout: Duration,
    /// Accept self-signed collector certificates
    pub disable_certificate_validation: bool,
    /// HTTPS proxy URL
    pub proxy_https: Option<String>,
    /// Middleware identifiers, outermost first
    pub middleware: Vec<String>,
    /// Error callback identifier
    pub error_callback: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: String::new(),
            metadata: EnvelopeMetadata::default(),
            max_events_count: DEFAULT_MAX_EVENTS_COUNT,
            max_events_bytes: DEFAULT_MAX_EVENTS_BYTES,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            send_mode: SendMode::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            disable_certificate_validation: false,
            proxy_https: None,
            middleware: Vec::new(),
            error_callback: None,
            log_level: "info".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse().ok())
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

impl HecConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let url = non_empty_env("HEC_URL").unwrap_or(defaults.url);
        let token = env::var("HEC_TOKEN").unwrap_or_default();
        let metadata = EnvelopeMetadata {
            host: non_empty_env("HEC_HOST"),
            index: non_empty_env("HEC_INDEX"),
            source: non_empty_env("HEC_SOURCE"),
            sourcetype: non_empty_env("HEC_SOURCETYPE"),
        };
        let send_mode = match non_empty_env("HEC_SEND_MODE") {
            Some(val) => val.parse()?,
            None => defaults.send_mode,
        };
        let request_timeout = parse_env::<u64>("HEC_REQUEST_TIMEOUT_SECS")
            .map_or(defaults.request_timeout, Duration::from_secs);
        let disable_certificate_validation = env::var("HEC_DISABLE_CERTIFICATE_VALIDATION")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let proxy_https = env::var("HEC_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let middleware = env::var("HEC_MIDDLEWARE")
            .map(|val| {
                val.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let log_level = env::var("HEC_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            url,
            token,
            metadata,
            max_events_count: parse_env("HEC_BATCH_SIZE_COUNT")
                .unwrap_or(defaults.max_events_count),
            max_events_bytes: parse_env("HEC_BATCH_SIZE_BYTES")
                .unwrap_or(defaults.max_events_bytes),
            batch_interval_ms: parse_env("HEC_BATCH_INTERVAL_MS")
                .unwrap_or(defaults.batch_interval_ms),
            send_mode,
            request_timeout,
            disable_certificate_validation,
            proxy_https,
            middleware,
            error_callback: non_empty_env("HEC_ERROR_CALLBACK"),
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "HEC_URL must be an http or https URL, got '{}'",
                self.url
            )));
        }

        if self.token.trim().is_empty() {
            return Err(ConfigError::Invalid("HEC_TOKEN cannot be empty".to_string()));
        }

        if self.max_events_count == 0 {
            return Err(ConfigError::Invalid(
                "HEC_BATCH_SIZE_COUNT must be greater than 0".to_string(),
            ));
        }

        if self.max_events_bytes == 0 {
            return Err(ConfigError::Invalid(
                "HEC_BATCH_SIZE_BYTES must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error, off",
                self.log_level
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}
