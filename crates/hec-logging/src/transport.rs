// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The request/response boundary to the collector.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::config::HecConfig;
use crate::errors::{ConfigError, HecError, ServerError};
use crate::http::get_client;

const EVENT_PATH: &str = "/services/collector/event/1.0";

/// Why a post did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShippingError {
    /// The collector answered with a non-success status.
    Status { status: u16, body: Vec<u8> },
    /// No usable answer: connection refused, reset, timed out.
    Network(String),
}

impl From<ShippingError> for HecError {
    fn from(e: ShippingError) -> Self {
        match e {
            ShippingError::Status { status, body } => match ServerError::parse(status, &body) {
                Some(server_error) => HecError::Server(server_error),
                None => HecError::Transport(format!(
                    "HTTP {}: {}",
                    status,
                    String::from_utf8_lossy(&body)
                )),
            },
            ShippingError::Network(message) => HecError::Transport(message),
        }
    }
}

/// Posts one batch payload. Implementations must resolve every call; the
/// request timeout is theirs to enforce.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, payload: Vec<u8>) -> Result<(), ShippingError>;
}

/// Transport posting to an HTTP Event Collector with token authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &HecConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Splunk {}", config.token))
            .map_err(|e| ConfigError::Invalid(format!("token is not a valid header value: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(HttpTransport {
            client: get_client(config),
            url: event_url(&config.url),
            headers,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn event_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.contains("/services/collector") {
        base.to_string()
    } else {
        format!("{base}{EVENT_PATH}")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, payload: Vec<u8>) -> Result<(), ShippingError> {
        let size = payload.len();
        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await
            .map_err(|e| ShippingError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!("HEC | Posted {} bytes, status {}", size, status);
            return Ok(());
        }

        // Only failures need the body.
        let body = resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        Err(ShippingError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
