// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the collector transport.
//!
//! The client is built from [`HecConfig`](crate::config::HecConfig):
//! - request timeout from `request_timeout`
//! - connection pooling with a 270s idle timeout and TCP keep-alive
//! - optional HTTPS proxy
//! - optional acceptance of self-signed collector certificates
//!
//! A bad proxy setting never prevents startup: the client falls back to a
//! direct connection and logs the problem.

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::config::HecConfig;

/// Builds the client used by [`HttpTransport`](crate::transport::HttpTransport).
#[must_use]
pub fn get_client(config: &HecConfig) -> reqwest::Client {
    match build_client_inner(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "HEC | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client_inner(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "HEC | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client_inner(
    config: &HecConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if config.disable_certificate_validation {
        client = client.danger_accept_invalid_certs(true);
    }

    if allow_proxy {
        if let Some(https_uri) = &config.proxy_https {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_falls_back_on_bad_proxy() {
        let config = HecConfig {
            proxy_https: Some("not a url".to_string()),
            ..HecConfig::default()
        };
        assert!(build_client_inner(&config, false).is_ok());
        let _client = get_client(&config);
    }
}
