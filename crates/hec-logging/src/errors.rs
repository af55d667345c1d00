// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types surfaced by the pipeline.
//!
//! Delivery failures are never returned to the code that logged the event.
//! They travel as [`HecError`] values into the
//! [`ErrorReporter`](crate::error_reporter::ErrorReporter) only.

use serde::Deserialize;

/// Structured rejection returned by the collector, e.g. `{"text":"Invalid token","code":4}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{text} (code {code})")]
pub struct ServerError {
    /// HTTP status of the response carrying the error body.
    #[serde(skip)]
    pub status: u16,
    /// Collector-specific error code.
    pub code: i64,
    /// Human readable reason.
    pub text: String,
}

impl ServerError {
    /// Parses a collector response body. Returns `None` when the body is not a
    /// `{text, code}` object.
    #[must_use]
    pub fn parse(status: u16, body: &[u8]) -> Option<Self> {
        let mut err: ServerError = serde_json::from_slice(body).ok()?;
        err.status = status;
        Some(err)
    }
}

/// Failure of a single flush attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HecError {
    /// The endpoint could not be reached or answered without a structured body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint rejected the payload with a structured reason.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// The batch could not be encoded. Handled like a transport failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HecError {
    /// Short stable label for log lines.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            HecError::Transport(_) => "transport",
            HecError::Server(_) => "server",
            HecError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for HecError {
    fn from(e: serde_json::Error) -> Self {
        HecError::Serialization(e.to_string())
    }
}

/// Errors raised while building a sender from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No tokio runtime available to run flushes")]
    NoRuntime,

    #[error("Failed to install logging subscriber: {0}")]
    Logging(String),
}
