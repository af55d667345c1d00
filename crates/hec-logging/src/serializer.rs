// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapping of event records to the collector's JSON envelope.
//!
//! Each record becomes one envelope and the payload is the envelopes joined by
//! newlines:
//!
//! ```json
//! {"time":"1700000000.123","source":"app","event":{"severity":"INFO","message":"started","logger":"main","thread":"main"}}
//! ```
//!
//! Unset values are left out of the envelope, never written as `null`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::errors::HecError;
use crate::record::EventRecord;
use crate::throwable::ThrowableInfo;

const HOST: &str = "host";
const INDEX: &str = "index";
const SOURCE: &str = "source";
const SOURCETYPE: &str = "sourcetype";

/// Envelope fields shared by every event a sender posts. A record property
/// with the same name wins over the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvelopeMetadata {
    pub host: Option<String>,
    pub index: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcetype: Option<&'a str>,
    event: EventBody<'a>,
}

#[derive(Serialize)]
struct EventBody<'a> {
    severity: &'a str,
    message: &'a str,
    logger: &'a str,
    thread: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    marker: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    data: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    throwable: Option<ThrowableBody<'a>>,
}

#[derive(Serialize)]
struct ThrowableBody<'a> {
    throwable_class: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    throwable_message: Option<&'a str>,
    #[serde(skip_serializing_if = "no_frames")]
    stack_frames: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    cause: Option<Box<ThrowableBody<'a>>>,
}

fn no_frames(frames: &&[String]) -> bool {
    frames.is_empty()
}

impl<'a> From<&'a ThrowableInfo> for ThrowableBody<'a> {
    fn from(info: &'a ThrowableInfo) -> Self {
        ThrowableBody {
            throwable_class: &info.class_name,
            throwable_message: info.message.as_deref(),
            stack_frames: &info.stack_frames,
            cause: info
                .cause
                .as_deref()
                .map(|c| Box::new(ThrowableBody::from(c))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Serializer {
    metadata: EnvelopeMetadata,
}

impl Serializer {
    #[must_use]
    pub fn new(metadata: EnvelopeMetadata) -> Self {
        Serializer { metadata }
    }

    #[must_use]
    pub fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }

    /// Encodes `events` as newline separated envelopes.
    pub fn serialize(&self, events: &[Arc<EventRecord>]) -> Result<Vec<u8>, HecError> {
        let mut payload = Vec::with_capacity(events.len() * 256);
        for (i, event) in events.iter().enumerate() {
            if i > 0 {
                payload.push(b'\n');
            }
            serde_json::to_writer(&mut payload, &self.envelope(event))?;
        }
        Ok(payload)
    }

    fn envelope<'a>(&'a self, record: &'a EventRecord) -> Envelope<'a> {
        let promoted = |key: &str, configured: &'a Option<String>| -> Option<&'a str> {
            record
                .properties
                .get(key)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .or(configured.as_deref().filter(|v| !v.is_empty()))
        };

        let data = record
            .properties
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), HOST | INDEX | SOURCE | SOURCETYPE))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        Envelope {
            time: format_time(record),
            host: promoted(HOST, &self.metadata.host),
            index: promoted(INDEX, &self.metadata.index),
            source: promoted(SOURCE, &self.metadata.source),
            sourcetype: promoted(SOURCETYPE, &self.metadata.sourcetype),
            event: EventBody {
                severity: &record.severity,
                message: &record.message,
                logger: &record.logger_name,
                thread: &record.thread_name,
                marker: record.marker.as_deref(),
                data,
                throwable: record.throwable.as_ref().map(ThrowableBody::from),
            },
        }
    }
}

/// Epoch seconds with millisecond precision, e.g. `1700000000.123`.
fn format_time(record: &EventRecord) -> String {
    let since_epoch = record
        .timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}.{:03}",
        since_epoch.as_secs(),
        since_epoch.subsec_millis()
    )
}
