// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log events and the batch that buffers them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::throwable::{Throwable, ThrowableInfo};

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(0);

/// A single log event. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Per-process creation order. Diagnostic only, never serialized.
    pub sequence_id: u64,
    pub timestamp: SystemTime,
    pub severity: String,
    pub message: String,
    pub logger_name: String,
    pub thread_name: String,
    pub properties: HashMap<String, String>,
    pub marker: Option<String>,
    pub throwable: Option<ThrowableInfo>,
}

impl EventRecord {
    /// Creates a record stamped with the current time and thread name.
    #[must_use]
    pub fn new(severity: impl Into<String>, message: impl Into<String>) -> Self {
        let thread_name = std::thread::current()
            .name()
            .unwrap_or_default()
            .to_string();
        EventRecord {
            sequence_id: NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
            timestamp: SystemTime::now(),
            severity: severity.into(),
            message: message.into(),
            logger_name: String::new(),
            thread_name,
            properties: HashMap::new(),
            marker: None,
            throwable: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger_name: impl Into<String>) -> Self {
        self.logger_name = logger_name.into();
        self
    }

    #[must_use]
    pub fn with_thread(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches the description of `throwable`. The info is built right away
    /// so the frames reflect the raise site.
    #[must_use]
    pub fn with_throwable(mut self, throwable: Option<&dyn Throwable>) -> Self {
        self.throwable = ThrowableInfo::build(throwable);
        self
    }

    #[must_use]
    pub fn with_throwable_info(mut self, info: ThrowableInfo) -> Self {
        self.throwable = Some(info);
        self
    }

    /// Approximate payload contribution of this record, used for the batch
    /// byte limit.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        let properties: usize = self
            .properties
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        let throwable = self.throwable.as_ref().map_or(0, throwable_size);
        self.severity.len()
            + self.message.len()
            + self.logger_name.len()
            + self.thread_name.len()
            + self.marker.as_ref().map_or(0, String::len)
            + properties
            + throwable
    }
}

fn throwable_size(info: &ThrowableInfo) -> usize {
    info.class_name.len()
        + info.message.as_ref().map_or(0, String::len)
        + info.stack_frames.iter().map(String::len).sum::<usize>()
        + info.cause.as_deref().map_or(0, throwable_size)
}

/// Events waiting to be flushed, in append order.
#[derive(Debug, Clone)]
pub struct EventBatch {
    events: Vec<Arc<EventRecord>>,
    bytes: usize,
    created_at: Instant,
}

impl Default for EventBatch {
    fn default() -> Self {
        EventBatch {
            events: Vec::new(),
            bytes: 0,
            created_at: Instant::now(),
        }
    }
}

impl EventBatch {
    pub fn push(&mut self, event: Arc<EventRecord>) {
        self.bytes += event.estimated_size();
        self.events.push(event);
    }

    /// Returns the events waiting in this batch and leaves it empty.
    pub fn take(&mut self) -> Vec<Arc<EventRecord>> {
        self.bytes = 0;
        self.created_at = Instant::now();
        std::mem::take(&mut self.events)
    }

    /// Puts events from a failed post back in front of the ones appended
    /// since. Both keep their append order.
    pub fn restore(&mut self, mut events: Vec<Arc<EventRecord>>) {
        self.bytes += events.iter().map(|e| e.estimated_size()).sum::<usize>();
        events.append(&mut self.events);
        self.events = events;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn events(&self) -> &[Arc<EventRecord>] {
        &self.events
    }
}
