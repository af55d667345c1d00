// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bridges from logging frameworks into a [`Dispatcher`].
//!
//! - [`HecLayer`]: a `tracing_subscriber` layer
//! - [`HecLogger`]: a `log` crate logger
//!
//! Both skip records emitted by this crate and by its HTTP stack. Shipping
//! those would post again, which logs again.

pub mod log_bridge;
pub mod tracing_layer;

use crate::dispatcher::Dispatcher;
use crate::record::EventRecord;

pub use log_bridge::HecLogger;
pub use tracing_layer::HecLayer;

const SKIPPED_TARGETS: &[&str] = &["hec_logging", "hyper", "h2", "reqwest", "rustls", "mio", "want"];

/// Whether records from `target` must not be shipped.
#[must_use]
pub fn is_internal_target(target: &str) -> bool {
    SKIPPED_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// A framework-native record type that can be turned into an [`EventRecord`].
pub trait LogRecordSource {
    type Record<'a>: ?Sized;

    fn dispatcher(&self) -> &Dispatcher;

    /// `None` when the record must not be shipped.
    fn to_event_record(&self, record: &Self::Record<'_>) -> Option<EventRecord>;

    fn forward(&self, record: &Self::Record<'_>) {
        if let Some(event) = self.to_event_record(record) {
            self.dispatcher().append(event);
        }
    }
}
