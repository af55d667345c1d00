// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::{is_internal_target, LogRecordSource};
use crate::dispatcher::Dispatcher;
use crate::record::EventRecord;
use crate::throwable::ThrowableInfo;

/// Ships every `tracing` event to a [`Dispatcher`].
///
/// The `message` field becomes the event message, a field recorded as an
/// error becomes the throwable and every other field becomes a property.
#[derive(Clone)]
pub struct HecLayer {
    dispatcher: Arc<Dispatcher>,
}

impl HecLayer {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        HecLayer { dispatcher }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    properties: HashMap<String, String>,
    throwable: Option<ThrowableInfo>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.properties
                .insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if self.throwable.is_none() {
            self.throwable = Some(ThrowableInfo::from_error(value));
        }
        self.properties
            .insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.properties
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

impl LogRecordSource for HecLayer {
    type Record<'a> = Event<'a>;

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn to_event_record(&self, event: &Event<'_>) -> Option<EventRecord> {
        let metadata = event.metadata();
        if is_internal_target(metadata.target()) {
            return None;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = EventRecord::new(metadata.level().as_str(), visitor.message)
            .with_logger(metadata.target())
            .with_properties(visitor.properties);
        if let Some(info) = visitor.throwable {
            record = record.with_throwable_info(info);
        }
        Some(record)
    }
}

impl<S: Subscriber> Layer<S> for HecLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.forward(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SendMode;
    use crate::dispatcher::DispatcherConfig;
    use crate::error_reporter::ErrorReporter;
    use crate::middleware::MiddlewareChain;
    use crate::serializer::Serializer;
    use crate::transport::{ShippingError, Transport};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Default)]
    struct Capture(Mutex<Vec<Vec<u8>>>);

    #[async_trait]
    impl Transport for Capture {
        async fn post(&self, payload: Vec<u8>) -> Result<(), ShippingError> {
            self.0.lock().unwrap().push(payload);
            Ok(())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[tokio::test]
    async fn test_layer_ships_events() {
        let transport = Arc::new(Capture::default());
        let dispatcher = Arc::new(
            Dispatcher::new(
                DispatcherConfig {
                    max_events_count: 100,
                    max_events_bytes: usize::MAX,
                    batch_interval: Duration::from_secs(3_600),
                    send_mode: SendMode::Parallel,
                },
                MiddlewareChain::new(Serializer::default(), transport.clone()),
                Arc::new(ErrorReporter::new()),
            )
            .unwrap(),
        );
        let subscriber =
            tracing_subscriber::registry().with(HecLayer::new(Arc::clone(&dispatcher)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "checkout", order = 42, "payment retried");
            let err = DiskFull;
            tracing::error!(target: "storage", error = &err as &(dyn Error + 'static), "write failed");
            tracing::info!(target: "hec_logging::dispatcher", "internal");
        });
        assert_eq!(dispatcher.current_batch_size(), 2);
        dispatcher.close().await;

        let posts = transport.0.lock().unwrap();
        let lines: Vec<Value> = std::str::from_utf8(&posts[0])
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let first = &lines[0]["event"];
        assert_eq!(first["severity"], "WARN");
        assert_eq!(first["message"], "payment retried");
        assert_eq!(first["logger"], "checkout");
        assert_eq!(first["data"]["order"], "42");

        let second = &lines[1]["event"];
        assert_eq!(second["severity"], "ERROR");
        assert_eq!(second["data"]["error"], "disk full");
        assert_eq!(second["throwable"]["throwable_message"], "disk full");
    }
}
