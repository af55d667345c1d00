// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use log::kv::{self, Key, Value, VisitSource};
use log::{LevelFilter, Log, Metadata, Record};

use super::{is_internal_target, LogRecordSource};
use crate::dispatcher::Dispatcher;
use crate::errors::ConfigError;
use crate::record::EventRecord;

/// `log` crate logger shipping records to a [`Dispatcher`]. Structured
/// key-values become properties.
pub struct HecLogger {
    dispatcher: Arc<Dispatcher>,
    level: LevelFilter,
}

impl HecLogger {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, level: LevelFilter) -> Self {
        HecLogger { dispatcher, level }
    }

    /// Installs this logger as the `log` crate's global logger.
    pub fn install(self) -> Result<(), ConfigError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self)).map_err(|e| ConfigError::Logging(e.to_string()))?;
        log::set_max_level(level);
        Ok(())
    }
}

struct PropertyCollector(HashMap<String, String>);

impl<'kvs> VisitSource<'kvs> for PropertyCollector {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl LogRecordSource for HecLogger {
    type Record<'a> = Record<'a>;

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn to_event_record(&self, record: &Record<'_>) -> Option<EventRecord> {
        if !self.enabled(record.metadata()) {
            return None;
        }

        let mut properties = PropertyCollector(HashMap::new());
        // A failing source only loses its remaining pairs.
        let _ = record.key_values().visit(&mut properties);

        Some(
            EventRecord::new(record.level().as_str(), record.args().to_string())
                .with_logger(record.target())
                .with_properties(properties.0),
        )
    }
}

impl Log for HecLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && !is_internal_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        self.forward(record);
    }

    fn flush(&self) {
        self.dispatcher.flush();
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
    use log::Level;
    use serde_json::Value as Json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Capture(Mutex<Vec<Vec<u8>>>);

    #[async_trait]
    impl Transport for Capture {
        async fn post(&self, payload: Vec<u8>) -> Result<(), ShippingError> {
            self.0.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn logger(transport: Arc<Capture>) -> HecLogger {
        let dispatcher = Dispatcher::new(
            DispatcherConfig {
                max_events_count: 100,
                max_events_bytes: usize::MAX,
                batch_interval: Duration::from_secs(3_600),
                send_mode: SendMode::Sequential,
            },
            MiddlewareChain::new(Serializer::default(), transport),
            Arc::new(ErrorReporter::new()),
        )
        .unwrap();
        HecLogger::new(Arc::new(dispatcher), LevelFilter::Info)
    }

    #[tokio::test]
    async fn test_logger_maps_records() {
        let transport = Arc::new(Capture::default());
        let logger = logger(transport.clone());

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("checkout")
                .args(format_args!("cart abandoned"))
                .key_values(&("user", "42"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("checkout")
                .args(format_args!("too verbose"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .target("reqwest::connect")
                .args(format_args!("internal"))
                .build(),
        );
        assert_eq!(logger.dispatcher().current_batch_size(), 1);

        logger.flush();
        logger.dispatcher().wait_idle().await;

        let posts = transport.0.lock().unwrap();
        let envelope: Json = serde_json::from_slice(&posts[0]).unwrap();
        assert_eq!(envelope["event"]["severity"], "WARN");
        assert_eq!(envelope["event"]["message"], "cart abandoned");
        assert_eq!(envelope["event"]["logger"], "checkout");
        assert_eq!(envelope["event"]["data"]["user"], "42");
    }
}
