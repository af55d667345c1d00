// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics of the shipper itself.
//!
//! Lines look like:
//!
//! ```text
//! HEC_LOGGING | WARN | Dropping 12 events after 5 failed flushes
//! HEC_LOGGING | DEBUG | flush{count=3}: HEC | Posted 812 bytes, status 200
//! ```

use std::fmt;
use std::sync::Arc;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::adapters::HecLayer;
use crate::dispatcher::Dispatcher;
use crate::errors::ConfigError;

/// Prefixes every line with `HEC_LOGGING` and the level.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "HEC_LOGGING | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,reqwest=off,{level}"))
        .map_err(|e| ConfigError::Invalid(format!("could not parse log level '{level}': {e}")))
}

/// Installs a global subscriber writing the shipper's diagnostics to stdout.
pub fn init(level: &str) -> Result<(), ConfigError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Installs a global subscriber that prints like [`init`] and also ships
/// application events through `dispatcher`.
pub fn init_with_dispatcher(level: &str, dispatcher: Arc<Dispatcher>) -> Result<(), ConfigError> {
    tracing_subscriber::registry()
        .with(env_filter(level)?)
        .with(tracing_subscriber::fmt::layer().event_format(Formatter))
        .with(HecLayer::new(dispatcher))
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_rejects_bad_level() {
        assert!(env_filter("info").is_ok());
        assert!(env_filter("hec_logging=debug").is_ok());
        assert!(env_filter("hec_logging=notalevel").is_err());
    }

    #[test]
    fn test_formatter_prefix() {
        let buffer = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_ansi(false)
            .event_format(Formatter)
            .with_writer(move || SharedWriter(Arc::clone(&sink)))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("flush", count = 3);
            let _guard = span.enter();
            tracing::warn!("batch dropped");
        });

        let output = String::from_utf8(buffer.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default();
        assert_eq!(output, "HEC_LOGGING | WARN | flush{count=3}: batch dropped\n");
    }

    struct SharedWriter(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
