// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-slot registry for the delivery failure callback.
//!
//! Logging never fails at the call site. When a flush fails, the dispatcher
//! hands the attempted events and the error to an [`ErrorReporter`], which
//! forwards them to the one registered [`ErrorCallback`], if any.
//!
//! Lifecycle of the slot:
//! - empty until [`ErrorReporter::on_error`] or
//!   [`ErrorReporter::register_class_name`] installs a callback
//! - every registration replaces the previous callback, last writer wins
//! - `on_error(None)` clears it
//!
//! [`ErrorReporter::global`] is the process-wide reporter used by dispatchers
//! that are not given their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, error};

use crate::errors::HecError;
use crate::record::EventRecord;

pub trait ErrorCallback: Send + Sync {
    fn error(&self, events: &[Arc<EventRecord>], error: Option<&HecError>);
}

impl<F> ErrorCallback for F
where
    F: Fn(&[Arc<EventRecord>], Option<&HecError>) + Send + Sync,
{
    fn error(&self, events: &[Arc<EventRecord>], error: Option<&HecError>) {
        self(events, error);
    }
}

type CallbackConstructor = Box<dyn Fn() -> Arc<dyn ErrorCallback> + Send + Sync>;

pub struct ErrorReporter {
    callback: RwLock<Option<Arc<dyn ErrorCallback>>>,
    constructors: RwLock<HashMap<String, CallbackConstructor>>,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter {
    /// Creates a reporter with no callback and the built-in identifiers
    /// `counting` and `tracing` registered.
    #[must_use]
    pub fn new() -> Self {
        let reporter = ErrorReporter {
            callback: RwLock::new(None),
            constructors: RwLock::new(HashMap::new()),
        };
        reporter.register_constructor("counting", || {
            Arc::new(CountingErrorCallback::default()) as Arc<dyn ErrorCallback>
        });
        reporter.register_constructor("tracing", || {
            Arc::new(TracingErrorCallback) as Arc<dyn ErrorCallback>
        });
        reporter
    }

    /// The process-wide reporter.
    pub fn global() -> Arc<ErrorReporter> {
        static GLOBAL: OnceLock<Arc<ErrorReporter>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ErrorReporter::new())))
    }

    /// Replaces the registered callback. `None` clears the slot.
    pub fn on_error(&self, callback: Option<Arc<dyn ErrorCallback>>) {
        *self
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }

    #[must_use]
    pub fn callback(&self) -> Option<Arc<dyn ErrorCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes `name` resolvable by [`register_class_name`](Self::register_class_name).
    pub fn register_constructor<F>(&self, name: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn ErrorCallback> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Box::new(constructor));
    }

    /// Installs the callback registered under `name`. Unknown names are
    /// ignored and leave the current callback in place.
    pub fn register_class_name(&self, name: &str) {
        let callback = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name.trim())
            .map(|constructor| constructor());
        match callback {
            Some(callback) => self.on_error(Some(callback)),
            None => debug!("HEC | No error callback registered as '{}'", name),
        }
    }

    /// Forwards a failure to the registered callback, exactly once.
    pub fn error(&self, events: &[Arc<EventRecord>], error: Option<&HecError>) {
        // Call outside the lock so the callback may re-register itself.
        if let Some(callback) = self.callback() {
            callback.error(events, error);
        }
    }
}

/// Reference callback counting reported failures and the events they carried.
#[derive(Debug, Default)]
pub struct CountingErrorCallback {
    error_count: AtomicUsize,
    event_count: AtomicUsize,
}

impl CountingErrorCallback {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.error_count.store(0, Ordering::SeqCst);
        self.event_count.store(0, Ordering::SeqCst);
    }
}

impl ErrorCallback for CountingErrorCallback {
    fn error(&self, events: &[Arc<EventRecord>], _error: Option<&HecError>) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        self.event_count.fetch_add(events.len(), Ordering::SeqCst);
    }
}

/// Logs every failure through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorCallback;

impl ErrorCallback for TracingErrorCallback {
    fn error(&self, events: &[Arc<EventRecord>], err: Option<&HecError>) {
        match err {
            Some(err) => error!(
                "HEC | Failed to deliver {} events ({}): {}",
                events.len(),
                err.as_label(),
                err
            ),
            None => error!("HEC | Failed to deliver {} events", events.len()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing_test::traced_test;

    fn events(n: usize) -> Vec<Arc<EventRecord>> {
        (0..n)
            .map(|i| Arc::new(EventRecord::new("ERROR", format!("e{i}"))))
            .collect()
    }

    #[test]
    fn test_error_without_callback_is_noop() {
        let reporter = ErrorReporter::new();
        reporter.error(&events(2), None);
        assert!(reporter.callback().is_none());
    }

    #[test]
    fn test_on_error_replaces() {
        let reporter = ErrorReporter::new();
        let first = Arc::new(CountingErrorCallback::default());
        let second = Arc::new(CountingErrorCallback::default());

        reporter.on_error(Some(first.clone()));
        reporter.on_error(Some(second.clone()));
        reporter.error(&events(3), Some(&HecError::Transport("down".to_string())));

        assert_eq!(first.error_count(), 0);
        assert_eq!(second.error_count(), 1);
        assert_eq!(second.event_count(), 3);
    }

    #[test]
    fn test_on_error_none_clears() {
        let reporter = ErrorReporter::new();
        let counter = Arc::new(CountingErrorCallback::default());
        reporter.on_error(Some(counter.clone()));
        reporter.on_error(None);
        reporter.error(&events(1), None);
        assert_eq!(counter.error_count(), 0);
    }

    #[test]
    fn test_error_called_with_empty_arguments() {
        let reporter = ErrorReporter::new();
        let counter = Arc::new(CountingErrorCallback::default());
        reporter.on_error(Some(counter.clone()));
        reporter.error(&[], None);
        assert_eq!(counter.error_count(), 1);
        assert_eq!(counter.event_count(), 0);

        counter.reset();
        assert_eq!(counter.error_count(), 0);
        assert_eq!(counter.event_count(), 0);
    }

    #[test]
    fn test_closure_callback() {
        let reporter = ErrorReporter::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        reporter.on_error(Some(Arc::new(
            move |events: &[Arc<EventRecord>], err: Option<&HecError>| {
                sink.lock()
                    .unwrap()
                    .push((events.len(), err.map(HecError::as_label)));
            },
        )));
        reporter.error(&events(2), Some(&HecError::Serialization("bad".to_string())));
        assert_eq!(*seen.lock().unwrap(), vec![(2, Some("serialization"))]);
    }

    #[test]
    fn test_register_class_name() {
        let reporter = ErrorReporter::new();
        reporter.register_class_name("com.example.DoesNotExist");
        assert!(reporter.callback().is_none());

        let counter = Arc::new(CountingErrorCallback::default());
        let registered = counter.clone();
        reporter.register_constructor("audit", move || registered.clone() as Arc<dyn ErrorCallback>);
        reporter.register_class_name("audit");
        reporter.error(&events(4), None);
        assert_eq!(counter.event_count(), 4);

        // Unknown names keep the current callback.
        reporter.register_class_name("");
        reporter.error(&events(1), None);
        assert_eq!(counter.error_count(), 2);
    }

    #[test]
    #[traced_test]
    fn test_tracing_callback_logs() {
        let reporter = ErrorReporter::new();
        reporter.register_class_name("tracing");
        reporter.error(&events(2), Some(&HecError::Transport("refused".to_string())));
        assert!(logs_contain("Failed to deliver 2 events"));
    }

    #[test]
    #[serial]
    fn test_global_reporter_is_shared() {
        let counter = Arc::new(CountingErrorCallback::default());
        ErrorReporter::global().on_error(Some(counter.clone()));
        ErrorReporter::global().error(&events(1), None);
        assert_eq!(counter.error_count(), 1);
        ErrorReporter::global().on_error(None);
        assert!(ErrorReporter::global().callback().is_none());
    }
}
