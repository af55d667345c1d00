// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use hec_logging::{
    config::SendMode,
    dispatcher::{Dispatcher, DispatcherConfig},
    error_reporter::{CountingErrorCallback, ErrorReporter},
    middleware::{FaultInjector, MiddlewareChain},
    record::EventRecord,
    serializer::Serializer,
    transport::{ShippingError, Transport},
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every message it receives and the highest number of posts seen
/// running at once.
#[derive(Default)]
struct SlowTransport {
    messages: Mutex<Vec<String>>,
    posts: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

#[async_trait]
impl Transport for SlowTransport {
    async fn post(&self, payload: Vec<u8>) -> Result<(), ShippingError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let text = String::from_utf8_lossy(&payload).into_owned();
        let mut messages = self.messages.lock().expect("lock poisoned");
        for line in text.lines() {
            let envelope: Value = serde_json::from_str(line).expect("invalid envelope");
            messages.push(envelope["event"]["message"].as_str().unwrap_or_default().to_string());
        }
        drop(messages);

        self.posts.fetch_add(1, Ordering::SeqCst);
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn dispatcher(
    send_mode: SendMode,
    chain: MiddlewareChain,
    reporter: Arc<ErrorReporter>,
) -> Dispatcher {
    dispatcher_with_count(send_mode, chain, reporter, 3)
}

fn dispatcher_with_count(
    send_mode: SendMode,
    chain: MiddlewareChain,
    reporter: Arc<ErrorReporter>,
    max_events_count: usize,
) -> Dispatcher {
    Dispatcher::new(
        DispatcherConfig {
            max_events_count,
            max_events_bytes: usize::MAX,
            batch_interval: Duration::from_secs(3_600),
            send_mode,
        },
        chain,
        reporter,
    )
    .expect("failed to build dispatcher")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_mode_preserves_order() {
    let transport = Arc::new(SlowTransport::default());
    let dispatcher = dispatcher(
        SendMode::Sequential,
        MiddlewareChain::new(Serializer::default(), transport.clone()),
        Arc::new(ErrorReporter::new()),
    );

    for i in 0..60 {
        dispatcher.append(EventRecord::new("INFO", i.to_string()));
        if i % 7 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    dispatcher.close().await;

    let expected: Vec<String> = (0..60).map(|i: i32| i.to_string()).collect();
    assert_eq!(*transport.messages.lock().expect("lock poisoned"), expected);
    assert_eq!(transport.max_running.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.current_batch_size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_mode_retries_in_order() {
    let transport = Arc::new(SlowTransport::default());
    let reporter = Arc::new(ErrorReporter::new());
    let errors = Arc::new(CountingErrorCallback::default());
    reporter.on_error(Some(errors.clone()));
    let chain = MiddlewareChain::new(Serializer::default(), transport.clone())
        .with(Arc::new(FaultInjector::new(2)));
    let dispatcher = dispatcher(SendMode::Sequential, chain, reporter);

    for i in 0..9 {
        dispatcher.append(EventRecord::new("INFO", i.to_string()));
        dispatcher.wait_idle().await;
    }
    dispatcher.close().await;

    let expected: Vec<String> = (0..9).map(|i: i32| i.to_string()).collect();
    assert_eq!(*transport.messages.lock().expect("lock poisoned"), expected);
    assert_eq!(errors.error_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_retry_keeps_append_order_not_creation_order() {
    let transport = Arc::new(SlowTransport::default());
    let reporter = Arc::new(ErrorReporter::new());
    let errors = Arc::new(CountingErrorCallback::default());
    reporter.on_error(Some(errors.clone()));
    let chain = MiddlewareChain::new(Serializer::default(), transport.clone())
        .with(Arc::new(FaultInjector::new(1)));
    let dispatcher = dispatcher_with_count(SendMode::Sequential, chain, reporter, 2);

    let b = EventRecord::new("INFO", "B");
    let a = EventRecord::new("INFO", "A");
    dispatcher.append(a);
    dispatcher.append(b);
    dispatcher.wait_idle().await;
    assert_eq!(errors.error_count(), 1);
    assert_eq!(dispatcher.current_batch_size(), 2);

    dispatcher.append(EventRecord::new("INFO", "C"));
    dispatcher.wait_idle().await;
    dispatcher.close().await;

    assert_eq!(*transport.messages.lock().expect("lock poisoned"), vec!["A", "B", "C"]);
    assert_eq!(errors.error_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_mode_retries_keep_order_across_producers() {
    let transport = Arc::new(SlowTransport::default());
    let reporter = Arc::new(ErrorReporter::new());
    let errors = Arc::new(CountingErrorCallback::default());
    reporter.on_error(Some(errors.clone()));
    let chain = MiddlewareChain::new(Serializer::default(), transport.clone())
        .with(Arc::new(FaultInjector::new(3)));
    let dispatcher = Arc::new(dispatcher(SendMode::Sequential, chain, reporter));
    let appended = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let dispatcher = Arc::clone(&dispatcher);
            let appended = Arc::clone(&appended);
            std::thread::spawn(move || {
                for i in 0..25 {
                    // Built outside the lock so creation and append order differ.
                    let record = EventRecord::new("INFO", format!("{p}-{i}"));
                    let mut log = appended.lock().expect("lock poisoned");
                    log.push(record.message.clone());
                    dispatcher.append(record);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer panicked");
    }

    // Fewer faults than the retry limit, so nothing is dropped.
    while dispatcher.current_batch_size() > 0 {
        dispatcher.flush();
        dispatcher.wait_idle().await;
    }
    dispatcher.close().await;

    let expected = appended.lock().expect("lock poisoned").clone();
    assert_eq!(expected.len(), 100);
    assert_eq!(*transport.messages.lock().expect("lock poisoned"), expected);
    assert_eq!(errors.error_count(), 3);
    assert_eq!(transport.max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_mode_delivers_everything() {
    let transport = Arc::new(SlowTransport::default());
    let dispatcher = Arc::new(dispatcher(
        SendMode::Parallel,
        MiddlewareChain::new(Serializer::default(), transport.clone()),
        Arc::new(ErrorReporter::new()),
    ));

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                for i in 0..30 {
                    dispatcher.append(EventRecord::new("INFO", format!("{p}-{i}")));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer panicked");
    }
    dispatcher.close().await;

    let mut messages = transport.messages.lock().expect("lock poisoned").clone();
    messages.sort();
    let mut expected: Vec<String> = (0..4)
        .flat_map(|p| (0..30).map(move |i| format!("{p}-{i}")))
        .collect();
    expected.sort();
    assert_eq!(messages, expected);
    assert_eq!(dispatcher.current_batch_size(), 0);
    assert_eq!(dispatcher.pending_flushes(), 0);
}
