// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching front end of the pipeline.
//!
//! Producers call [`Dispatcher::append`] from any thread. Once the pending
//! batch crosses a threshold the dispatcher takes its events and posts them
//! through the [`MiddlewareChain`] on a tokio runtime:
//!
//! ```text
//!   append ──> pending batch ──threshold──> flight ──> MiddlewareChain ──> Transport
//!                   ^                          │
//!                   └──── restore on failure ──┘ (until MAX_FLUSH_RETRIES)
//! ```
//!
//! Events in flight still count toward [`Dispatcher::current_batch_size`]: they
//! leave the dispatcher only when a post succeeds or the retry budget runs out.
//!
//! # Send modes
//!
//! - [`SendMode::Parallel`]: every flush spawns its own post.
//! - [`SendMode::Sequential`]: flush requests go to a single sender task which
//!   posts one batch at a time. Requests arriving while a post is outstanding
//!   coalesce into one follow-up post that takes everything pending at the
//!   moment it starts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::{HecConfig, SendMode};
use crate::constants::{
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_MAX_EVENTS_BYTES, DEFAULT_MAX_EVENTS_COUNT,
    MAX_FLUSH_RETRIES,
};
use crate::error_reporter::ErrorReporter;
use crate::errors::ConfigError;
use crate::middleware::{MiddlewareChain, MiddlewareRegistry};
use crate::record::{EventBatch, EventRecord};
use crate::retry::{RetryController, RetryDecision};
use crate::serializer::Serializer;
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub max_events_count: usize,
    pub max_events_bytes: usize,
    /// `Duration::ZERO` flushes on every append and disables the timer.
    pub batch_interval: Duration,
    pub send_mode: SendMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            max_events_count: DEFAULT_MAX_EVENTS_COUNT,
            max_events_bytes: DEFAULT_MAX_EVENTS_BYTES,
            batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS),
            send_mode: SendMode::default(),
        }
    }
}

impl From<&HecConfig> for DispatcherConfig {
    fn from(config: &HecConfig) -> Self {
        DispatcherConfig {
            max_events_count: config.max_events_count,
            max_events_bytes: config.max_events_bytes,
            batch_interval: config.batch_interval(),
            send_mode: config.send_mode,
        }
    }
}

struct State {
    batch: EventBatch,
    in_flight_events: usize,
    retry: RetryController,
    last_flush: Instant,
    flush_queued: bool,
}

struct Shared {
    config: DispatcherConfig,
    chain: MiddlewareChain,
    reporter: Arc<ErrorReporter>,
    state: Mutex<State>,
    pending: AtomicUsize,
    idle: Notify,
    runtime: Handle,
    flush_tx: Option<mpsc::UnboundedSender<()>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_due(&self, state: &State) -> bool {
        state.batch.len() >= self.config.max_events_count
            || state.batch.bytes() >= self.config.max_events_bytes
            || state.last_flush.elapsed() >= self.config.batch_interval
    }

    fn flush_locked(self: &Arc<Self>, state: &mut State) {
        if state.batch.is_empty() {
            return;
        }
        state.last_flush = Instant::now();

        match self.config.send_mode {
            SendMode::Parallel => {
                let events = Self::start_flight(state);
                self.pending.fetch_add(1, Ordering::SeqCst);
                let shared = Arc::clone(self);
                self.runtime.spawn(async move {
                    shared.deliver(events).await;
                    shared.finish_pending();
                });
            }
            SendMode::Sequential => {
                if state.flush_queued {
                    return;
                }
                let Some(tx) = &self.flush_tx else {
                    return;
                };
                state.flush_queued = true;
                self.pending.fetch_add(1, Ordering::SeqCst);
                if tx.send(()).is_err() {
                    state.flush_queued = false;
                    self.finish_pending();
                }
            }
        }
    }

    fn start_flight(state: &mut State) -> Vec<Arc<EventRecord>> {
        let events = state.batch.take();
        state.in_flight_events += events.len();
        state.retry.begin();
        events
    }

    async fn deliver(&self, events: Vec<Arc<EventRecord>>) {
        let count = events.len();
        let result = self.chain.dispatch(events.clone()).await;

        if let Err(err) = &result {
            debug!("HEC | Flush of {} events failed: {}", count, err);
            self.reporter.error(&events, Some(err));
        }

        let mut state = self.state();
        state.in_flight_events = state.in_flight_events.saturating_sub(count);
        match result {
            Ok(()) => {
                state.retry.record_success();
                debug!("HEC | Flushed {} events", count);
            }
            Err(_) => match state.retry.record_failure() {
                RetryDecision::Retain => state.batch.restore(events),
                RetryDecision::Drop => warn!(
                    "HEC | Dropping {} events after {} failed flushes",
                    count,
                    state.retry.max_retries()
                ),
            },
        }
    }

    fn finish_pending(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

async fn run_sender(shared: Weak<Shared>, mut flush_rx: mpsc::UnboundedReceiver<()>) {
    while flush_rx.recv().await.is_some() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let events = {
            let mut state = shared.state();
            state.flush_queued = false;
            if state.batch.is_empty() {
                Vec::new()
            } else {
                Shared::start_flight(&mut state)
            }
        };
        if !events.is_empty() {
            shared.deliver(events).await;
        }
        shared.finish_pending();
    }
}

async fn run_timer(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut state = shared.state();
        if !state.batch.is_empty() && state.last_flush.elapsed() >= period {
            shared.flush_locked(&mut state);
        }
    }
}

/// Batches events and ships them to the collector.
///
/// Dropping the dispatcher stops its timer; posts already issued run to
/// completion. Use [`close`](Self::close) to deliver what is still pending.
pub struct Dispatcher {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Creates a dispatcher on the current tokio runtime.
    pub fn new(
        config: DispatcherConfig,
        chain: MiddlewareChain,
        reporter: Arc<ErrorReporter>,
    ) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::with_runtime(config, chain, reporter, runtime))
    }

    /// Creates a dispatcher whose posts run on `runtime`. `append` may then be
    /// called from threads outside the runtime.
    #[must_use]
    pub fn with_runtime(
        config: DispatcherConfig,
        chain: MiddlewareChain,
        reporter: Arc<ErrorReporter>,
        runtime: Handle,
    ) -> Self {
        let (flush_tx, flush_rx) = match config.send_mode {
            SendMode::Sequential => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(rx))
            }
            SendMode::Parallel => (None, None),
        };

        let shared = Arc::new(Shared {
            config,
            chain,
            reporter,
            state: Mutex::new(State {
                batch: EventBatch::default(),
                in_flight_events: 0,
                retry: RetryController::new(MAX_FLUSH_RETRIES),
                last_flush: Instant::now(),
                flush_queued: false,
            }),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            runtime: runtime.clone(),
            flush_tx,
        });

        if let Some(flush_rx) = flush_rx {
            runtime.spawn(run_sender(Arc::downgrade(&shared), flush_rx));
        }
        let timer = (!config.batch_interval.is_zero())
            .then(|| runtime.spawn(run_timer(Arc::downgrade(&shared), config.batch_interval)));

        debug!(
            "HEC | Dispatcher started: {} mode, {} events, {} bytes, {:?} interval",
            config.send_mode, config.max_events_count, config.max_events_bytes, config.batch_interval
        );

        Dispatcher { shared, timer }
    }

    /// Builds the whole pipeline from `config`: HTTP transport, serializer,
    /// the configured middleware and error callback. Failures are reported to
    /// [`ErrorReporter::global`].
    pub fn from_config(config: &HecConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_registry(config, &MiddlewareRegistry::default())
    }

    pub fn from_config_with_registry(
        config: &HecConfig,
        registry: &MiddlewareRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = Arc::new(HttpTransport::new(config)?);
        let chain = config
            .middleware
            .iter()
            .filter_map(|identifier| registry.resolve(identifier))
            .fold(
                MiddlewareChain::new(Serializer::new(config.metadata.clone()), transport),
                MiddlewareChain::with,
            );

        let reporter = ErrorReporter::global();
        if let Some(name) = &config.error_callback {
            reporter.register_class_name(name);
        }

        Self::new(DispatcherConfig::from(config), chain, reporter)
    }

    /// Adds `record` to the pending batch and flushes if a threshold is met.
    /// Never blocks on the network and never fails.
    pub fn append(&self, record: EventRecord) {
        let mut state = self.shared.state();
        state.batch.push(Arc::new(record));
        if self.shared.is_due(&state) {
            self.shared.flush_locked(&mut state);
        }
    }

    /// Starts posting the pending batch. Returns immediately.
    pub fn flush(&self) {
        let mut state = self.shared.state();
        self.shared.flush_locked(&mut state);
    }

    /// Events held by this dispatcher, pending or in flight.
    #[must_use]
    pub fn current_batch_size(&self) -> usize {
        let state = self.shared.state();
        state.batch.len() + state.in_flight_events
    }

    /// Flushes issued but not yet resolved.
    #[must_use]
    pub fn pending_flushes(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Consecutive failed flushes since the last success or drop.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.shared.state().retry.failure_count()
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Waits until every issued flush has resolved.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending_flushes() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops the timer, flushes what is pending and waits for every post.
    pub async fn close(&self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
        self.flush();
        self.wait_idle().await;
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
