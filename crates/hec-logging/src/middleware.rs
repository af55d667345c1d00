// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Interceptors wrapped around the transport call.
//!
//! A [`MiddlewareChain`] is an ordered list of [`Middleware`] values followed by
//! the terminal serialize-and-post step. Each middleware receives the events and
//! a [`Next`] continuation:
//!
//! ```text
//!   flush ──> mw[0] ──> mw[1] ──> ... ──> serialize + Transport::post
//!               │
//!               └── may return early (filtering, fault injection)
//! ```
//!
//! The value a middleware returns is the completion of the flush. A middleware
//! that never returns stalls the flush that called it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::HecError;
use crate::record::EventRecord;
use crate::serializer::Serializer;
use crate::transport::Transport;

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handles one flush. Forward with `next.run(events)` or return directly.
    async fn handle(&self, events: Vec<Arc<EventRecord>>, next: Next<'_>) -> Result<(), HecError>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    terminal: &'a Terminal,
}

impl Next<'_> {
    pub async fn run(self, events: Vec<Arc<EventRecord>>) -> Result<(), HecError> {
        match self.remaining.split_first() {
            Some((head, rest)) => {
                head.handle(
                    events,
                    Next {
                        remaining: rest,
                        terminal: self.terminal,
                    },
                )
                .await
            }
            None => self.terminal.send(&events).await,
        }
    }
}

struct Terminal {
    serializer: Serializer,
    transport: Arc<dyn Transport>,
}

impl Terminal {
    async fn send(&self, events: &[Arc<EventRecord>]) -> Result<(), HecError> {
        if events.is_empty() {
            return Ok(());
        }
        let payload = self.serializer.serialize(events)?;
        self.transport.post(payload).await.map_err(HecError::from)
    }
}

pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: Terminal,
}

impl MiddlewareChain {
    #[must_use]
    pub fn new(serializer: Serializer, transport: Arc<dyn Transport>) -> Self {
        MiddlewareChain {
            middlewares: Vec::new(),
            terminal: Terminal {
                serializer,
                transport,
            },
        }
    }

    /// Appends `middleware` after the ones already in the chain.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub async fn dispatch(&self, events: Vec<Arc<EventRecord>>) -> Result<(), HecError> {
        Next {
            remaining: &self.middlewares,
            terminal: &self.terminal,
        }
        .run(events)
        .await
    }
}

/// Rank of a severity tag. Unknown tags rank as `INFO`.
#[must_use]
pub fn severity_rank(severity: &str) -> u8 {
    match severity.to_ascii_uppercase().as_str() {
        "TRACE" | "FINEST" | "FINER" => 0,
        "DEBUG" | "FINE" | "CONFIG" => 1,
        "WARN" | "WARNING" => 3,
        "ERROR" | "SEVERE" => 4,
        "FATAL" | "CRITICAL" => 5,
        _ => 2,
    }
}

/// Drops events below a minimum severity. A flush left with no events
/// completes successfully without posting.
#[derive(Debug, Clone)]
pub struct SeverityFilter {
    min_rank: u8,
}

impl SeverityFilter {
    #[must_use]
    pub fn new(min_severity: &str) -> Self {
        SeverityFilter {
            min_rank: severity_rank(min_severity),
        }
    }
}

#[async_trait]
impl Middleware for SeverityFilter {
    async fn handle(&self, events: Vec<Arc<EventRecord>>, next: Next<'_>) -> Result<(), HecError> {
        let kept: Vec<_> = events
            .into_iter()
            .filter(|e| severity_rank(&e.severity) >= self.min_rank)
            .collect();
        if kept.is_empty() {
            return Ok(());
        }
        next.run(kept).await
    }
}

/// Counts the calls and events passing through it.
#[derive(Debug, Default)]
pub struct CountingMiddleware {
    calls: AtomicUsize,
    events: AtomicUsize,
}

impl CountingMiddleware {
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Middleware for CountingMiddleware {
    async fn handle(&self, events: Vec<Arc<EventRecord>>, next: Next<'_>) -> Result<(), HecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.fetch_add(events.len(), Ordering::SeqCst);
        next.run(events).await
    }
}

/// Re-posts a batch on transport failures with exponential backoff before the
/// failure reaches the dispatcher. Structured server rejections are final.
#[derive(Debug, Clone)]
pub struct ResendMiddleware {
    retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl ResendMiddleware {
    #[must_use]
    pub fn new(retries: u32) -> Self {
        ResendMiddleware {
            retries,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }
}

#[async_trait]
impl Middleware for ResendMiddleware {
    async fn handle(&self, events: Vec<Arc<EventRecord>>, next: Next<'_>) -> Result<(), HecError> {
        let mut delay = self.initial_delay;
        let mut attempt = 0;
        loop {
            match next.run(events.clone()).await {
                Err(HecError::Transport(message)) if attempt < self.retries => {
                    attempt += 1;
                    debug!(
                        "HEC | Resending {} events in {:?} (attempt {}): {}",
                        events.len(),
                        delay,
                        attempt,
                        message
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                }
                result => return result,
            }
        }
    }
}

/// Fails the first `failures` calls with a transport error, then forwards.
#[derive(Debug)]
pub struct FaultInjector {
    failures_left: AtomicUsize,
}

impl FaultInjector {
    #[must_use]
    pub fn new(failures: usize) -> Self {
        FaultInjector {
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl Middleware for FaultInjector {
    async fn handle(&self, events: Vec<Arc<EventRecord>>, next: Next<'_>) -> Result<(), HecError> {
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(HecError::Transport("injected fault".to_string()));
        }
        next.run(events).await
    }
}

type MiddlewareConstructor = Box<dyn Fn(Option<&str>) -> Option<Arc<dyn Middleware>> + Send + Sync>;

/// Resolves middleware identifiers such as `severity_filter:WARN` or
/// `resend:3` to instances.
pub struct MiddlewareRegistry {
    constructors: HashMap<String, MiddlewareConstructor>,
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        let mut registry = MiddlewareRegistry {
            constructors: HashMap::new(),
        };
        registry.register("severity_filter", |arg| {
            Some(Arc::new(SeverityFilter::new(arg.unwrap_or("INFO"))) as Arc<dyn Middleware>)
        });
        registry.register("counting", |_| {
            Some(Arc::new(CountingMiddleware::default()) as Arc<dyn Middleware>)
        });
        registry.register("resend", |arg| {
            let retries = match arg {
                Some(n) => n.parse().ok()?,
                None => 3,
            };
            Some(Arc::new(ResendMiddleware::new(retries)) as Arc<dyn Middleware>)
        });
        registry.register("fault_injector", |arg| {
            let failures = match arg {
                Some(n) => n.parse().ok()?,
                None => 1,
            };
            Some(Arc::new(FaultInjector::new(failures)) as Arc<dyn Middleware>)
        });
        registry
    }
}

impl MiddlewareRegistry {
    /// Adds or replaces the constructor for `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(Option<&str>) -> Option<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_string(), Box::new(constructor));
    }

    /// Builds the middleware named by `identifier` (`name` or `name:argument`).
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> Option<Arc<dyn Middleware>> {
        let identifier = identifier.trim();
        let (name, arg) = match identifier.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (identifier, None),
        };
        let middleware = self.constructors.get(name).and_then(|c| c(arg));
        if middleware.is_none() {
            warn!("HEC | Ignoring unknown or invalid middleware '{}'", identifier);
        }
        middleware
    }
}
