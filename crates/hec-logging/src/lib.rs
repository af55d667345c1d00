// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # HEC logging
//!
//! Batching log shipper for HTTP Event Collector endpoints.
//!
//! Application threads hand [`EventRecord`]s to a [`Dispatcher`], which
//! batches them and posts newline-delimited JSON envelopes through a
//! [`MiddlewareChain`] and a [`Transport`]. Logging never fails or blocks on
//! the network at the call site; delivery failures are surfaced only through
//! the [`ErrorReporter`].
//!
//! ```text
//!   HecLayer / HecLogger
//!          │ EventRecord
//!          v
//!     Dispatcher ──> RetryController
//!          │ flush          │ failure
//!          v                v
//!   MiddlewareChain    ErrorReporter ──> ErrorCallback
//!          │
//!          v
//!     Serializer ──> Transport::post
//! ```
//!
//! ## Modules
//!
//! - [`record`]: events and the pending batch
//! - [`throwable`]: error descriptions with trimmed cause chains
//! - [`serializer`]: the wire envelope
//! - [`middleware`]: interceptors around the post
//! - [`dispatcher`] and [`retry`]: batching, send modes and bounded retries
//! - [`error_reporter`]: the failure callback slot
//! - [`transport`] and [`http`]: the collector client
//! - [`adapters`]: `tracing` and `log` integrations
//! - [`config`] and [`logger`]: environment configuration and diagnostics

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(missing_docs)]

pub mod adapters;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error_reporter;
pub mod errors;
pub mod http;
pub mod logger;
pub mod middleware;
pub mod record;
pub mod retry;
pub mod serializer;
pub mod throwable;
pub mod transport;

pub use config::{HecConfig, SendMode};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error_reporter::{CountingErrorCallback, ErrorCallback, ErrorReporter};
pub use errors::{ConfigError, HecError, ServerError};
pub use middleware::{Middleware, MiddlewareChain, Next};
pub use record::{EventBatch, EventRecord};
pub use serializer::{EnvelopeMetadata, Serializer};
pub use throwable::{RaisedError, Throwable, ThrowableInfo};
pub use transport::{HttpTransport, ShippingError, Transport};
