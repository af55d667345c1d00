// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching and retry limits.
//!
//! A batch is flushed as soon as one of these holds:
//! - it holds [`DEFAULT_MAX_EVENTS_COUNT`] events
//! - its estimated size reaches [`DEFAULT_MAX_EVENTS_BYTES`]
//! - [`DEFAULT_BATCH_INTERVAL_MS`] elapsed since the last flush
//!
//! The defaults are overridden through [`HecConfig`](crate::config::HecConfig).

/// Consecutive failed flushes after which the pending events are dropped.
///
/// The counter resets on every successful flush and after each drop, so a
/// later batch always starts with the full budget.
pub const MAX_FLUSH_RETRIES: u32 = 5;

pub const DEFAULT_MAX_EVENTS_COUNT: usize = 10;

/// 10 KiB of estimated event content.
pub const DEFAULT_MAX_EVENTS_BYTES: usize = 10 * 1_024;

pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 10_000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub(crate) const DEFAULT_URL: &str = "https://localhost:8088";
