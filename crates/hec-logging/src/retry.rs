// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry bookkeeping for one dispatcher's pending events.
//!
//! ```text
//!   Idle ──begin──> InFlight ──success──> Idle        (failure count reset)
//!                       │
//!                       └──failure──> count += 1
//!                                       count <  max: Retain (events stay pending)
//!                                       count >= max: Drop   (count reset)
//! ```

use crate::constants::MAX_FLUSH_RETRIES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    InFlight,
}

/// What to do with the events of a failed flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put them back in the pending batch for the next flush.
    Retain,
    /// Discard them.
    Drop,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    max_retries: u32,
    failure_count: u32,
    in_flight: usize,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(MAX_FLUSH_RETRIES)
    }
}

impl RetryController {
    /// `max_retries` of zero behaves like one: every failure drops.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        RetryController {
            max_retries: max_retries.max(1),
            failure_count: 0,
            in_flight: 0,
        }
    }

    pub fn begin(&mut self) {
        self.in_flight += 1;
    }

    pub fn record_success(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.failure_count += 1;
        if self.failure_count >= self.max_retries {
            self.failure_count = 0;
            RetryDecision::Drop
        } else {
            RetryDecision::Retain
        }
    }

    #[must_use]
    pub fn state(&self) -> FlushState {
        if self.in_flight == 0 {
            FlushState::Idle
        } else {
            FlushState::InFlight
        }
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
