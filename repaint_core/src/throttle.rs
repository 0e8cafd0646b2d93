// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rate limiting for the flush and recompute passes.
//!
//! Both gates are polled: the host calls the engine with `now` from its
//! timer or frame callback and the gate answers whether the pass may run.
//! [`next_deadline`](Throttle::next_deadline) tells the host when to call
//! back.

use crate::time::{Duration, HostTime};

/// Minimum-interval gate with a trailing edge.
///
/// A [`request`](Self::request) made inside the quiet window is not lost: it
/// becomes runnable at [`next_deadline`](Self::next_deadline). Any number of
/// requests before that point coalesce into one run.
#[derive(Clone, Copy, Debug)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<HostTime>,
    requested: bool,
}

impl Throttle {
    /// Creates an idle gate.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            requested: false,
        }
    }

    /// Marks work as outstanding.
    pub fn request(&mut self) {
        self.requested = true;
    }

    /// Whether work is outstanding.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Whether the quiet window has passed, ignoring outstanding requests.
    #[must_use]
    pub fn is_open(&self, now: HostTime) -> bool {
        self.last_run
            .is_none_or(|last| now.has_elapsed(last, self.interval))
    }

    /// Consumes the outstanding request if the quiet window has passed.
    ///
    /// Returns `true` when the caller should run the pass now.
    pub fn try_run(&mut self, now: HostTime) -> bool {
        if !self.requested || !self.is_open(now) {
            return false;
        }
        self.requested = false;
        self.last_run = Some(now);
        true
    }

    /// When an outstanding request becomes runnable.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        if !self.requested {
            return None;
        }
        Some(match self.last_run {
            Some(last) => last + self.interval,
            None => HostTime(0),
        })
    }

    /// Drops any outstanding request and forgets the last run.
    pub fn reset(&mut self) {
        self.requested = false;
        self.last_run = None;
    }
}

/// Fixed-cadence gate.
///
/// The first poll arms it; it then fires once per period. Missed periods do
/// not accumulate, so a long stall yields one run, not a burst.
#[derive(Clone, Copy, Debug)]
pub struct Interval {
    period: Duration,
    next: Option<HostTime>,
}

impl Interval {
    /// Creates an unarmed gate.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Returns `true` when a period boundary has been reached.
    pub fn poll(&mut self, now: HostTime) -> bool {
        match self.next {
            Some(next) if now >= next => {
                self.next = Some(now + self.period);
                true
            }
            Some(_) => false,
            None => {
                self.next = Some(now + self.period);
                false
            }
        }
    }

    /// The next boundary, once armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.next
    }

    /// Disarms the gate; the next poll re-arms it.
    pub fn reset(&mut self) {
        self.next = None;
    }
}
