// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the flush, recompute, and frame passes.
//!
//! This module provides a [`TraceSink`] trait with one method per event the
//! engine emits. All method bodies default to no-ops, so implementing only
//! the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).

use crate::outline::OutlineId;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why an outline left the store before its lifetime elapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictReason {
    /// Its node resolved to no visible geometry.
    Unmeasurable,
    /// It was not refreshed within the stale window.
    Stale,
    /// The frame step could not animate it.
    Fault,
    /// The overlay was paused.
    Paused,
}

impl EvictReason {
    /// A short lowercase name, for logs and trace exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unmeasurable => "unmeasurable",
            Self::Stale => "stale",
            Self::Fault => "fault",
            Self::Paused => "paused",
        }
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after a flush promoted the pending queue.
#[derive(Clone, Copy, Debug)]
pub struct FlushEvent {
    /// Monotonic flush counter.
    pub flush_index: u64,
    /// Host time of the flush.
    pub now: HostTime,
    /// Pending regions after re-measurement.
    pub pending: usize,
    /// Pending regions dropped as unmeasurable.
    pub dropped: usize,
    /// Regions promoted to new active outlines.
    pub promoted: usize,
    /// Regions merged into existing active outlines.
    pub merged: usize,
    /// Summed render count of the flushed batch.
    pub render_count: u64,
    /// Summed render time of the flushed batch, in milliseconds.
    pub render_time: f64,
}

/// Emitted after an independent recompute pass.
#[derive(Clone, Copy, Debug)]
pub struct RecomputeEvent {
    /// Host time of the pass.
    pub now: HostTime,
    /// Active outlines re-measured.
    pub remeasured: usize,
    /// Outlines evicted as unmeasurable or stale.
    pub evicted: usize,
    /// Outlines folded into a neighbour after moving.
    pub folded: usize,
}

/// Emitted after each frame step.
#[derive(Clone, Copy, Debug)]
pub struct FrameEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// Host time of the frame callback.
    pub now: HostTime,
    /// Outlines alive after the step.
    pub active: usize,
    /// Outlines that reached the end of their lifetime.
    pub finished: usize,
    /// Outlines folded by regrouping.
    pub regrouped: usize,
    /// Items handed to the painter.
    pub painted: usize,
    /// Whether another frame was requested.
    pub rescheduled: bool,
}

/// Emitted for each outline evicted before finishing.
#[derive(Clone, Copy, Debug)]
pub struct EvictEvent {
    /// The evicted outline.
    pub outline: OutlineId,
    /// Why it was evicted.
    pub reason: EvictReason,
    /// Host time of the eviction.
    pub now: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the engine.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after a flush.
    fn on_flush(&mut self, e: &FlushEvent) {
        _ = e;
    }

    /// Called after a recompute pass.
    fn on_recompute(&mut self, e: &RecomputeEvent) {
        _ = e;
    }

    /// Called after a frame step.
    fn on_frame(&mut self, e: &FrameEvent) {
        _ = e;
    }

    /// Called when an outline is evicted.
    fn on_evict(&mut self, e: &EvictEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FlushEvent`].
    #[inline]
    pub fn flush(&mut self, e: &FlushEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flush(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RecomputeEvent`].
    #[inline]
    pub fn recompute(&mut self, e: &RecomputeEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_recompute(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameEvent`].
    #[inline]
    pub fn frame(&mut self, e: &FrameEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`EvictEvent`].
    #[inline]
    pub fn evict(&mut self, e: &EvictEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_evict(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
