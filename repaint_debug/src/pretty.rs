// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to milliseconds using a [`Timebase`].

use std::io::Write;

use repaint_core::time::{HostTime, Timebase};
use repaint_core::trace::{EvictEvent, FlushEvent, FrameEvent, RecomputeEvent, TraceSink};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn host_ms(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1_000_000.0
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_flush(&mut self, e: &FlushEvent) {
        let _ = writeln!(
            self.writer,
            "[flush] #{} at {:.1}ms pending={} dropped={} promoted={} merged={} \
             renders=×{} ({:.2}ms)",
            e.flush_index,
            self.host_ms(e.now),
            e.pending,
            e.dropped,
            e.promoted,
            e.merged,
            e.render_count,
            e.render_time,
        );
    }

    fn on_recompute(&mut self, e: &RecomputeEvent) {
        let _ = writeln!(
            self.writer,
            "[recompute] at {:.1}ms remeasured={} evicted={} folded={}",
            self.host_ms(e.now),
            e.remeasured,
            e.evicted,
            e.folded,
        );
    }

    fn on_frame(&mut self, e: &FrameEvent) {
        let next = if e.rescheduled { "again" } else { "idle" };
        let _ = writeln!(
            self.writer,
            "[frame] #{} at {:.1}ms active={} finished={} regrouped={} painted={} next={next}",
            e.frame_index,
            self.host_ms(e.now),
            e.active,
            e.finished,
            e.regrouped,
            e.painted,
        );
    }

    fn on_evict(&mut self, e: &EvictEvent) {
        let _ = writeln!(
            self.writer,
            "[evict] {:?} {} at {:.1}ms",
            e.outline,
            e.reason.as_str(),
            self.host_ms(e.now),
        );
    }
}
