// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated host that exercises the overlay and its diagnostics pipeline.
//!
//! A list of rows re-renders on a fixed pattern for the first half of the
//! run. The simulated host double-buffers its node handles, measures one row
//! asynchronously, keeps one row off-screen, moves a row mid-run, and pauses
//! the overlay briefly. Pass events go to both a
//! [`PrettyPrintSink`](repaint_debug::pretty::PrettyPrintSink) and a
//! [`RecorderSink`](repaint_debug::recorder::RecorderSink); the recording is
//! exported as a Chrome trace JSON file.
//!
//! Set `RUST_LOG=repaint_core=debug` to see individual renders.

use std::cell::Cell;
use std::fs::File;
use std::future::ready;
use std::io::BufWriter;
use std::rc::Rc;

use kurbo::Rect;
use tracing_subscriber::EnvFilter;

use repaint_core::config::OverlayConfig;
use repaint_core::engine::Overlay;
use repaint_core::error::{AttachError, MeasureError};
use repaint_core::geometry::{Measure, Measurement};
use repaint_core::hook::{CommitHook, CommitStats, HookRegistry, RetryPolicy, attach};
use repaint_core::node::{Identity, NodeId, PairedByBit};
use repaint_core::observe::Observer;
use repaint_core::outline::{CountAtLeast, OutlineId};
use repaint_core::paint::LastFrame;
use repaint_core::render::{RenderStats, RenderTotals};
use repaint_core::time::{HostTime, Timebase};
use repaint_core::trace::{
    EvictEvent, EvictReason, FlushEvent, FrameEvent, RecomputeEvent, TraceSink, Tracer,
};

use repaint_debug::pretty::PrettyPrintSink;
use repaint_debug::recorder::RecorderSink;

const FRAME_COUNT: u64 = 120;
/// Frame interval in milliseconds (≈60 Hz).
const FRAME_MS: u64 = 16;
/// Rows stop re-rendering after this frame.
const RENDER_UNTIL: u64 = 60;
const MOVE_AT: u64 = 24;
const PAUSE_AT: u64 = 36;
const RESUME_AT: u64 = 40;

const ROWS: u64 = 8;
const ROW_HEIGHT: f64 = 40.0;
/// Bit separating the two buffers of a row's handle.
const FLIP: u64 = 1 << 32;
/// Row measured asynchronously by the host.
const SLOW_ROW: u64 = 3;

// ---------------------------------------------------------------------------
// Simulated host
// ---------------------------------------------------------------------------

/// A list of rows laid out top to bottom.
#[derive(Debug)]
struct ListHost {
    rows: Vec<Rect>,
    identity: PairedByBit,
    in_flight: Vec<NodeId>,
}

impl ListHost {
    fn new() -> Self {
        let rows = (0..ROWS)
            .map(|i| {
                let y = i as f64 * ROW_HEIGHT;
                Rect::new(0.0, y, 320.0, y + ROW_HEIGHT - 8.0)
            })
            .collect();
        Self {
            rows,
            identity: PairedByBit { flip: FLIP },
            in_flight: Vec::new(),
        }
    }

    fn row_of(&self, node: NodeId) -> Option<usize> {
        usize::try_from(self.canonical(node).0)
            .ok()
            .filter(|&row| row < self.rows.len())
    }

    /// Answers every measurement started since the last call.
    fn settle(&mut self) -> Vec<(NodeId, Result<Measurement, MeasureError>)> {
        std::mem::take(&mut self.in_flight)
            .into_iter()
            .map(|node| {
                let result = self
                    .row_of(node)
                    .map(|row| Measurement::Visible(self.rows[row]))
                    .ok_or(MeasureError::Detached(node));
                (node, result)
            })
            .collect()
    }
}

impl Identity for ListHost {
    fn canonical(&self, node: NodeId) -> NodeId {
        self.identity.canonical(node)
    }

    fn alternate(&self, node: NodeId) -> Option<NodeId> {
        self.identity.alternate(node)
    }
}

impl Measure for ListHost {
    fn measure(&mut self, node: NodeId) -> Result<Measurement, MeasureError> {
        let row = self.row_of(node).ok_or(MeasureError::Detached(node))?;
        if row as u64 == SLOW_ROW {
            self.in_flight.push(node);
            return Ok(Measurement::Pending);
        }
        Ok(Measurement::Visible(self.rows[row]))
    }
}

/// Hook installation that succeeds on the third try.
#[derive(Debug, Default)]
struct LazyHook {
    tries: u32,
}

impl HookRegistry for LazyHook {
    fn try_register(&mut self) -> Result<(), AttachError> {
        self.tries += 1;
        if self.tries < 3 {
            Err(AttachError::Unavailable)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Fans trace events out to two sinks.
struct Tee<'a> {
    pretty: &'a mut PrettyPrintSink,
    recorder: &'a mut RecorderSink,
}

impl TraceSink for Tee<'_> {
    fn on_flush(&mut self, e: &FlushEvent) {
        self.pretty.on_flush(e);
        self.recorder.on_flush(e);
    }

    fn on_recompute(&mut self, e: &RecomputeEvent) {
        self.pretty.on_recompute(e);
        self.recorder.on_recompute(e);
    }

    fn on_frame(&mut self, e: &FrameEvent) {
        self.pretty.on_frame(e);
        self.recorder.on_frame(e);
    }

    fn on_evict(&mut self, e: &EvictEvent) {
        self.pretty.on_evict(e);
        self.recorder.on_evict(e);
    }
}

/// The toolbar: keeps a running total and counts finished outlines.
#[derive(Debug)]
struct Toolbar {
    finished: Rc<Cell<u32>>,
}

impl Observer for Toolbar {
    fn on_commit_finish(&mut self, stats: &CommitStats) {
        tracing::debug!(commit = stats.commit, accepted = stats.accepted, "commit");
    }

    fn on_totals(&mut self, totals: RenderTotals) {
        tracing::info!("toolbar {totals}");
    }

    fn on_outline_finished(&mut self, _id: OutlineId) {
        self.finished.set(self.finished.get() + 1);
    }

    fn on_outline_evicted(&mut self, id: OutlineId, reason: EvictReason) {
        tracing::info!(?id, reason = reason.as_str(), "evicted");
    }

    fn on_paused(&mut self, paused: bool) {
        tracing::info!(paused, "overlay toggled");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let timebase = Timebase::MILLIS;

    // -- sinks -------------------------------------------------------------
    let mut pretty = PrettyPrintSink::new(Box::new(std::io::stdout()), timebase);
    let mut recorder = RecorderSink::new();

    // -- hook --------------------------------------------------------------
    let mut hook = LazyHook::default();
    let attempt = pollster::block_on(attach(&mut hook, RetryPolicy::DEFAULT, |ms| {
        std::thread::sleep(std::time::Duration::from_millis(ms));
        ready(())
    }))
    .expect("commit hook never became available");
    tracing::info!(attempt, "commit hook attached");

    // -- overlay -----------------------------------------------------------
    let config = OverlayConfig {
        viewport: Some(Rect::new(0.0, 0.0, 800.0, 260.0)),
        stale_after_ms: Some(600),
        ..OverlayConfig::web()
    };
    let mut overlay = Overlay::new(ListHost::new(), config, timebase)
        .expect("demo configuration is valid")
        .with_significance(CountAtLeast(3));
    let finished = Rc::new(Cell::new(0));
    overlay.subscribe(Box::new(Toolbar {
        finished: finished.clone(),
    }));
    let mut painter = LastFrame::default();
    let mut watched = None;

    // -- simulated loop ----------------------------------------------------
    for frame_index in 0..FRAME_COUNT {
        let now = HostTime(frame_index * FRAME_MS);

        // 1. Commit: every third row re-renders, alternating buffers.
        if frame_index < RENDER_UNTIL {
            overlay.commit_start(now);
            for row in (0..ROWS).filter(|row| (row + frame_index) % 3 == 0) {
                let node = if frame_index % 2 == 0 {
                    NodeId(row)
                } else {
                    NodeId(row | FLIP)
                };
                let stats = RenderStats::new(1, 0.4 + row as f64 * 0.3)
                    .named("Row")
                    .changed(["selected"]);
                overlay.render(node, stats, now);
            }
            overlay.commit_finish(now);
        }

        // 2. Host events.
        for (node, result) in overlay.measurer_mut().settle() {
            overlay.on_measured(node, result, now);
        }
        if frame_index == MOVE_AT {
            overlay.measurer_mut().rows[1] = Rect::new(0.0, 200.0, 320.0, 232.0);
        }
        if frame_index == PAUSE_AT {
            overlay.set_paused(true, now);
        }
        if frame_index == RESUME_AT {
            overlay.set_paused(false, now);
        }

        // 3. Passes.
        let mut tee = Tee {
            pretty: &mut pretty,
            recorder: &mut recorder,
        };
        let mut tracer = Tracer::new(&mut tee);
        overlay.flush_traced(now, &mut tracer);
        overlay.recompute_traced(now, &mut tracer);
        if overlay.needs_frame() {
            overlay.frame_traced(now, &mut painter, &mut tracer);
            for item in &painter.snapshot.items {
                tracing::trace!(
                    id = ?item.id,
                    rect = ?item.rect,
                    alpha = item.alpha,
                    label = item.label.as_deref().unwrap_or(""),
                    "stroke"
                );
            }
        }

        if watched.is_none()
            && let Some(id) = overlay.store().ids().first().copied()
        {
            watched = Some(id);
            overlay.on_complete(id, |id| tracing::info!(?id, "first outline done"));
        }
    }

    // -- export Chrome trace -----------------------------------------------
    let path = "repaint_trace.json";
    let file = File::create(path).expect("failed to create trace file");
    let mut writer = BufWriter::new(file);
    repaint_debug::chrome::export(recorder.as_bytes(), timebase, &mut writer)
        .expect("failed to write Chrome trace");

    println!(
        "Wrote {path} ({FRAME_COUNT} frames, {} painted, {} outlines finished)",
        painter.frames,
        finished.get(),
    );
}
