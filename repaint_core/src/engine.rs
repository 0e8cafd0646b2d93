// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The overlay engine: render events in, frame snapshots out.
//!
//! [`Overlay`] owns every piece of mutable state (geometry cache, pending
//! queue, active store) and is driven entirely by the host on one thread:
//!
//! ```text
//!   CommitHook::render ──► resolve ──► PendingQueue
//!          │                  │ (async)
//!          │                  └──► on_measured ──► PendingQueue
//!          ▼
//!   flush (throttled) ──► OutlineStore ──► Observer::on_paint_start
//!                              │
//!   recompute (interval) ──────┤ re-measure, evict, stale sweep
//!                              ▼
//!   frame (per animation frame) ──► FrameSnapshot ──► Painter::paint
//! ```
//!
//! Every entry point takes `now` and has a `_traced` twin that reports to a
//! [`Tracer`]. Nothing here panics on host data: malformed events are
//! logged and dropped, failed measurements make a node unmeasurable, and an
//! outline the frame step cannot animate is evicted alone.
//!
//! Completion callbacks registered with [`Overlay::on_complete`] fire once
//! when their outline stops being drawn, whether it finished or was evicted.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::config::OverlayConfig;
use crate::error::{ConfigError, MeasureError};
use crate::geometry::{GeometryResolver, Measure, Measurement, Resolved};
use crate::hook::{CommitHook, CommitStats};
use crate::node::NodeId;
use crate::observe::{Observer, Subscribers, Subscription};
use crate::outline::{ActiveOutline, NeverSignificant, OutlineId, Significance, is_important};
use crate::paint::{FrameScheduler, FrameSnapshot, PaintItem, Painter};
use crate::pending::{PendingOutline, PendingQueue};
use crate::render::{RenderEvent, RenderStats, RenderTotals};
use crate::store::OutlineStore;
use crate::throttle::{Interval, Throttle};
use crate::time::{Duration, HostTime, Timebase};
use crate::trace::{EvictEvent, EvictReason, FlushEvent, FrameEvent, RecomputeEvent, Tracer};

/// Counts from re-measuring the active set.
#[derive(Clone, Copy, Debug, Default)]
struct Remeasure {
    remeasured: usize,
    evicted: usize,
    folded: usize,
}

/// The render-profiling overlay engine.
pub struct Overlay<M> {
    config: OverlayConfig,
    resolver: GeometryResolver<M>,
    pending: PendingQueue,
    // Renders whose geometry is being measured asynchronously, by canonical node.
    awaiting: BTreeMap<NodeId, Vec<RenderEvent>>,
    store: OutlineStore,
    flush_gate: Throttle,
    recompute_gate: Interval,
    stale_after: Option<Duration>,
    significance: Box<dyn Significance>,
    subscribers: Subscribers,
    totals: RenderTotals,
    commit: CommitStats,
    snapshot: FrameSnapshot,
    paused: bool,
    frame_requested: bool,
    flush_index: u64,
    frame_index: u64,
}

impl<M> core::fmt::Debug for Overlay<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Overlay")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("awaiting", &self.awaiting.len())
            .field("active", &self.store.len())
            .field("paused", &self.paused)
            .field("frame_requested", &self.frame_requested)
            .finish_non_exhaustive()
    }
}

impl<M: Measure> Overlay<M> {
    /// Creates an engine measuring through `measurer`.
    ///
    /// `timebase` converts the configuration's millisecond intervals into the
    /// host's tick units.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(
        measurer: M,
        config: OverlayConfig,
        timebase: Timebase,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ticks = |ms| Duration::from_millis(ms, timebase);
        Ok(Self {
            resolver: GeometryResolver::new(measurer, ticks(config.cache_ttl_ms), config.viewport)
                .with_request_timeout(ticks(config.recompute_interval_ms)),
            pending: PendingQueue::new(),
            awaiting: BTreeMap::new(),
            store: OutlineStore::new(),
            flush_gate: Throttle::new(ticks(config.flush_interval_ms)),
            recompute_gate: Interval::new(ticks(config.recompute_interval_ms)),
            stale_after: config.stale_after_ms.map(ticks),
            significance: Box::new(NeverSignificant),
            subscribers: Subscribers::new(),
            totals: RenderTotals::default(),
            commit: CommitStats::default(),
            snapshot: FrameSnapshot::default(),
            paused: false,
            frame_requested: false,
            flush_index: 0,
            frame_index: 0,
            config,
        })
    }

    /// Replaces the importance policy.
    #[must_use]
    pub fn with_significance(mut self, significance: impl Significance + 'static) -> Self {
        self.significance = Box::new(significance);
        self
    }

    /// Registers an observer.
    pub fn subscribe(&mut self, observer: Box<dyn Observer>) -> Subscription {
        self.subscribers.subscribe(observer)
    }

    /// Removes an observer.
    pub fn unsubscribe(&mut self, id: Subscription) -> Option<Box<dyn Observer>> {
        self.subscribers.unsubscribe(id)
    }

    // -- Event intake --

    /// Records that `node` re-rendered.
    ///
    /// Malformed stats are logged and dropped. Events arriving while paused
    /// are ignored.
    pub fn on_render(&mut self, node: NodeId, stats: RenderStats, now: HostTime) {
        if self.paused {
            self.commit.rejected += 1;
            return;
        }
        let event = match RenderEvent::new(node, stats) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(%err, "dropping malformed render event");
                self.commit.rejected += 1;
                return;
            }
        };
        self.commit.accepted += 1;
        self.commit.count += u64::from(event.count());
        self.commit.duration += event.duration();

        let canonical = self.resolver.canonical(node);
        match self.resolver.resolve(node, now) {
            Resolved::Visible(rect) => {
                self.pending
                    .push(PendingOutline::new(canonical, rect, now, event));
                self.flush_gate.request();
            }
            Resolved::Pending => {
                self.awaiting.entry(canonical).or_default().push(event);
            }
            Resolved::Unmeasurable => {
                tracing::trace!(?node, "render on unmeasurable node");
            }
        }
    }

    /// Delivers an asynchronous measurement started by the measurer.
    ///
    /// Renders waiting on `node` are queued if it turned out visible. Active
    /// outlines backed by `node` are moved or evicted. If nothing is waiting
    /// and nothing is live the result only refreshes the cache.
    pub fn on_measured(
        &mut self,
        node: NodeId,
        result: Result<Measurement, MeasureError>,
        now: HostTime,
    ) {
        let canonical = self.resolver.canonical(node);
        let resolved = self.resolver.complete(node, result, now);
        let waiting = self.awaiting.remove(&canonical);

        if let (Some(renders), Resolved::Visible(rect)) = (waiting, resolved) {
            self.pending.push(PendingOutline {
                node: canonical,
                rect,
                measured_at: now,
                renders,
            });
            self.flush_gate.request();
        }

        let live: Vec<OutlineId> = self
            .store
            .iter()
            .filter(|(_, o)| o.node() == canonical)
            .map(|(id, _)| id)
            .collect();
        let mut tracer = Tracer::none();
        for id in live {
            match resolved {
                Resolved::Visible(rect) => {
                    self.store.relocate(id, rect, now, &self.config);
                }
                Resolved::Unmeasurable => {
                    self.evict(id, EvictReason::Unmeasurable, now, &mut tracer);
                }
                Resolved::Pending => {}
            }
        }
    }

    // -- Flush --

    /// Promotes the pending queue if the flush throttle allows.
    ///
    /// Returns `true` if a flush ran.
    pub fn flush(&mut self, now: HostTime) -> bool {
        self.flush_traced(now, &mut Tracer::none())
    }

    /// [`flush`](Self::flush), reporting to `tracer`.
    pub fn flush_traced(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> bool {
        if self.paused || !self.flush_gate.try_run(now) {
            return false;
        }
        self.flush_index += 1;

        let resolver = &mut self.resolver;
        let dropped = self.pending.remeasure(now, |node| resolver.resolve(node, now));
        self.remeasure_active(now, tracer);

        let batch = self.pending.drain();
        let pending = batch.len();
        let mut totals = RenderTotals::default();
        let mut promoted = Vec::new();
        let mut merged = 0;
        for outline in batch {
            totals.extend(&outline.renders);
            if let Some(id) = self.store.find(outline.key()) {
                if let Some(active) = self.store.get_mut(id) {
                    active.absorb(outline, &self.config, now);
                    merged += 1;
                }
                continue;
            }
            let important =
                is_important(&outline.renders, self.significance.as_ref(), &self.config);
            if self.config.log_renders {
                log_renders(&outline);
            }
            let active = ActiveOutline::promote(outline, important, &self.config, now);
            promoted.push(self.store.insert(active));
        }

        if pending > 0 {
            self.totals = totals;
            self.subscribers.notify(|o| o.on_totals(totals));
        }
        if !promoted.is_empty() {
            self.subscribers.notify(|o| o.on_paint_start(&promoted));
        }
        if !self.store.is_empty() {
            self.frame_requested = true;
        }

        tracer.flush(&FlushEvent {
            flush_index: self.flush_index,
            now,
            pending,
            dropped,
            promoted: promoted.len(),
            merged,
            render_count: totals.count,
            render_time: totals.duration,
        });
        true
    }

    // -- Recompute --

    /// Re-measures everything on the recompute cadence, independent of new
    /// renders. Evicts unmeasurable and, if configured, stale outlines.
    ///
    /// Returns `true` if the pass ran.
    pub fn recompute(&mut self, now: HostTime) -> bool {
        self.recompute_traced(now, &mut Tracer::none())
    }

    /// [`recompute`](Self::recompute), reporting to `tracer`.
    pub fn recompute_traced(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> bool {
        if self.paused || !self.recompute_gate.poll(now) {
            return false;
        }
        self.retry_lost(now);
        let resolver = &mut self.resolver;
        self.pending.remeasure(now, |node| resolver.resolve(node, now));
        let mut counts = self.remeasure_active(now, tracer);

        if let Some(stale_after) = self.stale_after {
            let stale: Vec<OutlineId> = self
                .store
                .iter()
                .filter(|(_, o)| now.has_elapsed(o.last_seen(), stale_after))
                .map(|(id, _)| id)
                .collect();
            counts.evicted += stale.len();
            for id in stale {
                self.evict(id, EvictReason::Stale, now, tracer);
            }
        }
        self.resolver.prune(now);

        tracer.recompute(&RecomputeEvent {
            now,
            remeasured: counts.remeasured,
            evicted: counts.evicted,
            folded: counts.folded,
        });
        true
    }

    // -- Frame --

    /// Runs one animation frame and paints the result.
    ///
    /// Returns `true` if another frame is needed.
    pub fn frame(&mut self, now: HostTime, painter: &mut dyn Painter) -> bool {
        self.frame_traced(now, painter, &mut Tracer::none())
    }

    /// [`frame`](Self::frame), reporting to `tracer`.
    pub fn frame_traced(
        &mut self,
        now: HostTime,
        painter: &mut dyn Painter,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        self.frame_index += 1;

        // Age and fade.
        let mut faulted = Vec::new();
        for id in self.store.ids() {
            let Some(outline) = self.store.get_mut(id) else {
                continue;
            };
            let important =
                is_important(outline.renders(), self.significance.as_ref(), &self.config);
            if let Err(fault) = outline.advance(id, important, &self.config) {
                tracing::warn!(%fault, "evicting outline");
                faulted.push(id);
            }
        }
        for id in faulted {
            self.evict(id, EvictReason::Fault, now, tracer);
        }

        let regrouped = self.store.regroup(&self.config).len();

        let finished: Vec<OutlineId> = self
            .store
            .iter()
            .filter(|(_, o)| o.is_finished())
            .map(|(id, _)| id)
            .collect();
        for &id in &finished {
            self.finish(id);
        }

        let snapshot = self.build_snapshot();
        painter.paint(&snapshot);
        let painted = snapshot.items.len();
        self.snapshot = snapshot;

        let rescheduled = !self.store.is_empty();
        self.frame_requested = rescheduled;
        tracer.frame(&FrameEvent {
            frame_index: self.frame_index,
            now,
            active: self.store.len(),
            finished: finished.len(),
            regrouped,
            painted,
            rescheduled,
        });
        rescheduled
    }

    /// Runs the timer-driven passes and asks for a frame if one is needed.
    pub fn pump(&mut self, now: HostTime, scheduler: &mut dyn FrameScheduler) {
        self.flush(now);
        self.recompute(now);
        if self.frame_requested {
            scheduler.request_frame();
        }
    }

    // -- Control --

    /// Pauses or resumes the overlay.
    ///
    /// Pausing drops pending work and in-flight measurements and evicts every
    /// active outline. Renders are ignored until resumed.
    pub fn set_paused(&mut self, paused: bool, now: HostTime) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if paused {
            self.pending.clear();
            self.awaiting.clear();
            self.resolver.reset();
            self.flush_gate.reset();
            self.recompute_gate.reset();
            let mut tracer = Tracer::none();
            for (id, outline) in self.store.drain() {
                self.retire(id, outline, EvictReason::Paused, now, &mut tracer);
            }
            // One more frame clears whatever was drawn.
            self.frame_requested = !self.snapshot.is_empty();
        }
        self.subscribers.notify(|o| o.on_paused(paused));
    }

    /// Registers a callback fired once when `id` stops being drawn.
    ///
    /// If `id` is already gone the callback fires immediately and `false` is
    /// returned.
    pub fn on_complete(&mut self, id: OutlineId, done: impl FnOnce(OutlineId) + 'static) -> bool {
        match self.store.get_mut(id) {
            Some(outline) => {
                outline.completions.push(Box::new(done));
                true
            }
            None => {
                done(id);
                false
            }
        }
    }

    /// Replaces the viewport used for visibility checks.
    pub fn set_viewport(&mut self, viewport: Option<Rect>) {
        self.config.viewport = viewport;
        self.resolver.set_viewport(viewport);
    }

    // -- Queries --

    /// Whether the host should schedule a frame callback.
    #[must_use]
    pub fn needs_frame(&self) -> bool {
        self.frame_requested
    }

    /// The earliest time a timer-driven pass wants to run.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        match (
            self.flush_gate.next_deadline(),
            self.recompute_gate.next_deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// The last painted snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    /// Totals of the last flushed batch.
    #[must_use]
    pub fn totals(&self) -> RenderTotals {
        self.totals
    }

    /// Counters of the current (or last) commit.
    #[must_use]
    pub fn commit_stats(&self) -> CommitStats {
        self.commit
    }

    /// Whether the overlay is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The active outlines.
    #[must_use]
    pub fn store(&self) -> &OutlineStore {
        &self.store
    }

    /// The pending queue.
    #[must_use]
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Number of nodes whose renders await an asynchronous measurement.
    #[must_use]
    pub fn awaiting(&self) -> usize {
        self.awaiting.len()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// The geometry resolver.
    #[must_use]
    pub fn resolver(&self) -> &GeometryResolver<M> {
        &self.resolver
    }

    /// The measurement collaborator.
    pub fn measurer_mut(&mut self) -> &mut M {
        self.resolver.measurer_mut()
    }

    // -- Internal helpers --

    /// Re-resolves renders whose asynchronous measurement was never answered.
    fn retry_lost(&mut self, now: HostTime) {
        self.resolver.expire(now);
        let orphaned: Vec<NodeId> = self
            .awaiting
            .keys()
            .copied()
            .filter(|node| !self.resolver.is_in_flight(*node))
            .collect();
        for node in orphaned {
            let Some(renders) = self.awaiting.remove(&node) else {
                continue;
            };
            match self.resolver.resolve(node, now) {
                Resolved::Visible(rect) => {
                    self.pending.push(PendingOutline {
                        node,
                        rect,
                        measured_at: now,
                        renders,
                    });
                    self.flush_gate.request();
                }
                Resolved::Pending => {
                    self.awaiting.insert(node, renders);
                }
                Resolved::Unmeasurable => {
                    tracing::debug!(?node, dropped = renders.len(), "lost measurement; node gone");
                }
            }
        }
    }

    fn remeasure_active(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> Remeasure {
        let mut counts = Remeasure::default();
        for id in self.store.ids() {
            // Earlier relocations in this pass may have folded `id` away.
            let Some(node) = self.store.get(id).map(ActiveOutline::node) else {
                continue;
            };
            counts.remeasured += 1;
            match self.resolver.resolve(node, now) {
                Resolved::Visible(rect) => {
                    if self.store.relocate(id, rect, now, &self.config).is_some() {
                        counts.folded += 1;
                    }
                }
                Resolved::Pending => {}
                Resolved::Unmeasurable => {
                    self.evict(id, EvictReason::Unmeasurable, now, tracer);
                    counts.evicted += 1;
                }
            }
        }
        counts
    }

    fn evict(
        &mut self,
        id: OutlineId,
        reason: EvictReason,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        if let Some(outline) = self.store.remove(id) {
            self.retire(id, outline, reason, now, tracer);
        }
    }

    /// Notifies and completes an outline already removed from the store.
    fn retire(
        &mut self,
        id: OutlineId,
        outline: ActiveOutline,
        reason: EvictReason,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        tracing::debug!(?id, reason = reason.as_str(), "outline evicted");
        tracer.evict(&EvictEvent {
            outline: id,
            reason,
            now,
        });
        self.subscribers.notify(|o| o.on_outline_evicted(id, reason));
        for done in outline.completions {
            done(id);
        }
    }

    fn finish(&mut self, id: OutlineId) {
        let Some(outline) = self.store.remove(id) else {
            return;
        };
        self.subscribers.notify(|o| o.on_outline_finished(id));
        for done in outline.completions {
            done(id);
        }
    }

    fn build_snapshot(&self) -> FrameSnapshot {
        let items = self
            .store
            .iter()
            .filter_map(|(id, outline)| {
                let totals = RenderTotals::of(outline.renders());
                if totals.count < self.config.render_count_threshold {
                    return None;
                }
                let important =
                    is_important(outline.renders(), self.significance.as_ref(), &self.config);
                Some(PaintItem {
                    id,
                    rect: outline.rect(),
                    alpha: outline.alpha(),
                    fill_alpha: if important {
                        outline.alpha() * self.config.fill_ratio
                    } else {
                        0.0
                    },
                    color: outline.color(),
                    label: if important {
                        outline.label().map(Into::into)
                    } else {
                        None
                    },
                    totals,
                    important,
                })
            })
            .collect();
        FrameSnapshot { items }
    }
}

impl<M: Measure> CommitHook for Overlay<M> {
    fn commit_start(&mut self, now: HostTime) {
        let commit = self.commit.commit + 1;
        self.commit = CommitStats {
            commit,
            started_at: now,
            ..CommitStats::default()
        };
        self.subscribers.notify(|o| o.on_commit_start(commit));
    }

    fn render(&mut self, node: NodeId, stats: RenderStats, now: HostTime) {
        self.on_render(node, stats, now);
    }

    fn commit_finish(&mut self, _now: HostTime) {
        let stats = self.commit;
        self.subscribers.notify(|o| o.on_commit_finish(&stats));
    }
}

fn log_renders(outline: &PendingOutline) {
    for render in &outline.renders {
        tracing::debug!(
            node = ?render.node(),
            name = ?render.display_name(),
            changed = ?render.meta().map(|meta| meta.changed_props.as_slice()),
            count = render.count(),
            duration = render.duration(),
            "render"
        );
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::{Cell, RefCell};

    use super::*;
    use crate::geometry::OutlineKey;
    use crate::geometry::tests::FakeMeasurer;
    use crate::outline::{CountAtLeast, START_COLOR};
    use crate::paint::LastFrame;

    #[derive(Clone, Debug, PartialEq)]
    enum Seen {
        PaintStart(usize),
        Finished(OutlineId),
        Evicted(OutlineId, EvictReason),
        Totals(u64),
        Paused(bool),
        CommitFinish(u32),
    }

    struct Recorder(Rc<RefCell<Vec<Seen>>>);

    impl Observer for Recorder {
        fn on_commit_finish(&mut self, stats: &CommitStats) {
            self.0.borrow_mut().push(Seen::CommitFinish(stats.accepted));
        }
        fn on_paint_start(&mut self, promoted: &[OutlineId]) {
            self.0.borrow_mut().push(Seen::PaintStart(promoted.len()));
        }
        fn on_outline_finished(&mut self, id: OutlineId) {
            self.0.borrow_mut().push(Seen::Finished(id));
        }
        fn on_outline_evicted(&mut self, id: OutlineId, reason: EvictReason) {
            self.0.borrow_mut().push(Seen::Evicted(id, reason));
        }
        fn on_totals(&mut self, totals: RenderTotals) {
            self.0.borrow_mut().push(Seen::Totals(totals.count));
        }
        fn on_paused(&mut self, paused: bool) {
            self.0.borrow_mut().push(Seen::Paused(paused));
        }
    }

    fn overlay(config: OverlayConfig) -> Overlay<FakeMeasurer> {
        Overlay::new(FakeMeasurer::default(), config, Timebase::MILLIS).expect("valid config")
    }

    fn observed(overlay: &mut Overlay<FakeMeasurer>) -> Rc<RefCell<Vec<Seen>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        overlay.subscribe(Box::new(Recorder(log.clone())));
        log
    }

    fn only_id(overlay: &Overlay<FakeMeasurer>) -> OutlineId {
        let ids = overlay.store().ids();
        assert_eq!(ids.len(), 1, "expected exactly one outline");
        ids[0]
    }

    #[test]
    fn single_cheap_render() {
        let mut o = overlay(OverlayConfig::web());
        o.measurer_mut().place(1, Rect::new(10.0, 10.0, 60.0, 30.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        assert!(o.flush(HostTime(0)));

        let id = only_id(&o);
        let outline = o.store().get(id).expect("alive");
        assert_eq!(outline.color(), START_COLOR);
        assert_eq!(outline.total_frames(), o.config().unimportant_frames);
        assert_eq!(outline.age(), 0);
        assert!(o.needs_frame());
    }

    #[test]
    fn identical_rects_merge_in_one_flush() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        let mut o = overlay(OverlayConfig::web());
        o.measurer_mut().place(1, rect);
        o.measurer_mut().place(2, rect);
        let log = observed(&mut o);

        o.on_render(NodeId(1), RenderStats::new(2, 1.5), HostTime(0));
        o.on_render(NodeId(2), RenderStats::new(3, 0.5), HostTime(0));
        assert!(o.flush(HostTime(0)));

        let id = only_id(&o);
        let outline = o.store().get(id).expect("alive");
        assert_eq!(outline.renders().len(), 2);
        let totals = RenderTotals::of(outline.renders());
        assert_eq!(totals.count, 5);
        assert!((totals.duration - 2.0).abs() < 1e-12, "durations sum");
        assert_eq!(
            *log.borrow(),
            vec![Seen::Totals(5), Seen::PaintStart(1)],
            "toolbar totals then paint start"
        );
        assert_eq!(o.totals().count, 5);
    }

    #[test]
    fn flush_is_idempotent() {
        let mut o = overlay(OverlayConfig::web());
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.measurer_mut().place(2, Rect::new(20.0, 0.0, 30.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 1.0), HostTime(0));
        o.on_render(NodeId(2), RenderStats::new(1, 1.0), HostTime(0));
        assert!(o.flush(HostTime(0)));

        let entries = |o: &Overlay<FakeMeasurer>| -> Vec<_> {
            o.store()
                .iter()
                .map(|(_, a)| (OutlineKey::of(a.rect()), RenderTotals::of(a.renders()).count))
                .collect()
        };
        let before = entries(&o);
        assert_eq!(before.len(), 2);
        assert!(!o.flush(HostTime(100)), "nothing requested");
        assert!(!o.flush(HostTime(200)), "nothing requested");
        assert_eq!(entries(&o), before);

        // A flush that does run leaves the untouched outlines as they were.
        o.measurer_mut().place(3, Rect::new(40.0, 0.0, 50.0, 10.0));
        o.on_render(NodeId(3), RenderStats::new(1, 1.0), HostTime(300));
        assert!(o.flush(HostTime(300)));
        let after = entries(&o);
        assert_eq!(after.len(), 3);
        for entry in &before {
            assert!(after.contains(entry), "{entry:?} changed by an unrelated flush");
        }
    }

    #[test]
    fn flush_is_throttled_and_coalesces() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut o = overlay(OverlayConfig::web());
        o.measurer_mut().place(1, rect);
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        assert!(o.flush(HostTime(0)));

        for now in [5, 10, 20] {
            o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(now));
            assert!(!o.flush(HostTime(now)), "inside the flush interval");
        }
        assert_eq!(o.pending().len(), 1, "burst coalesced into one region");
        assert_eq!(o.next_deadline(), Some(HostTime(32)));
        assert!(o.flush(HostTime(32)));
        let id = only_id(&o);
        assert_eq!(o.store().get(id).expect("alive").renders().len(), 4);
    }

    #[test]
    fn merge_into_active_keeps_age() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        o.measurer_mut().place(1, rect);
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        o.frame(HostTime(16), &mut painter);
        o.frame(HostTime(33), &mut painter);

        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(40));
        assert!(o.flush(HostTime(40)));
        let id = only_id(&o);
        let outline = o.store().get(id).expect("alive");
        assert_eq!(outline.age(), 2, "merge does not reset age");
        assert_eq!(outline.renders().len(), 2);
        assert_eq!(outline.last_seen(), HostTime(40));
    }

    #[test]
    fn outline_finishes_and_completes_once() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        let log = observed(&mut o);
        o.measurer_mut().place(1, Rect::new(10.0, 10.0, 60.0, 30.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        let id = only_id(&o);

        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        assert!(o.on_complete(id, move |_| counter.set(counter.get() + 1)));

        let mut frames = 0;
        while o.frame(HostTime(frames * 16), &mut painter) {
            frames += 1;
            assert!(painter.snapshot.get(id).is_some(), "drawn while alive");
            assert!(frames < 100, "lifetime is bounded");
        }
        assert_eq!(frames + 1, u64::from(o.config().unimportant_frames));
        assert_eq!(fired.get(), 1);
        assert!(painter.snapshot.get(id).is_none());
        assert!(o.store().is_empty());
        assert!(!o.needs_frame(), "no idle polling");

        o.frame(HostTime(999), &mut painter);
        assert_eq!(fired.get(), 1, "completion fires exactly once");
        assert!(log.borrow().contains(&Seen::Finished(id)));
    }

    #[test]
    fn alpha_fades_toward_zero() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));

        o.frame(HostTime(16), &mut painter);
        let first = painter.snapshot.items[0].alpha;
        o.frame(HostTime(32), &mut painter);
        let second = painter.snapshot.items[0].alpha;
        assert!((first - 0.2 * (1.0 - 1.0 / 5.0)).abs() < 1e-6, "base × (1 − progress)");
        assert!(second < first);
    }

    #[test]
    fn disappearing_node_is_evicted_on_recompute() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        let log = observed(&mut o);
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        let id = only_id(&o);

        assert!(!o.recompute(HostTime(0)), "first poll arms the interval");
        o.measurer_mut().set(1, Ok(Measurement::Hidden));
        assert!(o.recompute(HostTime(200)));

        assert!(!o.store().is_alive(id));
        assert!(log.borrow().contains(&Seen::Evicted(id, EvictReason::Unmeasurable)));
        assert!(!o.frame(HostTime(216), &mut painter));
        assert!(painter.snapshot.is_empty());
    }

    #[test]
    fn hidden_node_is_evicted_on_flush() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        let log = observed(&mut o);
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.measurer_mut().place(2, Rect::new(20.0, 0.0, 30.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        assert!(o.flush(HostTime(0)));
        let id = only_id(&o);

        // Node 1 disappears; the next flush comes from an unrelated render
        // after the cached geometry has expired.
        o.measurer_mut().set(1, Ok(Measurement::Hidden));
        o.on_render(NodeId(2), RenderStats::new(1, 0.0), HostTime(40));
        assert!(o.flush(HostTime(40)));

        assert!(!o.store().is_alive(id));
        assert!(log.borrow().contains(&Seen::Evicted(id, EvictReason::Unmeasurable)));
        assert!(o.frame(HostTime(40), &mut painter));
        assert!(painter.snapshot.get(id).is_none(), "evicted outline is not painted");
        assert_eq!(painter.snapshot.items.len(), 1);
    }

    #[test]
    fn moving_node_is_tracked_without_renders() {
        let mut o = overlay(OverlayConfig::web());
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        let id = only_id(&o);

        o.recompute(HostTime(0));
        let moved = Rect::new(100.0, 50.0, 110.0, 60.0);
        o.measurer_mut().place(1, moved);
        assert!(o.recompute(HostTime(200)));
        assert_eq!(o.store().get(id).expect("alive").rect(), moved);
        assert_eq!(o.store().find(OutlineKey::of(moved)), Some(id));
    }

    #[test]
    fn below_threshold_is_kept_but_not_painted() {
        let mut config = OverlayConfig::web();
        config.render_count_threshold = 5;
        let mut o = overlay(config);
        let mut painter = LastFrame::default();
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(3, 0.0), HostTime(0));
        o.flush(HostTime(0));

        assert!(o.frame(HostTime(16), &mut painter));
        assert_eq!(o.store().len(), 1, "retained for future merges");
        assert!(painter.snapshot.is_empty());

        o.on_render(NodeId(1), RenderStats::new(2, 0.0), HostTime(40));
        o.flush(HostTime(40));
        o.frame(HostTime(48), &mut painter);
        assert_eq!(painter.snapshot.items.len(), 1, "threshold reached");
    }

    #[test]
    fn important_outlines_get_fill_and_label() {
        let mut o = overlay(OverlayConfig::web()).with_significance(CountAtLeast(3));
        let mut painter = LastFrame::default();
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.measurer_mut().place(2, Rect::new(50.0, 0.0, 60.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(3, 0.0).named("List"), HostTime(0));
        o.on_render(NodeId(2), RenderStats::new(1, 0.0).named("Item"), HostTime(0));
        o.flush(HostTime(0));
        o.frame(HostTime(16), &mut painter);

        let items = &painter.snapshot.items;
        assert_eq!(items.len(), 2);
        let list = items.iter().find(|i| i.important).expect("List is important");
        assert_eq!(list.label.as_deref(), Some("List ×3"));
        assert!((list.alpha - 0.8 * (1.0 - 1.0 / 60.0)).abs() < 1e-6, "important base alpha");
        assert!((list.fill_alpha - list.alpha * 0.1).abs() < 1e-6, "fill is a fraction of stroke");
        let item = items.iter().find(|i| !i.important).expect("Item is not");
        assert_eq!(item.label, None);
        assert_eq!(item.fill_alpha, 0.0);
    }

    #[test]
    fn converged_outlines_regroup_in_frame() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        o.measurer_mut().place(1, Rect::new(10.0, 10.0, 60.0, 30.0));
        o.measurer_mut().place(2, Rect::new(10.0, 10.0, 90.0, 50.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.on_render(NodeId(2), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        assert_eq!(o.store().len(), 2, "different sizes are different keys");

        o.frame(HostTime(16), &mut painter);
        let id = only_id(&o);
        assert_eq!(o.store().get(id).expect("alive").renders().len(), 2);
        assert_eq!(painter.snapshot.items.len(), 1);
    }

    #[test]
    fn async_measurement_feeds_the_queue() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut o = overlay(OverlayConfig::native());
        o.measurer_mut().set(1, Ok(Measurement::Pending));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(1));
        assert_eq!(o.awaiting(), 1);
        assert!(o.pending().is_empty());
        assert!(!o.flush(HostTime(2)), "nothing to flush yet");

        o.on_measured(NodeId(1), Ok(Measurement::Visible(rect)), HostTime(3));
        assert_eq!(o.awaiting(), 0);
        assert!(o.flush(HostTime(3)));
        let id = only_id(&o);
        assert_eq!(o.store().get(id).expect("alive").renders().len(), 2);
    }

    #[test]
    fn unanswered_measurement_is_retried_on_recompute() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut o = overlay(OverlayConfig::web());
        o.measurer_mut().set(1, Ok(Measurement::Pending));
        o.measurer_mut().set(2, Ok(Measurement::Pending));
        o.on_render(NodeId(2), RenderStats::new(1, 0.0), HostTime(0));
        assert!(!o.recompute(HostTime(0)), "first poll arms the interval");

        // The host never answers either request.
        let mut renders = 0;
        for t in (0..200).step_by(16) {
            o.on_render(NodeId(1), RenderStats::new(1, 0.5), HostTime(t));
            renders += 1;
        }
        assert_eq!(o.awaiting(), 2);
        assert_eq!(o.measurer_mut().calls, 2, "one request per node while in flight");

        o.measurer_mut().place(1, rect);
        o.measurer_mut().answers.remove(&NodeId(2));
        assert!(o.recompute(HostTime(200)));
        assert_eq!(o.awaiting(), 0, "lost requests no longer hold renders");
        assert!(!o.resolver().is_in_flight(NodeId(1)));
        assert_eq!(o.pending().len(), 1, "node 2 is gone; its renders are dropped");

        assert!(o.flush(HostTime(200)));
        let id = only_id(&o);
        let outline = o.store().get(id).expect("alive");
        assert_eq!(outline.rect(), rect);
        assert_eq!(outline.renders().len(), renders);
    }

    #[test]
    fn late_measurement_after_pause_is_ignored() {
        let mut o = overlay(OverlayConfig::native());
        let log = observed(&mut o);
        o.measurer_mut().set(1, Ok(Measurement::Pending));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.set_paused(true, HostTime(1));
        o.on_measured(
            NodeId(1),
            Ok(Measurement::Visible(Rect::new(0.0, 0.0, 10.0, 10.0))),
            HostTime(2),
        );
        assert!(o.pending().is_empty());
        assert!(o.store().is_empty());

        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(3));
        assert_eq!(o.awaiting(), 0, "renders are ignored while paused");
        o.set_paused(false, HostTime(4));
        assert_eq!(*log.borrow(), vec![Seen::Paused(true), Seen::Paused(false)]);
    }

    #[test]
    fn late_unmeasurable_answer_evicts_live_outline() {
        let mut o = overlay(OverlayConfig::native());
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        let id = only_id(&o);

        o.on_measured(NodeId(1), Err(MeasureError::Detached(NodeId(1))), HostTime(5));
        assert!(!o.store().is_alive(id));
    }

    #[test]
    fn pause_evicts_and_fires_completions() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        let log = observed(&mut o);
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        o.frame(HostTime(16), &mut painter);
        let id = only_id(&o);
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        o.on_complete(id, move |_| flag.set(true));

        o.set_paused(true, HostTime(20));
        assert!(fired.get());
        assert!(o.store().is_empty());
        assert!(o.needs_frame(), "one frame to clear the canvas");
        assert!(!o.frame(HostTime(32), &mut painter));
        assert!(painter.snapshot.is_empty());
        assert!(log.borrow().contains(&Seen::Evicted(id, EvictReason::Paused)));
    }

    #[test]
    fn stale_outlines_are_swept() {
        let mut o = overlay(OverlayConfig::native());
        let log = observed(&mut o);
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        let id = only_id(&o);

        o.recompute(HostTime(0));
        assert!(o.recompute(HostTime(200)));
        assert!(o.store().is_alive(id), "refreshed recently enough");
        assert!(o.recompute(HostTime(600)));
        assert!(!o.store().is_alive(id));
        assert!(log.borrow().contains(&Seen::Evicted(id, EvictReason::Stale)));
    }

    #[test]
    fn faulty_outline_is_isolated() {
        let mut o = overlay(OverlayConfig::web());
        let mut painter = LastFrame::default();
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.measurer_mut().place(2, Rect::new(50.0, 0.0, 60.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        o.on_render(NodeId(2), RenderStats::new(1, 0.0), HostTime(0));
        o.flush(HostTime(0));
        let ids = o.store().ids();

        let broken = o.store.get_mut(ids[0]).expect("alive");
        broken.outline.rect = Rect::new(f64::NAN, 0.0, 10.0, 10.0);
        assert!(o.frame(HostTime(16), &mut painter));
        assert!(!o.store().is_alive(ids[0]));
        assert!(o.store().is_alive(ids[1]));
        assert_eq!(painter.snapshot.items.len(), 1);
    }

    #[test]
    fn malformed_renders_are_dropped() {
        let mut o = overlay(OverlayConfig::web());
        let log = observed(&mut o);
        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.commit_start(HostTime(0));
        o.render(NodeId(1), RenderStats::new(0, 1.0), HostTime(0));
        o.render(NodeId(1), RenderStats::new(1, f64::NAN), HostTime(0));
        o.render(NodeId(1), RenderStats::new(1, 1.0), HostTime(0));
        o.commit_finish(HostTime(0));

        let stats = o.commit_stats();
        assert_eq!(stats.commit, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(o.pending().totals().count, 1);
        assert_eq!(*log.borrow(), vec![Seen::CommitFinish(1)]);
    }

    #[test]
    fn pump_requests_a_frame_after_flush() {
        struct Requests(u32);
        impl FrameScheduler for Requests {
            fn request_frame(&mut self) {
                self.0 += 1;
            }
        }
        let mut o = overlay(OverlayConfig::web());
        let mut host = Requests(0);
        o.pump(HostTime(0), &mut host);
        assert_eq!(host.0, 0, "idle overlay asks for nothing");

        o.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(1));
        o.pump(HostTime(1), &mut host);
        assert_eq!(host.0, 1);
    }

    #[test]
    fn offscreen_renders_never_promote() {
        let mut config = OverlayConfig::web();
        config.viewport = Some(Rect::new(0.0, 0.0, 800.0, 600.0));
        let mut o = overlay(config);
        o.measurer_mut().place(1, Rect::new(900.0, 0.0, 950.0, 10.0));
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(0));
        assert!(o.pending().is_empty());

        o.set_viewport(None);
        o.on_render(NodeId(1), RenderStats::new(1, 0.0), HostTime(100));
        assert_eq!(o.pending().len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = OverlayConfig::web();
        config.max_renders = 0;
        let err = Overlay::new(FakeMeasurer::default(), config, Timebase::MILLIS).err();
        assert_eq!(err, Some(ConfigError::ZeroMaxRenders));
    }
}
