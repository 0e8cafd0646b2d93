// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geometry resolution, caching, and outline identity keys.
//!
//! All geometry is a [`kurbo::Rect`] in a single viewport coordinate space.
//!
//! # Keys
//!
//! [`OutlineKey`] is the identity of an on-screen region: the rectangle's
//! origin and size, each rounded to whole units. Equality is exact on the
//! rounded values. [`PositionKey`] keeps only the rounded origin and is used
//! by the frame step to regroup outlines that converged on one position.
//!
//! # Resolution
//!
//! [`GeometryResolver`] sits between the engine and the platform
//! [`Measure`] collaborator:
//!
//! 1. Fresh cache entries (younger than the TTL) are returned directly.
//! 2. Otherwise the measurer is asked. It may answer synchronously, report
//!    the node hidden, fail, or report [`Measurement::Pending`]; pending
//!    nodes are tracked in flight until [`GeometryResolver::complete`] or
//!    until the request timeout passes, after which the request counts as
//!    lost and the next read measures again.
//! 3. Accepted rectangles are checked for visibility (finite, non-zero
//!    area, intersecting the viewport) and written to the cache under the
//!    canonical identity and, if it differs, the alternate's.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::error::MeasureError;
use crate::node::{Identity, NodeId};
use crate::time::{Duration, HostTime};

/// Identity of an outline: rounded origin and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutlineKey {
    /// Rounded left edge.
    pub x: i64,
    /// Rounded top edge.
    pub y: i64,
    /// Rounded width.
    pub width: i64,
    /// Rounded height.
    pub height: i64,
}

impl OutlineKey {
    /// Derives the key of `rect`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "rounded screen coordinates fit in i64; non-finite rects never reach the store"
    )]
    pub fn of(rect: Rect) -> Self {
        let origin = rect.origin().round();
        let size = rect.size().round();
        Self {
            x: origin.x as i64,
            y: origin.y as i64,
            width: size.width as i64,
            height: size.height as i64,
        }
    }

    /// The position part of this key.
    #[must_use]
    pub fn position(self) -> PositionKey {
        PositionKey {
            x: self.x,
            y: self.y,
        }
    }
}

/// Rounded origin of an outline, used for per-frame regrouping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey {
    /// Rounded left edge.
    pub x: i64,
    /// Rounded top edge.
    pub y: i64,
}

/// What the platform measurer reports for a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Measurement {
    /// The node's on-screen rectangle.
    Visible(Rect),
    /// The node exists but is suppressed (display none, zero opacity,
    /// ignored subtree).
    Hidden,
    /// The measurement was started and will be delivered later through
    /// [`Overlay::on_measured`](crate::engine::Overlay::on_measured).
    Pending,
}

/// Platform geometry collaborator.
///
/// Implementations query the host's layout (DOM bounding boxes, native view
/// measurement, ...). The [`Identity`] supertrait folds double-buffered
/// handles so cache entries are shared between them.
pub trait Measure: Identity {
    /// Measures `node`.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError`] when the node cannot be measured at all. The
    /// engine treats errors like [`Measurement::Hidden`].
    fn measure(&mut self, node: NodeId) -> Result<Measurement, MeasureError>;
}

/// The outcome of resolving a node's geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolved {
    /// The node is visible at this rectangle.
    Visible(Rect),
    /// The node is detached, hidden, off-screen, or has zero area.
    Unmeasurable,
    /// A measurement is in flight; keep whatever geometry is current.
    Pending,
}

impl Resolved {
    /// The rectangle, if visible.
    #[must_use]
    pub fn rect(self) -> Option<Rect> {
        match self {
            Self::Visible(rect) => Some(rect),
            Self::Unmeasurable | Self::Pending => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    rect: Rect,
    measured_at: HostTime,
}

/// Canonical-keyed geometry cache with a time-to-live.
///
/// Entries are never consulted once older than the TTL, and
/// [`prune`](Self::prune) drops them. The cache does not keep outlines alive;
/// it only serves reads.
#[derive(Clone, Debug)]
pub struct GeometryCache {
    entries: BTreeMap<NodeId, CacheEntry>,
    ttl: Duration,
}

impl GeometryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl,
        }
    }

    /// Returns the cached rectangle for `node` if it is still fresh.
    #[must_use]
    pub fn get(&self, node: NodeId, now: HostTime) -> Option<(Rect, HostTime)> {
        let entry = self.entries.get(&node)?;
        (!now.has_elapsed(entry.measured_at, self.ttl)).then_some((entry.rect, entry.measured_at))
    }

    /// Records a fresh measurement.
    pub fn insert(&mut self, node: NodeId, rect: Rect, now: HostTime) {
        self.entries.insert(
            node,
            CacheEntry {
                rect,
                measured_at: now,
            },
        );
    }

    /// Forgets `node`.
    pub fn remove(&mut self, node: NodeId) {
        self.entries.remove(&node);
    }

    /// Drops every expired entry.
    pub fn prune(&mut self, now: HostTime) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| !now.has_elapsed(entry.measured_at, ttl));
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves nodes to visible geometry through a cache and a [`Measure`]
/// collaborator.
#[derive(Debug)]
pub struct GeometryResolver<M> {
    measurer: M,
    cache: GeometryCache,
    viewport: Option<Rect>,
    // Outstanding asynchronous requests by canonical node, with start time.
    in_flight: BTreeMap<NodeId, HostTime>,
    request_timeout: Duration,
}

impl<M: Measure> GeometryResolver<M> {
    /// Creates a resolver with an empty cache.
    ///
    /// Asynchronous requests time out after `ttl` until
    /// [`with_request_timeout`](Self::with_request_timeout) says otherwise.
    #[must_use]
    pub fn new(measurer: M, ttl: Duration, viewport: Option<Rect>) -> Self {
        Self {
            measurer,
            cache: GeometryCache::new(ttl),
            viewport,
            in_flight: BTreeMap::new(),
            request_timeout: ttl,
        }
    }

    /// Sets how long an asynchronous request may stay unanswered before it
    /// is treated as lost.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The canonical identity of `node`.
    #[must_use]
    pub fn canonical(&self, node: NodeId) -> NodeId {
        self.measurer.canonical(node)
    }

    /// Resolves `node`, using the cache when fresh.
    pub fn resolve(&mut self, node: NodeId, now: HostTime) -> Resolved {
        let key = self.measurer.canonical(node);
        if let Some((rect, _)) = self.cache.get(key, now) {
            return Resolved::Visible(rect);
        }
        if let Some(&started) = self.in_flight.get(&key) {
            if !now.has_elapsed(started, self.request_timeout) {
                return Resolved::Pending;
            }
            tracing::debug!(node = ?key, "asynchronous measurement lost; measuring again");
            self.in_flight.remove(&key);
        }
        match self.measurer.measure(node) {
            Ok(Measurement::Visible(rect)) => self.accept(node, rect, now),
            Ok(Measurement::Hidden) => Resolved::Unmeasurable,
            Ok(Measurement::Pending) => {
                self.in_flight.insert(key, now);
                Resolved::Pending
            }
            Err(err) => {
                tracing::debug!(%err, "treating node as unmeasurable");
                Resolved::Unmeasurable
            }
        }
    }

    /// Applies an asynchronously delivered measurement.
    ///
    /// Results for nodes with no measurement in flight are still cached, so a
    /// late answer can serve the next read.
    pub fn complete(
        &mut self,
        node: NodeId,
        result: Result<Measurement, MeasureError>,
        now: HostTime,
    ) -> Resolved {
        let key = self.measurer.canonical(node);
        self.in_flight.remove(&key);
        match result {
            Ok(Measurement::Visible(rect)) => self.accept(node, rect, now),
            // A second deferral for the same request is treated as a loss.
            Ok(Measurement::Hidden | Measurement::Pending) => {
                self.cache.remove(key);
                Resolved::Unmeasurable
            }
            Err(err) => {
                tracing::debug!(%err, "late measurement failed");
                self.cache.remove(key);
                Resolved::Unmeasurable
            }
        }
    }

    /// Whether a measurement for `node` is outstanding.
    #[must_use]
    pub fn is_in_flight(&self, node: NodeId) -> bool {
        self.in_flight.contains_key(&self.measurer.canonical(node))
    }

    /// Forgets requests unanswered for longer than the request timeout.
    ///
    /// Returns the canonical nodes whose requests were dropped.
    pub fn expire(&mut self, now: HostTime) -> Vec<NodeId> {
        let timeout = self.request_timeout;
        let lost: Vec<NodeId> = self
            .in_flight
            .iter()
            .filter(|(_, started)| now.has_elapsed(**started, timeout))
            .map(|(node, _)| *node)
            .collect();
        for node in &lost {
            self.in_flight.remove(node);
        }
        lost
    }

    /// Checks visibility and writes the cache on success.
    fn accept(&mut self, node: NodeId, rect: Rect, now: HostTime) -> Resolved {
        let rect = rect.abs();
        if !self.is_visible(rect) {
            return Resolved::Unmeasurable;
        }
        let key = self.measurer.canonical(node);
        self.cache.insert(key, rect, now);
        if let Some(alternate) = self.measurer.alternate(node) {
            let alt_key = self.measurer.canonical(alternate);
            if alt_key != key {
                self.cache.insert(alt_key, rect, now);
            }
        }
        Resolved::Visible(rect)
    }

    fn is_visible(&self, rect: Rect) -> bool {
        if !rect.is_finite() || rect.width() <= 0.0 || rect.height() <= 0.0 {
            return false;
        }
        match self.viewport {
            Some(viewport) => {
                rect.x1 > viewport.x0
                    && rect.y1 > viewport.y0
                    && rect.x0 < viewport.x1
                    && rect.y0 < viewport.y1
            }
            None => true,
        }
    }

    /// Drops expired cache entries.
    pub fn prune(&mut self, now: HostTime) {
        self.cache.prune(now);
    }

    /// Drops all cached geometry and forgets in-flight requests.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
    }

    /// Replaces the viewport used for visibility checks.
    pub fn set_viewport(&mut self, viewport: Option<Rect>) {
        self.viewport = viewport;
    }

    /// The geometry cache.
    #[must_use]
    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    /// The measurement collaborator.
    #[must_use]
    pub fn measurer(&self) -> &M {
        &self.measurer
    }

    /// Mutable access to the measurement collaborator.
    pub fn measurer_mut(&mut self) -> &mut M {
        &mut self.measurer
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::collections::BTreeMap;

    use super::*;
    use crate::node::PairedByBit;

    /// Scripted measurer shared by the engine tests.
    #[derive(Debug, Default)]
    pub(crate) struct FakeMeasurer {
        pub(crate) answers: BTreeMap<NodeId, Result<Measurement, MeasureError>>,
        pub(crate) calls: u32,
        pub(crate) flip: Option<u64>,
    }

    impl FakeMeasurer {
        pub(crate) fn place(&mut self, node: u64, rect: Rect) {
            self.answers
                .insert(NodeId(node), Ok(Measurement::Visible(rect)));
        }

        pub(crate) fn set(&mut self, node: u64, answer: Result<Measurement, MeasureError>) {
            self.answers.insert(NodeId(node), answer);
        }
    }

    impl Identity for FakeMeasurer {
        fn canonical(&self, node: NodeId) -> NodeId {
            match self.flip {
                Some(flip) => PairedByBit { flip }.canonical(node),
                None => node,
            }
        }

        fn alternate(&self, node: NodeId) -> Option<NodeId> {
            self.flip.map(|flip| NodeId(node.0 ^ flip))
        }
    }

    impl Measure for FakeMeasurer {
        fn measure(&mut self, node: NodeId) -> Result<Measurement, MeasureError> {
            self.calls += 1;
            let key = self.canonical(node);
            self.answers
                .get(&key)
                .copied()
                .unwrap_or(Err(MeasureError::Detached(node)))
        }
    }

    fn resolver(ttl: u64) -> GeometryResolver<FakeMeasurer> {
        GeometryResolver::new(FakeMeasurer::default(), Duration(ttl), None)
    }

    #[test]
    fn key_rounds_origin_and_size() {
        let a = OutlineKey::of(Rect::new(10.4, 9.6, 60.4, 29.6));
        assert_eq!(
            a,
            OutlineKey {
                x: 10,
                y: 10,
                width: 50,
                height: 20
            }
        );
        let b = OutlineKey::of(Rect::new(10.6, 10.0, 60.6, 30.0));
        assert_ne!(a, b, "no epsilon fuzzing beyond rounding");
        assert_eq!(a.position(), PositionKey { x: 10, y: 10 });
    }

    #[test]
    fn cache_serves_within_ttl() {
        let mut r = resolver(100);
        r.measurer_mut().place(1, Rect::new(0.0, 0.0, 10.0, 10.0));

        assert!(matches!(r.resolve(NodeId(1), HostTime(0)), Resolved::Visible(_)));
        assert!(matches!(r.resolve(NodeId(1), HostTime(99)), Resolved::Visible(_)));
        assert_eq!(r.measurer().calls, 1, "second read is served from cache");

        let _ = r.resolve(NodeId(1), HostTime(100));
        assert_eq!(r.measurer().calls, 2, "expired entry triggers a measurement");
    }

    #[test]
    fn zero_area_and_offscreen_are_unmeasurable() {
        let mut r = resolver(100);
        r.set_viewport(Some(Rect::new(0.0, 0.0, 800.0, 600.0)));
        r.measurer_mut().place(1, Rect::new(5.0, 5.0, 5.0, 30.0));
        r.measurer_mut().place(2, Rect::new(900.0, 10.0, 950.0, 40.0));
        r.measurer_mut().place(3, Rect::new(-50.0, -50.0, 0.0, 0.0));
        r.measurer_mut().place(4, Rect::new(-50.0, -50.0, 1.0, 1.0));

        assert_eq!(r.resolve(NodeId(1), HostTime(0)), Resolved::Unmeasurable);
        assert_eq!(r.resolve(NodeId(2), HostTime(0)), Resolved::Unmeasurable);
        assert_eq!(r.resolve(NodeId(3), HostTime(0)), Resolved::Unmeasurable);
        assert!(
            matches!(r.resolve(NodeId(4), HostTime(0)), Resolved::Visible(_)),
            "partially visible rects count"
        );
        assert_eq!(r.cache().len(), 1, "only visible geometry is cached");
    }

    #[test]
    fn errors_and_hidden_degrade_to_unmeasurable() {
        let mut r = resolver(100);
        r.measurer_mut().set(1, Ok(Measurement::Hidden));
        assert_eq!(r.resolve(NodeId(1), HostTime(0)), Resolved::Unmeasurable);
        assert_eq!(r.resolve(NodeId(2), HostTime(0)), Resolved::Unmeasurable);
    }

    #[test]
    fn pending_measurement_is_tracked_until_complete() {
        let mut r = resolver(100);
        r.measurer_mut().set(1, Ok(Measurement::Pending));

        assert_eq!(r.resolve(NodeId(1), HostTime(0)), Resolved::Pending);
        assert!(r.is_in_flight(NodeId(1)));
        assert_eq!(r.resolve(NodeId(1), HostTime(1)), Resolved::Pending);
        assert_eq!(r.measurer().calls, 1, "in-flight node is not re-measured");

        let rect = Rect::new(0.0, 0.0, 20.0, 20.0);
        let done = r.complete(NodeId(1), Ok(Measurement::Visible(rect)), HostTime(5));
        assert_eq!(done, Resolved::Visible(rect));
        assert!(!r.is_in_flight(NodeId(1)));
        assert_eq!(r.resolve(NodeId(1), HostTime(6)), Resolved::Visible(rect));
    }

    #[test]
    fn unanswered_request_is_retried_after_timeout() {
        let mut r = resolver(100).with_request_timeout(Duration(50));
        r.measurer_mut().set(1, Ok(Measurement::Pending));

        assert_eq!(r.resolve(NodeId(1), HostTime(0)), Resolved::Pending);
        assert_eq!(r.resolve(NodeId(1), HostTime(49)), Resolved::Pending);
        assert_eq!(r.measurer().calls, 1);

        let rect = Rect::new(0.0, 0.0, 20.0, 20.0);
        r.measurer_mut().place(1, rect);
        assert_eq!(
            r.resolve(NodeId(1), HostTime(50)),
            Resolved::Visible(rect),
            "a lost request does not block the node"
        );
        assert_eq!(r.measurer().calls, 2);
        assert!(!r.is_in_flight(NodeId(1)));
    }

    #[test]
    fn expire_reports_lost_requests() {
        let mut r = resolver(100).with_request_timeout(Duration(50));
        r.measurer_mut().set(1, Ok(Measurement::Pending));
        r.measurer_mut().set(2, Ok(Measurement::Pending));
        let _ = r.resolve(NodeId(1), HostTime(0));
        let _ = r.resolve(NodeId(2), HostTime(30));

        assert!(r.expire(HostTime(49)).is_empty());
        assert_eq!(r.expire(HostTime(60)), [NodeId(1)]);
        assert!(!r.is_in_flight(NodeId(1)));
        assert!(r.is_in_flight(NodeId(2)), "younger request is kept");
    }

    #[test]
    fn alternate_handles_share_the_cache_line() {
        let flip = 1 << 40;
        let mut r = resolver(100);
        r.measurer_mut().flip = Some(flip);
        r.measurer_mut().place(3, Rect::new(0.0, 0.0, 10.0, 10.0));

        let _ = r.resolve(NodeId(3 | flip), HostTime(0));
        let _ = r.resolve(NodeId(3), HostTime(1));
        assert_eq!(r.measurer().calls, 1, "both buffers read one entry");
        assert_eq!(r.cache().len(), 1);
    }

    #[test]
    fn prune_drops_expired_entries() {
        let mut cache = GeometryCache::new(Duration(10));
        cache.insert(NodeId(1), Rect::new(0.0, 0.0, 1.0, 1.0), HostTime(0));
        cache.insert(NodeId(2), Rect::new(0.0, 0.0, 1.0, 1.0), HostTime(5));
        cache.prune(HostTime(12));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(NodeId(2), HostTime(12)).is_some());
    }
}
