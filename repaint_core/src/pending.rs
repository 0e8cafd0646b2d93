// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The pending queue: resolved render observations awaiting a flush.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::geometry::{OutlineKey, Resolved};
use crate::node::NodeId;
use crate::render::{RenderEvent, RenderTotals};
use crate::time::HostTime;

/// A region with renders that has not been admitted to the active set yet.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingOutline {
    /// Canonical handle of the node backing this region.
    pub node: NodeId,
    /// Last measured geometry.
    pub rect: Rect,
    /// When `rect` was measured.
    pub measured_at: HostTime,
    /// Renders observed for this region, in arrival order.
    pub renders: Vec<RenderEvent>,
}

impl PendingOutline {
    /// Creates a pending outline with a single render.
    #[must_use]
    pub fn new(node: NodeId, rect: Rect, measured_at: HostTime, render: RenderEvent) -> Self {
        Self {
            node,
            rect,
            measured_at,
            renders: alloc::vec![render],
        }
    }

    /// The identity key of this outline's current geometry.
    #[must_use]
    pub fn key(&self) -> OutlineKey {
        OutlineKey::of(self.rect)
    }

    /// Folds `other` into `self`.
    ///
    /// Render lists are concatenated in order (`self` first). The geometry
    /// and backing node of whichever side was measured more recently win.
    pub fn merge(&mut self, mut other: Self) {
        if other.measured_at >= self.measured_at {
            self.rect = other.rect;
            self.node = other.node;
            self.measured_at = other.measured_at;
        }
        self.renders.append(&mut other.renders);
    }
}

/// Per-tick collection of pending outlines, deduplicated by key.
#[derive(Clone, Debug, Default)]
pub struct PendingQueue {
    entries: Vec<PendingOutline>,
    index: BTreeMap<OutlineKey, usize>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an outline, merging it into an existing entry with the same key.
    pub fn push(&mut self, outline: PendingOutline) {
        let key = outline.key();
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].merge(outline),
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(outline);
            }
        }
    }

    /// Re-measures every entry, dropping those that resolve unmeasurable.
    ///
    /// Entries whose measurement is still pending keep their geometry.
    /// Entries that converge on one key after re-measuring are merged.
    /// Returns the number of dropped entries.
    pub fn remeasure(
        &mut self,
        now: HostTime,
        mut resolve: impl FnMut(NodeId) -> Resolved,
    ) -> usize {
        let before = self.entries.len();
        let entries = core::mem::take(&mut self.entries);
        self.index.clear();
        let mut dropped = 0;
        for mut outline in entries {
            match resolve(outline.node) {
                Resolved::Visible(rect) => {
                    outline.rect = rect;
                    outline.measured_at = now;
                }
                Resolved::Pending => {}
                Resolved::Unmeasurable => {
                    dropped += 1;
                    continue;
                }
            }
            self.push(outline);
        }
        debug_assert!(self.entries.len() + dropped <= before, "remeasure never grows the queue");
        dropped
    }

    /// Removes and returns every entry in insertion order.
    pub fn drain(&mut self) -> Vec<PendingOutline> {
        self.index.clear();
        core::mem::take(&mut self.entries)
    }

    /// Summed render stats over every entry.
    #[must_use]
    pub fn totals(&self) -> RenderTotals {
        let mut totals = RenderTotals::default();
        for outline in &self.entries {
            totals.extend(&outline.renders);
        }
        totals
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Number of distinct queued regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over queued outlines.
    pub fn iter(&self) -> impl Iterator<Item = &PendingOutline> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderStats;

    fn outline(node: u64, rect: Rect, at: u64, count: u32) -> PendingOutline {
        let render = RenderEvent::new(NodeId(node), RenderStats::new(count, 1.0)).expect("valid");
        PendingOutline::new(NodeId(node), rect, HostTime(at), render)
    }

    #[test]
    fn same_key_merges_losslessly() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        let mut queue = PendingQueue::new();
        queue.push(outline(1, rect, 0, 1));
        queue.push(outline(2, rect, 1, 2));

        assert_eq!(queue.len(), 1);
        let merged = queue.iter().next().expect("one entry");
        assert_eq!(merged.renders.len(), 2);
        assert_eq!(merged.renders[0].node(), NodeId(1), "order is preserved");
        assert_eq!(merged.node, NodeId(2), "fresher measurement wins");
        assert_eq!(queue.totals().count, 3);
    }

    #[test]
    fn merge_keeps_fresher_geometry() {
        let mut a = outline(1, Rect::new(0.0, 0.0, 10.0, 10.0), 5, 1);
        let b = outline(2, Rect::new(0.2, 0.0, 10.2, 10.0), 3, 1);
        a.merge(b);
        assert_eq!(a.rect, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(a.node, NodeId(1));
        assert_eq!(a.renders.len(), 2);
    }

    #[test]
    fn different_keys_stay_apart() {
        let mut queue = PendingQueue::new();
        queue.push(outline(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0, 1));
        queue.push(outline(2, Rect::new(0.0, 0.0, 10.0, 11.0), 0, 1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn remeasure_drops_and_merges() {
        let mut queue = PendingQueue::new();
        queue.push(outline(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0, 1));
        queue.push(outline(2, Rect::new(50.0, 0.0, 60.0, 10.0), 0, 1));
        queue.push(outline(3, Rect::new(90.0, 0.0, 99.0, 10.0), 0, 1));

        let dropped = queue.remeasure(HostTime(10), |node| match node.0 {
            // Node 2 moved onto node 1's rectangle.
            1 | 2 => Resolved::Visible(Rect::new(0.0, 0.0, 10.0, 10.0)),
            _ => Resolved::Unmeasurable,
        });

        assert_eq!(dropped, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.totals().count, 2, "converged entries keep all renders");
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut queue = PendingQueue::new();
        queue.push(outline(1, Rect::new(0.0, 0.0, 10.0, 10.0), 0, 1));
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.totals().count, 0, "drained renders are not counted again");
    }
}
