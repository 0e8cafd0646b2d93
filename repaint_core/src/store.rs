// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot storage for active outlines, indexed by outline key.
//!
//! Outlines are addressed by [`OutlineId`] handles. Each outline occupies a
//! slot; finished outlines are recycled via a free list and generation
//! counters make stale handles fail [`OutlineStore::is_alive`].
//!
//! The store holds at most one outline per [`OutlineKey`]. Every operation
//! that changes geometry ([`relocate`](OutlineStore::relocate)) or groups
//! outlines ([`regroup`](OutlineStore::regroup)) folds colliding outlines
//! into one survivor:
//!
//! - the younger outline (lower age) survives; on a tie the one already
//!   holding the key survives,
//! - alpha and lifetime take the maximum of both,
//! - render lists are concatenated, survivor first,
//! - completion callbacks move to the survivor, so each still fires once.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::config::OverlayConfig;
use crate::geometry::{OutlineKey, PositionKey};
use crate::outline::{ActiveOutline, OutlineId};
use crate::time::HostTime;

/// Record of one outline folded into another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fold {
    /// The outline that remains.
    pub survivor: OutlineId,
    /// The outline that was folded in and whose handle is now stale.
    pub absorbed: OutlineId,
}

/// Storage for every active outline.
#[derive(Debug, Default)]
pub struct OutlineStore {
    // -- Slots --
    slots: Vec<Option<ActiveOutline>>,
    keys: Vec<OutlineKey>,

    // -- Allocation --
    generation: Vec<u32>,
    free_list: Vec<u32>,

    // -- Index --
    by_key: BTreeMap<OutlineKey, u32>,
}

impl OutlineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Allocation API --

    /// Inserts a freshly promoted outline and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if an outline with the same key is already stored. Callers
    /// check [`find`](Self::find) first and merge instead.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "outline counts are bounded far below u32::MAX"
    )]
    pub fn insert(&mut self, outline: ActiveOutline) -> OutlineId {
        let key = outline.outline.key();
        assert!(
            !self.by_key.contains_key(&key),
            "outline key {key:?} is already stored"
        );
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            self.slots[idx as usize] = Some(outline);
            self.keys[idx as usize] = key;
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(outline));
            self.keys.push(key);
            self.generation.push(0);
            idx
        };
        self.by_key.insert(key, idx);
        self.id(idx)
    }

    /// Removes an outline, returning it. Stale handles return `None`.
    pub fn remove(&mut self, id: OutlineId) -> Option<ActiveOutline> {
        if !self.is_alive(id) {
            return None;
        }
        self.release(id.idx)
    }

    /// Returns whether the handle refers to a live outline.
    #[must_use]
    pub fn is_alive(&self, id: OutlineId) -> bool {
        let idx = id.idx as usize;
        idx < self.slots.len() && self.generation[idx] == id.generation && self.slots[idx].is_some()
    }

    // -- Query API --

    /// The outline currently stored under `key`.
    #[must_use]
    pub fn find(&self, key: OutlineKey) -> Option<OutlineId> {
        self.by_key.get(&key).map(|&idx| self.id(idx))
    }

    /// Returns the outline for a live handle.
    #[must_use]
    pub fn get(&self, id: OutlineId) -> Option<&ActiveOutline> {
        if !self.is_alive(id) {
            return None;
        }
        self.slots[id.idx as usize].as_ref()
    }

    /// Mutable access that must not change geometry; use
    /// [`relocate`](Self::relocate) for that.
    pub(crate) fn get_mut(&mut self, id: OutlineId) -> Option<&mut ActiveOutline> {
        if !self.is_alive(id) {
            return None;
        }
        self.slots[id.idx as usize].as_mut()
    }

    /// Handles of every live outline in slot order.
    #[must_use]
    pub fn ids(&self) -> Vec<OutlineId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Iterates over live outlines in slot order.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot indices were allocated as u32"
    )]
    pub fn iter(&self) -> impl Iterator<Item = (OutlineId, &ActiveOutline)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            let outline = slot.as_ref()?;
            Some((
                OutlineId {
                    idx: idx as u32,
                    generation: self.generation[idx],
                },
                outline,
            ))
        })
    }

    /// Number of live outlines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether no outline is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // -- Geometry API --

    /// Moves an outline to new geometry measured at `at`.
    ///
    /// If the new key is held by another outline the two are folded.
    /// Returns the fold when one happened. Stale handles are ignored.
    pub fn relocate(
        &mut self,
        id: OutlineId,
        rect: Rect,
        at: HostTime,
        config: &OverlayConfig,
    ) -> Option<Fold> {
        if !self.is_alive(id) {
            return None;
        }
        let idx = id.idx;
        let old_key = self.keys[idx as usize];
        let new_key = OutlineKey::of(rect);
        if let Some(outline) = self.slots[idx as usize].as_mut() {
            outline.outline.rect = rect;
            outline.outline.measured_at = at;
        }
        if new_key == old_key {
            return None;
        }

        self.by_key.remove(&old_key);
        self.keys[idx as usize] = new_key;
        match self.by_key.get(&new_key).copied() {
            None => {
                self.by_key.insert(new_key, idx);
                None
            }
            Some(occupant) => {
                // The occupant holds the key; the mover only wins if younger.
                let (survivor, victim) = if self.age_of(idx) < self.age_of(occupant) {
                    self.by_key.insert(new_key, idx);
                    (idx, occupant)
                } else {
                    (occupant, idx)
                };
                Some(self.fold(survivor, victim, config))
            }
        }
    }

    /// Folds outlines that share a rounded position.
    ///
    /// Returns every fold, in slot order of the absorbed outline.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot indices were allocated as u32"
    )]
    pub fn regroup(&mut self, config: &OverlayConfig) -> Vec<Fold> {
        let mut at: BTreeMap<PositionKey, u32> = BTreeMap::new();
        let mut folds = Vec::new();
        for idx in 0..self.slots.len() as u32 {
            if self.slots[idx as usize].is_none() {
                continue;
            }
            let pos = self.keys[idx as usize].position();
            match at.get(&pos).copied() {
                None => {
                    at.insert(pos, idx);
                }
                Some(held) => {
                    let (survivor, victim) = if self.age_of(idx) < self.age_of(held) {
                        (idx, held)
                    } else {
                        (held, idx)
                    };
                    at.insert(pos, survivor);
                    folds.push(self.fold(survivor, victim, config));
                }
            }
        }
        folds
    }

    /// Removes every outline, returning them in slot order.
    pub fn drain(&mut self) -> Vec<(OutlineId, ActiveOutline)> {
        let ids = self.ids();
        ids.into_iter()
            .filter_map(|id| Some((id, self.release(id.idx)?)))
            .collect()
    }

    /// Asserts that the key index and slot contents agree.
    ///
    /// # Panics
    ///
    /// Panics if two live outlines share a key or the index is stale.
    pub fn validate(&self) {
        let mut live = 0;
        for (idx, slot) in self.slots.iter().enumerate() {
            let Some(outline) = slot else {
                continue;
            };
            live += 1;
            let key = self.keys[idx];
            assert_eq!(
                outline.outline.key(),
                key,
                "slot {idx} is indexed under a stale key"
            );
            assert_eq!(
                self.by_key.get(&key).map(|&i| i as usize),
                Some(idx),
                "key {key:?} does not point at slot {idx}"
            );
        }
        assert_eq!(live, self.by_key.len(), "index holds dead entries");
    }

    // -- Internal helpers --

    fn id(&self, idx: u32) -> OutlineId {
        OutlineId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    fn age_of(&self, idx: u32) -> u32 {
        self.slots[idx as usize]
            .as_ref()
            .map_or(u32::MAX, |o| o.age)
    }

    /// Frees a slot without touching any other slot's index entry.
    fn release(&mut self, idx: u32) -> Option<ActiveOutline> {
        let outline = self.slots[idx as usize].take()?;
        let key = self.keys[idx as usize];
        if self.by_key.get(&key) == Some(&idx) {
            self.by_key.remove(&key);
        }
        // Bump generation so old handles immediately fail validation.
        self.generation[idx as usize] += 1;
        self.free_list.push(idx);
        Some(outline)
    }

    /// Folds `victim` into `survivor`; the survivor keeps its geometry.
    fn fold(&mut self, survivor: u32, victim: u32, config: &OverlayConfig) -> Fold {
        let absorbed = self.id(victim);
        let taken = self.release(victim);
        let fold = Fold {
            survivor: self.id(survivor),
            absorbed,
        };
        let (Some(victim), Some(target)) = (taken, self.slots[survivor as usize].as_mut()) else {
            return fold;
        };
        target.alpha = target.alpha.max(victim.alpha);
        target.total_frames = target.total_frames.max(victim.total_frames);
        target.last_seen = target.last_seen.max(victim.last_seen);
        target.outline.renders.extend(victim.outline.renders);
        target.completions.extend(victim.completions);
        target.recolor(config);
        fold
    }
}
