// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outline lifecycle notifications for UI-state collaborators.
//!
//! Toolbars, inspectors, and paint-completion waiters register an
//! [`Observer`] with the engine. Notifications are pushed synchronously from
//! the engine pass that caused them; observers only ever see handles and
//! copies, never the engine's storage.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::hook::CommitStats;
use crate::outline::OutlineId;
use crate::render::RenderTotals;
use crate::trace::EvictReason;

/// Receives lifecycle notifications from the engine.
///
/// All methods have default no-op implementations.
pub trait Observer {
    /// A host commit began.
    fn on_commit_start(&mut self, commit: u64) {
        _ = commit;
    }

    /// A host commit finished.
    fn on_commit_finish(&mut self, stats: &CommitStats) {
        _ = stats;
    }

    /// A flush promoted these outlines and is about to hand them to paint.
    fn on_paint_start(&mut self, promoted: &[OutlineId]) {
        _ = promoted;
    }

    /// An outline reached the end of its lifetime and is no longer drawn.
    fn on_outline_finished(&mut self, id: OutlineId) {
        _ = id;
    }

    /// An outline was removed before its lifetime elapsed.
    fn on_outline_evicted(&mut self, id: OutlineId, reason: EvictReason) {
        _ = (id, reason);
    }

    /// Aggregate counters of the latest flushed batch.
    fn on_totals(&mut self, totals: RenderTotals) {
        _ = totals;
    }

    /// The overlay was paused or resumed.
    fn on_paused(&mut self, paused: bool) {
        _ = paused;
    }
}

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subscription(u64);

/// Registered observers, notified in subscription order.
#[derive(Default)]
pub struct Subscribers {
    entries: Vec<(Subscription, Box<dyn Observer>)>,
    next: u64,
}

impl core::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscribers")
            .field("entries", &self.entries.len())
            .field("next", &self.next)
            .finish()
    }
}

impl Subscribers {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer.
    pub fn subscribe(&mut self, observer: Box<dyn Observer>) -> Subscription {
        let id = Subscription(self.next);
        self.next += 1;
        self.entries.push((id, observer));
        id
    }

    /// Removes an observer. Returns it if it was registered.
    pub fn unsubscribe(&mut self, id: Subscription) -> Option<Box<dyn Observer>> {
        let pos = self.entries.iter().position(|(s, _)| *s == id)?;
        Some(self.entries.remove(pos).1)
    }

    /// Calls `f` on every observer.
    pub fn notify(&mut self, mut f: impl FnMut(&mut dyn Observer)) {
        for (_, observer) in &mut self.entries {
            f(observer.as_mut());
        }
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::RefCell;

    use super::*;

    struct Count(Rc<RefCell<u32>>);

    impl Observer for Count {
        fn on_paused(&mut self, _paused: bool) {
            *self.0.borrow_mut() += 1;
        }
    }

    #[test]
    fn notifies_until_unsubscribed() {
        let hits = Rc::new(RefCell::new(0));
        let mut subs = Subscribers::new();
        let a = subs.subscribe(Box::new(Count(hits.clone())));
        subs.subscribe(Box::new(Count(hits.clone())));

        subs.notify(|o| o.on_paused(true));
        assert_eq!(*hits.borrow(), 2);

        assert!(subs.unsubscribe(a).is_some());
        assert!(subs.unsubscribe(a).is_none(), "second removal is a no-op");
        subs.notify(|o| o.on_paused(false));
        assert_eq!(*hits.borrow(), 3);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn default_methods_are_no_ops() {
        struct Silent;
        impl Observer for Silent {}
        let mut subs = Subscribers::new();
        subs.subscribe(Box::new(Silent));
        subs.notify(|o| {
            o.on_commit_start(1);
            o.on_totals(RenderTotals::default());
        });
    }
}
