// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract with the paint collaborator.
//!
//! The engine never draws. Each frame step produces a [`FrameSnapshot`]: a
//! read-only list of [`PaintItem`]s the host draws however it likes (canvas,
//! GPU overlay, native view). The host also owns the per-frame callback and
//! is asked for one through [`FrameScheduler`].
//!
//! # Frame loop pseudocode
//!
//! ```rust,ignore
//! fn on_animation_frame(now: HostTime) {
//!     overlay.flush(now);
//!     overlay.recompute(now);
//!     if overlay.frame(now, &mut painter) {
//!         host.request_frame();
//!     }
//! }
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::outline::{OutlineId, Rgb};
use crate::render::RenderTotals;

/// Everything needed to draw one outline.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintItem {
    /// The outline this item was produced from.
    pub id: OutlineId,
    /// Box to stroke.
    pub rect: Rect,
    /// Stroke alpha.
    pub alpha: f32,
    /// Fill alpha; zero unless important.
    pub fill_alpha: f32,
    /// Stroke and fill color.
    pub color: Rgb,
    /// Text drawn above the box; only important outlines carry one.
    pub label: Option<String>,
    /// Summed renders behind this outline.
    pub totals: RenderTotals,
    /// Importance at the time of the snapshot.
    pub important: bool,
}

/// The outlines to draw for one frame, in store order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameSnapshot {
    /// Items to draw.
    pub items: Vec<PaintItem>,
}

impl FrameSnapshot {
    /// Whether there is nothing to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item for `id`, if it was painted.
    #[must_use]
    pub fn get(&self, id: OutlineId) -> Option<&PaintItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Draws frame snapshots.
///
/// Canvas, GPU, and native-view painters implement this trait, enabling
/// generic frame loops and test doubles.
pub trait Painter {
    /// Draws `snapshot`, replacing whatever the previous frame drew.
    fn paint(&mut self, snapshot: &FrameSnapshot);
}

/// Requests a per-frame callback from the host.
pub trait FrameScheduler {
    /// Asks for one more frame callback.
    fn request_frame(&mut self);
}

/// A painter that only remembers the last snapshot.
#[derive(Clone, Debug, Default)]
pub struct LastFrame {
    /// The most recent snapshot.
    pub snapshot: FrameSnapshot,
    /// Number of snapshots painted.
    pub frames: u64,
}

impl Painter for LastFrame {
    fn paint(&mut self, snapshot: &FrameSnapshot) {
        self.snapshot.clone_from(snapshot);
        self.frames += 1;
    }
}
