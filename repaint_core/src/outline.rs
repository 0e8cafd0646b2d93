// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Active outlines: the animating representation of a re-rendered region.
//!
//! An [`ActiveOutline`] is created when a [`PendingOutline`] is promoted by a
//! flush and lives until its age reaches its frame budget or its backing
//! node stops being measurable. Between those points:
//!
//! - `age` only grows (the frame step adds one per frame),
//! - `total_frames` is fixed at promotion and only ever lengthened by a
//!   regroup,
//! - the render list only grows.
//!
//! # Importance
//!
//! An outline is *important* when the host's [`Significance`] predicate
//! accepts its accumulated renders, or when labels are forced on. Important
//! outlines get a longer lifetime, a stronger alpha, a translucent fill, and
//! a text label. Importance is re-evaluated every frame since the render
//! list grows.
//!
//! # Color
//!
//! Color interpolates linearly from [`START_COLOR`] to [`END_COLOR`] along
//! the cost `count × max(duration, 1)`, normalized against `max_renders` so
//! that a single cheap render sits exactly on the start color; see
//! [`cost_parameter`].

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

use crate::config::OverlayConfig;
use crate::error::OutlineFault;
use crate::pending::PendingOutline;
use crate::render::{RenderEvent, RenderTotals, label_text};
use crate::time::HostTime;

/// A handle to an outline in an [`OutlineStore`](crate::store::OutlineStore).
///
/// Carries a slot index and a generation so that handles to finished
/// outlines never alias a later outline reusing the slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutlineId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl OutlineId {
    /// Rebuilds a handle from its raw parts.
    ///
    /// Used when replaying recorded traces. The result is not checked against
    /// any store.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            idx: index,
            generation,
        }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for OutlineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutlineId({}@gen{})", self.idx, self.generation)
    }
}

/// An 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

/// Color of cheap, infrequent renders.
pub const START_COLOR: Rgb = Rgb {
    r: 115,
    g: 97,
    b: 230,
};

/// Color of expensive, frequent renders.
pub const END_COLOR: Rgb = Rgb {
    r: 185,
    g: 49,
    b: 115,
};

impl Rgb {
    /// Linear interpolation toward `to`; `t` is clamped to `0..=1`.
    #[must_use]
    pub fn lerp(self, to: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            r: lerp_channel(self.r, to.r, t),
            g: lerp_channel(self.g, to.g, t),
            b: lerp_channel(self.b, to.b, t),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "interpolating between two u8 values with t in 0..=1 stays in 0..=255"
)]
fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    let v = f64::from(from) + t * (f64::from(to) - f64::from(from));
    (v + 0.5) as u8
}

/// Normalized render cost in `0..=1`.
///
/// The raw cost `count × max(duration, 1)` is measured from the cheapest
/// possible outline (one render, at most 1 ms), so that outline maps to `0`
/// and a raw cost of `max_renders` maps to `1`. Monotonic in both the summed
/// count and the summed duration.
#[must_use]
pub fn cost_parameter(totals: RenderTotals, max_renders: u32) -> f64 {
    const FLOOR: f64 = 1.0;
    let raw = totals.count as f64 * totals.duration.max(1.0);
    let span = (f64::from(max_renders) - FLOOR).max(1.0);
    ((raw - FLOOR) / span).clamp(0.0, 1.0)
}

/// Color for the given renders.
#[must_use]
pub fn color_for(renders: &[RenderEvent], max_renders: u32) -> Rgb {
    START_COLOR.lerp(END_COLOR, cost_parameter(RenderTotals::of(renders), max_renders))
}

/// Host policy deciding whether accumulated renders are significant
/// (unstable, wasteful, worth labeling).
pub trait Significance {
    /// Whether `renders` warrant an important outline.
    fn is_significant(&self, renders: &[RenderEvent]) -> bool;
}

impl<F> Significance for F
where
    F: Fn(&[RenderEvent]) -> bool,
{
    fn is_significant(&self, renders: &[RenderEvent]) -> bool {
        self(renders)
    }
}

/// A policy under which no renders are significant.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverSignificant;

impl Significance for NeverSignificant {
    fn is_significant(&self, _renders: &[RenderEvent]) -> bool {
        false
    }
}

/// Renders are significant once their summed count reaches a threshold.
#[derive(Clone, Copy, Debug)]
pub struct CountAtLeast(pub u64);

impl Significance for CountAtLeast {
    fn is_significant(&self, renders: &[RenderEvent]) -> bool {
        RenderTotals::of(renders).count >= self.0
    }
}

/// Whether an outline with these renders is important.
#[must_use]
pub fn is_important(
    renders: &[RenderEvent],
    significance: &dyn Significance,
    config: &OverlayConfig,
) -> bool {
    config.always_show_labels || significance.is_significant(renders)
}

/// Callback fired once when an outline stops being drawn.
pub type Completion = Box<dyn FnOnce(OutlineId)>;

/// An outline that is currently animating.
pub struct ActiveOutline {
    pub(crate) outline: PendingOutline,
    pub(crate) age: u32,
    pub(crate) total_frames: u32,
    pub(crate) alpha: f32,
    pub(crate) color: Rgb,
    pub(crate) label: Option<String>,
    pub(crate) last_seen: HostTime,
    pub(crate) completions: Vec<Completion>,
}

impl fmt::Debug for ActiveOutline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveOutline")
            .field("outline", &self.outline)
            .field("age", &self.age)
            .field("total_frames", &self.total_frames)
            .field("alpha", &self.alpha)
            .field("color", &self.color)
            .field("label", &self.label)
            .field("last_seen", &self.last_seen)
            .field("completions", &self.completions.len())
            .finish()
    }
}

impl ActiveOutline {
    /// Promotes a pending outline. Lifetime is chosen by importance.
    #[must_use]
    pub fn promote(
        outline: PendingOutline,
        important: bool,
        config: &OverlayConfig,
        now: HostTime,
    ) -> Self {
        let total_frames = if important {
            config.important_frames
        } else {
            config.unimportant_frames
        };
        Self {
            color: color_for(&outline.renders, config.max_renders),
            label: label_text(&outline.renders),
            outline,
            age: 0,
            total_frames,
            alpha: config.initial_alpha,
            last_seen: now,
            completions: Vec::new(),
        }
    }

    /// Appends a pending outline's renders and refreshes geometry, color,
    /// label, and `last_seen`. Age and lifetime are untouched.
    pub fn absorb(&mut self, pending: PendingOutline, config: &OverlayConfig, now: HostTime) {
        self.outline.merge(pending);
        self.last_seen = now;
        self.recolor(config);
    }

    /// Advances one frame and recomputes alpha.
    ///
    /// # Errors
    ///
    /// Returns [`OutlineFault`] if the outline cannot be animated; the caller
    /// evicts it.
    pub fn advance(
        &mut self,
        id: OutlineId,
        important: bool,
        config: &OverlayConfig,
    ) -> Result<(), OutlineFault> {
        if self.total_frames == 0 {
            return Err(OutlineFault::ZeroLifetime(id));
        }
        if !self.outline.rect.is_finite() {
            return Err(OutlineFault::NonFiniteGeometry(id));
        }
        self.age = self.age.saturating_add(1);
        self.refresh_alpha(important, config);
        Ok(())
    }

    /// Sets alpha from the current age and importance.
    pub(crate) fn refresh_alpha(&mut self, important: bool, config: &OverlayConfig) {
        let base = if important {
            config.important_alpha
        } else {
            config.unimportant_alpha
        };
        let progress = self.age as f32 / self.total_frames.max(1) as f32;
        self.alpha = (base * (1.0 - progress)).max(0.0);
    }

    pub(crate) fn recolor(&mut self, config: &OverlayConfig) {
        self.color = color_for(&self.outline.renders, config.max_renders);
        self.label = label_text(&self.outline.renders);
    }

    /// Whether the lifetime has elapsed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.age >= self.total_frames
    }

    /// Canonical handle of the backing node.
    #[must_use]
    pub fn node(&self) -> crate::node::NodeId {
        self.outline.node
    }

    /// Current geometry.
    #[must_use]
    pub fn rect(&self) -> Rect {
        self.outline.rect
    }

    /// Accumulated renders.
    #[must_use]
    pub fn renders(&self) -> &[RenderEvent] {
        &self.outline.renders
    }

    /// Frames elapsed since promotion.
    #[must_use]
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Lifetime in frames.
    #[must_use]
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Current alpha.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Current color.
    #[must_use]
    pub fn color(&self) -> Rgb {
        self.color
    }

    /// Label text, if any render is named.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// When renders last merged into this outline.
    #[must_use]
    pub fn last_seen(&self) -> HostTime {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::node::NodeId;
    use crate::render::RenderStats;

    fn render(count: u32, duration: f64) -> RenderEvent {
        RenderEvent::new(NodeId(1), RenderStats::new(count, duration)).expect("valid")
    }

    fn pending(renders: Vec<RenderEvent>) -> PendingOutline {
        PendingOutline {
            node: NodeId(1),
            rect: Rect::new(10.0, 10.0, 60.0, 30.0),
            measured_at: HostTime(0),
            renders,
        }
    }

    #[test]
    fn cheap_render_is_start_color() {
        let config = OverlayConfig::web();
        let renders = vec![render(1, 0.0)];
        let t = cost_parameter(RenderTotals::of(&renders), 100);
        assert_eq!(t, 0.0, "one render of at most 1 ms is the cheapest outline");
        assert_eq!(color_for(&renders, config.max_renders), START_COLOR);
    }

    #[test]
    fn expensive_renders_saturate() {
        let renders = vec![render(50, 10.0)];
        assert_eq!(cost_parameter(RenderTotals::of(&renders), 100), 1.0);
        assert_eq!(color_for(&renders, 100), END_COLOR);
    }

    #[test]
    fn cost_is_monotonic() {
        for duration in [0.0, 0.5, 1.0, 2.0, 8.0] {
            let mut last = 0.0;
            for count in 1..40_u64 {
                let t = cost_parameter(RenderTotals { count, duration }, 100);
                assert!((0.0..=1.0).contains(&t), "t stays normalized");
                assert!(t >= last, "t grows with count");
                last = t;
            }
        }
        let a = cost_parameter(RenderTotals { count: 3, duration: 2.0 }, 100);
        let b = cost_parameter(RenderTotals { count: 4, duration: 2.0 }, 100);
        let c = cost_parameter(RenderTotals { count: 4, duration: 3.0 }, 100);
        assert!(a <= b && b <= c, "more count or time never lowers t");
        assert!(a > 0.0, "anything above the floor leaves the start color");
    }

    #[test]
    fn cost_reaches_end_at_max_renders() {
        let at_max = cost_parameter(RenderTotals { count: 100, duration: 0.0 }, 100);
        assert_eq!(at_max, 1.0);
        let half = cost_parameter(RenderTotals { count: 50, duration: 1.0 }, 100);
        assert!((half - 49.0 / 99.0).abs() < 1e-12, "linear between the ends");
        assert_eq!(
            cost_parameter(RenderTotals { count: 1, duration: 0.0 }, 1),
            0.0,
            "a ceiling of one still starts at zero"
        );
    }

    #[test]
    fn lerp_hits_endpoints_and_midpoint() {
        assert_eq!(START_COLOR.lerp(END_COLOR, 0.0), START_COLOR);
        assert_eq!(START_COLOR.lerp(END_COLOR, 1.0), END_COLOR);
        assert_eq!(START_COLOR.lerp(END_COLOR, 0.5), Rgb { r: 150, g: 73, b: 173 });
        assert_eq!(START_COLOR.lerp(END_COLOR, 7.0), END_COLOR, "t is clamped");
    }

    #[test]
    fn importance_follows_predicate_or_flag() {
        let mut config = OverlayConfig::web();
        let renders = vec![render(3, 0.0)];
        assert!(!is_important(&renders, &NeverSignificant, &config));
        assert!(is_important(&renders, &CountAtLeast(3), &config));
        assert!(is_important(&renders, &|r: &[RenderEvent]| r.len() == 1, &config));
        config.always_show_labels = true;
        assert!(is_important(&renders, &NeverSignificant, &config));
    }

    #[test]
    fn promotion_picks_lifetime_by_importance() {
        let config = OverlayConfig::web();
        let a = ActiveOutline::promote(pending(vec![render(1, 0.0)]), false, &config, HostTime(0));
        let b = ActiveOutline::promote(pending(vec![render(1, 0.0)]), true, &config, HostTime(0));
        assert_eq!(a.total_frames(), config.unimportant_frames);
        assert_eq!(b.total_frames(), config.important_frames);
        assert_eq!(a.alpha(), config.initial_alpha);
        assert_eq!(a.age(), 0);
    }

    #[test]
    fn advance_fades_linearly() {
        let config = OverlayConfig::web();
        let id = OutlineId { idx: 0, generation: 0 };
        let mut outline =
            ActiveOutline::promote(pending(vec![render(1, 0.0)]), false, &config, HostTime(0));
        let mut alphas = Vec::new();
        while !outline.is_finished() {
            outline.advance(id, false, &config).expect("healthy outline");
            alphas.push(outline.alpha());
        }
        assert_eq!(alphas.len(), config.unimportant_frames as usize);
        assert!(alphas.windows(2).all(|w| w[1] <= w[0]), "alpha never rises");
        assert_eq!(*alphas.last().expect("frames ran"), 0.0);
    }

    #[test]
    fn absorb_appends_without_resetting_age() {
        let config = OverlayConfig::web();
        let id = OutlineId { idx: 0, generation: 0 };
        let mut outline =
            ActiveOutline::promote(pending(vec![render(1, 0.0)]), false, &config, HostTime(0));
        outline.advance(id, false, &config).expect("healthy");
        outline.absorb(pending(vec![render(80, 4.0)]), &config, HostTime(9));

        assert_eq!(outline.age(), 1);
        assert_eq!(outline.renders().len(), 2);
        assert_eq!(outline.last_seen(), HostTime(9));
        assert_eq!(outline.color(), END_COLOR, "color follows merged cost");
    }

    #[test]
    fn non_finite_geometry_is_a_fault() {
        let config = OverlayConfig::web();
        let id = OutlineId { idx: 3, generation: 1 };
        let mut p = pending(vec![render(1, 0.0)]);
        p.rect = Rect::new(f64::NAN, 0.0, 1.0, 1.0);
        let mut outline = ActiveOutline::promote(p, false, &config, HostTime(0));
        assert_eq!(
            outline.advance(id, false, &config),
            Err(OutlineFault::NonFiniteGeometry(id))
        );
    }
}
