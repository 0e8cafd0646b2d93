// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay configuration and platform presets.
//!
//! Intervals are in milliseconds and are converted to host ticks with the
//! [`Timebase`](crate::time::Timebase) the engine is built with.

use kurbo::Rect;

use crate::error::ConfigError;

/// Tunables for the [`Overlay`](crate::engine::Overlay) engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayConfig {
    /// Render cost at which the color saturates.
    pub max_renders: u32,
    /// Treat every outline as important (labels, fill, long lifetime).
    pub always_show_labels: bool,
    /// Minimum accumulated render count for an outline to be painted.
    /// Outlines below it stay in the store for future merges.
    pub render_count_threshold: u64,
    /// Minimum spacing between flushes, in milliseconds.
    pub flush_interval_ms: u64,
    /// Cadence of the independent recompute pass, in milliseconds.
    pub recompute_interval_ms: u64,
    /// Geometry cache time-to-live, in milliseconds.
    pub cache_ttl_ms: u64,
    /// Lifetime of important outlines, in frames.
    pub important_frames: u32,
    /// Lifetime of other outlines, in frames.
    pub unimportant_frames: u32,
    /// Alpha of a freshly promoted outline.
    pub initial_alpha: f32,
    /// Base alpha of important outlines.
    pub important_alpha: f32,
    /// Base alpha of other outlines.
    pub unimportant_alpha: f32,
    /// Fill alpha as a fraction of stroke alpha (important outlines only).
    pub fill_ratio: f32,
    /// Emit every promoted outline's renders at debug level.
    pub log_renders: bool,
    /// Evict active outlines not refreshed for this many milliseconds.
    pub stale_after_ms: Option<u64>,
    /// Region outside of which geometry counts as hidden.
    pub viewport: Option<Rect>,
}

impl OverlayConfig {
    /// Defaults for browser hosts.
    #[must_use]
    pub const fn web() -> Self {
        Self {
            max_renders: 100,
            always_show_labels: false,
            render_count_threshold: 0,
            flush_interval_ms: 32,
            recompute_interval_ms: 200,
            cache_ttl_ms: 32,
            important_frames: 60,
            unimportant_frames: 5,
            initial_alpha: 0.8,
            important_alpha: 0.8,
            unimportant_alpha: 0.2,
            fill_ratio: 0.1,
            log_renders: false,
            stale_after_ms: None,
            viewport: None,
        }
    }

    /// Defaults for native hosts, where measurement is asynchronous and
    /// slower, so cached geometry lives longer and idle outlines are swept.
    #[must_use]
    pub const fn native() -> Self {
        Self {
            cache_ttl_ms: 150,
            stale_after_ms: Some(500),
            ..Self::web()
        }
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_renders == 0 {
            return Err(ConfigError::ZeroMaxRenders);
        }
        if self.important_frames == 0 || self.unimportant_frames == 0 {
            return Err(ConfigError::ZeroLifetime);
        }
        for (name, alpha) in [
            ("initial_alpha", self.initial_alpha),
            ("important_alpha", self.important_alpha),
            ("unimportant_alpha", self.unimportant_alpha),
            ("fill_ratio", self.fill_ratio),
        ] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(ConfigError::AlphaOutOfRange(name));
            }
        }
        Ok(())
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::web()
    }
}
