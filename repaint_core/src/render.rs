// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render events and the statistics derived from them.
//!
//! The host reports one [`RenderStats`] per re-rendered node per commit.
//! [`RenderEvent::new`] validates it; once built, an event is immutable and
//! is only ever appended to an outline's render list, never dropped.

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write as _;

use crate::error::RenderError;
use crate::node::NodeId;

/// Maximum number of component names shown in a label.
const MAX_LABEL_NAMES: usize = 4;

/// Optional descriptive data attached to a render.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderMeta {
    /// Component display name, if the host knows it.
    pub display_name: Option<String>,
    /// Names of the props that changed in this render.
    pub changed_props: Vec<String>,
}

/// Render statistics as delivered by the host, before validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderStats {
    /// Number of renders in this commit.
    pub count: u32,
    /// Total render time in milliseconds.
    pub duration: f64,
    /// Descriptive metadata.
    pub meta: Option<RenderMeta>,
}

impl RenderStats {
    /// Stats for `count` renders taking `duration` milliseconds.
    #[must_use]
    pub fn new(count: u32, duration: f64) -> Self {
        Self {
            count,
            duration,
            meta: None,
        }
    }

    /// Attaches a display name.
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.meta.get_or_insert_with(RenderMeta::default).display_name = Some(name.to_owned());
        self
    }

    /// Records the props that changed in this render.
    #[must_use]
    pub fn changed<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta
            .get_or_insert_with(RenderMeta::default)
            .changed_props
            .extend(props.into_iter().map(Into::into));
        self
    }
}

/// A validated render observation for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderEvent {
    node: NodeId,
    count: u32,
    duration: f64,
    meta: Option<RenderMeta>,
}

impl RenderEvent {
    /// Validates host stats for `node`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if `count` is zero or `duration` is negative,
    /// NaN, or infinite.
    pub fn new(node: NodeId, stats: RenderStats) -> Result<Self, RenderError> {
        if stats.count == 0 {
            return Err(RenderError::ZeroCount(node));
        }
        if !stats.duration.is_finite() || stats.duration < 0.0 {
            return Err(RenderError::BadDuration {
                node,
                duration: stats.duration,
            });
        }
        Ok(Self {
            node,
            count: stats.count,
            duration: stats.duration,
            meta: stats.meta,
        })
    }

    /// The node that rendered.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Render count (at least 1).
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Render time in milliseconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Descriptive metadata, if any.
    #[must_use]
    pub fn meta(&self) -> Option<&RenderMeta> {
        self.meta.as_ref()
    }

    /// The component display name, if known.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.meta.as_ref()?.display_name.as_deref()
    }
}

/// Summed render count and duration over a set of events.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderTotals {
    /// Sum of render counts.
    pub count: u64,
    /// Sum of render durations in milliseconds.
    pub duration: f64,
}

impl RenderTotals {
    /// Sums the given events.
    #[must_use]
    pub fn of(renders: &[RenderEvent]) -> Self {
        let mut totals = Self::default();
        totals.extend(renders);
        totals
    }

    /// Adds the given events to the totals.
    pub fn extend(&mut self, renders: &[RenderEvent]) {
        for render in renders {
            self.count += u64::from(render.count);
            self.duration += render.duration;
        }
    }
}

/// Toolbar form: `×12 (3.40ms)`, omitting the time when it is zero.
impl fmt::Display for RenderTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "×{}", self.count)?;
        if self.duration > 0.0 {
            write!(f, " ({:.2}ms)", self.duration)?;
        }
        Ok(())
    }
}

/// Builds the label drawn above an important outline.
///
/// Renders are grouped by display name in first-seen order and shown as
/// `Name` or `Name ×N`. Only the first few names are listed. Unnamed renders
/// contribute nothing; returns `None` if no render is named.
#[must_use]
pub fn label_text(renders: &[RenderEvent]) -> Option<String> {
    let mut groups: Vec<(&str, u64)> = Vec::new();
    for render in renders {
        let Some(name) = render.display_name() else {
            continue;
        };
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, count)) => *count += u64::from(render.count),
            None => groups.push((name, u64::from(render.count))),
        }
    }
    if groups.is_empty() {
        return None;
    }

    let mut text = String::new();
    for (i, (name, count)) in groups.iter().take(MAX_LABEL_NAMES).enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        text.push_str(name);
        if *count > 1 {
            // Writing into a String cannot fail.
            let _ = write!(text, " ×{count}");
        }
    }
    if groups.len() > MAX_LABEL_NAMES {
        text.push('…');
    }
    Some(text)
}
