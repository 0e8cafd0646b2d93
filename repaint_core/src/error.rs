// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Every error here is local and recoverable: the engine degrades a failed
//! measurement to "not measurable", drops a malformed render event, and
//! evicts a single faulty outline. None of them escape the frame step.

use thiserror::Error;

use crate::node::NodeId;
use crate::outline::OutlineId;

/// A platform measurement failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MeasureError {
    /// The node is no longer attached to the host tree.
    #[error("{0:?} is detached")]
    Detached(NodeId),
    /// The node has no measurable host view (e.g. a text-only fragment).
    #[error("{0:?} has no measurable host view")]
    Unsupported(NodeId),
    /// The platform measurement API reported a failure.
    #[error("platform measurement failed for {0:?}")]
    Platform(NodeId),
}

/// A render event the host delivered with invalid stats.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum RenderError {
    /// `count` must be at least one.
    #[error("render count must be at least 1 for {0:?}")]
    ZeroCount(NodeId),
    /// `duration` must be finite and non-negative.
    #[error("render duration {duration} is invalid for {node:?}")]
    BadDuration {
        /// The offending node.
        node: NodeId,
        /// The rejected duration in milliseconds.
        duration: f64,
    },
}

/// A configuration value outside its allowed range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_renders` must be non-zero.
    #[error("max_renders must be non-zero")]
    ZeroMaxRenders,
    /// Outline lifetimes must be at least one frame.
    #[error("outline lifetime must be at least one frame")]
    ZeroLifetime,
    /// An alpha constant lies outside `0..=1`.
    #[error("alpha constant `{0}` must lie in 0..=1")]
    AlphaOutOfRange(&'static str),
}

/// Failure to register with the host commit hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AttachError {
    /// The host hook is not installed yet.
    #[error("host commit hook is not available")]
    Unavailable,
    /// The host rejected the registration.
    #[error("host commit hook rejected registration")]
    Rejected,
    /// Every attempt failed.
    #[error("gave up attaching after {attempts} attempts")]
    Exhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}

/// A per-outline failure detected during the frame step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum OutlineFault {
    /// The outline's geometry contains NaN or infinity.
    #[error("{0:?} has non-finite geometry")]
    NonFiniteGeometry(OutlineId),
    /// The outline was promoted with a zero-frame lifetime.
    #[error("{0:?} has a zero-frame lifetime")]
    ZeroLifetime(OutlineId),
}
