// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host node identity.
//!
//! Hosts that double-buffer their tree (a "current" and a "work in progress"
//! generation of each component instance) hand the engine either buffer's
//! handle for the same logical instance. [`Identity`] folds both handles onto
//! one canonical [`NodeId`] so that caches and outlines never see two
//! identities for one instance.

use core::fmt;

/// An opaque reference to a host node (component instance or view).
///
/// Handles are assigned by the host; the engine only compares and hashes
/// them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Maps buffer-specific node handles to one canonical identity.
pub trait Identity {
    /// Returns the canonical handle for `node`.
    ///
    /// Must be idempotent and agree for both buffers of one instance:
    /// `canonical(a) == canonical(alternate(a))`.
    fn canonical(&self, node: NodeId) -> NodeId {
        node
    }

    /// Returns the paired handle from the other tree generation, if any.
    fn alternate(&self, node: NodeId) -> Option<NodeId> {
        _ = node;
        None
    }
}

/// An [`Identity`] for hosts without double buffering.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleBuffered;

impl Identity for SingleBuffered {}

/// An [`Identity`] for hosts that pair handles by a fixed bit.
///
/// Both generations of an instance share every bit except `flip`; the
/// canonical handle is the one with that bit cleared.
#[derive(Clone, Copy, Debug)]
pub struct PairedByBit {
    /// The bit distinguishing the two buffers.
    pub flip: u64,
}

impl Identity for PairedByBit {
    fn canonical(&self, node: NodeId) -> NodeId {
        NodeId(node.0 & !self.flip)
    }

    fn alternate(&self, node: NodeId) -> Option<NodeId> {
        Some(NodeId(node.0 ^ self.flip))
    }
}
