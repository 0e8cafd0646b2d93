// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-event correlation and outline lifecycle for re-render overlays.
//!
//! `repaint_core` turns a stream of "this node re-rendered, here are its
//! stats" events into a per-frame list of boxes to draw over the UI, fading
//! each one out over a bounded number of frames. It is `no_std` compatible
//! (with `alloc`), never reads a clock, and never draws: measuring, painting,
//! and frame callbacks are host collaborators behind traits.
//!
//! # Architecture
//!
//! ```text
//!   Host commit hook
//!       │ render(node, stats)
//!       ▼
//!   GeometryResolver (cache, Measure) ──► PendingQueue
//!                                             │ flush (Throttle)
//!                                             ▼
//!                 recompute (Interval) ──► OutlineStore
//!                                             │ frame
//!                                             ▼
//!                        FrameSnapshot ──► Painter::paint()
//! ```
//!
//! **[`geometry`]**: Outline keys, the TTL geometry cache, and the resolver
//! that applies visibility rules to platform measurements.
//!
//! **[`pending`]**: Per-tick queue of resolved renders, merged by key.
//!
//! **[`outline`]** and **[`store`]**: Active outlines with generational
//! handles; the store holds at most one outline per key and folds
//! collisions.
//!
//! **[`throttle`]**: Minimum-interval and fixed-cadence gates for the flush
//! and recompute passes.
//!
//! **[`engine`]**: The [`Overlay`](engine::Overlay) engine tying it all
//! together.
//!
//! **[`hook`]**, **[`observe`]**, **[`paint`]**: Host-facing contracts:
//! commit notifications in, lifecycle notifications and frame snapshots out.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! pass instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod hook;
pub mod node;
pub mod observe;
pub mod outline;
pub mod paint;
pub mod pending;
pub mod render;
pub mod store;
pub mod throttle;
pub mod time;
pub mod trace;
