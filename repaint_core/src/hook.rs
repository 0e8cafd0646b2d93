// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The host commit hook: how render events reach the engine.
//!
//! The host instrumentation layer walks its tree after each update cycle and
//! reports three phases through [`CommitHook`]: commit start, one render per
//! re-rendered node, commit finish. The [`Overlay`](crate::engine::Overlay)
//! implements the trait; the host is handed the engine (or a forwarding
//! shim) instead of mutating a global hook object.
//!
//! Hosts often install their hook lazily. [`attach`] retries registration a
//! bounded number of times with a caller-supplied async sleep, so the core
//! stays free of any particular executor or timer.

use core::future::Future;

use crate::error::AttachError;
use crate::node::NodeId;
use crate::render::RenderStats;
use crate::time::HostTime;

/// Per-commit render counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommitStats {
    /// Monotonic commit counter.
    pub commit: u64,
    /// When the commit started.
    pub started_at: HostTime,
    /// Render events accepted.
    pub accepted: u32,
    /// Render events rejected as malformed or ignored while paused.
    pub rejected: u32,
    /// Summed render count of accepted events.
    pub count: u64,
    /// Summed render time of accepted events, in milliseconds.
    pub duration: f64,
}

/// Receives the host's commit-cycle notifications.
pub trait CommitHook {
    /// A commit cycle began.
    fn commit_start(&mut self, now: HostTime);

    /// `node` re-rendered during the current commit.
    fn render(&mut self, node: NodeId, stats: RenderStats, now: HostTime);

    /// The commit cycle finished.
    fn commit_finish(&mut self, now: HostTime);
}

/// The host-side registration point for a [`CommitHook`].
pub trait HookRegistry {
    /// Tries to register once.
    ///
    /// # Errors
    ///
    /// [`AttachError::Unavailable`] if the host hook is not installed yet
    /// (worth retrying); [`AttachError::Rejected`] if it never will accept.
    fn try_register(&mut self) -> Result<(), AttachError>;
}

/// Bounded retry schedule for [`attach`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Three retries, 50 ms apart.
    pub const DEFAULT: Self = Self {
        retries: 3,
        backoff_ms: 50,
    };

    /// Total attempts this policy allows.
    #[must_use]
    pub const fn attempts(self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Registers with the host hook, retrying while it is unavailable.
///
/// `sleep` is called with the backoff in milliseconds between attempts.
/// Returns the attempt number that succeeded (1-based).
///
/// # Errors
///
/// Returns [`AttachError::Rejected`] immediately if the host refuses, or
/// [`AttachError::Exhausted`] once every attempt found the hook unavailable.
pub async fn attach<R, S, F>(
    registry: &mut R,
    policy: RetryPolicy,
    mut sleep: S,
) -> Result<u32, AttachError>
where
    R: HookRegistry + ?Sized,
    S: FnMut(u64) -> F,
    F: Future<Output = ()>,
{
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        match registry.try_register() {
            Ok(()) => {
                tracing::debug!(attempt, "attached to commit hook");
                return Ok(attempt);
            }
            Err(AttachError::Unavailable) => {
                tracing::debug!(attempt, "commit hook not installed yet");
                if attempt < attempts {
                    sleep(policy.backoff_ms).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
    tracing::warn!(attempts, "giving up on commit hook");
    Err(AttachError::Exhausted { attempts })
}
