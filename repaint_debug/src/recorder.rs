// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Counts are stored as `u32` and saturate.

use repaint_core::outline::OutlineId;
use repaint_core::time::HostTime;
use repaint_core::trace::{
    EvictEvent, EvictReason, FlushEvent, FrameEvent, RecomputeEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FLUSH: u8 = 1;
const TAG_RECOMPUTE: u8 = 2;
const TAG_FRAME: u8 = 3;
const TAG_EVICT: u8 = 4;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_count(&mut self, v: usize) {
        self.write_u32(u32::try_from(v).unwrap_or(u32::MAX));
    }

    fn write_reason(&mut self, reason: EvictReason) {
        self.write_u8(match reason {
            EvictReason::Unmeasurable => 0,
            EvictReason::Stale => 1,
            EvictReason::Fault => 2,
            EvictReason::Paused => 3,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_flush(&mut self, e: &FlushEvent) {
        self.write_u8(TAG_FLUSH);
        self.write_u64(e.flush_index);
        self.write_u64(e.now.ticks());
        self.write_count(e.pending);
        self.write_count(e.dropped);
        self.write_count(e.promoted);
        self.write_count(e.merged);
        self.write_u64(e.render_count);
        self.write_f64(e.render_time);
    }

    fn on_recompute(&mut self, e: &RecomputeEvent) {
        self.write_u8(TAG_RECOMPUTE);
        self.write_u64(e.now.ticks());
        self.write_count(e.remeasured);
        self.write_count(e.evicted);
        self.write_count(e.folded);
    }

    fn on_frame(&mut self, e: &FrameEvent) {
        self.write_u8(TAG_FRAME);
        self.write_u64(e.frame_index);
        self.write_u64(e.now.ticks());
        self.write_count(e.active);
        self.write_count(e.finished);
        self.write_count(e.regrouped);
        self.write_count(e.painted);
        self.write_u8(u8::from(e.rescheduled));
    }

    fn on_evict(&mut self, e: &EvictEvent) {
        self.write_u8(TAG_EVICT);
        self.write_u32(e.outline.index());
        self.write_u32(e.outline.generation());
        self.write_reason(e.reason);
        self.write_u64(e.now.ticks());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Copy, Debug)]
pub enum RecordedEvent {
    /// A [`FlushEvent`].
    Flush(FlushEvent),
    /// A [`RecomputeEvent`].
    Recompute(RecomputeEvent),
    /// A [`FrameEvent`].
    Frame(FrameEvent),
    /// An [`EvictEvent`].
    Evict(EvictEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    fn read_count(&mut self) -> Option<usize> {
        usize::try_from(self.read_u32()?).ok()
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_reason(&mut self) -> Option<EvictReason> {
        Some(match self.read_u8()? {
            0 => EvictReason::Unmeasurable,
            1 => EvictReason::Stale,
            2 => EvictReason::Fault,
            _ => EvictReason::Paused,
        })
    }

    fn decode_flush(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Flush(FlushEvent {
            flush_index: self.read_u64()?,
            now: self.read_time()?,
            pending: self.read_count()?,
            dropped: self.read_count()?,
            promoted: self.read_count()?,
            merged: self.read_count()?,
            render_count: self.read_u64()?,
            render_time: self.read_f64()?,
        }))
    }

    fn decode_recompute(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Recompute(RecomputeEvent {
            now: self.read_time()?,
            remeasured: self.read_count()?,
            evicted: self.read_count()?,
            folded: self.read_count()?,
        }))
    }

    fn decode_frame(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Frame(FrameEvent {
            frame_index: self.read_u64()?,
            now: self.read_time()?,
            active: self.read_count()?,
            finished: self.read_count()?,
            regrouped: self.read_count()?,
            painted: self.read_count()?,
            rescheduled: self.read_u8()? != 0,
        }))
    }

    fn decode_evict(&mut self) -> Option<RecordedEvent> {
        let index = self.read_u32()?;
        let generation = self.read_u32()?;
        Some(RecordedEvent::Evict(EvictEvent {
            outline: OutlineId::from_raw(index, generation),
            reason: self.read_reason()?,
            now: self.read_time()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_FLUSH => self.decode_flush(),
            TAG_RECOMPUTE => self.decode_recompute(),
            TAG_FRAME => self.decode_frame(),
            TAG_EVICT => self.decode_evict(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
