// Copyright 2026 the Repaint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Passes become instant events; the number of live outlines after each
//! frame is also emitted as a counter track.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use repaint_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Flush(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Flush",
                    "cat": "Pipeline",
                    "ts": ticks_to_us(e.now.ticks(), timebase),
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "flush_index": e.flush_index,
                        "pending": e.pending,
                        "dropped": e.dropped,
                        "promoted": e.promoted,
                        "merged": e.merged,
                        "render_count": e.render_count,
                        "render_time_ms": e.render_time,
                    }
                }));
            }
            RecordedEvent::Recompute(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Recompute",
                    "cat": "Pipeline",
                    "ts": ticks_to_us(e.now.ticks(), timebase),
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "remeasured": e.remeasured,
                        "evicted": e.evicted,
                        "folded": e.folded,
                    }
                }));
            }
            RecordedEvent::Frame(e) => {
                let ts = ticks_to_us(e.now.ticks(), timebase);
                events.push(json!({
                    "ph": "i",
                    "name": "Frame",
                    "cat": "Animation",
                    "ts": ts,
                    "pid": 0,
                    "tid": 1,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "finished": e.finished,
                        "regrouped": e.regrouped,
                        "painted": e.painted,
                        "rescheduled": e.rescheduled,
                    }
                }));
                events.push(json!({
                    "ph": "C",
                    "name": "Outlines",
                    "ts": ts,
                    "pid": 0,
                    "args": { "active": e.active }
                }));
            }
            RecordedEvent::Evict(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Evict",
                    "cat": "Animation",
                    "ts": ticks_to_us(e.now.ticks(), timebase),
                    "pid": 0,
                    "tid": 1,
                    "s": "t",
                    "args": {
                        "outline": e.outline.index(),
                        "generation": e.outline.generation(),
                        "reason": e.reason.as_str(),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}
