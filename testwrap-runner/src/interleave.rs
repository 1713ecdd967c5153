// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging a test binary's two output streams into a single sequence of events.
//!
//! A test binary writes structured progress records to standard output and free-form text to
//! standard error. The [`EventInterleaver`] hands out one write sink per stream. The supervisor
//! copies each stream into its sink from a separate task, and once both copies are done the
//! interleaver produces one ordered list of [`TestEvent`]s.
//!
//! # Ordering
//!
//! Every event is assigned a timestamp: structured records use their own `Time` field if present,
//! and everything else uses the injected [`Clock`]. Timestamps are clamped so that they never go
//! backwards within a sink. The two per-sink sequences are then merged on `(timestamp, arrival
//! sequence)`. Cross-sink ordering of near-simultaneous writes is best-effort.
//!
//! # Attribution
//!
//! Text on standard error carries no test name. It is attributed to the most recently started test
//! that hasn't finished yet, or to the package if no test is running. If a binary runs several
//! tests concurrently this is a heuristic, not a guarantee.

use crate::{
    events::{DecodedRecord, TestAction, TestEvent},
    time::Clock,
};
use bytes::BytesMut;
use chrono::{DateTime, FixedOffset};
use itertools::Itertools;
use std::{
    io,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

// Text without a newline is emitted as an event once this much of it has accumulated.
const MAX_PENDING_TEXT: usize = 64 * 1024;

// A structured record longer than this is discarded as malformed.
const MAX_RECORD_LEN: usize = 1024 * 1024;

/// Merges structured events and free-form text into one ordered event sequence.
///
/// Created with [`EventInterleaver::new`]. Write the structured stream into
/// [`Self::structured_sink`] and the text stream into [`Self::text_sink`], then call
/// [`Self::close`] and [`Self::collected_events`].
#[derive(Debug)]
pub struct EventInterleaver {
    shared: Arc<Shared>,
}

impl EventInterleaver {
    /// Creates a new interleaver for the given package, stamping events with `clock`.
    pub fn new(package: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                package: package.into(),
                clock,
                state: Mutex::new(InterleaverState::default()),
            }),
        }
    }

    /// Returns a sink for newline-delimited structured records.
    pub fn structured_sink(&self) -> StructuredSink {
        StructuredSink {
            shared: self.shared.clone(),
        }
    }

    /// Returns a sink for free-form text.
    pub fn text_sink(&self) -> TextSink {
        TextSink {
            shared: self.shared.clone(),
        }
    }

    /// Finishes processing: any partial lines still buffered are turned into events, and
    /// subsequent writes to either sink fail.
    ///
    /// `aborted` indicates that the test binary was interrupted rather than exiting on its own.
    /// Tests that were still running are left without a terminal event either way.
    pub fn close(&self, aborted: bool) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }

        let pending = mem::take(&mut state.structured.pending);
        if !mem::take(&mut state.structured.discarding) {
            state.push_structured_line(&pending, &self.shared);
        }
        let pending = mem::take(&mut state.text.pending);
        state.push_text(&pending, &self.shared);
        state.closed = true;

        if !state.running.is_empty() {
            if aborted {
                debug!(
                    running = ?state.running,
                    "test binary was interrupted while tests were running"
                );
            } else {
                debug!(
                    running = ?state.running,
                    "test binary exited while tests were running"
                );
            }
        }
    }

    /// Returns true if [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Returns the number of structured records that could not be decoded.
    pub fn malformed_count(&self) -> usize {
        self.shared.lock().malformed
    }

    /// Returns all events collected so far, in merged order.
    pub fn collected_events(&self) -> Vec<TestEvent> {
        let state = self.shared.lock();
        state
            .structured
            .events
            .iter()
            .merge_by(&state.text.events, |a, b| {
                (a.stamp, a.seq) <= (b.stamp, b.seq)
            })
            .map(|stamped| stamped.event.clone())
            .collect()
    }
}

/// The write end for structured records. Created by [`EventInterleaver::structured_sink`].
///
/// A record longer than 1 MiB is counted as malformed and skipped up to its terminating newline.
#[derive(Debug)]
pub struct StructuredSink {
    shared: Arc<Shared>,
}

impl io::Write for StructuredSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        state.ensure_open()?;

        let mut searched = state.structured.append(buf);
        while let Some(line) = state.structured.next_line(&mut searched) {
            if mem::take(&mut state.structured.discarding) {
                // The rest of an oversized record.
                continue;
            }
            state.push_structured_line(&line, &self.shared);
        }

        if state.structured.pending.len() > MAX_RECORD_LEN {
            state.structured.pending.clear();
            if !mem::replace(&mut state.structured.discarding, true) {
                state.malformed += 1;
                warn!("skipping structured record longer than {MAX_RECORD_LEN} bytes");
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The write end for free-form text. Created by [`EventInterleaver::text_sink`].
#[derive(Debug)]
pub struct TextSink {
    shared: Arc<Shared>,
}

impl io::Write for TextSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        state.ensure_open()?;

        let mut searched = state.text.append(buf);
        while let Some(line) = state.text.next_line(&mut searched) {
            state.push_text(&line, &self.shared);
        }
        let pending_len = state.text.pending.len();
        if pending_len >= MAX_PENDING_TEXT {
            // Keep a trailing partial UTF-8 sequence for the next chunk.
            let at = pending_len - incomplete_utf8_suffix(&state.text.pending);
            let chunk = state.text.pending.split_to(at);
            state.push_text(&chunk, &self.shared);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct Shared {
    package: String,
    clock: Arc<dyn Clock>,
    state: Mutex<InterleaverState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, InterleaverState> {
        // Every write leaves the state consistent, so a panic elsewhere doesn't invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct InterleaverState {
    structured: SinkLog,
    text: SinkLog,
    // Tests that have started but not finished, oldest first.
    running: Vec<String>,
    next_seq: u64,
    malformed: usize,
    closed: bool,
}

impl InterleaverState {
    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "event interleaver is closed",
            ))
        } else {
            Ok(())
        }
    }

    fn push_structured_line(&mut self, line: &[u8], shared: &Shared) {
        if line.trim_ascii().is_empty() {
            return;
        }

        match TestEvent::decode(line) {
            DecodedRecord::Event(event) => {
                self.track(&event);
                let stamp = event.timestamp.unwrap_or_else(|| shared.clock.now());
                let seq = self.bump_seq();
                self.structured.push(stamp, seq, event);
            }
            DecodedRecord::Ignored { action } => {
                debug!(%action, "ignoring structured record");
            }
            DecodedRecord::Malformed { line, error } => {
                self.malformed += 1;
                warn!("skipping malformed test event `{line}`: {error}");
            }
        }
    }

    fn push_text(&mut self, text: &[u8], shared: &Shared) {
        if text.is_empty() {
            return;
        }

        let test_name = self.running.last().cloned().unwrap_or_default();
        let event = TestEvent::new(TestAction::StderrOutput, shared.package.as_str(), test_name)
            .with_text(String::from_utf8_lossy(text));
        let seq = self.bump_seq();
        self.text.push(shared.clock.now(), seq, event);
    }

    fn track(&mut self, event: &TestEvent) {
        if event.is_package_level() {
            return;
        }
        match event.action {
            TestAction::Run => {
                if !self.running.contains(&event.test_name) {
                    self.running.push(event.test_name.clone());
                }
            }
            action if action.is_terminal() => {
                self.running.retain(|name| *name != event.test_name);
            }
            _ => {}
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[derive(Debug, Default)]
struct SinkLog {
    // Bytes after the last newline seen.
    pending: BytesMut,
    // Set while skipping the remainder of an oversized structured record.
    discarding: bool,
    last_stamp: Option<DateTime<FixedOffset>>,
    events: Vec<StampedEvent>,
}

impl SinkLog {
    /// Appends `buf` to the pending bytes, returning the offset from which to look for newlines.
    fn append(&mut self, buf: &[u8]) -> usize {
        let searched = self.pending.len();
        self.pending.extend_from_slice(buf);
        searched
    }

    /// Splits off the next complete line. Bytes before `searched` are known not to contain a
    /// newline.
    fn next_line(&mut self, searched: &mut usize) -> Option<BytesMut> {
        let pos = *searched + self.pending[*searched..].iter().position(|&b| b == b'\n')?;
        *searched = 0;
        Some(self.pending.split_to(pos + 1))
    }

    fn push(&mut self, stamp: DateTime<FixedOffset>, seq: u64, mut event: TestEvent) {
        let stamp = match self.last_stamp {
            Some(last) if last > stamp => last,
            _ => stamp,
        };
        self.last_stamp = Some(stamp);
        event.timestamp = Some(stamp);
        self.events.push(StampedEvent { stamp, seq, event });
    }
}

// Returns the length of an incomplete UTF-8 sequence at the end of `bytes`, or 0 if there is none.
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    for (back, &byte) in bytes.iter().rev().take(4).enumerate() {
        let width = match byte {
            0x00..=0x7f => return 0,
            // Continuation byte.
            0x80..=0xbf => continue,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            _ => 4,
        };
        return if width > back + 1 { back + 1 } else { 0 };
    }
    0
}

#[derive(Debug)]
struct StampedEvent {
    stamp: DateTime<FixedOffset>,
    seq: u64,
    event: TestEvent,
}
