// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded capture of output produced by a test.
//!
//! Test output can be arbitrarily large. [`BoundedOutput`] keeps a fixed amount of it in memory:
//! the first `limit` bytes ever written (the head), and the most recent `limit` bytes (the tail,
//! stored in a circular window). Most of the diagnostic value of a log lives at its edges, so
//! this is what ends up in the report.

use std::{borrow::Cow, fmt};

/// The default capacity, in bytes, of each of the head and tail windows.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// An append-only sink that retains the start and the end of a stream of bytes.
///
/// Memory usage is `O(limit)` regardless of how much is written, while [`Self::total_size`]
/// stays exact.
#[derive(Clone)]
pub struct BoundedOutput {
    head: Vec<u8>,
    // Allocated once the head is full.
    tail: Option<Box<[u8]>>,
    limit: usize,
    // The next write position within `tail`.
    offset: usize,
    size: u64,
}

impl BoundedOutput {
    /// Creates a new, empty buffer with the given head and tail capacity.
    pub fn new(limit: usize) -> Self {
        Self {
            head: Vec::new(),
            tail: None,
            limit,
            offset: 0,
            size: 0,
        }
    }

    /// Returns the exact number of bytes ever written, including discarded ones.
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.size
    }

    /// Returns true if nothing has been written yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns true if some bytes have been discarded.
    pub fn is_truncated(&self) -> bool {
        self.size > (self.head.len() + self.tail_len()) as u64
    }

    /// Appends a chunk of bytes.
    pub fn write(&mut self, mut data: &[u8]) {
        if data.is_empty() {
            return;
        }

        if self.head.len() < self.limit {
            let n = (self.limit - self.head.len()).min(data.len());
            self.head.extend_from_slice(&data[..n]);
            self.size += n as u64;
            data = &data[n..];
            if data.is_empty() {
                return;
            }
        }

        // Anything that would be overwritten within this write anyway is only counted.
        if data.len() > self.limit {
            let skip = data.len() - self.limit;
            self.size += skip as u64;
            self.offset = 0;
            data = &data[skip..];
        }

        let limit = self.limit;
        let tail = self
            .tail
            .get_or_insert_with(|| vec![0; limit].into_boxed_slice());

        if self.offset + data.len() > limit {
            let n = limit - self.offset;
            tail[self.offset..].copy_from_slice(&data[..n]);
            self.offset = 0;
            self.size += n as u64;
            data = &data[n..];
        }

        tail[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        self.size += data.len() as u64;
        if self.offset == limit {
            self.offset = 0;
        }
    }

    /// Appends a string.
    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Materializes the retained bytes.
    ///
    /// If some bytes were discarded, the head and the tail are joined by a marker line reporting
    /// the total and skipped byte counts.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        let Some(tail) = self.tail_bytes() else {
            return Cow::Borrowed(&self.head);
        };

        if !self.is_truncated() {
            let mut out = Vec::with_capacity(self.head.len() + tail.len());
            out.extend_from_slice(&self.head);
            out.extend_from_slice(&tail);
            return Cow::Owned(out);
        }

        Cow::Owned(self.joined(&self.head, &tail))
    }

    /// Materializes the retained bytes as text, replacing invalid UTF-8 sequences.
    pub fn render(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    fn tail_len(&self) -> usize {
        self.tail.as_ref().map_or(0, |tail| tail.len())
    }

    // Returns the tail in logical (oldest first) order, or None if nothing has reached it yet.
    fn tail_bytes(&self) -> Option<Cow<'_, [u8]>> {
        let tail = self.tail.as_deref()?;
        if self.size < (self.head.len() + tail.len()) as u64 {
            // The window hasn't wrapped around yet.
            return Some(Cow::Borrowed(&tail[..self.offset]));
        }
        if self.offset == 0 {
            return Some(Cow::Borrowed(tail));
        }

        let mut out = Vec::with_capacity(tail.len());
        out.extend_from_slice(&tail[self.offset..]);
        out.extend_from_slice(&tail[..self.offset]);
        Some(Cow::Owned(out))
    }

    fn joined(&self, mut head: &[u8], mut tail: &[u8]) -> Vec<u8> {
        // Cut on line boundaries, but never drop more than half of either window.
        let half = head.len() / 2;
        if let Some(i) = head.iter().rposition(|&b| b == b'\n').filter(|&i| i > half) {
            head = &head[..=i];
        }
        let half = tail.len() / 2;
        if let Some(i) = tail.iter().position(|&b| b == b'\n').filter(|&i| i < half) {
            tail = &tail[i..];
        }

        let kept = (head.len() + tail.len()) as u64;
        let marker = truncation_marker(self.size, self.size - kept);

        let mut out = Vec::with_capacity(head.len() + marker.len() + tail.len());
        out.extend_from_slice(head);
        out.extend_from_slice(marker.as_bytes());
        out.extend_from_slice(tail);
        out
    }
}

impl fmt::Debug for BoundedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedOutput")
            .field("limit", &self.limit)
            .field("size", &self.size)
            .field("head_len", &self.head.len())
            .field("tail_len", &self.tail_len())
            .finish()
    }
}

impl std::io::Write for BoundedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        BoundedOutput::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn truncation_marker(total: u64, skipped: u64) -> String {
    format!("\n... Too big output (total: {total}, skipped: {skipped}) ...\n")
}
