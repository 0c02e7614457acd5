//! # Chunker
//!
//! Buffers raw input and, with a span-level [`Sieve`], classifies it into an
//! ordered run of non-data and data regions. Regions are handed out once, in
//! file order; the buffered bytes stay addressable by absolute offset until
//! the engine releases them.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::trace;

use crate::ranges::ByteRange;
use crate::sieve::{Sieve, SieveError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk buffer full: {buffered} bytes buffered, {incoming} more would exceed {capacity}")]
    Overflow {
        buffered: usize,
        incoming: usize,
        capacity: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    NonData,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub range: ByteRange,
}

#[derive(Debug)]
pub struct Chunker {
    buffer: Vec<u8>,
    /// Absolute offset of `buffer[0]`.
    base: u64,
    /// Everything before this offset has been classified.
    cursor: u64,
    pending: VecDeque<Region>,
    capacity: usize,
    /// Open trailing range waiting at the cursor, and how far past it the
    /// sieve has already searched for the next marker.
    open_range: Option<(u64, u64)>,
}

impl Chunker {
    pub fn new(offset: u64, capacity: usize) -> Self {
        Self {
            buffer: Vec::new(),
            base: offset,
            cursor: offset,
            pending: VecDeque::new(),
            capacity,
            open_range: None,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Absolute offset one past the last buffered byte.
    pub fn end(&self) -> u64 {
        self.base + self.buffer.len() as u64
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Append the next bytes of the input.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), ChunkError> {
        if self.buffer.len() + bytes.len() > self.capacity {
            return Err(ChunkError::Overflow {
                buffered: self.buffer.len(),
                incoming: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Classify buffered bytes between the cursor and `limit`.
    ///
    /// A data range is taken once it is settled: another range follows it,
    /// the sieve's ranges are self-terminated, or `settle_all` says no more
    /// bytes will arrive for this window. Returns the number of regions queued.
    pub fn split(
        &mut self,
        sieve: &dyn Sieve,
        limit: u64,
        settle_all: bool,
    ) -> Result<usize, SieveError> {
        let stop = self.end().min(limit);
        if self.cursor >= stop {
            return Ok(0);
        }
        let from = self.cursor;
        let slice = &self.buffer[(from - self.base) as usize..(stop - self.base) as usize];
        let spans = self.sieve_slice(sieve, slice, from, stop)?;
        let slice_len = slice.len() as u64;

        let mut queued = Vec::new();
        let mut cursor = from;
        let mut blocked = false;
        for rel in spans {
            let settled = rel.end < slice_len || sieve.terminated() || settle_all;
            let span = rel.shift(from);
            if span.start > cursor {
                queued.push(Region {
                    kind: RegionKind::NonData,
                    range: ByteRange::new(cursor, span.start),
                });
                cursor = span.start;
            }
            if !settled {
                blocked = true;
                break;
            }
            queued.push(Region {
                kind: RegionKind::Data,
                range: span,
            });
            cursor = span.end;
        }
        if !blocked {
            let tail = &slice[(cursor - from) as usize..];
            let settled = if settle_all && !sieve.terminated() {
                tail.len()
            } else {
                sieve.settled_prefix(tail)
            };
            if settled > 0 {
                queued.push(Region {
                    kind: RegionKind::NonData,
                    range: ByteRange::new(cursor, cursor + settled as u64),
                });
                cursor += settled as u64;
            }
        }

        trace!(
            "chunker: {} sieve classified [{from}, {cursor}) into {} regions",
            sieve.name(),
            queued.len()
        );
        self.open_range = blocked.then_some((cursor, stop));
        self.cursor = cursor;
        let count = queued.len();
        self.pending.extend(queued);
        Ok(count)
    }

    /// Run `sieve` over `slice`, which starts at absolute `from`. When the
    /// cursor is still parked on an open marker-delimited range, only bytes
    /// not searched before are handed to the sieve.
    fn sieve_slice(
        &self,
        sieve: &dyn Sieve,
        slice: &[u8],
        from: u64,
        stop: u64,
    ) -> Result<Vec<ByteRange>, SieveError> {
        let resume = match (self.open_range, sieve.marker_len()) {
            (Some((open, searched)), Some(marker)) if open == from && searched <= stop => {
                let rel = searched
                    .saturating_sub(marker.saturating_sub(1) as u64)
                    .saturating_sub(from);
                Some(rel.max(1) as usize)
            }
            _ => None,
        };
        let Some(rel) = resume.filter(|&rel| rel < slice.len()) else {
            return sieve.sieve(slice);
        };
        let later = sieve.sieve(&slice[rel..])?;
        let open_end = later
            .first()
            .map(|r| r.start + rel as u64)
            .unwrap_or(slice.len() as u64);
        let mut spans = Vec::with_capacity(later.len() + 1);
        spans.push(ByteRange::new(0, open_end));
        spans.extend(later.iter().map(|r| r.shift(rel as u64)));
        Ok(spans)
    }

    /// Next region if it is non-data.
    pub fn next_non_data(&mut self) -> Option<ByteRange> {
        self.pop_if(RegionKind::NonData)
    }

    /// Next region if it is data.
    pub fn next_data(&mut self) -> Option<ByteRange> {
        self.pop_if(RegionKind::Data)
    }

    fn pop_if(&mut self, kind: RegionKind) -> Option<ByteRange> {
        match self.pending.front() {
            Some(region) if region.kind == kind => self.pending.pop_front().map(|r| r.range),
            _ => None,
        }
    }

    /// Buffered bytes for an absolute range, if all of them are still held.
    pub fn slice(&self, range: ByteRange) -> Option<&[u8]> {
        if range.start < self.base || range.end > self.end() || range.start > range.end {
            return None;
        }
        let start = (range.start - self.base) as usize;
        let end = (range.end - self.base) as usize;
        Some(&self.buffer[start..end])
    }

    /// Release bytes before `offset`. Pending regions and unclassified bytes
    /// are always kept.
    pub fn discard_before(&mut self, offset: u64) {
        let keep_from = self
            .pending
            .front()
            .map(|r| r.range.start)
            .unwrap_or(self.cursor)
            .min(offset)
            .min(self.end());
        if keep_from <= self.base {
            return;
        }
        let drop = (keep_from - self.base) as usize;
        self.buffer.drain(..drop);
        self.base = keep_from;
    }

    /// Move the cursor forward without classifying the bytes in between.
    pub fn skip_to(&mut self, offset: u64) {
        if offset > self.cursor {
            self.cursor = offset;
            self.open_range = None;
        }
    }

    /// Drop everything and restart at `offset`.
    pub fn reset(&mut self, offset: u64) {
        self.buffer.clear();
        self.pending.clear();
        self.base = offset;
        self.cursor = offset;
        self.open_range = None;
    }
}
