//! SIO mule block framing.
//!
//! A block is a 33-byte ASCII header delimited by `0x01`/`0x02`, a binary
//! payload whose length is declared in the header, and a `0x03` terminator.

use anyhow::{Result, anyhow, bail};
use regex::bytes::Regex;
use tracing::{debug, trace};

use crate::constants::{SIO_BLOCK_END, SIO_BLOCK_START, SIO_HEADER_LEN};
use crate::ranges::ByteRange;
use crate::sieve::{Sieve, SieveError};

const SIO_HEADER_REGEX: &str = r"(?-u)\x01([A-Z]{2})[0-9]{7}_([0-9A-Fa-f]{4})[a-zA-Z]([0-9A-Fa-f]{8})_([0-9A-Fa-f]{2})_([0-9A-Fa-f]{4})\x02";

/// Parsed SIO block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SioHeader {
    pub instrument_id: String,
    pub payload_len: usize,
    pub controller_time: u32,
}

pub struct SioBlockSieve {
    matcher: Regex,
    instrument_id: Option<Vec<u8>>,
}

impl SioBlockSieve {
    /// Sieve accepting blocks for `instrument_id`, or every block when `None`.
    pub fn new(instrument_id: Option<&str>) -> Result<Self> {
        if let Some(id) = instrument_id {
            if id.len() != 2 || !id.bytes().all(|b| b.is_ascii_uppercase()) {
                bail!("sio instrument id must be two uppercase letters, got {id:?}");
            }
        }
        let matcher =
            Regex::new(SIO_HEADER_REGEX).map_err(|e| anyhow!("sio header regex: {e}"))?;
        Ok(Self {
            matcher,
            instrument_id: instrument_id.map(|id| id.as_bytes().to_vec()),
        })
    }

    /// Parse the block header at the start of `buf`.
    pub fn parse_header(&self, buf: &[u8]) -> Option<SioHeader> {
        let caps = self.matcher.captures(buf)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        let hex_field = |idx: usize| {
            caps.get(idx)
                .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
                .and_then(|s| u32::from_str_radix(s, 16).ok())
        };
        Some(SioHeader {
            instrument_id: String::from_utf8_lossy(caps.get(1)?.as_bytes()).into_owned(),
            payload_len: hex_field(2)? as usize,
            controller_time: hex_field(3)?,
        })
    }
}

impl Sieve for SioBlockSieve {
    fn name(&self) -> &str {
        "sio"
    }

    fn terminated(&self) -> bool {
        true
    }

    fn sieve(&self, buf: &[u8]) -> Result<Vec<ByteRange>, SieveError> {
        Ok(self.walk(buf).0)
    }

    fn settled_prefix(&self, tail: &[u8]) -> usize {
        self.walk(tail).1
    }
}

impl SioBlockSieve {
    /// Matching blocks, plus the offset before which no block can still start.
    ///
    /// A header whose declared block runs past the buffer only holds back the
    /// settle point while nothing complete follows it. A complete block after
    /// it means the length field was bogus, and the header is passed over.
    fn walk(&self, buf: &[u8]) -> (Vec<ByteRange>, usize) {
        let mut blocks = Vec::new();
        let mut pos = 0usize;
        let mut incomplete: Option<usize> = None;
        while pos < buf.len() {
            let Some(found) = self.matcher.find_at(buf, pos) else {
                break;
            };
            let start = found.start();
            let Some(header) = self.parse_header(&buf[start..]) else {
                pos = start + 1;
                continue;
            };
            let block_end = found.end() + header.payload_len + 1;
            if block_end > buf.len() {
                // may still be arriving; keep looking for complete blocks past it
                incomplete.get_or_insert(start);
                pos = start + 1;
                continue;
            }
            if buf[block_end - 1] != SIO_BLOCK_END {
                trace!("sio sieve: header at {start} has no terminator");
                pos = start + 1;
                continue;
            }
            if let Some(bogus) = incomplete.take() {
                debug!(
                    "sio sieve: header at {bogus} declares a block past the input; skipped for block at {start}"
                );
            }
            let id_matches = match &self.instrument_id {
                Some(want) => header.instrument_id.as_bytes() == want.as_slice(),
                None => true,
            };
            if id_matches {
                trace!(
                    "sio sieve: {} block at {start}, controller time {:#010x}",
                    header.instrument_id, header.controller_time
                );
                blocks.push(ByteRange::new(start as u64, block_end as u64));
            }
            pos = block_end;
        }
        if let Some(start) = incomplete {
            return (blocks, start);
        }
        // a header may still be arriving in the last few bytes
        let window = buf.len().saturating_sub(SIO_HEADER_LEN - 1).max(pos);
        let settled = memchr::memchr(SIO_BLOCK_START, &buf[window.min(buf.len())..])
            .map(|i| window + i)
            .unwrap_or(buf.len());
        (blocks, settled)
    }
}

/// Build one SIO block around `payload`. Used by tests and tooling.
pub fn build_block(instrument_id: &str, controller_time: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIO_HEADER_LEN + payload.len() + 1);
    out.push(SIO_BLOCK_START);
    out.extend_from_slice(
        format!(
            "{instrument_id}1237101_{:04X}u{controller_time:08X}_00_0000",
            payload.len()
        )
        .as_bytes(),
    );
    out.push(crate::constants::SIO_HEADER_END);
    out.extend_from_slice(payload);
    out.push(SIO_BLOCK_END);
    out
}
