use crate::ranges::ByteRange;
use crate::sieve::pattern::{find_all, find_pattern};
use crate::sieve::{Sieve, SieveError};

/// Span sieve for raw instrument files: each span runs from one header
/// occurrence to the next, the last one to the end of the buffer.
///
/// The last span only settles when the next header or the end of input is
/// seen, and its bytes stay buffered until then. A single span larger than
/// the engine's `max_buffer_bytes` is a buffer overflow.
pub struct HeaderSpanSieve {
    pattern: Vec<u8>,
}

impl HeaderSpanSieve {
    pub fn new(pattern: Vec<u8>) -> Self {
        Self { pattern }
    }
}

impl Sieve for HeaderSpanSieve {
    fn name(&self) -> &str {
        "header"
    }

    fn sieve(&self, buf: &[u8]) -> Result<Vec<ByteRange>, SieveError> {
        let hits = find_all(buf, &self.pattern);
        let mut spans = Vec::with_capacity(hits.len());
        for (i, &start) in hits.iter().enumerate() {
            let end = hits.get(i + 1).copied().unwrap_or(buf.len());
            spans.push(ByteRange::new(start as u64, end as u64));
        }
        Ok(spans)
    }

    fn settled_prefix(&self, tail: &[u8]) -> usize {
        match find_pattern(tail, &self.pattern) {
            Some(first) => first,
            None => tail.len().saturating_sub(self.pattern.len().saturating_sub(1)),
        }
    }

    fn marker_len(&self) -> Option<usize> {
        Some(self.pattern.len())
    }
}
