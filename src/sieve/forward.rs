//! Header-anchored forward record sieve.
//!
//! Walks the record region from the embedded header forward. At each offset
//! a status marker takes priority; otherwise the next `sample_bytes` are a
//! sample candidate.

use tracing::trace;

use crate::ranges::ByteRange;
use crate::sieve::{RecordGeometry, Sieve, SieveError};

pub struct ForwardSieve {
    geometry: RecordGeometry,
}

impl ForwardSieve {
    pub fn new(geometry: RecordGeometry) -> Self {
        Self { geometry }
    }
}

impl Sieve for ForwardSieve {
    fn name(&self) -> &str {
        "forward"
    }

    fn sieve(&self, buf: &[u8]) -> Result<Vec<ByteRange>, SieveError> {
        let g = &self.geometry;
        let (start, end) = g.frame_bounds(buf);
        let Some(region_start) = g.header_end(buf, start, end) else {
            trace!("forward sieve: no record header in {} bytes", buf.len());
            return Ok(Vec::new());
        };
        let region_end = g.region_end(buf, region_start, end);

        let mut out = Vec::new();
        let mut idx = region_start;
        while region_end - idx >= g.sample_bytes.min(g.status_bytes) {
            let remaining = region_end - idx;
            if remaining >= g.status_bytes && g.marker.matches(&buf[idx..region_end]) {
                idx += g.status_bytes;
            } else if remaining >= g.sample_bytes {
                out.push(ByteRange::new(idx as u64, (idx + g.sample_bytes) as u64));
                idx += g.sample_bytes;
            } else {
                break;
            }
        }
        trace!(
            "forward sieve: {} samples in region [{region_start}, {region_end}), {} bytes left",
            out.len(),
            region_end - idx
        );
        Ok(out)
    }
}
