//! Terminator-anchored backward record sieve.
//!
//! Status records may carry 0 or 2 trailing pad bytes, which makes a forward
//! walk ambiguous. Walking back from the end of the record region removes the
//! ambiguity: at each boundary an augmented status, then a plain status, then
//! a sample is tried, in that order.

use tracing::trace;

use crate::ranges::ByteRange;
use crate::sieve::{RecordGeometry, Sieve, SieveError};

pub struct BackwardSieve {
    geometry: RecordGeometry,
}

impl BackwardSieve {
    pub fn new(geometry: RecordGeometry) -> Self {
        Self { geometry }
    }
}

impl Sieve for BackwardSieve {
    fn name(&self) -> &str {
        "backward"
    }

    fn sieve(&self, buf: &[u8]) -> Result<Vec<ByteRange>, SieveError> {
        let g = &self.geometry;
        let (start, anchor) = g.frame_bounds(buf);
        let region_start = g.header_end(buf, start, anchor).unwrap_or(start);
        let region_end = g.region_end(buf, region_start, anchor);

        let mut samples = Vec::new();
        let mut pos = region_end;
        while pos > region_start {
            let avail = pos - region_start;
            if let Some(aug) = g.augmented_status_bytes {
                if avail >= aug && g.marker.matches(&buf[pos - aug..pos]) {
                    pos -= aug;
                    continue;
                }
            }
            if avail >= g.status_bytes && g.marker.matches(&buf[pos - g.status_bytes..pos]) {
                pos -= g.status_bytes;
                continue;
            }
            if avail >= g.sample_bytes {
                samples.push(ByteRange::new((pos - g.sample_bytes) as u64, pos as u64));
                pos -= g.sample_bytes;
                continue;
            }
            trace!(
                "backward sieve: {avail} bytes left at {pos}, smallest record is {}",
                g.smallest_record()
            );
            return Err(SieveError::Alignment {
                position: pos,
                remaining: avail,
            });
        }
        samples.reverse();
        Ok(samples)
    }
}
