//! Splitting of large identifier lists into bounded data queries.

use std::time::Instant;

use tracing::info;

use crate::query::DownloadParams;

/// Lazy sequence of per-chunk download parameters.
///
/// Chunk `i` carries identifiers `[i * K, min((i + 1) * K, N))` of the
/// parent parameters, so every identifier appears in exactly one chunk and
/// relative order is preserved. An empty identifier list yields a single
/// empty chunk when the parent asked for server-side discovery, and
/// nothing otherwise.
pub struct UuidChunks<'a> {
    params: &'a DownloadParams,
    offset: usize,
    produced: usize,
    last: Instant,
}

/// Chunk the identifiers of `params`.
pub fn uuid_chunks(params: &DownloadParams) -> UuidChunks<'_> {
    UuidChunks {
        params,
        offset: 0,
        produced: 0,
        last: Instant::now(),
    }
}

impl UuidChunks<'_> {
    /// Total number of chunks this sequence yields.
    pub fn total(&self) -> usize {
        let uuids = self.params.uuids.len();
        if uuids == 0 {
            usize::from(self.params.wants_discovery())
        } else {
            uuids.div_ceil(self.params.chunk_size.get())
        }
    }
}

impl Iterator for UuidChunks<'_> {
    type Item = DownloadParams;

    fn next(&mut self) -> Option<Self::Item> {
        if self.produced >= self.total() {
            return None;
        }

        let uuids = &self.params.uuids;
        let upper = (self.offset + self.params.chunk_size.get()).min(uuids.len());
        let chunk = self.params.for_uuids(uuids[self.offset..upper].to_vec());
        self.offset = upper;
        self.produced += 1;

        info!(
            "Generating chunk {}/{} -- {:?}",
            self.produced,
            self.total(),
            self.last.elapsed()
        );
        self.last = Instant::now();

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.produced;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for UuidChunks<'_> {}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use chrono::DateTime;

    use super::*;

    fn params(n: usize, k: usize) -> DownloadParams {
        DownloadParams::new(
            DateTime::from_timestamp(0, 0).unwrap(),
            DateTime::from_timestamp(100, 0).unwrap(),
        )
        .with_uuids((0..n).map(|i| format!("uuid-{}", i)))
        .with_chunk_size(NonZeroUsize::new(k).unwrap())
    }

    #[test]
    fn test_chunks_cover_every_uuid_once() {
        for n in 0..40 {
            for k in 1..12 {
                let p = params(n, k);
                let chunks: Vec<_> = uuid_chunks(&p).collect();
                let rebuilt: Vec<String> = chunks.iter().flat_map(|c| c.uuids.clone()).collect();
                assert_eq!(rebuilt.len(), n, "n={} k={}", n, k);
                assert_eq!(rebuilt, p.uuids, "n={} k={}", n, k);
                assert!(chunks.iter().all(|c| !c.uuids.is_empty() && c.uuids.len() <= k));
            }
        }
    }

    #[test]
    fn test_single_uuid_single_chunk() {
        let p = params(1, 10);
        let chunks: Vec<_> = uuid_chunks(&p).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].uuids, vec!["uuid-0".to_string()]);
    }

    #[test]
    fn test_chunks_keep_range_and_flags() {
        let p = params(5, 2).with_legacy(true);
        for chunk in uuid_chunks(&p) {
            assert_eq!(chunk.start, p.start);
            assert_eq!(chunk.end, p.end);
            assert!(chunk.legacy);
        }
        assert_eq!(uuid_chunks(&p).len(), 3);
    }

    #[test]
    fn test_empty_list() {
        let p = params(0, 10);
        assert_eq!(uuid_chunks(&p).count(), 0);

        let p = p.with_all(true);
        let chunks: Vec<_> = uuid_chunks(&p).collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].uuids.is_empty());
    }

    #[test]
    fn test_restartable() {
        let p = params(7, 3);
        assert_eq!(uuid_chunks(&p).count(), 3);
        assert_eq!(uuid_chunks(&p).count(), 3);
    }
}
