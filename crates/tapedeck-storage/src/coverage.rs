#![forbid(unsafe_code)]

//! Byte-range coverage of a temp file.
//!
//! Sequential ingestion only ever grows a single prefix `0..cursor`. Ranged
//! restarts leave holes, and promotion is only allowed once [`Coverage::is_complete`]
//! holds for the whole asset.

use std::ops::Range;

use rangemap::RangeSet;

/// Tracks which byte ranges of a temp file are durable.
#[cfg_attr(test, unimock::unimock(api = CoverageMock))]
pub trait Coverage: Send + 'static {
    /// Mark a range as durable.
    fn mark(&mut self, range: Range<u64>);

    /// Whether `0..total` is fully covered. Always false while the total is unknown.
    fn is_complete(&self) -> bool;

    /// Whether every byte of `range` is covered.
    fn covers(&self, range: Range<u64>) -> bool;

    /// End of the covered run that contains `from`, or `from` itself if
    /// `from` is not covered.
    fn contiguous_end(&self, from: u64) -> u64;

    /// First hole, capped at `max_size` bytes.
    fn next_gap(&self, max_size: u64) -> Option<Range<u64>>;

    /// Every hole in `0..total`.
    fn gaps(&self) -> Vec<Range<u64>>;

    fn total_size(&self) -> Option<u64>;

    /// Total size may become known late (Content-Length, end of stream).
    fn set_total_size(&mut self, size: u64);
}

/// Fixes the total at `len` and returns the first hole in `0..len`, if any.
pub(crate) fn first_hole(coverage: &mut dyn Coverage, len: u64) -> Option<Range<u64>> {
    coverage.set_total_size(len);
    if coverage.is_complete() {
        return None;
    }
    Some(coverage.next_gap(u64::MAX).unwrap_or(len..len))
}

/// In-memory coverage backed by [`RangeSet`], which merges adjacent ranges.
#[derive(Debug, Clone, Default)]
pub struct MemCoverage {
    ranges: RangeSet<u64>,
    total_size: Option<u64>,
}

impl MemCoverage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_total_size(total_size: u64) -> Self {
        Self {
            ranges: RangeSet::new(),
            total_size: Some(total_size),
        }
    }
}

impl Coverage for MemCoverage {
    fn mark(&mut self, range: Range<u64>) {
        if !range.is_empty() {
            self.ranges.insert(range);
        }
    }

    fn is_complete(&self) -> bool {
        match self.total_size {
            None => false,
            Some(0) => true,
            Some(total) => self.covers(0..total),
        }
    }

    fn covers(&self, range: Range<u64>) -> bool {
        if range.is_empty() {
            return true;
        }
        self.ranges.gaps(&range).next().is_none()
    }

    fn contiguous_end(&self, from: u64) -> u64 {
        self.ranges.get(&from).map_or(from, |run| run.end)
    }

    fn next_gap(&self, max_size: u64) -> Option<Range<u64>> {
        let total = self.total_size?;
        let gap = self.ranges.gaps(&(0..total)).next()?;
        let capped_end = gap.start.saturating_add(max_size).min(gap.end);
        Some(gap.start..capped_end)
    }

    fn gaps(&self) -> Vec<Range<u64>> {
        match self.total_size {
            None | Some(0) => Vec::new(),
            Some(total) => self.ranges.gaps(&(0..total)).collect(),
        }
    }

    fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    fn set_total_size(&mut self, size: u64) {
        self.total_size = Some(size);
    }
}
