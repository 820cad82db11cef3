//! Maps a sample or time window onto a span of blocks across segments.
//!
//! A block covers the points from its own start up to the start of the
//! next block; the last block of a segment absorbs everything up to the
//! segment end. Lookups use binary search over the ordered segments and
//! index entries.

use crate::format::index::BlockIndexEntry;
use crate::format::Timestamp;

/// The index of one segment as seen by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct SegmentView<'a> {
    /// Index entries with offset-free start times.
    pub entries: &'a [BlockIndexEntry],
    /// Channel-wide sample number of the segment's first sample.
    pub sample_offset: i64,
    /// Offset-free start of the segment.
    pub start_time: Timestamp,
    /// Offset-free end of the segment (exclusive).
    pub end_time: Timestamp,
}

impl SegmentView<'_> {
    fn number_of_samples(&self) -> i64 {
        self.entries.last().map_or(0, BlockIndexEntry::end_sample)
    }

    fn lower_bound(&self, by_time: bool) -> i64 {
        if by_time {
            self.start_time
        } else {
            self.sample_offset
        }
    }

    fn upper_bound(&self, by_time: bool) -> i64 {
        if by_time {
            self.end_time
        } else {
            self.sample_offset + self.number_of_samples()
        }
    }

    fn block_key(&self, entry: &BlockIndexEntry, by_time: bool) -> i64 {
        if by_time {
            entry.start_time
        } else {
            self.sample_offset + entry.start_sample
        }
    }
}

/// First and last block (inclusive) touched by a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Segment holding the first block.
    pub start_segment: usize,
    /// First block within `start_segment`.
    pub start_block: usize,
    /// Segment holding the last block.
    pub end_segment: usize,
    /// Last block within `end_segment`.
    pub end_block: usize,
}

/// Resolves `[lower, upper)` against `segments`.
///
/// Bounds are sample numbers, or offset-free µs times with `by_time`.
/// Segments without blocks are ignored. Returns `None` when the window does
/// not intersect any segment.
pub fn resolve(
    segments: &[SegmentView<'_>],
    lower: i64,
    upper: i64,
    by_time: bool,
) -> Option<BlockSpan> {
    if lower >= upper {
        return None;
    }
    let populated: Vec<usize> = (0..segments.len())
        .filter(|&i| !segments[i].entries.is_empty())
        .collect();

    let first = populated.partition_point(|&i| segments[i].upper_bound(by_time) <= lower);
    let last = populated
        .partition_point(|&i| segments[i].lower_bound(by_time) < upper)
        .checked_sub(1)?;
    if first >= populated.len() || first > last {
        return None;
    }
    let (start_segment, end_segment) = (populated[first], populated[last]);

    let start_view = &segments[start_segment];
    let start_block = start_view
        .entries
        .partition_point(|e| start_view.block_key(e, by_time) <= lower)
        .saturating_sub(1);

    let end_view = &segments[end_segment];
    let end_block = end_view
        .entries
        .partition_point(|e| end_view.block_key(e, by_time) < upper)
        .saturating_sub(1);

    Some(BlockSpan {
        start_segment,
        start_block,
        end_segment,
        end_block,
    })
}
