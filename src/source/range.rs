//! Row-range to block-index arithmetic.

use std::ops::Range;

/// Inclusive span of blocks covering a row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub first: u64,
    pub last: u64,
}

impl BlockSpan {
    /// Blocks covering `[start_row, end_row)`, or `None` for an empty range.
    pub fn covering(start_row: u64, end_row: u64, block_size: u64) -> Option<Self> {
        if end_row <= start_row || block_size == 0 {
            return None;
        }
        Some(Self {
            first: block_of(start_row, block_size),
            last: block_of(end_row - 1, block_size),
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = u64> {
        self.first..=self.last
    }

    /// The block before and the block after this span. Negative indices are
    /// skipped, as are blocks starting at or past `total_rows` when known.
    pub fn neighbours(&self, block_size: u64, total_rows: Option<u64>) -> Vec<u64> {
        let before = self.first.checked_sub(1);
        let after = self
            .last
            .checked_add(1)
            .filter(|&b| !starts_past_end(b, block_size, total_rows));
        before.into_iter().chain(after).collect()
    }
}

/// Index of the block holding `row_index`.
pub fn block_of(row_index: u64, block_size: u64) -> u64 {
    row_index / block_size.max(1)
}

/// Half-open row range of a block.
pub fn block_rows(block_index: u64, block_size: u64) -> Range<u64> {
    let start = block_index.saturating_mul(block_size);
    start..start.saturating_add(block_size)
}

/// Whether a block lies wholly past the end of a dataset of `total_rows`.
/// Block 0 always counts as in range so an empty dataset can be re-read.
pub fn starts_past_end(block_index: u64, block_size: u64, total_rows: Option<u64>) -> bool {
    match total_rows {
        Some(total) => block_index > 0 && block_rows(block_index, block_size).start >= total,
        None => false,
    }
}
