//! Gene-local to concatenated-global column coordinates.
//!
//! Offsets run over the RAW per-gene alignment widths, since the column mask
//! is laid over the full concatenated raw matrix before trimming is shown.

/// A half-open run `[start, end)` of retained alignment columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetainedRange {
    pub start: usize,
    pub end: usize,
}

impl RetainedRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Converts a one-indexed inclusive flank pair as printed by Gblocks.
    ///
    /// ```
    /// use msacat::libs::coord::RetainedRange;
    /// assert_eq!(RetainedRange::from_flanks(1, 50), RetainedRange::new(0, 50));
    /// assert_eq!(RetainedRange::from_flanks(80, 120), RetainedRange::new(79, 120));
    /// ```
    pub fn from_flanks(start_one: usize, end_incl: usize) -> Self {
        Self::new(start_one - 1, end_incl)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn shift(&self, offset: usize) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }
}

/// Shifts a gene's retained ranges by the widths of all prior genes and
/// advances the running offset by this gene's raw width.
pub fn to_global(
    ranges: &[RetainedRange],
    offset: usize,
    raw_width: usize,
) -> (Vec<RetainedRange>, usize) {
    let shifted = ranges.iter().map(|r| r.shift(offset)).collect();

    (shifted, offset + raw_width)
}

/// A boolean column mask over the full concatenated raw matrix, true where a
/// column lies inside a retained block.
pub fn column_mask(ranges: &[RetainedRange], total_width: usize) -> Vec<bool> {
    let mut mask = vec![false; total_width];
    for range in ranges {
        debug_assert!(range.end <= total_width);
        for flag in mask.iter_mut().take(range.end).skip(range.start) {
            *flag = true;
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_additive() {
        // ranges computed per gene then shifted must equal ranges computed
        // with one running offset
        let gene_a = vec![RetainedRange::new(0, 50), RetainedRange::new(79, 120)];
        let gene_b = vec![RetainedRange::new(5, 30)];
        let width_a = 150;
        let width_b = 60;

        let (global_a, offset) = to_global(&gene_a, 0, width_a);
        let (global_b, offset) = to_global(&gene_b, offset, width_b);
        assert_eq!(offset, width_a + width_b);

        let (separate_b, _) = to_global(&gene_b, 0, width_b);
        let shifted_b: Vec<_> = separate_b.iter().map(|r| r.shift(width_a)).collect();
        assert_eq!(global_b, shifted_b);

        assert_eq!(global_a, gene_a);
        assert_eq!(global_b, vec![RetainedRange::new(155, 180)]);
    }

    #[test]
    fn test_column_mask() {
        let ranges = vec![RetainedRange::new(0, 2), RetainedRange::new(4, 6)];
        let mask = column_mask(&ranges, 7);
        assert_eq!(mask, vec![true, true, false, false, true, true, false]);

        // union of all global ranges stays inside [0, total_raw_width)
        assert_eq!(mask.len(), 7);
        assert_eq!(mask.iter().filter(|&&b| b).count(), 4);
    }

    #[test]
    fn test_empty_ranges() {
        assert_eq!(column_mask(&[], 3), vec![false; 3]);
        let (shifted, offset) = to_global(&[], 10, 25);
        assert!(shifted.is_empty());
        assert_eq!(offset, 35);
    }
}
