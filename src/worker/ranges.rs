//! Block range planning for chunk-constrained log queries.

/// Split the closed interval `[start, end]` into contiguous sub-ranges of at
/// most `size` blocks each. Returns inclusive `(from, to)` pairs in ascending
/// order whose union exactly covers the input; empty when `start > end`.
///
/// `size` must be greater than zero.
pub fn plan_ranges(start: u64, end: u64, size: u64) -> Vec<(u64, u64)> {
    debug_assert!(size > 0, "range size must be positive");

    let mut ranges = Vec::new();
    let mut from = start;
    while from <= end {
        let to = from.saturating_add(size - 1).min(end);
        ranges.push((from, to));
        if to == u64::MAX {
            break;
        }
        from = to + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_interval_into_bounded_chunks() {
        assert_eq!(
            plan_ranges(100, 250, 50),
            vec![(100, 149), (150, 199), (200, 249), (250, 250)]
        );
    }

    #[test]
    fn empty_when_start_after_end() {
        assert_eq!(plan_ranges(10, 5, 50), Vec::new());
    }

    #[test]
    fn single_block_interval() {
        assert_eq!(plan_ranges(7, 7, 100), vec![(7, 7)]);
    }

    #[test]
    fn exact_multiple_has_no_tail_chunk() {
        assert_eq!(plan_ranges(0, 99, 50), vec![(0, 49), (50, 99)]);
    }

    #[test]
    fn ranges_are_contiguous_and_cover_the_interval() {
        let ranges = plan_ranges(1_000, 13_337, 500);

        assert_eq!(ranges.first().unwrap().0, 1_000);
        assert_eq!(ranges.last().unwrap().1, 13_337);
        for window in ranges.windows(2) {
            assert_eq!(window[0].1 + 1, window[1].0);
        }
        for (from, to) in ranges {
            assert!(from <= to);
            assert!(to - from < 500);
        }
    }
}
