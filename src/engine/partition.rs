//! Split-factor selection and range partitioning.

use std::ops::Range;

use crate::engine::settings::ParallelismStrategy;


/// Number of slices to cut `total` entities into.
///
/// Never below 1, never above `total` (unless `total` is 0, which still
/// yields one empty slice), never above `max_threads`.

pub fn split_count(strategy: ParallelismStrategy, max_threads: usize, total: usize) -> usize {
    let wanted = match strategy {
        ParallelismStrategy::None => 1,
        ParallelismStrategy::SplitEvenly => max_threads,
        ParallelismStrategy::SplitEveryN(per_slice) => total.div_ceil(per_slice.max(1)),
    };
    wanted.min(max_threads).min(total).max(1)
}

/// Cuts `0..total` into `splits` contiguous ranges whose sizes differ by at
/// most one; the first `total % splits` ranges carry the extra element.
///
/// ## Panics
/// If `splits` is zero.

pub fn partition(total: usize, splits: usize) -> Vec<Range<usize>> {
    assert!(splits > 0, "cannot partition into zero slices");
    let base = total / splits;
    let extra = total % splits;

    let mut ranges = Vec::with_capacity(splits);
    let mut begin = 0;
    for split_index in 0..splits {
        let end = begin + base + usize::from(split_index < extra);
        ranges.push(begin..end);
        begin = end;
    }
    debug_assert_eq!(begin, total);
    ranges
}
