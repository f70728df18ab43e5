//! Combinatorial enumeration of yield-point placements for a single method.
//!
//! Given a method with `k` instrumentation points, [`generate`] produces,
//! for every yield count `y` in `0..k-1`, every distinct way to place
//! `y + 1` yield points among the `k` points without producing an empty
//! leading or trailing block.

/// One "run `initial_count` instructions, then yield" step of a schedule.
///
/// `initial_count` never changes after construction. `remaining_count` is
/// decremented once per instrumentation hit by the driver and is reset back
/// to `initial_count` by [`reset`][Schedule::reset] between walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub initial_count: u32,
    pub remaining_count: u32,
    /// Suppresses the branch-snapshot path; set only on blocks synthesized
    /// by the branch-snapshot manager, which already encode a taken branch.
    pub disable_jump_tracking: bool,
}

impl Block {
    fn new(count: u32) -> Self {
        Block {
            initial_count: count,
            remaining_count: count,
            disable_jump_tracking: false,
        }
    }
}

/// An ordered sequence of blocks whose `initial_count`s sum to a method's
/// instrumentation-point count. The boundaries between blocks are yield
/// points: a schedule of `k` blocks encodes `k - 1` yields.
pub type Schedule = Vec<Block>;

/// All schedules for one method, indexed by `yield_count` (zero-based: a
/// schedule at `schedules[y]` has `y + 1` yield points).
pub type ScheduleSet = Vec<Vec<Schedule>>;

pub(crate) fn sum(schedule: &[Block]) -> u32 {
    schedule.iter().map(|b| b.initial_count).sum()
}

/// Resets every block's `remaining_count` to its `initial_count`.
pub fn reset(schedule: &mut [Block]) {
    for block in schedule {
        block.remaining_count = block.initial_count;
    }
}

/// Splits `schedule` by inserting one more yield at absolute position `pos`
/// (counted from the start of the method, 1-indexed).
///
/// `pos` must fall within the last block of `schedule` — the only case the
/// generator ever produces, since every recursive call only ever asks for a
/// position strictly past the previous split point, and all earlier blocks
/// were already fixed by that split.
fn insert_yield(schedule: &[Block], mut pos: u32) -> Schedule {
    let mut result = Vec::with_capacity(schedule.len() + 1);
    let mut idx = 0;
    while idx < schedule.len() && schedule[idx].initial_count < pos {
        result.push(schedule[idx]);
        pos -= schedule[idx].initial_count;
        idx += 1;
    }
    let block = schedule[idx];
    result.push(Block::new(pos));
    result.push(Block::new(block.initial_count - pos));
    result
}

/// Recursive core: inserts a yield at every position in `start..length`,
/// records the results at `levels[depth]` (new entries first, prepended in
/// front of whatever is already there), then recurses on each new schedule
/// restricted to positions strictly past the one that produced it.
///
/// The prepend order is not cosmetic: the driver's neighbour-count math
/// (see the `driver` module) depends on `schedules[y]` enumerating in this
/// exact order.
fn generate_internal(parent: &Schedule, levels: &mut [Vec<Schedule>], start: u32, length: u32, depth: usize) {
    if start >= length {
        return;
    }

    let created: Vec<Schedule> = (start..length).map(|pos| insert_yield(parent, pos)).collect();

    for (i, schedule) in created.iter().enumerate() {
        let split_at = start + i as u32;
        generate_internal(schedule, levels, split_at + 1, length, depth + 1);
    }

    let existing = std::mem::take(&mut levels[depth]);
    levels[depth] = created.into_iter().chain(existing).collect();
}

/// Builds the complete schedule set for a method with `k` instrumentation
/// points. Returns an empty set for `k < 2`: a method with fewer than two
/// instrumentation points cannot be split, so the driver treats it as a
/// single straight-line fragment that never yields.
pub fn generate(k: u32) -> ScheduleSet {
    if k < 2 {
        return Vec::new();
    }
    let mut levels = vec![Vec::new(); (k - 1) as usize];
    let unit = vec![Block::new(k)];
    generate_internal(&unit, &mut levels, 1, k, 0);
    levels
}

/// Continues generation from a branch-synthesized `prefix` schedule whose
/// blocks already sum to `full_len`, populating `levels[accumulator..]` in
/// place. `accumulator` is the number of yields already encoded in `prefix`
/// (`prefix.len() - 1`).
///
/// Used only by the branch-snapshot manager (see the `branch` module) to
/// extend a method's schedule set after a taken branch invalidates the
/// counts the original set was built on.
pub(crate) fn continue_from(prefix: &Schedule, full_len: u32, levels: &mut [Vec<Schedule>]) {
    debug_assert_eq!(sum(prefix), full_len);
    if prefix.is_empty() {
        return;
    }
    let accumulator = prefix.len() - 1;
    let boundary: u32 = prefix[..accumulator].iter().map(|b| b.initial_count).sum();
    generate_internal(prefix, levels, boundary + 1, full_len, accumulator);
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn sum_invariant_proptest(k in 2u32..40) {
            for level in generate(k) {
                for schedule in level {
                    prop_assert_eq!(sum(&schedule), k);
                    prop_assert!(schedule.iter().all(|b| b.initial_count >= 1));
                }
            }
        }
    }

    fn block_counts(schedule: &Schedule) -> Vec<u32> {
        schedule.iter().map(|b| b.initial_count).collect()
    }

    #[test]
    fn empty_for_k_below_two() {
        assert!(generate(0).is_empty());
        assert!(generate(1).is_empty());
    }

    // S5: k=4, expect 3 schedules at yield_count index 1 (two yields),
    // in prepend-derived iteration order.
    #[test]
    fn s5_four_instructions_two_yields() {
        let schedules = generate(4);
        let two_yield = &schedules[1];
        let counts: Vec<Vec<u32>> = two_yield.iter().map(block_counts).collect();
        assert_eq!(counts, vec![vec![2, 1, 1], vec![1, 1, 2], vec![1, 2, 1]]);
    }

    // S1: k=3, schedules [[1,2],[2,1]] at yield_count 0, [[1,1,1]] at yield_count 1.
    #[test]
    fn s1_three_instructions() {
        let schedules = generate(3);
        assert_eq!(schedules.len(), 2);
        let one_yield: Vec<Vec<u32>> = schedules[0].iter().map(block_counts).collect();
        assert_eq!(one_yield, vec![vec![1, 2], vec![2, 1]]);
        let two_yield: Vec<Vec<u32>> = schedules[1].iter().map(block_counts).collect();
        assert_eq!(two_yield, vec![vec![1, 1, 1]]);
    }

    #[test]
    fn sum_invariant_holds_for_every_schedule() {
        for k in 2..8 {
            for level in generate(k) {
                for schedule in level {
                    assert_eq!(sum(&schedule), k);
                }
            }
        }
    }

    // Coverage property: schedules[y] has exactly C(k-1, y+1) entries.
    fn binomial(n: u32, r: u32) -> u64 {
        if r > n {
            return 0;
        }
        let r = r.min(n - r);
        let mut acc = 1u64;
        for i in 0..r {
            acc = acc * (n - i) as u64 / (i + 1) as u64;
        }
        acc
    }

    #[test]
    fn coverage_matches_binomial_counts() {
        for k in 2..9 {
            let schedules = generate(k);
            for (y, level) in schedules.iter().enumerate() {
                let expected = binomial(k - 1, y as u32 + 1);
                assert_eq!(level.len() as u64, expected, "k={k} y={y}");
            }
        }
    }

    #[test]
    fn reset_restores_remaining_counts() {
        let mut schedule = generate(5)[1][0].clone();
        for block in &mut schedule {
            block.remaining_count = 0;
        }
        reset(&mut schedule);
        assert!(schedule.iter().all(|b| b.remaining_count == b.initial_count));
    }

    #[test]
    fn continue_from_populates_only_from_accumulator_onward() {
        // prefix: one real split at position 2 of an eventual k=7 schedule,
        // i.e. blocks [2, 5], accumulator = 1.
        let prefix = vec![Block::new(2), Block::new(5)];
        let mut levels = vec![Vec::new(); 6];
        continue_from(&prefix, 7, &mut levels);
        assert!(levels[0].is_empty());
        assert!(!levels[1].is_empty());
        for schedule in &levels[1] {
            assert_eq!(sum(schedule), 7);
        }
    }
}
