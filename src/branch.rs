//! The branch-snapshot manager.
//!
//! A taken branch can skip instrumentation points the generator already
//! counted on, invalidating every live method's precomputed schedule sizes.
//! This module either proves the deviation is unobservable (the
//! short-circuit path) or freezes every live method's enumeration state and
//! rebuilds a specialized schedule tree rooted at the path actually taken
//! (the general path).
//!
//! **Known over-approximation.** The general path extends a branching
//! method's `instr_count` by `instr_count - target_instr_index` — an upper
//! bound on how many more times the branch target might be re-executed,
//! not an exact count. This is carried over verbatim from the system this
//! core is adapted from rather than corrected, since correcting it would
//! change the schedule counts the coverage property depends on.

use arrayvec::ArrayVec;
use tracing::debug;

use crate::context::RunContext;
use crate::error::HijackError;
use crate::generator::{self, Block, ScheduleSet};
use crate::registry::{BranchRecord, MethodIndex};

/// Bound on the number of live methods the short-circuit check inspects
/// without falling back to a heap allocation. Generous for the call chains
/// this core is exercised against; the general path has no such bound.
const SHORT_CIRCUIT_PROBE_CAP: usize = 64;

pub fn handle_branch(ctx: &mut RunContext, index: MethodIndex, branch: BranchRecord) {
    let Some(target) = branch.target_instr_index else {
        debug!(error = %HijackError::UnknownBranchTarget, "heisen-core: ignoring branch with unrecorded target");
        ctx.registry.get_mut(index).pending_branch = None;
        return;
    };

    if is_short_circuit_eligible(ctx, index) {
        short_circuit(ctx, index, target);
        ctx.registry.get_mut(index).pending_branch = None;
        return;
    }

    general_path(ctx, index, target);
    ctx.registry.get_mut(index).pending_branch = None;
    if let Some(scheduler) = ctx.resolve_scheduler() {
        let _ = scheduler.force_restart();
    }
}

/// True when every live method nested below `index` in the call chain
/// (a higher `method_index`) has already reached the last block of its
/// current schedule: the branch cannot change which of their blocks runs
/// next, so no specialization is observable.
fn is_short_circuit_eligible(ctx: &RunContext, index: MethodIndex) -> bool {
    let Some(this_index) = ctx.registry.get(index).method_index else {
        return false;
    };
    let mut nested: ArrayVec<MethodIndex, SHORT_CIRCUIT_PROBE_CAP> = ArrayVec::new();
    for other in ctx.registry.live_indices() {
        let record = ctx.registry.get(other);
        if record.method_index.map(|i| i > this_index).unwrap_or(false) {
            if nested.try_push(other).is_err() {
                debug!("heisen-core: short-circuit probe exceeded capacity, falling back to general path");
                return false;
            }
        }
    }
    nested.iter().all(|&i| has_no_further_blocks(ctx, i))
}

fn has_no_further_blocks(ctx: &RunContext, index: MethodIndex) -> bool {
    let record = ctx.registry.get(index);
    match record.current_schedule() {
        Some(schedule) => record.cur_block + 1 >= schedule.len(),
        None => true,
    }
}

fn short_circuit(ctx: &mut RunContext, index: MethodIndex, target_instr_index: u32) {
    let record = ctx.registry.get_mut(index);
    let skipped = record.instr_count.saturating_sub(target_instr_index);
    let cur_block = record.cur_block;
    if let Some(schedule) = record.current_schedule_mut() {
        if let Some(block) = schedule.get_mut(cur_block) {
            block.remaining_count += skipped;
        }
    }
}

fn general_path(ctx: &mut RunContext, branching_index: MethodIndex, target_instr_index: u32) {
    for m in ctx.registry.live_indices() {
        specialize(ctx, m, m == branching_index, target_instr_index);
    }

    let driver = MethodIndex(0);
    if ctx.registry.len() > driver.0 && ctx.registry.get(driver).is_live() {
        ctx.outer_yield_count = ctx.registry.get(driver).cur_yield_count;
    }
}

fn specialize(ctx: &mut RunContext, m: MethodIndex, is_branching_method: bool, target_instr_index: u32) {
    let record = ctx.registry.get(m);
    let Some(schedule) = record.current_schedule() else {
        return;
    };

    let mut prefix: Vec<Block> = schedule[..record.cur_block]
        .iter()
        .map(|b| Block { disable_jump_tracking: true, ..*b })
        .collect();

    let tail_remaining: u32 = schedule[record.cur_block..].iter().map(|b| b.remaining_count).sum();
    let mut final_count = tail_remaining;
    let mut instr_count = record.instr_count;
    if is_branching_method {
        let extension = record.instr_count.saturating_sub(target_instr_index);
        final_count += extension;
        instr_count += extension;
    }
    prefix.push(Block {
        initial_count: final_count,
        remaining_count: final_count,
        disable_jump_tracking: true,
    });

    let accumulator = prefix.len() - 1;
    let record = ctx.registry.get_mut(m);
    record.instr_count = instr_count;
    let old_schedules = record.schedules.take().unwrap_or_default();
    let saved = record.take_snapshot(old_schedules);
    record.saved_states.push(saved);

    let levels_len = (instr_count.saturating_sub(1)) as usize;
    let mut levels: ScheduleSet = vec![Vec::new(); levels_len.max(accumulator + 1)];
    levels[accumulator] = vec![prefix.clone()];
    if accumulator + 1 < levels_len {
        generator::continue_from(&prefix, instr_count, &mut levels);
    }

    let record = ctx.registry.get_mut(m);
    record.schedules = Some(levels);
    record.cur_yield_count = accumulator;
    record.cur_schedule_iter = Some(0);
    record.cur_block = 0;
    record.call_number = 0;
    record.neighbour_count = None;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::context::RunContext;
    use crate::registry::MethodId;
    use crate::scheduler::test_support::SharedRecordingScheduler;
    use crate::scheduler::SchedulerName;

    fn wire_scheduler(ctx: &mut RunContext) -> SharedRecordingScheduler {
        let handle = SharedRecordingScheduler::default();
        let cloned = handle.clone();
        let name = SchedulerName::new("Heisen", "Heisen.Scheduler", "Yield");
        ctx.register_scheduler(name.clone(), move || Box::new(cloned.clone()));
        ctx.select_scheduler(name);
        handle
    }

    #[test]
    fn unknown_branch_target_is_ignored() {
        let mut ctx = RunContext::new(Config::default());
        let _scheduler = wire_scheduler(&mut ctx);
        let id = MethodId(1);
        for offset in 0..4 {
            crate::driver::record_instr_point(&mut ctx, id, offset);
        }
        crate::driver::hijack_first(&mut ctx, id);
        crate::driver::record_branch_site(&mut ctx, id, None);

        let index = ctx.registry.lookup_or_create(id);
        crate::driver::hijack_fast(&mut ctx, id);

        assert!(ctx.registry.get(index).pending_branch.is_none());
    }

    #[test]
    fn short_circuit_path_adjusts_remaining_count_in_place() {
        let mut ctx = RunContext::new(Config::default());
        let _scheduler = wire_scheduler(&mut ctx);
        let id = MethodId(1);
        for offset in 0..4 {
            crate::driver::record_instr_point(&mut ctx, id, offset);
        }
        crate::driver::hijack_first(&mut ctx, id);
        let index = ctx.registry.lookup_or_create(id);
        let before = ctx.registry.get(index).current_schedule().unwrap()[0].remaining_count;

        handle_branch(&mut ctx, index, BranchRecord { target_instr_index: Some(1) });

        let after = ctx.registry.get(index).current_schedule().unwrap()[0].remaining_count;
        assert!(after >= before);
        assert!(ctx.registry.get(index).pending_branch.is_none());
    }

    #[test]
    fn general_path_saves_and_rebuilds_schedules() {
        let mut ctx = RunContext::new(Config::default());
        let scheduler = wire_scheduler(&mut ctx);
        let a = MethodId(1);
        let b = MethodId(2);
        for offset in 0..4 {
            crate::driver::record_instr_point(&mut ctx, a, offset);
        }
        crate::driver::hijack_first(&mut ctx, a);
        for offset in 0..2 {
            crate::driver::record_instr_point(&mut ctx, b, offset);
        }
        crate::driver::hijack_first(&mut ctx, b);

        let a_index = ctx.registry.lookup_or_create(a);
        assert!(ctx.registry.get(a_index).current_schedule().unwrap().len() > 1);

        general_path(&mut ctx, a_index, 1);

        assert_eq!(ctx.registry.get(a_index).saved_states.len(), 1);
        assert!(ctx.registry.get(a_index).schedules.is_some());
        assert_eq!(scheduler.0.borrow().calls.len(), 0);
    }

    /// The number of instrumentation ticks one full activation of `index`'s
    /// *currently active* schedule takes. Derived from `initial_count`
    /// (fixed at schedule-build time) rather than `instr_count` (which a
    /// branching method's own specialization bumps but never un-bumps),
    /// so it stays correct across a specialize/restore round trip.
    fn activation_len(ctx: &RunContext, index: MethodIndex) -> u32 {
        ctx.registry.get(index).current_schedule().map(|s| s.iter().map(|b| b.initial_count).sum()).unwrap_or(1)
    }

    #[test]
    fn general_path_round_trip_restores_pre_branch_state_field_for_field() {
        let mut ctx = RunContext::new(Config::default());
        let _scheduler = wire_scheduler(&mut ctx);
        let id = MethodId(1);
        for offset in 0..4 {
            crate::driver::record_instr_point(&mut ctx, id, offset);
        }
        crate::driver::hijack_first(&mut ctx, id);
        let index = ctx.registry.lookup_or_create(id);

        // Snapshot every field `SavedState`/`restore_snapshot` round-trips,
        // taken right where `specialize` itself will take it below.
        let pre_levels = ctx.registry.get(index).schedules.as_ref().unwrap().len();
        let pre_yield_count = ctx.registry.get(index).cur_yield_count;
        let pre_schedule_iter = ctx.registry.get(index).cur_schedule_iter;
        let pre_block = ctx.registry.get(index).cur_block;
        let pre_call_number = ctx.registry.get(index).call_number;
        let pre_neighbour_count = ctx.registry.get(index).neighbour_count;

        general_path(&mut ctx, index, 1);
        assert_eq!(ctx.registry.get(index).saved_states.len(), 1);

        // Drive the specialized subtree opened up by the branch to full
        // exhaustion: the driver's own advance-or-restore logic (in
        // `driver::hijack_first`) pops the saved frame once the specialized
        // schedule space runs out, since there is nowhere else left to stop.
        let mut activations = 0;
        while !ctx.registry.get(index).saved_states.is_empty() {
            crate::driver::hijack_first(&mut ctx, id);
            let total = activation_len(&ctx, index);
            for _ in 1..total {
                crate::driver::hijack_fast(&mut ctx, id);
            }
            activations += 1;
            assert!(activations < 10_000, "specialized subtree did not drain");
        }

        let record = ctx.registry.get(index);
        assert_eq!(record.schedules.as_ref().unwrap().len(), pre_levels);
        assert_eq!(record.cur_yield_count, pre_yield_count);
        assert_eq!(record.cur_schedule_iter, pre_schedule_iter);
        assert_eq!(record.cur_block, pre_block);
        assert_eq!(record.call_number, pre_call_number);
        assert_eq!(record.neighbour_count, pre_neighbour_count);
    }
}
