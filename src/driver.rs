//! The cooperative driver: the per-instruction hook the JIT calls at every
//! instrumentation point, plus the branch-site bookkeeping that feeds the
//! branch-snapshot manager.

use tracing::{debug, error, trace};

use crate::branch;
use crate::context::RunContext;
use crate::error::HijackError;
use crate::generator;
use crate::registry::{BranchRecord, MethodId, MethodIndex};

/// Result of stepping one method's current block by one instrumentation hit.
enum Step {
    /// The method has no schedule (straight-line, `instr_count < 2`).
    NoSchedule,
    /// The current block still has budget; nothing observable happened.
    Continued,
    /// The current block's budget was exhausted on a previous hit; the
    /// driver must advance to the next block and yield.
    Yielded,
}

fn step(ctx: &mut RunContext, index: MethodIndex) -> Step {
    let record = ctx.registry.get_mut(index);
    let cur_block = record.cur_block;
    let Some(schedule) = record.current_schedule_mut() else {
        return Step::NoSchedule;
    };
    let block = &mut schedule[cur_block];
    if block.remaining_count == 0 {
        record.cur_block += 1;
        Step::Yielded
    } else {
        block.remaining_count -= 1;
        Step::Continued
    }
}

/// `neighbour_count(m)`: the product, over every method whose
/// `method_index` is greater than `m`'s, of the size of that method's own
/// `schedules[Y]` at the current outer yield-count. Cached on the record
/// and invalidated whenever `Y` advances or the method's own schedules are
/// rebuilt.
fn neighbour_count(ctx: &mut RunContext, index: MethodIndex) -> u64 {
    if let Some(cached) = ctx.registry.get(index).neighbour_count {
        return cached;
    }
    let Some(this_index) = ctx.registry.get(index).method_index else {
        return 1;
    };
    let mut product: u64 = 1;
    for other in ctx.registry.indices() {
        let record = ctx.registry.get(other);
        let Some(other_index) = record.method_index else {
            continue;
        };
        if other_index <= this_index {
            continue;
        }
        if let Some(levels) = &record.schedules {
            if let Some(level) = levels.get(record.cur_yield_count) {
                product *= level.len().max(1) as u64;
            }
        }
    }
    ctx.registry.get_mut(index).neighbour_count = Some(product);
    product
}

/// Advances every live method's own `cur_yield_count` to the driver's new
/// `Y`, rewinds it to the head of its schedule set at that level, and drops
/// its cached neighbour count, since all three are now stale.
fn advance_outer_yield_count(ctx: &mut RunContext) {
    let y = ctx.outer_yield_count;
    for index in ctx.registry.live_indices() {
        let record = ctx.registry.get_mut(index);
        record.cur_yield_count = y;
        record.cur_schedule_iter = Some(0);
        record.cur_block = 0;
        record.call_number = 0;
        record.neighbour_count = None;
    }
}

/// Invoked at the first instrumentation point of a method activation.
///
/// On the very first first-visit entry for this [`RunContext`], resolves
/// the scheduler; a missing scheduler disables the core for the rest of the
/// run rather than propagating an error to the JIT (see the crate's error
/// handling table).
pub fn hijack_first(ctx: &mut RunContext, id: MethodId) {
    if !ctx.is_enabled() {
        return;
    }

    if !ctx.scheduler_resolved() && ctx.resolve_scheduler().is_none() {
        error!("heisen-core: scheduler entry points not resolved, disabling core for this run");
        ctx.disable();
        return;
    }

    let index = ctx.registry.lookup_or_create(id);

    if ctx.registry.get(index).schedules.is_none() {
        let instr_count = ctx.registry.get(index).instr_count;
        let schedules = generator::generate(instr_count);
        if schedules.is_empty() {
            trace!(error = %HijackError::EmptyScheduleSet, instr_count, "heisen-core: method has no schedule, treating as straight line");
        }
        ctx.registry.get_mut(index).schedules = Some(schedules);
    }

    if ctx.registry.get(index).method_index.is_none() {
        let assigned = ctx.next_method_index();
        let record = ctx.registry.get_mut(index);
        record.method_index = Some(assigned);
        record.call_number = 0;
        record.neighbour_count = None;
    }

    let resume_position = ctx.registry.get(index).current_instr_position();
    ctx.execution_flow.push((index, resume_position));

    let record = ctx.registry.get_mut(index);
    let is_driver = record.method_index == Some(MethodIndex(0));

    if record.cur_schedule_iter.is_none() {
        record.cur_yield_count = ctx.outer_yield_count;
        let y = record.cur_yield_count;
        let has_schedule = record.schedules.as_ref().map(|s| s.get(y).map(|l| !l.is_empty()).unwrap_or(false)).unwrap_or(false);
        if has_schedule {
            record.cur_schedule_iter = Some(0);
            record.cur_block = 0;
        }
    } else {
        if let Some(schedule) = record.current_schedule_mut() {
            generator::reset(schedule);
        }
        record.call_number += 1;

        let needed = neighbour_count(ctx, index);
        let record = ctx.registry.get_mut(index);
        if record.call_number >= needed as u32 {
            record.call_number = 0;
            let y = record.cur_yield_count;
            let iter = record.cur_schedule_iter.unwrap_or(0) + 1;
            let level_len = record.schedules.as_ref().map(|s| s[y].len()).unwrap_or(0);

            if iter >= level_len {
                if is_driver {
                    ctx.outer_yield_count += 1;
                    let max_level = ctx.registry.get(index).schedules.as_ref().map(|s| s.len()).unwrap_or(0);
                    if ctx.outer_yield_count > max_level.saturating_sub(1) {
                        if restore_saved_states_if_any(ctx) {
                            debug!("heisen-core: outer schedule space exhausted, resumed from a branch-snapshot frame");
                        } else {
                            if let Some(scheduler) = ctx.resolve_scheduler() {
                                let _ = scheduler.stop();
                            }
                            return;
                        }
                    } else {
                        advance_outer_yield_count(ctx);
                        let record = ctx.registry.get_mut(index);
                        record.cur_schedule_iter = Some(0);
                        record.cur_block = 0;
                    }
                } else {
                    let record = ctx.registry.get_mut(index);
                    record.cur_schedule_iter = Some(0);
                    record.cur_block = 0;
                }
            } else {
                let record = ctx.registry.get_mut(index);
                record.cur_schedule_iter = Some(iter);
                record.cur_block = 0;
            }
            ctx.registry.get_mut(index).neighbour_count = None;
        } else {
            record.cur_block = 0;
        }
    }

    hijack_fast(ctx, id);
}

/// Pops one saved frame for every live method and restores it. Returns
/// `false` (and restores nothing) if no method has a saved frame, in which
/// case the caller should call `scheduler.stop()` instead.
fn restore_saved_states_if_any(ctx: &mut RunContext) -> bool {
    let live = ctx.registry.live_indices();
    let any_saved = live.iter().any(|&i| !ctx.registry.get(i).saved_states.is_empty());
    if !any_saved {
        return false;
    }
    for index in live {
        let record = ctx.registry.get_mut(index);
        if let Some(saved) = record.saved_states.pop() {
            record.restore_snapshot(saved);
        }
    }
    true
}

/// Invoked at every instrumentation point after the first in a method
/// activation.
pub fn hijack_fast(ctx: &mut RunContext, id: MethodId) {
    if !ctx.is_enabled() {
        return;
    }
    let index = ctx.registry.lookup_or_create(id);

    let pending = ctx.registry.get(index).pending_branch;
    if let Some(branch_record) = pending {
        let disable_jump_tracking = ctx
            .registry
            .get(index)
            .current_schedule()
            .and_then(|s| s.get(ctx.registry.get(index).cur_block))
            .map(|b| b.disable_jump_tracking)
            .unwrap_or(false);
        if !disable_jump_tracking {
            branch::handle_branch(ctx, index, branch_record);
            return;
        }
    }

    match step(ctx, index) {
        Step::NoSchedule | Step::Continued => {}
        Step::Yielded => {
            if let Some(scheduler) = ctx.resolve_scheduler() {
                let _ = scheduler.yield_now();
            }
            let suspended_at = ctx.registry.get(index).current_instr_position().saturating_sub(1);
            ctx.execution_flow.push((index, suspended_at));
        }
    }
}

/// JIT hook: records that `offset` is instrumentation point number
/// `record.instr_count` for `id`.
pub fn record_instr_point(ctx: &mut RunContext, id: MethodId, offset: u32) {
    let index = ctx.registry.lookup_or_create(id);
    ctx.registry.record_instr_point(index, offset);
}

/// JIT hook: stores a branch record just before a branch instruction.
pub fn record_branch_site(ctx: &mut RunContext, id: MethodId, target_instr_index: Option<u32>) {
    let index = ctx.registry.lookup_or_create(id);
    ctx.registry.get_mut(index).pending_branch = Some(BranchRecord { target_instr_index });
}

/// JIT hook: clears the branch record just after an untaken branch.
pub fn clear_branch_site(ctx: &mut RunContext, id: MethodId) {
    let index = ctx.registry.lookup_or_create(id);
    ctx.registry.get_mut(index).pending_branch = None;
}
