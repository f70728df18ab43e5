//! The method registry: per-method instrumentation metadata and live
//! enumeration state, keyed by an opaque method identity.

use crate::generator::{Schedule, ScheduleSet};

/// Opaque method identity supplied by the JIT. The core never dereferences
/// it; it is used only as a key for equality and hashing, mirroring a
/// pointer-equal lookup on the managed method handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodId(pub usize);

/// Dense index of a method within one [`RunContext`][crate::context::RunContext].
///
/// Assigned the first time a method takes its first-visit entry, in that
/// order; `method_index == Some(MethodIndex(0))` identifies the driver
/// method that controls outer-loop advancement and termination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodIndex(pub usize);

/// A branch observed by the JIT just before it emits a branch instruction.
#[derive(Clone, Copy, Debug)]
pub struct BranchRecord {
    /// Instrumentation-point index the branch targets, or `None` when the
    /// target falls outside the recorded offset range.
    pub target_instr_index: Option<u32>,
}

/// A frozen copy of a method's enumeration state plus the `schedules` array
/// that was current when the snapshot was taken. Pushed on
/// [`MethodRecord::saved_states`] by the branch-snapshot manager and popped
/// again once the specialized subtree it enabled has been fully walked.
#[derive(Debug)]
pub struct SavedState {
    pub schedules: ScheduleSet,
    pub cur_yield_count: usize,
    pub cur_schedule_iter: Option<usize>,
    pub cur_block: usize,
    pub call_number: u32,
    pub method_index: Option<MethodIndex>,
    pub neighbour_count: Option<u64>,
}

/// Per-method instrumentation metadata and live enumeration state.
#[derive(Debug)]
pub struct MethodRecord {
    pub id: MethodId,
    /// Number of callbacks injected so far == number of recorded offsets.
    pub instr_count: u32,
    /// Instrumentation index -> original IL offset, for diagnostics only.
    pub offsets: Vec<u32>,
    pub schedules: Option<ScheduleSet>,

    pub cur_yield_count: usize,
    pub cur_schedule_iter: Option<usize>,
    pub cur_block: usize,
    pub call_number: u32,
    pub method_index: Option<MethodIndex>,
    pub neighbour_count: Option<u64>,

    pub saved_states: Vec<SavedState>,
    pub pending_branch: Option<BranchRecord>,
}

impl MethodRecord {
    fn new(id: MethodId) -> Self {
        MethodRecord {
            id,
            instr_count: 0,
            offsets: Vec::new(),
            schedules: None,
            cur_yield_count: 0,
            cur_schedule_iter: None,
            cur_block: 0,
            call_number: 0,
            method_index: None,
            neighbour_count: None,
            saved_states: Vec::new(),
            pending_branch: None,
        }
    }

    /// The schedule currently being walked, or `None` before first-visit
    /// has initialized `cur_schedule_iter`.
    pub fn current_schedule(&self) -> Option<&Schedule> {
        let schedules = self.schedules.as_ref()?;
        let level = schedules.get(self.cur_yield_count)?;
        let iter = self.cur_schedule_iter?;
        level.get(iter)
    }

    pub fn current_schedule_mut(&mut self) -> Option<&mut Schedule> {
        let iter = self.cur_schedule_iter?;
        let level = self.schedules.as_mut()?.get_mut(self.cur_yield_count)?;
        level.get_mut(iter)
    }

    /// True once the method has taken at least one first-visit entry this run.
    pub fn is_live(&self) -> bool {
        self.cur_schedule_iter.is_some()
    }

    /// The instrumentation-point index at the start of the block the record
    /// is currently positioned at: the sum of `initial_count` over every
    /// earlier block in the current schedule. Used by the diagnostic
    /// emitter to draw resume/yield edges at the method's actual position
    /// rather than a guessed one.
    pub fn current_instr_position(&self) -> usize {
        let Some(schedule) = self.current_schedule() else {
            return 0;
        };
        schedule.iter().take(self.cur_block.min(schedule.len())).map(|b| b.initial_count as usize).sum()
    }

    /// Freezes the enumeration state (but not `schedules`, which the caller
    /// swaps separately) into a [`SavedState`] and clears it in place.
    pub(crate) fn take_snapshot(&mut self, schedules: ScheduleSet) -> SavedState {
        let saved = SavedState {
            schedules,
            cur_yield_count: self.cur_yield_count,
            cur_schedule_iter: self.cur_schedule_iter,
            cur_block: self.cur_block,
            call_number: self.call_number,
            method_index: self.method_index,
            neighbour_count: self.neighbour_count,
        };
        self.cur_schedule_iter = None;
        self.cur_block = 0;
        self.call_number = 0;
        self.neighbour_count = None;
        saved
    }

    pub(crate) fn restore_snapshot(&mut self, saved: SavedState) {
        self.schedules = Some(saved.schedules);
        self.cur_yield_count = saved.cur_yield_count;
        self.cur_schedule_iter = saved.cur_schedule_iter;
        self.cur_block = saved.cur_block;
        self.call_number = saved.call_number;
        self.method_index = saved.method_index;
        self.neighbour_count = saved.neighbour_count;
    }
}

/// Owns every method record for one run. Identity equality on [`MethodId`]
/// resolves to a dense [`MethodIndex`] so the rest of the core never needs
/// to carry borrowed references into the registry around.
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<MethodRecord>,
    by_id: std::collections::HashMap<MethodId, MethodIndex>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn lookup_or_create(&mut self, id: MethodId) -> MethodIndex {
        if let Some(&index) = self.by_id.get(&id) {
            return index;
        }
        let index = MethodIndex(self.records.len());
        self.records.push(MethodRecord::new(id));
        self.by_id.insert(id, index);
        index
    }

    pub fn get(&self, index: MethodIndex) -> &MethodRecord {
        &self.records[index.0]
    }

    pub fn get_mut(&mut self, index: MethodIndex) -> &mut MethodRecord {
        &mut self.records[index.0]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends `offset` to the method's recorded IL offsets and increments
    /// its instrumentation-point count.
    pub fn record_instr_point(&mut self, index: MethodIndex, offset: u32) {
        let record = self.get_mut(index);
        record.offsets.push(offset);
        record.instr_count += 1;
    }

    pub fn indices(&self) -> impl Iterator<Item = MethodIndex> {
        (0..self.records.len()).map(MethodIndex)
    }

    /// Indices of every method that has taken at least one first-visit
    /// entry this run, in ascending `MethodIndex` order.
    pub fn live_indices(&self) -> Vec<MethodIndex> {
        self.indices().filter(|&i| self.get(i).is_live()).collect()
    }

    /// Resets every record's live enumeration state and saved-state stack,
    /// and forgets the method-identity mapping, ready for the next test.
    pub fn reset(&mut self) {
        self.records.clear();
        self.by_id.clear();
    }
}
