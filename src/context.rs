//! The single owner of every piece of process-wide mutable state for one
//! run: the method registry, the execution-flow sequence, the outer
//! yield-count `Y`, the `next_method_index` counter, the resolved
//! scheduler, and the run's configuration.
//!
//! Packaging these as fields of one struct (rather than file-scope
//! statics) means a process can run more than one test sequentially
//! without leaking state between them, and tests can construct
//! independent contexts instead of sharing hidden global state.

use crate::config::Config;
use crate::registry::{MethodIndex, Registry};
use crate::scheduler::{Scheduler, SchedulerName, SchedulerRegistry};

/// Owns all core state for one run. Deliberately `!Sync`: the single
/// logical executor assumption (see the crate's concurrency model docs)
/// means wrapping this in a mutex would paper over a violation rather than
/// prevent one.
pub struct RunContext {
    pub config: Config,
    pub registry: Registry,
    /// Append-only record of which method took each first-visit entry or
    /// resumed from a yield, paired with the instrumentation-point index it
    /// was at when that happened. Authoritative for the diagnostic emitter;
    /// cleared on `stop`.
    pub execution_flow: Vec<(MethodIndex, usize)>,
    /// The outer yield-count the driver method is currently exploring.
    pub outer_yield_count: usize,
    next_method_index: usize,
    schedulers: SchedulerRegistry,
    scheduler_name: Option<SchedulerName>,
    enabled: bool,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        let enabled = config.enabled;
        RunContext {
            config,
            registry: Registry::new(),
            execution_flow: Vec::new(),
            outer_yield_count: 0,
            next_method_index: 0,
            schedulers: SchedulerRegistry::new(),
            scheduler_name: None,
            enabled,
        }
    }

    pub fn register_scheduler(&mut self, name: SchedulerName, factory: impl Fn() -> Box<dyn Scheduler> + 'static) {
        self.schedulers.register(name, factory);
    }

    /// Selects which registered scheduler the driver resolves on the run's
    /// first first-visit entry. Must be called before the run starts.
    pub fn select_scheduler(&mut self, name: SchedulerName) {
        self.scheduler_name = Some(name);
    }

    pub(crate) fn resolve_scheduler(&mut self) -> Option<&mut (dyn Scheduler + 'static)> {
        let name = self.scheduler_name.as_ref()?;
        self.schedulers.resolve(name)
    }

    pub fn scheduler_resolved(&self) -> bool {
        self.schedulers.is_resolved()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn next_method_index(&mut self) -> MethodIndex {
        let index = MethodIndex(self.next_method_index);
        self.next_method_index += 1;
        index
    }

    /// Resets all per-run state for the next test. `Config` and registered
    /// scheduler factories survive; resolution and the `enabled` flag do
    /// not, matching the external `Config` layer governing them again on
    /// the next run.
    pub fn stop(&mut self) {
        self.registry.reset();
        self.execution_flow.clear();
        self.outer_yield_count = 0;
        self.next_method_index = 0;
        self.schedulers.clear_resolution();
        self.enabled = self.config.enabled;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scheduler::test_support::RecordingScheduler;

    #[test]
    fn next_method_index_increments_from_zero() {
        let mut ctx = RunContext::new(Config::default());
        assert_eq!(ctx.next_method_index(), MethodIndex(0));
        assert_eq!(ctx.next_method_index(), MethodIndex(1));
    }

    #[test]
    fn stop_resets_enumeration_state_but_keeps_registered_schedulers() {
        let mut ctx = RunContext::new(Config::default());
        let name = SchedulerName::new("Heisen", "Heisen.Scheduler", "Yield");
        ctx.register_scheduler(name.clone(), || Box::new(RecordingScheduler::default()));
        ctx.select_scheduler(name);
        ctx.next_method_index();
        ctx.outer_yield_count = 3;
        assert!(ctx.resolve_scheduler().is_some());

        ctx.stop();

        assert_eq!(ctx.next_method_index(), MethodIndex(0));
        assert_eq!(ctx.outer_yield_count, 0);
        assert!(!ctx.scheduler_resolved());
        // The factory is still registered even though resolution was cleared.
        assert!(ctx.resolve_scheduler().is_some());
    }
}
