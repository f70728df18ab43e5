//! The scheduler boundary.
//!
//! In the system this core is embedded in, `Yield`, `Stop`, and
//! `ForceRestart` are managed methods resolved once by
//! `(assembly_name, type_name, method_name)` and invoked with no
//! arguments. This crate models that boundary as a trait so the driver and
//! branch-snapshot manager can be exercised without a real managed runtime.

use std::collections::HashMap;
use std::io;

/// The three entry points the driver and branch-snapshot manager call out
/// to. `yield_now` is blocking from the caller's point of view: the
/// scheduler transfers control and only returns when the caller is
/// resumed. `stop` is not expected to return to the caller in the current
/// run. `force_restart` is expected to return once the scheduler has
/// replayed the test to completion of the newly specialized schedule tree.
pub trait Scheduler {
    fn yield_now(&mut self) -> io::Result<()>;
    fn stop(&mut self) -> io::Result<()>;
    fn force_restart(&mut self) -> io::Result<()>;
}

/// The three dotted names used to resolve one scheduler implementation:
/// `(assembly_name, type_name, method_name)` on the managed side, or an
/// arbitrary registration key for a native one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SchedulerName {
    pub assembly_name: String,
    pub type_name: String,
    pub method_name: String,
}

impl SchedulerName {
    pub fn new(assembly_name: impl Into<String>, type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        SchedulerName {
            assembly_name: assembly_name.into(),
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Scheduler>>;

/// A process-wide registry of named scheduler factories, resolved lazily
/// and cached the first time the driver needs one.
///
/// This is the Rust stand-in for the managed-method lookup the original
/// system performs: instead of searching a loaded assembly for a type and
/// method by name, a factory is registered ahead of time under the same
/// three-part name and resolved (and cached) on first use.
#[derive(Default)]
pub struct SchedulerRegistry {
    factories: HashMap<SchedulerName, Factory>,
    resolved: Option<Box<dyn Scheduler>>,
}

impl std::fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRegistry")
            .field("registered", &self.factories.len())
            .field("resolved", &self.resolved.is_some())
            .finish()
    }
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        SchedulerRegistry::default()
    }

    pub fn register(&mut self, name: SchedulerName, factory: impl Fn() -> Box<dyn Scheduler> + 'static) {
        self.factories.insert(name, Box::new(factory));
    }

    /// Resolves and caches the scheduler implementation for `name`.
    ///
    /// Returns `None` exactly when nothing was registered under `name` —
    /// the caller (the driver's first-visit entry) treats that as the
    /// `missing-scheduler` error kind and disables the core.
    pub fn resolve(&mut self, name: &SchedulerName) -> Option<&mut (dyn Scheduler + 'static)> {
        if self.resolved.is_none() {
            let factory = self.factories.get(name)?;
            self.resolved = Some(factory());
        }
        self.resolved.as_deref_mut()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn clear_resolution(&mut self) {
        self.resolved = None;
    }
}

/// A synchronous [`Scheduler`] double used by unit and integration tests —
/// and by the `heisen-cli` demo binary — to drive the core without a real
/// managed runtime.
pub mod test_support {

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SchedulerCall {
        Yield,
        Stop,
        ForceRestart,
    }

    /// Records every call it receives, so scenario tests can assert on the
    /// call trace the driver produced against the execution-flow sequence
    /// recorded separately on the `RunContext`.
    #[derive(Debug, Default)]
    pub struct RecordingScheduler {
        pub calls: Vec<SchedulerCall>,
    }

    impl RecordingScheduler {
        pub fn stop_count(&self) -> usize {
            self.calls.iter().filter(|c| **c == SchedulerCall::Stop).count()
        }

        pub fn yield_count(&self) -> usize {
            self.calls.iter().filter(|c| **c == SchedulerCall::Yield).count()
        }
    }

    impl Scheduler for RecordingScheduler {
        fn yield_now(&mut self) -> io::Result<()> {
            self.calls.push(SchedulerCall::Yield);
            Ok(())
        }

        fn stop(&mut self) -> io::Result<()> {
            self.calls.push(SchedulerCall::Stop);
            Ok(())
        }

        fn force_restart(&mut self) -> io::Result<()> {
            self.calls.push(SchedulerCall::ForceRestart);
            Ok(())
        }
    }

    /// A handle to a [`RecordingScheduler`] that can be registered as a
    /// factory (cloned into the closure) while the test keeps its own
    /// handle to inspect calls after the run.
    #[derive(Debug, Clone, Default)]
    pub struct SharedRecordingScheduler(pub std::rc::Rc<std::cell::RefCell<RecordingScheduler>>);

    impl Scheduler for SharedRecordingScheduler {
        fn yield_now(&mut self) -> io::Result<()> {
            self.0.borrow_mut().yield_now()
        }

        fn stop(&mut self) -> io::Result<()> {
            self.0.borrow_mut().stop()
        }

        fn force_restart(&mut self) -> io::Result<()> {
            self.0.borrow_mut().force_restart()
        }
    }
}
