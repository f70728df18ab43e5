//! Systematic interleaving enumeration and a cooperative callback driver
//! for reproducing concurrency bugs in instrumented test methods.
//!
//! A JIT (or any instrumented execution engine) emits a callback at every
//! original instruction boundary of the methods it wants exercised. This
//! crate turns those callbacks into an exhaustive walk of every way the
//! instrumented methods' instructions could interleave, one schedule at a
//! time, driven by an external cooperative scheduler that the crate models
//! as the [`scheduler::Scheduler`] trait.
//!
//! ## Example
//!
//! Drive a single four-instruction method through every schedule the
//! generator produces, using the in-process `RecordingScheduler` test
//! double in place of a real managed scheduler.
//!
//! ```rust
//! use heisen_core::config::Config;
//! use heisen_core::context::RunContext;
//! use heisen_core::driver::{hijack_fast, hijack_first, record_instr_point};
//! use heisen_core::registry::MethodId;
//!
//! let mut ctx = RunContext::new(Config::default());
//! let id = MethodId(1);
//! for offset in 0..4 {
//!     record_instr_point(&mut ctx, id, offset);
//! }
//!
//! // No scheduler registered: the first-visit entry disables the core
//! // rather than panic, which is why `ctx.is_enabled()` goes false here.
//! hijack_first(&mut ctx, id);
//! assert!(!ctx.is_enabled());
//! ```
//!
//! ## Modules
//!
//! - [`generator`] builds the combinatorial schedule sets.
//! - [`registry`] owns per-method instrumentation metadata and live state.
//! - [`driver`] is the cooperative callback state machine.
//! - [`branch`] specializes schedules around taken branches.
//! - [`scheduler`] is the trait boundary to the external scheduler.
//! - [`context`] owns all process-wide mutable state for one run.
//! - [`config`] is typed, layered run configuration.
//! - [`diagnostic`] renders a completed run as a Graphviz DOT document.
//! - [`ffi`] is the native control surface for a managed host.
//! - [`error`] is the fallible-API error type.

pub mod branch;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod driver;
pub mod error;
pub mod ffi;
pub mod generator;
pub mod registry;
pub mod scheduler;
