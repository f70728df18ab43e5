use thiserror::Error;

/// Failure kinds surfaced by the public, fallible parts of the core.
///
/// The hot-path callbacks (`hijack_first`, `hijack_fast`, `branch`) never
/// return this type to the JIT; they degrade in place per the policy table
/// documented on each variant and log through `tracing` instead.
#[derive(Debug, Error)]
pub enum HijackError {
    /// One or more of `Yield`/`Stop`/`ForceRestart` could not be resolved.
    ///
    /// Policy: logged once, then the core disables itself for the rest of
    /// the run; every subsequent callback becomes a no-op.
    #[error("scheduler entry point `{0}` was not registered")]
    MissingScheduler(&'static str),

    /// A public API was called while the core is configured as disabled.
    #[error("heisen-core is disabled (Config::enabled is false)")]
    NotEnabled,

    /// The configuration source could not be parsed.
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O failure while writing the diagnostic graph.
    #[error("failed to write diagnostic graph to {path}: {source}")]
    GraphIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A branch's recorded target index fell outside the method's
    /// instrumented range.
    ///
    /// Policy: never surfaced to the JIT. Constructed only so the
    /// branch-snapshot manager has something to log at `debug` level before
    /// clearing `pending_branch` and continuing.
    #[error("branch target instruction index was not recorded for this method")]
    UnknownBranchTarget,

    /// A method's schedule set is empty (`instr_count < 2`).
    ///
    /// Policy: never surfaced to the JIT. The method is simply treated as a
    /// single straight-line block that never yields.
    #[error("method has fewer than two instrumentation points, no schedule to enumerate")]
    EmptyScheduleSet,
}

pub type Result<T> = std::result::Result<T, HijackError>;
