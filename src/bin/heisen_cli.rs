//! A small command-line front end that drives the core against a synthetic
//! method set, for manual experimentation without a real JIT.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use heisen_core::config::Config;
use heisen_core::context::RunContext;
use heisen_core::diagnostic::{self, NoSymbols};
use heisen_core::driver::{hijack_fast, hijack_first, record_instr_point};
use heisen_core::registry::MethodId;
use heisen_core::scheduler::test_support::SharedRecordingScheduler;
use heisen_core::scheduler::SchedulerName;

/// Drive the interleaving generator and cooperative driver against a
/// synthetic chain of methods, printing the execution-flow trace.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Instrumentation-point counts for each synthetic method, in
    /// first-visit order. The first is treated as the driver method.
    #[arg(long, value_delimiter = ',', default_value = "3")]
    instr_counts: Vec<u32>,

    /// Write the resulting diagnostic graph to this path instead of the
    /// configured default.
    #[arg(long)]
    graph_output: Option<std::path::PathBuf>,

    /// Cap on activations, as a safety net against a misconfigured run.
    #[arg(long, default_value_t = 100_000)]
    max_activations: u32,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let mut config = Config::default();
    if let Some(path) = &args.graph_output {
        config.graph_output_path = path.clone();
    }
    config.total_methods = args.instr_counts.len();

    let mut ctx = RunContext::new(config);
    let scheduler = SharedRecordingScheduler::default();
    let handle = scheduler.clone();
    let name = SchedulerName::new("Heisen", "Heisen.Scheduler", "Yield");
    ctx.register_scheduler(name.clone(), move || Box::new(handle.clone()));
    ctx.select_scheduler(name);

    let ids: Vec<MethodId> = (0..args.instr_counts.len() as usize).map(MethodId).collect();

    // The JIT records a method's instrumentation points once, at compile
    // time, not on every activation.
    for (&id, &instr_count) in ids.iter().zip(args.instr_counts.iter()) {
        for offset in 0..instr_count {
            record_instr_point(&mut ctx, id, offset * 4);
        }
    }

    let mut activations = 0u32;
    loop {
        for (&id, &instr_count) in ids.iter().zip(args.instr_counts.iter()) {
            hijack_first(&mut ctx, id);
            for _ in 1..instr_count {
                hijack_fast(&mut ctx, id);
            }
        }
        activations += 1;
        if scheduler.0.borrow().stop_count() > 0 || !ctx.is_enabled() || activations >= args.max_activations {
            break;
        }
    }

    println!("activations: {activations}");
    println!("yields: {}", scheduler.0.borrow().yield_count());
    println!("stops: {}", scheduler.0.borrow().stop_count());
    println!("execution-flow length: {}", ctx.execution_flow.len());

    let document = diagnostic::emit(&ctx, &NoSymbols);
    if let Some(path) = args.graph_output {
        if let Err(err) = std::fs::write(&path, &document) {
            eprintln!("failed to write graph to {}: {err}", path.display());
        }
    } else {
        println!("{document}");
    }
}
