//! Diagnostic graph emission: renders a completed run's execution-flow
//! sequence as a Graphviz DOT document, for human inspection of which
//! interleaving actually ran.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::context::RunContext;
use crate::error::{HijackError, Result};
use crate::registry::MethodIndex;

/// Resolves a method identity and IL offset to a human-readable source
/// location, for node labels in the emitted graph.
pub trait SymbolResolver {
    fn resolve(&self, method_index: MethodIndex, il_offset: u32) -> Option<SourceLocation>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// A resolver that always returns `None`, for runs without symbol
/// information available; node labels fall back to the raw IL offset.
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _method_index: MethodIndex, _il_offset: u32) -> Option<SourceLocation> {
        None
    }
}

fn node_id(method_index: MethodIndex, instr_index: usize) -> String {
    format!("m{}_{}", method_index.0, instr_index)
}

fn node_label(resolver: &dyn SymbolResolver, method_index: MethodIndex, instr_index: usize, offset: u32) -> String {
    match resolver.resolve(method_index, offset) {
        Some(loc) => format!("{}:{}", loc.file, loc.line),
        None => format!("m{} off={offset}", method_index.0),
    }
}

/// Builds the DOT document for the current state of `ctx`. Does not touch
/// the filesystem; see [`emit_to_file`] for that.
pub fn emit(ctx: &RunContext, resolver: &dyn SymbolResolver) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph heisen_interleaving {{");
    let _ = writeln!(out, "  rankdir=TB;");

    for index in ctx.registry.indices() {
        let record = ctx.registry.get(index);
        if record.offsets.is_empty() {
            continue;
        }
        let _ = writeln!(out, "  subgraph cluster_m{} {{", index.0);
        let _ = writeln!(out, "    label=\"method {}\";", index.0);
        for (i, &offset) in record.offsets.iter().enumerate() {
            let label = node_label(resolver, index, i, offset);
            let _ = writeln!(out, "    {} [label=\"{}\"];", node_id(index, i), label);
        }
        let _ = writeln!(out, "  }}");

        if let Some(schedule) = record.current_schedule() {
            let mut pos = 0usize;
            for block in schedule {
                let block_len = block.initial_count as usize;
                for offset_in_block in 0..block_len.saturating_sub(1) {
                    let from = node_id(index, pos + offset_in_block);
                    let to = node_id(index, pos + offset_in_block + 1);
                    let _ = writeln!(out, "  {from} -> {to} [dir=none, weight=10];");
                }
                pos += block_len;
                if pos < record.offsets.len() {
                    let from = node_id(index, pos - 1);
                    let to = node_id(index, pos);
                    let _ = writeln!(out, "  {from} -> {to} [label=\"yield\", weight=1];");
                }
            }
        }
    }

    for pair in ctx.execution_flow.windows(2) {
        let ((from_method, from_position), (to_method, to_position)) = (pair[0], pair[1]);
        if from_method == to_method {
            continue;
        }
        let _ = writeln!(
            out,
            "  {} -> {} [style=dashed, color=blue, label=\"resume\"];",
            node_id(from_method, from_position),
            node_id(to_method, to_position),
        );
    }

    let _ = writeln!(out, "}}");
    out
}

/// Writes the diagnostic graph to `path`, per `Config::graph_output_path`
/// by default.
pub fn emit_to_file(ctx: &RunContext, resolver: &dyn SymbolResolver, path: impl AsRef<Path>) -> Result<()> {
    let document = emit(ctx, resolver);
    fs::write(path.as_ref(), document).map_err(|source| HijackError::GraphIo {
        path: path.as_ref().to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::driver::{hijack_first, record_instr_point};
    use crate::registry::MethodId;

    #[test]
    fn emit_includes_one_cluster_per_instrumented_method() {
        let mut ctx = RunContext::new(Config::default());
        let id = MethodId(1);
        record_instr_point(&mut ctx, id, 0);
        record_instr_point(&mut ctx, id, 4);
        record_instr_point(&mut ctx, id, 8);
        // No scheduler registered: hijack_first disables the core, but the
        // instrumentation offsets recorded beforehand still exist.
        hijack_first(&mut ctx, id);

        let document = emit(&ctx, &NoSymbols);
        assert!(document.contains("cluster_m0"));
        assert!(document.starts_with("digraph heisen_interleaving"));
    }

    #[test]
    fn emit_is_deterministic_for_the_same_state() {
        let mut ctx = RunContext::new(Config::default());
        let id = MethodId(1);
        record_instr_point(&mut ctx, id, 0);
        record_instr_point(&mut ctx, id, 4);
        hijack_first(&mut ctx, id);

        let first = emit(&ctx, &NoSymbols);
        let second = emit(&ctx, &NoSymbols);
        assert_eq!(first, second);
    }

    #[test]
    fn emit_to_file_reports_io_errors_instead_of_panicking() {
        let ctx = RunContext::new(Config::default());
        let result = emit_to_file(&ctx, &NoSymbols, "/nonexistent-dir/does-not-exist/graph.dot");
        assert!(matches!(result, Err(HijackError::GraphIo { .. })));
    }
}
