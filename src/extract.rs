//! Trace point extraction from an analysed view.

use crate::mapping::MemoryMapping;
use crate::view::{AnalysisView, BasicBlock};
use std::fmt;
use tracing::{trace, warn};

/// A candidate program counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TracePoint(pub u64);

impl TracePoint {
    pub fn address(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TracePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Amount to add to addresses of a block starting at `start`: zero when the
/// engine already reports it above `base`, otherwise `base`.
fn rebase_for(start: u64, base: u64) -> u64 {
    if start > base { 0 } else { base }
}

/// Absolute form of an engine-reported address in a segment loaded at `base`.
pub fn normalize_address(address: u64, base: u64) -> u64 {
    address.wrapping_add(rebase_for(address, base))
}

/// Trace points for one block: its start, then the return address of every
/// call inside it.
///
/// Call returns are rebased with the same decision as the block start so a
/// relative block never has some of its addresses treated as absolute.
pub fn block_traces(block: &BasicBlock, base: u64) -> impl Iterator<Item = TracePoint> + '_ {
    let rebase = rebase_for(block.start, base);
    let mut pc = block.start;

    let returns = block.instructions().filter_map(move |ins| {
        pc = pc.wrapping_add(ins.advance());
        ins.is_call().then(|| TracePoint(pc.wrapping_add(rebase)))
    });

    std::iter::once(TracePoint(block.start.wrapping_add(rebase))).chain(returns)
}

/// Walk every block of every function in `view` and collect its trace points.
pub fn extract_traces<V: AnalysisView>(view: &V, mapping: &MemoryMapping) -> Vec<TracePoint> {
    if !view.is_analysis_complete() {
        warn!(mapping = mapping.name(), "Extracting from a view with pending analysis");
    }

    let base = mapping.base_address;
    let traces: Vec<TracePoint> = view
        .functions()
        .flat_map(|function| function.basic_blocks())
        .flat_map(|block| block_traces(block, base))
        .collect();

    trace!(mapping = mapping.name(), count = traces.len(), "Traces extracted");
    traces
}
