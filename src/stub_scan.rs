//! Function-entry seeding for raw segments with no symbol information.
//!
//! PLT stubs in stripped shared objects sit on a fixed stride and open with an
//! indirect `jmp [rip+disp32]` (`ff 25`). Finding a few of them gives the
//! engine real entry points to grow its own analysis from.

use crate::engine::{AnalysisEngine, RawProfile};
use crate::view::AnalysisView;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubScanConfig {
    /// Stride between candidate offsets
    pub alignment: usize,
    /// Leading bytes of a stub
    pub opcode: [u8; 2],
    /// Distance from a matched stub to the second entry registered with it
    pub sibling_offset: u64,
}

impl Default for StubScanConfig {
    fn default() -> Self {
        Self {
            alignment: 16,
            opcode: [0xff, 0x25],
            sibling_offset: 16,
        }
    }
}

/// Offsets in `bytes` where the stub opcode starts on an aligned boundary.
pub fn stub_candidates(bytes: &[u8], config: &StubScanConfig) -> Vec<usize> {
    let alignment = config.alignment.max(1);
    (0..bytes.len())
        .step_by(alignment)
        .filter(|&offset| bytes.get(offset..offset + 2) == Some(&config.opcode[..]))
        .collect()
}

/// Register every validated stub (and its sibling) as a function entry.
/// Returns the number of entries registered.
pub fn seed_function_entries<E: AnalysisEngine>(
    engine: &E,
    view: &mut E::View,
    profile: RawProfile,
    config: &StubScanConfig,
) -> usize {
    let max_lookahead = profile.architecture.max_instruction_length();
    let candidates = stub_candidates(view.data(), config);

    let mut added = 0;
    for offset in candidates {
        let address = offset as u64;
        if engine
            .decode_instruction_at(view, address, max_lookahead)
            .is_none()
        {
            trace!(offset = format!("0x{offset:x}"), "Stub opcode without a valid instruction");
            continue;
        }

        engine.register_function_entry(view, address);
        engine.register_function_entry(view, address + config.sibling_offset);
        added += 2;
    }

    debug!(entries = added, "Seeded stub entries");
    added
}
