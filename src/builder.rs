//! Opening segments as analysed views.

use crate::engine::{AnalysisEngine, RawProfile};
use crate::error::{Result, TraceError};
use crate::mapping::MemoryMapping;
use crate::segment::SegmentData;
use crate::stub_scan::{StubScanConfig, seed_function_entries};
use std::time::Duration;
use tracing::{debug, info};

/// How segments the structured loader rejects are handled
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Both substrings must appear in a file name for the raw fallback
    pub library_marker: String,
    pub shared_object_marker: String,
    pub raw_profile: RawProfile,
    pub stub_scan: StubScanConfig,
    pub analysis_timeout: Option<Duration>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            library_marker: "lib".into(),
            shared_object_marker: "_so".into(),
            raw_profile: RawProfile::LINUX_X86_64,
            stub_scan: StubScanConfig::default(),
            analysis_timeout: None,
        }
    }
}

impl ViewOptions {
    pub fn is_shared_library(&self, name: &str) -> bool {
        name.contains(&self.library_marker) && name.contains(&self.shared_object_marker)
    }
}

/// Open `mapping` through `engine` and wait for its analysis to finish.
///
/// Segments the engine can't classify are retried as raw buffers seeded by the
/// stub scanner, but only when named like a shared library; anything else is
/// `UnrecognizedMapping`.
pub fn open_view<E: AnalysisEngine>(
    engine: &E,
    mapping: &MemoryMapping,
    options: &ViewOptions,
) -> Result<E::View> {
    let name = mapping.name();
    let data = SegmentData::load(&mapping.path)?;

    let mut view = match engine.open_structured(data) {
        Ok(view) => {
            info!(mapping = name, "Opened structured view");
            view
        }
        Err(data) if options.is_shared_library(name) => {
            info!(
                mapping = name,
                profile = %options.raw_profile,
                "Creating functions for raw mapping"
            );
            let mut view = engine.open_raw(data, options.raw_profile);
            seed_function_entries(engine, &mut view, options.raw_profile, &options.stub_scan);
            view
        }
        Err(_) => {
            return Err(TraceError::UnrecognizedMapping {
                name: name.to_string(),
            });
        }
    };

    engine.wait_for_analysis(&mut view, options.analysis_timeout)?;
    debug!(mapping = name, "Analysis finished");
    Ok(view)
}
