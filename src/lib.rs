//! Tracemark: trace point extraction from process memory dumps
//!
//! Given a directory of memory segment dumps, this library recovers functions
//! and basic blocks from every executable segment and writes candidate program
//! counters (block entries and call return addresses) to the workspace's
//! `trace_list` file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub mod builder;
pub mod engine;
pub mod error;
pub mod extract;
pub mod logging;
pub mod mapping;
pub mod progress;
pub mod segment;
pub mod sink;
pub mod stub_scan;
pub mod view;

pub use anyhow;

pub use builder::ViewOptions;
pub use engine::{AnalysisEngine, EngineConfig, IcedEngine, RawProfile};
pub use error::TraceError;
pub use extract::TracePoint;
pub use mapping::MemoryMapping;
pub use progress::{IndicatifProgressBar, NoOpProgressReporter, ProgressReporter};
pub use sink::TraceLog;
pub use stub_scan::StubScanConfig;

/// Options for a trace run
pub struct LocatorOptions<P: ProgressReporter = NoOpProgressReporter> {
    pub view: ViewOptions,
    pub progress_reporter: P,
}

impl Default for LocatorOptions<NoOpProgressReporter> {
    fn default() -> Self {
        Self {
            view: ViewOptions::default(),
            progress_reporter: NoOpProgressReporter,
        }
    }
}

impl<P: ProgressReporter> LocatorOptions<P> {
    pub fn with_progress_reporter<P2: ProgressReporter>(self, reporter: P2) -> LocatorOptions<P2> {
        LocatorOptions {
            view: self.view,
            progress_reporter: reporter,
        }
    }

    pub fn with_analysis_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.view.analysis_timeout = timeout;
        self
    }

    pub fn with_stub_scan(mut self, stub_scan: StubScanConfig) -> Self {
        self.view.stub_scan = stub_scan;
        self
    }
}

/// Outcome of [`TraceLocator::run`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mappings: usize,
    pub analyzed: usize,
    pub skipped: usize,
    pub trace_points: usize,
    pub output: PathBuf,
}

/// Traces gathered by [`TraceLocator::locate`] before they are written
#[derive(Debug, Default)]
pub struct LocateResult {
    pub log: TraceLog,
    pub mappings: usize,
    pub analyzed: usize,
    pub skipped: usize,
}

/// Drives the catalog, view builder, extractor and sink over one memory
/// directory using the supplied engine.
pub struct TraceLocator<'e, E: AnalysisEngine, P: ProgressReporter = NoOpProgressReporter> {
    engine: &'e E,
    options: LocatorOptions<P>,
}

impl<'e, E: AnalysisEngine> TraceLocator<'e, E> {
    pub fn with_defaults(engine: &'e E) -> Self {
        Self::new(engine, LocatorOptions::default())
    }
}

impl<'e, E: AnalysisEngine, P: ProgressReporter> TraceLocator<'e, E, P> {
    pub fn new(engine: &'e E, options: LocatorOptions<P>) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &LocatorOptions<P> {
        &self.options
    }

    /// Open, analyse and extract one mapping. The view is dropped before
    /// returning.
    pub fn process_mapping(&self, mapping: &MemoryMapping) -> error::Result<Vec<TracePoint>> {
        let view = builder::open_view(self.engine, mapping, &self.options.view)?;
        Ok(extract::extract_traces(&view, mapping))
    }

    /// Collect trace points for every executable mapping in `memory_dir`.
    ///
    /// Failures of individual mappings are logged and skipped; only an
    /// unreadable directory is an error.
    pub fn locate(&self, memory_dir: &Path) -> Result<LocateResult> {
        let mappings = mapping::list_executable_mappings(memory_dir).with_context(|| {
            format!("Failed to read memory directory {}", memory_dir.display())
        })?;

        let reporter = &self.options.progress_reporter;
        reporter.initialize(mappings.len() as u64);

        let mut result = LocateResult {
            mappings: mappings.len(),
            ..Default::default()
        };
        for mapping in &mappings {
            match self.process_mapping(mapping) {
                Ok(traces) => {
                    info!(mapping = mapping.name(), traces = traces.len(), "Mapping processed");
                    result.log.extend(traces);
                    result.analyzed += 1;
                }
                Err(e) => {
                    warn!(mapping = mapping.name(), error = %e, "Skipping mapping");
                    result.skipped += 1;
                }
            }
            reporter.mapping_done(mapping.name());
        }
        reporter.finish();

        Ok(result)
    }

    /// Locate traces in `memory_dir` and append them to the workspace
    /// `trace_list`.
    pub fn run(&self, memory_dir: &Path) -> Result<RunSummary> {
        let root = sink::workspace_root(memory_dir)?;
        info!(workspace = %root.display(), "Workspace");

        let located = self.locate(memory_dir)?;
        let output = located
            .log
            .append_to(&root)
            .with_context(|| format!("Failed to write trace list in {}", root.display()))?;

        Ok(RunSummary {
            mappings: located.mappings,
            analyzed: located.analyzed,
            skipped: located.skipped,
            trace_points: located.log.len(),
            output,
        })
    }
}
