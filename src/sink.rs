//! The workspace `trace_list` file.
//!
//! Each run appends one batch: a header line followed by one hex address per
//! line. Earlier batches are never rewritten.

use crate::error::{Result, TraceError};
use crate::extract::TracePoint;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const TRACE_LIST_FILE: &str = "trace_list";
pub const TRACE_HEADER: &str = "======TRACE=ADDRESSES======";

/// Workspace root for a memory directory laid out as
/// `<workspace>/<subdir>/<memory-dir>`: two levels above `memory_dir`.
pub fn workspace_root(memory_dir: &Path) -> Result<PathBuf> {
    let root = memory_dir
        .ancestors()
        .nth(2)
        .ok_or_else(|| TraceError::NoWorkspaceRoot {
            path: memory_dir.to_path_buf(),
        })?;

    if root.as_os_str().is_empty() {
        Ok(PathBuf::from("."))
    } else {
        Ok(root.to_path_buf())
    }
}

/// Append a header and `points` to `<workspace_root>/trace_list`, creating it
/// if needed. Returns the path written.
pub fn append_traces(workspace_root: &Path, points: &[TracePoint]) -> Result<PathBuf> {
    let path = workspace_root.join(TRACE_LIST_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{TRACE_HEADER}")?;
    for point in points {
        writeln!(writer, "{point}")?;
    }
    writer.flush()?;

    info!(path = %path.display(), count = points.len(), "Trace points written");
    Ok(path)
}

/// Trace points gathered across a run, in discovery order
#[derive(Debug, Default, Clone)]
pub struct TraceLog {
    points: Vec<TracePoint>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, points: impl IntoIterator<Item = TracePoint>) {
        self.points.extend(points);
    }

    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn append_to(&self, workspace_root: &Path) -> Result<PathBuf> {
        append_traces(workspace_root, &self.points)
    }
}
