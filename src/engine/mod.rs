//! The analysis engine seam.
//!
//! Decoding and control-flow recovery are supplied by an [`AnalysisEngine`]
//! handed to the pipeline at construction. [`iced::IcedEngine`] is the bundled
//! implementation.

use crate::error::Result;
use crate::segment::SegmentData;
use crate::view::{AnalysisView, Instruction};
use std::fmt;
use std::time::Duration;

pub mod iced;

pub use self::iced::{EngineConfig, IcedEngine, IcedView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    X86_64,
}

impl Architecture {
    pub fn bitness(self) -> u32 {
        match self {
            Self::X86 => 32,
            Self::X86_64 => 64,
        }
    }

    pub fn max_instruction_length(self) -> usize {
        15
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    LinuxX86,
    LinuxX86_64,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Self::LinuxX86 => "linux-x86",
            Self::LinuxX86_64 => "linux-x86_64",
        }
    }
}

/// Architecture and calling-convention platform a raw buffer is tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawProfile {
    pub architecture: Architecture,
    pub platform: Platform,
}

impl RawProfile {
    pub const LINUX_X86_64: Self = Self {
        architecture: Architecture::X86_64,
        platform: Platform::LinuxX86_64,
    };
}

impl Default for RawProfile {
    fn default() -> Self {
        Self::LINUX_X86_64
    }
}

impl fmt::Display for RawProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.architecture.name(), self.platform.name())
    }
}

pub trait AnalysisEngine {
    type View: AnalysisView;

    /// Open `data` through a format loader. Unrecognised data is handed back
    /// untouched so the caller can fall back to [`Self::open_raw`].
    fn open_structured(&self, data: SegmentData) -> std::result::Result<Self::View, SegmentData>;

    /// Open `data` as an unstructured buffer. Addresses are buffer offsets.
    fn open_raw(&self, data: SegmentData, profile: RawProfile) -> Self::View;

    /// Queue `address` as a function entry for the next analysis pass.
    fn register_function_entry(&self, view: &mut Self::View, address: u64);

    /// Decode one instruction at `address`, reading at most `max_lookahead`
    /// bytes. `None` when no valid instruction starts there.
    fn decode_instruction_at(
        &self,
        view: &Self::View,
        address: u64,
        max_lookahead: usize,
    ) -> Option<Instruction>;

    /// Run analysis until every registered entry has been processed. Blocks
    /// the caller; gives up with `AnalysisTimeout` once `timeout` expires.
    fn wait_for_analysis(&self, view: &mut Self::View, timeout: Option<Duration>) -> Result<()>;
}
