//! Recovered control-flow structure of one segment.
//!
//! Engines fill these in; the pipeline only reads them back through
//! [`AnalysisView`].

/// An analyzable representation of one segment's bytes.
pub trait AnalysisView {
    /// Backing bytes of the segment
    fn data(&self) -> &[u8];

    /// Recovered functions, in engine order. Each call starts a fresh walk.
    fn functions(&self) -> impl Iterator<Item = &Function>;

    /// Whether the engine finished analysing every registered entry
    fn is_analysis_complete(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub entry: u64,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(entry: u64, blocks: Vec<BasicBlock>) -> Self {
        Self { entry, blocks }
    }

    pub fn basic_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: u64,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(start: u64, instructions: Vec<Instruction>) -> Self {
        Self {
            start,
            instructions,
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    /// Address one past the last instruction
    pub fn end(&self) -> u64 {
        self.instructions
            .iter()
            .fold(self.start, |pc, ins| pc + ins.advance())
    }
}

/// Mnemonic reported for bytes the decoder rejected
pub const UNDECODABLE_MNEMONIC: &str = "(bad)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    mnemonic: String,
    size: usize,
}

impl Instruction {
    pub fn new(mnemonic: impl Into<String>, size: usize) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            size,
        }
    }

    /// Placeholder for bytes that don't decode. It has size 0.
    pub fn undecodable() -> Self {
        Self::new(UNDECODABLE_MNEMONIC, 0)
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_decoded(&self) -> bool {
        self.size != 0
    }

    pub fn is_call(&self) -> bool {
        matches!(self.mnemonic.as_str(), "call" | "callq")
    }

    /// Bytes to step over: the instruction size, or one byte for an
    /// undecodable instruction so walks always make progress.
    pub fn advance(&self) -> u64 {
        if self.is_decoded() { self.size as u64 } else { 1 }
    }
}
