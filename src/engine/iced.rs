//! x86 analysis engine built on `iced-x86` for decoding and `object` for
//! format recognition.
//!
//! Functions are recovered by recursive descent from registered entries.
//! Conditional branches fork, unconditional and indirect branches end a
//! path, calls fall through. Direct call targets inside the view become new
//! functions when [`EngineConfig::follow_calls`] is set.

use super::{AnalysisEngine, Architecture, RawProfile};
use crate::error::{Result, TraceError};
use crate::segment::SegmentData;
use crate::view::{AnalysisView, BasicBlock, Function, Instruction};
use iced_x86::{
    Decoder, DecoderOptions, FlowControl, FormatMnemonicOptions, Formatter, NasmFormatter, OpKind,
};
use object::elf::{self, FileHeader32, FileHeader64};
use object::read::elf::{FileHeader, ProgramHeader, Sym};
use object::{Endianness, FileKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Turn direct call targets inside the view into functions
    pub follow_calls: bool,
    pub max_functions: usize,
    pub max_function_instructions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            follow_calls: true,
            max_functions: 16_384,
            max_function_instructions: 50_000,
        }
    }
}

#[derive(Debug, Default)]
pub struct IcedEngine {
    config: EngineConfig,
}

impl IcedEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// View addresses `start..end` live at `offset..` in the buffer
#[derive(Debug, Clone)]
struct Region {
    start: u64,
    end: u64,
    offset: usize,
}

#[derive(Debug)]
pub struct IcedView {
    data: SegmentData,
    architecture: Architecture,
    regions: Vec<Region>,
    registered: Vec<u64>,
    pending: VecDeque<u64>,
    functions: BTreeMap<u64, Function>,
    complete: bool,
}

impl IcedView {
    fn new(data: SegmentData, architecture: Architecture, regions: Vec<Region>) -> Self {
        Self {
            data,
            architecture,
            regions,
            registered: Vec::new(),
            pending: VecDeque::new(),
            functions: BTreeMap::new(),
            complete: false,
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Every entry registered so far, in registration order
    pub fn registered_entries(&self) -> &[u64] {
        &self.registered
    }

    pub fn function_at(&self, entry: u64) -> Option<&Function> {
        self.functions.get(&entry)
    }

    fn register(&mut self, address: u64) {
        self.registered.push(address);
        self.pending.push_back(address);
        self.complete = false;
    }

    /// Bytes backing `address` up to the end of its region
    fn bytes_at(&self, address: u64) -> Option<&[u8]> {
        let region = self
            .regions
            .iter()
            .find(|r| address >= r.start && address < r.end)?;
        let start = region.offset + (address - region.start) as usize;
        let end = region.offset + (region.end - region.start) as usize;
        self.data.get(start..end)
    }

    fn contains(&self, address: u64) -> bool {
        self.bytes_at(address).is_some()
    }
}

impl AnalysisView for IcedView {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    fn is_analysis_complete(&self) -> bool {
        self.complete
    }
}

/// What the structured loader learns from an ELF image
struct ElfImage {
    architecture: Architecture,
    regions: Vec<Region>,
    entries: Vec<u64>,
}

impl ElfImage {
    /// Only the ELF and program headers are required. A segment dump rarely
    /// contains the section table, so symbols are read only when it is in
    /// range.
    fn parse(data: &[u8]) -> Option<Self> {
        match FileKind::parse(data).ok()? {
            FileKind::Elf32 => Self::parse_header::<FileHeader32<Endianness>>(data),
            FileKind::Elf64 => Self::parse_header::<FileHeader64<Endianness>>(data),
            _ => None,
        }
    }

    fn parse_header<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> Option<Self> {
        let header = Elf::parse(data).ok()?;
        let endian = header.endian().ok()?;

        let architecture = match header.e_machine(endian) {
            elf::EM_X86_64 => Architecture::X86_64,
            elf::EM_386 => Architecture::X86,
            other => {
                debug!(machine = other, "Unsupported ELF architecture");
                return None;
            }
        };

        let program_headers = match header.program_headers(endian, data) {
            Ok(headers) => headers,
            Err(e) => {
                debug!(error = %e, "Unreadable ELF program headers");
                return None;
            }
        };
        let loads: Vec<(u64, u64)> = program_headers
            .iter()
            .filter(|ph| ph.p_type(endian) == elf::PT_LOAD)
            .map(|ph| {
                let vaddr: u64 = ph.p_vaddr(endian).into();
                let memsz: u64 = ph.p_memsz(endian).into();
                (vaddr, memsz)
            })
            .collect();
        let image_base = loads.iter().map(|&(vaddr, _)| vaddr).min()?;

        // The dump is laid out in memory order from the lowest loadable
        // address; only the part of each segment inside the buffer is usable
        let regions: Vec<Region> = loads
            .iter()
            .filter_map(|&(vaddr, memsz)| {
                let offset = usize::try_from(vaddr - image_base).ok()?;
                let available = data.len().checked_sub(offset)?;
                let size = usize::try_from(memsz).ok()?.min(available);
                let end = vaddr.checked_add(size as u64)?;
                (size > 0).then_some(Region {
                    start: vaddr,
                    end,
                    offset,
                })
            })
            .collect();
        if regions.is_empty() {
            debug!("ELF image has no loadable bytes");
            return None;
        }

        let mut entries = Vec::new();
        let entry: u64 = header.e_entry(endian).into();
        if entry != 0 {
            entries.push(entry);
        }
        match header.sections(endian, data) {
            Ok(sections) => {
                for kind in [elf::SHT_SYMTAB, elf::SHT_DYNSYM] {
                    let Ok(symbols) = sections.symbols(endian, data, kind) else {
                        continue;
                    };
                    entries.extend(
                        symbols
                            .iter()
                            .filter(|s| s.st_type() == elf::STT_FUNC && s.is_definition(endian))
                            .filter_map(|s| {
                                let address: u64 = s.st_value(endian).into();
                                (address != 0).then_some(address)
                            }),
                    );
                }
            }
            Err(e) => debug!(error = %e, "Section table not in dump, symbols unavailable"),
        }

        Some(Self {
            architecture,
            regions,
            entries,
        })
    }
}

/// Instructions decoded between deadline checks within one path
const DEADLINE_STRIDE: usize = 256;

struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    fn check(&self) -> Result<()> {
        if let Some(limit) = self.limit {
            let elapsed = self.start.elapsed();
            if elapsed >= limit {
                return Err(TraceError::AnalysisTimeout { limit, elapsed });
            }
        }
        Ok(())
    }
}

struct Decoded {
    instruction: Instruction,
    ends_block: bool,
}

struct FunctionAnalysis {
    function: Function,
    call_targets: Vec<u64>,
}

impl IcedEngine {
    fn analyze_function(
        &self,
        view: &IcedView,
        entry: u64,
        deadline: &Deadline,
        formatter: &mut NasmFormatter,
    ) -> Result<FunctionAnalysis> {
        let max_length = view.architecture.max_instruction_length();
        let mut decoded: BTreeMap<u64, Decoded> = BTreeMap::new();
        let mut leaders = BTreeSet::from([entry]);
        let mut queue = VecDeque::from([entry]);
        let mut call_targets = Vec::new();

        'paths: while let Some(start) = queue.pop_front() {
            deadline.check()?;

            let mut ip = start;
            while !decoded.contains_key(&ip) {
                if decoded.len() >= self.config.max_function_instructions {
                    warn!(
                        entry = format!("0x{entry:x}"),
                        limit = self.config.max_function_instructions,
                        "Instruction budget exhausted"
                    );
                    break 'paths;
                }
                if !view.contains(ip) {
                    break;
                }
                if decoded.len() % DEADLINE_STRIDE == 0 {
                    deadline.check()?;
                }

                let instruction = match decode_one(view, ip, max_length) {
                    Ok(instruction) => instruction,
                    Err(e) => {
                        trace!(error = %e, "Undecodable bytes");
                        decoded.insert(
                            ip,
                            Decoded {
                                instruction: Instruction::undecodable(),
                                ends_block: true,
                            },
                        );
                        break;
                    }
                };

                let next = instruction.next_ip();
                let target = branch_target(&instruction).filter(|&t| view.contains(t));
                let (ends_block, falls_through) = match instruction.flow_control() {
                    FlowControl::Next | FlowControl::IndirectCall | FlowControl::XbeginXabortXend => {
                        (false, true)
                    }
                    FlowControl::Call => {
                        call_targets.extend(target);
                        (false, true)
                    }
                    FlowControl::ConditionalBranch => {
                        if let Some(target) = target {
                            leaders.insert(target);
                            queue.push_back(target);
                        }
                        leaders.insert(next);
                        (true, true)
                    }
                    FlowControl::UnconditionalBranch => {
                        if let Some(target) = target {
                            leaders.insert(target);
                            queue.push_back(target);
                        }
                        (true, false)
                    }
                    // returns, indirect branches, interrupts
                    _ => (true, false),
                };

                decoded.insert(
                    ip,
                    Decoded {
                        instruction: Instruction::new(
                            mnemonic_text(formatter, &instruction),
                            instruction.len(),
                        ),
                        ends_block,
                    },
                );

                if !falls_through {
                    break;
                }
                ip = next;
            }
        }

        let mut blocks = Vec::new();
        for &leader in &leaders {
            let mut instructions = Vec::new();
            let mut ip = leader;
            while let Some(d) = decoded.get(&ip) {
                instructions.push(d.instruction.clone());
                if d.ends_block {
                    break;
                }
                ip += d.instruction.advance();
                if leaders.contains(&ip) {
                    break;
                }
            }
            if !instructions.is_empty() {
                blocks.push(BasicBlock::new(leader, instructions));
            }
        }

        trace!(
            entry = format!("0x{entry:x}"),
            blocks = blocks.len(),
            instructions = decoded.len(),
            "Function recovered"
        );

        Ok(FunctionAnalysis {
            function: Function::new(entry, blocks),
            call_targets,
        })
    }
}

impl AnalysisEngine for IcedEngine {
    type View = IcedView;

    fn open_structured(&self, data: SegmentData) -> std::result::Result<IcedView, SegmentData> {
        let Some(image) = ElfImage::parse(&data) else {
            return Err(data);
        };

        let mut view = IcedView::new(data, image.architecture, image.regions);
        for entry in image.entries {
            view.register(entry);
        }
        Ok(view)
    }

    fn open_raw(&self, data: SegmentData, profile: RawProfile) -> IcedView {
        let regions = vec![Region {
            start: 0,
            end: data.len() as u64,
            offset: 0,
        }];
        IcedView::new(data, profile.architecture, regions)
    }

    fn register_function_entry(&self, view: &mut IcedView, address: u64) {
        view.register(address);
    }

    fn decode_instruction_at(
        &self,
        view: &IcedView,
        address: u64,
        max_lookahead: usize,
    ) -> Option<Instruction> {
        let instruction = decode_one(view, address, max_lookahead).ok()?;
        Some(Instruction::new(
            mnemonic_text(&mut NasmFormatter::new(), &instruction),
            instruction.len(),
        ))
    }

    fn wait_for_analysis(&self, view: &mut IcedView, timeout: Option<Duration>) -> Result<()> {
        let deadline = Deadline::new(timeout);
        let mut formatter = NasmFormatter::new();

        while let Some(entry) = view.pending.pop_front() {
            if view.functions.contains_key(&entry) {
                continue;
            }
            if view.functions.len() >= self.config.max_functions {
                warn!(
                    limit = self.config.max_functions,
                    dropped = view.pending.len() + 1,
                    "Function budget exhausted"
                );
                view.pending.clear();
                break;
            }
            if !view.contains(entry) {
                debug!(entry = format!("0x{entry:x}"), "Entry outside view, ignored");
                continue;
            }

            let analysis = match self.analyze_function(view, entry, &deadline, &mut formatter) {
                Ok(analysis) => analysis,
                Err(e) => {
                    view.pending.push_front(entry);
                    return Err(e);
                }
            };

            if self.config.follow_calls {
                for target in analysis.call_targets {
                    if !view.functions.contains_key(&target) {
                        view.pending.push_back(target);
                    }
                }
            }
            view.functions.insert(entry, analysis.function);
        }

        view.complete = true;
        debug!(functions = view.functions.len(), "Analysis complete");
        Ok(())
    }
}

fn decode_one(
    view: &IcedView,
    address: u64,
    max_lookahead: usize,
) -> Result<iced_x86::Instruction> {
    let bytes = view
        .bytes_at(address)
        .ok_or(TraceError::DecodeFailure { address })?;
    let window = &bytes[..bytes.len().min(max_lookahead)];

    let mut decoder = Decoder::with_ip(
        view.architecture.bitness(),
        window,
        address,
        DecoderOptions::NONE,
    );
    let instruction = decoder.decode();
    if instruction.is_invalid() {
        return Err(TraceError::DecodeFailure { address });
    }
    Ok(instruction)
}

fn mnemonic_text(formatter: &mut NasmFormatter, instruction: &iced_x86::Instruction) -> String {
    let mut output = String::new();
    formatter.format_mnemonic_options(
        instruction,
        &mut output,
        FormatMnemonicOptions::NO_PREFIXES,
    );
    output
}

fn branch_target(instruction: &iced_x86::Instruction) -> Option<u64> {
    match instruction.op_kind(0) {
        OpKind::NearBranch16 => Some(instruction.near_branch16() as u64),
        OpKind::NearBranch32 => Some(instruction.near_branch32() as u64),
        OpKind::NearBranch64 => Some(instruction.near_branch64()),
        _ => None,
    }
}
