//! Decoding of the compiler's compressed source-map string and indexing of
//! deployed bytecode so that a program counter can be resolved down to a
//! [`SourceRange`].
//!
//! This is the leaf component of the attribution engine: it knows nothing
//! about contract addresses, call stacks, or ASTs. [`solcov-sources`] wraps
//! many [`SourceMap`]s together with the compiler's source files;
//! [`solcov-trace`] and [`solcov-coverage`] are the callers.

use rustc_hash::FxHashMap;
use solcov_common::{Error, Result, hex};

/// A half-open byte range `[start, start + length)` in one source file.
///
/// `length == 0` means "no attributable source" (§3); `index` identifies
/// which of the compiler's source files the range belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    pub start: usize,
    pub length: usize,
    /// The compiler's source file id. Solidity source maps use `-1` for
    /// synthetic instructions that aren't attributable to any input file
    /// (e.g. compiler-inserted dispatch code); we carry that through
    /// rather than clamping it to an invalid `usize`.
    pub index: i64,
}

impl SourceRange {
    /// Whether this range attributes to a real source byte.
    pub fn is_attributable(&self) -> bool {
        self.length > 0 && self.index >= 0
    }
}

/// pc → instruction index → source range, for one piece of bytecode.
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// `<path>:<contract>` label, used only for error messages.
    fqdn: String,
    /// Normalized (lowercase, no `0x`) hex of the bytecode this map was
    /// built from.
    bytecode: String,
    pc_to_instruction_indices: FxHashMap<usize, usize>,
    instruction_index_to_ranges: Vec<SourceRange>,
}

impl SourceMap {
    /// Parses `source_map` (the compiler's semicolon-separated compressed
    /// form) and walks `bytecode_hex` to build the pc→instruction index.
    pub fn parse(fqdn: impl Into<String>, bytecode_hex: &str, source_map: &str) -> Result<Self> {
        let bytecode = hex::normalize(bytecode_hex);
        let bytes = hex::decode(&bytecode).ok_or_else(|| Error::NoSourceMap { len: bytecode.len() })?;
        let pc_to_instruction_indices = build_pc_to_instruction_indices(&bytes);
        let instruction_index_to_ranges = parse_compressed_source_map(source_map);
        Ok(Self { fqdn: fqdn.into(), bytecode, pc_to_instruction_indices, instruction_index_to_ranges })
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    pub fn bytecode(&self) -> &str {
        &self.bytecode
    }

    /// Resolves a program counter to its instruction index.
    pub fn pc_to_instruction_index(&self, pc: usize) -> Result<usize> {
        self.pc_to_instruction_indices
            .get(&pc)
            .copied()
            .ok_or_else(|| Error::UnknownProgramCounter { pc, fqdn: self.fqdn.clone() })
    }

    /// Resolves an instruction index to its source range.
    pub fn instruction_index_to_range(&self, index: usize) -> Result<SourceRange> {
        self.instruction_index_to_ranges
            .get(index)
            .copied()
            .ok_or_else(|| Error::UnknownInstructionIndex { index, fqdn: self.fqdn.clone() })
    }

    /// Resolves a program counter directly to its source range.
    pub fn pc_to_range(&self, pc: usize) -> Result<SourceRange> {
        let index = self.pc_to_instruction_index(pc)?;
        self.instruction_index_to_range(index)
    }

    /// Number of instructions this source map covers.
    pub fn instruction_count(&self) -> usize {
        self.instruction_index_to_ranges.len()
    }
}

/// Walks decoded bytecode, recording the instruction index at which each
/// byte offset (pc) begins.
///
/// PUSH1..PUSH32 (`0x60..=0x7f`) consume `opcode - 0x60 + 2` bytes
/// (the opcode itself plus its immediate); every other opcode is a single
/// byte. Truncated PUSH data at the end of the code (Open Question 3) is
/// tolerated: the loop condition only ever dereferences a byte it has
/// already bounds-checked, so a push whose immediate runs past the end of
/// the array simply ends the walk one instruction short rather than
/// panicking.
fn build_pc_to_instruction_indices(bytes: &[u8]) -> FxHashMap<usize, usize> {
    let mut table = FxHashMap::default();
    let mut pc = 0usize;
    let mut i = 0usize;
    while pc < bytes.len() {
        table.insert(pc, i);
        let opcode = bytes[pc];
        let len = if (0x60..=0x7f).contains(&opcode) { (opcode - 0x60) as usize + 2 } else { 1 };
        pc += len;
        i += 1;
    }
    table
}

/// One decoded `s:l:f` triple from the compressed source-map state machine.
#[derive(Clone, Copy)]
struct ParseState {
    s: i64,
    l: i64,
    f: i64,
}

/// Decodes the compiler's compressed source-map string into one
/// [`SourceRange`] per semicolon-separated entry.
///
/// Each entry has up to five colon-delimited fields `s:l:f:j:m`; only
/// `s` (start), `l` (length) and `f` (file index) are retained. An empty
/// field, or a field past the end of a short entry, inherits the
/// previous entry's value for that field. State starts at `s:0, l:0, f:0`.
fn parse_compressed_source_map(source_map: &str) -> Vec<SourceRange> {
    let mut state = ParseState { s: 0, l: 0, f: 0 };
    let mut ranges = Vec::new();
    for entry in source_map.split(';') {
        let fields: Vec<&str> = entry.split(':').collect();
        if let Some(s) = fields.first().filter(|f| !f.is_empty()) {
            if let Ok(v) = s.parse() {
                state.s = v;
            }
        }
        if let Some(l) = fields.get(1).filter(|f| !f.is_empty()) {
            if let Ok(v) = l.parse() {
                state.l = v;
            }
        }
        if let Some(f) = fields.get(2).filter(|f| !f.is_empty()) {
            if let Ok(v) = f.parse() {
                state.f = v;
            }
        }
        ranges.push(SourceRange {
            start: state.s.max(0) as usize,
            length: state.l.max(0) as usize,
            index: state.f,
        });
    }
    ranges
}
