//! Builds per-source [`SyntaxTable`]s from compiler ASTs and turns tagged
//! execution logs into coverage [`Report`]s, with the per-opcode
//! deduplication rules that keep a single wide opcode from over-counting
//! lines or branches while still crediting every statement it touches.

mod ast;
pub mod report;

use rayon::prelude::*;
use solcov_common::{Error, Result};
use solcov_sources::Sources;
use solcov_trace::{Tag, TaggedLog};
use std::collections::{BTreeMap, BTreeSet};

pub use report::{filtered_report, PathReport, Report};

/// A 1-based line, 0-based column position, as `offsetToPosition` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

/// A feature attached to one source byte. Line features are installed at
/// every byte; the others only at the byte where the owning AST node
/// begins.
#[derive(Debug, Clone, Copy)]
pub enum Feature {
    Line(usize),
    Branch { branch_id: u32, alt_index: u32 },
    Function(u32),
    Statement(u32),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchDescriptor {
    pub line: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub line: usize,
    pub loc: Location,
    pub skip: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatementDescriptor {
    pub start: Position,
    pub end: Position,
    pub skip: bool,
}

/// One source file's byte-indexed feature table plus its descriptor maps.
#[derive(Debug, Clone)]
pub struct SyntaxTable {
    features: Vec<Vec<Feature>>,
    positions: Vec<Position>,
    pub branch_map: BTreeMap<u32, BranchDescriptor>,
    pub fn_map: BTreeMap<u32, FunctionDescriptor>,
    pub statement_map: BTreeMap<u32, StatementDescriptor>,
    /// Lines with at least one branch, non-skip function, or non-skip
    /// statement — used by [`filtered_report`].
    significant_lines: BTreeSet<usize>,
}

impl SyntaxTable {
    pub fn build(content: &str, source_ast: &serde_json::Value) -> Self {
        ast::build(content, source_ast)
    }

    pub fn features(&self, byte: usize) -> Option<&[Feature]> {
        self.features.get(byte).map(Vec::as_slice)
    }

    pub fn is_significant_line(&self, line: usize) -> bool {
        self.significant_lines.contains(&line)
    }

    /// The highest 1-based line number this source contains, or 0 if empty.
    pub fn line_count(&self) -> usize {
        self.positions.last().map(|p| p.line).unwrap_or(0)
    }
}

/// Owns the precomputed [`SyntaxTable`] for every source `Sources` knows
/// about and turns tagged opcode logs into hit counts.
pub struct Coverage {
    syntax_tables: BTreeMap<String, SyntaxTable>,
}

impl Coverage {
    /// Builds a [`SyntaxTable`] for every known source, in parallel — each
    /// source's table is independent of every other's.
    pub fn cover(sources: &Sources) -> Self {
        let syntax_tables = sources
            .sources()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(path, source)| (path.to_string(), SyntaxTable::build(&source.content, &source.ast)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();
        Self { syntax_tables }
    }

    pub fn syntax_table(&self, path: &str) -> Option<&SyntaxTable> {
        self.syntax_tables.get(path)
    }

    /// Turns `tagged_logs` into a [`Report`], accumulating into `into` if
    /// given or starting from a fresh, zero-initialized report otherwise.
    ///
    /// Bytecode/source-map resolution (and any fuzzy-match caching it
    /// triggers) mutates `sources`, so it is taken as `&mut`.
    pub fn report(&self, sources: &mut Sources, tagged_logs: &[TaggedLog], into: Option<Report>) -> Result<Report> {
        let mut report = into.unwrap_or_else(|| self.fresh_report());

        for tagged in tagged_logs {
            if let Err(error) = self.tally(sources, tagged, &mut report) {
                tracing::debug!(%error, "skipping unattributable opcode");
            }
        }
        Ok(report)
    }

    /// Every counter starts at zero for every line/branch/function/statement
    /// the syntax table knows about, not just ones a later `tally` touches —
    /// a schema consumer reads an absent line as "not applicable", not
    /// "uncovered", so lines that are merely never hit still need a `0`
    /// entry (§8 invariant 3 requires the same for every branch id).
    fn fresh_report(&self) -> Report {
        let mut report = Report::default();
        for (path, table) in &self.syntax_tables {
            let l = (1..=table.line_count()).map(|line| (line, 0)).collect();
            let b = table
                .branch_map
                .iter()
                .map(|(&id, desc)| (id, vec![0u64; desc.locations.len()]))
                .collect();
            let f = table.fn_map.keys().map(|&id| (id, 0)).collect();
            let s = table.statement_map.keys().map(|&id| (id, 0)).collect();
            report.paths.insert(
                path.clone(),
                PathReport {
                    path: path.clone(),
                    branch_map: table.branch_map.clone(),
                    fn_map: table.fn_map.clone(),
                    statement_map: table.statement_map.clone(),
                    l,
                    b,
                    f,
                    s,
                },
            );
        }
        report
    }

    fn tally(&self, sources: &mut Sources, tagged: &TaggedLog, report: &mut Report) -> Result<()> {
        let bytecode = match &tagged.tag {
            Tag::Bytecode(bytecode) => bytecode.clone(),
            Tag::Address(address) => sources.address_to_bytecode(address)?.to_string(),
        };
        let source_map = sources.bytecode_to_source_map(&bytecode)?;
        let range = source_map.pc_to_range(tagged.log.pc)?;
        let source_map_bytecode = source_map.bytecode().to_string();
        if range.length == 0 {
            return Ok(());
        }
        let path = sources.compiler_source_path(&source_map_bytecode, range.index)?.to_string();
        let Some(table) = self.syntax_tables.get(&path) else { return Ok(()) };
        let stats = report
            .paths
            .get_mut(&path)
            .ok_or_else(|| Error::NoPathForSource { index: range.index as u32, bytecode: bytecode.clone() })?;

        let mut last_line: Option<usize> = None;
        let mut branch_counted = false;
        let mut function_counted = false;
        let is_generated = path.starts_with('#');

        for byte in range.start..range.start + range.length {
            let Some(features) = table.features(byte) else {
                if is_generated {
                    break;
                }
                continue;
            };
            for feature in features {
                match *feature {
                    Feature::Line(line) => {
                        if last_line != Some(line) {
                            *stats.l.entry(line).or_insert(0) += 1;
                            last_line = Some(line);
                        }
                    }
                    Feature::Branch { branch_id, alt_index } => {
                        if !branch_counted {
                            let alts = stats.b.entry(branch_id).or_insert_with(|| {
                                vec![0u64; table.branch_map.get(&branch_id).map(|b| b.locations.len()).unwrap_or(0)]
                            });
                            if let Some(slot) = alts.get_mut(alt_index as usize) {
                                *slot += 1;
                            }
                            branch_counted = true;
                        }
                    }
                    Feature::Function(fn_id) => {
                        if tagged.log.op == "JUMPDEST" && !function_counted {
                            *stats.f.entry(fn_id).or_insert(0) += 1;
                            function_counted = true;
                        }
                    }
                    Feature::Statement(stmt_id) => {
                        *stats.s.entry(stmt_id).or_insert(0) += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ast() -> serde_json::Value {
        serde_json::json!({
            "nodeType": "SourceUnit",
            "src": "0:40:0",
            "nodes": [{
                "nodeType": "FunctionDefinition",
                "name": "f",
                "src": "0:40:0",
                "body": {
                    "nodeType": "Block",
                    "src": "10:30:0",
                    "statements": [{
                        "nodeType": "Return",
                        "src": "15:5:0"
                    }]
                }
            }]
        })
    }

    /// Invariant 2: every byte's first feature is a Line feature matching
    /// its computed position.
    #[test]
    fn every_byte_starts_with_a_line_feature() {
        let content = "abc\ndef";
        let table = SyntaxTable::build(content, &serde_json::Value::Null);
        for (i, _) in content.bytes().enumerate() {
            match table.features(i).unwrap()[0] {
                Feature::Line(line) => {
                    let expected = if i < 4 { 1 } else { 2 };
                    assert_eq!(line, expected);
                }
                _ => panic!("expected a line feature first"),
            }
        }
    }

    /// Invariant 3 (and the schema distinction it backs): every known
    /// line/branch/function/statement gets a zero entry in a fresh report,
    /// not just ones a later `tally` happens to touch.
    #[test]
    fn fresh_report_zero_initializes_every_counter() {
        let content = "x".repeat(40);
        let table = SyntaxTable::build(&content, &sample_ast());
        let line_count = table.line_count();
        let mut syntax_tables = BTreeMap::new();
        syntax_tables.insert("Foo.sol".to_string(), table);
        let coverage = Coverage { syntax_tables };

        let report = coverage.fresh_report();
        let path_report = &report.paths["Foo.sol"];

        assert_eq!(path_report.l.len(), line_count);
        assert!(path_report.l.values().all(|&c| c == 0));
        for (id, desc) in &path_report.branch_map {
            assert_eq!(path_report.b[id].len(), desc.locations.len());
            assert!(path_report.b[id].iter().all(|&c| c == 0));
        }
        for id in path_report.fn_map.keys() {
            assert_eq!(path_report.f[id], 0);
        }
        for id in path_report.statement_map.keys() {
            assert_eq!(path_report.s[id], 0);
        }
    }

    #[test]
    fn function_and_statement_features_installed() {
        let content = "x".repeat(40);
        let table = SyntaxTable::build(&content, &sample_ast());
        assert_eq!(table.fn_map.len(), 1);
        assert_eq!(table.statement_map.len(), 1);
        assert!(table.features(0).unwrap().iter().any(|f| matches!(f, Feature::Function(_))));
        assert!(table.features(15).unwrap().iter().any(|f| matches!(f, Feature::Statement(_))));
    }

    struct FixtureArtifacts;

    impl solcov_sources::ArtifactsProvider for FixtureArtifacts {
        fn fully_qualified_names(&self) -> Vec<String> {
            vec!["A.sol:A".to_string()]
        }

        fn build_info(&self, _fqn: &str) -> Result<solcov_sources::BuildInfo> {
            use solcov_sources::artifacts::{CompilerOutputCode, InputSource, OutputSource};
            let ast = serde_json::json!({
                "nodeType": "SourceUnit",
                "src": "0:14:0",
                "nodes": [{ "nodeType": "VariableDeclaration", "src": "0:1:0" }],
            });
            Ok(solcov_sources::BuildInfo {
                input_sources: [("A.sol".to_string(), InputSource { content: "contract A {}".to_string() })]
                    .into_iter()
                    .collect(),
                output_sources: [("A.sol".to_string(), OutputSource { id: 0, ast })].into_iter().collect(),
                bytecode: CompilerOutputCode { object: "6000".to_string(), source_map: "0:1:0".to_string(), generated_sources: vec![] },
                deployed_bytecode: CompilerOutputCode { object: "6000".to_string(), source_map: "0:1:0".to_string(), generated_sources: vec![] },
            })
        }
    }

    /// Invariant 4: calling `Coverage::report` twice with the same tagged
    /// logs, threading the first call's report into the second, doubles
    /// every counter it produced.
    #[test]
    fn report_accumulates_monotonically_across_calls_with_the_same_logs() {
        let mut sources = solcov_sources::Sources::crawl(&FixtureArtifacts, None).unwrap();
        let coverage = Coverage::cover(&sources);

        let tagged_logs = vec![TaggedLog {
            log: solcov_trace::provider::StructLog { depth: 1, op: "PUSH1".to_string(), pc: 0, stack: vec![], memory: vec![] },
            tag: Tag::Bytecode("6000".to_string()),
        }];

        let first = coverage.report(&mut sources, &tagged_logs, None).unwrap();
        assert_eq!(first.paths["A.sol"].l[&1], 1);

        let second = coverage.report(&mut sources, &tagged_logs, Some(first)).unwrap();
        assert_eq!(second.paths["A.sol"].l[&1], 2);
    }

    /// Scenario (h): one opcode whose range spans three bytes on the same
    /// line increments that line's counter by exactly 1; a second opcode
    /// on the same line increments it to 2.
    #[test]
    fn line_dedup_within_one_opcode_but_not_across_opcodes() {
        let content = "abc";
        let table = SyntaxTable::build(content, &serde_json::Value::Null);
        let mut l = BTreeMap::new();
        let mut last_line = None;
        for byte in 0..3 {
            for feature in table.features(byte).unwrap() {
                if let Feature::Line(line) = feature {
                    if last_line != Some(*line) {
                        *l.entry(*line).or_insert(0u64) += 1;
                        last_line = Some(*line);
                    }
                }
            }
        }
        assert_eq!(l[&1], 1);

        last_line = None;
        for feature in table.features(0).unwrap() {
            if let Feature::Line(line) = feature {
                if last_line != Some(*line) {
                    *l.entry(*line).or_insert(0u64) += 1;
                    last_line = Some(*line);
                }
            }
        }
        assert_eq!(l[&1], 2);
    }
}
