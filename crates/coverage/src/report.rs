//! The accumulated coverage report and the external JSON schema it's
//! written as — one object per source path, keyed by path, each carrying
//! its descriptor maps and hit counters.

use crate::{BranchDescriptor, FunctionDescriptor, StatementDescriptor};
use std::collections::BTreeMap;

/// One source file's hit counters alongside the descriptors `Coverage`
/// computed for it.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PathReport {
    pub path: String,
    #[serde(rename = "branchMap")]
    pub branch_map: BTreeMap<u32, BranchDescriptor>,
    #[serde(rename = "fnMap")]
    pub fn_map: BTreeMap<u32, FunctionDescriptor>,
    #[serde(rename = "statementMap")]
    pub statement_map: BTreeMap<u32, StatementDescriptor>,
    pub l: BTreeMap<usize, u64>,
    pub b: BTreeMap<u32, Vec<u64>>,
    pub f: BTreeMap<u32, u64>,
    pub s: BTreeMap<u32, u64>,
}

/// The full report: every known path's [`PathReport`], keyed by path.
///
/// `report` calls accumulate into an existing `Report` rather than
/// replacing it — every counter is monotonically non-decreasing across
/// calls with the same logs (§8 invariant 4).
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(transparent)]
pub struct Report {
    pub paths: BTreeMap<String, PathReport>,
}

/// Drops generated (`#...`) and disambiguated-duplicate (containing `:`)
/// paths, and rewrites `l` to retain only lines with at least one
/// significant feature — a branch, a non-skip function, or a non-skip
/// statement — so pure declarations and comments don't show up as
/// "uncovered" lines.
pub fn filtered_report(report: &Report, coverage: &crate::Coverage) -> Report {
    let mut filtered = Report::default();
    for (path, stats) in &report.paths {
        if path.starts_with('#') || path.contains(':') {
            continue;
        }
        let mut copy = stats.clone();
        if let Some(table) = coverage.syntax_table(path) {
            copy.l.retain(|line, _| table.is_significant_line(*line));
        }
        filtered.paths.insert(path.clone(), copy);
    }
    filtered
}
