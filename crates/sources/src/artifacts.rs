//! The shape of compiled output this crate consumes.
//!
//! These types describe the boundary with "the host build tool that
//! exposes compiled artifacts and fully-qualified contract names" (out of
//! scope per the top-level spec) — solcov owns only the data shapes it
//! needs, not a build tool integration. A real caller adapts its build
//! tool's own artifact format (Forge's `out/`, Hardhat's `artifacts/`,
//! Truffle's `build/contracts/`, …) into these structs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One Solidity source file as the compiler saw it.
#[derive(Debug, Clone)]
pub struct CompilerSource {
    pub path: String,
    pub content: String,
    /// The compiler's AST for this file, as the generic `nodeType`/`src`/
    /// `nodes` tree solc's standard-json output emits.
    pub ast: serde_json::Value,
    pub id: u32,
}

/// `object`/`sourceMap`/`generatedSources` for one half (constructor or
/// runtime) of a compiled contract.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOutputCode {
    pub object: String,
    #[serde(default)]
    pub source_map: String,
    #[serde(default)]
    pub generated_sources: Vec<GeneratedSource>,
}

/// A compiler-synthesized source (conventionally named with a leading
/// `#`), e.g. ABI-decoding helper code with no user-written counterpart.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratedSource {
    pub id: u32,
    pub name: String,
    pub contents: String,
    #[serde(default)]
    pub ast: serde_json::Value,
}

/// `input.sources[path].content`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSource {
    pub content: String,
}

/// `output.sources[path].{id, ast}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSource {
    pub id: u32,
    #[serde(default)]
    pub ast: serde_json::Value,
}

/// Per-contract build info for one fully-qualified name.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub input_sources: BTreeMap<String, InputSource>,
    pub output_sources: BTreeMap<String, OutputSource>,
    pub bytecode: CompilerOutputCode,
    pub deployed_bytecode: CompilerOutputCode,
}

/// A provider of compiled artifacts, keyed by fully-qualified name
/// (`"<path>:<contract>"`).
pub trait ArtifactsProvider {
    /// All `"<path>:<contract>"` names this provider knows about.
    fn fully_qualified_names(&self) -> Vec<String>;

    /// Build info for one fully-qualified name.
    fn build_info(&self, fqn: &str) -> solcov_common::Result<BuildInfo>;
}
