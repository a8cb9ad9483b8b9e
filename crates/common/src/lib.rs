//! Shared primitives for the solcov workspace.
//!
//! Every other solcov crate builds on the [`Error`]/[`Result`] pair defined
//! here, plus a handful of hex/address helpers that keep the "lowercase,
//! no `0x` prefix" convention from the data model consistent across crate
//! boundaries.

use alloy_primitives::Address;

pub mod config;
pub mod hex;
pub mod logging;

pub use config::Config;

/// Errors surfaced by the source-map, sources, trace and coverage crates.
///
/// Each variant corresponds to one of the error kinds named in the data
/// model: failures within [`solcov-sourcemap`][sourcemap] and
/// [`solcov-sources`][sources] are expected to propagate to the caller,
/// which decides whether to skip the offending byte/opcode or abort.
///
/// [sourcemap]: https://docs.rs/solcov-sourcemap
/// [sources]: https://docs.rs/solcov-sources
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `pc` does not mark the start of an instruction in this bytecode.
    #[error("unknown program counter {pc} in {fqdn}")]
    UnknownProgramCounter { pc: usize, fqdn: String },

    /// `index` is not a valid instruction index for this source map.
    #[error("unknown instruction index {index} in {fqdn}")]
    UnknownInstructionIndex { index: usize, fqdn: String },

    /// `address` has no bytecode bound in [`Sources`](../solcov_sources/struct.Sources.html).
    #[error("unknown address {address}")]
    UnknownAddress { address: Address },

    /// No exact or fuzzy source map match was found for this bytecode.
    #[error("no source map for bytecode of length {len}")]
    NoSourceMap { len: usize },

    /// `sourceIndex` has no corresponding path for this bytecode.
    #[error("no path for source index {index} of bytecode {bytecode}")]
    NoPathForSource { index: u32, bytecode: String },

    /// The reconstructed call stack violates a trace invariant (e.g. a
    /// CREATE/CREATE2 opcode that did not increase call depth).
    #[error("trace inconsistency: {0}")]
    TraceInconsistency(String),

    /// The JSON-RPC endpoint returned an error or malformed response.
    #[error("rpc call to {method} failed: {source}")]
    Rpc {
        method: &'static str,
        #[source]
        source: eyre::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout solcov's library crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;
