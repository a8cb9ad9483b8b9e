//! Owns every known bytecode, its [`SourceMap`], deployed addresses, and
//! the path↔compiler-source mapping, and resolves fuzzy bytecode matches
//! (immutable patches, metadata suffixes) so deployed bytecode that
//! differs slightly from what the compiler emitted can still be attributed.

pub mod artifacts;

use alloy_primitives::Address;
use rustc_hash::FxHashMap;
use solcov_common::{Error, Result, hex};
use solcov_sourcemap::SourceMap;
use std::collections::BTreeMap;

pub use artifacts::{ArtifactsProvider, BuildInfo, CompilerSource};

/// A bytecode shorter than this can't plausibly be a real deployment with
/// a truncated metadata suffix appended to it; see [`Sources::bytecode_to_source_map`].
const FUZZY_PREFIX_MATCH_FLOOR: usize = 42;

/// The bytecode/source-map/address registry.
#[derive(Debug, Default)]
pub struct Sources {
    address_to_bytecode: FxHashMap<Address, String>,
    bytecode_to_source_map: FxHashMap<String, SourceMap>,
    bytecode_to_source_ids: FxHashMap<String, BTreeMap<u32, String>>,
    path_to_source: BTreeMap<String, CompilerSource>,
    /// Per-nominal-path monotone disambiguation counter (§4.2: "a content
    /// hash → path index" is the recommended O(1) upgrade for the linear
    /// scan below; we keep the linear scan since the collision case is
    /// rare and the counter already bounds it).
    unique_counters: BTreeMap<String, u32>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crawls every fully-qualified name `artifacts` exposes (optionally
    /// restricted by `filter`), indexing each contract's sources and
    /// parsing both its constructor and runtime source maps.
    pub fn crawl(
        artifacts: &dyn ArtifactsProvider,
        filter: Option<&dyn Fn(&str) -> bool>,
    ) -> Result<Self> {
        let mut sources = Self::new();
        for fqn in artifacts.fully_qualified_names() {
            if filter.is_some_and(|f| !f(&fqn)) {
                continue;
            }
            let info = artifacts.build_info(&fqn)?;
            sources.index_build_info(&fqn, &info)?;
        }
        Ok(sources)
    }

    fn index_build_info(&mut self, fqn: &str, info: &BuildInfo) -> Result<()> {
        let mut by_id: BTreeMap<u32, (String, String, serde_json::Value)> = BTreeMap::new();
        for (path, out) in &info.output_sources {
            let content = info
                .input_sources
                .get(path)
                .map(|s| s.content.clone())
                .unwrap_or_default();
            by_id.insert(out.id, (path.clone(), content, out.ast.clone()));
        }
        for generated in info.bytecode.generated_sources.iter().chain(&info.deployed_bytecode.generated_sources) {
            by_id.insert(
                generated.id,
                (generated.name.clone(), generated.contents.clone(), generated.ast.clone()),
            );
        }

        self.index_bytecode(&info.bytecode.object, &by_id);
        self.index_bytecode(&info.deployed_bytecode.object, &by_id);

        let constructor_map =
            SourceMap::parse(fqn, &info.bytecode.object, &info.bytecode.source_map)?;
        let runtime_map =
            SourceMap::parse(fqn, &info.deployed_bytecode.object, &info.deployed_bytecode.source_map)?;
        self.bytecode_to_source_map.insert(constructor_map.bytecode().to_string(), constructor_map);
        self.bytecode_to_source_map.insert(runtime_map.bytecode().to_string(), runtime_map);
        Ok(())
    }

    /// Resolves every `CompilerSource` attached to `bytecode` into the
    /// global path registry and records `bytecode → sourceId → path` for
    /// it, per the indexing rule in §4.2:
    ///
    /// 1. a brand-new path is stored as-is;
    /// 2. a path whose stored content matches is reused;
    /// 3. otherwise, the disambiguated variants `path:0, path:1, …` are
    ///    searched for a content match, falling back to allocating a new
    ///    one.
    fn index_bytecode(&mut self, bytecode: &str, by_id: &BTreeMap<u32, (String, String, serde_json::Value)>) {
        let bytecode = hex::normalize(bytecode);
        let mut ids = BTreeMap::new();
        for (&id, (path, content, ast)) in by_id {
            let resolved = self.resolve_path(path, content, ast);
            ids.insert(id, resolved);
        }
        self.bytecode_to_source_ids.insert(bytecode, ids);
    }

    fn resolve_path(&mut self, path: &str, content: &str, ast: &serde_json::Value) -> String {
        if let Some(existing) = self.path_to_source.get(path) {
            if existing.content == content {
                return path.to_string();
            }
        } else {
            self.path_to_source.insert(
                path.to_string(),
                CompilerSource { path: path.to_string(), content: content.to_string(), ast: ast.clone(), id: 0 },
            );
            return path.to_string();
        }

        let unique = *self.unique_counters.get(path).unwrap_or(&0);
        for k in 0..unique {
            let candidate = format!("{path}:{k}");
            // §9 Open Question 4: guard presence explicitly rather than
            // indexing a possibly-sparse entry.
            if let Some(existing) = self.path_to_source.get(&candidate) {
                if existing.content == content {
                    return candidate;
                }
            }
        }

        let candidate = format!("{path}:{unique}");
        self.path_to_source.insert(
            candidate.clone(),
            CompilerSource { path: candidate.clone(), content: content.to_string(), ast: ast.clone(), id: 0 },
        );
        self.unique_counters.insert(path.to_string(), unique + 1);
        candidate
    }

    /// Lowercases every address key before merging into the address
    /// registry.
    ///
    /// [`Address`] compares byte-for-byte regardless of display case, so
    /// the lowercasing the spec calls for (meant for string-keyed maps)
    /// falls out for free here; we still normalize the bytecode value.
    pub fn load_addresses(&mut self, addresses: impl IntoIterator<Item = (Address, String)>) {
        for (address, bytecode) in addresses {
            self.address_to_bytecode.insert(address, hex::normalize(&bytecode));
        }
    }

    pub fn address_to_bytecode(&self, address: &Address) -> Result<&str> {
        self.address_to_bytecode
            .get(address)
            .map(String::as_str)
            .ok_or(Error::UnknownAddress { address: *address })
    }

    /// Resolves `bytecode` to its [`SourceMap`], trying an exact match
    /// first and falling back to the fuzzy rules in §4.2. A successful
    /// fuzzy match is cached under `bytecode`'s own key so later lookups
    /// are O(1) (§8 invariant 5: fuzzy-match determinism).
    pub fn bytecode_to_source_map(&mut self, bytecode: &str) -> Result<&SourceMap> {
        let bytecode = hex::normalize(bytecode);
        if self.bytecode_to_source_map.contains_key(&bytecode) {
            return Ok(&self.bytecode_to_source_map[&bytecode]);
        }

        let matched_key = self
            .bytecode_to_source_map
            .keys()
            .find(|k| fuzzy_matches(&bytecode, k))
            .cloned()
            .ok_or(Error::NoSourceMap { len: bytecode.len() })?;

        let map = self.bytecode_to_source_map[&matched_key].clone();
        let ids = self.bytecode_to_source_ids.get(&matched_key).cloned().unwrap_or_default();
        self.bytecode_to_source_map.insert(bytecode.clone(), map);
        self.bytecode_to_source_ids.insert(bytecode.clone(), ids);
        Ok(&self.bytecode_to_source_map[&bytecode])
    }

    /// Resolves the disambiguated path for source `index` of `bytecode`.
    pub fn compiler_source_path(&self, bytecode: &str, index: i64) -> Result<&str> {
        let bytecode = hex::normalize(bytecode);
        let index = u32::try_from(index)
            .map_err(|_| Error::NoPathForSource { index: index as u32, bytecode: bytecode.clone() })?;
        self.bytecode_to_source_ids
            .get(&bytecode)
            .and_then(|ids| ids.get(&index))
            .map(String::as_str)
            .ok_or(Error::NoPathForSource { index, bytecode })
    }

    /// Every known path except the disambiguation/synthetic-source
    /// variants, paired with its stored content. Used by `solcov-coverage`
    /// to build a [`SyntaxTable`](../solcov_coverage/struct.SyntaxTable.html)
    /// for every real source the compiler saw.
    pub fn sources(&self) -> impl Iterator<Item = (&str, &CompilerSource)> {
        self.path_to_source.iter().map(|(path, source)| (path.as_str(), source))
    }

    pub fn source(&self, path: &str) -> Option<&CompilerSource> {
        self.path_to_source.get(path)
    }
}

/// Implements the two fuzzy matching rules from §4.2 against one known
/// key `k`.
fn fuzzy_matches(bytecode: &str, k: &str) -> bool {
    if bytecode.len() == k.len() {
        return bytecode.bytes().zip(k.bytes()).all(|(b, kb)| b == kb || kb == b'0');
    }
    if bytecode.len() > k.len() && k.len() > FUZZY_PREFIX_MATCH_FLOOR {
        return bytecode.starts_with(k);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disambiguates_conflicting_paths() {
        let mut sources = Sources::new();
        let ast = serde_json::Value::Null;
        assert_eq!(sources.resolve_path("A.sol", "one", &ast), "A.sol");
        assert_eq!(sources.resolve_path("A.sol", "one", &ast), "A.sol");
        assert_eq!(sources.resolve_path("A.sol", "two", &ast), "A.sol:0");
        assert_eq!(sources.resolve_path("A.sol", "two", &ast), "A.sol:0");
        assert_eq!(sources.resolve_path("A.sol", "three", &ast), "A.sol:1");
    }

    #[test]
    fn same_length_fuzzy_match_treats_k_zero_nibbles_as_wildcard() {
        assert!(fuzzy_matches("ab12cd34ef", "ab00cd00ef"));
        // position 3 differs ('2' vs '3') and the known key is non-zero
        // there, so the wildcard rule does not apply and the match fails.
        assert!(!fuzzy_matches("ab12cdff", "ab13cd00"));
    }

    #[test]
    fn prefix_fuzzy_match_requires_floor_length() {
        let compiled = "a".repeat(50);
        let deployed = format!("{compiled}deadbeef");
        assert!(fuzzy_matches(&deployed, &compiled));

        let short_compiled = "ab".repeat(10); // 20 chars, below the 42-char floor
        let short_deployed = format!("{short_compiled}ff");
        assert!(!fuzzy_matches(&short_deployed, &short_compiled));
    }

    /// Invariant 5: once `bytecode_to_source_map` resolves a bytecode via a
    /// fuzzy rule, the match is cached under its own exact key, so every
    /// later lookup of the same bytecode returns the identical map without
    /// re-running the fuzzy search.
    #[test]
    fn fuzzy_match_is_cached_so_later_lookups_are_deterministic() {
        let mut sources = Sources::new();
        let known = SourceMap::parse("A.sol:A", "ab00cd00ef", "0:1:0").unwrap();
        sources.bytecode_to_source_map.insert("ab00cd00ef".to_string(), known);

        let queried = "ab12cd34ef";
        assert!(!sources.bytecode_to_source_map.contains_key(queried));

        let first = sources.bytecode_to_source_map(queried).unwrap().fqdn().to_string();
        let second = sources.bytecode_to_source_map(queried).unwrap().fqdn().to_string();
        assert_eq!(first, "A.sol:A");
        assert_eq!(first, second);
        assert!(sources.bytecode_to_source_map.contains_key(queried));
    }

    #[test]
    fn unknown_address_errors() {
        let sources = Sources::new();
        let addr = Address::ZERO;
        assert!(matches!(sources.address_to_bytecode(&addr), Err(Error::UnknownAddress { .. })));
    }
}
