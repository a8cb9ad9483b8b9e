//! A filesystem-backed [`ArtifactsProvider`]: reads a directory the build
//! tool wrote its per-contract build info into.
//!
//! The build tool integration itself is out of scope; this only fixes one
//! concrete on-disk shape so the binary is runnable end-to-end. A project
//! using a different build tool would ship its own provider that adapts
//! that tool's own artifact format into [`solcov_sources::BuildInfo`].

use solcov_common::{Error, Result};
use solcov_sources::{ArtifactsProvider, BuildInfo};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `<artifacts-dir>/solcov-manifest.json`: `{ "<path>:<contract>": "<relative-json-path>" }`.
const MANIFEST_FILE: &str = "solcov-manifest.json";

pub struct DirectoryArtifacts {
    root: PathBuf,
    manifest: BTreeMap<String, String>,
}

impl DirectoryArtifacts {
    /// Reads `dir`'s manifest. An absent manifest is treated as zero
    /// artifacts rather than a fatal error, so `solcov cover` on a project
    /// with nothing built yet still produces an (empty) report.
    pub fn discover(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self { root: dir.to_path_buf(), manifest })
    }
}

impl ArtifactsProvider for DirectoryArtifacts {
    fn fully_qualified_names(&self) -> Vec<String> {
        self.manifest.keys().cloned().collect()
    }

    fn build_info(&self, fqn: &str) -> Result<BuildInfo> {
        let relative = self
            .manifest
            .get(fqn)
            .ok_or_else(|| Error::NoPathForSource { index: 0, bytecode: fqn.to_string() })?;
        let contents = std::fs::read_to_string(self.root.join(relative))?;
        Ok(serde_json::from_str(&contents)?)
    }
}
