//! Project-level configuration for `solcov`, loaded from a `solcov.toml`
//! file and overridden field-by-field by CLI flags — the same layering
//! `foundry-config` uses for `foundry.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent configuration for a `solcov` project.
///
/// Every field has a default so an empty or missing `solcov.toml` is
/// valid; the CLI overlays its own flags on top via [`Config::merge_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Where the final JSON report is written.
    pub coverage_file: PathBuf,
    /// JSON-RPC endpoint to trace transactions against.
    pub rpc_url: String,
    /// Skip invoking the build tool before tracing; assume artifacts are
    /// already up to date.
    pub no_compile: bool,
    /// Path prefixes excluded from the filtered report in addition to the
    /// `#`/`:` rules in the coverage filter.
    pub ignore: Vec<String>,
    /// Directory the build tool wrote its artifacts into.
    pub artifacts_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coverage_file: PathBuf::from("coverage.json"),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            no_compile: false,
            ignore: Vec::new(),
            artifacts_dir: PathBuf::from("out"),
        }
    }
}

impl Config {
    /// Loads `solcov.toml` from `root`, if present, falling back to
    /// [`Config::default`] otherwise.
    pub fn load(root: &Path) -> crate::Result<Self> {
        let path = root.join("solcov.toml");
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let config: Self = toml::from_str(&contents)
                    .map_err(|e| crate::Error::Io(std::io::Error::other(e)))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies CLI overrides on top of this config, in place.
    ///
    /// `None` leaves the existing value untouched; booleans are OR'd since
    /// `--no-compile` only ever turns the flag on from the CLI.
    pub fn merge_cli(
        &mut self,
        coverage_file: Option<PathBuf>,
        rpc_url: Option<String>,
        no_compile: bool,
    ) {
        if let Some(path) = coverage_file {
            self.coverage_file = path;
        }
        if let Some(url) = rpc_url {
            self.rpc_url = url;
        }
        self.no_compile |= no_compile;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.coverage_file, PathBuf::from("coverage.json"));
        assert!(!config.no_compile);
    }

    #[test]
    fn load_missing_file_falls_back_to_default() {
        let dir = std::env::temp_dir().join("solcov-config-test-missing");
        let config = Config::load(&dir).unwrap();
        assert_eq!(config.coverage_file, PathBuf::from("coverage.json"));
    }

    #[test]
    fn merge_cli_overrides_only_provided_fields() {
        let mut config = Config::default();
        config.merge_cli(Some(PathBuf::from("out.json")), None, true);
        assert_eq!(config.coverage_file, PathBuf::from("out.json"));
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert!(config.no_compile);
    }
}
