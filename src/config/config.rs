use crate::mapping::mapping::PathMappingTable;
use crate::mapping::{ConfigurationError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Targets shipped by a WebKitGTK 4.1 bundle, relative to the bundle directory.
const WEBKIT2GTK_4_1_TARGETS: [&str; 2] = [
    "usr/lib/libwebkit2gtk-4.1.so.0",
    "usr/lib/libjavascriptcoregtk-4.1.so.0",
];

/// The files to patch and the candidates to apply to each of them.
///
/// * `targets`: files to patch, relative ones are resolved against the bundle directory
/// * `candidates`: the validated mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchConfig {
    pub targets: Vec<PathBuf>,
    pub candidates: PathMappingTable,
}

impl PatchConfig {
    /// Built-in configuration for a WebKitGTK 4.1 AppImage bundle.
    pub fn webkit2gtk_4_1() -> Result<Self> {
        Ok(Self {
            targets: WEBKIT2GTK_4_1_TARGETS.into_iter().map(PathBuf::from).collect(),
            candidates: PathMappingTable::webkit2gtk_4_1()?,
        })
    }

    /// Load a configuration from a JSON file. The mapping table is validated while parsing.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PatchConfig = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            "Loaded {} targets and {} candidates from {}",
            config.targets.len(),
            config.candidates.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load `path` when given, the built-in WebKitGTK configuration otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::webkit2gtk_4_1(),
        }
    }

    /// Resolve the targets against the bundle directory.
    pub fn resolve_targets(&self, app_dir: &Path) -> Vec<PathBuf> {
        self.targets
            .iter()
            .map(|target| app_dir.join(target))
            .collect()
    }
}
