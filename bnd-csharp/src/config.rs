//! Configuration types for `bnd-csharp.toml` and the header input loader.

use serde::Deserialize;
use std::path::Path;

use crate::model::FileInfo;

/// Root configuration. Every field has a default, so an empty file (or no
/// file at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library identifier written into every `DllImport`.
    pub native_lib: String,
    /// Managed namespace wrapping every generated class.
    pub namespace: String,
    /// Emit only an empty namespace stub for the root object-base class,
    /// assuming a hand-maintained base type already exists.
    pub stub_root_base: bool,
    pub roots: RootsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            native_lib: "vtkCommonCoreCSharp".to_string(),
            namespace: "VTK".to_string(),
            stub_root_base: true,
            roots: RootsConfig::default(),
        }
    }
}

/// Names of the two foundational classes that get hand-specialized glue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RootsConfig {
    /// Root of the wrappable hierarchy (reference counting, identity).
    pub object_base: String,
    /// Root of the observer-capable classes (event callbacks).
    pub observer: String,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            object_base: "vtkObjectBase".to_string(),
            observer: "vtkObject".to_string(),
        }
    }
}

impl RootsConfig {
    pub fn is_object_base(&self, class: &str) -> bool {
        self.object_base == class
    }

    pub fn is_observer(&self, class: &str) -> bool {
        self.observer == class
    }
}

/// Load and parse a `bnd-csharp.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;
    Ok(config)
}

/// Load a parsed-header tree (the upstream parser's output, as TOML).
pub fn load_header(path: &Path) -> anyhow::Result<FileInfo> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read header file {}: {}", path.display(), e))?;
    let info: FileInfo = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse header file {}: {}", path.display(), e))?;
    Ok(info)
}
