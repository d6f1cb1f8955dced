//! Class-hierarchy index: subtype, property and enum-scope queries.
//!
//! The generator only needs the [`HierarchyIndex`] capability; [`Hierarchy`]
//! is the TOML-backed implementation used by the CLI and the tests.
//!
//! ```toml
//! [[entry]]
//! name = "vtkObject"
//! superclasses = ["vtkObjectBase"]
//! enums = ["EventIds"]
//!
//! [[entry]]
//! name = "vtkDataArray"
//! superclasses = ["vtkAbstractArray"]
//! properties = ["WRAPEXCLUDE"]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::ClassDescriptor;

/// Property tag marking a class as excluded from wrapping.
pub const WRAP_EXCLUDE: &str = "WRAPEXCLUDE";

/// Read-only queries against the class hierarchy of the wrapped library.
pub trait HierarchyIndex {
    /// The hierarchy has an entry for `name`.
    fn contains(&self, name: &str) -> bool;

    /// `class` is `base` or (transitively) derives from it.
    fn is_type_of(&self, class: &str, base: &str) -> bool;

    /// The entry for `class` carries `property`.
    fn has_property(&self, class: &str, property: &str) -> bool;

    /// `class` is the primary declaration rather than a partial
    /// specialization.
    fn is_primary(&self, class: &str) -> bool;

    /// Fully-qualified name of the enum `name` as seen from inside `scope`,
    /// looking through the scope's superclasses and the global namespace.
    fn qualified_enum_name(&self, scope: &ClassDescriptor, name: &str) -> Option<String>;
}

/// Kind of a hierarchy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    #[default]
    Class,
    Enum,
}

fn default_true() -> bool {
    true
}

/// One class or enum known to the hierarchy.
#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyEntry {
    pub name: String,
    #[serde(default)]
    pub kind: EntryKind,
    #[serde(default)]
    pub superclasses: Vec<String>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default = "default_true")]
    pub is_primary: bool,
    /// Enums declared inside this class.
    #[serde(default)]
    pub enums: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HierarchyFile {
    #[serde(default)]
    entry: Vec<HierarchyEntry>,
}

/// In-memory hierarchy built from one or more hierarchy files.
#[derive(Debug, Default)]
pub struct Hierarchy {
    entries: HashMap<String, HierarchyEntry>,
}

impl Hierarchy {
    pub fn from_entries(entries: impl IntoIterator<Item = HierarchyEntry>) -> Self {
        let mut hierarchy = Self::default();
        for entry in entries {
            hierarchy.insert(entry);
        }
        hierarchy
    }

    /// Load and merge hierarchy files. Later files override earlier entries
    /// of the same name.
    pub fn from_files(paths: &[PathBuf]) -> Result<Self> {
        let mut hierarchy = Self::default();
        for path in paths {
            let entries = load_hierarchy_file(path)
                .with_context(|| format!("loading hierarchy from {}", path.display()))?;
            debug!(path = %path.display(), entries = entries.len(), "loaded hierarchy file");
            for entry in entries {
                hierarchy.insert(entry);
            }
        }
        Ok(hierarchy)
    }

    pub fn insert(&mut self, entry: HierarchyEntry) {
        if let Some(previous) = self.entries.insert(entry.name.clone(), entry) {
            warn!(name = %previous.name, "hierarchy entry redefined, keeping the later one");
        }
    }

    pub fn entry(&self, name: &str) -> Option<&HierarchyEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Breadth-first walk over `start` and its ancestors. Stops at the first
    /// entry for which `visit` returns `Some`.
    fn find_in_ancestors<T>(
        &self,
        start: &[String],
        mut visit: impl FnMut(&HierarchyEntry) -> Option<T>,
    ) -> Option<T> {
        let mut queue: Vec<&str> = start.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut i = 0;
        while i < queue.len() {
            let name = queue[i];
            i += 1;
            if !seen.insert(name) {
                continue;
            }
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            if let Some(found) = visit(entry) {
                return Some(found);
            }
            queue.extend(entry.superclasses.iter().map(String::as_str));
        }
        None
    }

    fn is_enum_entry(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.kind == EntryKind::Enum)
    }
}

impl HierarchyIndex for Hierarchy {
    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn is_type_of(&self, class: &str, base: &str) -> bool {
        if class == base {
            return true;
        }
        self.find_in_ancestors(&[class.to_string()], |e| (e.name == base).then_some(()))
            .is_some()
    }

    fn has_property(&self, class: &str, property: &str) -> bool {
        self.entries
            .get(class)
            .is_some_and(|e| e.properties.iter().any(|p| p == property))
    }

    fn is_primary(&self, class: &str) -> bool {
        self.entries.get(class).is_some_and(|e| e.is_primary)
    }

    fn qualified_enum_name(&self, scope: &ClassDescriptor, name: &str) -> Option<String> {
        if scope.enums.iter().any(|e| e == name) {
            return Some(format!("{}::{}", scope.name, name));
        }

        // Already qualified: `Outer::Inner` must name an enum we know about.
        if let Some((outer, inner)) = name.rsplit_once("::") {
            let known = self.is_enum_entry(name)
                || self
                    .entries
                    .get(outer)
                    .is_some_and(|e| e.enums.iter().any(|en| en == inner));
            return known.then(|| name.to_string());
        }

        let inherited = self.find_in_ancestors(&scope.superclasses, |e| {
            e.enums
                .iter()
                .any(|en| en == name)
                .then(|| format!("{}::{}", e.name, name))
        });
        if inherited.is_some() {
            return inherited;
        }

        self.is_enum_entry(name).then(|| name.to_string())
    }
}

fn load_hierarchy_file(path: &Path) -> Result<Vec<HierarchyEntry>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read hierarchy file {}: {}", path.display(), e))?;
    let file: HierarchyFile = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse hierarchy file {}: {}", path.display(), e))?;
    Ok(file.entry)
}
