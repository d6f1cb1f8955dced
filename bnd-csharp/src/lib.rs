//! bnd-csharp: C# interop generator for parsed VTK class headers.
//!
//! Takes the parsed description of one header (its main class, methods and
//! parameter types) and emits either half of a P/Invoke bridge: the
//! extern `"C"` shim exposing each wrappable method as a flat function, or
//! the C# class whose `DllImport`s call those functions.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use bnd_csharp::{RunOptions, Target};
//!
//! let opts = RunOptions::default();
//! bnd_csharp::run(
//!     Target::Shim,
//!     Path::new("vtkPoints.toml"),
//!     Path::new("vtkPointsCSharp.cxx"),
//!     &opts,
//! )
//! .unwrap();
//! ```
//!
//! Or render in memory from already-loaded inputs:
//!
//! ```no_run
//! use std::path::Path;
//! use bnd_csharp::config::{self, Config};
//!
//! let info = config::load_header(Path::new("vtkPoints.toml")).unwrap();
//! let cs = bnd_csharp::generate_surface(&info, None, &Config::default()).unwrap();
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub mod classify;
pub mod config;
pub mod context;
pub mod eligibility;
pub mod emit;
pub mod hierarchy;
pub mod identity;
pub mod model;
pub mod overload;

use config::Config;
use context::GenContext;
use hierarchy::{Hierarchy, HierarchyIndex};
use model::FileInfo;

/// Which half of the bridge to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The extern `"C"` C++ source.
    Shim,
    /// The C# class.
    Surface,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Shim => f.write_str("shim"),
            Target::Surface => f.write_str("surface"),
        }
    }
}

/// Optional inputs of [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// `bnd-csharp.toml`; defaults apply when absent.
    pub config: Option<PathBuf>,
    /// Hierarchy files, merged in order. Empty means no hierarchy.
    pub hierarchy: Vec<PathBuf>,
    /// Overrides `native_lib` from the config.
    pub native_lib: Option<String>,
}

/// Run the full pipeline for one header: load the config, the parsed header
/// and the hierarchy, open `output`, generate `target` and write it.
///
/// The output file is opened before anything is generated, so an unwritable
/// destination fails without doing the work. Returns the path written.
pub fn run(target: Target, input: &Path, output: &Path, opts: &RunOptions) -> Result<PathBuf> {
    let mut cfg = match &opts.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(lib) = &opts.native_lib {
        cfg.native_lib = lib.clone();
    }

    let info = config::load_header(input)
        .with_context(|| format!("loading header description from {}", input.display()))?;

    let hierarchy = if opts.hierarchy.is_empty() {
        None
    } else {
        Some(Hierarchy::from_files(&opts.hierarchy)?)
    };

    let mut file = std::fs::File::create(output)
        .with_context(|| format!("opening output {}", output.display()))?;

    let text = generate(
        target,
        &info,
        hierarchy.as_ref().map(|h| h as &dyn HierarchyIndex),
        &cfg,
    )?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("writing output to {}", output.display()))?;

    info!(
        %target,
        path = %output.display(),
        size = text.len(),
        "wrote output"
    );

    Ok(output.to_path_buf())
}

/// Generate `target` from an already-loaded header description.
pub fn generate(
    target: Target,
    info: &FileInfo,
    hierarchy: Option<&dyn HierarchyIndex>,
    cfg: &Config,
) -> Result<String> {
    match target {
        Target::Shim => generate_shim(info, hierarchy, cfg),
        Target::Surface => generate_surface(info, hierarchy, cfg),
    }
}

/// Render the C++ shim. A header without a wrappable main class yields an
/// empty string.
pub fn generate_shim(
    info: &FileInfo,
    hierarchy: Option<&dyn HierarchyIndex>,
    cfg: &Config,
) -> Result<String> {
    let class = match context::select_main_class(info, hierarchy, cfg, false) {
        Ok(class) => class,
        Err(reason) => {
            if reason.warns() {
                warn!(%reason, "no shim generated");
            }
            return Ok(String::new());
        }
    };

    let mut ctx = GenContext::new(class, hierarchy, cfg);
    let methods = ctx.plan_methods();
    let text = emit::shim::emit_shim(&ctx, &methods)
        .with_context(|| format!("formatting shim for {}", class.name))?;

    info!(
        class = %class.name,
        target = %Target::Shim,
        methods = methods.len(),
        "generated shim"
    );
    Ok(text)
}

/// Render the C# surface. A header without a wrappable main class, or the
/// root object base while `stub_root_base` is set, yields an empty
/// namespace.
pub fn generate_surface(
    info: &FileInfo,
    hierarchy: Option<&dyn HierarchyIndex>,
    cfg: &Config,
) -> Result<String> {
    let class = match context::select_main_class(info, hierarchy, cfg, cfg.stub_root_base) {
        Ok(class) => class,
        Err(reason) => {
            if reason.warns() {
                warn!(%reason, "emitting empty surface");
            }
            return Ok(emit::surface::emit_stub(&cfg.namespace));
        }
    };

    let mut ctx = GenContext::new(class, hierarchy, cfg);
    let methods = ctx.plan_methods();
    let text = emit::surface::emit_surface(&ctx, &methods)
        .with_context(|| format!("formatting surface for {}", class.name))?;

    info!(
        class = %class.name,
        target = %Target::Surface,
        methods = methods.len(),
        "generated surface"
    );
    Ok(text)
}
