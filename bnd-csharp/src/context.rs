//! Per-run generation state shared by both emitters.
//!
//! [`GenContext`] owns the wrapped-function registry and hands out sequence
//! numbers. [`GenContext::plan_methods`] runs the eligibility filter, the
//! overload canonicalizer and the classifier over the main class once, and
//! both emitters render from the resulting [`WrappedMethod`] list.

use tracing::{debug, trace};

use crate::classify::{self, Category};
use crate::config::Config;
use crate::eligibility::EligibilityFilter;
use crate::hierarchy::HierarchyIndex;
use crate::model::{ClassDescriptor, FileInfo, FunctionSignature};
use crate::overload::WrappedFunctionRegistry;

/// Why the main class produces no bindings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("header has no main class")]
    NoMainClass,
    #[error("class `{0}` is excluded from wrapping")]
    Excluded(String),
    #[error("class `{0}` is a template")]
    Template(String),
    #[error("class `{class}` has templated superclass `{superclass}`")]
    TemplatedSuperclass { class: String, superclass: String },
    #[error("class `{class}` does not derive from `{root}`")]
    NotRootSubtype { class: String, root: String },
    #[error("class `{0}` is the hand-maintained root base")]
    RootBase(String),
}

impl SkipReason {
    /// Every skip is worth a warning except the intentional root-base stub.
    pub fn warns(&self) -> bool {
        !matches!(self, SkipReason::RootBase(_))
    }
}

/// Pick the class to wrap, or the reason there is none. `stub_root_base`
/// additionally skips the root object base (the managed side ships a
/// hand-written one).
pub fn select_main_class<'a>(
    info: &'a FileInfo,
    hierarchy: Option<&dyn HierarchyIndex>,
    config: &Config,
    stub_root_base: bool,
) -> Result<&'a ClassDescriptor, SkipReason> {
    let class = info.main_class.as_ref().ok_or(SkipReason::NoMainClass)?;
    if class.is_excluded {
        return Err(SkipReason::Excluded(class.name.clone()));
    }
    if stub_root_base && config.roots.is_object_base(&class.name) {
        return Err(SkipReason::RootBase(class.name.clone()));
    }
    if class.is_template {
        return Err(SkipReason::Template(class.name.clone()));
    }
    if let Some(superclass) = class.superclasses.iter().find(|s| s.contains('<')) {
        return Err(SkipReason::TemplatedSuperclass {
            class: class.name.clone(),
            superclass: superclass.clone(),
        });
    }
    if let Some(h) = hierarchy {
        let root = &config.roots.object_base;
        if !h.is_type_of(&class.name, root) {
            return Err(SkipReason::NotRootSubtype {
                class: class.name.clone(),
                root: root.clone(),
            });
        }
    }
    Ok(class)
}

/// One method that made it through the filter and the canonicalizer.
#[derive(Debug, Clone)]
pub struct WrappedMethod {
    /// Per-class sequence number embedded in the exported symbol.
    pub sequence: usize,
    /// The signature after enum-name resolution.
    pub signature: FunctionSignature,
    /// Categories of the boundary parameters (up to and including a
    /// callback function pointer).
    pub args: Vec<Category>,
    pub ret: Category,
}

impl WrappedMethod {
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn is_callback(&self) -> bool {
        self.args.last() == Some(&Category::Callback)
    }
}

/// Generation state for one main class.
pub struct GenContext<'a> {
    pub class: &'a ClassDescriptor,
    pub hierarchy: Option<&'a dyn HierarchyIndex>,
    pub config: &'a Config,
    registry: WrappedFunctionRegistry,
}

impl<'a> GenContext<'a> {
    pub fn new(
        class: &'a ClassDescriptor,
        hierarchy: Option<&'a dyn HierarchyIndex>,
        config: &'a Config,
    ) -> Self {
        Self {
            class,
            hierarchy,
            config,
            registry: WrappedFunctionRegistry::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn is_object_base(&self) -> bool {
        self.config.roots.is_object_base(&self.class.name)
    }

    pub fn is_observer(&self) -> bool {
        self.config.roots.is_observer(&self.class.name)
    }

    /// Exported symbol of a wrapped method: `{Class}_{Method}_{sequence}`.
    pub fn symbol(&self, method: &WrappedMethod) -> String {
        format!("{}_{}_{}", self.class.name, method.name(), method.sequence)
    }

    /// Filter, deduplicate and classify every method of the main class, in
    /// declaration order. Sequence numbers count wrapped methods only.
    pub fn plan_methods(&mut self) -> Vec<WrappedMethod> {
        let class = self.class;
        let config = self.config;
        let filter = EligibilityFilter::new(class, self.hierarchy, &config.roots);
        let mut planned = Vec::new();

        for function in &class.functions {
            let mut sig = function.clone();
            if let Err(reason) = filter.check(&mut sig) {
                debug!(method = %function.name, %reason, "skipping method");
                continue;
            }
            if let Some(kept) = self.registry.find_duplicate(&sig) {
                trace!(method = %sig, kept = %kept, "skipping duplicate overload");
                continue;
            }

            let args = sig
                .boundary_parameters()
                .iter()
                .map(classify::classify_arg)
                .collect::<Result<Vec<_>, _>>();
            let ret = classify::classify_return(&sig.return_type, sig.have_hint, sig.return_count);
            let (args, ret) = match (args, ret) {
                (Ok(args), Ok(ret)) => (args, ret),
                (Err(reason), _) | (_, Err(reason)) => {
                    debug!(method = %sig.name, %reason, "skipping unclassifiable method");
                    continue;
                }
            };

            let sequence = self.registry.len();
            self.registry.register(sig.clone());
            debug!(
                class = %class.name,
                method = %sig.name,
                sequence,
                arity = args.len(),
                "wrapping method"
            );
            planned.push(WrappedMethod {
                sequence,
                signature: sig,
                args,
                ret,
            });
        }
        planned
    }
}
