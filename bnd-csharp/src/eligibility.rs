//! Eligibility filter: decides whether a method signature can cross the
//! boundary at all.
//!
//! Both emitters run every method through the same [`EligibilityFilter`], so
//! the shim and the surface always agree on which methods exist and on their
//! sequence numbers. A passing check may rewrite enum class names in the
//! signature to their fully-qualified form.

use std::fmt;

use crate::classify::{self, Category, ClassifyError};
use crate::config::RootsConfig;
use crate::hierarchy::{HierarchyIndex, WRAP_EXCLUDE};
use crate::model::{BaseType, ClassDescriptor, FunctionSignature, Indirection, TypeDescriptor};

/// Methods that return the receiver's own polymorphic type.
const IDENTITY_BREAKING: &[&str] = &["NewInstance", "SafeDownCast"];

/// Methods whose lifecycle exports are synthesized separately.
const LIFECYCLE: &[&str] = &["Delete", "New"];

/// Observer methods replaced by the hand-written bridge.
const OBSERVER_ALWAYS_REJECTED: &[&str] = &["AddObserver", "GetCommand"];

/// Which slot of a signature a rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Arg(usize),
    Return,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Arg(i) => write!(f, "argument {i}"),
            Slot::Return => f.write_str("return value"),
        }
    }
}

/// Why a method was left out of the generated bindings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("method has no name")]
    Unnamed,
    #[error("operator, template, excluded, deleted or non-public method")]
    NotBindable,
    #[error("parser could not size an array parameter")]
    ArrayFailure,
    #[error("`{0}` returns the receiver's own type")]
    IdentityBreaking(String),
    #[error("{slot}: {source}")]
    Type { slot: Slot, source: ClassifyError },
    #[error("{slot}: enum `{name}` does not resolve to a qualified name")]
    UnresolvedEnum { slot: Slot, name: String },
    #[error("{slot}: class `{class}` is not wrapped")]
    UnwrappedClass { slot: Slot, class: String },
    #[error("`{0}` is replaced by the observer bridge")]
    ObserverGlue(String),
    #[error("`Print` is replaced by the print bridge")]
    PrintGlue,
    #[error("`{0}` is part of the synthesized lifecycle")]
    Lifecycle(String),
    #[error("`{0}` has a constructor-like name")]
    ConstructorLike(String),
}

/// Per-class eligibility checks.
pub struct EligibilityFilter<'a> {
    class: &'a ClassDescriptor,
    hierarchy: Option<&'a dyn HierarchyIndex>,
    roots: &'a RootsConfig,
}

impl<'a> EligibilityFilter<'a> {
    pub fn new(
        class: &'a ClassDescriptor,
        hierarchy: Option<&'a dyn HierarchyIndex>,
        roots: &'a RootsConfig,
    ) -> Self {
        Self {
            class,
            hierarchy,
            roots,
        }
    }

    /// Run every rule against `sig`. On success, by-value enum slots carry
    /// their fully-qualified names.
    pub fn check(&self, sig: &mut FunctionSignature) -> Result<(), Rejection> {
        check_flags(sig)?;
        if IDENTITY_BREAKING.contains(&sig.name.as_str()) {
            return Err(Rejection::IdentityBreaking(sig.name.clone()));
        }
        if !sig.is_callback_pattern() {
            self.check_arguments(sig)?;
            self.check_return(sig)?;
            self.check_carve_outs(sig)?;
        }
        self.check_constructor_like(sig)
    }

    /// A class may appear in a bound signature: not a template
    /// instantiation and, when a hierarchy is available, a known, primary,
    /// non-excluded subtype of the root object base.
    pub fn is_class_wrapped(&self, class: &str) -> bool {
        if class.contains('<') {
            return false;
        }
        match self.hierarchy {
            Some(h) => {
                h.contains(class)
                    && !h.has_property(class, WRAP_EXCLUDE)
                    && h.is_type_of(class, &self.roots.object_base)
                    && h.is_primary(class)
            }
            None => true,
        }
    }

    fn check_arguments(&self, sig: &mut FunctionSignature) -> Result<(), Rejection> {
        for (i, param) in sig.parameters.iter_mut().enumerate() {
            let slot = Slot::Arg(i);
            let category =
                classify::classify_arg(param).map_err(|source| Rejection::Type { slot, source })?;
            // Function pointers only cross inside the callback pattern.
            if category == Category::Callback {
                return Err(Rejection::Type {
                    slot,
                    source: ClassifyError::UnsupportedBase(BaseType::Function),
                });
            }
            self.check_slot(&mut param.ty, slot)?;
        }
        Ok(())
    }

    fn check_return(&self, sig: &mut FunctionSignature) -> Result<(), Rejection> {
        let slot = Slot::Return;
        classify::classify_return(&sig.return_type, sig.have_hint, sig.return_count)
            .map_err(|source| Rejection::Type { slot, source })?;
        self.check_slot(&mut sig.return_type, slot)
    }

    /// Hierarchy-dependent checks shared by arguments and the return slot.
    fn check_slot(&self, ty: &mut TypeDescriptor, slot: Slot) -> Result<(), Rejection> {
        match (ty.base, ty.indirection) {
            (BaseType::Unknown, Indirection::Value) => {
                let name = ty.class().to_string();
                let qualified = self
                    .resolve_enum(&name)
                    .ok_or(Rejection::UnresolvedEnum { slot, name })?;
                ty.class_name = Some(qualified);
                Ok(())
            }
            (BaseType::Object, _) => {
                if self.is_class_wrapped(ty.class()) {
                    Ok(())
                } else {
                    Err(Rejection::UnwrappedClass {
                        slot,
                        class: ty.class().to_string(),
                    })
                }
            }
            _ => Ok(()),
        }
    }

    fn resolve_enum(&self, name: &str) -> Option<String> {
        match self.hierarchy {
            Some(h) => h.qualified_enum_name(self.class, name),
            None if self.class.enums.iter().any(|e| e == name) => {
                Some(format!("{}::{}", self.class.name, name))
            }
            None => None,
        }
    }

    fn check_carve_outs(&self, sig: &FunctionSignature) -> Result<(), Rejection> {
        let name = sig.name.as_str();
        if self.roots.is_observer(&self.class.name) && is_observer_glue(sig) {
            return Err(Rejection::ObserverGlue(name.to_string()));
        }
        if self.roots.is_object_base(&self.class.name) && name == "Print" {
            return Err(Rejection::PrintGlue);
        }
        if LIFECYCLE.contains(&name) {
            return Err(Rejection::Lifecycle(name.to_string()));
        }
        Ok(())
    }

    fn check_constructor_like(&self, sig: &FunctionSignature) -> Result<(), Rejection> {
        let class = self.class.name.as_str();
        let mut rest = sig.name.chars();
        rest.next();
        if sig.name == class || rest.as_str() == class {
            return Err(Rejection::ConstructorLike(sig.name.clone()));
        }
        Ok(())
    }
}

fn check_flags(sig: &FunctionSignature) -> Result<(), Rejection> {
    if sig.name.is_empty() {
        return Err(Rejection::Unnamed);
    }
    if sig.is_operator || sig.is_template || sig.is_excluded || sig.is_deleted || !sig.is_public
    {
        return Err(Rejection::NotBindable);
    }
    if sig.array_failure {
        return Err(Rejection::ArrayFailure);
    }
    Ok(())
}

fn is_tag(ty: &TypeDescriptor) -> bool {
    ty.is_exactly(BaseType::UnsignedLong, Indirection::Value, false)
}

fn is_event_name(ty: &TypeDescriptor) -> bool {
    ty.is_exactly(BaseType::Char, Indirection::Pointer, true)
}

/// Observer-root methods that the hand-written bridge supersedes. Overloads
/// taking a plain tag (or event name) stay generic.
fn is_observer_glue(sig: &FunctionSignature) -> bool {
    let first = sig.parameters.first().map(|p| &p.ty);
    match sig.name.as_str() {
        name if OBSERVER_ALWAYS_REJECTED.contains(&name) => true,
        "RemoveObserver" => !first.is_some_and(is_tag),
        "RemoveObservers" | "HasObserver" => {
            sig.arity() > 1 || !first.is_some_and(|t| is_tag(t) || is_event_name(t))
        }
        "RemoveAllObservers" => sig.arity() > 0,
        _ => false,
    }
}
