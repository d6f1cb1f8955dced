//! Overload canonicalizer.
//!
//! The managed side has fewer integer widths and string spellings than C++,
//! so `Foo(int)` and `Foo(long)` (or `Foo(const char*)` and
//! `Foo(const std::string&)`) would produce the same managed signature. The
//! first overload registered wins and later ones are skipped.

use crate::model::{BaseType, FunctionSignature, Indirection, TypeDescriptor};

/// Families of types that collapse to one managed type. Within a family the
/// first-listed member has the lowest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Byte,
    Short,
    Int,
    Long,
    Text,
}

/// `(base, indirection pattern) -> (family, rank)`. `None` for the
/// indirection means "any, but both sides must agree".
const FAMILIES: &[(BaseType, Option<Indirection>, Family, u8)] = &[
    (BaseType::UnsignedChar, None, Family::Byte, 0),
    (BaseType::SignedChar, None, Family::Byte, 1),
    (BaseType::UnsignedShort, None, Family::Short, 0),
    (BaseType::Short, None, Family::Short, 1),
    (BaseType::Unknown, None, Family::Int, 0),
    (BaseType::UnsignedInt, None, Family::Int, 1),
    (BaseType::Int, None, Family::Int, 2),
    (BaseType::UnsignedLong, None, Family::Long, 0),
    (BaseType::UnsignedLongLong, None, Family::Long, 1),
    (BaseType::Long, None, Family::Long, 2),
    (BaseType::LongLong, None, Family::Long, 3),
    (BaseType::Char, Some(Indirection::Pointer), Family::Text, 0),
    (BaseType::String, Some(Indirection::Reference), Family::Text, 1),
    (BaseType::String, Some(Indirection::Value), Family::Text, 2),
];

fn family_of(ty: &TypeDescriptor) -> Option<(Family, u8)> {
    FAMILIES
        .iter()
        .find(|(base, ind, _, _)| {
            *base == ty.base && ind.is_none_or(|ind| ind == ty.indirection)
        })
        .map(|&(_, _, family, rank)| (family, rank))
}

/// Result of comparing two slot types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVerdict {
    /// The types stay distinguishable after mapping.
    Distinct,
    /// Identical types.
    Same,
    /// Same family; the first type has the higher precedence.
    PreferFirst,
    /// Same family; the second type has the higher precedence.
    PreferSecond,
}

impl MatchVerdict {
    pub fn is_match(self) -> bool {
        self != MatchVerdict::Distinct
    }
}

/// Compare two slot types under the collapse rules.
pub fn check_match(t1: &TypeDescriptor, t2: &TypeDescriptor) -> MatchVerdict {
    if t1.is_unqualified(t2.base, t2.indirection) {
        if t1.base == BaseType::Object && t1.class() != t2.class() {
            return MatchVerdict::Distinct;
        }
        return MatchVerdict::Same;
    }

    let (Some((f1, r1)), Some((f2, r2))) = (family_of(t1), family_of(t2)) else {
        return MatchVerdict::Distinct;
    };
    if f1 != f2 {
        return MatchVerdict::Distinct;
    }
    // Numeric families also require the same indirection; the text family
    // encodes indirection in the table itself.
    if f1 != Family::Text && t1.indirection != t2.indirection {
        return MatchVerdict::Distinct;
    }
    if r1 < r2 {
        MatchVerdict::PreferSecond
    } else {
        MatchVerdict::PreferFirst
    }
}

/// Two signatures would produce the same managed method.
pub fn signatures_collide(a: &FunctionSignature, b: &FunctionSignature) -> bool {
    a.name == b.name
        && a.arity() == b.arity()
        && a
            .parameters
            .iter()
            .zip(&b.parameters)
            .all(|(pa, pb)| check_match(&pa.ty, &pb.ty).is_match())
        && check_match(&a.return_type, &b.return_type).is_match()
}

/// Append-only list of the signatures already wrapped for the current class.
#[derive(Debug, Default)]
pub struct WrappedFunctionRegistry {
    done: Vec<FunctionSignature>,
}

impl WrappedFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The earlier signature `sig` collides with, if any.
    pub fn find_duplicate(&self, sig: &FunctionSignature) -> Option<&FunctionSignature> {
        self.done.iter().find(|done| signatures_collide(done, sig))
    }

    pub fn register(&mut self, sig: FunctionSignature) {
        self.done.push(sig);
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}
