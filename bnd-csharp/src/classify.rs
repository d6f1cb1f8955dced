//! Type classifier: maps a parameter or return slot to the category that
//! decides how it is marshalled across the boundary.
//!
//! Classification is pure. Anything that needs the class hierarchy (enum
//! scope resolution, object wrappability) is left to the eligibility filter.

use std::fmt;

use crate::model::{BaseType, Indirection, Parameter, TypeDescriptor};

/// A numeric scalar type that crosses the boundary by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Numeric {
    Float,
    Double,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
}

impl Numeric {
    pub fn from_base(base: BaseType) -> Option<Self> {
        Some(match base {
            BaseType::Float => Numeric::Float,
            BaseType::Double => Numeric::Double,
            BaseType::Char => Numeric::Char,
            BaseType::SignedChar => Numeric::SignedChar,
            BaseType::UnsignedChar => Numeric::UnsignedChar,
            BaseType::Short => Numeric::Short,
            BaseType::UnsignedShort => Numeric::UnsignedShort,
            BaseType::Int => Numeric::Int,
            BaseType::UnsignedInt => Numeric::UnsignedInt,
            BaseType::Long => Numeric::Long,
            BaseType::UnsignedLong => Numeric::UnsignedLong,
            BaseType::LongLong => Numeric::LongLong,
            BaseType::UnsignedLongLong => Numeric::UnsignedLongLong,
            _ => return None,
        })
    }

    /// The native C++ spelling.
    pub fn native(self) -> &'static str {
        match self {
            Numeric::Float => "float",
            Numeric::Double => "double",
            Numeric::Char => "char",
            Numeric::SignedChar => "signed char",
            Numeric::UnsignedChar => "unsigned char",
            Numeric::Short => "short",
            Numeric::UnsignedShort => "unsigned short",
            Numeric::Int => "int",
            Numeric::UnsignedInt => "unsigned int",
            Numeric::Long => "long",
            Numeric::UnsignedLong => "unsigned long",
            Numeric::LongLong => "long long",
            Numeric::UnsignedLongLong => "unsigned long long",
        }
    }

    /// The C type used in the shim's flat signature.
    pub fn flat(self) -> &'static str {
        match self {
            Numeric::Float => "float",
            Numeric::Double => "double",
            Numeric::Char => "char",
            Numeric::SignedChar => "signed char",
            Numeric::UnsignedChar => "unsigned char",
            Numeric::Short | Numeric::UnsignedShort => "short",
            Numeric::Int | Numeric::UnsignedInt => "int",
            Numeric::Long | Numeric::UnsignedLong | Numeric::LongLong | Numeric::UnsignedLongLong => {
                "long long"
            }
        }
    }

    /// Flat element type of an array buffer. Every char is one byte wide.
    pub fn flat_element(self) -> &'static str {
        match self {
            Numeric::Char | Numeric::SignedChar | Numeric::UnsignedChar => "unsigned char",
            other => other.flat(),
        }
    }

    /// The managed type in a `DllImport` declaration.
    pub fn import(self) -> &'static str {
        match self {
            Numeric::Char => "byte",
            other => other.managed(),
        }
    }

    /// The managed type in the public wrapper method.
    pub fn managed(self) -> &'static str {
        match self {
            Numeric::Float => "float",
            Numeric::Double => "double",
            Numeric::Char => "char",
            Numeric::SignedChar | Numeric::UnsignedChar => "byte",
            Numeric::Short | Numeric::UnsignedShort => "short",
            Numeric::Int | Numeric::UnsignedInt => "int",
            Numeric::Long | Numeric::UnsignedLong | Numeric::LongLong | Numeric::UnsignedLongLong => {
                "long"
            }
        }
    }

    /// Managed element type of an array. C# `char` is two bytes, so char
    /// buffers surface as `byte[]`.
    pub fn managed_element(self) -> &'static str {
        match self {
            Numeric::Char => "byte",
            other => other.managed(),
        }
    }
}

/// Element type of a fixed-size array slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Bool,
    Numeric(Numeric),
}

impl Element {
    pub fn native(self) -> &'static str {
        match self {
            Element::Bool => "bool",
            Element::Numeric(n) => n.native(),
        }
    }

    pub fn flat(self) -> &'static str {
        match self {
            Element::Bool => "int",
            Element::Numeric(n) => n.flat_element(),
        }
    }

    /// Element type of the buffer handed to the `DllImport`.
    pub fn import(self) -> &'static str {
        match self {
            Element::Bool => "int",
            Element::Numeric(n) => n.managed_element(),
        }
    }

    pub fn managed(self) -> &'static str {
        match self {
            Element::Bool => "bool",
            Element::Numeric(n) => n.managed_element(),
        }
    }
}

/// Which native spelling a string slot uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    /// `char*` / `const char*`
    CharPtr,
    /// `std::string` by value
    StdString,
    /// `std::string&` / `const std::string&`
    StdStringRef,
}

/// Boundary category of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Void,
    Bool,
    Scalar(Numeric),
    Array { element: Element, count: usize },
    Object { class: String },
    String(StringKind),
    /// A by-value enum; `name` is whatever the descriptor carries (fully
    /// qualified once the eligibility filter has resolved it).
    Enum { name: String },
    /// The function-pointer half of the callback pattern.
    Callback,
}

impl Category {
    pub fn is_void(&self) -> bool {
        matches!(self, Category::Void)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Void => f.write_str("void"),
            Category::Bool => f.write_str("bool"),
            Category::Scalar(n) => f.write_str(n.native()),
            Category::Array { element, count } => write!(f, "{}[{}]", element.native(), count),
            Category::Object { class } => write!(f, "{class}*"),
            Category::String(kind) => write!(f, "string({kind:?})"),
            Category::Enum { name } => write!(f, "enum {name}"),
            Category::Callback => f.write_str("callback"),
        }
    }
}

/// Why a slot has no boundary category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("base type `{0}` cannot cross the boundary")]
    UnsupportedBase(BaseType),
    #[error("`{0}` has an unsupported indirection")]
    UnsupportedIndirection(String),
    #[error("unsigned pointer `{0}` is not supported")]
    UnsignedPointer(String),
    #[error("array `{0}` has no known element count")]
    MissingCount(String),
    #[error("pointer return `{0}` has no size hint")]
    MissingHint(String),
    #[error("void slot `{0}` cannot be an argument")]
    VoidArgument(String),
    #[error("object `{0}` is not passed by pointer")]
    ObjectNotPointer(String),
    #[error("enum slot has no type name")]
    UnnamedEnum,
}

/// Base types that may appear in a bound signature at all.
pub fn is_supported_base(base: BaseType) -> bool {
    matches!(
        base,
        BaseType::Void
            | BaseType::Bool
            | BaseType::Object
            | BaseType::String
            | BaseType::Unknown
    ) || Numeric::from_base(base).is_some()
}

/// Classify a method parameter.
pub fn classify_arg(param: &Parameter) -> Result<Category, ClassifyError> {
    let ty = &param.ty;
    if ty.is_function() {
        return Ok(Category::Callback);
    }
    if ty.base == BaseType::Void {
        return Err(ClassifyError::VoidArgument(ty.to_string()));
    }
    classify_slot(ty, || {
        if param.count > 0 {
            Ok(param.count)
        } else {
            Err(ClassifyError::MissingCount(ty.to_string()))
        }
    })
}

/// Classify a return slot. `count` is the size-hint element count; pointer
/// returns other than objects and strings need one.
pub fn classify_return(
    ty: &TypeDescriptor,
    have_hint: bool,
    count: usize,
) -> Result<Category, ClassifyError> {
    if ty.base == BaseType::Void {
        return match ty.indirection {
            Indirection::Value => Ok(Category::Void),
            _ => Err(ClassifyError::UnsupportedIndirection(ty.to_string())),
        };
    }
    classify_slot(ty, || {
        if have_hint && count > 0 {
            Ok(count)
        } else {
            Err(ClassifyError::MissingHint(ty.to_string()))
        }
    })
}

fn classify_slot(
    ty: &TypeDescriptor,
    array_count: impl FnOnce() -> Result<usize, ClassifyError>,
) -> Result<Category, ClassifyError> {
    if !is_supported_base(ty.base) {
        return Err(ClassifyError::UnsupportedBase(ty.base));
    }
    let unsupported = || ClassifyError::UnsupportedIndirection(ty.to_string());

    match (ty.base, ty.indirection) {
        (BaseType::Object, Indirection::Pointer) => Ok(Category::Object {
            class: ty.class().to_string(),
        }),
        (BaseType::Object, _) => Err(ClassifyError::ObjectNotPointer(ty.to_string())),

        (BaseType::String, Indirection::Value) => Ok(Category::String(StringKind::StdString)),
        (BaseType::String, Indirection::Reference) => {
            Ok(Category::String(StringKind::StdStringRef))
        }
        (BaseType::String, _) => Err(unsupported()),

        (BaseType::Unknown, Indirection::Value) => match &ty.class_name {
            Some(name) if !name.is_empty() => Ok(Category::Enum { name: name.clone() }),
            _ => Err(ClassifyError::UnnamedEnum),
        },
        (BaseType::Unknown, _) => Err(unsupported()),

        (BaseType::Bool, Indirection::Value) => Ok(Category::Bool),
        (BaseType::Bool, Indirection::Pointer) => Ok(Category::Array {
            element: Element::Bool,
            count: array_count()?,
        }),

        (BaseType::Char, Indirection::Pointer) => Ok(Category::String(StringKind::CharPtr)),
        (base, Indirection::Pointer) if base.is_unsigned() => {
            Err(ClassifyError::UnsignedPointer(ty.to_string()))
        }

        (base, indirection) => match (Numeric::from_base(base), indirection) {
            (Some(n), Indirection::Value) => Ok(Category::Scalar(n)),
            (Some(n), Indirection::Pointer) => Ok(Category::Array {
                element: Element::Numeric(n),
                count: array_count()?,
            }),
            _ => Err(unsupported()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(ty: TypeDescriptor) -> Parameter {
        Parameter::new(ty)
    }

    #[test]
    fn scalars_and_strings() {
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::UnsignedLong))),
            Ok(Category::Scalar(Numeric::UnsignedLong))
        );
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::Char).pointer().constant())),
            Ok(Category::String(StringKind::CharPtr))
        );
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::String).reference().constant())),
            Ok(Category::String(StringKind::StdStringRef))
        );
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::Bool))),
            Ok(Category::Bool)
        );
    }

    #[test]
    fn char_pointer_ignores_count() {
        let p = Parameter::array(TypeDescriptor::new(BaseType::Char).pointer(), 16);
        assert_eq!(classify_arg(&p), Ok(Category::String(StringKind::CharPtr)));
    }

    #[test]
    fn arrays_need_a_count() {
        let sized = Parameter::array(TypeDescriptor::new(BaseType::Double).pointer(), 3);
        assert_eq!(
            classify_arg(&sized),
            Ok(Category::Array {
                element: Element::Numeric(Numeric::Double),
                count: 3
            })
        );
        let unsized_ = arg(TypeDescriptor::new(BaseType::Int).pointer());
        assert!(matches!(
            classify_arg(&unsized_),
            Err(ClassifyError::MissingCount(_))
        ));
    }

    #[test]
    fn unsigned_pointers_are_rejected() {
        let p = Parameter::array(TypeDescriptor::new(BaseType::UnsignedInt).pointer(), 4);
        assert_eq!(
            classify_arg(&p),
            Err(ClassifyError::UnsignedPointer("unsigned int*".to_string()))
        );
        let ret = TypeDescriptor::new(BaseType::UnsignedChar).pointer();
        assert!(matches!(
            classify_return(&ret, true, 4),
            Err(ClassifyError::UnsignedPointer(_))
        ));
    }

    #[test]
    fn pointer_return_needs_hint() {
        let ret = TypeDescriptor::new(BaseType::Double).pointer();
        assert!(matches!(
            classify_return(&ret, false, 0),
            Err(ClassifyError::MissingHint(_))
        ));
        assert_eq!(
            classify_return(&ret, true, 3),
            Ok(Category::Array {
                element: Element::Numeric(Numeric::Double),
                count: 3
            })
        );
        // Objects and strings never need one.
        assert_eq!(
            classify_return(&TypeDescriptor::object("vtkPoints"), false, 0),
            Ok(Category::Object {
                class: "vtkPoints".to_string()
            })
        );
        assert_eq!(
            classify_return(&TypeDescriptor::new(BaseType::Char).pointer(), false, 0),
            Ok(Category::String(StringKind::CharPtr))
        );
    }

    #[test]
    fn unsupported_shapes() {
        assert!(matches!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::SizeT))),
            Err(ClassifyError::UnsupportedBase(BaseType::SizeT))
        ));
        assert!(matches!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::Object).with_class("vtkFoo"))),
            Err(ClassifyError::ObjectNotPointer(_))
        ));
        assert!(matches!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::Int).reference())),
            Err(ClassifyError::UnsupportedIndirection(_))
        ));
        assert!(matches!(
            classify_arg(&arg(TypeDescriptor::void().pointer())),
            Err(ClassifyError::VoidArgument(_))
        ));
        assert!(matches!(
            classify_return(&TypeDescriptor::void().pointer(), true, 4),
            Err(ClassifyError::UnsupportedIndirection(_))
        ));
    }

    #[test]
    fn callback_and_enum() {
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::Function))),
            Ok(Category::Callback)
        );
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::enumeration("vtkObject::EventIds"))),
            Ok(Category::Enum {
                name: "vtkObject::EventIds".to_string()
            })
        );
        assert_eq!(
            classify_arg(&arg(TypeDescriptor::new(BaseType::Unknown))),
            Err(ClassifyError::UnnamedEnum)
        );
    }

    #[test]
    fn flat_names_collapse_widths() {
        assert_eq!(Numeric::UnsignedLong.flat(), "long long");
        assert_eq!(Numeric::Long.managed(), "long");
        assert_eq!(Numeric::Char.import(), "byte");
        assert_eq!(Numeric::Char.managed(), "char");
        assert_eq!(Element::Bool.flat(), "int");
        assert_eq!(Element::Numeric(Numeric::SignedChar).flat(), "unsigned char");
    }
}
