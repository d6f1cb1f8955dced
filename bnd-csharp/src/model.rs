//! Parsed-header model: the input tree handed to both emitters.
//!
//! These types mirror what the upstream header parser produces for one
//! translation unit: the main class, its methods, and the type descriptor of
//! every parameter and return slot. They are parser-independent and
//! deserializable from TOML, which keeps the classifier, filter and emitters
//! testable without a C++ front end.

use std::fmt;

use serde::Deserialize;

/// Base category of a parameter or return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Void,
    Bool,
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
    /// A class type; `class_name` names it.
    Object,
    /// `std::string` / `vtkStdString`.
    String,
    /// An enum (or any type the parser could not resolve further).
    Unknown,
    /// A bare function pointer (`void (*)(void*)`).
    Function,
    SizeT,
    SsizeT,
    Int64,
    UnsignedInt64,
    Char16,
    WChar,
    /// Anything else the parser reports (Qt objects, `std::` containers, ...).
    Other,
}

impl BaseType {
    /// `true` for the unsigned integer family members.
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BaseType::UnsignedChar
                | BaseType::UnsignedShort
                | BaseType::UnsignedInt
                | BaseType::UnsignedLong
                | BaseType::UnsignedLongLong
                | BaseType::UnsignedInt64
        )
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BaseType::Void => "void",
            BaseType::Bool => "bool",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::Char => "char",
            BaseType::SignedChar => "signed char",
            BaseType::UnsignedChar => "unsigned char",
            BaseType::Short => "short",
            BaseType::UnsignedShort => "unsigned short",
            BaseType::Int => "int",
            BaseType::UnsignedInt => "unsigned int",
            BaseType::Long => "long",
            BaseType::UnsignedLong => "unsigned long",
            BaseType::LongLong => "long long",
            BaseType::UnsignedLongLong => "unsigned long long",
            BaseType::Object => "object",
            BaseType::String => "string",
            BaseType::Unknown => "enum",
            BaseType::Function => "function",
            BaseType::SizeT => "size_t",
            BaseType::SsizeT => "ssize_t",
            BaseType::Int64 => "__int64",
            BaseType::UnsignedInt64 => "unsigned __int64",
            BaseType::Char16 => "char16_t",
            BaseType::WChar => "wchar_t",
            BaseType::Other => "other",
        };
        f.write_str(s)
    }
}

/// How a slot refers to its base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indirection {
    /// Passed by value.
    #[default]
    Value,
    /// `T*`
    Pointer,
    /// `T&`
    Reference,
    /// `T*&`
    PointerReference,
    /// `T**`
    PointerPointer,
    /// `T* const`
    ConstPointer,
}

/// Semantic descriptor of one parameter or return slot.
///
/// `base` and `indirection` together pick the emission path. `class_name` is
/// only meaningful for object, enum and custom string types; the eligibility
/// filter may rewrite it to a fully-qualified enum name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypeDescriptor {
    pub base: BaseType,
    #[serde(default)]
    pub indirection: Indirection,
    /// For pointers and references this qualifies the pointee.
    #[serde(default)]
    pub is_const: bool,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
}

impl TypeDescriptor {
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            indirection: Indirection::Value,
            is_const: false,
            class_name: None,
        }
    }

    pub fn void() -> Self {
        Self::new(BaseType::Void)
    }

    /// An object pointer `Class*`.
    pub fn object(class: &str) -> Self {
        Self::new(BaseType::Object).pointer().with_class(class)
    }

    /// A by-value enum named `name` (unqualified until resolved).
    pub fn enumeration(name: &str) -> Self {
        Self::new(BaseType::Unknown).with_class(name)
    }

    pub fn pointer(mut self) -> Self {
        self.indirection = Indirection::Pointer;
        self
    }

    pub fn reference(mut self) -> Self {
        self.indirection = Indirection::Reference;
        self
    }

    pub fn with_indirection(mut self, indirection: Indirection) -> Self {
        self.indirection = indirection;
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class_name = Some(class.to_string());
        self
    }

    /// Compare base and indirection, ignoring constness and class name.
    pub fn is_unqualified(&self, base: BaseType, indirection: Indirection) -> bool {
        self.base == base && self.indirection == indirection
    }

    /// Compare base, indirection and constness exactly.
    pub fn is_exactly(&self, base: BaseType, indirection: Indirection, is_const: bool) -> bool {
        self.is_unqualified(base, indirection) && self.is_const == is_const
    }

    /// A bare function pointer parameter.
    pub fn is_function(&self) -> bool {
        self.is_exactly(BaseType::Function, Indirection::Value, false)
    }

    /// A plain `void*` (non-const).
    pub fn is_void_ptr(&self) -> bool {
        self.is_exactly(BaseType::Void, Indirection::Pointer, false)
    }

    pub fn class(&self) -> &str {
        self.class_name.as_deref().unwrap_or("")
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        match (&self.class_name, self.base) {
            (Some(class), BaseType::Object | BaseType::Unknown | BaseType::String) => {
                f.write_str(class)?
            }
            _ => write!(f, "{}", self.base)?,
        }
        let suffix = match self.indirection {
            Indirection::Value => "",
            Indirection::Pointer => "*",
            Indirection::Reference => "&",
            Indirection::PointerReference => "*&",
            Indirection::PointerPointer => "**",
            Indirection::ConstPointer => "* const",
        };
        f.write_str(suffix)
    }
}

/// One method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Parameter {
    #[serde(flatten)]
    pub ty: TypeDescriptor,
    /// Element count for fixed-size array parameters (`double v[3]`).
    #[serde(default)]
    pub count: usize,
    /// Size-hint expression for variable-length buffers, if annotated.
    #[serde(default)]
    pub count_hint: Option<String>,
}

impl Parameter {
    pub fn new(ty: TypeDescriptor) -> Self {
        Self {
            ty,
            count: 0,
            count_hint: None,
        }
    }

    pub fn array(ty: TypeDescriptor, count: usize) -> Self {
        Self {
            ty,
            count,
            count_hint: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A parsed method declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionSignature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default = "TypeDescriptor::void")]
    pub return_type: TypeDescriptor,
    /// Element count from a size-hint annotation on the return value.
    #[serde(default)]
    pub return_count: usize,
    /// A size-hint annotation is present.
    #[serde(default)]
    pub have_hint: bool,
    #[serde(default)]
    pub is_operator: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
    /// The parser could not determine the size of an array parameter.
    #[serde(default)]
    pub array_failure: bool,
}

impl FunctionSignature {
    /// A public method with no parameters returning `return_type`.
    pub fn new(name: &str, return_type: TypeDescriptor) -> Self {
        Self {
            name: name.to_string(),
            parameters: Vec::new(),
            return_type,
            return_count: 0,
            have_hint: false,
            is_operator: false,
            is_template: false,
            is_excluded: false,
            is_deleted: false,
            is_public: true,
            array_failure: false,
        }
    }

    pub fn with_param(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn with_arg(self, ty: TypeDescriptor) -> Self {
        self.with_param(Parameter::new(ty))
    }

    pub fn with_hint(mut self, count: usize) -> Self {
        self.have_hint = true;
        self.return_count = count;
        self
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// `void Method(void (*f)(void*), void* clientdata)`, the one callback
    /// shape that can cross the boundary.
    pub fn is_callback_pattern(&self) -> bool {
        self.parameters.len() == 2
            && self.parameters[0].ty.is_function()
            && self.parameters[1].ty.is_void_ptr()
            && self
                .return_type
                .is_unqualified(BaseType::Void, Indirection::Value)
    }

    /// Parameters up to and including the first function pointer. Anything
    /// after a function pointer is its client data and is never marshalled.
    pub fn boundary_parameters(&self) -> &[Parameter] {
        match self.parameters.iter().position(|p| p.ty.is_function()) {
            Some(i) => &self.parameters[..=i],
            None => &self.parameters,
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p.ty)?;
            if p.count > 0 {
                write!(f, "[{}]", p.count)?;
            }
        }
        f.write_str(")")
    }
}

/// A parsed class declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FunctionSignature>,
    /// Immediate superclasses, in declaration order.
    #[serde(default)]
    pub superclasses: Vec<String>,
    /// Names of enums declared inside the class body.
    #[serde(default)]
    pub enums: Vec<String>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub is_template: bool,
    /// The class declares `Delete()` (reference-counted lifetime).
    #[serde(default)]
    pub has_delete: bool,
}

impl ClassDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
            superclasses: Vec::new(),
            enums: Vec::new(),
            is_abstract: false,
            is_excluded: false,
            is_template: false,
            has_delete: false,
        }
    }

    /// The class that introduces reference-counted lifetime: it declares
    /// `Delete()` and has no superclass.
    pub fn introduces_lifetime(&self) -> bool {
        self.has_delete && self.superclasses.is_empty()
    }
}

/// Everything parsed from one header.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileInfo {
    /// Header file name, informational only.
    #[serde(default)]
    pub file_name: Option<String>,
    /// The class this header is named after, if any.
    #[serde(default)]
    pub main_class: Option<ClassDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_pattern_requires_exact_shape() {
        let callback = FunctionSignature::new("SetCallback", TypeDescriptor::void())
            .with_arg(TypeDescriptor::new(BaseType::Function))
            .with_arg(TypeDescriptor::void().pointer());
        assert!(callback.is_callback_pattern());

        let const_data = FunctionSignature::new("SetCallback", TypeDescriptor::void())
            .with_arg(TypeDescriptor::new(BaseType::Function))
            .with_arg(TypeDescriptor::void().pointer().constant());
        assert!(!const_data.is_callback_pattern());

        let returns_int = FunctionSignature::new("SetCallback", TypeDescriptor::new(BaseType::Int))
            .with_arg(TypeDescriptor::new(BaseType::Function))
            .with_arg(TypeDescriptor::void().pointer());
        assert!(!returns_int.is_callback_pattern());
    }

    #[test]
    fn boundary_parameters_stop_after_function_pointer() {
        let sig = FunctionSignature::new("SetCallback", TypeDescriptor::void())
            .with_arg(TypeDescriptor::new(BaseType::Function))
            .with_arg(TypeDescriptor::void().pointer());
        assert_eq!(sig.boundary_parameters().len(), 1);

        let plain = FunctionSignature::new("SetRange", TypeDescriptor::void())
            .with_arg(TypeDescriptor::new(BaseType::Int))
            .with_arg(TypeDescriptor::new(BaseType::Int));
        assert_eq!(plain.boundary_parameters().len(), 2);
    }

    #[test]
    fn deserialize_method_from_toml() {
        let src = r#"
            name = "SetOrigin"
            [[parameters]]
            base = "double"
            indirection = "pointer"
            is_const = true
            count = 3
        "#;
        let sig: FunctionSignature = toml::from_str(src).unwrap();
        assert_eq!(sig.name, "SetOrigin");
        assert!(sig.is_public);
        assert!(sig.return_type.is_unqualified(BaseType::Void, Indirection::Value));
        assert_eq!(sig.parameters[0].count, 3);
        assert!(sig.parameters[0].ty.is_const);
        assert_eq!(sig.to_string(), "void SetOrigin(const double*[3])");
    }
}
