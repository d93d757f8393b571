//! Core type representation for Magma.
//!
//! `TypeRef` is the resolved form of every annotation and inferred type.
//! Primitive facts (emitted C name, width, signedness) live in an
//! explicit [`PrimitiveTable`] that is built per compilation and passed
//! to whoever needs it, so no global state is shared between units.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    USize,
    F32,
    F64,
    Bool,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveClass {
    Signed,
    Unsigned,
    Float,
    Bool,
    Void,
}

/// One row of the primitive table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveInfo {
    pub primitive: Primitive,
    /// Source spelling, also used as literal suffix for integers.
    pub name: &'static str,
    pub c_name: &'static str,
    pub bits: u32,
    pub class: PrimitiveClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveTable {
    entries: Vec<PrimitiveInfo>,
}

impl PrimitiveTable {
    pub fn standard() -> Self {
        use PrimitiveClass::*;
        let row = |primitive, name, c_name, bits, class| PrimitiveInfo {
            primitive,
            name,
            c_name,
            bits,
            class,
        };
        PrimitiveTable {
            entries: vec![
                row(Primitive::I8, "I8", "int8_t", 8, Signed),
                row(Primitive::I16, "I16", "int16_t", 16, Signed),
                row(Primitive::I32, "I32", "int32_t", 32, Signed),
                row(Primitive::I64, "I64", "int64_t", 64, Signed),
                row(Primitive::U8, "U8", "uint8_t", 8, Unsigned),
                row(Primitive::U16, "U16", "uint16_t", 16, Unsigned),
                row(Primitive::U32, "U32", "uint32_t", 32, Unsigned),
                row(Primitive::U64, "U64", "uint64_t", 64, Unsigned),
                row(Primitive::USize, "USize", "size_t", 64, Unsigned),
                row(Primitive::F32, "F32", "float", 32, Float),
                row(Primitive::F64, "F64", "double", 64, Float),
                row(Primitive::Bool, "Bool", "bool", 8, Bool),
                row(Primitive::Void, "Void", "void", 0, Void),
            ],
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&PrimitiveInfo> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn info(&self, primitive: Primitive) -> &PrimitiveInfo {
        // Every Primitive variant has a row in `standard()`.
        self.entries
            .iter()
            .find(|e| e.primitive == primitive)
            .unwrap_or(&self.entries[2])
    }

    pub fn c_name(&self, primitive: Primitive) -> &'static str {
        self.info(primitive).c_name
    }

    /// Inclusive value range for integer primitives.
    pub fn int_range(&self, primitive: Primitive) -> Option<(i128, i128)> {
        let info = self.info(primitive);
        match info.class {
            PrimitiveClass::Signed => {
                let max = (1i128 << (info.bits - 1)) - 1;
                Some((-max - 1, max))
            }
            PrimitiveClass::Unsigned => Some((0, (1i128 << info.bits) - 1)),
            _ => None,
        }
    }

    pub fn is_integer(&self, primitive: Primitive) -> bool {
        matches!(
            self.info(primitive).class,
            PrimitiveClass::Signed | PrimitiveClass::Unsigned
        )
    }

    pub fn is_numeric(&self, primitive: Primitive) -> bool {
        self.is_integer(primitive) || self.info(primitive).class == PrimitiveClass::Float
    }
}

/// An array dimension after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayDim {
    Known(u64),
    /// Length parameter of a generic template, not yet substituted.
    Param(String),
}

/// Represents the types of values and expressions in Magma.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(Primitive),
    Pointer {
        target: Box<TypeRef>,
        mutable: bool,
    },
    Array {
        element: Box<TypeRef>,
        dims: Vec<ArrayDim>,
    },
    /// NUL-terminated C string, used with `extern` functions.
    CStr,
    /// Type parameter inside a template signature.
    Generic(String),
    /// Struct instance; `args` are concrete for instantiated generics.
    Named {
        name: String,
        args: Vec<TypeRef>,
    },
    Function {
        params: Vec<TypeRef>,
        ret: Box<TypeRef>,
    },
    /// Tagged union. `name` is set for `type X = A | B;` declarations.
    Union {
        name: Option<String>,
        members: Vec<TypeRef>,
    },
}

impl TypeRef {
    pub const I32: TypeRef = TypeRef::Primitive(Primitive::I32);
    pub const U8: TypeRef = TypeRef::Primitive(Primitive::U8);
    pub const USIZE: TypeRef = TypeRef::Primitive(Primitive::USize);
    pub const BOOL: TypeRef = TypeRef::Primitive(Primitive::Bool);
    pub const VOID: TypeRef = TypeRef::Primitive(Primitive::Void);

    pub fn pointer(target: TypeRef, mutable: bool) -> TypeRef {
        TypeRef::Pointer {
            target: Box::new(target),
            mutable,
        }
    }

    pub fn array(element: TypeRef, dims: Vec<u64>) -> TypeRef {
        TypeRef::Array {
            element: Box::new(element),
            dims: dims.into_iter().map(ArrayDim::Known).collect(),
        }
    }

    pub fn struct_named(name: impl Into<String>, args: Vec<TypeRef>) -> TypeRef {
        TypeRef::Named {
            name: name.into(),
            args,
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, TypeRef::Primitive(Primitive::Bool))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Primitive(Primitive::Void))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeRef::Pointer { .. })
    }

    /// Type after one index operation on an array type.
    pub fn index_result(&self) -> Option<TypeRef> {
        match self {
            TypeRef::Array { element, dims } if dims.len() > 1 => Some(TypeRef::Array {
                element: element.clone(),
                dims: dims[1..].to_vec(),
            }),
            TypeRef::Array { element, .. } => Some((**element).clone()),
            _ => None,
        }
    }

    /// First dimension of an array type, when known.
    pub fn outer_len(&self) -> Option<u64> {
        match self {
            TypeRef::Array { dims, .. } => match dims.first() {
                Some(ArrayDim::Known(n)) => Some(*n),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether a value of type `self` may be stored where `target` is
    /// expected. Only pointer mutability may be weakened; everything
    /// else must match exactly.
    pub fn assignable_to(&self, target: &TypeRef) -> bool {
        match (self, target) {
            (
                TypeRef::Pointer {
                    target: from,
                    mutable: from_mut,
                },
                TypeRef::Pointer {
                    target: to,
                    mutable: to_mut,
                },
            ) => from == to && (*from_mut || !*to_mut),
            _ => self == target,
        }
    }

    pub fn contains_generic(&self) -> bool {
        match self {
            TypeRef::Generic(_) => true,
            TypeRef::Primitive(_) | TypeRef::CStr => false,
            TypeRef::Pointer { target, .. } => target.contains_generic(),
            TypeRef::Array { element, dims } => {
                element.contains_generic() || dims.iter().any(|d| matches!(d, ArrayDim::Param(_)))
            }
            TypeRef::Named { args, .. } => args.iter().any(TypeRef::contains_generic),
            TypeRef::Function { params, ret } => {
                params.iter().any(TypeRef::contains_generic) || ret.contains_generic()
            }
            TypeRef::Union { members, .. } => members.iter().any(TypeRef::contains_generic),
        }
    }

    /// Name fragment used when building specialization symbols.
    pub fn mangle(&self) -> String {
        match self {
            TypeRef::Primitive(p) => primitive_name(*p).to_string(),
            TypeRef::Pointer { target, mutable } => {
                let prefix = if *mutable { "PtrMut" } else { "Ptr" };
                format!("{prefix}{}", target.mangle())
            }
            TypeRef::Array { element, dims } => {
                let dims: Vec<String> = dims.iter().map(dim_text).collect();
                format!("Arr{}x{}", element.mangle(), dims.join("x"))
            }
            TypeRef::CStr => "CStr".to_string(),
            TypeRef::Generic(name) => name.clone(),
            TypeRef::Named { name, args } => {
                if args.is_empty() {
                    name.clone()
                } else {
                    let parts: Vec<String> = args.iter().map(TypeRef::mangle).collect();
                    format!("{name}_{}", parts.join("_"))
                }
            }
            TypeRef::Function { params, ret } => {
                let parts: Vec<String> = params.iter().map(TypeRef::mangle).collect();
                format!("Fn{}To{}", parts.join(""), ret.mangle())
            }
            TypeRef::Union { name: Some(name), .. } => name.clone(),
            TypeRef::Union {
                name: None,
                members,
            } => {
                let parts: Vec<String> = members.iter().map(TypeRef::mangle).collect();
                format!("Union_{}", parts.join("_"))
            }
        }
    }
}

fn dim_text(dim: &ArrayDim) -> String {
    match dim {
        ArrayDim::Known(n) => n.to_string(),
        ArrayDim::Param(name) => name.clone(),
    }
}

pub fn primitive_name(primitive: Primitive) -> &'static str {
    match primitive {
        Primitive::I8 => "I8",
        Primitive::I16 => "I16",
        Primitive::I32 => "I32",
        Primitive::I64 => "I64",
        Primitive::U8 => "U8",
        Primitive::U16 => "U16",
        Primitive::U32 => "U32",
        Primitive::U64 => "U64",
        Primitive::USize => "USize",
        Primitive::F32 => "F32",
        Primitive::F64 => "F64",
        Primitive::Bool => "Bool",
        Primitive::Void => "Void",
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(p) => f.write_str(primitive_name(*p)),
            TypeRef::Pointer { target, mutable } => {
                if *mutable {
                    write!(f, "*mut {target}")
                } else {
                    write!(f, "*{target}")
                }
            }
            TypeRef::Array { element, dims } => {
                let dims: Vec<String> = dims.iter().map(dim_text).collect();
                write!(f, "[{element}; {}]", dims.join(", "))
            }
            TypeRef::CStr => f.write_str("CStr"),
            TypeRef::Generic(name) => f.write_str(name),
            TypeRef::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                    write!(f, "<{}>", args.join(", "))?;
                }
                Ok(())
            }
            TypeRef::Function { params, ret } => {
                let params: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "({}) => {ret}", params.join(", "))
            }
            TypeRef::Union { name: Some(name), .. } => f.write_str(name),
            TypeRef::Union {
                name: None,
                members,
            } => {
                let members: Vec<String> = members.iter().map(ToString::to_string).collect();
                f.write_str(&members.join(" | "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_ranges_follow_width_and_signedness() {
        let table = PrimitiveTable::standard();
        assert_eq!(table.int_range(Primitive::I8), Some((-128, 127)));
        assert_eq!(table.int_range(Primitive::U8), Some((0, 255)));
        assert_eq!(
            table.int_range(Primitive::U64),
            Some((0, u64::MAX as i128))
        );
        assert_eq!(table.int_range(Primitive::Bool), None);
    }

    #[test]
    fn pointer_mutability_may_only_be_weakened() {
        let mut_ptr = TypeRef::pointer(TypeRef::I32, true);
        let ptr = TypeRef::pointer(TypeRef::I32, false);
        assert!(mut_ptr.assignable_to(&ptr));
        assert!(!ptr.assignable_to(&mut_ptr));
        assert!(!TypeRef::I32.assignable_to(&TypeRef::U8));
    }

    #[test]
    fn displays_source_spelling() {
        let ty = TypeRef::array(TypeRef::U8, vec![2, 3]);
        assert_eq!(ty.to_string(), "[U8; 2, 3]");
        let ty = TypeRef::struct_named("Wrapper", vec![TypeRef::I32]);
        assert_eq!(ty.to_string(), "Wrapper<I32>");
        assert_eq!(ty.mangle(), "Wrapper_I32");
    }

    #[test]
    fn index_result_peels_one_dimension() {
        let ty = TypeRef::array(TypeRef::I32, vec![2, 3]);
        assert_eq!(ty.index_result(), Some(TypeRef::array(TypeRef::I32, vec![3])));
        assert_eq!(
            TypeRef::array(TypeRef::I32, vec![3]).index_result(),
            Some(TypeRef::I32)
        );
    }
}
