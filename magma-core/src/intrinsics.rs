//! Host-provided intrinsics visible at the Magma language level.
//!
//! Intrinsics can be called without any declaration. An explicit
//! `intrinsic fn` declaration is allowed but must match the table entry.
//! The C emitter maps a used intrinsic to its helper definition in
//! program mode; the interpreter executes it directly.

use crate::types::{Primitive, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    /// Reads one integer from standard input.
    ReadInt,
    /// Prints an integer followed by a newline.
    PrintInt,
    /// Writes a single byte.
    PrintChar,
}

/// Metadata about a single intrinsic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intrinsic {
    pub name: &'static str,
    pub params: &'static [Primitive],
    pub ret: Primitive,
    pub kind: IntrinsicKind,
    /// C definition emitted in program mode. Needs `<stdio.h>`.
    pub c_helper: &'static str,
}

impl Intrinsic {
    pub fn param_types(&self) -> Vec<TypeRef> {
        self.params.iter().copied().map(TypeRef::Primitive).collect()
    }

    pub fn ret_type(&self) -> TypeRef {
        TypeRef::Primitive(self.ret)
    }
}

pub const INTRINSICS: &[Intrinsic] = &[
    Intrinsic {
        name: "readInt",
        params: &[],
        ret: Primitive::I32,
        kind: IntrinsicKind::ReadInt,
        c_helper: "int32_t readInt(void) { int value = 0; if (scanf(\"%d\", &value) != 1) { return 0; } return (int32_t) value; }",
    },
    Intrinsic {
        name: "printInt",
        params: &[Primitive::I32],
        ret: Primitive::Void,
        kind: IntrinsicKind::PrintInt,
        c_helper: "void printInt(int32_t value) { printf(\"%d\\n\", (int) value); }",
    },
    Intrinsic {
        name: "printChar",
        params: &[Primitive::U8],
        ret: Primitive::Void,
        kind: IntrinsicKind::PrintChar,
        c_helper: "void printChar(uint8_t value) { putchar(value); }",
    },
];

/// Look up an intrinsic by its Magma-level name.
pub fn find_intrinsic(name: &str) -> Option<&'static Intrinsic> {
    INTRINSICS.iter().find(|i| i.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_intrinsics() {
        let read = find_intrinsic("readInt").expect("readInt");
        assert_eq!(read.ret_type(), TypeRef::I32);
        assert!(read.param_types().is_empty());
        assert_eq!(
            find_intrinsic("printChar").map(|i| i.param_types()),
            Some(vec![TypeRef::U8])
        );
        assert!(find_intrinsic("print_i32").is_none());
    }

    #[test]
    fn helpers_define_their_own_name() {
        for intrinsic in INTRINSICS {
            assert!(intrinsic.c_helper.contains(intrinsic.name));
        }
    }
}
