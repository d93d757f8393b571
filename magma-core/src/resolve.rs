//! Type resolver: literal typing, annotation resolution and operand
//! compatibility.
//!
//! Literal rules:
//! * an integer suffix (`I8` … `U64`, `USize`) fixes width and signedness
//!   and is stripped from the emitted value;
//! * an unsuffixed integer has no type of its own until context gives it
//!   one, defaulting to `I32`;
//! * a decimal point makes a float (`F32` unless suffixed `F64`);
//! * `true`/`false` in any letter case are `Bool`;
//! * a quoted character is a `U8` holding its ordinal.

use crate::ast::{BinaryOp, Dim, TypeExpr, TypeExprKind};
use crate::error::CoreError;
use crate::span::Span;
use crate::types::{ArrayDim, Primitive, PrimitiveClass, PrimitiveTable, TypeRef};

/// An integer literal split into value and optional suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLiteral {
    pub value: i128,
    pub suffix: Option<Primitive>,
}

pub fn resolve_int(
    table: &PrimitiveTable,
    text: &str,
    span: Span,
) -> Result<IntLiteral, CoreError> {
    let literal = parse_int(table, text, span)?;
    if let Some(primitive) = literal.suffix {
        check_range(table, literal.value, primitive, span)?;
    }
    Ok(literal)
}

/// Resolves `-<text>` as a single value, so a signed suffix admits its
/// minimum. `None` when the literal has no signed suffix.
pub fn resolve_negated_int(
    table: &PrimitiveTable,
    text: &str,
    span: Span,
) -> Result<Option<IntLiteral>, CoreError> {
    let literal = parse_int(table, text, span)?;
    let Some(primitive) = literal.suffix else {
        return Ok(None);
    };
    if table.info(primitive).class != PrimitiveClass::Signed {
        return Ok(None);
    }
    let value = -literal.value;
    check_range(table, value, primitive, span)?;
    Ok(Some(IntLiteral {
        value,
        suffix: literal.suffix,
    }))
}

fn parse_int(table: &PrimitiveTable, text: &str, span: Span) -> Result<IntLiteral, CoreError> {
    let digits_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '_'))
        .unwrap_or(text.len());
    let (digits, suffix_text) = text.split_at(digits_end);
    let digits = digits.replace('_', "");

    let suffix = if suffix_text.is_empty() {
        None
    } else {
        let info = table
            .by_name(suffix_text)
            .filter(|info| {
                matches!(info.class, PrimitiveClass::Signed | PrimitiveClass::Unsigned)
            })
            .ok_or_else(|| {
                CoreError::syntax(span, format!("unknown integer suffix '{suffix_text}'"))
            })?;
        Some(info.primitive)
    };

    let value: i128 = digits
        .parse()
        .map_err(|_| CoreError::range(span, format!("integer literal '{text}' is too large")))?;
    Ok(IntLiteral { value, suffix })
}

/// Float literal text without suffix, plus its type.
pub fn resolve_float(
    table: &PrimitiveTable,
    text: &str,
    span: Span,
) -> Result<(String, Primitive), CoreError> {
    let number_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '_' || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(number_end);
    let primitive = match suffix {
        "" => Primitive::F32,
        _ => table
            .by_name(suffix)
            .filter(|info| info.class == PrimitiveClass::Float)
            .map(|info| info.primitive)
            .ok_or_else(|| CoreError::syntax(span, format!("unknown float suffix '{suffix}'")))?,
    };
    Ok((number.replace('_', ""), primitive))
}

/// Value of a character literal (content between the quotes).
pub fn resolve_char(content: &str, span: Span) -> Result<u8, CoreError> {
    let bytes = decode_escapes(content)
        .map_err(|bad| CoreError::syntax(span, format!("invalid escape sequence '\\{bad}'")))?;
    match bytes.as_slice() {
        [byte] => Ok(*byte),
        _ => Err(CoreError::syntax(
            span,
            "character literal must contain exactly one character",
        )),
    }
}

/// Process `\n \t \r \' \" \\ \0`. Any other escape yields the offending
/// character as the error.
pub fn decode_escapes(content: &str) -> Result<Vec<u8>, char> {
    let mut out = Vec::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let escaped = chars.next().unwrap_or('\\');
        out.push(match escaped {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            '\'' => b'\'',
            '"' => b'"',
            '\\' => b'\\',
            '0' => 0,
            other => return Err(other),
        });
    }
    Ok(out)
}

pub fn check_range(
    table: &PrimitiveTable,
    value: i128,
    primitive: Primitive,
    span: Span,
) -> Result<(), CoreError> {
    let Some((min, max)) = table.int_range(primitive) else {
        return Err(CoreError::type_error(
            span,
            format!("integer literal cannot have type {}", TypeRef::Primitive(primitive)),
        ));
    };
    if value < min || value > max {
        return Err(CoreError::range(
            span,
            format!(
                "value {value} is out of range for {} ({min}..={max})",
                TypeRef::Primitive(primitive)
            ),
        ));
    }
    Ok(())
}

/// Contract-level literal resolution over raw literal text:
/// returns the literal's own type and the canonical emitted text.
/// Unsuffixed integers report their default type `I32`.
pub fn resolve_literal(
    table: &PrimitiveTable,
    text: &str,
    span: Span,
) -> Result<(TypeRef, String), CoreError> {
    if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
        return Ok((TypeRef::BOOL, text.to_ascii_lowercase()));
    }
    if let Some(content) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let byte = resolve_char(content, span)?;
        return Ok((TypeRef::U8, byte.to_string()));
    }
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        if text.contains('.') {
            let (number, primitive) = resolve_float(table, text, span)?;
            return Ok((TypeRef::Primitive(primitive), number));
        }
        let literal = resolve_int(table, text, span)?;
        let primitive = literal.suffix.unwrap_or(Primitive::I32);
        check_range(table, literal.value, primitive, span)?;
        return Ok((TypeRef::Primitive(primitive), literal.value.to_string()));
    }
    Err(CoreError::syntax(span, format!("'{text}' is not a literal")))
}

/// Result type of a binary operator, or a type error.
pub fn check_binary(
    table: &PrimitiveTable,
    op: BinaryOp,
    left: &TypeRef,
    right: &TypeRef,
    span: Span,
) -> Result<TypeRef, CoreError> {
    let symbol = op.symbol();
    if op.is_logical() {
        if left.is_bool() && right.is_bool() {
            return Ok(TypeRef::BOOL);
        }
        return Err(CoreError::type_error(
            span,
            format!("'{symbol}' requires Bool operands, found {left} and {right}"),
        ));
    }

    if op.is_ordering() && (left.is_bool() || right.is_bool()) {
        return Err(CoreError::type_error(
            span,
            format!("ordering comparison '{symbol}' is not defined for Bool"),
        ));
    }

    if left != right {
        return Err(CoreError::type_error(
            span,
            format!("mismatched operand types {left} and {right} for '{symbol}'"),
        ));
    }

    let numeric = left.primitive().is_some_and(|p| table.is_numeric(p));
    if op.is_arithmetic() {
        if numeric {
            return Ok(left.clone());
        }
        return Err(CoreError::type_error(
            span,
            format!("arithmetic '{symbol}' is not defined for {left}"),
        ));
    }

    let comparable = if op.is_equality() {
        numeric || left.is_bool() || left.is_pointer()
    } else {
        numeric
    };
    if comparable {
        Ok(TypeRef::BOOL)
    } else {
        Err(CoreError::type_error(
            span,
            format!("comparison '{symbol}' is not defined for {left}"),
        ))
    }
}

/// Name resolution needed while resolving annotations.
///
/// The checker implements this: it knows type parameters in scope,
/// aliases, unions and struct templates (instantiating generic structs on
/// demand).
pub trait TypeEnv {
    fn primitives(&self) -> &PrimitiveTable;

    fn resolve_named(
        &mut self,
        name: &str,
        args: Vec<TypeRef>,
        span: Span,
    ) -> Result<TypeRef, CoreError>;

    /// Value of a length parameter used as an array dimension.
    fn resolve_length(&mut self, name: &str, span: Span) -> Result<ArrayDim, CoreError>;

    /// Called for every inline `A | B` annotation.
    fn anonymous_union(&mut self, members: Vec<TypeRef>) -> TypeRef {
        TypeRef::Union {
            name: None,
            members,
        }
    }
}

pub fn resolve_annotation(env: &mut impl TypeEnv, ty: &TypeExpr) -> Result<TypeRef, CoreError> {
    match &ty.kind {
        TypeExprKind::Named { name, args } => {
            if let Some(info) = env.primitives().by_name(name) {
                if !args.is_empty() {
                    return Err(CoreError::type_error(
                        ty.span,
                        format!("primitive type {name} takes no type arguments"),
                    ));
                }
                return Ok(TypeRef::Primitive(info.primitive));
            }
            if name == "CStr" && args.is_empty() {
                return Ok(TypeRef::CStr);
            }
            let args = args
                .iter()
                .map(|arg| resolve_annotation(env, arg))
                .collect::<Result<Vec<_>, _>>()?;
            env.resolve_named(name, args, ty.span)
        }
        TypeExprKind::Pointer { mutable, target } => {
            if matches!(target.kind, TypeExprKind::Pointer { .. }) {
                return Err(CoreError::type_error(
                    ty.span,
                    "pointers to pointers are not supported",
                ));
            }
            let target = resolve_annotation(env, target)?;
            Ok(TypeRef::pointer(target, *mutable))
        }
        TypeExprKind::Array { element, dims } => {
            let element = resolve_annotation(env, element)?;
            if element.is_void() {
                return Err(CoreError::array(ty.span, "array of Void"));
            }
            let mut resolved = Vec::with_capacity(dims.len());
            for dim in dims {
                resolved.push(match dim {
                    Dim::Size(size) if *size >= 1 => ArrayDim::Known(*size as u64),
                    Dim::Size(size) => {
                        return Err(CoreError::array(
                            ty.span,
                            format!("array dimension must be positive, found {size}"),
                        ));
                    }
                    Dim::Param(ident) => env.resolve_length(&ident.name, ident.span)?,
                });
            }
            Ok(TypeRef::Array {
                element: Box::new(element),
                dims: resolved,
            })
        }
        TypeExprKind::Function { params, ret } => {
            let params = params
                .iter()
                .map(|p| resolve_annotation(env, p))
                .collect::<Result<Vec<_>, _>>()?;
            let ret = resolve_annotation(env, ret)?;
            Ok(TypeRef::Function {
                params,
                ret: Box::new(ret),
            })
        }
        TypeExprKind::Union(members) => {
            let members = resolve_union_members(env, members, ty.span)?;
            Ok(env.anonymous_union(members))
        }
    }
}

/// Resolve union members, rejecting duplicates and fewer than two members.
pub fn resolve_union_members(
    env: &mut impl TypeEnv,
    members: &[TypeExpr],
    span: Span,
) -> Result<Vec<TypeRef>, CoreError> {
    let mut resolved: Vec<TypeRef> = Vec::with_capacity(members.len());
    for member in members {
        let ty = resolve_annotation(env, member)?;
        if ty.is_void() || matches!(ty, TypeRef::Union { .. }) {
            return Err(CoreError::type_error(
                member.span,
                format!("{ty} cannot be a union member"),
            ));
        }
        if resolved.contains(&ty) {
            return Err(CoreError::type_error(
                member.span,
                format!("duplicate union member {ty}"),
            ));
        }
        resolved.push(ty);
    }
    if resolved.len() < 2 {
        return Err(CoreError::type_error(
            span,
            "a union needs at least two distinct members",
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PrimitiveTable {
        PrimitiveTable::standard()
    }

    #[test]
    fn every_suffix_resolves_and_is_stripped() {
        let table = table();
        for (suffix, c_name) in [
            ("I8", "int8_t"),
            ("I16", "int16_t"),
            ("I32", "int32_t"),
            ("I64", "int64_t"),
            ("U8", "uint8_t"),
            ("U16", "uint16_t"),
            ("U32", "uint32_t"),
            ("U64", "uint64_t"),
        ] {
            let (ty, text) =
                resolve_literal(&table, &format!("100{suffix}"), Span::default()).expect(suffix);
            assert_eq!(text, "100");
            assert_eq!(table.c_name(ty.primitive().unwrap()), c_name);
        }
    }

    #[test]
    fn negated_literals_reach_the_signed_minimum() {
        let table = table();
        let literal = resolve_negated_int(&table, "128I8", Span::default())
            .unwrap()
            .unwrap();
        assert_eq!(literal.value, -128);
        assert!(matches!(
            resolve_negated_int(&table, "129I8", Span::default()),
            Err(CoreError::Range { .. })
        ));
        assert!(resolve_negated_int(&table, "5U8", Span::default()).unwrap().is_none());
        assert!(resolve_negated_int(&table, "5", Span::default()).unwrap().is_none());
    }

    #[test]
    fn unsuffixed_defaults_to_i32() {
        let (ty, text) = resolve_literal(&table(), "42", Span::default()).unwrap();
        assert_eq!(ty, TypeRef::I32);
        assert_eq!(text, "42");
    }

    #[test]
    fn suffixed_value_out_of_range_is_range_error() {
        let err = resolve_literal(&table(), "256U8", Span::default()).unwrap_err();
        assert!(matches!(err, CoreError::Range { .. }));
    }

    #[test]
    fn decimal_point_means_float() {
        let (ty, text) = resolve_literal(&table(), "1.5", Span::default()).unwrap();
        assert_eq!(ty, TypeRef::Primitive(Primitive::F32));
        assert_eq!(text, "1.5");
    }

    #[test]
    fn booleans_are_normalized() {
        let (ty, text) = resolve_literal(&table(), "TRUE", Span::default()).unwrap();
        assert_eq!(ty, TypeRef::BOOL);
        assert_eq!(text, "true");
    }

    #[test]
    fn char_literal_is_u8_ordinal() {
        let (ty, text) = resolve_literal(&table(), "'a'", Span::default()).unwrap();
        assert_eq!(ty, TypeRef::U8);
        assert_eq!(text, "97");
        assert_eq!(resolve_char("\\n", Span::default()).unwrap(), b'\n');
    }

    #[test]
    fn rejects_unknown_escape() {
        assert_eq!(decode_escapes("a\\qb"), Err('q'));
        assert_eq!(decode_escapes("a\\0").unwrap(), vec![b'a', 0]);
    }

    #[test]
    fn arithmetic_needs_identical_types() {
        let table = table();
        let i32_ty = TypeRef::I32;
        let i64_ty = TypeRef::Primitive(Primitive::I64);
        assert_eq!(
            check_binary(&table, BinaryOp::Add, &i32_ty, &i32_ty, Span::default()).unwrap(),
            i32_ty
        );
        let err = check_binary(&table, BinaryOp::Add, &i32_ty, &i64_ty, Span::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn bool_equality_allowed_ordering_rejected() {
        let table = table();
        let b = TypeRef::BOOL;
        assert_eq!(
            check_binary(&table, BinaryOp::Eq, &b, &b, Span::default()).unwrap(),
            TypeRef::BOOL
        );
        assert!(check_binary(&table, BinaryOp::Lt, &b, &b, Span::default()).is_err());
        assert_eq!(
            check_binary(&table, BinaryOp::Ge, &TypeRef::U8, &TypeRef::U8, Span::default())
                .unwrap(),
            TypeRef::BOOL
        );
    }
}
