//! C backend.
//!
//! Renders a checked [`HirProgram`] as C source. The include block comes
//! first, one directive per line; everything after it is a single line of
//! tokens joined by spaces:
//!
//! ```c
//! #include <stdint.h>
//! struct Wrapper_I32 { int32_t value; }; int32_t x = 100;
//! ```
//!
//! Item order is structs, specializations, functions, top-level
//! statements. A function that calls something defined further down gets
//! a prototype emitted right before it.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::UnaryOp;
use crate::hir::*;
use crate::intrinsics::Intrinsic;
use crate::types::{ArrayDim, Primitive, PrimitiveTable, TypeRef};

/// What kind of C unit to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmitMode {
    /// Top-level statements at file scope, the result as a bare
    /// expression statement.
    #[default]
    Fragment,
    /// A standalone program: intrinsic helpers plus `int main(void)`.
    Program,
}

pub fn emit_c(program: &HirProgram, table: &PrimitiveTable, mode: EmitMode) -> String {
    let mut emitter = CEmitter::new(table, mode, program);
    emitter.emit_program(program);
    let includes = includes(program, mode);
    debug!(
        parts = emitter.parts.len(),
        includes = includes.len(),
        ?mode,
        "emitted C"
    );
    let mut out = includes.join("\n");
    if !emitter.parts.is_empty() {
        out.push('\n');
        out.push_str(&emitter.parts.join(" "));
    }
    if mode == EmitMode::Program {
        out.push('\n');
    }
    out
}

fn includes(program: &HirProgram, mode: EmitMode) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    visit_program_types(program, &mut |ty| collect_primitives(ty, &mut seen));

    let mut includes = vec!["#include <stdint.h>"];
    if seen.contains(&Primitive::Bool) {
        includes.push("#include <stdbool.h>");
    }
    if seen.contains(&Primitive::USize) {
        includes.push("#include <stddef.h>");
    }
    if mode == EmitMode::Program && !program.intrinsics.is_empty() {
        includes.push("#include <stdio.h>");
    }
    includes
}

struct CEmitter<'a> {
    table: &'a PrimitiveTable,
    mode: EmitMode,
    parts: Vec<String>,
    /// Prototype of every function and extern the unit defines.
    prototypes: HashMap<String, String>,
    declared: HashSet<String>,
}

impl<'a> CEmitter<'a> {
    fn new(table: &'a PrimitiveTable, mode: EmitMode, program: &HirProgram) -> Self {
        let mut emitter = CEmitter {
            table,
            mode,
            parts: Vec::new(),
            prototypes: HashMap::new(),
            declared: HashSet::new(),
        };
        let items = program
            .structs
            .iter()
            .chain(&program.specializations)
            .chain(&program.functions);
        for item in items {
            let prototype = match item {
                HirItem::Function(function) => emitter.function_header(function),
                HirItem::Extern(ext) => emitter.extern_header(ext),
                HirItem::Struct(_) | HirItem::Union(_) => continue,
            };
            emitter
                .prototypes
                .insert(item.c_name().to_string(), format!("{prototype};"));
        }
        emitter
    }

    fn emit_program(&mut self, program: &HirProgram) {
        if self.mode == EmitMode::Program {
            for intrinsic in &program.intrinsics {
                self.parts.push(intrinsic.c_helper.to_string());
            }
        }
        for item in program
            .structs
            .iter()
            .chain(&program.specializations)
            .chain(&program.functions)
        {
            self.emit_item(item);
        }

        match self.mode {
            EmitMode::Fragment => {
                for stmt in &program.statements {
                    let stmt = self.stmt(stmt);
                    self.parts.push(stmt);
                }
                if let Some(result) = &program.result {
                    let result = format!("{};", self.expr(result));
                    self.parts.push(result);
                }
            }
            EmitMode::Program => {
                let mut body: Vec<String> =
                    program.statements.iter().map(|s| self.stmt(s)).collect();
                let result = match &program.result {
                    Some(result) => format!("return {};", self.expr(result)),
                    None => "return 0;".to_string(),
                };
                body.push(result);
                self.parts
                    .push(format!("int main(void) {{ {} }}", body.join(" ")));
            }
        }
    }

    fn emit_item(&mut self, item: &HirItem) {
        match item {
            HirItem::Struct(def) => {
                let fields: Vec<String> = def
                    .fields
                    .iter()
                    .map(|(name, ty)| format!("{};", self.declarator(ty, name)))
                    .collect();
                self.parts.push(braced(&format!("struct {}", def.c_name), &fields, ";"));
            }
            HirItem::Union(def) => {
                let members: Vec<String> = def
                    .members
                    .iter()
                    .enumerate()
                    .map(|(tag, ty)| format!("{};", self.declarator(ty, &format!("_{tag}"))))
                    .collect();
                self.parts.push(format!(
                    "struct {} {{ uint8_t tag; union {{ {} }} value; }};",
                    def.c_name,
                    members.join(" ")
                ));
            }
            HirItem::Extern(ext) => {
                if self.declared.insert(ext.c_name.clone()) {
                    let header = self.extern_header(ext);
                    self.parts.push(format!("{header};"));
                }
            }
            HirItem::Function(function) => {
                self.declared.insert(function.c_name.clone());
                let mut callees = Vec::new();
                for stmt in &function.body {
                    stmt_callees(stmt, &mut callees);
                }
                for callee in callees {
                    if self.declared.contains(&callee) {
                        continue;
                    }
                    if let Some(prototype) = self.prototypes.get(&callee).cloned() {
                        self.declared.insert(callee);
                        self.parts.push(prototype);
                    }
                }
                let header = self.function_header(function);
                let body = self.body(&function.body);
                self.parts.push(format!("{header} {body}"));
            }
        }
    }

    fn function_header(&self, function: &HirFunction) -> String {
        let params: Vec<String> = function
            .params
            .iter()
            .map(|(name, ty)| self.declarator(ty, name))
            .collect();
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        self.declarator(&function.ret, &format!("{}({params})", function.c_name))
    }

    fn extern_header(&self, ext: &HirExtern) -> String {
        let params: Vec<String> = ext
            .params
            .iter()
            .map(|ty| self.declarator(ty, ""))
            .collect();
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        format!(
            "extern {}",
            self.declarator(&ext.ret, &format!("{}({params})", ext.c_name))
        )
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn base_name(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Primitive(p) => self.table.c_name(*p).to_string(),
            TypeRef::CStr => "const char*".to_string(),
            TypeRef::Named { .. } | TypeRef::Union { .. } => format!("struct {}", ty.mangle()),
            // Unreachable after monomorphization.
            TypeRef::Generic(name) => name.clone(),
            TypeRef::Pointer { .. } | TypeRef::Array { .. } | TypeRef::Function { .. } => {
                self.declarator(ty, "")
            }
        }
    }

    /// C declaration of `name` with type `ty`; an empty name gives the
    /// abstract declarator used in casts and prototypes.
    fn declarator(&self, ty: &TypeRef, name: &str) -> String {
        match ty {
            TypeRef::Pointer { target, .. } => match &**target {
                TypeRef::Array { .. } | TypeRef::Function { .. } => {
                    self.declarator(target, &format!("(*{name})"))
                }
                _ => join_declarator(&format!("{}*", self.base_name(target)), name),
            },
            TypeRef::Array { element, dims } => {
                let dims: String = dims
                    .iter()
                    .map(|dim| match dim {
                        ArrayDim::Known(n) => format!("[{n}]"),
                        ArrayDim::Param(p) => format!("[{p}]"),
                    })
                    .collect();
                self.declarator(element, &format!("{name}{dims}"))
            }
            TypeRef::Function { params, ret } => {
                let params: Vec<String> = params.iter().map(|p| self.declarator(p, "")).collect();
                let params = if params.is_empty() {
                    "void".to_string()
                } else {
                    params.join(", ")
                };
                self.declarator(ret, &format!("(*{name})({params})"))
            }
            _ => join_declarator(&self.base_name(ty), name),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn body(&self, stmts: &[HirStmt]) -> String {
        if stmts.is_empty() {
            return "{}".to_string();
        }
        let parts: Vec<String> = stmts.iter().map(|s| self.stmt(s)).collect();
        format!("{{ {} }}", parts.join(" "))
    }

    fn stmt(&self, stmt: &HirStmt) -> String {
        match stmt {
            HirStmt::Let { name, ty, init } => {
                format!("{} = {};", self.declarator(ty, name), self.initializer(init))
            }
            HirStmt::Assign { target, value } => {
                format!("{} = {};", self.expr(target), self.expr(value))
            }
            HirStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let mut out = format!("if ({}) {}", self.condition(cond), self.body(then_body));
                match else_body.as_deref() {
                    Some([nested @ HirStmt::If { .. }]) => {
                        out.push_str(" else ");
                        out.push_str(&self.stmt(nested));
                    }
                    Some(body) => {
                        out.push_str(" else ");
                        out.push_str(&self.body(body));
                    }
                    None => {}
                }
                out
            }
            HirStmt::While { cond, body } => {
                format!("while ({}) {}", self.condition(cond), self.body(body))
            }
            HirStmt::Return(Some(value)) => format!("return {};", self.expr(value)),
            HirStmt::Return(None) => "return;".to_string(),
            HirStmt::Block(stmts) => self.body(stmts),
            HirStmt::Expr(expr) => format!("{};", self.expr(expr)),
        }
    }

    fn condition(&self, cond: &HirExpr) -> String {
        match &cond.kind {
            HirExprKind::Paren(inner) => self.expr(inner),
            _ => self.expr(cond),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Brace initializer for aggregates, plain expression otherwise.
    fn initializer(&self, expr: &HirExpr) -> String {
        match &expr.kind {
            HirExprKind::Array(items) | HirExprKind::StructLit(items) => {
                let items: Vec<String> = items.iter().map(|i| self.initializer(i)).collect();
                if items.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", items.join(", "))
                }
            }
            HirExprKind::UnionLit { tag, value } => {
                format!("{{ {tag}, {{ ._{tag} = {} }} }}", self.initializer(value))
            }
            _ => self.expr(expr),
        }
    }

    fn expr(&self, expr: &HirExpr) -> String {
        match &expr.kind {
            HirExprKind::Int(value) => int_literal(*value, &expr.ty),
            HirExprKind::Float(text) => text.clone(),
            HirExprKind::Bool(value) => value.to_string(),
            HirExprKind::Char(byte) => char_literal(*byte),
            HirExprKind::CString(bytes) => string_literal(bytes),
            HirExprKind::Var(name) | HirExprKind::FnRef(name) => name.clone(),
            HirExprKind::Array(_) | HirExprKind::StructLit(_) | HirExprKind::UnionLit { .. } => {
                format!("({}){}", self.declarator(&expr.ty, ""), self.initializer(expr))
            }
            HirExprKind::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                format!("{symbol}{}", self.operand(operand))
            }
            HirExprKind::AddrOf(operand) => format!("&{}", self.operand(operand)),
            HirExprKind::Deref(operand) => format!("*{}", self.operand(operand)),
            HirExprKind::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.expr(lhs), op.symbol(), self.expr(rhs))
            }
            HirExprKind::Call { callee, args } => {
                let name = match callee {
                    Callee::Function(name) | Callee::Local(name) => name.as_str(),
                    Callee::Intrinsic(intrinsic) => intrinsic.name,
                };
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("{name}({})", args.join(", "))
            }
            HirExprKind::Field {
                base,
                name,
                through_pointer,
                ..
            } => {
                let access = if *through_pointer { "->" } else { "." };
                format!("{}{access}{name}", self.operand(base))
            }
            HirExprKind::Index { base, index } => {
                format!("{}[{}]", self.operand(base), self.expr(index))
            }
            HirExprKind::Is { operand, tag } => {
                format!("{}.tag == {tag}", self.operand(operand))
            }
            HirExprKind::Paren(inner) => format!("({})", self.expr(inner)),
        }
    }

    /// Operand of a prefix or postfix operator.
    fn operand(&self, expr: &HirExpr) -> String {
        let text = self.expr(expr);
        let needs_parens = match &expr.kind {
            HirExprKind::Binary { .. } | HirExprKind::Is { .. } => true,
            HirExprKind::Unary { .. } | HirExprKind::AddrOf(_) | HirExprKind::Deref(_) => true,
            HirExprKind::Int(value) => *value < 0,
            _ => false,
        };
        if needs_parens {
            format!("({text})")
        } else {
            text
        }
    }
}

fn join_declarator(base: &str, name: &str) -> String {
    if name.is_empty() {
        base.to_string()
    } else {
        format!("{base} {name}")
    }
}

fn braced(head: &str, members: &[String], tail: &str) -> String {
    if members.is_empty() {
        format!("{head} {{}}{tail}")
    } else {
        format!("{head} {{ {} }}{tail}", members.join(" "))
    }
}

fn int_literal(value: i128, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Primitive(Primitive::U64 | Primitive::USize) if value > i128::from(i64::MAX) => {
            format!("{value}ULL")
        }
        TypeRef::Primitive(Primitive::I64) if value == i128::from(i64::MIN) => {
            format!("({} - 1)", value + 1)
        }
        _ => value.to_string(),
    }
}

fn escape_byte(byte: u8, quote: u8) -> String {
    match byte {
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        b'\\' => "\\\\".to_string(),
        0 => "\\0".to_string(),
        b if b == quote => format!("\\{}", b as char),
        b if b.is_ascii_graphic() || b == b' ' => (b as char).to_string(),
        b => format!("\\x{b:02x}"),
    }
}

fn char_literal(byte: u8) -> String {
    format!("'{}'", escape_byte(byte, b'\''))
}

fn string_literal(bytes: &[u8]) -> String {
    let body: String = bytes.iter().map(|b| escape_byte(*b, b'"')).collect();
    format!("\"{body}\"")
}

/// Names of user functions referenced from `stmt`, in first-use order.
fn stmt_callees(stmt: &HirStmt, out: &mut Vec<String>) {
    match stmt {
        HirStmt::Let { init, .. } => expr_callees(init, out),
        HirStmt::Assign { target, value } => {
            expr_callees(target, out);
            expr_callees(value, out);
        }
        HirStmt::If {
            cond,
            then_body,
            else_body,
        } => {
            expr_callees(cond, out);
            for stmt in then_body.iter().chain(else_body.iter().flatten()) {
                stmt_callees(stmt, out);
            }
        }
        HirStmt::While { cond, body } => {
            expr_callees(cond, out);
            for stmt in body {
                stmt_callees(stmt, out);
            }
        }
        HirStmt::Return(value) => {
            if let Some(value) = value {
                expr_callees(value, out);
            }
        }
        HirStmt::Block(stmts) => {
            for stmt in stmts {
                stmt_callees(stmt, out);
            }
        }
        HirStmt::Expr(expr) => expr_callees(expr, out),
    }
}

fn expr_callees(expr: &HirExpr, out: &mut Vec<String>) {
    let mut push = |name: &String| {
        if !out.contains(name) {
            out.push(name.clone());
        }
    };
    match &expr.kind {
        HirExprKind::FnRef(name) => push(name),
        HirExprKind::Call { callee, args } => {
            if let Callee::Function(name) = callee {
                push(name);
            }
            for arg in args {
                expr_callees(arg, out);
            }
        }
        _ => {
            for child in children(expr) {
                expr_callees(child, out);
            }
        }
    }
}

fn children(expr: &HirExpr) -> Vec<&HirExpr> {
    match &expr.kind {
        HirExprKind::Array(items) | HirExprKind::StructLit(items) => items.iter().collect(),
        HirExprKind::Call { args, .. } => args.iter().collect(),
        HirExprKind::UnionLit { value: inner, .. }
        | HirExprKind::Unary { operand: inner, .. }
        | HirExprKind::AddrOf(inner)
        | HirExprKind::Deref(inner)
        | HirExprKind::Field { base: inner, .. }
        | HirExprKind::Is { operand: inner, .. }
        | HirExprKind::Paren(inner) => vec![&**inner],
        HirExprKind::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
        HirExprKind::Index { base, index } => vec![&**base, &**index],
        HirExprKind::Int(_)
        | HirExprKind::Float(_)
        | HirExprKind::Bool(_)
        | HirExprKind::Char(_)
        | HirExprKind::CString(_)
        | HirExprKind::Var(_)
        | HirExprKind::FnRef(_) => Vec::new(),
    }
}

fn visit_program_types(program: &HirProgram, visit: &mut impl FnMut(&TypeRef)) {
    for item in program
        .structs
        .iter()
        .chain(&program.specializations)
        .chain(&program.functions)
    {
        match item {
            HirItem::Struct(def) => def.fields.iter().for_each(|(_, ty)| visit(ty)),
            HirItem::Union(def) => def.members.iter().for_each(&mut *visit),
            HirItem::Extern(ext) => {
                ext.params.iter().for_each(&mut *visit);
                visit(&ext.ret);
            }
            HirItem::Function(function) => {
                function.params.iter().for_each(|(_, ty)| visit(ty));
                visit(&function.ret);
                for stmt in &function.body {
                    visit_stmt_types(stmt, visit);
                }
            }
        }
    }
    for stmt in &program.statements {
        visit_stmt_types(stmt, visit);
    }
    if let Some(result) = &program.result {
        visit_expr_types(result, visit);
    }
    for intrinsic in &program.intrinsics {
        visit_intrinsic_types(intrinsic, visit);
    }
}

fn visit_intrinsic_types(intrinsic: &Intrinsic, visit: &mut impl FnMut(&TypeRef)) {
    intrinsic.param_types().iter().for_each(&mut *visit);
    visit(&intrinsic.ret_type());
}

fn visit_stmt_types(stmt: &HirStmt, visit: &mut impl FnMut(&TypeRef)) {
    match stmt {
        HirStmt::Let { ty, init, .. } => {
            visit(ty);
            visit_expr_types(init, visit);
        }
        HirStmt::Assign { target, value } => {
            visit_expr_types(target, visit);
            visit_expr_types(value, visit);
        }
        HirStmt::If {
            cond,
            then_body,
            else_body,
        } => {
            visit_expr_types(cond, visit);
            for stmt in then_body.iter().chain(else_body.iter().flatten()) {
                visit_stmt_types(stmt, visit);
            }
        }
        HirStmt::While { cond, body } => {
            visit_expr_types(cond, visit);
            for stmt in body {
                visit_stmt_types(stmt, visit);
            }
        }
        HirStmt::Return(value) => {
            if let Some(value) = value {
                visit_expr_types(value, visit);
            }
        }
        HirStmt::Block(stmts) => {
            for stmt in stmts {
                visit_stmt_types(stmt, visit);
            }
        }
        HirStmt::Expr(expr) => visit_expr_types(expr, visit),
    }
}

fn visit_expr_types(expr: &HirExpr, visit: &mut impl FnMut(&TypeRef)) {
    visit(&expr.ty);
    for child in children(expr) {
        visit_expr_types(child, visit);
    }
}

fn collect_primitives(ty: &TypeRef, out: &mut HashSet<Primitive>) {
    match ty {
        TypeRef::Primitive(p) => {
            out.insert(*p);
        }
        TypeRef::Pointer { target, .. } => collect_primitives(target, out),
        TypeRef::Array { element, .. } => collect_primitives(element, out),
        TypeRef::Function { params, ret } => {
            for param in params {
                collect_primitives(param, out);
            }
            collect_primitives(ret, out);
        }
        TypeRef::Union { members, .. } => {
            for member in members {
                collect_primitives(member, out);
            }
        }
        TypeRef::CStr | TypeRef::Generic(_) | TypeRef::Named { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::parser::parse;
    use crate::typecheck::check_program;
    use pretty_assertions::assert_eq;

    fn emit(source: &str, mode: EmitMode) -> Result<String, CoreError> {
        let table = PrimitiveTable::standard();
        let program = parse(source)?;
        let hir = check_program(&program, &table)?;
        Ok(emit_c(&hir, &table, mode))
    }

    fn fragment(source: &str) -> String {
        emit(source, EmitMode::Fragment).expect("compile")
    }

    #[test]
    fn suffix_is_stripped() {
        assert_eq!(fragment("let x = 100I32;"), "#include <stdint.h>\nint32_t x = 100;");
        assert_eq!(fragment("let x = 7U16;"), "#include <stdint.h>\nuint16_t x = 7;");
    }

    #[test]
    fn bool_pulls_in_stdbool() {
        assert_eq!(
            fragment("let x : Bool = true == false;"),
            "#include <stdint.h>\n#include <stdbool.h>\nbool x = true == false;"
        );
    }

    #[test]
    fn empty_struct_and_value() {
        assert_eq!(
            fragment("struct Empty {} let value : Empty = Empty {};"),
            "#include <stdint.h>\nstruct Empty {}; struct Empty value = {};"
        );
    }

    #[test]
    fn array_literal_and_index() {
        assert_eq!(
            fragment("let array = [1, 2, 3]; let value = array[0];"),
            "#include <stdint.h>\nuint8_t array[3] = { 1, 2, 3 }; uint8_t value = array[0];"
        );
    }

    #[test]
    fn string_initializer_becomes_char_list() {
        assert_eq!(
            fragment("let s : [U8; 3] = \"a\\nb\";"),
            "#include <stdint.h>\nuint8_t s[3] = { 'a', '\\n', 'b' };"
        );
    }

    #[test]
    fn nested_array_dimensions() {
        assert_eq!(
            fragment("let m : [I32; 2, 2] = [1, 2, 3, 4];"),
            "#include <stdint.h>\nint32_t m[2][2] = { { 1, 2 }, { 3, 4 } };"
        );
    }

    #[test]
    fn pointers_and_deref() {
        assert_eq!(
            fragment("let mut x = 0; let y = &mut x; *y = 1; x"),
            "#include <stdint.h>\nint32_t x = 0; int32_t* y = &x; *y = 1; x;"
        );
    }

    #[test]
    fn generic_struct_is_specialized_once() {
        let out = fragment(
            "struct Wrapper<T> { value : T } \
             let a = Wrapper<I32> { value : 1 }; let b = Wrapper<I32> { value : 2 };",
        );
        assert_eq!(out.matches("struct Wrapper_I32 {").count(), 1);
        assert!(out.contains("struct Wrapper_I32 { int32_t value; };"));
        assert!(out.contains("struct Wrapper_I32 b = { 2 };"));
    }

    #[test]
    fn methods_become_free_functions() {
        let out = fragment(
            "struct Point { x : I32, y : I32, fn sum() => this.x + this.y; } \
             let p = Point { x : 1, y : 2 }; let s = p.sum();",
        );
        assert!(out.contains(
            "int32_t sum_Point(struct Point* this) { return this->x + this->y; }"
        ));
        assert!(out.contains("int32_t s = sum_Point(&p);"));
    }

    #[test]
    fn variadic_call_expands_to_scalars() {
        let out = fragment(
            "fn count<Length : USize>(...xs : [I32; Length]) : USize => Length; \
             let n = count(1, 2, 3);",
        );
        assert!(out.contains("#include <stddef.h>"));
        assert!(out.contains(
            "size_t count_3(int32_t xs_0, int32_t xs_1, int32_t xs_2) { \
             int32_t xs[3] = { xs_0, xs_1, xs_2 }; return 3; }"
        ));
        assert!(out.contains("size_t n = count_3(1, 2, 3);"));
    }

    #[test]
    fn union_has_tag_and_is_test() {
        let out = fragment("type Num = I32 | Bool; let n : Num = true; let b = n is Bool;");
        assert!(out.contains(
            "struct Num { uint8_t tag; union { int32_t _0; bool _1; } value; };"
        ));
        assert!(out.contains("struct Num n = { 1, { ._1 = true } };"));
        assert!(out.contains("bool b = n.tag == 1;"));
    }

    #[test]
    fn forward_calls_get_a_prototype() {
        let out = fragment("fn a() : I32 => b(); fn b() : I32 => 1;");
        assert_eq!(
            out,
            "#include <stdint.h>\nint32_t b(void); int32_t a(void) { return b(); } \
             int32_t b(void) { return 1; }"
        );
    }

    #[test]
    fn else_if_chains_stay_flat() {
        let out = fragment(
            "fn sign(x : I32) : I32 => { if (x < 0) { return -1; } else if (x > 0) { return 1; } else { return 0; } }",
        );
        assert!(out.contains(
            "if (x < 0) { return -1; } else if (x > 0) { return 1; } else { return 0; }"
        ));
    }

    #[test]
    fn program_mode_wraps_main_and_helpers() {
        let out = emit("let x = readInt(); printInt(x + 1); x", EmitMode::Program).unwrap();
        assert!(out.contains("#include <stdio.h>"));
        assert!(out.contains("int32_t readInt(void)"));
        assert!(out.contains("void printInt(int32_t value)"));
        assert!(out.ends_with(
            "int main(void) { int32_t x = readInt(); printInt(x + 1); return x; }\n"
        ));
    }

    #[test]
    fn extern_with_c_string() {
        let out = fragment("extern fn puts(s : CStr) : I32; puts(\"hi\");");
        assert!(out.contains("extern int32_t puts(const char*);"));
        assert!(out.contains("puts(\"hi\");"));
    }
}
