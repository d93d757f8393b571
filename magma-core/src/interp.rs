//! Tree-walking interpreter over checked HIR.
//!
//! Executes a program the way its emitted C would run: integers wrap to
//! the width of their type, arrays and structs are values copied on
//! assignment, and pointers name a storage slot plus a path into it.
//! Intrinsics talk to an in-memory input queue and output buffer.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::CoreError;
use crate::hir::*;
use crate::intrinsics::IntrinsicKind;
use crate::types::{Primitive, PrimitiveClass, PrimitiveTable, TypeRef};

const MAX_CALL_DEPTH: usize = 1000;

/// Result of running a program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOutcome {
    /// Value of the trailing top-level expression, `0` without one.
    pub exit_code: i64,
    /// Bytes written by `printInt` and `printChar`.
    pub output: Vec<u8>,
}

impl RunOutcome {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i128),
    Float(f64),
    Bool(bool),
    Void,
    Bytes(Vec<u8>),
    /// Array elements or struct fields.
    Aggregate(Vec<Value>),
    Union { tag: usize, value: Box<Value> },
    Pointer(Place),
    Function(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Place {
    slot: usize,
    path: Vec<usize>,
}

enum Flow {
    Normal,
    Return(Value),
}

pub fn run_program(
    program: &HirProgram,
    table: &PrimitiveTable,
    input: &[i64],
) -> Result<RunOutcome, CoreError> {
    let mut interp = Interpreter::new(program, table, input);
    for stmt in &program.statements {
        if let Flow::Return(_) = interp.exec(stmt)? {
            return Err(CoreError::runtime("'return' outside of a function"));
        }
    }
    let exit_code = match &program.result {
        Some(result) => match interp.eval(result)? {
            Value::Int(n) => n as i64,
            Value::Bool(b) => i64::from(b),
            other => {
                return Err(CoreError::runtime(format!(
                    "program result must be an integer, found {other:?}"
                )));
            }
        },
        None => 0,
    };
    debug!(exit_code, bytes = interp.output.len(), "program finished");
    Ok(RunOutcome {
        exit_code,
        output: interp.output,
    })
}

struct Interpreter<'a> {
    table: &'a PrimitiveTable,
    functions: HashMap<&'a str, &'a HirFunction>,
    externs: HashMap<&'a str, &'a HirExtern>,
    slots: Vec<Value>,
    /// Innermost scope last; a call starts a fresh stack.
    scopes: Vec<HashMap<String, usize>>,
    input: std::slice::Iter<'a, i64>,
    output: Vec<u8>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    fn new(program: &'a HirProgram, table: &'a PrimitiveTable, input: &'a [i64]) -> Self {
        let mut functions = HashMap::new();
        let mut externs = HashMap::new();
        for item in program.specializations.iter().chain(&program.functions) {
            match item {
                HirItem::Function(function) => {
                    functions.insert(function.c_name.as_str(), function);
                }
                HirItem::Extern(ext) => {
                    externs.insert(ext.c_name.as_str(), ext);
                }
                HirItem::Struct(_) | HirItem::Union(_) => {}
            }
        }
        Interpreter {
            table,
            functions,
            externs,
            slots: Vec::new(),
            scopes: vec![HashMap::new()],
            input: input.iter(),
            output: Vec::new(),
            depth: 0,
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec(&mut self, stmt: &HirStmt) -> Result<Flow, CoreError> {
        match stmt {
            HirStmt::Let { name, ty, init } => {
                let value = self.eval(init)?;
                let value = self.convert(value, ty);
                self.bind(name, value);
                Ok(Flow::Normal)
            }
            HirStmt::Assign { target, value } => {
                let value = self.eval(value)?;
                let value = self.convert(value, &target.ty);
                let place = self.place(target)?;
                self.write(&place, value)?;
                Ok(Flow::Normal)
            }
            HirStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval_bool(cond)? {
                    self.exec_block(then_body)
                } else if let Some(body) = else_body {
                    self.exec_block(body)
                } else {
                    Ok(Flow::Normal)
                }
            }
            HirStmt::While { cond, body } => {
                while self.eval_bool(cond)? {
                    if let Flow::Return(value) = self.exec_block(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            HirStmt::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::Void,
                };
                Ok(Flow::Return(value))
            }
            HirStmt::Block(body) => self.exec_block(body),
            HirStmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_block(&mut self, body: &[HirStmt]) -> Result<Flow, CoreError> {
        self.scopes.push(HashMap::new());
        let mark = self.slots.len();
        let flow = self.exec_all(body);
        self.scopes.pop();
        if matches!(flow, Ok(Flow::Normal)) {
            self.slots.truncate(mark);
        }
        flow
    }

    fn exec_all(&mut self, body: &[HirStmt]) -> Result<Flow, CoreError> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn bind(&mut self, name: &str, value: Value) {
        let slot = self.slots.len();
        self.slots.push(value);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn lookup(&self, name: &str) -> Result<usize, CoreError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| CoreError::runtime(format!("unbound variable '{name}'")))
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    fn place(&mut self, expr: &HirExpr) -> Result<Place, CoreError> {
        match &expr.kind {
            HirExprKind::Var(name) => Ok(Place {
                slot: self.lookup(name)?,
                path: Vec::new(),
            }),
            HirExprKind::Paren(inner) => self.place(inner),
            HirExprKind::Deref(pointer) => self.pointer(pointer),
            HirExprKind::Field {
                base,
                index,
                through_pointer,
                ..
            } => {
                let mut place = if *through_pointer {
                    self.pointer(base)?
                } else {
                    self.place(base)?
                };
                place.path.push(*index);
                Ok(place)
            }
            HirExprKind::Index { base, index } => {
                let mut place = if base.ty.is_pointer() {
                    self.pointer(base)?
                } else {
                    self.place(base)?
                };
                let len = match self.read(&place)? {
                    Value::Aggregate(items) => items.len(),
                    _ => return Err(CoreError::runtime("indexing a non-array value")),
                };
                let index = self.eval_index(index, len)?;
                place.path.push(index);
                Ok(place)
            }
            _ => {
                // A temporary, e.g. the receiver of a method called on a
                // call result.
                let value = self.eval(expr)?;
                let slot = self.slots.len();
                self.slots.push(value);
                Ok(Place {
                    slot,
                    path: Vec::new(),
                })
            }
        }
    }

    fn pointer(&mut self, expr: &HirExpr) -> Result<Place, CoreError> {
        match self.eval(expr)? {
            Value::Pointer(place) => Ok(place),
            _ => Err(CoreError::runtime("dereferencing a non-pointer value")),
        }
    }

    fn read(&self, place: &Place) -> Result<Value, CoreError> {
        let mut value = self
            .slots
            .get(place.slot)
            .ok_or_else(|| CoreError::runtime("dangling pointer"))?;
        for &step in &place.path {
            value = match value {
                Value::Aggregate(items) => items
                    .get(step)
                    .ok_or_else(|| CoreError::runtime("invalid memory access"))?,
                _ => return Err(CoreError::runtime("invalid memory access")),
            };
        }
        Ok(value.clone())
    }

    fn write(&mut self, place: &Place, new: Value) -> Result<(), CoreError> {
        let mut value = self
            .slots
            .get_mut(place.slot)
            .ok_or_else(|| CoreError::runtime("dangling pointer"))?;
        for &step in &place.path {
            value = match value {
                Value::Aggregate(items) => items
                    .get_mut(step)
                    .ok_or_else(|| CoreError::runtime("invalid memory access"))?,
                _ => return Err(CoreError::runtime("invalid memory access")),
            };
        }
        *value = new;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_bool(&mut self, expr: &HirExpr) -> Result<bool, CoreError> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(CoreError::runtime(format!(
                "expected a Bool condition, found {other:?}"
            ))),
        }
    }

    fn eval_index(&mut self, index: &HirExpr, len: usize) -> Result<usize, CoreError> {
        match self.eval(index)? {
            Value::Int(n) if n >= 0 && (n as u128) < len as u128 => Ok(n as usize),
            Value::Int(n) => Err(CoreError::runtime(format!(
                "index {n} is out of bounds for length {len}"
            ))),
            _ => Err(CoreError::runtime("array index must be an integer")),
        }
    }

    fn eval(&mut self, expr: &HirExpr) -> Result<Value, CoreError> {
        match &expr.kind {
            HirExprKind::Int(n) => Ok(self.convert(Value::Int(*n), &expr.ty)),
            HirExprKind::Float(text) => {
                let value: f64 = text
                    .parse()
                    .map_err(|_| CoreError::runtime(format!("invalid float literal '{text}'")))?;
                Ok(self.convert(Value::Float(value), &expr.ty))
            }
            HirExprKind::Bool(b) => Ok(Value::Bool(*b)),
            HirExprKind::Char(byte) => Ok(Value::Int(i128::from(*byte))),
            HirExprKind::CString(bytes) => Ok(Value::Bytes(bytes.clone())),
            HirExprKind::Var(name) => {
                let slot = self.lookup(name)?;
                self.read(&Place {
                    slot,
                    path: Vec::new(),
                })
            }
            HirExprKind::FnRef(name) => Ok(Value::Function(name.clone())),
            HirExprKind::Array(items) | HirExprKind::StructLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.eval(item)?;
                    values.push(self.convert(value, &item.ty));
                }
                Ok(Value::Aggregate(values))
            }
            HirExprKind::UnionLit { tag, value } => Ok(Value::Union {
                tag: *tag,
                value: Box::new(self.eval(value)?),
            }),
            HirExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Int(n)) => Ok(self.convert(Value::Int(-n), &expr.ty)),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(self.convert(Value::Float(-f), &expr.ty)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (op, value) => Err(CoreError::runtime(format!(
                        "operator {op:?} cannot be applied to {value:?}"
                    ))),
                }
            }
            HirExprKind::AddrOf(operand) => Ok(Value::Pointer(self.place(operand)?)),
            HirExprKind::Deref(operand) => {
                let place = self.pointer(operand)?;
                self.read(&place)
            }
            HirExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, &expr.ty),
            HirExprKind::Call { callee, args } => self.eval_call(callee, args, &expr.ty),
            HirExprKind::Field {
                base,
                index,
                through_pointer: true,
                ..
            } => {
                let mut place = self.pointer(base)?;
                place.path.push(*index);
                self.read(&place)
            }
            HirExprKind::Field { base, index, .. } => match self.eval(base)? {
                Value::Aggregate(mut fields) if *index < fields.len() => {
                    Ok(fields.swap_remove(*index))
                }
                _ => Err(CoreError::runtime("field access on a non-struct value")),
            },
            HirExprKind::Index { base, index } => {
                let items = match self.eval(base)? {
                    Value::Aggregate(items) => items,
                    Value::Pointer(place) => match self.read(&place)? {
                        Value::Aggregate(items) => items,
                        _ => return Err(CoreError::runtime("indexing a non-array value")),
                    },
                    _ => return Err(CoreError::runtime("indexing a non-array value")),
                };
                let index = self.eval_index(index, items.len())?;
                Ok(items.into_iter().nth(index).unwrap_or(Value::Void))
            }
            HirExprKind::Is { operand, tag } => match self.eval(operand)? {
                Value::Union { tag: actual, .. } => Ok(Value::Bool(actual == *tag)),
                _ => Err(CoreError::runtime("'is' applied to a non-union value")),
            },
            HirExprKind::Paren(inner) => self.eval(inner),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &HirExpr,
        rhs: &HirExpr,
        ty: &TypeRef,
    ) -> Result<Value, CoreError> {
        match op {
            BinaryOp::And => {
                return Ok(Value::Bool(self.eval_bool(lhs)? && self.eval_bool(rhs)?));
            }
            BinaryOp::Or => {
                return Ok(Value::Bool(self.eval_bool(lhs)? || self.eval_bool(rhs)?));
            }
            _ => {}
        }
        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;
        trace!(?op, ?left, ?right, "binary");
        let value = match (left, right) {
            (Value::Int(a), Value::Int(b)) => match op {
                BinaryOp::Add => Value::Int(a + b),
                BinaryOp::Sub => Value::Int(a - b),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                    return Err(CoreError::runtime("division by zero"));
                }
                BinaryOp::Div => Value::Int(a / b),
                BinaryOp::Rem => Value::Int(a % b),
                _ => Value::Bool(compare(op, a.cmp(&b))),
            },
            (Value::Float(a), Value::Float(b)) => match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Div => Value::Float(a / b),
                BinaryOp::Rem => Value::Float(a % b),
                _ => match a.partial_cmp(&b) {
                    Some(ordering) => Value::Bool(compare(op, ordering)),
                    None => Value::Bool(op == BinaryOp::Ne),
                },
            },
            (left, right) => match op {
                BinaryOp::Eq => Value::Bool(left == right),
                BinaryOp::Ne => Value::Bool(left != right),
                _ => {
                    return Err(CoreError::runtime(format!(
                        "operator '{}' cannot be applied to {left:?} and {right:?}",
                        op.symbol()
                    )));
                }
            },
        };
        Ok(self.convert(value, ty))
    }

    fn eval_call(
        &mut self,
        callee: &Callee,
        args: &[HirExpr],
        ty: &TypeRef,
    ) -> Result<Value, CoreError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        match callee {
            Callee::Intrinsic(intrinsic) => self.call_intrinsic(intrinsic.kind, values),
            Callee::Function(name) => self.call(name, values, ty),
            Callee::Local(name) => {
                let slot = self.lookup(name)?;
                match self.read(&Place {
                    slot,
                    path: Vec::new(),
                })? {
                    Value::Function(target) => self.call(&target, values, ty),
                    _ => Err(CoreError::runtime(format!("'{name}' is not a function"))),
                }
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>, ty: &TypeRef) -> Result<Value, CoreError> {
        if self.externs.contains_key(name) {
            return Err(CoreError::runtime(format!(
                "foreign function '{name}' cannot be interpreted"
            )));
        }
        let function = *self
            .functions
            .get(name)
            .ok_or_else(|| CoreError::runtime(format!("unknown function '{name}'")))?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(CoreError::runtime(format!(
                "call depth exceeded {MAX_CALL_DEPTH} in '{name}'"
            )));
        }
        trace!(function = name, depth = self.depth, "call");

        let saved = std::mem::replace(&mut self.scopes, vec![HashMap::new()]);
        let mark = self.slots.len();
        self.depth += 1;
        for ((param, param_ty), value) in function.params.iter().zip(args) {
            let value = self.convert(value, param_ty);
            self.bind(param, value);
        }
        let flow = self.exec_all(&function.body);
        self.depth -= 1;
        self.scopes = saved;
        let result = match flow? {
            Flow::Return(value) => value,
            Flow::Normal => Value::Void,
        };
        // Locals die with the frame unless a pointer into them escaped.
        if !matches!(result, Value::Pointer(_)) {
            self.slots.truncate(mark);
        }
        Ok(self.convert(result, ty))
    }

    fn call_intrinsic(&mut self, kind: IntrinsicKind, args: Vec<Value>) -> Result<Value, CoreError> {
        match (kind, args.as_slice()) {
            (IntrinsicKind::ReadInt, []) => {
                let value = self
                    .input
                    .next()
                    .ok_or_else(|| CoreError::runtime("readInt: input is exhausted"))?;
                Ok(self.convert(Value::Int(i128::from(*value)), &TypeRef::I32))
            }
            (IntrinsicKind::PrintInt, [Value::Int(n)]) => {
                self.output.extend_from_slice(format!("{n}\n").as_bytes());
                Ok(Value::Void)
            }
            (IntrinsicKind::PrintChar, [Value::Int(n)]) => {
                self.output.push(*n as u8);
                Ok(Value::Void)
            }
            (kind, args) => Err(CoreError::runtime(format!(
                "bad arguments for {kind:?}: {args:?}"
            ))),
        }
    }

    /// Bring `value` to the representation of `ty`: integers wrap to its
    /// width, floats round to its precision.
    fn convert(&self, value: Value, ty: &TypeRef) -> Value {
        let Some(primitive) = ty.primitive() else {
            return value;
        };
        match value {
            Value::Int(n) => match self.table.int_range(primitive) {
                Some((min, max)) => Value::Int(wrap(n, min, max)),
                None => Value::Int(n),
            },
            Value::Float(f) if primitive == Primitive::F32 => Value::Float(f64::from(f as f32)),
            Value::Float(f) if self.table.info(primitive).class == PrimitiveClass::Float => {
                Value::Float(f)
            }
            other => other,
        }
    }
}

fn wrap(value: i128, min: i128, max: i128) -> i128 {
    if (min..=max).contains(&value) {
        return value;
    }
    let span = max - min + 1;
    (value - min).rem_euclid(span) + min
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Eq => ordering == Equal,
        BinaryOp::Ne => ordering != Equal,
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Ge => ordering != Less,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::typecheck::check_program;

    fn run(source: &str, input: &[i64]) -> Result<RunOutcome, CoreError> {
        let table = PrimitiveTable::standard();
        let program = parse(source)?;
        let hir = check_program(&program, &table)?;
        run_program(&hir, &table, input)
    }

    #[test]
    fn trailing_expression_is_exit_code() {
        assert_eq!(run("let x = 40; x + 2", &[]).unwrap().exit_code, 42);
        assert_eq!(run("let x = 1;", &[]).unwrap().exit_code, 0);
    }

    #[test]
    fn reads_and_prints() {
        let outcome = run("let a = readInt(); let b = readInt(); printInt(a * b); 0", &[6, 7])
            .unwrap();
        assert_eq!(outcome.stdout(), "42\n");
    }

    #[test]
    fn exhausted_input_is_runtime_error() {
        let err = run("readInt()", &[]).unwrap_err();
        assert!(matches!(err, CoreError::Runtime(_)));
    }

    #[test]
    fn loops_and_mutation() {
        let source = "let mut i = 0; let mut sum = 0; \
                      while (i < 5) { sum = sum + i; i = i + 1; } sum";
        assert_eq!(run(source, &[]).unwrap().exit_code, 10);
    }

    #[test]
    fn recursion() {
        let source = "fn fact(n : I32) : I32 => { if (n <= 1) { return 1; } return n * fact(n - 1); } \
                      fact(5)";
        assert_eq!(run(source, &[]).unwrap().exit_code, 120);
    }

    #[test]
    fn unsigned_arithmetic_wraps() {
        assert_eq!(run("let x = 250U8; let y = x + 10U8; y", &[]).unwrap().exit_code, 4);
    }

    #[test]
    fn division_by_zero_at_runtime() {
        let err = run("let z = readInt(); 10 / z", &[0]).unwrap_err();
        assert_eq!(err, CoreError::runtime("division by zero"));
    }

    #[test]
    fn index_out_of_bounds_at_runtime() {
        let err = run("let a = [1, 2, 3]; let i = readInt(); a[i]", &[3]).unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn writes_through_pointers() {
        let source = "fn bump(p : *mut I32) => { *p = *p + 1; } \
                      let mut x = 1; bump(&mut x); bump(&mut x); x";
        assert_eq!(run(source, &[]).unwrap().exit_code, 3);
    }

    #[test]
    fn arrays_and_structs() {
        let source = "struct Point { x : I32, y : I32 } \
                      let mut p = Point { x : 1, y : 2 }; p.y = 5; \
                      let mut a : [I32; 3] = [0, 0, 0]; a[1] = p.x + p.y; a[1]";
        assert_eq!(run(source, &[]).unwrap().exit_code, 6);
    }

    #[test]
    fn methods_and_generics() {
        let source = "struct Wrapper<T> { value : T, fn get() => this.value; } \
                      fn id<T>(x : T) => x; \
                      let w = Wrapper<I32> { value : 9 }; id(w.get())";
        assert_eq!(run(source, &[]).unwrap().exit_code, 9);
    }

    #[test]
    fn prints_characters() {
        let outcome = run("printChar('h'); printChar('i');", &[]).unwrap();
        assert_eq!(outcome.stdout(), "hi");
    }

    #[test]
    fn union_tags() {
        let source = "type Num = I32 | Bool; let n : Num = 3; n is I32";
        assert_eq!(run(source, &[]).unwrap().exit_code, 1);
    }
}
