//! Pipeline entry points.
//!
//! `parse -> check (resolve, monomorphize, lower) -> emit C` for
//! [`compile`] and [`compile_program`]; `parse -> check -> interpret` for
//! [`run`]. Each call owns its primitive table, scope tree and
//! specialization cache, so independent sources can be compiled on
//! separate threads.

use tracing::{debug, debug_span};

use crate::codegen_c::emit_c;
pub use crate::codegen_c::EmitMode;
use crate::error::CoreError;
use crate::hir::HirProgram;
pub use crate::interp::RunOutcome;
use crate::interp::run_program;
use crate::parser::parse;
use crate::typecheck::check_program;
use crate::types::PrimitiveTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub mode: EmitMode,
}

/// Compile one source unit to a C fragment.
pub fn compile(source: &str) -> Result<String, CoreError> {
    compile_with(source, CompileOptions::default())
}

/// Compile one source unit to a standalone C program with `main`.
pub fn compile_program(source: &str) -> Result<String, CoreError> {
    compile_with(
        source,
        CompileOptions {
            mode: EmitMode::Program,
        },
    )
}

pub fn compile_with(source: &str, options: CompileOptions) -> Result<String, CoreError> {
    let table = PrimitiveTable::standard();
    let hir = check(source, &table)?;
    let _span = debug_span!("emit", mode = ?options.mode).entered();
    Ok(emit_c(&hir, &table, options.mode))
}

/// Check `source` and execute it, feeding `input` to `readInt`.
pub fn run(source: &str, input: &[i64]) -> Result<RunOutcome, CoreError> {
    let table = PrimitiveTable::standard();
    let hir = check(source, &table)?;
    let _span = debug_span!("run", inputs = input.len()).entered();
    run_program(&hir, &table, input)
}

fn check(source: &str, table: &PrimitiveTable) -> Result<HirProgram, CoreError> {
    let program = {
        let _span = debug_span!("parse", bytes = source.len()).entered();
        parse(source)?
    };
    let _span = debug_span!("check", declarations = program.declarations.len()).entered();
    let hir = check_program(&program, table)?;
    debug!(
        structs = hir.structs.len(),
        specializations = hir.specializations.len(),
        functions = hir.functions.len(),
        "checked"
    );
    Ok(hir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_source_yields_only_the_include() {
        assert_eq!(compile("").unwrap(), "#include <stdint.h>");
    }

    #[test]
    fn compile_is_deterministic() {
        let source = "struct Wrapper<T> { value : T } fn id<T>(x : T) => x; \
                      let a = id(Wrapper<I32> { value : 1 }); let b = id(true);";
        assert_eq!(compile(source).unwrap(), compile(source).unwrap());
    }

    #[test]
    fn program_mode_without_result_returns_zero() {
        let out = compile_program("let x = 1;").unwrap();
        assert_eq!(
            out,
            "#include <stdint.h>\nint main(void) { int32_t x = 1; return 0; }\n"
        );
    }

    #[test]
    fn errors_carry_their_class() {
        let err = compile("let x : U8 = 256;").unwrap_err();
        assert!(matches!(err, CoreError::Range { .. }));
        assert!(err.to_string().starts_with("range error at byte "));
    }

    #[test]
    fn run_uses_the_same_checker() {
        assert!(matches!(
            run("let x = 1; x = 2;", &[]).unwrap_err(),
            CoreError::Scope { .. }
        ));
        assert_eq!(run("let x = 2; x * 21", &[]).unwrap().exit_code, 42);
    }
}
