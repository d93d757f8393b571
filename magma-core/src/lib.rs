//! Core compiler for the Magma language.
//!
//! Magma is a small statically typed language that compiles to C. The
//! pipeline is roughly:
//!
//!   source text
//!     -> splitter   (top-level statements)
//!     -> lexer      (tokens per statement)
//!     -> parser     (AST)
//!     -> typecheck  (scopes, borrows, monomorphization, lowering -> HIR)
//!     -> codegen_c  (C source)  |  interp (direct execution)
//!
//! Higher-level tools (the CLI) should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;
pub mod span;

// ---------------------------------------------------------------------
// Front-end: splitting, lexing and parsing
// ---------------------------------------------------------------------

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod splitter;

// ---------------------------------------------------------------------
// Semantic layers: types, scopes, checking, specialization, HIR
// ---------------------------------------------------------------------

pub mod hir;
pub mod intrinsics;
pub mod lower;
pub mod mono;
pub mod resolve;
pub mod scope;
pub mod typecheck;
pub mod types;

// ---------------------------------------------------------------------
// Back-end: C emission, interpretation and orchestration
// ---------------------------------------------------------------------

pub mod codegen_c;
pub mod compiler;
pub mod interp;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompileOptions, EmitMode, RunOutcome, compile, compile_program, compile_with, run};
pub use error::CoreError;
pub use types::PrimitiveTable;
