//! Syntax layer for recordql.
//!
//! This crate provides:
//! - `selection`: Field selections, field calls and variables
//! - `operation`: Operation kinds and the operations handed to the compiler
//! - `compiler`: Selection to GraphQL document compilation
//! - `error`: Compile errors

pub mod compiler;
pub mod error;
pub mod operation;
pub mod selection;

pub use compiler::{compile, compile_with_variable_values, CompiledOperation, Compiler};
pub use error::{CompileError, CompileResult};
pub use operation::{BuilderOperation, OperationKind};
pub use selection::{Argument, FieldCall, FieldSelection, Selected, Variable};
