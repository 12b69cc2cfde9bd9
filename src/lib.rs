//! # simian
//!
//! A small dynamic language compiled to bytecode and run on a stack VM.
//!
//! ```text
//! source -> frontend::lexer -> frontend::parser -> lang::program::Program
//!        -> bytecode::compile::Compiler -> Bytecode -> runtime::vm_bc::Vm
//! ```
//!
//! `session::Session` bundles the state that persists between inputs of a
//! REPL: the global symbol table, the constant pool and the globals store.

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod repl;
pub mod runtime;
pub mod session;

pub use bytecode::{Bytecode, Opcode};
pub use lang::value::Object;
pub use session::{EvalError, Session};
