//! # Bytecode
//!
//! Instruction set, symbol resolution and the AST-to-bytecode compiler.
//!
//! The compiler emits one flat instruction stream for the main program and
//! one per function literal. Function bodies go into the constant pool as
//! `Constant::Function`; the VM wraps them in closures at runtime.

pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod symbol_table;
pub mod verify;

pub use ir::{Bytecode, CompiledFunction, Constant};
pub use op::{Instructions, Opcode};
