//! # Runtime
//!
//! The stack VM that executes `Bytecode`, its call frames, runtime errors and
//! the builtin function registry.

pub mod builtins;
pub mod frame;
pub mod runtime_error;
pub mod vm_bc;

pub use runtime_error::RuntimeError;
pub use vm_bc::{Vm, VmConfig};
