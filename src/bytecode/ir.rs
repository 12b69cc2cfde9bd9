use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bytecode::op::Instructions;
use crate::bytecode::verify::{VerifyError, verify};
use crate::lang::value::Object;

/// A compiled function body, not yet bound to captured values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Slots reserved on the stack for parameters and `let` bindings.
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Integer(i64),
    String(Rc<str>),
    Function(Rc<CompiledFunction>),
}

impl Constant {
    /// The runtime value `OpConstant` pushes. Shares, never copies.
    pub fn to_object(&self) -> Object {
        match self {
            Constant::Integer(n) => Object::Integer(*n),
            Constant::String(s) => Object::String(s.clone()),
            Constant::Function(f) => Object::CompiledFunction(f.clone()),
        }
    }
}

/// Compiler output, VM input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Constant>,
}

impl Bytecode {
    /// Snapshot as postcard bytes.
    ///
    /// The layout follows the in-memory types directly and is not versioned;
    /// only read it back with the same build.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Reads a snapshot written by `to_bytes` and verifies it before handing
    /// it out, so the VM never sees a malformed stream from disk.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerifyError> {
        let bytecode: Bytecode = postcard::from_bytes(bytes)
            .map_err(|e| VerifyError::new(format!("cannot decode bytecode: {}", e), 0))?;
        verify(&bytecode)?;
        Ok(bytecode)
    }
}
