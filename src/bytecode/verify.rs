use std::collections::HashSet;

use crate::bytecode::ir::{Bytecode, Constant};
use crate::bytecode::op::{Instructions, Opcode, read_operands};
use crate::runtime::builtins::BUILTINS;

/// `GetLocal`/`SetLocal` take a one-byte slot.
const MAX_LOCALS: usize = u8::MAX as usize + 1;

#[derive(Debug)]
pub struct VerifyError {
    pub message: String,
    /// Byte offset of the offending instruction in its stream.
    pub offset: usize,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verify error at {:04}: {}", self.offset, self.message)
    }
}

impl std::error::Error for VerifyError {}

impl VerifyError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Structural checks on bytecode that did not come straight from the
/// compiler:
///
/// - every opcode byte is known and its operands are present,
/// - constant, builtin and local indices are in range,
/// - `Closure` refers to a function constant,
/// - a function's locals fit the one-byte slot operand and include its
///   parameters,
/// - jump targets land on an instruction boundary (or the end).
///
/// Function constants are checked the same way. This is a linear scan; it
/// does not track stack heights across jumps.
pub fn verify(bytecode: &Bytecode) -> Result<(), VerifyError> {
    verify_stream(&bytecode.instructions, &bytecode.constants, None)?;

    for constant in &bytecode.constants {
        if let Constant::Function(func) = constant {
            if func.num_locals > MAX_LOCALS {
                return Err(VerifyError::new(
                    format!("function has {} locals, max {}", func.num_locals, MAX_LOCALS),
                    0,
                ));
            }
            if func.num_parameters > func.num_locals {
                return Err(VerifyError::new(
                    format!(
                        "function has {} parameters but only {} locals",
                        func.num_parameters, func.num_locals
                    ),
                    0,
                ));
            }
            verify_stream(&func.instructions, &bytecode.constants, Some(func.num_locals))?;
        }
    }

    Ok(())
}

fn verify_stream(
    ins: &Instructions,
    constants: &[Constant],
    num_locals: Option<usize>,
) -> Result<(), VerifyError> {
    let bytes = ins.as_bytes();
    let mut boundaries = HashSet::new();
    let mut jumps = Vec::new();
    let mut ip = 0;

    while ip < bytes.len() {
        boundaries.insert(ip);

        let op = Opcode::try_from(bytes[ip])
            .map_err(|b| VerifyError::new(format!("unknown opcode {}", b), ip))?;
        let def = op.definition();
        let (operands, read) = read_operands(def, &bytes[ip + 1..])
            .ok_or_else(|| VerifyError::new(format!("truncated {}", def.name), ip))?;

        match op {
            Opcode::Constant => {
                if operands[0] >= constants.len() {
                    return Err(VerifyError::new(
                        format!("constant index {} out of range", operands[0]),
                        ip,
                    ));
                }
            }
            Opcode::Closure => match constants.get(operands[0]) {
                Some(Constant::Function(_)) => {}
                _ => {
                    return Err(VerifyError::new(
                        format!("constant {} is not a function", operands[0]),
                        ip,
                    ));
                }
            },
            Opcode::GetBuiltin => {
                if operands[0] >= BUILTINS.len() {
                    return Err(VerifyError::new(
                        format!("builtin index {} out of range", operands[0]),
                        ip,
                    ));
                }
            }
            Opcode::GetLocal | Opcode::SetLocal => match num_locals {
                Some(n) if operands[0] < n => {}
                Some(_) => {
                    return Err(VerifyError::new(
                        format!("local slot {} out of range", operands[0]),
                        ip,
                    ));
                }
                None => {
                    return Err(VerifyError::new("local access outside a function", ip));
                }
            },
            Opcode::Jump | Opcode::JumpNotTruthy => jumps.push((ip, operands[0])),
            _ => {}
        }

        ip += 1 + read;
    }

    for (at, target) in jumps {
        if target != bytes.len() && !boundaries.contains(&target) {
            return Err(VerifyError::new(
                format!("jump target {:04} is not an instruction boundary", target),
                at,
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::CompiledFunction;
    use crate::bytecode::op::make;
    use std::rc::Rc;

    fn stream(parts: Vec<Vec<u8>>) -> Instructions {
        parts.into_iter().collect()
    }

    #[test]
    fn test_accepts_well_formed() {
        let bc = Bytecode {
            instructions: stream(vec![
                make(Opcode::True, &[]),
                make(Opcode::JumpNotTruthy, &[7]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
            ]),
            constants: vec![Constant::Integer(1)],
        };
        assert!(verify(&bc).is_ok());
    }

    #[test]
    fn test_rejects_unknown_opcode() {
        let bc = Bytecode {
            instructions: Instructions::from(vec![0xEE]),
            constants: vec![],
        };
        let err = verify(&bc).unwrap_err();
        assert!(err.message.contains("unknown opcode"));
    }

    #[test]
    fn test_rejects_truncated_operand() {
        let bc = Bytecode {
            instructions: Instructions::from(vec![Opcode::Constant as u8, 0]),
            constants: vec![Constant::Integer(1)],
        };
        assert!(verify(&bc).unwrap_err().message.contains("truncated"));
    }

    #[test]
    fn test_rejects_constant_out_of_range() {
        let bc = Bytecode {
            instructions: stream(vec![make(Opcode::Constant, &[3])]),
            constants: vec![Constant::Integer(1)],
        };
        assert!(verify(&bc).unwrap_err().message.contains("out of range"));
    }

    #[test]
    fn test_rejects_jump_into_operand() {
        let bc = Bytecode {
            instructions: stream(vec![
                make(Opcode::Jump, &[4]),
                make(Opcode::Constant, &[0]),
            ]),
            constants: vec![Constant::Integer(1)],
        };
        let err = verify(&bc).unwrap_err();
        assert!(err.message.contains("boundary"));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_rejects_closure_over_non_function() {
        let bc = Bytecode {
            instructions: stream(vec![make(Opcode::Closure, &[0, 0])]),
            constants: vec![Constant::Integer(1)],
        };
        assert!(verify(&bc).unwrap_err().message.contains("not a function"));
    }

    #[test]
    fn test_checks_function_locals() {
        let func = CompiledFunction {
            instructions: stream(vec![
                make(Opcode::GetLocal, &[2]),
                make(Opcode::ReturnValue, &[]),
            ]),
            num_locals: 1,
            num_parameters: 1,
        };
        let bc = Bytecode {
            instructions: stream(vec![make(Opcode::Closure, &[0, 0])]),
            constants: vec![Constant::Function(Rc::new(func))],
        };
        assert!(verify(&bc).unwrap_err().message.contains("local slot 2"));
    }

    #[test]
    fn test_rejects_local_access_in_main() {
        let bc = Bytecode {
            instructions: stream(vec![make(Opcode::GetLocal, &[0])]),
            constants: vec![],
        };
        assert!(verify(&bc).is_err());
    }

    fn with_function(num_locals: usize, num_parameters: usize) -> Bytecode {
        let func = CompiledFunction {
            instructions: stream(vec![make(Opcode::Return, &[])]),
            num_locals,
            num_parameters,
        };
        Bytecode {
            instructions: stream(vec![
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ]),
            constants: vec![Constant::Function(Rc::new(func))],
        }
    }

    #[test]
    fn test_rejects_oversized_locals() {
        let err = verify(&with_function(usize::MAX, 0)).unwrap_err();
        assert!(err.message.contains("locals, max 256"));
        assert!(verify(&with_function(256, 0)).is_ok());
    }

    #[test]
    fn test_rejects_parameters_beyond_locals() {
        let err = verify(&with_function(0, 2)).unwrap_err();
        assert!(err.message.contains("2 parameters but only 0 locals"));
    }

    #[test]
    fn test_from_bytes_rejects_bad_function_header() {
        let bytes = with_function(usize::MAX, 0).to_bytes().unwrap();
        assert!(Bytecode::from_bytes(&bytes).is_err());
    }
}
