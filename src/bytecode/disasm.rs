use std::collections::BTreeSet;
use std::fmt;

use crate::bytecode::ir::{Bytecode, Constant};
use crate::bytecode::op::{Instructions, Opcode, read_operands};

/// One decoded line of an instruction stream.
struct Decoded {
    offset: usize,
    text: String,
    jump_target: Option<usize>,
}

/// Decodes `ins` line by line. Stops at the first byte that does not decode,
/// reporting it as an `ERROR:` line.
fn decode(ins: &Instructions) -> Vec<Decoded> {
    let bytes = ins.as_bytes();
    let mut lines = Vec::new();
    let mut ip = 0;

    while ip < bytes.len() {
        let op = match Opcode::try_from(bytes[ip]) {
            Ok(op) => op,
            Err(b) => {
                lines.push(Decoded {
                    offset: ip,
                    text: format!("ERROR: unknown opcode {}", b),
                    jump_target: None,
                });
                break;
            }
        };

        let def = op.definition();
        let Some((operands, read)) = read_operands(def, &bytes[ip + 1..]) else {
            lines.push(Decoded {
                offset: ip,
                text: format!("ERROR: truncated {}", def.name),
                jump_target: None,
            });
            break;
        };

        let mut text = def.name.to_string();
        for operand in &operands {
            text.push_str(&format!(" {}", operand));
        }

        let jump_target = match op {
            Opcode::Jump | Opcode::JumpNotTruthy => Some(operands[0]),
            _ => None,
        };

        lines.push(Decoded {
            offset: ip,
            text,
            jump_target,
        });
        ip += 1 + read;
    }

    lines
}

/// `0000 OpConstant 1`, one instruction per line.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in decode(self) {
            writeln!(f, "{:04} {}", line.offset, line.text)?;
        }
        Ok(())
    }
}

/// Annotated listing: jump targets get a `►` marker and each jump shows
/// where it lands.
pub fn disassemble(ins: &Instructions) -> String {
    let lines = decode(ins);
    let targets: BTreeSet<usize> = lines.iter().filter_map(|l| l.jump_target).collect();

    let mut out = String::new();
    for line in &lines {
        if targets.contains(&line.offset) {
            out.push_str("      ┌──────────────────────────────────\n");
        }
        let marker = if targets.contains(&line.offset) { "► " } else { "  " };
        out.push_str(&format!("{:04} {}{}", line.offset, marker, line.text));
        if let Some(target) = line.jump_target {
            out.push_str(&format!("  (→ {:04})", target));
        }
        out.push('\n');
    }
    out
}

/// Print disassembly of a bytecode program: main stream, constant pool, then
/// every function body.
pub fn print_bc(bc: &Bytecode) {
    println!("=== BYTECODE PROGRAM ===\n");

    print_code("main", &bc.instructions);

    if !bc.constants.is_empty() {
        println!("════════════════════════════════════════");
        println!(" constants");
        println!(" {} entries", bc.constants.len());
        println!("════════════════════════════════════════");
        for (i, constant) in bc.constants.iter().enumerate() {
            println!("{:04}   {}", i, describe_constant(constant));
        }
        println!();
    }

    for (i, constant) in bc.constants.iter().enumerate() {
        if let Constant::Function(func) = constant {
            let label = format!(
                "fn const[{}] ({} params, {} locals)",
                i, func.num_parameters, func.num_locals
            );
            print_code(&label, &func.instructions);
        }
    }
}

fn print_code(label: &str, ins: &Instructions) {
    println!("════════════════════════════════════════");
    println!(" {}", label);
    println!(" {} bytes", ins.len());
    println!("════════════════════════════════════════");
    print!("{}", disassemble(ins));
    println!();
}

fn describe_constant(constant: &Constant) -> String {
    match constant {
        Constant::Integer(n) => format!("INTEGER   {}", n),
        Constant::String(s) => format!("STRING    {:?}", s),
        Constant::Function(func) => format!("FUNCTION  {} bytes", func.instructions.len()),
    }
}
