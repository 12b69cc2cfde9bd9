use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - single-byte instruction tags
// =============================================================================

/// Instruction tag. The discriminant is the byte written to the stream.
///
/// Stack effects are written as `( before -- after )`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `Constant <u16 index>` ( -- c )
    Constant = 0,
    /// ( x -- )
    Pop,

    // arithmetic ( a b -- r )
    Add,
    Sub,
    Mul,
    Div,

    /// ( -- true )
    True,
    /// ( -- false )
    False,

    // comparison ( a b -- bool )
    Equal,
    NotEqual,
    GreaterThan,

    /// Logical not. ( x -- bool )
    Bang,
    /// Arithmetic negate. ( n -- -n )
    Minus,

    /// `Jump <u16 target>`: absolute offset in the current stream.
    Jump,
    /// `JumpNotTruthy <u16 target>` ( cond -- )
    JumpNotTruthy,

    /// ( -- null )
    Null,

    /// `GetGlobal <u16 slot>` ( -- x )
    GetGlobal,
    /// `SetGlobal <u16 slot>` ( x -- )
    SetGlobal,
    /// `GetLocal <u8 slot>` ( -- x )
    GetLocal,
    /// `SetLocal <u8 slot>` ( x -- )
    SetLocal,
    /// `GetFree <u8 index>` ( -- x )
    GetFree,
    /// `GetBuiltin <u8 index>` ( -- builtin )
    GetBuiltin,
    /// ( -- closure ) the closure of the active frame.
    CurrentClosure,

    /// `Array <u16 count>` ( x1 .. xn -- array )
    Array,
    /// `Hash <u16 count>` ( k1 v1 .. kn vn -- hash ), count is 2n.
    Hash,
    /// ( container index -- x )
    Index,

    /// `Call <u8 argc>` ( callee a1 .. an -- result )
    Call,
    /// ( x -- ) and leave the frame, pushing x for the caller.
    ReturnValue,
    /// Leave the frame, pushing null for the caller.
    Return,

    /// `Closure <u16 const> <u8 free>` ( f1 .. fn -- closure )
    Closure,
}

/// Name and operand widths of one opcode.
#[derive(Debug, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Total encoded length: opcode byte plus operands.
    pub fn instruction_len(&self) -> usize {
        1 + self.operand_widths.iter().sum::<usize>()
    }
}

macro_rules! def {
    ($name:literal, [$($w:literal),*]) => {
        &Definition {
            name: $name,
            operand_widths: &[$($w),*],
        }
    };
}

impl Opcode {
    /// Every opcode, in discriminant order.
    pub const ALL: [Opcode; 30] = [
        Opcode::Constant,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::True,
        Opcode::False,
        Opcode::Equal,
        Opcode::NotEqual,
        Opcode::GreaterThan,
        Opcode::Bang,
        Opcode::Minus,
        Opcode::Jump,
        Opcode::JumpNotTruthy,
        Opcode::Null,
        Opcode::GetGlobal,
        Opcode::SetGlobal,
        Opcode::GetLocal,
        Opcode::SetLocal,
        Opcode::GetFree,
        Opcode::GetBuiltin,
        Opcode::CurrentClosure,
        Opcode::Array,
        Opcode::Hash,
        Opcode::Index,
        Opcode::Call,
        Opcode::ReturnValue,
        Opcode::Return,
        Opcode::Closure,
    ];

    pub fn definition(self) -> &'static Definition {
        match self {
            Opcode::Constant => def!("OpConstant", [2]),
            Opcode::Pop => def!("OpPop", []),
            Opcode::Add => def!("OpAdd", []),
            Opcode::Sub => def!("OpSub", []),
            Opcode::Mul => def!("OpMul", []),
            Opcode::Div => def!("OpDiv", []),
            Opcode::True => def!("OpTrue", []),
            Opcode::False => def!("OpFalse", []),
            Opcode::Equal => def!("OpEqual", []),
            Opcode::NotEqual => def!("OpNotEqual", []),
            Opcode::GreaterThan => def!("OpGreaterThan", []),
            Opcode::Bang => def!("OpBang", []),
            Opcode::Minus => def!("OpMinus", []),
            Opcode::Jump => def!("OpJump", [2]),
            Opcode::JumpNotTruthy => def!("OpJumpNotTruthy", [2]),
            Opcode::Null => def!("OpNull", []),
            Opcode::GetGlobal => def!("OpGetGlobal", [2]),
            Opcode::SetGlobal => def!("OpSetGlobal", [2]),
            Opcode::GetLocal => def!("OpGetLocal", [1]),
            Opcode::SetLocal => def!("OpSetLocal", [1]),
            Opcode::GetFree => def!("OpGetFree", [1]),
            Opcode::GetBuiltin => def!("OpGetBuiltin", [1]),
            Opcode::CurrentClosure => def!("OpCurrentClosure", []),
            Opcode::Array => def!("OpArray", [2]),
            Opcode::Hash => def!("OpHash", [2]),
            Opcode::Index => def!("OpIndex", []),
            Opcode::Call => def!("OpCall", [1]),
            Opcode::ReturnValue => def!("OpReturnValue", []),
            Opcode::Return => def!("OpReturn", []),
            Opcode::Closure => def!("OpClosure", [2, 1]),
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

// =============================================================================
// INSTRUCTIONS - the encoded byte stream
// =============================================================================

/// A flat, byte-encoded instruction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Appends one encoded instruction and returns its starting offset.
    pub fn push(&mut self, instruction: &[u8]) -> usize {
        let pos = self.0.len();
        self.0.extend_from_slice(instruction);
        pos
    }

    /// Overwrites the bytes starting at `pos`. Used to back-patch operands.
    pub fn replace(&mut self, pos: usize, instruction: &[u8]) {
        self.0[pos..pos + instruction.len()].copy_from_slice(instruction);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Concatenates encoded instructions; handy for building expected streams.
impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self(iter.into_iter().flatten().collect())
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encodes `op` followed by its operands, big-endian, at the widths the
/// definition table declares.
///
/// Operand values must already fit their width; the compiler range-checks
/// them before calling this. Passing the wrong operand count is a bug in the
/// caller.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();
    debug_assert_eq!(
        operands.len(),
        def.operand_widths.len(),
        "{} takes {} operands",
        def.name,
        def.operand_widths.len()
    );

    let mut instruction = Vec::with_capacity(def.instruction_len());
    instruction.push(op as u8);

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => unreachable!("operand widths are 1 or 2 bytes"),
        }
    }

    instruction
}

/// Decodes the operands of one instruction. `bytes` starts right after the
/// opcode byte. Returns the operands and the number of bytes they occupied.
///
/// Returns `None` if `bytes` is too short to hold them.
pub fn read_operands(def: &Definition, bytes: &[u8]) -> Option<(Vec<usize>, usize)> {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for width in def.operand_widths {
        let operand = match width {
            2 => read_u16(bytes, offset)? as usize,
            1 => read_u8(bytes, offset)? as usize,
            _ => return None,
        };
        operands.push(operand);
        offset += width;
    }

    Some((operands, offset))
}

/// Big-endian u16 at `offset`.
pub fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let hi = *bytes.get(offset)?;
    let lo = *bytes.get(offset + 1)?;
    Some(u16::from_be_bytes([hi, lo]))
}

pub fn read_u8(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_constant() {
        assert_eq!(make(Opcode::Constant, &[65534]), vec![0, 255, 254]);
    }

    #[test]
    fn test_make_no_operands() {
        assert_eq!(make(Opcode::Add, &[]), vec![Opcode::Add as u8]);
    }

    #[test]
    fn test_make_closure() {
        assert_eq!(
            make(Opcode::Closure, &[65534, 255]),
            vec![Opcode::Closure as u8, 255, 254, 255]
        );
    }

    #[test]
    fn test_discriminants_match_table_order() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i, "{:?}", op);
            assert_eq!(Opcode::try_from(i as u8), Ok(*op));
        }
        assert_eq!(
            Opcode::try_from(Opcode::ALL.len() as u8),
            Err(Opcode::ALL.len() as u8)
        );
    }

    #[test]
    fn test_round_trip_every_opcode() {
        for op in Opcode::ALL {
            let def = op.definition();
            let operands: Vec<usize> = def
                .operand_widths
                .iter()
                .map(|w| if *w == 2 { 0xBEEF } else { 0xAB })
                .collect();

            let instruction = make(op, &operands);
            assert_eq!(instruction.len(), def.instruction_len(), "{}", def.name);

            let decoded = Opcode::try_from(instruction[0]).unwrap();
            assert_eq!(decoded, op);

            let (read, n) = read_operands(decoded.definition(), &instruction[1..]).unwrap();
            assert_eq!(read, operands, "{}", def.name);
            assert_eq!(n, instruction.len() - 1);
        }
    }

    #[test]
    fn test_read_operands_truncated() {
        let def = Opcode::Constant.definition();
        assert_eq!(read_operands(def, &[0xFF]), None);
    }

    #[test]
    fn test_back_patch_replace() {
        let mut ins = Instructions::new();
        let pos = ins.push(&make(Opcode::Jump, &[9999]));
        ins.push(&make(Opcode::Pop, &[]));
        ins.replace(pos, &make(Opcode::Jump, &[4]));
        assert_eq!(ins.as_bytes(), &[Opcode::Jump as u8, 0, 4, Opcode::Pop as u8]);
    }
}
