use std::fmt;
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("opcode {op} undefined")]
    UnknownOpcode { op: u8 },
    #[error("operand {value} does not fit in {width} byte(s) of {name}")]
    OperandOverflow { name: &'static str, value: usize, width: usize },
    #[error("{name} takes {want} operand(s), got {got}")]
    OperandCount { name: &'static str, want: usize, got: usize },
    #[error("cannot patch instruction at {position}: {reason}")]
    PatchMismatch { position: usize, reason: &'static str },
}

// ── Opcodes ──────────────────────────────────────────────────────────
//
// One opcode byte followed by big-endian operands; widths per opcode are
// listed in `lookup`.

pub const OP_CONSTANT: u8 = 0;
pub const OP_ADD: u8 = 1;
pub const OP_SUB: u8 = 2;
pub const OP_MUL: u8 = 3;
pub const OP_DIV: u8 = 4;
pub const OP_POP: u8 = 5;
pub const OP_TRUE: u8 = 6;
pub const OP_FALSE: u8 = 7;
pub const OP_EQUAL: u8 = 8;
pub const OP_NOT_EQUAL: u8 = 9;
pub const OP_GREATER_THAN: u8 = 10;
pub const OP_GREATER_EQUAL: u8 = 11;
pub const OP_MINUS: u8 = 12;
pub const OP_BANG: u8 = 13;
pub const OP_JUMP_NOT_TRUTHY: u8 = 14;
pub const OP_JUMP: u8 = 15;
pub const OP_NULL: u8 = 16;
pub const OP_GET_GLOBAL: u8 = 17;
pub const OP_SET_GLOBAL: u8 = 18;
pub const OP_ARRAY: u8 = 19;
pub const OP_HASH: u8 = 20;
pub const OP_INDEX: u8 = 21;
pub const OP_CALL: u8 = 22;
pub const OP_RETURN_VALUE: u8 = 23;
pub const OP_RETURN: u8 = 24;
pub const OP_GET_LOCAL: u8 = 25;
pub const OP_SET_LOCAL: u8 = 26;
pub const OP_GET_BUILTIN: u8 = 27;
pub const OP_CLOSURE: u8 = 28;
pub const OP_GET_FREE: u8 = 29;
pub const OP_CURRENT_CLOSURE: u8 = 30;

#[derive(Debug, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Encoded size of the whole instruction, opcode included.
    pub fn len(&self) -> usize {
        1 + self.operand_widths.iter().sum::<usize>()
    }
}

pub fn lookup(op: u8) -> Result<&'static Definition, CodeError> {
    let def: &'static Definition = match op {
        OP_CONSTANT => &Definition { name: "OpConstant", operand_widths: &[2] },
        OP_ADD => &Definition { name: "OpAdd", operand_widths: &[] },
        OP_SUB => &Definition { name: "OpSub", operand_widths: &[] },
        OP_MUL => &Definition { name: "OpMul", operand_widths: &[] },
        OP_DIV => &Definition { name: "OpDiv", operand_widths: &[] },
        OP_POP => &Definition { name: "OpPop", operand_widths: &[] },
        OP_TRUE => &Definition { name: "OpTrue", operand_widths: &[] },
        OP_FALSE => &Definition { name: "OpFalse", operand_widths: &[] },
        OP_EQUAL => &Definition { name: "OpEqual", operand_widths: &[] },
        OP_NOT_EQUAL => &Definition { name: "OpNotEqual", operand_widths: &[] },
        OP_GREATER_THAN => &Definition { name: "OpGreaterThan", operand_widths: &[] },
        OP_GREATER_EQUAL => &Definition { name: "OpGreaterEqual", operand_widths: &[] },
        OP_MINUS => &Definition { name: "OpMinus", operand_widths: &[] },
        OP_BANG => &Definition { name: "OpBang", operand_widths: &[] },
        OP_JUMP_NOT_TRUTHY => &Definition { name: "OpJumpNotTruthy", operand_widths: &[2] },
        OP_JUMP => &Definition { name: "OpJump", operand_widths: &[2] },
        OP_NULL => &Definition { name: "OpNull", operand_widths: &[] },
        OP_GET_GLOBAL => &Definition { name: "OpGetGlobal", operand_widths: &[2] },
        OP_SET_GLOBAL => &Definition { name: "OpSetGlobal", operand_widths: &[2] },
        OP_ARRAY => &Definition { name: "OpArray", operand_widths: &[2] },
        OP_HASH => &Definition { name: "OpHash", operand_widths: &[2] },
        OP_INDEX => &Definition { name: "OpIndex", operand_widths: &[] },
        OP_CALL => &Definition { name: "OpCall", operand_widths: &[1] },
        OP_RETURN_VALUE => &Definition { name: "OpReturnValue", operand_widths: &[] },
        OP_RETURN => &Definition { name: "OpReturn", operand_widths: &[] },
        OP_GET_LOCAL => &Definition { name: "OpGetLocal", operand_widths: &[1] },
        OP_SET_LOCAL => &Definition { name: "OpSetLocal", operand_widths: &[1] },
        OP_GET_BUILTIN => &Definition { name: "OpGetBuiltin", operand_widths: &[1] },
        OP_CLOSURE => &Definition { name: "OpClosure", operand_widths: &[2, 1] },
        OP_GET_FREE => &Definition { name: "OpGetFree", operand_widths: &[1] },
        OP_CURRENT_CLOSURE => &Definition { name: "OpCurrentClosure", operand_widths: &[] },
        _ => return Err(CodeError::UnknownOpcode { op }),
    };
    Ok(def)
}

// ── Encoding ─────────────────────────────────────────────────────────

/// Encode one instruction. Fails when an operand does not fit its width.
pub fn make(op: u8, operands: &[usize]) -> Result<Vec<u8>, CodeError> {
    let def = lookup(op)?;
    if operands.len() != def.operand_widths.len() {
        return Err(CodeError::OperandCount {
            name: def.name,
            want: def.operand_widths.len(),
            got: operands.len(),
        });
    }

    let mut ins = Vec::with_capacity(def.len());
    ins.push(op);
    for (&value, &width) in operands.iter().zip(def.operand_widths) {
        if (value as u64) >> (8 * width) != 0 {
            return Err(CodeError::OperandOverflow { name: def.name, value, width });
        }
        let bytes = (value as u64).to_be_bytes();
        ins.extend_from_slice(&bytes[8 - width..]);
    }
    Ok(ins)
}

fn read_be(bytes: &[u8]) -> usize {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | b as usize)
}

/// Decode the operands following an opcode. Returns the operands and the
/// number of bytes read; a truncated stream yields the operands that fit.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;
    for &width in def.operand_widths {
        let Some(bytes) = ins.get(offset..offset + width) else { break };
        operands.push(read_be(bytes));
        offset += width;
    }
    (operands, offset)
}

#[inline(always)]
pub fn read_u16(ins: &[u8], at: usize) -> usize {
    u16::from_be_bytes([ins[at], ins[at + 1]]) as usize
}

#[inline(always)]
pub fn read_u8(ins: &[u8], at: usize) -> usize {
    ins[at] as usize
}

// ── Instruction stream ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }

    /// Append an encoded instruction, returning its starting offset.
    pub fn push(&mut self, ins: &[u8]) -> usize {
        let pos = self.0.len();
        self.0.extend_from_slice(ins);
        pos
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Overwrite the instruction at `position` with `new`, which must encode the
    /// same opcode at the same width.
    pub fn patch(&mut self, position: usize, new: &[u8]) -> Result<(), CodeError> {
        let mismatch = |reason| CodeError::PatchMismatch { position, reason };

        let existing = *self.0.get(position).ok_or_else(|| mismatch("offset out of range"))?;
        let Some(&op) = new.first() else {
            return Err(mismatch("replacement is empty"));
        };
        if op != existing {
            return Err(mismatch("opcode differs"));
        }
        if new.len() != lookup(op)?.len() {
            return Err(mismatch("width differs"));
        }
        let end = position + new.len();
        if end > self.0.len() {
            return Err(mismatch("instruction runs past the end"));
        }
        self.0[position..end].copy_from_slice(new);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Instructions {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Instructions(bytes)
    }
}

impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Instructions(iter.into_iter().flatten().collect())
    }
}

/// Disassembly, one instruction per line: `0003 OpConstant 2`.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut i = 0;
        while i < self.0.len() {
            let def = match lookup(self.0[i]) {
                Ok(def) => def,
                Err(e) => {
                    writeln!(f, "{:04} ERROR: {}", i, e)?;
                    i += 1;
                    continue;
                }
            };
            let (operands, read) = read_operands(def, &self.0[i + 1..]);
            write!(f, "{:04} {}", i, def.name)?;
            for operand in &operands {
                write!(f, " {}", operand)?;
            }
            if operands.len() != def.operand_widths.len() {
                write!(f, " ERROR: truncated")?;
            }
            writeln!(f)?;
            i += 1 + read;
        }
        Ok(())
    }
}
