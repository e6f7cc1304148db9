//! JVM opcodes and instruction decoding.

use super::ByteReader;
use crate::{Error, Result};

/// `aconst_null`
pub const ACONST_NULL: u8 = 0x01;
/// `aload_1`
pub const ALOAD_1: u8 = 0x2b;
/// `iload_2`
pub const ILOAD_2: u8 = 0x1c;
/// `astore_1`
pub const ASTORE_1: u8 = 0x4c;
/// `ifeq`
pub const IFEQ: u8 = 0x99;
/// `jsr`
pub const JSR: u8 = 0xa8;
/// `tableswitch`
pub const TABLESWITCH: u8 = 0xaa;
/// `lookupswitch`
pub const LOOKUPSWITCH: u8 = 0xab;
/// `ireturn`
pub const IRETURN: u8 = 0xac;
/// `return`
pub const RETURN: u8 = 0xb1;
/// `invokestatic`
pub const INVOKESTATIC: u8 = 0xb8;
/// `wide`
pub const WIDE: u8 = 0xc4;
/// `iinc`
pub const IINC: u8 = 0x84;
/// `ifnull`
pub const IFNULL: u8 = 0xc6;
/// `ifnonnull`
pub const IFNONNULL: u8 = 0xc7;
/// `goto_w`
pub const GOTO_W: u8 = 0xc8;
/// `jsr_w`
pub const JSR_W: u8 = 0xc9;

/// Returns `true` for the `xreturn` family.
pub fn is_return(opcode: u8) -> bool {
    (IRETURN..=RETURN).contains(&opcode)
}

/// Returns `true` for branches with a 16-bit offset.
pub fn is_short_branch(opcode: u8) -> bool {
    (IFEQ..=JSR).contains(&opcode) || opcode == IFNULL || opcode == IFNONNULL
}

/// Returns `true` for branches with a 32-bit offset.
pub fn is_wide_branch(opcode: u8) -> bool {
    opcode == GOTO_W || opcode == JSR_W
}

/// Bytes of padding after a switch opcode at `pc`.
pub fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

/// Length of a fixed-size instruction, or `None` for switches, `wide` and
/// undefined opcodes.
fn fixed_length(opcode: u8) -> Option<usize> {
    Some(match opcode {
        // bipush, ldc, loads and stores with an index, ret, newarray
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        // sipush, ldc_w, ldc2_w, iinc, branches, field and method access,
        // new, anewarray, checkcast, instanceof, ifnull, ifnonnull
        0x11 | 0x13 | 0x14 | 0x84 | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        // multianewarray
        0xc5 => 4,
        // invokeinterface, invokedynamic, goto_w, jsr_w
        0xb9 | 0xba | 0xc8 | 0xc9 => 5,
        0xaa | 0xab | 0xc4 => return None,
        0xca..=0xff => return None,
        _ => 1,
    })
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Any instruction without a code offset operand, kept verbatim.
    Plain(Vec<u8>),
    /// A branch with a 16-bit relative target.
    Branch {
        /// Opcode.
        opcode: u8,
        /// Absolute target offset.
        target: usize,
    },
    /// `goto_w` or `jsr_w`.
    WideBranch {
        /// Opcode.
        opcode: u8,
        /// Absolute target offset.
        target: usize,
    },
    /// `tableswitch`.
    TableSwitch {
        /// Absolute default target.
        default: usize,
        /// Lowest key.
        low: i32,
        /// Highest key.
        high: i32,
        /// Absolute targets for `low..=high`.
        targets: Vec<usize>,
    },
    /// `lookupswitch`.
    LookupSwitch {
        /// Absolute default target.
        default: usize,
        /// Key and absolute target pairs.
        pairs: Vec<(i32, usize)>,
    },
}

impl Instruction {
    /// Returns the opcode.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Plain(bytes) => bytes[0],
            Self::Branch { opcode, .. } | Self::WideBranch { opcode, .. } => *opcode,
            Self::TableSwitch { .. } => TABLESWITCH,
            Self::LookupSwitch { .. } => LOOKUPSWITCH,
        }
    }

    /// Encoded length when placed at `pc`.
    pub fn len_at(&self, pc: usize) -> usize {
        match self {
            Self::Plain(bytes) => bytes.len(),
            Self::Branch { .. } => 3,
            Self::WideBranch { .. } => 5,
            Self::TableSwitch { targets, .. } => 1 + switch_padding(pc) + 12 + 4 * targets.len(),
            Self::LookupSwitch { pairs, .. } => 1 + switch_padding(pc) + 8 + 8 * pairs.len(),
        }
    }
}

/// Decodes a method body into `(offset, instruction)` pairs.
///
/// # Errors
///
/// Returns [`Error::InvalidClassFile`] for undefined opcodes, truncated
/// instructions or branch targets outside the code array.
pub fn decode(code: &[u8]) -> Result<Vec<(usize, Instruction)>> {
    let mut reader = ByteReader::new(code);
    let mut out = Vec::new();

    while reader.remaining() > 0 {
        let pc = reader.position();
        let opcode = reader.u8()?;
        let insn = if is_short_branch(opcode) {
            let delta = reader.u16()? as i16;
            Instruction::Branch {
                opcode,
                target: target(pc, i64::from(delta), code.len())?,
            }
        } else if is_wide_branch(opcode) {
            let delta = reader.i32()?;
            Instruction::WideBranch {
                opcode,
                target: target(pc, i64::from(delta), code.len())?,
            }
        } else if opcode == TABLESWITCH {
            reader.bytes(switch_padding(pc))?;
            let default = target(pc, i64::from(reader.i32()?), code.len())?;
            let low = reader.i32()?;
            let high = reader.i32()?;
            if high < low {
                return Err(Error::class_file(pc, "tableswitch high < low"));
            }
            let n = (i64::from(high) - i64::from(low) + 1) as usize;
            if n > reader.remaining() / 4 {
                return Err(Error::class_file(pc, "tableswitch runs past end of code"));
            }
            let mut targets = Vec::with_capacity(n);
            for _ in 0..n {
                targets.push(target(pc, i64::from(reader.i32()?), code.len())?);
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        } else if opcode == LOOKUPSWITCH {
            reader.bytes(switch_padding(pc))?;
            let default = target(pc, i64::from(reader.i32()?), code.len())?;
            let n = reader.i32()?;
            if n < 0 || n as usize > reader.remaining() / 8 {
                return Err(Error::class_file(pc, "bad lookupswitch pair count"));
            }
            let mut pairs = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let key = reader.i32()?;
                pairs.push((key, target(pc, i64::from(reader.i32()?), code.len())?));
            }
            Instruction::LookupSwitch { default, pairs }
        } else if opcode == WIDE {
            let modified = reader.u8()?;
            let rest = if modified == IINC { 4 } else { 2 };
            let operands = reader.bytes(rest)?;
            let mut bytes = vec![opcode, modified];
            bytes.extend_from_slice(operands);
            Instruction::Plain(bytes)
        } else {
            let len = fixed_length(opcode)
                .ok_or_else(|| Error::class_file(pc, format!("undefined opcode {opcode:#04x}")))?;
            let operands = reader.bytes(len - 1)?;
            let mut bytes = Vec::with_capacity(len);
            bytes.push(opcode);
            bytes.extend_from_slice(operands);
            Instruction::Plain(bytes)
        };
        out.push((pc, insn));
    }
    Ok(out)
}

fn target(pc: usize, delta: i64, code_len: usize) -> Result<usize> {
    let target = pc as i64 + delta;
    if target < 0 || target as usize >= code_len {
        return Err(Error::class_file(
            pc,
            format!("branch target {target} outside code"),
        ));
    }
    Ok(target as usize)
}
