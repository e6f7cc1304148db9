//! Method body rewriting.
//!
//! [`CodeRewriter`] inserts a fixed instruction sequence at the start of a
//! method and, optionally, another one in front of every return
//! instruction. Everything that refers to code offsets is remapped:
//! branches, switches, the exception table, stack map frames and the debug
//! tables. A branch to a return instruction lands on the inserted sequence
//! in front of it, so the sequence runs on every path out of the method.

use log::warn;

use super::code::CodeAttribute;
use super::opcodes::{self, Instruction};
use super::stack_map::{self, STACK_MAP_TABLE};
use super::{Attribute, ByteReader, ConstantPool, put_u16};
use crate::{Error, Result};

const LINE_NUMBER_TABLE: &str = "LineNumberTable";
const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";

/// Inserts instructions into a method body.
///
/// # Example
///
/// ```
/// use jarcloak::classfile::{CodeAttribute, ConstantPool};
/// use jarcloak::classfile::rewrite::CodeRewriter;
///
/// // return
/// let mut code = CodeAttribute {
///     max_stack: 0,
///     max_locals: 2,
///     code: vec![0xb1],
///     exception_table: Vec::new(),
///     attributes: Vec::new(),
/// };
/// // nop ... aconst_null; astore_1 before the return
/// CodeRewriter::new(vec![0x00], 0)
///     .before_returns(vec![0x01, 0x4c], 1)
///     .rewrite(&mut code, &ConstantPool::new())
///     .unwrap();
/// assert_eq!(code.code, [0x00, 0x01, 0x4c, 0xb1]);
/// assert_eq!(code.max_stack, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodeRewriter {
    prologue: Vec<u8>,
    prologue_stack: u16,
    before_return: Vec<u8>,
    before_return_stack: u16,
    min_locals: u16,
}

/// New positions of the old instructions.
struct Layout {
    // Where control entering an old offset now lands.
    label: Vec<Option<usize>>,
    // Where the old instruction itself now starts.
    position: Vec<Option<usize>>,
    len: usize,
}

impl Layout {
    fn label(&self, old: usize) -> Result<usize> {
        self.label
            .get(old)
            .copied()
            .flatten()
            .ok_or_else(|| Error::class_file(old, "offset is not an instruction boundary"))
    }

    fn position(&self, old: usize) -> Result<usize> {
        self.position
            .get(old)
            .copied()
            .flatten()
            .ok_or_else(|| Error::class_file(old, "offset is not an instruction boundary"))
    }

    fn label_u16(&self, old: u16) -> Result<u16> {
        // len <= u16::MAX is checked when the layout is built.
        Ok(self.label(usize::from(old))? as u16)
    }
}

impl CodeRewriter {
    /// Creates a rewriter inserting `prologue`, which needs `stack` operand
    /// stack slots.
    pub fn new(prologue: Vec<u8>, stack: u16) -> Self {
        Self {
            prologue,
            prologue_stack: stack,
            ..Self::default()
        }
    }

    /// Inserts `code` in front of every return instruction. It needs
    /// `extra_stack` slots on top of whatever is on the stack at the return.
    pub fn before_returns(mut self, code: Vec<u8>, extra_stack: u16) -> Self {
        self.before_return = code;
        self.before_return_stack = extra_stack;
        self
    }

    /// Raises `max_locals` to at least `locals`.
    pub fn min_locals(mut self, locals: u16) -> Self {
        self.min_locals = locals;
        self
    }

    /// Rewrites `code` in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClassFile`] if the body cannot be decoded, a
    /// 16-bit branch no longer reaches its target, or the body grows past
    /// 65535 bytes.
    pub fn rewrite(&self, code: &mut CodeAttribute, pool: &ConstantPool) -> Result<()> {
        let instructions = opcodes::decode(&code.code)?;
        let layout = self.layout(&instructions, code.code.len())?;
        let scrubbed = instructions
            .iter()
            .any(|(_, insn)| self.scrubs(insn));

        let mut out = Vec::with_capacity(layout.len);
        out.extend_from_slice(&self.prologue);
        for (old, insn) in &instructions {
            if self.scrubs(insn) {
                out.extend_from_slice(&self.before_return);
            }
            emit(&mut out, *old, insn, &layout)?;
        }
        debug_assert_eq!(out.len(), layout.len);
        code.code = out;

        for handler in &mut code.exception_table {
            handler.start_pc = layout.label_u16(handler.start_pc)?;
            handler.end_pc = layout.label_u16(handler.end_pc)?;
            handler.handler_pc = layout.label_u16(handler.handler_pc)?;
        }

        let attributes = std::mem::take(&mut code.attributes);
        for attribute in attributes {
            let name = attribute.name(pool)?;
            let info = match name {
                STACK_MAP_TABLE => remap_stack_map(&attribute.info, &layout)?,
                LINE_NUMBER_TABLE => remap_line_numbers(&attribute.info, &layout)?,
                LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
                    remap_local_variables(&attribute.info, &layout)?
                }
                other => {
                    warn!("dropping code attribute {other} while rewriting method body");
                    continue;
                }
            };
            code.attributes.push(Attribute {
                name_index: attribute.name_index,
                info,
            });
        }

        let extra = if scrubbed { self.before_return_stack } else { 0 };
        code.max_stack = code
            .max_stack
            .saturating_add(extra)
            .max(self.prologue_stack);
        code.max_locals = code.max_locals.max(self.min_locals);
        Ok(())
    }

    fn scrubs(&self, insn: &Instruction) -> bool {
        !self.before_return.is_empty() && opcodes::is_return(insn.opcode())
    }

    fn layout(&self, instructions: &[(usize, Instruction)], code_len: usize) -> Result<Layout> {
        let mut label = vec![None; code_len + 1];
        let mut position = vec![None; code_len + 1];
        let mut pc = self.prologue.len();

        for (old, insn) in instructions {
            label[*old] = Some(pc);
            if self.scrubs(insn) {
                pc += self.before_return.len();
            }
            position[*old] = Some(pc);
            pc += insn.len_at(pc);
        }
        label[code_len] = Some(pc);
        position[code_len] = Some(pc);

        if pc > usize::from(u16::MAX) {
            return Err(Error::class_file(0, "rewritten method body exceeds 65535 bytes"));
        }
        Ok(Layout {
            label,
            position,
            len: pc,
        })
    }
}

fn emit(out: &mut Vec<u8>, old: usize, insn: &Instruction, layout: &Layout) -> Result<()> {
    let here = out.len();
    let delta = |target: usize| -> Result<i64> { Ok(layout.label(target)? as i64 - here as i64) };

    match insn {
        Instruction::Plain(bytes) => out.extend_from_slice(bytes),
        Instruction::Branch { opcode, target } => {
            let offset = i16::try_from(delta(*target)?).map_err(|_| {
                Error::class_file(old, "branch offset no longer fits in 16 bits")
            })?;
            out.push(*opcode);
            out.extend_from_slice(&offset.to_be_bytes());
        }
        Instruction::WideBranch { opcode, target } => {
            out.push(*opcode);
            out.extend_from_slice(&(delta(*target)? as i32).to_be_bytes());
        }
        Instruction::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            out.push(opcodes::TABLESWITCH);
            out.resize(out.len() + opcodes::switch_padding(here), 0);
            out.extend_from_slice(&(delta(*default)? as i32).to_be_bytes());
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            for target in targets {
                out.extend_from_slice(&(delta(*target)? as i32).to_be_bytes());
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            out.push(opcodes::LOOKUPSWITCH);
            out.resize(out.len() + opcodes::switch_padding(here), 0);
            out.extend_from_slice(&(delta(*default)? as i32).to_be_bytes());
            out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
            for (key, target) in pairs {
                out.extend_from_slice(&key.to_be_bytes());
                out.extend_from_slice(&(delta(*target)? as i32).to_be_bytes());
            }
        }
    }
    Ok(())
}

fn remap_stack_map(info: &[u8], layout: &Layout) -> Result<Vec<u8>> {
    let mut frames = stack_map::decode(info)?;
    for frame in &mut frames {
        frame.offset = layout.label(frame.offset)?;
        stack_map::map_uninitialized(frame, |offset| {
            Ok(layout.position(usize::from(offset))? as u16)
        })?;
    }
    stack_map::encode(&frames)
}

fn remap_line_numbers(info: &[u8], layout: &Layout) -> Result<Vec<u8>> {
    let mut reader = ByteReader::new(info);
    let count = reader.u16()?;
    let mut out = Vec::with_capacity(info.len());
    put_u16(&mut out, count);
    for _ in 0..count {
        let start = reader.u16()?;
        let line = reader.u16()?;
        put_u16(&mut out, layout.label_u16(start)?);
        put_u16(&mut out, line);
    }
    Ok(out)
}

fn remap_local_variables(info: &[u8], layout: &Layout) -> Result<Vec<u8>> {
    let mut reader = ByteReader::new(info);
    let count = reader.u16()?;
    let mut out = Vec::with_capacity(info.len());
    put_u16(&mut out, count);
    for _ in 0..count {
        let start = reader.u16()?;
        let length = reader.u16()?;
        let rest = reader.bytes(6)?;
        let new_start = layout.label_u16(start)?;
        let end = usize::from(start) + usize::from(length);
        let new_end = layout.label(end)? as u16;
        put_u16(&mut out, new_start);
        put_u16(&mut out, new_end.saturating_sub(new_start));
        out.extend_from_slice(rest);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::code::ExceptionHandler;
    use super::super::stack_map::{Frame, FrameKind, VerificationType};
    use super::*;

    const SCRUB: [u8; 2] = [opcodes::ACONST_NULL, opcodes::ASTORE_1];

    fn rewriter() -> CodeRewriter {
        // aload_1; iload_2; pop; pop
        CodeRewriter::new(vec![0x2b, 0x1c, 0x57, 0x57], 2)
            .before_returns(SCRUB.to_vec(), 1)
            .min_locals(3)
    }

    fn body(code: Vec<u8>) -> CodeAttribute {
        CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_branch_to_return_hits_scrub() {
        // 0: iload_1  1: ifeq -> 5  4: nop  5: return
        let mut code = body(vec![0x1b, 0x99, 0x00, 0x04, 0x00, 0xb1]);
        rewriter().rewrite(&mut code, &ConstantPool::new()).unwrap();
        // prologue(4) 4: iload_1 5: ifeq -> 9 8: nop 9: aconst_null astore_1 return
        assert_eq!(
            code.code,
            [0x2b, 0x1c, 0x57, 0x57, 0x1b, 0x99, 0x00, 0x04, 0x00, 0x01, 0x4c, 0xb1]
        );
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 3);
    }

    #[test]
    fn test_every_return_scrubbed() {
        // 0: iload_1  1: ifeq -> 5  4: return  5: return
        let mut code = body(vec![0x1b, 0x99, 0x00, 0x04, 0xb1, 0xb1]);
        rewriter().rewrite(&mut code, &ConstantPool::new()).unwrap();
        let returns = code.code.iter().filter(|&&b| b == 0xb1).count();
        let scrubs = code.code.windows(3).filter(|w| *w == [0x01, 0x4c, 0xb1]).count();
        assert_eq!(returns, 2);
        assert_eq!(scrubs, 2);
        // ifeq now at 5, target 11 (second scrub start)
        assert_eq!(&code.code[5..8], &[0x99, 0x00, 0x06]);
    }

    #[test]
    fn test_switch_padding_recomputed() {
        // 0: iload_1  1: tableswitch pad=2 default->20 [0..0]->20  20: return
        let mut raw = vec![0x1b, opcodes::TABLESWITCH, 0, 0];
        raw.extend_from_slice(&19i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&19i32.to_be_bytes());
        raw.push(0xb1);
        let mut code = body(raw);
        // Prologue of one byte moves the switch to 2: padding becomes 1.
        CodeRewriter::new(vec![0x00], 0)
            .rewrite(&mut code, &ConstantPool::new())
            .unwrap();
        let decoded = opcodes::decode(&code.code).unwrap();
        assert_eq!(decoded[2].0, 2);
        assert_eq!(
            decoded[2].1,
            Instruction::TableSwitch {
                default: 20,
                low: 0,
                high: 0,
                targets: vec![20]
            }
        );
        assert_eq!(code.code.len(), 21);
    }

    #[test]
    fn test_exception_table_and_frames_remapped() {
        let mut pool = ConstantPool::new();
        let smt = pool.add_utf8(STACK_MAP_TABLE).unwrap();
        let lnt = pool.add_utf8(LINE_NUMBER_TABLE).unwrap();
        let lvt = pool.add_utf8(LOCAL_VARIABLE_TABLE).unwrap();
        let other = pool.add_utf8("RuntimeVisibleTypeAnnotations").unwrap();

        // 0: nop  1: return  2: astore_2  3: return (handler)
        let mut code = body(vec![0x00, 0xb1, 0x4d, 0xb1]);
        code.exception_table.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 2,
            catch_type: 0,
        });
        let frames = stack_map::encode(&[Frame {
            offset: 2,
            kind: FrameKind::SameLocals1(VerificationType::Object(1)),
        }])
        .unwrap();
        code.attributes = vec![
            Attribute {
                name_index: smt,
                info: frames,
            },
            Attribute {
                name_index: lnt,
                info: vec![0, 2, 0, 0, 0, 10, 0, 2, 0, 11],
            },
            Attribute {
                name_index: lvt,
                info: vec![0, 1, 0, 0, 0, 4, 0, 9, 0, 9, 0, 0],
            },
            Attribute {
                name_index: other,
                info: vec![0, 0],
            },
        ];

        rewriter().rewrite(&mut code, &pool).unwrap();
        // prologue(4) 4: nop 5: scrub 7: return 8: astore_2 9: scrub 11: return
        assert_eq!(
            code.exception_table[0],
            ExceptionHandler {
                start_pc: 4,
                end_pc: 8,
                handler_pc: 8,
                catch_type: 0
            }
        );
        assert_eq!(code.attributes.len(), 3);
        let frames = stack_map::decode(&code.attributes[0].info).unwrap();
        assert_eq!(frames[0].offset, 8);
        assert_eq!(code.attributes[1].info, [0, 2, 0, 4, 0, 10, 0, 8, 0, 11]);
        assert_eq!(code.attributes[2].info, [0, 1, 0, 4, 0, 8, 0, 9, 0, 9, 0, 0]);
    }

    #[test]
    fn test_uninitialized_offsets_follow_new() {
        let mut pool = ConstantPool::new();
        let smt = pool.add_utf8(STACK_MAP_TABLE).unwrap();
        // 0: new #1  3: dup  4: ifnull -> 7 (not really valid, only offsets matter)  7: return
        let mut code = body(vec![0xbb, 0x00, 0x01, 0x59, 0xc6, 0x00, 0x03, 0xb1]);
        code.attributes.push(Attribute {
            name_index: smt,
            info: stack_map::encode(&[Frame {
                offset: 7,
                kind: FrameKind::SameLocals1(VerificationType::Uninitialized(0)),
            }])
            .unwrap(),
        });
        rewriter().rewrite(&mut code, &pool).unwrap();
        let frames = stack_map::decode(&code.attributes[0].info).unwrap();
        assert_eq!(
            frames[0],
            Frame {
                offset: 11,
                kind: FrameKind::SameLocals1(VerificationType::Uninitialized(4)),
            }
        );
    }

    #[test]
    fn test_short_branch_overflow() {
        // goto +32767 over a return and a body of nops to the last return.
        let mut raw = vec![0xa7, 0x7f, 0xff, 0xb1];
        raw.resize(32767, 0x00);
        raw.push(0xb1);
        let mut code = body(raw);
        let err = CodeRewriter::new(Vec::new(), 0)
            .before_returns(SCRUB.to_vec(), 1)
            .rewrite(&mut code, &ConstantPool::new())
            .unwrap_err();
        assert!(err.to_string().contains("16 bits"));
    }
}
