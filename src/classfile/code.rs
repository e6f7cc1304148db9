//! The `Code` attribute.

use super::{Attribute, ByteReader, put_u16, put_u32, table_len};
use crate::{Error, Result};

/// Attribute name of a method body.
pub const CODE: &str = "Code";

/// One exception table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered offset.
    pub start_pc: u16,
    /// First offset past the covered range.
    pub end_pc: u16,
    /// Handler offset.
    pub handler_pc: u16,
    /// Caught class index, 0 for `finally`.
    pub catch_type: u16,
}

/// A decoded `Code` attribute body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Operand stack depth.
    pub max_stack: u16,
    /// Local variable slots.
    pub max_locals: u16,
    /// Bytecode.
    pub code: Vec<u8>,
    /// Exception handlers.
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes (`StackMapTable`, `LineNumberTable`, ...).
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Parses an attribute body.
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(info);
        let max_stack = reader.u16()?;
        let max_locals = reader.u16()?;
        let code_len = reader.u32()? as usize;
        if code_len == 0 || code_len > usize::from(u16::MAX) {
            return Err(Error::class_file(4, format!("bad code length {code_len}")));
        }
        let code = reader.bytes(code_len)?.to_vec();

        let handler_count = reader.u16()?;
        let mut exception_table = Vec::with_capacity(usize::from(handler_count));
        for _ in 0..handler_count {
            exception_table.push(ExceptionHandler {
                start_pc: reader.u16()?,
                end_pc: reader.u16()?,
                handler_pc: reader.u16()?,
                catch_type: reader.u16()?,
            });
        }
        let attributes = Attribute::parse_table(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(Error::class_file(
                reader.position(),
                "trailing bytes in Code attribute",
            ));
        }

        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Serializes the attribute body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        if self.code.len() > usize::from(u16::MAX) {
            return Err(Error::class_file(0, "method body larger than 65535 bytes"));
        }
        put_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        put_u16(
            &mut out,
            table_len(self.exception_table.len(), "exception handlers")?,
        );
        for handler in &self.exception_table {
            put_u16(&mut out, handler.start_pc);
            put_u16(&mut out, handler.end_pc);
            put_u16(&mut out, handler.handler_pc);
            put_u16(&mut out, handler.catch_type);
        }
        Attribute::write_table(&self.attributes, &mut out)?;
        Ok(out)
    }
}
