//! Constant pool decoding and extension.

use super::{ByteReader, put_u16, put_u32};
use crate::{Error, Result};

/// Constant pool tags.
pub mod tag {
    /// `CONSTANT_Utf8`
    pub const UTF8: u8 = 1;
    /// `CONSTANT_Integer`
    pub const INTEGER: u8 = 3;
    /// `CONSTANT_Float`
    pub const FLOAT: u8 = 4;
    /// `CONSTANT_Long`
    pub const LONG: u8 = 5;
    /// `CONSTANT_Double`
    pub const DOUBLE: u8 = 6;
    /// `CONSTANT_Class`
    pub const CLASS: u8 = 7;
    /// `CONSTANT_String`
    pub const STRING: u8 = 8;
    /// `CONSTANT_Fieldref`
    pub const FIELDREF: u8 = 9;
    /// `CONSTANT_Methodref`
    pub const METHODREF: u8 = 10;
    /// `CONSTANT_InterfaceMethodref`
    pub const INTERFACE_METHODREF: u8 = 11;
    /// `CONSTANT_NameAndType`
    pub const NAME_AND_TYPE: u8 = 12;
    /// `CONSTANT_MethodHandle`
    pub const METHOD_HANDLE: u8 = 15;
    /// `CONSTANT_MethodType`
    pub const METHOD_TYPE: u8 = 16;
    /// `CONSTANT_Dynamic`
    pub const DYNAMIC: u8 = 17;
    /// `CONSTANT_InvokeDynamic`
    pub const INVOKE_DYNAMIC: u8 = 18;
    /// `CONSTANT_Module`
    pub const MODULE: u8 = 19;
    /// `CONSTANT_Package`
    pub const PACKAGE: u8 = 20;
}

/// One constant pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Modified UTF-8 bytes, kept undecoded.
    Utf8(Vec<u8>),
    /// 32-bit integer.
    Integer(u32),
    /// 32-bit float bits.
    Float(u32),
    /// 64-bit integer.
    Long(u64),
    /// 64-bit float bits.
    Double(u64),
    /// Class reference (name index).
    Class(u16),
    /// String literal (utf8 index).
    String(u16),
    /// Field reference.
    Fieldref {
        /// Class index.
        class: u16,
        /// Name-and-type index.
        name_and_type: u16,
    },
    /// Method reference.
    Methodref {
        /// Class index.
        class: u16,
        /// Name-and-type index.
        name_and_type: u16,
    },
    /// Interface method reference.
    InterfaceMethodref {
        /// Class index.
        class: u16,
        /// Name-and-type index.
        name_and_type: u16,
    },
    /// Name and descriptor pair.
    NameAndType {
        /// Name index.
        name: u16,
        /// Descriptor index.
        descriptor: u16,
    },
    /// Method handle.
    MethodHandle {
        /// Reference kind (1..=9).
        kind: u8,
        /// Reference index.
        reference: u16,
    },
    /// Method type (descriptor index).
    MethodType(u16),
    /// Dynamically computed constant.
    Dynamic {
        /// Bootstrap method attribute index.
        bootstrap: u16,
        /// Name-and-type index.
        name_and_type: u16,
    },
    /// Invokedynamic call site.
    InvokeDynamic {
        /// Bootstrap method attribute index.
        bootstrap: u16,
        /// Name-and-type index.
        name_and_type: u16,
    },
    /// Module (name index).
    Module(u16),
    /// Package (name index).
    Package(u16),
    /// Slot 0, and the second slot taken by a `Long` or `Double`.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// The constant pool, indexed from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    // entries[0] is always Unusable.
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    /// Returns the `constant_pool_count` value (one more than the last index).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Looks up an entry.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(Error::class_file(
                0,
                format!("invalid constant pool index {index}"),
            )),
            Some(constant) => Ok(constant),
        }
    }

    /// Returns the raw bytes of a `Utf8` entry.
    pub fn utf8(&self, index: u16) -> Result<&[u8]> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    /// Returns a `Utf8` entry as text.
    ///
    /// Names and descriptors never contain the characters where modified
    /// UTF-8 differs from standard UTF-8, so plain decoding is enough for
    /// them.
    pub fn utf8_str(&self, index: u16) -> Result<&str> {
        std::str::from_utf8(self.utf8(index)?).map_err(|_| {
            Error::class_file(0, format!("constant {index} is not valid UTF-8"))
        })
    }

    /// Returns the internal name referenced by a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8_str(*name),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    /// Resolves a `Methodref` to `(owner, name, descriptor)`.
    pub fn methodref(&self, index: u16) -> Result<(&str, &str, &str)> {
        match self.get(index)? {
            Constant::Methodref {
                class,
                name_and_type,
            } => {
                let owner = self.class_name(*class)?;
                match self.get(*name_and_type)? {
                    Constant::NameAndType { name, descriptor } => Ok((
                        owner,
                        self.utf8_str(*name)?,
                        self.utf8_str(*descriptor)?,
                    )),
                    other => Err(mismatch(*name_and_type, "NameAndType", other)),
                }
            }
            other => Err(mismatch(index, "Methodref", other)),
        }
    }

    /// Adds a `Utf8` entry, reusing an identical one.
    pub fn add_utf8(&mut self, text: &str) -> Result<u16> {
        self.add(Constant::Utf8(text.as_bytes().to_vec()))
    }

    /// Adds a `Class` entry, reusing an identical one.
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.add_utf8(internal_name)?;
        self.add(Constant::Class(name))
    }

    /// Adds a `NameAndType` entry, reusing an identical one.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType { name, descriptor })
    }

    /// Adds a `Methodref` entry, reusing an identical one.
    pub fn add_methodref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::Methodref {
            class,
            name_and_type,
        })
    }

    /// Adds an entry, reusing an identical one.
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        if constant == Constant::Unusable {
            return Err(Error::class_file(0, "cannot add an unusable constant"));
        }
        if let Some(i) = self.entries.iter().position(|c| *c == constant) {
            return Ok(i as u16);
        }
        let index = self.entries.len();
        let slots = if constant.is_wide() { 2 } else { 1 };
        if index + slots > usize::from(u16::MAX) {
            return Err(Error::class_file(0, "constant pool is full"));
        }
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index as u16)
    }

    pub(super) fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.u16()?;
        if count == 0 {
            return Err(Error::class_file(reader.position(), "constant pool count is 0"));
        }
        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);

        while entries.len() < usize::from(count) {
            let offset = reader.position();
            let constant = match reader.u8()? {
                tag::UTF8 => {
                    let len = reader.u16()?;
                    Constant::Utf8(reader.bytes(usize::from(len))?.to_vec())
                }
                tag::INTEGER => Constant::Integer(reader.u32()?),
                tag::FLOAT => Constant::Float(reader.u32()?),
                tag::LONG => Constant::Long(read_u64(reader)?),
                tag::DOUBLE => Constant::Double(read_u64(reader)?),
                tag::CLASS => Constant::Class(reader.u16()?),
                tag::STRING => Constant::String(reader.u16()?),
                tag::FIELDREF => Constant::Fieldref {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                tag::METHODREF => Constant::Methodref {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                tag::INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                tag::NAME_AND_TYPE => Constant::NameAndType {
                    name: reader.u16()?,
                    descriptor: reader.u16()?,
                },
                tag::METHOD_HANDLE => Constant::MethodHandle {
                    kind: reader.u8()?,
                    reference: reader.u16()?,
                },
                tag::METHOD_TYPE => Constant::MethodType(reader.u16()?),
                tag::DYNAMIC => Constant::Dynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                tag::MODULE => Constant::Module(reader.u16()?),
                tag::PACKAGE => Constant::Package(reader.u16()?),
                other => {
                    return Err(Error::class_file(
                        offset,
                        format!("unknown constant pool tag {other}"),
                    ));
                }
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                if entries.len() >= usize::from(count) {
                    return Err(Error::class_file(
                        offset,
                        "8-byte constant in the last pool slot",
                    ));
                }
                entries.push(Constant::Unusable);
            }
        }
        Ok(Self { entries })
    }

    pub(super) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| Error::class_file(0, "constant pool is full"))?;
        put_u16(out, count);
        for constant in &self.entries[1..] {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.push(tag::UTF8);
                    let len = u16::try_from(bytes.len())
                        .map_err(|_| Error::class_file(0, "Utf8 constant longer than 65535"))?;
                    put_u16(out, len);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    out.push(tag::INTEGER);
                    put_u32(out, *v);
                }
                Constant::Float(v) => {
                    out.push(tag::FLOAT);
                    put_u32(out, *v);
                }
                Constant::Long(v) => {
                    out.push(tag::LONG);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(v) => {
                    out.push(tag::DOUBLE);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Class(i) => put_tagged(out, tag::CLASS, &[*i]),
                Constant::String(i) => put_tagged(out, tag::STRING, &[*i]),
                Constant::Fieldref {
                    class,
                    name_and_type,
                } => put_tagged(out, tag::FIELDREF, &[*class, *name_and_type]),
                Constant::Methodref {
                    class,
                    name_and_type,
                } => put_tagged(out, tag::METHODREF, &[*class, *name_and_type]),
                Constant::InterfaceMethodref {
                    class,
                    name_and_type,
                } => put_tagged(out, tag::INTERFACE_METHODREF, &[*class, *name_and_type]),
                Constant::NameAndType { name, descriptor } => {
                    put_tagged(out, tag::NAME_AND_TYPE, &[*name, *descriptor]);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.push(tag::METHOD_HANDLE);
                    out.push(*kind);
                    put_u16(out, *reference);
                }
                Constant::MethodType(i) => put_tagged(out, tag::METHOD_TYPE, &[*i]),
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => put_tagged(out, tag::DYNAMIC, &[*bootstrap, *name_and_type]),
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => put_tagged(out, tag::INVOKE_DYNAMIC, &[*bootstrap, *name_and_type]),
                Constant::Module(i) => put_tagged(out, tag::MODULE, &[*i]),
                Constant::Package(i) => put_tagged(out, tag::PACKAGE, &[*i]),
            }
        }
        Ok(())
    }
}

fn read_u64(reader: &mut ByteReader<'_>) -> Result<u64> {
    let high = u64::from(reader.u32()?);
    let low = u64::from(reader.u32()?);
    Ok((high << 32) | low)
}

fn put_tagged(out: &mut Vec<u8>, tag: u8, values: &[u16]) {
    out.push(tag);
    for value in values {
        put_u16(out, *value);
    }
}

fn mismatch(index: u16, expected: &str, found: &Constant) -> Error {
    Error::class_file(
        0,
        format!("constant {index}: expected {expected}, found {found:?}"),
    )
}
