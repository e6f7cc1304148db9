//! In-memory class file model.
//!
//! Just enough of the JVM class file format to add a method and rewrite a
//! method body: the constant pool is fully decoded, members and attributes
//! are kept as raw bytes until someone asks for them, and the `Code`
//! attribute has its own parser in [`code`]. Serializing an unmodified
//! [`ClassFile`] reproduces the input bytes exactly.

pub mod code;
pub mod constant_pool;
pub mod opcodes;
pub mod rewrite;
pub mod stack_map;

pub use code::{CodeAttribute, ExceptionHandler};
pub use constant_pool::{Constant, ConstantPool};

use crate::{Error, Result};

/// Class file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Access flag constants.
pub mod access {
    /// `ACC_PUBLIC`
    pub const PUBLIC: u16 = 0x0001;
    /// `ACC_PRIVATE`
    pub const PRIVATE: u16 = 0x0002;
    /// `ACC_STATIC`
    pub const STATIC: u16 = 0x0008;
    /// `ACC_NATIVE`
    pub const NATIVE: u16 = 0x0100;
}

/// A raw attribute: name index plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Constant pool index of the attribute name.
    pub name_index: u16,
    /// Attribute body.
    pub info: Vec<u8>,
}

impl Attribute {
    /// Returns the attribute name.
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8_str(self.name_index)
    }

    fn parse_table(reader: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        let count = reader.u16()?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name_index = reader.u16()?;
            let len = reader.u32()? as usize;
            let info = reader.bytes(len)?.to_vec();
            attributes.push(Self { name_index, info });
        }
        Ok(attributes)
    }

    fn write_table(attributes: &[Self], out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, table_len(attributes.len(), "attributes")?);
        for attribute in attributes {
            put_u16(out, attribute.name_index);
            let len = u32::try_from(attribute.info.len())
                .map_err(|_| Error::class_file(out.len(), "attribute larger than 4 GiB"))?;
            put_u32(out, len);
            out.extend_from_slice(&attribute.info);
        }
        Ok(())
    }
}

/// A field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Access flags.
    pub access_flags: u16,
    /// Constant pool index of the name.
    pub name_index: u16,
    /// Constant pool index of the descriptor.
    pub descriptor_index: u16,
    /// Member attributes.
    pub attributes: Vec<Attribute>,
}

impl Member {
    /// Returns the member name.
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8_str(self.name_index)
    }

    /// Returns the member descriptor.
    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8_str(self.descriptor_index)
    }

    /// Returns the position of the `Code` attribute, if any.
    pub fn code_attribute(&self, pool: &ConstantPool) -> Result<Option<usize>> {
        for (i, attribute) in self.attributes.iter().enumerate() {
            if attribute.name(pool)? == code::CODE {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn parse_table(reader: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        let count = reader.u16()?;
        let mut members = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            members.push(Self {
                access_flags: reader.u16()?,
                name_index: reader.u16()?,
                descriptor_index: reader.u16()?,
                attributes: Attribute::parse_table(reader)?,
            });
        }
        Ok(members)
    }

    fn write_table(members: &[Self], out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, table_len(members.len(), "members")?);
        for member in members {
            put_u16(out, member.access_flags);
            put_u16(out, member.name_index);
            put_u16(out, member.descriptor_index);
            Attribute::write_table(&member.attributes, out)?;
        }
        Ok(())
    }
}

/// A parsed class file.
///
/// # Example
///
/// ```
/// use jarcloak::classfile::{ClassFile, ConstantPool, access};
///
/// let mut pool = ConstantPool::new();
/// let this_class = pool.add_class("com/acme/Empty").unwrap();
/// let super_class = pool.add_class("java/lang/Object").unwrap();
/// let class = ClassFile {
///     minor_version: 0,
///     major_version: 52,
///     constant_pool: pool,
///     access_flags: access::PUBLIC,
///     this_class,
///     super_class,
///     interfaces: Vec::new(),
///     fields: Vec::new(),
///     methods: Vec::new(),
///     attributes: Vec::new(),
/// };
///
/// let bytes = class.to_bytes().unwrap();
/// let parsed = ClassFile::parse(&bytes).unwrap();
/// assert_eq!(parsed.this_class_name().unwrap(), "com/acme/Empty");
/// assert_eq!(parsed.to_bytes().unwrap(), bytes);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Minor version.
    pub minor_version: u16,
    /// Major version.
    pub major_version: u16,
    /// The constant pool.
    pub constant_pool: ConstantPool,
    /// Class access flags.
    pub access_flags: u16,
    /// Constant pool index of this class.
    pub this_class: u16,
    /// Constant pool index of the superclass (0 for `java/lang/Object`).
    pub super_class: u16,
    /// Constant pool indices of implemented interfaces.
    pub interfaces: Vec<u16>,
    /// Fields.
    pub fields: Vec<Member>,
    /// Methods.
    pub methods: Vec<Member>,
    /// Class attributes.
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parses a class file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClassFile`] for a bad magic number, truncated
    /// data, malformed constants or trailing bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(Error::class_file(0, format!("bad magic {magic:#010x}")));
        }
        let minor_version = reader.u16()?;
        let major_version = reader.u16()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;
        let access_flags = reader.u16()?;
        let this_class = reader.u16()?;
        let super_class = reader.u16()?;
        let interface_count = reader.u16()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(reader.u16()?);
        }
        let fields = Member::parse_table(&mut reader)?;
        let methods = Member::parse_table(&mut reader)?;
        let attributes = Attribute::parse_table(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(Error::class_file(
                reader.position(),
                format!("{} trailing bytes", reader.remaining()),
            ));
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serializes the class file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1024);
        put_u32(&mut out, MAGIC);
        put_u16(&mut out, self.minor_version);
        put_u16(&mut out, self.major_version);
        self.constant_pool.write(&mut out)?;
        put_u16(&mut out, self.access_flags);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, table_len(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            put_u16(&mut out, *interface);
        }
        Member::write_table(&self.fields, &mut out)?;
        Member::write_table(&self.methods, &mut out)?;
        Attribute::write_table(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// Returns the internal name of this class (`com/acme/Foo`).
    pub fn this_class_name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Returns `true` if a method with this name and descriptor exists.
    pub fn declares_method(&self, name: &str, descriptor: &str) -> Result<bool> {
        for method in &self.methods {
            if method.name(&self.constant_pool)? == name
                && method.descriptor(&self.constant_pool)? == descriptor
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Adds a method without a body (`native` or `abstract`).
    pub fn add_bodiless_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<()> {
        let name_index = self.constant_pool.add_utf8(name)?;
        let descriptor_index = self.constant_pool.add_utf8(descriptor)?;
        self.methods.push(Member {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        Ok(())
    }
}

/// Big-endian cursor over class file bytes.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Error::class_file(self.pos, format!("unexpected end of data (need {len} bytes)"))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads a `u1`.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    /// Reads a `u2`.
    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a `u4`.
    pub fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a signed 32-bit value.
    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }
}

/// Appends a big-endian `u2`.
pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian `u4`.
pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Converts a table length to its `u2` count.
pub(crate) fn table_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::class_file(0, format!("too many {what} ({len})")))
}
