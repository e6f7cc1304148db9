//! Shared test utilities for integration tests.
//!
//! Archive and class-file builders used across the test files.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use jarcloak::classfile::code::CODE;
use jarcloak::classfile::{Attribute, ClassFile, CodeAttribute, ConstantPool, Member, access};
use jarcloak::zip::{CompressionMethod, ZipEntry, ZipReader, ZipWriter};
use jarcloak::{DosDateTime, EntryPath};

/// Internal name of ASM's class reader.
pub const ASM_READER: &str = "org/objectweb/asm/ClassReader";

/// Internal name of Spring's repackaged class reader.
pub const SPRING_READER: &str = "org/springframework/asm/ClassReader";

/// A fixed entry timestamp, so round trips can compare it.
pub fn fixed_time() -> DosDateTime {
    // 2021-06-15 10:30:00 UTC
    DosDateTime::from_unix_secs(1_623_753_000)
}

/// Builds an archive from `(path, data)` pairs, in order.
///
/// Paths ending in `/` become directory entries. Nested archives under a
/// library directory are stored, everything else is deflated.
pub fn jar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Vec::new(), 6);
    for (name, data) in entries {
        let path = EntryPath::new(name).expect("valid test path");
        if path.is_directory() {
            writer.add_directory(&path, fixed_time()).unwrap();
        } else {
            let method = if path.is_nested_archive() && path.is_under_library_dir() {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            writer.add_entry(&path, data, method, fixed_time()).unwrap();
        }
    }
    writer.finish().unwrap().0
}

/// A manifest naming `main_class`.
pub fn manifest(main_class: &str) -> Vec<u8> {
    format!("Manifest-Version: 1.0\r\nMain-Class: {main_class}\r\n\r\n").into_bytes()
}

/// Reads every entry of an archive, verifying CRCs on the way.
pub fn entries(archive: &[u8]) -> Vec<ZipEntry> {
    ZipReader::new(archive)
        .unwrap()
        .collect::<jarcloak::Result<Vec<_>>>()
        .unwrap()
}

/// Returns the entry names of an archive in order.
pub fn names(archive: &[u8]) -> Vec<String> {
    entries(archive)
        .into_iter()
        .map(|e| e.path.to_string())
        .collect()
}

/// Returns the data of entry `name`, panicking if it is missing.
pub fn entry_data(archive: &[u8], name: &str) -> Vec<u8> {
    entries(archive)
        .into_iter()
        .find(|e| e.path.as_str() == name)
        .unwrap_or_else(|| panic!("no entry {name}"))
        .data
}

/// An encode hook that reverses the bytes, so encoded data is recognizable.
pub fn reverse(data: &[u8]) -> std::io::Result<Vec<u8>> {
    Ok(data.iter().rev().copied().collect())
}

/// Reverses `data`, for comparing against [`reverse`] output.
pub fn reversed(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// A minimal class named `name` with a no-argument constructor.
pub fn plain_class(name: &str) -> Vec<u8> {
    class_with_constructors(name, &["()V"])
}

/// A class reader shim with the three constructors the patch strengths
/// distinguish between.
pub fn shim_class(name: &str) -> Vec<u8> {
    class_with_constructors(name, &["([BIZ)V", "([BI)V", "(Ljava/io/InputStream;)V"])
}

/// A class whose constructors each call `super()` and return.
pub fn class_with_constructors(name: &str, descriptors: &[&str]) -> Vec<u8> {
    let mut pool = ConstantPool::new();
    let this_class = pool.add_class(name).unwrap();
    let super_class = pool.add_class("java/lang/Object").unwrap();
    let object_init = pool
        .add_methodref("java/lang/Object", "<init>", "()V")
        .unwrap();
    let code_name = pool.add_utf8(CODE).unwrap();
    let init = pool.add_utf8("<init>").unwrap();
    let [hi, lo] = object_init.to_be_bytes();
    let body = CodeAttribute {
        max_stack: 1,
        max_locals: 4,
        // aload_0; invokespecial Object.<init>; return
        code: vec![0x2a, 0xb7, hi, lo, 0xb1],
        exception_table: Vec::new(),
        attributes: Vec::new(),
    }
    .to_bytes()
    .unwrap();

    let methods = descriptors
        .iter()
        .map(|descriptor| Member {
            access_flags: access::PUBLIC,
            name_index: init,
            descriptor_index: pool.add_utf8(descriptor).unwrap(),
            attributes: vec![Attribute {
                name_index: code_name,
                info: body.clone(),
            }],
        })
        .collect();

    ClassFile {
        minor_version: 0,
        major_version: 52,
        constant_pool: pool,
        access_flags: access::PUBLIC,
        this_class,
        super_class,
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods,
        attributes: Vec::new(),
    }
    .to_bytes()
    .unwrap()
}
