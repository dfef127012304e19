//! Constant pool decoding for the scanner.
//!
//! Header fields of a class file never embed strings directly; they refer to
//! slots of the `constant_pool` table. The scanner only needs a small
//! projection of it: UTF-8 payloads, the numeric literals a `ConstantValue`
//! attribute can point at, and the `Class`/`String` reference entries whose
//! referent index resolves to a UTF-8 slot. Every other entry kind is
//! skipped structurally so the cursor stays aligned.
//!
//! Specification for the [constant pool] layout in the JVM.
//!
//! [constant pool]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.4

use bumpalo::{Bump, collections::Vec};
use num_enum::TryFromPrimitive;
use std::io::Cursor;
use thiserror::Error;
use tracing::trace;

use crate::classfile::{ClassfileError, read, read_utf8, skip};

/// Constant pool of a given Java class, indexed from 1. Slot 0 and the
/// shadow slot after every `Long`/`Double` entry are unusable.
#[derive(Debug, PartialEq)]
pub(in crate::classfile) struct ConstantPool<'c> {
    entries: Vec<'c, Option<ConstantPoolEntry<'c>>>,
}

/// The subset of pool entries the scanner retains. `Class` and `StringRef`
/// keep their 16-bit referent index and resolve through the table on
/// access, so forward references need no separate resolution pass.
#[derive(Debug, PartialEq, Clone, Copy)]
pub(in crate::classfile) enum ConstantPoolEntry<'c> {
    Utf8(&'c str),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    StringRef(u16),
}

/// Tags defined by the class file format. Entries the scanner does not
/// retain still need their tag known so their payload can be skipped.
#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
enum PoolTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    FieldRef = 9,
    MethodRef = 10,
    InterfaceMethodRef = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

#[derive(Error, Debug, PartialEq)]
pub(crate) enum ConstantPoolError {
    #[error("invalid index location: {0}")]
    InvalidIndex(u16),
    #[error("accessed reserved slot: {0}")]
    UnusableSlot(u16),
    #[error("entry {0} is not a utf8 string")]
    NotUtf8(u16),
    #[error("entry {0} is not a class reference")]
    NotClass(u16),
}

impl<'c> ConstantPool<'c> {
    pub fn read<'b>(
        reader: &mut Cursor<&'b [u8]>,
        arena: &'c Bump,
    ) -> Result<Self, ClassfileError> {
        let count = read::<u16>(reader)? as usize;
        let mut entries = Vec::with_capacity_in(count, arena);
        entries.push(None);

        while entries.len() < count {
            let tag = read::<u8>(reader)?;
            match PoolTag::try_from(tag) {
                Ok(PoolTag::Utf8) => {
                    entries.push(Some(ConstantPoolEntry::Utf8(read_utf8(reader, arena)?)));
                }
                Ok(PoolTag::Integer) => {
                    entries.push(Some(ConstantPoolEntry::Integer(read::<i32>(reader)?)));
                }
                Ok(PoolTag::Float) => {
                    entries.push(Some(ConstantPoolEntry::Float(read::<f32>(reader)?)));
                }
                Ok(PoolTag::Long) => {
                    entries.push(Some(ConstantPoolEntry::Long(read::<i64>(reader)?)));
                    entries.push(None);
                }
                Ok(PoolTag::Double) => {
                    entries.push(Some(ConstantPoolEntry::Double(read::<f64>(reader)?)));
                    entries.push(None);
                }
                Ok(PoolTag::Class) => {
                    entries.push(Some(ConstantPoolEntry::Class(read::<u16>(reader)?)));
                }
                Ok(PoolTag::String) => {
                    entries.push(Some(ConstantPoolEntry::StringRef(read::<u16>(reader)?)));
                }
                Ok(
                    PoolTag::FieldRef
                    | PoolTag::MethodRef
                    | PoolTag::InterfaceMethodRef
                    | PoolTag::NameAndType
                    | PoolTag::Dynamic
                    | PoolTag::InvokeDynamic,
                ) => {
                    skip(reader, 4)?;
                    entries.push(None);
                }
                Ok(PoolTag::MethodHandle) => {
                    skip(reader, 3)?;
                    entries.push(None);
                }
                Ok(PoolTag::MethodType | PoolTag::Module | PoolTag::Package) => {
                    skip(reader, 2)?;
                    entries.push(None);
                }
                Err(_) => {
                    trace!("unknown constant pool tag {tag}, continuing");
                    entries.push(None);
                }
            }
        }

        Ok(ConstantPool { entries })
    }

    /// Tries to access a [pool entry](ConstantPoolEntry) in a given index.
    ///
    /// **Note**: it uses 1-based indexing.
    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry<'c>, ConstantPoolError> {
        match self.entries.get(index as usize) {
            Some(Some(entry)) if index != 0 => Ok(entry),
            Some(None) => Err(ConstantPoolError::UnusableSlot(index)),
            _ => Err(ConstantPoolError::InvalidIndex(index)),
        }
    }

    /// Resolves `index` to a UTF-8 payload.
    pub fn utf8_at(&self, index: u16) -> Result<&'c str, ConstantPoolError> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(string) => Ok(string),
            _ => Err(ConstantPoolError::NotUtf8(index)),
        }
    }

    /// Resolves a `Class` entry at `index` through its name slot. The
    /// referent may live at a higher slot than the reference itself.
    pub fn class_name_at(&self, index: u16) -> Result<&'c str, ConstantPoolError> {
        match self.get(index)? {
            ConstantPoolEntry::Class(name_index) => self.utf8_at(*name_index),
            _ => Err(ConstantPoolError::NotClass(index)),
        }
    }

    /// Resolves a `String` entry at `index` to its literal payload.
    pub fn string_at(&self, index: u16) -> Result<&'c str, ConstantPoolError> {
        match self.get(index)? {
            ConstantPoolEntry::StringRef(value_index) => self.utf8_at(*value_index),
            _ => Err(ConstantPoolError::NotUtf8(index)),
        }
    }
}
