//! Field handling for the scanner: access flags, and decoding of the
//! compile-time literal a `ConstantValue` attribute points at.
//!
//! A `field_info` structure represents a field (instance variable or class
//! variable) of a Java class; only `static final` fields may carry a
//! `ConstantValue` attribute (JVMS 4.7.2).

use bitflags::bitflags;
use tracing::warn;

use crate::classfile::constant_pool::{ConstantPool, ConstantPoolEntry, ConstantPoolError};

bitflags! {
    /// `field_info` access flags defined by JVMS 4.5.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct FieldFlags: u16 {
        /// Declared public; may be accessed from outside its package.
        const PUBLIC    = 0x0001;
        /// Declared private; accessible only within the defining class.
        const PRIVATE   = 0x0002;
        /// Declared protected; may be accessed within subclasses.
        const PROTECTED = 0x0004;
        /// Declared static.
        const STATIC    = 0x0008;
        /// Declared final; never directly assigned to after construction.
        const FINAL     = 0x0010;
        /// Declared volatile; cannot be cached.
        const VOLATILE  = 0x0040;
        /// Declared transient; not written by a persistent object manager.
        const TRANSIENT = 0x0080;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
        /// Declared as an element of an enum class.
        const ENUM      = 0x4000;
    }
}

impl FieldFlags {
    /// Only fields with both bits set can carry a compile-time constant.
    pub fn is_constant_candidate(self) -> bool {
        self.contains(FieldFlags::STATIC | FieldFlags::FINAL)
    }
}

/// A decoded compile-time constant of a `static final` field, coerced to
/// the type the field's descriptor declares.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Char(char),
    Str(String),
}

/// Fetches the literal at `index` and coerces it according to the field
/// descriptor. `B`, `C`, `S` and `Z` are stored as 32-bit integers in the
/// pool and narrowed here. Returns `None` (with a diagnostic) when the
/// descriptor names a type that cannot be constant-initialized or the pool
/// entry does not fit it.
pub(in crate::classfile) fn decode_constant(
    pool: &ConstantPool,
    index: u16,
    descriptor: &str,
    class_name: &str,
    field_name: &str,
) -> Result<Option<ConstantValue>, ConstantPoolError> {
    let entry = pool.get(index)?;
    let value = match (descriptor, entry) {
        ("B", ConstantPoolEntry::Integer(v)) => ConstantValue::Byte(*v as i8),
        ("C", ConstantPoolEntry::Integer(v)) => ConstantValue::Char(
            char::from_u32(*v as u16 as u32).unwrap_or(char::REPLACEMENT_CHARACTER),
        ),
        ("S", ConstantPoolEntry::Integer(v)) => ConstantValue::Short(*v as i16),
        ("Z", ConstantPoolEntry::Integer(v)) => ConstantValue::Boolean(*v != 0),
        ("I", ConstantPoolEntry::Integer(v)) => ConstantValue::Int(*v),
        ("J", ConstantPoolEntry::Long(v)) => ConstantValue::Long(*v),
        ("F", ConstantPoolEntry::Float(v)) => ConstantValue::Float(*v),
        ("D", ConstantPoolEntry::Double(v)) => ConstantValue::Double(*v),
        ("Ljava/lang/String;", ConstantPoolEntry::StringRef(_)) => {
            ConstantValue::Str(pool.string_at(index)?.to_owned())
        }
        _ => {
            warn!(
                "constant of {class_name}.{field_name} has unsupported descriptor {descriptor}"
            );
            return Ok(None);
        }
    };

    Ok(Some(value))
}
