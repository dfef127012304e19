//! Binary parsing of `.class` file headers as defined by the Java Virtual
//! Machine specification.
//!
//! Unlike a class loader, the scanner never materializes a full class file.
//! It decodes the prelude and constant pool, then walks the header
//! structures to pull out exactly what the classpath index needs:
//!
//! - the type's qualified name, its kind (class or interface), its
//!   superclass and directly declared interfaces;
//! - the qualified names in the `RuntimeVisibleAnnotations` class attribute;
//! - the literals of `static final` fields the caller asked for, from their
//!   `ConstantValue` attributes.
//!
//! Everything else, method bodies included, is skipped structurally.

mod annotations;
mod constant_pool;
pub(crate) mod fields;

use bitflags::bitflags;
use bumpalo::Bump;
use indexmap::{IndexMap, IndexSet};
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{trace, warn};

use self::constant_pool::{ConstantPool, ConstantPoolError};
use self::fields::{ConstantValue, FieldFlags};

/// Magic header number for a `.class` file.
pub(crate) const MAGIC: u32 = 0xCAFEBABE;

/// The root of the class hierarchy; the only type with no superclass.
pub(crate) const ROOT_OBJECT: &str = "java.lang.Object";

/// The type relations one parsed class file contributes to the graph.
#[derive(Debug, PartialEq, Clone)]
pub(crate) enum TypeOutline {
    Class {
        name: String,
        super_name: String,
        interfaces: Vec<String>,
        annotations: Vec<String>,
    },
    Interface {
        name: String,
        super_interfaces: Vec<String>,
    },
}

/// Static-final fields whose constants the caller asked for, keyed by class
/// qualified name, then field simple name, to the registrations wanting it.
pub(crate) type ConstantTargets = IndexMap<String, IndexMap<String, Vec<usize>>>;

/// One decoded constant for a registered target field.
#[derive(Debug, Clone)]
pub(crate) struct ConstantHit {
    pub matcher: usize,
    pub class: String,
    pub field: String,
    pub value: ConstantValue,
}

#[derive(Error, Debug)]
pub enum ClassfileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not a classfile: magic number doesn't match")]
    InvalidClassfile,
    #[error("classfile ends before a structure it declares")]
    Truncated,
    #[error("invalid modified UTF-8 string: {0}")]
    InvalidUtf8(#[from] cesu8::Cesu8DecodingError),
    #[error(transparent)]
    ConstantPool(#[from] ConstantPoolError),
}

bitflags! {
    /// Class access and property flags (JVMS 4.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct AccessFlags: u16 {
        /// Declared public; may be accessed from outside its package.
        const PUBLIC = 0x0001;
        /// Declared final; no subclasses allowed.
        const FINAL = 0x0010;
        /// Treat superclass methods specially on invokespecial.
        const SUPER = 0x0020;
        /// Is an interface, not a class.
        const INTERFACE = 0x0200;
        /// Declared abstract; must not be instantiated.
        const ABSTRACT = 0x0400;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface.
        const ANNOTATION = 0x2000;
        /// Declared as an enum class.
        const ENUM = 0x4000;
        /// Is a module, not a class or interface.
        const MODULE = 0x8000;
    }
}

/// Parses the header of one class file and returns the relations it
/// contributes, or `None` when the stream is the root object type or a name
/// already seen in this scan (first occurrence on the classpath wins).
///
/// The shadowing set is updated as soon as the name is known, before fields
/// and annotations are decoded, so a duplicate that later turns out to be
/// malformed still counts as seen.
pub(crate) fn read_outline(
    buffer: &[u8],
    arena: &Bump,
    encountered: &mut IndexSet<String>,
    targets: &ConstantTargets,
    hits: &mut Vec<ConstantHit>,
) -> Result<Option<TypeOutline>, ClassfileError> {
    let mut reader = Cursor::new(buffer);

    let magic = read::<u32>(&mut reader)?;
    if magic != MAGIC {
        return Err(ClassfileError::InvalidClassfile);
    }
    skip(&mut reader, 4)?; // minor and major version

    let pool = ConstantPool::read(&mut reader, arena)?;
    let access_flags = AccessFlags::from_bits_truncate(read::<u16>(&mut reader)?);

    let name = dotted(pool.class_name_at(read::<u16>(&mut reader)?)?);
    if name == ROOT_OBJECT {
        return Ok(None);
    }
    if !encountered.insert(name.clone()) {
        trace!("{name} already seen on the classpath, masking this occurrence");
        return Ok(None);
    }

    let super_name = dotted(pool.class_name_at(read::<u16>(&mut reader)?)?);

    let interface_count = read::<u16>(&mut reader)?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(dotted(pool.class_name_at(read::<u16>(&mut reader)?)?));
    }

    read_fields(&mut reader, &pool, &name, targets, hits)?;
    skip_methods(&mut reader)?;
    let annotations = read_class_attributes(&mut reader, &pool)?;

    let outline = if access_flags.contains(AccessFlags::INTERFACE) {
        TypeOutline::Interface {
            name,
            super_interfaces: interfaces,
        }
    } else {
        TypeOutline::Class {
            name,
            super_name,
            interfaces,
            annotations,
        }
    };
    Ok(Some(outline))
}

/// Walks the field table, decoding `ConstantValue` attributes of fields the
/// caller registered for and skipping everything else.
fn read_fields(
    reader: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
    class_name: &str,
    targets: &ConstantTargets,
    hits: &mut Vec<ConstantHit>,
) -> Result<(), ClassfileError> {
    let wanted_fields = targets.get(class_name);

    let field_count = read::<u16>(reader)?;
    for _ in 0..field_count {
        let flags = FieldFlags::from_bits_truncate(read::<u16>(reader)?);
        let field_name = pool.utf8_at(read::<u16>(reader)?)?;
        let descriptor = pool.utf8_at(read::<u16>(reader)?)?;
        let attribute_count = read::<u16>(reader)?;

        let wanted = wanted_fields.and_then(|fields| fields.get(field_name));
        let candidate = flags.is_constant_candidate();
        if wanted.is_some() && !candidate {
            warn!(
                "match registered for {class_name}.{field_name}, but the field is not both static and final"
            );
        }

        let mut emitted = false;
        for _ in 0..attribute_count {
            let attribute_name = pool.utf8_at(read::<u16>(reader)?)?;
            let length = read::<u32>(reader)? as u64;

            match wanted {
                Some(matchers)
                    if candidate && !emitted && attribute_name == "ConstantValue" && length >= 2 =>
                {
                    let value_index = read::<u16>(reader)?;
                    skip(reader, length - 2)?;
                    emitted = true;
                    let Some(value) =
                        fields::decode_constant(pool, value_index, descriptor, class_name, field_name)?
                    else {
                        continue;
                    };
                    for &matcher in matchers {
                        hits.push(ConstantHit {
                            matcher,
                            class: class_name.to_owned(),
                            field: field_name.to_owned(),
                            value: value.clone(),
                        });
                    }
                }
                _ => skip(reader, length)?,
            }
        }

        if wanted.is_some() && candidate && !emitted {
            warn!("{class_name}.{field_name} is static final but has no compile-time constant");
        }
    }

    Ok(())
}

/// The method table carries nothing the index needs; skip it in full.
fn skip_methods(reader: &mut Cursor<&[u8]>) -> Result<(), ClassfileError> {
    let method_count = read::<u16>(reader)?;
    for _ in 0..method_count {
        skip(reader, 6)?; // access flags, name index, descriptor index
        let attribute_count = read::<u16>(reader)?;
        for _ in 0..attribute_count {
            skip(reader, 2)?;
            let length = read::<u32>(reader)? as u64;
            skip(reader, length)?;
        }
    }
    Ok(())
}

/// Walks the class attribute table and collects the qualified names listed
/// in `RuntimeVisibleAnnotations`, skipping every other attribute.
fn read_class_attributes(
    reader: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
) -> Result<Vec<String>, ClassfileError> {
    let mut names = Vec::new();

    let attribute_count = read::<u16>(reader)?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8_at(read::<u16>(reader)?)?;
        let length = read::<u32>(reader)? as u64;
        if attribute_name == "RuntimeVisibleAnnotations" {
            let annotation_count = read::<u16>(reader)?;
            for _ in 0..annotation_count {
                names.push(annotations::read_annotation(reader, pool)?);
            }
        } else {
            skip(reader, length)?;
        }
    }

    Ok(names)
}

fn dotted(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}

trait FromBeBytes {
    type Bytes: Sized;
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_from_be_bytes {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromBeBytes for $t {
                type Bytes = [u8; core::mem::size_of::<$t>()];
                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$t>::from_be_bytes(bytes)
                }
            }
        )*
    };
}

impl_from_be_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

pub(in crate::classfile) fn read<T>(reader: &mut impl Read) -> Result<T, ClassfileError>
where
    T: FromBeBytes,
    T::Bytes: AsMut<[u8]> + Default,
{
    let mut bytes = T::Bytes::default();
    reader.read_exact(bytes.as_mut())?;

    Ok(T::from_be_bytes(bytes))
}

/// Decodes a length-prefixed modified UTF-8 payload into the arena.
pub(in crate::classfile) fn read_utf8<'c>(
    reader: &mut Cursor<&[u8]>,
    arena: &'c Bump,
) -> Result<&'c str, ClassfileError> {
    let length = read::<u16>(reader)? as usize;
    let buffer = *reader.get_ref();
    let start = reader.position() as usize;
    let end = start
        .checked_add(length)
        .filter(|end| *end <= buffer.len())
        .ok_or(ClassfileError::Truncated)?;

    let decoded = cesu8::from_java_cesu8(&buffer[start..end])?;
    reader.set_position(end as u64);
    Ok(arena.alloc_str(&decoded))
}

/// Advances the cursor by `count` bytes, bounds-checked against the buffer.
pub(in crate::classfile) fn skip(
    reader: &mut Cursor<&[u8]>,
    count: u64,
) -> Result<(), ClassfileError> {
    let end = reader
        .position()
        .checked_add(count)
        .filter(|end| *end <= reader.get_ref().len() as u64)
        .ok_or(ClassfileError::Truncated)?;
    reader.set_position(end);
    Ok(())
}
