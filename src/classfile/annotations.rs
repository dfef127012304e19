//! Reader for the `RuntimeVisibleAnnotations` class attribute (JVMS 4.7.16).
//!
//! The scanner only indexes the qualified names of top-level annotations;
//! element values exist here solely so the cursor can be advanced past them,
//! including nested annotations and arrays of values.

use std::io::Cursor;

use crate::classfile::{ClassfileError, constant_pool::ConstantPool, read, skip};

/// Reads one `annotation` structure and returns its qualified name. Nested
/// annotations recurse through the element-value reader and their names are
/// discarded.
pub(in crate::classfile) fn read_annotation(
    reader: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
) -> Result<String, ClassfileError> {
    let descriptor = pool.utf8_at(read::<u16>(reader)?)?;
    let name = annotation_name(descriptor);

    let pair_count = read::<u16>(reader)?;
    for _ in 0..pair_count {
        skip(reader, 2)?; // element name index
        read_element_value(reader, pool)?;
    }

    Ok(name)
}

/// Advances the cursor past a single `element_value` union member.
fn read_element_value(
    reader: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
) -> Result<(), ClassfileError> {
    let tag = read::<u8>(reader)?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => skip(reader, 2),
        b'e' => skip(reader, 4),
        b'c' => skip(reader, 2),
        b'@' => read_annotation(reader, pool).map(|_| ()),
        b'[' => {
            let count = read::<u16>(reader)?;
            for _ in 0..count {
                read_element_value(reader, pool)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Turns a field descriptor like `Lcom/example/Marker;` into the dotted
/// qualified name `com.example.Marker`.
fn annotation_name(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(descriptor)
        .replace('/', ".")
}
