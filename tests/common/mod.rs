//! Test fixtures: synthesized classfile bytes and jars, written with the
//! same wire layout the scanner parses (JVMS chapter 4).

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

/// Field access flag combinations used by the fixtures.
pub const PUBLIC: u16 = 0x0001;
pub const PUBLIC_STATIC_FINAL: u16 = 0x0019;

/// A literal placed in the constant pool for a `ConstantValue` attribute.
#[derive(Debug, Clone)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

struct FieldSpec {
    name: String,
    descriptor: String,
    access: u16,
    constant: Option<Literal>,
}

/// Builds the bytes of a single synthetic classfile.
pub struct ClassBytes {
    internal_name: String,
    super_name: String,
    is_interface: bool,
    interfaces: Vec<String>,
    annotations: Vec<(String, Vec<(String, String)>)>,
    fields: Vec<FieldSpec>,
    padding_method: bool,
}

impl ClassBytes {
    /// A public class extending `java/lang/Object` by default.
    pub fn class(internal_name: &str) -> Self {
        ClassBytes {
            internal_name: internal_name.to_owned(),
            super_name: "java/lang/Object".to_owned(),
            is_interface: false,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            padding_method: false,
        }
    }

    /// An interface; its `implements` entries become super-interfaces.
    pub fn interface(internal_name: &str) -> Self {
        let mut built = Self::class(internal_name);
        built.is_interface = true;
        built
    }

    pub fn extends(mut self, internal_name: &str) -> Self {
        self.super_name = internal_name.to_owned();
        self
    }

    pub fn implements(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_owned());
        self
    }

    /// Attaches a runtime-visible annotation by descriptor, e.g. `Lw/Anno;`.
    pub fn annotated(mut self, descriptor: &str) -> Self {
        self.annotations.push((descriptor.to_owned(), Vec::new()));
        self
    }

    /// Annotation carrying one string element, to exercise element parsing.
    pub fn annotated_with_element(mut self, descriptor: &str, name: &str, value: &str) -> Self {
        self.annotations
            .push((descriptor.to_owned(), vec![(name.to_owned(), value.to_owned())]));
        self
    }

    /// A `public static final` field with a `ConstantValue` attribute.
    pub fn constant_field(mut self, name: &str, descriptor: &str, value: Literal) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access: PUBLIC_STATIC_FINAL,
            constant: Some(value),
        });
        self
    }

    /// A field without a `ConstantValue` attribute.
    pub fn plain_field(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access,
            constant: None,
        });
        self
    }

    /// Adds a method whose attributes must be skipped by the parser.
    pub fn padding_method(mut self) -> Self {
        self.padding_method = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = PoolBuilder::default();

        let this_index = pool.class(&self.internal_name);
        let super_index = pool.class(&self.super_name);
        let interface_indices: Vec<u16> =
            self.interfaces.iter().map(|name| pool.class(name)).collect();

        // field_info table
        let mut field_bytes = Vec::new();
        push_u16(&mut field_bytes, self.fields.len() as u16);
        for field in &self.fields {
            push_u16(&mut field_bytes, field.access);
            push_u16(&mut field_bytes, pool.utf8(&field.name));
            push_u16(&mut field_bytes, pool.utf8(&field.descriptor));
            match &field.constant {
                Some(literal) => {
                    let value_index = match literal {
                        Literal::Int(v) => pool.integer(*v),
                        Literal::Long(v) => pool.long(*v),
                        Literal::Float(v) => pool.float(*v),
                        Literal::Double(v) => pool.double(*v),
                        Literal::Str(v) => pool.string(v),
                    };
                    push_u16(&mut field_bytes, 1);
                    push_u16(&mut field_bytes, pool.utf8("ConstantValue"));
                    push_u32(&mut field_bytes, 2);
                    push_u16(&mut field_bytes, value_index);
                }
                None => push_u16(&mut field_bytes, 0),
            }
        }

        // method_info table
        let mut method_bytes = Vec::new();
        if self.padding_method {
            push_u16(&mut method_bytes, 1);
            push_u16(&mut method_bytes, PUBLIC);
            push_u16(&mut method_bytes, pool.utf8("pad"));
            push_u16(&mut method_bytes, pool.utf8("()V"));
            push_u16(&mut method_bytes, 1);
            push_u16(&mut method_bytes, pool.utf8("Code"));
            let junk = [0xABu8; 13];
            push_u32(&mut method_bytes, junk.len() as u32);
            method_bytes.extend_from_slice(&junk);
        } else {
            push_u16(&mut method_bytes, 0);
        }

        // class attribute table
        let mut attribute_bytes = Vec::new();
        if self.annotations.is_empty() {
            push_u16(&mut attribute_bytes, 0);
        } else {
            let mut body = Vec::new();
            push_u16(&mut body, self.annotations.len() as u16);
            for (descriptor, elements) in &self.annotations {
                push_u16(&mut body, pool.utf8(descriptor));
                push_u16(&mut body, elements.len() as u16);
                for (element, value) in elements {
                    push_u16(&mut body, pool.utf8(element));
                    body.push(b's');
                    push_u16(&mut body, pool.utf8(value));
                }
            }
            push_u16(&mut attribute_bytes, 1);
            push_u16(&mut attribute_bytes, pool.utf8("RuntimeVisibleAnnotations"));
            push_u32(&mut attribute_bytes, body.len() as u32);
            attribute_bytes.extend_from_slice(&body);
        }

        let access: u16 = if self.is_interface { 0x0601 } else { 0x0021 };

        let mut bytes = Vec::new();
        push_u32(&mut bytes, 0xCAFEBABE);
        push_u16(&mut bytes, 0); // minor version
        push_u16(&mut bytes, 52); // major version (Java 8)
        push_u16(&mut bytes, pool.count());
        bytes.extend_from_slice(&pool.bytes);
        push_u16(&mut bytes, access);
        push_u16(&mut bytes, this_index);
        push_u16(&mut bytes, super_index);
        push_u16(&mut bytes, interface_indices.len() as u16);
        for index in interface_indices {
            push_u16(&mut bytes, index);
        }
        bytes.extend_from_slice(&field_bytes);
        bytes.extend_from_slice(&method_bytes);
        bytes.extend_from_slice(&attribute_bytes);
        bytes
    }
}

/// Serializes constant pool entries in slot order and hands out their
/// 1-based indices. `Long`/`Double` consume two slots.
#[derive(Default)]
struct PoolBuilder {
    bytes: Vec<u8>,
    used_slots: u16,
}

impl PoolBuilder {
    fn count(&self) -> u16 {
        self.used_slots + 1
    }

    fn claim(&mut self, slots: u16) -> u16 {
        let index = self.used_slots + 1;
        self.used_slots += slots;
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let index = self.claim(1);
        self.bytes.push(1);
        push_u16(&mut self.bytes, value.len() as u16);
        self.bytes.extend_from_slice(value.as_bytes());
        index
    }

    fn integer(&mut self, value: i32) -> u16 {
        let index = self.claim(1);
        self.bytes.push(3);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn float(&mut self, value: f32) -> u16 {
        let index = self.claim(1);
        self.bytes.push(4);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn long(&mut self, value: i64) -> u16 {
        let index = self.claim(2);
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn double(&mut self, value: f64) -> u16 {
        let index = self.claim(2);
        self.bytes.push(6);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.utf8(internal_name);
        let index = self.claim(1);
        self.bytes.push(7);
        push_u16(&mut self.bytes, name_index);
        index
    }

    fn string(&mut self, value: &str) -> u16 {
        let value_index = self.utf8(value);
        let index = self.claim(1);
        self.bytes.push(8);
        push_u16(&mut self.bytes, value_index);
        index
    }
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

/// Writes a classfile (or any bytes) below `root`, creating directories.
pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("relative path has a parent"))
        .expect("fixture directory");
    fs::write(path, bytes).expect("fixture file");
}

/// Writes a jar with the given entries.
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    write_jar_with_options(path, entries, SimpleFileOptions::default());
}

/// Writes a jar whose entries carry a fixed modification timestamp.
pub fn write_jar_dated(path: &Path, entries: &[(&str, &[u8])], timestamp: zip::DateTime) {
    write_jar_with_options(
        path,
        entries,
        SimpleFileOptions::default().last_modified_time(timestamp),
    );
}

fn write_jar_with_options(path: &Path, entries: &[(&str, &[u8])], options: SimpleFileOptions) {
    let file = fs::File::create(path).expect("jar file");
    let mut writer = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        writer.start_file(*name, options.clone()).expect("jar entry");
        writer.write_all(bytes).expect("jar entry bytes");
    }
    writer.finish().expect("finish jar");
}

/// Routes scanner diagnostics through `RUST_LOG` when a test needs them.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
