//! Lustra indexes a classpath — an ordered set of directories and
//! `.jar`/`.zip` archives — into a queryable graph of JVM type relations,
//! without loading or executing any of the classes it finds.
//!
//! A [`Scanner`] walks the roots, parses each classfile's binary header
//! (constant pool, superclass, interfaces, class-level annotations, and the
//! compile-time constants of selected `static final` fields), and builds
//! transitive closures over class extension, interface extension, and
//! interface implementation. Duplicate qualified names are masked by the
//! first occurrence on the classpath. Non-classfiles can be matched against
//! path patterns and streamed to callbacks.
//!
//! ```no_run
//! use lustra::{Scanner, TypeRef};
//!
//! # fn main() -> Result<(), lustra::ScanError> {
//! let mut scanner = Scanner::new(["build/classes", "lib/app.jar"], &["com.example"]);
//! scanner.register_implementation_match(
//!     TypeRef::interface("com.example.Plugin"),
//!     |handle| println!("plugin: {}", handle.name()),
//! )?;
//! scanner.scan()?;
//!
//! for name in scanner.names_of_subclasses_of("com.example.Widget") {
//!     println!("widget: {name}");
//! }
//! # Ok(())
//! # }
//! ```

mod classfile;
mod scan;

pub use classfile::fields::ConstantValue;
pub use scan::{FileMatch, ScanError, Scanner, TypeHandle, TypeKind, TypeRef};
