//! Registered match requests and the values handed to their callbacks.
//!
//! Every registration is a value: a tagged variant holding the predicate
//! argument plus the boxed callback, appended in registration order and
//! replayed in that order when a scan dispatches matches.

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::any::Any;
use std::error::Error;
use std::io::{self, Read};
use std::path::Path;

use crate::classfile::fields::ConstantValue;
use crate::scan::graph::TypeKind;

/// A qualified name tagged with the kind of type it denotes. Carrying the
/// kind at registration time is what lets a query be rejected immediately
/// when it is aimed at the wrong kind of type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    name: String,
    kind: TypeKind,
}

impl TypeRef {
    /// References a class, e.g. `TypeRef::class("com.example.Widget")`.
    pub fn class(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            kind: TypeKind::Class,
        }
    }

    /// References an interface.
    pub fn interface(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            kind: TypeKind::Interface,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub(in crate::scan) fn into_name(self) -> String {
        self.name
    }
}

/// An opaque runtime handle produced by the caller-supplied type loader for
/// one matched qualified name.
pub struct TypeHandle {
    name: String,
    payload: Box<dyn Any>,
}

impl TypeHandle {
    pub(in crate::scan) fn new(name: String, payload: Box<dyn Any>) -> Self {
        TypeHandle { name, payload }
    }

    /// The qualified name this handle was loaded for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The loader's payload, if it has the expected type.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

/// A non-classfile classpath resource whose relative path matched a
/// registered pattern. The stream is open only for the duration of the
/// callback; the engine closes it on return.
pub struct FileMatch<'a> {
    /// Filesystem path of the file, or of the archive containing the entry.
    pub absolute: &'a Path,
    /// Path relative to the classpath root, slash-separated.
    pub relative: &'a str,
    /// Contents of the file or archive entry.
    pub reader: &'a mut dyn Read,
}

/// Loads a runtime representation for a matched qualified name.
pub(in crate::scan) type TypeLoader =
    Box<dyn FnMut(&str) -> Result<Box<dyn Any>, Box<dyn Error + Send + Sync>>>;

/// Graph predicate of a registered type query.
pub(in crate::scan) enum TypeQuery {
    SubclassesOf(String),
    SubinterfacesOf(String),
    ImplementorsOf(String),
    AnnotatedWith(String),
}

pub(in crate::scan) struct TypeMatcher {
    pub query: TypeQuery,
    pub callback: Box<dyn FnMut(&TypeHandle)>,
}

pub(in crate::scan) struct FieldMatcher {
    /// Class qualified name to the simple names of its wanted fields.
    pub targets: IndexMap<String, IndexSet<String>>,
    pub callback: Box<dyn FnMut(&str, &str, &ConstantValue)>,
}

pub(in crate::scan) struct PathMatcher {
    pub pattern: Regex,
    pub callback: Box<dyn FnMut(FileMatch<'_>) -> io::Result<()>>,
}
