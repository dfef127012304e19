//! The scanner facade: classpath roots and package scope configuration,
//! match registration, scanning, and the queries served from the finalized
//! class graph.
//!
//! A [`Scanner`] owns every piece of per-scan state exclusively. Mutation
//! happens only while [`Scanner::scan`] traverses the classpath; once the
//! graph finalizes, all tables are read-only until the next scan resets
//! them. Registered callbacks fire in registration order, and closure
//! queries return names in a deterministic, insertion-derived order.

mod filter;
mod graph;
mod matchers;
mod walk;

pub use graph::TypeKind;
pub use matchers::{FileMatch, TypeHandle, TypeRef};

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::any::Any;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::{Instant, SystemTime};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::classfile::ConstantTargets;
use crate::classfile::fields::ConstantValue;
use filter::PackageFilter;
use graph::ClassGraph;
use matchers::{FieldMatcher, PathMatcher, TypeLoader, TypeMatcher, TypeQuery};

pub(crate) type Result<T, E = ScanError> = std::result::Result<T, E>;

#[derive(ThisError, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("{0} names an interface where a class is required")]
    NotAClass(String),
    #[error("{0} does not name an interface")]
    NotAnInterface(String),
    #[error("{0} is not a fully qualified field name")]
    InvalidFieldName(String),
    #[error("failed to load type {name}")]
    TypeLoad {
        name: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Indexes the class files reachable from a set of classpath roots into a
/// queryable graph of type relations, annotations, and selected constants.
pub struct Scanner {
    roots: Vec<PathBuf>,
    filter: PackageFilter,
    use_entry_timestamps: bool,
    type_matchers: Vec<TypeMatcher>,
    field_matchers: Vec<FieldMatcher>,
    path_matchers: Vec<PathMatcher>,
    loader: TypeLoader,
    graph: ClassGraph,
    /// Qualified names already seen in the current scan; the first
    /// classfile bearing a name masks every later one.
    encountered: IndexSet<String>,
    classfiles_parsed: usize,
    last_scan_max: Option<SystemTime>,
}

impl Scanner {
    /// Creates a scanner over `roots` (directories and `.jar`/`.zip`
    /// archives, in priority order, deduplicated) restricted by `packages`:
    /// dotted package prefixes to include, `-`-prefixed ones to exclude,
    /// and an empty entry (or no entries) to scan everything.
    pub fn new<R, P>(roots: R, packages: &[&str]) -> Self
    where
        R: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut deduped: IndexSet<PathBuf> = IndexSet::new();
        for root in roots {
            deduped.insert(root.into());
        }

        Scanner {
            roots: deduped.into_iter().collect(),
            filter: PackageFilter::new(packages),
            use_entry_timestamps: false,
            type_matchers: Vec::new(),
            field_matchers: Vec::new(),
            path_matchers: Vec::new(),
            loader: Box::new(|_| Ok(Box::new(()))),
            graph: ClassGraph::default(),
            encountered: IndexSet::new(),
            classfiles_parsed: 0,
            last_scan_max: None,
        }
    }

    /// Feeds the modification-timestamp maximum from each archive's own
    /// entries instead of the archive file's timestamp. Off by default;
    /// entry timestamps are generally less trustworthy.
    pub fn use_archive_entry_timestamps(&mut self, use_entries: bool) -> &mut Self {
        self.use_entry_timestamps = use_entries;
        self
    }

    /// Installs the loader that turns matched qualified names into runtime
    /// handles for the match callbacks. The default loader produces an
    /// empty payload.
    pub fn with_type_loader(
        &mut self,
        loader: impl FnMut(&str) -> Result<Box<dyn Any>, Box<dyn Error + Send + Sync>> + 'static,
    ) -> &mut Self {
        self.loader = Box::new(loader);
        self
    }

    /// Calls `callback` for every class transitively extending
    /// `superclass`. Fails immediately when `superclass` references an
    /// interface.
    pub fn register_subclass_match(
        &mut self,
        superclass: TypeRef,
        callback: impl FnMut(&TypeHandle) + 'static,
    ) -> Result<&mut Self> {
        if superclass.kind() == TypeKind::Interface {
            return Err(ScanError::NotAClass(superclass.into_name()));
        }
        self.type_matchers.push(TypeMatcher {
            query: TypeQuery::SubclassesOf(superclass.into_name()),
            callback: Box::new(callback),
        });
        Ok(self)
    }

    /// Calls `callback` for every interface transitively extending
    /// `superinterface`. Fails immediately when `superinterface` references
    /// a class.
    pub fn register_subinterface_match(
        &mut self,
        superinterface: TypeRef,
        callback: impl FnMut(&TypeHandle) + 'static,
    ) -> Result<&mut Self> {
        if superinterface.kind() == TypeKind::Class {
            return Err(ScanError::NotAnInterface(superinterface.into_name()));
        }
        self.type_matchers.push(TypeMatcher {
            query: TypeQuery::SubinterfacesOf(superinterface.into_name()),
            callback: Box::new(callback),
        });
        Ok(self)
    }

    /// Calls `callback` for every class that implements `interface`,
    /// directly or through a superclass or subinterface. Fails immediately
    /// when `interface` references a class.
    pub fn register_implementation_match(
        &mut self,
        interface: TypeRef,
        callback: impl FnMut(&TypeHandle) + 'static,
    ) -> Result<&mut Self> {
        if interface.kind() == TypeKind::Class {
            return Err(ScanError::NotAnInterface(interface.into_name()));
        }
        self.type_matchers.push(TypeMatcher {
            query: TypeQuery::ImplementorsOf(interface.into_name()),
            callback: Box::new(callback),
        });
        Ok(self)
    }

    /// Calls `callback` for every class whose own annotation set contains
    /// `annotation` (annotations are not inherited).
    pub fn register_annotation_match(
        &mut self,
        annotation: impl Into<String>,
        callback: impl FnMut(&TypeHandle) + 'static,
    ) -> &mut Self {
        self.type_matchers.push(TypeMatcher {
            query: TypeQuery::AnnotatedWith(annotation.into()),
            callback: Box::new(callback),
        });
        self
    }

    /// Calls `callback` with `(class name, field name, value)` for each
    /// listed `static final` field whose classfile carries a compile-time
    /// constant. Entries are fully qualified field names such as
    /// `com.example.Config.TIMEOUT`. Matches are delivered while the scan
    /// parses the declaring classfile.
    pub fn register_static_final_field_match<I, S>(
        &mut self,
        field_names: I,
        callback: impl FnMut(&str, &str, &ConstantValue) + 'static,
    ) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut targets: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for qualified in field_names {
            let qualified = qualified.into();
            match qualified.rsplit_once('.') {
                Some((class, field)) if !class.is_empty() && !field.is_empty() => {
                    targets
                        .entry(class.to_owned())
                        .or_default()
                        .insert(field.to_owned());
                }
                _ => return Err(ScanError::InvalidFieldName(qualified)),
            }
        }
        self.field_matchers.push(FieldMatcher {
            targets,
            callback: Box::new(callback),
        });
        Ok(self)
    }

    /// Calls `callback` with an open stream for every non-classfile whose
    /// relative path fully matches `pattern`. Fails immediately when the
    /// pattern is not a valid regular expression.
    pub fn register_path_pattern_match(
        &mut self,
        pattern: &str,
        callback: impl FnMut(FileMatch<'_>) -> io::Result<()> + 'static,
    ) -> Result<&mut Self> {
        let anchored = Regex::new(&format!("^(?:{pattern})$"))?;
        self.path_matchers.push(PathMatcher {
            pattern: anchored,
            callback: Box::new(callback),
        });
        Ok(self)
    }

    /// Performs a full scan: clears all previous state, traverses every
    /// root, finalizes the graph, then dispatches the registered type
    /// matches through the type loader.
    pub fn scan(&mut self) -> Result<()> {
        let started = Instant::now();
        self.encountered.clear();
        self.graph.reset();
        self.classfiles_parsed = 0;

        let max_mtime = self.traverse(false)?;
        self.graph.finalize();
        self.last_scan_max = Some(max_mtime.unwrap_or(SystemTime::UNIX_EPOCH));

        debug!(
            "scan finished in {:?}: {} classfiles parsed, {} names recorded",
            started.elapsed(),
            self.classfiles_parsed,
            self.graph.all_names().count()
        );

        self.dispatch_matches()
    }

    /// Re-traverses the classpath updating only the modification-timestamp
    /// maximum, and reports whether anything in scope is newer than the
    /// last full scan. Always true before the first scan.
    pub fn classpath_modified_since_last_scan(&mut self) -> Result<bool> {
        self.encountered.clear();
        let max_mtime = self.traverse(true)?;
        Ok(match self.last_scan_max {
            None => true,
            Some(previous) => max_mtime.is_some_and(|observed| observed > previous),
        })
    }

    pub fn names_of_subclasses_of(&self, class_name: &str) -> &[String] {
        self.graph.subclasses_of(class_name)
    }

    pub fn names_of_superclasses_of(&self, class_name: &str) -> &[String] {
        self.graph.superclasses_of(class_name)
    }

    pub fn names_of_subinterfaces_of(&self, interface_name: &str) -> &[String] {
        self.graph.subinterfaces_of(interface_name)
    }

    pub fn names_of_superinterfaces_of(&self, interface_name: &str) -> &[String] {
        self.graph.superinterfaces_of(interface_name)
    }

    pub fn names_of_classes_implementing(&self, interface_name: &str) -> &[String] {
        self.graph.implementors_of(interface_name)
    }

    pub fn names_of_classes_with_annotation(&self, annotation_name: &str) -> &[String] {
        self.graph.classes_with_annotation(annotation_name)
    }

    /// Every class and interface name recorded by the last scan, in the
    /// order they were first encountered.
    pub fn names_of_all_classes(&self) -> impl Iterator<Item = &str> {
        self.graph.all_names()
    }

    fn traverse(&mut self, timestamp_only: bool) -> Result<Option<SystemTime>> {
        let targets = if timestamp_only {
            ConstantTargets::new()
        } else {
            self.constant_targets()
        };

        let mut max_mtime = None;
        let roots = self.roots.clone();
        for root in &roots {
            if root.is_dir() {
                self.walk_directory(root, &targets, timestamp_only, &mut max_mtime)?;
            } else if root.is_file() && walk::is_archive(root) {
                self.walk_archive(root, &targets, timestamp_only, &mut max_mtime)?;
            } else {
                warn!(
                    "classpath root {} is not a directory or archive, skipping",
                    root.display()
                );
            }
        }
        Ok(max_mtime)
    }

    /// Flattens the registered field matchers into a lookup the classfile
    /// parser can consult per class and field name.
    fn constant_targets(&self) -> ConstantTargets {
        let mut targets = ConstantTargets::new();
        for (index, matcher) in self.field_matchers.iter().enumerate() {
            for (class, fields) in &matcher.targets {
                let per_class = targets.entry(class.clone()).or_default();
                for field in fields {
                    per_class.entry(field.clone()).or_default().push(index);
                }
            }
        }
        targets
    }

    /// Replays every registered type query against the finalized graph, in
    /// registration order. A loader failure aborts the whole dispatch.
    fn dispatch_matches(&mut self) -> Result<()> {
        for matcher in &mut self.type_matchers {
            let names: Vec<String> = match &matcher.query {
                TypeQuery::SubclassesOf(name) => self.graph.subclasses_of(name).to_vec(),
                TypeQuery::SubinterfacesOf(name) => self.graph.subinterfaces_of(name).to_vec(),
                TypeQuery::ImplementorsOf(name) => self.graph.implementors_of(name).to_vec(),
                TypeQuery::AnnotatedWith(name) => {
                    self.graph.classes_with_annotation(name).to_vec()
                }
            };
            for name in names {
                let payload = (self.loader)(&name).map_err(|source| ScanError::TypeLoad {
                    name: name.clone(),
                    source,
                })?;
                (matcher.callback)(&TypeHandle::new(name, payload));
            }
        }
        Ok(())
    }
}
