//! The class graph: direct type relations accumulated during traversal and
//! the transitive closures derived from them when a scan finalizes.
//!
//! Tables are keyed by qualified name, never by object references, so the
//! graph stays acyclic in memory even when the input relations are not.
//! Names referenced but never parsed (the terminal `java.lang.Object`, or
//! types outside the scanned packages) participate in edges and closures
//! without being recorded as scanned names.

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::OnceCell;
use std::collections::VecDeque;

use crate::classfile::TypeOutline;

/// Whether a qualified name was recorded as a class or an interface. One
/// scan records at most one kind per name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
}

/// Direct relations plus memoized closures. Mutated only while a scan
/// traverses the classpath; read-only once finalized.
#[derive(Debug, Default)]
pub(in crate::scan) struct ClassGraph {
    /// Recorded names and their kind, in first-encountered order.
    kinds: IndexMap<String, TypeKind>,
    /// Class name to its declared superclass.
    super_of: IndexMap<String, String>,
    /// Class name to its directly declared interfaces.
    ifaces_of: IndexMap<String, Vec<String>>,
    /// Interface name to the interfaces it directly extends.
    super_ifaces_of: IndexMap<String, Vec<String>>,
    /// Class name to its runtime-visible annotation names.
    annotations_of: IndexMap<String, Vec<String>>,
    closures: OnceCell<Closures>,
}

#[derive(Debug)]
struct Closures {
    subclasses: IndexMap<String, Vec<String>>,
    superclasses: IndexMap<String, Vec<String>>,
    subinterfaces: IndexMap<String, Vec<String>>,
    superinterfaces: IndexMap<String, Vec<String>>,
    implementors: IndexMap<String, Vec<String>>,
    annotated: IndexMap<String, Vec<String>>,
}

impl ClassGraph {
    /// Drops all state from a previous scan.
    pub fn reset(&mut self) {
        self.kinds.clear();
        self.super_of.clear();
        self.ifaces_of.clear();
        self.super_ifaces_of.clear();
        self.annotations_of.clear();
        self.closures.take();
    }

    /// Appends the direct relations of one parsed type. Shadowing upstream
    /// guarantees each name is recorded at most once per scan.
    pub fn record(&mut self, outline: TypeOutline) {
        match outline {
            TypeOutline::Class {
                name,
                super_name,
                interfaces,
                annotations,
            } => {
                self.kinds.insert(name.clone(), TypeKind::Class);
                if !interfaces.is_empty() {
                    self.ifaces_of.insert(name.clone(), interfaces);
                }
                if !annotations.is_empty() {
                    self.annotations_of.insert(name.clone(), annotations);
                }
                self.super_of.insert(name, super_name);
            }
            TypeOutline::Interface {
                name,
                super_interfaces,
            } => {
                self.kinds.insert(name.clone(), TypeKind::Interface);
                if !super_interfaces.is_empty() {
                    self.super_ifaces_of.insert(name, super_interfaces);
                }
            }
        }
    }

    /// Derives every reverse edge and transitive closure from the direct
    /// tables. Queries return empty results until this has run.
    pub fn finalize(&mut self) {
        self.closures.take();
        let closures = self.compute_closures();
        let _ = self.closures.set(closures);
    }

    fn compute_closures(&self) -> Closures {
        let mut subs_of: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (child, parent) in &self.super_of {
            subs_of.entry(parent.as_str()).or_default().push(child.as_str());
        }
        let mut sub_ifaces_of: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (child, parents) in &self.super_ifaces_of {
            for parent in parents {
                sub_ifaces_of
                    .entry(parent.as_str())
                    .or_default()
                    .push(child.as_str());
            }
        }
        let up_ifaces: IndexMap<&str, Vec<&str>> = self
            .super_ifaces_of
            .iter()
            .map(|(child, parents)| {
                (child.as_str(), parents.iter().map(String::as_str).collect())
            })
            .collect();

        let subclasses = reachability(&subs_of);
        let subinterfaces = reachability(&sub_ifaces_of);
        let superinterfaces = reachability(&up_ifaces);

        let mut superclasses: IndexMap<String, Vec<String>> = IndexMap::new();
        for child in self.super_of.keys() {
            let mut chain: IndexSet<&str> = IndexSet::new();
            let mut current = self.super_of.get(child);
            while let Some(parent) = current {
                if parent == child || !chain.insert(parent.as_str()) {
                    break; // malformed input introduced a cycle
                }
                current = self.super_of.get(parent.as_str());
            }
            superclasses.insert(child.clone(), owned(chain));
        }

        let mut implementors: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for (name, kind) in &self.kinds {
            if *kind != TypeKind::Class {
                continue;
            }
            let mut line: Vec<&str> = vec![name.as_str()];
            if let Some(ancestors) = superclasses.get(name) {
                line.extend(ancestors.iter().map(String::as_str));
            }
            for holder in line {
                let Some(declared) = self.ifaces_of.get(holder) else {
                    continue;
                };
                for iface in declared {
                    implementors
                        .entry(iface.clone())
                        .or_default()
                        .insert(name.clone());
                    if let Some(wider) = superinterfaces.get(iface.as_str()) {
                        for up in wider {
                            implementors
                                .entry(up.clone())
                                .or_default()
                                .insert(name.clone());
                        }
                    }
                }
            }
        }

        let mut annotated: IndexMap<String, Vec<String>> = IndexMap::new();
        for (class, annotations) in &self.annotations_of {
            for annotation in annotations {
                annotated
                    .entry(annotation.clone())
                    .or_default()
                    .push(class.clone());
            }
        }

        Closures {
            subclasses,
            superclasses,
            subinterfaces,
            superinterfaces,
            implementors: implementors
                .into_iter()
                .map(|(iface, classes)| (iface, classes.into_iter().collect()))
                .collect(),
            annotated,
        }
    }

    pub fn subclasses_of(&self, class_name: &str) -> &[String] {
        self.closure(|c| &c.subclasses, class_name)
    }

    pub fn superclasses_of(&self, class_name: &str) -> &[String] {
        self.closure(|c| &c.superclasses, class_name)
    }

    pub fn subinterfaces_of(&self, interface_name: &str) -> &[String] {
        self.closure(|c| &c.subinterfaces, interface_name)
    }

    pub fn superinterfaces_of(&self, interface_name: &str) -> &[String] {
        self.closure(|c| &c.superinterfaces, interface_name)
    }

    pub fn implementors_of(&self, interface_name: &str) -> &[String] {
        self.closure(|c| &c.implementors, interface_name)
    }

    pub fn classes_with_annotation(&self, annotation_name: &str) -> &[String] {
        self.closure(|c| &c.annotated, annotation_name)
    }

    /// All recorded names (classes and interfaces), in encounter order.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    fn closure(
        &self,
        table: impl Fn(&Closures) -> &IndexMap<String, Vec<String>>,
        name: &str,
    ) -> &[String] {
        self.closures
            .get()
            .and_then(|closures| table(closures).get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Worklist reachability over a direct-edge multimap. The result holds an
/// entry for every node with at least one outgoing edge; the start node is
/// never part of its own closure.
fn reachability(edges: &IndexMap<&str, Vec<&str>>) -> IndexMap<String, Vec<String>> {
    let mut closure = IndexMap::new();
    for (start, direct) in edges {
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut queue: VecDeque<&str> = direct.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if node == *start || !seen.insert(node) {
                continue;
            }
            if let Some(next) = edges.get(node) {
                queue.extend(next.iter().copied());
            }
        }
        closure.insert((*start).to_owned(), owned(seen));
    }
    closure
}

fn owned(names: IndexSet<&str>) -> Vec<String> {
    names.into_iter().map(str::to_owned).collect()
}
