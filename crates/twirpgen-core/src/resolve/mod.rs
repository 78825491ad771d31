//! Cross-file symbol resolution.
//!
//! Resolution happens in two steps:
//!
//! 1. [`IdentifierTable::build`] records every message and enum declared
//!    anywhere in the request.
//! 2. [`Resolver`] answers "which definition does this reference from this
//!    file mean?", honoring protobuf import visibility: only the file itself
//!    and the files reachable through its `dependency` list are searched.
//!
//! Visibility is kept as an adjacency list over file indices whose transitive
//! closure is computed once, so each lookup is a hash lookup plus a set check.

mod imports;
mod table;

pub use imports::{generated_path, relative_module_path, ImportEntry, ImportTable};
pub use table::{DeclKind, IdentifierTable, TableEntry};

use crate::error::{Error, Result};
use prost_types::FileDescriptorProto;
use std::collections::{BTreeSet, HashMap};
use tracing::{trace, warn};

/// A type reference after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Dotted path without a leading dot
    pub fq_name: String,
    /// File declaring the type
    pub file: String,
    /// Package of the declaring file
    pub package: String,
    /// Path relative to the package, e.g. `Outer.Inner`
    pub short_name: String,
    /// Message or enum
    pub kind: DeclKind,
    /// Name the generated module uses for the type; differs from
    /// `short_name` when its import had to be aliased
    pub local_name: String,
}

impl TypeRef {
    /// The top-level declaration that has to be imported to reach this type
    pub fn root_identifier(&self) -> &str {
        self.short_name
            .split('.')
            .next()
            .unwrap_or(&self.short_name)
    }

    /// Rebinds the root identifier to the name it was imported under
    pub fn bind_root(&mut self, root: &str) {
        self.local_name = match self.short_name.split_once('.') {
            Some((_, rest)) => format!("{}.{}", root, rest),
            None => root.to_string(),
        };
    }
}

/// Resolves fully qualified references against the visible subset of the table
#[derive(Debug)]
pub struct Resolver<'a> {
    table: &'a IdentifierTable,
    file_index: HashMap<&'a str, usize>,
    file_names: Vec<&'a str>,
    /// `visible[i]` holds `i` itself plus every transitive dependency of file `i`
    visible: Vec<BTreeSet<usize>>,
}

impl<'a> Resolver<'a> {
    /// Builds the dependency graph for `files` and its transitive closure.
    pub fn new(table: &'a IdentifierTable, files: &'a [FileDescriptorProto]) -> Result<Self> {
        let mut file_index = HashMap::with_capacity(files.len());
        let mut file_names = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let Some(name) = file.name.as_deref() else {
                return Err(Error::MissingFileName { index });
            };
            file_index.insert(name, index);
            file_names.push(name);
        }

        let adjacency: Vec<Vec<usize>> = files
            .iter()
            .map(|file| {
                file.dependency
                    .iter()
                    .filter_map(|dep| {
                        let index = file_index.get(dep.as_str()).copied();
                        if index.is_none() {
                            warn!("Dependency '{}' of '{}' was not supplied", dep, file.name());
                        }
                        index
                    })
                    .collect()
            })
            .collect();

        let visible = (0..files.len())
            .map(|start| reachable(&adjacency, start))
            .collect();

        Ok(Self {
            table,
            file_index,
            file_names,
            visible,
        })
    }

    /// Resolves `name` (with or without a leading dot) as seen from `for_file`.
    pub fn resolve(&self, name: &str, for_file: &str) -> Result<TypeRef> {
        let fq_name = name.strip_prefix('.').unwrap_or(name);
        let Some(&from) = self.file_index.get(for_file) else {
            return Err(Error::internal(format!(
                "resolution requested for unknown file '{}'",
                for_file
            )));
        };
        let visible = &self.visible[from];

        let matches: Vec<&TableEntry> = self
            .table
            .lookup(fq_name)
            .filter(|entry| {
                self.file_index
                    .get(entry.file.as_str())
                    .is_some_and(|i| visible.contains(i))
            })
            .collect();

        match matches.as_slice() {
            [] => Err(Error::unresolved(fq_name, for_file)),
            [entry] => {
                trace!("Resolved {} from {} to {}", fq_name, for_file, entry.file);
                let short_name = short_name(&entry.fq_name, &entry.package);
                Ok(TypeRef {
                    fq_name: entry.fq_name.clone(),
                    file: entry.file.clone(),
                    package: entry.package.clone(),
                    local_name: short_name.clone(),
                    short_name,
                    kind: entry.kind,
                })
            }
            many => Err(Error::AmbiguousIdentifier {
                name: fq_name.to_string(),
                file: for_file.to_string(),
                candidates: many.iter().map(|e| e.file.clone()).collect(),
            }),
        }
    }

    /// Resolves a reference and registers the import it needs, if any.
    ///
    /// The returned reference carries the name the importing file binds it to.
    pub fn resolve_and_import(
        &self,
        name: &str,
        for_file: &str,
        imports: &mut ImportTable,
    ) -> Result<TypeRef> {
        let mut resolved = self.resolve(name, for_file)?;
        let root = imports.register(&resolved);
        resolved.bind_root(&root);
        Ok(resolved)
    }

    /// Names of the files visible from `file`, in declaration order
    pub fn visible_files(&self, file: &str) -> Vec<&'a str> {
        self.file_index
            .get(file)
            .map(|&i| self.visible[i].iter().map(|&j| self.file_names[j]).collect())
            .unwrap_or_default()
    }
}

fn reachable(adjacency: &[Vec<usize>], start: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::from([start]);
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for &next in &adjacency[node] {
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    seen
}

fn short_name(fq_name: &str, package: &str) -> String {
    if package.is_empty() {
        return fq_name.to_string();
    }
    fq_name
        .strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(fq_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::DescriptorProto;

    fn file(name: &str, package: &str, deps: &[&str], messages: &[&str]) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            message_type: messages
                .iter()
                .map(|m| DescriptorProto {
                    name: Some(m.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_same_file() {
        let files = vec![file("a.proto", "pkg", &[], &["Hat"])];
        let table = IdentifierTable::build(&files).unwrap();
        let resolver = Resolver::new(&table, &files).unwrap();

        let resolved = resolver.resolve(".pkg.Hat", "a.proto").unwrap();
        assert_eq!(resolved.file, "a.proto");
        assert_eq!(resolved.short_name, "Hat");
    }

    #[test]
    fn test_resolve_transitive_dependency() {
        let files = vec![
            file("c.proto", "deep", &[], &["Leaf"]),
            file("b.proto", "mid", &["c.proto"], &["Mid"]),
            file("a.proto", "top", &["b.proto"], &["Top"]),
        ];
        let table = IdentifierTable::build(&files).unwrap();
        let resolver = Resolver::new(&table, &files).unwrap();

        let resolved = resolver.resolve(".deep.Leaf", "a.proto").unwrap();
        assert_eq!(resolved.file, "c.proto");
        assert_eq!(resolver.visible_files("a.proto"), vec!["c.proto", "b.proto", "a.proto"]);
    }

    #[test]
    fn test_undeclared_dependency_is_not_visible() {
        let files = vec![
            file("other.proto", "pkg", &[], &["Other"]),
            file("a.proto", "pkg", &[], &["Hat"]),
        ];
        let table = IdentifierTable::build(&files).unwrap();
        let resolver = Resolver::new(&table, &files).unwrap();

        let err = resolver.resolve(".pkg.Other", "a.proto").unwrap_err();
        assert!(matches!(err, Error::UnresolvedIdentifier { .. }));
    }

    #[test]
    fn test_duplicate_visible_definition_is_ambiguous() {
        let files = vec![
            file("x.proto", "pkg", &[], &["Dup"]),
            file("y.proto", "pkg", &[], &["Dup"]),
            file("a.proto", "pkg", &["x.proto", "y.proto"], &[]),
        ];
        let table = IdentifierTable::build(&files).unwrap();
        let resolver = Resolver::new(&table, &files).unwrap();

        assert!(matches!(
            resolver.resolve(".pkg.Dup", "a.proto").unwrap_err(),
            Error::AmbiguousIdentifier { .. }
        ));
        // Only one of them is visible from x.proto itself
        assert_eq!(resolver.resolve(".pkg.Dup", "x.proto").unwrap().file, "x.proto");
    }

    #[test]
    fn test_short_name_strips_package() {
        assert_eq!(short_name("a.b.Outer.Inner", "a.b"), "Outer.Inner");
        assert_eq!(short_name("Outer", ""), "Outer");
    }

    #[test]
    fn test_root_identifier() {
        let files = vec![FileDescriptorProto {
            name: Some("a.proto".to_string()),
            package: Some("pkg".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Outer".to_string()),
                nested_type: vec![DescriptorProto {
                    name: Some("Inner".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }];
        let table = IdentifierTable::build(&files).unwrap();
        let resolver = Resolver::new(&table, &files).unwrap();
        let mut resolved = resolver.resolve(".pkg.Outer.Inner", "a.proto").unwrap();
        assert_eq!(resolved.root_identifier(), "Outer");
        assert_eq!(resolved.local_name, "Outer.Inner");

        resolved.bind_root("pkg_Outer");
        assert_eq!(resolved.local_name, "pkg_Outer.Inner");
        assert_eq!(resolved.short_name, "Outer.Inner");
    }
}
