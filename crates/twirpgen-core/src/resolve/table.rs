//! The global identifier table.

use crate::error::{Error, Result};
use prost_types::{DescriptorProto, EnumDescriptorProto, FileDescriptorProto};
use std::collections::HashMap;
use tracing::trace;

/// What kind of declaration a table entry names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// A message (including synthetic map entries)
    Message,
    /// An enum
    Enum,
}

/// One declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// Dotted path without a leading dot, e.g. `pkg.Outer.Inner`
    pub fq_name: String,
    /// Name of the file declaring the type
    pub file: String,
    /// Package of that file (may be empty)
    pub package: String,
    /// Message or enum
    pub kind: DeclKind,
}

/// Append-only table of every message and enum in a request.
///
/// Built once over the whole descriptor set before any file is generated,
/// since any file may reference any other.
#[derive(Debug, Default)]
pub struct IdentifierTable {
    entries: Vec<TableEntry>,
    by_name: HashMap<String, Vec<usize>>,
}

impl IdentifierTable {
    /// Scans every file and records each declared type.
    pub fn build(files: &[FileDescriptorProto]) -> Result<Self> {
        let mut table = Self::default();

        for (index, file) in files.iter().enumerate() {
            let Some(file_name) = file.name.as_deref() else {
                return Err(Error::MissingFileName { index });
            };
            let package = file.package();
            let prefix = if package.is_empty() {
                String::new()
            } else {
                format!("{}.", package)
            };

            for enum_type in &file.enum_type {
                table.push_enum(enum_type, &prefix, file_name, package);
            }
            for message in &file.message_type {
                table.push_message(message, &prefix, file_name, package);
            }
        }

        trace!("Identifier table holds {} entries", table.entries.len());
        Ok(table)
    }

    fn push_message(
        &mut self,
        message: &DescriptorProto,
        prefix: &str,
        file: &str,
        package: &str,
    ) {
        let fq_name = format!("{}{}", prefix, message.name());
        let nested_prefix = format!("{}.", fq_name);
        self.push(fq_name, file, package, DeclKind::Message);

        for enum_type in &message.enum_type {
            self.push_enum(enum_type, &nested_prefix, file, package);
        }
        for nested in &message.nested_type {
            self.push_message(nested, &nested_prefix, file, package);
        }
    }

    fn push_enum(
        &mut self,
        enum_type: &EnumDescriptorProto,
        prefix: &str,
        file: &str,
        package: &str,
    ) {
        let fq_name = format!("{}{}", prefix, enum_type.name());
        self.push(fq_name, file, package, DeclKind::Enum);
    }

    fn push(&mut self, fq_name: String, file: &str, package: &str, kind: DeclKind) {
        self.by_name
            .entry(fq_name.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push(TableEntry {
            fq_name,
            file: file.to_string(),
            package: package.to_string(),
            kind,
        });
    }

    /// All entries, in declaration order
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Every entry declaring `fq_name` (leading dot not allowed), across all files
    pub fn lookup<'a>(&'a self, fq_name: &str) -> impl Iterator<Item = &'a TableEntry> + 'a {
        self.by_name
            .get(fq_name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.entries[i])
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no types were declared
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(name: &str, nested: Vec<DescriptorProto>, enums: Vec<&str>) -> DescriptorProto {
        DescriptorProto {
            name: Some(name.to_string()),
            nested_type: nested,
            enum_type: enums
                .into_iter()
                .map(|e| EnumDescriptorProto {
                    name: Some(e.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_nested_declarations_are_flattened() {
        let file = FileDescriptorProto {
            name: Some("shop.proto".to_string()),
            package: Some("shop.v1".to_string()),
            message_type: vec![message(
                "Hat",
                vec![message("Brim", vec![message("Stitch", vec![], vec![])], vec![])],
                vec!["Color"],
            )],
            enum_type: vec![EnumDescriptorProto {
                name: Some("Size".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let table = IdentifierTable::build(&[file]).unwrap();
        let names: Vec<_> = table.entries().iter().map(|e| e.fq_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "shop.v1.Size",
                "shop.v1.Hat",
                "shop.v1.Hat.Color",
                "shop.v1.Hat.Brim",
                "shop.v1.Hat.Brim.Stitch",
            ]
        );
        assert!(table.entries().iter().all(|e| e.file == "shop.proto"));
        assert_eq!(table.lookup("shop.v1.Hat.Color").next().unwrap().kind, DeclKind::Enum);
    }

    #[test]
    fn test_no_package_has_no_prefix() {
        let file = FileDescriptorProto {
            name: Some("plain.proto".to_string()),
            message_type: vec![message("Thing", vec![], vec![])],
            ..Default::default()
        };
        let table = IdentifierTable::build(&[file]).unwrap();
        assert_eq!(table.entries()[0].fq_name, "Thing");
        assert_eq!(table.entries()[0].package, "");
    }

    #[test]
    fn test_missing_file_name() {
        let files = vec![
            FileDescriptorProto {
                name: Some("ok.proto".to_string()),
                ..Default::default()
            },
            FileDescriptorProto::default(),
        ];
        let err = IdentifierTable::build(&files).unwrap_err();
        assert!(matches!(err, Error::MissingFileName { index: 1 }));
    }
}
