//! Import bookkeeping for a single generated file.

use super::TypeRef;
use crate::config::Language;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Suffix replacing `.proto` in generated file names
const GENERATED_SUFFIX: &str = ".pb";

/// One import statement of a generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Import specifiers sorted by identifier, e.g. `Size` or `Size as metric_Size`
    pub identifiers: Vec<String>,
    /// Module specifier relative to the importing file
    pub relative_path: String,
}

/// Imports accumulated while resolving the types one file refers to.
///
/// Keyed by the target module path so that repeated references to the same
/// file collapse into one statement. An imported identifier that clashes with
/// a local declaration or an earlier import is bound under an alias derived
/// from its package.
#[derive(Debug, Clone)]
pub struct ImportTable {
    proto_file: String,
    generated: String,
    language: Language,
    /// Module path to (imported identifier -> local binding)
    by_path: BTreeMap<String, BTreeMap<String, String>>,
    /// Top-level names the file declares itself
    reserved: BTreeSet<String>,
    /// Local bindings introduced by imports
    bound: BTreeSet<String>,
}

impl ImportTable {
    /// Creates an empty table for the generated counterpart of `proto_file`
    pub fn new(proto_file: &str, language: Language) -> Self {
        Self {
            proto_file: proto_file.to_string(),
            generated: generated_path(proto_file, language),
            language,
            by_path: BTreeMap::new(),
            reserved: BTreeSet::new(),
            bound: BTreeSet::new(),
        }
    }

    /// Marks `name` as declared by the generated file itself
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.reserved.insert(name.into());
    }

    /// Records that `resolved` is used and returns the local name of its root
    /// identifier. Types from the same file need no import.
    pub fn register(&mut self, resolved: &TypeRef) -> String {
        let identifier = resolved.root_identifier();
        if resolved.file == self.proto_file {
            return identifier.to_string();
        }
        let target = generated_path(&resolved.file, self.language);
        let path = relative_module_path(&self.generated, &target, self.language);
        if let Some(local) = self.by_path.get(&path).and_then(|ids| ids.get(identifier)) {
            return local.clone();
        }

        let local = if self.is_taken(identifier) {
            let alias = self.alias_for(resolved);
            debug!(
                "Importing {} from {} as {} in {}",
                identifier, path, alias, self.proto_file
            );
            alias
        } else {
            identifier.to_string()
        };
        self.bound.insert(local.clone());
        self.by_path
            .entry(path)
            .or_default()
            .insert(identifier.to_string(), local.clone());
        local
    }

    /// Import statements in path order
    pub fn entries(&self) -> Vec<ImportEntry> {
        self.by_path
            .iter()
            .map(|(path, identifiers)| ImportEntry {
                identifiers: identifiers
                    .iter()
                    .map(|(identifier, local)| {
                        if identifier == local {
                            identifier.clone()
                        } else {
                            format!("{} as {}", identifier, local)
                        }
                    })
                    .collect(),
                relative_path: path.clone(),
            })
            .collect()
    }

    /// Returns true if the file imports nothing
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    fn is_taken(&self, name: &str) -> bool {
        self.reserved.contains(name) || self.bound.contains(name)
    }

    /// `metric_Size` for `metric.Size`; the file stem stands in for an empty package
    fn alias_for(&self, resolved: &TypeRef) -> String {
        let qualifier = if resolved.package.is_empty() {
            resolved
                .file
                .strip_suffix(".proto")
                .unwrap_or(&resolved.file)
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect()
        } else {
            resolved.package.replace('.', "_")
        };
        let base = format!("{}_{}", qualifier, resolved.root_identifier());
        let mut alias = base.clone();
        let mut suffix = 2;
        while self.is_taken(&alias) {
            alias = format!("{}{}", base, suffix);
            suffix += 1;
        }
        alias
    }
}

/// Output path for a proto file: `dir/name.proto` becomes `dir/name.pb.ts`.
pub fn generated_path(proto_file: &str, language: Language) -> String {
    let stem = proto_file.strip_suffix(".proto").unwrap_or(proto_file);
    format!("{}{}.{}", stem, GENERATED_SUFFIX, language.extension())
}

/// ES module specifier that reaches generated file `to` from generated file `from`.
///
/// TypeScript specifiers drop the extension; JavaScript ones keep it, as
/// required for native ES modules.
pub fn relative_module_path(from: &str, to: &str, language: Language) -> String {
    let from_dirs: Vec<&str> = from.split('/').collect();
    let from_dirs = &from_dirs[..from_dirs.len() - 1];
    let to_parts: Vec<&str> = to.split('/').collect();
    let (to_dirs, to_file) = to_parts.split_at(to_parts.len() - 1);

    let common = from_dirs
        .iter()
        .zip(to_dirs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<&str> = vec![".."; from_dirs.len() - common];
    segments.extend_from_slice(&to_dirs[common..]);

    let file = match language {
        Language::TypeScript => to_file[0]
            .strip_suffix(".ts")
            .unwrap_or(to_file[0]),
        Language::JavaScript => to_file[0],
    };
    segments.push(file);

    let joined = segments.join("/");
    if joined.starts_with("../") {
        joined
    } else {
        format!("./{}", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::DeclKind;

    fn type_ref(file: &str, short: &str) -> TypeRef {
        package_ref(file, "pkg", short)
    }

    fn package_ref(file: &str, package: &str, short: &str) -> TypeRef {
        TypeRef {
            fq_name: format!("{}.{}", package, short),
            file: file.to_string(),
            package: package.to_string(),
            short_name: short.to_string(),
            kind: DeclKind::Message,
            local_name: short.to_string(),
        }
    }

    #[test]
    fn test_generated_path() {
        assert_eq!(generated_path("a/b/hat.proto", Language::TypeScript), "a/b/hat.pb.ts");
        assert_eq!(generated_path("hat.proto", Language::JavaScript), "hat.pb.js");
    }

    #[test]
    fn test_relative_module_path() {
        let ts = Language::TypeScript;
        assert_eq!(relative_module_path("hat.pb.ts", "size.pb.ts", ts), "./size.pb");
        assert_eq!(relative_module_path("a/hat.pb.ts", "a/b/size.pb.ts", ts), "./b/size.pb");
        assert_eq!(relative_module_path("a/b/hat.pb.ts", "a/c/size.pb.ts", ts), "../c/size.pb");
        assert_eq!(relative_module_path("a/b/hat.pb.ts", "size.pb.ts", ts), "../../size.pb");
        assert_eq!(
            relative_module_path("a/hat.pb.js", "a/size.pb.js", Language::JavaScript),
            "./size.pb.js"
        );
    }

    #[test]
    fn test_register_groups_and_dedupes() {
        let mut imports = ImportTable::new("shop/hat.proto", Language::TypeScript);
        imports.register(&type_ref("shop/size.proto", "Size"));
        imports.register(&type_ref("shop/size.proto", "Size.Unit"));
        imports.register(&type_ref("shop/size.proto", "Inches"));
        imports.register(&type_ref("shop/hat.proto", "Hat"));
        imports.register(&type_ref("common/color.proto", "Color"));

        assert_eq!(
            imports.entries(),
            vec![
                ImportEntry {
                    identifiers: vec!["Color".to_string()],
                    relative_path: "../common/color.pb".to_string(),
                },
                ImportEntry {
                    identifiers: vec!["Inches".to_string(), "Size".to_string()],
                    relative_path: "./size.pb".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_clashing_imports_are_aliased() {
        let mut imports = ImportTable::new("hat.proto", Language::JavaScript);
        imports.reserve("Size");

        assert_eq!(imports.register(&package_ref("other.proto", "metric", "Size")), "metric_Size");
        assert_eq!(
            imports.register(&package_ref("other.proto", "metric", "Size.Unit")),
            "metric_Size"
        );
        assert_eq!(imports.register(&package_ref("imperial.proto", "", "Size")), "imperial_Size");
        assert_eq!(imports.register(&package_ref("more.proto", "metric", "Size")), "metric_Size2");
        assert_eq!(imports.register(&package_ref("other.proto", "metric", "Unit")), "Unit");
        assert_eq!(imports.register(&package_ref("hat.proto", "shop", "Size")), "Size");

        assert_eq!(
            imports.entries(),
            vec![
                ImportEntry {
                    identifiers: vec!["Size as imperial_Size".to_string()],
                    relative_path: "./imperial.pb.js".to_string(),
                },
                ImportEntry {
                    identifiers: vec!["Size as metric_Size2".to_string()],
                    relative_path: "./more.pb.js".to_string(),
                },
                ImportEntry {
                    identifiers: vec!["Size as metric_Size".to_string(), "Unit".to_string()],
                    relative_path: "./other.pb.js".to_string(),
                },
            ]
        );
    }
}
