//! Source emission.
//!
//! The emitter is a printer over the [`FileTree`] IR. It never looks at raw
//! descriptors: every decision (presence, wire op, default, import) was made
//! while the tree was built, and this module only spells those decisions out
//! as TypeScript or JavaScript text.
//!
//! ## Layout of a generated file
//!
//! 1. Header and imports
//! 2. `Types`: interfaces and enum unions (TypeScript only)
//! 3. Per service: protobuf client, JSON client, server registration
//! 4. `Protobuf Encode / Decode`: one codec object per message and enum

mod binary;
mod codec;
mod json;
mod service;
mod types;

use crate::config::GeneratorConfig;
use crate::descriptor::{DefaultValue, FieldDescriptor, FieldKind, LangType};
use crate::error::Result;
use crate::tree::{FileTree, ProtoTypeNode};
use std::collections::BTreeSet;
use std::fmt::Write as FmtWrite;
use tracing::debug;

/// Module the generated code imports its runtime from
pub const RUNTIME_MODULE: &str = "twirpscript";

const BANNER_WIDTH: usize = 40;

/// Renders the generated source for one file.
pub fn emit_file(tree: &FileTree, config: &GeneratorConfig) -> Result<String> {
    let mut p = Printer::new(config);

    write_header(&mut p, tree)?;

    if p.typed() && !tree.types.is_empty() {
        p.banner("Types")?;
        types::write_types(&mut p, &tree.types, true)?;
    }

    for service in &tree.services {
        service::write_service(&mut p, tree, service)?;
    }

    if !tree.types.is_empty() {
        p.banner("Protobuf Encode / Decode")?;
        for node in &tree.types {
            codec::write_codec(&mut p, node, config, true)?;
        }
    }

    let output = p.finish();
    debug!("Emitted {} bytes for {}", output.len(), tree.name);
    Ok(output)
}

fn write_header(p: &mut Printer<'_>, tree: &FileTree) -> Result<()> {
    p.line("// THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.")?;
    p.line(&format!("// Source: {}", tree.name))?;
    p.line("/* eslint-disable */")?;
    p.blank()?;

    let needs = RuntimeNeeds::scan(tree);
    let mut wrote_import = false;

    if p.typed() && !needs.types.is_empty() {
        let names: Vec<&str> = needs.types.iter().copied().collect();
        p.line(&format!(
            "import type {{ {} }} from \"{}\";",
            names.join(", "),
            RUNTIME_MODULE
        ))?;
        wrote_import = true;
    }
    if !needs.values.is_empty() {
        let names: Vec<&str> = needs.values.iter().copied().collect();
        p.line(&format!(
            "import {{ {} }} from \"{}\";",
            names.join(", "),
            RUNTIME_MODULE
        ))?;
        wrote_import = true;
    }
    for entry in tree.imports.entries() {
        p.line(&format!(
            "import {{ {} }} from \"{}\";",
            entry.identifiers.join(", "),
            entry.relative_path
        ))?;
        wrote_import = true;
    }
    if wrote_import {
        p.blank()?;
    }
    Ok(())
}

/// Runtime names a file refers to
#[derive(Debug, Default)]
struct RuntimeNeeds {
    values: BTreeSet<&'static str>,
    types: BTreeSet<&'static str>,
}

impl RuntimeNeeds {
    fn scan(tree: &FileTree) -> Self {
        let mut needs = Self::default();

        tree.walk(|node| {
            let ProtoTypeNode::Message(message) = node else {
                return;
            };
            if message.is_map {
                return;
            }
            needs.values.insert("BinaryReader");
            needs.values.insert("BinaryWriter");
            needs.types.insert("ByteSource");

            let uses_bytes = message.fields.iter().any(|f| match f.map() {
                Some(map) => map.value.lang_type == LangType::Bytes,
                None => f.lang_type == LangType::Bytes,
            });
            if uses_bytes {
                needs.values.insert("encodeBase64Bytes");
                needs.values.insert("decodeBase64Bytes");
            }
        });

        if !tree.services.is_empty() {
            needs.values.insert("PBrequest");
            needs.values.insert("JSONrequest");
            needs.types.insert("ClientConfiguration");
        }
        needs
    }
}

/// Indenting text sink shared by all emitter passes
pub(crate) struct Printer<'c> {
    out: String,
    config: &'c GeneratorConfig,
    indent_level: usize,
}

impl<'c> Printer<'c> {
    fn new(config: &'c GeneratorConfig) -> Self {
        Self {
            out: String::new(),
            config,
            indent_level: 0,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    /// Whether TypeScript syntax is emitted
    pub(crate) fn typed(&self) -> bool {
        self.config.language.is_typed()
    }

    pub(crate) fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub(crate) fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.out, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    /// Writes one indented line
    pub(crate) fn line(&mut self, s: &str) -> Result<()> {
        self.write_indent()?;
        writeln!(self.out, "{}", s)?;
        Ok(())
    }

    pub(crate) fn blank(&mut self) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }

    /// Writes `s` and indents what follows
    pub(crate) fn open(&mut self, s: &str) -> Result<()> {
        self.line(s)?;
        self.indent();
        Ok(())
    }

    /// Dedents and writes `s`
    pub(crate) fn close(&mut self, s: &str) -> Result<()> {
        self.dedent();
        self.line(s)
    }

    /// JSDoc block from a proto leading comment
    pub(crate) fn doc(&mut self, comment: Option<&str>) -> Result<()> {
        let Some(comment) = comment else {
            return Ok(());
        };
        let lines: Vec<String> = comment
            .lines()
            .map(|l| l.strip_prefix(' ').unwrap_or(l).trim_end().replace("*/", "*\\/"))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        self.doc_lines(&refs)
    }

    pub(crate) fn doc_lines(&mut self, lines: &[&str]) -> Result<()> {
        self.line("/**")?;
        for l in lines {
            if l.is_empty() {
                self.line(" *")?;
            } else {
                self.line(&format!(" * {}", l))?;
            }
        }
        self.line(" */")
    }

    /// Section separator with a centered title
    pub(crate) fn banner(&mut self, title: &str) -> Result<()> {
        let rule = format!("//{}//", "=".repeat(BANNER_WIDTH));
        let title = if title.len() >= BANNER_WIDTH {
            format!("// {} //", title)
        } else {
            let pad = BANNER_WIDTH - title.len();
            let left = pad / 2;
            format!("//{}{}{}//", " ".repeat(left), title, " ".repeat(pad - left))
        };
        self.line(&rule)?;
        self.line(&title)?;
        self.line(&rule)?;
        self.blank()
    }

    /// `head(params): ret {`, dropping annotations for JavaScript.
    ///
    /// A trailing `?` on a parameter name marks it optional.
    pub(crate) fn signature(&self, head: &str, params: &[(&str, &str)], ret: &str) -> String {
        let params: Vec<String> = params
            .iter()
            .map(|(name, ty)| {
                if self.typed() {
                    format!("{}: {}", name, ty)
                } else {
                    name.trim_end_matches('?').to_string()
                }
            })
            .collect();
        if self.typed() && !ret.is_empty() {
            format!("{}({}): {} {{", head, params.join(", "), ret)
        } else {
            format!("{}({}) {{", head, params.join(", "))
        }
    }

    /// `expr as T` in TypeScript, `expr` in JavaScript
    pub(crate) fn cast(&self, expr: &str, ty: &str) -> String {
        if self.typed() {
            format!("{} as {}", expr, ty)
        } else {
            expr.to_string()
        }
    }

    /// Arrow parameter, annotated as `any` in TypeScript
    pub(crate) fn any_param(&self, name: &str) -> String {
        if self.typed() {
            format!("({}: any)", name)
        } else {
            format!("({})", name)
        }
    }
}

/// TypeScript type of one element of a field
pub(crate) fn element_type(lang: &LangType) -> String {
    match lang {
        LangType::Number => "number".to_string(),
        LangType::BigInt => "bigint".to_string(),
        LangType::Boolean => "boolean".to_string(),
        LangType::String => "string".to_string(),
        LangType::Bytes => "Uint8Array".to_string(),
        LangType::Enum(target) | LangType::Message(target) => target.local_name.clone(),
        LangType::Map(map) => format!("Record<string, {}>", element_type(&map.value.lang_type)),
    }
}

/// TypeScript type of a whole field
pub(crate) fn field_type(field: &FieldDescriptor) -> String {
    let element = element_type(&field.lang_type);
    if field.repeated {
        format!("{}[]", element)
    } else {
        element
    }
}

/// Initial value expression, `None` when the field starts out unset
pub(crate) fn default_expr(default: &DefaultValue) -> Option<String> {
    let expr = match default {
        DefaultValue::Zero => "0".to_string(),
        DefaultValue::BigZero => "0n".to_string(),
        DefaultValue::False => "false".to_string(),
        DefaultValue::EmptyString => "\"\"".to_string(),
        DefaultValue::EmptyBytes => "new Uint8Array()".to_string(),
        DefaultValue::EnumZero(target) => format!("{}._fromInt(0)", target.local_name),
        DefaultValue::EmptyList => "[]".to_string(),
        DefaultValue::EmptyMap => "{}".to_string(),
        DefaultValue::Unset => return None,
    };
    Some(expr)
}

/// Whether a field's element is a floating point kind
pub(crate) fn is_float(field: &FieldDescriptor) -> bool {
    matches!(field.kind, FieldKind::Double | FieldKind::Float)
}

/// Condition under which a field is written.
///
/// Implicit-presence fields are skipped at their zero value unless
/// `emit_defaults` is set; explicit-presence and message fields are written
/// whenever they are set.
pub(crate) fn write_condition(
    field: &FieldDescriptor,
    access: &str,
    emit_defaults: bool,
) -> String {
    if field.is_map() {
        return if emit_defaults {
            format!("{} != undefined", access)
        } else {
            format!("{} && Object.keys({}).length", access, access)
        };
    }
    if field.repeated {
        return if emit_defaults {
            format!("{} != undefined", access)
        } else {
            format!("{}?.length", access)
        };
    }
    if field.optional || field.is_message() || emit_defaults {
        return format!("{} != undefined", access);
    }
    match &field.lang_type {
        LangType::Number if is_float(field) => {
            format!("{} !== undefined && {} !== 0", access, access)
        }
        LangType::Bytes => format!("{}?.length", access),
        LangType::Enum(target) => format!("{} && {}._toInt({})", access, target.local_name, access),
        _ => access.to_string(),
    }
}

/// Parameter name for an RPC input, never a reserved word or a name the stub uses
pub(crate) fn param_name(type_name: &str) -> String {
    const RESERVED: &[&str] = &[
        "await", "break", "case", "catch", "class", "config", "const", "context", "continue",
        "debugger", "default", "delete", "do", "else", "enum", "export", "extends", "false",
        "finally", "for", "function", "if", "implements", "import", "in", "instanceof",
        "interface", "let", "new", "null", "package", "private", "protected", "public",
        "response", "return", "static", "super", "switch", "this", "throw", "true", "try",
        "typeof", "var", "void", "while", "with", "yield",
    ];
    let last = type_name.rsplit('.').next().unwrap_or(type_name);
    let mut chars = last.chars();
    let mut name = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => "input".to_string(),
    };
    if RESERVED.contains(&name.as_str()) {
        name.push('_');
    }
    name
}
