//! Type tree construction.
//!
//! [`TreeBuilder::build`] turns one `FileDescriptorProto` into a [`FileTree`]:
//! enum and message nodes that mirror protobuf's lexical nesting, every field
//! resolved through [`describe`], every type reference resolved through the
//! [`Resolver`], the services of the file, and the imports all of that needs.

use crate::config::Language;
use crate::descriptor::{
    describe, to_lower_camel_case, FieldDescriptor, FieldKind, LangType, MapType,
};
use crate::error::{Error, Result};
use crate::resolve::{ImportTable, Resolver, TypeRef};
use prost_types::field_descriptor_proto::Label;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    ServiceDescriptorProto,
};
use std::collections::HashMap;
use tracing::{debug, warn};

// Field numbers inside descriptor.proto, used to address source locations
const FILE_MESSAGE_TYPE: i32 = 4;
const FILE_ENUM_TYPE: i32 = 5;
const FILE_SERVICE: i32 = 6;
const MESSAGE_FIELD: i32 = 2;
const MESSAGE_NESTED_TYPE: i32 = 3;
const MESSAGE_ENUM_TYPE: i32 = 4;
const ENUM_VALUE: i32 = 2;
const SERVICE_METHOD: i32 = 2;

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoSyntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for ProtoSyntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(ProtoSyntax::Proto2),
            "proto3" => Ok(ProtoSyntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// An enum declaration
#[derive(Debug, Clone, PartialEq)]
pub struct EnumNode {
    /// Declared name
    pub name: String,
    /// Dotted path without a leading dot
    pub fq_name: String,
    /// Path relative to the package, e.g. `Outer.Kind`
    pub short_name: String,
    /// Values in declaration order
    pub values: Vec<EnumValueNode>,
    /// Leading comment
    pub comment: Option<String>,
}

impl EnumNode {
    /// Symbolic name for a wire value; the first declared wins for aliases
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.number == number)
            .map(|v| v.name.as_str())
    }

    /// Wire value for a symbolic name
    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|v| v.name == name).map(|v| v.number)
    }
}

/// One enum value
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueNode {
    /// Symbolic name
    pub name: String,
    /// Wire value
    pub number: i32,
    /// Leading comment
    pub comment: Option<String>,
}

/// A message declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MessageNode {
    /// Declared name
    pub name: String,
    /// Dotted path without a leading dot
    pub fq_name: String,
    /// Path relative to the package, e.g. `Outer.Inner`
    pub short_name: String,
    /// Synthetic `map<K, V>` entry; never emitted as a type of its own
    pub is_map: bool,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
    /// Nested enums, then nested messages
    pub children: Vec<ProtoTypeNode>,
    /// Leading comment
    pub comment: Option<String>,
}

impl MessageNode {
    /// Nested declarations that get generated code (map entries excluded)
    pub fn emitted_children(&self) -> impl Iterator<Item = &ProtoTypeNode> {
        self.children.iter().filter(|child| match child {
            ProtoTypeNode::Message(m) => !m.is_map,
            ProtoTypeNode::Enum(_) => true,
        })
    }

    /// Field with the given number
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Other members of the oneof `field` belongs to; empty outside a oneof
    pub fn oneof_siblings<'a>(
        &'a self,
        field: &'a FieldDescriptor,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields.iter().filter(move |other| {
            field.oneof.is_some() && other.oneof == field.oneof && other.number != field.number
        })
    }
}

/// A node of the type tree
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoTypeNode {
    /// An enum
    Enum(EnumNode),
    /// A message
    Message(MessageNode),
}

impl ProtoTypeNode {
    /// Dotted path without a leading dot
    pub fn fq_name(&self) -> &str {
        match self {
            ProtoTypeNode::Enum(e) => &e.fq_name,
            ProtoTypeNode::Message(m) => &m.fq_name,
        }
    }

    /// Visits this node and all of its descendants, depth first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ProtoTypeNode)) {
        visit(self);
        if let ProtoTypeNode::Message(m) = self {
            for child in &m.children {
                child.walk(visit);
            }
        }
    }
}

/// One RPC method
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,
    /// Request message
    pub input: TypeRef,
    /// Response message
    pub output: TypeRef,
    /// Leading comment
    pub comment: Option<String>,
}

/// One RPC service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    /// Service name
    pub name: String,
    /// Methods in declaration order
    pub methods: Vec<MethodDescriptor>,
    /// Leading comment
    pub comment: Option<String>,
}

/// Everything the emitter needs for one file
#[derive(Debug, Clone)]
pub struct FileTree {
    /// Proto file name
    pub name: String,
    /// Package (may be empty)
    pub package: String,
    /// Declared syntax
    pub syntax: ProtoSyntax,
    /// Top-level enums, then top-level messages
    pub types: Vec<ProtoTypeNode>,
    /// Services in declaration order
    pub services: Vec<ServiceDescriptor>,
    /// Imports accumulated while resolving references
    pub imports: ImportTable,
}

impl FileTree {
    /// Request path of a method: `/package.Service/Method`
    pub fn method_path(&self, service: &ServiceDescriptor, method: &MethodDescriptor) -> String {
        if self.package.is_empty() {
            format!("/{}/{}", service.name, method.name)
        } else {
            format!("/{}.{}/{}", self.package, service.name, method.name)
        }
    }

    /// Fully qualified service name
    pub fn service_path(&self, service: &ServiceDescriptor) -> String {
        if self.package.is_empty() {
            service.name.clone()
        } else {
            format!("{}.{}", self.package, service.name)
        }
    }

    /// Visits every node of the file, depth first
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&'a ProtoTypeNode)) {
        for node in &self.types {
            node.walk(&mut visit);
        }
    }
}

/// Leading comments keyed by source location path
#[derive(Debug, Default)]
struct Comments(HashMap<Vec<i32>, String>);

impl Comments {
    fn new(file: &FileDescriptorProto) -> Self {
        let mut map = HashMap::new();
        if let Some(info) = &file.source_code_info {
            for location in &info.location {
                if let Some(comment) = &location.leading_comments {
                    let trimmed = comment.trim_end();
                    if !trimmed.trim().is_empty() {
                        map.insert(location.path.clone(), trimmed.to_string());
                    }
                }
            }
        }
        Self(map)
    }

    fn get(&self, path: &[i32]) -> Option<String> {
        self.0.get(path).cloned()
    }
}

fn child_path(parent: &[i32], field: i32, index: usize) -> Vec<i32> {
    let mut path = parent.to_vec();
    path.push(field);
    path.push(index as i32);
    path
}

/// Builds [`FileTree`]s against a shared [`Resolver`]
#[derive(Debug)]
pub struct TreeBuilder<'r, 'a> {
    resolver: &'r Resolver<'a>,
    language: Language,
}

/// Per-file state while walking
struct FileScope<'f> {
    file: &'f str,
    package: &'f str,
    syntax: ProtoSyntax,
    comments: Comments,
    imports: ImportTable,
}

impl<'r, 'a> TreeBuilder<'r, 'a> {
    /// Creates a builder; `language` decides the extension used in import paths
    pub fn new(resolver: &'r Resolver<'a>, language: Language) -> Self {
        Self { resolver, language }
    }

    /// Builds the type tree, service list and import table of `file`.
    pub fn build(&self, file: &FileDescriptorProto) -> Result<FileTree> {
        let name = file.name.as_deref().ok_or(Error::MissingFileName { index: 0 })?;
        let syntax = ProtoSyntax::try_from(file.syntax())?;
        let package = file.package();
        let prefix = if package.is_empty() {
            String::new()
        } else {
            format!("{}.", package)
        };

        let mut scope = FileScope {
            file: name,
            package,
            syntax,
            comments: Comments::new(file),
            imports: ImportTable::new(name, self.language),
        };
        reserve_declarations(file, &mut scope.imports);
        reject_extensions(&file.extension, &prefix)?;

        let mut types = Vec::with_capacity(file.enum_type.len() + file.message_type.len());
        for (i, enum_type) in file.enum_type.iter().enumerate() {
            let path = vec![FILE_ENUM_TYPE, i as i32];
            types.push(ProtoTypeNode::Enum(self.build_enum(
                enum_type, &prefix, &path, &scope,
            )));
        }
        for (i, message) in file.message_type.iter().enumerate() {
            let path = vec![FILE_MESSAGE_TYPE, i as i32];
            types.push(ProtoTypeNode::Message(self.build_message(
                message, &prefix, &path, &mut scope,
            )?));
        }

        let mut services = Vec::with_capacity(file.service.len());
        for (i, service) in file.service.iter().enumerate() {
            let path = vec![FILE_SERVICE, i as i32];
            services.push(self.build_service(service, &path, &mut scope)?);
        }

        debug!(
            "Built tree for {}: {} top-level types, {} services, {} imports",
            name,
            types.len(),
            services.len(),
            scope.imports.entries().len()
        );

        Ok(FileTree {
            name: name.to_string(),
            package: package.to_string(),
            syntax,
            types,
            services,
            imports: scope.imports,
        })
    }

    fn build_enum(
        &self,
        enum_type: &EnumDescriptorProto,
        prefix: &str,
        path: &[i32],
        scope: &FileScope<'_>,
    ) -> EnumNode {
        let fq_name = format!("{}{}", prefix, enum_type.name());
        let values = enum_type
            .value
            .iter()
            .enumerate()
            .map(|(i, value)| EnumValueNode {
                name: value.name().to_string(),
                number: value.number(),
                comment: scope.comments.get(&child_path(path, ENUM_VALUE, i)),
            })
            .collect();

        EnumNode {
            name: enum_type.name().to_string(),
            short_name: relative_to_package(&fq_name, scope.package),
            fq_name,
            values,
            comment: scope.comments.get(path),
        }
    }

    fn build_message(
        &self,
        message: &DescriptorProto,
        prefix: &str,
        path: &[i32],
        scope: &mut FileScope<'_>,
    ) -> Result<MessageNode> {
        let fq_name = format!("{}{}", prefix, message.name());
        let nested_prefix = format!("{}.", fq_name);
        reject_extensions(&message.extension, &nested_prefix)?;
        let is_map = message
            .options
            .as_ref()
            .is_some_and(|o| o.map_entry.unwrap_or(false));

        // Children first: map fields below need the entry nodes
        let mut children = Vec::with_capacity(message.enum_type.len() + message.nested_type.len());
        for (i, enum_type) in message.enum_type.iter().enumerate() {
            let child = child_path(path, MESSAGE_ENUM_TYPE, i);
            children.push(ProtoTypeNode::Enum(self.build_enum(
                enum_type,
                &nested_prefix,
                &child,
                scope,
            )));
        }
        for (i, nested) in message.nested_type.iter().enumerate() {
            let child = child_path(path, MESSAGE_NESTED_TYPE, i);
            children.push(ProtoTypeNode::Message(self.build_message(
                nested,
                &nested_prefix,
                &child,
                scope,
            )?));
        }

        let mut fields = Vec::with_capacity(message.field.len());
        for (i, field) in message.field.iter().enumerate() {
            let comment = scope.comments.get(&child_path(path, MESSAGE_FIELD, i));
            fields.push(self.build_field(field, message, &fq_name, &children, comment, scope)?);
        }

        if is_map {
            check_map_entry(&fq_name, &fields)?;
        }
        warn_json_name_collisions(&fq_name, &fields);

        Ok(MessageNode {
            name: message.name().to_string(),
            short_name: relative_to_package(&fq_name, scope.package),
            fq_name,
            is_map,
            fields,
            children,
            comment: scope.comments.get(path),
        })
    }

    fn build_field(
        &self,
        field: &FieldDescriptorProto,
        message: &DescriptorProto,
        message_fq: &str,
        siblings: &[ProtoTypeNode],
        comment: Option<String>,
        scope: &mut FileScope<'_>,
    ) -> Result<FieldDescriptor> {
        let field_fq = format!("{}.{}", message_fq, field.name());
        let repeated = field.label() == Label::Repeated;

        let kind = FieldKind::from_proto(field.r#type(), || {
            self.resolver
                .resolve_and_import(field.type_name(), scope.file, &mut scope.imports)
        })?;

        // A reference to a sibling map entry turns the field into a map
        let map_entry = match &kind {
            FieldKind::Message(target) => siblings.iter().find_map(|child| match child {
                ProtoTypeNode::Message(m) if m.is_map && m.fq_name == target.fq_name => Some(m),
                _ => None,
            }),
            _ => None,
        };

        let optional = !repeated && has_explicit_presence(field, message, scope.syntax);
        let shape = describe(&kind, repeated, optional).map_err(|e| match e {
            Error::UnsupportedGroupEncoding { .. } => Error::unsupported_group(&field_fq),
            other => other,
        })?;

        let proto_name = field.name().to_string();
        let camel = to_lower_camel_case(&proto_name);
        let json_name = field.json_name.clone().unwrap_or_else(|| camel.clone());
        let custom_json_name = (json_name != camel).then(|| json_name.clone());

        let oneof = field
            .oneof_index
            .filter(|_| !field.proto3_optional())
            .and_then(|index| message.oneof_decl.get(index as usize))
            .map(|decl| decl.name().to_string());

        let mut descriptor = FieldDescriptor {
            name: camel,
            number: field.number() as u32,
            repeated,
            optional,
            oneof,
            kind,
            lang_type: shape.lang_type,
            default: shape.default,
            ops: shape.ops,
            proto_name,
            json_name,
            custom_json_name,
            comment,
        };

        if let Some(entry) = map_entry {
            if !repeated {
                return Err(Error::invalid_map_entry(
                    &entry.fq_name,
                    format!("referenced by non-repeated field '{}'", field_fq),
                ));
            }
            let (key, value) = map_key_value(entry)?;
            descriptor.repeated = false;
            descriptor.lang_type = LangType::Map(Box::new(MapType { key, value }));
            descriptor.default = crate::descriptor::DefaultValue::EmptyMap;
        }

        Ok(descriptor)
    }

    fn build_service(
        &self,
        service: &ServiceDescriptorProto,
        path: &[i32],
        scope: &mut FileScope<'_>,
    ) -> Result<ServiceDescriptor> {
        let mut methods = Vec::with_capacity(service.method.len());
        for (i, method) in service.method.iter().enumerate() {
            if method.client_streaming() || method.server_streaming() {
                return Err(Error::UnsupportedStreaming {
                    method: format!("{}.{}", service.name(), method.name()),
                });
            }
            let input = self.resolver.resolve_and_import(
                method.input_type(),
                scope.file,
                &mut scope.imports,
            )?;
            let output = self.resolver.resolve_and_import(
                method.output_type(),
                scope.file,
                &mut scope.imports,
            )?;
            methods.push(MethodDescriptor {
                name: method.name().to_string(),
                input,
                output,
                comment: scope.comments.get(&child_path(path, SERVICE_METHOD, i)),
            });
        }

        Ok(ServiceDescriptor {
            name: service.name().to_string(),
            methods,
            comment: scope.comments.get(path),
        })
    }
}

fn reject_extensions(extensions: &[FieldDescriptorProto], prefix: &str) -> Result<()> {
    match extensions.first() {
        Some(extension) => Err(Error::UnsupportedExtension {
            field: format!("{}{}", prefix, extension.name()),
            extendee: extension
                .extendee()
                .strip_prefix('.')
                .unwrap_or(extension.extendee())
                .to_string(),
        }),
        None => Ok(()),
    }
}

/// Top-level names the generated module declares, which imports must not shadow
fn reserve_declarations(file: &FileDescriptorProto, imports: &mut ImportTable) {
    for enum_type in &file.enum_type {
        imports.reserve(enum_type.name());
    }
    for message in &file.message_type {
        imports.reserve(message.name());
    }
    for service in &file.service {
        imports.reserve(service.name());
        imports.reserve(format!("create{}", service.name()));
        for method in &service.method {
            imports.reserve(method.name());
            imports.reserve(format!("{}JSON", method.name()));
        }
    }
}

/// proto3 `optional`, real oneof members and proto2 singular fields track presence
fn has_explicit_presence(
    field: &FieldDescriptorProto,
    message: &DescriptorProto,
    syntax: ProtoSyntax,
) -> bool {
    if field.proto3_optional() {
        return true;
    }
    if let Some(index) = field.oneof_index {
        if message.oneof_decl.get(index as usize).is_some() {
            return true;
        }
    }
    syntax == ProtoSyntax::Proto2
}

fn check_map_entry(fq_name: &str, fields: &[FieldDescriptor]) -> Result<()> {
    match fields {
        [key, value]
            if key.proto_name == "key"
                && key.number == 1
                && value.proto_name == "value"
                && value.number == 2 =>
        {
            if key.kind.is_valid_map_key() {
                Ok(())
            } else {
                Err(Error::invalid_map_entry(fq_name, "key type cannot be a map key"))
            }
        }
        _ => Err(Error::invalid_map_entry(
            fq_name,
            "expected exactly `key = 1` and `value = 2`",
        )),
    }
}

/// Key and value of a validated entry, with implicit presence regardless of syntax
fn map_key_value(entry: &MessageNode) -> Result<(FieldDescriptor, FieldDescriptor)> {
    let [key, value] = entry.fields.as_slice() else {
        return Err(Error::invalid_map_entry(&entry.fq_name, "expected two fields"));
    };
    let normalize = |field: &FieldDescriptor| -> Result<FieldDescriptor> {
        let shape = describe(&field.kind, false, false)?;
        Ok(FieldDescriptor {
            optional: false,
            default: shape.default,
            ..field.clone()
        })
    };
    Ok((normalize(key)?, normalize(value)?))
}

fn warn_json_name_collisions(fq_name: &str, fields: &[FieldDescriptor]) {
    for field in fields {
        let Some(custom) = &field.custom_json_name else {
            continue;
        };
        for other in fields.iter().filter(|o| o.number != field.number) {
            if &other.proto_name == custom || &other.json_name == custom {
                warn!(
                    "{}: json_name '{}' of field '{}' collides with field '{}'; decoding prefers '{}'",
                    fq_name, custom, field.proto_name, other.proto_name, field.proto_name
                );
            }
        }
    }
}

fn relative_to_package(fq_name: &str, package: &str) -> String {
    if package.is_empty() {
        fq_name.to_string()
    } else {
        fq_name
            .strip_prefix(package)
            .and_then(|s| s.strip_prefix('.'))
            .unwrap_or(fq_name)
            .to_string()
    }
}
