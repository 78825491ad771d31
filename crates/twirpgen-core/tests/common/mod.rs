//! Descriptor builders shared by the integration tests.

#![allow(dead_code)]

use prost_types::compiler::CodeGeneratorRequest;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MessageOptions, MethodDescriptorProto, OneofDescriptorProto,
    ServiceDescriptorProto, SourceCodeInfo,
};
use twirpgen_core::descriptor::to_lower_camel_case;
use twirpgen_core::{build_trees, FileTree, GeneratorConfig};

pub fn proto3(name: &str, package: &str) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: (!package.is_empty()).then(|| package.to_string()),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|(n, v)| EnumValueDescriptorProto {
                name: Some(n.to_string()),
                number: Some(*v),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(to_lower_camel_case(name)),
        ..Default::default()
    }
}

pub fn reference(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar(name, number, ty)
    }
}

pub fn repeated(field: FieldDescriptorProto) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..field
    }
}

/// Marks `message.field[index]` as proto3 `optional` with its synthetic oneof
pub fn make_optional(message: &mut DescriptorProto, index: usize) {
    let oneof_index = message.oneof_decl.len() as i32;
    let field = &mut message.field[index];
    message.oneof_decl.push(OneofDescriptorProto {
        name: Some(format!("_{}", field.name())),
        ..Default::default()
    });
    field.proto3_optional = Some(true);
    field.oneof_index = Some(oneof_index);
}

/// Adds `map<key, value> name = number` to `message`, whose fully qualified
/// name is `message_fq` (no leading dot)
pub fn add_map(
    message: &mut DescriptorProto,
    message_fq: &str,
    name: &str,
    number: i32,
    key: Type,
    value: FieldDescriptorProto,
) {
    let mut entry_name = String::new();
    let camel = to_lower_camel_case(name);
    let mut chars = camel.chars();
    if let Some(first) = chars.next() {
        entry_name.extend(first.to_uppercase());
        entry_name.extend(chars);
    }
    entry_name.push_str("Entry");

    message.nested_type.push(DescriptorProto {
        name: Some(entry_name.clone()),
        field: vec![
            scalar("key", 1, key),
            FieldDescriptorProto {
                name: Some("value".to_string()),
                number: Some(2),
                json_name: Some("value".to_string()),
                ..value
            },
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    });
    message.field.push(repeated(reference(
        name,
        number,
        Type::Message,
        &format!(".{}.{}", message_fq, entry_name),
    )));
}

pub fn service(name: &str, methods: &[(&str, &str, &str)]) -> ServiceDescriptorProto {
    ServiceDescriptorProto {
        name: Some(name.to_string()),
        method: methods
            .iter()
            .map(|(m, input, output)| MethodDescriptorProto {
                name: Some(m.to_string()),
                input_type: Some(input.to_string()),
                output_type: Some(output.to_string()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub fn with_comment(file: &mut FileDescriptorProto, path: Vec<i32>, comment: &str) {
    file.source_code_info
        .get_or_insert_with(SourceCodeInfo::default)
        .location
        .push(Location {
            path,
            leading_comments: Some(comment.to_string()),
            ..Default::default()
        });
}

pub fn request(
    files: Vec<FileDescriptorProto>,
    targets: &[&str],
    parameter: Option<&str>,
) -> CodeGeneratorRequest {
    CodeGeneratorRequest {
        file_to_generate: targets.iter().map(|t| t.to_string()).collect(),
        parameter: parameter.map(str::to_string),
        proto_file: files,
        ..Default::default()
    }
}

/// `size.proto` declaring `shop.Size { int32 inches = 1; }`
pub fn size_file() -> FileDescriptorProto {
    FileDescriptorProto {
        message_type: vec![message("Size", vec![scalar("inches", 1, Type::Int32)])],
        ..proto3("size.proto", "shop")
    }
}

/// `hat.proto`: a message exercising every field shape, an enum and a service
pub fn hat_file() -> FileDescriptorProto {
    let mut hat = message(
        "Hat",
        vec![
            scalar("name", 1, Type::String),
            repeated(scalar("sizes", 2, Type::Int32)),
        ],
    );
    add_map(&mut hat, "shop.Hat", "stock", 3, Type::String, scalar("value", 2, Type::Int32));
    hat.field.extend([
        reference("color", 4, Type::Enum, ".shop.Color"),
        reference("size", 5, Type::Message, ".shop.Size"),
        scalar("serial", 6, Type::Int64),
        scalar("tag", 7, Type::Bytes),
        scalar("weight", 8, Type::Int32),
        repeated(scalar("labels", 9, Type::String)),
        scalar("ratio", 10, Type::Double),
        scalar("brim_width", 11, Type::Uint32),
    ]);
    make_optional(&mut hat, 7);

    FileDescriptorProto {
        dependency: vec!["size.proto".to_string()],
        enum_type: vec![enumeration("Color", &[("RED", 0), ("GREEN", 1)])],
        message_type: vec![hat],
        service: vec![service("Haberdasher", &[("MakeHat", ".shop.Size", ".shop.Hat")])],
        ..proto3("hat.proto", "shop")
    }
}

pub fn trees(files: &[FileDescriptorProto], config: &GeneratorConfig) -> Vec<FileTree> {
    let targets: Vec<String> = files.iter().map(|f| f.name().to_string()).collect();
    build_trees(files, &targets, config).expect("fixture files build")
}
