//! Field descriptor resolution.
//!
//! [`describe`] maps a protobuf field kind and label to everything the
//! emitter needs to know about a field: its type in the generated language,
//! its zero value, and the runtime reader/writer operations. The mapping is a
//! single exhaustive `match` over [`FieldKind`]; adding a kind without handling
//! it here does not compile.

use crate::error::{Error, Result};
use crate::resolve::TypeRef;
use crate::wire::WireType;
use prost_types::field_descriptor_proto::Type;

/// Protobuf field kinds, one per `FieldDescriptorProto.type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
    /// An enum, resolved
    Enum(TypeRef),
    /// A message, resolved
    Message(TypeRef),
    /// A proto2 group (always rejected)
    Group,
}

impl FieldKind {
    /// Converts a descriptor type. `target` is only invoked for message and
    /// enum kinds, so resolution (and its import side effect) happens exactly
    /// when a type reference exists.
    pub fn from_proto(ty: Type, target: impl FnOnce() -> Result<TypeRef>) -> Result<Self> {
        Ok(match ty {
            Type::Double => FieldKind::Double,
            Type::Float => FieldKind::Float,
            Type::Int64 => FieldKind::Int64,
            Type::Uint64 => FieldKind::Uint64,
            Type::Int32 => FieldKind::Int32,
            Type::Fixed64 => FieldKind::Fixed64,
            Type::Fixed32 => FieldKind::Fixed32,
            Type::Bool => FieldKind::Bool,
            Type::String => FieldKind::String,
            Type::Group => FieldKind::Group,
            Type::Message => FieldKind::Message(target()?),
            Type::Bytes => FieldKind::Bytes,
            Type::Uint32 => FieldKind::Uint32,
            Type::Enum => FieldKind::Enum(target()?),
            Type::Sfixed32 => FieldKind::Sfixed32,
            Type::Sfixed64 => FieldKind::Sfixed64,
            Type::Sint32 => FieldKind::Sint32,
            Type::Sint64 => FieldKind::Sint64,
        })
    }

    /// Wire type of a single (unpacked) value
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Sint32
            | FieldKind::Sint64
            | FieldKind::Bool
            | FieldKind::Enum(_) => WireType::Varint,
            FieldKind::Double | FieldKind::Fixed64 | FieldKind::Sfixed64 => WireType::I64,
            FieldKind::Float | FieldKind::Fixed32 | FieldKind::Sfixed32 => WireType::I32,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message(_) => WireType::Len,
            FieldKind::Group => WireType::StartGroup,
        }
    }

    /// Whether repeated values of this kind use packed encoding
    pub fn is_packable(&self) -> bool {
        matches!(
            self.wire_type(),
            WireType::Varint | WireType::I64 | WireType::I32
        )
    }

    /// Whether this kind may be used as a map key
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(
            self,
            FieldKind::Double
                | FieldKind::Float
                | FieldKind::Bytes
                | FieldKind::Enum(_)
                | FieldKind::Message(_)
                | FieldKind::Group
        )
    }
}

/// Type of a field in the generated language
#[derive(Debug, Clone, PartialEq)]
pub enum LangType {
    /// `number`
    Number,
    /// `bigint`, used for every 64-bit integer kind
    BigInt,
    /// `boolean`
    Boolean,
    /// `string`
    String,
    /// `Uint8Array`
    Bytes,
    /// A generated enum type
    Enum(TypeRef),
    /// A generated message type
    Message(TypeRef),
    /// `Record<string, V>` built from a synthetic map entry
    Map(Box<MapType>),
}

/// Key and value of a map field, taken from its synthetic entry message
#[derive(Debug, Clone, PartialEq)]
pub struct MapType {
    /// Field 1 of the entry
    pub key: FieldDescriptor,
    /// Field 2 of the entry
    pub value: FieldDescriptor,
}

/// Value a field holds before anything is decoded into it
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// `0`
    Zero,
    /// `0n`
    BigZero,
    /// `false`
    False,
    /// `""`
    EmptyString,
    /// `new Uint8Array()`
    EmptyBytes,
    /// The enum value numbered 0
    EnumZero(TypeRef),
    /// `[]`
    EmptyList,
    /// `{}`
    EmptyMap,
    /// `undefined`; explicit presence and message fields
    Unset,
}

/// Runtime `BinaryReader` / `BinaryWriter` method names for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireOps {
    /// Reads one value
    pub read: &'static str,
    /// Writes the field (the whole sequence for repeated fields)
    pub write: &'static str,
    /// Reads a packed run of values, for repeated packable kinds
    pub packed_read: Option<&'static str>,
}

/// What [`describe`] derives for a (kind, label) pair
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    /// Generated-language type of one element
    pub lang_type: LangType,
    /// Initial value of the field
    pub default: DefaultValue,
    /// Runtime operations
    pub ops: WireOps,
}

/// Resolves the shape of a field.
///
/// `repeated` selects sequence writers and packed readers; `optional` marks
/// explicit presence, which replaces the zero value by `undefined`.
pub fn describe(kind: &FieldKind, repeated: bool, optional: bool) -> Result<FieldShape> {
    use LangType as L;

    // (language type, zero value, read, write, repeated write, packed read)
    let (lang_type, zero, read, write, write_repeated, packed_read) = match kind {
        FieldKind::Double => (
            L::Number,
            DefaultValue::Zero,
            "readDouble",
            "writeDouble",
            "writePackedDouble",
            Some("readPackedDouble"),
        ),
        FieldKind::Float => (
            L::Number,
            DefaultValue::Zero,
            "readFloat",
            "writeFloat",
            "writePackedFloat",
            Some("readPackedFloat"),
        ),
        FieldKind::Int32 => (
            L::Number,
            DefaultValue::Zero,
            "readInt32",
            "writeInt32",
            "writePackedInt32",
            Some("readPackedInt32"),
        ),
        FieldKind::Int64 => (
            L::BigInt,
            DefaultValue::BigZero,
            "readInt64String",
            "writeInt64String",
            "writePackedInt64String",
            Some("readPackedInt64String"),
        ),
        FieldKind::Uint32 => (
            L::Number,
            DefaultValue::Zero,
            "readUint32",
            "writeUint32",
            "writePackedUint32",
            Some("readPackedUint32"),
        ),
        FieldKind::Uint64 => (
            L::BigInt,
            DefaultValue::BigZero,
            "readUint64String",
            "writeUint64String",
            "writePackedUint64String",
            Some("readPackedUint64String"),
        ),
        FieldKind::Sint32 => (
            L::Number,
            DefaultValue::Zero,
            "readSint32",
            "writeSint32",
            "writePackedSint32",
            Some("readPackedSint32"),
        ),
        FieldKind::Sint64 => (
            L::BigInt,
            DefaultValue::BigZero,
            "readSint64String",
            "writeSint64String",
            "writePackedSint64String",
            Some("readPackedSint64String"),
        ),
        FieldKind::Fixed32 => (
            L::Number,
            DefaultValue::Zero,
            "readFixed32",
            "writeFixed32",
            "writePackedFixed32",
            Some("readPackedFixed32"),
        ),
        FieldKind::Fixed64 => (
            L::BigInt,
            DefaultValue::BigZero,
            "readFixed64String",
            "writeFixed64String",
            "writePackedFixed64String",
            Some("readPackedFixed64String"),
        ),
        FieldKind::Sfixed32 => (
            L::Number,
            DefaultValue::Zero,
            "readSfixed32",
            "writeSfixed32",
            "writePackedSfixed32",
            Some("readPackedSfixed32"),
        ),
        FieldKind::Sfixed64 => (
            L::BigInt,
            DefaultValue::BigZero,
            "readSfixed64String",
            "writeSfixed64String",
            "writePackedSfixed64String",
            Some("readPackedSfixed64String"),
        ),
        FieldKind::Bool => (
            L::Boolean,
            DefaultValue::False,
            "readBool",
            "writeBool",
            "writePackedBool",
            Some("readPackedBool"),
        ),
        FieldKind::String => (
            L::String,
            DefaultValue::EmptyString,
            "readString",
            "writeString",
            "writeRepeatedString",
            None,
        ),
        FieldKind::Bytes => (
            L::Bytes,
            DefaultValue::EmptyBytes,
            "readBytes",
            "writeBytes",
            "writeRepeatedBytes",
            None,
        ),
        FieldKind::Enum(target) => (
            L::Enum(target.clone()),
            DefaultValue::EnumZero(target.clone()),
            "readEnum",
            "writeEnum",
            "writePackedEnum",
            Some("readPackedEnum"),
        ),
        FieldKind::Message(target) => (
            L::Message(target.clone()),
            DefaultValue::Unset,
            "readMessage",
            "writeMessage",
            "writeRepeatedMessage",
            None,
        ),
        FieldKind::Group => return Err(Error::unsupported_group("<group>")),
    };

    let default = if repeated {
        DefaultValue::EmptyList
    } else if optional {
        DefaultValue::Unset
    } else {
        zero
    };

    let ops = if repeated {
        WireOps {
            read,
            write: write_repeated,
            packed_read,
        }
    } else {
        WireOps {
            read,
            write,
            packed_read: None,
        }
    };

    Ok(FieldShape {
        lang_type,
        default,
        ops,
    })
}

/// A fully resolved message field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Property name in the generated interface (lowerCamelCase)
    pub name: String,
    /// Field number
    pub number: u32,
    /// `repeated` label (false for map fields)
    pub repeated: bool,
    /// Explicit presence: proto3 `optional`, oneof members, proto2 singulars
    pub optional: bool,
    /// Enclosing real oneof; synthetic proto3 `optional` oneofs are not recorded
    pub oneof: Option<String>,
    /// Protobuf kind the shape was derived from
    pub kind: FieldKind,
    /// Generated-language type of one element (or the whole map)
    pub lang_type: LangType,
    /// Initial value
    pub default: DefaultValue,
    /// Runtime operations
    pub ops: WireOps,
    /// Name as written in the `.proto` file
    pub proto_name: String,
    /// JSON name (the custom `json_name` when one is set, else lowerCamelCase)
    pub json_name: String,
    /// `json_name` when it differs from the lowerCamelCase default
    pub custom_json_name: Option<String>,
    /// Leading comment from the source
    pub comment: Option<String>,
}

impl FieldDescriptor {
    /// Key/value descriptors when this is a map field
    pub fn map(&self) -> Option<&MapType> {
        match &self.lang_type {
            LangType::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns true for `map<K, V>` fields
    pub fn is_map(&self) -> bool {
        self.map().is_some()
    }

    /// Returns true for message-typed singular fields
    pub fn is_message(&self) -> bool {
        matches!(self.lang_type, LangType::Message(_)) && !self.repeated
    }

    /// Proto3 implicit presence: the field is omitted when it holds its zero value
    pub fn has_implicit_presence(&self) -> bool {
        !self.repeated && !self.optional && !self.is_map() && !self.is_message()
    }

    /// Key written by the JSON encoder
    pub fn output_json_name(&self, use_proto_field_name: bool) -> &str {
        if use_proto_field_name {
            &self.proto_name
        } else {
            &self.json_name
        }
    }

    /// Keys tried by the JSON decoder, first present wins:
    /// custom `json_name`, lowerCamelCase, original proto name.
    pub fn json_read_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(3);
        let candidates = [
            self.custom_json_name.clone(),
            Some(to_lower_camel_case(&self.proto_name)),
            Some(self.proto_name.clone()),
        ];
        for name in candidates.into_iter().flatten() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Convert a snake_case name to lowerCamelCase, the way protoc derives `json_name`
pub fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}
