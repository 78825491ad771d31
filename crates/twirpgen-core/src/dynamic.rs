//! Dynamic codec over type trees.
//!
//! [`Codec`] encodes and decodes [`MessageValue`]s using the same decisions the
//! emitter writes into generated code: implicit-presence fields are skipped at
//! their zero value, explicit-presence fields are written whenever set,
//! repeated scalars are packed on write and accepted packed or unpacked on
//! read, unknown fields are skipped, and maps travel as repeated key/value
//! entries. It lets the generator's semantics be checked from Rust without a
//! JavaScript runtime.
//!
//! ## Example
//!
//! ```ignore
//! let codec = Codec::new(&trees, &GeneratorConfig::default());
//! let size = MessageValue::new("shop.Size").with("inches", Value::Int32(12));
//! assert_eq!(codec.encode(&size)?, vec![8, 12]);
//! assert_eq!(codec.encode_json(&size)?, r#"{"inches":12}"#);
//! ```

use crate::config::GeneratorConfig;
use crate::descriptor::{DefaultValue, FieldDescriptor, FieldKind, MapType};
use crate::error::{Error, Result};
use crate::tree::{EnumNode, FileTree, MessageNode, ProtoTypeNode};
use crate::wire::{
    consume_field, decode_varint, encode_tag, encode_varint, split_tag, unzigzag32, unzigzag64,
    zigzag32, zigzag64, WireType,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::BufMut;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// An enum value: a declared name, or a number the schema does not know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumValue {
    /// A declared value
    Named(String),
    /// A wire value with no declared name, kept as is
    Unknown(i32),
}

/// A field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `double`
    Double(f64),
    /// `float`
    Float(f32),
    /// `int32`, `sint32`, `sfixed32`
    Int32(i32),
    /// `int64`, `sint64`, `sfixed64`
    Int64(i64),
    /// `uint32`, `fixed32`
    Uint32(u32),
    /// `uint64`, `fixed64`
    Uint64(u64),
    /// `bool`
    Bool(bool),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Vec<u8>),
    /// An enum
    Enum(EnumValue),
    /// A message
    Message(MessageValue),
    /// A repeated field
    List(Vec<Value>),
    /// A map field; keys in their JSON string form
    Map(BTreeMap<String, Value>),
}

/// A message instance, fields keyed by their generated property name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageValue {
    /// Fully qualified message name, without a leading dot
    pub type_name: String,
    /// Set fields; an absent key is an unset field
    pub fields: BTreeMap<String, Value>,
}

impl MessageValue {
    /// Creates an empty message of the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field, builder style
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Sets a field
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Field value, if set
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Encoder/decoder for every message and enum of a set of type trees
#[derive(Debug)]
pub struct Codec<'t> {
    messages: HashMap<&'t str, &'t MessageNode>,
    enums: HashMap<&'t str, &'t EnumNode>,
    emit_default_values: bool,
    use_proto_field_name: bool,
}

impl<'t> Codec<'t> {
    /// Indexes every declaration in `trees`; JSON options come from `config`.
    pub fn new(trees: &'t [FileTree], config: &GeneratorConfig) -> Self {
        let mut messages = HashMap::new();
        let mut enums = HashMap::new();
        for tree in trees {
            tree.walk(|node| match node {
                ProtoTypeNode::Message(m) => {
                    messages.insert(m.fq_name.as_str(), m);
                }
                ProtoTypeNode::Enum(e) => {
                    enums.insert(e.fq_name.as_str(), e);
                }
            });
        }
        trace!(
            "Dynamic codec indexed {} messages and {} enums",
            messages.len(),
            enums.len()
        );
        Self {
            messages,
            enums,
            emit_default_values: config.emit_default_values,
            use_proto_field_name: config.use_proto_field_name,
        }
    }

    fn message(&self, name: &str) -> Result<&'t MessageNode> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.messages
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    fn enumeration(&self, name: &str) -> Result<&'t EnumNode> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.enums
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    fn enum_from_int(&self, enum_name: &str, number: i32) -> Result<EnumValue> {
        let node = self.enumeration(enum_name)?;
        Ok(match node.name_of(number) {
            Some(name) => EnumValue::Named(name.to_string()),
            None => EnumValue::Unknown(number),
        })
    }

    fn enum_to_int(&self, enum_name: &str, value: &EnumValue, field: &str) -> Result<i32> {
        match value {
            EnumValue::Unknown(number) => Ok(*number),
            EnumValue::Named(name) => self
                .enumeration(enum_name)?
                .number_of(name)
                .ok_or_else(|| {
                    let details = format!("'{}' is not a value of {}", name, enum_name);
                    Error::invalid_value(field, details)
                }),
        }
    }

    /// A message with every field at its initial value
    pub fn initialize(&self, type_name: &str) -> Result<MessageValue> {
        self.initialize_node(self.message(type_name)?)
    }

    fn initialize_node(&self, node: &MessageNode) -> Result<MessageValue> {
        let mut msg = MessageValue::new(node.fq_name.clone());
        for field in &node.fields {
            if let Some(value) = self.default_value(field)? {
                msg.fields.insert(field.name.clone(), value);
            }
        }
        Ok(msg)
    }

    fn default_value(&self, field: &FieldDescriptor) -> Result<Option<Value>> {
        Ok(match &field.default {
            DefaultValue::Zero
            | DefaultValue::BigZero
            | DefaultValue::False
            | DefaultValue::EmptyString
            | DefaultValue::EmptyBytes => Some(zero_of(&field.kind)?),
            DefaultValue::EnumZero(target) => {
                Some(Value::Enum(self.enum_from_int(&target.fq_name, 0)?))
            }
            DefaultValue::EmptyList => Some(Value::List(Vec::new())),
            DefaultValue::EmptyMap => Some(Value::Map(BTreeMap::new())),
            DefaultValue::Unset => None,
        })
    }

    // Binary encoding

    /// Serializes a message to the protobuf wire format
    pub fn encode(&self, msg: &MessageValue) -> Result<Vec<u8>> {
        let node = self.message(&msg.type_name)?;
        let mut buf = Vec::new();
        self.encode_message(node, msg, &mut buf)?;
        Ok(buf)
    }

    fn encode_message(
        &self,
        node: &MessageNode,
        msg: &MessageValue,
        buf: &mut Vec<u8>,
    ) -> Result<()> {
        for field in &node.fields {
            let Some(value) = msg.fields.get(&field.name) else {
                continue;
            };
            let path = format!("{}.{}", node.fq_name, field.name);

            if let Some(map) = field.map() {
                let Value::Map(entries) = value else {
                    return Err(Error::invalid_value(&path, "expected a map"));
                };
                for (key, value) in entries {
                    let mut entry = Vec::new();
                    let key = parse_map_key(&map.key.kind, key, &path)?;
                    self.write_field(&map.key, &key, &mut entry, &path)?;
                    self.write_field(&map.value, value, &mut entry, &path)?;
                    encode_tag(field.number, WireType::Len, buf);
                    encode_varint(entry.len() as u64, buf);
                    buf.put_slice(&entry);
                }
                continue;
            }

            if field.repeated {
                let Value::List(items) = value else {
                    return Err(Error::invalid_value(&path, "expected a list"));
                };
                if items.is_empty() {
                    continue;
                }
                if field.kind.is_packable() {
                    let mut packed = Vec::new();
                    for item in items {
                        self.write_value(&field.kind, item, &mut packed, &path)?;
                    }
                    encode_tag(field.number, WireType::Len, buf);
                    encode_varint(packed.len() as u64, buf);
                    buf.put_slice(&packed);
                } else {
                    for item in items {
                        self.write_field(field, item, buf, &path)?;
                    }
                }
                continue;
            }

            if field.has_implicit_presence() && self.is_zero(field, value, &path)? {
                continue;
            }
            self.write_field(field, value, buf, &path)?;
        }
        Ok(())
    }

    fn write_field(
        &self,
        field: &FieldDescriptor,
        value: &Value,
        buf: &mut Vec<u8>,
        path: &str,
    ) -> Result<()> {
        encode_tag(field.number, field.kind.wire_type(), buf);
        self.write_value(&field.kind, value, buf, path)
    }

    fn write_value(
        &self,
        kind: &FieldKind,
        value: &Value,
        buf: &mut Vec<u8>,
        path: &str,
    ) -> Result<()> {
        match (kind, value) {
            (FieldKind::Double, Value::Double(v)) => buf.put_f64_le(*v),
            (FieldKind::Float, Value::Float(v)) => buf.put_f32_le(*v),
            (FieldKind::Int32, Value::Int32(v)) => encode_varint(*v as i64 as u64, buf),
            (FieldKind::Int64, Value::Int64(v)) => encode_varint(*v as u64, buf),
            (FieldKind::Uint32, Value::Uint32(v)) => encode_varint(*v as u64, buf),
            (FieldKind::Uint64, Value::Uint64(v)) => encode_varint(*v, buf),
            (FieldKind::Sint32, Value::Int32(v)) => encode_varint(zigzag32(*v), buf),
            (FieldKind::Sint64, Value::Int64(v)) => encode_varint(zigzag64(*v), buf),
            (FieldKind::Fixed32, Value::Uint32(v)) => buf.put_u32_le(*v),
            (FieldKind::Fixed64, Value::Uint64(v)) => buf.put_u64_le(*v),
            (FieldKind::Sfixed32, Value::Int32(v)) => buf.put_i32_le(*v),
            (FieldKind::Sfixed64, Value::Int64(v)) => buf.put_i64_le(*v),
            (FieldKind::Bool, Value::Bool(v)) => encode_varint(*v as u64, buf),
            (FieldKind::String, Value::String(s)) => {
                encode_varint(s.len() as u64, buf);
                buf.put_slice(s.as_bytes());
            }
            (FieldKind::Bytes, Value::Bytes(b)) => {
                encode_varint(b.len() as u64, buf);
                buf.put_slice(b);
            }
            (FieldKind::Enum(target), Value::Enum(e)) => {
                let number = self.enum_to_int(&target.fq_name, e, path)?;
                encode_varint(number as i64 as u64, buf);
            }
            (FieldKind::Message(target), Value::Message(m)) => {
                let node = self.message(&target.fq_name)?;
                let mut nested = Vec::new();
                self.encode_message(node, m, &mut nested)?;
                encode_varint(nested.len() as u64, buf);
                buf.put_slice(&nested);
            }
            (kind, value) => {
                return Err(Error::invalid_value(
                    path,
                    format!("{:?} does not fit a {:?} field", value, kind),
                ))
            }
        }
        Ok(())
    }

    fn is_zero(&self, field: &FieldDescriptor, value: &Value, path: &str) -> Result<bool> {
        Ok(match value {
            Value::Double(v) => *v == 0.0,
            Value::Float(v) => *v == 0.0,
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::Uint32(v) => *v == 0,
            Value::Uint64(v) => *v == 0,
            Value::Bool(v) => !*v,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Enum(e) => match &field.kind {
                FieldKind::Enum(target) => self.enum_to_int(&target.fq_name, e, path)? == 0,
                _ => false,
            },
            Value::Message(_) | Value::List(_) | Value::Map(_) => false,
        })
    }

    // Binary decoding

    /// Parses a message from the protobuf wire format
    pub fn decode(&self, type_name: &str, data: &[u8]) -> Result<MessageValue> {
        let node = self.message(type_name)?;
        let mut msg = self.initialize_node(node)?;
        self.decode_message(node, data, 0, &mut msg)?;
        Ok(msg)
    }

    fn decode_message(
        &self,
        node: &MessageNode,
        data: &[u8],
        base: usize,
        msg: &mut MessageValue,
    ) -> Result<()> {
        let mut pos = 0;
        while pos < data.len() {
            let (tag, tag_len) =
                decode_varint(&data[pos..]).map_err(|_| Error::varint_decode(base + pos))?;
            let (number, wire_type) = split_tag(tag)?;

            let Some(field) = node.field_by_number(number) else {
                let skipped = skip_unknown(&data[pos..], number, wire_type, base + pos)?;
                trace!("Skipped unknown field {} of {} ({} bytes)", number, node.fq_name, skipped);
                pos += skipped;
                continue;
            };

            let start = pos + tag_len;
            pos = start
                + self.decode_field(node, field, wire_type, &data[start..], base + start, msg)?;
            for sibling in node.oneof_siblings(field) {
                msg.fields.remove(&sibling.name);
            }
        }
        Ok(())
    }

    fn decode_field(
        &self,
        node: &MessageNode,
        field: &FieldDescriptor,
        wire_type: WireType,
        data: &[u8],
        base: usize,
        msg: &mut MessageValue,
    ) -> Result<usize> {
        let path = format!("{}.{}", node.fq_name, field.name);

        if let Some(map) = field.map() {
            expect_wire(WireType::Len, wire_type, &path, base)?;
            let (entry, consumed) = len_delimited(data, base)?;
            let (key, value) =
                self.decode_map_entry(map, entry, base + consumed - entry.len(), &path)?;
            if let Value::Map(entries) = msg
                .fields
                .entry(field.name.clone())
                .or_insert_with(|| Value::Map(BTreeMap::new()))
            {
                entries.insert(key, value);
            }
            return Ok(consumed);
        }

        if let FieldKind::Message(target) = &field.kind {
            expect_wire(WireType::Len, wire_type, &path, base)?;
            let (payload, consumed) = len_delimited(data, base)?;
            let payload_base = base + consumed - payload.len();
            let nested = self.message(&target.fq_name)?;

            if field.repeated {
                let mut item = self.initialize_node(nested)?;
                self.decode_message(nested, payload, payload_base, &mut item)?;
                push(msg, &field.name, Value::Message(item));
            } else {
                // A repeated occurrence of a singular message merges into it
                let mut item = match msg.fields.remove(&field.name) {
                    Some(Value::Message(existing)) => existing,
                    _ => self.initialize_node(nested)?,
                };
                self.decode_message(nested, payload, payload_base, &mut item)?;
                msg.fields.insert(field.name.clone(), Value::Message(item));
            }
            return Ok(consumed);
        }

        if field.repeated && field.kind.is_packable() && wire_type == WireType::Len {
            let (payload, consumed) = len_delimited(data, base)?;
            let payload_base = base + consumed - payload.len();
            let mut pos = 0;
            while pos < payload.len() {
                let (value, used) =
                    self.read_value(&field.kind, &payload[pos..], payload_base + pos, &path)?;
                push(msg, &field.name, value);
                pos += used;
            }
            return Ok(consumed);
        }

        expect_wire(field.kind.wire_type(), wire_type, &path, base)?;
        let (value, consumed) = self.read_value(&field.kind, data, base, &path)?;
        if field.repeated {
            push(msg, &field.name, value);
        } else {
            msg.fields.insert(field.name.clone(), value);
        }
        Ok(consumed)
    }

    fn read_value(
        &self,
        kind: &FieldKind,
        data: &[u8],
        base: usize,
        path: &str,
    ) -> Result<(Value, usize)> {
        let varint = || decode_varint(data).map_err(|_| Error::varint_decode(base));
        let fixed8 = || {
            data.get(..8)
                .and_then(|s| <[u8; 8]>::try_from(s).ok())
                .ok_or_else(|| Error::invalid_wire_format(base, "not enough bytes for I64"))
        };
        let fixed4 = || {
            data.get(..4)
                .and_then(|s| <[u8; 4]>::try_from(s).ok())
                .ok_or_else(|| Error::invalid_wire_format(base, "not enough bytes for I32"))
        };

        Ok(match kind {
            FieldKind::Int32 => varint().map(|(v, n)| (Value::Int32(v as i32), n))?,
            FieldKind::Int64 => varint().map(|(v, n)| (Value::Int64(v as i64), n))?,
            FieldKind::Uint32 => varint().map(|(v, n)| (Value::Uint32(v as u32), n))?,
            FieldKind::Uint64 => varint().map(|(v, n)| (Value::Uint64(v), n))?,
            FieldKind::Sint32 => varint().map(|(v, n)| (Value::Int32(unzigzag32(v)), n))?,
            FieldKind::Sint64 => varint().map(|(v, n)| (Value::Int64(unzigzag64(v)), n))?,
            FieldKind::Bool => varint().map(|(v, n)| (Value::Bool(v != 0), n))?,
            FieldKind::Enum(target) => {
                let (v, n) = varint()?;
                (Value::Enum(self.enum_from_int(&target.fq_name, v as i32)?), n)
            }
            FieldKind::Double => (Value::Double(f64::from_le_bytes(fixed8()?)), 8),
            FieldKind::Fixed64 => (Value::Uint64(u64::from_le_bytes(fixed8()?)), 8),
            FieldKind::Sfixed64 => (Value::Int64(i64::from_le_bytes(fixed8()?)), 8),
            FieldKind::Float => (Value::Float(f32::from_le_bytes(fixed4()?)), 4),
            FieldKind::Fixed32 => (Value::Uint32(u32::from_le_bytes(fixed4()?)), 4),
            FieldKind::Sfixed32 => (Value::Int32(i32::from_le_bytes(fixed4()?)), 4),
            FieldKind::String => {
                let (payload, consumed) = len_delimited(data, base)?;
                let s = std::str::from_utf8(payload)
                    .map_err(|e| {
                        Error::invalid_wire_format(base, format!("{}: invalid UTF-8: {}", path, e))
                    })?;
                (Value::String(s.to_string()), consumed)
            }
            FieldKind::Bytes => {
                let (payload, consumed) = len_delimited(data, base)?;
                (Value::Bytes(payload.to_vec()), consumed)
            }
            FieldKind::Message(_) | FieldKind::Group => {
                return Err(Error::internal(format!("{} is not a scalar field", path)))
            }
        })
    }

    fn decode_map_entry(
        &self,
        map: &MapType,
        data: &[u8],
        base: usize,
        path: &str,
    ) -> Result<(String, Value)> {
        let mut key = zero_of(&map.key.kind)?;
        let mut value = match (&map.value.kind, self.default_value(&map.value)?) {
            (FieldKind::Message(target), _) => Value::Message(self.initialize(&target.fq_name)?),
            (_, Some(v)) => v,
            (_, None) => return Err(Error::internal(format!("{}: map value has no default", path))),
        };

        let mut pos = 0;
        while pos < data.len() {
            let (tag, tag_len) =
                decode_varint(&data[pos..]).map_err(|_| Error::varint_decode(base + pos))?;
            let (number, wire_type) = split_tag(tag)?;
            let start = pos + tag_len;
            match number {
                1 => {
                    expect_wire(map.key.kind.wire_type(), wire_type, path, base + start)?;
                    let (v, used) =
                        self.read_value(&map.key.kind, &data[start..], base + start, path)?;
                    key = v;
                    pos = start + used;
                }
                2 => {
                    expect_wire(map.value.kind.wire_type(), wire_type, path, base + start)?;
                    if let FieldKind::Message(target) = &map.value.kind {
                        let Value::Message(existing) = &mut value else {
                            return Err(Error::internal(format!(
                                "{}: map value is not a message",
                                path
                            )));
                        };
                        let (payload, consumed) = len_delimited(&data[start..], base + start)?;
                        let nested = self.message(&target.fq_name)?;
                        let payload_base = base + start + consumed - payload.len();
                        self.decode_message(nested, payload, payload_base, existing)?;
                        pos = start + consumed;
                    } else {
                        let (v, used) =
                            self.read_value(&map.value.kind, &data[start..], base + start, path)?;
                        value = v;
                        pos = start + used;
                    }
                }
                _ => pos += skip_unknown(&data[pos..], number, wire_type, base + pos)?,
            }
        }

        Ok((map_key_string(&key), value))
    }

    // JSON

    /// Serializes a message to proto3 JSON text
    pub fn encode_json(&self, msg: &MessageValue) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json(msg)?)?)
    }

    /// Converts a message to a JSON value
    pub fn to_json(&self, msg: &MessageValue) -> Result<JsonValue> {
        let node = self.message(&msg.type_name)?;
        self.message_to_json(node, msg)
    }

    fn message_to_json(&self, node: &MessageNode, msg: &MessageValue) -> Result<JsonValue> {
        let mut json = JsonMap::new();
        for field in &node.fields {
            let Some(value) = msg.fields.get(&field.name) else {
                continue;
            };
            let path = format!("{}.{}", node.fq_name, field.name);

            let write = match value {
                Value::Map(entries) => self.emit_default_values || !entries.is_empty(),
                Value::List(items) => self.emit_default_values || !items.is_empty(),
                _ if field.has_implicit_presence() => {
                    self.emit_default_values || !self.is_zero(field, value, &path)?
                }
                _ => true,
            };
            if !write {
                continue;
            }

            let key = field.output_json_name(self.use_proto_field_name).to_string();
            let json_value = match (field.map(), value) {
                (Some(map), Value::Map(entries)) => {
                    let mut object = JsonMap::new();
                    for (k, v) in entries {
                        object.insert(k.clone(), self.value_to_json(&map.value.kind, v, &path)?);
                    }
                    JsonValue::Object(object)
                }
                (None, Value::List(items)) if field.repeated => JsonValue::Array(
                    items
                        .iter()
                        .map(|item| self.value_to_json(&field.kind, item, &path))
                        .collect::<Result<_>>()?,
                ),
                (None, value) if !field.repeated => self.value_to_json(&field.kind, value, &path)?,
                (_, value) => {
                    return Err(Error::invalid_value(
                        &path,
                        format!("{:?} does not fit the field", value),
                    ))
                }
            };
            json.insert(key, json_value);
        }
        Ok(JsonValue::Object(json))
    }

    fn value_to_json(&self, kind: &FieldKind, value: &Value, path: &str) -> Result<JsonValue> {
        Ok(match (kind, value) {
            (_, Value::Double(v)) => float_to_json(*v),
            (_, Value::Float(v)) => float_to_json(*v as f64),
            (_, Value::Int32(v)) => JsonValue::from(*v),
            (_, Value::Uint32(v)) => JsonValue::from(*v),
            (_, Value::Int64(v)) => JsonValue::String(v.to_string()),
            (_, Value::Uint64(v)) => JsonValue::String(v.to_string()),
            (_, Value::Bool(v)) => JsonValue::Bool(*v),
            (_, Value::String(s)) => JsonValue::String(s.clone()),
            (_, Value::Bytes(b)) => JsonValue::String(STANDARD.encode(b)),
            (_, Value::Enum(EnumValue::Named(name))) => JsonValue::String(name.clone()),
            (_, Value::Enum(EnumValue::Unknown(number))) => JsonValue::from(*number),
            (FieldKind::Message(target), Value::Message(m)) => {
                self.message_to_json(self.message(&target.fq_name)?, m)?
            }
            (_, other) => {
                return Err(Error::invalid_value(
                    path,
                    format!("{:?} does not fit a {:?} field", other, kind),
                ))
            }
        })
    }

    /// Parses proto3 JSON text into a message
    pub fn decode_json(&self, type_name: &str, json: &str) -> Result<MessageValue> {
        let parsed: JsonValue = serde_json::from_str(json)?;
        self.from_json(type_name, &parsed)
    }

    /// Converts a JSON value into a message
    pub fn from_json(&self, type_name: &str, json: &JsonValue) -> Result<MessageValue> {
        let node = self.message(type_name)?;
        let mut msg = self.initialize_node(node)?;
        self.message_from_json(node, json, &mut msg)?;
        Ok(msg)
    }

    fn message_from_json(
        &self,
        node: &MessageNode,
        json: &JsonValue,
        msg: &mut MessageValue,
    ) -> Result<()> {
        let JsonValue::Object(object) = json else {
            return Err(Error::invalid_value(&node.fq_name, "expected a JSON object"));
        };

        for field in &node.fields {
            let path = format!("{}.{}", node.fq_name, field.name);
            // First present, non-null candidate wins
            let Some(raw) = field
                .json_read_names()
                .iter()
                .filter_map(|name| object.get(name))
                .find(|v| !v.is_null())
            else {
                continue;
            };

            let value = if let Some(map) = field.map() {
                let JsonValue::Object(entries) = raw else {
                    return Err(Error::invalid_value(&path, "expected a JSON object"));
                };
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    out.insert(k.clone(), self.value_from_json(&map.value.kind, v, &path)?);
                }
                Value::Map(out)
            } else if field.repeated {
                let JsonValue::Array(items) = raw else {
                    return Err(Error::invalid_value(&path, "expected a JSON array"));
                };
                Value::List(
                    items
                        .iter()
                        .map(|item| self.value_from_json(&field.kind, item, &path))
                        .collect::<Result<_>>()?,
                )
            } else if let FieldKind::Message(target) = &field.kind {
                let nested = self.message(&target.fq_name)?;
                let mut item = match msg.fields.remove(&field.name) {
                    Some(Value::Message(existing)) => existing,
                    _ => self.initialize_node(nested)?,
                };
                self.message_from_json(nested, raw, &mut item)?;
                Value::Message(item)
            } else {
                self.value_from_json(&field.kind, raw, &path)?
            };
            msg.fields.insert(field.name.clone(), value);
        }
        Ok(())
    }

    fn value_from_json(&self, kind: &FieldKind, json: &JsonValue, path: &str) -> Result<Value> {
        let bad =
            |what: &str| Error::invalid_value(path, format!("expected {}, got {}", what, json));
        Ok(match kind {
            FieldKind::Double => Value::Double(json_f64(json).ok_or_else(|| bad("a number"))?),
            FieldKind::Float => Value::Float(json_f64(json).ok_or_else(|| bad("a number"))? as f32),
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => Value::Int32(
                json_i64(json)
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| bad("a 32-bit integer"))?,
            ),
            FieldKind::Uint32 | FieldKind::Fixed32 => Value::Uint32(
                json_u64(json)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| bad("an unsigned 32-bit integer"))?,
            ),
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => {
                Value::Int64(json_i64(json).ok_or_else(|| bad("a 64-bit integer"))?)
            }
            FieldKind::Uint64 | FieldKind::Fixed64 => {
                Value::Uint64(json_u64(json).ok_or_else(|| bad("an unsigned 64-bit integer"))?)
            }
            FieldKind::Bool => Value::Bool(json.as_bool().ok_or_else(|| bad("a boolean"))?),
            FieldKind::String => {
                Value::String(json.as_str().ok_or_else(|| bad("a string"))?.to_string())
            }
            FieldKind::Bytes => {
                let text = json.as_str().ok_or_else(|| bad("a base64 string"))?;
                Value::Bytes(
                    STANDARD
                        .decode(text)
                        .map_err(|e| Error::invalid_value(path, format!("invalid base64: {}", e)))?,
                )
            }
            FieldKind::Enum(target) => match json {
                JsonValue::Number(_) => {
                    let number = json_i64(json)
                        .and_then(|v| i32::try_from(v).ok())
                        .ok_or_else(|| bad("an enum number"))?;
                    Value::Enum(self.enum_from_int(&target.fq_name, number)?)
                }
                JsonValue::String(name) => {
                    let node = self.enumeration(&target.fq_name)?;
                    if node.number_of(name).is_none() {
                        return Err(Error::invalid_value(
                            path,
                            format!("'{}' is not a value of {}", name, target.fq_name),
                        ));
                    }
                    Value::Enum(EnumValue::Named(name.clone()))
                }
                _ => return Err(bad("an enum name or number")),
            },
            FieldKind::Message(target) => {
                let nested = self.message(&target.fq_name)?;
                let mut item = self.initialize_node(nested)?;
                self.message_from_json(nested, json, &mut item)?;
                Value::Message(item)
            }
            FieldKind::Group => return Err(Error::unsupported_group(path)),
        })
    }
}

fn zero_of(kind: &FieldKind) -> Result<Value> {
    Ok(match kind {
        FieldKind::Double => Value::Double(0.0),
        FieldKind::Float => Value::Float(0.0),
        FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => Value::Int32(0),
        FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => Value::Int64(0),
        FieldKind::Uint32 | FieldKind::Fixed32 => Value::Uint32(0),
        FieldKind::Uint64 | FieldKind::Fixed64 => Value::Uint64(0),
        FieldKind::Bool => Value::Bool(false),
        FieldKind::String => Value::String(String::new()),
        FieldKind::Bytes => Value::Bytes(Vec::new()),
        FieldKind::Enum(_) | FieldKind::Message(_) | FieldKind::Group => {
            return Err(Error::internal(format!("{:?} has no scalar zero value", kind)))
        }
    })
}

fn push(msg: &mut MessageValue, name: &str, value: Value) {
    let list = msg
        .fields
        .entry(name.to_string())
        .or_insert_with(|| Value::List(Vec::new()));
    match list {
        Value::List(items) => items.push(value),
        other => *other = Value::List(vec![value]),
    }
}

fn expect_wire(expected: WireType, actual: WireType, path: &str, offset: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::invalid_wire_format(
            offset,
            format!("{} expects wire type {:?}, got {:?}", path, expected, actual),
        ))
    }
}

/// Returns the payload of a length-delimited value and the bytes consumed
/// including the length prefix
fn len_delimited(data: &[u8], base: usize) -> Result<(&[u8], usize)> {
    let (len, prefix) = decode_varint(data).map_err(|_| Error::varint_decode(base))?;
    let end = prefix
        .checked_add(len as usize)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            Error::invalid_wire_format(
                base,
                format!("length {} exceeds the {} remaining bytes", len, data.len() - prefix),
            )
        })?;
    Ok((&data[prefix..end], end))
}

/// Skips one unknown field starting at its tag; groups are skipped whole
fn skip_unknown(data: &[u8], number: u32, wire_type: WireType, base: usize) -> Result<usize> {
    let shift = |e: Error| match e {
        Error::InvalidWireFormat { offset, details } => Error::InvalidWireFormat {
            offset: base + offset,
            details,
        },
        other => other,
    };

    let (_, mut pos) = consume_field(data).map_err(shift)?;
    if wire_type != WireType::StartGroup {
        return Ok(pos);
    }

    let mut depth = 1usize;
    while depth > 0 {
        if pos >= data.len() {
            return Err(Error::invalid_wire_format(
                base + pos,
                format!("unterminated group {}", number),
            ));
        }
        let (tag, _) = decode_varint(&data[pos..]).map_err(|_| Error::varint_decode(base + pos))?;
        let (_, inner) = split_tag(tag)?;
        match inner {
            WireType::StartGroup => depth += 1,
            WireType::EndGroup => depth -= 1,
            _ => {}
        }
        let (_, used) = consume_field(&data[pos..]).map_err(shift)?;
        pos += used;
    }
    Ok(pos)
}

fn parse_map_key(kind: &FieldKind, key: &str, path: &str) -> Result<Value> {
    let bad = || Error::invalid_value(path, format!("'{}' is not a valid {:?} map key", key, kind));
    Ok(match kind {
        FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => {
            Value::Int32(key.parse().map_err(|_| bad())?)
        }
        FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => {
            Value::Int64(key.parse().map_err(|_| bad())?)
        }
        FieldKind::Uint32 | FieldKind::Fixed32 => Value::Uint32(key.parse().map_err(|_| bad())?),
        FieldKind::Uint64 | FieldKind::Fixed64 => Value::Uint64(key.parse().map_err(|_| bad())?),
        FieldKind::Bool => Value::Bool(key == "true"),
        FieldKind::String => Value::String(key.to_string()),
        _ => return Err(bad()),
    })
}

fn map_key_string(key: &Value) -> String {
    match key {
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Uint32(v) => v.to_string(),
        Value::Uint64(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::String(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    match JsonNumber::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("NaN".to_string()),
        None if v > 0.0 => JsonValue::String("Infinity".to_string()),
        None => JsonValue::String("-Infinity".to_string()),
    }
}

fn json_f64(json: &JsonValue) -> Option<f64> {
    match json {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.trim().parse().ok(),
        },
        _ => None,
    }
}

fn json_i64(json: &JsonValue) -> Option<i64> {
    match json {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_u64(json: &JsonValue) -> Option<u64> {
    match json {
        JsonValue::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
