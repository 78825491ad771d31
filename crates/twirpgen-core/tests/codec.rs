//! Binary and JSON codec behavior, checked through the dynamic codec.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MapKey, Value as ReflectValue};
use prost_types::field_descriptor_proto::Type;
use prost_types::{FileDescriptorProto, FileDescriptorSet, OneofDescriptorProto};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use twirpgen_core::{Codec, EnumValue, Error, FileTree, GeneratorConfig, MessageValue, Value};

fn shop_trees(config: &GeneratorConfig) -> Vec<FileTree> {
    trees(&[size_file(), hat_file()], config)
}

fn size(inches: i32) -> MessageValue {
    MessageValue::new("shop.Size").with("inches", Value::Int32(inches))
}

#[test]
fn test_size_round_trip() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let msg = size(12);
    let bytes = codec.encode(&msg).unwrap();
    assert_eq!(bytes, vec![8, 12]);
    assert_eq!(codec.decode("shop.Size", &bytes).unwrap(), msg);

    let text = codec.encode_json(&msg).unwrap();
    assert_eq!(text, r#"{"inches":12}"#);
    assert_eq!(codec.decode_json("shop.Size", &text).unwrap(), msg);
}

#[test]
fn test_defaults_encode_to_nothing() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let empty = codec.initialize("shop.Hat").unwrap();
    assert_eq!(empty.get("name"), Some(&Value::String(String::new())));
    assert_eq!(empty.get("color"), Some(&Value::Enum(EnumValue::Named("RED".to_string()))));
    assert_eq!(empty.get("weight"), None);
    assert_eq!(empty.get("size"), None);

    assert!(codec.encode(&empty).unwrap().is_empty());
    assert_eq!(codec.encode_json(&empty).unwrap(), "{}");
    assert_eq!(codec.decode("shop.Hat", &[]).unwrap(), empty);
    assert_eq!(codec.decode_json("shop.Hat", "{}").unwrap(), empty);
}

#[test]
fn test_repeated_scalars_are_packed() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let sizes = Value::List(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
    let msg = MessageValue::new("shop.Hat").with("sizes", sizes.clone());

    let bytes = codec.encode(&msg).unwrap();
    assert_eq!(bytes, vec![0x12, 3, 1, 2, 3]);
    assert_eq!(codec.decode("shop.Hat", &bytes).unwrap().get("sizes"), Some(&sizes));

    let text = codec.encode_json(&msg).unwrap();
    assert_eq!(text, r#"{"sizes":[1,2,3]}"#);
    assert_eq!(codec.decode_json("shop.Hat", &text).unwrap().get("sizes"), Some(&sizes));
}

#[test]
fn test_unpacked_repeated_is_accepted() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let decoded = codec.decode("shop.Hat", &[0x10, 1, 0x10, 2]).unwrap();
    assert_eq!(
        decoded.get("sizes"),
        Some(&Value::List(vec![Value::Int32(1), Value::Int32(2)]))
    );
}

#[test]
fn test_unknown_fields_are_skipped() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    // field 99 (varint) and field 100 (length-delimited) around a known field
    let bytes = [0x98, 0x06, 1, 8, 12, 0xA2, 0x06, 2, b'h', b'i'];
    assert_eq!(codec.decode("shop.Size", &bytes).unwrap(), size(12));

    let text = r#"{"inches": 12, "brand": "acme"}"#;
    assert_eq!(codec.decode_json("shop.Size", text).unwrap(), size(12));
}

#[test]
fn test_wire_type_mismatch_is_an_error() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let err = codec.decode("shop.Size", &[0x0A, 0]).unwrap_err();
    assert!(matches!(err, Error::InvalidWireFormat { offset: 1, .. }));

    let err = codec.decode("shop.Size", &[8]).unwrap_err();
    assert!(matches!(err, Error::VarintDecode { .. }));
}

#[test]
fn test_unknown_enum_numbers_pass_through() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let decoded = codec.decode("shop.Hat", &[0x20, 7]).unwrap();
    assert_eq!(decoded.get("color"), Some(&Value::Enum(EnumValue::Unknown(7))));
    assert_eq!(codec.encode(&decoded).unwrap(), vec![0x20, 7]);
    assert_eq!(codec.encode_json(&decoded).unwrap(), r#"{"color":7}"#);

    let from_json = codec.decode_json("shop.Hat", r#"{"color":1}"#).unwrap();
    assert_eq!(from_json.get("color"), Some(&Value::Enum(EnumValue::Named("GREEN".to_string()))));

    let err = codec.decode_json("shop.Hat", r#"{"color":"PURPLE"}"#).unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));
}

#[test]
fn test_map_round_trip() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let stock = Value::Map(BTreeMap::from([
        ("a".to_string(), Value::Int32(1)),
        ("b".to_string(), Value::Int32(0)),
    ]));
    let msg = MessageValue::new("shop.Hat").with("stock", stock.clone());

    let bytes = codec.encode(&msg).unwrap();
    // Entries carry both key and value, zero values included
    assert_eq!(
        bytes,
        vec![0x1A, 5, 0x0A, 1, b'a', 0x10, 1, 0x1A, 5, 0x0A, 1, b'b', 0x10, 0]
    );
    assert_eq!(codec.decode("shop.Hat", &bytes).unwrap().get("stock"), Some(&stock));

    assert_eq!(codec.to_json(&msg).unwrap(), json!({"stock": {"a": 1, "b": 0}}));
    assert_eq!(
        codec.decode_json("shop.Hat", r#"{"stock":{"a":1,"b":0}}"#).unwrap().get("stock"),
        Some(&stock)
    );
}

#[test]
fn test_singular_messages_merge() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    // Two occurrences of field 5; the last scalar inside wins
    let bytes = [0x2A, 2, 8, 3, 0x2A, 2, 8, 9];
    let decoded = codec.decode("shop.Hat", &bytes).unwrap();
    assert_eq!(decoded.get("size"), Some(&Value::Message(size(9))));

    let present_but_empty = codec.decode("shop.Hat", &[0x2A, 0]).unwrap();
    assert_eq!(present_but_empty.get("size"), Some(&Value::Message(size(0))));
    assert_eq!(codec.encode_json(&present_but_empty).unwrap(), r#"{"size":{}}"#);
}

#[test]
fn test_json_scalar_mapping() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let msg = MessageValue::new("shop.Hat")
        .with("serial", Value::Int64(9_007_199_254_740_993))
        .with("tag", Value::Bytes(vec![0, 1, 2]))
        .with("weight", Value::Int32(0))
        .with("ratio", Value::Double(f64::INFINITY));

    assert_eq!(
        codec.to_json(&msg).unwrap(),
        json!({
            "serial": "9007199254740993",
            "tag": "AAEC",
            "weight": 0,
            "ratio": "Infinity"
        })
    );

    let decoded = codec
        .decode_json(
            "shop.Hat",
            r#"{"serial":"9007199254740993","tag":"AAEC","weight":0,"ratio":"NaN"}"#,
        )
        .unwrap();
    assert_eq!(decoded.get("serial"), Some(&Value::Int64(9_007_199_254_740_993)));
    assert_eq!(decoded.get("tag"), Some(&Value::Bytes(vec![0, 1, 2])));
    assert_eq!(decoded.get("weight"), Some(&Value::Int32(0)));
    assert!(matches!(decoded.get("ratio"), Some(Value::Double(v)) if v.is_nan()));

    // Explicit presence: a set zero is still written
    let zero_weight = MessageValue::new("shop.Hat").with("weight", Value::Int32(0));
    assert_eq!(codec.encode(&zero_weight).unwrap(), vec![0x40, 0]);

    // null reads as absent
    let nulls = codec.decode_json("shop.Hat", r#"{"name":null,"size":null}"#).unwrap();
    assert_eq!(nulls, codec.initialize("shop.Hat").unwrap());
}

#[test]
fn test_emit_fields_with_default_values() {
    let config = GeneratorConfig::new().emit_default_values(true);
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let json = codec.to_json(&codec.initialize("shop.Hat").unwrap()).unwrap();
    let object = json.as_object().unwrap();
    for key in [
        "name", "sizes", "stock", "color", "serial", "tag", "labels", "ratio", "brimWidth",
    ] {
        assert!(object.contains_key(key), "missing {} in {}", key, json);
    }
    // Unset explicit-presence fields stay out
    assert!(!object.contains_key("weight"));
    assert!(!object.contains_key("size"));
    assert_eq!(object["color"], json!("RED"));
    assert_eq!(object["serial"], json!("0"));
    assert_eq!(object["sizes"], json!([]));
}

#[test]
fn test_use_proto_field_name() {
    let config = GeneratorConfig::new().use_proto_field_name(true);
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);

    let msg = MessageValue::new("shop.Hat").with("brimWidth", Value::Uint32(3));
    assert_eq!(codec.encode_json(&msg).unwrap(), r#"{"brim_width":3}"#);

    // Both spellings decode
    for text in [r#"{"brim_width":3}"#, r#"{"brimWidth":3}"#] {
        assert_eq!(
            codec.decode_json("shop.Hat", text).unwrap().get("brimWidth"),
            Some(&Value::Uint32(3))
        );
    }
}

fn reflect_pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
        file: vec![size_file(), hat_file()],
    })
    .unwrap()
}

fn reflect_field(msg: &DynamicMessage, name: &str) -> ReflectValue {
    msg.get_field_by_name(name).unwrap().into_owned()
}

fn sample_hat(codec: &Codec<'_>) -> MessageValue {
    let mut hat = codec.initialize("shop.Hat").unwrap();
    hat.set("name", Value::String("fedora".to_string()));
    hat.set("sizes", Value::List(vec![Value::Int32(1), Value::Int32(-2), Value::Int32(300)]));
    hat.set("stock", Value::Map(BTreeMap::from([("a".to_string(), Value::Int32(4))])));
    hat.set("color", Value::Enum(EnumValue::Named("GREEN".to_string())));
    hat.set("size", Value::Message(size(7)));
    hat.set("serial", Value::Int64(-5));
    hat.set("tag", Value::Bytes(vec![0, 1]));
    hat.set("weight", Value::Int32(0));
    hat.set("labels", Value::List(vec![Value::String("x".to_string())]));
    hat.set("ratio", Value::Double(0.5));
    hat.set("brimWidth", Value::Uint32(3));
    hat
}

#[test]
fn test_decodes_what_prost_reflect_encodes() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);
    let pool = reflect_pool();

    let mut inner = DynamicMessage::new(pool.get_message_by_name("shop.Size").unwrap());
    inner.set_field_by_name("inches", ReflectValue::I32(7));

    let mut msg = DynamicMessage::new(pool.get_message_by_name("shop.Hat").unwrap());
    msg.set_field_by_name("name", ReflectValue::String("fedora".to_string()));
    msg.set_field_by_name(
        "sizes",
        ReflectValue::List(vec![
            ReflectValue::I32(1),
            ReflectValue::I32(-2),
            ReflectValue::I32(300),
        ]),
    );
    msg.set_field_by_name(
        "stock",
        ReflectValue::Map(HashMap::from([(MapKey::String("a".to_string()), ReflectValue::I32(4))])),
    );
    msg.set_field_by_name("color", ReflectValue::EnumNumber(1));
    msg.set_field_by_name("size", ReflectValue::Message(inner));
    msg.set_field_by_name("serial", ReflectValue::I64(-5));
    msg.set_field_by_name("tag", ReflectValue::Bytes(prost::bytes::Bytes::from_static(&[0, 1])));
    msg.set_field_by_name("weight", ReflectValue::I32(0));
    msg.set_field_by_name(
        "labels",
        ReflectValue::List(vec![ReflectValue::String("x".to_string())]),
    );
    msg.set_field_by_name("ratio", ReflectValue::F64(0.5));
    msg.set_field_by_name("brim_width", ReflectValue::U32(3));

    let decoded = codec.decode("shop.Hat", &msg.encode_to_vec()).unwrap();
    assert_eq!(decoded, sample_hat(&codec));
}

#[test]
fn test_prost_reflect_decodes_what_we_encode() {
    let config = GeneratorConfig::new();
    let trees = shop_trees(&config);
    let codec = Codec::new(&trees, &config);
    let pool = reflect_pool();

    let bytes = codec.encode(&sample_hat(&codec)).unwrap();
    let decoded =
        DynamicMessage::decode(pool.get_message_by_name("shop.Hat").unwrap(), bytes.as_slice())
            .unwrap();

    assert_eq!(reflect_field(&decoded, "name"), ReflectValue::String("fedora".to_string()));
    assert_eq!(
        reflect_field(&decoded, "sizes"),
        ReflectValue::List(vec![
            ReflectValue::I32(1),
            ReflectValue::I32(-2),
            ReflectValue::I32(300),
        ])
    );
    assert_eq!(
        reflect_field(&decoded, "stock"),
        ReflectValue::Map(HashMap::from([(MapKey::String("a".to_string()), ReflectValue::I32(4))]))
    );
    assert_eq!(reflect_field(&decoded, "color"), ReflectValue::EnumNumber(1));
    assert_eq!(reflect_field(&decoded, "serial"), ReflectValue::I64(-5));
    assert_eq!(reflect_field(&decoded, "weight"), ReflectValue::I32(0));
    assert!(decoded.has_field_by_name("weight"));
    assert_eq!(reflect_field(&decoded, "ratio"), ReflectValue::F64(0.5));
    assert_eq!(reflect_field(&decoded, "brim_width"), ReflectValue::U32(3));

    let ReflectValue::Message(inner) = reflect_field(&decoded, "size") else {
        panic!("size is not a message");
    };
    assert_eq!(reflect_field(&inner, "inches"), ReflectValue::I32(7));
}

#[test]
fn test_custom_json_name_is_read_first() {
    let mut field = scalar("hat_size", 1, Type::Int32);
    field.json_name = Some("HAT".to_string());
    let file = FileDescriptorProto {
        message_type: vec![message("Fit", vec![field])],
        ..proto3("fit.proto", "shop")
    };
    let config = GeneratorConfig::new();
    let trees = trees(&[file], &config);
    let codec = Codec::new(&trees, &config);

    let read = |text: &str| codec.decode_json("shop.Fit", text).unwrap().get("hatSize").cloned();
    assert_eq!(read(r#"{"hatSize":1,"HAT":2,"hat_size":3}"#), Some(Value::Int32(2)));
    assert_eq!(read(r#"{"hat_size":3,"hatSize":1}"#), Some(Value::Int32(1)));
    assert_eq!(read(r#"{"hat_size":3}"#), Some(Value::Int32(3)));

    let msg = MessageValue::new("shop.Fit").with("hatSize", Value::Int32(2));
    assert_eq!(codec.encode_json(&msg).unwrap(), r#"{"HAT":2}"#);
}

#[test]
fn test_last_oneof_member_wins() {
    let mut pick = message(
        "Pick",
        vec![scalar("label", 1, Type::String), scalar("count", 2, Type::Int32)],
    );
    pick.oneof_decl.push(OneofDescriptorProto {
        name: Some("choice".to_string()),
        ..Default::default()
    });
    pick.field[0].oneof_index = Some(0);
    pick.field[1].oneof_index = Some(0);
    let file = FileDescriptorProto {
        message_type: vec![pick],
        ..proto3("pick.proto", "shop")
    };
    let config = GeneratorConfig::new();
    let trees = trees(&[file], &config);
    let codec = Codec::new(&trees, &config);

    let count_last = codec.decode("shop.Pick", &[0x0A, 1, b'x', 0x10, 5]).unwrap();
    assert_eq!(count_last.get("label"), None);
    assert_eq!(count_last.get("count"), Some(&Value::Int32(5)));
    assert_eq!(codec.encode(&count_last).unwrap(), vec![0x10, 5]);

    let label_last = codec.decode("shop.Pick", &[0x10, 5, 0x0A, 1, b'x']).unwrap();
    assert_eq!(label_last.get("label"), Some(&Value::String("x".to_string())));
    assert_eq!(label_last.get("count"), None);
}
