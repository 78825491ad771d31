//! Codec objects: one `const` per message or enum, nested like the types.

use super::{binary, default_expr, json, Printer};
use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::tree::{EnumNode, MessageNode, ProtoTypeNode};
use std::collections::BTreeSet;

pub(super) fn write_codec(
    p: &mut Printer<'_>,
    node: &ProtoTypeNode,
    config: &GeneratorConfig,
    top_level: bool,
) -> Result<()> {
    match node {
        ProtoTypeNode::Enum(e) => write_enum_codec(p, e, top_level),
        ProtoTypeNode::Message(m) if !m.is_map => write_message_codec(p, m, config, top_level),
        ProtoTypeNode::Message(_) => Ok(()),
    }
}

fn open_object(p: &mut Printer<'_>, name: &str, top_level: bool) -> Result<()> {
    if top_level {
        p.open(&format!("export const {} = {{", name))
    } else {
        p.open(&format!("{}: {{", name))
    }
}

fn close_object(p: &mut Printer<'_>, top_level: bool, as_const: bool) -> Result<()> {
    let suffix = if as_const && p.typed() { " as const" } else { "" };
    let terminator = if top_level { ";" } else { "," };
    p.close(&format!("}}{}{}", suffix, terminator))?;
    if top_level {
        p.blank()?;
    }
    Ok(())
}

fn write_message_codec(
    p: &mut Printer<'_>,
    m: &MessageNode,
    config: &GeneratorConfig,
    top_level: bool,
) -> Result<()> {
    let ty = m.short_name.as_str();
    let partial = format!("Partial<{}>", ty);

    p.doc(m.comment.as_deref())?;
    open_object(p, &m.name, top_level)?;

    p.doc_lines(&[format!("Serializes {} to protobuf.", ty).as_str()])?;
    p.open(&p.signature("encode: function ", &[("msg", partial.as_str())], "Uint8Array"))?;
    p.line(&format!(
        "return {}._writeMessage(msg, new BinaryWriter()).getResultBuffer();",
        ty
    ))?;
    p.close("},")?;
    p.blank()?;

    p.doc_lines(&[format!("Deserializes {} from protobuf.", ty).as_str()])?;
    p.open(&p.signature("decode: function ", &[("bytes", "ByteSource")], ty))?;
    p.line(&format!(
        "return {}._readMessage({}.initialize(), new BinaryReader(bytes));",
        ty, ty
    ))?;
    p.close("},")?;
    p.blank()?;

    p.doc_lines(&[format!("Serializes {} to JSON.", ty).as_str()])?;
    p.open(&p.signature("encodeJSON: function ", &[("msg", partial.as_str())], "string"))?;
    p.line(&format!("return JSON.stringify({}._writeMessageJSON(msg));", ty))?;
    p.close("},")?;
    p.blank()?;

    p.doc_lines(&[format!("Deserializes {} from JSON.", ty).as_str()])?;
    p.open(&p.signature("decodeJSON: function ", &[("json", "string")], ty))?;
    p.line(&format!(
        "return {}._readMessageJSON({}.initialize(), JSON.parse(json));",
        ty, ty
    ))?;
    p.close("},")?;
    p.blank()?;

    let doc = format!("Initializes {} with all fields set to their default value.", ty);
    p.doc_lines(&[doc.as_str()])?;
    p.open(&p.signature("initialize: function ", &[], ty))?;
    let defaults: Vec<(String, String)> = m
        .fields
        .iter()
        .filter_map(|f| default_expr(&f.default).map(|d| (f.name.clone(), d)))
        .collect();
    if defaults.is_empty() {
        p.line("return {};")?;
    } else {
        p.open("return {")?;
        for (name, value) in &defaults {
            p.line(&format!("{}: {},", name, value))?;
        }
        p.close("};")?;
    }
    p.close("},")?;
    p.blank()?;

    binary::write_message(p, m)?;
    p.blank()?;
    json::write_message(p, m, config)?;
    p.blank()?;
    binary::read_message(p, m)?;
    p.blank()?;
    json::read_message(p, m)?;

    for child in m.emitted_children() {
        p.blank()?;
        write_codec(p, child, config, false)?;
    }

    close_object(p, top_level, false)
}

fn write_enum_codec(p: &mut Printer<'_>, e: &EnumNode, top_level: bool) -> Result<()> {
    let ty = e.short_name.as_str();

    p.doc(e.comment.as_deref())?;
    open_object(p, &e.name, top_level)?;
    for value in &e.values {
        p.doc(value.comment.as_deref())?;
        p.line(&format!("{}: \"{}\",", value.name, value.name))?;
    }

    p.doc_lines(&["@private"])?;
    p.open(&p.signature("_fromInt: function ", &[("i", "number")], ty))?;
    p.open("switch (i) {")?;
    let mut seen = BTreeSet::new();
    for value in &e.values {
        // Aliases share a number; the first declared name wins
        if !seen.insert(value.number) {
            continue;
        }
        p.open(&format!("case {}: {{", value.number))?;
        p.line(&format!("return \"{}\";", value.name))?;
        p.close("}")?;
    }
    p.line("// unknown values are preserved as numbers. this occurs when new enum values are introduced and the generated code is out of date.")?;
    p.open("default: {")?;
    p.line(&format!("return {};", p.cast("i", &format!("unknown as {}", ty))))?;
    p.close("}")?;
    p.close("}")?;
    p.close("},")?;

    p.doc_lines(&["@private"])?;
    p.open(&p.signature("_toInt: function ", &[("i", ty)], "number"))?;
    p.open("switch (i) {")?;
    for value in &e.values {
        p.open(&format!("case \"{}\": {{", value.name))?;
        p.line(&format!("return {};", value.number))?;
        p.close("}")?;
    }
    p.line("// unknown values are preserved as numbers. this occurs when new enum values are introduced and the generated code is out of date.")?;
    p.open("default: {")?;
    p.line(&format!("return {};", p.cast("i", "unknown as number")))?;
    p.close("}")?;
    p.close("}")?;
    p.close("},")?;

    close_object(p, top_level, true)
}
