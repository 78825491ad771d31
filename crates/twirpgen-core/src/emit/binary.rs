//! Binary wire codec bodies: `_writeMessage` and `_readMessage`.

use super::{default_expr, write_condition, Printer};
use crate::descriptor::{FieldDescriptor, LangType, MapType};
use crate::error::Result;
use crate::tree::MessageNode;

pub(super) fn write_message(p: &mut Printer<'_>, m: &MessageNode) -> Result<()> {
    let partial = format!("Partial<{}>", m.short_name);
    p.doc_lines(&["@private"])?;
    p.open(&p.signature(
        "_writeMessage: function ",
        &[("msg", partial.as_str()), ("writer", "BinaryWriter")],
        "BinaryWriter",
    ))?;
    for field in &m.fields {
        write_field(p, field)?;
    }
    p.line("return writer;")?;
    p.close("},")
}

fn write_field(p: &mut Printer<'_>, field: &FieldDescriptor) -> Result<()> {
    let access = format!("msg.{}", field.name);

    if let Some(map) = field.map() {
        p.open(&format!("if ({}) {{", write_condition(field, &access, false)))?;
        return write_map(p, field, map, &access);
    }

    p.open(&format!("if ({}) {{", write_condition(field, &access, false)))?;
    let n = field.number;
    let op = field.ops.write;
    let stmt = match (&field.lang_type, field.repeated) {
        (LangType::Message(target), true) => format!(
            "writer.{}({}, {}, {}._writeMessage);",
            op,
            n,
            p.cast(&access, "any"),
            target.local_name
        ),
        (LangType::Message(target), false) => format!(
            "writer.{}({}, {}, {}._writeMessage);",
            op, n, access, target.local_name
        ),
        (LangType::BigInt, true) => format!(
            "writer.{}({}, {}.map((x) => x.toString()));",
            op, n, access
        ),
        (LangType::Enum(target), true) => format!(
            "writer.{}({}, {}.map({}._toInt));",
            op, n, access, target.local_name
        ),
        (lang, _) => format!("writer.{}({}, {});", op, n, scalar_out(lang, &access)),
    };
    p.line(&stmt)?;
    p.close("}")
}

/// Each entry is written as a nested message holding key (1) and value (2)
fn write_map(
    p: &mut Printer<'_>,
    field: &FieldDescriptor,
    map: &MapType,
    access: &str,
) -> Result<()> {
    p.open(&format!(
        "for (const [key, value] of Object.entries({})) {{",
        access
    ))?;
    p.open(&format!("writer.writeMessage({}, {{}}, (_, mapWriter) => {{", field.number))?;

    let key = &map.key;
    let key_expr = match &key.lang_type {
        LangType::Number => "Number(key)".to_string(),
        LangType::Boolean => "key === \"true\"".to_string(),
        _ => "key".to_string(),
    };
    p.line(&format!("mapWriter.{}(1, {});", key.ops.write, key_expr))?;

    let value = &map.value;
    match &value.lang_type {
        LangType::Message(target) => p.line(&format!(
            "mapWriter.{}(2, value, {}._writeMessage);",
            value.ops.write, target.local_name
        ))?,
        lang => p.line(&format!(
            "mapWriter.{}(2, {});",
            value.ops.write,
            scalar_out(lang, "value")
        ))?,
    }

    p.close("});")?;
    p.close("}")?;
    p.close("}")
}

/// Converts an in-memory value to what the runtime writer takes
fn scalar_out(lang: &LangType, expr: &str) -> String {
    match lang {
        LangType::BigInt => format!("{}.toString()", expr),
        LangType::Enum(target) => format!("{}._toInt({})", target.local_name, expr),
        _ => expr.to_string(),
    }
}

/// Converts what the runtime reader returns to the in-memory value
fn scalar_in(lang: &LangType, read: &str) -> String {
    match lang {
        LangType::BigInt => format!("BigInt(reader.{}())", read),
        LangType::Enum(target) => format!("{}._fromInt(reader.{}())", target.local_name, read),
        _ => format!("reader.{}()", read),
    }
}

pub(super) fn read_message(p: &mut Printer<'_>, m: &MessageNode) -> Result<()> {
    let ty = m.short_name.as_str();
    p.doc_lines(&["@private"])?;
    p.open(&p.signature(
        "_readMessage: function ",
        &[("msg", ty), ("reader", "BinaryReader")],
        ty,
    ))?;
    p.open("while (reader.nextField()) {")?;
    p.line("const field = reader.getFieldNumber();")?;
    p.open("switch (field) {")?;
    for field in &m.fields {
        p.open(&format!("case {}: {{", field.number))?;
        read_field(p, field)?;
        // Last oneof member on the wire wins
        for sibling in m.oneof_siblings(field) {
            p.line(&format!("msg.{} = undefined;", sibling.name))?;
        }
        p.line("break;")?;
        p.close("}")?;
    }
    p.open("default: {")?;
    p.line("reader.skipField();")?;
    p.line("break;")?;
    p.close("}")?;
    p.close("}")?;
    p.close("}")?;
    p.line("return msg;")?;
    p.close("},")
}

fn read_field(p: &mut Printer<'_>, field: &FieldDescriptor) -> Result<()> {
    let access = format!("msg.{}", field.name);

    if let Some(map) = field.map() {
        return read_map(p, map, &access);
    }

    match (&field.lang_type, field.repeated) {
        (LangType::Message(target), false) => {
            p.line(&format!(
                "const m = {} ?? {}.initialize();",
                access, target.local_name
            ))?;
            p.line(&format!("reader.readMessage(m, {}._readMessage);", target.local_name))?;
            p.line(&format!("{} = m;", access))
        }
        (LangType::Message(target), true) => {
            p.line(&format!("const m = {}.initialize();", target.local_name))?;
            p.line(&format!("reader.readMessage(m, {}._readMessage);", target.local_name))?;
            p.line(&format!("{}.push(m);", access))
        }
        (lang, true) => match field.ops.packed_read {
            Some(packed) => {
                let packed_expr = match lang {
                    LangType::BigInt => format!("reader.{}().map(BigInt)", packed),
                    LangType::Enum(target) => {
                        format!("reader.{}().map({}._fromInt)", packed, target.local_name)
                    }
                    _ => format!("reader.{}()", packed),
                };
                p.open("if (reader.isDelimited()) {")?;
                p.line(&format!("{}.push(...{});", access, packed_expr))?;
                p.close("} else {")?;
                p.indent();
                p.line(&format!("{}.push({});", access, scalar_in(lang, field.ops.read)))?;
                p.close("}")
            }
            None => p.line(&format!("{}.push({});", access, scalar_in(lang, field.ops.read))),
        },
        (lang, false) => p.line(&format!("{} = {};", access, scalar_in(lang, field.ops.read))),
    }
}

fn read_map(p: &mut Printer<'_>, map: &MapType, access: &str) -> Result<()> {
    let key_default = default_expr(&map.key.default).unwrap_or_else(|| "\"\"".to_string());
    let value_default = match (&map.value.lang_type, default_expr(&map.value.default)) {
        (_, Some(expr)) => expr,
        (LangType::Message(target), None) => format!("{}.initialize()", target.local_name),
        (_, None) => "undefined".to_string(),
    };

    p.line(&format!(
        "const entry = {{ key: {}, value: {} }};",
        key_default, value_default
    ))?;
    p.open("reader.readMessage(undefined, () => {")?;
    p.open("while (reader.nextField()) {")?;
    p.open("switch (reader.getFieldNumber()) {")?;

    p.open("case 1: {")?;
    p.line(&format!(
        "entry.key = {};",
        scalar_in(&map.key.lang_type, map.key.ops.read)
    ))?;
    p.line("break;")?;
    p.close("}")?;

    p.open("case 2: {")?;
    match &map.value.lang_type {
        LangType::Message(target) => p.line(&format!(
            "reader.readMessage(entry.value, {}._readMessage);",
            target.local_name
        ))?,
        lang => p.line(&format!(
            "entry.value = {};",
            scalar_in(lang, map.value.ops.read)
        ))?,
    }
    p.line("break;")?;
    p.close("}")?;

    p.open("default: {")?;
    p.line("reader.skipField();")?;
    p.line("break;")?;
    p.close("}")?;

    p.close("}")?;
    p.close("}")?;
    p.close("});")?;
    p.line(&format!("{}[String(entry.key)] = entry.value;", access))
}
