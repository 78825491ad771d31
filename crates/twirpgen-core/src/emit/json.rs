//! JSON codec bodies: `_writeMessageJSON` and `_readMessageJSON`.
//!
//! Output follows the proto3 JSON mapping: 64-bit integers as decimal
//! strings, bytes as standard base64, enums by name, non-finite floats as
//! `"NaN"` / `"Infinity"` / `"-Infinity"`.

use super::{is_float, write_condition, Printer};
use crate::config::GeneratorConfig;
use crate::descriptor::{FieldDescriptor, LangType};
use crate::error::Result;
use crate::tree::MessageNode;

pub(super) fn write_message(
    p: &mut Printer<'_>,
    m: &MessageNode,
    config: &GeneratorConfig,
) -> Result<()> {
    let partial = format!("Partial<{}>", m.short_name);
    p.doc_lines(&["@private"])?;
    p.open(&p.signature(
        "_writeMessageJSON: function ",
        &[("msg", partial.as_str())],
        "Record<string, unknown>",
    ))?;
    if p.typed() {
        p.line("const json: Record<string, unknown> = {};")?;
    } else {
        p.line("const json = {};")?;
    }

    for field in &m.fields {
        let access = format!("msg.{}", field.name);
        let key = field.output_json_name(config.use_proto_field_name);
        p.open(&format!(
            "if ({}) {{",
            write_condition(field, &access, config.emit_default_values)
        ))?;
        p.line(&format!("json[\"{}\"] = {};", key, field_to_json(p, field, &access)))?;
        p.close("}")?;
    }

    p.line("return json;")?;
    p.close("},")
}

fn field_to_json(p: &Printer<'_>, field: &FieldDescriptor, access: &str) -> String {
    if let Some(map) = field.map() {
        let value = value_to_json(&map.value, "value");
        return if value == "value" {
            format!("{{ ...{} }}", access)
        } else {
            format!(
                "Object.fromEntries(Object.entries({}).map(([key, value]) => [key, {}]))",
                access, value
            )
        };
    }
    if field.repeated {
        let element = value_to_json(field, "x");
        return if element == "x" {
            access.to_string()
        } else {
            format!("{}.map({} => {})", access, p.any_param("x"), element)
        };
    }
    value_to_json(field, access)
}

fn value_to_json(field: &FieldDescriptor, expr: &str) -> String {
    match &field.lang_type {
        LangType::Number if is_float(field) => {
            format!("(Number.isFinite({e}) ? {e} : String({e}))", e = expr)
        }
        LangType::BigInt => format!("{}.toString()", expr),
        LangType::Bytes => format!("encodeBase64Bytes({})", expr),
        LangType::Message(target) => format!("{}._writeMessageJSON({})", target.local_name, expr),
        _ => expr.to_string(),
    }
}

pub(super) fn read_message(p: &mut Printer<'_>, m: &MessageNode) -> Result<()> {
    let ty = m.short_name.as_str();
    p.doc_lines(&["@private"])?;
    p.open(&p.signature(
        "_readMessageJSON: function ",
        &[("msg", ty), ("json", "any")],
        ty,
    ))?;

    for field in &m.fields {
        let local = format!("_{}_", field.name);
        let lookup = field
            .json_read_names()
            .iter()
            .map(|name| format!("json[\"{}\"]", name))
            .collect::<Vec<_>>()
            .join(" ?? ");
        p.line(&format!("const {} = {};", local, lookup))?;
        p.open(&format!("if ({} != undefined) {{", local))?;
        read_field(p, field, &local)?;
        p.close("}")?;
    }

    p.line("return msg;")?;
    p.close("},")
}

fn read_field(p: &mut Printer<'_>, field: &FieldDescriptor, local: &str) -> Result<()> {
    let access = format!("msg.{}", field.name);

    if let Some(map) = field.map() {
        let value = value_from_json(&map.value, "value");
        let expr = if value == "value" {
            format!("{{ ...{} }}", local)
        } else {
            format!(
                "Object.fromEntries(Object.entries({}).map(([key, value]) => [key, {}]))",
                local, value
            )
        };
        return p.line(&format!("{} = {};", access, expr));
    }

    if field.repeated {
        let element = value_from_json(field, "x");
        let expr = if element == "x" {
            format!("[...{}]", local)
        } else {
            format!("{}.map({} => {})", local, p.any_param("x"), element)
        };
        return p.line(&format!("{} = {};", access, expr));
    }

    match &field.lang_type {
        LangType::Message(target) => p.line(&format!(
            "{} = {}._readMessageJSON({} ?? {}.initialize(), {});",
            access, target.local_name, access, target.local_name, local
        )),
        _ => p.line(&format!("{} = {};", access, value_from_json(field, local))),
    }
}

fn value_from_json(field: &FieldDescriptor, expr: &str) -> String {
    match &field.lang_type {
        LangType::Number => format!("Number({})", expr),
        LangType::BigInt => format!("BigInt({})", expr),
        LangType::Bytes => format!("decodeBase64Bytes({})", expr),
        LangType::Enum(target) => format!(
            "(typeof {e} === \"number\" ? {t}._fromInt({e}) : {e})",
            e = expr,
            t = target.local_name
        ),
        LangType::Message(target) => format!(
            "{t}._readMessageJSON({t}.initialize(), {e})",
            t = target.local_name,
            e = expr
        ),
        LangType::Boolean | LangType::String | LangType::Map(_) => expr.to_string(),
    }
}
