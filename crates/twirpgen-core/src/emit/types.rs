//! TypeScript type declarations.

use super::{field_type, Printer};
use crate::error::Result;
use crate::tree::{EnumNode, MessageNode, ProtoTypeNode};

pub(super) fn write_types(
    p: &mut Printer<'_>,
    nodes: &[ProtoTypeNode],
    top_level: bool,
) -> Result<()> {
    for node in nodes {
        match node {
            ProtoTypeNode::Enum(e) => write_enum(p, e)?,
            ProtoTypeNode::Message(m) if !m.is_map => write_message(p, m, top_level)?,
            ProtoTypeNode::Message(_) => {}
        }
    }
    Ok(())
}

fn write_enum(p: &mut Printer<'_>, e: &EnumNode) -> Result<()> {
    p.doc(e.comment.as_deref())?;
    let union = if e.values.is_empty() {
        "never".to_string()
    } else {
        e.values
            .iter()
            .map(|v| format!("\"{}\"", v.name))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    p.line(&format!("export type {} = {};", e.name, union))?;
    p.blank()
}

fn write_message(p: &mut Printer<'_>, m: &MessageNode, top_level: bool) -> Result<()> {
    p.doc(m.comment.as_deref())?;
    if m.fields.is_empty() {
        p.line(&format!("export interface {} {{}}", m.name))?;
    } else {
        p.open(&format!("export interface {} {{", m.name))?;
        for field in &m.fields {
            p.doc(field.comment.as_deref())?;
            if field.optional || field.is_message() {
                p.line(&format!("{}?: {} | undefined;", field.name, field_type(field)))?;
            } else {
                p.line(&format!("{}: {};", field.name, field_type(field)))?;
            }
        }
        p.close("}")?;
    }
    p.blank()?;

    if m.emitted_children().next().is_some() {
        let keyword = if top_level {
            "export declare namespace"
        } else {
            "export namespace"
        };
        p.open(&format!("{} {} {{", keyword, m.name))?;
        write_types(p, &m.children, false)?;
        p.close("}")?;
        p.blank()?;
    }
    Ok(())
}
