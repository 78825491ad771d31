//! RPC clients and server registration.

use super::{param_name, Printer};
use crate::error::Result;
use crate::tree::{FileTree, ServiceDescriptor};

pub(super) fn write_service(
    p: &mut Printer<'_>,
    tree: &FileTree,
    service: &ServiceDescriptor,
) -> Result<()> {
    p.banner(&format!("{} Protobuf Client", service.name))?;
    write_clients(p, tree, service, false)?;

    p.banner(&format!("{} JSON Client", service.name))?;
    write_clients(p, tree, service, true)?;

    p.banner(&service.name)?;
    if p.typed() {
        write_interface(p, service)?;
    }
    write_registration(p, tree, service)
}

fn write_clients(
    p: &mut Printer<'_>,
    tree: &FileTree,
    service: &ServiceDescriptor,
    json: bool,
) -> Result<()> {
    let (request, encode, decode, suffix) = if json {
        ("JSONrequest", "encodeJSON", "decodeJSON", "JSON")
    } else {
        ("PBrequest", "encode", "decode", "")
    };

    for method in &service.methods {
        let input = method.input.local_name.as_str();
        let output = method.output.local_name.as_str();
        let param = param_name(&method.input.short_name);
        let ret = format!("Promise<{}>", output);

        p.doc(method.comment.as_deref())?;
        p.open(&p.signature(
            &format!("export async function {}{}", method.name, suffix),
            &[(param.as_str(), input), ("config?", "ClientConfiguration")],
            &ret,
        ))?;
        p.open(&format!("const response = await {}(", request))?;
        p.line(&format!("\"{}\",", tree.method_path(service, method)))?;
        p.line(&format!("{}.{}({}),", input, encode, param))?;
        p.line("config,")?;
        p.close(");")?;
        p.line(&format!("return {}.{}(response);", output, decode))?;
        p.close("}")?;
        p.blank()?;
    }
    Ok(())
}

fn write_interface(p: &mut Printer<'_>, service: &ServiceDescriptor) -> Result<()> {
    p.doc(service.comment.as_deref())?;
    p.open(&format!("export interface {}<Context = unknown> {{", service.name))?;
    for method in &service.methods {
        let input = method.input.local_name.as_str();
        let output = method.output.local_name.as_str();
        p.doc(method.comment.as_deref())?;
        p.line(&format!(
            "{}: ({}: {}, context: Context) => Promise<{}> | {};",
            method.name,
            param_name(&method.input.short_name),
            input,
            output,
            output
        ))?;
    }
    p.close("}")?;
    p.blank()
}

fn write_registration(
    p: &mut Printer<'_>,
    tree: &FileTree,
    service: &ServiceDescriptor,
) -> Result<()> {
    let head = if p.typed() {
        format!("export function create{}<Context>", service.name)
    } else {
        format!("export function create{}", service.name)
    };
    let service_type = format!("{}<Context>", service.name);
    p.open(&p.signature(&head, &[("service", service_type.as_str())], ""))?;
    p.open("return {")?;
    p.line(&format!("name: \"{}\",", tree.service_path(service)))?;
    p.open("methods: {")?;
    for method in &service.methods {
        let input = method.input.local_name.as_str();
        let output = method.output.local_name.as_str();
        p.open(&format!("{}: {{", method.name))?;
        p.line(&format!("name: \"{}\",", method.name))?;
        p.line(&format!("handler: service.{},", method.name))?;
        p.line(&format!(
            "input: {{ protobuf: {{ encode: {i}.encode, decode: {i}.decode }}, json: {{ encode: {i}.encodeJSON, decode: {i}.decodeJSON }} }},",
            i = input
        ))?;
        p.line(&format!(
            "output: {{ protobuf: {{ encode: {o}.encode, decode: {o}.decode }}, json: {{ encode: {o}.encodeJSON, decode: {o}.decodeJSON }} }},",
            o = output
        ))?;
        p.close("},")?;
    }
    p.close("},")?;
    if p.typed() {
        p.close("} as const;")?;
    } else {
        p.close("};")?;
    }
    p.close("}")?;
    p.blank()
}
