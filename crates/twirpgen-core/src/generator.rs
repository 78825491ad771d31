//! Plugin driver: one `CodeGeneratorRequest` in, one response out.

use crate::config::GeneratorConfig;
use crate::emit::emit_file;
use crate::error::{Error, Result};
use crate::resolve::{generated_path, IdentifierTable, Resolver};
use crate::tree::{FileTree, TreeBuilder};
use prost_types::compiler::code_generator_response::{Feature, File};
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::FileDescriptorProto;
use tracing::{debug, info};

/// One generated output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Output path, e.g. `shop/hat.pb.ts`
    pub name: String,
    /// Generated source text
    pub content: String,
}

/// Builds the type trees of `targets` against the full descriptor set.
///
/// The identifier table covers every file in `files`, so references into
/// dependencies resolve even though only `targets` get trees.
pub fn build_trees(
    files: &[FileDescriptorProto],
    targets: &[String],
    config: &GeneratorConfig,
) -> Result<Vec<FileTree>> {
    let table = IdentifierTable::build(files)?;
    let resolver = Resolver::new(&table, files)?;
    let builder = TreeBuilder::new(&resolver, config.language);
    debug!(
        "Identifier table: {} types across {} files",
        table.len(),
        files.len()
    );

    targets
        .iter()
        .map(|target| {
            let file = files
                .iter()
                .find(|f| f.name.as_deref() == Some(target.as_str()))
                .ok_or_else(|| Error::UnknownFileToGenerate {
                    file: target.clone(),
                })?;
            builder.build(file)
        })
        .collect()
}

/// Generates source for every file in `targets`.
///
/// Any error aborts the whole run; no partial file set is returned.
pub fn generate_files(
    files: &[FileDescriptorProto],
    targets: &[String],
    config: &GeneratorConfig,
) -> Result<Vec<GeneratedFile>> {
    let trees = build_trees(files, targets, config)?;
    trees
        .iter()
        .map(|tree| {
            let content = emit_file(tree, config)?;
            let name = generated_path(&tree.name, config.language);
            info!("Generated {} ({} bytes)", name, content.len());
            Ok(GeneratedFile { name, content })
        })
        .collect()
}

/// Runs a protoc plugin request.
///
/// Options come from the request's parameter string. Fatal errors are
/// returned as `Err`; the caller decides how to report them (see
/// [`error_response`]).
pub fn generate(request: &CodeGeneratorRequest) -> Result<CodeGeneratorResponse> {
    let config = GeneratorConfig::from_parameter(request.parameter.as_deref());
    generate_with_config(request, &config)
}

/// Runs a protoc plugin request with an explicit configuration.
pub fn generate_with_config(
    request: &CodeGeneratorRequest,
    config: &GeneratorConfig,
) -> Result<CodeGeneratorResponse> {
    debug!(
        "Request: {} descriptors, {} to generate, config {:?}",
        request.proto_file.len(),
        request.file_to_generate.len(),
        config
    );

    let files = generate_files(&request.proto_file, &request.file_to_generate, config)?;

    Ok(CodeGeneratorResponse {
        error: None,
        supported_features: Some(Feature::Proto3Optional as u64),
        file: files
            .into_iter()
            .map(|f| File {
                name: Some(f.name),
                content: Some(f.content),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    })
}

/// The response protoc expects for a failed run: an error message and no files
pub fn error_response(error: &Error) -> CodeGeneratorResponse {
    CodeGeneratorResponse {
        error: Some(error.to_string()),
        supported_features: Some(Feature::Proto3Optional as u64),
        file: Vec::new(),
        ..Default::default()
    }
}
