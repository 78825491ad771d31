//! protoc-gen-twirpgen - Generate TypeScript/JavaScript Twirp code from Protocol Buffers
//!
//! protoc runs this plugin with a serialized `CodeGeneratorRequest` on stdin
//! and reads a `CodeGeneratorResponse` from stdout:
//!
//! ```text
//! protoc --plugin=protoc-gen-twirpgen --twirpgen_out=language=typescript:out hat.proto
//! ```
//!
//! stdout carries the protocol, so all logging goes to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use prost::Message;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;
use twirpgen_core::{error_response, generate};

/// protoc plugin generating Twirp clients, servers and protobuf/JSON codecs
#[derive(Parser, Debug)]
#[command(name = "protoc-gen-twirpgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Options appended to the parameter protoc passes, e.g. `language=typescript`
    #[arg(long, env = "TWIRPGEN_PARAMETER")]
    parameter: Option<String>,

    /// Read the request from a file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Write the response to a file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let mut request = read_request(cli)?;
    request.parameter = merge_parameter(request.parameter.take(), cli.parameter.as_deref());
    debug!("Parameter: {:?}", request.parameter);

    let response = match generate(&request) {
        Ok(response) => {
            for file in &response.file {
                let content = file.content();
                debug!(
                    "{}: {} bytes (blake3 {})",
                    file.name(),
                    content.len(),
                    fingerprint(content)
                );
            }
            info!("Generated {} files", response.file.len());
            response
        }
        Err(e) => {
            // protoc reports the message and writes nothing
            error!("{}", e);
            error_response(&e)
        }
    };

    write_response(cli, &response)
}

fn read_request(cli: &Cli) -> Result<CodeGeneratorRequest> {
    let bytes = match &cli.input {
        Some(path) => fs::read(path)
            .with_context(|| format!("Failed to read request from {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    debug!("Read {} byte request", bytes.len());

    CodeGeneratorRequest::decode(bytes.as_slice()).context("Failed to decode CodeGeneratorRequest")
}

fn write_response(cli: &Cli, response: &CodeGeneratorResponse) -> Result<()> {
    let bytes = response.encode_to_vec();
    match &cli.output {
        Some(path) => fs::write(path, &bytes)
            .with_context(|| format!("Failed to write response to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .context("Failed to write response to stdout")?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}

/// Options from the command line override protoc's since they come last
fn merge_parameter(from_protoc: Option<String>, extra: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [from_protoc.as_deref(), extra]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

/// Short content hash (first 8 chars of blake3)
fn fingerprint(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes());
    hash.to_hex()[..8].to_string()
}
