//! # twirpgen-core
//!
//! A library for generating TypeScript and JavaScript RPC code from Protocol Buffer descriptors.
//!
//! This crate provides the core functionality for:
//! - Resolving type references across a multi-file descriptor set
//! - Deriving per-field wire operations, language types and defaults
//! - Emitting message types, binary and JSON codecs, clients and server registrations
//!
//! ## Architecture
//!
//! Generation is a single pass over an explicit intermediate representation:
//!
//! - [`resolve`]: identifier table, visibility-aware resolver and import bookkeeping
//! - [`descriptor`]: field kind to language type / wire op mapping
//! - [`tree`]: per-file type trees and service lists
//! - [`emit`]: the printer turning a tree into source text
//! - [`generator`]: the protoc plugin driver tying the steps together
//! - [`dynamic`]: a Rust evaluation of the generated codec semantics
//! - [`wire`]: low-level wire format helpers
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```
//! use prost_types::compiler::CodeGeneratorRequest;
//! use twirpgen_core::generate;
//!
//! // protoc hands the plugin a request on stdin
//! let request = CodeGeneratorRequest::default();
//!
//! let response = generate(&request)?;
//! assert!(response.file.is_empty());
//! # Ok::<(), twirpgen_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod descriptor;
pub mod dynamic;
pub mod emit;
pub mod error;
pub mod generator;
pub mod resolve;
pub mod tree;
pub mod wire;

// Re-export primary types for convenience
pub use config::{GeneratorConfig, Language};
pub use dynamic::{Codec, EnumValue, MessageValue, Value};
pub use error::{Error, Result};
pub use generator::{
    build_trees, error_response, generate, generate_files, generate_with_config, GeneratedFile,
};
pub use tree::FileTree;
pub use wire::MAX_FIELD_NUMBER;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
