//! Error types for the twirpgen-core library.
//!
//! Every error here is fatal for a generation run: the driver never emits a
//! partial file set. Wire and JSON variants are produced by the
//! [`dynamic`](crate::dynamic) codec.

use thiserror::Error;

/// Result type alias for twirpgen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all twirpgen operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A file descriptor in the request carries no file name
    #[error("file descriptor at position {index} has no name")]
    MissingFileName {
        /// Position of the descriptor in the request
        index: usize,
    },

    /// A file listed for generation is absent from the descriptor set
    #[error("file '{file}' was requested for generation but no descriptor was supplied")]
    UnknownFileToGenerate {
        /// The requested file name
        file: String,
    },

    /// A type reference matched no definition visible from the referencing file
    #[error("unresolved identifier '{name}' referenced from '{file}'")]
    UnresolvedIdentifier {
        /// Fully qualified name that failed to resolve
        name: String,
        /// File the reference appears in
        file: String,
    },

    /// A type reference matched more than one visible definition
    #[error("identifier '{name}' referenced from '{file}' is defined in several visible files: {candidates:?}")]
    AmbiguousIdentifier {
        /// Fully qualified name
        name: String,
        /// File the reference appears in
        file: String,
        /// Files that each define the name
        candidates: Vec<String>,
    },

    /// Protobuf groups are not supported
    #[error("field '{field}' uses group encoding, which is not supported")]
    UnsupportedGroupEncoding {
        /// Fully qualified field name
        field: String,
    },

    /// Extensions have no place in the generated message shapes
    #[error("extension '{field}' of '{extendee}' is not supported")]
    UnsupportedExtension {
        /// Fully qualified extension field name
        field: String,
        /// Message the extension extends
        extendee: String,
    },

    /// Streaming RPCs cannot be expressed over the request/response runtime
    #[error("method '{method}' is streaming, which is not supported")]
    UnsupportedStreaming {
        /// Fully qualified method name
        method: String,
    },

    /// A message flagged as a map entry does not have the `key = 1, value = 2` shape
    #[error("map entry '{message}' is malformed: {details}")]
    InvalidMapEntry {
        /// Fully qualified message name
        message: String,
        /// Detailed description of the issue
        details: String,
    },

    /// Unsupported proto syntax version
    #[error("unsupported proto syntax: '{syntax}'")]
    UnsupportedSyntax {
        /// The unsupported syntax string
        syntax: String,
    },

    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Invalid field number on the wire
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// JSON input could not be parsed
    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A JSON or dynamic value does not fit the field it was assigned to
    #[error("invalid value for field '{field}': {details}")]
    InvalidValue {
        /// Field the value was destined for
        field: String,
        /// Detailed description of the issue
        details: String,
    },

    /// A message or enum name is not known to the dynamic codec
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// Writing generated text failed
    #[error("failed to format generated source")]
    Format(#[from] std::fmt::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new unresolved identifier error
    pub fn unresolved(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self::UnresolvedIdentifier {
            name: name.into(),
            file: file.into(),
        }
    }

    /// Creates a new group encoding error
    pub fn unsupported_group(field: impl Into<String>) -> Self {
        Self::UnsupportedGroupEncoding {
            field: field.into(),
        }
    }

    /// Creates a new map entry error
    pub fn invalid_map_entry(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidMapEntry {
            message: message.into(),
            details: details.into(),
        }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new invalid value error
    pub fn invalid_value(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the error comes from the schema rather than from data
    /// handed to the dynamic codec
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::MissingFileName { .. }
                | Self::UnknownFileToGenerate { .. }
                | Self::UnresolvedIdentifier { .. }
                | Self::AmbiguousIdentifier { .. }
                | Self::UnsupportedGroupEncoding { .. }
                | Self::UnsupportedExtension { .. }
                | Self::UnsupportedStreaming { .. }
                | Self::InvalidMapEntry { .. }
                | Self::UnsupportedSyntax { .. }
        )
    }
}
