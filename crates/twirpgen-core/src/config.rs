//! Generator configuration.
//!
//! protoc hands plugins a single parameter string; ours is a comma-separated
//! list of `key=value` pairs:
//!
//! ```text
//! language=typescript,json.emitFieldsWithDefaultValues=true,json.useProtoFieldName=false
//! ```
//!
//! Unknown keys and malformed values never abort generation. They are logged
//! and the documented default is kept.

use tracing::{debug, warn};

/// Target language of the generated source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// Plain ES module JavaScript, no type syntax
    #[default]
    JavaScript,
    /// TypeScript with interfaces and annotations
    TypeScript,
}

impl Language {
    /// File extension of generated files (without the leading dot)
    pub fn extension(&self) -> &'static str {
        match self {
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
        }
    }

    /// Whether type syntax is emitted
    pub fn is_typed(&self) -> bool {
        matches!(self, Language::TypeScript)
    }
}

impl TryFrom<&str> for Language {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

/// Configuration for code generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Target language (default: JavaScript)
    pub language: Language,
    /// Emit implicit-presence fields in JSON even when they hold their default
    pub emit_default_values: bool,
    /// Use the original proto field name instead of the JSON name on output
    pub use_proto_field_name: bool,
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            emit_default_values: false,
            use_proto_field_name: false,
            indent_str: "  ".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target language
    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Sets whether default-valued fields are written to JSON
    pub fn emit_default_values(mut self, emit: bool) -> Self {
        self.emit_default_values = emit;
        self
    }

    /// Sets whether JSON output uses proto field names
    pub fn use_proto_field_name(mut self, use_proto: bool) -> Self {
        self.use_proto_field_name = use_proto;
        self
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Builds a config from the protoc parameter string.
    pub fn from_parameter(parameter: Option<&str>) -> Self {
        let mut config = Self::default();
        let Some(parameter) = parameter else {
            return config;
        };

        for part in parameter.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                warn!("Ignoring malformed option '{}' (expected key=value)", part);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "language" => match Language::try_from(value) {
                    Ok(language) => config.language = language,
                    Err(e) => warn!("{}; using {:?}", e, config.language),
                },
                "json.emitFieldsWithDefaultValues" => match parse_bool(value) {
                    Some(b) => config.emit_default_values = b,
                    None => warn!("Ignoring non-boolean value '{}' for {}", value, key),
                },
                "json.useProtoFieldName" => match parse_bool(value) {
                    Some(b) => config.use_proto_field_name = b,
                    None => warn!("Ignoring non-boolean value '{}' for {}", value, key),
                },
                _ => warn!("Ignoring unknown option '{}'", key),
            }
        }

        debug!("Resolved generator config: {:?}", config);
        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_parameter() {
        let config = GeneratorConfig::from_parameter(None);
        assert_eq!(config.language, Language::JavaScript);
        assert!(!config.emit_default_values);
        assert!(!config.use_proto_field_name);
    }

    #[test]
    fn test_full_parameter() {
        let config = GeneratorConfig::from_parameter(Some(
            "language=typescript, json.emitFieldsWithDefaultValues=true,json.useProtoFieldName=true",
        ));
        assert_eq!(config.language, Language::TypeScript);
        assert!(config.emit_default_values);
        assert!(config.use_proto_field_name);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = GeneratorConfig::from_parameter(Some(
            "language=cobol,json.useProtoFieldName=maybe,verbose,unknown=1",
        ));
        assert_eq!(config.language, Language::JavaScript);
        assert!(!config.use_proto_field_name);
    }

    #[test]
    fn test_builder() {
        let config = GeneratorConfig::new()
            .language(Language::TypeScript)
            .indent_str("    ");
        assert_eq!(config.language.extension(), "ts");
        assert_eq!(config.indent_str, "    ");
    }
}
