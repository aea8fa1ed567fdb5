//! Error types for the conversion pipeline

use std::path::PathBuf;

/// Failure while resolving rich-value (in-cell image) references
#[derive(Debug, thiserror::Error)]
pub enum RichValueError {
    #[error("missing rich value parts: {}", .0.join(", "))]
    MissingParts(Vec<String>),

    #[error("unable to read part {part}: {source}")]
    Read {
        part: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid relationships in {part}: {message}")]
    Relationships { part: String, message: String },
}

/// Template validation error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{template}' is missing required placeholder '{{{placeholder}}}'")]
    MissingPlaceholder {
        template: &'static str,
        placeholder: &'static str,
    },

    #[error("template '{template}' uses unknown placeholder '{{{placeholder}}}'")]
    UnknownPlaceholder {
        template: &'static str,
        placeholder: String,
    },

    #[error("template '{template}' has an unbalanced brace at byte {position}")]
    UnbalancedBrace {
        template: &'static str,
        position: usize,
    },
}

/// Invalid conversion options
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("{name} must be at least 1 when set")]
    ZeroLimit { name: &'static str },

    #[error("locale must not be empty")]
    EmptyLocale,
}

/// Fatal conversion error
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unable to read workbook {}: {error:#}", .path.display())]
    Read { path: PathBuf, error: anyhow::Error },

    #[error("conditional formatting failed on sheet '{sheet}': {message}")]
    ConditionalFormatting { sheet: String, message: String },

    #[error("unable to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to serialize the document: {0}")]
    Serialize(#[source] std::io::Error),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Options(#[from] OptionsError),
}
