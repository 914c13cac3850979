use std::path::PathBuf;

use thiserror::Error;

use crate::datatypes::ElementId;

/// Top-level error for a whole file conversion
#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Mapping table error: {0}")]
    Table(#[from] TableError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A fatal problem in the input text
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line} in {section}: {kind}")]
pub struct ParseError {
    /// 1-based line number
    pub line: usize,
    /// The directive keyword in force, as written in the input
    pub section: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, section: &str, kind: ParseErrorKind) -> ParseError {
        ParseError {
            line,
            section: section.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("invalid value in field {index}: {value:?}")]
    InvalidField { index: usize, value: String },

    #[error("missing required field {index}")]
    MissingField { index: usize },

    #[error("expected at most {expected} fields, found {found}")]
    TooManyFields { expected: usize, found: usize },

    #[error("missing required parameter {0}=")]
    MissingParameter(&'static str),

    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: String },

    #[error("{0} must follow a *Material directive")]
    OutOfContext(&'static str),

    #[error("duplicate {entity} id {id}")]
    DuplicateId { entity: &'static str, id: u32 },

    #[error("duplicate {entity} name {name}")]
    DuplicateName { entity: &'static str, name: String },

    #[error("undefined {entity} {name}")]
    UndefinedReference { entity: &'static str, name: String },
}

/// A fatal problem found while translating a model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("element {element} of type {element_type} has {actual} nodes but expected {expected}")]
    Arity {
        element: ElementId,
        element_type: String,
        expected: usize,
        actual: usize,
    },

    #[error("undefined {entity} {name}")]
    UndefinedReference { entity: &'static str, name: String },

    #[error("element {element} has unmapped type {element_type}")]
    UnmappedElement {
        element: ElementId,
        element_type: String,
    },
}

/// A mapping table document that does not follow the table schema
#[derive(Debug, Error)]
pub enum TableError {
    #[error("tables are not valid JSON: {0}")]
    Json(String),

    #[error("missing field {0}")]
    Missing(String),

    #[error("invalid value for {path}: {reason}")]
    Invalid { path: String, reason: String },
}
