//! Compiler error types.
#![allow(unused_assignments)]

use std::path::PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use super::ErrorList;

/// Errors that can occur while loading, building or querying a schema.
#[allow(unused_assignments)]
#[derive(Error, Diagnostic, Debug)]
pub enum CompilerError {
    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("Failed to read file '{path}': {message}")]
    #[diagnostic(code(halapp::io::read_error))]
    IoError {
        path: PathBuf,
        message: String,
    },

    #[error("Failed to write file '{path}': {message}")]
    #[diagnostic(code(halapp::io::write_error))]
    WriteError {
        path: PathBuf,
        message: String,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Failed to parse schema file {}:\n{}", path.display(), errors)]
    #[diagnostic(
        code(halapp::parse::parse_failed),
        help("Each problem is listed below; fix them all and re-run.")
    )]
    ParseFailed {
        path: PathBuf,
        errors: ErrorList,
    },

    #[error("No schema files found in '{}'", dir.display())]
    #[diagnostic(
        code(halapp::parse::no_schema_files),
        help("Schema files are XML documents with the .xml extension")
    )]
    NoSchemaFiles {
        dir: PathBuf,
    },

    // =========================================================================
    // Schema Errors
    // =========================================================================
    #[error("Schema is invalid ({} problem(s)):\n{}", errors.len(), errors)]
    #[diagnostic(code(halapp::schema::invalid))]
    InvalidSchema {
        errors: ErrorList,
    },

    #[error("Unknown aggregate: {path}")]
    #[diagnostic(
        code(halapp::schema::unknown_aggregate),
        help("Aggregate paths start with '/' and name every ancestor, e.g. /Order/Lines")
    )]
    UnknownAggregate {
        path: String,
    },

    // =========================================================================
    // Query Errors
    // =========================================================================
    #[error(transparent)]
    #[diagnostic(code(halapp::query::contract_violation))]
    Query(#[from] QueryError),

    #[error("Search condition for '{field}' is malformed: {message}")]
    #[diagnostic(code(halapp::query::bad_condition))]
    BadCondition {
        field: String,
        message: String,
    },

    // =========================================================================
    // Runtime Mapping Errors
    // =========================================================================
    #[error("Cannot map value of '{field}': {message}")]
    #[diagnostic(code(halapp::runtime::mapping_failed))]
    MappingFailed {
        field: String,
        message: String,
    },

    // =========================================================================
    // Frontend Errors
    // =========================================================================
    #[error("Unsupported schema language: {language}")]
    #[diagnostic(code(halapp::frontend::unsupported_language))]
    UnsupportedLanguage {
        language: String,
    },
}

impl CompilerError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IoError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MappingFailed {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<ErrorList> for CompilerError {
    fn from(errors: ErrorList) -> Self {
        Self::InvalidSchema { errors }
    }
}

/// Contract violations of the SELECT statement builder.
///
/// These are programming errors local to one statement instance; the failing
/// call is rejected and the statement is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("FROM is already set to '{current}', cannot set '{requested}'")]
    FromAlreadySet { current: String, requested: String },

    #[error("FROM is not set")]
    FromNotSet,

    #[error("'{table}' is the FROM table and cannot be joined")]
    JoinOntoFrom { table: String },

    #[error("'{table}' is already joined")]
    AlreadyJoined { table: String },

    #[error("'{table}' is not a descendant of '{from}'; only descendant tables can be joined")]
    NotADescendant { table: String, from: String },

    #[error("'{table}' appears neither in FROM nor in a JOIN")]
    UnknownTable { table: String },

    #[error("'{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("SELECT clause is empty")]
    SelectNotSet,
}
