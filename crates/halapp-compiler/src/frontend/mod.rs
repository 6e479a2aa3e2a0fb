//! Schema declaration readers.
//!
//! Each frontend is responsible for:
//! 1. Reading schema files in its format
//! 2. Turning them into [`SchemaBuilder`] declarations
//!
//! Resolution, derivation and validation are shared by every frontend.

pub mod xml;

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::diagnostic::{CompilerError, ErrorList};
use crate::ir::MemberTypeResolver;
use crate::schema::{AppSchema, SchemaBuilder};

pub use xml::XmlFrontend;

/// Declarations read from schema files, with the problems found in them.
///
/// A file with problems still contributes every declaration that could be
/// read from it, so resolution reports its own findings in the same run.
#[derive(Debug, Default)]
pub struct ParsedSchema {
    pub builder: SchemaBuilder,
    pub errors: ErrorList,
    pub files: usize,
}

impl ParsedSchema {
    /// Resolves the declarations. Fails with every parse and resolution
    /// problem together.
    pub fn try_build(self, resolver: &MemberTypeResolver) -> Result<AppSchema, ErrorList> {
        let mut errors = self.errors;
        match self.builder.try_build(resolver) {
            Ok(schema) => errors.into_result(schema),
            Err(resolution) => {
                errors.merge(resolution);
                Err(errors)
            }
        }
    }
}

/// Trait for schema frontends.
pub trait Frontend {
    /// Returns the format name (e.g., "xml").
    fn language(&self) -> &str;

    /// Returns file extensions this frontend handles (e.g., ["xml"]).
    fn extensions(&self) -> &[&str];

    /// Reads one schema file, keeping whatever it declares next to its
    /// problems. Only an unreadable file is an error here.
    fn read_file(&self, path: &Path) -> Result<ParsedSchema, CompilerError>;

    /// Parses one schema file, failing on any problem in it.
    fn parse_file(&self, path: &Path) -> Result<SchemaBuilder, CompilerError> {
        let parsed = self.read_file(path)?;
        parsed
            .errors
            .into_result(parsed.builder)
            .map_err(|errors| CompilerError::ParseFailed {
                path: path.to_path_buf(),
                errors,
            })
    }

    /// Reads every matching file under `dir`, in file name order, merging the
    /// declarations and the problems of all files. Problems are prefixed with
    /// the file they come from.
    fn parse_directory(&self, dir: &Path) -> Result<ParsedSchema, CompilerError> {
        let mut merged = ParsedSchema::default();

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension() else {
                continue;
            };
            if !self.extensions().contains(&ext.to_string_lossy().as_ref()) {
                continue;
            }
            let parsed = self.read_file(path)?;
            merged.builder.merge(parsed.builder);
            merged.errors.extend(
                parsed
                    .errors
                    .into_iter()
                    .map(|message| format!("{}: {message}", path.display())),
            );
            merged.files += 1;
        }

        if merged.files == 0 {
            return Err(CompilerError::NoSchemaFiles {
                dir: dir.to_path_buf(),
            });
        }
        debug!(
            dir = %dir.display(),
            files = merged.files,
            problems = merged.errors.len(),
            language = self.language(),
            "parsed schema directory"
        );
        Ok(merged)
    }
}

/// Creates a frontend for the given format.
pub fn create_frontend(language: &str) -> Result<Box<dyn Frontend>, CompilerError> {
    match language {
        "xml" => Ok(Box::new(XmlFrontend::new())),
        _ => Err(CompilerError::UnsupportedLanguage {
            language: language.to_string(),
        }),
    }
}
