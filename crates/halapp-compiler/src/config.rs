//! Compiler configuration.

use std::path::PathBuf;

/// Configuration for the HalApp compiler.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Directory containing schema files.
    pub schema_dir: PathBuf,

    /// Where to write the JSON model snapshot, if anywhere.
    pub out_file: Option<PathBuf>,

    /// Schema language (default: "xml").
    pub language: String,

    /// Skip structure validation (derivation checks always run).
    pub skip_validation: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("schema"),
            out_file: None,
            language: "xml".to_string(),
            skip_validation: false,
        }
    }
}
