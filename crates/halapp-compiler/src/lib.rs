//! # HalApp Compiler
//!
//! This crate compiles aggregate schemas into everything an application
//! needs to store, show and search them: the persisted table shapes, the
//! three UI projections of every aggregate and the SQL fragments of its
//! search query. Schemas are read through a pluggable frontend.
//!
//! ## Supported Languages
//!
//! - XML (default)
//!
//! ## Architecture
//!
//! ```text
//! Schema files (XML, etc.)
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Frontend   │  Format-specific parsing
//! │ (XML → decl) │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    Schema    │  Paths, types and the aggregate graph
//! │ (decl → IR)  │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    Model     │  Tables, projections, value mapping
//! │ (IR → model) │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Validate   │  Structure checks
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    Query     │  SELECT assembly per search condition
//! └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use halapp_compiler::{Compiler, CompilerConfig};
//!
//! let config = CompilerConfig {
//!     schema_dir: "schema".into(),
//!     out_file: Some("model.json".into()),
//!     language: "xml".to_string(),
//!     skip_validation: false,
//! };
//!
//! let compiler = Compiler::new(config);
//! let result = compiler.compile()?;
//! println!("{} aggregates", result.aggregates);
//! ```

pub mod config;
pub mod diagnostic;
pub mod frontend;
pub mod ir;
pub mod model;
pub mod query;
pub mod schema;
pub mod validate;

use std::path::PathBuf;

use tracing::info;

pub use config::CompilerConfig;
pub use diagnostic::{CompilerError, ErrorList, QueryError};
pub use ir::{AggregatePath, MemberTypeResolver};
pub use query::{SearchQuery, SelectStatement};
pub use schema::{AppSchema, SchemaBuilder};

/// The main compiler struct that orchestrates the compilation pipeline.
pub struct Compiler {
    config: CompilerConfig,
    resolver: MemberTypeResolver,
}

impl Compiler {
    /// Creates a new compiler with the built-in member types.
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_resolver(config, MemberTypeResolver::default())
    }

    /// Creates a new compiler resolving member types through `resolver`.
    pub fn with_resolver(config: CompilerConfig, resolver: MemberTypeResolver) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Reads, resolves and validates the schema.
    ///
    /// This runs the pipeline up to a usable [`AppSchema`]:
    /// 1. Create frontend for the configured language
    /// 2. Parse schema files into declarations
    /// 3. Resolve declarations and derive every model
    /// 4. Validate structure (unless skipped)
    pub fn load(&self) -> Result<AppSchema, CompilerError> {
        // Phase 1: Create frontend
        let frontend = frontend::create_frontend(&self.config.language)?;

        // Phase 2: Parse files into declarations
        let parsed = frontend.parse_directory(&self.config.schema_dir)?;

        // Phase 3: Resolve and derive; parse problems are reported with
        // resolution problems
        let schema = parsed.try_build(&self.resolver)?;

        // Phase 4: Validate
        if !self.config.skip_validation {
            validate::validate_schema(&schema)?;
        }

        info!(
            dir = %self.config.schema_dir.display(),
            aggregates = schema.aggregates().count(),
            "schema loaded"
        );
        Ok(schema)
    }

    /// Loads the schema and writes the model snapshot if an output file is
    /// configured.
    pub fn compile(&self) -> Result<CompileResult, CompilerError> {
        let schema = self.load()?;

        let written = match &self.config.out_file {
            Some(path) => {
                schema.snapshot().save(path)?;
                info!(path = %path.display(), "model snapshot written");
                Some(path.clone())
            }
            None => None,
        };

        Ok(CompileResult {
            aggregates: schema.aggregates().count(),
            roots: schema.root_aggregates().count(),
            columns: schema.db_entities().map(|e| e.all_columns().count()).sum(),
            written,
            schema,
        })
    }

    /// Validates the schema without writing anything.
    pub fn check(&self) -> Result<(), CompilerError> {
        self.load().map(|_| ())
    }
}

/// Result of a successful compilation.
#[derive(Debug)]
pub struct CompileResult {
    /// Number of aggregates compiled.
    pub aggregates: usize,
    /// Number of root aggregates.
    pub roots: usize,
    /// Total number of persisted columns across all tables.
    pub columns: usize,
    /// The snapshot file, if one was written.
    pub written: Option<PathBuf>,
    pub schema: AppSchema,
}
