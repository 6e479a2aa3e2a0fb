//! HalApp compiler CLI.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use halapp_compiler::ir::Relation;
use halapp_compiler::{AggregatePath, AppSchema, Compiler, CompilerConfig, SearchQuery};

mod ui;

#[derive(Parser)]
#[command(name = "halapp")]
#[command(version)]
#[command(about = "HalApp compiler - validates aggregate schemas and derives tables, views and queries")]
struct Cli {
    /// Log compiler internals (overrides HALAPP_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check schema files without writing anything
    Check {
        /// Schema directory
        #[arg(default_value = "schema")]
        dir: PathBuf,

        /// Schema language
        #[arg(short, long, default_value = "xml")]
        language: String,

        /// Skip structure validation
        #[arg(long)]
        skip_validation: bool,
    },

    /// Dump the derived model as JSON
    Model {
        /// Schema directory
        #[arg(default_value = "schema")]
        dir: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Schema language
        #[arg(short, long, default_value = "xml")]
        language: String,

        /// Skip structure validation
        #[arg(long)]
        skip_validation: bool,
    },

    /// Print the search query of a root aggregate
    Query {
        /// Schema directory
        dir: PathBuf,

        /// Root aggregate path, e.g. /Order
        root: String,

        /// Search condition as JSON
        #[arg(short, long, default_value = "{}")]
        condition: String,

        /// Schema language
        #[arg(short, long, default_value = "xml")]
        language: String,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Check {
            dir,
            language,
            skip_validation,
        } => {
            ui::print_compact_header(env!("CARGO_PKG_VERSION"));
            let start = Instant::now();
            let spinner = ui::spinner("Checking schema...");

            let compiler = Compiler::new(CompilerConfig {
                schema_dir: dir,
                out_file: None,
                language,
                skip_validation,
            });

            match compiler.load() {
                Ok(schema) => {
                    spinner.finish_and_clear();
                    ui::looking_good();
                    println!();
                    print_tree(&schema);
                    ui::divider();
                    for entity in schema.db_entities() {
                        ui::table_line(&entity.table, entity.pk_columns.len(), entity.columns.len());
                    }
                    println!();
                    ui::timing("Checked", start.elapsed().as_millis());
                }
                Err(e) => {
                    spinner.finish_and_clear();
                    ui::nope_header();
                    return Err(e.into());
                }
            }
        }

        Commands::Model {
            dir,
            output,
            language,
            skip_validation,
        } => {
            let compiler = Compiler::new(CompilerConfig {
                schema_dir: dir,
                out_file: output,
                language,
                skip_validation,
            });
            let result = compiler.compile()?;
            match &result.written {
                Some(path) => {
                    ui::success(&format!(
                        "{} aggregates, {} columns written to {}",
                        result.aggregates,
                        result.columns,
                        path.display()
                    ));
                }
                None => {
                    let json = result.schema.snapshot().to_json().into_diagnostic()?;
                    println!("{json}");
                }
            }
        }

        Commands::Query {
            dir,
            root,
            condition,
            language,
        } => {
            let compiler = Compiler::new(CompilerConfig {
                schema_dir: dir,
                language,
                ..Default::default()
            });
            let schema = compiler.load()?;

            let root = AggregatePath::try_parse(&root)
                .map_err(|e| miette::miette!("Invalid aggregate path '{}': {}", root, e))?;
            let condition: serde_json::Value = serde_json::from_str(&condition).into_diagnostic()?;

            let query = SearchQuery::build(&schema, &root, &condition)?;
            println!("{}", query.to_sql_string()?);
            for param in query.statement.params() {
                ui::dim(&format!("{} = {}", param.name, param.value));
            }
            ui::info(&format!("columns: {}", query.columns.join(", ")));
        }
    }

    Ok(())
}

/// Logs go to stderr; `-v` wins over `HALAPP_LOG`, which defaults to `warn`.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("HALAPP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_tree(schema: &AppSchema) {
    for root in schema.root_aggregates() {
        ui::tree_root(root.path().base_name(), &root.item().type_name);
        let descendants = root.descendants();
        for (i, node) in descendants.iter().enumerate() {
            let parent = node.path().parent();
            let is_last = !descendants[i + 1..]
                .iter()
                .any(|other| other.path().parent() == parent);
            let kind = match node.parent_edge().map(|edge| *edge.attributes()) {
                Some(Relation::ParentChild { variant: Some(tag), .. }) => format!("variant {tag}"),
                Some(Relation::ParentChild { repeated: true, .. }) => "multiple".to_string(),
                _ => "child".to_string(),
            };
            ui::tree_item(
                node.path().depth() - root.path().depth(),
                node.path().base_name(),
                &format!("{} {} {}", node.item().type_name, ui::symbols::DOT, kind),
                is_last,
            );
        }
    }
}
