//! Diagnostic types for error reporting.

mod error;
mod list;

pub use error::{CompilerError, QueryError};
pub use list::ErrorList;
