//! Validation of a built schema.

mod structure;

use crate::diagnostic::CompilerError;
use crate::schema::AppSchema;

/// Validates the entire schema.
pub fn validate_schema(schema: &AppSchema) -> Result<(), CompilerError> {
    let errors = structure::validate_structure(schema);
    errors.into_result(()).map_err(CompilerError::from)
}
