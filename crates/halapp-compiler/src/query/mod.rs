//! SQL generation over the persistence model.

mod search;
mod select;

pub use search::SearchQuery;
pub use select::{ClauseArg, SelectStatement, SqlParam};
