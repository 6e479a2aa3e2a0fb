//! Models derived from the aggregate graph.
//!
//! Every aggregate member contributes to four derived views: the persisted
//! entity, and the search condition, search result and detail projections.
//! All of them are computed once, when the schema is built.

mod db_entity;
mod members;
mod runtime;
mod views;

pub use db_entity::{
    to_snake_case, ColumnOrigin, ColumnRole, DbColumn, DbEntity, NavigationKind, NavigationLink,
    SEQUENCE_COLUMN,
};
pub use members::AggregateMember;
pub use runtime::{from_db_rows, to_db_rows, DbRecord};
pub use views::{
    variant_detail_name, variant_toggle_name, AggregateViews, FieldKind, Projection, ViewField,
};

pub(crate) use db_entity::derive_entities;
pub(crate) use views::derive_views;
