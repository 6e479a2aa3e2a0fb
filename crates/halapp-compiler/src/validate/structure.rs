//! Structure validation for a built schema.
//!
//! These are design rules rather than derivation requirements: a schema that
//! breaks them still yields tables and projections, but not ones anyone
//! should ship.

use std::collections::HashSet;

use tracing::warn;

use crate::diagnostic::ErrorList;
use crate::ir::{AggregateNode, Relation};
use crate::model::AggregateMember;
use crate::schema::AppSchema;

/// Validates every aggregate of the schema.
pub fn validate_structure(schema: &AppSchema) -> ErrorList {
    let mut errors = ErrorList::new();
    for node in schema.aggregates() {
        validate_member_names(&node, &mut errors);
        validate_references(&node, &mut errors);
        if node.is_root() && schema.db_entity(node.path()).is_some_and(|e| e.pk_columns.is_empty()) {
            warn!(path = %node.path(), "root aggregate has no key; search results will be unordered");
        }
    }
    errors
}

/// Scalars and relations share one namespace per aggregate.
fn validate_member_names(node: &AggregateNode<'_>, errors: &mut ErrorList) {
    let mut names = HashSet::new();
    for member in AggregateMember::members_of(node) {
        if !names.insert(member.name()) {
            errors.push(format!(
                "Aggregate '{}' declares member '{}' more than once.",
                node.path(),
                member.name()
            ));
        }
    }
}

fn validate_references(node: &AggregateNode<'_>, errors: &mut ErrorList) {
    for edge in node.reference_edges() {
        let target = edge.terminal();
        if target.path() == node.path() {
            errors.push(format!(
                "Reference '{}' of '{}' refers to its own aggregate.",
                edge.relation_name(),
                node.path()
            ));
            continue;
        }
        match target.parent_edge().map(|e| *e.attributes()) {
            Some(Relation::ParentChild { repeated: true, .. }) => {
                warn!(
                    reference = edge.relation_name(),
                    owner = %node.path(),
                    target = %target.path(),
                    "reference targets a repeated aggregate"
                );
            }
            Some(Relation::ParentChild { variant: Some(_), .. }) => {
                warn!(
                    reference = edge.relation_name(),
                    owner = %node.path(),
                    target = %target.path(),
                    "reference targets a variant"
                );
            }
            _ => {}
        }
    }
}
