//! Language-agnostic intermediate representation.
//!
//! Frontends produce schema declarations; the schema builder resolves them into
//! a [`DirectedGraph`] of [`Aggregate`] nodes joined by typed [`Relation`] edges.
//! Everything downstream (persistence model, projections, queries) reads this
//! graph.

mod aggregate;
mod graph;
mod member_type;
mod path;

pub use aggregate::{
    node_id, Aggregate, AggregateEdge, AggregateGraph, AggregateNode, Relation, ScalarMemberDef,
    VariationGroup,
};
pub use graph::{DirectedGraph, GraphEdge, GraphEdgeInfo, GraphNode, GraphNodeItem, NodeId};
pub use member_type::{
    EnumDefinition, EnumItem, FilterStyle, MemberTypeResolver, ScalarKind, SqlType,
};
pub use path::AggregatePath;
