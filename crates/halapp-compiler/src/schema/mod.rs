//! Schema resolution and the compiled application schema.
//!
//! [`SchemaBuilder`] collects flat declarations and resolves them into an
//! [`AppSchema`]: the validated aggregate graph plus every derived model,
//! computed once, parents before children.

mod builder;
mod snapshot;

pub use builder::{
    AggregateDecl, ChildDecl, ChildrenDecl, EnumDecl, ReferenceDecl, ScalarDecl, SchemaBuilder,
    VariantDecl, VariationBase, VariationDecl,
};
pub use snapshot::{AggregateSnapshot, ModelSnapshot, SNAPSHOT_VERSION};

use std::collections::HashMap;

use tracing::info;

use crate::diagnostic::ErrorList;
use crate::ir::{node_id, AggregateGraph, AggregateNode, AggregatePath};
use crate::model::{derive_entities, derive_views, AggregateViews, DbEntity};

/// A validated aggregate graph with its derived models.
pub struct AppSchema {
    graph: AggregateGraph,
    entities: Vec<DbEntity>,
    views: Vec<AggregateViews>,
    index: HashMap<AggregatePath, usize>,
}

impl AppSchema {
    /// Derives every model from `graph`.
    pub(crate) fn try_new(graph: AggregateGraph) -> Result<Self, ErrorList> {
        let entities = derive_entities(&graph)?;

        let index: HashMap<AggregatePath, usize> = entities
            .iter()
            .enumerate()
            .map(|(i, entity)| (entity.path.clone(), i))
            .collect();

        let mut views = Vec::with_capacity(entities.len());
        for entity in &entities {
            let Some(node) = graph.node(&node_id(&entity.path)) else {
                continue;
            };
            views.push(derive_views(&node));
        }

        info!(
            aggregates = graph.node_count(),
            roots = graph.nodes().filter(|n| n.is_root()).count(),
            "schema built"
        );

        Ok(Self {
            graph,
            entities,
            views,
            index,
        })
    }

    pub fn graph(&self) -> &AggregateGraph {
        &self.graph
    }

    pub fn node(&self, path: &AggregatePath) -> Option<AggregateNode<'_>> {
        self.graph.node(&node_id(path))
    }

    /// Every aggregate, parents before children.
    pub fn aggregates(&self) -> impl Iterator<Item = AggregateNode<'_>> + '_ {
        self.entities.iter().filter_map(|e| self.node(&e.path))
    }

    pub fn root_aggregates(&self) -> impl Iterator<Item = AggregateNode<'_>> + '_ {
        self.aggregates().filter(|node| node.is_root())
    }

    pub fn db_entity(&self, path: &AggregatePath) -> Option<&DbEntity> {
        self.index.get(path).map(|&i| &self.entities[i])
    }

    /// Persisted entities, parents before children.
    pub fn db_entities(&self) -> impl Iterator<Item = &DbEntity> {
        self.entities.iter()
    }

    pub fn views(&self, path: &AggregatePath) -> Option<&AggregateViews> {
        self.index.get(path).and_then(|&i| self.views.get(i))
    }

    /// Serializable view of the whole compiled model.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::from_schema(self)
    }
}

impl std::fmt::Debug for AppSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSchema")
            .field("aggregates", &self.entities.iter().map(|e| &e.path).collect::<Vec<_>>())
            .finish()
    }
}
