//! Aggregate nodes and the relations between them.

use serde::Serialize;

use super::graph::{DirectedGraph, GraphEdge, GraphNode, GraphNodeItem, NodeId};
use super::member_type::ScalarKind;
use super::path::AggregatePath;

/// IR representation of an aggregate: a root entity, a nested child, a
/// repeated child or a variant.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    /// Unique address within the schema.
    pub path: AggregatePath,

    /// Declared shape name; also the table name of the persisted entity.
    pub type_name: String,

    /// Scalar fields, in declaration order.
    pub scalars: Vec<ScalarMemberDef>,
}

/// A resolved scalar field declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarMemberDef {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub is_key: bool,
    pub is_display_name: bool,
}

impl Aggregate {
    pub fn new(path: AggregatePath, type_name: impl Into<String>, scalars: Vec<ScalarMemberDef>) -> Self {
        Self {
            path,
            type_name: type_name.into(),
            scalars,
        }
    }
}

impl GraphNodeItem for Aggregate {
    fn id(&self) -> NodeId {
        node_id(&self.path)
    }
}

/// Node id of the aggregate at `path`.
pub fn node_id(path: &AggregatePath) -> NodeId {
    NodeId(path.to_string())
}

/// Typed edge attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "relation", rename_all = "snake_case")]
pub enum Relation {
    /// Ownership: the terminal aggregate lives inside the initial one.
    ParentChild {
        /// The terminal is one element of a collection.
        repeated: bool,
        /// Discriminator value when the terminal is a variant.
        variant: Option<i64>,
    },
    /// Lookup: the initial aggregate points at an instance of the terminal.
    Reference {
        is_primary_key_link: bool,
        is_display_name: bool,
    },
}

impl Relation {
    pub fn is_parent_child(&self) -> bool {
        matches!(self, Relation::ParentChild { .. })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Relation::Reference { .. })
    }
}

pub type AggregateGraph = DirectedGraph<Aggregate, Relation>;
pub type AggregateNode<'g> = GraphNode<'g, Aggregate, Relation>;
pub type AggregateEdge<'g> = GraphEdge<'g, Aggregate, Relation>;

/// Variant edges of one variation member, grouped under the member name.
#[derive(Debug)]
pub struct VariationGroup<'g> {
    pub name: &'g str,
    pub variants: Vec<(i64, AggregateEdge<'g>)>,
}

impl<'g> AggregateNode<'g> {
    pub fn path(&self) -> &'g AggregatePath {
        &self.item().path
    }

    /// The ownership edge pointing at this node.
    pub fn parent_edge(&self) -> Option<AggregateEdge<'g>> {
        self.incoming().find(|edge| edge.attributes().is_parent_child())
    }

    pub fn parent(&self) -> Option<AggregateNode<'g>> {
        self.parent_edge().map(|edge| edge.initial())
    }

    pub fn is_root(&self) -> bool {
        self.parent_edge().is_none()
    }

    /// True if this aggregate is one element of its parent's collection.
    pub fn is_repeated(&self) -> bool {
        matches!(
            self.parent_edge().map(|edge| *edge.attributes()),
            Some(Relation::ParentChild { repeated: true, .. })
        )
    }

    /// Ancestors, root first, excluding this node.
    pub fn ancestors(&self) -> Vec<AggregateNode<'g>> {
        let mut chain = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            chain.push(node);
        }
        chain.reverse();
        chain
    }

    pub fn root(&self) -> AggregateNode<'g> {
        self.ancestors().into_iter().next().unwrap_or_else(|| self.clone())
    }

    /// Singular nested children.
    pub fn child_edges(&self) -> Vec<AggregateEdge<'g>> {
        self.outgoing()
            .filter(|edge| {
                matches!(
                    edge.attributes(),
                    Relation::ParentChild { repeated: false, variant: None }
                )
            })
            .collect()
    }

    /// Repeated nested children.
    pub fn children_edges(&self) -> Vec<AggregateEdge<'g>> {
        self.outgoing()
            .filter(|edge| matches!(edge.attributes(), Relation::ParentChild { repeated: true, .. }))
            .collect()
    }

    /// Variant edges grouped by member name, in order of first appearance.
    pub fn variation_groups(&self) -> Vec<VariationGroup<'g>> {
        let mut groups: Vec<VariationGroup<'g>> = Vec::new();
        for edge in self.outgoing() {
            let Relation::ParentChild { repeated: false, variant: Some(tag) } = *edge.attributes() else {
                continue;
            };
            let name = edge.relation_name();
            match groups.iter_mut().find(|g| g.name == name) {
                Some(group) => group.variants.push((tag, edge)),
                None => groups.push(VariationGroup {
                    name,
                    variants: vec![(tag, edge)],
                }),
            }
        }
        groups
    }

    /// Outgoing lookups.
    pub fn reference_edges(&self) -> Vec<AggregateEdge<'g>> {
        self.outgoing()
            .filter(|edge| edge.attributes().is_reference())
            .collect()
    }

    /// Incoming lookups.
    pub fn referring_edges(&self) -> Vec<AggregateEdge<'g>> {
        self.incoming()
            .filter(|edge| edge.attributes().is_reference())
            .collect()
    }

    /// Every owned descendant, depth first, in declaration order.
    pub fn descendants(&self) -> Vec<AggregateNode<'g>> {
        let mut out = Vec::new();
        let owned: Vec<_> = self
            .outgoing()
            .filter(|edge| edge.attributes().is_parent_child())
            .collect();
        for edge in owned {
            let child = edge.terminal();
            let nested = child.descendants();
            out.push(child);
            out.extend(nested);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::GraphEdgeInfo;

    fn aggregate(path: &str) -> Aggregate {
        let path = AggregatePath::parse(path);
        let type_name = path.base_name().to_string();
        Aggregate::new(path, type_name, vec![])
    }

    fn owned(parent: &str, child: &str, repeated: bool, variant: Option<i64>) -> GraphEdgeInfo<Relation> {
        let child_path = AggregatePath::parse(child);
        GraphEdgeInfo {
            initial: node_id(&AggregatePath::parse(parent)),
            terminal: node_id(&child_path),
            relation_name: match variant {
                Some(_) => "Payment".to_string(),
                None => child_path.base_name().to_string(),
            },
            attributes: Relation::ParentChild { repeated, variant },
        }
    }

    fn sample() -> AggregateGraph {
        AggregateGraph::create(
            vec![
                aggregate("/Order"),
                aggregate("/Order/Lines"),
                aggregate("/Order/Lines/Notes"),
                aggregate("/Order/Delivery"),
                aggregate("/Order/Card"),
                aggregate("/Order/Cash"),
                aggregate("/Customer"),
            ],
            vec![
                owned("/Order", "/Order/Lines", true, None),
                owned("/Order/Lines", "/Order/Lines/Notes", true, None),
                owned("/Order", "/Order/Delivery", false, None),
                owned("/Order", "/Order/Card", false, Some(1)),
                owned("/Order", "/Order/Cash", false, Some(2)),
                GraphEdgeInfo {
                    initial: node_id(&AggregatePath::parse("/Order")),
                    terminal: node_id(&AggregatePath::parse("/Customer")),
                    relation_name: "customer".to_string(),
                    attributes: Relation::Reference {
                        is_primary_key_link: false,
                        is_display_name: false,
                    },
                },
            ],
        )
    }

    fn find<'g>(graph: &'g AggregateGraph, path: &str) -> AggregateNode<'g> {
        graph.node(&node_id(&AggregatePath::parse(path))).unwrap()
    }

    #[test]
    fn test_parent_and_root() {
        let graph = sample();
        let notes = find(&graph, "/Order/Lines/Notes");
        assert!(notes.is_repeated());
        assert!(!notes.is_root());
        assert_eq!(notes.parent().unwrap().path().to_string(), "/Order/Lines");
        assert_eq!(notes.root().path().to_string(), "/Order");

        let ancestors: Vec<_> = notes.ancestors().iter().map(|a| a.path().to_string()).collect();
        assert_eq!(ancestors, vec!["/Order", "/Order/Lines"]);

        // a reference does not make the target a child
        let customer = find(&graph, "/Customer");
        assert!(customer.is_root());
        assert_eq!(customer.referring_edges().len(), 1);
    }

    #[test]
    fn test_member_edge_filters() {
        let graph = sample();
        let order = find(&graph, "/Order");
        assert_eq!(order.child_edges().len(), 1);
        assert_eq!(order.children_edges().len(), 1);
        assert_eq!(order.reference_edges().len(), 1);

        let groups = order.variation_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Payment");
        let tags: Vec<_> = groups[0].variants.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, vec![1, 2]);
    }

    #[test]
    fn test_descendants_depth_first() {
        let graph = sample();
        let order = find(&graph, "/Order");
        let names: Vec<_> = order.descendants().iter().map(|d| d.path().to_string()).collect();
        assert_eq!(
            names,
            vec!["/Order/Lines", "/Order/Lines/Notes", "/Order/Delivery", "/Order/Card", "/Order/Cash"]
        );
    }
}
