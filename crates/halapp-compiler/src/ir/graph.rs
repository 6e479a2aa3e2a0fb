//! Generic directed graph with attributed edges.
//!
//! Construction is all-or-nothing: [`DirectedGraph::try_create`] either
//! returns a graph whose every edge endpoint exists, or the complete list of
//! problems and no graph at all.
//!
//! Traversal goes through [`GraphNode`] handles. A handle reached by walking
//! an edge remembers the chain of edges it was reached through, so
//! [`GraphNode::path_from_entry`] can reconstruct the relation names from the
//! starting node of the walk down to the current node.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::diagnostic::ErrorList;

/// Identifier of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything that can be stored as a graph node.
pub trait GraphNodeItem {
    fn id(&self) -> NodeId;
}

/// Declaration of an edge, as handed to [`DirectedGraph::try_create`].
///
/// Identity is `(initial, terminal, relation_name)`; attributes do not take
/// part in de-duplication.
#[derive(Debug, Clone)]
pub struct GraphEdgeInfo<E> {
    pub initial: NodeId,
    pub terminal: NodeId,
    pub relation_name: String,
    pub attributes: E,
}

impl<E> GraphEdgeInfo<E> {
    fn identity(&self) -> (&NodeId, &NodeId, &str) {
        (&self.initial, &self.terminal, &self.relation_name)
    }
}

/// A validated directed graph.
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    index: HashMap<NodeId, usize>,
    edges: Vec<GraphEdgeInfo<E>>,
    edge_ends: Vec<(usize, usize)>,
    outgoing: Vec<OnceLock<Vec<usize>>>,
    incoming: Vec<OnceLock<Vec<usize>>>,
}

impl<N: GraphNodeItem, E> DirectedGraph<N, E> {
    /// Validates and builds a graph.
    ///
    /// Reports every duplicated node id and every edge endpoint that is not
    /// among the nodes. Duplicate edges are silently collapsed, the first
    /// declaration wins.
    pub fn try_create<NI, EI>(nodes: NI, edges: EI) -> Result<Self, ErrorList>
    where
        NI: IntoIterator<Item = N>,
        EI: IntoIterator<Item = GraphEdgeInfo<E>>,
    {
        let mut errors = ErrorList::new();

        let nodes: Vec<N> = nodes.into_iter().collect();
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let id = node.id();
            if index.contains_key(&id) {
                errors.push(format!("Node '{id}' is declared more than once."));
            } else {
                index.insert(id, i);
            }
        }

        let mut seen = HashSet::new();
        let mut unique_edges = Vec::new();
        for edge in edges {
            let identity = (
                edge.identity().0.clone(),
                edge.identity().1.clone(),
                edge.identity().2.to_string(),
            );
            if seen.insert(identity) {
                unique_edges.push(edge);
            }
        }

        let mut edge_ends = Vec::with_capacity(unique_edges.len());
        for edge in &unique_edges {
            let initial = index.get(&edge.initial).copied();
            let terminal = index.get(&edge.terminal).copied();
            for (end, id) in [(initial, &edge.initial), (terminal, &edge.terminal)] {
                if end.is_none() {
                    errors.push(format!(
                        "Edge '{}' from '{}' to '{}' refers to node '{}', which does not exist.",
                        edge.relation_name, edge.initial, edge.terminal, id
                    ));
                }
            }
            if let (Some(i), Some(t)) = (initial, terminal) {
                edge_ends.push((i, t));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let node_count = nodes.len();
        Ok(Self {
            nodes,
            index,
            edges: unique_edges,
            edge_ends,
            outgoing: (0..node_count).map(|_| OnceLock::new()).collect(),
            incoming: (0..node_count).map(|_| OnceLock::new()).collect(),
        })
    }

    /// Builds a graph from inputs the caller has already validated.
    ///
    /// # Panics
    ///
    /// Panics with the full error list if the inputs are invalid.
    pub fn create<NI, EI>(nodes: NI, edges: EI) -> Self
    where
        NI: IntoIterator<Item = N>,
        EI: IntoIterator<Item = GraphEdgeInfo<E>>,
    {
        match Self::try_create(nodes, edges) {
            Ok(graph) => graph,
            Err(errors) => panic!("error while creating a directed graph:\n{errors}"),
        }
    }
}

impl<N, E> DirectedGraph<N, E> {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Every node, as a fresh traversal entry point.
    pub fn nodes(&self) -> impl Iterator<Item = GraphNode<'_, N, E>> + '_ {
        (0..self.nodes.len()).map(move |index| GraphNode::entry(self, index))
    }

    /// Looks a node up by id.
    pub fn node(&self, id: &NodeId) -> Option<GraphNode<'_, N, E>> {
        self.index.get(id).map(|&index| GraphNode::entry(self, index))
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdgeInfo<E>> {
        self.edges.iter()
    }

    fn outgoing_of(&self, node: usize) -> &[usize] {
        self.outgoing[node].get_or_init(|| {
            self.edge_ends
                .iter()
                .enumerate()
                .filter(|(_, (initial, _))| *initial == node)
                .map(|(i, _)| i)
                .collect()
        })
    }

    fn incoming_of(&self, node: usize) -> &[usize] {
        self.incoming[node].get_or_init(|| {
            self.edge_ends
                .iter()
                .enumerate()
                .filter(|(_, (_, terminal))| *terminal == node)
                .map(|(i, _)| i)
                .collect()
        })
    }
}

/// A node handle used for traversal.
pub struct GraphNode<'g, N, E> {
    graph: &'g DirectedGraph<N, E>,
    index: usize,
    trail: Vec<usize>,
}

impl<'g, N, E> Clone for GraphNode<'g, N, E> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph,
            index: self.index,
            trail: self.trail.clone(),
        }
    }
}

impl<'g, N, E> PartialEq for GraphNode<'g, N, E> {
    /// Two handles are equal when they point at the same node, regardless of
    /// how they were reached.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.index == other.index
    }
}

impl<'g, N, E> Eq for GraphNode<'g, N, E> {}

impl<'g, N, E> GraphNode<'g, N, E> {
    fn entry(graph: &'g DirectedGraph<N, E>, index: usize) -> Self {
        Self {
            graph,
            index,
            trail: Vec::new(),
        }
    }

    pub fn item(&self) -> &'g N {
        &self.graph.nodes[self.index]
    }

    pub fn graph(&self) -> &'g DirectedGraph<N, E> {
        self.graph
    }

    /// Edges leaving this node, in declaration order.
    pub fn outgoing(&self) -> impl Iterator<Item = GraphEdge<'g, N, E>> + '_ {
        self.graph
            .outgoing_of(self.index)
            .iter()
            .map(move |&edge| GraphEdge::new(self, edge))
    }

    /// Edges arriving at this node, in declaration order.
    pub fn incoming(&self) -> impl Iterator<Item = GraphEdge<'g, N, E>> + '_ {
        self.graph
            .incoming_of(self.index)
            .iter()
            .map(move |&edge| GraphEdge::new(self, edge))
    }

    /// The edge this handle was reached through, if any.
    pub fn source(&self) -> Option<&'g GraphEdgeInfo<E>> {
        self.trail.last().map(|&edge| &self.graph.edges[edge])
    }

    /// The edges walked from the traversal's starting node to this node, in
    /// walking order. Empty for a handle obtained directly from the graph.
    pub fn path_from_entry(&self) -> Vec<&'g GraphEdgeInfo<E>> {
        self.trail.iter().map(|&edge| &self.graph.edges[edge]).collect()
    }

    /// Relation names along [`Self::path_from_entry`].
    pub fn relation_path(&self) -> Vec<&'g str> {
        self.path_from_entry()
            .into_iter()
            .map(|edge| edge.relation_name.as_str())
            .collect()
    }
}

impl<'g, N: GraphNodeItem, E> GraphNode<'g, N, E> {
    pub fn id(&self) -> NodeId {
        self.item().id()
    }
}

impl<'g, N: GraphNodeItem, E> fmt::Debug for GraphNode<'g, N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id())
            .field("trail", &self.relation_path())
            .finish()
    }
}

/// An edge handle used for traversal.
pub struct GraphEdge<'g, N, E> {
    graph: &'g DirectedGraph<N, E>,
    index: usize,
    from: usize,
    trail: Vec<usize>,
}

impl<'g, N, E> GraphEdge<'g, N, E> {
    fn new(from: &GraphNode<'g, N, E>, index: usize) -> Self {
        Self {
            graph: from.graph,
            index,
            from: from.index,
            trail: from.trail.clone(),
        }
    }

    pub fn info(&self) -> &'g GraphEdgeInfo<E> {
        &self.graph.edges[self.index]
    }

    pub fn relation_name(&self) -> &'g str {
        &self.info().relation_name
    }

    pub fn attributes(&self) -> &'g E {
        &self.info().attributes
    }

    pub fn initial(&self) -> GraphNode<'g, N, E> {
        self.endpoint(self.graph.edge_ends[self.index].0)
    }

    pub fn terminal(&self) -> GraphNode<'g, N, E> {
        self.endpoint(self.graph.edge_ends[self.index].1)
    }

    /// The side we enumerated from keeps its trail; the far side is reached
    /// through this edge.
    fn endpoint(&self, node: usize) -> GraphNode<'g, N, E> {
        let mut trail = self.trail.clone();
        if node != self.from {
            trail.push(self.index);
        }
        GraphNode {
            graph: self.graph,
            index: node,
            trail,
        }
    }
}

impl<'g, N, E> fmt::Debug for GraphEdge<'g, N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        f.debug_struct("GraphEdge")
            .field("relation", &info.relation_name)
            .field("initial", &info.initial)
            .field("terminal", &info.terminal)
            .finish()
    }
}
