//! The closed set of aggregate member kinds.

use crate::ir::{AggregateEdge, AggregateNode, Relation, ScalarMemberDef, VariationGroup};

/// One member of an aggregate, as seen by the derivations.
///
/// Every derived view (persisted columns, search condition, search result,
/// detail instance) and every runtime behavior matches on this enum
/// exhaustively.
#[derive(Debug)]
pub enum AggregateMember<'g> {
    Scalar(&'g ScalarMemberDef),
    /// Singular nested aggregate.
    Child(AggregateEdge<'g>),
    /// Repeated nested aggregate.
    Children(AggregateEdge<'g>),
    /// Tagged set of nested aggregates.
    Variation(VariationGroup<'g>),
    /// Lookup of another aggregate.
    Reference(AggregateEdge<'g>),
}

impl<'g> AggregateMember<'g> {
    /// Members of `node`: scalar fields first, then relations in declaration
    /// order. A variation appears once, at the position of its first variant.
    pub fn members_of(node: &AggregateNode<'g>) -> Vec<AggregateMember<'g>> {
        let mut members: Vec<AggregateMember<'g>> = node
            .item()
            .scalars
            .iter()
            .map(AggregateMember::Scalar)
            .collect();

        let mut groups: Vec<Option<VariationGroup<'g>>> =
            node.variation_groups().into_iter().map(Some).collect();

        for edge in node.outgoing() {
            match *edge.attributes() {
                Relation::ParentChild { variant: Some(_), .. } => {
                    let name = edge.relation_name();
                    let slot = groups
                        .iter_mut()
                        .find(|slot| matches!(slot, Some(group) if group.name == name));
                    if let Some(group) = slot.and_then(Option::take) {
                        members.push(AggregateMember::Variation(group));
                    }
                }
                Relation::ParentChild { repeated: true, .. } => {
                    members.push(AggregateMember::Children(edge));
                }
                Relation::ParentChild { repeated: false, .. } => {
                    members.push(AggregateMember::Child(edge));
                }
                Relation::Reference { .. } => {
                    members.push(AggregateMember::Reference(edge));
                }
            }
        }
        members
    }

    pub fn name(&self) -> &'g str {
        match self {
            AggregateMember::Scalar(def) => &def.name,
            AggregateMember::Child(edge)
            | AggregateMember::Children(edge)
            | AggregateMember::Reference(edge) => edge.relation_name(),
            AggregateMember::Variation(group) => group.name,
        }
    }

    /// Whether this member contributes to the primary key.
    pub fn is_key(&self) -> bool {
        match self {
            AggregateMember::Scalar(def) => def.is_key,
            AggregateMember::Reference(edge) => matches!(
                edge.attributes(),
                Relation::Reference { is_primary_key_link: true, .. }
            ),
            AggregateMember::Child(_)
            | AggregateMember::Children(_)
            | AggregateMember::Variation(_) => false,
        }
    }

    pub fn is_display_name(&self) -> bool {
        match self {
            AggregateMember::Scalar(def) => def.is_display_name,
            AggregateMember::Reference(edge) => matches!(
                edge.attributes(),
                Relation::Reference { is_display_name: true, .. }
            ),
            AggregateMember::Child(_)
            | AggregateMember::Children(_)
            | AggregateMember::Variation(_) => false,
        }
    }
}
