//! Schema declarations and their resolution into an aggregate graph.
//!
//! Declarations are flat: every nested aggregate names its owner by full path.
//! Resolution never stops at the first problem; every malformed path,
//! unknown type name and structural conflict is collected and reported
//! together.

use std::collections::HashSet;

use tracing::debug;

use crate::diagnostic::ErrorList;
use crate::ir::{
    node_id, Aggregate, AggregateGraph, AggregatePath, EnumDefinition, GraphEdgeInfo,
    MemberTypeResolver, Relation, ScalarMemberDef,
};

use super::AppSchema;

/// A scalar field declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarDecl {
    pub name: String,
    /// Name looked up in the [`MemberTypeResolver`].
    pub type_name: String,
    pub is_key: bool,
    pub is_display_name: bool,
    /// Non-key fields are nullable unless required.
    pub required: bool,
}

impl ScalarDecl {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn display_name(mut self) -> Self {
        self.is_display_name = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A root aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateDecl {
    /// Full path, e.g. `/Order`.
    pub path: String,
    /// Table name; defaults to the last path segment.
    pub type_name: Option<String>,
    pub members: Vec<ScalarDecl>,
}

/// A singular nested aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildDecl {
    pub name: String,
    pub owner: String,
    pub type_name: Option<String>,
    /// Always rejected; kept so declarations can be reported instead of dropped.
    pub is_key: bool,
    pub members: Vec<ScalarDecl>,
}

/// A repeated nested aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenDecl {
    pub name: String,
    pub owner: String,
    pub type_name: Option<String>,
    pub members: Vec<ScalarDecl>,
}

/// A tagged set of nested aggregates sharing one discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariationDecl {
    pub name: String,
    pub owner: String,
    pub is_key: bool,
    /// Shape every variant must be assignable to.
    pub base: Option<VariationBase>,
    pub variants: Vec<VariantDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariationBase {
    pub name: String,
    pub is_abstract: bool,
    pub members: Vec<ScalarDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantDecl {
    pub name: String,
    pub tag: i64,
    pub type_name: Option<String>,
    pub members: Vec<ScalarDecl>,
}

/// A named lookup from one aggregate to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDecl {
    pub name: String,
    pub owner: String,
    pub target: String,
    pub is_key: bool,
    pub is_display_name: bool,
}

/// An enumeration type, registered before any member type is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: String,
    /// Item names with optional explicit values.
    pub items: Vec<(String, Option<i64>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Declaration {
    Aggregate(AggregateDecl),
    Child(ChildDecl),
    Children(ChildrenDecl),
    Variation(VariationDecl),
    Reference(ReferenceDecl),
}

/// Accumulates declarations and resolves them into an [`AppSchema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    declarations: Vec<Declaration>,
    enums: Vec<EnumDecl>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_aggregate(&mut self, decl: AggregateDecl) -> &mut Self {
        self.declarations.push(Declaration::Aggregate(decl));
        self
    }

    pub fn add_child(&mut self, decl: ChildDecl) -> &mut Self {
        self.declarations.push(Declaration::Child(decl));
        self
    }

    pub fn add_children(&mut self, decl: ChildrenDecl) -> &mut Self {
        self.declarations.push(Declaration::Children(decl));
        self
    }

    pub fn add_variation(&mut self, decl: VariationDecl) -> &mut Self {
        self.declarations.push(Declaration::Variation(decl));
        self
    }

    pub fn add_reference(&mut self, decl: ReferenceDecl) -> &mut Self {
        self.declarations.push(Declaration::Reference(decl));
        self
    }

    pub fn add_enum(&mut self, decl: EnumDecl) -> &mut Self {
        self.enums.push(decl);
        self
    }

    /// Appends every declaration of `other`, keeping its order.
    pub fn merge(&mut self, other: SchemaBuilder) -> &mut Self {
        self.declarations.extend(other.declarations);
        self.enums.extend(other.enums);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty() && self.enums.is_empty()
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    /// Resolves all declarations.
    ///
    /// Returns either a fully derived schema or every problem found; a
    /// partially built schema is never exposed.
    pub fn try_build(&self, resolver: &MemberTypeResolver) -> Result<AppSchema, ErrorList> {
        let mut errors = ErrorList::new();
        let resolver = self.register_enums(resolver, &mut errors);

        let mut aggregates = Vec::new();
        let mut relations = Vec::new();

        for declaration in &self.declarations {
            match declaration {
                Declaration::Aggregate(decl) => {
                    let path = match AggregatePath::try_parse(&decl.path) {
                        Ok(path) => path,
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    };
                    let members = resolve_members(&path, &decl.members, &resolver, &mut errors);
                    let type_name = type_name_of(&path, decl.type_name.as_deref());
                    aggregates.push(Aggregate::new(path, type_name, members));
                }
                Declaration::Child(decl) => {
                    let Some(owner) = parse_owner(&decl.owner, &mut errors) else {
                        continue;
                    };
                    if decl.is_key {
                        errors.push(format!(
                            "Child '{}' of '{owner}' cannot be a key.",
                            decl.name
                        ));
                    }
                    let Some(path) = child_path(&owner, &decl.name, &mut errors) else {
                        continue;
                    };
                    let members = resolve_members(&path, &decl.members, &resolver, &mut errors);
                    relations.push(owned_edge(&owner, &path, &decl.name, false, None));
                    let type_name = type_name_of(&path, decl.type_name.as_deref());
                    aggregates.push(Aggregate::new(path, type_name, members));
                }
                Declaration::Children(decl) => {
                    let Some(owner) = parse_owner(&decl.owner, &mut errors) else {
                        continue;
                    };
                    let Some(path) = child_path(&owner, &decl.name, &mut errors) else {
                        continue;
                    };
                    let members = resolve_members(&path, &decl.members, &resolver, &mut errors);
                    relations.push(owned_edge(&owner, &path, &decl.name, true, None));
                    let type_name = type_name_of(&path, decl.type_name.as_deref());
                    aggregates.push(Aggregate::new(path, type_name, members));
                }
                Declaration::Variation(decl) => {
                    let Some(owner) = parse_owner(&decl.owner, &mut errors) else {
                        continue;
                    };
                    check_variation(&owner, decl, &resolver, &mut errors);
                    for variant in &decl.variants {
                        let Some(path) = child_path(&owner, &variant.name, &mut errors) else {
                            continue;
                        };
                        let members =
                            resolve_members(&path, &variant.members, &resolver, &mut errors);
                        relations.push(owned_edge(
                            &owner,
                            &path,
                            &decl.name,
                            false,
                            Some(variant.tag),
                        ));
                        let type_name = type_name_of(&path, variant.type_name.as_deref());
                        aggregates.push(Aggregate::new(path, type_name, members));
                    }
                }
                Declaration::Reference(decl) => {
                    let Some(owner) = parse_owner(&decl.owner, &mut errors) else {
                        continue;
                    };
                    let target = match AggregatePath::try_parse(&decl.target) {
                        Ok(target) => target,
                        Err(e) => {
                            errors.push(format!("Reference '{}' of '{owner}': {e}", decl.name));
                            continue;
                        }
                    };
                    relations.push(GraphEdgeInfo {
                        initial: node_id(&owner),
                        terminal: node_id(&target),
                        relation_name: decl.name.clone(),
                        attributes: Relation::Reference {
                            is_primary_key_link: decl.is_key,
                            is_display_name: decl.is_display_name,
                        },
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates {
            if seen.insert(aggregate.path.clone()) {
                unique.push(aggregate);
            } else {
                errors.push(format!("Aggregate path duplicates: {}", aggregate.path));
            }
        }

        let graph = match AggregateGraph::try_create(unique, relations) {
            Ok(graph) => graph,
            Err(graph_errors) => {
                errors.merge(graph_errors);
                return Err(errors);
            }
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        debug!(
            aggregates = graph.node_count(),
            relations = graph.edge_count(),
            "aggregate graph resolved"
        );
        AppSchema::try_new(graph)
    }

    fn register_enums(&self, resolver: &MemberTypeResolver, errors: &mut ErrorList) -> MemberTypeResolver {
        let mut resolver = resolver.clone();
        for decl in &self.enums {
            match EnumDefinition::with_auto_values(&decl.name, decl.items.clone()) {
                Ok(definition) => {
                    resolver.register_enum(definition);
                }
                Err(enum_errors) => errors.merge(enum_errors),
            }
        }
        resolver
    }
}

fn parse_owner(owner: &str, errors: &mut ErrorList) -> Option<AggregatePath> {
    match AggregatePath::try_parse(owner) {
        Ok(path) => Some(path),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn child_path(owner: &AggregatePath, name: &str, errors: &mut ErrorList) -> Option<AggregatePath> {
    match owner.child(name) {
        Ok(path) => Some(path),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn type_name_of(path: &AggregatePath, declared: Option<&str>) -> String {
    match declared {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => path.base_name().to_string(),
    }
}

fn owned_edge(
    owner: &AggregatePath,
    path: &AggregatePath,
    relation_name: &str,
    repeated: bool,
    variant: Option<i64>,
) -> GraphEdgeInfo<Relation> {
    GraphEdgeInfo {
        initial: node_id(owner),
        terminal: node_id(path),
        relation_name: relation_name.to_string(),
        attributes: Relation::ParentChild { repeated, variant },
    }
}

fn resolve_members(
    owner: &AggregatePath,
    decls: &[ScalarDecl],
    resolver: &MemberTypeResolver,
    errors: &mut ErrorList,
) -> Vec<ScalarMemberDef> {
    let mut members = Vec::with_capacity(decls.len());
    for decl in decls {
        match resolver.try_resolve(&decl.type_name) {
            Some(kind) => members.push(ScalarMemberDef {
                name: decl.name.clone(),
                kind,
                nullable: !decl.is_key && !decl.required,
                is_key: decl.is_key,
                is_display_name: decl.is_display_name,
            }),
            None => errors.push(format!(
                "Type name '{}' of '{}' in '{owner}' is invalid.",
                decl.type_name, decl.name
            )),
        }
    }
    members
}

/// Checks tags, the base shape and that every variant is assignable to it.
fn check_variation(
    owner: &AggregatePath,
    decl: &VariationDecl,
    resolver: &MemberTypeResolver,
    errors: &mut ErrorList,
) {
    let name = &decl.name;
    if decl.is_key {
        errors.push(format!("Variation '{name}' of '{owner}' cannot be a key."));
    }
    if decl.variants.is_empty() {
        errors.push(format!("Variation '{name}' of '{owner}' has no variants."));
    }

    let mut tags = HashSet::new();
    for variant in &decl.variants {
        if !tags.insert(variant.tag) {
            errors.push(format!(
                "Variation '{name}' of '{owner}' uses tag {} more than once.",
                variant.tag
            ));
        }
    }

    let Some(base) = &decl.base else {
        return;
    };
    if !base.is_abstract && !decl.variants.is_empty() {
        errors.push(format!(
            "Base type '{}' of variation '{name}' is not abstract and cannot have variants.",
            base.name
        ));
    }

    for variant in &decl.variants {
        for base_member in &base.members {
            let Some(own) = variant.members.iter().find(|m| m.name == base_member.name) else {
                errors.push(format!(
                    "Variant '{}' of variation '{name}' is not assignable to '{}': member '{}' is missing.",
                    variant.name, base.name, base_member.name
                ));
                continue;
            };
            let expected = resolver.try_resolve(&base_member.type_name);
            let actual = resolver.try_resolve(&own.type_name);
            if let (Some(expected), Some(actual)) = (expected, actual) {
                if expected != actual {
                    errors.push(format!(
                        "Variant '{}' of variation '{name}' is not assignable to '{}': member '{}' is '{}', expected '{}'.",
                        variant.name,
                        base.name,
                        base_member.name,
                        actual.name(),
                        expected.name()
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_builder() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        builder
            .add_aggregate(AggregateDecl {
                path: "/Order".into(),
                type_name: None,
                members: vec![
                    ScalarDecl::new("id", "identifier").key(),
                    ScalarDecl::new("total", "numeric"),
                ],
            })
            .add_children(ChildrenDecl {
                name: "Lines".into(),
                owner: "/Order".into(),
                type_name: Some("Line".into()),
                members: vec![ScalarDecl::new("qty", "numeric")],
            });
        builder
    }

    #[test]
    fn test_builds_graph_with_typed_edges() {
        let schema = order_builder().try_build(&MemberTypeResolver::default()).unwrap();
        assert_eq!(schema.graph().node_count(), 2);

        let lines = schema.node(&AggregatePath::parse("/Order/Lines")).unwrap();
        assert!(lines.is_repeated());
        assert_eq!(lines.item().type_name, "Line");
        assert_eq!(lines.parent().unwrap().path().to_string(), "/Order");

        let order = lines.parent().unwrap();
        let total = &order.item().scalars[1];
        assert!(total.nullable);
        assert!(!order.item().scalars[0].nullable);
    }

    #[test]
    fn test_collects_every_problem() {
        let mut builder = order_builder();
        builder
            .add_child(ChildDecl {
                name: "Delivery".into(),
                owner: "Order".into(),
                ..Default::default()
            })
            .add_children(ChildrenDecl {
                name: "Notes".into(),
                owner: "/Order".into(),
                members: vec![ScalarDecl::new("body", "no-such-type")],
                ..Default::default()
            })
            .add_reference(ReferenceDecl {
                name: "customer".into(),
                owner: "/Order".into(),
                target: "/Customer".into(),
                ..Default::default()
            });

        let errors = builder.try_build(&MemberTypeResolver::default()).unwrap_err();
        assert!(errors.contains("must start with '/'"));
        assert!(errors.contains("Type name 'no-such-type' of 'body'"));
        assert!(errors.contains("node '/Customer', which does not exist"));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_duplicate_paths_reported() {
        let mut builder = order_builder();
        builder.add_children(ChildrenDecl {
            name: "Lines".into(),
            owner: "/Order".into(),
            ..Default::default()
        });
        let errors = builder.try_build(&MemberTypeResolver::default()).unwrap_err();
        assert!(errors.contains("Aggregate path duplicates: /Order/Lines"));
    }

    #[test]
    fn test_variation_rules() {
        let mut builder = order_builder();
        builder.add_variation(VariationDecl {
            name: "Payment".into(),
            owner: "/Order".into(),
            is_key: true,
            base: Some(VariationBase {
                name: "PaymentBase".into(),
                is_abstract: false,
                members: vec![ScalarDecl::new("amount", "numeric")],
            }),
            variants: vec![
                VariantDecl {
                    name: "Card".into(),
                    tag: 1,
                    members: vec![ScalarDecl::new("amount", "word")],
                    ..Default::default()
                },
                VariantDecl {
                    name: "Cash".into(),
                    tag: 1,
                    ..Default::default()
                },
            ],
        });

        let errors = builder.try_build(&MemberTypeResolver::default()).unwrap_err();
        assert!(errors.contains("cannot be a key"));
        assert!(errors.contains("uses tag 1 more than once"));
        assert!(errors.contains("is not abstract"));
        assert!(errors.contains("member 'amount' is 'word', expected 'decimal'"));
        assert!(errors.contains("Variant 'Cash' of variation 'Payment' is not assignable"));
    }

    #[test]
    fn test_variation_without_variants() {
        let mut builder = order_builder();
        builder.add_variation(VariationDecl {
            name: "Payment".into(),
            owner: "/Order".into(),
            ..Default::default()
        });
        let errors = builder.try_build(&MemberTypeResolver::default()).unwrap_err();
        assert!(errors.contains("has no variants"));
    }

    #[test]
    fn test_enums_registered_before_resolution() {
        let mut builder = order_builder();
        builder
            .add_enum(EnumDecl {
                name: "Status".into(),
                items: vec![("Open".into(), None), ("Closed".into(), None)],
            })
            .add_child(ChildDecl {
                name: "State".into(),
                owner: "/Order".into(),
                members: vec![ScalarDecl::new("status", "Status")],
                ..Default::default()
            });
        let schema = builder.try_build(&MemberTypeResolver::default()).unwrap();
        let state = schema.node(&AggregatePath::parse("/Order/State")).unwrap();
        assert_eq!(state.item().scalars[0].kind.name(), "Status");
    }
}
