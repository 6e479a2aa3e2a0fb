//! Persisted row shape derived from each aggregate.
//!
//! Key columns are assembled in a fixed order: the parent's full key list,
//! then the aggregate's own key members. A repeated aggregate without any own
//! key gets a synthesized sequence column in front of its own keys.
//!
//! Inherited key columns keep track of where they were introduced
//! ([`DbColumn::origin`]) so a descendant table can always be joined back to
//! any ancestor by matching origins.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::diagnostic::ErrorList;
use crate::ir::{
    AggregateEdge, AggregateGraph, AggregateNode, AggregatePath, Relation, ScalarMemberDef, SqlType,
};

use super::members::AggregateMember;

/// Name of the synthesized key column of repeated aggregates.
pub const SEQUENCE_COLUMN: &str = "seq";

/// Where a column was first introduced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnOrigin {
    pub table: String,
    pub column: String,
}

/// What a column stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    /// A scalar member.
    Value,
    /// Synthesized position within the parent's collection.
    Sequence,
    /// Tag of the selected variant.
    Discriminator,
    /// One key column of a referenced aggregate.
    ForeignKey {
        reference: String,
        target: AggregatePath,
        target_column: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub origin: ColumnOrigin,
    #[serde(flatten)]
    pub role: ColumnRole,
    /// Copied from an ancestor's key.
    pub inherited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationKind {
    Parent,
    Child,
    Children,
    Variant { tag: i64 },
    Reference,
}

/// A relation between two persisted entities, without a column of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationLink {
    pub name: String,
    pub target: AggregatePath,
    pub target_table: String,
    #[serde(flatten)]
    pub kind: NavigationKind,
    pub nullable: bool,
}

/// Derived persisted shape of one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbEntity {
    pub path: AggregatePath,
    pub table: String,
    pub parent: Option<AggregatePath>,
    pub pk_columns: Vec<DbColumn>,
    pub columns: Vec<DbColumn>,
    pub navigations: Vec<NavigationLink>,
}

impl DbEntity {
    /// Key columns followed by the other columns.
    pub fn all_columns(&self) -> impl Iterator<Item = &DbColumn> {
        self.pk_columns.iter().chain(self.columns.iter())
    }

    pub fn column(&self, name: &str) -> Option<&DbColumn> {
        self.all_columns().find(|c| c.name == name)
    }

    /// The column of this entity introduced at `origin`, own or inherited.
    pub fn column_by_origin(&self, origin: &ColumnOrigin) -> Option<&DbColumn> {
        self.all_columns().find(|c| &c.origin == origin)
    }

    /// The synthesized sequence column, if this entity has one of its own.
    pub fn sequence_column(&self) -> Option<&DbColumn> {
        self.pk_columns
            .iter()
            .find(|c| !c.inherited && c.role == ColumnRole::Sequence)
    }

    /// True if `other` lives strictly inside this entity's aggregate.
    pub fn is_ancestor_of(&self, other: &DbEntity) -> bool {
        other.path.is_descendant_of(&self.path)
    }
}

/// Converts a table name such as `OrderLine` to `order_line`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for c in name.chars() {
        if c.is_uppercase() {
            if previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
        previous = Some(c);
    }
    out
}

/// Derives the entity of every aggregate, parents before children.
pub(crate) fn derive_entities(graph: &AggregateGraph) -> Result<Vec<DbEntity>, ErrorList> {
    let mut nodes: Vec<AggregateNode<'_>> = graph.nodes().collect();
    nodes.sort_by_key(|node| node.path().depth());

    let mut deriver = EntityDeriver::default();
    deriver.check_table_names(&nodes);

    let mut entities = Vec::with_capacity(nodes.len());
    for node in &nodes {
        if let Some(entity) = deriver.entity(node) {
            debug!(
                path = %entity.path,
                table = %entity.table,
                keys = entity.pk_columns.len(),
                columns = entity.columns.len(),
                "derived persisted entity"
            );
            entities.push(entity);
        }
    }
    deriver.errors.into_result(entities)
}

#[derive(Default)]
struct EntityDeriver<'g> {
    keys: HashMap<&'g AggregatePath, Vec<DbColumn>>,
    resolving: HashSet<&'g AggregatePath>,
    errors: ErrorList,
}

impl<'g> EntityDeriver<'g> {
    fn check_table_names(&mut self, nodes: &[AggregateNode<'g>]) {
        let mut owners: HashMap<&'g str, &'g AggregatePath> = HashMap::new();
        for node in nodes {
            let table = node.item().type_name.as_str();
            if let Some(first) = owners.insert(table, node.path()) {
                self.errors.push(format!(
                    "Table name '{table}' is used by both '{first}' and '{}'.",
                    node.path()
                ));
            }
        }
    }

    fn entity(&mut self, node: &AggregateNode<'g>) -> Option<DbEntity> {
        let table = node.item().type_name.clone();
        let pk_columns = self.primary_key(node)?;
        // nested rows are keyed by their root's key columns
        if pk_columns.is_empty() && node.is_root() && !node.descendants().is_empty() {
            self.errors.push(format!(
                "Aggregate '{}' has no key but owns nested aggregates, which need one to be identified.",
                node.path()
            ));
        }

        let mut columns = Vec::new();
        let mut navigations = Vec::new();

        if let Some(parent) = node.parent() {
            navigations.push(NavigationLink {
                name: parent.item().type_name.clone(),
                target: parent.path().clone(),
                target_table: parent.item().type_name.clone(),
                kind: NavigationKind::Parent,
                nullable: false,
            });
        }

        for member in AggregateMember::members_of(node) {
            match member {
                AggregateMember::Scalar(def) => {
                    if !def.is_key {
                        columns.push(scalar_column(&table, def));
                    }
                }
                AggregateMember::Child(edge) => {
                    let target = edge.terminal();
                    navigations.push(NavigationLink {
                        name: edge.relation_name().to_string(),
                        target: target.path().clone(),
                        target_table: target.item().type_name.clone(),
                        kind: NavigationKind::Child,
                        nullable: false,
                    });
                }
                AggregateMember::Children(edge) => {
                    let target = edge.terminal();
                    navigations.push(NavigationLink {
                        name: edge.relation_name().to_string(),
                        target: target.path().clone(),
                        target_table: target.item().type_name.clone(),
                        kind: NavigationKind::Children,
                        nullable: false,
                    });
                }
                AggregateMember::Variation(group) => {
                    columns.push(DbColumn {
                        name: group.name.to_string(),
                        sql_type: SqlType::Integer,
                        nullable: true,
                        origin: ColumnOrigin {
                            table: table.clone(),
                            column: group.name.to_string(),
                        },
                        role: ColumnRole::Discriminator,
                        inherited: false,
                    });
                    for (tag, edge) in &group.variants {
                        let target = edge.terminal();
                        let target_table = target.item().type_name.clone();
                        navigations.push(NavigationLink {
                            name: format!("{}__{}", group.name, target_table),
                            target: target.path().clone(),
                            target_table,
                            kind: NavigationKind::Variant { tag: *tag },
                            nullable: true,
                        });
                    }
                }
                AggregateMember::Reference(edge) => {
                    let is_key = member_is_key(&edge);
                    let target = edge.terminal();
                    if !is_key {
                        let target_keys = self.primary_key(&target)?;
                        columns.extend(foreign_key_columns(
                            &table,
                            edge.relation_name(),
                            target.path(),
                            &target_keys,
                            true,
                        ));
                    }
                    navigations.push(NavigationLink {
                        name: edge.relation_name().to_string(),
                        target: target.path().clone(),
                        target_table: target.item().type_name.clone(),
                        kind: NavigationKind::Reference,
                        nullable: !is_key,
                    });
                }
            }
        }

        let mut names = HashSet::new();
        for column in pk_columns.iter().chain(columns.iter()) {
            if !names.insert(column.name.as_str()) {
                self.errors.push(format!(
                    "Table '{table}' has more than one column named '{}'.",
                    column.name
                ));
            }
        }

        Some(DbEntity {
            path: node.path().clone(),
            table,
            parent: node.parent().map(|p| p.path().clone()),
            pk_columns,
            columns,
            navigations,
        })
    }

    /// Memoized key derivation; key references may point anywhere in the
    /// graph, so a cycle through them is reported instead of followed.
    fn primary_key(&mut self, node: &AggregateNode<'g>) -> Option<Vec<DbColumn>> {
        let path = node.path();
        if let Some(keys) = self.keys.get(path) {
            return Some(keys.clone());
        }
        if !self.resolving.insert(path) {
            self.errors.push(format!(
                "Primary key of '{path}' depends on itself through key references."
            ));
            return None;
        }
        let keys = self.compute_primary_key(node);
        self.resolving.remove(path);
        if let Some(keys) = &keys {
            self.keys.insert(path, keys.clone());
        }
        keys
    }

    fn compute_primary_key(&mut self, node: &AggregateNode<'g>) -> Option<Vec<DbColumn>> {
        let table = node.item().type_name.as_str();
        let mut own = Vec::new();
        for member in AggregateMember::members_of(node) {
            match member {
                AggregateMember::Scalar(def) if def.is_key => {
                    own.push(scalar_column(table, def));
                }
                AggregateMember::Reference(edge) if member_is_key(&edge) => {
                    let target = edge.terminal();
                    let target_keys = self.primary_key(&target)?;
                    own.extend(foreign_key_columns(
                        table,
                        edge.relation_name(),
                        target.path(),
                        &target_keys,
                        false,
                    ));
                }
                _ => {}
            }
        }

        if node.is_repeated() && own.is_empty() {
            own.insert(
                0,
                DbColumn {
                    name: SEQUENCE_COLUMN.to_string(),
                    sql_type: SqlType::Integer,
                    nullable: false,
                    origin: ColumnOrigin {
                        table: table.to_string(),
                        column: SEQUENCE_COLUMN.to_string(),
                    },
                    role: ColumnRole::Sequence,
                    inherited: false,
                },
            );
        }

        let Some(parent) = node.parent() else {
            return Some(own);
        };
        let parent_table = parent.item().type_name.as_str();
        let parent_keys = self.primary_key(&parent)?;
        let mut keys: Vec<DbColumn> = parent_keys
            .iter()
            .map(|column| inherit(column, parent_table))
            .collect();
        keys.extend(own);
        Some(keys)
    }
}

fn member_is_key(edge: &AggregateEdge<'_>) -> bool {
    matches!(
        edge.attributes(),
        Relation::Reference { is_primary_key_link: true, .. }
    )
}

fn scalar_column(table: &str, def: &ScalarMemberDef) -> DbColumn {
    DbColumn {
        name: def.name.clone(),
        sql_type: def.kind.sql_type(),
        nullable: def.nullable,
        origin: ColumnOrigin {
            table: table.to_string(),
            column: def.name.clone(),
        },
        role: ColumnRole::Value,
        inherited: false,
    }
}

fn foreign_key_columns(
    table: &str,
    reference: &str,
    target: &AggregatePath,
    target_keys: &[DbColumn],
    nullable: bool,
) -> Vec<DbColumn> {
    target_keys
        .iter()
        .map(|key| {
            let name = format!("{reference}_{}", key.name);
            DbColumn {
                name: name.clone(),
                sql_type: key.sql_type,
                nullable,
                origin: ColumnOrigin {
                    table: table.to_string(),
                    column: name,
                },
                role: ColumnRole::ForeignKey {
                    reference: reference.to_string(),
                    target: target.clone(),
                    target_column: key.name.clone(),
                },
                inherited: false,
            }
        })
        .collect()
}

/// Copies a parent key column into a child. Columns the parent introduced
/// itself are prefixed with its table name; inherited ones keep their name.
fn inherit(column: &DbColumn, parent_table: &str) -> DbColumn {
    let name = if column.inherited {
        column.name.clone()
    } else {
        format!("{}_{}", to_snake_case(parent_table), column.name)
    };
    DbColumn {
        name,
        nullable: false,
        inherited: true,
        ..column.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MemberTypeResolver;
    use crate::schema::{
        AggregateDecl, ChildDecl, ChildrenDecl, ReferenceDecl, ScalarDecl, SchemaBuilder, VariantDecl,
        VariationDecl,
    };

    fn names(columns: &[DbColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn three_levels() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        builder
            .add_aggregate(AggregateDecl {
                path: "/Order".into(),
                members: vec![
                    ScalarDecl::new("id", "identifier").key(),
                    ScalarDecl::new("total", "numeric"),
                ],
                ..Default::default()
            })
            .add_children(ChildrenDecl {
                name: "Lines".into(),
                owner: "/Order".into(),
                type_name: Some("Line".into()),
                members: vec![ScalarDecl::new("qty", "numeric")],
            })
            .add_children(ChildrenDecl {
                name: "Notes".into(),
                owner: "/Order/Lines".into(),
                type_name: Some("Note".into()),
                members: vec![ScalarDecl::new("body", "sentence")],
            });
        builder
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("Order"), "order");
        assert_eq!(to_snake_case("OrderLine"), "order_line");
        assert_eq!(to_snake_case("Line2Note"), "line2_note");
    }

    #[test]
    fn test_parent_keys_precede_sequence_key() {
        let schema = three_levels().try_build(&MemberTypeResolver::default()).unwrap();

        let order = schema.db_entity(&AggregatePath::parse("/Order")).unwrap();
        assert_eq!(names(&order.pk_columns), vec!["id"]);
        assert_eq!(names(&order.columns), vec!["total"]);
        assert!(order.sequence_column().is_none());

        let line = schema.db_entity(&AggregatePath::parse("/Order/Lines")).unwrap();
        assert_eq!(line.table, "Line");
        assert_eq!(names(&line.pk_columns), vec!["order_id", "seq"]);
        assert!(line.pk_columns[0].inherited);
        assert_eq!(line.pk_columns[0].origin.table, "Order");
        assert_eq!(line.pk_columns[1].role, ColumnRole::Sequence);

        let note = schema.db_entity(&AggregatePath::parse("/Order/Lines/Notes")).unwrap();
        assert_eq!(names(&note.pk_columns), vec!["order_id", "line_seq", "seq"]);
        assert_eq!(note.navigations[0].kind, NavigationKind::Parent);
        assert_eq!(note.navigations[0].name, "Line");
    }

    #[test]
    fn test_explicit_key_suppresses_sequence() {
        let mut builder = three_levels();
        builder.add_children(ChildrenDecl {
            name: "Tags".into(),
            owner: "/Order".into(),
            type_name: None,
            members: vec![ScalarDecl::new("label", "word").key()],
        });
        let schema = builder.try_build(&MemberTypeResolver::default()).unwrap();
        let tags = schema.db_entity(&AggregatePath::parse("/Order/Tags")).unwrap();
        assert_eq!(names(&tags.pk_columns), vec!["order_id", "label"]);
        assert!(tags.sequence_column().is_none());
    }

    #[test]
    fn test_variation_columns_and_navigations() {
        let mut builder = three_levels();
        builder.add_variation(VariationDecl {
            name: "Payment".into(),
            owner: "/Order".into(),
            variants: vec![
                VariantDecl { name: "Card".into(), tag: 1, ..Default::default() },
                VariantDecl { name: "Cash".into(), tag: 2, ..Default::default() },
            ],
            ..Default::default()
        });
        let schema = builder.try_build(&MemberTypeResolver::default()).unwrap();
        let order = schema.db_entity(&AggregatePath::parse("/Order")).unwrap();

        let discriminator = order.column("Payment").unwrap();
        assert_eq!(discriminator.role, ColumnRole::Discriminator);
        assert!(discriminator.nullable);
        assert_eq!(discriminator.sql_type, SqlType::Integer);

        let variants: Vec<_> = order
            .navigations
            .iter()
            .filter(|n| matches!(n.kind, NavigationKind::Variant { .. }))
            .map(|n| (n.name.as_str(), n.nullable))
            .collect();
        assert_eq!(variants, vec![("Payment__Card", true), ("Payment__Cash", true)]);

        let card = schema.db_entity(&AggregatePath::parse("/Order/Card")).unwrap();
        assert_eq!(names(&card.pk_columns), vec!["order_id"]);
    }

    #[test]
    fn test_reference_columns() {
        let mut builder = three_levels();
        builder
            .add_aggregate(AggregateDecl {
                path: "/Customer".into(),
                members: vec![
                    ScalarDecl::new("code", "identifier").key(),
                    ScalarDecl::new("branch", "integer").key(),
                ],
                ..Default::default()
            })
            .add_reference(ReferenceDecl {
                name: "customer".into(),
                owner: "/Order".into(),
                target: "/Customer".into(),
                ..Default::default()
            });
        let schema = builder.try_build(&MemberTypeResolver::default()).unwrap();
        let order = schema.db_entity(&AggregatePath::parse("/Order")).unwrap();
        assert_eq!(
            names(&order.columns),
            vec!["total", "customer_code", "customer_branch"]
        );
        assert!(order.columns[1].nullable);
        assert!(matches!(
            &order.columns[2].role,
            ColumnRole::ForeignKey { target_column, .. } if target_column == "branch"
        ));
    }

    #[test]
    fn test_key_reference_cycle_rejected() {
        let mut builder = SchemaBuilder::new();
        builder
            .add_aggregate(AggregateDecl { path: "/A".into(), ..Default::default() })
            .add_aggregate(AggregateDecl { path: "/B".into(), ..Default::default() })
            .add_reference(ReferenceDecl {
                name: "b".into(),
                owner: "/A".into(),
                target: "/B".into(),
                is_key: true,
                ..Default::default()
            })
            .add_reference(ReferenceDecl {
                name: "a".into(),
                owner: "/B".into(),
                target: "/A".into(),
                is_key: true,
                ..Default::default()
            });
        let errors = builder.try_build(&MemberTypeResolver::default()).err().unwrap();
        assert!(errors.contains("depends on itself through key references"));
    }

    #[test]
    fn test_duplicate_table_names_rejected() {
        let mut builder = three_levels();
        builder.add_aggregate(AggregateDecl {
            path: "/Line".into(),
            members: vec![ScalarDecl::new("id", "identifier").key()],
            ..Default::default()
        });
        let errors = builder.try_build(&MemberTypeResolver::default()).err().unwrap();
        assert!(errors.contains("Table name 'Line' is used by both"));
    }

    #[test]
    fn test_keyless_root_cannot_own_nested_aggregates() {
        let mut builder = SchemaBuilder::new();
        builder
            .add_aggregate(AggregateDecl {
                path: "/Log".into(),
                members: vec![ScalarDecl::new("msg", "word")],
                ..Default::default()
            })
            .add_child(ChildDecl {
                name: "Delivery".into(),
                owner: "/Log".into(),
                members: vec![ScalarDecl::new("city", "word")],
                ..Default::default()
            });
        let errors = builder.try_build(&MemberTypeResolver::default()).err().unwrap();
        assert!(errors.contains("Aggregate '/Log' has no key but owns nested aggregates"));

        // a keyless aggregate on its own is still fine
        let mut flat = SchemaBuilder::new();
        flat.add_aggregate(AggregateDecl {
            path: "/Log".into(),
            members: vec![ScalarDecl::new("msg", "word")],
            ..Default::default()
        });
        assert!(flat.try_build(&MemberTypeResolver::default()).is_ok());
    }
}
