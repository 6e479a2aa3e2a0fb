//! UI-facing projections of an aggregate.
//!
//! Each aggregate has three: the search condition form, the search result
//! row and the detail instance. All of them are plain ordered field lists for
//! renderers to consume.

use serde::Serialize;

use crate::ir::{AggregateNode, AggregatePath, FilterStyle, ScalarKind};

use super::members::AggregateMember;

/// Shape of one projection field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// A single scalar value.
    Value { scalar: ScalarKind, nullable: bool },
    /// A `from`/`to` pair.
    Range { scalar: ScalarKind },
    /// One item of an enumeration.
    Select { enumeration: String },
    /// Substring filter.
    Text,
    /// Boolean switch with a default.
    Toggle,
    /// Nested object shaped like the projection of `path`.
    Nested { path: AggregatePath },
    /// List of nested objects shaped like the projection of `path`.
    NestedList { path: AggregatePath },
    /// Key plus display text of an instance of `target`.
    KeyAndText { target: AggregatePath },
    /// Text derived for display only.
    DisplayText,
    /// Tag of the selected variant.
    Discriminator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewField {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ViewField {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub name: String,
    pub fields: Vec<ViewField>,
}

impl Projection {
    pub fn field(&self, name: &str) -> Option<&ViewField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The three projections of one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateViews {
    pub path: AggregatePath,
    pub search_condition: Projection,
    pub search_result: Projection,
    pub detail: Projection,
}

pub(crate) fn derive_views(node: &AggregateNode<'_>) -> AggregateViews {
    let table = &node.item().type_name;
    AggregateViews {
        path: node.path().clone(),
        search_condition: Projection {
            name: format!("{table}SearchCondition"),
            fields: condition_fields(node),
        },
        search_result: Projection {
            name: format!("{table}SearchResult"),
            fields: result_fields(node),
        },
        detail: Projection {
            name: format!("{table}Instance"),
            fields: detail_fields(node),
        },
    }
}

/// Name of the search-condition toggle of one variant.
pub fn variant_toggle_name(variation: &str, variant: &AggregatePath) -> String {
    format!("{variation}_{}", variant.base_name())
}

/// Name of the detail field holding one variant's nested instance.
pub fn variant_detail_name(variation: &str, variant: &AggregatePath) -> String {
    format!("{variation}_{}", variant.base_name())
}

fn condition_fields(node: &AggregateNode<'_>) -> Vec<ViewField> {
    let mut fields = Vec::new();
    for member in AggregateMember::members_of(node) {
        match member {
            AggregateMember::Scalar(def) => {
                let kind = match (def.kind.filter_style(), &def.kind) {
                    (FilterStyle::Range, scalar) => FieldKind::Range {
                        scalar: scalar.clone(),
                    },
                    (FilterStyle::Select, ScalarKind::Enumeration(definition)) => FieldKind::Select {
                        enumeration: definition.name.clone(),
                    },
                    (FilterStyle::FreeText, _) => FieldKind::Text,
                    (FilterStyle::Select | FilterStyle::Exact, scalar) => FieldKind::Value {
                        scalar: scalar.clone(),
                        nullable: true,
                    },
                };
                fields.push(ViewField::new(&def.name, kind));
            }
            AggregateMember::Child(edge) => {
                fields.push(ViewField::new(
                    edge.relation_name(),
                    FieldKind::Nested {
                        path: edge.terminal().path().clone(),
                    },
                ));
            }
            AggregateMember::Children(_) => {}
            AggregateMember::Variation(group) => {
                for (_, edge) in &group.variants {
                    let name = variant_toggle_name(group.name, edge.terminal().path());
                    fields.push(ViewField::new(name, FieldKind::Toggle).with_default("true"));
                }
            }
            AggregateMember::Reference(edge) => {
                fields.push(ViewField::new(
                    edge.relation_name(),
                    FieldKind::KeyAndText {
                        target: edge.terminal().path().clone(),
                    },
                ));
            }
        }
    }
    fields
}

/// Child results are flattened into the owner with a `{child}_` prefix.
fn result_fields(node: &AggregateNode<'_>) -> Vec<ViewField> {
    let mut fields = Vec::new();
    for member in AggregateMember::members_of(node) {
        match member {
            AggregateMember::Scalar(def) => {
                fields.push(ViewField::new(
                    &def.name,
                    FieldKind::Value {
                        scalar: def.kind.clone(),
                        nullable: def.nullable,
                    },
                ));
            }
            AggregateMember::Child(edge) => {
                let prefix = edge.relation_name();
                for field in result_fields(&edge.terminal()) {
                    fields.push(ViewField {
                        name: format!("{prefix}_{}", field.name),
                        ..field
                    });
                }
            }
            AggregateMember::Children(_) => {}
            AggregateMember::Variation(group) => {
                fields.push(ViewField::new(group.name, FieldKind::DisplayText));
            }
            AggregateMember::Reference(edge) => {
                fields.push(ViewField::new(edge.relation_name(), FieldKind::DisplayText));
            }
        }
    }
    fields
}

fn detail_fields(node: &AggregateNode<'_>) -> Vec<ViewField> {
    let mut fields = Vec::new();
    for member in AggregateMember::members_of(node) {
        match member {
            AggregateMember::Scalar(def) => {
                fields.push(ViewField::new(
                    &def.name,
                    FieldKind::Value {
                        scalar: def.kind.clone(),
                        nullable: def.nullable,
                    },
                ));
            }
            AggregateMember::Child(edge) => {
                fields.push(ViewField::new(
                    edge.relation_name(),
                    FieldKind::Nested {
                        path: edge.terminal().path().clone(),
                    },
                ));
            }
            AggregateMember::Children(edge) => {
                fields.push(ViewField::new(
                    edge.relation_name(),
                    FieldKind::NestedList {
                        path: edge.terminal().path().clone(),
                    },
                ));
            }
            AggregateMember::Variation(group) => {
                fields.push(ViewField::new(group.name, FieldKind::Discriminator));
                for (_, edge) in &group.variants {
                    let path = edge.terminal().path().clone();
                    fields.push(ViewField::new(
                        variant_detail_name(group.name, &path),
                        FieldKind::Nested { path },
                    ));
                }
            }
            AggregateMember::Reference(edge) => {
                fields.push(ViewField::new(
                    edge.relation_name(),
                    FieldKind::KeyAndText {
                        target: edge.terminal().path().clone(),
                    },
                ));
            }
        }
    }
    fields
}
