//! Search queries assembled from a search-condition instance.
//!
//! The condition object is shaped like the aggregate's search-condition
//! projection. Every member contributes to the statement on its own:
//! scalars select a column and filter by their filter style, singular
//! children are LEFT JOINed and recurse, variations filter on the
//! discriminator and references filter on their stored key columns.

use serde_json::{Map, Value};
use tracing::debug;

use crate::diagnostic::CompilerError;
use crate::ir::{AggregateNode, AggregatePath, FilterStyle, ScalarKind, ScalarMemberDef, VariationGroup};
use crate::model::{variant_toggle_name, AggregateMember, ColumnOrigin, ColumnRole, DbEntity};
use crate::schema::AppSchema;

use super::select::SelectStatement;

/// A search statement over one root aggregate.
#[derive(Debug)]
pub struct SearchQuery<'s> {
    pub statement: SelectStatement<'s>,
    /// Result column names in SELECT order.
    pub columns: Vec<String>,
}

impl<'s> SearchQuery<'s> {
    /// Builds the search statement of the aggregate at `root`.
    ///
    /// `condition` may be `null` (no filtering) or an object; members absent
    /// from it or set to `null` do not filter.
    pub fn build(
        schema: &'s AppSchema,
        root: &AggregatePath,
        condition: &Value,
    ) -> Result<Self, CompilerError> {
        let node = schema
            .node(root)
            .ok_or_else(|| CompilerError::UnknownAggregate {
                path: root.to_string(),
            })?;
        let entity = entity_of(schema, node.path())?;

        let field = node.item().type_name.clone();
        let condition = as_object(condition, &field)?;

        let mut builder = Builder {
            schema,
            statement: SelectStatement::new(),
            columns: Vec::new(),
        };
        builder.statement.from(entity)?;
        builder.contribute(&node, entity, condition, "", &field)?;
        for key in &entity.pk_columns {
            builder.statement.order_by(entity, &key.name)?;
        }

        debug!(
            root = %root,
            columns = builder.columns.len(),
            params = builder.statement.params().len(),
            "built search query"
        );

        Ok(Self {
            statement: builder.statement,
            columns: builder.columns,
        })
    }

    pub fn to_sql_string(&self) -> Result<String, CompilerError> {
        Ok(self.statement.to_sql_string()?)
    }
}

struct Builder<'s> {
    schema: &'s AppSchema,
    statement: SelectStatement<'s>,
    columns: Vec<String>,
}

impl<'s> Builder<'s> {
    fn contribute(
        &mut self,
        node: &AggregateNode<'s>,
        entity: &'s DbEntity,
        condition: Option<&Map<String, Value>>,
        prefix: &str,
        field: &str,
    ) -> Result<(), CompilerError> {
        for member in AggregateMember::members_of(node) {
            let name = member.name();
            let value = condition.and_then(|c| c.get(name)).filter(|v| !v.is_null());
            let member_field = format!("{field}.{name}");

            match member {
                AggregateMember::Scalar(def) => {
                    self.scalar(entity, def, value, prefix, &member_field)?;
                }
                AggregateMember::Child(edge) => {
                    let child = edge.terminal();
                    let child_entity = entity_of(self.schema, child.path())?;
                    self.statement.left_join(child_entity)?;
                    let nested = match value {
                        Some(value) => as_object(value, &member_field)?,
                        None => None,
                    };
                    let child_prefix = format!("{}_", child.relation_path().join("_"));
                    self.contribute(&child, child_entity, nested, &child_prefix, &member_field)?;
                }
                AggregateMember::Children(_) => {}
                AggregateMember::Variation(group) => {
                    self.variation(entity, &group, condition, prefix, field)?;
                }
                AggregateMember::Reference(_) => {
                    if let Some(value) = value {
                        self.reference(entity, name, value, &member_field)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn scalar(
        &mut self,
        entity: &'s DbEntity,
        def: &ScalarMemberDef,
        value: Option<&Value>,
        prefix: &str,
        field: &str,
    ) -> Result<(), CompilerError> {
        let column = entity
            .column_by_origin(&ColumnOrigin {
                table: entity.table.clone(),
                column: def.name.clone(),
            })
            .map(|c| c.name.clone())
            .ok_or_else(|| CompilerError::mapping(field, "no column stores this member"))?;

        let result_name = format!("{prefix}{}", def.name);
        self.statement
            .select(|arg| Ok(format!("{}.{column} AS {result_name}", arg.alias(entity)?)))?;
        self.columns.push(result_name);

        let Some(value) = value else {
            return Ok(());
        };

        match def.kind.filter_style() {
            FilterStyle::Range => {
                let Some(range) = value.as_object() else {
                    return Err(bad_condition(field, "expected an object with 'from' and 'to'"));
                };
                if let Some(from) = range.get("from").filter(|v| !v.is_null()) {
                    self.statement.filter(|arg| {
                        let p = arg.new_param(from.clone());
                        Ok(format!("{}.{column} >= {p}", arg.alias(entity)?))
                    })?;
                }
                if let Some(to) = range.get("to").filter(|v| !v.is_null()) {
                    self.statement.filter(|arg| {
                        let p = arg.new_param(to.clone());
                        Ok(format!("{}.{column} <= {p}", arg.alias(entity)?))
                    })?;
                }
            }
            FilterStyle::Select => {
                let ScalarKind::Enumeration(definition) = &def.kind else {
                    return Ok(());
                };
                let item = match value {
                    Value::String(item) => definition.value_of(item),
                    other => other.as_i64().filter(|v| definition.name_of(*v).is_some()),
                };
                let Some(item) = item else {
                    return Err(bad_condition(
                        field,
                        format!("{value} is not an item of '{}'", definition.name),
                    ));
                };
                self.statement.filter(|arg| {
                    let p = arg.new_param(item);
                    Ok(format!("{}.{column} = {p}", arg.alias(entity)?))
                })?;
            }
            FilterStyle::FreeText => {
                let Some(text) = value.as_str() else {
                    return Err(bad_condition(field, "expected a string"));
                };
                let text = text.trim();
                if text.is_empty() {
                    return Ok(());
                }
                let pattern = format!("%{}%", escape_like(text));
                self.statement.filter(|arg| {
                    let p = arg.new_param(pattern);
                    Ok(format!(
                        "UPPER({}.{column}) LIKE UPPER({p}) ESCAPE '\\'",
                        arg.alias(entity)?
                    ))
                })?;
            }
            FilterStyle::Exact => {
                let Some(flag) = value.as_bool() else {
                    return Err(bad_condition(field, "expected a boolean"));
                };
                self.statement.filter(|arg| {
                    let p = arg.new_param(flag);
                    Ok(format!("{}.{column} = {p}", arg.alias(entity)?))
                })?;
            }
        }
        Ok(())
    }

    /// Selects the discriminator and filters on it when some, but not all,
    /// variants are toggled on. Toggles missing from the condition count as on.
    fn variation(
        &mut self,
        entity: &'s DbEntity,
        group: &VariationGroup<'s>,
        condition: Option<&Map<String, Value>>,
        prefix: &str,
        field: &str,
    ) -> Result<(), CompilerError> {
        let column = group.name;
        let result_name = format!("{prefix}{column}");
        self.statement
            .select(|arg| Ok(format!("{}.{column} AS {result_name}", arg.alias(entity)?)))?;
        self.columns.push(result_name);

        let mut selected = Vec::new();
        for (tag, edge) in &group.variants {
            let toggle = variant_toggle_name(group.name, edge.terminal().path());
            let on = match condition.and_then(|c| c.get(&toggle)) {
                None | Some(Value::Null) => true,
                Some(Value::Bool(on)) => *on,
                Some(_) => {
                    return Err(bad_condition(format!("{field}.{toggle}"), "expected a boolean"));
                }
            };
            if on {
                selected.push(*tag);
            }
        }

        if !selected.is_empty() && selected.len() < group.variants.len() {
            let tags: Vec<String> = selected.iter().map(i64::to_string).collect();
            self.statement.filter(|arg| {
                Ok(format!("{}.{column} IN ({})", arg.alias(entity)?, tags.join(", ")))
            })?;
        }
        Ok(())
    }

    /// Filters on the stored key columns; the referenced table is not joined.
    fn reference(
        &mut self,
        entity: &'s DbEntity,
        name: &str,
        value: &Value,
        field: &str,
    ) -> Result<(), CompilerError> {
        let Some(pair) = value.as_object() else {
            return Err(bad_condition(field, "expected an object with 'key' and 'text'"));
        };
        let key = match pair.get("key") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(key)) => key,
            Some(_) => return Err(bad_condition(field, "'key' must be an object")),
        };

        let columns = entity.all_columns().filter_map(|column| match &column.role {
            ColumnRole::ForeignKey {
                reference,
                target_column,
                ..
            } if !column.inherited && reference == name => Some((column.name.as_str(), target_column)),
            _ => None,
        });
        for (column, target_column) in columns {
            let Some(part) = key.get(target_column).filter(|v| !v.is_null()) else {
                continue;
            };
            self.statement.filter(|arg| {
                let p = arg.new_param(part.clone());
                Ok(format!("{}.{column} = {p}", arg.alias(entity)?))
            })?;
        }
        Ok(())
    }
}

fn entity_of<'s>(schema: &'s AppSchema, path: &AggregatePath) -> Result<&'s DbEntity, CompilerError> {
    schema
        .db_entity(path)
        .ok_or_else(|| CompilerError::UnknownAggregate {
            path: path.to_string(),
        })
}

fn as_object<'v>(value: &'v Value, field: &str) -> Result<Option<&'v Map<String, Value>>, CompilerError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(bad_condition(field, "expected an object")),
    }
}

fn bad_condition(field: impl Into<String>, message: impl Into<String>) -> CompilerError {
    CompilerError::BadCondition {
        field: field.into(),
        message: message.into(),
    }
}

/// Escapes LIKE wildcards with `\`.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
