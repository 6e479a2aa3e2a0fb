//! Mapping between detail instances and persisted rows.
//!
//! A detail instance is a JSON object shaped like the aggregate's detail
//! projection. Writing flattens it into one [`DbRecord`] per persisted entity
//! instance; reading rebuilds the object from a set of records, matching
//! children to their parent through the inherited key columns.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::diagnostic::CompilerError;
use crate::ir::{AggregateNode, AggregatePath, ScalarKind, ScalarMemberDef};
use crate::schema::AppSchema;

use super::db_entity::{ColumnRole, DbEntity};
use super::members::AggregateMember;
use super::views::variant_detail_name;

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbRecord {
    pub path: AggregatePath,
    pub table: String,
    pub values: Map<String, Value>,
}

impl DbRecord {
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }
}

/// Flattens the detail instance of the root aggregate at `root` into rows,
/// the root row first and every nested row after its parent.
pub fn to_db_rows(
    schema: &AppSchema,
    root: &AggregatePath,
    instance: &Value,
) -> Result<Vec<DbRecord>, CompilerError> {
    let node = root_node(schema, root)?;
    let object = expect_object(instance, &root.to_string())?;
    let mut writer = Writer {
        schema,
        rows: Vec::new(),
    };
    writer.write(&node, &object, None, None, root.base_name())?;
    Ok(writer.rows)
}

/// Rebuilds the detail instance of the root aggregate at `root` from rows.
/// Exactly one row must belong to the root entity.
pub fn from_db_rows(
    schema: &AppSchema,
    root: &AggregatePath,
    rows: &[DbRecord],
) -> Result<Value, CompilerError> {
    let node = root_node(schema, root)?;
    let mut roots = rows.iter().filter(|r| &r.path == root);
    let (Some(row), None) = (roots.next(), roots.next()) else {
        return Err(CompilerError::mapping(
            root.to_string(),
            "exactly one row of the root entity is required",
        ));
    };
    let reader = Reader { schema, rows };
    reader.read(&node, row).map(Value::Object)
}

fn root_node<'s>(schema: &'s AppSchema, root: &AggregatePath) -> Result<AggregateNode<'s>, CompilerError> {
    let node = schema
        .node(root)
        .ok_or_else(|| CompilerError::UnknownAggregate {
            path: root.to_string(),
        })?;
    if !node.is_root() {
        return Err(CompilerError::mapping(
            root.to_string(),
            "only root aggregates can be mapped",
        ));
    }
    Ok(node)
}

fn entity_of<'s>(schema: &'s AppSchema, path: &AggregatePath) -> Result<&'s DbEntity, CompilerError> {
    schema
        .db_entity(path)
        .ok_or_else(|| CompilerError::UnknownAggregate {
            path: path.to_string(),
        })
}

fn expect_object(value: &Value, field: &str) -> Result<Map<String, Value>, CompilerError> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(CompilerError::mapping(
            field,
            format!("expected an object, found {other}"),
        )),
    }
}

struct Writer<'s> {
    schema: &'s AppSchema,
    rows: Vec<DbRecord>,
}

impl<'s> Writer<'s> {
    fn write(
        &mut self,
        node: &AggregateNode<'s>,
        instance: &Map<String, Value>,
        parent: Option<(&DbEntity, &DbRecord)>,
        sequence: Option<usize>,
        field: &str,
    ) -> Result<(), CompilerError> {
        let entity = entity_of(self.schema, node.path())?;
        let mut values = Map::new();

        if let Some((parent_entity, parent_row)) = parent {
            for column in entity.pk_columns.iter().filter(|c| c.inherited) {
                let value = parent_entity
                    .column_by_origin(&column.origin)
                    .map(|p| parent_row.get(&p.name).clone())
                    .unwrap_or(Value::Null);
                values.insert(column.name.clone(), value);
            }
        }
        if let Some(column) = entity.sequence_column() {
            values.insert(column.name.clone(), Value::from(sequence.unwrap_or(0)));
        }

        let members = AggregateMember::members_of(node);
        for member in &members {
            match member {
                AggregateMember::Scalar(def) => {
                    let path = format!("{field}.{}", def.name);
                    let value = instance.get(&def.name).unwrap_or(&Value::Null);
                    values.insert(def.name.clone(), check_scalar(def, value, &path)?);
                }
                AggregateMember::Variation(group) => {
                    let value = instance.get(group.name).cloned().unwrap_or(Value::Null);
                    if !value.is_null() {
                        let tag = value.as_i64();
                        if !group.variants.iter().any(|(t, _)| Some(*t) == tag) {
                            return Err(CompilerError::mapping(
                                format!("{field}.{}", group.name),
                                format!("{value} is not a declared variant tag"),
                            ));
                        }
                    }
                    values.insert(group.name.to_string(), value);
                }
                AggregateMember::Reference(edge) => {
                    let name = edge.relation_name();
                    let key = match instance.get(name) {
                        None | Some(Value::Null) => None,
                        Some(Value::Object(pair)) => pair.get("key").cloned(),
                        Some(other) => {
                            return Err(CompilerError::mapping(
                                format!("{field}.{name}"),
                                format!("expected a key/text pair, found {other}"),
                            ))
                        }
                    };
                    for column in entity.all_columns().filter(|c| !c.inherited) {
                        let ColumnRole::ForeignKey { reference, target_column, .. } = &column.role else {
                            continue;
                        };
                        if reference != name {
                            continue;
                        }
                        let value = key
                            .as_ref()
                            .and_then(|k| k.get(target_column))
                            .cloned()
                            .unwrap_or(Value::Null);
                        if value.is_null() && !column.nullable {
                            return Err(CompilerError::mapping(
                                format!("{field}.{name}"),
                                format!("key column '{target_column}' is required"),
                            ));
                        }
                        values.insert(column.name.clone(), value);
                    }
                }
                AggregateMember::Child(_) | AggregateMember::Children(_) => {}
            }
        }

        let record = DbRecord {
            path: node.path().clone(),
            table: entity.table.clone(),
            values,
        };
        self.rows.push(record.clone());
        let parent = Some((entity, &record));

        for member in members {
            match member {
                AggregateMember::Child(edge) => {
                    let name = edge.relation_name();
                    let path = format!("{field}.{name}");
                    let nested = expect_object(instance.get(name).unwrap_or(&Value::Null), &path)?;
                    self.write(&edge.terminal(), &nested, parent, None, &path)?;
                }
                AggregateMember::Children(edge) => {
                    let name = edge.relation_name();
                    let items = match instance.get(name) {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(items)) => items.clone(),
                        Some(other) => {
                            return Err(CompilerError::mapping(
                                format!("{field}.{name}"),
                                format!("expected a list, found {other}"),
                            ))
                        }
                    };
                    let target = edge.terminal();
                    for (index, item) in items.iter().enumerate() {
                        let path = format!("{field}.{name}[{index}]");
                        let nested = expect_object(item, &path)?;
                        self.write(&target, &nested, parent, Some(index), &path)?;
                    }
                }
                AggregateMember::Variation(group) => {
                    for (_, edge) in &group.variants {
                        let target = edge.terminal();
                        let name = variant_detail_name(group.name, target.path());
                        let path = format!("{field}.{name}");
                        let nested =
                            expect_object(instance.get(&name).unwrap_or(&Value::Null), &path)?;
                        self.write(&target, &nested, parent, None, &path)?;
                    }
                }
                AggregateMember::Scalar(_) | AggregateMember::Reference(_) => {}
            }
        }
        Ok(())
    }
}

/// Checks a scalar value against its declared kind.
fn check_scalar(def: &ScalarMemberDef, value: &Value, field: &str) -> Result<Value, CompilerError> {
    if value.is_null() {
        if def.nullable {
            return Ok(Value::Null);
        }
        return Err(CompilerError::mapping(field, "a value is required"));
    }
    let ok = match &def.kind {
        ScalarKind::Identifier
        | ScalarKind::Word
        | ScalarKind::Sentence
        | ScalarKind::Date
        | ScalarKind::DateTime => value.is_string(),
        ScalarKind::Integer => value.is_i64() || value.is_u64(),
        ScalarKind::Decimal => value.is_number(),
        ScalarKind::Boolean => value.is_boolean(),
        ScalarKind::Enumeration(definition) => value
            .as_i64()
            .is_some_and(|v| definition.name_of(v).is_some()),
    };
    if ok {
        Ok(value.clone())
    } else {
        Err(CompilerError::mapping(
            field,
            format!("{value} is not a valid {}", def.kind.name()),
        ))
    }
}

struct Reader<'s> {
    schema: &'s AppSchema,
    rows: &'s [DbRecord],
}

impl<'s> Reader<'s> {
    fn read(&self, node: &AggregateNode<'s>, row: &DbRecord) -> Result<Map<String, Value>, CompilerError> {
        let entity = entity_of(self.schema, node.path())?;
        let mut instance = Map::new();

        for member in AggregateMember::members_of(node) {
            match member {
                AggregateMember::Scalar(def) => {
                    instance.insert(def.name.clone(), row.get(&def.name).clone());
                }
                AggregateMember::Child(edge) => {
                    let target = edge.terminal();
                    let value = match self.owned_rows(entity, row, target.path())?.first() {
                        Some(child) => Value::Object(self.read(&target, child)?),
                        None => Value::Null,
                    };
                    instance.insert(edge.relation_name().to_string(), value);
                }
                AggregateMember::Children(edge) => {
                    let target = edge.terminal();
                    let mut items = Vec::new();
                    for child in self.owned_rows(entity, row, target.path())? {
                        items.push(Value::Object(self.read(&target, child)?));
                    }
                    instance.insert(edge.relation_name().to_string(), Value::Array(items));
                }
                AggregateMember::Variation(group) => {
                    instance.insert(group.name.to_string(), row.get(group.name).clone());
                    for (_, edge) in &group.variants {
                        let target = edge.terminal();
                        let value = match self.owned_rows(entity, row, target.path())?.first() {
                            Some(child) => Value::Object(self.read(&target, child)?),
                            None => Value::Null,
                        };
                        instance.insert(variant_detail_name(group.name, target.path()), value);
                    }
                }
                AggregateMember::Reference(edge) => {
                    let name = edge.relation_name();
                    let mut key = Map::new();
                    for column in entity.all_columns().filter(|c| !c.inherited) {
                        if let ColumnRole::ForeignKey { reference, target_column, .. } = &column.role {
                            if reference == name {
                                key.insert(target_column.clone(), row.get(&column.name).clone());
                            }
                        }
                    }
                    let value = if key.values().all(Value::is_null) {
                        Value::Null
                    } else {
                        let mut pair = Map::new();
                        pair.insert("key".to_string(), Value::Object(key));
                        pair.insert("text".to_string(), Value::Null);
                        Value::Object(pair)
                    };
                    instance.insert(name.to_string(), value);
                }
            }
        }
        Ok(instance)
    }

    /// Rows of the entity at `path` whose inherited keys match `parent_row`,
    /// ordered by their sequence column when there is one.
    fn owned_rows(
        &self,
        parent: &DbEntity,
        parent_row: &DbRecord,
        path: &AggregatePath,
    ) -> Result<Vec<&'s DbRecord>, CompilerError> {
        let entity = entity_of(self.schema, path)?;
        let mut matching: Vec<&'s DbRecord> = self
            .rows
            .iter()
            .filter(|r| &r.path == path)
            .filter(|r| {
                entity.pk_columns.iter().filter(|c| c.inherited).all(|column| {
                    parent
                        .column_by_origin(&column.origin)
                        .is_some_and(|p| parent_row.get(&p.name) == r.get(&column.name))
                })
            })
            .collect();
        if let Some(sequence) = entity.sequence_column() {
            matching.sort_by_key(|r| r.get(&sequence.name).as_i64().unwrap_or(i64::MAX));
        }
        Ok(matching)
    }
}
