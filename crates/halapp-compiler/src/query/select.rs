//! SELECT statement assembly.
//!
//! A [`SelectStatement`] reads one FROM table and may LEFT JOIN tables that
//! live inside it (its descendants in the persistence model), each at most
//! once. Joins are always keyed on the FROM table's primary key. Clauses are
//! added through callbacks that can look up table aliases and register
//! positional parameters; values are never inlined into the SQL text.

use serde::Serialize;
use serde_json::Value;

use crate::diagnostic::QueryError;
use crate::model::DbEntity;

/// A positional parameter registered while building clauses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlParam {
    /// Placeholder token as it appears in the SQL text, e.g. `@p_0`.
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

/// Builder of one SELECT statement.
#[derive(Debug, Default)]
pub struct SelectStatement<'a> {
    tables: Vec<&'a DbEntity>,
    select: Vec<String>,
    wheres: Vec<String>,
    params: Vec<SqlParam>,
    order_by: Vec<(usize, String, Direction)>,
}

/// Handed to clause callbacks.
pub struct ClauseArg<'s, 'a> {
    statement: &'s mut SelectStatement<'a>,
}

impl<'s, 'a> ClauseArg<'s, 'a> {
    /// Alias of a table registered through FROM or LEFT JOIN.
    pub fn alias(&self, table: &DbEntity) -> Result<String, QueryError> {
        self.statement.alias(table)
    }

    /// Registers a parameter and returns its placeholder.
    pub fn new_param(&mut self, value: impl Into<Value>) -> String {
        let name = format!("@p_{}", self.statement.params.len());
        self.statement.params.push(SqlParam {
            name: name.clone(),
            value: value.into(),
        });
        name
    }
}

impl<'a> SelectStatement<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias of `table`: `t0` for FROM, `t1`.. for joins in join order.
    pub fn alias(&self, table: &DbEntity) -> Result<String, QueryError> {
        self.position(table)
            .map(|index| format!("t{index}"))
            .ok_or_else(|| QueryError::UnknownTable {
                table: table.table.clone(),
            })
    }

    fn position(&self, table: &DbEntity) -> Option<usize> {
        self.tables.iter().position(|t| t.path == table.path)
    }

    pub fn from(&mut self, table: &'a DbEntity) -> Result<&mut Self, QueryError> {
        if let Some(current) = self.tables.first() {
            return Err(QueryError::FromAlreadySet {
                current: current.table.clone(),
                requested: table.table.clone(),
            });
        }
        self.tables.push(table);
        Ok(self)
    }

    pub fn left_join(&mut self, table: &'a DbEntity) -> Result<&mut Self, QueryError> {
        let Some(from) = self.tables.first() else {
            return Err(QueryError::FromNotSet);
        };
        if from.path == table.path {
            return Err(QueryError::JoinOntoFrom {
                table: table.table.clone(),
            });
        }
        if self.position(table).is_some() {
            return Err(QueryError::AlreadyJoined {
                table: table.table.clone(),
            });
        }
        if !from.is_ancestor_of(table) {
            return Err(QueryError::NotADescendant {
                table: table.table.clone(),
                from: from.table.clone(),
            });
        }
        self.tables.push(table);
        Ok(self)
    }

    /// Adds one SELECT expression.
    pub fn select<F>(&mut self, clause: F) -> Result<&mut Self, QueryError>
    where
        F: FnOnce(&mut ClauseArg<'_, 'a>) -> Result<String, QueryError>,
    {
        let text = self.run_clause(clause)?;
        self.select.push(text);
        Ok(self)
    }

    /// Adds one predicate; predicates are AND-ed.
    pub fn filter<F>(&mut self, clause: F) -> Result<&mut Self, QueryError>
    where
        F: FnOnce(&mut ClauseArg<'_, 'a>) -> Result<String, QueryError>,
    {
        let text = self.run_clause(clause)?;
        self.wheres.push(text);
        Ok(self)
    }

    /// A failing callback leaves no parameters behind.
    fn run_clause<F>(&mut self, clause: F) -> Result<String, QueryError>
    where
        F: FnOnce(&mut ClauseArg<'_, 'a>) -> Result<String, QueryError>,
    {
        let params_before = self.params.len();
        let mut arg = ClauseArg { statement: self };
        let result = clause(&mut arg);
        if result.is_err() {
            self.params.truncate(params_before);
        }
        result
    }

    pub fn order_by(&mut self, table: &DbEntity, column: &str) -> Result<&mut Self, QueryError> {
        self.push_order(table, column, Direction::Asc)
    }

    pub fn order_by_descending(&mut self, table: &DbEntity, column: &str) -> Result<&mut Self, QueryError> {
        self.push_order(table, column, Direction::Desc)
    }

    fn push_order(&mut self, table: &DbEntity, column: &str, direction: Direction) -> Result<&mut Self, QueryError> {
        let index = self.position(table).ok_or_else(|| QueryError::UnknownTable {
            table: table.table.clone(),
        })?;
        if table.column(column).is_none() {
            return Err(QueryError::UnknownColumn {
                table: table.table.clone(),
                column: column.to_string(),
            });
        }
        self.order_by.push((index, column.to_string(), direction));
        Ok(self)
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn has_filters(&self) -> bool {
        !self.wheres.is_empty()
    }

    /// Converts parameters into backend-specific objects.
    pub fn bind<P, F>(&self, mut factory: F) -> Vec<P>
    where
        F: FnMut(&str, &Value) -> P,
    {
        self.params
            .iter()
            .map(|param| factory(&param.name, &param.value))
            .collect()
    }

    /// Renders the statement on a single line.
    pub fn to_sql_string(&self) -> Result<String, QueryError> {
        let Some(from) = self.tables.first() else {
            return Err(QueryError::FromNotSet);
        };
        if self.select.is_empty() {
            return Err(QueryError::SelectNotSet);
        }

        let mut parts = vec![
            format!("SELECT {}", self.select.join(", ")),
            format!("FROM {} AS t0", from.table),
        ];

        for (index, table) in self.tables.iter().enumerate().skip(1) {
            let on: Vec<String> = from
                .pk_columns
                .iter()
                .filter_map(|key| {
                    table
                        .column_by_origin(&key.origin)
                        .map(|joined| format!("t{index}.{} = t0.{}", joined.name, key.name))
                })
                .collect();
            parts.push(format!(
                "LEFT JOIN {} AS t{index} ON ({})",
                table.table,
                on.join(" AND ")
            ));
        }

        if !self.wheres.is_empty() {
            let wheres: Vec<String> = self.wheres.iter().map(|w| format!("({w})")).collect();
            parts.push(format!("WHERE {}", wheres.join(" AND ")));
        }

        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(index, column, direction)| {
                    let direction = match direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    format!("t{index}.{column} {direction}")
                })
                .collect();
            parts.push(format!("ORDER BY {}", order.join(", ")));
        }

        Ok(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AggregatePath, MemberTypeResolver};
    use crate::schema::{AggregateDecl, AppSchema, ChildrenDecl, ScalarDecl, SchemaBuilder};

    fn schema() -> AppSchema {
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
                members: vec![
                    ScalarDecl::new("id", "sequence").key(),
                    ScalarDecl::new("qty", "numeric"),
                ],
            })
            .add_aggregate(AggregateDecl {
                path: "/Customer".into(),
                members: vec![ScalarDecl::new("id", "identifier").key()],
                ..Default::default()
            });
        builder.try_build(&MemberTypeResolver::default()).unwrap()
    }

    fn entity<'s>(schema: &'s AppSchema, path: &str) -> &'s DbEntity {
        schema.db_entity(&AggregatePath::parse(path)).unwrap()
    }

    #[test]
    fn test_renders_join_on_inherited_key() {
        let schema = schema();
        let order = entity(&schema, "/Order");
        let line = entity(&schema, "/Order/Lines");

        let mut statement = SelectStatement::new();
        statement.from(order).unwrap().left_join(line).unwrap();
        statement
            .select(|arg| Ok(format!("{}.total AS total", arg.alias(order)?)))
            .unwrap()
            .select(|arg| Ok(format!("{}.qty AS Lines_qty", arg.alias(line)?)))
            .unwrap()
            .filter(|arg| {
                let p = arg.new_param(10);
                Ok(format!("{}.total >= {p}", arg.alias(order)?))
            })
            .unwrap()
            .order_by(order, "id")
            .unwrap();

        assert_eq!(
            statement.to_sql_string().unwrap(),
            "SELECT t0.total AS total, t1.qty AS Lines_qty FROM Order AS t0 \
             LEFT JOIN Line AS t1 ON (t1.order_id = t0.id) \
             WHERE (t0.total >= @p_0) ORDER BY t0.id ASC"
        );
        assert_eq!(statement.params()[0].name, "@p_0");
    }

    #[test]
    fn test_order_by_mixes_directions() {
        let schema = schema();
        let order = entity(&schema, "/Order");
        let line = entity(&schema, "/Order/Lines");

        let mut statement = SelectStatement::new();
        statement.from(order).unwrap().left_join(line).unwrap();
        statement
            .select(|arg| Ok(format!("{}.id AS id", arg.alias(order)?)))
            .unwrap()
            .order_by_descending(order, "total")
            .unwrap()
            .order_by(line, "id")
            .unwrap();

        assert!(statement
            .to_sql_string()
            .unwrap()
            .ends_with("ORDER BY t0.total DESC, t1.id ASC"));
        assert!(matches!(
            statement.order_by_descending(line, "nope").unwrap_err(),
            QueryError::UnknownColumn { .. }
        ));
    }

    #[test]
    fn test_left_join_contract() {
        let schema = schema();
        let order = entity(&schema, "/Order");
        let line = entity(&schema, "/Order/Lines");
        let customer = entity(&schema, "/Customer");

        let mut statement = SelectStatement::new();
        assert_eq!(statement.left_join(line).unwrap_err(), QueryError::FromNotSet);

        statement.from(order).unwrap();
        assert!(matches!(
            statement.from(line).unwrap_err(),
            QueryError::FromAlreadySet { .. }
        ));
        assert!(matches!(
            statement.left_join(order).unwrap_err(),
            QueryError::JoinOntoFrom { .. }
        ));
        assert!(matches!(
            statement.left_join(customer).unwrap_err(),
            QueryError::NotADescendant { .. }
        ));
        statement.left_join(line).unwrap();
        assert!(matches!(
            statement.left_join(line).unwrap_err(),
            QueryError::AlreadyJoined { .. }
        ));

        // a child cannot reach back to its parent
        let mut reverse = SelectStatement::new();
        reverse.from(line).unwrap();
        assert!(matches!(
            reverse.left_join(order).unwrap_err(),
            QueryError::NotADescendant { .. }
        ));
    }

    #[test]
    fn test_render_requires_from_and_select() {
        let schema = schema();
        let order = entity(&schema, "/Order");

        let mut statement = SelectStatement::new();
        assert_eq!(statement.to_sql_string().unwrap_err(), QueryError::FromNotSet);
        statement.from(order).unwrap();
        assert_eq!(statement.to_sql_string().unwrap_err(), QueryError::SelectNotSet);
    }

    #[test]
    fn test_unknown_alias_rolls_back_params() {
        let schema = schema();
        let order = entity(&schema, "/Order");
        let customer = entity(&schema, "/Customer");

        let mut statement = SelectStatement::new();
        statement.from(order).unwrap();
        let err = statement
            .filter(|arg| {
                let p = arg.new_param("x");
                Ok(format!("{}.id = {p}", arg.alias(customer)?))
            })
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownTable { .. }));
        assert!(statement.params().is_empty());
        assert!(!statement.has_filters());
        assert!(statement.order_by(order, "nope").is_err());
    }

    #[test]
    fn test_bind_uses_factory() {
        let schema = schema();
        let order = entity(&schema, "/Order");
        let mut statement = SelectStatement::new();
        statement.from(order).unwrap();
        statement
            .filter(|arg| {
                let a = arg.new_param(1);
                let b = arg.new_param("two");
                Ok(format!("{a} < {b}"))
            })
            .unwrap();
        let bound: Vec<String> = statement.bind(|name, value| format!("{name}={value}"));
        assert_eq!(bound, vec!["@p_0=1", "@p_1=\"two\""]);
    }
}
