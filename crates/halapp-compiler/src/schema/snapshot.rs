//! Serializable dump of a compiled schema.
//!
//! Renderers that live outside this crate read the snapshot instead of
//! linking against the graph types.

use std::path::Path;

use serde::Serialize;

use crate::diagnostic::CompilerError;
use crate::ir::{AggregatePath, Relation, ScalarMemberDef};
use crate::model::{AggregateViews, DbEntity};

use super::AppSchema;

/// The snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize)]
pub struct ModelSnapshot {
    pub version: String,

    #[serde(rename = "compilerVersion")]
    pub compiler_version: String,

    /// Every aggregate, parents before children.
    pub aggregates: Vec<AggregateSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateSnapshot {
    pub path: AggregatePath,

    #[serde(rename = "typeName")]
    pub type_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<AggregatePath>,

    pub scalars: Vec<ScalarMemberDef>,

    pub relations: Vec<RelationSnapshot>,

    pub entity: DbEntity,

    pub views: AggregateViews,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationSnapshot {
    pub name: String,
    pub target: AggregatePath,
    #[serde(flatten)]
    pub relation: Relation,
}

impl ModelSnapshot {
    pub(crate) fn from_schema(schema: &AppSchema) -> Self {
        let mut aggregates = Vec::new();
        for node in schema.aggregates() {
            let path = node.path();
            let (Some(entity), Some(views)) = (schema.db_entity(path), schema.views(path)) else {
                continue;
            };
            let relations = node
                .outgoing()
                .map(|edge| RelationSnapshot {
                    name: edge.relation_name().to_string(),
                    target: edge.terminal().path().clone(),
                    relation: *edge.attributes(),
                })
                .collect();
            aggregates.push(AggregateSnapshot {
                path: path.clone(),
                type_name: node.item().type_name.clone(),
                parent: node.parent().map(|p| p.path().clone()),
                scalars: node.item().scalars.clone(),
                relations,
                entity: entity.clone(),
                views: views.clone(),
            });
        }

        Self {
            version: SNAPSHOT_VERSION.to_string(),
            compiler_version: env!("CARGO_PKG_VERSION").to_string(),
            aggregates,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the snapshot as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CompilerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CompilerError::WriteError {
                    path: parent.to_path_buf(),
                    message: e.to_string(),
                })?;
            }
        }

        let content = self.to_json().map_err(|e| CompilerError::WriteError {
            path: path.to_path_buf(),
            message: format!("Failed to serialize model: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| CompilerError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(())
    }
}
