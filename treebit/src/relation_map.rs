use crate::coercion::ValueCoercion;
use crate::error::{Result, TreeError};
use crate::metadata::TreeMetadata;
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;

/// One flat result row, keyed by `alias_column`.
pub type RawRow = HashMap<String, Value>;

/// Identifier of a node and of its parent, as extracted from one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelationMap {
    pub id: Value,
    pub parent_id: Value,
}

impl RelationMap {
    pub fn new(id: impl Into<Value>, parent_id: impl Into<Value>) -> Self {
        RelationMap { id: id.into(), parent_id: parent_id.into() }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_null()
    }
}

/// Key under which the query layer flattens `column` of the entity selected as `alias`.
pub fn flat_column_key(alias: &str, column_name: &str) -> String {
    format!("{}_{}", alias, column_name)
}

/// Extracts `(id, parent_id)` pairs from flat rows, in row order.
///
/// Both values are coerced by the column owning them: the referenced column for `id`,
/// the join column for `parent_id`. A row lacking either column yields `Null` there.
pub fn create_relation_maps<C>(metadata: &TreeMetadata, alias: &str, raw_rows: &[RawRow], coercion: &C) -> Result<Vec<RelationMap>>
where
    C: ValueCoercion + ?Sized,
{
    let join_column = metadata.join_column()?;
    let referenced_column = metadata.referenced_column()?;
    let id_key = flat_column_key(alias, referenced_column.resolved_database_name());
    let parent_id_key = flat_column_key(alias, join_column.resolved_database_name());

    let relation_maps = raw_rows
        .iter()
        .map(|row| {
            let id = row.get(&id_key).unwrap_or(&Value::Null);
            let parent_id = row.get(&parent_id_key).unwrap_or(&Value::Null);
            RelationMap {
                id: coercion.prepare_hydrated_value(id, referenced_column),
                parent_id: coercion.prepare_hydrated_value(parent_id, join_column),
            }
        })
        .collect::<Vec<_>>();
    crate::debug!("{} relation maps extracted for {} as {}", relation_maps.len(), metadata.entity_name, alias);
    Ok(relation_maps)
}

/// Parses a JSON array of flat row objects.
pub fn rows_from_json(json: &str) -> Result<Vec<RawRow>> {
    let parsed: serde_json::Value = serde_json::from_str(json)?;
    rows_from_json_value(parsed)
}

pub fn rows_from_json_value(json: serde_json::Value) -> Result<Vec<RawRow>> {
    let serde_json::Value::Array(items) = json else {
        return Err(TreeError::InvalidRows("expected an array of row objects".to_string()));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(object) => Ok(object.into_iter().map(|(key, value)| (key, Value::from(value))).collect()),
            other => Err(TreeError::InvalidRows(format!("row {} is not an object: {}", index, other))),
        })
        .collect()
}
