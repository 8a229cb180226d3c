use crate::entity::Entity;
use crate::error::{Result, TreeError};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Declared storage type of a column, consulted by typed coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    #[default]
    Text,
    Uuid,
    Timestamp,
}

/// Describes one physical column and the entity property it hydrates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub property_name: String,
    /// Name derived by the naming strategy.
    pub database_name: String,
    /// Name given explicitly in the entity definition, wins over `database_name`.
    #[serde(default)]
    pub given_database_name: Option<String>,
    /// Column on the parent row this column points to, only set on join columns.
    #[serde(default)]
    pub referenced_column: Option<Box<ColumnMetadata>>,
    #[serde(default)]
    pub column_type: ColumnType,
}

impl ColumnMetadata {
    pub fn new(property_name: &str, database_name: &str, column_type: ColumnType) -> Self {
        ColumnMetadata {
            property_name: property_name.to_string(),
            database_name: database_name.to_string(),
            given_database_name: None,
            referenced_column: None,
            column_type,
        }
    }

    pub fn given_name(mut self, name: &str) -> Self {
        self.given_database_name = Some(name.to_string());
        self
    }

    pub fn references(mut self, column: ColumnMetadata) -> Self {
        self.referenced_column = Some(Box::new(column));
        self
    }

    /// Physical name used in flat rows: the given name when present and non-empty,
    /// otherwise the derived one.
    pub fn resolved_database_name(&self) -> &str {
        match self.given_database_name.as_deref() {
            Some(given) if !given.is_empty() => given,
            _ => &self.database_name,
        }
    }

    /// Reads this column's property off a materialized entity, `Null` when the entity lacks it.
    pub fn get_entity_value(&self, entity: &Entity) -> Value {
        entity.value(&self.property_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    pub property_name: String,
    #[serde(default)]
    pub join_columns: Vec<ColumnMetadata>,
}

/// Self referencing relations and keys of one tree entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMetadata {
    pub entity_name: String,
    pub primary_columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub tree_parent_relation: Option<RelationMetadata>,
    #[serde(default)]
    pub tree_children_relation: Option<RelationMetadata>,
}

impl TreeMetadata {
    pub fn builder(entity_name: &str) -> TreeMetadataBuilder {
        TreeMetadataBuilder {
            metadata: TreeMetadata {
                entity_name: entity_name.to_string(),
                primary_columns: Vec::new(),
                columns: Vec::new(),
                tree_parent_relation: None,
                tree_children_relation: None,
            },
        }
    }

    pub fn tree_parent_relation(&self) -> Result<&RelationMetadata> {
        self.tree_parent_relation
            .as_ref()
            .ok_or_else(|| TreeError::MissingParentRelation(self.entity_name.clone()))
    }

    pub fn tree_children_relation(&self) -> Result<&RelationMetadata> {
        self.tree_children_relation
            .as_ref()
            .ok_or_else(|| TreeError::MissingChildrenRelation(self.entity_name.clone()))
    }

    /// First join column of the parent relation, the only one a self reference uses.
    pub fn join_column(&self) -> Result<&ColumnMetadata> {
        self.tree_parent_relation()?
            .join_columns
            .first()
            .ok_or_else(|| TreeError::MissingJoinColumn(self.entity_name.clone()))
    }

    /// Column identifying a node: the join column's explicit target, else the first primary column.
    pub fn referenced_column(&self) -> Result<&ColumnMetadata> {
        match self.join_column()?.referenced_column.as_deref() {
            Some(referenced) => Ok(referenced),
            None => self
                .primary_columns
                .first()
                .ok_or_else(|| TreeError::MissingPrimaryColumn(self.entity_name.clone())),
        }
    }

    /// Every column a flat row carries for this entity, primary columns first.
    pub fn all_columns(&self) -> Vec<&ColumnMetadata> {
        let join_columns = self
            .tree_parent_relation
            .iter()
            .flat_map(|relation| relation.join_columns.iter());
        self.primary_columns.iter().chain(self.columns.iter()).chain(join_columns).collect()
    }

    /// Fails unless both tree relations and the node identifier can be resolved.
    pub fn validate_tree(&self) -> Result<()> {
        self.tree_children_relation()?;
        self.referenced_column()?;
        Ok(())
    }
}

pub struct TreeMetadataBuilder {
    metadata: TreeMetadata,
}

impl TreeMetadataBuilder {
    pub fn primary_column(mut self, column: ColumnMetadata) -> Self {
        self.metadata.primary_columns.push(column);
        self
    }

    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.metadata.columns.push(column);
        self
    }

    pub fn tree_parent(mut self, property_name: &str, join_column: ColumnMetadata) -> Self {
        self.metadata.tree_parent_relation = Some(RelationMetadata {
            property_name: property_name.to_string(),
            join_columns: vec![join_column],
        });
        self
    }

    pub fn tree_children(mut self, property_name: &str) -> Self {
        self.metadata.tree_children_relation = Some(RelationMetadata {
            property_name: property_name.to_string(),
            join_columns: Vec::new(),
        });
        self
    }

    pub fn build(self) -> TreeMetadata {
        self.metadata
    }
}
