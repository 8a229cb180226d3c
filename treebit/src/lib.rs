//! treebit materializes adjacency-list trees out of flat query results.
//!
//! A self referencing one-to-many query returns one row per node, every row carrying the node's own id and
//! its parent's id under `alias_column` keys. treebit extracts `(id, parent_id)` relation maps from those rows,
//! coercing raw driver values the way entities were hydrated, and then decorates already materialized
//! entities in place: either with children collections down from a root (bounded by a depth budget) or with
//! parent references up to the topmost fetched ancestor.
//!
//! Cyclic data is detected and either rejected or truncated according to [`CyclePolicy`], and every walk is
//! bounded by [`TreeSettings::max_depth`].
//!

pub mod logger;
pub mod error;
pub mod value;
pub mod metadata;
pub mod entity;
pub mod coercion;
pub mod relation_map;
pub mod settings;
pub mod tree;
pub mod materializer;

pub use coercion::{IdentityCoercion, TypedCoercion, ValueCoercion};
pub use entity::{Entity, Field};
pub use error::{Result, TreeError};
pub use materializer::{FindTreesOptions, TreeMaterializer};
pub use metadata::{ColumnMetadata, ColumnType, RelationMetadata, TreeMetadata};
pub use relation_map::{create_relation_maps, flat_column_key, rows_from_json, rows_from_json_value, RawRow, RelationMap};
pub use settings::{CyclePolicy, TreeSettings};
pub use tree::{build_children_entity_tree, build_parent_entity_tree, Depth, TreeOptions};
pub use value::Value;
