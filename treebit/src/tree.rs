use crate::entity::Entity;
use crate::error::{Result, TreeError};
use crate::metadata::{ColumnMetadata, TreeMetadata};
use crate::relation_map::RelationMap;
use crate::settings::{CyclePolicy, TreeSettings};
use crate::value::Value;
use std::collections::HashSet;

/// How many descendant levels to materialize below a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    Limited(usize),
    #[default]
    Unlimited,
}

impl Depth {
    fn is_exhausted(&self) -> bool {
        matches!(self, Depth::Limited(0))
    }

    fn below(&self) -> Depth {
        match self {
            Depth::Limited(n) => Depth::Limited(n.saturating_sub(1)),
            Depth::Unlimited => Depth::Unlimited,
        }
    }
}

impl From<Option<usize>> for Depth {
    fn from(depth: Option<usize>) -> Self {
        depth.map(Depth::Limited).unwrap_or(Depth::Unlimited)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Descendant budget, not consulted when walking ancestors.
    pub depth: Depth,
    pub max_depth: usize,
    pub cycle_policy: CyclePolicy,
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptions::from_settings(&TreeSettings::default(), None)
    }
}

impl TreeOptions {
    pub fn with_depth(depth: usize) -> Self {
        TreeOptions { depth: Depth::Limited(depth), ..TreeOptions::default() }
    }

    /// Requested depth wins, then the configured default, then unlimited.
    pub fn from_settings(settings: &TreeSettings, depth: Option<usize>) -> Self {
        TreeOptions {
            depth: depth.or(settings.default_depth).into(),
            max_depth: settings.max_depth,
            cycle_policy: settings.cycle_policy,
        }
    }

    pub fn cycle_policy(mut self, cycle_policy: CyclePolicy) -> Self {
        self.cycle_policy = cycle_policy;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Entities whose relation map points at `parent_id`, in `entities` order. `Null` ids have no children.
pub(crate) fn direct_children(referenced_column: &ColumnMetadata, parent_id: &Value, entities: &[Entity], relation_maps: &[RelationMap]) -> Vec<Entity> {
    if parent_id.is_null() {
        return Vec::new();
    }
    let child_ids: HashSet<&Value> = relation_maps.iter().filter(|map| map.parent_id == *parent_id).map(|map| &map.id).collect();
    if child_ids.is_empty() {
        return Vec::new();
    }
    entities.iter().filter(|entity| child_ids.contains(&referenced_column.get_entity_value(entity))).cloned().collect()
}

/// Parent of the node identified by `id`: first relation map for `id`, then the entity carrying its parent id.
pub(crate) fn direct_parent(referenced_column: &ColumnMetadata, id: &Value, entities: &[Entity], relation_maps: &[RelationMap]) -> Option<Entity> {
    if id.is_null() {
        return None;
    }
    let relation_map = relation_maps.iter().find(|map| map.id == *id)?;
    if relation_map.parent_id.is_null() {
        return None;
    }
    entities.iter().find(|entity| referenced_column.get_entity_value(entity) == relation_map.parent_id).cloned()
}

/// Either an error or `Ok(())` telling the caller to skip the offending edge.
pub(crate) fn on_cycle(metadata: &TreeMetadata, id: &Value, cycle_policy: CyclePolicy) -> Result<()> {
    match cycle_policy {
        CyclePolicy::Error => Err(TreeError::CycleDetected { entity: metadata.entity_name.clone(), id: id.clone() }),
        CyclePolicy::Truncate => {
            crate::warn!("Cycle in {} tree at id {}, edge dropped", metadata.entity_name, id);
            Ok(())
        }
    }
}

struct Pending {
    entity: Entity,
    depth: Depth,
    // ids from the root down to the parent of `entity`
    path: Vec<Value>,
}

/// Attaches the children collection to `entity` and, recursively, to every descendant within `options.depth`.
///
/// Children are looked up through `relation_maps` and taken from `entities`, keeping the order of `entities`.
/// A node at exhausted depth gets an empty collection. Nodes are processed depth first in child order,
/// so a node reachable twice ends up with the collection computed on its last visit.
///
/// Collections are written only once the whole walk succeeded, an error leaves every entity untouched.
pub fn build_children_entity_tree(metadata: &TreeMetadata, entity: &Entity, entities: &[Entity], relation_maps: &[RelationMap], options: &TreeOptions) -> Result<()> {
    let children_property = metadata.tree_children_relation()?.property_name.as_str();
    let referenced_column = metadata.referenced_column()?;

    let mut writes: Vec<(Entity, Vec<Entity>)> = Vec::new();
    let mut stack = vec![Pending { entity: entity.clone(), depth: options.depth, path: Vec::new() }];
    while let Some(Pending { entity, depth, mut path }) = stack.pop() {
        if depth.is_exhausted() {
            writes.push((entity, Vec::new()));
            continue;
        }
        let id = referenced_column.get_entity_value(&entity);
        path.push(id.clone());

        let mut children = Vec::new();
        for child in direct_children(referenced_column, &id, entities, relation_maps) {
            let child_id = referenced_column.get_entity_value(&child);
            if path.contains(&child_id) {
                on_cycle(metadata, &child_id, options.cycle_policy)?;
            } else {
                children.push(child);
            }
        }
        if !children.is_empty() && path.len() > options.max_depth {
            return Err(TreeError::DepthLimitExceeded { limit: options.max_depth });
        }

        crate::debug!("{} {} gets {} children at level {}", metadata.entity_name, id, children.len(), path.len() - 1);
        for child in children.iter().rev() {
            stack.push(Pending { entity: child.clone(), depth: depth.below(), path: path.clone() });
        }
        writes.push((entity, children));
    }
    for (entity, children) in writes {
        entity.set_children(children_property, children);
    }
    Ok(())
}

/// Attaches the parent reference to `entity` and then to each ancestor in turn, until the chain leaves
/// the fetched `entities` or reaches a root. The last ancestor found keeps its parent property unset.
/// Like the descendant builder, nothing is written when the walk fails.
pub fn build_parent_entity_tree(metadata: &TreeMetadata, entity: &Entity, entities: &[Entity], relation_maps: &[RelationMap], options: &TreeOptions) -> Result<()> {
    let parent_property = metadata.tree_parent_relation()?.property_name.as_str();
    let referenced_column = metadata.referenced_column()?;

    let mut writes: Vec<(Entity, Entity)> = Vec::new();
    let mut current = entity.clone();
    let mut id = referenced_column.get_entity_value(&current);
    let mut visited = HashSet::from([id.clone()]);
    while let Some(parent) = direct_parent(referenced_column, &id, entities, relation_maps) {
        let parent_id = referenced_column.get_entity_value(&parent);
        if !visited.insert(parent_id.clone()) {
            on_cycle(metadata, &parent_id, options.cycle_policy)?;
            break;
        }
        if visited.len() - 1 > options.max_depth {
            return Err(TreeError::DepthLimitExceeded { limit: options.max_depth });
        }
        crate::debug!("{} {} gets parent {}", metadata.entity_name, id, parent_id);
        writes.push((current, parent.clone()));
        current = parent;
        id = parent_id;
    }
    for (entity, parent) in writes {
        entity.set_parent(parent_property, parent);
    }
    Ok(())
}
