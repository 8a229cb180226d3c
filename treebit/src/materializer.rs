use crate::coercion::ValueCoercion;
use crate::entity::Entity;
use crate::error::Result;
use crate::metadata::{ColumnMetadata, TreeMetadata};
use crate::relation_map::{create_relation_maps, flat_column_key, RawRow, RelationMap};
use crate::settings::TreeSettings;
use crate::tree::{build_children_entity_tree, build_parent_entity_tree, direct_children, direct_parent, on_cycle, TreeOptions};
use crate::value::Value;
use std::collections::{HashSet, VecDeque};

/// Options of a descendant query, `depth: None` defers to [`TreeSettings::default_depth`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindTreesOptions {
    pub depth: Option<usize>,
}

impl FindTreesOptions {
    pub fn depth(depth: usize) -> Self {
        FindTreesOptions { depth: Some(depth) }
    }
}

/// Runs the flat-rows-to-tree pipeline for one tree entity type.
///
/// Holds the metadata, the driver coercion and the settings so that every call extracts relation maps
/// and builds trees consistently. Metadata is validated once on construction.
pub struct TreeMaterializer<C: ValueCoercion> {
    metadata: TreeMetadata,
    coercion: C,
    settings: TreeSettings,
}

impl<C: ValueCoercion> TreeMaterializer<C> {
    pub fn new(metadata: TreeMetadata, coercion: C, settings: TreeSettings) -> Result<Self> {
        metadata.validate_tree()?;
        Ok(TreeMaterializer { metadata, coercion, settings })
    }

    pub fn metadata(&self) -> &TreeMetadata {
        &self.metadata
    }

    fn options(&self, options: FindTreesOptions) -> TreeOptions {
        TreeOptions::from_settings(&self.settings, options.depth)
    }

    fn referenced_column(&self) -> Result<&ColumnMetadata> {
        self.metadata.referenced_column()
    }

    pub fn relation_maps(&self, alias: &str, raw_rows: &[RawRow]) -> Result<Vec<RelationMap>> {
        create_relation_maps(&self.metadata, alias, raw_rows, &self.coercion)
    }

    /// Builds one entity per row from every declared column, coerced like the relation maps.
    /// Columns missing from a row are left unset on the entity.
    pub fn hydrate(&self, alias: &str, raw_rows: &[RawRow]) -> Vec<Entity> {
        let columns = self.metadata.all_columns();
        raw_rows
            .iter()
            .map(|row| {
                let entity = Entity::new(&self.metadata.entity_name);
                for column in columns.iter() {
                    if let Some(raw) = row.get(&flat_column_key(alias, column.resolved_database_name())) {
                        entity.set_value(&column.property_name, self.coercion.prepare_hydrated_value(raw, column));
                    }
                }
                entity
            })
            .collect()
    }

    /// Entities whose relation map has no parent, in `entities` order.
    pub fn find_roots(&self, entities: &[Entity], relation_maps: &[RelationMap]) -> Result<Vec<Entity>> {
        let referenced_column = self.referenced_column()?;
        let root_ids: HashSet<&Value> = relation_maps.iter().filter(|map| map.is_root()).map(|map| &map.id).collect();
        Ok(entities.iter().filter(|entity| root_ids.contains(&referenced_column.get_entity_value(entity))).cloned().collect())
    }

    /// Every root with its descendant tree attached.
    pub fn find_trees(&self, entities: &[Entity], relation_maps: &[RelationMap], options: FindTreesOptions) -> Result<Vec<Entity>> {
        let roots = self.find_roots(entities, relation_maps)?;
        let options = self.options(options);
        for root in roots.iter() {
            build_children_entity_tree(&self.metadata, root, entities, relation_maps, &options)?;
        }
        crate::debug!("{} {} trees built", roots.len(), self.metadata.entity_name);
        Ok(roots)
    }

    pub fn find_descendants_tree(&self, root: &Entity, entities: &[Entity], relation_maps: &[RelationMap], options: FindTreesOptions) -> Result<()> {
        build_children_entity_tree(&self.metadata, root, entities, relation_maps, &self.options(options))
    }

    pub fn find_ancestors_tree(&self, entity: &Entity, entities: &[Entity], relation_maps: &[RelationMap]) -> Result<()> {
        build_parent_entity_tree(&self.metadata, entity, entities, relation_maps, &self.options(FindTreesOptions::default()))
    }

    /// Root followed by its descendants, breadth first, without touching any entity.
    ///
    /// Only a child already on its own path from the root is a cycle. A node reached again through
    /// another parent or a duplicate row is listed once, at its first visit.
    pub fn find_descendants(&self, root: &Entity, entities: &[Entity], relation_maps: &[RelationMap]) -> Result<Vec<Entity>> {
        let referenced_column = self.referenced_column()?;
        let root_id = referenced_column.get_entity_value(root);
        let mut listed = HashSet::from([root_id.clone()]);
        let mut descendants = vec![root.clone()];
        let mut queue = VecDeque::from([(root.clone(), vec![root_id])]);
        while let Some((entity, path)) = queue.pop_front() {
            let id = referenced_column.get_entity_value(&entity);
            for child in direct_children(referenced_column, &id, entities, relation_maps) {
                let child_id = referenced_column.get_entity_value(&child);
                if path.contains(&child_id) {
                    on_cycle(&self.metadata, &child_id, self.settings.cycle_policy)?;
                    continue;
                }
                if !listed.insert(child_id.clone()) {
                    continue;
                }
                if path.len() > self.settings.max_depth {
                    return Err(crate::TreeError::DepthLimitExceeded { limit: self.settings.max_depth });
                }
                let mut child_path = path.clone();
                child_path.push(child_id);
                descendants.push(child.clone());
                queue.push_back((child, child_path));
            }
        }
        Ok(descendants)
    }

    /// Entity followed by its fetched ancestors up to the topmost one, without touching any entity.
    pub fn find_ancestors(&self, entity: &Entity, entities: &[Entity], relation_maps: &[RelationMap]) -> Result<Vec<Entity>> {
        let referenced_column = self.referenced_column()?;
        let mut id = referenced_column.get_entity_value(entity);
        let mut visited = HashSet::from([id.clone()]);
        let mut ancestors = vec![entity.clone()];
        while let Some(parent) = direct_parent(referenced_column, &id, entities, relation_maps) {
            let parent_id = referenced_column.get_entity_value(&parent);
            if !visited.insert(parent_id.clone()) {
                on_cycle(&self.metadata, &parent_id, self.settings.cycle_policy)?;
                break;
            }
            if ancestors.len() > self.settings.max_depth {
                return Err(crate::TreeError::DepthLimitExceeded { limit: self.settings.max_depth });
            }
            ancestors.push(parent);
            id = parent_id;
        }
        Ok(ancestors)
    }

    pub fn count_descendants(&self, root: &Entity, entities: &[Entity], relation_maps: &[RelationMap]) -> Result<usize> {
        Ok(self.find_descendants(root, entities, relation_maps)?.len() - 1)
    }

    pub fn count_ancestors(&self, entity: &Entity, entities: &[Entity], relation_maps: &[RelationMap]) -> Result<usize> {
        Ok(self.find_ancestors(entity, entities, relation_maps)?.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::TypedCoercion;
    use crate::metadata::ColumnType;
    use crate::relation_map::rows_from_json_value;
    use crate::settings::CyclePolicy;
    use crate::TreeError;
    use serde_json::json;

    fn metadata() -> TreeMetadata {
        TreeMetadata::builder("Category")
            .primary_column(ColumnMetadata::new("id", "id", ColumnType::Int))
            .column(ColumnMetadata::new("name", "name", ColumnType::Text))
            .tree_parent("parent", ColumnMetadata::new("parentId", "parentId", ColumnType::Int))
            .tree_children("children")
            .build()
    }

    fn materializer(settings: TreeSettings) -> TreeMaterializer<TypedCoercion> {
        TreeMaterializer::new(metadata(), TypedCoercion, settings).unwrap()
    }

    fn rows() -> Vec<RawRow> {
        rows_from_json_value(json!([
            {"c_id": "1", "c_name": "a", "c_parentId": null},
            {"c_id": "2", "c_name": "a1", "c_parentId": "1"},
            {"c_id": "3", "c_name": "a2", "c_parentId": "1"},
            {"c_id": "4", "c_name": "a11", "c_parentId": "2"},
            {"c_id": "5", "c_name": "b", "c_parentId": null},
        ]))
        .unwrap()
    }

    #[test]
    fn rejects_metadata_that_is_not_tree_capable() {
        let flat = TreeMetadata::builder("Flat").primary_column(ColumnMetadata::new("id", "id", ColumnType::Int)).build();
        let err = TreeMaterializer::new(flat, TypedCoercion, TreeSettings::default()).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn hydrates_every_declared_column() {
        let m = materializer(TreeSettings::default());
        let entities = m.hydrate("c", &rows());
        assert_eq!(entities.len(), 5);
        assert_eq!(entities[1].value("id"), Value::Int(2));
        assert_eq!(entities[1].value("name"), Value::Text("a1".into()));
        assert_eq!(entities[1].value("parentId"), Value::Int(1));
        assert_eq!(entities[0].value("parentId"), Value::Null);
    }

    #[test]
    fn find_trees_builds_one_tree_per_root() {
        let m = materializer(TreeSettings::default());
        let rows = rows();
        let entities = m.hydrate("c", &rows);
        let maps = m.relation_maps("c", &rows).unwrap();
        let trees = m.find_trees(&entities, &maps, FindTreesOptions::default()).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(
            trees[0].to_json(),
            json!({"id": 1, "name": "a", "parentId": null, "children": [
                {"id": 2, "name": "a1", "parentId": 1, "children": [
                    {"id": 4, "name": "a11", "parentId": 2, "children": []}
                ]},
                {"id": 3, "name": "a2", "parentId": 1, "children": []}
            ]})
        );
        assert!(trees[1].children("children").unwrap().is_empty());
    }

    #[test]
    fn settings_default_depth_applies_when_unspecified() {
        let m = materializer(TreeSettings { default_depth: Some(1), ..TreeSettings::default() });
        let rows = rows();
        let entities = m.hydrate("c", &rows);
        let maps = m.relation_maps("c", &rows).unwrap();
        m.find_descendants_tree(&entities[0], &entities, &maps, FindTreesOptions::default()).unwrap();
        let children = entities[0].children("children").unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].children("children").unwrap().is_empty());

        m.find_descendants_tree(&entities[0], &entities, &maps, FindTreesOptions::depth(2)).unwrap();
        assert_eq!(entities[1].children("children").unwrap().len(), 1);
    }

    #[test]
    fn flat_descendants_and_ancestors_do_not_mutate() {
        let m = materializer(TreeSettings::default());
        let rows = rows();
        let entities = m.hydrate("c", &rows);
        let maps = m.relation_maps("c", &rows).unwrap();
        let descendants = m.find_descendants(&entities[0], &entities, &maps).unwrap();
        let ids: Vec<Value> = descendants.iter().map(|e| e.value("id")).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        assert_eq!(m.count_descendants(&entities[0], &entities, &maps).unwrap(), 3);
        assert_eq!(m.count_descendants(&entities[4], &entities, &maps).unwrap(), 0);

        let ancestors = m.find_ancestors(&entities[3], &entities, &maps).unwrap();
        let ids: Vec<Value> = ancestors.iter().map(|e| e.value("id")).collect();
        assert_eq!(ids, vec![Value::Int(4), Value::Int(2), Value::Int(1)]);
        assert_eq!(m.count_ancestors(&entities[3], &entities, &maps).unwrap(), 2);
        assert!(entities.iter().all(|e| e.children("children").is_none() && e.parent("parent").is_none()));
    }

    #[test]
    fn ancestors_tree_links_through_shared_entities() {
        let m = materializer(TreeSettings::default());
        let rows = rows();
        let entities = m.hydrate("c", &rows);
        let maps = m.relation_maps("c", &rows).unwrap();
        m.find_ancestors_tree(&entities[3], &entities, &maps).unwrap();
        assert!(entities[3].parent("parent").unwrap().ptr_eq(&entities[1]));
        assert!(entities[1].parent("parent").unwrap().ptr_eq(&entities[0]));
        assert!(entities[0].parent("parent").is_none());
    }

    #[test]
    fn flat_walks_honour_cycle_policy() {
        let maps = vec![RelationMap::new(1, 2), RelationMap::new(2, 1)];
        let entities = vec![Entity::new("Category").with_value("id", 1), Entity::new("Category").with_value("id", 2)];
        let strict = materializer(TreeSettings::default());
        assert!(matches!(strict.find_descendants(&entities[0], &entities, &maps), Err(TreeError::CycleDetected { .. })));
        assert!(matches!(strict.find_ancestors(&entities[0], &entities, &maps), Err(TreeError::CycleDetected { .. })));

        let lenient = materializer(TreeSettings { cycle_policy: CyclePolicy::Truncate, ..TreeSettings::default() });
        assert_eq!(lenient.count_descendants(&entities[0], &entities, &maps).unwrap(), 1);
        assert_eq!(lenient.count_ancestors(&entities[0], &entities, &maps).unwrap(), 1);
    }

    #[test]
    fn duplicate_rows_are_counted_once() {
        let m = materializer(TreeSettings::default());
        let rows = rows_from_json_value(json!([
            {"c_id": "1", "c_name": "a", "c_parentId": null},
            {"c_id": "2", "c_name": "a1", "c_parentId": "1"},
            {"c_id": "2", "c_name": "a1", "c_parentId": "1"},
        ]))
        .unwrap();
        let entities = m.hydrate("c", &rows);
        let maps = m.relation_maps("c", &rows).unwrap();
        let ids: Vec<Value> = m.find_descendants(&entities[0], &entities, &maps).unwrap().iter().map(|e| e.value("id")).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(m.count_descendants(&entities[0], &entities, &maps).unwrap(), 1);
    }

    #[test]
    fn node_with_two_parents_is_not_a_cycle() {
        let m = materializer(TreeSettings::default());
        let entities = vec![
            Entity::new("Category").with_value("id", 1),
            Entity::new("Category").with_value("id", 2),
            Entity::new("Category").with_value("id", 3),
        ];
        let maps = vec![RelationMap::new(1, Value::Null), RelationMap::new(2, 1), RelationMap::new(3, 1), RelationMap::new(3, 2)];
        assert_eq!(m.count_descendants(&entities[0], &entities, &maps).unwrap(), 2);
        m.find_descendants_tree(&entities[0], &entities, &maps, FindTreesOptions::default()).unwrap();
        assert_eq!(entities[1].children("children").unwrap().len(), 1);
    }

    #[test]
    fn flat_walk_depth_limit_counts_levels_not_nodes() {
        let m = materializer(TreeSettings { max_depth: 1, ..TreeSettings::default() });
        let entities = vec![
            Entity::new("Category").with_value("id", 1),
            Entity::new("Category").with_value("id", 2),
            Entity::new("Category").with_value("id", 3),
        ];
        let wide = vec![RelationMap::new(2, 1), RelationMap::new(3, 1)];
        assert_eq!(m.count_descendants(&entities[0], &entities, &wide).unwrap(), 2);
        let deep = vec![RelationMap::new(2, 1), RelationMap::new(3, 2)];
        assert!(matches!(m.find_descendants(&entities[0], &entities, &deep), Err(TreeError::DepthLimitExceeded { limit: 1 })));
    }
}
