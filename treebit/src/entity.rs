use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Content of one declared property.
#[derive(Clone)]
pub enum Field {
    Value(Value),
    Many(Vec<Entity>),
    One(Entity),
}

/// Generic entity record: declared property name to field.
pub struct EntityRecord {
    pub name: String,
    pub properties: BTreeMap<String, Field>,
}

/// Shared handle to a materialized entity.
///
/// Builders attach children and parents by writing through this handle, so every clone of it
/// observes the decorated tree. Handles are compared by identity with [`Entity::ptr_eq`].
///
/// Children and parent links are both strong, so an entity set decorated in both directions forms
/// `Rc` cycles and is not freed on drop. Call [`Entity::clear_relations`] on every entity to release it.
#[derive(Clone)]
pub struct Entity(Rc<RefCell<EntityRecord>>);

impl Entity {
    pub fn new(name: &str) -> Self {
        Entity(Rc::new(RefCell::new(EntityRecord { name: name.to_string(), properties: BTreeMap::new() })))
    }

    pub fn with_value(self, property: &str, value: impl Into<Value>) -> Self {
        self.set_value(property, value.into());
        self
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.0.borrow().properties.contains_key(property)
    }

    pub fn set_value(&self, property: &str, value: Value) {
        self.0.borrow_mut().properties.insert(property.to_string(), Field::Value(value));
    }

    /// Scalar value of a property, `Null` when absent or when the property holds a relation.
    pub fn value(&self, property: &str) -> Value {
        match self.0.borrow().properties.get(property) {
            Some(Field::Value(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    pub fn set_children(&self, property: &str, children: Vec<Entity>) {
        self.0.borrow_mut().properties.insert(property.to_string(), Field::Many(children));
    }

    pub fn children(&self, property: &str) -> Option<Vec<Entity>> {
        match self.0.borrow().properties.get(property) {
            Some(Field::Many(children)) => Some(children.clone()),
            _ => None,
        }
    }

    pub fn set_parent(&self, property: &str, parent: Entity) {
        self.0.borrow_mut().properties.insert(property.to_string(), Field::One(parent));
    }

    pub fn parent(&self, property: &str) -> Option<Entity> {
        match self.0.borrow().properties.get(property) {
            Some(Field::One(parent)) => Some(parent.clone()),
            _ => None,
        }
    }

    /// Drops every children and parent link held by this entity, scalar properties stay.
    pub fn clear_relations(&self) {
        self.0.borrow_mut().properties.retain(|_, field| matches!(field, Field::Value(_)));
    }

    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Independent copy of the scalar properties only, relations are left behind.
    pub fn detached_copy(&self) -> Entity {
        let record = self.0.borrow();
        let copy = Entity::new(&record.name);
        for (property, field) in record.properties.iter() {
            if let Field::Value(value) = field {
                copy.set_value(property, value.clone());
            }
        }
        copy
    }

    /// Renders the entity and everything reachable from it as JSON.
    /// A relation leading back to an entity already on the current path renders as `null`.
    /// Recursion follows the tree, so very deep trees need a matching thread stack.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_on_path(&mut path)
    }

    fn to_json_on_path(&self, path: &mut HashSet<*const RefCell<EntityRecord>>) -> serde_json::Value {
        let ptr = Rc::as_ptr(&self.0);
        if !path.insert(ptr) {
            return serde_json::Value::Null;
        }
        let record = self.0.borrow();
        let mut object = serde_json::Map::new();
        for (property, field) in record.properties.iter() {
            let rendered = match field {
                Field::Value(value) => value.to_json(),
                Field::Many(entities) => serde_json::Value::Array(entities.iter().map(|e| e.to_json_on_path(path)).collect()),
                Field::One(entity) => entity.to_json_on_path(path),
            };
            object.insert(property.clone(), rendered);
        }
        path.remove(&ptr);
        serde_json::Value::Object(object)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0.borrow();
        let mut s = f.debug_struct(&record.name);
        for (property, field) in record.properties.iter() {
            match field {
                Field::Value(value) => s.field(property, value),
                Field::Many(entities) => s.field(property, &format_args!("[{} entities]", entities.len())),
                Field::One(_) => s.field(property, &format_args!("<entity>")),
            };
        }
        s.finish()
    }
}
