//! file: core/src/vm/object.rs
//! description: reference-counted object instances.

use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use indexmap::IndexMap;

use super::generator::Generator;
use super::registry::RuntimeClass;
use super::value::{next_handle_id, Value};

/// Engine-side state attached to instances of some bootstrap classes.
pub enum Internal {
    None,
    Generator(Arc<Mutex<Generator>>),
}

pub struct ObjectCell {
    id: u64,
    class: Arc<RuntimeClass>,
    /// `None` marks a typed property that has not been initialized yet.
    props: RwLock<IndexMap<String, Option<Value>>>,
    internal: Internal,
}

/// Handle to an object. Cloning shares the instance.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object({})#{}", self.0.class.name, self.0.id)
    }
}

impl ObjectRef {
    pub fn new(class: Arc<RuntimeClass>, props: IndexMap<String, Option<Value>>) -> Self {
        ObjectRef::with_internal(class, props, Internal::None)
    }

    pub fn with_internal(class: Arc<RuntimeClass>, props: IndexMap<String, Option<Value>>, internal: Internal) -> Self {
        ObjectRef(Arc::new(ObjectCell { id: next_handle_id(), class, props: RwLock::new(props), internal }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.0.class
    }

    pub fn internal(&self) -> &Internal {
        &self.0.internal
    }

    pub fn generator(&self) -> Option<&Arc<Mutex<Generator>>> {
        match &self.0.internal {
            Internal::Generator(g) => Some(g),
            Internal::None => None,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Option<Value>>> {
        self.0.props.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Option<Value>>> {
        self.0.props.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Outer `None`: no such property. Inner `None`: declared but
    /// uninitialized.
    pub fn get_prop(&self, name: &str) -> Option<Option<Value>> {
        self.read().get(name).cloned()
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn set_prop(&self, name: &str, v: Value) {
        let mut props = self.write();
        match props.get_mut(name) {
            Some(slot) => *slot = Some(v),
            None => {
                props.insert(name.to_string(), Some(v));
            }
        }
    }

    /// Move a property value out for in-place modification.
    pub fn take_prop(&self, name: &str) -> Option<Value> {
        self.write().get_mut(name).and_then(Option::take)
    }

    pub fn remove_prop(&self, name: &str) -> bool {
        self.write().shift_remove(name).is_some()
    }

    pub fn props(&self) -> Vec<(String, Option<Value>)> {
        self.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn prop_count(&self) -> usize {
        self.read().len()
    }

    /// Shallow copy with a fresh identity; `__clone` runs separately.
    pub fn duplicate(&self) -> ObjectRef {
        let props = self.read().clone();
        ObjectRef::new(Arc::clone(&self.0.class), props)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
