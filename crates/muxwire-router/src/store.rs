use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

type Value = Arc<dyn Any + Send + Sync>;

/// String-keyed store of arbitrary shared values.
#[derive(Default)]
pub struct Store {
    values: RwLock<HashMap<String, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.write().insert(key.into(), Arc::new(value));
    }

    /// Fetch a value. `None` if the key is absent or holds a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.values.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.values.read().keys().cloned().collect();
        f.debug_struct("Store").field("keys", &keys).finish()
    }
}
