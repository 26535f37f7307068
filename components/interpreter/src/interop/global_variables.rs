//! Variable store shared by scripts and the host

use core_types::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::descriptor::{DescriptorBuilder, UserDataType};

/// Name-keyed values readable and writable from scripts as fields of the
/// `global` object and from the host through this API
///
/// One store is typically shared by reference across every pooled script
/// instance, so a value written by one execution is seen by the next.
#[derive(Debug, Default)]
pub struct GlobalVariables {
    values: RwLock<IndexMap<String, Value>>,
}

impl GlobalVariables {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`, `nil` when unset
    pub fn get(&self, name: &str) -> Value {
        self.values.read().get(name).cloned().unwrap_or_default()
    }

    /// Set `name`; assigning `nil` removes it
    pub fn set(&self, name: &str, value: Value) {
        let value = value.scalar();
        let mut values = self.values.write();
        if value.is_nil() {
            values.shift_remove(name);
        } else {
            values.insert(name.to_string(), value);
        }
    }

    /// Remove `name`, returning its value
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values.write().shift_remove(name)
    }

    /// Number of set variables
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// True when no variable is set
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every variable
    pub fn clear(&self) {
        self.values.write().clear();
    }

    /// Variable names in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }
}

impl UserDataType for GlobalVariables {
    fn type_name() -> &'static str {
        "GlobalVariables"
    }

    fn describe(builder: &mut DescriptorBuilder<Self>) {
        builder
            .index_fallback(|store, name| Some(store.get(name)))
            .newindex_fallback(|store, name, value| {
                store.set(name, value);
                true
            })
            .display(|store| format!("GlobalVariables({})", store.len()));
    }
}
