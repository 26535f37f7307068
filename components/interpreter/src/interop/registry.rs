//! Registered host types

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use core_types::{ScriptError, UserData, UserDataDescriptor, Value};
use log::debug;
use parking_lot::RwLock;

use super::descriptor::{TypeDescriptor, UserDataType};
use crate::profile::{PerformanceCounter, PerformanceStatistics};

/// Descriptors of the host types that may be exposed to scripts
///
/// Building a descriptor walks the type's members once; every instance of
/// the type shares the result.
#[derive(Default)]
pub struct TypeRegistry {
    descriptors: RwLock<HashMap<TypeId, Arc<dyn UserDataDescriptor>>>,
}

impl TypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`; returns `false` when it already was
    pub fn register<T: UserDataType>(&self) -> bool {
        let id = TypeId::of::<T>();
        if self.descriptors.read().contains_key(&id) {
            return false;
        }
        let descriptor: Arc<dyn UserDataDescriptor> = Arc::new(TypeDescriptor::<T>::of());

        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(&id) {
            return false;
        }
        descriptors.insert(id, descriptor);
        debug!("registered host type {}", T::type_name());
        true
    }

    /// [`register`](Self::register), timing descriptor building under
    /// [`PerformanceCounter::AdaptersCompilation`]
    pub fn register_timed<T: UserDataType>(&self, stats: &PerformanceStatistics) -> bool {
        let _watch = stats.start_stopwatch(PerformanceCounter::AdaptersCompilation);
        self.register::<T>()
    }

    /// True once `T` was registered
    pub fn is_registered<T: UserDataType>(&self) -> bool {
        self.descriptors.read().contains_key(&TypeId::of::<T>())
    }

    /// Wrap a host object for a script
    ///
    /// # Errors
    ///
    /// A runtime error when `T` was never registered.
    pub fn create<T: UserDataType>(&self, object: Arc<T>) -> Result<Value, ScriptError> {
        let descriptor = self
            .descriptors
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| {
                ScriptError::runtime(format!("type '{}' is not registered", T::type_name()))
            })?;
        Ok(Value::UserData(UserData::new(descriptor, object)))
    }

    /// Forget every registered type
    pub fn clear(&self) {
        self.descriptors.write().clear();
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish()
    }
}
