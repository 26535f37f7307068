//! Host objects exposed to scripts.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::{ScriptError, Value};

/// Member access table for a registered host type.
///
/// Descriptors are built once per type and shared by every exposed instance
/// of that type.
pub trait UserDataDescriptor: Send + Sync {
    /// Name of the described type.
    fn type_name(&self) -> &str;

    /// Read member `key`; `Ok(None)` when the type has no such member.
    fn index(&self, object: &UserData, key: &Value) -> Result<Option<Value>, ScriptError>;

    /// Write member `key`; `Ok(false)` when the type has no writable member
    /// of that name.
    fn set_index(&self, object: &UserData, key: &Value, value: Value)
        -> Result<bool, ScriptError>;

    /// Custom `tostring` text.
    fn as_string(&self, _object: &UserData) -> Option<String> {
        None
    }
}

/// A host object paired with the descriptor that exposes its members.
#[derive(Clone)]
pub struct UserData {
    descriptor: Arc<dyn UserDataDescriptor>,
    object: Arc<dyn Any + Send + Sync>,
}

impl UserData {
    /// Pair an object with its descriptor.
    pub fn new(descriptor: Arc<dyn UserDataDescriptor>, object: Arc<dyn Any + Send + Sync>) -> Self {
        Self { descriptor, object }
    }

    /// The member access table.
    pub fn descriptor(&self) -> &Arc<dyn UserDataDescriptor> {
        &self.descriptor
    }

    /// The wrapped object.
    pub fn object(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.object
    }

    /// Typed view of the wrapped object.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &UserData) -> bool {
        self.addr() == other.addr()
    }

    /// Identity address of the wrapped object.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.object) as *const u8 as usize
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserData({})", self.descriptor.type_name())
    }
}
