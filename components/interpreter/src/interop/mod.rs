//! Interop bridge
//!
//! Host types implement [`UserDataType`] to declare their properties and
//! methods. A [`TypeRegistry`] builds each type's descriptor once; instances
//! are then wrapped into userdata values and bound to names in a script's
//! global table.

mod descriptor;
mod global_variables;
mod registry;

pub use descriptor::{DescriptorBuilder, TypeDescriptor, UserDataType};
pub use global_variables::GlobalVariables;
pub use registry::TypeRegistry;

/// Name the shared [`GlobalVariables`] store is bound to
pub const GLOBAL_VARIABLES_NAME: &str = "global";
