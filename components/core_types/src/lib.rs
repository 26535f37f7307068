//! Core value types and error handling for the Lantern script runtime.
//!
//! This crate provides the foundational types shared by the compiler, the
//! virtual machine and the execution host: the tagged [`Value`] union, the
//! reference-counted [`TableRef`], closures and host callbacks, coroutine
//! handles, source references and the [`ScriptError`] taxonomy.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of guest-language values
//! - [`Table`] / [`TableRef`] - Insertion-ordered associative arrays
//! - [`Closure`] / [`Callback`] - Script functions and host functions
//! - [`CoroutineRef`] - Handle to a resumable processor
//! - [`SourceRef`] / [`SourceCode`] - Locations used for errors and debugging
//! - [`ScriptError`] - Every failure the runtime can report
//!
//! # Examples
//!
//! ```
//! use core_types::{TableRef, Value};
//!
//! let table = TableRef::new();
//! table.set_str("answer", Value::from(42));
//!
//! assert_eq!(table.get_str("answer").as_number(), Some(42.0));
//! assert_eq!(Value::from("hi").type_name(), "string");
//! assert!(!Value::Nil.is_truthy());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod context;
mod coroutine;
mod error;
mod function;
mod source;
mod table;
mod userdata;
mod value;

pub use context::{CallArgs, ExecutionContext};
pub use coroutine::{CoroutineRef, CoroutineState};
pub use error::{DumpError, RuntimeError, ScriptError, SyntaxError};
pub use function::{Callback, CallbackKind, Closure, NativeFn, ScriptId, UpvaluesType, ValueCell};
pub use source::{SourceCode, SourceRef};
pub use table::{Table, TableKey, TableRef};
pub use userdata::{UserData, UserDataDescriptor};
pub use value::{format_number, str_to_number, DataType, Value};

/// Name of the implicit environment upvalue every chunk closes over.
pub const ENV_NAME: &str = "_ENV";
