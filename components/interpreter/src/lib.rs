//! Virtual machine for the Lantern Lua dialect
//!
//! This crate turns compiled chunks into running programs:
//! - A stack-based [`Processor`] with call frames, metatables and safepoints
//! - Coroutines as resumable processors sharing their script's state
//! - A [`Debugger`] protocol with breakpoints and stepping
//! - Per-script [`PerformanceStatistics`]
//! - An interop bridge exposing host types as userdata
//! - The core builtins and the `coroutine` table
//!
//! # Example
//!
//! ```
//! use interpreter::Script;
//! use core_types::Value;
//!
//! let script = Script::new();
//! let f = script
//!     .load_string("local a, b = ... return a .. b", None, Some("concat"))
//!     .unwrap();
//!
//! let result = script.call_strings(&f, &["lan", "tern"]).unwrap();
//! assert_eq!(result.as_str(), Some("lantern"));
//! assert!(script.call(&f, vec![Value::Nil]).is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builtins;
mod context;
mod coroutine;
mod debug_listen;
mod debug_state;
mod dispatch;
mod ops;
mod shared;
mod symbols;

pub mod call_frame;
pub mod debugger;
pub mod execution;
pub mod interop;
pub mod options;
pub mod profile;
pub mod script;
pub mod vm;

pub use builtins::VERSION;
pub use call_frame::{CallStackItem, FrameKind};
pub use debugger::{ActionType, Debugger, DebuggerAction, DebuggerCaps, WatchItem, WatchType};
pub use execution::{
    ExecutionControlToken, ExecutionPort, InlinePort, Job, ScriptTask, ThreadPort, WORKER_STACK_SIZE,
};
pub use interop::{GlobalVariables, TypeRegistry, UserDataType};
pub use options::{PrintSink, ScriptOptions, DEFAULT_CALL_STACK_LIMIT, DEFAULT_NESTED_CALL_LIMIT};
pub use profile::{PerformanceCounter, PerformanceResult, PerformanceStatistics};
pub use script::Script;
pub use shared::BASE64_DUMP_HEADER;
pub use vm::Processor;
