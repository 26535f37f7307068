//! Resolved variable references.

use std::fmt;
use std::sync::Arc;

use core_types::ENV_NAME;

/// How an identifier was resolved at compile time.
///
/// Globals are not a storage class of their own: a global `x` is the field
/// `x` of whatever the `env` symbol (normally the `_ENV` upvalue) holds at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRef {
    /// Local slot of the current frame
    Local {
        /// Identifier
        name: Arc<str>,
        /// Slot index
        index: usize,
    },
    /// Captured cell of the running closure
    Upvalue {
        /// Identifier
        name: Arc<str>,
        /// Upvalue index
        index: usize,
    },
    /// Field of the environment table
    Global {
        /// Identifier
        name: Arc<str>,
        /// Symbol holding the environment
        env: Box<SymbolRef>,
    },
    /// The script's global table, for code compiled without an `_ENV`
    /// upvalue
    DefaultEnv,
}

impl SymbolRef {
    /// Local slot reference.
    pub fn local(name: &str, index: usize) -> Self {
        SymbolRef::Local {
            name: Arc::from(name),
            index,
        }
    }

    /// Upvalue reference.
    pub fn upvalue(name: &str, index: usize) -> Self {
        SymbolRef::Upvalue {
            name: Arc::from(name),
            index,
        }
    }

    /// Global reference through `env`.
    pub fn global(name: &str, env: SymbolRef) -> Self {
        SymbolRef::Global {
            name: Arc::from(name),
            env: Box::new(env),
        }
    }

    /// Identifier this symbol was resolved from.
    pub fn name(&self) -> &str {
        match self {
            SymbolRef::Local { name, .. }
            | SymbolRef::Upvalue { name, .. }
            | SymbolRef::Global { name, .. } => name,
            SymbolRef::DefaultEnv => ENV_NAME,
        }
    }

    /// Short storage-class label.
    pub fn kind(&self) -> &'static str {
        match self {
            SymbolRef::Local { .. } => "local",
            SymbolRef::Upvalue { .. } => "upvalue",
            SymbolRef::Global { .. } => "global",
            SymbolRef::DefaultEnv => "default_env",
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolRef::Local { name, index } => write!(f, "local:{}#{}", name, index),
            SymbolRef::Upvalue { name, index } => write!(f, "upvalue:{}#{}", name, index),
            SymbolRef::Global { name, env } => write!(f, "{}.{}", env, name),
            SymbolRef::DefaultEnv => write!(f, "default_env"),
        }
    }
}
