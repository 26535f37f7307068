//! Integration test suite for Lantern
//!
//! Tests here cross component boundaries: compiler to segment, segment to
//! dump, script to pooled engine, and the CLI runtime over all of them.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use lua_cli;
    pub use parser;
    pub use script_host;
}
