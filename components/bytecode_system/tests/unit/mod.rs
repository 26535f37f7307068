//! Unit tests for bytecode_system

mod test_dump;
mod test_segment;
