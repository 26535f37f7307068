//! Parser error types and helpers

use core_types::SyntaxError;

/// Create a syntax error at a given position
pub fn syntax_error(
    chunk_name: &str,
    line: usize,
    column: usize,
    message: impl Into<String>,
) -> SyntaxError {
    SyntaxError::new(chunk_name, line, column, message)
}

/// Create an error caused by the input ending before a construct was
/// complete
pub fn premature_end(
    chunk_name: &str,
    line: usize,
    column: usize,
    message: impl Into<String>,
) -> SyntaxError {
    SyntaxError::new(chunk_name, line, column, message).at_end_of_input()
}

/// Create an "expected X near Y" error
pub fn unexpected_token(
    chunk_name: &str,
    line: usize,
    column: usize,
    expected: &str,
    near: &str,
) -> SyntaxError {
    syntax_error(
        chunk_name,
        line,
        column,
        format!("{} expected near '{}'", expected, near),
    )
}
