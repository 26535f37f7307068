//! Error types reported by the compiler, the virtual machine and the host.
//!
//! Every fallible operation in the runtime returns [`ScriptError`]. Load-time
//! failures are [`SyntaxError`]s, execution-time failures are
//! [`RuntimeError`]s, and the remaining variants describe misuse of the host
//! surface (cross-thread entry, unknown cached functions, cancellation).

use thiserror::Error;

use crate::{SourceRef, Value};

/// A load-time error raised while lexing or parsing guest source.
///
/// Lines and columns are 1-based. `premature_end` is set when the input
/// ended before the construct being parsed was complete, which lets an
/// interactive caller keep buffering input instead of reporting the error.
///
/// # Examples
///
/// ```
/// use core_types::SyntaxError;
///
/// let err = SyntaxError::new("chunk_0", 3, 7, "unexpected symbol near 'end'");
/// assert_eq!(err.to_string(), "chunk_0:(3,7): unexpected symbol near 'end'");
/// assert!(!err.premature_end);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{chunk_name}:({line},{column}): {message}")]
pub struct SyntaxError {
    /// Friendly name of the chunk being compiled
    pub chunk_name: String,
    /// 1-based line of the offending token
    pub line: usize,
    /// 1-based column of the offending token
    pub column: usize,
    /// Human-readable description
    pub message: String,
    /// True when the error was caused by the input ending too early
    pub premature_end: bool,
}

impl SyntaxError {
    /// Create a syntax error for a genuine defect in the source.
    pub fn new(
        chunk_name: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            chunk_name: chunk_name.into(),
            line,
            column,
            message: message.into(),
            premature_end: false,
        }
    }

    /// Mark this error as caused by premature end of input.
    pub fn at_end_of_input(mut self) -> Self {
        self.premature_end = true;
        self
    }
}

/// An execution-time error.
///
/// `value` is the error object raised by the script (for `error(x)` it is
/// `x`; for VM faults it is the message string). `decorated_message` carries
/// the message prefixed with the source location when one was known.
#[derive(Debug, Clone, Error)]
#[error("{}", self.display_message())]
pub struct RuntimeError {
    /// Undecorated message
    pub message: String,
    /// Message prefixed with the location it was raised at
    pub decorated_message: Option<String>,
    /// Location of the instruction that raised the error
    pub location: Option<SourceRef>,
    /// The error object visible to `pcall`
    pub value: Value,
    /// Names of the frames that were active when the error was raised
    pub call_stack: Vec<String>,
}

impl RuntimeError {
    /// Create a runtime error whose error object is the message string.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            value: Value::from(message.as_str()),
            message,
            decorated_message: None,
            location: None,
            call_stack: Vec::new(),
        }
    }

    /// Create a runtime error carrying an arbitrary error object.
    pub fn with_value(value: Value) -> Self {
        let message = match &value {
            Value::String(s) => s.to_string(),
            Value::Nil => "nil".to_string(),
            other if other.as_number().is_some() => other.to_string(),
            other => format!("(error object is a {} value)", other.type_name()),
        };
        Self {
            message,
            decorated_message: None,
            location: None,
            value,
            call_stack: Vec::new(),
        }
    }

    /// True once a location prefix has been attached.
    pub fn is_decorated(&self) -> bool {
        self.decorated_message.is_some()
    }

    /// Attach a location prefix. String error objects are rewritten to
    /// include the prefix so that `pcall` observes the decorated text.
    pub fn decorate(&mut self, location: Option<SourceRef>, prefix: &str) {
        if self.is_decorated() {
            return;
        }
        let decorated = format!("{}: {}", prefix, self.message);
        if let Value::String(_) = self.value {
            self.value = Value::from(decorated.as_str());
        }
        self.decorated_message = Some(decorated);
        self.location = location;
    }

    /// Message suitable for display: decorated when available.
    pub fn display_message(&self) -> &str {
        self.decorated_message.as_deref().unwrap_or(&self.message)
    }
}

/// Errors raised while writing or reading a binary dump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumpError {
    /// Stream does not start with the dump signature
    #[error("stream is not a valid binary chunk")]
    BadHeader,
    /// Dump was produced by an incompatible instruction format
    #[error("binary chunk version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version byte found in the stream
        found: u8,
        /// Version this build reads and writes
        expected: u8,
    },
    /// A string reference pointed past the end of the string table
    #[error("string map failure: index {0} is out of range")]
    StringMapFailure(usize),
    /// Stream ended in the middle of a record
    #[error("unexpected end of binary chunk")]
    UnexpectedEof,
    /// Unknown instruction tag
    #[error("invalid opcode {0:#04x} in binary chunk")]
    InvalidOpcode(u8),
    /// Unknown literal or symbol tag
    #[error("invalid tag {0:#04x} in binary chunk")]
    InvalidTag(u8),
    /// String bytes were not valid UTF-8
    #[error("invalid utf-8 in binary chunk string table")]
    InvalidUtf8,
    /// Closure captures something other than the environment
    #[error("cannot dump a function which has upvalues other than _ENV")]
    UnsupportedUpvalues,
    /// The value handed to the dumper is not a script function
    #[error("only script functions can be dumped")]
    NotAFunction,
    /// Structural inconsistency in the stream
    #[error("malformed binary chunk: {0}")]
    Malformed(String),
    /// Underlying stream failed
    #[error("binary chunk i/o failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for DumpError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DumpError::UnexpectedEof
        } else {
            DumpError::Io(err.to_string())
        }
    }
}

/// Every error the runtime can report to a caller.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Source failed to compile
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// Script raised an error while running
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// A thread-checked processor was entered from a second thread
    #[error(
        "cannot enter the same script processor from two different threads: {owner} and {current}"
    )]
    ThreadAccessViolation {
        /// Thread currently executing inside the processor
        owner: String,
        /// Thread that attempted to enter
        current: String,
    },
    /// A cached function was invoked before it was ever loaded
    #[error("function '{0}' was not found")]
    FunctionNotFound(String),
    /// Execution stopped at a safepoint because its control token was cancelled
    #[error("script execution was cancelled")]
    Cancelled,
    /// Binary dump could not be written or read
    #[error(transparent)]
    Dump(#[from] DumpError),
    /// Underlying I/O failure while loading
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Shorthand for a plain runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(RuntimeError::new(message))
    }

    /// True for errors a script-level `pcall` is allowed to intercept.
    pub fn is_catchable(&self) -> bool {
        matches!(self, ScriptError::Runtime(_))
    }

    /// True for load-time errors caused by truncated input.
    pub fn is_premature_end(&self) -> bool {
        matches!(self, ScriptError::Syntax(e) if e.premature_end)
    }
}
