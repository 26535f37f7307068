//! REPL (Read-Eval-Print Loop) implementation

use core_types::Value;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{CliError, CliResult};
use crate::runtime::Runtime;

/// What one line of input produced
#[derive(Debug, Clone, PartialEq)]
pub enum ReplOutcome {
    /// The statement is not finished; more lines are needed
    Incomplete,
    /// Nothing to show
    Empty,
    /// Rendered result values
    Value(String),
    /// Rendered error
    Error(String),
}

/// Accumulates input lines until they form a complete chunk
///
/// A line that parses as an expression is evaluated and its value echoed;
/// a leading `=` is shorthand for `return`.
pub struct ReplSession<'a> {
    runtime: &'a Runtime,
    buffer: String,
}

impl<'a> ReplSession<'a> {
    /// Session evaluating on `runtime`'s engine
    pub fn new(runtime: &'a Runtime) -> Self {
        Self {
            runtime,
            buffer: String::new(),
        }
    }

    /// True while a statement spans several lines
    pub fn is_continuing(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop any partial statement
    pub fn cancel(&mut self) {
        self.buffer.clear();
    }

    /// Feed one line of input
    pub fn feed(&mut self, line: &str) -> ReplOutcome {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);

        let source = match self.buffer.strip_prefix('=') {
            Some(rest) => format!("return {}", rest),
            None => self.buffer.clone(),
        };
        if source.trim().is_empty() {
            self.buffer.clear();
            return ReplOutcome::Empty;
        }

        let engine = self.runtime.engine();
        let expression = format!("return {}", source);
        let code = if engine.validate(&expression).is_ok() {
            expression
        } else {
            match engine.validate(&source) {
                Err(err) if err.is_premature_end() => return ReplOutcome::Incomplete,
                Err(err) => {
                    self.buffer.clear();
                    return ReplOutcome::Error(err.to_string());
                }
                Ok(()) => source,
            }
        };

        self.buffer.clear();
        match self.runtime.eval(&code) {
            Ok(Value::Tuple(values)) if values.is_empty() => ReplOutcome::Empty,
            Ok(value) => ReplOutcome::Value(value.to_string()),
            Err(err) => ReplOutcome::Error(err.to_string()),
        }
    }
}

/// Run the interactive REPL
pub fn run_repl(runtime: &Runtime) -> CliResult<()> {
    let mut editor = DefaultEditor::new()
        .map_err(|e| CliError::Repl(format!("failed to initialize editor: {}", e)))?;

    println!("{}", interpreter::VERSION);
    println!("Type Lua code, .help for commands, or exit to quit.");

    let mut session = ReplSession::new(runtime);
    loop {
        let prompt = if session.is_continuing() { ">> " } else { "> " };

        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if !session.is_continuing() {
                    if matches!(trimmed, "exit" | "quit" | ".exit") {
                        break;
                    }
                    if trimmed.starts_with('.') {
                        handle_repl_command(trimmed, runtime);
                        continue;
                    }
                }

                let _ = editor.add_history_entry(line.as_str());
                match session.feed(&line) {
                    ReplOutcome::Value(text) => println!("{}", text),
                    ReplOutcome::Error(text) => eprintln!("{}", text),
                    ReplOutcome::Incomplete | ReplOutcome::Empty => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                if session.is_continuing() {
                    session.cancel();
                } else {
                    println!("Press Ctrl-D or type exit to quit");
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(CliError::Repl(format!("readline error: {}", err))),
        }
    }

    Ok(())
}

fn handle_repl_command(command: &str, runtime: &Runtime) {
    match command {
        ".help" => {
            println!("REPL Commands:");
            println!("  .help     - Show this help message");
            println!("  .stats    - Show engine statistics");
            println!("  .reset    - Forget every global");
            println!("  .exit     - Exit the REPL");
            println!("  =expr     - Print the value of expr");
        }
        ".stats" => match runtime.statistics_json() {
            Ok(json) => println!("{}", json),
            Err(err) => eprintln!("{}", err),
        },
        ".reset" => runtime.engine().reset(),
        _ => {
            println!("Unknown command: {}", command);
            println!("Type .help for available commands");
        }
    }
}
