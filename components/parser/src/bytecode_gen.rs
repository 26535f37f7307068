//! Bytecode generation from the AST
//!
//! Code is emitted straight into a [`ChunkBuilder`] handed out by the
//! script's code segment. Every expression leaves exactly one value on the
//! stack; calls and `...` leave a tuple, which single-value contexts
//! truncate with `Scalar`.
//!
//! Nested functions are emitted inline behind a jump:
//!
//! ```text
//! JUMP    after
//! META    name Function len
//! BEGINFN locals
//! ARGS    params
//! ...body...
//! RET     0
//! after:
//! CLOSURE meta (captures)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytecode_system::{ChunkBuilder, MetaKind, OpCode, SymbolRef};
use core_types::{SourceRef, SyntaxError, Value};

use crate::ast::*;
use crate::error::syntax_error;
use crate::scope::{FunctionScope, ScopeStack};

/// Shape of the code being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// A chunk loaded from source
    Chunk,
    /// A bare function body
    FunctionBody,
}

/// What the generator produced for one chunk
#[derive(Debug, Clone)]
pub struct GeneratedChunk {
    /// Address of the chunk's `Meta` header
    pub entry: usize,
    /// Every distinct source reference emitted, in emission order
    pub refs: Vec<SourceRef>,
    /// Whether the chunk expects an `_ENV` upvalue
    pub has_env: bool,
}

/// Bytecode generator that converts the AST to bytecode
pub struct BytecodeGenerator<'a> {
    builder: &'a mut ChunkBuilder,
    scopes: ScopeStack,
    chunk_name: &'a str,
    source_idx: usize,
    strings: HashMap<String, Arc<str>>,
    /// Pending `break` jumps, one list per enclosing loop of the current
    /// function
    loops: Vec<Vec<usize>>,
    refs: Vec<SourceRef>,
    has_env: bool,
}

impl<'a> BytecodeGenerator<'a> {
    /// Create a generator emitting into `builder`
    pub fn new(
        builder: &'a mut ChunkBuilder,
        chunk_name: &'a str,
        source_idx: usize,
        env_upvalue: bool,
    ) -> Self {
        Self {
            builder,
            scopes: ScopeStack::new(env_upvalue),
            chunk_name,
            source_idx,
            strings: HashMap::new(),
            loops: Vec::new(),
            refs: Vec::new(),
            has_env: env_upvalue,
        }
    }

    /// Generate a whole chunk
    pub fn generate(mut self, block: &Block, kind: ChunkKind) -> Result<GeneratedChunk, SyntaxError> {
        let meta_kind = match kind {
            ChunkKind::Chunk => MetaKind::Chunk,
            ChunkKind::FunctionBody => MetaKind::Function,
        };
        let entry = self.builder.emit(OpCode::Meta {
            name: Arc::from(self.chunk_name),
            kind: meta_kind,
            length: 0,
        });
        let begin = self.builder.emit(OpCode::BeginFn {
            locals: Arc::from(Vec::new()),
        });
        self.builder.emit(OpCode::Args {
            params: 0,
            varargs: true,
        });

        self.block(block)?;

        self.builder.set_source_ref(None);
        self.builder.emit(OpCode::Ret { values: 0 });

        let root = self.scopes.pop_function();
        self.patch_locals(begin, &root);
        self.builder.close_meta(entry);

        Ok(GeneratedChunk {
            entry,
            refs: self.refs,
            has_env: self.has_env,
        })
    }

    fn error(&self, span: Span, message: impl Into<String>) -> SyntaxError {
        syntax_error(self.chunk_name, span.line, span.column, message)
    }

    fn set_ref(&mut self, sref: SourceRef) -> Option<SourceRef> {
        if self.refs.last() != Some(&sref) {
            self.refs.push(sref);
        }
        self.builder.set_source_ref(Some(sref))
    }

    fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(interned) = self.strings.get(s) {
            return interned.clone();
        }
        let interned: Arc<str> = Arc::from(s);
        self.strings.insert(s.to_string(), interned.clone());
        interned
    }

    fn string_literal(&mut self, s: &str) {
        let interned = self.intern(s);
        self.builder.emit(OpCode::Literal(Value::String(interned)));
    }

    fn patch_locals(&mut self, begin: usize, scope: &FunctionScope) {
        if let Some(inst) = self.builder.get_mut(begin) {
            inst.opcode = OpCode::BeginFn {
                locals: scope.local_names(),
            };
        }
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn block(&mut self, block: &Block) -> Result<(), SyntaxError> {
        for stmt in block {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn scoped_block(&mut self, block: &Block) -> Result<(), SyntaxError> {
        self.scopes.push_block();
        self.block(block)?;
        self.scopes.pop_block();
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), SyntaxError> {
        self.set_ref(stmt.span().source_ref(self.source_idx));

        match stmt {
            Statement::Local { names, values, .. } => {
                self.expression_list(values)?;
                for (i, name) in names.iter().enumerate() {
                    let slot = self.scopes.declare_local(name);
                    self.builder.emit(OpCode::Local { slot, index: i });
                }
                self.builder.emit(OpCode::Pop(1));
            }

            Statement::Assign { targets, values, .. } => {
                self.expression_list(values)?;
                for (i, target) in targets.iter().enumerate() {
                    self.assign_to(target, i)?;
                }
                self.builder.emit(OpCode::Pop(1));
            }

            Statement::Call { call, .. } => {
                self.expression_multi(call)?;
                self.builder.emit(OpCode::Pop(1));
            }

            Statement::Do { body, .. } => self.scoped_block(body)?,

            Statement::While {
                condition,
                body,
                end_span,
                ..
            } => {
                let start = self.builder.next_address();
                self.expression(condition)?;
                let exit_jump = self.builder.emit(OpCode::JumpIfFalse(0));

                self.loops.push(Vec::new());
                self.scoped_block(body)?;
                self.set_ref(end_span.source_ref(self.source_idx));
                self.builder.emit(OpCode::Jump(start));

                let exit = self.builder.next_address();
                self.builder.patch_jump(exit_jump, exit);
                self.patch_breaks(exit);
            }

            Statement::Repeat {
                body,
                condition,
                span,
            } => {
                let start = self.builder.next_address();
                self.loops.push(Vec::new());
                self.scopes.push_block();
                self.block(body)?;
                self.set_ref(span.source_ref(self.source_idx));
                self.expression(condition)?;
                self.builder.emit(OpCode::JumpIfFalse(start));
                self.scopes.pop_block();
                let exit = self.builder.next_address();
                self.patch_breaks(exit);
            }

            Statement::If {
                clauses,
                else_block,
                ..
            } => {
                let mut exits = Vec::new();
                for (i, (condition, body, header)) in clauses.iter().enumerate() {
                    self.set_ref(header.source_ref(self.source_idx));
                    self.expression(condition)?;
                    let skip = self.builder.emit(OpCode::JumpIfFalse(0));
                    self.scoped_block(body)?;
                    let is_last = i + 1 == clauses.len() && else_block.is_none();
                    if !is_last {
                        exits.push(self.builder.emit(OpCode::Jump(0)));
                    }
                    let next = self.builder.next_address();
                    self.builder.patch_jump(skip, next);
                }
                if let Some(body) = else_block {
                    self.scoped_block(body)?;
                }
                let end = self.builder.next_address();
                for jump in exits {
                    self.builder.patch_jump(jump, end);
                }
            }

            Statement::NumericFor {
                var,
                start,
                limit,
                step,
                body,
                end_span,
                ..
            } => {
                self.expression(start)?;
                self.expression(limit)?;
                match step {
                    Some(step) => self.expression(step)?,
                    None => {
                        self.builder.emit(OpCode::Literal(Value::Number(1.0)));
                    }
                }
                self.builder.emit(OpCode::ForPrep);

                let loop_start = self.builder.emit(OpCode::ForLoop { exit: 0 });
                self.loops.push(Vec::new());
                self.scopes.push_block();
                let slot = self.scopes.declare_local(var);
                self.builder.emit(OpCode::ForVar { slot });
                self.block(body)?;
                self.scopes.pop_block();

                self.set_ref(end_span.source_ref(self.source_idx));
                self.builder.emit(OpCode::ForStep);
                self.builder.emit(OpCode::Jump(loop_start));

                let exit = self.builder.next_address();
                self.builder.emit(OpCode::Pop(3));
                self.builder.patch_jump(loop_start, exit);
                self.patch_breaks(exit);
            }

            Statement::GenericFor {
                names,
                exprs,
                body,
                end_span,
                ..
            } => {
                self.expression_list(exprs)?;
                self.builder.emit(OpCode::IterPrep);

                let loop_start = self.builder.next_address();
                for _ in 0..3 {
                    self.builder.emit(OpCode::Copy(2));
                }
                self.builder.emit(OpCode::Call { argc: 2 });
                let check = self.builder.emit(OpCode::IterCheck { exit: 0 });

                self.loops.push(Vec::new());
                self.scopes.push_block();
                for (i, name) in names.iter().enumerate() {
                    let slot = self.scopes.declare_local(name);
                    self.builder.emit(OpCode::Local { slot, index: i });
                }
                self.builder.emit(OpCode::Pop(1));
                self.block(body)?;
                self.scopes.pop_block();

                self.set_ref(end_span.source_ref(self.source_idx));
                self.builder.emit(OpCode::Jump(loop_start));

                let exit = self.builder.next_address();
                self.builder.emit(OpCode::Pop(3));
                self.builder.patch_jump(check, exit);
                self.patch_breaks(exit);
            }

            Statement::Function {
                path, method, func, ..
            } => {
                self.function(func)?;
                match (path.as_slice(), method) {
                    ([name], None) => {
                        let symbol = self.scopes.resolve(name);
                        self.builder.emit(OpCode::Store { symbol, index: 0 });
                    }
                    _ => {
                        let (first, rest) = path.split_first().ok_or_else(|| {
                            self.error(func.span, "function name expected")
                        })?;
                        let symbol = self.scopes.resolve(first);
                        self.builder.emit(OpCode::Load(symbol));
                        let mut keys: Vec<&str> = rest.iter().map(String::as_str).collect();
                        if let Some(m) = method {
                            keys.push(m);
                        }
                        let (last, middle) = keys.split_last().ok_or_else(|| {
                            self.error(func.span, "function name expected")
                        })?;
                        for key in middle {
                            self.string_literal(key);
                            self.builder.emit(OpCode::Index);
                        }
                        self.string_literal(last);
                        self.builder.emit(OpCode::IndexSet { index: 0 });
                    }
                }
                self.builder.emit(OpCode::Pop(1));
            }

            Statement::LocalFunction { name, func, .. } => {
                // the cell must exist before the closure captures it
                let slot = self.scopes.declare_local(name);
                self.builder.emit(OpCode::Literal(Value::Nil));
                self.builder.emit(OpCode::Local { slot, index: 0 });
                self.builder.emit(OpCode::Pop(1));
                self.function(func)?;
                self.builder.emit(OpCode::Store {
                    symbol: SymbolRef::local(name, slot),
                    index: 0,
                });
                self.builder.emit(OpCode::Pop(1));
            }

            Statement::Return { values, .. } => match values.len() {
                0 => {
                    self.builder.emit(OpCode::Ret { values: 0 });
                }
                1 => {
                    self.expression_multi(&values[0])?;
                    self.builder.emit(OpCode::Ret { values: 1 });
                }
                _ => {
                    self.expression_list(values)?;
                    self.builder.emit(OpCode::Ret { values: 1 });
                }
            },

            Statement::Break { span } => {
                let jump = self.builder.emit(OpCode::Jump(0));
                match self.loops.last_mut() {
                    Some(breaks) => breaks.push(jump),
                    None => {
                        return Err(self.error(
                            *span,
                            format!("<break> at line {} not inside a loop", span.line),
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    fn patch_breaks(&mut self, exit: usize) {
        for jump in self.loops.pop().unwrap_or_default() {
            self.builder.patch_jump(jump, exit);
        }
    }

    /// Assign element `index` of the value on top of the stack to `target`
    fn assign_to(&mut self, target: &Expression, index: usize) -> Result<(), SyntaxError> {
        match target {
            Expression::Name(name) => {
                let symbol = self.scopes.resolve(name);
                self.builder.emit(OpCode::Store { symbol, index });
            }
            Expression::Index { object, key } => {
                self.expression(object)?;
                self.expression(key)?;
                self.builder.emit(OpCode::IndexSet { index });
            }
            _ => {
                let span = self.builder_span();
                return Err(self.error(span, "cannot assign to this expression"));
            }
        }
        Ok(())
    }

    fn builder_span(&self) -> Span {
        self.refs
            .last()
            .map(|r| Span {
                line: r.from_line,
                column: r.from_char,
                end_line: r.to_line,
                end_column: r.to_char,
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // functions
    // ------------------------------------------------------------------

    /// Emit a nested function and leave its closure on the stack
    fn function(&mut self, func: &FunctionBody) -> Result<(), SyntaxError> {
        let skip = self.builder.emit(OpCode::Jump(0));
        let previous_ref = self.set_ref(func.span.source_ref(self.source_idx).non_breakable());

        let meta = self.builder.emit(OpCode::Meta {
            name: Arc::from(func.name.as_str()),
            kind: MetaKind::Function,
            length: 0,
        });
        let begin = self.builder.emit(OpCode::BeginFn {
            locals: Arc::from(Vec::new()),
        });
        self.builder.emit(OpCode::Args {
            params: func.params.len(),
            varargs: func.is_vararg,
        });

        self.scopes.push_function(func.is_vararg);
        for param in &func.params {
            self.scopes.declare_local(param);
        }
        let outer_loops = std::mem::take(&mut self.loops);
        let result = self.block(&func.body);
        self.loops = outer_loops;
        result?;

        self.set_ref(func.end_span.source_ref(self.source_idx));
        self.builder.emit(OpCode::Ret { values: 0 });

        let scope = self.scopes.pop_function();
        self.patch_locals(begin, &scope);
        self.builder.close_meta(meta);

        let after = self.builder.next_address();
        self.builder.patch_jump(skip, after);
        self.builder.set_source_ref(previous_ref);
        self.builder.emit(OpCode::Closure {
            entry: meta,
            captures: scope.captures(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    /// Push all values of `exprs` as one tuple
    fn expression_list(&mut self, exprs: &[Expression]) -> Result<(), SyntaxError> {
        if let Some((last, init)) = exprs.split_last() {
            for expr in init {
                self.expression(expr)?;
            }
            self.expression_multi(last)?;
        }
        self.builder.emit(OpCode::MkTuple(exprs.len()));
        Ok(())
    }

    /// Push exactly one value
    fn expression(&mut self, expr: &Expression) -> Result<(), SyntaxError> {
        self.expression_multi(expr)?;
        if expr.is_multi_value() {
            self.builder.emit(OpCode::Scalar);
        }
        Ok(())
    }

    /// Push the value of `expr`, keeping every result of calls and `...`
    fn expression_multi(&mut self, expr: &Expression) -> Result<(), SyntaxError> {
        match expr {
            Expression::Nil => {
                self.builder.emit(OpCode::Literal(Value::Nil));
            }
            Expression::Boolean(b) => {
                self.builder.emit(OpCode::Literal(Value::Boolean(*b)));
            }
            Expression::Number(n) => {
                self.builder.emit(OpCode::Literal(Value::Number(*n)));
            }
            Expression::String(s) => self.string_literal(s),
            Expression::VarArgs => {
                if !self.scopes.current().is_vararg() {
                    let span = self.builder_span();
                    return Err(self.error(span, "cannot use '...' outside a vararg function"));
                }
                self.builder.emit(OpCode::VarArgs);
            }
            Expression::Function(func) => self.function(func)?,
            Expression::Table(fields) => self.table(fields)?,
            Expression::Binary { op, left, right } => {
                self.expression(left)?;
                self.expression(right)?;
                self.builder.emit(OpCode::Binary(*op));
            }
            Expression::Logical { op, left, right } => {
                self.expression(left)?;
                let jump = match op {
                    LogicalOp::And => self.builder.emit(OpCode::JfOrPop(0)),
                    LogicalOp::Or => self.builder.emit(OpCode::JtOrPop(0)),
                };
                self.expression(right)?;
                let end = self.builder.next_address();
                self.builder.patch_jump(jump, end);
            }
            Expression::Unary { op, operand } => {
                self.expression(operand)?;
                self.builder.emit(match op {
                    UnaryOp::Not => OpCode::Not,
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Len => OpCode::Len,
                });
            }
            Expression::Name(name) => {
                let symbol = self.scopes.resolve(name);
                self.builder.emit(OpCode::Load(symbol));
            }
            Expression::Index { object, key } => {
                self.expression(object)?;
                self.expression(key)?;
                self.builder.emit(OpCode::Index);
            }
            Expression::Call { func, args } => {
                self.expression(func)?;
                self.arguments(args)?;
                self.builder.emit(OpCode::Call { argc: args.len() });
            }
            Expression::MethodCall {
                object,
                method,
                args,
            } => {
                self.expression(object)?;
                let name = self.intern(method);
                self.builder.emit(OpCode::Method { name });
                self.arguments(args)?;
                self.builder.emit(OpCode::Call {
                    argc: args.len() + 1,
                });
            }
            Expression::Paren(inner) => self.expression(inner)?,
        }
        Ok(())
    }

    /// Push call arguments; only the last one may expand
    fn arguments(&mut self, args: &[Expression]) -> Result<(), SyntaxError> {
        if let Some((last, init)) = args.split_last() {
            for arg in init {
                self.expression(arg)?;
            }
            self.expression_multi(last)?;
        }
        Ok(())
    }

    fn table(&mut self, fields: &[TableField]) -> Result<(), SyntaxError> {
        self.builder.emit(OpCode::NewTable);
        let mut position = 0;
        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(expr) => {
                    position += 1;
                    let expand = i + 1 == fields.len() && expr.is_multi_value();
                    if expand {
                        self.expression_multi(expr)?;
                    } else {
                        self.expression(expr)?;
                    }
                    self.builder.emit(OpCode::TblAppend {
                        index: position,
                        expand,
                    });
                }
                TableField::Named(name, value) => {
                    self.string_literal(name);
                    self.expression(value)?;
                    self.builder.emit(OpCode::TblSet);
                }
                TableField::Keyed(key, value) => {
                    self.expression(key)?;
                    self.expression(value)?;
                    self.builder.emit(OpCode::TblSet);
                }
            }
        }
        Ok(())
    }
}
