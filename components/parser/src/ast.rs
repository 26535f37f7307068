//! Abstract Syntax Tree node definitions

use bytecode_system::BinaryOp;
use core_types::SourceRef;

/// A 1-based source span, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// First line
    pub line: usize,
    /// First column
    pub column: usize,
    /// Last line
    pub end_line: usize,
    /// Last column
    pub end_column: usize,
}

impl Span {
    /// Span covering `self` through `other`
    pub fn to(self, other: Span) -> Span {
        Span {
            line: self.line,
            column: self.column,
            end_line: other.end_line,
            end_column: other.end_column,
        }
    }

    /// Source reference for this span inside source `source_idx`
    pub fn source_ref(self, source_idx: usize) -> SourceRef {
        SourceRef::new(
            source_idx,
            self.line,
            self.column,
            self.end_line,
            self.end_column,
        )
    }
}

/// A sequence of statements; a `return` can only be the last one
pub type Block = Vec<Statement>;

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `local a, b = ...`
    Local {
        /// Declared names
        names: Vec<String>,
        /// Initializers
        values: Vec<Expression>,
        /// Source location
        span: Span,
    },

    /// `a, b.c = ...`
    Assign {
        /// Assignment targets, names or index expressions
        targets: Vec<Expression>,
        /// Right-hand side
        values: Vec<Expression>,
        /// Source location
        span: Span,
    },

    /// A call used as a statement
    Call {
        /// The call or method call expression
        call: Expression,
        /// Source location
        span: Span,
    },

    /// `do ... end`
    Do {
        /// Body
        body: Block,
        /// Source location
        span: Span,
    },

    /// `while cond do ... end`
    While {
        /// Loop condition
        condition: Expression,
        /// Body
        body: Block,
        /// Header location
        span: Span,
        /// Location of the closing `end`
        end_span: Span,
    },

    /// `repeat ... until cond`
    Repeat {
        /// Body
        body: Block,
        /// Exit condition, evaluated in the body's scope
        condition: Expression,
        /// Location of the `until` clause
        span: Span,
    },

    /// `if ... elseif ... else ... end`
    If {
        /// Conditions with their blocks, in order
        clauses: Vec<(Expression, Block, Span)>,
        /// Trailing `else` block
        else_block: Option<Block>,
        /// Header location
        span: Span,
    },

    /// `for v = a, b, c do ... end`
    NumericFor {
        /// Loop variable
        var: String,
        /// Initial value
        start: Expression,
        /// Limit
        limit: Expression,
        /// Optional step
        step: Option<Expression>,
        /// Body
        body: Block,
        /// Header location
        span: Span,
        /// Location of the closing `end`
        end_span: Span,
    },

    /// `for k, v in explist do ... end`
    GenericFor {
        /// Loop variables
        names: Vec<String>,
        /// Iterator expressions
        exprs: Vec<Expression>,
        /// Body
        body: Block,
        /// Header location
        span: Span,
        /// Location of the closing `end`
        end_span: Span,
    },

    /// `function a.b:c() ... end`
    Function {
        /// Dotted path of the target
        path: Vec<String>,
        /// Method name after `:`
        method: Option<String>,
        /// The function
        func: FunctionBody,
        /// Source location of the header
        span: Span,
    },

    /// `local function f() ... end`
    LocalFunction {
        /// Local name
        name: String,
        /// The function
        func: FunctionBody,
        /// Source location of the header
        span: Span,
    },

    /// `return ...`
    Return {
        /// Returned values
        values: Vec<Expression>,
        /// Source location
        span: Span,
    },

    /// `break`
    Break {
        /// Source location
        span: Span,
    },
}

impl Statement {
    /// Location the statement's first instruction maps to
    pub fn span(&self) -> Span {
        match self {
            Statement::Local { span, .. }
            | Statement::Assign { span, .. }
            | Statement::Call { span, .. }
            | Statement::Do { span, .. }
            | Statement::While { span, .. }
            | Statement::Repeat { span, .. }
            | Statement::If { span, .. }
            | Statement::NumericFor { span, .. }
            | Statement::GenericFor { span, .. }
            | Statement::Function { span, .. }
            | Statement::LocalFunction { span, .. }
            | Statement::Return { span, .. }
            | Statement::Break { span } => *span,
        }
    }
}

/// A function literal
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    /// Friendly name used in stack traces
    pub name: String,
    /// Named parameters, `self` first for methods
    pub params: Vec<String>,
    /// Whether the parameter list ends in `...`
    pub is_vararg: bool,
    /// Body statements
    pub body: Block,
    /// Location of the `function` keyword through the parameter list
    pub span: Span,
    /// Location of the closing `end`
    pub end_span: Span,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// unary `-`
    Neg,
    /// `#`
    Len,
}

/// Table constructor fields
#[derive(Debug, Clone, PartialEq)]
pub enum TableField {
    /// `expr`
    Positional(Expression),
    /// `name = expr`
    Named(String, Expression),
    /// `[key] = expr`
    Keyed(Expression, Expression),
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `nil`
    Nil,
    /// `true` / `false`
    Boolean(bool),
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// `...`
    VarArgs,
    /// `function ... end`
    Function(Box<FunctionBody>),
    /// `{ ... }`
    Table(Vec<TableField>),
    /// Arithmetic, comparison or concatenation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// `and` / `or`
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },
    /// Variable reference
    Name(String),
    /// `object[key]` or `object.key`
    Index {
        /// Indexed value
        object: Box<Expression>,
        /// Key
        key: Box<Expression>,
    },
    /// `f(args)`
    Call {
        /// Callee
        func: Box<Expression>,
        /// Arguments
        args: Vec<Expression>,
    },
    /// `obj:name(args)`
    MethodCall {
        /// Receiver
        object: Box<Expression>,
        /// Method name
        method: String,
        /// Arguments, not including the receiver
        args: Vec<Expression>,
    },
    /// `(expr)`, truncating multiple results to one
    Paren(Box<Expression>),
}

impl Expression {
    /// True for expressions that can produce several values
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            Expression::Call { .. } | Expression::MethodCall { .. } | Expression::VarArgs
        )
    }

    /// True for expressions that can be assigned to
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expression::Name(_) | Expression::Index { .. })
    }
}
