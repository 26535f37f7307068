//! Operation codes for the stack machine.
//!
//! The virtual machine evaluates expressions on a value stack. Locals live
//! in per-frame cells addressed by slot, so instructions name locals through
//! [`SymbolRef`]s rather than stack offsets.
//!
//! Stack effects are written `[before] -> [after]`, rightmost is the top.

use std::fmt;
use std::sync::Arc;

use core_types::Value;

use crate::SymbolRef;

/// Kind of code introduced by a [`OpCode::Meta`] header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    /// Top level of a loaded chunk
    Chunk,
    /// A function defined inside a chunk
    Function,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `..`
    Concat,
    /// `==`
    Eq,
    /// `~=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl BinaryOp {
    /// Source token of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// All operators, in encoding order.
    pub const ALL: [BinaryOp; 13] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::Pow,
        BinaryOp::Concat,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
    ];
}

/// A single stack-machine operation.
#[derive(Debug, Clone)]
pub enum OpCode {
    /// Do nothing
    Nop,
    /// Function header; `length` counts every instruction of the function
    /// including this one
    Meta {
        /// Friendly function name
        name: Arc<str>,
        /// Chunk or nested function
        kind: MetaKind,
        /// Number of instructions in the function
        length: usize,
    },
    /// Allocate the frame's local slots; names are kept for the debugger
    BeginFn {
        /// One name per local slot
        locals: Arc<[Arc<str>]>,
    },
    /// Bind call arguments to slots `0..params`, keeping extras as varargs
    Args {
        /// Named parameter count
        params: usize,
        /// Whether the function is variadic
        varargs: bool,
    },
    /// `[] -> [v]`
    Literal(Value),
    /// `[a1..an] -> []`
    Pop(usize),
    /// `[.., x, a1..an] -> [.., x, a1..an, x]`: push a copy of the value `n`
    /// positions below the top
    Copy(usize),
    /// `[] -> [v]`: read a symbol
    Load(SymbolRef),
    /// `[t] -> [t]`: assign element `index` of the top value to a symbol
    Store {
        /// Assignment target
        symbol: SymbolRef,
        /// Element of the top tuple to assign
        index: usize,
    },
    /// `[t] -> [t]`: declare a fresh local from element `index` of the top value
    Local {
        /// Local slot
        slot: usize,
        /// Element of the top tuple to assign
        index: usize,
    },
    /// `[] -> [f]`: create a closure over the listed symbols
    Closure {
        /// Address of the function's `Meta` header
        entry: usize,
        /// Captured locals and upvalues
        captures: Arc<[SymbolRef]>,
    },
    /// `[] -> [...]`: push the frame's varargs as a tuple
    VarArgs,
    /// `[f, a1..an] -> [r]`: call with `argc` arguments
    Call {
        /// Number of argument expressions
        argc: usize,
    },
    /// `[o] -> [o[name], o]`: prepare a method call
    Method {
        /// Method name
        name: Arc<str>,
    },
    /// Return from the current function with 0 or 1 (tuple) values
    Ret {
        /// 0 or 1
        values: usize,
    },
    /// Unconditional jump
    Jump(usize),
    /// `[c] -> []`: jump when `c` is falsy
    JumpIfFalse(usize),
    /// `[c] -> [c]` and jump when falsy, else `[c] -> []`
    JfOrPop(usize),
    /// `[c] -> [c]` and jump when truthy, else `[c] -> []`
    JtOrPop(usize),
    /// `[a, b] -> [a op b]`
    Binary(BinaryOp),
    /// `[a] -> [not a]`
    Not,
    /// `[a] -> [-a]`
    Neg,
    /// `[a] -> [#a]`
    Len,
    /// `[] -> [t]`
    NewTable,
    /// `[t, k, v] -> [t]`: raw keyed field
    TblSet,
    /// `[t, v] -> [t]`: positional field at `index`, expanding a trailing
    /// tuple when `expand` is set
    TblAppend {
        /// 1-based position of the field
        index: usize,
        /// Expand a multi-value into consecutive positions
        expand: bool,
    },
    /// `[o, k] -> [o[k]]`
    Index,
    /// `[t, o, k] -> [t]`: `o[k] = element index of t`
    IndexSet {
        /// Element of the right-hand side tuple to assign
        index: usize,
    },
    /// `[a1..an] -> [(a1..an)]`: build a tuple, expanding the last element
    MkTuple(usize),
    /// `[t] -> [t1]`: truncate a tuple to its first element
    Scalar,
    /// `[a, b, c] -> [a, b, c]`: validate numeric loop parameters
    ForPrep,
    /// `[v, l, s]`: jump to `exit` when the numeric loop is finished
    ForLoop {
        /// Loop exit address
        exit: usize,
    },
    /// `[v, l, s] -> [v+s, l, s]`
    ForStep,
    /// Declare the loop variable in `slot` from the control value
    ForVar {
        /// Local slot of the loop variable
        slot: usize,
    },
    /// `[(f, s, c)] -> [f, s, c]`: spread generic-for iterator triple
    IterPrep,
    /// `[f, s, c, r]`: when `r[0]` is nil pop `r` and jump to `exit`,
    /// otherwise store `r[0]` as the new control value
    IterCheck {
        /// Loop exit address
        exit: usize,
    },
}

impl OpCode {
    /// Jump target of control-flow instructions.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            OpCode::Jump(t)
            | OpCode::JumpIfFalse(t)
            | OpCode::JfOrPop(t)
            | OpCode::JtOrPop(t)
            | OpCode::ForLoop { exit: t }
            | OpCode::IterCheck { exit: t } => Some(*t),
            _ => None,
        }
    }

    /// Rewrite the jump target of a control-flow instruction.
    pub fn set_jump_target(&mut self, target: usize) {
        match self {
            OpCode::Jump(t)
            | OpCode::JumpIfFalse(t)
            | OpCode::JfOrPop(t)
            | OpCode::JtOrPop(t)
            | OpCode::ForLoop { exit: t }
            | OpCode::IterCheck { exit: t } => *t = target,
            _ => {}
        }
    }

    /// Instruction mnemonic.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Meta { .. } => "META",
            OpCode::BeginFn { .. } => "BEGINFN",
            OpCode::Args { .. } => "ARGS",
            OpCode::Literal(_) => "LITERAL",
            OpCode::Pop(_) => "POP",
            OpCode::Copy(_) => "COPY",
            OpCode::Load(_) => "LOAD",
            OpCode::Store { .. } => "STORE",
            OpCode::Local { .. } => "LOCAL",
            OpCode::Closure { .. } => "CLOSURE",
            OpCode::VarArgs => "VARARGS",
            OpCode::Call { .. } => "CALL",
            OpCode::Method { .. } => "METHOD",
            OpCode::Ret { .. } => "RET",
            OpCode::Jump(_) => "JUMP",
            OpCode::JumpIfFalse(_) => "JF",
            OpCode::JfOrPop(_) => "JFORPOP",
            OpCode::JtOrPop(_) => "JTORPOP",
            OpCode::Binary(_) => "BINOP",
            OpCode::Not => "NOT",
            OpCode::Neg => "NEG",
            OpCode::Len => "LEN",
            OpCode::NewTable => "NEWTABLE",
            OpCode::TblSet => "TBLSET",
            OpCode::TblAppend { .. } => "TBLAPPEND",
            OpCode::Index => "INDEX",
            OpCode::IndexSet { .. } => "INDEXSET",
            OpCode::MkTuple(_) => "MKTUPLE",
            OpCode::Scalar => "SCALAR",
            OpCode::ForPrep => "FORPREP",
            OpCode::ForLoop { .. } => "FORLOOP",
            OpCode::ForStep => "FORSTEP",
            OpCode::ForVar { .. } => "FORVAR",
            OpCode::IterPrep => "ITERPREP",
            OpCode::IterCheck { .. } => "ITERCHECK",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            OpCode::Meta { name: n, kind, length } => {
                write!(f, "{:<10} {} {:?} len={}", name, n, kind, length)
            }
            OpCode::BeginFn { locals } => write!(f, "{:<10} {}", name, locals.join(", ")),
            OpCode::Args { params, varargs } => {
                write!(f, "{:<10} {}{}", name, params, if *varargs { " ..." } else { "" })
            }
            OpCode::Literal(v) => match v {
                Value::String(s) => write!(f, "{:<10} {:?}", name, s),
                other => write!(f, "{:<10} {}", name, other),
            },
            OpCode::Pop(n) | OpCode::Copy(n) | OpCode::MkTuple(n) => write!(f, "{:<10} {}", name, n),
            OpCode::Load(sym) => write!(f, "{:<10} {}", name, sym),
            OpCode::Store { symbol, index } => write!(f, "{:<10} {} [{}]", name, symbol, index),
            OpCode::Local { slot, index } => write!(f, "{:<10} #{} [{}]", name, slot, index),
            OpCode::Closure { entry, captures } => {
                let caps: Vec<String> = captures.iter().map(|c| c.to_string()).collect();
                write!(f, "{:<10} {:04} ({})", name, entry, caps.join(", "))
            }
            OpCode::Call { argc } => write!(f, "{:<10} {}", name, argc),
            OpCode::Method { name: m } => write!(f, "{:<10} {}", name, m),
            OpCode::Ret { values } => write!(f, "{:<10} {}", name, values),
            OpCode::Binary(op) => write!(f, "{:<10} {}", name, op.symbol()),
            OpCode::TblAppend { index, expand } => {
                write!(f, "{:<10} {}{}", name, index, if *expand { " *" } else { "" })
            }
            OpCode::IndexSet { index } => write!(f, "{:<10} [{}]", name, index),
            OpCode::ForVar { slot } => write!(f, "{:<10} #{}", name, slot),
            other => match other.jump_target() {
                Some(t) => write!(f, "{:<10} {:04}", name, t),
                None => write!(f, "{}", name),
            },
        }
    }
}
