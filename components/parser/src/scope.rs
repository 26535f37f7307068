//! Compile-time symbol resolution
//!
//! Each function being compiled owns a [`FunctionScope`]: the names of its
//! local slots, a stack of blocks mapping visible names to slots, and the
//! upvalues it captures from the enclosing function. Leaving a block hides
//! its names but keeps their slots, so every declaration in a function has
//! its own slot.
//!
//! Names that are neither local nor reachable as upvalues become globals,
//! read through whatever `_ENV` resolves to at that point.

use std::sync::Arc;

use bytecode_system::SymbolRef;
use core_types::ENV_NAME;

/// Symbol table of one function under compilation
#[derive(Debug, Default)]
pub struct FunctionScope {
    locals: Vec<Arc<str>>,
    blocks: Vec<Vec<(Arc<str>, usize)>>,
    upvalues: Vec<(Arc<str>, SymbolRef)>,
    is_vararg: bool,
}

impl FunctionScope {
    fn new(is_vararg: bool) -> Self {
        Self {
            locals: Vec::new(),
            blocks: vec![Vec::new()],
            upvalues: Vec::new(),
            is_vararg,
        }
    }

    /// One name per allocated slot
    pub fn local_names(&self) -> Arc<[Arc<str>]> {
        self.locals.clone().into()
    }

    /// What each upvalue captures in the enclosing function, in upvalue
    /// index order
    pub fn captures(&self) -> Arc<[SymbolRef]> {
        self.upvalues
            .iter()
            .map(|(_, sym)| sym.clone())
            .collect::<Vec<_>>()
            .into()
    }

    /// Whether the function accepts `...`
    pub fn is_vararg(&self) -> bool {
        self.is_vararg
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.blocks
            .iter()
            .rev()
            .flat_map(|block| block.iter().rev())
            .find(|(n, _)| &**n == name)
            .map(|(_, slot)| *slot)
    }

    fn find_upvalue(&self, name: &str) -> Option<usize> {
        self.upvalues.iter().position(|(n, _)| &**n == name)
    }

    fn add_upvalue(&mut self, name: Arc<str>, capture: SymbolRef) -> usize {
        self.upvalues.push((name, capture));
        self.upvalues.len() - 1
    }
}

/// Stack of functions being compiled, outermost first
#[derive(Debug)]
pub struct ScopeStack {
    functions: Vec<FunctionScope>,
}

impl ScopeStack {
    /// Scope for a chunk. With `env_upvalue` the chunk's only upvalue is
    /// `_ENV`, filled in by the loader; without it globals resolve against
    /// the script's default environment.
    pub fn new(env_upvalue: bool) -> Self {
        let mut root = FunctionScope::new(true);
        if env_upvalue {
            root.add_upvalue(Arc::from(ENV_NAME), SymbolRef::DefaultEnv);
        }
        Self {
            functions: vec![root],
        }
    }

    /// Enter a nested function
    pub fn push_function(&mut self, is_vararg: bool) {
        self.functions.push(FunctionScope::new(is_vararg));
    }

    /// Leave the innermost function and hand out its symbol table
    pub fn pop_function(&mut self) -> FunctionScope {
        self.functions.pop().unwrap_or_default()
    }

    /// Innermost function
    pub fn current(&self) -> &FunctionScope {
        // the root function is never popped by the generator
        &self.functions[self.functions.len() - 1]
    }

    fn current_mut(&mut self) -> &mut FunctionScope {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    /// Open a block in the innermost function
    pub fn push_block(&mut self) {
        self.current_mut().blocks.push(Vec::new());
    }

    /// Close the innermost block; its names go out of scope
    pub fn pop_block(&mut self) {
        self.current_mut().blocks.pop();
    }

    /// Declare a local in the innermost block and return its slot
    pub fn declare_local(&mut self, name: &str) -> usize {
        let name: Arc<str> = Arc::from(name);
        let scope = self.current_mut();
        let slot = scope.locals.len();
        scope.locals.push(name.clone());
        if let Some(block) = scope.blocks.last_mut() {
            block.push((name, slot));
        }
        slot
    }

    /// Resolve an identifier at the current point of compilation
    pub fn resolve(&mut self, name: &str) -> SymbolRef {
        let depth = self.functions.len() - 1;
        if let Some(sym) = self.resolve_in(depth, name) {
            return sym;
        }
        let env = if name == ENV_NAME {
            None
        } else {
            self.resolve_in(depth, ENV_NAME)
        };
        SymbolRef::global(name, env.unwrap_or(SymbolRef::DefaultEnv))
    }

    /// Resolve `name` as a local or upvalue of the function at `depth`,
    /// threading the capture through every function in between
    fn resolve_in(&mut self, depth: usize, name: &str) -> Option<SymbolRef> {
        let scope = &self.functions[depth];
        if let Some(index) = scope.find_local(name) {
            return Some(SymbolRef::local(name, index));
        }
        if let Some(index) = scope.find_upvalue(name) {
            return Some(SymbolRef::upvalue(name, index));
        }
        if depth == 0 {
            return None;
        }

        let outer = self.resolve_in(depth - 1, name)?;
        let index = self.functions[depth].add_upvalue(Arc::from(name), outer);
        Some(SymbolRef::upvalue(name, index))
    }
}
