use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The enclosing function literal's own name.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Bindings of one lexical scope. Enclosed tables belong to function bodies.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    store: HashMap<String, Symbol>,
    pub num_definitions: usize,
    /// Symbols captured from enclosing scopes, in capture-slot order. Each entry
    /// is the symbol as the enclosing scope resolves it.
    pub free_symbols: Vec<Symbol>,
    enclosed: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn new_enclosed() -> Self {
        SymbolTable { enclosed: true, ..SymbolTable::default() }
    }

    /// Bind `name` to the next slot. Redefinition takes a fresh slot.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.enclosed { SymbolScope::Local } else { SymbolScope::Global };
        let symbol = Symbol { name: name.to_string(), scope, index: self.num_definitions };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol { name: name.to_string(), scope: SymbolScope::Builtin, index };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol { name: name.to_string(), scope: SymbolScope::Function, index: 0 };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Look `name` up in this table only.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.store.get(name)
    }
}

/// The tables visible from the code being compiled: the session-owned global
/// table at the bottom, one owned table per enclosing function literal above it.
pub struct ScopeChain<'a> {
    global: &'a mut SymbolTable,
    enclosed: Vec<SymbolTable>,
}

impl<'a> ScopeChain<'a> {
    pub fn new(global: &'a mut SymbolTable) -> Self {
        ScopeChain { global, enclosed: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.enclosed.len()
    }

    pub fn push(&mut self) {
        self.enclosed.push(SymbolTable::new_enclosed());
    }

    /// Pop the innermost function table. The global table is never popped.
    pub fn pop(&mut self) -> Option<SymbolTable> {
        self.enclosed.pop()
    }

    pub fn current(&mut self) -> &mut SymbolTable {
        match self.enclosed.last_mut() {
            Some(table) => table,
            None => &mut *self.global,
        }
    }

    fn level_mut(&mut self, level: usize) -> &mut SymbolTable {
        match level {
            0 => &mut *self.global,
            n => &mut self.enclosed[n - 1],
        }
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        self.current().define(name)
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        self.current().define_function_name(name)
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        self.resolve_at(self.enclosed.len(), name)
    }

    /// Globals and builtins pass through unchanged; anything bound in an
    /// enclosing function is captured as a free symbol at every level in between.
    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.level_mut(level).get(name) {
            return Some(symbol.clone());
        }
        if level == 0 {
            return None;
        }

        let outer = self.resolve_at(level - 1, name)?;
        match outer.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(outer),
            _ => Some(self.level_mut(level).define_free(outer)),
        }
    }
}
