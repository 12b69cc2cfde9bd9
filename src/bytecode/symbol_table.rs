use std::collections::HashMap;

use crate::runtime::builtins::BUILTINS;

/// Where a binding lives at runtime, which decides the load/store opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Slot in the session's globals store.
    Global,
    /// Slot relative to the active frame's base pointer.
    Local,
    /// Index into the builtin registry.
    Builtin,
    /// Index into the active closure's captured values.
    Free,
    /// The function currently being defined; loads its own closure.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope. The root table (no outer) holds globals and builtins;
/// each function body gets a table enclosing its definer's.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root table with every builtin bound at its registry index.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            table.define_builtin(index, builtin.name);
        }
        table
    }

    /// Nested scope for a function body. Takes the outer table by value;
    /// `into_outer` gives it back.
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Slots used by `define` so far: the local count of a function body.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Bindings captured from enclosing functions, in capture order.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    /// Binds `name` to the next slot. Redefining a name shadows it; the old
    /// slot is never reused.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Binds the name of the function whose body this table belongs to.
    /// Does not take a slot; parameters and locals shadow it.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Looks `name` up, innermost scope first.
    ///
    /// Global and builtin bindings come back unchanged from any depth. A
    /// binding owned by an enclosing *function* is captured: recorded in
    /// this table's free list and returned as a `Free` symbol. Since the
    /// lookup recurses, every table between the owner and here captures it
    /// too, which builds the chain of free indices nested closures need.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let symbol = self.outer.as_mut()?.resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Free | SymbolScope::Function => {
                Some(self.define_free(symbol))
            }
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let name = original.name.clone();
        self.free_symbols.push(original);

        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        // Cached so the next lookup hits locally and is not captured twice.
        self.store.insert(name, symbol.clone());
        symbol
    }
}
