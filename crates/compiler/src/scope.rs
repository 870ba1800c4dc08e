//! Lexical scoping shared by the parser (duplicate detection) and compiler
//! (name resolution to registers), per §3's Scope/Symbol model.

use osfl_core::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Const,
    Func,
    Class,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub location: SourceLocation,
    /// The register a `Var`/`Const`/parameter is bound to. Unused for
    /// `Func`/`Class` symbols, which resolve through the function table
    /// instead (§4.3).
    pub register: Option<u8>,
}

/// A node in the scope tree: an ordered symbol list plus a parent link.
/// Scopes are created on frame/function/block entry and destroyed on exit;
/// lookup walks outward from the innermost scope.
#[derive(Debug, Default)]
pub struct Scope {
    symbols: Vec<Symbol>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    /// Pushes a new child scope, taking ownership of the current one as its
    /// parent. Returns the new, now-current scope.
    pub fn push(self) -> Scope {
        Scope {
            symbols: Vec::new(),
            parent: Some(Box::new(self)),
        }
    }

    /// Pops back to the parent scope, discarding this scope's symbols.
    /// Panics if called on the root scope, mirroring the spec's "destroying
    /// a scope with no parent is a programmer error" contract.
    pub fn pop(self) -> Scope {
        *self.parent.expect("attempted to pop the root scope")
    }

    /// Adds a symbol to this scope. Returns `Err` with the prior
    /// declaration's location if `name` is already declared in *this*
    /// scope (shadowing an outer scope's symbol is allowed).
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), SourceLocation> {
        if let Some(existing) = self.symbols.iter().find(|s| s.name == symbol.name) {
            return Err(existing.location.clone());
        }
        self.symbols.push(symbol);
        Ok(())
    }

    /// Looks up `name` starting in this scope and walking outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.lookup(name)))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        if let Some(index) = self.symbols.iter().position(|s| s.name == name) {
            return Some(&mut self.symbols[index]);
        }
        self.parent.as_deref_mut().and_then(|p| p.lookup_mut(name))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind,
            location: SourceLocation::synthetic(),
            register: None,
        }
    }

    #[test]
    fn duplicate_in_same_scope_is_rejected() {
        let mut scope = Scope::new();
        scope.declare(sym("x", SymbolKind::Var)).unwrap();
        assert!(scope.declare(sym("x", SymbolKind::Var)).is_err());
    }

    #[test]
    fn shadowing_an_outer_scope_is_allowed() {
        let mut outer = Scope::new();
        outer.declare(sym("x", SymbolKind::Var)).unwrap();
        let mut inner = outer.push();
        assert!(inner.declare(sym("x", SymbolKind::Var)).is_ok());
        assert_eq!(inner.lookup("x").unwrap().kind, SymbolKind::Var);
    }

    #[test]
    fn lookup_walks_outward() {
        let mut outer = Scope::new();
        outer.declare(sym("x", SymbolKind::Const)).unwrap();
        let inner = outer.push();
        assert!(inner.lookup("x").is_some());
        assert!(inner.lookup("missing").is_none());
    }

    #[test]
    fn pop_restores_parent_and_drops_inner_symbols() {
        let mut outer = Scope::new();
        outer.declare(sym("x", SymbolKind::Var)).unwrap();
        let mut inner = outer.push();
        inner.declare(sym("y", SymbolKind::Var)).unwrap();
        let restored = inner.pop();
        assert!(restored.lookup("x").is_some());
        assert!(restored.lookup("y").is_none());
    }
}
