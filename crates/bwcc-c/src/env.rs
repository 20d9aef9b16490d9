//! Scope environment shared between the lexer and the parser.
//!
//! The parser owns a stack of per-block name tables; the lexer only sees it
//! through [`ScopeHooks`], which it invokes on `{`, on `}`, and on every
//! identifier to decide between `ID` and `TYPEID`. This feedback resolves
//! the typedef-name ambiguity without a separate pre-pass.

use std::cell::RefCell;
use std::collections::HashMap;

/// What a name is bound to inside one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Typedef,
    Identifier,
}

/// Callbacks the lexer drives. Both brace hooks fire before the brace token
/// is handed to the parser, so lookahead past a `{` already sees the new
/// scope.
pub trait ScopeHooks {
    fn on_lbrace(&self);
    fn on_rbrace(&self);
    fn is_typeid(&self, name: &str) -> bool;
}

/// LIFO of name → kind tables. The bottom entry is the file scope and is
/// never popped.
#[derive(Debug)]
pub struct Env {
    scopes: RefCell<Vec<HashMap<String, NameKind>>>,
}

impl Env {
    pub fn new() -> Env {
        Env {
            scopes: RefCell::new(vec![HashMap::new()]),
        }
    }

    pub fn push_scope(&self) {
        self.scopes.borrow_mut().push(HashMap::new());
    }

    pub fn pop_scope(&self) {
        let mut scopes = self.scopes.borrow_mut();
        // A stray `}` at file scope surfaces as a syntax error later; the
        // file scope itself must survive it.
        if scopes.len() > 1 {
            scopes.pop();
        }
    }

    /// Bind `name` in the innermost scope. Fails when the same scope already
    /// binds the name to the opposite kind.
    pub fn declare(&self, name: &str, kind: NameKind) -> Result<(), NameKind> {
        let mut scopes = self.scopes.borrow_mut();
        let scope = scopes.last_mut().unwrap();
        match scope.get(name) {
            Some(&existing) if existing != kind => Err(existing),
            _ => {
                scope.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    /// Innermost-out lookup; the first binding found wins.
    pub fn is_type_in_scope(&self, name: &str) -> bool {
        for scope in self.scopes.borrow().iter().rev() {
            if let Some(&kind) = scope.get(name) {
                return kind == NameKind::Typedef;
            }
        }
        false
    }
}

impl Default for Env {
    fn default() -> Env {
        Env::new()
    }
}

impl ScopeHooks for Env {
    fn on_lbrace(&self) {
        self.push_scope();
    }

    fn on_rbrace(&self) {
        self.pop_scope();
    }

    fn is_typeid(&self, name: &str) -> bool {
        self.is_type_in_scope(name)
    }
}
