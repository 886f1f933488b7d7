//! Lexical scopes as a linked chain of hash maps.
//!
//! The root scope is backed by the globals table so that `_G` and global
//! names stay in agreement. `set_local` writes the current node; `set`
//! walks outward to the defining node and reports a miss so the caller
//! can route the write through the globals table (where `__newindex`
//! participates). Function scopes hold the vararg vector.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::{LuaValue, TableRef};

pub struct Scope {
    kind: ScopeKind,
    varargs: RefCell<Option<Rc<Vec<LuaValue>>>>,
    parent: Option<Rc<Scope>>,
}

enum ScopeKind {
    /// The program-level scope; reads and writes go to the globals table.
    Root(TableRef),
    Block(RefCell<HashMap<Rc<str>, LuaValue>>),
}

impl Scope {
    /// The program-level scope backed by the globals table.
    pub fn root(globals: TableRef) -> Rc<Scope> {
        Rc::new(Scope {
            kind: ScopeKind::Root(globals),
            varargs: RefCell::new(None),
            parent: None,
        })
    }

    /// Open a child scope; new bindings shadow without touching the
    /// parent.
    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            kind: ScopeKind::Block(RefCell::new(HashMap::new())),
            varargs: RefCell::new(None),
            parent: Some(parent.clone()),
        })
    }

    /// Walk the chain for a binding. A miss on every block node falls
    /// through to a raw read of the globals table; metatable-aware
    /// global reads are routed by the evaluator instead, which consults
    /// the analysis name map first.
    pub fn get(&self, name: &str) -> LuaValue {
        let mut scope = self;
        loop {
            match &scope.kind {
                ScopeKind::Block(map) => {
                    if let Some(v) = map.borrow().get(name) {
                        return v.clone();
                    }
                }
                ScopeKind::Root(globals) => return globals.borrow().raw_get_str(name),
            }
            match &scope.parent {
                Some(p) => scope = p,
                None => return LuaValue::Nil,
            }
        }
    }

    /// Rewrite the nearest enclosing binding. Returns false when no
    /// block node defines `name`, in which case the caller performs a
    /// global write.
    pub fn set(&self, name: &str, value: LuaValue) -> bool {
        let mut scope = self;
        loop {
            if let ScopeKind::Block(map) = &scope.kind {
                let mut map = map.borrow_mut();
                if let Some(slot) = map.get_mut(name) {
                    *slot = value;
                    return true;
                }
            }
            match &scope.parent {
                Some(p) => scope = p,
                None => return false,
            }
        }
    }

    /// Bind in this scope, shadowing any outer binding of the same name.
    pub fn set_local(&self, name: Rc<str>, value: LuaValue) {
        match &self.kind {
            ScopeKind::Block(map) => {
                map.borrow_mut().insert(name, value);
            }
            // A local at the root only happens for degenerate chunks;
            // it lands in the globals table.
            ScopeKind::Root(globals) => {
                globals.borrow_mut().raw_set_str(&name, value);
            }
        }
    }

    /// Install the vararg vector (function entry).
    pub fn set_varargs(&self, values: Vec<LuaValue>) {
        *self.varargs.borrow_mut() = Some(Rc::new(values));
    }

    /// The varargs of the nearest enclosing function scope.
    pub fn varargs(&self) -> Rc<Vec<LuaValue>> {
        let mut scope = self;
        loop {
            if let Some(v) = scope.varargs.borrow().as_ref() {
                return v.clone();
            }
            match &scope.parent {
                Some(p) => scope = p,
                None => return Rc::new(Vec::new()),
            }
        }
    }
}
