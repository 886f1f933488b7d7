//! Pre-execution analysis passes.
//!
//! The scope pass assigns integer scope ids (0 is the program-level
//! global scope) to every construct that opens a lexical scope — a block
//! that declares locals, a function body with parameters or varargs, a
//! for loop — and resolves each identifier to a local or global name.
//! The goto pass records a goto-scope per block that contains labels or
//! gotos, with parent links that stop at function boundaries, and
//! validates the Lua visibility rules. Both passes key their results by
//! node identity ids.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::*;
use crate::error::{LuaError, LuaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Local,
    Global,
}

/// Goto visibility record of one block.
#[derive(Debug)]
pub struct GotoScope {
    pub labels: Vec<Rc<str>>,
    pub parent: Option<u32>,
}

/// Derived maps attached to a chunk, consumed by the evaluator.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Blocks that open a lexical scope.
    pub block_scope: HashMap<u32, u32>,
    /// Function bodies that need a call scope.
    pub fn_scope: HashMap<u32, u32>,
    /// For statements (their control variables are locals).
    pub stmt_scope: HashMap<u32, u32>,
    /// Resolution of every `Name` expression.
    pub names: HashMap<u32, NameKind>,
    /// Resolution of the base name of `function a.b:c` statements.
    pub func_base: HashMap<u32, NameKind>,
    /// Blocks containing labels or gotos.
    pub goto_scopes: HashMap<u32, GotoScope>,
    scope_count: u32,
}

impl Analysis {
    pub fn opens_scope(&self, block_id: u32) -> bool {
        self.block_scope.contains_key(&block_id)
    }

    pub fn fn_needs_scope(&self, body_id: u32) -> bool {
        self.fn_scope.contains_key(&body_id)
    }

    pub fn name_kind(&self, expr_id: u32) -> NameKind {
        self.names.get(&expr_id).copied().unwrap_or(NameKind::Global)
    }

    pub fn func_base_kind(&self, stmt_id: u32) -> NameKind {
        self.func_base
            .get(&stmt_id)
            .copied()
            .unwrap_or(NameKind::Global)
    }

    pub fn block_has_label(&self, block_id: u32, label: &str) -> bool {
        self.goto_scopes
            .get(&block_id)
            .map(|gs| gs.labels.iter().any(|l| &**l == label))
            .unwrap_or(false)
    }

    fn next_scope(&mut self) -> u32 {
        self.scope_count += 1;
        self.scope_count
    }
}

/// Run both passes over a numbered chunk.
pub fn analyze(block: &Rc<Block>) -> LuaResult<Analysis> {
    let mut an = Analysis::default();
    {
        let mut walker = ScopeWalker {
            an: &mut an,
            stack: Vec::new(),
        };
        walker.walk_block(block, None);
    }
    {
        let mut walker = GotoWalker { an: &mut an };
        let mut chain = Vec::new();
        walker.walk_block(block, None, &mut chain, 0)?;
    }
    Ok(an)
}

// ---------------------------------------------------------------------
// Scope pass

struct ScopeWalker<'a> {
    an: &'a mut Analysis,
    /// Declared names per open scope, innermost last. Closures resolve
    /// through enclosing function scopes, so the stack is never reset.
    stack: Vec<HashSet<Rc<str>>>,
}

impl ScopeWalker<'_> {
    fn resolve(&self, name: &str) -> NameKind {
        for level in self.stack.iter().rev() {
            if level.contains(name) {
                return NameKind::Local;
            }
        }
        NameKind::Global
    }

    fn declare(&mut self, name: &Rc<str>) {
        if let Some(top) = self.stack.last_mut() {
            top.insert(name.clone());
        }
    }

    /// Walk a block; `tail` is a trailing expression evaluated inside
    /// the block's scope (the `until` condition of repeat).
    fn walk_block(&mut self, block: &Block, tail: Option<&Rc<Expr>>) {
        let opens = block.stmts.iter().any(|s| {
            matches!(
                s.kind,
                StmtKind::Local { .. } | StmtKind::LocalFunction { .. }
            )
        });
        if opens {
            let id = self.an.next_scope();
            self.an.block_scope.insert(block.id.get(), id);
            self.stack.push(HashSet::new());
        }
        for stmt in &block.stmts {
            self.walk_stmt(stmt);
        }
        if let Some(ret) = &block.ret {
            for e in &ret.exprs {
                self.walk_expr(e);
            }
        }
        if let Some(cond) = tail {
            self.walk_expr(cond);
        }
        if opens {
            self.stack.pop();
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Local { names, values } => {
                for e in values {
                    self.walk_expr(e);
                }
                for n in names {
                    self.declare(n);
                }
            }
            StmtKind::LocalFunction { name, body } => {
                // The name is visible inside the body (recursion).
                self.declare(name);
                self.walk_function(body);
            }
            StmtKind::Assign { targets, values } => {
                for t in targets {
                    self.walk_expr(t);
                }
                for e in values {
                    self.walk_expr(e);
                }
            }
            StmtKind::Call(e) => self.walk_expr(e),
            StmtKind::Do(b) => self.walk_block(b, None),
            StmtKind::While { cond, body } => {
                self.walk_expr(cond);
                self.walk_block(body, None);
            }
            StmtKind::Repeat { body, cond } => {
                self.walk_block(body, Some(cond));
            }
            StmtKind::If {
                clauses,
                else_block,
            } => {
                for clause in clauses {
                    self.walk_expr(&clause.cond);
                    self.walk_block(&clause.block, None);
                }
                if let Some(b) = else_block {
                    self.walk_block(b, None);
                }
            }
            StmtKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.walk_expr(start);
                self.walk_expr(limit);
                if let Some(s) = step {
                    self.walk_expr(s);
                }
                let id = self.an.next_scope();
                self.an.stmt_scope.insert(stmt.id.get(), id);
                self.stack.push(HashSet::new());
                self.declare(var);
                self.walk_block(body, None);
                self.stack.pop();
            }
            StmtKind::GenericFor { names, exprs, body } => {
                for e in exprs {
                    self.walk_expr(e);
                }
                let id = self.an.next_scope();
                self.an.stmt_scope.insert(stmt.id.get(), id);
                self.stack.push(HashSet::new());
                for n in names {
                    self.declare(n);
                }
                self.walk_block(body, None);
                self.stack.pop();
            }
            StmtKind::Function { name, body } => {
                let kind = self.resolve(&name.base);
                self.an.func_base.insert(stmt.id.get(), kind);
                self.walk_function(body);
            }
            StmtKind::Label(_) | StmtKind::Goto(_) | StmtKind::Break => {}
        }
    }

    fn walk_function(&mut self, body: &FunctionBody) {
        let needs_scope = !body.params.is_empty() || body.is_vararg;
        if needs_scope {
            let id = self.an.next_scope();
            self.an.fn_scope.insert(body.id.get(), id);
            self.stack.push(HashSet::new());
            for p in &body.params {
                self.declare(p);
            }
            self.walk_block(&body.block, None);
            self.stack.pop();
        } else {
            self.walk_block(&body.block, None);
        }
    }

    fn walk_expr(&mut self, expr: &Rc<Expr>) {
        match &expr.kind {
            ExprKind::Name(n) => {
                let kind = self.resolve(n);
                self.an.names.insert(expr.id.get(), kind);
            }
            ExprKind::Index { base, key } => {
                self.walk_expr(base);
                self.walk_expr(key);
            }
            ExprKind::Call { func, args } => {
                self.walk_expr(func);
                for a in args {
                    self.walk_expr(a);
                }
            }
            ExprKind::MethodCall { base, args, .. } => {
                self.walk_expr(base);
                for a in args {
                    self.walk_expr(a);
                }
            }
            ExprKind::Function(body) => self.walk_function(body),
            ExprKind::Table(fields) => {
                for field in fields {
                    match field {
                        TableField::Pos(v) => self.walk_expr(v),
                        TableField::Named { value, .. } => self.walk_expr(value),
                        TableField::Keyed { key, value } => {
                            self.walk_expr(key);
                            self.walk_expr(value);
                        }
                    }
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) => self.walk_expr(expr),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------
// Goto pass

struct GotoWalker<'a> {
    an: &'a mut Analysis,
}

/// One level of the enclosing-block chain, tracking which statement of
/// the block the walk is currently inside.
struct ChainLevel<'b> {
    block: &'b Block,
    index: usize,
}

impl GotoWalker<'_> {
    /// `parent_scope` is the nearest enclosing goto scope (None past a
    /// function boundary). `chain` holds the enclosing blocks of the
    /// current function. `loop_depth` validates `break`.
    fn walk_block<'b>(
        &mut self,
        block: &'b Block,
        parent_scope: Option<u32>,
        chain: &mut Vec<ChainLevel<'b>>,
        loop_depth: usize,
    ) -> LuaResult<()> {
        let mut labels = Vec::new();
        let mut has_goto = false;
        for stmt in &block.stmts {
            match &stmt.kind {
                StmtKind::Label(name) => {
                    if labels.iter().any(|l: &Rc<str>| l == name) {
                        return Err(LuaError::parse(
                            format!("label '{}' already defined", name),
                            stmt.line,
                            1,
                        ));
                    }
                    labels.push(name.clone());
                }
                StmtKind::Goto(_) => has_goto = true,
                _ => {}
            }
        }
        let own_scope = if !labels.is_empty() || has_goto {
            self.an.goto_scopes.insert(
                block.id.get(),
                GotoScope {
                    labels,
                    parent: parent_scope,
                },
            );
            Some(block.id.get())
        } else {
            parent_scope
        };

        chain.push(ChainLevel { block, index: 0 });
        let depth = chain.len() - 1;
        for (i, stmt) in block.stmts.iter().enumerate() {
            chain[depth].index = i;
            self.walk_stmt(stmt, own_scope, chain, loop_depth)?;
        }
        chain.pop();
        Ok(())
    }

    fn walk_stmt<'b>(
        &mut self,
        stmt: &'b Stmt,
        scope: Option<u32>,
        chain: &mut Vec<ChainLevel<'b>>,
        loop_depth: usize,
    ) -> LuaResult<()> {
        match &stmt.kind {
            StmtKind::Goto(target) => self.check_goto(stmt, target, chain),
            StmtKind::Break => {
                if loop_depth == 0 {
                    return Err(LuaError::parse(
                        "break outside a loop",
                        stmt.line,
                        1,
                    ));
                }
                Ok(())
            }
            StmtKind::Do(b) => self.walk_block(b, scope, chain, loop_depth),
            StmtKind::While { body, .. } => self.walk_block(body, scope, chain, loop_depth + 1),
            StmtKind::Repeat { body, .. } => self.walk_block(body, scope, chain, loop_depth + 1),
            StmtKind::If {
                clauses,
                else_block,
            } => {
                for clause in clauses {
                    self.walk_block(&clause.block, scope, chain, loop_depth)?;
                }
                if let Some(b) = else_block {
                    self.walk_block(b, scope, chain, loop_depth)?;
                }
                Ok(())
            }
            StmtKind::NumericFor { body, .. } | StmtKind::GenericFor { body, .. } => {
                self.walk_block(body, scope, chain, loop_depth + 1)
            }
            StmtKind::Function { body, .. } | StmtKind::LocalFunction { body, .. } => {
                // Goto visibility and break never cross a function.
                let mut inner = Vec::new();
                self.walk_block(&body.block, None, &mut inner, 0)
            }
            StmtKind::Call(e) => self.walk_expr_functions(e),
            StmtKind::Assign { targets, values } => {
                for e in targets.iter().chain(values) {
                    self.walk_expr_functions(e)?;
                }
                Ok(())
            }
            StmtKind::Local { values, .. } => {
                for e in values {
                    self.walk_expr_functions(e)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Function literals in expression position start fresh goto chains.
    fn walk_expr_functions(&mut self, expr: &Rc<Expr>) -> LuaResult<()> {
        match &expr.kind {
            ExprKind::Function(body) => {
                let mut inner = Vec::new();
                self.walk_block(&body.block, None, &mut inner, 0)
            }
            ExprKind::Index { base, key } => {
                self.walk_expr_functions(base)?;
                self.walk_expr_functions(key)
            }
            ExprKind::Call { func, args } => {
                self.walk_expr_functions(func)?;
                for a in args {
                    self.walk_expr_functions(a)?;
                }
                Ok(())
            }
            ExprKind::MethodCall { base, args, .. } => {
                self.walk_expr_functions(base)?;
                for a in args {
                    self.walk_expr_functions(a)?;
                }
                Ok(())
            }
            ExprKind::Table(fields) => {
                for field in fields {
                    match field {
                        TableField::Pos(v) => self.walk_expr_functions(v)?,
                        TableField::Named { value, .. } => self.walk_expr_functions(value)?,
                        TableField::Keyed { key, value } => {
                            self.walk_expr_functions(key)?;
                            self.walk_expr_functions(value)?;
                        }
                    }
                }
                Ok(())
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr_functions(lhs)?;
                self.walk_expr_functions(rhs)
            }
            ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) => {
                self.walk_expr_functions(expr)
            }
            _ => Ok(()),
        }
    }

    /// Resolve a goto against the enclosing chain and apply the
    /// forward-jump rule at the level where the label lives.
    fn check_goto(
        &self,
        stmt: &Stmt,
        target: &Rc<str>,
        chain: &[ChainLevel<'_>],
    ) -> LuaResult<()> {
        for level in chain.iter().rev() {
            let block = level.block;
            let from = level.index;
            let label_at = block.stmts.iter().position(
                |s| matches!(&s.kind, StmtKind::Label(l) if l == target),
            );
            let Some(at) = label_at else { continue };
            if at > from {
                // Forward jump: no local declarations may intervene,
                // unless the label closes the block.
                let label_is_last = block.stmts[at + 1..]
                    .iter()
                    .all(|s| matches!(s.kind, StmtKind::Label(_)))
                    && block.ret.is_none();
                if !label_is_last {
                    for s in &block.stmts[from + 1..at] {
                        if let StmtKind::Local { names, .. } = &s.kind {
                            return Err(LuaError::parse(
                                format!(
                                    "<goto {}> jumps into the scope of local '{}'",
                                    target, names[0]
                                ),
                                stmt.line,
                                1,
                            ));
                        }
                        if let StmtKind::LocalFunction { name, .. } = &s.kind {
                            return Err(LuaError::parse(
                                format!(
                                    "<goto {}> jumps into the scope of local '{}'",
                                    target, name
                                ),
                                stmt.line,
                                1,
                            ));
                        }
                    }
                }
            }
            return Ok(());
        }
        Err(LuaError::parse(
            format!("no visible label '{}' for goto", target),
            stmt.line,
            1,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_chunk;

    fn analyzed(src: &str) -> (Rc<Block>, Analysis) {
        let block = parse_chunk(src).expect("parse failed");
        let an = analyze(&block).expect("analysis failed");
        (block, an)
    }

    #[test]
    fn block_with_locals_opens_scope() {
        let (block, an) = analyzed("local x = 1");
        assert!(an.opens_scope(block.id.get()));
    }

    #[test]
    fn block_without_locals_opens_nothing() {
        let (block, an) = analyzed("x = 1");
        assert!(!an.opens_scope(block.id.get()));
    }

    #[test]
    fn identifier_resolution() {
        let (block, an) = analyzed("local x = 1\nreturn x, y");
        let ret = block.ret.as_ref().unwrap();
        assert_eq!(an.name_kind(ret.exprs[0].id.get()), NameKind::Local);
        assert_eq!(an.name_kind(ret.exprs[1].id.get()), NameKind::Global);
    }

    #[test]
    fn local_rhs_sees_outer_binding() {
        // In `local x = x` the initializer resolves outside.
        let (block, an) = analyzed("local x = x");
        let StmtKind::Local { values, .. } = &block.stmts[0].kind else {
            panic!("expected local");
        };
        assert_eq!(an.name_kind(values[0].id.get()), NameKind::Global);
    }

    #[test]
    fn closure_captures_are_local() {
        let (block, an) = analyzed("local up = 1\nreturn function() return up end");
        let ret = block.ret.as_ref().unwrap();
        let ExprKind::Function(body) = &ret.exprs[0].kind else {
            panic!("expected function");
        };
        let inner_ret = body.block.ret.as_ref().unwrap();
        assert_eq!(an.name_kind(inner_ret.exprs[0].id.get()), NameKind::Local);
    }

    #[test]
    fn function_scope_for_params_and_varargs() {
        let (block, an) = analyzed("return function(a) end, function(...) end, function() end");
        let ret = block.ret.as_ref().unwrap();
        let bodies: Vec<_> = ret
            .exprs
            .iter()
            .map(|e| match &e.kind {
                ExprKind::Function(b) => b,
                _ => panic!("expected function"),
            })
            .collect();
        assert!(an.fn_needs_scope(bodies[0].id.get()));
        assert!(an.fn_needs_scope(bodies[1].id.get()));
        assert!(!an.fn_needs_scope(bodies[2].id.get()));
    }

    #[test]
    fn goto_scope_recorded_with_labels() {
        let (block, an) = analyzed("::top:: goto top");
        assert!(an.block_has_label(block.id.get(), "top"));
    }

    #[test]
    fn goto_to_enclosing_block_is_visible() {
        analyzed("do ::top:: do goto top end end");
    }

    #[test]
    fn goto_into_local_scope_rejected() {
        let block = parse_chunk("goto skip\nlocal x = 1\n::skip::\nx = 2").unwrap();
        let err = analyze(&block).unwrap_err();
        assert!(err.message().contains("jumps into the scope of local 'x'"));
    }

    #[test]
    fn goto_to_trailing_label_allowed() {
        // The continue idiom: the label closes the block.
        analyzed("for i = 1, 3 do if i == 2 then goto cont end local x = i ::cont:: end");
    }

    #[test]
    fn unknown_label_rejected() {
        let block = parse_chunk("goto nowhere").unwrap();
        let err = analyze(&block).unwrap_err();
        assert!(err.message().contains("no visible label 'nowhere'"));
    }

    #[test]
    fn duplicate_label_rejected() {
        let block = parse_chunk("::l:: ::l::").unwrap();
        assert!(analyze(&block).is_err());
    }

    #[test]
    fn goto_does_not_cross_functions() {
        let block = parse_chunk("::top:: local f = function() goto top end").unwrap();
        assert!(analyze(&block).is_err());
    }

    #[test]
    fn break_outside_loop_rejected() {
        let block = parse_chunk("break").unwrap();
        assert!(analyze(&block).is_err());
    }
}
