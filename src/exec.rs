//! The tree evaluator.
//!
//! Statements produce a [`Flow`] signal (normal, break, return, goto)
//! that propagates outward until a loop, a label-owning block, or a
//! function boundary consumes it. Expression evaluation is strictly
//! left to right; expression lists adjust every value but the last to
//! one and spread a trailing call or vararg.
//!
//! Everything is written as boxed local futures so a coroutine can
//! suspend at any `coroutine.yield` call in its body: the yield future
//! parks the thread and `Pending` propagates through every frame of the
//! interpreter up to the scheduler's manual poll.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures_util::future::LocalBoxFuture;
use futures_util::task::noop_waker;
use futures_util::FutureExt;

use crate::analysis::{Analysis, NameKind};
use crate::ast::*;
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::ops;
use crate::scope::Scope;
use crate::table::Table;
use crate::thread;
use crate::value::{first, CallFuture, Callable, LuaClosure, LuaValue};

/// How a statement finished.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Return(Vec<LuaValue>),
    Goto(Rc<str>),
}

/// A chunk's evaluator: the environment plus the chunk's analysis maps.
#[derive(Clone)]
pub struct Executor {
    pub env: Env,
    pub an: Rc<Analysis>,
}

/// An assignment target, resolved before the right-hand side runs.
enum TargetSlot {
    Name(Rc<str>, NameKind),
    Place(LuaValue, LuaValue),
}

fn is_multi(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::Call { .. } | ExprKind::MethodCall { .. } | ExprKind::Vararg
    )
}

impl Executor {
    pub fn new(env: Env, an: Rc<Analysis>) -> Executor {
        Executor { env, an }
    }

    /// Run a block, opening its scope when the analysis says it has one.
    pub fn exec_block(
        &self,
        scope: Rc<Scope>,
        block: Rc<Block>,
    ) -> LocalBoxFuture<'static, LuaResult<Flow>> {
        let ex = self.clone();
        async move {
            let scope = if ex.an.opens_scope(block.id.get()) {
                Scope::child(&scope)
            } else {
                scope
            };
            ex.exec_block_in(&scope, &block).await
        }
        .boxed_local()
    }

    /// The statement loop, in an already-decided scope. Catches gotos
    /// whose label lives in this block.
    async fn exec_block_in(&self, scope: &Rc<Scope>, block: &Rc<Block>) -> LuaResult<Flow> {
        let mut i = 0usize;
        while i < block.stmts.len() {
            let stmt = block.stmts[i].clone();
            match self.exec_stmt(scope.clone(), stmt).await? {
                Flow::Normal => i += 1,
                Flow::Goto(label) => {
                    if self.an.block_has_label(block.id.get(), &label) {
                        let target = block.stmts.iter().position(
                            |s| matches!(&s.kind, StmtKind::Label(l) if l.as_ref() == label.as_ref()),
                        );
                        match target {
                            Some(j) => i = j + 1,
                            None => return Ok(Flow::Goto(label)),
                        }
                    } else {
                        return Ok(Flow::Goto(label));
                    }
                }
                other => return Ok(other),
            }
        }
        if let Some(ret) = &block.ret {
            let values = self.eval_values(scope, &ret.exprs).await?;
            return Ok(Flow::Return(values));
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &self,
        scope: Rc<Scope>,
        stmt: Rc<Stmt>,
    ) -> LocalBoxFuture<'static, LuaResult<Flow>> {
        let ex = self.clone();
        async move {
            match &stmt.kind {
                StmtKind::Local { names, values } => {
                    let vals = ex.eval_values(&scope, values).await?;
                    for (i, name) in names.iter().enumerate() {
                        scope.set_local(
                            name.clone(),
                            vals.get(i).cloned().unwrap_or(LuaValue::Nil),
                        );
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::Assign { targets, values } => {
                    ex.exec_assign(&scope, targets, values).await?;
                    Ok(Flow::Normal)
                }
                StmtKind::Call(e) => {
                    ex.eval_call(&scope, e).await?;
                    Ok(Flow::Normal)
                }
                StmtKind::Do(b) => ex.exec_block(scope.clone(), b.clone()).await,
                StmtKind::While { cond, body } => {
                    loop {
                        let c = ex.eval_expr(scope.clone(), cond.clone()).await?;
                        if !c.truthy() {
                            break;
                        }
                        match ex.exec_block(scope.clone(), body.clone()).await? {
                            Flow::Normal => continue,
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::Repeat { body, cond } => {
                    loop {
                        // The until condition sees the body's locals.
                        let iter_scope = if ex.an.opens_scope(body.id.get()) {
                            Scope::child(&scope)
                        } else {
                            scope.clone()
                        };
                        match ex.exec_block_in(&iter_scope, body).await? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                        let c = ex.eval_expr(iter_scope.clone(), cond.clone()).await?;
                        if c.truthy() {
                            break;
                        }
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::If {
                    clauses,
                    else_block,
                } => {
                    for clause in clauses {
                        let c = ex.eval_expr(scope.clone(), clause.cond.clone()).await?;
                        if c.truthy() {
                            return ex.exec_block(scope.clone(), clause.block.clone()).await;
                        }
                    }
                    if let Some(b) = else_block {
                        return ex.exec_block(scope.clone(), b.clone()).await;
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::NumericFor {
                    var,
                    start,
                    limit,
                    step,
                    body,
                } => {
                    let start = ex
                        .eval_expr(scope.clone(), start.clone())
                        .await?
                        .coerce_number()
                        .ok_or_else(|| {
                            LuaError::runtime("'for' initial value must be a number")
                        })?;
                    let limit = ex
                        .eval_expr(scope.clone(), limit.clone())
                        .await?
                        .coerce_number()
                        .ok_or_else(|| LuaError::runtime("'for' limit must be a number"))?;
                    let step = match step {
                        Some(s) => ex
                            .eval_expr(scope.clone(), s.clone())
                            .await?
                            .coerce_number()
                            .ok_or_else(|| LuaError::runtime("'for' step must be a number"))?,
                        None => 1.0,
                    };
                    if step == 0.0 {
                        return Err(LuaError::runtime("'for' step is zero"));
                    }
                    let mut i = start;
                    while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
                        // Fresh control variable each iteration.
                        let iter_scope = Scope::child(&scope);
                        iter_scope.set_local(var.clone(), LuaValue::Number(i));
                        match ex.exec_block(iter_scope, body.clone()).await? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                        i += step;
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::GenericFor { names, exprs, body } => {
                    let mut iter = ex.eval_values(&scope, exprs).await?;
                    iter.resize(iter.len().max(3), LuaValue::Nil);
                    let f = iter[0].clone();
                    let state = iter[1].clone();
                    let mut control = iter[2].clone();
                    loop {
                        let rets = call_value(
                            &ex.env,
                            f.clone(),
                            vec![state.clone(), control.clone()],
                        )
                        .await?;
                        let head = rets.first().cloned().unwrap_or(LuaValue::Nil);
                        if head.is_nil() {
                            break;
                        }
                        control = head;
                        let iter_scope = Scope::child(&scope);
                        for (i, name) in names.iter().enumerate() {
                            iter_scope.set_local(
                                name.clone(),
                                rets.get(i).cloned().unwrap_or(LuaValue::Nil),
                            );
                        }
                        match ex.exec_block(iter_scope, body.clone()).await? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::Function { name, body } => {
                    let closure = ex.make_closure(&scope, body.clone());
                    if name.path.is_empty() && name.method.is_none() {
                        ex.assign_name(
                            &scope,
                            &name.base,
                            ex.an.func_base_kind(stmt.id.get()),
                            closure,
                        )
                        .await?;
                    } else {
                        let base = match ex.an.func_base_kind(stmt.id.get()) {
                            NameKind::Local => scope.get(&name.base),
                            NameKind::Global => {
                                ops::index(
                                    &ex.env,
                                    LuaValue::Table(ex.env.globals()),
                                    LuaValue::Str(name.base.clone()),
                                )
                                .await?
                            }
                        };
                        let (walk, final_key) = match &name.method {
                            Some(m) => (&name.path[..], m.clone()),
                            None => (
                                &name.path[..name.path.len() - 1],
                                name.path[name.path.len() - 1].clone(),
                            ),
                        };
                        let mut cur = base;
                        for seg in walk {
                            cur = ops::index(&ex.env, cur, LuaValue::Str(seg.clone())).await?;
                        }
                        ops::newindex(&ex.env, cur, LuaValue::Str(final_key), closure).await?;
                    }
                    Ok(Flow::Normal)
                }
                StmtKind::LocalFunction { name, body } => {
                    // The binding exists before the body so the closure
                    // can recurse.
                    scope.set_local(name.clone(), LuaValue::Nil);
                    let closure = ex.make_closure(&scope, body.clone());
                    scope.set_local(name.clone(), closure);
                    Ok(Flow::Normal)
                }
                StmtKind::Label(_) => Ok(Flow::Normal),
                StmtKind::Goto(label) => Ok(Flow::Goto(label.clone())),
                StmtKind::Break => Ok(Flow::Break),
            }
        }
        .boxed_local()
    }

    async fn exec_assign(
        &self,
        scope: &Rc<Scope>,
        targets: &[Rc<Expr>],
        values: &[Rc<Expr>],
    ) -> LuaResult<()> {
        // Targets resolve before the right-hand side runs, so RHS side
        // effects see the original base objects.
        let mut slots = Vec::with_capacity(targets.len());
        for t in targets {
            match &t.kind {
                ExprKind::Name(n) => {
                    slots.push(TargetSlot::Name(n.clone(), self.an.name_kind(t.id.get())))
                }
                ExprKind::Index { base, key } => {
                    let b = self.eval_expr(scope.clone(), base.clone()).await?;
                    let k = self.eval_expr(scope.clone(), key.clone()).await?;
                    slots.push(TargetSlot::Place(b, k));
                }
                _ => return Err(LuaError::runtime("cannot assign to this expression")),
            }
        }
        let mut vals = self.eval_values(scope, values).await?;
        vals.resize(slots.len(), LuaValue::Nil);
        for (slot, v) in slots.into_iter().zip(vals) {
            match slot {
                TargetSlot::Name(n, kind) => self.assign_name(scope, &n, kind, v).await?,
                TargetSlot::Place(b, k) => ops::newindex(&self.env, b, k, v).await?,
            }
        }
        Ok(())
    }

    /// Write a name: the defining scope when one exists, the globals
    /// table (through `__newindex`) otherwise.
    async fn assign_name(
        &self,
        scope: &Rc<Scope>,
        name: &Rc<str>,
        kind: NameKind,
        value: LuaValue,
    ) -> LuaResult<()> {
        if kind == NameKind::Local && scope.set(name, value.clone()) {
            return Ok(());
        }
        ops::newindex(
            &self.env,
            LuaValue::Table(self.env.globals()),
            LuaValue::Str(name.clone()),
            value,
        )
        .await
    }

    pub fn eval_expr(
        &self,
        scope: Rc<Scope>,
        expr: Rc<Expr>,
    ) -> LocalBoxFuture<'static, LuaResult<LuaValue>> {
        let ex = self.clone();
        async move {
            match &expr.kind {
                ExprKind::Nil => Ok(LuaValue::Nil),
                ExprKind::True => Ok(LuaValue::Boolean(true)),
                ExprKind::False => Ok(LuaValue::Boolean(false)),
                ExprKind::Number(n) => Ok(LuaValue::Number(*n)),
                ExprKind::Str(s) => Ok(LuaValue::Str(s.clone())),
                ExprKind::Vararg => {
                    Ok(scope.varargs().first().cloned().unwrap_or(LuaValue::Nil))
                }
                ExprKind::Name(n) => match ex.an.name_kind(expr.id.get()) {
                    NameKind::Local => Ok(scope.get(n)),
                    NameKind::Global => {
                        ops::index(
                            &ex.env,
                            LuaValue::Table(ex.env.globals()),
                            LuaValue::Str(n.clone()),
                        )
                        .await
                    }
                },
                ExprKind::Paren(inner) => ex.eval_expr(scope.clone(), inner.clone()).await,
                ExprKind::Index { base, key } => {
                    let b = ex.eval_expr(scope.clone(), base.clone()).await?;
                    let k = ex.eval_expr(scope.clone(), key.clone()).await?;
                    ops::index(&ex.env, b, k).await
                }
                ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                    let out = ex.eval_call(&scope, &expr).await?;
                    Ok(first(out))
                }
                ExprKind::Function(body) => Ok(ex.make_closure(&scope, body.clone())),
                ExprKind::Table(fields) => ex.eval_table(&scope, fields).await,
                ExprKind::Binary { op, lhs, rhs } => match op {
                    BinOp::And => {
                        let l = ex.eval_expr(scope.clone(), lhs.clone()).await?;
                        if !l.truthy() {
                            Ok(l)
                        } else {
                            ex.eval_expr(scope.clone(), rhs.clone()).await
                        }
                    }
                    BinOp::Or => {
                        let l = ex.eval_expr(scope.clone(), lhs.clone()).await?;
                        if l.truthy() {
                            Ok(l)
                        } else {
                            ex.eval_expr(scope.clone(), rhs.clone()).await
                        }
                    }
                    _ => {
                        let l = ex.eval_expr(scope.clone(), lhs.clone()).await?;
                        let r = ex.eval_expr(scope.clone(), rhs.clone()).await?;
                        ops::binary(&ex.env, *op, l, r).await
                    }
                },
                ExprKind::Unary { op, expr: operand } => {
                    let v = ex.eval_expr(scope.clone(), operand.clone()).await?;
                    ops::unary(&ex.env, *op, v).await
                }
            }
        }
        .boxed_local()
    }

    /// A multi-value position: calls and varargs keep all their values.
    pub fn eval_multi(
        &self,
        scope: Rc<Scope>,
        expr: Rc<Expr>,
    ) -> LocalBoxFuture<'static, LuaResult<Vec<LuaValue>>> {
        let ex = self.clone();
        async move {
            match &expr.kind {
                ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                    ex.eval_call(&scope, &expr).await
                }
                ExprKind::Vararg => Ok(scope.varargs().as_ref().clone()),
                _ => Ok(vec![ex.eval_expr(scope.clone(), expr.clone()).await?]),
            }
        }
        .boxed_local()
    }

    /// An expression list with the last-position spread rule.
    async fn eval_values(
        &self,
        scope: &Rc<Scope>,
        exprs: &[Rc<Expr>],
    ) -> LuaResult<Vec<LuaValue>> {
        let mut out = Vec::with_capacity(exprs.len());
        for (i, e) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && is_multi(e) {
                out.extend(self.eval_multi(scope.clone(), e.clone()).await?);
            } else {
                out.push(self.eval_expr(scope.clone(), e.clone()).await?);
            }
        }
        Ok(out)
    }

    async fn eval_call(&self, scope: &Rc<Scope>, expr: &Rc<Expr>) -> LuaResult<Vec<LuaValue>> {
        match &expr.kind {
            ExprKind::Call { func, args } => {
                let f = self.eval_expr(scope.clone(), func.clone()).await?;
                let argv = self.eval_values(scope, args).await?;
                call_value(&self.env, f, argv).await
            }
            ExprKind::MethodCall { base, name, args } => {
                // The receiver is evaluated once.
                let recv = self.eval_expr(scope.clone(), base.clone()).await?;
                let f = ops::index(&self.env, recv.clone(), LuaValue::Str(name.clone())).await?;
                let mut argv = vec![recv];
                argv.extend(self.eval_values(scope, args).await?);
                call_value(&self.env, f, argv).await
            }
            _ => unreachable!("eval_call on a non-call expression"),
        }
    }

    async fn eval_table(
        &self,
        scope: &Rc<Scope>,
        fields: &[TableField],
    ) -> LuaResult<LuaValue> {
        let t = Rc::new(RefCell::new(Table::new()));
        let mut pos = 1usize;
        for (idx, field) in fields.iter().enumerate() {
            match field {
                TableField::Named { key, value } => {
                    let v = self.eval_expr(scope.clone(), value.clone()).await?;
                    t.borrow_mut().raw_set_str(key, v);
                }
                TableField::Keyed { key, value } => {
                    let k = self.eval_expr(scope.clone(), key.clone()).await?;
                    let v = self.eval_expr(scope.clone(), value.clone()).await?;
                    t.borrow_mut().raw_set(k, v)?;
                }
                TableField::Pos(e) => {
                    if idx + 1 == fields.len() && is_multi(e) {
                        let vs = self.eval_multi(scope.clone(), e.clone()).await?;
                        for v in vs {
                            t.borrow_mut().raw_set_int(pos, v);
                            pos += 1;
                        }
                    } else {
                        let v = self.eval_expr(scope.clone(), e.clone()).await?;
                        t.borrow_mut().raw_set_int(pos, v);
                        pos += 1;
                    }
                }
            }
        }
        Ok(LuaValue::Table(t))
    }

    fn make_closure(&self, scope: &Rc<Scope>, body: Rc<FunctionBody>) -> LuaValue {
        LuaValue::Function(Rc::new(Callable::Lua(LuaClosure {
            body,
            scope: scope.clone(),
            analysis: self.an.clone(),
        })))
    }
}

/// The call dispatcher: host functions, Lua closures, threads (wrap
/// semantics), and `__call` tables.
pub fn call_value(env: &Env, f: LuaValue, args: Vec<LuaValue>) -> CallFuture {
    let env = env.clone();
    async move {
        match f {
            LuaValue::Function(callable) => match &*callable {
                Callable::Native { f, .. } => f(env.clone(), args).await,
                Callable::Lua(closure) => call_closure(&env, closure, args).await,
            },
            LuaValue::Thread(t) => thread::resume_unwrap(&env, &t, args),
            LuaValue::Table(_) => match ops::get_metamethod(&env, &f, "__call") {
                Some(mm) => {
                    let mut argv = vec![f.clone()];
                    argv.extend(args);
                    call_value(&env, mm, argv).await
                }
                None => Err(LuaError::runtime("attempt to call an uncallable type")),
            },
            _ => Err(LuaError::runtime("attempt to call an uncallable type")),
        }
    }
    .boxed_local()
}

async fn call_closure(
    env: &Env,
    closure: &LuaClosure,
    args: Vec<LuaValue>,
) -> LuaResult<Vec<LuaValue>> {
    let ex = Executor::new(env.clone(), closure.analysis.clone());
    let body = closure.body.clone();
    let scope = if ex.an.fn_needs_scope(body.id.get()) {
        let s = Scope::child(&closure.scope);
        let mut incoming = args.into_iter();
        for p in &body.params {
            s.set_local(p.clone(), incoming.next().unwrap_or(LuaValue::Nil));
        }
        if body.is_vararg {
            s.set_varargs(incoming.collect());
        }
        s
    } else {
        closure.scope.clone()
    };
    match ex.exec_block(scope, body.block.clone()).await? {
        Flow::Return(values) => Ok(values),
        Flow::Normal => Ok(Vec::new()),
        Flow::Break | Flow::Goto(_) => Err(LuaError::runtime(
            "control flow escaped a function body",
        )),
    }
}

/// Drive a future that must not suspend (the main chunk, embedder
/// call-ins). A top-level `Pending` means a yield escaped every
/// coroutine.
pub fn run_blocking<T>(mut fut: LocalBoxFuture<'static, LuaResult<T>>) -> LuaResult<T> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(out) => out,
        Poll::Pending => Err(LuaError::runtime(
            "attempt to yield from outside a coroutine",
        )),
    }
}
