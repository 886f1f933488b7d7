//! Syntax tree produced by the parser.
//!
//! Children are `Rc`-shared so the evaluator's owned futures can hold
//! subtrees without borrowing, and every block, statement, function body
//! and expression carries a `Cell<u32>` identity id assigned by
//! [`number_chunk`] after parsing. The analysis passes key their derived
//! maps by those ids.

use std::cell::Cell;
use std::rc::Rc;

/// A block: a statement list plus an optional trailing return.
#[derive(Debug)]
pub struct Block {
    pub id: Cell<u32>,
    pub stmts: Vec<Rc<Stmt>>,
    pub ret: Option<Return>,
}

/// Trailing `return [explist]` of a block.
#[derive(Debug)]
pub struct Return {
    pub exprs: Vec<Rc<Expr>>,
    pub line: u32,
}

#[derive(Debug)]
pub struct Stmt {
    pub id: Cell<u32>,
    pub line: u32,
    pub kind: StmtKind,
}

#[derive(Debug)]
pub enum StmtKind {
    /// `varlist = explist`; every target is a `Name` or `Index` expression.
    Assign {
        targets: Vec<Rc<Expr>>,
        values: Vec<Rc<Expr>>,
    },
    /// `local namelist [= explist]`
    Local {
        names: Vec<Rc<str>>,
        values: Vec<Rc<Expr>>,
    },
    /// A call (or method call) in statement position.
    Call(Rc<Expr>),
    Do(Rc<Block>),
    While {
        cond: Rc<Expr>,
        body: Rc<Block>,
    },
    Repeat {
        body: Rc<Block>,
        cond: Rc<Expr>,
    },
    If {
        clauses: Vec<IfClause>,
        else_block: Option<Rc<Block>>,
    },
    NumericFor {
        var: Rc<str>,
        start: Rc<Expr>,
        limit: Rc<Expr>,
        step: Option<Rc<Expr>>,
        body: Rc<Block>,
    },
    GenericFor {
        names: Vec<Rc<str>>,
        exprs: Vec<Rc<Expr>>,
        body: Rc<Block>,
    },
    /// `function Name {'.' Name} [':' Name] body`
    Function {
        name: FuncName,
        body: Rc<FunctionBody>,
    },
    LocalFunction {
        name: Rc<str>,
        body: Rc<FunctionBody>,
    },
    Label(Rc<str>),
    Goto(Rc<str>),
    Break,
}

/// `if`/`elseif` arm.
#[derive(Debug)]
pub struct IfClause {
    pub cond: Rc<Expr>,
    pub block: Rc<Block>,
}

/// Target path of a `function` statement: `base.p1.p2:method`.
#[derive(Debug)]
pub struct FuncName {
    pub base: Rc<str>,
    pub path: Vec<Rc<str>>,
    pub method: Option<Rc<str>>,
}

/// A function literal body. For method definitions the parser prepends
/// an implicit `self` parameter and sets `is_method`.
#[derive(Debug)]
pub struct FunctionBody {
    pub id: Cell<u32>,
    pub line: u32,
    pub params: Vec<Rc<str>>,
    pub is_vararg: bool,
    pub is_method: bool,
    pub block: Rc<Block>,
}

#[derive(Debug)]
pub struct Expr {
    pub id: Cell<u32>,
    pub line: u32,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Vararg,
    Number(f64),
    Str(Rc<str>),
    Name(Rc<str>),
    /// `base[key]`; `a.b` is desugared to `a["b"]` by the parser.
    Index {
        base: Rc<Expr>,
        key: Rc<Expr>,
    },
    Call {
        func: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    /// `base:name(args)` — the receiver is evaluated once.
    MethodCall {
        base: Rc<Expr>,
        name: Rc<str>,
        args: Vec<Rc<Expr>>,
    },
    Function(Rc<FunctionBody>),
    Table(Vec<TableField>),
    Binary {
        op: BinOp,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Rc<Expr>,
    },
    /// A parenthesized expression truncates multiple results to one.
    Paren(Rc<Expr>),
}

#[derive(Debug)]
pub enum TableField {
    /// A positional field; the last one spreads calls and varargs.
    Pos(Rc<Expr>),
    /// `name = value`
    Named { key: Rc<str>, value: Rc<Expr> },
    /// `[key] = value`
    Keyed { key: Rc<Expr>, value: Rc<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BNot,
}

/// Assign sequential identity ids to every node of a chunk, returning the
/// number of ids handed out. Ids start at 1; 0 means "not numbered".
pub fn number_chunk(block: &Rc<Block>) -> u32 {
    let mut next = 1u32;
    number_block(block, &mut next);
    next - 1
}

fn take_id(counter: &mut u32) -> u32 {
    let id = *counter;
    *counter += 1;
    id
}

fn number_block(block: &Block, counter: &mut u32) {
    block.id.set(take_id(counter));
    for stmt in &block.stmts {
        number_stmt(stmt, counter);
    }
    if let Some(ret) = &block.ret {
        for e in &ret.exprs {
            number_expr(e, counter);
        }
    }
}

fn number_stmt(stmt: &Stmt, counter: &mut u32) {
    stmt.id.set(take_id(counter));
    match &stmt.kind {
        StmtKind::Assign { targets, values } => {
            for e in targets {
                number_expr(e, counter);
            }
            for e in values {
                number_expr(e, counter);
            }
        }
        StmtKind::Local { values, .. } => {
            for e in values {
                number_expr(e, counter);
            }
        }
        StmtKind::Call(e) => number_expr(e, counter),
        StmtKind::Do(b) => number_block(b, counter),
        StmtKind::While { cond, body } => {
            number_expr(cond, counter);
            number_block(body, counter);
        }
        StmtKind::Repeat { body, cond } => {
            number_block(body, counter);
            number_expr(cond, counter);
        }
        StmtKind::If {
            clauses,
            else_block,
        } => {
            for clause in clauses {
                number_expr(&clause.cond, counter);
                number_block(&clause.block, counter);
            }
            if let Some(b) = else_block {
                number_block(b, counter);
            }
        }
        StmtKind::NumericFor {
            start,
            limit,
            step,
            body,
            ..
        } => {
            number_expr(start, counter);
            number_expr(limit, counter);
            if let Some(s) = step {
                number_expr(s, counter);
            }
            number_block(body, counter);
        }
        StmtKind::GenericFor { exprs, body, .. } => {
            for e in exprs {
                number_expr(e, counter);
            }
            number_block(body, counter);
        }
        StmtKind::Function { body, .. } | StmtKind::LocalFunction { body, .. } => {
            number_body(body, counter);
        }
        StmtKind::Label(_) | StmtKind::Goto(_) | StmtKind::Break => {}
    }
}

fn number_body(body: &FunctionBody, counter: &mut u32) {
    body.id.set(take_id(counter));
    number_block(&body.block, counter);
}

fn number_expr(expr: &Expr, counter: &mut u32) {
    expr.id.set(take_id(counter));
    match &expr.kind {
        ExprKind::Index { base, key } => {
            number_expr(base, counter);
            number_expr(key, counter);
        }
        ExprKind::Call { func, args } => {
            number_expr(func, counter);
            for a in args {
                number_expr(a, counter);
            }
        }
        ExprKind::MethodCall { base, args, .. } => {
            number_expr(base, counter);
            for a in args {
                number_expr(a, counter);
            }
        }
        ExprKind::Function(body) => number_body(body, counter),
        ExprKind::Table(fields) => {
            for field in fields {
                match field {
                    TableField::Pos(v) => number_expr(v, counter),
                    TableField::Named { value, .. } => number_expr(value, counter),
                    TableField::Keyed { key, value } => {
                        number_expr(key, counter);
                        number_expr(value, counter);
                    }
                }
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            number_expr(lhs, counter);
            number_expr(rhs, counter);
        }
        ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) => number_expr(expr, counter),
        _ => {}
    }
}
