//! Lua 5.3 parser.
//!
//! nom over a token slice: `Tokens` implements nom's `Input` so the
//! stock combinators compose with the hand-rolled statement and
//! precedence-climbing expression parsers. The grammar is the reference
//! one:
//!
//! chunk ::= block
//! block ::= {stat} [retstat]
//! stat ::= ';' | varlist '=' explist | functioncall | label | break |
//!          goto Name | do block end | while exp do block end |
//!          repeat block until exp |
//!          if exp then block {elseif exp then block} [else block] end |
//!          for Name '=' exp ',' exp [',' exp] do block end |
//!          for namelist in explist do block end |
//!          function funcname funcbody | local function Name funcbody |
//!          local namelist ['=' explist]
//!
//! `a.b` is desugared to `a["b"]`, `f{...}` and `f"s"` to ordinary calls
//! with a single argument, and method bodies get an implicit leading
//! `self` parameter.

use std::cell::Cell;
use std::rc::Rc;

use nom::error::{Error, ErrorKind};
use nom::{Err, IResult, Input, Needed};

use crate::ast::*;
use crate::error::{LuaError, LuaResult};
use crate::tokenizer::{tokenize, Tok, Token};

#[derive(Debug, Clone, Copy)]
pub struct Tokens<'a>(pub &'a [Tok]);

impl<'a> Input for Tokens<'a> {
    type Item = &'a Tok;
    type Iter = std::slice::Iter<'a, Tok>;
    type IterIndices = std::iter::Enumerate<std::slice::Iter<'a, Tok>>;

    fn input_len(&self) -> usize {
        self.0.len()
    }

    fn take(&self, index: usize) -> Self {
        Tokens(&self.0[..index.min(self.0.len())])
    }

    fn take_from(&self, index: usize) -> Self {
        Tokens(&self.0[index.min(self.0.len())..])
    }

    fn take_split(&self, index: usize) -> (Self, Self) {
        let index = index.min(self.0.len());
        (Tokens(&self.0[index..]), Tokens(&self.0[..index]))
    }

    fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(Self::Item) -> bool,
    {
        self.0.iter().position(predicate)
    }

    fn iter_elements(&self) -> Self::Iter {
        self.0.iter()
    }

    fn iter_indices(&self) -> Self::IterIndices {
        self.0.iter().enumerate()
    }

    fn slice_index(&self, count: usize) -> Result<usize, Needed> {
        if count > self.0.len() {
            Err(Needed::Size(
                std::num::NonZeroUsize::new(count - self.0.len()).unwrap(),
            ))
        } else {
            Ok(count)
        }
    }
}

type PResult<'a, T> = IResult<Tokens<'a>, T>;

fn fail<'a, T>(i: Tokens<'a>) -> PResult<'a, T> {
    Err(Err::Error(Error::new(i, ErrorKind::Tag)))
}

fn cut<'a, T>(i: Tokens<'a>) -> PResult<'a, T> {
    Err(Err::Failure(Error::new(i, ErrorKind::Tag)))
}

fn peek(i: Tokens) -> Option<&Token> {
    i.0.first().map(|t| &t.token)
}

fn cur_line(i: Tokens) -> u32 {
    i.0.first().map(|t| t.line).unwrap_or(0)
}

fn advance(i: Tokens) -> Tokens {
    Tokens(&i.0[1..])
}

/// Consume one expected unit token.
fn expect<'a>(i: Tokens<'a>, t: Token) -> PResult<'a, u32> {
    match i.0.first() {
        Some(tok) if tok.token == t => Ok((advance(i), tok.line)),
        _ => cut(i),
    }
}

/// Like `expect` but recoverable, for lookahead-driven choices.
fn accept<'a>(i: Tokens<'a>, t: Token) -> PResult<'a, u32> {
    match i.0.first() {
        Some(tok) if tok.token == t => Ok((advance(i), tok.line)),
        _ => fail(i),
    }
}

fn name<'a>(i: Tokens<'a>) -> PResult<'a, Rc<str>> {
    match i.0.first() {
        Some(Tok {
            token: Token::Name(n),
            ..
        }) => Ok((advance(i), n.clone())),
        _ => cut(i),
    }
}

fn expr_node(line: u32, kind: ExprKind) -> Rc<Expr> {
    Rc::new(Expr {
        id: Cell::new(0),
        line,
        kind,
    })
}

fn stmt_node(line: u32, kind: StmtKind) -> Rc<Stmt> {
    Rc::new(Stmt {
        id: Cell::new(0),
        line,
        kind,
    })
}

fn str_key(line: u32, s: Rc<str>) -> Rc<Expr> {
    expr_node(line, ExprKind::Str(s))
}

/// Parse a source chunk into a numbered block.
pub fn parse_chunk(src: &str) -> LuaResult<Rc<Block>> {
    let toks = tokenize(src)?;
    let input = Tokens(&toks);
    match block(input) {
        Ok((rest, b)) => {
            if let Some(t) = rest.0.first() {
                return Err(LuaError::parse(
                    format!("'<eof>' expected near '{:?}'", t.token),
                    t.line,
                    t.col,
                ));
            }
            number_chunk(&b);
            Ok(b)
        }
        Err(Err::Error(e)) | Err(Err::Failure(e)) => {
            let (line, col, what) = match e.input.0.first() {
                Some(t) => (t.line, t.col, format!("near '{:?}'", t.token)),
                None => (0, 0, "near '<eof>'".to_string()),
            };
            Err(LuaError::parse(format!("syntax error {}", what), line, col))
        }
        Err(Err::Incomplete(_)) => Err(LuaError::parse("unexpected end of chunk", 0, 0)),
    }
}

fn block_end(i: Tokens) -> bool {
    matches!(
        peek(i),
        None | Some(Token::End) | Some(Token::Else) | Some(Token::Elseif) | Some(Token::Until)
    )
}

fn block(mut i: Tokens) -> PResult<Rc<Block>> {
    let mut stmts = Vec::new();
    let mut ret = None;
    loop {
        while let Ok((next, _)) = accept(i, Token::Semicolon) {
            i = next;
        }
        if block_end(i) {
            break;
        }
        if let Some(Token::Return) = peek(i) {
            let line = cur_line(i);
            i = advance(i);
            let mut exprs = Vec::new();
            if !block_end(i) && peek(i) != Some(&Token::Semicolon) {
                let (next, list) = explist(i)?;
                i = next;
                exprs = list;
            }
            if let Ok((next, _)) = accept(i, Token::Semicolon) {
                i = next;
            }
            ret = Some(Return { exprs, line });
            break;
        }
        let (next, stmt) = statement(i)?;
        stmts.push(stmt);
        i = next;
    }
    Ok((
        i,
        Rc::new(Block {
            id: Cell::new(0),
            stmts,
            ret,
        }),
    ))
}

fn statement(i: Tokens) -> PResult<Rc<Stmt>> {
    let line = cur_line(i);
    match peek(i) {
        Some(Token::DoubleColon) => {
            let (i, _) = expect(i, Token::DoubleColon)?;
            let (i, label) = name(i)?;
            let (i, _) = expect(i, Token::DoubleColon)?;
            Ok((i, stmt_node(line, StmtKind::Label(label))))
        }
        Some(Token::Break) => Ok((advance(i), stmt_node(line, StmtKind::Break))),
        Some(Token::Goto) => {
            let (i, target) = name(advance(i))?;
            Ok((i, stmt_node(line, StmtKind::Goto(target))))
        }
        Some(Token::Do) => {
            let (i, body) = block(advance(i))?;
            let (i, _) = expect(i, Token::End)?;
            Ok((i, stmt_node(line, StmtKind::Do(body))))
        }
        Some(Token::While) => {
            let (i, cond) = expr(advance(i))?;
            let (i, _) = expect(i, Token::Do)?;
            let (i, body) = block(i)?;
            let (i, _) = expect(i, Token::End)?;
            Ok((i, stmt_node(line, StmtKind::While { cond, body })))
        }
        Some(Token::Repeat) => {
            let (i, body) = block(advance(i))?;
            let (i, _) = expect(i, Token::Until)?;
            let (i, cond) = expr(i)?;
            Ok((i, stmt_node(line, StmtKind::Repeat { body, cond })))
        }
        Some(Token::If) => if_statement(i, line),
        Some(Token::For) => for_statement(i, line),
        Some(Token::Function) => function_statement(i, line),
        Some(Token::Local) => local_statement(i, line),
        _ => expr_statement(i, line),
    }
}

fn if_statement(i: Tokens, line: u32) -> PResult<Rc<Stmt>> {
    let (i, cond) = expr(advance(i))?;
    let (i, _) = expect(i, Token::Then)?;
    let (mut i, first_block) = block(i)?;
    let mut clauses = vec![IfClause {
        cond,
        block: first_block,
    }];
    let mut else_block = None;
    loop {
        match peek(i) {
            Some(Token::Elseif) => {
                let (next, cond) = expr(advance(i))?;
                let (next, _) = expect(next, Token::Then)?;
                let (next, b) = block(next)?;
                clauses.push(IfClause { cond, block: b });
                i = next;
            }
            Some(Token::Else) => {
                let (next, b) = block(advance(i))?;
                else_block = Some(b);
                i = next;
            }
            _ => break,
        }
    }
    let (i, _) = expect(i, Token::End)?;
    Ok((
        i,
        stmt_node(
            line,
            StmtKind::If {
                clauses,
                else_block,
            },
        ),
    ))
}

fn for_statement(i: Tokens, line: u32) -> PResult<Rc<Stmt>> {
    let (i, first) = name(advance(i))?;
    match peek(i) {
        Some(Token::Assign) => {
            let (i, start) = expr(advance(i))?;
            let (i, _) = expect(i, Token::Comma)?;
            let (mut i, limit) = expr(i)?;
            let mut step = None;
            if let Ok((next, _)) = accept(i, Token::Comma) {
                let (next, s) = expr(next)?;
                step = Some(s);
                i = next;
            }
            let (i, _) = expect(i, Token::Do)?;
            let (i, body) = block(i)?;
            let (i, _) = expect(i, Token::End)?;
            Ok((
                i,
                stmt_node(
                    line,
                    StmtKind::NumericFor {
                        var: first,
                        start,
                        limit,
                        step,
                        body,
                    },
                ),
            ))
        }
        _ => {
            let mut names = vec![first];
            let mut i = i;
            while let Ok((next, _)) = accept(i, Token::Comma) {
                let (next, n) = name(next)?;
                names.push(n);
                i = next;
            }
            let (i, _) = expect(i, Token::In)?;
            let (i, exprs) = explist(i)?;
            let (i, _) = expect(i, Token::Do)?;
            let (i, body) = block(i)?;
            let (i, _) = expect(i, Token::End)?;
            Ok((
                i,
                stmt_node(line, StmtKind::GenericFor { names, exprs, body }),
            ))
        }
    }
}

fn function_statement(i: Tokens, line: u32) -> PResult<Rc<Stmt>> {
    let (mut i, base) = name(advance(i))?;
    let mut path = Vec::new();
    let mut method = None;
    loop {
        match peek(i) {
            Some(Token::Dot) => {
                let (next, n) = name(advance(i))?;
                path.push(n);
                i = next;
            }
            Some(Token::Colon) => {
                let (next, n) = name(advance(i))?;
                method = Some(n);
                i = next;
                break;
            }
            _ => break,
        }
    }
    let is_method = method.is_some();
    let (i, body) = funcbody(i, line, is_method)?;
    Ok((
        i,
        stmt_node(
            line,
            StmtKind::Function {
                name: FuncName { base, path, method },
                body,
            },
        ),
    ))
}

fn local_statement(i: Tokens, line: u32) -> PResult<Rc<Stmt>> {
    let i = advance(i);
    if let Ok((i, _)) = accept(i, Token::Function) {
        let (i, fname) = name(i)?;
        let (i, body) = funcbody(i, line, false)?;
        return Ok((i, stmt_node(line, StmtKind::LocalFunction { name: fname, body })));
    }
    let (mut i, first) = name(i)?;
    let mut names = vec![first];
    while let Ok((next, _)) = accept(i, Token::Comma) {
        let (next, n) = name(next)?;
        names.push(n);
        i = next;
    }
    let mut values = Vec::new();
    if let Ok((next, _)) = accept(i, Token::Assign) {
        let (next, list) = explist(next)?;
        values = list;
        i = next;
    }
    Ok((i, stmt_node(line, StmtKind::Local { names, values })))
}

/// A statement starting with an expression: either an assignment or a
/// bare call.
fn expr_statement(i: Tokens, line: u32) -> PResult<Rc<Stmt>> {
    let (mut i, first) = suffixed_expr(i)?;
    if matches!(peek(i), Some(Token::Assign) | Some(Token::Comma)) {
        let mut targets = vec![first];
        while let Ok((next, _)) = accept(i, Token::Comma) {
            let (next, t) = suffixed_expr(next)?;
            targets.push(t);
            i = next;
        }
        for t in &targets {
            if !matches!(t.kind, ExprKind::Name(_) | ExprKind::Index { .. }) {
                return cut(i);
            }
        }
        let (i, _) = expect(i, Token::Assign)?;
        let (i, values) = explist(i)?;
        return Ok((i, stmt_node(line, StmtKind::Assign { targets, values })));
    }
    if !matches!(first.kind, ExprKind::Call { .. } | ExprKind::MethodCall { .. }) {
        return cut(i);
    }
    Ok((i, stmt_node(line, StmtKind::Call(first))))
}

fn funcbody(i: Tokens, line: u32, is_method: bool) -> PResult<Rc<FunctionBody>> {
    let (mut i, _) = expect(i, Token::LParen)?;
    let mut params: Vec<Rc<str>> = Vec::new();
    if is_method {
        params.push(Rc::from("self"));
    }
    let mut is_vararg = false;
    if peek(i) != Some(&Token::RParen) {
        loop {
            if let Ok((next, _)) = accept(i, Token::Ellipsis) {
                is_vararg = true;
                i = next;
                break;
            }
            let (next, p) = name(i)?;
            params.push(p);
            i = next;
            match accept(i, Token::Comma) {
                Ok((next, _)) => i = next,
                Err(_) => break,
            }
        }
    }
    let (i, _) = expect(i, Token::RParen)?;
    let (i, body) = block(i)?;
    let (i, _) = expect(i, Token::End)?;
    Ok((
        i,
        Rc::new(FunctionBody {
            id: Cell::new(0),
            line,
            params,
            is_vararg,
            is_method,
            block: body,
        }),
    ))
}

fn explist(i: Tokens) -> PResult<Vec<Rc<Expr>>> {
    let (mut i, first) = expr(i)?;
    let mut exprs = vec![first];
    while let Ok((next, _)) = accept(i, Token::Comma) {
        let (next, e) = expr(next)?;
        exprs.push(e);
        i = next;
    }
    Ok((i, exprs))
}

/// Left and right binding powers of a binary operator token.
fn binop_prec(t: &Token) -> Option<(BinOp, u8, u8)> {
    Some(match t {
        Token::Or => (BinOp::Or, 1, 2),
        Token::And => (BinOp::And, 3, 4),
        Token::Lt => (BinOp::Lt, 5, 6),
        Token::Gt => (BinOp::Gt, 5, 6),
        Token::Le => (BinOp::Le, 5, 6),
        Token::Ge => (BinOp::Ge, 5, 6),
        Token::Ne => (BinOp::Ne, 5, 6),
        Token::Eq => (BinOp::Eq, 5, 6),
        Token::Pipe => (BinOp::BOr, 7, 8),
        Token::Tilde => (BinOp::BXor, 9, 10),
        Token::Ampersand => (BinOp::BAnd, 11, 12),
        Token::Shl => (BinOp::Shl, 13, 14),
        Token::Shr => (BinOp::Shr, 13, 14),
        // Right associative.
        Token::Concat => (BinOp::Concat, 16, 15),
        Token::Plus => (BinOp::Add, 17, 18),
        Token::Minus => (BinOp::Sub, 17, 18),
        Token::Star => (BinOp::Mul, 19, 20),
        Token::Slash => (BinOp::Div, 19, 20),
        Token::DoubleSlash => (BinOp::IDiv, 19, 20),
        Token::Percent => (BinOp::Mod, 19, 20),
        // Right associative, binds above unary.
        Token::Caret => (BinOp::Pow, 24, 23),
        _ => return None,
    })
}

const UNARY_BP: u8 = 21;

pub fn expr(i: Tokens) -> PResult<Rc<Expr>> {
    expr_bp(i, 0)
}

fn expr_bp(i: Tokens, min_bp: u8) -> PResult<Rc<Expr>> {
    let (mut i, mut lhs) = unary_expr(i)?;
    loop {
        let Some((op, lbp, rbp)) = peek(i).and_then(binop_prec) else {
            break;
        };
        if lbp < min_bp {
            break;
        }
        let line = cur_line(i);
        let (next, rhs) = expr_bp(advance(i), rbp)?;
        i = next;
        lhs = expr_node(line, ExprKind::Binary { op, lhs, rhs });
    }
    Ok((i, lhs))
}

fn unary_expr(i: Tokens) -> PResult<Rc<Expr>> {
    let line = cur_line(i);
    let op = match peek(i) {
        Some(Token::Not) => Some(UnOp::Not),
        Some(Token::Minus) => Some(UnOp::Neg),
        Some(Token::Hash) => Some(UnOp::Len),
        Some(Token::Tilde) => Some(UnOp::BNot),
        _ => None,
    };
    match op {
        Some(op) => {
            let (i, operand) = expr_bp(advance(i), UNARY_BP)?;
            Ok((i, expr_node(line, ExprKind::Unary { op, expr: operand })))
        }
        None => simple_expr(i),
    }
}

fn simple_expr(i: Tokens) -> PResult<Rc<Expr>> {
    let line = cur_line(i);
    match peek(i) {
        Some(Token::Nil) => Ok((advance(i), expr_node(line, ExprKind::Nil))),
        Some(Token::True) => Ok((advance(i), expr_node(line, ExprKind::True))),
        Some(Token::False) => Ok((advance(i), expr_node(line, ExprKind::False))),
        Some(Token::Ellipsis) => Ok((advance(i), expr_node(line, ExprKind::Vararg))),
        Some(Token::Number(n)) => {
            let n = *n;
            Ok((advance(i), expr_node(line, ExprKind::Number(n))))
        }
        Some(Token::Str(s)) => {
            let s = s.clone();
            Ok((advance(i), expr_node(line, ExprKind::Str(s))))
        }
        Some(Token::Function) => {
            let (i, body) = funcbody(advance(i), line, false)?;
            Ok((i, expr_node(line, ExprKind::Function(body))))
        }
        Some(Token::LBrace) => table_constructor(i),
        _ => suffixed_expr(i),
    }
}

fn primary_expr(i: Tokens) -> PResult<Rc<Expr>> {
    let line = cur_line(i);
    match peek(i) {
        Some(Token::Name(_)) => {
            let (i, n) = name(i)?;
            Ok((i, expr_node(line, ExprKind::Name(n))))
        }
        Some(Token::LParen) => {
            let (i, inner) = expr(advance(i))?;
            let (i, _) = expect(i, Token::RParen)?;
            Ok((i, expr_node(line, ExprKind::Paren(inner))))
        }
        _ => fail(i),
    }
}

/// prefixexp with its suffix chain: indexing, calls, method calls, and
/// the table/string call sugar.
fn suffixed_expr(i: Tokens) -> PResult<Rc<Expr>> {
    let (mut i, mut e) = primary_expr(i)?;
    loop {
        let line = cur_line(i);
        match peek(i) {
            Some(Token::Dot) => {
                let (next, n) = name(advance(i))?;
                e = expr_node(
                    line,
                    ExprKind::Index {
                        base: e,
                        key: str_key(line, n),
                    },
                );
                i = next;
            }
            Some(Token::LBracket) => {
                let (next, key) = expr(advance(i))?;
                let (next, _) = expect(next, Token::RBracket)?;
                e = expr_node(line, ExprKind::Index { base: e, key });
                i = next;
            }
            Some(Token::Colon) => {
                let (next, method) = name(advance(i))?;
                let (next, args) = call_args(next)?;
                e = expr_node(
                    line,
                    ExprKind::MethodCall {
                        base: e,
                        name: method,
                        args,
                    },
                );
                i = next;
            }
            Some(Token::LParen) | Some(Token::LBrace) | Some(Token::Str(_)) => {
                let (next, args) = call_args(i)?;
                e = expr_node(line, ExprKind::Call { func: e, args });
                i = next;
            }
            _ => break,
        }
    }
    Ok((i, e))
}

/// args ::= '(' [explist] ')' | tableconstructor | LiteralString
fn call_args(i: Tokens) -> PResult<Vec<Rc<Expr>>> {
    let line = cur_line(i);
    match peek(i) {
        Some(Token::LParen) => {
            let i = advance(i);
            if let Ok((i, _)) = accept(i, Token::RParen) {
                return Ok((i, Vec::new()));
            }
            let (i, args) = explist(i)?;
            let (i, _) = expect(i, Token::RParen)?;
            Ok((i, args))
        }
        Some(Token::LBrace) => {
            let (i, t) = table_constructor(i)?;
            Ok((i, vec![t]))
        }
        Some(Token::Str(s)) => {
            let s = s.clone();
            Ok((advance(i), vec![str_key(line, s)]))
        }
        _ => cut(i),
    }
}

fn table_constructor(i: Tokens) -> PResult<Rc<Expr>> {
    let line = cur_line(i);
    let (mut i, _) = expect(i, Token::LBrace)?;
    let mut fields = Vec::new();
    loop {
        if let Ok((next, _)) = accept(i, Token::RBrace) {
            return Ok((next, expr_node(line, ExprKind::Table(fields))));
        }
        match (peek(i), i.0.get(1).map(|t| &t.token)) {
            (Some(Token::LBracket), _) => {
                let (next, key) = expr(advance(i))?;
                let (next, _) = expect(next, Token::RBracket)?;
                let (next, _) = expect(next, Token::Assign)?;
                let (next, value) = expr(next)?;
                fields.push(TableField::Keyed { key, value });
                i = next;
            }
            (Some(Token::Name(_)), Some(Token::Assign)) => {
                let (next, key) = name(i)?;
                let (next, _) = expect(next, Token::Assign)?;
                let (next, value) = expr(next)?;
                fields.push(TableField::Named { key, value });
                i = next;
            }
            _ => {
                let (next, value) = expr(i)?;
                fields.push(TableField::Pos(value));
                i = next;
            }
        }
        match peek(i) {
            Some(Token::Comma) | Some(Token::Semicolon) => i = advance(i),
            Some(Token::RBrace) => {}
            _ => return cut(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Rc<Block> {
        parse_chunk(src).expect("parse failed")
    }

    #[test]
    fn local_and_assignment() {
        let b = parse("local x = 1\nx = x + 1");
        assert_eq!(b.stmts.len(), 2);
        assert!(matches!(b.stmts[0].kind, StmtKind::Local { .. }));
        assert!(matches!(b.stmts[1].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn dot_index_desugars_to_string_key() {
        let b = parse("a.b.c = 1");
        let StmtKind::Assign { targets, .. } = &b.stmts[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Index { base, key } = &targets[0].kind else {
            panic!("expected index");
        };
        assert!(matches!(&key.kind, ExprKind::Str(s) if &**s == "c"));
        assert!(matches!(base.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn precedence_pow_over_unary() {
        // -2^2 parses as -(2^2)
        let b = parse("return -2^2");
        let ret = b.ret.as_ref().unwrap();
        let ExprKind::Unary { op, expr } = &ret.exprs[0].kind else {
            panic!("expected unary at root");
        };
        assert_eq!(*op, UnOp::Neg);
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn concat_is_right_associative() {
        let b = parse("return 'a' .. 'b' .. 'c'");
        let ret = b.ret.as_ref().unwrap();
        let ExprKind::Binary { op, rhs, .. } = &ret.exprs[0].kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Concat);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinOp::Concat,
                ..
            }
        ));
    }

    #[test]
    fn method_call_and_sugar_args() {
        let b = parse("obj:m(1)\nprint 'hi'\nf{1, 2}");
        assert!(matches!(
            &b.stmts[0].kind,
            StmtKind::Call(e) if matches!(e.kind, ExprKind::MethodCall { .. })
        ));
        for stmt in &b.stmts[1..] {
            let StmtKind::Call(e) = &stmt.kind else {
                panic!("expected call");
            };
            let ExprKind::Call { args, .. } = &e.kind else {
                panic!("expected call expr");
            };
            assert_eq!(args.len(), 1);
        }
    }

    #[test]
    fn method_body_gets_self() {
        let b = parse("function t:m(a) end");
        let StmtKind::Function { body, .. } = &b.stmts[0].kind else {
            panic!("expected function stmt");
        };
        assert_eq!(body.params.len(), 2);
        assert_eq!(&*body.params[0], "self");
    }

    #[test]
    fn table_constructor_fields() {
        let b = parse("return {1, x = 2, [3] = 4, 5}");
        let ret = b.ret.as_ref().unwrap();
        let ExprKind::Table(fields) = &ret.exprs[0].kind else {
            panic!("expected table");
        };
        assert_eq!(fields.len(), 4);
        assert!(matches!(fields[0], TableField::Pos(_)));
        assert!(matches!(fields[1], TableField::Named { .. }));
        assert!(matches!(fields[2], TableField::Keyed { .. }));
    }

    #[test]
    fn numeric_and_generic_for() {
        let b = parse("for i = 1, 10, 2 do end\nfor k, v in pairs(t) do end");
        assert!(matches!(b.stmts[0].kind, StmtKind::NumericFor { .. }));
        let StmtKind::GenericFor { names, .. } = &b.stmts[1].kind else {
            panic!("expected generic for");
        };
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn goto_and_labels() {
        let b = parse("::top:: goto top");
        assert!(matches!(b.stmts[0].kind, StmtKind::Label(_)));
        assert!(matches!(b.stmts[1].kind, StmtKind::Goto(_)));
    }

    #[test]
    fn bare_non_call_expression_is_an_error() {
        assert!(parse_chunk("x + 1").is_err());
        assert!(parse_chunk("local = 3").is_err());
        assert!(parse_chunk("if x then").is_err());
    }

    #[test]
    fn chunk_with_trailing_return() {
        let b = parse("local a = 1; return a, 2;");
        assert_eq!(b.ret.as_ref().unwrap().exprs.len(), 2);
    }

    #[test]
    fn nodes_are_numbered() {
        let b = parse("local x = 1 + 2");
        assert!(b.id.get() > 0);
        assert!(b.stmts[0].id.get() > b.id.get());
    }
}
