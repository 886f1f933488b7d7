//! Runtime value representation.
//!
//! A tagged value is one of: nil, boolean, number (f64), string, table,
//! callable, or thread. Strings are immutable and byte-oriented; tables,
//! functions, and threads compare by reference identity, primitives by
//! value (NaN is not equal to itself).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

use crate::analysis::Analysis;
use crate::ast::FunctionBody;
use crate::env::Env;
use crate::error::LuaResult;
use crate::scope::Scope;
use crate::strfmt;
use crate::table::Table;
use crate::thread::Thread;

pub type TableRef = Rc<RefCell<Table>>;
pub type ThreadRef = Rc<RefCell<Thread>>;

/// The result shape of every call: a boxed local future of a value list,
/// so host functions compose with coroutine suspension.
pub type CallFuture = LocalBoxFuture<'static, LuaResult<Vec<LuaValue>>>;

#[derive(Clone)]
pub enum LuaValue {
    Nil,
    Boolean(bool),
    Number(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(Rc<Callable>),
    Thread(ThreadRef),
}

/// A callable Lua value: a host function or a Lua closure.
pub enum Callable {
    Native {
        name: &'static str,
        f: Box<dyn Fn(Env, Vec<LuaValue>) -> CallFuture>,
    },
    Lua(LuaClosure),
}

/// A Lua function value: the body subtree, the captured defining scope,
/// and the analysis tables of the chunk the body came from.
pub struct LuaClosure {
    pub body: Rc<FunctionBody>,
    pub scope: Rc<Scope>,
    pub analysis: Rc<Analysis>,
}

impl LuaValue {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        LuaValue::Str(s.into())
    }

    pub fn table(t: Table) -> Self {
        LuaValue::Table(Rc::new(RefCell::new(t)))
    }

    /// Wrap a synchronous host function as a callable value.
    pub fn native<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Env, Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> + 'static,
    {
        LuaValue::Function(Rc::new(Callable::Native {
            name,
            f: Box::new(move |env, args| {
                let out = f(env, args);
                Box::pin(std::future::ready(out))
            }),
        }))
    }

    /// Wrap a host function that needs to call back into Lua (and may
    /// therefore suspend) as a callable value.
    pub fn native_async<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Env, Vec<LuaValue>) -> CallFuture + 'static,
    {
        LuaValue::Function(Rc::new(Callable::Native { name, f: Box::new(f) }))
    }

    /// Only nil and false are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Boolean(_) => "boolean",
            LuaValue::Number(_) => "number",
            LuaValue::Str(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Function(_) => "function",
            LuaValue::Thread(_) => "thread",
        }
    }

    /// Numeric coercion: numbers pass through, strings parse with Lua
    /// conventions (optional sign, decimal or `0x` hexadecimal,
    /// surrounding whitespace). Booleans do not coerce.
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            LuaValue::Str(s) => parse_lua_number(s),
            _ => None,
        }
    }

    /// The integer view required by bitwise operators and some library
    /// routines: the value must be a number (after coercion) with an
    /// exact integer representation.
    pub fn coerce_integer(&self) -> Option<i64> {
        let n = self.coerce_number()?;
        if n.is_finite() && n.floor() == n && n.abs() <= 9.007_199_254_740_992e15 {
            Some(n as i64)
        } else {
            None
        }
    }

    /// Raw equality: identity for reference types, value equality for
    /// primitives. This is `rawequal` and the fallback of `==`.
    pub fn raw_eq(&self, other: &LuaValue) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::Str(a), LuaValue::Str(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Function(a), LuaValue::Function(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Thread(a), LuaValue::Thread(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address used in the canonical text of reference values.
    pub fn ref_addr(&self) -> Option<usize> {
        match self {
            LuaValue::Table(t) => Some(Rc::as_ptr(t) as *const () as usize),
            LuaValue::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            LuaValue::Thread(t) => Some(Rc::as_ptr(t) as *const () as usize),
            _ => None,
        }
    }

    /// Canonical text of a value, ignoring `__tostring` (the metatable
    /// aware rendering lives in the base library where it can call back
    /// into Lua).
    pub fn display_text(&self) -> String {
        match self {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Number(n) => strfmt::number_text(*n),
            LuaValue::Str(s) => s.to_string(),
            other => format!(
                "{}: 0x{:012x}",
                other.type_name(),
                other.ref_addr().unwrap_or(0)
            ),
        }
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw_eq(other)
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Str(s) => write!(f, "\"{}\"", s),
            other => write!(f, "{}", other.display_text()),
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

/// Parse a string as a Lua number: optional surrounding whitespace,
/// optional sign, `0x` hex integers or decimal floats.
pub fn parse_lua_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let (neg, rest) = match t.as_bytes()[0] {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    let mag = if let Some(hex) = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // Wrap like Lua's 64-bit hex literals, then view as a float.
        let mut acc: u64 = 0;
        for b in hex.bytes() {
            let d = (b as char).to_digit(16).unwrap() as u64;
            acc = acc.wrapping_mul(16).wrapping_add(d);
        }
        acc as i64 as f64
    } else {
        // Reject forms Rust accepts but Lua does not.
        if rest.bytes().any(|b| !matches!(b, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')) {
            return None;
        }
        rest.parse::<f64>().ok()?
    };
    Some(if neg { -mag } else { mag })
}

/// The first value of a call result, or nil.
pub fn first(mut values: Vec<LuaValue>) -> LuaValue {
    if values.is_empty() {
        LuaValue::Nil
    } else {
        values.swap_remove(0)
    }
}
