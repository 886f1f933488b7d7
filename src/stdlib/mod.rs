//! The standard library, wired to the runtime core.
//!
//! Each submodule registers one library table (or, for the base
//! library, a set of globals). The argument helpers here give every
//! entry point consistent `bad argument #N to 'f'` reporting.

pub mod base;
pub mod coroutine;
pub mod math;
pub mod os;
pub mod package;
pub mod string;
pub mod table;

use std::cell::RefCell;
use std::rc::Rc;

use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::strfmt;
use crate::table::Table;
use crate::value::{LuaValue, TableRef, ThreadRef};

/// Install every library into a fresh environment.
pub fn register(env: &Env) {
    base::register(env);
    string::register(env);
    table::register(env);
    math::register(env);
    os::register(env);
    coroutine::register(env);
    // Last, so it can snapshot the loaded libraries.
    package::register(env);
}

/// Build a library table from named entries.
pub(crate) fn module(entries: Vec<(&'static str, LuaValue)>) -> TableRef {
    let mut t = Table::new();
    for (name, value) in entries {
        t.raw_set_str(name, value);
    }
    Rc::new(RefCell::new(t))
}

pub(crate) fn arg(args: &[LuaValue], idx: usize) -> LuaValue {
    args.get(idx).cloned().unwrap_or(LuaValue::Nil)
}

pub(crate) fn check_any(args: &[LuaValue], idx: usize, func: &str) -> LuaResult<LuaValue> {
    args.get(idx)
        .cloned()
        .ok_or_else(|| LuaError::bad_argument(idx + 1, func, "value", "no value"))
}

pub(crate) fn check_table(args: &[LuaValue], idx: usize, func: &str) -> LuaResult<TableRef> {
    match args.get(idx) {
        Some(LuaValue::Table(t)) => Ok(t.clone()),
        other => Err(LuaError::bad_argument(
            idx + 1,
            func,
            "table",
            other.map(|v| v.type_name()).unwrap_or("no value"),
        )),
    }
}

pub(crate) fn check_thread(args: &[LuaValue], idx: usize, func: &str) -> LuaResult<ThreadRef> {
    match args.get(idx) {
        Some(LuaValue::Thread(t)) => Ok(t.clone()),
        other => Err(LuaError::bad_argument(
            idx + 1,
            func,
            "coroutine",
            other.map(|v| v.type_name()).unwrap_or("no value"),
        )),
    }
}

/// String arguments accept numbers, which render in canonical form.
pub(crate) fn check_str(args: &[LuaValue], idx: usize, func: &str) -> LuaResult<String> {
    match args.get(idx) {
        Some(LuaValue::Str(s)) => Ok(s.to_string()),
        Some(LuaValue::Number(n)) => Ok(strfmt::number_text(*n)),
        other => Err(LuaError::bad_argument(
            idx + 1,
            func,
            "string",
            other.map(|v| v.type_name()).unwrap_or("no value"),
        )),
    }
}

pub(crate) fn check_number(args: &[LuaValue], idx: usize, func: &str) -> LuaResult<f64> {
    match args.get(idx) {
        Some(v) => v.coerce_number().ok_or_else(|| {
            LuaError::bad_argument(idx + 1, func, "number", v.type_name())
        }),
        None => Err(LuaError::bad_argument(idx + 1, func, "number", "no value")),
    }
}

pub(crate) fn check_int(args: &[LuaValue], idx: usize, func: &str) -> LuaResult<i64> {
    match args.get(idx) {
        Some(v) => v.coerce_integer().ok_or_else(|| {
            if v.coerce_number().is_some() {
                LuaError::bad_argument_msg(idx + 1, func, "number has no integer representation")
            } else {
                LuaError::bad_argument(idx + 1, func, "number", v.type_name())
            }
        }),
        None => Err(LuaError::bad_argument(idx + 1, func, "number", "no value")),
    }
}

pub(crate) fn opt_number(
    args: &[LuaValue],
    idx: usize,
    func: &str,
    default: f64,
) -> LuaResult<f64> {
    match args.get(idx) {
        None | Some(LuaValue::Nil) => Ok(default),
        Some(_) => check_number(args, idx, func),
    }
}

pub(crate) fn opt_int(args: &[LuaValue], idx: usize, func: &str, default: i64) -> LuaResult<i64> {
    match args.get(idx) {
        None | Some(LuaValue::Nil) => Ok(default),
        Some(_) => check_int(args, idx, func),
    }
}

pub(crate) fn opt_str(
    args: &[LuaValue],
    idx: usize,
    func: &str,
    default: &str,
) -> LuaResult<String> {
    match args.get(idx) {
        None | Some(LuaValue::Nil) => Ok(default.to_string()),
        Some(_) => check_str(args, idx, func),
    }
}
