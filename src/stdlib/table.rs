//! The table library, operating on the hybrid representation directly:
//! 1-based shifting insert/remove, range concat, an in-place sort over
//! the array part, and pack/unpack.

use std::cell::RefCell;
use std::rc::Rc;

use super::{check_table, module, opt_int, opt_str};
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::exec::call_value;
use crate::ops;
use crate::table::Table;
use crate::value::{first, CallFuture, LuaValue};

pub fn register(env: &Env) {
    let lib = module(vec![
        (
            "insert",
            LuaValue::native("insert", |_env, args| {
                let t = check_table(&args, 0, "insert")?;
                match args.len() {
                    0 | 1 => Err(LuaError::runtime("wrong number of arguments to 'insert'")),
                    2 => {
                        let n = t.borrow().border();
                        t.borrow_mut().insert_at(n + 1, args[1].clone())?;
                        Ok(Vec::new())
                    }
                    3 => {
                        let pos = super::check_int(&args, 1, "insert")?;
                        if pos < 1 {
                            return Err(LuaError::bad_argument_msg(
                                2,
                                "insert",
                                "position out of bounds",
                            ));
                        }
                        t.borrow_mut().insert_at(pos as usize, args[2].clone())?;
                        Ok(Vec::new())
                    }
                    _ => Err(LuaError::runtime("wrong number of arguments to 'insert'")),
                }
            }),
        ),
        (
            "remove",
            LuaValue::native("remove", |_env, args| {
                let t = check_table(&args, 0, "remove")?;
                let n = t.borrow().border();
                let pos = opt_int(&args, 1, "remove", n as i64)?;
                if pos < 0 {
                    return Err(LuaError::bad_argument_msg(
                        2,
                        "remove",
                        "position out of bounds",
                    ));
                }
                let removed = t.borrow_mut().remove_at(pos as usize)?;
                Ok(vec![removed])
            }),
        ),
        (
            "concat",
            LuaValue::native("concat", |_env, args| {
                let t = check_table(&args, 0, "concat")?;
                let sep = opt_str(&args, 1, "concat", "")?;
                let i = opt_int(&args, 2, "concat", 1)?;
                let j = opt_int(&args, 3, "concat", t.borrow().border() as i64)?;
                let mut pieces = Vec::new();
                let mut k = i;
                while k <= j {
                    let v = t.borrow().raw_get(&LuaValue::Number(k as f64));
                    match v {
                        LuaValue::Str(s) => pieces.push(s.to_string()),
                        LuaValue::Number(n) => pieces.push(crate::strfmt::number_text(n)),
                        other => {
                            return Err(LuaError::runtime(format!(
                                "invalid value (at index {}) in table for 'concat' (a {})",
                                k,
                                other.type_name()
                            )))
                        }
                    }
                    k += 1;
                }
                Ok(vec![LuaValue::str(pieces.join(&sep))])
            }),
        ),
        (
            "sort",
            LuaValue::native_async("sort", |env: Env, args: Vec<LuaValue>| -> CallFuture {
                Box::pin(async move { table_sort(&env, args).await })
            }),
        ),
        (
            "unpack",
            LuaValue::native("unpack", |_env, args| {
                let t = check_table(&args, 0, "unpack")?;
                let i = opt_int(&args, 1, "unpack", 1)?;
                let j = opt_int(&args, 2, "unpack", t.borrow().border() as i64)?;
                let mut out = Vec::new();
                let mut k = i;
                while k <= j {
                    out.push(t.borrow().raw_get(&LuaValue::Number(k as f64)));
                    k += 1;
                }
                Ok(out)
            }),
        ),
        (
            "pack",
            LuaValue::native("pack", |_env, args| {
                let n = args.len();
                let mut t = Table::from_values(args);
                t.raw_set_str("n", LuaValue::Number(n as f64));
                Ok(vec![LuaValue::Table(Rc::new(RefCell::new(t)))])
            }),
        ),
    ]);
    env.load_lib("table", lib);
}

/// In-place insertion sort over `[1, #t]`. Insertion keeps the pass
/// stable and composes with a Lua comparator that may itself suspend.
async fn table_sort(env: &Env, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(&args, 0, "sort")?;
    let comparator = match args.get(1) {
        None | Some(LuaValue::Nil) => None,
        Some(f) => Some(f.clone()),
    };
    let n = t.borrow().border();
    let mut values: Vec<LuaValue> = Vec::with_capacity(n);
    for k in 1..=n {
        values.push(t.borrow().raw_get(&LuaValue::Number(k as f64)));
    }
    for i in 1..values.len() {
        let mut j = i;
        while j > 0 {
            let earlier = values[j - 1].clone();
            let later = values[j].clone();
            let swap = match &comparator {
                Some(f) => {
                    let out = call_value(env, f.clone(), vec![later, earlier]).await?;
                    first(out).truthy()
                }
                None => ops::lt(env, &values[j], &values[j - 1]).await?,
            };
            if !swap {
                break;
            }
            values.swap(j - 1, j);
            j -= 1;
        }
    }
    for (k, v) in values.into_iter().enumerate() {
        t.borrow_mut().raw_set_int(k + 1, v);
    }
    Ok(Vec::new())
}
