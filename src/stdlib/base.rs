//! Base globals: printing, type inspection, metatable access, raw
//! table access, iteration primitives, and protected calls.

use super::{arg, check_any, check_int, check_table};
use crate::env::Env;
use crate::error::LuaError;
use crate::exec::call_value;
use crate::ops;
use crate::value::{first, CallFuture, LuaValue};

pub fn register(env: &Env) {
    let globals = env.globals();
    let mut g = globals.borrow_mut();

    g.raw_set_str("_G", LuaValue::Table(env.globals()));
    g.raw_set_str("_VERSION", LuaValue::str("Lua 5.3"));

    g.raw_set_str(
        "print",
        LuaValue::native_async("print", |env: Env, args: Vec<LuaValue>| -> CallFuture {
            Box::pin(async move {
                let mut pieces = Vec::with_capacity(args.len());
                for v in args {
                    pieces.push(ops::tostring_value(&env, v).await?);
                }
                env.write_stdout(&pieces.join("\t"));
                Ok(Vec::new())
            })
        }),
    );

    g.raw_set_str(
        "type",
        LuaValue::native("type", |_env, args| {
            let v = check_any(&args, 0, "type")?;
            Ok(vec![LuaValue::str(v.type_name())])
        }),
    );

    g.raw_set_str(
        "tostring",
        LuaValue::native_async("tostring", |env: Env, args: Vec<LuaValue>| -> CallFuture {
            Box::pin(async move {
                let v = check_any(&args, 0, "tostring")?;
                let text = ops::tostring_value(&env, v).await?;
                Ok(vec![LuaValue::str(text)])
            })
        }),
    );

    g.raw_set_str(
        "tonumber",
        LuaValue::native("tonumber", |_env, args| {
            match args.get(1) {
                None | Some(LuaValue::Nil) => {
                    Ok(vec![match arg(&args, 0).coerce_number() {
                        Some(n) => LuaValue::Number(n),
                        None => LuaValue::Nil,
                    }])
                }
                Some(base_v) => {
                    let base = base_v.coerce_integer().ok_or_else(|| {
                        LuaError::bad_argument(2, "tonumber", "number", base_v.type_name())
                    })?;
                    if !(2..=36).contains(&base) {
                        return Err(LuaError::bad_argument_msg(
                            2,
                            "tonumber",
                            "base out of range",
                        ));
                    }
                    let text = match arg(&args, 0) {
                        LuaValue::Str(s) => s.to_string(),
                        other => {
                            return Err(LuaError::bad_argument(
                                1,
                                "tonumber",
                                "string",
                                other.type_name(),
                            ))
                        }
                    };
                    let out = i64::from_str_radix(text.trim(), base as u32)
                        .map(|n| LuaValue::Number(n as f64))
                        .unwrap_or(LuaValue::Nil);
                    Ok(vec![out])
                }
            }
        }),
    );

    let next_fn = LuaValue::native("next", |_env, args| {
        let t = check_table(&args, 0, "next")?;
        let key = arg(&args, 1);
        let entry = t.borrow().next_entry(&key)?;
        Ok(match entry {
            Some((k, v)) => vec![k, v],
            None => vec![LuaValue::Nil],
        })
    });
    g.raw_set_str("next", next_fn.clone());

    g.raw_set_str(
        "pairs",
        LuaValue::native("pairs", move |_env, args| {
            let t = check_table(&args, 0, "pairs")?;
            Ok(vec![next_fn.clone(), LuaValue::Table(t), LuaValue::Nil])
        }),
    );

    let ipairs_iter = LuaValue::native_async(
        "ipairs.iterator",
        |env: Env, args: Vec<LuaValue>| -> CallFuture {
            Box::pin(async move {
                let t = check_any(&args, 0, "ipairs")?;
                let i = check_int(&args, 1, "ipairs")? + 1;
                let v = ops::index(&env, t, LuaValue::Number(i as f64)).await?;
                Ok(if v.is_nil() {
                    vec![LuaValue::Nil]
                } else {
                    vec![LuaValue::Number(i as f64), v]
                })
            })
        },
    );
    g.raw_set_str(
        "ipairs",
        LuaValue::native("ipairs", move |_env, args| {
            let t = check_any(&args, 0, "ipairs")?;
            Ok(vec![ipairs_iter.clone(), t, LuaValue::Number(0.0)])
        }),
    );

    g.raw_set_str(
        "select",
        LuaValue::native("select", |_env, args| {
            match args.first() {
                Some(LuaValue::Str(s)) if &**s == "#" => {
                    Ok(vec![LuaValue::Number((args.len() - 1) as f64)])
                }
                _ => {
                    let n = check_int(&args, 0, "select")?;
                    let rest = args.len() as i64 - 1;
                    let from = if n > 0 {
                        n
                    } else if n < 0 && -n <= rest {
                        rest + n + 1
                    } else {
                        return Err(LuaError::bad_argument_msg(
                            1,
                            "select",
                            "index out of range",
                        ));
                    };
                    Ok(args.into_iter().skip(from as usize).collect())
                }
            }
        }),
    );

    g.raw_set_str(
        "rawget",
        LuaValue::native("rawget", |_env, args| {
            let t = check_table(&args, 0, "rawget")?;
            let v = t.borrow().raw_get(&arg(&args, 1));
            Ok(vec![v])
        }),
    );

    g.raw_set_str(
        "rawset",
        LuaValue::native("rawset", |_env, args| {
            let t = check_table(&args, 0, "rawset")?;
            t.borrow_mut().raw_set(arg(&args, 1), arg(&args, 2))?;
            Ok(vec![LuaValue::Table(t)])
        }),
    );

    g.raw_set_str(
        "rawequal",
        LuaValue::native("rawequal", |_env, args| {
            Ok(vec![LuaValue::Boolean(arg(&args, 0).raw_eq(&arg(&args, 1)))])
        }),
    );

    g.raw_set_str(
        "rawlen",
        LuaValue::native("rawlen", |_env, args| match args.first() {
            Some(LuaValue::Table(t)) => Ok(vec![LuaValue::Number(t.borrow().border() as f64)]),
            Some(LuaValue::Str(s)) => Ok(vec![LuaValue::Number(s.len() as f64)]),
            other => Err(LuaError::bad_argument(
                1,
                "rawlen",
                "table or string",
                other.map(|v| v.type_name()).unwrap_or("no value"),
            )),
        }),
    );

    g.raw_set_str(
        "setmetatable",
        LuaValue::native("setmetatable", |_env, args| {
            let t = check_table(&args, 0, "setmetatable")?;
            let protected = t
                .borrow()
                .metatable
                .as_ref()
                .map(|m| !m.borrow().raw_get_str("__metatable").is_nil())
                .unwrap_or(false);
            if protected {
                return Err(LuaError::runtime("cannot change a protected metatable"));
            }
            match arg(&args, 1) {
                LuaValue::Nil => t.borrow_mut().metatable = None,
                LuaValue::Table(mt) => t.borrow_mut().metatable = Some(mt),
                other => {
                    return Err(LuaError::bad_argument(
                        2,
                        "setmetatable",
                        "nil or table",
                        other.type_name(),
                    ))
                }
            }
            Ok(vec![LuaValue::Table(t)])
        }),
    );

    g.raw_set_str(
        "getmetatable",
        LuaValue::native("getmetatable", |env, args| {
            let meta = match arg(&args, 0) {
                LuaValue::Table(t) => t.borrow().metatable.clone(),
                LuaValue::Str(_) => Some(env.string_metatable()),
                _ => None,
            };
            Ok(vec![match meta {
                Some(mt) => {
                    let guard = mt.borrow().raw_get_str("__metatable");
                    if guard.is_nil() {
                        LuaValue::Table(mt.clone())
                    } else {
                        guard
                    }
                }
                None => LuaValue::Nil,
            }])
        }),
    );

    g.raw_set_str(
        "pcall",
        LuaValue::native_async("pcall", |env: Env, mut args: Vec<LuaValue>| -> CallFuture {
            Box::pin(async move {
                if args.is_empty() {
                    return Err(LuaError::bad_argument(1, "pcall", "value", "no value"));
                }
                let f = args.remove(0);
                match call_value(&env, f, args).await {
                    Ok(values) => {
                        let mut out = vec![LuaValue::Boolean(true)];
                        out.extend(values);
                        Ok(out)
                    }
                    Err(err) => Ok(vec![
                        LuaValue::Boolean(false),
                        LuaValue::str(err.message()),
                    ]),
                }
            })
        }),
    );

    g.raw_set_str(
        "xpcall",
        LuaValue::native_async("xpcall", |env: Env, mut args: Vec<LuaValue>| -> CallFuture {
            Box::pin(async move {
                if args.len() < 2 {
                    return Err(LuaError::bad_argument(2, "xpcall", "value", "no value"));
                }
                let f = args.remove(0);
                let handler = args.remove(0);
                match call_value(&env, f, args).await {
                    Ok(values) => {
                        let mut out = vec![LuaValue::Boolean(true)];
                        out.extend(values);
                        Ok(out)
                    }
                    Err(err) => {
                        let handled = call_value(
                            &env,
                            handler,
                            vec![LuaValue::str(err.message())],
                        )
                        .await?;
                        Ok(vec![LuaValue::Boolean(false), first(handled)])
                    }
                }
            })
        }),
    );

    g.raw_set_str(
        "error",
        LuaValue::native("error", |_env, args| {
            Err(LuaError::runtime(arg(&args, 0).display_text()))
        }),
    );

    g.raw_set_str(
        "assert",
        LuaValue::native("assert", |_env, args| {
            if arg(&args, 0).truthy() {
                Ok(args)
            } else {
                let message = match args.get(1) {
                    Some(v) => v.display_text(),
                    None => "assertion failed!".to_string(),
                };
                Err(LuaError::runtime(message))
            }
        }),
    );

    g.raw_set_str(
        "collectgarbage",
        LuaValue::native("collectgarbage", |_env, _args| {
            // Collection is the host's job; report zero usage.
            Ok(vec![LuaValue::Number(0.0)])
        }),
    );

}
