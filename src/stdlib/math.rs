//! The math library. `random`/`randomseed` run on the environment's
//! deterministic linear-congruential generator so seeded sequences
//! reproduce exactly.

use super::{arg, check_number, module, opt_number};
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::value::LuaValue;

/// Largest integral double; the engine's single number type makes this
/// the practical integer range.
const MAX_INTEGER: f64 = 9_007_199_254_740_991.0;

fn unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, LuaValue) {
    (
        name,
        LuaValue::native(name, move |_env, args| {
            let x = check_number(&args, 0, name)?;
            Ok(vec![LuaValue::Number(f(x))])
        }),
    )
}

pub fn register(env: &Env) {
    let lib = module(vec![
        unary("abs", f64::abs),
        unary("ceil", f64::ceil),
        unary("floor", f64::floor),
        unary("sqrt", f64::sqrt),
        unary("sin", f64::sin),
        unary("cos", f64::cos),
        unary("tan", f64::tan),
        unary("asin", f64::asin),
        unary("acos", f64::acos),
        unary("atan", f64::atan),
        unary("exp", f64::exp),
        unary("deg", f64::to_degrees),
        unary("rad", f64::to_radians),
        (
            "log",
            LuaValue::native("log", |_env, args| {
                let x = check_number(&args, 0, "log")?;
                let out = match args.get(1) {
                    None | Some(LuaValue::Nil) => x.ln(),
                    Some(_) => {
                        let base = check_number(&args, 1, "log")?;
                        x.log(base)
                    }
                };
                Ok(vec![LuaValue::Number(out)])
            }),
        ),
        (
            "fmod",
            LuaValue::native("fmod", |_env, args| {
                let x = check_number(&args, 0, "fmod")?;
                let y = check_number(&args, 1, "fmod")?;
                Ok(vec![LuaValue::Number(x % y)])
            }),
        ),
        (
            "modf",
            LuaValue::native("modf", |_env, args| {
                let x = check_number(&args, 0, "modf")?;
                Ok(vec![LuaValue::Number(x.trunc()), LuaValue::Number(x.fract())])
            }),
        ),
        (
            "max",
            LuaValue::native("max", |_env, args| {
                let mut best = check_number(&args, 0, "max")?;
                for i in 1..args.len() {
                    best = best.max(check_number(&args, i, "max")?);
                }
                Ok(vec![LuaValue::Number(best)])
            }),
        ),
        (
            "min",
            LuaValue::native("min", |_env, args| {
                let mut best = check_number(&args, 0, "min")?;
                for i in 1..args.len() {
                    best = best.min(check_number(&args, i, "min")?);
                }
                Ok(vec![LuaValue::Number(best)])
            }),
        ),
        (
            "tointeger",
            LuaValue::native("tointeger", |_env, args| {
                Ok(vec![match arg(&args, 0).coerce_integer() {
                    Some(n) => LuaValue::Number(n as f64),
                    None => LuaValue::Nil,
                }])
            }),
        ),
        (
            "type",
            LuaValue::native("type", |_env, args| {
                Ok(vec![match arg(&args, 0) {
                    LuaValue::Number(n) => {
                        if n.is_finite() && n.floor() == n && n.abs() <= MAX_INTEGER {
                            LuaValue::str("integer")
                        } else {
                            LuaValue::str("float")
                        }
                    }
                    _ => LuaValue::Nil,
                }])
            }),
        ),
        (
            "ult",
            LuaValue::native("ult", |_env, args| {
                let a = super::check_int(&args, 0, "ult")? as u64;
                let b = super::check_int(&args, 1, "ult")? as u64;
                Ok(vec![LuaValue::Boolean(a < b)])
            }),
        ),
        (
            "random",
            LuaValue::native("random", |env, args| math_random(&env, args)),
        ),
        (
            "randomseed",
            LuaValue::native("randomseed", |env, args| {
                let seed = opt_number(&args, 0, "randomseed", 0.0)?;
                env.set_random_seed(seed);
                Ok(Vec::new())
            }),
        ),
    ]);
    {
        let mut t = lib.borrow_mut();
        t.raw_set_str("pi", LuaValue::Number(std::f64::consts::PI));
        t.raw_set_str("huge", LuaValue::Number(f64::INFINITY));
        t.raw_set_str("maxinteger", LuaValue::Number(MAX_INTEGER));
        t.raw_set_str("mininteger", LuaValue::Number(-MAX_INTEGER));
    }
    env.load_lib("math", lib);
}

fn math_random(env: &Env, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
    let r = env.next_random();
    let out = match args.len() {
        0 => LuaValue::Number(r),
        1 => {
            let m = super::check_int(&args, 0, "random")?;
            if m < 1 {
                return Err(LuaError::bad_argument_msg(1, "random", "interval is empty"));
            }
            LuaValue::Number(1.0 + (r * m as f64).floor())
        }
        _ => {
            let m = super::check_int(&args, 0, "random")?;
            let n = super::check_int(&args, 1, "random")?;
            if m > n {
                return Err(LuaError::bad_argument_msg(2, "random", "interval is empty"));
            }
            LuaValue::Number(m as f64 + (r * (n - m + 1) as f64).floor())
        }
    };
    Ok(vec![out])
}
