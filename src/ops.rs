//! The operator dispatcher.
//!
//! Every operator the evaluator emits goes through here so metamethods
//! participate: metamethod first when either operand is a table carrying
//! the event key, then coercion (numeric for arithmetic and bitwise,
//! stringwise for concat), then the computation. Comparison requires
//! same-kind operands; `__eq` fires only for two tables sharing one
//! metatable. The `__index`/`__newindex` chains are chased iteratively
//! with a loop guard.

use crate::ast::{BinOp, UnOp};
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::exec::call_value;
use crate::strfmt;
use crate::value::{first, LuaValue};

const CHAIN_LIMIT: usize = 100;

/// Metamethod lookup: tables via their metatable, strings via the
/// per-environment string metatable. Other types carry none.
pub fn get_metamethod(env: &Env, v: &LuaValue, event: &str) -> Option<LuaValue> {
    let meta = match v {
        LuaValue::Table(t) => t.borrow().metatable.clone()?,
        LuaValue::Str(_) => env.string_metatable(),
        _ => return None,
    };
    let mm = meta.borrow().raw_get_str(event);
    if mm.is_nil() {
        None
    } else {
        Some(mm)
    }
}

async fn meta_binary(
    env: &Env,
    event: &str,
    a: &LuaValue,
    b: &LuaValue,
) -> LuaResult<Option<LuaValue>> {
    let mm = match get_metamethod(env, a, event) {
        Some(mm) => Some(mm),
        None => get_metamethod(env, b, event),
    };
    match mm {
        Some(mm) => {
            let out = call_value(env, mm, vec![a.clone(), b.clone()]).await?;
            Ok(Some(first(out)))
        }
        None => Ok(None),
    }
}

fn arith_event(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add",
        BinOp::Sub => "__sub",
        BinOp::Mul => "__mul",
        BinOp::Div => "__div",
        BinOp::IDiv => "__idiv",
        BinOp::Mod => "__mod",
        BinOp::Pow => "__pow",
        BinOp::BAnd => "__band",
        BinOp::BOr => "__bor",
        BinOp::BXor => "__bxor",
        BinOp::Shl => "__shl",
        BinOp::Shr => "__shr",
        _ => unreachable!("not an arithmetic operator"),
    }
}

/// Lua's floored modulo; the sign follows the divisor. Zero, NaN, and
/// infinite divisors yield NaN.
fn lua_mod(a: f64, b: f64) -> f64 {
    if b == 0.0 || b.is_nan() || b.is_infinite() {
        f64::NAN
    } else {
        a - (a / b).floor() * b
    }
}

fn lua_shift(a: i64, b: i64) -> f64 {
    let (value, count, left) = if b >= 0 {
        (a as u64, b, true)
    } else {
        (a as u64, -b, false)
    };
    if count >= 64 {
        return 0.0;
    }
    let shifted = if left {
        value << count
    } else {
        value >> count
    };
    shifted as i64 as f64
}

/// All eager binary operators. `and`/`or` are lazy and never reach here.
pub async fn binary(env: &Env, op: BinOp, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod
        | BinOp::Pow => {
            if let (Some(x), Some(y)) = (a.coerce_number(), b.coerce_number()) {
                let out = match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    BinOp::Div => x / y,
                    BinOp::IDiv => (x / y).floor(),
                    BinOp::Mod => lua_mod(x, y),
                    BinOp::Pow => x.powf(y),
                    _ => unreachable!(),
                };
                return Ok(LuaValue::Number(out));
            }
            match meta_binary(env, arith_event(op), &a, &b).await? {
                Some(v) => Ok(v),
                None => {
                    let bad = if a.coerce_number().is_none() { &a } else { &b };
                    Err(LuaError::arith(bad.type_name()))
                }
            }
        }
        BinOp::BAnd | BinOp::BOr | BinOp::BXor | BinOp::Shl | BinOp::Shr => {
            if let (Some(x), Some(y)) = (a.coerce_integer(), b.coerce_integer()) {
                let out = match op {
                    BinOp::BAnd => (x & y) as f64,
                    BinOp::BOr => (x | y) as f64,
                    BinOp::BXor => (x ^ y) as f64,
                    BinOp::Shl => lua_shift(x, y),
                    BinOp::Shr => lua_shift(x, -y),
                    _ => unreachable!(),
                };
                return Ok(LuaValue::Number(out));
            }
            match meta_binary(env, arith_event(op), &a, &b).await? {
                Some(v) => Ok(v),
                None => {
                    let bad = if a.coerce_integer().is_none() { &a } else { &b };
                    if bad.coerce_number().is_some() {
                        Err(LuaError::runtime("number has no integer representation"))
                    } else {
                        Err(LuaError::runtime(format!(
                            "attempt to perform bitwise operation on a {} value",
                            bad.type_name()
                        )))
                    }
                }
            }
        }
        BinOp::Concat => concat(env, a, b).await,
        BinOp::Eq => Ok(LuaValue::Boolean(eq(env, &a, &b).await?)),
        BinOp::Ne => Ok(LuaValue::Boolean(!eq(env, &a, &b).await?)),
        BinOp::Lt => Ok(LuaValue::Boolean(lt(env, &a, &b).await?)),
        BinOp::Le => Ok(LuaValue::Boolean(le(env, &a, &b).await?)),
        BinOp::Gt => Ok(LuaValue::Boolean(lt(env, &b, &a).await?)),
        BinOp::Ge => Ok(LuaValue::Boolean(le(env, &b, &a).await?)),
        BinOp::And | BinOp::Or => unreachable!("lazy operators are lowered by the evaluator"),
    }
}

pub async fn unary(env: &Env, op: UnOp, v: LuaValue) -> LuaResult<LuaValue> {
    match op {
        UnOp::Not => Ok(LuaValue::Boolean(!v.truthy())),
        UnOp::Neg => {
            if let Some(n) = v.coerce_number() {
                return Ok(LuaValue::Number(-n));
            }
            if let Some(mm) = get_metamethod(env, &v, "__unm") {
                let out = call_value(env, mm, vec![v.clone(), v]).await?;
                return Ok(first(out));
            }
            Err(LuaError::arith(v.type_name()))
        }
        UnOp::BNot => {
            if let Some(n) = v.coerce_integer() {
                return Ok(LuaValue::Number(!n as f64));
            }
            if let Some(mm) = get_metamethod(env, &v, "__bnot") {
                let out = call_value(env, mm, vec![v.clone(), v]).await?;
                return Ok(first(out));
            }
            Err(LuaError::runtime(format!(
                "attempt to perform bitwise operation on a {} value",
                v.type_name()
            )))
        }
        UnOp::Len => len(env, v).await,
    }
}

/// The `#` operator: `__len` first, then byte length or the table
/// border.
pub async fn len(env: &Env, v: LuaValue) -> LuaResult<LuaValue> {
    match &v {
        LuaValue::Str(s) => Ok(LuaValue::Number(s.len() as f64)),
        LuaValue::Table(t) => {
            if let Some(mm) = get_metamethod(env, &v, "__len") {
                let out = call_value(env, mm, vec![v.clone()]).await?;
                return Ok(first(out));
            }
            Ok(LuaValue::Number(t.borrow().border() as f64))
        }
        _ => Err(LuaError::runtime(
            "attempt to get length of an unsupported value",
        )),
    }
}

pub async fn concat(env: &Env, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
    let text_of = |v: &LuaValue| match v {
        LuaValue::Str(s) => Some(s.to_string()),
        LuaValue::Number(n) => Some(strfmt::number_text(*n)),
        _ => None,
    };
    if let (Some(x), Some(y)) = (text_of(&a), text_of(&b)) {
        return Ok(LuaValue::str(format!("{}{}", x, y)));
    }
    match meta_binary(env, "__concat", &a, &b).await? {
        Some(v) => Ok(v),
        None => {
            let bad = if text_of(&a).is_none() { &a } else { &b };
            Err(LuaError::concat(bad.type_name()))
        }
    }
}

/// `==`: raw equality first; `__eq` only for two non-identical tables
/// sharing the same metatable.
pub async fn eq(env: &Env, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if a.raw_eq(b) {
        return Ok(true);
    }
    if let (LuaValue::Table(ta), LuaValue::Table(tb)) = (a, b) {
        let ma = ta.borrow().metatable.clone();
        let mb = tb.borrow().metatable.clone();
        if let (Some(ma), Some(mb)) = (ma, mb) {
            if std::rc::Rc::ptr_eq(&ma, &mb) {
                let mm = ma.borrow().raw_get_str("__eq");
                if !mm.is_nil() {
                    let out = call_value(env, mm, vec![a.clone(), b.clone()]).await?;
                    return Ok(first(out).truthy());
                }
            }
        }
    }
    Ok(false)
}

pub async fn lt(env: &Env, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    match (a, b) {
        (LuaValue::Number(x), LuaValue::Number(y)) => Ok(x < y),
        (LuaValue::Str(x), LuaValue::Str(y)) => Ok(x.as_bytes() < y.as_bytes()),
        _ => match meta_binary(env, "__lt", a, b).await? {
            Some(v) => Ok(v.truthy()),
            None => Err(LuaError::compare(a.type_name(), b.type_name())),
        },
    }
}

pub async fn le(env: &Env, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    match (a, b) {
        (LuaValue::Number(x), LuaValue::Number(y)) => Ok(x <= y),
        (LuaValue::Str(x), LuaValue::Str(y)) => Ok(x.as_bytes() <= y.as_bytes()),
        _ => match meta_binary(env, "__le", a, b).await? {
            Some(v) => Ok(v.truthy()),
            None => Err(LuaError::compare(a.type_name(), b.type_name())),
        },
    }
}

/// The metatable-aware read: raw slot first, then the `__index` chain
/// (tables chase, functions are invoked with `(receiver, key)`).
pub async fn index(env: &Env, base: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
    let mut cur = base;
    for _ in 0..CHAIN_LIMIT {
        match &cur {
            LuaValue::Table(t) => {
                let raw = t.borrow().raw_get(&key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
                match get_metamethod(env, &cur, "__index") {
                    None => return Ok(LuaValue::Nil),
                    Some(LuaValue::Function(f)) => {
                        let out = call_value(
                            env,
                            LuaValue::Function(f),
                            vec![cur.clone(), key.clone()],
                        )
                        .await?;
                        return Ok(first(out));
                    }
                    Some(next) => cur = next,
                }
            }
            LuaValue::Str(_) => match get_metamethod(env, &cur, "__index") {
                None => return Ok(LuaValue::Nil),
                Some(LuaValue::Function(f)) => {
                    let out = call_value(
                        env,
                        LuaValue::Function(f),
                        vec![cur.clone(), key.clone()],
                    )
                    .await?;
                    return Ok(first(out));
                }
                Some(next) => cur = next,
            },
            other => return Err(LuaError::index(other.type_name())),
        }
    }
    Err(LuaError::runtime("'__index' chain too long; possible loop"))
}

/// The metatable-aware write: `__newindex` applies only when the raw
/// slot is absent.
pub async fn newindex(
    env: &Env,
    base: LuaValue,
    key: LuaValue,
    value: LuaValue,
) -> LuaResult<()> {
    let mut cur = base;
    for _ in 0..CHAIN_LIMIT {
        match &cur {
            LuaValue::Table(t) => {
                let present = !t.borrow().raw_get(&key).is_nil();
                if present {
                    return t.borrow_mut().raw_set(key, value);
                }
                match get_metamethod(env, &cur, "__newindex") {
                    None => return t.borrow_mut().raw_set(key, value),
                    Some(LuaValue::Function(f)) => {
                        call_value(
                            env,
                            LuaValue::Function(f),
                            vec![cur.clone(), key, value],
                        )
                        .await?;
                        return Ok(());
                    }
                    Some(next) => cur = next,
                }
            }
            other => return Err(LuaError::index(other.type_name())),
        }
    }
    Err(LuaError::runtime("'__newindex' chain too long; possible loop"))
}

/// `tostring` semantics: `__tostring` first, canonical text otherwise.
pub async fn tostring_value(env: &Env, v: LuaValue) -> LuaResult<String> {
    if let Some(mm) = get_metamethod(env, &v, "__tostring") {
        let out = call_value(env, mm, vec![v]).await?;
        return match first(out) {
            LuaValue::Str(s) => Ok(s.to_string()),
            LuaValue::Number(n) => Ok(strfmt::number_text(n)),
            _ => Err(LuaError::runtime("'__tostring' must return a string")),
        };
    }
    Ok(v.display_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floored_modulo_follows_divisor_sign() {
        assert_eq!(lua_mod(5.0, 3.0), 2.0);
        assert_eq!(lua_mod(-5.0, 3.0), 1.0);
        assert_eq!(lua_mod(5.0, -3.0), -1.0);
        assert!(lua_mod(5.0, 0.0).is_nan());
        assert!(lua_mod(5.0, f64::INFINITY).is_nan());
    }

    #[test]
    fn shifts_are_logical() {
        assert_eq!(lua_shift(1, 4), 16.0);
        assert_eq!(lua_shift(16, -4), 1.0);
        assert_eq!(lua_shift(1, 64), 0.0);
        // Negative operands shift their bit pattern.
        assert_eq!(lua_shift(-1, -63), 1.0);
    }
}
