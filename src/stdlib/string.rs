//! The string library: byte-oriented operations with Lua's 1-based,
//! negative-from-the-end index rules, the pattern entry points, and
//! `format`. The library table doubles as the `__index` of the
//! per-environment string metatable so method-call syntax works on
//! string values.

use std::cell::Cell;
use std::rc::Rc;

use super::{arg, check_int, check_str, module, opt_int};
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::exec::call_value;
use crate::ops;
use crate::pattern::{self, Capture};
use crate::strfmt;
use crate::value::{first, CallFuture, LuaValue};

/// Relative string position (lstrlib's posrelat): negatives count from
/// the end, zero stays zero.
fn posrelat(pos: i64, len: usize) -> i64 {
    if pos >= 0 {
        pos
    } else if -pos > len as i64 {
        0
    } else {
        len as i64 + pos + 1
    }
}

fn bytes_to_value(bytes: &[u8]) -> LuaValue {
    LuaValue::str(String::from_utf8_lossy(bytes).into_owned())
}

fn capture_value(subject: &[u8], cap: &Capture) -> LuaValue {
    match cap {
        Capture::Span(a, b) => bytes_to_value(&subject[*a..*b]),
        Capture::Pos(p) => LuaValue::Number(*p as f64),
    }
}

fn capture_values(subject: &[u8], m: &pattern::Match) -> Vec<LuaValue> {
    m.captures_or_whole()
        .iter()
        .map(|c| capture_value(subject, c))
        .collect()
}

pub fn register(env: &Env) {
    let lib = module(vec![
        (
            "len",
            LuaValue::native("len", |_env, args| {
                let s = check_str(&args, 0, "len")?;
                Ok(vec![LuaValue::Number(s.len() as f64)])
            }),
        ),
        (
            "sub",
            LuaValue::native("sub", |_env, args| {
                let s = check_str(&args, 0, "sub")?;
                let len = s.len();
                let mut i = posrelat(check_int(&args, 1, "sub")?, len);
                let mut j = posrelat(opt_int(&args, 2, "sub", -1)?, len);
                if i < 1 {
                    i = 1;
                }
                if j > len as i64 {
                    j = len as i64;
                }
                let out = if i > j {
                    LuaValue::str("")
                } else {
                    bytes_to_value(&s.as_bytes()[(i - 1) as usize..j as usize])
                };
                Ok(vec![out])
            }),
        ),
        (
            "upper",
            LuaValue::native("upper", |_env, args| {
                let s = check_str(&args, 0, "upper")?;
                Ok(vec![LuaValue::str(s.to_uppercase())])
            }),
        ),
        (
            "lower",
            LuaValue::native("lower", |_env, args| {
                let s = check_str(&args, 0, "lower")?;
                Ok(vec![LuaValue::str(s.to_lowercase())])
            }),
        ),
        (
            "rep",
            LuaValue::native("rep", |_env, args| {
                let s = check_str(&args, 0, "rep")?;
                let n = check_int(&args, 1, "rep")?;
                let sep = match args.get(2) {
                    None | Some(LuaValue::Nil) => String::new(),
                    Some(_) => check_str(&args, 2, "rep")?,
                };
                let out = if n <= 0 {
                    String::new()
                } else {
                    let mut parts = Vec::with_capacity(n as usize);
                    for _ in 0..n {
                        parts.push(s.clone());
                    }
                    parts.join(&sep)
                };
                Ok(vec![LuaValue::str(out)])
            }),
        ),
        (
            "reverse",
            LuaValue::native("reverse", |_env, args| {
                let s = check_str(&args, 0, "reverse")?;
                let mut bytes = s.into_bytes();
                bytes.reverse();
                Ok(vec![bytes_to_value(&bytes)])
            }),
        ),
        (
            "byte",
            LuaValue::native("byte", |_env, args| {
                let s = check_str(&args, 0, "byte")?;
                let len = s.len();
                let i = posrelat(opt_int(&args, 1, "byte", 1)?, len).max(1);
                let j = posrelat(opt_int(&args, 2, "byte", i)?, len).min(len as i64);
                let mut out = Vec::new();
                let bytes = s.as_bytes();
                let mut k = i;
                while k <= j {
                    out.push(LuaValue::Number(bytes[(k - 1) as usize] as f64));
                    k += 1;
                }
                Ok(out)
            }),
        ),
        (
            "char",
            LuaValue::native("char", |_env, args| {
                let mut out = String::with_capacity(args.len());
                for i in 0..args.len() {
                    let code = check_int(&args, i, "char")?;
                    if !(0..=255).contains(&code) {
                        return Err(LuaError::bad_argument_msg(
                            i + 1,
                            "char",
                            "value out of range",
                        ));
                    }
                    out.push(code as u8 as char);
                }
                Ok(vec![LuaValue::str(out)])
            }),
        ),
        (
            "find",
            LuaValue::native("find", |_env, args| {
                let s = check_str(&args, 0, "find")?;
                let p = check_str(&args, 1, "find")?;
                str_find(&s, &p, &args, true)
            }),
        ),
        (
            "match",
            LuaValue::native("match", |_env, args| {
                let s = check_str(&args, 0, "match")?;
                let p = check_str(&args, 1, "match")?;
                str_find(&s, &p, &args, false)
            }),
        ),
        (
            "gmatch",
            LuaValue::native("gmatch", |_env, args| {
                let s: Rc<str> = Rc::from(check_str(&args, 0, "gmatch")?);
                let p: Rc<str> = Rc::from(check_str(&args, 1, "gmatch")?);
                // A streaming iterator: each call scans from the cursor.
                let cursor = Rc::new(Cell::new(0usize));
                let iter = LuaValue::native("gmatch.iterator", move |_env, _args| {
                    let subject = s.as_bytes();
                    let pat = p.as_bytes();
                    if cursor.get() > subject.len() {
                        return Ok(vec![LuaValue::Nil]);
                    }
                    match pattern::first_match(subject, pat, cursor.get())? {
                        Some(m) => {
                            cursor.set(if m.end == m.start { m.end + 1 } else { m.end });
                            Ok(capture_values(subject, &m))
                        }
                        None => {
                            cursor.set(subject.len() + 1);
                            Ok(vec![LuaValue::Nil])
                        }
                    }
                });
                Ok(vec![iter])
            }),
        ),
        (
            "gsub",
            LuaValue::native_async("gsub", |env: Env, args: Vec<LuaValue>| -> CallFuture {
                Box::pin(async move { str_gsub(&env, args).await })
            }),
        ),
        (
            "format",
            LuaValue::native_async("format", |env: Env, mut args: Vec<LuaValue>| -> CallFuture {
                Box::pin(async move {
                    let fmt = check_str(&args, 0, "format")?;
                    let rest = args.split_off(1);
                    let out = strfmt::format(&env, &fmt, rest).await?;
                    Ok(vec![LuaValue::str(out)])
                })
            }),
        ),
    ]);

    env.string_metatable()
        .borrow_mut()
        .raw_set_str("__index", LuaValue::Table(lib.clone()));
    env.load_lib("string", lib);
}

/// Shared body of `find` (returns positions) and `match` (returns
/// captures).
fn str_find(s: &str, p: &str, args: &[LuaValue], wants_positions: bool) -> LuaResult<Vec<LuaValue>> {
    let func = if wants_positions { "find" } else { "match" };
    let len = s.len();
    let init = posrelat(opt_int(args, 2, func, 1)?, len).max(1);
    if init > len as i64 + 1 {
        return Ok(vec![LuaValue::Nil]);
    }
    let start = (init - 1) as usize;
    let plain = wants_positions && arg(args, 3).truthy();
    if plain {
        // A plain substring search ignores every magic character.
        let needle = p.as_bytes();
        let hay = &s.as_bytes()[start..];
        let found = if needle.is_empty() {
            Some(0)
        } else {
            hay.windows(needle.len()).position(|w| w == needle)
        };
        return Ok(match found {
            Some(at) => vec![
                LuaValue::Number((start + at + 1) as f64),
                LuaValue::Number((start + at + needle.len()) as f64),
            ],
            None => vec![LuaValue::Nil],
        });
    }
    match pattern::first_match(s.as_bytes(), p.as_bytes(), start)? {
        Some(m) => {
            if wants_positions {
                let mut out = vec![
                    LuaValue::Number((m.start + 1) as f64),
                    LuaValue::Number(m.end as f64),
                ];
                for cap in &m.captures {
                    out.push(capture_value(s.as_bytes(), cap));
                }
                Ok(out)
            } else {
                Ok(capture_values(s.as_bytes(), &m))
            }
        }
        None => Ok(vec![LuaValue::Nil]),
    }
}

async fn str_gsub(env: &Env, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(&args, 0, "gsub")?;
    let p = check_str(&args, 1, "gsub")?;
    let repl = arg(&args, 2);
    let max_n = opt_int(&args, 3, "gsub", i64::MAX)?;
    let subject = s.as_bytes();
    let pat = p.as_bytes();
    let anchored = pat.first() == Some(&b'^');
    let mut out: Vec<u8> = Vec::with_capacity(subject.len());
    let mut pos = 0usize;
    let mut count = 0i64;
    while count < max_n {
        if anchored && count > 0 {
            break;
        }
        let Some(m) = pattern::first_match(subject, pat, pos)? else {
            break;
        };
        out.extend_from_slice(&subject[pos..m.start]);
        let whole = &subject[m.start..m.end];
        let replacement = match &repl {
            LuaValue::Str(r) => {
                expand_replacement(r.as_bytes(), subject, whole, &m)?
            }
            LuaValue::Number(n) => strfmt::number_text(*n).into_bytes(),
            LuaValue::Table(_) => {
                let key = first(capture_values(subject, &m));
                let v = ops::index(env, repl.clone(), key).await?;
                replacement_text(v, whole)?
            }
            LuaValue::Function(_) => {
                let argv = capture_values(subject, &m);
                let v = first(call_value(env, repl.clone(), argv).await?);
                replacement_text(v, whole)?
            }
            other => {
                return Err(LuaError::bad_argument(
                    3,
                    "gsub",
                    "string/function/table",
                    other.type_name(),
                ))
            }
        };
        out.extend_from_slice(&replacement);
        count += 1;
        if m.end == m.start {
            if m.start < subject.len() {
                out.push(subject[m.start]);
            }
            pos = m.start + 1;
        } else {
            pos = m.end;
        }
        if pos > subject.len() {
            break;
        }
    }
    if pos <= subject.len() {
        out.extend_from_slice(&subject[pos..]);
    }
    Ok(vec![bytes_to_value(&out), LuaValue::Number(count as f64)])
}

/// `%0`..`%9` expansion inside a string replacement.
fn expand_replacement(
    repl: &[u8],
    subject: &[u8],
    whole: &[u8],
    m: &pattern::Match,
) -> LuaResult<Vec<u8>> {
    let mut out = Vec::with_capacity(repl.len());
    let mut i = 0usize;
    while i < repl.len() {
        if repl[i] != b'%' {
            out.push(repl[i]);
            i += 1;
            continue;
        }
        i += 1;
        match repl.get(i) {
            Some(b'%') => out.push(b'%'),
            Some(b'0') => out.extend_from_slice(whole),
            Some(d) if d.is_ascii_digit() => {
                let idx = (d - b'0') as usize;
                let caps = m.captures_or_whole();
                let cap = caps.get(idx - 1).ok_or_else(|| {
                    LuaError::runtime(format!("invalid capture index %{} in replacement", idx))
                })?;
                match cap {
                    Capture::Span(a, b) => out.extend_from_slice(&subject[*a..*b]),
                    Capture::Pos(p) => out.extend_from_slice(p.to_string().as_bytes()),
                }
            }
            _ => {
                return Err(LuaError::runtime(
                    "invalid use of '%' in replacement string",
                ))
            }
        }
        i += 1;
    }
    Ok(out)
}

/// A table or function replacement result: nil/false keep the match,
/// strings and numbers substitute.
fn replacement_text(v: LuaValue, whole: &[u8]) -> LuaResult<Vec<u8>> {
    match v {
        LuaValue::Nil | LuaValue::Boolean(false) => Ok(whole.to_vec()),
        LuaValue::Str(s) => Ok(s.as_bytes().to_vec()),
        LuaValue::Number(n) => Ok(strfmt::number_text(n).into_bytes()),
        other => Err(LuaError::runtime(format!(
            "invalid replacement value (a {})",
            other.type_name()
        ))),
    }
}
