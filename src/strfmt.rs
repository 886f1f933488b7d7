//! printf-style formatting and canonical number text.
//!
//! `string.format` accepts the conversion letters `AEGXacdefgioqsux`
//! with the usual flag/width/precision prefixes; `%q` escapes only `"`
//! and newline. The `%.14g` renderer here is also the canonical text of
//! float values for `tostring`, `print`, and concatenation.

use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::ops;
use crate::value::LuaValue;

/// Canonical text of a Lua number: integral values print without a
/// decimal point, everything else in `%.14g` form.
pub fn number_text(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.floor() == n && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    g_format(n, 14, false)
}

/// `%g` with the given significant-digit precision.
pub fn g_format(n: f64, precision: usize, keep_zeros: bool) -> String {
    let p = precision.max(1);
    if n == 0.0 {
        return if n.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    if n.is_nan() {
        return "nan".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".into() } else { "-inf".into() };
    }
    // Round to p significant digits first; the printed exponent decides
    // the form.
    let sci = format!("{:.*e}", p - 1, n);
    let (mantissa, exp) = split_exponent(&sci);
    if exp < -4 || exp >= p as i32 {
        let mantissa = if keep_zeros {
            mantissa.to_string()
        } else {
            trim_fraction_zeros(mantissa)
        };
        format!("{}e{}{:02}", mantissa, if exp < 0 { "-" } else { "+" }, exp.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, n);
        if keep_zeros {
            fixed
        } else {
            trim_fraction_zeros(&fixed)
        }
    }
}

fn split_exponent(sci: &str) -> (&str, i32) {
    match sci.find(['e', 'E']) {
        Some(i) => (&sci[..i], sci[i + 1..].parse().unwrap_or(0)),
        None => (sci, 0),
    }
}

fn trim_fraction_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// `%e`/`%E` with a C-style signed two-digit exponent.
fn e_format(n: f64, precision: usize, upper: bool) -> String {
    if n.is_nan() {
        return "nan".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let sci = format!("{:.*e}", precision, n);
    let (mantissa, exp) = split_exponent(&sci);
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, e, if exp < 0 { '-' } else { '+' }, exp.abs())
}

/// C99 hex-float text (`%a`/`%A`).
fn hex_float(n: f64, upper: bool) -> String {
    let out = if n == 0.0 {
        let sign = if n.is_sign_negative() { "-" } else { "" };
        format!("{}0x0p+0", sign)
    } else if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        let bits = n.to_bits();
        let sign = if bits >> 63 == 1 { "-" } else { "" };
        let biased = ((bits >> 52) & 0x7ff) as i64;
        let mantissa = bits & 0xf_ffff_ffff_ffff;
        let (lead, exp, mantissa) = if biased == 0 {
            // Subnormal: leading digit 0, fixed exponent.
            (0, -1022i64, mantissa)
        } else {
            (1, biased - 1023, mantissa)
        };
        let mut hex = format!("{:013x}", mantissa);
        while hex.len() > 1 && hex.ends_with('0') {
            hex.pop();
        }
        if hex == "0" && mantissa == 0 {
            format!("{}0x{}p{}{}", sign, lead, if exp < 0 { "-" } else { "+" }, exp.abs())
        } else {
            format!(
                "{}0x{}.{}p{}{}",
                sign,
                lead,
                hex,
                if exp < 0 { "-" } else { "+" },
                exp.abs()
            )
        }
    };
    if upper { out.to_uppercase() } else { out }
}

#[derive(Default)]
struct Spec {
    minus: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, body: String, numeric: bool) -> String {
        if body.len() >= self.width {
            return body;
        }
        let fill = self.width - body.len();
        if self.minus {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero && numeric {
            // Zero padding goes after the sign.
            let (sign, digits) = match body.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => match body.strip_prefix('+') {
                    Some(rest) => ("+", rest),
                    None => ("", body.as_str()),
                },
            };
            format!("{}{}{}", sign, "0".repeat(fill), digits)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }

    fn sign_prefix(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }
}

fn want_number(args: &[LuaValue], idx: usize) -> LuaResult<f64> {
    let v = args
        .get(idx)
        .ok_or_else(|| LuaError::bad_argument_msg(idx + 1, "format", "no value"))?;
    v.coerce_number().ok_or_else(|| {
        LuaError::bad_argument(idx + 1, "format", "number", v.type_name())
    })
}

fn want_integer(args: &[LuaValue], idx: usize) -> LuaResult<i64> {
    let v = args
        .get(idx)
        .ok_or_else(|| LuaError::bad_argument_msg(idx + 1, "format", "no value"))?;
    v.coerce_integer().ok_or_else(|| {
        if v.coerce_number().is_some() {
            LuaError::bad_argument_msg(idx + 1, "format", "number has no integer representation")
        } else {
            LuaError::bad_argument(idx + 1, "format", "number", v.type_name())
        }
    })
}

/// The `string.format` engine. Async because `%s` renders through
/// `__tostring`.
pub async fn format(env: &Env, fmt: &str, args: Vec<LuaValue>) -> LuaResult<String> {
    let bytes = fmt.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    let mut arg_idx = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            // Copy the literal run whole; '%' is ASCII, so the slice
            // boundaries never split a multi-byte sequence.
            let start = i;
            while i < bytes.len() && bytes[i] != b'%' {
                i += 1;
            }
            out.push_str(&fmt[start..i]);
            continue;
        }
        i += 1;
        if i < bytes.len() && bytes[i] == b'%' {
            out.push('%');
            i += 1;
            continue;
        }
        let mut spec = Spec::default();
        while i < bytes.len() {
            match bytes[i] {
                b'-' => spec.minus = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'#' => spec.alt = true,
                b'0' => spec.zero = true,
                _ => break,
            }
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            spec.width = spec.width * 10 + (bytes[i] - b'0') as usize;
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let mut p = 0usize;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                p = p * 10 + (bytes[i] - b'0') as usize;
                i += 1;
            }
            spec.precision = Some(p);
        }
        let conv = *bytes.get(i).ok_or_else(|| {
            LuaError::runtime("invalid format string to 'format'".to_string())
        })? as char;
        i += 1;
        let idx = arg_idx;
        arg_idx += 1;
        let piece = match conv {
            'd' | 'i' => {
                let n = want_integer(&args, idx)?;
                let body = format!("{}{}", spec.sign_prefix(n < 0), n.unsigned_abs());
                spec.pad(body, true)
            }
            'u' => {
                let n = want_integer(&args, idx)?;
                spec.pad(format!("{}", n as u64), true)
            }
            'c' => {
                let n = want_integer(&args, idx)?;
                spec.pad(((n as u8) as char).to_string(), false)
            }
            'o' => {
                let n = want_integer(&args, idx)?;
                spec.pad(format!("{:o}", n as u64), true)
            }
            'x' => {
                let n = want_integer(&args, idx)?;
                let body = if spec.alt {
                    format!("0x{:x}", n as u64)
                } else {
                    format!("{:x}", n as u64)
                };
                spec.pad(body, true)
            }
            'X' => {
                let n = want_integer(&args, idx)?;
                let body = if spec.alt {
                    format!("0X{:X}", n as u64)
                } else {
                    format!("{:X}", n as u64)
                };
                spec.pad(body, true)
            }
            'e' | 'E' => {
                let n = want_number(&args, idx)?;
                let body = format!(
                    "{}{}",
                    spec.sign_prefix(n.is_sign_negative()),
                    e_format(n.abs(), spec.precision.unwrap_or(6), conv == 'E')
                );
                spec.pad(body, true)
            }
            'f' => {
                let n = want_number(&args, idx)?;
                let body = format!(
                    "{}{:.*}",
                    spec.sign_prefix(n.is_sign_negative()),
                    spec.precision.unwrap_or(6),
                    n.abs()
                );
                spec.pad(body, true)
            }
            'g' | 'G' => {
                let n = want_number(&args, idx)?;
                let text = g_format(n.abs(), spec.precision.unwrap_or(6), spec.alt);
                let text = if conv == 'G' { text.to_uppercase() } else { text };
                let body = format!("{}{}", spec.sign_prefix(n.is_sign_negative()), text);
                spec.pad(body, true)
            }
            'a' | 'A' => {
                let n = want_number(&args, idx)?;
                spec.pad(hex_float(n, conv == 'A'), true)
            }
            'q' => {
                let v = args
                    .get(idx)
                    .ok_or_else(|| LuaError::bad_argument_msg(idx + 1, "format", "no value"))?;
                let text = v.display_text();
                let mut quoted = String::with_capacity(text.len() + 2);
                quoted.push('"');
                for c in text.chars() {
                    match c {
                        '"' => quoted.push_str("\\\""),
                        '\n' => quoted.push_str("\\n"),
                        other => quoted.push(other),
                    }
                }
                quoted.push('"');
                quoted
            }
            's' => {
                let v = args
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| LuaError::bad_argument_msg(idx + 1, "format", "no value"))?;
                let mut text = ops::tostring_value(env, v).await?;
                if let Some(p) = spec.precision {
                    if text.len() > p {
                        text.truncate(p);
                    }
                }
                spec.pad(text, false)
            }
            other => {
                return Err(LuaError::runtime(format!(
                    "invalid conversion '%{}' to 'format'",
                    other
                )))
            }
        };
        out.push_str(&piece);
    }
    Ok(out)
}
