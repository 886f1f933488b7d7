//! The os library: calendar time through chrono, a strftime subset for
//! `date`, and `exit` forwarded to the host collaborator. Everything
//! else the C library offers (clock, getenv, file manipulation) is out
//! of scope.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

use super::{arg, check_number, check_table, module, opt_str};
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::table::Table;
use crate::value::{LuaValue, TableRef};

pub fn register(env: &Env) {
    let lib = module(vec![
        (
            "time",
            LuaValue::native("time", |_env, args| match args.first() {
                None | Some(LuaValue::Nil) => {
                    Ok(vec![LuaValue::Number(Utc::now().timestamp() as f64)])
                }
                Some(LuaValue::Table(_)) => {
                    let t = check_table(&args, 0, "time")?;
                    Ok(vec![LuaValue::Number(time_from_table(&t)? as f64)])
                }
                Some(other) => Err(LuaError::bad_argument(
                    1,
                    "time",
                    "table",
                    other.type_name(),
                )),
            }),
        ),
        (
            "date",
            LuaValue::native("date", |_env, args| {
                let spec = opt_str(&args, 0, "date", "%c")?;
                let when = match args.get(1) {
                    None | Some(LuaValue::Nil) => Utc::now().timestamp(),
                    Some(_) => check_number(&args, 1, "date")? as i64,
                };
                os_date(&spec, when)
            }),
        ),
        (
            "difftime",
            LuaValue::native("difftime", |_env, args| {
                let t2 = check_number(&args, 0, "difftime")?;
                let t1 = match args.get(1) {
                    None | Some(LuaValue::Nil) => 0.0,
                    Some(_) => check_number(&args, 1, "difftime")?,
                };
                Ok(vec![LuaValue::Number(t2 - t1)])
            }),
        ),
        (
            "exit",
            LuaValue::native("exit", |env, args| {
                let code = match arg(&args, 0) {
                    LuaValue::Nil => 0,
                    LuaValue::Boolean(true) => 0,
                    LuaValue::Boolean(false) => 1,
                    v => v.coerce_integer().ok_or_else(|| {
                        LuaError::bad_argument(1, "exit", "number", v.type_name())
                    })? as i32,
                };
                env.os_exit(code)?;
                Ok(Vec::new())
            }),
        ),
    ]);
    env.load_lib("os", lib);
}

fn date_field(t: &TableRef, name: &str) -> LuaResult<Option<i64>> {
    match t.borrow().raw_get_str(name) {
        LuaValue::Nil => Ok(None),
        v => v.coerce_integer().map(Some).ok_or_else(|| {
            LuaError::runtime(format!("field '{}' is not an integer in date table", name))
        }),
    }
}

fn required_field(t: &TableRef, name: &str) -> LuaResult<i64> {
    date_field(t, name)?.ok_or_else(|| {
        LuaError::runtime(format!("field '{}' missing in date table", name))
    })
}

/// Calendar-correct conversion of a date table, in local time, with
/// Lua's defaults (hour 12, min/sec 0).
fn time_from_table(t: &TableRef) -> LuaResult<i64> {
    let year = required_field(t, "year")?;
    let month = required_field(t, "month")?;
    let day = required_field(t, "day")?;
    let hour = date_field(t, "hour")?.unwrap_or(12);
    let min = date_field(t, "min")?.unwrap_or(0);
    let sec = date_field(t, "sec")?.unwrap_or(0);
    Local
        .with_ymd_and_hms(
            year as i32,
            month as u32,
            day as u32,
            hour as u32,
            min as u32,
            sec as u32,
        )
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| LuaError::runtime("time result cannot be represented"))
}

enum Stamp {
    Utc(DateTime<Utc>),
    Local(DateTime<Local>),
}

impl Stamp {
    fn year(&self) -> i32 {
        match self {
            Stamp::Utc(d) => d.year(),
            Stamp::Local(d) => d.year(),
        }
    }
    fn month(&self) -> u32 {
        match self {
            Stamp::Utc(d) => d.month(),
            Stamp::Local(d) => d.month(),
        }
    }
    fn day(&self) -> u32 {
        match self {
            Stamp::Utc(d) => d.day(),
            Stamp::Local(d) => d.day(),
        }
    }
    fn hour(&self) -> u32 {
        match self {
            Stamp::Utc(d) => d.hour(),
            Stamp::Local(d) => d.hour(),
        }
    }
    fn minute(&self) -> u32 {
        match self {
            Stamp::Utc(d) => d.minute(),
            Stamp::Local(d) => d.minute(),
        }
    }
    fn second(&self) -> u32 {
        match self {
            Stamp::Utc(d) => d.second(),
            Stamp::Local(d) => d.second(),
        }
    }
    /// Sunday = 1, as `os.date("*t")` reports `wday`.
    fn wday(&self) -> u32 {
        let w = match self {
            Stamp::Utc(d) => d.weekday(),
            Stamp::Local(d) => d.weekday(),
        };
        w.num_days_from_sunday() + 1
    }
    fn yday(&self) -> u32 {
        match self {
            Stamp::Utc(d) => d.ordinal(),
            Stamp::Local(d) => d.ordinal(),
        }
    }
}

const WEEKDAYS: [&str; 7] = ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];
const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

fn os_date(spec: &str, when: i64) -> LuaResult<Vec<LuaValue>> {
    let (utc, rest) = match spec.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, spec),
    };
    let stamp = if utc {
        Stamp::Utc(
            Utc.timestamp_opt(when, 0)
                .earliest()
                .ok_or_else(|| LuaError::runtime("time value out of range"))?,
        )
    } else {
        Stamp::Local(
            Local
                .timestamp_opt(when, 0)
                .earliest()
                .ok_or_else(|| LuaError::runtime("time value out of range"))?,
        )
    };
    if rest == "*t" {
        let mut t = Table::new();
        t.raw_set_str("year", LuaValue::Number(stamp.year() as f64));
        t.raw_set_str("month", LuaValue::Number(stamp.month() as f64));
        t.raw_set_str("day", LuaValue::Number(stamp.day() as f64));
        t.raw_set_str("hour", LuaValue::Number(stamp.hour() as f64));
        t.raw_set_str("min", LuaValue::Number(stamp.minute() as f64));
        t.raw_set_str("sec", LuaValue::Number(stamp.second() as f64));
        t.raw_set_str("wday", LuaValue::Number(stamp.wday() as f64));
        t.raw_set_str("yday", LuaValue::Number(stamp.yday() as f64));
        t.raw_set_str("isdst", LuaValue::Boolean(false));
        return Ok(vec![LuaValue::table(t)]);
    }
    Ok(vec![LuaValue::str(strftime(rest, &stamp)?)])
}

/// The strftime subset `os.date` accepts.
fn strftime(spec: &str, s: &Stamp) -> LuaResult<String> {
    let mut out = String::with_capacity(spec.len() * 2);
    let mut chars = spec.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(conv) = chars.next() else {
            return Err(LuaError::runtime("invalid conversion to 'date'"));
        };
        match conv {
            'a' => out.push_str(&WEEKDAYS[(s.wday() - 1) as usize][..3]),
            'A' => out.push_str(WEEKDAYS[(s.wday() - 1) as usize]),
            'b' => out.push_str(&MONTHS[(s.month() - 1) as usize][..3]),
            'B' => out.push_str(MONTHS[(s.month() - 1) as usize]),
            'c' => {
                // "%a %b %e %H:%M:%S %Y"
                out.push_str(&format!(
                    "{} {} {:2} {:02}:{:02}:{:02} {}",
                    &WEEKDAYS[(s.wday() - 1) as usize][..3],
                    &MONTHS[(s.month() - 1) as usize][..3],
                    s.day(),
                    s.hour(),
                    s.minute(),
                    s.second(),
                    s.year()
                ));
            }
            'd' => out.push_str(&format!("{:02}", s.day())),
            'H' => out.push_str(&format!("{:02}", s.hour())),
            'I' => {
                let h = s.hour() % 12;
                out.push_str(&format!("{:02}", if h == 0 { 12 } else { h }));
            }
            'j' => out.push_str(&format!("{:03}", s.yday())),
            'm' => out.push_str(&format!("{:02}", s.month())),
            'M' => out.push_str(&format!("{:02}", s.minute())),
            'p' => out.push_str(if s.hour() < 12 { "AM" } else { "PM" }),
            'S' => out.push_str(&format!("{:02}", s.second())),
            'w' => out.push_str(&format!("{}", s.wday() - 1)),
            'x' => out.push_str(&format!(
                "{:02}/{:02}/{:02}",
                s.month(),
                s.day(),
                s.year() % 100
            )),
            'X' => out.push_str(&format!(
                "{:02}:{:02}:{:02}",
                s.hour(),
                s.minute(),
                s.second()
            )),
            'y' => out.push_str(&format!("{:02}", s.year() % 100)),
            'Y' => out.push_str(&format!("{}", s.year())),
            '%' => out.push('%'),
            other => {
                return Err(LuaError::runtime(format!(
                    "invalid conversion specifier '%{}' to 'date'",
                    other
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2009-02-13 23:31:30 UTC
    const STAMP: i64 = 1_234_567_890;

    fn utc_stamp() -> Stamp {
        Stamp::Utc(Utc.timestamp_opt(STAMP, 0).unwrap())
    }

    #[test]
    fn ymd_fields() {
        let s = utc_stamp();
        assert_eq!(s.year(), 2009);
        assert_eq!(s.month(), 2);
        assert_eq!(s.day(), 13);
        assert_eq!(s.wday(), 6); // Friday, Sunday = 1
        assert_eq!(s.yday(), 44);
    }

    #[test]
    fn strftime_subset() {
        let s = utc_stamp();
        assert_eq!(strftime("%Y-%m-%d", &s).unwrap(), "2009-02-13");
        assert_eq!(strftime("%H:%M:%S", &s).unwrap(), "23:31:30");
        assert_eq!(strftime("%a %A", &s).unwrap(), "Fri Friday");
        assert_eq!(strftime("100%%", &s).unwrap(), "100%");
        assert!(strftime("%Q", &s).is_err());
    }

    #[test]
    fn c_format_shape() {
        let s = utc_stamp();
        assert_eq!(strftime("%c", &s).unwrap(), "Fri Feb 13 23:31:30 2009");
    }
}
