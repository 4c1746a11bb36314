// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scalar builtins: string, math, trig, date/time, regex, JSON, encoding,
//! and hash functions.
//!
//! All are pure except RANDOM and the clock functions. Unless documented
//! otherwise, a Null argument yields Null.

use base64::Engine as _;
use chrono::{Datelike, TimeZone, Timelike, Utc};
use rand::Rng;
use sha2::Digest;

use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::value::Value;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    // String
    registry.add_scalar("UPPER", upper);
    registry.add_scalar("LOWER", lower);
    registry.add_scalar("LENGTH", length);
    registry.add_scalar("TRIM", trim);
    registry.add_scalar("LTRIM", ltrim);
    registry.add_scalar("RTRIM", rtrim);
    registry.add_scalar("SUBSTR", substr);
    registry.add_scalar("SUBSTRING", substr);
    registry.add_scalar("REPLACE", replace);
    registry.add_scalar("CONCAT", concat);
    registry.add_scalar("CONCAT_WS", concat_ws);
    registry.add_scalar("SPLIT_PART", split_part);
    registry.add_scalar("LEFT", left);
    registry.add_scalar("RIGHT", right);
    registry.add_scalar("REVERSE", reverse);
    registry.add_scalar("REPEAT", repeat);
    registry.add_scalar("LPAD", lpad);
    registry.add_scalar("RPAD", rpad);
    registry.add_scalar("INSTR", instr);
    registry.add_scalar("STARTS_WITH", starts_with);
    registry.add_scalar("ENDS_WITH", ends_with);
    registry.add_scalar("CONTAINS", contains);

    // Math
    registry.add_scalar("ABS", abs);
    registry.add_scalar("CEIL", ceil);
    registry.add_scalar("CEILING", ceil);
    registry.add_scalar("FLOOR", floor);
    registry.add_scalar("ROUND", round);
    registry.add_scalar("SQRT", sqrt);
    registry.add_scalar("POW", pow);
    registry.add_scalar("POWER", pow);
    registry.add_scalar("EXP", exp);
    registry.add_scalar("LN", ln);
    registry.add_scalar("LOG10", log10);
    registry.add_scalar("MOD", modulo);
    registry.add_scalar("SIGN", sign);
    registry.add_scalar("SIN", |args| trig(args, "SIN", f64::sin));
    registry.add_scalar("COS", |args| trig(args, "COS", f64::cos));
    registry.add_scalar("TAN", |args| trig(args, "TAN", f64::tan));
    registry.add_scalar("ASIN", |args| trig(args, "ASIN", f64::asin));
    registry.add_scalar("ACOS", |args| trig(args, "ACOS", f64::acos));
    registry.add_scalar("ATAN", |args| trig(args, "ATAN", f64::atan));
    registry.add_scalar("ATAN2", atan2);
    registry.add_scalar("PI", pi);
    registry.add_scalar("RANDOM", random);
    registry.add_scalar("GREATEST", greatest);
    registry.add_scalar("LEAST", least);

    // Date/time
    registry.add_scalar("NOW", now);
    registry.add_scalar("CURRENT_TIMESTAMP", now);
    registry.add_scalar("CURRENT_DATE", current_date);
    registry.add_scalar("DATE_PART", date_part);
    registry.add_scalar("EXTRACT", date_part);
    registry.add_scalar("DATE_TRUNC", date_trunc);
    registry.add_scalar("DATE_ADD", date_add);
    registry.add_scalar("DATE_DIFF", date_diff);
    registry.add_scalar("TO_TIMESTAMP", to_timestamp);
    registry.add_scalar("STRFTIME", strftime);

    // Regex
    registry.add_scalar("REGEXP_MATCHES", regexp_matches);
    registry.add_scalar("REGEXP_REPLACE", regexp_replace);
    registry.add_scalar("REGEXP_EXTRACT", regexp_extract);

    // JSON
    registry.add_scalar("JSON_GET", json_get);
    registry.add_scalar("JSON_EXTRACT", json_get);
    registry.add_scalar("JSON_ARRAY_LENGTH", json_array_length);
    registry.add_scalar("JSON_TYPE", json_type);
    registry.add_scalar("JSON_VALID", json_valid);
    registry.add_scalar("TO_JSON", to_json);

    // Conditionals and metadata
    registry.add_scalar("COALESCE", coalesce);
    registry.add_scalar("NULLIF", nullif);
    registry.add_scalar("IFNULL", ifnull);
    registry.add_scalar("IF", if_fn);
    registry.add_scalar("TYPEOF", typeof_fn);

    // Hashes and encodings
    registry.add_scalar("MD5", md5_fn);
    registry.add_scalar("SHA256", sha256_fn);
    registry.add_scalar("HEX", hex_fn);
    registry.add_scalar("UNHEX", unhex);
    registry.add_scalar("TO_BASE64", to_base64);
    registry.add_scalar("FROM_BASE64", from_base64);
}

fn expect(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Error::Argument(format!(
            "{name} takes {n} argument{}, got {}",
            if n == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

fn expect_range(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(Error::Argument(format!(
            "{name} takes {min} to {max} arguments, got {}",
            args.len()
        )))
    }
}

/// Returns Null if any listed argument is Null.
macro_rules! null_prop {
    ($args:expr) => {
        for arg in $args.iter() {
            if arg.is_null() {
                return Ok(Value::Null);
            }
        }
    };
}

// ----------------------------------------------------------------------
// String functions
// ----------------------------------------------------------------------

fn upper(args: &[Value]) -> Result<Value> {
    expect("UPPER", args, 1)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value> {
    expect("LOWER", args, 1)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().to_lowercase()))
}

fn length(args: &[Value]) -> Result<Value> {
    expect("LENGTH", args, 1)?;
    null_prop!(args);
    let len = match &args[0] {
        Value::Vector(v) => v.len(),
        Value::Bytes(b) => b.len(),
        other => other.as_text().chars().count(),
    };
    Ok(Value::Int(len as i64))
}

fn trim(args: &[Value]) -> Result<Value> {
    expect("TRIM", args, 1)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().trim().to_string()))
}

fn ltrim(args: &[Value]) -> Result<Value> {
    expect("LTRIM", args, 1)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().trim_start().to_string()))
}

fn rtrim(args: &[Value]) -> Result<Value> {
    expect("RTRIM", args, 1)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().trim_end().to_string()))
}

/// `SUBSTR(s, start[, len])`, 1-based start as in SQL.
fn substr(args: &[Value]) -> Result<Value> {
    expect_range("SUBSTR", args, 2, 3)?;
    null_prop!(args);
    let chars: Vec<char> = args[0].as_text().chars().collect();
    let start = args[1].as_int()?;
    let skip = if start > 0 { start as usize - 1 } else { 0 };
    let taken: String = match args.get(2) {
        Some(len) => {
            let len = len.as_int()?.max(0) as usize;
            chars.iter().skip(skip).take(len).collect()
        }
        None => chars.iter().skip(skip).collect(),
    };
    Ok(Value::Text(taken))
}

fn replace(args: &[Value]) -> Result<Value> {
    expect("REPLACE", args, 3)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().replace(
        &args[1].as_text(),
        &args[2].as_text(),
    )))
}

/// Nulls are skipped rather than poisoning the whole result.
fn concat(args: &[Value]) -> Result<Value> {
    let mut out = String::new();
    for arg in args {
        if !arg.is_null() {
            out.push_str(&arg.as_text());
        }
    }
    Ok(Value::Text(out))
}

fn concat_ws(args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Err(Error::Argument("CONCAT_WS needs a separator".into()));
    }
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let separator = args[0].as_text();
    let parts: Vec<String> = args[1..]
        .iter()
        .filter(|v| !v.is_null())
        .map(Value::as_text)
        .collect();
    Ok(Value::Text(parts.join(&separator)))
}

/// `SPLIT_PART(s, delimiter, n)`, 1-based; out of range yields ''.
fn split_part(args: &[Value]) -> Result<Value> {
    expect("SPLIT_PART", args, 3)?;
    null_prop!(args);
    let text = args[0].as_text();
    let delimiter = args[1].as_text();
    let n = args[2].as_int()?;
    if n < 1 || delimiter.is_empty() {
        return Err(Error::Argument("SPLIT_PART index is 1-based".into()));
    }
    let part = text
        .split(&delimiter)
        .nth(n as usize - 1)
        .unwrap_or_default();
    Ok(Value::Text(part.to_string()))
}

fn left(args: &[Value]) -> Result<Value> {
    expect("LEFT", args, 2)?;
    null_prop!(args);
    let n = args[1].as_int()?.max(0) as usize;
    Ok(Value::Text(args[0].as_text().chars().take(n).collect()))
}

fn right(args: &[Value]) -> Result<Value> {
    expect("RIGHT", args, 2)?;
    null_prop!(args);
    let text: Vec<char> = args[0].as_text().chars().collect();
    let n = (args[1].as_int()?.max(0) as usize).min(text.len());
    Ok(Value::Text(text[text.len() - n..].iter().collect()))
}

fn reverse(args: &[Value]) -> Result<Value> {
    expect("REVERSE", args, 1)?;
    null_prop!(args);
    Ok(Value::Text(args[0].as_text().chars().rev().collect()))
}

fn repeat(args: &[Value]) -> Result<Value> {
    expect("REPEAT", args, 2)?;
    null_prop!(args);
    let n = args[1].as_int()?.max(0) as usize;
    Ok(Value::Text(args[0].as_text().repeat(n)))
}

fn pad(args: &[Value], name: &str, front: bool) -> Result<Value> {
    expect_range(name, args, 2, 3)?;
    null_prop!(args);
    let text = args[0].as_text();
    let width = args[1].as_int()?.max(0) as usize;
    let fill = match args.get(2) {
        Some(f) => f.as_text(),
        None => " ".to_string(),
    };
    if fill.is_empty() {
        return Err(Error::Argument(format!("{name} fill string is empty")));
    }
    let current = text.chars().count();
    if current >= width {
        return Ok(Value::Text(text.chars().take(width).collect()));
    }
    let padding: String = fill.chars().cycle().take(width - current).collect();
    Ok(Value::Text(if front {
        format!("{padding}{text}")
    } else {
        format!("{text}{padding}")
    }))
}

fn lpad(args: &[Value]) -> Result<Value> {
    pad(args, "LPAD", true)
}

fn rpad(args: &[Value]) -> Result<Value> {
    pad(args, "RPAD", false)
}

/// 1-based position of the first occurrence; 0 when absent.
fn instr(args: &[Value]) -> Result<Value> {
    expect("INSTR", args, 2)?;
    null_prop!(args);
    let haystack = args[0].as_text();
    let needle = args[1].as_text();
    let position = match haystack.find(&needle) {
        Some(byte_idx) => haystack[..byte_idx].chars().count() as i64 + 1,
        None => 0,
    };
    Ok(Value::Int(position))
}

fn starts_with(args: &[Value]) -> Result<Value> {
    expect("STARTS_WITH", args, 2)?;
    null_prop!(args);
    Ok(Value::Bool(args[0].as_text().starts_with(&args[1].as_text())))
}

fn ends_with(args: &[Value]) -> Result<Value> {
    expect("ENDS_WITH", args, 2)?;
    null_prop!(args);
    Ok(Value::Bool(args[0].as_text().ends_with(&args[1].as_text())))
}

fn contains(args: &[Value]) -> Result<Value> {
    expect("CONTAINS", args, 2)?;
    null_prop!(args);
    Ok(Value::Bool(args[0].as_text().contains(&args[1].as_text())))
}

// ----------------------------------------------------------------------
// Math functions
// ----------------------------------------------------------------------

fn abs(args: &[Value]) -> Result<Value> {
    expect("ABS", args, 1)?;
    null_prop!(args);
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i.saturating_abs())),
        other => Ok(Value::Float(other.as_float()?.abs())),
    }
}

fn ceil(args: &[Value]) -> Result<Value> {
    expect("CEIL", args, 1)?;
    null_prop!(args);
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        other => Ok(Value::Int(other.as_float()?.ceil() as i64)),
    }
}

fn floor(args: &[Value]) -> Result<Value> {
    expect("FLOOR", args, 1)?;
    null_prop!(args);
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        other => Ok(Value::Int(other.as_float()?.floor() as i64)),
    }
}

/// `ROUND(x[, digits])`
fn round(args: &[Value]) -> Result<Value> {
    expect_range("ROUND", args, 1, 2)?;
    null_prop!(args);
    let x = args[0].as_float()?;
    let digits = match args.get(1) {
        Some(d) => d.as_int()?,
        None => 0,
    };
    let factor = 10f64.powi(digits as i32);
    let rounded = (x * factor).round() / factor;
    if digits <= 0 && rounded.abs() < i64::MAX as f64 {
        Ok(Value::Int(rounded as i64))
    } else {
        Ok(Value::Float(rounded))
    }
}

fn sqrt(args: &[Value]) -> Result<Value> {
    expect("SQRT", args, 1)?;
    null_prop!(args);
    let x = args[0].as_float()?;
    if x < 0.0 {
        return Err(Error::Domain("SQRT of a negative number".into()));
    }
    Ok(Value::Float(x.sqrt()))
}

fn pow(args: &[Value]) -> Result<Value> {
    expect("POW", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(args[0].as_float()?.powf(args[1].as_float()?)))
}

fn exp(args: &[Value]) -> Result<Value> {
    expect("EXP", args, 1)?;
    null_prop!(args);
    Ok(Value::Float(args[0].as_float()?.exp()))
}

fn ln(args: &[Value]) -> Result<Value> {
    expect("LN", args, 1)?;
    null_prop!(args);
    let x = args[0].as_float()?;
    if x <= 0.0 {
        return Err(Error::Domain("LN of a non-positive number".into()));
    }
    Ok(Value::Float(x.ln()))
}

fn log10(args: &[Value]) -> Result<Value> {
    expect("LOG10", args, 1)?;
    null_prop!(args);
    let x = args[0].as_float()?;
    if x <= 0.0 {
        return Err(Error::Domain("LOG10 of a non-positive number".into()));
    }
    Ok(Value::Float(x.log10()))
}

fn modulo(args: &[Value]) -> Result<Value> {
    expect("MOD", args, 2)?;
    null_prop!(args);
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                Err(Error::Domain("MOD by zero".into()))
            } else {
                Ok(Value::Int(a % b))
            }
        }
        (a, b) => {
            let (a, b) = (a.as_float()?, b.as_float()?);
            if b == 0.0 {
                Err(Error::Domain("MOD by zero".into()))
            } else {
                Ok(Value::Float(a % b))
            }
        }
    }
}

fn sign(args: &[Value]) -> Result<Value> {
    expect("SIGN", args, 1)?;
    null_prop!(args);
    let x = args[0].as_float()?;
    Ok(Value::Int(if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }))
}

fn trig(args: &[Value], name: &str, f: fn(f64) -> f64) -> Result<Value> {
    expect(name, args, 1)?;
    null_prop!(args);
    Ok(Value::Float(f(args[0].as_float()?)))
}

fn atan2(args: &[Value]) -> Result<Value> {
    expect("ATAN2", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(args[0].as_float()?.atan2(args[1].as_float()?)))
}

fn pi(args: &[Value]) -> Result<Value> {
    expect("PI", args, 0)?;
    Ok(Value::Float(std::f64::consts::PI))
}

/// A uniform float in `[0, 1)`.
fn random(args: &[Value]) -> Result<Value> {
    expect("RANDOM", args, 0)?;
    Ok(Value::Float(rand::thread_rng().gen::<f64>()))
}

fn greatest(args: &[Value]) -> Result<Value> {
    extremum(args, "GREATEST", true)
}

fn least(args: &[Value]) -> Result<Value> {
    extremum(args, "LEAST", false)
}

fn extremum(args: &[Value], name: &str, take_max: bool) -> Result<Value> {
    if args.is_empty() {
        return Err(Error::Argument(format!("{name} needs at least one argument")));
    }
    let mut best: Option<&Value> = None;
    for arg in args.iter().filter(|v| !v.is_null()) {
        best = Some(match best {
            None => arg,
            Some(current) => {
                let ordering = arg.compare(current);
                let replace = if take_max {
                    ordering == core::cmp::Ordering::Greater
                } else {
                    ordering == core::cmp::Ordering::Less
                };
                if replace {
                    arg
                } else {
                    current
                }
            }
        });
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

// ----------------------------------------------------------------------
// Date/time functions
// ----------------------------------------------------------------------

fn now(args: &[Value]) -> Result<Value> {
    expect("NOW", args, 0)?;
    Ok(Value::Timestamp(Utc::now()))
}

fn current_date(args: &[Value]) -> Result<Value> {
    expect("CURRENT_DATE", args, 0)?;
    Ok(Value::Text(Utc::now().format("%Y-%m-%d").to_string()))
}

/// `DATE_PART(part, ts)` with parts year..second, dow, doy, epoch.
fn date_part(args: &[Value]) -> Result<Value> {
    expect("DATE_PART", args, 2)?;
    null_prop!(args);
    let ts = args[1].as_timestamp()?;
    let part = args[0].as_text().to_lowercase();
    let out = match part.as_str() {
        "year" => ts.year() as i64,
        "month" => ts.month() as i64,
        "day" => ts.day() as i64,
        "hour" => ts.hour() as i64,
        "minute" => ts.minute() as i64,
        "second" => ts.second() as i64,
        "dow" => ts.weekday().num_days_from_sunday() as i64,
        "doy" => ts.ordinal() as i64,
        "epoch" => ts.timestamp(),
        other => {
            return Err(Error::Argument(format!("unknown date part {other:?}")));
        }
    };
    Ok(Value::Int(out))
}

fn date_trunc(args: &[Value]) -> Result<Value> {
    expect("DATE_TRUNC", args, 2)?;
    null_prop!(args);
    let ts = args[1].as_timestamp()?;
    let part = args[0].as_text().to_lowercase();
    let naive = ts.naive_utc();
    let date = naive.date();
    let truncated = match part.as_str() {
        "year" => date.with_ordinal(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        "month" => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        "day" => date.and_hms_opt(0, 0, 0),
        "hour" => date.and_hms_opt(naive.hour(), 0, 0),
        "minute" => date.and_hms_opt(naive.hour(), naive.minute(), 0),
        "second" => date.and_hms_opt(naive.hour(), naive.minute(), naive.second()),
        other => {
            return Err(Error::Argument(format!("unknown date part {other:?}")));
        }
    };
    match truncated {
        Some(naive) => Ok(Value::Timestamp(Utc.from_utc_datetime(&naive))),
        None => Err(Error::Domain("timestamp out of range".into())),
    }
}

/// `DATE_ADD(ts, amount, part)`
fn date_add(args: &[Value]) -> Result<Value> {
    expect("DATE_ADD", args, 3)?;
    null_prop!(args);
    let ts = args[0].as_timestamp()?;
    let amount = args[1].as_int()?;
    let part = args[2].as_text().to_lowercase();
    let shifted = match part.as_str() {
        "second" => ts.checked_add_signed(chrono::Duration::seconds(amount)),
        "minute" => ts.checked_add_signed(chrono::Duration::minutes(amount)),
        "hour" => ts.checked_add_signed(chrono::Duration::hours(amount)),
        "day" => ts.checked_add_signed(chrono::Duration::days(amount)),
        "week" => ts.checked_add_signed(chrono::Duration::weeks(amount)),
        "month" => add_months(ts, amount),
        "year" => add_months(ts, amount.saturating_mul(12)),
        other => {
            return Err(Error::Argument(format!("unknown date part {other:?}")));
        }
    };
    match shifted {
        Some(ts) => Ok(Value::Timestamp(ts)),
        None => Err(Error::Domain("timestamp out of range".into())),
    }
}

fn add_months(ts: chrono::DateTime<Utc>, months: i64) -> Option<chrono::DateTime<Utc>> {
    let total = ts.year() as i64 * 12 + ts.month0() as i64 + months;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12));
    let day = ts.day();
    let date = chrono::NaiveDate::from_ymd_opt(year as i32, month0 as u32 + 1, day)
        .or_else(|| chrono::NaiveDate::from_ymd_opt(year as i32, month0 as u32 + 1, 1))?;
    let naive = date.and_hms_opt(ts.hour(), ts.minute(), ts.second())?;
    Some(Utc.from_utc_datetime(&naive))
}

/// `DATE_DIFF(part, start, end)`: whole units from start to end.
fn date_diff(args: &[Value]) -> Result<Value> {
    expect("DATE_DIFF", args, 3)?;
    null_prop!(args);
    let part = args[0].as_text().to_lowercase();
    let start = args[1].as_timestamp()?;
    let end = args[2].as_timestamp()?;
    let delta = end.signed_duration_since(start);
    let out = match part.as_str() {
        "second" => delta.num_seconds(),
        "minute" => delta.num_minutes(),
        "hour" => delta.num_hours(),
        "day" => delta.num_days(),
        "week" => delta.num_weeks(),
        "month" => {
            (end.year() as i64 * 12 + end.month0() as i64)
                - (start.year() as i64 * 12 + start.month0() as i64)
        }
        "year" => end.year() as i64 - start.year() as i64,
        other => {
            return Err(Error::Argument(format!("unknown date part {other:?}")));
        }
    };
    Ok(Value::Int(out))
}

fn to_timestamp(args: &[Value]) -> Result<Value> {
    expect("TO_TIMESTAMP", args, 1)?;
    null_prop!(args);
    Ok(Value::Timestamp(args[0].as_timestamp()?))
}

/// `STRFTIME(format, ts)` with chrono format specifiers.
fn strftime(args: &[Value]) -> Result<Value> {
    expect("STRFTIME", args, 2)?;
    null_prop!(args);
    let format = args[0].as_text();
    let ts = args[1].as_timestamp()?;
    let mut out = String::new();
    if core::fmt::write(
        &mut out,
        format_args!("{}", ts.format(&format)),
    )
    .is_err()
    {
        return Err(Error::Argument(format!("bad STRFTIME format {format:?}")));
    }
    Ok(Value::Text(out))
}

// ----------------------------------------------------------------------
// Regex functions
// ----------------------------------------------------------------------

fn compile_regex(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|e| Error::Domain(format!("invalid regex: {e}")))
}

fn regexp_matches(args: &[Value]) -> Result<Value> {
    expect("REGEXP_MATCHES", args, 2)?;
    null_prop!(args);
    let re = compile_regex(&args[1].as_text())?;
    Ok(Value::Bool(re.is_match(&args[0].as_text())))
}

fn regexp_replace(args: &[Value]) -> Result<Value> {
    expect("REGEXP_REPLACE", args, 3)?;
    null_prop!(args);
    let re = compile_regex(&args[1].as_text())?;
    let text = args[0].as_text();
    let replacement = args[2].as_text();
    Ok(Value::Text(
        re.replace_all(&text, replacement.as_str()).into_owned(),
    ))
}

/// `REGEXP_EXTRACT(s, pattern[, group])`; Null when there is no match.
fn regexp_extract(args: &[Value]) -> Result<Value> {
    expect_range("REGEXP_EXTRACT", args, 2, 3)?;
    null_prop!(args);
    let re = compile_regex(&args[1].as_text())?;
    let group = match args.get(2) {
        Some(g) => g.as_int()?.max(0) as usize,
        None => 0,
    };
    let text = args[0].as_text();
    match re.captures(&text).and_then(|c| c.get(group)) {
        Some(m) => Ok(Value::Text(m.as_str().to_string())),
        None => Ok(Value::Null),
    }
}

// ----------------------------------------------------------------------
// JSON functions
// ----------------------------------------------------------------------

fn to_json_value(value: &Value) -> Result<serde_json::Value> {
    match value {
        Value::Json(j) => Ok(j.clone()),
        Value::Text(s) => serde_json::from_str(s)
            .map_err(|e| Error::Type(format!("invalid JSON: {e}"))),
        other => serde_json::to_value(other)
            .map_err(|e| Error::Type(format!("cannot convert to JSON: {e}"))),
    }
}

enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses dotted paths with `[idx]` segments, e.g. `a.b[0].c`.
fn parse_json_path(path: &str) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return Err(Error::Domain(format!("invalid JSON path {path:?}")));
        }
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            if bracket > 0 {
                segments.push(PathSegment::Key(rest[..bracket].to_string()));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else {
                    return Err(Error::Domain(format!("invalid JSON path {path:?}")));
                };
                let idx: usize = stripped[..close]
                    .parse()
                    .map_err(|_| Error::Domain(format!("invalid JSON path {path:?}")))?;
                segments.push(PathSegment::Index(idx));
                rest = &stripped[close + 1..];
            }
            if !rest.is_empty() {
                return Err(Error::Domain(format!("invalid JSON path {path:?}")));
            }
        } else {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    Ok(segments)
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Json(other.clone()),
    }
}

fn json_get(args: &[Value]) -> Result<Value> {
    expect("JSON_GET", args, 2)?;
    null_prop!(args);
    let doc = to_json_value(&args[0])?;
    let mut current = &doc;
    for segment in parse_json_path(&args[1].as_text())? {
        current = match segment {
            PathSegment::Key(key) => match current.get(&key) {
                Some(next) => next,
                None => return Ok(Value::Null),
            },
            PathSegment::Index(idx) => match current.get(idx) {
                Some(next) => next,
                None => return Ok(Value::Null),
            },
        };
    }
    Ok(json_to_value(current))
}

fn json_array_length(args: &[Value]) -> Result<Value> {
    expect("JSON_ARRAY_LENGTH", args, 1)?;
    null_prop!(args);
    match to_json_value(&args[0])? {
        serde_json::Value::Array(items) => Ok(Value::Int(items.len() as i64)),
        _ => Err(Error::Type("JSON_ARRAY_LENGTH expects an array".into())),
    }
}

fn json_type(args: &[Value]) -> Result<Value> {
    expect("JSON_TYPE", args, 1)?;
    null_prop!(args);
    let kind = match to_json_value(&args[0])? {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    Ok(Value::Text(kind.to_string()))
}

fn json_valid(args: &[Value]) -> Result<Value> {
    expect("JSON_VALID", args, 1)?;
    null_prop!(args);
    let valid = match &args[0] {
        Value::Json(_) => true,
        other => serde_json::from_str::<serde_json::Value>(&other.as_text()).is_ok(),
    };
    Ok(Value::Bool(valid))
}

fn to_json(args: &[Value]) -> Result<Value> {
    expect("TO_JSON", args, 1)?;
    if args[0].is_null() {
        return Ok(Value::Json(serde_json::Value::Null));
    }
    Ok(Value::Json(to_json_value(&args[0]).or_else(|_| {
        serde_json::to_value(&args[0]).map_err(|e| Error::Type(format!("TO_JSON: {e}")))
    })?))
}

// ----------------------------------------------------------------------
// Conditionals and metadata
// ----------------------------------------------------------------------

fn coalesce(args: &[Value]) -> Result<Value> {
    for arg in args {
        if !arg.is_null() {
            return Ok(arg.clone());
        }
    }
    Ok(Value::Null)
}

fn nullif(args: &[Value]) -> Result<Value> {
    expect("NULLIF", args, 2)?;
    if args[0].eq3(&args[1]).is_true() {
        Ok(Value::Null)
    } else {
        Ok(args[0].clone())
    }
}

fn ifnull(args: &[Value]) -> Result<Value> {
    expect("IFNULL", args, 2)?;
    if args[0].is_null() {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

fn if_fn(args: &[Value]) -> Result<Value> {
    expect("IF", args, 3)?;
    let truthy = !args[0].is_null() && args[0].as_bool()?;
    Ok(if truthy { args[1].clone() } else { args[2].clone() })
}

fn typeof_fn(args: &[Value]) -> Result<Value> {
    expect("TYPEOF", args, 1)?;
    Ok(Value::Text(args[0].type_name().to_string()))
}

// ----------------------------------------------------------------------
// Hashes and encodings
// ----------------------------------------------------------------------

fn md5_fn(args: &[Value]) -> Result<Value> {
    expect("MD5", args, 1)?;
    null_prop!(args);
    let digest = md5::compute(args[0].as_text().as_bytes());
    Ok(Value::Text(format!("{digest:x}")))
}

fn sha256_fn(args: &[Value]) -> Result<Value> {
    expect("SHA256", args, 1)?;
    null_prop!(args);
    let digest = sha2::Sha256::digest(args[0].as_text().as_bytes());
    Ok(Value::Text(hex::encode(digest)))
}

fn hex_fn(args: &[Value]) -> Result<Value> {
    expect("HEX", args, 1)?;
    null_prop!(args);
    let bytes = match &args[0] {
        Value::Bytes(b) => b.clone(),
        other => other.as_text().into_bytes(),
    };
    Ok(Value::Text(hex::encode(bytes)))
}

fn unhex(args: &[Value]) -> Result<Value> {
    expect("UNHEX", args, 1)?;
    null_prop!(args);
    let bytes = hex::decode(args[0].as_text())
        .map_err(|_| Error::Type("UNHEX expects hexadecimal input".into()))?;
    Ok(Value::Bytes(bytes))
}

fn to_base64(args: &[Value]) -> Result<Value> {
    expect("TO_BASE64", args, 1)?;
    null_prop!(args);
    let bytes = match &args[0] {
        Value::Bytes(b) => b.clone(),
        other => other.as_text().into_bytes(),
    };
    Ok(Value::Text(base64::engine::general_purpose::STANDARD.encode(bytes)))
}

fn from_base64(args: &[Value]) -> Result<Value> {
    expect("FROM_BASE64", args, 1)?;
    null_prop!(args);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(args[0].as_text())
        .map_err(|_| Error::Type("FROM_BASE64 expects base64 input".into()))?;
    Ok(Value::Bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        let registry = FunctionRegistry::standard();
        registry.scalar(name).expect("registered")(args)
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("UPPER", &[Value::Text("abc".into())]).unwrap(), Value::Text("ABC".into()));
        assert_eq!(call("LENGTH", &[Value::Text("héllo".into())]).unwrap(), Value::Int(5));
        assert_eq!(
            call("SUBSTR", &[Value::Text("hello".into()), Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Text("ell".into())
        );
        assert_eq!(
            call("SPLIT_PART", &[Value::Text("a,b,c".into()), Value::Text(",".into()), Value::Int(2)]).unwrap(),
            Value::Text("b".into())
        );
        assert_eq!(
            call("LPAD", &[Value::Text("7".into()), Value::Int(3), Value::Text("0".into())]).unwrap(),
            Value::Text("007".into())
        );
        assert_eq!(
            call("INSTR", &[Value::Text("hello".into()), Value::Text("ll".into())]).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn math_domain_errors() {
        assert!(matches!(call("SQRT", &[Value::Int(-1)]), Err(Error::Domain(_))));
        assert!(matches!(call("LN", &[Value::Int(0)]), Err(Error::Domain(_))));
        assert!(matches!(
            call("MOD", &[Value::Int(5), Value::Int(0)]),
            Err(Error::Domain(_))
        ));
        assert_eq!(call("MOD", &[Value::Int(7), Value::Int(3)]).unwrap(), Value::Int(1));
        assert_eq!(call("ROUND", &[Value::Float(2.567), Value::Int(2)]).unwrap(), Value::Float(2.57));
    }

    #[test]
    fn null_propagation() {
        assert_eq!(call("UPPER", &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(call("SQRT", &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(
            call("COALESCE", &[Value::Null, Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            call("CONCAT", &[Value::Text("a".into()), Value::Null, Value::Text("b".into())]).unwrap(),
            Value::Text("ab".into())
        );
    }

    #[test]
    fn date_functions() {
        let ts = Value::Text("2024-03-15T10:30:00Z".into());
        assert_eq!(call("DATE_PART", &[Value::Text("year".into()), ts.clone()]).unwrap(), Value::Int(2024));
        assert_eq!(call("DATE_PART", &[Value::Text("month".into()), ts.clone()]).unwrap(), Value::Int(3));
        assert_eq!(
            call("DATE_DIFF", &[
                Value::Text("day".into()),
                Value::Text("2024-03-01".into()),
                Value::Text("2024-03-15".into()),
            ])
            .unwrap(),
            Value::Int(14)
        );
        let truncated = call("DATE_TRUNC", &[Value::Text("month".into()), ts]).unwrap();
        assert_eq!(truncated.as_text(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn regex_functions() {
        assert_eq!(
            call("REGEXP_MATCHES", &[Value::Text("abc123".into()), Value::Text("[0-9]+".into())]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("REGEXP_EXTRACT", &[Value::Text("abc123".into()), Value::Text("[0-9]+".into())]).unwrap(),
            Value::Text("123".into())
        );
        assert!(matches!(
            call("REGEXP_MATCHES", &[Value::Text("x".into()), Value::Text("(".into())]),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn json_path_access() {
        let doc = Value::Text(r#"{"a": {"b": [10, 20, 30]}}"#.into());
        assert_eq!(
            call("JSON_GET", &[doc.clone(), Value::Text("a.b[1]".into())]).unwrap(),
            Value::Int(20)
        );
        assert_eq!(
            call("JSON_GET", &[doc.clone(), Value::Text("a.missing".into())]).unwrap(),
            Value::Null
        );
        assert!(matches!(
            call("JSON_GET", &[doc, Value::Text("a.[x]".into())]),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn hashes_and_encodings() {
        assert_eq!(
            call("MD5", &[Value::Text("abc".into())]).unwrap(),
            Value::Text("900150983cd24fb0d6963f7d28e17f72".into())
        );
        assert_eq!(
            call("SHA256", &[Value::Text("abc".into())]).unwrap(),
            Value::Text("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into())
        );
        assert_eq!(
            call("TO_BASE64", &[Value::Text("hi".into())]).unwrap(),
            Value::Text("aGk=".into())
        );
        assert_eq!(call("HEX", &[Value::Text("hi".into())]).unwrap(), Value::Text("6869".into()));
    }
}
