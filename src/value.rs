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

//! Runtime values, coercions, and three-valued logic.
//!
//! Every cell the engine touches is a [`Value`]. Coercions are total: they
//! either succeed or return a typed error, and `Null` propagates rather than
//! failing. Comparisons follow SQL three-valued logic via [`Truth`].

use core::cmp::Ordering;
use core::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// A dynamically typed runtime value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Vector(Vec<f64>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The runtime type name, as reported by `TYPEOF` and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INT64",
            Value::Float(_) => "FLOAT64",
            Value::Bool(_) => "BOOL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Json(_) => "JSON",
            Value::Vector(_) => "VECTOR",
        }
    }

    /// Converts an AST literal into a runtime value. Numeric literals become
    /// `Int` when they fit, otherwise `Float`.
    pub fn from_literal(value: &crate::ast::Value) -> Result<Value> {
        Ok(match value {
            crate::ast::Value::Number(n) => {
                if let Ok(i) = n.parse::<i64>() {
                    Value::Int(i)
                } else {
                    Value::Float(n.parse::<f64>().map_err(|_| {
                        Error::Type(format!("cannot interpret {n:?} as a number"))
                    })?)
                }
            }
            crate::ast::Value::SingleQuotedString(s) => Value::Text(s.clone()),
            crate::ast::Value::Boolean(b) => Value::Bool(*b),
            crate::ast::Value::Null => Value::Null,
        })
    }

    /// Coerces to a signed integer. Bools map to 1/0 and text is parsed;
    /// a fractional float fails.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::Type(format!("cannot coerce {s:?} to INT64"))),
            other => Err(Error::Type(format!(
                "cannot coerce {} to INT64",
                other.type_name()
            ))),
        }
    }

    /// Coerces to a double. Ints widen, bools map to 1/0, text is parsed.
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::Bool(b) => Ok(f64::from(u8::from(*b))),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::Type(format!("cannot coerce {s:?} to FLOAT64"))),
            other => Err(Error::Type(format!(
                "cannot coerce {} to FLOAT64",
                other.type_name()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            Value::Text(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(Error::Type(format!("cannot coerce {s:?} to BOOL"))),
            },
            other => Err(Error::Type(format!(
                "cannot coerce {} to BOOL",
                other.type_name()
            ))),
        }
    }

    /// Coerces to text using the canonical rendering.
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    pub fn as_timestamp(&self) -> Result<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Text(s) => parse_timestamp(s),
            Value::Int(i) => Utc
                .timestamp_opt(*i, 0)
                .single()
                .ok_or_else(|| Error::Type(format!("epoch {i} out of range"))),
            other => Err(Error::Type(format!(
                "cannot coerce {} to TIMESTAMP",
                other.type_name()
            ))),
        }
    }

    /// Borrows the vector payload; `Text` containing a JSON array and `Json`
    /// arrays are converted.
    pub fn as_vector(&self) -> Result<Vec<f64>> {
        match self {
            Value::Vector(v) => Ok(v.clone()),
            Value::Json(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_f64()
                        .ok_or_else(|| Error::Type("vector element is not a number".into()))
                })
                .collect(),
            Value::Text(s) => {
                let parsed: Vec<f64> = serde_json::from_str(s)
                    .map_err(|_| Error::Type(format!("cannot coerce {s:?} to VECTOR")))?;
                Ok(parsed)
            }
            other => Err(Error::Type(format!(
                "cannot coerce {} to VECTOR",
                other.type_name()
            ))),
        }
    }

    /// True for Int and Float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// The key used for GROUP BY, DISTINCT, and set-operation dedup. The
    /// type-class prefix keeps text and numeric keys distinct; Int and Float
    /// share the numeric class so `1` and `1.0` land in one group.
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "\u{0}null".into(),
            Value::Int(_) | Value::Float(_) => format!("n:{self}"),
            Value::Bool(b) => format!("b:{b}"),
            Value::Text(s) => format!("t:{}", s.to_lowercase()),
            Value::Bytes(_) => format!("x:{self}"),
            Value::Timestamp(ts) => format!("ts:{}", ts.to_rfc3339()),
            Value::Json(j) => format!("j:{j}"),
            Value::Vector(_) => format!("v:{self}"),
        }
    }

    /// The hash key used by the hash-join build table: the canonical text of
    /// the value, which agrees with `compare`'s equality on mixed types.
    /// `None` for Null, which never matches any key.
    pub fn join_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Total ordering used by ORDER BY and MIN/MAX. Numeric pairs compare
    /// numerically; same-typed values compare naturally; mixed types fall
    /// back to lexicographic comparison of the canonical text. Null handling
    /// is the caller's concern.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.as_float().unwrap_or(f64::NAN), b.as_float().unwrap_or(f64::NAN));
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }

    /// Three-valued comparison: `Unknown` when either side is Null.
    pub fn compare3(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            None
        } else {
            Some(self.compare(other))
        }
    }

    /// Three-valued equality.
    pub fn eq3(&self, other: &Value) -> Truth {
        match self.compare3(other) {
            Some(Ordering::Equal) => Truth::True,
            Some(_) => Truth::False,
            None => Truth::Unknown,
        }
    }
}

impl fmt::Display for Value {
    /// Canonical text form: booleans as `true`/`false`, timestamps as
    /// ISO-8601, vectors and JSON as JSON, Null as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&hex::encode(b)),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Json(j) => write!(f, "{j}"),
            Value::Vector(v) => {
                write!(f, "[")?;
                let mut delim = "";
                for item in v {
                    write!(f, "{delim}{item}")?;
                    delim = ",";
                }
                write!(f, "]")
            }
        }
    }
}

/// Parses ISO-8601 (RFC 3339), `YYYY-MM-DD HH:MM:SS`, and bare dates.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(Error::Type(format!("cannot parse {s:?} as a timestamp")))
}

/// SQL three-valued logic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn from_bool(b: bool) -> Truth {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    /// True wins high, False wins low, Unknown in between.
    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    pub fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }

    pub fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    pub fn is_true(self) -> bool {
        self == Truth::True
    }

    /// Renders as a predicate result value: Unknown becomes SQL NULL.
    pub fn into_value(self) -> Value {
        match self {
            Truth::True => Value::Bool(true),
            Truth::False => Value::Bool(false),
            Truth::Unknown => Value::Null,
        }
    }

    /// Reads a predicate result back; non-boolean values coerce.
    pub fn from_value(value: &Value) -> Result<Truth> {
        match value {
            Value::Null => Ok(Truth::Unknown),
            other => Ok(Truth::from_bool(other.as_bool()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_valued_truth_tables() {
        use Truth::*;
        let all = [True, False, Unknown];
        for &a in &all {
            assert_eq!(a.and(False), False);
            assert_eq!(a.or(True), True);
        }
        assert_eq!(True.and(Unknown), Unknown);
        assert_eq!(Unknown.and(Unknown), Unknown);
        assert_eq!(False.or(Unknown), Unknown);
        assert_eq!(Unknown.not(), Unknown);
        assert_eq!(True.not(), False);
    }

    #[test]
    fn numeric_comparison_widens() {
        assert_eq!(Value::Int(1).eq3(&Value::Float(1.0)), Truth::True);
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Ordering::Greater);
    }

    #[test]
    fn null_comparison_is_unknown() {
        assert_eq!(Value::Null.eq3(&Value::Int(1)), Truth::Unknown);
        assert_eq!(Value::Null.eq3(&Value::Null), Truth::Unknown);
    }

    #[test]
    fn canonical_text_forms() {
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Float(1.0).to_string(), "1");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Vector(vec![1.0, 0.5]).to_string(), "[1,0.5]");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn group_keys_separate_text_from_numbers() {
        assert_ne!(Value::Int(1).group_key(), Value::Text("1".into()).group_key());
        assert_eq!(Value::Int(1).group_key(), Value::Float(1.0).group_key());
    }

    #[test]
    fn timestamp_parsing() {
        assert!(parse_timestamp("2024-01-02T03:04:05Z").is_ok());
        assert!(parse_timestamp("2024-01-02 03:04:05").is_ok());
        assert!(parse_timestamp("2024-01-02").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
