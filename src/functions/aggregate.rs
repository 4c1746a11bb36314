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

//! Aggregate functions: an `init`/`step`/`finalize` protocol per call.
//!
//! Null inputs are skipped everywhere except `COUNT(*)`, which counts rows.
//! On empty input COUNT yields 0 and the rest yield Null.

use std::collections::HashSet;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::value::Value;

/// Per-group aggregate state. The executor creates one accumulator per
/// aggregate call per group, steps it with the evaluated argument values of
/// each row, and finalizes it into the group's output value.
pub trait Accumulator: Send {
    /// Folds one row's argument values into the state. `COUNT(*)` is stepped
    /// with an empty slice.
    fn step(&mut self, args: &[Value]) -> Result<()>;
    /// Produces the aggregate result.
    fn finalize(self: Box<Self>) -> Result<Value>;
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add_aggregate("COUNT", || Box::<Count>::default());
    registry.add_aggregate("SUM", || Box::<Sum>::default());
    registry.add_aggregate("AVG", || Box::<Avg>::default());
    registry.add_aggregate("MIN", || Box::new(Extremum::new(false)));
    registry.add_aggregate("MAX", || Box::new(Extremum::new(true)));
    registry.add_aggregate("MEDIAN", || Box::<Median>::default());
    registry.add_aggregate("GROUP_CONCAT", || Box::<GroupConcat>::default());
    registry.add_aggregate("STRING_AGG", || Box::<GroupConcat>::default());
    registry.add_aggregate("MIN_BY", || Box::new(ArgExtremum::new(false)));
    registry.add_aggregate("MAX_BY", || Box::new(ArgExtremum::new(true)));
}

/// Wraps an accumulator so each distinct argument tuple is stepped once.
pub(crate) fn distinct(inner: Box<dyn Accumulator>) -> Box<dyn Accumulator> {
    Box::new(Distinct {
        seen: HashSet::new(),
        inner,
    })
}

struct Distinct {
    seen: HashSet<String>,
    inner: Box<dyn Accumulator>,
}

impl Accumulator for Distinct {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        let key = args.iter().map(Value::group_key).join("\u{1}");
        if self.seen.insert(key) {
            self.inner.step(args)?;
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        self.inner.finalize()
    }
}

#[derive(Default)]
struct Count {
    count: i64,
}

impl Accumulator for Count {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        // `COUNT(*)` steps with no arguments and counts every row.
        if args.is_empty() || !args[0].is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        Ok(Value::Int(self.count))
    }
}

/// Integer sums stay integral until a float appears or the total overflows.
#[derive(Default)]
struct Sum {
    int_total: i64,
    float_total: f64,
    as_float: bool,
    seen: bool,
}

impl Sum {
    fn add(&mut self, value: &Value) -> Result<()> {
        self.seen = true;
        match value {
            Value::Int(i) if !self.as_float => match self.int_total.checked_add(*i) {
                Some(total) => self.int_total = total,
                None => {
                    self.as_float = true;
                    self.float_total = self.int_total as f64 + *i as f64;
                }
            },
            other => {
                let f = other.as_float()?;
                if !self.as_float {
                    self.as_float = true;
                    self.float_total = self.int_total as f64;
                }
                self.float_total += f;
            }
        }
        Ok(())
    }

    fn total(&self) -> Option<Value> {
        if !self.seen {
            None
        } else if self.as_float {
            Some(Value::Float(self.float_total))
        } else {
            Some(Value::Int(self.int_total))
        }
    }
}

impl Accumulator for Sum {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        expect_args("SUM", args, 1)?;
        if args[0].is_null() {
            return Ok(());
        }
        self.add(&args[0])
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        Ok(self.total().unwrap_or(Value::Null))
    }
}

#[derive(Default)]
struct Avg {
    total: f64,
    count: u64,
}

impl Accumulator for Avg {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        expect_args("AVG", args, 1)?;
        if args[0].is_null() {
            return Ok(());
        }
        self.total += args[0].as_float()?;
        self.count += 1;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        if self.count == 0 {
            Ok(Value::Null)
        } else {
            Ok(Value::Float(self.total / self.count as f64))
        }
    }
}

struct Extremum {
    take_max: bool,
    best: Option<Value>,
}

impl Extremum {
    fn new(take_max: bool) -> Self {
        Extremum {
            take_max,
            best: None,
        }
    }
}

impl Accumulator for Extremum {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        expect_args(if self.take_max { "MAX" } else { "MIN" }, args, 1)?;
        let candidate = &args[0];
        if candidate.is_null() {
            return Ok(());
        }
        let replace = match &self.best {
            None => true,
            Some(best) => {
                let ordering = candidate.compare(best);
                if self.take_max {
                    ordering == core::cmp::Ordering::Greater
                } else {
                    ordering == core::cmp::Ordering::Less
                }
            }
        };
        if replace {
            self.best = Some(candidate.clone());
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        Ok(self.best.unwrap_or(Value::Null))
    }
}

/// Exact median: collects the group, sorts once at finalize.
#[derive(Default)]
struct Median {
    values: Vec<f64>,
}

impl Accumulator for Median {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        expect_args("MEDIAN", args, 1)?;
        if args[0].is_null() {
            return Ok(());
        }
        self.values.push(args[0].as_float()?);
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<Value> {
        if self.values.is_empty() {
            return Ok(Value::Null);
        }
        self.values
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
        let n = self.values.len();
        let median = if n % 2 == 1 {
            self.values[n / 2]
        } else {
            (self.values[n / 2 - 1] + self.values[n / 2]) / 2.0
        };
        // An integral median of integral inputs reads better as an integer.
        if median.fract() == 0.0 && median.abs() < i64::MAX as f64 {
            Ok(Value::Int(median as i64))
        } else {
            Ok(Value::Float(median))
        }
    }
}

struct GroupConcat {
    parts: Vec<String>,
    separator: Option<String>,
}

impl Default for GroupConcat {
    fn default() -> Self {
        GroupConcat {
            parts: Vec::new(),
            separator: None,
        }
    }
}

impl Accumulator for GroupConcat {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        if args.is_empty() || args.len() > 2 {
            return Err(Error::Argument(
                "GROUP_CONCAT takes a value and an optional separator".into(),
            ));
        }
        if let Some(separator) = args.get(1) {
            if !separator.is_null() {
                self.separator = Some(separator.as_text());
            }
        }
        if !args[0].is_null() {
            self.parts.push(args[0].as_text());
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        if self.parts.is_empty() {
            return Ok(Value::Null);
        }
        let separator = self.separator.unwrap_or_else(|| ",".to_string());
        Ok(Value::Text(self.parts.join(&separator)))
    }
}

/// MIN_BY/MAX_BY: the first argument's value at the extremum of the second.
struct ArgExtremum {
    take_max: bool,
    best_key: Option<Value>,
    best_value: Value,
}

impl ArgExtremum {
    fn new(take_max: bool) -> Self {
        ArgExtremum {
            take_max,
            best_key: None,
            best_value: Value::Null,
        }
    }
}

impl Accumulator for ArgExtremum {
    fn step(&mut self, args: &[Value]) -> Result<()> {
        expect_args(if self.take_max { "MAX_BY" } else { "MIN_BY" }, args, 2)?;
        let (value, key) = (&args[0], &args[1]);
        if key.is_null() {
            return Ok(());
        }
        let replace = match &self.best_key {
            None => true,
            Some(best) => {
                let ordering = key.compare(best);
                if self.take_max {
                    ordering == core::cmp::Ordering::Greater
                } else {
                    ordering == core::cmp::Ordering::Less
                }
            }
        };
        if replace {
            self.best_key = Some(key.clone());
            self.best_value = value.clone();
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Value> {
        Ok(self.best_value)
    }
}

fn expect_args(name: &str, args: &[Value], n: usize) -> Result<()> {
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
