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

//! Pure expression evaluation over a single row.
//!
//! Aggregate and window results are injected into the row map by the
//! executor under the expression's printed form before projection or HAVING
//! evaluation reaches them, so this module only ever dispatches scalars.

use crate::ast::{BinaryOperator, Expr, FunctionArg, UnaryOperator};
use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::row::RowMap;
use crate::value::{Truth, Value};

/// Evaluates `expr` against `row`, returning a value or a typed error.
pub fn eval_expr(functions: &FunctionRegistry, row: &RowMap, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Value(v) => Value::from_literal(v),
        Expr::Identifier(ident) => lookup_column(row, &ident.key()),
        Expr::CompoundIdentifier(parts) => {
            let key = parts
                .iter()
                .map(|p| p.key())
                .collect::<Vec<_>>()
                .join(".");
            lookup_column(row, &key)
        }
        Expr::Nested(inner) => eval_expr(functions, row, inner),
        Expr::IsNull(inner) => {
            let value = eval_expr(functions, row, inner)?;
            Ok(Value::Bool(value.is_null()))
        }
        Expr::IsNotNull(inner) => {
            let value = eval_expr(functions, row, inner)?;
            Ok(Value::Bool(!value.is_null()))
        }
        Expr::UnaryOp { op, expr } => {
            let value = eval_expr(functions, row, expr)?;
            eval_unary(*op, value)
        }
        Expr::BinaryOp { left, op, right } => eval_binary(functions, row, left, *op, right),
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval_expr(functions, row, expr)?;
            let mut truth = Truth::False;
            for item in list {
                let candidate = eval_expr(functions, row, item)?;
                match needle.eq3(&candidate) {
                    Truth::True => {
                        truth = Truth::True;
                        break;
                    }
                    Truth::Unknown => truth = Truth::Unknown,
                    Truth::False => {}
                }
            }
            let truth = if *negated { truth.not() } else { truth };
            Ok(truth.into_value())
        }
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let value = eval_expr(functions, row, expr)?;
            let low = eval_expr(functions, row, low)?;
            let high = eval_expr(functions, row, high)?;
            let ge_low = compare_truth(&value, &low, |o| o != core::cmp::Ordering::Less);
            let le_high = compare_truth(&value, &high, |o| o != core::cmp::Ordering::Greater);
            let truth = ge_low.and(le_high);
            let truth = if *negated { truth.not() } else { truth };
            Ok(truth.into_value())
        }
        Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
        } => {
            let value = eval_expr(functions, row, expr)?;
            let pattern = eval_expr(functions, row, pattern)?;
            if value.is_null() || pattern.is_null() {
                return Ok(Value::Null);
            }
            let matched = like_match(&value.as_text(), &pattern.as_text(), *escape_char);
            let truth = Truth::from_bool(matched != *negated);
            Ok(truth.into_value())
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let operand = operand
                .as_ref()
                .map(|o| eval_expr(functions, row, o))
                .transpose()?;
            for (condition, result) in conditions.iter().zip(results) {
                let matched = match &operand {
                    Some(operand) => {
                        let candidate = eval_expr(functions, row, condition)?;
                        operand.eq3(&candidate).is_true()
                    }
                    None => {
                        let truth = Truth::from_value(&eval_expr(functions, row, condition)?)?;
                        truth.is_true()
                    }
                };
                if matched {
                    return eval_expr(functions, row, result);
                }
            }
            match else_result {
                Some(result) => eval_expr(functions, row, result),
                None => Ok(Value::Null),
            }
        }
        Expr::Function(call) => {
            // Aggregates and window results are computed by the executor and
            // stored in the row under the call's printed form.
            if let Some(precomputed) = row.get(&expr.result_key()) {
                return Ok(precomputed.clone());
            }
            let name = call.name.key().to_uppercase();
            if call.over.is_some() {
                return Err(Error::State(format!(
                    "window function {name} is only allowed in the select list"
                )));
            }
            if functions.is_aggregate(&name) {
                return Err(Error::State(format!(
                    "aggregate function {name} is not allowed in this context"
                )));
            }
            if functions.is_window(&name) {
                return Err(Error::State(format!(
                    "window function {name} requires an OVER clause"
                )));
            }
            let scalar = functions
                .scalar(&name)
                .ok_or_else(|| Error::Name(format!("unknown function {name}")))?;
            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                match arg {
                    FunctionArg::Wildcard => {
                        return Err(Error::Argument(format!(
                            "{name} does not accept a * argument"
                        )))
                    }
                    FunctionArg::Expr(e) => args.push(eval_expr(functions, row, e)?),
                }
            }
            scalar(&args)
        }
    }
}

/// Evaluates a predicate to a three-valued truth.
pub fn eval_predicate(functions: &FunctionRegistry, row: &RowMap, expr: &Expr) -> Result<Truth> {
    Truth::from_value(&eval_expr(functions, row, expr)?)
}

/// Resolves a column by exact lowercased key, then by unique qualified
/// suffix (`key` matching `anything.key`).
pub fn lookup_column(row: &RowMap, key: &str) -> Result<Value> {
    if let Some(value) = row.get(key) {
        return Ok(value.clone());
    }
    let suffix = format!(".{key}");
    let mut found: Option<&Value> = None;
    for (row_key, value) in row {
        if row_key.ends_with(&suffix) {
            if found.is_some() {
                return Err(Error::Name(format!("ambiguous column reference {key:?}")));
            }
            found = Some(value);
        }
    }
    match found {
        Some(value) => Ok(value.clone()),
        None => Err(Error::Name(format!("unknown column {key:?}"))),
    }
}

fn compare_truth(
    left: &Value,
    right: &Value,
    accept: impl Fn(core::cmp::Ordering) -> bool,
) -> Truth {
    match left.compare3(right) {
        Some(ordering) => Truth::from_bool(accept(ordering)),
        None => Truth::Unknown,
    }
}

fn eval_unary(op: UnaryOperator, value: Value) -> Result<Value> {
    match op {
        UnaryOperator::Not => Ok(Truth::from_value(&value)?.not().into_value()),
        UnaryOperator::Plus | UnaryOperator::Minus => {
            if value.is_null() {
                return Ok(Value::Null);
            }
            let negate = op == UnaryOperator::Minus;
            match value {
                Value::Int(i) => Ok(Value::Int(if negate { -i } else { i })),
                Value::Float(f) => Ok(Value::Float(if negate { -f } else { f })),
                other => {
                    let f = other.as_float()?;
                    Ok(Value::Float(if negate { -f } else { f }))
                }
            }
        }
    }
}

fn eval_binary(
    functions: &FunctionRegistry,
    row: &RowMap,
    left: &Expr,
    op: BinaryOperator,
    right: &Expr,
) -> Result<Value> {
    use BinaryOperator::*;

    // Logical connectives short-circuit on a decided left side.
    if op == And || op == Or {
        let lhs = Truth::from_value(&eval_expr(functions, row, left)?)?;
        match (op, lhs) {
            (And, Truth::False) => return Ok(Value::Bool(false)),
            (Or, Truth::True) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let rhs = Truth::from_value(&eval_expr(functions, row, right)?)?;
        let truth = if op == And { lhs.and(rhs) } else { lhs.or(rhs) };
        return Ok(truth.into_value());
    }

    let lhs = eval_expr(functions, row, left)?;
    let rhs = eval_expr(functions, row, right)?;

    match op {
        Eq => Ok(lhs.eq3(&rhs).into_value()),
        NotEq => Ok(lhs.eq3(&rhs).not().into_value()),
        Lt => Ok(compare_truth(&lhs, &rhs, |o| o == core::cmp::Ordering::Less).into_value()),
        LtEq => Ok(compare_truth(&lhs, &rhs, |o| o != core::cmp::Ordering::Greater).into_value()),
        Gt => Ok(compare_truth(&lhs, &rhs, |o| o == core::cmp::Ordering::Greater).into_value()),
        GtEq => Ok(compare_truth(&lhs, &rhs, |o| o != core::cmp::Ordering::Less).into_value()),
        Plus | Minus | Multiply | Divide => eval_arithmetic(op, &lhs, &rhs),
        And | Or => unreachable!("handled above"),
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

/// Coerces an operand for arithmetic: text parses on demand, bools map to
/// 1/0.
fn to_num(value: &Value) -> Result<Num> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::Bool(b) => Ok(Num::Int(i64::from(*b))),
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Num::Int(i))
            } else if let Ok(f) = trimmed.parse::<f64>() {
                Ok(Num::Float(f))
            } else {
                Err(Error::Type(format!("cannot coerce {s:?} to a number")))
            }
        }
        other => Err(Error::Type(format!(
            "cannot use {} in arithmetic",
            other.type_name()
        ))),
    }
}

fn eval_arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value> {
    use BinaryOperator::*;

    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let (l, r) = (to_num(lhs)?, to_num(rhs)?);

    if let (Num::Int(a), Num::Int(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        match op {
            Plus => {
                if let Some(v) = a.checked_add(b) {
                    return Ok(Value::Int(v));
                }
            }
            Minus => {
                if let Some(v) = a.checked_sub(b) {
                    return Ok(Value::Int(v));
                }
            }
            Multiply => {
                if let Some(v) = a.checked_mul(b) {
                    return Ok(Value::Int(v));
                }
            }
            Divide => {
                if b == 0 {
                    return Err(Error::Domain("division by zero".into()));
                }
                // Integer division stays integral only when exact.
                if a % b == 0 {
                    return Ok(Value::Int(a / b));
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            _ => unreachable!(),
        }
        // Overflow widens to float.
    }

    let a = match l {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    };
    let b = match r {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    };
    match op {
        Plus => Ok(Value::Float(a + b)),
        Minus => Ok(Value::Float(a - b)),
        Multiply => Ok(Value::Float(a * b)),
        Divide => {
            if b == 0.0 {
                return Err(Error::Domain("division by zero".into()));
            }
            Ok(Value::Float(a / b))
        }
        _ => unreachable!(),
    }
}

/// SQL LIKE matcher: `%` matches any run, `_` one character, and the
/// character after `escape` matches literally.
pub fn like_match(text: &str, pattern: &str, escape: Option<char>) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match_at(&text, &pattern, escape)
}

fn like_match_at(text: &[char], pattern: &[char], escape: Option<char>) -> bool {
    let Some(&p) = pattern.first() else {
        return text.is_empty();
    };

    if Some(p) == escape {
        let Some(&literal) = pattern.get(1) else {
            return false;
        };
        return matches!(text.first(), Some(&t) if t == literal)
            && like_match_at(&text[1..], &pattern[2..], escape);
    }

    match p {
        '%' => {
            // Greedily consume nothing up to everything.
            (0..=text.len()).any(|skip| like_match_at(&text[skip..], &pattern[1..], escape))
        }
        '_' => !text.is_empty() && like_match_at(&text[1..], &pattern[1..], escape),
        _ => matches!(text.first(), Some(&t) if t == p)
            && like_match_at(&text[1..], &pattern[1..], escape),
    }
}
