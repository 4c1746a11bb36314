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

//! Window function evaluation.
//!
//! Rows are partitioned by the PARTITION BY keys, ordered stably within each
//! partition by the ORDER BY keys, and each function produces one value per
//! input row, aligned with the input order.

use indexmap::IndexMap;

use crate::ast::{Function, FunctionArg, OrderByExpr};
use crate::error::{Error, Result};
use crate::eval::eval_expr;
use crate::exec::sort_rows_stable;
use crate::functions::FunctionRegistry;
use crate::row::RowMap;
use crate::value::Value;

/// Computes one window function call over `rows`, returning a value per row
/// in input order.
pub(crate) fn compute_window(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    call: &Function,
) -> Result<Vec<Value>> {
    let name = call.name.key().to_uppercase();
    let spec = call
        .over
        .as_ref()
        .ok_or_else(|| Error::State(format!("{name} requires an OVER clause")))?;
    if !functions.is_window(&name) {
        return Err(Error::State(format!(
            "{name} is not a window function"
        )));
    }

    // Partition, keeping first-appearance order and original row indices.
    let mut partitions: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let key = spec
            .partition_by
            .iter()
            .map(|expr| Ok(eval_expr(functions, row, expr)?.group_key()))
            .collect::<Result<Vec<_>>>()?
            .join("\u{1}");
        partitions.entry(key).or_default().push(idx);
    }

    let mut out = vec![Value::Null; rows.len()];
    for (_, indices) in partitions {
        let ordered = order_partition(functions, rows, indices, &spec.order_by)?;
        let values = evaluate_in_partition(functions, rows, &ordered, &name, call, spec)?;
        for (position, &row_idx) in ordered.iter().enumerate() {
            out[row_idx] = values[position].clone();
        }
    }
    Ok(out)
}

/// Stable-sorts the partition's row indices by the ORDER BY keys; with no
/// keys the input order stands.
fn order_partition(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    indices: Vec<usize>,
    order_by: &[OrderByExpr],
) -> Result<Vec<usize>> {
    if order_by.is_empty() {
        return Ok(indices);
    }
    sort_rows_stable(functions, rows, indices, order_by)
}

fn evaluate_in_partition(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    ordered: &[usize],
    name: &str,
    call: &Function,
    spec: &crate::ast::WindowSpec,
) -> Result<Vec<Value>> {
    match name {
        "ROW_NUMBER" => Ok((1..=ordered.len() as i64).map(Value::Int).collect()),
        "RANK" | "DENSE_RANK" => ranks(functions, rows, ordered, spec, name == "DENSE_RANK"),
        "LAG" | "LEAD" => shifted(functions, rows, ordered, call, name == "LEAD"),
        "MOVING_SUM" | "MOVING_AVG" => moving(functions, rows, ordered, call, name == "MOVING_AVG"),
        other => Err(Error::State(format!("{other} is not a window function"))),
    }
}

/// RANK/DENSE_RANK over the partition's ORDER BY keys. Ties share a rank;
/// RANK leaves gaps, DENSE_RANK does not.
fn ranks(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    ordered: &[usize],
    spec: &crate::ast::WindowSpec,
    dense: bool,
) -> Result<Vec<Value>> {
    if spec.order_by.is_empty() {
        return Err(Error::State(
            "RANK requires ORDER BY in its window".into(),
        ));
    }
    // A row ties its predecessor when every ORDER BY key compares equal.
    let mut keys: Vec<Vec<Value>> = Vec::with_capacity(ordered.len());
    for &idx in ordered {
        let mut key = Vec::with_capacity(spec.order_by.len());
        for order in &spec.order_by {
            key.push(eval_expr(functions, &rows[idx], &order.expr)?);
        }
        keys.push(key);
    }
    let mut out = Vec::with_capacity(ordered.len());
    let mut rank = 0i64;
    let mut dense_rank = 0i64;
    for position in 0..ordered.len() {
        let tied = position > 0 && keys[position] == keys[position - 1];
        if !tied {
            rank = position as i64 + 1;
            dense_rank += 1;
        }
        out.push(Value::Int(if dense { dense_rank } else { rank }));
    }
    Ok(out)
}

/// LAG/LEAD: the expression `offset` rows before/after the current row in
/// partition order, Null when out of range.
fn shifted(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    ordered: &[usize],
    call: &Function,
    lead: bool,
) -> Result<Vec<Value>> {
    let (expr, offset) = shift_args(functions, rows, ordered, call)?;
    let mut out = Vec::with_capacity(ordered.len());
    for position in 0..ordered.len() {
        let target = if lead {
            position.checked_add(offset)
        } else {
            position.checked_sub(offset)
        };
        let value = match target.and_then(|t| ordered.get(t)) {
            Some(&row_idx) => eval_expr(functions, &rows[row_idx], expr)?,
            None => Value::Null,
        };
        out.push(value);
    }
    Ok(out)
}

fn shift_args<'a>(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    ordered: &[usize],
    call: &'a Function,
) -> Result<(&'a crate::ast::Expr, usize)> {
    let name = call.name.key().to_uppercase();
    let mut exprs = call.args.iter().map(|arg| match arg {
        FunctionArg::Expr(e) => Ok(e),
        FunctionArg::Wildcard => Err(Error::Argument(format!("{name} does not accept *"))),
    });
    let expr = exprs
        .next()
        .transpose()?
        .ok_or_else(|| Error::Argument(format!("{name} takes an expression argument")))?;
    let offset = match exprs.next().transpose()? {
        Some(offset_expr) => {
            let row = ordered.first().map(|&i| &rows[i]);
            let empty = RowMap::new();
            let value = eval_expr(functions, row.unwrap_or(&empty), offset_expr)?;
            let offset = value.as_int()?;
            if offset < 0 {
                return Err(Error::Argument(format!("{name} offset must be non-negative")));
            }
            offset as usize
        }
        None => 1,
    };
    if exprs.next().is_some() {
        return Err(Error::Argument(format!("{name} takes at most two arguments")));
    }
    Ok((expr, offset))
}

/// MOVING_SUM/MOVING_AVG over a trailing window of `width` rows ending at
/// the current row. Null inputs are skipped.
fn moving(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    ordered: &[usize],
    call: &Function,
    average: bool,
) -> Result<Vec<Value>> {
    let name = call.name.key().to_uppercase();
    let args: Vec<_> = call
        .args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Expr(e) => Ok(e),
            FunctionArg::Wildcard => Err(Error::Argument(format!("{name} does not accept *"))),
        })
        .collect::<Result<_>>()?;
    let [expr, width_expr] = args.as_slice() else {
        return Err(Error::Argument(format!(
            "{name} takes an expression and a window size"
        )));
    };
    let empty = RowMap::new();
    let width_row = ordered.first().map(|&i| &rows[i]).unwrap_or(&empty);
    let width = eval_expr(functions, width_row, width_expr)?.as_int()?;
    if width < 1 {
        return Err(Error::Argument(format!("{name} window size must be positive")));
    }
    let width = width as usize;

    let mut inputs: Vec<Option<f64>> = Vec::with_capacity(ordered.len());
    for &idx in ordered {
        let value = eval_expr(functions, &rows[idx], expr)?;
        inputs.push(if value.is_null() {
            None
        } else {
            Some(value.as_float()?)
        });
    }

    let mut out = Vec::with_capacity(ordered.len());
    for position in 0..inputs.len() {
        let start = position.saturating_sub(width - 1);
        let window: Vec<f64> = inputs[start..=position].iter().flatten().copied().collect();
        if window.is_empty() {
            out.push(Value::Null);
        } else if average {
            out.push(Value::Float(window.iter().sum::<f64>() / window.len() as f64));
        } else {
            out.push(Value::Float(window.iter().sum()));
        }
    }
    Ok(out)
}
