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

//! Join execution: a hash join for single-equality predicates and a
//! nested-loop fallback for everything else.

use std::collections::{HashMap, HashSet};

use crate::ast::{BinaryOperator, Expr, JoinConstraint, JoinOperator};
use crate::error::Result;
use crate::eval::{eval_predicate, lookup_column};
use crate::exec::{CancelToken, Relation};
use crate::functions::FunctionRegistry;
use crate::row::RowMap;
use crate::value::Value;

/// Merges two row maps: qualified keys from both sides survive; a plain
/// (unqualified) key present on both sides is dropped so an unqualified
/// reference resolves through suffix matching and reports the ambiguity.
pub(crate) fn merge_rows(left: &RowMap, right: &RowMap) -> RowMap {
    let mut merged = left.clone();
    for (key, value) in right {
        if !key.contains('.') && merged.contains_key(key) {
            merged.shift_remove(key);
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// A row of Nulls in `shape`'s key set, used to extend unmatched outer rows.
fn null_row(shape: &Relation) -> RowMap {
    match shape.rows.first() {
        Some(row) => row.keys().map(|k| (k.clone(), Value::Null)).collect(),
        None => shape
            .columns
            .iter()
            .map(|c| (c.to_lowercase(), Value::Null))
            .collect(),
    }
}

/// Extracts the two column keys of a single-equality predicate
/// (`a.x = b.y`), the syntactic marker for the hash-join fast path.
fn equi_join_keys(expr: &Expr) -> Option<(String, String)> {
    let Expr::BinaryOp { left, op, right } = expr else {
        return None;
    };
    if *op != BinaryOperator::Eq {
        return None;
    }
    Some((column_key(left)?, column_key(right)?))
}

fn column_key(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.key()),
        Expr::CompoundIdentifier(parts) => Some(
            parts
                .iter()
                .map(|p| p.key())
                .collect::<Vec<_>>()
                .join("."),
        ),
        _ => None,
    }
}

/// True if `key` resolves in a row shaped like `relation`'s rows.
fn belongs_to(relation: &Relation, key: &str) -> bool {
    let probe = match relation.rows.first() {
        Some(row) => row.keys().cloned().collect::<HashSet<_>>(),
        None => relation
            .columns
            .iter()
            .map(|c| c.to_lowercase())
            .collect::<HashSet<_>>(),
    };
    if probe.contains(key) {
        return true;
    }
    let suffix = format!(".{key}");
    probe.iter().any(|k| k.ends_with(&suffix))
}

/// Executes one JOIN clause, producing the merged relation.
pub(crate) fn execute_join(
    functions: &FunctionRegistry,
    cancel: &CancelToken,
    left: Relation,
    right: Relation,
    operator: &JoinOperator,
) -> Result<Relation> {
    let columns = left
        .columns
        .iter()
        .chain(right.columns.iter())
        .cloned()
        .collect();

    let constraint = operator.constraint();
    if let JoinConstraint::On(predicate) = constraint {
        if let Some((a, b)) = equi_join_keys(predicate) {
            // Orient the keys to their sides; a predicate whose sides do not
            // split cleanly falls through to the nested loop.
            let oriented = if belongs_to(&left, &a) && belongs_to(&right, &b) {
                Some((a, b))
            } else if belongs_to(&left, &b) && belongs_to(&right, &a) {
                Some((b, a))
            } else {
                None
            };
            if let Some((left_key, right_key)) = oriented {
                return hash_join(
                    cancel, left, right, &left_key, &right_key, operator, columns,
                );
            }
        }
    }
    nested_loop_join(functions, cancel, left, right, operator, columns)
}

/// Hash join on one equality. The build side is the smaller input (the
/// preserved side never builds for outer joins); Null keys never match.
/// Probe order is preserved, and build-side order within each key.
fn hash_join(
    cancel: &CancelToken,
    left: Relation,
    right: Relation,
    left_key: &str,
    right_key: &str,
    operator: &JoinOperator,
    columns: Vec<String>,
) -> Result<Relation> {
    // probe_left: iterate left rows, build table over right rows.
    let probe_left = match operator {
        JoinOperator::LeftOuter(_) => true,
        JoinOperator::RightOuter(_) => false,
        JoinOperator::Inner(_) => left.rows.len() >= right.rows.len(),
    };
    let (probe, build, probe_key, build_key) = if probe_left {
        (&left, &right, left_key, right_key)
    } else {
        (&right, &left, right_key, left_key)
    };

    let mut table: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in build.rows.iter().enumerate() {
        cancel.check()?;
        let Ok(value) = lookup_column(row, build_key) else {
            continue;
        };
        if let Some(key) = value.join_key() {
            table.entry(key).or_default().push(idx);
        }
    }

    let preserve_unmatched = !matches!(operator, JoinOperator::Inner(_));
    let null_extension = null_row(build);
    let mut rows = Vec::new();
    for row in &probe.rows {
        cancel.check()?;
        let matches = lookup_column(row, probe_key)
            .ok()
            .and_then(|v| v.join_key())
            .and_then(|key| table.get(&key));
        match matches {
            Some(indices) if !indices.is_empty() => {
                for &idx in indices {
                    let build_row = &build.rows[idx];
                    rows.push(if probe_left {
                        merge_rows(row, build_row)
                    } else {
                        merge_rows(build_row, row)
                    });
                }
            }
            _ if preserve_unmatched => {
                rows.push(if probe_left {
                    merge_rows(row, &null_extension)
                } else {
                    merge_rows(&null_extension, row)
                });
            }
            _ => {}
        }
    }
    Ok(Relation { columns, rows })
}

/// Cartesian evaluation of an arbitrary predicate. INNER keeps matches;
/// LEFT/RIGHT preserve unmatched rows from their side with Nulls opposite.
fn nested_loop_join(
    functions: &FunctionRegistry,
    cancel: &CancelToken,
    left: Relation,
    right: Relation,
    operator: &JoinOperator,
    columns: Vec<String>,
) -> Result<Relation> {
    let predicate = match operator.constraint() {
        JoinConstraint::On(expr) => Some(expr),
        JoinConstraint::None => None,
    };

    let probe_left = !matches!(operator, JoinOperator::RightOuter(_));
    let (probe, other) = if probe_left {
        (&left, &right)
    } else {
        (&right, &left)
    };
    let preserve_unmatched = !matches!(operator, JoinOperator::Inner(_));
    let null_extension = null_row(other);

    let mut rows = Vec::new();
    for probe_row in &probe.rows {
        cancel.check()?;
        let mut matched = false;
        for other_row in &other.rows {
            cancel.check()?;
            let merged = if probe_left {
                merge_rows(probe_row, other_row)
            } else {
                merge_rows(other_row, probe_row)
            };
            let keep = match predicate {
                Some(expr) => eval_predicate(functions, &merged, expr)?.is_true(),
                None => true,
            };
            if keep {
                matched = true;
                rows.push(merged);
            }
        }
        if !matched && preserve_unmatched {
            rows.push(if probe_left {
                merge_rows(probe_row, &null_extension)
            } else {
                merge_rows(&null_extension, probe_row)
            });
        }
    }
    Ok(Relation { columns, rows })
}
