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

//! Table-valued functions: callable in FROM, returning a result set that
//! participates as a derived relation.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::functions::{vector::Metric, FunctionRegistry};
use crate::row::ResultSet;
use crate::storage::Tenant;
use crate::value::Value;

/// Execution context handed to a table-valued function: the tenant whose
/// tables the call may read.
pub struct TableFunctionContext<'a> {
    pub tenant: &'a Tenant,
}

/// A registered table-valued function. Lookup is case-insensitive;
/// `validate_args` runs before `execute`.
pub trait TableFunction: Send + Sync {
    fn name(&self) -> &str;
    /// Checks arity and argument kinds; fatal argument errors abort the
    /// call before any row is produced.
    fn validate_args(&self, args: &[Value]) -> Result<()>;
    fn execute(&self, ctx: &TableFunctionContext, args: &[Value]) -> Result<ResultSet>;
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add_table_function(Arc::new(VecSearch));
}

/// `VEC_SEARCH(table, column, query, k[, metric])`: brute-force k-NN over a
/// vector column. Returns the source columns plus `_vec_distance` and
/// 1-based `_vec_rank`, ordered by ascending distance.
struct VecSearch;

impl TableFunction for VecSearch {
    fn name(&self) -> &str {
        "VEC_SEARCH"
    }

    fn validate_args(&self, args: &[Value]) -> Result<()> {
        if !(4..=5).contains(&args.len()) {
            return Err(Error::Argument(
                "VEC_SEARCH takes (table, column, query, k[, metric])".into(),
            ));
        }
        if !matches!(args[0], Value::Text(_)) || !matches!(args[1], Value::Text(_)) {
            return Err(Error::Argument(
                "VEC_SEARCH table and column must be strings".into(),
            ));
        }
        args[2].as_vector().map_err(|_| {
            Error::Argument("VEC_SEARCH query must be a vector".into())
        })?;
        let k = args[3].as_int().map_err(|_| {
            Error::Argument("VEC_SEARCH k must be an integer".into())
        })?;
        if k < 0 {
            return Err(Error::Argument("VEC_SEARCH k must be non-negative".into()));
        }
        if let Some(metric) = args.get(4) {
            Metric::parse(&metric.as_text())?;
        }
        Ok(())
    }

    fn execute(&self, ctx: &TableFunctionContext, args: &[Value]) -> Result<ResultSet> {
        let table_name = args[0].as_text();
        let column_name = args[1].as_text();
        let query = args[2].as_vector()?;
        let k = args[3].as_int()? as usize;
        let metric = match args.get(4) {
            Some(m) => Metric::parse(&m.as_text())?,
            None => Metric::default(),
        };

        let table = ctx
            .tenant
            .table(&table_name)
            .ok_or_else(|| Error::Name(format!("unknown table {table_name:?}")))?;
        let column = table
            .column_index(&column_name)
            .ok_or_else(|| Error::Name(format!("unknown column {column_name:?}")))?;

        // Rows whose cell is not a vector of the query's dimension are
        // skipped rather than failing the whole scan.
        let mut scored: Vec<(f64, &Vec<Value>)> = Vec::new();
        for row in &table.rows {
            let Some(cell) = row.get(column) else {
                continue;
            };
            let Ok(candidate) = cell.as_vector() else {
                continue;
            };
            if candidate.len() != query.len() {
                continue;
            }
            let Ok(distance) = metric.distance(&query, &candidate) else {
                continue;
            };
            scored.push((distance, row));
        }
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(core::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut columns: Vec<String> =
            table.columns.iter().map(|c| c.name.clone()).collect();
        columns.push("_vec_distance".to_string());
        columns.push("_vec_rank".to_string());
        let mut out = ResultSet::new(columns);
        for (rank, (distance, row)) in scored.into_iter().enumerate() {
            let mut values = row.clone();
            values.push(Value::Float(distance));
            values.push(Value::Int(rank as i64 + 1));
            out.push_row(values);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DataType;
    use crate::storage::{Column, Table};

    fn docs_tenant() -> Tenant {
        let mut table = Table::new(
            "docs",
            vec![
                Column::new("id", DataType::Int64),
                Column::new("embedding", DataType::Vector),
            ],
            false,
        );
        table.rows = vec![
            vec![Value::Int(1), Value::Vector(vec![0.0, 0.0, 0.0])],
            vec![Value::Int(2), Value::Vector(vec![3.0, 4.0, 0.0])],
            vec![Value::Int(3), Value::Vector(vec![1.0, 1.0, 0.0])],
            // Wrong dimension, silently skipped.
            vec![Value::Int(4), Value::Vector(vec![1.0])],
            vec![Value::Int(5), Value::Null],
        ];
        let mut tenant = Tenant::default();
        tenant.tables.insert("docs".into(), table);
        tenant
    }

    #[test]
    fn vec_search_ranks_by_distance() {
        let tenant = docs_tenant();
        let ctx = TableFunctionContext { tenant: &tenant };
        let args = [
            Value::Text("docs".into()),
            Value::Text("embedding".into()),
            Value::Vector(vec![1.0, 0.0, 0.0]),
            Value::Int(2),
            Value::Text("l2".into()),
        ];
        let search = VecSearch;
        search.validate_args(&args).unwrap();
        let rs = search.execute(&ctx, &args).unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows[0].get("_vec_rank"), Some(&Value::Int(1)));
        assert_eq!(rs.rows[1].get("_vec_rank"), Some(&Value::Int(2)));
        let d1 = match rs.rows[0].get("_vec_distance") {
            Some(Value::Float(d)) => *d,
            other => panic!("expected distance, got {other:?}"),
        };
        let d2 = match rs.rows[1].get("_vec_distance") {
            Some(Value::Float(d)) => *d,
            other => panic!("expected distance, got {other:?}"),
        };
        assert!(d1 <= d2);
        // Nearest to [1,0,0] under L2 is [0,0,0] then [1,1,0].
        assert_eq!(rs.rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rs.rows[1].get("id"), Some(&Value::Int(3)));
    }

    #[test]
    fn vec_search_validates_arguments() {
        let search = VecSearch;
        assert!(search.validate_args(&[Value::Int(1)]).is_err());
        assert!(search
            .validate_args(&[
                Value::Text("docs".into()),
                Value::Text("embedding".into()),
                Value::Text("not a vector".into()),
                Value::Int(2),
            ])
            .is_err());
        assert!(search
            .validate_args(&[
                Value::Text("docs".into()),
                Value::Text("embedding".into()),
                Value::Vector(vec![1.0]),
                Value::Int(2),
                Value::Text("chebyshev".into()),
            ])
            .is_err());
    }

    #[test]
    fn vec_search_unknown_table_is_name_error() {
        let tenant = Tenant::default();
        let ctx = TableFunctionContext { tenant: &tenant };
        let args = [
            Value::Text("missing".into()),
            Value::Text("embedding".into()),
            Value::Vector(vec![1.0]),
            Value::Int(1),
        ];
        assert!(matches!(VecSearch.execute(&ctx, &args), Err(Error::Name(_))));
    }
}
