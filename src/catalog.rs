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

//! Virtual `sys.*` and `catalog.*` tables.
//!
//! Each table is a read-only snapshot assembled on demand from the current
//! tenant, the function registries, and engine counters. Nothing here holds
//! state.

use chrono::{DateTime, Utc};

use crate::cache::StatementCache;
use crate::error::{Error, Result};
use crate::exec::EngineConfig;
use crate::functions::FunctionRegistry;
use crate::row::ResultSet;
use crate::storage::{ColumnConstraint, Tenant};
use crate::value::Value;

/// Everything a snapshot builder may read.
pub(crate) struct CatalogContext<'a> {
    pub tenant: &'a Tenant,
    pub tenant_name: &'a str,
    pub functions: &'a FunctionRegistry,
    pub cache: &'a StatementCache,
    pub config: &'a EngineConfig,
    pub started_at: DateTime<Utc>,
    pub tenant_count: usize,
}

/// Materializes the named virtual table. `catalog.*` names alias their
/// `sys.*` equivalents.
pub(crate) fn virtual_table(name: &str, ctx: &CatalogContext) -> Result<ResultSet> {
    let key = match name.strip_prefix("catalog.") {
        Some(rest) => format!("sys.{rest}"),
        None => name.to_string(),
    };
    match key.as_str() {
        "sys.tables" => Ok(sys_tables(ctx)),
        "sys.columns" => Ok(sys_columns(ctx)),
        "sys.constraints" => Ok(sys_constraints(ctx)),
        "sys.indexes" => Ok(ResultSet::new(vec![
            "table_name".into(),
            "name".into(),
            "column_name".into(),
        ])),
        "sys.views" => Ok(sys_views(ctx)),
        "sys.functions" => Ok(sys_functions(ctx)),
        "sys.variables" => Ok(key_value_table(vec![])),
        "sys.status" => Ok(sys_status(ctx)),
        "sys.memory" => Ok(sys_memory(ctx)),
        "sys.storage" => Ok(sys_storage(ctx)),
        "sys.config" => Ok(sys_config(ctx)),
        "sys.connections" => Ok(key_value_table(vec![])),
        other => Err(Error::Name(format!("unknown system table {other:?}"))),
    }
}

fn sys_tables(ctx: &CatalogContext) -> ResultSet {
    let mut rs = ResultSet::new(vec![
        "name".into(),
        "columns".into(),
        "rows".into(),
        "is_temp".into(),
        "version".into(),
        "tenant".into(),
    ]);
    for table in ctx.tenant.tables.values() {
        rs.push_row(vec![
            Value::Text(table.name.clone()),
            Value::Int(table.columns.len() as i64),
            Value::Int(table.rows.len() as i64),
            Value::Bool(table.is_temp),
            Value::Int(table.version as i64),
            Value::Text(ctx.tenant_name.to_string()),
        ]);
    }
    rs
}

fn sys_columns(ctx: &CatalogContext) -> ResultSet {
    let mut rs = ResultSet::new(vec![
        "table_name".into(),
        "name".into(),
        "position".into(),
        "data_type".into(),
        "constraint".into(),
        "is_nullable".into(),
        "fk_table".into(),
        "fk_column".into(),
    ]);
    for table in ctx.tenant.tables.values() {
        for (position, column) in table.columns.iter().enumerate() {
            rs.push_row(vec![
                Value::Text(table.name.clone()),
                Value::Text(column.name.clone()),
                Value::Int(position as i64 + 1),
                Value::Text(column.data_type.to_string()),
                Value::Text(column.constraint.as_str().to_string()),
                Value::Bool(!column.not_null),
                column
                    .fk_table
                    .clone()
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
                column
                    .fk_column
                    .clone()
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
            ]);
        }
    }
    rs
}

fn sys_constraints(ctx: &CatalogContext) -> ResultSet {
    let mut rs = ResultSet::new(vec![
        "table_name".into(),
        "column_name".into(),
        "constraint_type".into(),
        "fk_table".into(),
        "fk_column".into(),
    ]);
    for table in ctx.tenant.tables.values() {
        for column in &table.columns {
            if column.constraint == ColumnConstraint::None {
                continue;
            }
            rs.push_row(vec![
                Value::Text(table.name.clone()),
                Value::Text(column.name.clone()),
                Value::Text(column.constraint.as_str().to_string()),
                column
                    .fk_table
                    .clone()
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
                column
                    .fk_column
                    .clone()
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
            ]);
        }
    }
    rs
}

fn sys_views(ctx: &CatalogContext) -> ResultSet {
    let mut rs = ResultSet::new(vec![
        "schema".into(),
        "name".into(),
        "sql_text".into(),
        "created_at".into(),
    ]);
    for view in ctx.tenant.views.values() {
        rs.push_row(vec![
            Value::Text(ctx.tenant_name.to_string()),
            Value::Text(view.name.clone()),
            Value::Text(view.sql.clone()),
            Value::Timestamp(view.created_at),
        ]);
    }
    rs
}

fn sys_functions(ctx: &CatalogContext) -> ResultSet {
    let mut rs = ResultSet::new(vec![
        "name".into(),
        "function_type".into(),
        "language".into(),
    ]);
    for info in ctx.functions.catalog() {
        rs.push_row(vec![
            Value::Text(info.name),
            Value::Text(info.function_type.to_string()),
            Value::Text(info.language.to_string()),
        ]);
    }
    rs
}

fn key_value_table(entries: Vec<(String, Value)>) -> ResultSet {
    let mut rs = ResultSet::new(vec!["key".into(), "value".into()]);
    for (key, value) in entries {
        rs.push_row(vec![Value::Text(key), value]);
    }
    rs
}

fn sys_status(ctx: &CatalogContext) -> ResultSet {
    let uptime = Utc::now()
        .signed_duration_since(ctx.started_at)
        .num_seconds();
    key_value_table(vec![
        ("version".into(), Value::Text(env!("CARGO_PKG_VERSION").into())),
        ("started_at".into(), Value::Timestamp(ctx.started_at)),
        ("uptime_seconds".into(), Value::Int(uptime)),
        ("tenant".into(), Value::Text(ctx.tenant_name.to_string())),
        (
            "tables".into(),
            Value::Int(ctx.tenant.tables.len() as i64),
        ),
        ("tenants".into(), Value::Int(ctx.tenant_count as i64)),
    ])
}

fn sys_memory(ctx: &CatalogContext) -> ResultSet {
    let total_rows: usize = ctx.tenant.tables.values().map(|t| t.rows.len()).sum();
    let total_cells: usize = ctx
        .tenant
        .tables
        .values()
        .map(|t| t.rows.len() * t.columns.len())
        .sum();
    key_value_table(vec![
        (
            "tables".into(),
            Value::Int(ctx.tenant.tables.len() as i64),
        ),
        ("total_rows".into(), Value::Int(total_rows as i64)),
        ("total_cells".into(), Value::Int(total_cells as i64)),
    ])
}

fn sys_storage(ctx: &CatalogContext) -> ResultSet {
    key_value_table(vec![
        ("engine".into(), Value::Text("memory".into())),
        ("tenants".into(), Value::Int(ctx.tenant_count as i64)),
        (
            "views".into(),
            Value::Int(ctx.tenant.views.len() as i64),
        ),
    ])
}

fn sys_config(ctx: &CatalogContext) -> ResultSet {
    let stats = ctx.cache.stats();
    key_value_table(vec![
        (
            "cache_capacity".into(),
            Value::Int(ctx.config.cache_capacity as i64),
        ),
        ("cache_size".into(), Value::Int(stats.size as i64)),
        ("cache_hits".into(), Value::Int(stats.hits as i64)),
        ("cache_misses".into(), Value::Int(stats.misses as i64)),
        (
            "default_tenant".into(),
            Value::Text(ctx.config.default_tenant.clone()),
        ),
    ])
}
