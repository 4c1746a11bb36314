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

//! The tree-walking executor.
//!
//! [`Engine`] owns the storage, the compile cache, and the function
//! registries. Statements are executed directly against the AST, composing
//! the relational operators bottom-up: FROM and joins, WHERE, grouping and
//! HAVING, the window pass, projection, ORDER BY, LIMIT/OFFSET, and finally
//! set operations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ast::{
    AlterTableOperation, Assignment, ColumnDef, ColumnOption, DataType, Expr, Function,
    FunctionArg, InsertSource, ObjectName, ObjectType, OrderByExpr, Query, Select, SelectItem,
    SetExpr, SetOperator, Statement, TableFactor,
};
use crate::cache::{StatementCache, DEFAULT_CACHE_CAPACITY};
use crate::catalog;
use crate::error::{Error, Result};
use crate::eval::{eval_expr, eval_predicate};
use crate::functions::{FunctionRegistry, TableFunctionContext};
use crate::row::{ResultSet, RowMap};
use crate::storage::{Column, ColumnConstraint, Database, Table, Tenant, View, DEFAULT_TENANT};
use crate::value::Value;

mod join;
mod window;

use join::execute_join;
use window::compute_window;

/// Nesting limit for views referencing views.
const MAX_VIEW_DEPTH: usize = 16;

/// A cloneable cancellation token. Operators check it at loop boundaries
/// and return [`Error::Canceled`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Engine construction knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub default_tenant: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            default_tenant: DEFAULT_TENANT.to_string(),
        }
    }
}

/// The embeddable SQL engine: storage, compile cache, and registries.
pub struct Engine {
    db: Database,
    cache: StatementCache,
    functions: Arc<FunctionRegistry>,
    config: EngineConfig,
    started_at: DateTime<Utc>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            db: Database::new(),
            cache: StatementCache::new(config.cache_capacity),
            functions: Arc::new(FunctionRegistry::standard()),
            config,
            started_at: Utc::now(),
        }
    }

    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes one statement against the default tenant.
    pub fn execute(&self, sql: &str) -> Result<ResultSet> {
        let tenant = self.config.default_tenant.clone();
        self.execute_on(&tenant, sql)
    }

    /// Executes one statement against `tenant`.
    pub fn execute_on(&self, tenant: &str, sql: &str) -> Result<ResultSet> {
        self.execute_with_cancel(tenant, sql, &CancelToken::new())
    }

    /// Executes one statement, checking `cancel` at operator loop
    /// boundaries.
    pub fn execute_with_cancel(
        &self,
        tenant: &str,
        sql: &str,
        cancel: &CancelToken,
    ) -> Result<ResultSet> {
        let compiled = self.cache.compile(sql)?;
        debug!("executing on tenant {tenant:?}: {sql}");
        let tenant_arc = self.db.tenant(tenant);
        match &compiled.statement {
            Statement::Query(query) => {
                let guard = tenant_arc.read();
                let mut ctx = QueryContext {
                    engine: self,
                    tenant: &guard,
                    tenant_name: tenant,
                    cancel,
                    ctes: HashMap::new(),
                    depth: 0,
                };
                Ok(ctx.run_query(query)?.into_result_set())
            }
            statement => {
                let mut guard = tenant_arc.write();
                self.execute_write(&mut guard, tenant, cancel, statement)
            }
        }
    }

    // ------------------------------------------------------------------
    // DDL / DML
    // ------------------------------------------------------------------

    fn execute_write(
        &self,
        tenant: &mut Tenant,
        tenant_name: &str,
        cancel: &CancelToken,
        statement: &Statement,
    ) -> Result<ResultSet> {
        match statement {
            Statement::CreateTable {
                name,
                temporary,
                columns,
                query,
            } => self.create_table(tenant, tenant_name, cancel, name, *temporary, columns, query),
            Statement::CreateView { name, query } => {
                let key = name.key();
                if tenant.views.contains_key(&key) || tenant.tables.contains_key(&key) {
                    return Err(Error::Constraint(format!("{key:?} already exists")));
                }
                tenant.views.insert(
                    key,
                    View {
                        name: name.to_string(),
                        sql: query.to_string(),
                        created_at: Utc::now(),
                    },
                );
                Ok(ResultSet::default())
            }
            Statement::CreateIndex(index) => {
                // Accepted for compatibility; there are no physical indexes.
                debug!("ignoring CREATE INDEX {index}");
                Ok(ResultSet::default())
            }
            Statement::AlterTable { name, operation } => {
                let AlterTableOperation::AddColumn { column_def } = operation;
                let table = tenant
                    .table_mut(&name.key())
                    .ok_or_else(|| Error::Name(format!("unknown table {}", name.key())))?;
                if table.column_index(&column_def.name.key()).is_some() {
                    return Err(Error::Constraint(format!(
                        "column {} already exists",
                        column_def.name
                    )));
                }
                table.columns.push(column_from_def(column_def));
                for row in &mut table.rows {
                    row.push(Value::Null);
                }
                table.bump_version();
                Ok(ResultSet::default())
            }
            Statement::Drop {
                object_type,
                if_exists,
                name,
            } => {
                let key = name.key();
                let removed = match object_type {
                    ObjectType::Table => tenant.tables.shift_remove(&key).is_some(),
                    ObjectType::View => tenant.views.shift_remove(&key).is_some(),
                };
                if !removed && !if_exists {
                    return Err(Error::Name(format!("unknown {object_type} {key:?}")));
                }
                Ok(ResultSet::default())
            }
            Statement::Insert {
                table_name,
                columns,
                source,
            } => self.insert(tenant, tenant_name, cancel, table_name, columns, source),
            Statement::Update {
                table_name,
                assignments,
                selection,
            } => self.update(tenant, cancel, table_name, assignments, selection.as_ref()),
            Statement::Delete {
                table_name,
                selection,
            } => self.delete(tenant, cancel, table_name, selection.as_ref()),
            Statement::Query(_) => unreachable!("queries take the read path"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_table(
        &self,
        tenant: &mut Tenant,
        tenant_name: &str,
        cancel: &CancelToken,
        name: &ObjectName,
        temporary: bool,
        columns: &[ColumnDef],
        query: &Option<Box<Query>>,
    ) -> Result<ResultSet> {
        let key = name.key();
        if tenant.tables.contains_key(&key) || tenant.views.contains_key(&key) {
            return Err(Error::Constraint(format!("table {key:?} already exists")));
        }

        let table = match query {
            None => Table::new(name.to_string(), columns.iter().map(column_from_def).collect(), temporary),
            Some(query) => {
                // CREATE TABLE AS SELECT: materialize, then infer columns
                // from the first row's value types.
                let mut ctx = QueryContext {
                    engine: self,
                    tenant: &*tenant,
                    tenant_name,
                    cancel,
                    ctes: HashMap::new(),
                    depth: 0,
                };
                let relation = ctx.run_query(query)?;
                let columns = relation
                    .columns
                    .iter()
                    .map(|col| {
                        let data_type = relation
                            .rows
                            .first()
                            .and_then(|row| row.get(&col.to_lowercase()))
                            .map(infer_data_type)
                            .unwrap_or(DataType::Interface);
                        Column::new(col.clone(), data_type)
                    })
                    .collect();
                let mut table = Table::new(name.to_string(), columns, temporary);
                for row in &relation.rows {
                    table.rows.push(relation.values(row));
                }
                table
            }
        };
        tenant.tables.insert(key, table);
        Ok(ResultSet::default())
    }

    fn insert(
        &self,
        tenant: &mut Tenant,
        tenant_name: &str,
        cancel: &CancelToken,
        table_name: &ObjectName,
        columns: &[crate::ast::Ident],
        source: &InsertSource,
    ) -> Result<ResultSet> {
        // Evaluate the input rows first; nothing is written until every row
        // passes coercion and constraint checks, which makes a multi-row
        // INSERT all-or-nothing.
        let input_rows: Vec<Vec<Value>> = match source {
            InsertSource::Values(rows) => {
                let empty = RowMap::new();
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    cancel.check()?;
                    let mut values = Vec::with_capacity(row.len());
                    for expr in row {
                        values.push(eval_expr(&self.functions, &empty, expr)?);
                    }
                    out.push(values);
                }
                out
            }
            InsertSource::Query(query) => {
                let mut ctx = QueryContext {
                    engine: self,
                    tenant: &*tenant,
                    tenant_name,
                    cancel,
                    ctes: HashMap::new(),
                    depth: 0,
                };
                let relation = ctx.run_query(query)?;
                relation.rows.iter().map(|row| relation.values(row)).collect()
            }
        };

        let table = tenant
            .table(&table_name.key())
            .ok_or_else(|| Error::Name(format!("unknown table {}", table_name.key())))?;

        // Map the written column list (or the full schema) to positions.
        let target_indices: Vec<usize> = if columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            columns
                .iter()
                .map(|col| {
                    table
                        .column_index(&col.key())
                        .ok_or_else(|| Error::Name(format!("unknown column {}", col)))
                })
                .collect::<Result<_>>()?
        };

        let mut staged: Vec<Vec<Value>> = Vec::with_capacity(input_rows.len());
        for input in &input_rows {
            cancel.check()?;
            if input.len() != target_indices.len() {
                return Err(Error::Constraint(format!(
                    "INSERT arity mismatch: expected {} values, got {}",
                    target_indices.len(),
                    input.len()
                )));
            }
            let mut row = vec![Value::Null; table.columns.len()];
            for (value, &idx) in input.iter().zip(&target_indices) {
                row[idx] = coerce_to_column(value.clone(), &table.columns[idx])?;
            }
            staged.push(row);
        }

        check_constraints(tenant, table, &staged)?;

        let count = staged.len();
        let table = tenant
            .table_mut(&table_name.key())
            .ok_or_else(|| Error::Name(format!("unknown table {}", table_name.key())))?;
        table.rows.extend(staged);
        table.bump_version();
        Ok(affected(count))
    }

    fn update(
        &self,
        tenant: &mut Tenant,
        cancel: &CancelToken,
        table_name: &ObjectName,
        assignments: &[Assignment],
        selection: Option<&Expr>,
    ) -> Result<ResultSet> {
        let table = tenant
            .table(&table_name.key())
            .ok_or_else(|| Error::Name(format!("unknown table {}", table_name.key())))?;

        let assignment_indices: Vec<usize> = assignments
            .iter()
            .map(|a| {
                table
                    .column_index(&a.column.key())
                    .ok_or_else(|| Error::Name(format!("unknown column {}", a.column)))
            })
            .collect::<Result<_>>()?;

        // Build the updated row set without touching the table, then
        // validate it, then swap it in. A constraint violation leaves the
        // table untouched.
        let mut new_rows = Vec::with_capacity(table.rows.len());
        let mut count = 0usize;
        for row in &table.rows {
            cancel.check()?;
            let map = table_row_map(table, row);
            if match selection {
                Some(predicate) => eval_predicate(&self.functions, &map, predicate)?.is_true(),
                None => true,
            } {
                let mut updated = row.clone();
                for (assignment, &idx) in assignments.iter().zip(&assignment_indices) {
                    let value = eval_expr(&self.functions, &map, &assignment.value)?;
                    updated[idx] = coerce_to_column(value, &table.columns[idx])?;
                }
                new_rows.push(updated);
                count += 1;
            } else {
                new_rows.push(row.clone());
            }
        }

        let empty_base = Table {
            rows: Vec::new(),
            ..table.clone()
        };
        check_constraints(tenant, &empty_base, &new_rows)?;

        let table = tenant
            .table_mut(&table_name.key())
            .ok_or_else(|| Error::Name(format!("unknown table {}", table_name.key())))?;
        table.rows = new_rows;
        table.bump_version();
        Ok(affected(count))
    }

    fn delete(
        &self,
        tenant: &mut Tenant,
        cancel: &CancelToken,
        table_name: &ObjectName,
        selection: Option<&Expr>,
    ) -> Result<ResultSet> {
        let table = tenant
            .table(&table_name.key())
            .ok_or_else(|| Error::Name(format!("unknown table {}", table_name.key())))?;

        let mut keep = Vec::with_capacity(table.rows.len());
        let mut count = 0usize;
        for row in &table.rows {
            cancel.check()?;
            let map = table_row_map(table, row);
            let matched = match selection {
                Some(predicate) => eval_predicate(&self.functions, &map, predicate)?.is_true(),
                None => true,
            };
            if matched {
                count += 1;
            } else {
                keep.push(row.clone());
            }
        }

        let table = tenant
            .table_mut(&table_name.key())
            .ok_or_else(|| Error::Name(format!("unknown table {}", table_name.key())))?;
        table.rows = keep;
        table.bump_version();
        Ok(affected(count))
    }
}

fn affected(count: usize) -> ResultSet {
    let mut rs = ResultSet::new(vec!["rows_affected".to_string()]);
    rs.push_row(vec![Value::Int(count as i64)]);
    rs
}

fn column_from_def(def: &ColumnDef) -> Column {
    let mut column = Column::new(def.name.value.clone(), def.data_type);
    for option in &def.options {
        match option {
            ColumnOption::PrimaryKey => {
                column.constraint = ColumnConstraint::PrimaryKey;
                column.not_null = true;
            }
            ColumnOption::Unique => column.constraint = ColumnConstraint::Unique,
            ColumnOption::NotNull => column.not_null = true,
            ColumnOption::References { table, column: col } => {
                if def.data_type == DataType::Pointer {
                    column.pointer_target = Some(table.key());
                } else {
                    column.constraint = ColumnConstraint::ForeignKey;
                    column.fk_table = Some(table.key());
                    column.fk_column = Some(col.key());
                }
            }
        }
    }
    column
}

fn infer_data_type(value: &Value) -> DataType {
    match value {
        Value::Int(_) => DataType::Int64,
        Value::Float(_) => DataType::Float64,
        Value::Bool(_) => DataType::Bool,
        Value::Text(_) => DataType::Text,
        Value::Bytes(_) => DataType::Interface,
        Value::Timestamp(_) => DataType::Timestamp,
        Value::Json(_) => DataType::Json,
        Value::Vector(_) => DataType::Vector,
        Value::Null => DataType::Interface,
    }
}

/// Coerces a value for storage into `column`; Null always passes (the
/// constraint checks decide whether it may stay).
fn coerce_to_column(value: Value, column: &Column) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(match column.data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::Duration
        | DataType::Pointer => Value::Int(value.as_int()?),
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let v = value.as_int()?;
            if v < 0 {
                return Err(Error::Type(format!(
                    "negative value for unsigned column {}",
                    column.name
                )));
            }
            Value::Int(v)
        }
        DataType::Float32 | DataType::Float64 => Value::Float(value.as_float()?),
        DataType::Text => Value::Text(value.as_text()),
        DataType::Bool => Value::Bool(value.as_bool()?),
        DataType::Date | DataType::DateTime | DataType::Timestamp => {
            Value::Timestamp(value.as_timestamp()?)
        }
        DataType::Json | DataType::Map => match &value {
            Value::Json(_) => value,
            Value::Text(s) => Value::Json(
                serde_json::from_str(s)
                    .map_err(|e| Error::Type(format!("invalid JSON for {}: {e}", column.name)))?,
            ),
            other => Value::Json(
                serde_json::to_value(other)
                    .map_err(|e| Error::Type(format!("invalid JSON for {}: {e}", column.name)))?,
            ),
        },
        DataType::Array | DataType::Vector => Value::Vector(value.as_vector()?),
        DataType::Interface => value,
    })
}

/// Validates PK/UNIQUE uniqueness, NOT NULL, and FK presence for `staged`
/// appended after `base`'s rows.
fn check_constraints(tenant: &Tenant, base: &Table, staged: &[Vec<Value>]) -> Result<()> {
    for (idx, column) in base.columns.iter().enumerate() {
        let must_be_unique = matches!(
            column.constraint,
            ColumnConstraint::PrimaryKey | ColumnConstraint::Unique
        );
        let not_null = column.not_null || column.constraint == ColumnConstraint::PrimaryKey;

        let mut seen: HashSet<String> = HashSet::new();
        if must_be_unique {
            for row in &base.rows {
                if let Some(key) = row.get(idx).and_then(Value::join_key) {
                    seen.insert(key);
                }
            }
        }

        for row in staged {
            let value = row.get(idx).unwrap_or(&Value::Null);
            if value.is_null() {
                if not_null {
                    return Err(Error::Constraint(format!(
                        "column {} may not be null",
                        column.name
                    )));
                }
                continue;
            }
            if must_be_unique {
                let key = value.join_key().unwrap_or_default();
                if !seen.insert(key) {
                    return Err(Error::Constraint(format!(
                        "duplicate value {value} for {} column {}",
                        column.constraint.as_str(),
                        column.name
                    )));
                }
            }
            if column.constraint == ColumnConstraint::ForeignKey {
                check_foreign_key(tenant, base, staged, column, value)?;
            }
        }
    }
    Ok(())
}

fn check_foreign_key(
    tenant: &Tenant,
    base: &Table,
    staged: &[Vec<Value>],
    column: &Column,
    value: &Value,
) -> Result<()> {
    let fk_table_name = column.fk_table.as_deref().unwrap_or_default();
    let fk_column_name = column.fk_column.as_deref().unwrap_or_default();

    // A self-referential key may point at a row in the same statement.
    let (target_columns, existing, extra): (&[Column], &[Vec<Value>], &[Vec<Value>]) =
        if fk_table_name == base.name.to_lowercase() {
            (&base.columns, &base.rows, staged)
        } else {
            let target = tenant.table(fk_table_name).ok_or_else(|| {
                Error::Name(format!("unknown foreign key table {fk_table_name:?}"))
            })?;
            (&target.columns, &target.rows, &[])
        };
    let target_idx = target_columns
        .iter()
        .position(|c| c.key() == fk_column_name)
        .ok_or_else(|| {
            Error::Name(format!(
                "unknown foreign key column {fk_table_name}.{fk_column_name}"
            ))
        })?;

    let found = existing
        .iter()
        .chain(extra.iter())
        .any(|row| matches!(row.get(target_idx), Some(v) if v.eq3(value).is_true()));
    if found {
        Ok(())
    } else {
        Err(Error::Constraint(format!(
            "foreign key value {value} not present in {fk_table_name}.{fk_column_name}"
        )))
    }
}

/// Builds the evaluator's plain-keyed view of a storage row.
fn table_row_map(table: &Table, row: &[Value]) -> RowMap {
    table
        .columns
        .iter()
        .zip(row)
        .map(|(column, value)| (column.key(), value.clone()))
        .collect()
}

// ----------------------------------------------------------------------
// Query execution
// ----------------------------------------------------------------------

/// An intermediate relation: display-cased column names (used by `*` and
/// positional set operations) and evaluator row maps.
#[derive(Debug, Clone, Default)]
pub(crate) struct Relation {
    pub columns: Vec<String>,
    pub rows: Vec<RowMap>,
}

impl Relation {
    /// One row's values in column order.
    pub(crate) fn values(&self, row: &RowMap) -> Vec<Value> {
        self.columns
            .iter()
            .map(|col| row.get(&col.to_lowercase()).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn into_result_set(self) -> ResultSet {
        let mut rs = ResultSet::new(self.columns.clone());
        for row in self.rows {
            let values = self
                .columns
                .iter()
                .map(|col| row.get(&col.to_lowercase()).cloned().unwrap_or(Value::Null))
                .collect();
            rs.push_row(values);
        }
        rs
    }
}

struct QueryContext<'a> {
    engine: &'a Engine,
    tenant: &'a Tenant,
    tenant_name: &'a str,
    cancel: &'a CancelToken,
    ctes: HashMap<String, Relation>,
    depth: usize,
}

impl<'a> QueryContext<'a> {
    fn functions(&self) -> &FunctionRegistry {
        &self.engine.functions
    }

    fn run_query(&mut self, query: &Query) -> Result<Relation> {
        if let Some(with) = &query.with {
            if with.recursive {
                return Err(Error::State("RECURSIVE CTEs are not supported".into()));
            }
            for cte in &with.cte_tables {
                let relation = self.run_query(&cte.query)?;
                self.ctes.insert(cte.alias.key(), relation);
            }
        }
        self.run_set_expr(&query.body)
    }

    fn run_set_expr(&mut self, body: &SetExpr) -> Result<Relation> {
        match body {
            SetExpr::Select(select) => self.run_select(select),
            SetExpr::SetOperation {
                op,
                all,
                left,
                right,
            } => {
                let left = self.run_set_expr(left)?;
                let right = self.run_set_expr(right)?;
                if left.columns.len() != right.columns.len() {
                    return Err(Error::Type(format!(
                        "set operation arity mismatch: {} vs {} columns",
                        left.columns.len(),
                        right.columns.len()
                    )));
                }
                self.combine(left, right, *op, *all)
            }
        }
    }

    /// UNION/EXCEPT/INTERSECT. Columns align by position and take the left
    /// side's names; dedup keys are the tuple of canonical value forms.
    fn combine(
        &self,
        left: Relation,
        right: Relation,
        op: SetOperator,
        all: bool,
    ) -> Result<Relation> {
        let left_keys: Vec<String> = left.columns.iter().map(|c| c.to_lowercase()).collect();
        let right_keys: Vec<String> = right.columns.iter().map(|c| c.to_lowercase()).collect();

        // The right side is re-keyed to the left's column names by position.
        let right_rows: Vec<RowMap> = right
            .rows
            .into_iter()
            .map(|row| {
                left_keys
                    .iter()
                    .cloned()
                    .zip(
                        right_keys
                            .iter()
                            .map(|k| row.get(k).cloned().unwrap_or(Value::Null)),
                    )
                    .collect()
            })
            .collect();

        let row_key = |row: &RowMap| -> String {
            left_keys
                .iter()
                .map(|k| row.get(k).map(Value::group_key).unwrap_or_default())
                .join("\u{1}")
        };

        let mut rows = Vec::new();
        match op {
            SetOperator::Union if all => {
                rows = left.rows;
                rows.extend(right_rows);
            }
            SetOperator::Union => {
                let mut seen = HashSet::new();
                for row in left.rows.into_iter().chain(right_rows) {
                    self.cancel.check()?;
                    if seen.insert(row_key(&row)) {
                        rows.push(row);
                    }
                }
            }
            SetOperator::Except => {
                let excluded: HashSet<String> = right_rows.iter().map(&row_key).collect();
                let mut seen = HashSet::new();
                for row in left.rows {
                    self.cancel.check()?;
                    let key = row_key(&row);
                    if !excluded.contains(&key) && seen.insert(key) {
                        rows.push(row);
                    }
                }
            }
            SetOperator::Intersect => {
                let available: HashSet<String> = right_rows.iter().map(&row_key).collect();
                let mut seen = HashSet::new();
                for row in left.rows {
                    self.cancel.check()?;
                    let key = row_key(&row);
                    if available.contains(&key) && seen.insert(key) {
                        rows.push(row);
                    }
                }
            }
        }
        Ok(Relation {
            columns: left.columns,
            rows,
        })
    }

    fn run_select(&mut self, select: &Select) -> Result<Relation> {
        // FROM and the join chain.
        let mut relation = match &select.from {
            None => Relation {
                columns: Vec::new(),
                rows: vec![RowMap::new()],
            },
            Some(from) => {
                let (base, qualifier) = self.resolve_factor(&from.relation)?;
                if from.joins.is_empty() {
                    add_qualified_keys(base, qualifier.as_deref())
                } else {
                    let mut left = qualify_relation(base, qualifier.as_deref());
                    for join in &from.joins {
                        let (right, right_qualifier) = self.resolve_factor(&join.relation)?;
                        let right = qualify_relation(right, right_qualifier.as_deref());
                        left = execute_join(
                            self.functions(),
                            self.cancel,
                            left,
                            right,
                            &join.join_operator,
                        )?;
                    }
                    left
                }
            }
        };

        // WHERE.
        if let Some(predicate) = &select.selection {
            let mut kept = Vec::with_capacity(relation.rows.len());
            for row in relation.rows {
                self.cancel.check()?;
                if eval_predicate(self.functions(), &row, predicate)?.is_true() {
                    kept.push(row);
                }
            }
            relation.rows = kept;
        }

        // GROUP BY + aggregates + HAVING.
        let aggregate_calls = self.collect_aggregate_calls(select);
        if !select.group_by.is_empty() || !aggregate_calls.is_empty() {
            relation = self.aggregate(relation, select, &aggregate_calls)?;
        } else if select.having.is_some() {
            return Err(Error::State(
                "HAVING requires GROUP BY or an aggregate".into(),
            ));
        }

        // Window pass: computed values are injected under the call's
        // printed form before projection reads them.
        let window_calls = collect_window_calls(select);
        for call in &window_calls {
            let values = compute_window(self.functions(), &relation.rows, call)?;
            let key = Expr::Function(call.clone()).result_key();
            for (row, value) in relation.rows.iter_mut().zip(values) {
                row.insert(key.clone(), value);
            }
        }

        // Projection.
        let (columns, mut projected) = self.project(&relation, &select.projection)?;

        // DISTINCT.
        if select.distinct {
            let mut seen = HashSet::new();
            projected.retain(|(row, _)| {
                let key = columns
                    .iter()
                    .map(|c| {
                        row.get(&c.to_lowercase())
                            .map(Value::group_key)
                            .unwrap_or_default()
                    })
                    .join("\u{1}");
                seen.insert(key)
            });
        }

        // ORDER BY evaluates against the source row extended with the
        // projected aliases, so both input columns and output names work.
        if !select.order_by.is_empty() {
            let merged: Vec<RowMap> = projected
                .iter()
                .map(|(out, source)| {
                    let mut merged = source.clone();
                    for (k, v) in out {
                        merged.insert(k.clone(), v.clone());
                    }
                    merged
                })
                .collect();
            let order = sort_rows_stable(
                self.functions(),
                &merged,
                (0..projected.len()).collect(),
                &select.order_by,
            )?;
            projected = order.into_iter().map(|i| projected[i].clone()).collect();
        }

        // LIMIT / OFFSET.
        let offset = self.bound(&select.offset, "OFFSET")?;
        let limit = self.bound(&select.limit, "LIMIT")?;
        let mut rows: Vec<RowMap> = projected.into_iter().map(|(row, _)| row).collect();
        if let Some(offset) = offset {
            rows = rows.split_off(offset.min(rows.len()));
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }

        Ok(Relation { columns, rows })
    }

    fn bound(&self, expr: &Option<Expr>, clause: &str) -> Result<Option<usize>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        let value = eval_expr(self.functions(), &RowMap::new(), expr)?;
        let n = value.as_int()?;
        if n < 0 {
            return Err(Error::Argument(format!("{clause} may not be negative")));
        }
        Ok(Some(n as usize))
    }

    /// Resolves a FROM factor to a plain-keyed relation and its qualifier
    /// (the alias, or the bare object name).
    fn resolve_factor(&mut self, factor: &TableFactor) -> Result<(Relation, Option<String>)> {
        match factor {
            TableFactor::Table { name, alias } => {
                let key = name.key();
                let qualifier = alias
                    .as_ref()
                    .map(|a| a.value.clone())
                    .or_else(|| name.0.last().map(|i| i.value.clone()));

                if let Some(relation) = self.ctes.get(&key) {
                    return Ok((relation.clone(), qualifier));
                }
                if key.starts_with("sys.") || key.starts_with("catalog.") {
                    let rs = catalog::virtual_table(&key, &self.catalog_context())?;
                    return Ok((result_set_to_relation(rs), qualifier));
                }
                if let Some(table) = self.tenant.table(&key) {
                    let columns = table.columns.iter().map(|c| c.name.clone()).collect();
                    let rows = table
                        .rows
                        .iter()
                        .map(|row| table_row_map(table, row))
                        .collect();
                    return Ok((Relation { columns, rows }, qualifier));
                }
                if let Some(view) = self.tenant.views.get(&key) {
                    if self.depth >= MAX_VIEW_DEPTH {
                        return Err(Error::State(format!(
                            "view nesting deeper than {MAX_VIEW_DEPTH}"
                        )));
                    }
                    let compiled = self.engine.cache.compile(&view.sql)?;
                    let Statement::Query(query) = &compiled.statement else {
                        return Err(Error::State(format!("view {key:?} is not a SELECT")));
                    };
                    let mut nested = QueryContext {
                        engine: self.engine,
                        tenant: self.tenant,
                        tenant_name: self.tenant_name,
                        cancel: self.cancel,
                        ctes: HashMap::new(),
                        depth: self.depth + 1,
                    };
                    return Ok((nested.run_query(query)?, qualifier));
                }
                Err(Error::Name(format!("unknown table {key:?}")))
            }
            TableFactor::Function { name, args, alias } => {
                let key = name.key();
                let qualifier = alias
                    .as_ref()
                    .map(|a| a.value.clone())
                    .or_else(|| name.0.last().map(|i| i.value.clone()));
                let empty = RowMap::new();
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval_expr(self.functions(), &empty, arg)?);
                }
                let ctx = TableFunctionContext {
                    tenant: self.tenant,
                };
                let rs = self
                    .functions()
                    .execute_table_function(&key, &ctx, &values)?;
                Ok((result_set_to_relation(rs), qualifier))
            }
        }
    }

    fn catalog_context(&self) -> catalog::CatalogContext<'_> {
        catalog::CatalogContext {
            tenant: self.tenant,
            tenant_name: self.tenant_name,
            functions: self.functions(),
            cache: &self.engine.cache,
            config: &self.engine.config,
            started_at: self.engine.started_at,
            tenant_count: self.engine.db.tenant_names().len(),
        }
    }

    /// Unique aggregate calls reachable from the projection and HAVING.
    fn collect_aggregate_calls(&self, select: &Select) -> Vec<Function> {
        let mut calls: Vec<Function> = Vec::new();
        let mut seen = HashSet::new();
        let mut visit = |expr: &Expr| {
            if let Expr::Function(f) = expr {
                if f.over.is_none()
                    && self.functions().is_aggregate(&f.name.key())
                    && seen.insert(Expr::Function(f.clone()).result_key())
                {
                    calls.push(f.clone());
                }
            }
        };
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    walk_expr(expr, &mut visit)
                }
                SelectItem::Wildcard => {}
            }
        }
        if let Some(having) = &select.having {
            walk_expr(having, &mut visit);
        }
        for order in &select.order_by {
            walk_expr(&order.expr, &mut visit);
        }
        calls
    }

    /// Groups rows, runs the accumulators, applies HAVING, and returns one
    /// row per group: the group's first row extended with the finalized
    /// aggregate values keyed by each call's printed form.
    fn aggregate(
        &self,
        relation: Relation,
        select: &Select,
        calls: &[Function],
    ) -> Result<Relation> {
        struct Group {
            representative: RowMap,
            accumulators: Vec<Box<dyn crate::functions::Accumulator>>,
        }

        let make_accumulators = || -> Result<Vec<Box<dyn crate::functions::Accumulator>>> {
            calls
                .iter()
                .map(|call| {
                    self.functions()
                        .make_accumulator(&call.name.key(), call.distinct)
                })
                .collect()
        };

        let mut groups: IndexMap<String, Group> = IndexMap::new();
        for row in &relation.rows {
            self.cancel.check()?;
            let mut key = String::new();
            for expr in &select.group_by {
                key.push_str(&eval_expr(self.functions(), row, expr)?.group_key());
                key.push('\u{1}');
            }
            let group = match groups.entry(key) {
                indexmap::map::Entry::Occupied(e) => e.into_mut(),
                indexmap::map::Entry::Vacant(e) => e.insert(Group {
                    representative: row.clone(),
                    accumulators: make_accumulators()?,
                }),
            };
            for (call, accumulator) in calls.iter().zip(&mut group.accumulators) {
                let args = self.aggregate_args(row, call)?;
                accumulator.step(&args)?;
            }
        }

        // Aggregates without GROUP BY always produce one group, even over
        // empty input.
        if groups.is_empty() && select.group_by.is_empty() {
            let representative: RowMap = relation
                .columns
                .iter()
                .map(|c| (c.to_lowercase(), Value::Null))
                .collect();
            groups.insert(
                String::new(),
                Group {
                    representative,
                    accumulators: make_accumulators()?,
                },
            );
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (_, group) in groups {
            self.cancel.check()?;
            let mut row = group.representative;
            for (call, accumulator) in calls.iter().zip(group.accumulators) {
                let key = Expr::Function(call.clone()).result_key();
                row.insert(key, accumulator.finalize()?);
            }
            if let Some(having) = &select.having {
                if !eval_predicate(self.functions(), &row, having)?.is_true() {
                    continue;
                }
            }
            rows.push(row);
        }
        Ok(Relation {
            columns: relation.columns,
            rows,
        })
    }

    fn aggregate_args(&self, row: &RowMap, call: &Function) -> Result<Vec<Value>> {
        if call.args.len() == 1 && call.args[0] == FunctionArg::Wildcard {
            return Ok(Vec::new());
        }
        call.args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Wildcard => Err(Error::Argument(format!(
                    "unexpected * argument to {}",
                    call.name
                ))),
                FunctionArg::Expr(expr) => eval_expr(self.functions(), row, expr),
            })
            .collect()
    }

    /// Evaluates the select list, returning the output column names and
    /// (output row, source row) pairs. The source rows ride along for
    /// ORDER BY.
    fn project(
        &self,
        relation: &Relation,
        projection: &[SelectItem],
    ) -> Result<(Vec<String>, Vec<(RowMap, RowMap)>)> {
        let mut columns: Vec<String> = Vec::new();
        for item in projection {
            match item {
                SelectItem::Wildcard => columns.extend(relation.columns.iter().cloned()),
                SelectItem::UnnamedExpr(expr) => columns.push(projected_name(expr)),
                SelectItem::ExprWithAlias { alias, .. } => columns.push(alias.value.clone()),
            }
        }

        let mut out = Vec::with_capacity(relation.rows.len());
        for row in &relation.rows {
            self.cancel.check()?;
            let mut projected = RowMap::with_capacity(columns.len());
            for item in projection {
                match item {
                    SelectItem::Wildcard => {
                        for col in &relation.columns {
                            let key = col.to_lowercase();
                            let value = row.get(&key).cloned().unwrap_or(Value::Null);
                            projected.insert(key, value);
                        }
                    }
                    SelectItem::UnnamedExpr(expr) => {
                        let value = eval_expr(self.functions(), row, expr)?;
                        projected.insert(projected_name(expr).to_lowercase(), value);
                    }
                    SelectItem::ExprWithAlias { expr, alias } => {
                        let value = eval_expr(self.functions(), row, expr)?;
                        projected.insert(alias.key(), value);
                    }
                }
            }
            out.push((projected, row.clone()));
        }
        Ok((columns, out))
    }
}

/// The output column name of an unaliased projection expression.
fn projected_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .iter()
            .map(|p| p.value.clone())
            .collect::<Vec<_>>()
            .join("."),
        other => other.to_string(),
    }
}

/// Walks an expression tree depth-first.
fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) | Expr::Value(_) => {}
        Expr::IsNull(inner) | Expr::IsNotNull(inner) | Expr::Nested(inner) => {
            walk_expr(inner, visit)
        }
        Expr::UnaryOp { expr, .. } => walk_expr(expr, visit),
        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        Expr::InList { expr, list, .. } => {
            walk_expr(expr, visit);
            for item in list {
                walk_expr(item, visit);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, visit);
            walk_expr(low, visit);
            walk_expr(high, visit);
        }
        Expr::Like { expr, pattern, .. } => {
            walk_expr(expr, visit);
            walk_expr(pattern, visit);
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                walk_expr(operand, visit);
            }
            for expr in conditions.iter().chain(results) {
                walk_expr(expr, visit);
            }
            if let Some(else_result) = else_result {
                walk_expr(else_result, visit);
            }
        }
        Expr::Function(f) => {
            for arg in &f.args {
                if let FunctionArg::Expr(expr) = arg {
                    walk_expr(expr, visit);
                }
            }
        }
    }
}

/// Unique window calls reachable from the select list.
fn collect_window_calls(select: &Select) -> Vec<Function> {
    let mut calls = Vec::new();
    let mut seen = HashSet::new();
    for item in &select.projection {
        let expr = match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => expr,
            SelectItem::Wildcard => continue,
        };
        walk_expr(expr, &mut |e| {
            if let Expr::Function(f) = e {
                if f.over.is_some() && seen.insert(Expr::Function(f.clone()).result_key()) {
                    calls.push(f.clone());
                }
            }
        });
    }
    calls
}

/// Adds `qualifier.col` keys alongside the plain ones; `columns` stays
/// plain (single-relation scope).
fn add_qualified_keys(mut relation: Relation, qualifier: Option<&str>) -> Relation {
    let Some(qualifier) = qualifier else {
        return relation;
    };
    let qualifier = qualifier.to_lowercase();
    let keys: Vec<String> = relation
        .columns
        .iter()
        .map(|c| c.to_lowercase())
        .collect();
    for row in &mut relation.rows {
        for key in &keys {
            if let Some(value) = row.get(key).cloned() {
                row.insert(format!("{qualifier}.{key}"), value);
            }
        }
    }
    relation
}

/// Prepares a relation for a join: rows get qualified keys and the column
/// list becomes the qualified display names, so `*` expands qualified.
fn qualify_relation(relation: Relation, qualifier: Option<&str>) -> Relation {
    let mut relation = add_qualified_keys(relation, qualifier);
    if let Some(qualifier) = qualifier {
        relation.columns = relation
            .columns
            .iter()
            .map(|c| format!("{qualifier}.{c}"))
            .collect();
    }
    relation
}

fn result_set_to_relation(rs: ResultSet) -> Relation {
    Relation {
        columns: rs.columns,
        rows: rs.rows,
    }
}

/// Stable sort of `indices` into `rows` by the ORDER BY keys. Nulls sort
/// last ascending and first descending; mixed-type keys compare by
/// canonical text.
pub(crate) fn sort_rows_stable(
    functions: &FunctionRegistry,
    rows: &[RowMap],
    indices: Vec<usize>,
    order_by: &[OrderByExpr],
) -> Result<Vec<usize>> {
    let mut keyed: Vec<(usize, Vec<Value>)> = Vec::with_capacity(indices.len());
    for idx in indices {
        let mut keys = Vec::with_capacity(order_by.len());
        for order in order_by {
            keys.push(eval_expr(functions, &rows[idx], &order.expr)?);
        }
        keyed.push((idx, keys));
    }
    keyed.sort_by(|(_, a), (_, b)| {
        for (order, (x, y)) in order_by.iter().zip(a.iter().zip(b)) {
            let asc = order.asc.unwrap_or(true);
            let ordering = match (x.is_null(), y.is_null()) {
                (true, true) => core::cmp::Ordering::Equal,
                (true, false) => {
                    if asc {
                        core::cmp::Ordering::Greater
                    } else {
                        core::cmp::Ordering::Less
                    }
                }
                (false, true) => {
                    if asc {
                        core::cmp::Ordering::Less
                    } else {
                        core::cmp::Ordering::Greater
                    }
                }
                (false, false) => {
                    let natural = x.compare(y);
                    if asc {
                        natural
                    } else {
                        natural.reverse()
                    }
                }
            };
            if ordering != core::cmp::Ordering::Equal {
                return ordering;
            }
        }
        core::cmp::Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(idx, _)| idx).collect())
}
