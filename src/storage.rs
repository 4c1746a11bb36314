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

//! The in-memory storage façade: per-tenant table registries.
//!
//! Tenants are isolation boundaries; a statement only ever sees one tenant.
//! Readers take the tenant's shared lock, writers (DDL/DML) the exclusive
//! lock, for the duration of the statement.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::ast::DataType;
use crate::value::Value;

/// The tenant used when the caller does not name one.
pub const DEFAULT_TENANT: &str = "default";

/// Column-level constraint kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColumnConstraint {
    None,
    PrimaryKey,
    Unique,
    ForeignKey,
}

impl ColumnConstraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnConstraint::None => "",
            ColumnConstraint::PrimaryKey => "PRIMARY KEY",
            ColumnConstraint::Unique => "UNIQUE",
            ColumnConstraint::ForeignKey => "FOREIGN KEY",
        }
    }
}

/// Column metadata. `name` keeps the written case; identity is
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub constraint: ColumnConstraint,
    /// Referenced table (lowercased) for FOREIGN KEY columns.
    pub fk_table: Option<String>,
    /// Referenced column (lowercased) for FOREIGN KEY columns.
    pub fk_column: Option<String>,
    /// Target table for POINTER columns.
    pub pointer_target: Option<String>,
    pub not_null: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Column {
            name: name.into(),
            data_type,
            constraint: ColumnConstraint::None,
            fk_table: None,
            fk_column: None,
            pointer_target: None,
            not_null: false,
        }
    }

    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// An in-memory table: column descriptors plus row vectors.
///
/// Invariants: every row's arity equals the column count; primary key
/// values are unique and non-null; foreign key values are null or present
/// in the referenced table's primary key column at insert time.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub is_temp: bool,
    /// Bumped on every mutation.
    pub version: u64,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, is_temp: bool) -> Self {
        Table {
            name: name.into(),
            columns,
            rows: Vec::new(),
            is_temp,
            version: 0,
        }
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let key = name.to_lowercase();
        self.columns.iter().position(|c| c.key() == key)
    }

    /// The index of the primary key column, if the table declares one.
    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.constraint == ColumnConstraint::PrimaryKey)
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// A stored view definition, replayed on reference.
#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    pub sql: String,
    pub created_at: DateTime<Utc>,
}

/// One tenant's tables and views, keyed by lowercased name in insertion
/// order.
#[derive(Debug, Default)]
pub struct Tenant {
    pub tables: IndexMap<String, Table>,
    pub views: IndexMap<String, View>,
}

impl Tenant {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(&name.to_lowercase())
    }
}

/// The engine-wide registry of tenants.
#[derive(Debug, Default)]
pub struct Database {
    tenants: RwLock<HashMap<String, Arc<RwLock<Tenant>>>>,
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    /// Fetches the tenant, creating an empty one on first use.
    pub fn tenant(&self, name: &str) -> Arc<RwLock<Tenant>> {
        if let Some(tenant) = self.tenants.read().get(name) {
            return Arc::clone(tenant);
        }
        let mut tenants = self.tenants.write();
        Arc::clone(
            tenants
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Tenant::default()))),
        )
    }

    /// Drops a tenant and everything in it.
    pub fn drop_tenant(&self, name: &str) -> bool {
        self.tenants.write().remove(name).is_some()
    }

    pub fn tenant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tenants.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_created_on_demand() {
        let db = Database::new();
        let tenant = db.tenant("acme");
        tenant.write().tables.insert(
            "t".into(),
            Table::new("t", vec![Column::new("id", DataType::Int64)], false),
        );
        assert_eq!(db.tenant("acme").read().tables.len(), 1);
        assert!(db.tenant("other").read().tables.is_empty());
        assert!(db.drop_tenant("acme"));
        assert!(db.tenant("acme").read().tables.is_empty());
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let table = Table::new(
            "users",
            vec![
                Column::new("Id", DataType::Int64),
                Column::new("Name", DataType::Text),
            ],
            false,
        );
        assert_eq!(table.column_index("ID"), Some(0));
        assert_eq!(table.column_index("name"), Some(1));
        assert_eq!(table.column_index("missing"), None);
    }
}
