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

#![warn(clippy::all)]
//! Virtual `sys.*` / `catalog.*` table tests.

use microsql::{Engine, Error, Value};
use pretty_assertions::assert_eq;

fn engine_with_schema() -> Engine {
    let engine = Engine::new();
    engine
        .execute(
            "CREATE TABLE users (id INT64 PRIMARY KEY, name TEXT NOT NULL, org INT64 REFERENCES orgs (id))",
        )
        .unwrap();
    engine
        .execute("CREATE TEMP TABLE scratch (v FLOAT64)")
        .unwrap();
    engine
}

#[test]
fn sys_tables_reflects_schema_and_versions() {
    let engine = engine_with_schema();
    let result = engine
        .execute("SELECT name, columns, rows, is_temp, version, tenant FROM sys.tables ORDER BY name")
        .unwrap();
    assert_eq!(result.len(), 2);
    let scratch = &result.rows[0];
    assert_eq!(scratch.get("name"), Some(&Value::Text("scratch".into())));
    assert_eq!(scratch.get("is_temp"), Some(&Value::Bool(true)));
    let users = &result.rows[1];
    assert_eq!(users.get("columns"), Some(&Value::Int(3)));
    assert_eq!(users.get("rows"), Some(&Value::Int(0)));
    assert_eq!(users.get("version"), Some(&Value::Int(0)));
    assert_eq!(users.get("tenant"), Some(&Value::Text("default".into())));

    engine.execute("INSERT INTO users VALUES (1, 'a', NULL)").unwrap();
    let after = engine
        .execute("SELECT version FROM sys.tables WHERE name = 'users'")
        .unwrap();
    assert_eq!(after.rows[0].get("version"), Some(&Value::Int(1)));
}

#[test]
fn sys_columns_describes_constraints() {
    let engine = engine_with_schema();
    let result = engine
        .execute(
            "SELECT name, position, data_type, constraint, is_nullable, fk_table, fk_column \
             FROM sys.columns WHERE table_name = 'users' ORDER BY position",
        )
        .unwrap();
    assert_eq!(result.len(), 3);
    let id = &result.rows[0];
    assert_eq!(id.get("constraint"), Some(&Value::Text("PRIMARY KEY".into())));
    assert_eq!(id.get("is_nullable"), Some(&Value::Bool(false)));
    let name = &result.rows[1];
    assert_eq!(name.get("is_nullable"), Some(&Value::Bool(false)));
    let org = &result.rows[2];
    assert_eq!(org.get("constraint"), Some(&Value::Text("FOREIGN KEY".into())));
    assert_eq!(org.get("fk_table"), Some(&Value::Text("orgs".into())));
    assert_eq!(org.get("fk_column"), Some(&Value::Text("id".into())));
}

#[test]
fn sys_constraints_lists_only_constrained_columns() {
    let engine = engine_with_schema();
    let result = engine
        .execute("SELECT column_name, constraint_type FROM sys.constraints WHERE table_name = 'users'")
        .unwrap();
    assert_eq!(result.len(), 2);
}

#[test]
fn sys_views_tracks_created_views() {
    let engine = engine_with_schema();
    engine
        .execute("CREATE VIEW named AS SELECT name FROM users")
        .unwrap();
    let result = engine
        .execute("SELECT schema, name, sql_text FROM sys.views")
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0].get("schema"), Some(&Value::Text("default".into())));
    assert_eq!(result.rows[0].get("name"), Some(&Value::Text("named".into())));
    assert_eq!(
        result.rows[0].get("sql_text"),
        Some(&Value::Text("SELECT name FROM users".into()))
    );
}

#[test]
fn catalog_aliases_sys() {
    let engine = engine_with_schema();
    let sys = engine.execute("SELECT name FROM sys.tables ORDER BY name").unwrap();
    let catalog = engine
        .execute("SELECT name FROM catalog.tables ORDER BY name")
        .unwrap();
    assert_eq!(sys.rows, catalog.rows);
}

#[test]
fn key_value_sys_tables() {
    let engine = Engine::new();
    let status = engine.execute("SELECT * FROM sys.status").unwrap();
    assert_eq!(status.columns, vec!["key".to_string(), "value".to_string()]);
    assert!(status.len() >= 4);

    let config = engine
        .execute("SELECT value FROM sys.config WHERE key = 'cache_capacity'")
        .unwrap();
    assert_eq!(config.rows[0].get("value"), Some(&Value::Int(1000)));

    let memory = engine.execute("SELECT * FROM sys.memory").unwrap();
    assert!(memory.len() >= 2);
    let connections = engine.execute("SELECT * FROM sys.connections").unwrap();
    assert_eq!(connections.len(), 0);
}

#[test]
fn unknown_sys_table_is_name_error() {
    let engine = Engine::new();
    let err = engine.execute("SELECT * FROM sys.bogus").unwrap_err();
    assert!(matches!(err, Error::Name(_)), "got {err:?}");
}
