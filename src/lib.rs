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

//! # microsql
//!
//! An embeddable, multi-tenant in-memory SQL engine.
//!
//! The pipeline is: SQL text → [`tokenizer`] → [`parser`] → [`ast`] →
//! (compile [`cache`]) → executor → [`ResultSet`]. The executor walks the
//! AST directly, with hash and nested-loop joins, grouping and window
//! functions, set operations, common table expressions, table-valued
//! functions (including brute-force vector search), and virtual `sys.*` /
//! `catalog.*` tables.
//!
//! Example:
//!
//! ```
//! use microsql::Engine;
//!
//! let engine = Engine::new();
//! engine
//!     .execute("CREATE TABLE users (id INT64 PRIMARY KEY, name TEXT, age INT64)")
//!     .unwrap();
//! engine
//!     .execute("INSERT INTO users VALUES (1, 'Alice', 25), (2, 'Bob', 30)")
//!     .unwrap();
//! let result = engine
//!     .execute("SELECT name FROM users WHERE age > 25 ORDER BY name")
//!     .unwrap();
//! assert_eq!(result.len(), 1);
//! ```
//!
//! Statements on the same tenant follow a readers-writer discipline:
//! SELECTs run under a shared lock, DDL/DML under an exclusive one. A
//! [`CancelToken`] aborts long statements at operator loop boundaries.

#![warn(clippy::all)]

pub mod ast;
pub mod cache;
mod catalog;
pub mod error;
pub mod eval;
mod exec;
pub mod functions;
pub mod keywords;
pub mod parser;
pub mod row;
pub mod storage;
pub mod tokenizer;
pub mod value;

pub use cache::{CacheStats, CompiledStatement, StatementCache, DEFAULT_CACHE_CAPACITY};
pub use error::{Error, Result};
pub use exec::{CancelToken, Engine, EngineConfig};
pub use parser::Parser;
pub use row::{ResultSet, RowMap};
pub use storage::{Column, ColumnConstraint, Database, Table, Tenant, DEFAULT_TENANT};
pub use value::{Truth, Value};
