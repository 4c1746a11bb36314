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

//! Builtin function registries.
//!
//! Dispatch is by upper-cased name through explicit registries, one per
//! function kind. Registries are built once at engine construction and are
//! never mutated afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::row::ResultSet;
use crate::value::Value;

pub mod aggregate;
pub mod scalar;
pub mod table;
pub mod vector;

pub use aggregate::Accumulator;
pub use table::{TableFunction, TableFunctionContext};

/// A pure scalar builtin.
pub type ScalarFn = fn(&[Value]) -> Result<Value>;

/// Creates a fresh accumulator for one aggregate call.
pub type AccumulatorFactory = fn() -> Box<dyn Accumulator>;

/// Window function names understood by the executor's window pass.
pub const WINDOW_FUNCTIONS: &[&str] = &[
    "ROW_NUMBER",
    "RANK",
    "DENSE_RANK",
    "LAG",
    "LEAD",
    "MOVING_AVG",
    "MOVING_SUM",
];

/// One row of `sys.functions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub function_type: &'static str,
    pub language: &'static str,
}

/// The engine's four registries: scalar, aggregate, window, and
/// table-valued.
pub struct FunctionRegistry {
    scalars: HashMap<String, ScalarFn>,
    aggregates: HashMap<String, AccumulatorFactory>,
    windows: HashSet<String>,
    tables: HashMap<String, Arc<dyn TableFunction>>,
}

impl FunctionRegistry {
    /// Builds the full builtin registry. Idempotent and side-effect free;
    /// engines call this once at startup.
    pub fn standard() -> Self {
        let mut registry = FunctionRegistry {
            scalars: HashMap::new(),
            aggregates: HashMap::new(),
            windows: WINDOW_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
            tables: HashMap::new(),
        };
        scalar::register(&mut registry);
        vector::register(&mut registry);
        aggregate::register(&mut registry);
        table::register(&mut registry);
        registry
    }

    pub(crate) fn add_scalar(&mut self, name: &str, f: ScalarFn) {
        self.scalars.insert(name.to_uppercase(), f);
    }

    pub(crate) fn add_aggregate(&mut self, name: &str, factory: AccumulatorFactory) {
        self.aggregates.insert(name.to_uppercase(), factory);
    }

    pub(crate) fn add_table_function(&mut self, function: Arc<dyn TableFunction>) {
        self.tables
            .insert(function.name().to_uppercase(), function);
    }

    pub fn scalar(&self, name: &str) -> Option<ScalarFn> {
        self.scalars.get(&name.to_uppercase()).copied()
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.aggregates.contains_key(&name.to_uppercase())
    }

    pub fn is_window(&self, name: &str) -> bool {
        self.windows.contains(&name.to_uppercase())
    }

    /// Instantiates an accumulator, wrapping it for DISTINCT when asked.
    pub fn make_accumulator(&self, name: &str, distinct: bool) -> Result<Box<dyn Accumulator>> {
        let factory = self
            .aggregates
            .get(&name.to_uppercase())
            .ok_or_else(|| Error::Name(format!("unknown aggregate function {name}")))?;
        let inner = factory();
        if distinct {
            Ok(aggregate::distinct(inner))
        } else {
            Ok(inner)
        }
    }

    /// Case-insensitive table-valued function lookup.
    pub fn table_function(&self, name: &str) -> Option<Arc<dyn TableFunction>> {
        self.tables.get(&name.to_uppercase()).cloned()
    }

    /// Runs a table-valued function: argument validation, then execution.
    pub fn execute_table_function(
        &self,
        name: &str,
        ctx: &TableFunctionContext,
        args: &[Value],
    ) -> Result<ResultSet> {
        let function = self
            .table_function(name)
            .ok_or_else(|| Error::Name(format!("unknown table function {name}")))?;
        function.validate_args(args)?;
        function.execute(ctx, args)
    }

    /// The catalog listing backing `sys.functions`, sorted by name within
    /// each kind.
    pub fn catalog(&self) -> Vec<FunctionInfo> {
        let mut entries = Vec::new();
        let mut push_sorted = |names: Vec<String>, function_type: &'static str| {
            let mut names = names;
            names.sort();
            for name in names {
                entries.push(FunctionInfo {
                    name,
                    function_type,
                    language: "builtin",
                });
            }
        };
        push_sorted(self.scalars.keys().cloned().collect(), "SCALAR");
        push_sorted(self.aggregates.keys().cloned().collect(), "AGGREGATE");
        push_sorted(self.windows.iter().cloned().collect(), "WINDOW");
        push_sorted(self.tables.keys().cloned().collect(), "TABLE");
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_each_kind() {
        let registry = FunctionRegistry::standard();
        assert!(registry.scalar("upper").is_some());
        assert!(registry.scalar("UPPER").is_some());
        assert!(registry.is_aggregate("sum"));
        assert!(registry.is_window("row_number"));
        assert!(registry.table_function("vec_search").is_some());
        assert!(registry.scalar("NO_SUCH").is_none());
    }

    #[test]
    fn catalog_lists_every_registry() {
        let registry = FunctionRegistry::standard();
        let catalog = registry.catalog();
        let types: HashSet<&str> = catalog.iter().map(|f| f.function_type).collect();
        assert!(types.contains("SCALAR"));
        assert!(types.contains("AGGREGATE"));
        assert!(types.contains("WINDOW"));
        assert!(types.contains("TABLE"));
    }
}
