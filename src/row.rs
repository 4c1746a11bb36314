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

//! Row and result-set shapes shared by the executor and hosts.

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::Value;

/// The evaluator's view of a row: an insertion-ordered, lowercase-keyed map
/// from column name (qualified as `t.c` for joined rows) to value.
pub type RowMap = IndexMap<String, Value>;

/// A rectangular query result owned by the caller.
///
/// Column names keep their display case; row keys are the lowercased forms.
/// Every column appears in every row, with explicit `Null` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<RowMap>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        ResultSet {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a row map from this result's columns and positional values,
    /// padding missing cells with Null.
    pub fn push_row(&mut self, values: Vec<Value>) {
        let mut row = RowMap::with_capacity(self.columns.len());
        let mut values = values.into_iter();
        for col in &self.columns {
            row.insert(col.to_lowercase(), values.next().unwrap_or(Value::Null));
        }
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// The values of one row in column order.
    pub fn row_values(&self, index: usize) -> Vec<Value> {
        let Some(row) = self.rows.get(index) else {
            return Vec::new();
        };
        self.columns
            .iter()
            .map(|col| row.get(&col.to_lowercase()).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
