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

//! AST types specific to CREATE/ALTER/DROP operations.

use core::fmt;

use serde::Serialize;

use super::{display_comma_separated, Ident, ObjectName};

/// SQL data types recognized in column definitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer (`INT` alias)
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point (`FLOAT`/`DOUBLE` alias)
    Float64,
    /// Character data (`TEXT`/`STRING`)
    Text,
    /// Boolean (`BOOL`/`BOOLEAN`)
    Bool,
    /// Calendar date
    Date,
    /// Date and time of day
    DateTime,
    /// Point in time (`TIMESTAMP`)
    Timestamp,
    /// Elapsed time
    Duration,
    /// JSON document (`JSON`/`JSONB`)
    Json,
    /// Ordered collection (`SLICE`/`ARRAY`)
    Array,
    /// Key/value collection
    Map,
    /// Dense Float64 vector
    Vector,
    /// Weak reference to a row in another table (`POINTER`/`PTR`)
    Pointer,
    /// Dynamically typed (`INTERFACE`)
    Interface,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataType::Int8 => write!(f, "INT8"),
            DataType::Int16 => write!(f, "INT16"),
            DataType::Int32 => write!(f, "INT32"),
            DataType::Int64 => write!(f, "INT64"),
            DataType::UInt8 => write!(f, "UINT8"),
            DataType::UInt16 => write!(f, "UINT16"),
            DataType::UInt32 => write!(f, "UINT32"),
            DataType::UInt64 => write!(f, "UINT64"),
            DataType::Float32 => write!(f, "FLOAT32"),
            DataType::Float64 => write!(f, "FLOAT64"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::Date => write!(f, "DATE"),
            DataType::DateTime => write!(f, "DATETIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Duration => write!(f, "DURATION"),
            DataType::Json => write!(f, "JSON"),
            DataType::Array => write!(f, "ARRAY"),
            DataType::Map => write!(f, "MAP"),
            DataType::Vector => write!(f, "VECTOR"),
            DataType::Pointer => write!(f, "POINTER"),
            DataType::Interface => write!(f, "INTERFACE"),
        }
    }
}

/// SQL column definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnDef {
    pub name: Ident,
    pub data_type: DataType,
    pub options: Vec<ColumnOption>,
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        for option in &self.options {
            write!(f, " {option}")?;
        }
        Ok(())
    }
}

/// `ColumnOption`s are modifiers that follow a column definition in a
/// `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnOption {
    /// `PRIMARY KEY`
    PrimaryKey,
    /// `UNIQUE`
    Unique,
    /// `[FOREIGN KEY] REFERENCES <table> (<column>)`
    References {
        table: ObjectName,
        column: Ident,
    },
    /// `NOT NULL`
    NotNull,
}

impl fmt::Display for ColumnOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnOption::PrimaryKey => write!(f, "PRIMARY KEY"),
            ColumnOption::Unique => write!(f, "UNIQUE"),
            ColumnOption::References { table, column } => {
                write!(f, "REFERENCES {table} ({column})")
            }
            ColumnOption::NotNull => write!(f, "NOT NULL"),
        }
    }
}

/// An `ALTER TABLE` (`Statement::AlterTable`) operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum AlterTableOperation {
    /// `ADD COLUMN <column_def>`
    AddColumn { column_def: ColumnDef },
}

impl fmt::Display for AlterTableOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AlterTableOperation::AddColumn { column_def } => {
                write!(f, "ADD COLUMN {column_def}")
            }
        }
    }
}

/// Index definition carried by `CREATE INDEX`; accepted and ignored by the
/// executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexDef {
    pub name: Ident,
    pub table_name: ObjectName,
    pub columns: Vec<Ident>,
}

impl fmt::Display for IndexDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ON {} ({})",
            self.name,
            self.table_name,
            display_comma_separated(&self.columns)
        )
    }
}
