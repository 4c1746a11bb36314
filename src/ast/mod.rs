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

//! SQL Abstract Syntax Tree (AST) types
//!
//! Every node implements [`Display`](core::fmt::Display), producing SQL that
//! parses back to a structurally equal tree. The executor walks these nodes
//! directly; there is no separate logical plan.

use core::fmt;

use serde::Serialize;

pub use self::ddl::{AlterTableOperation, ColumnDef, ColumnOption, DataType, IndexDef};
pub use self::value::{escape_single_quote_string, Value};

mod ddl;
mod value;

struct DisplaySeparated<'a, T>
where
    T: fmt::Display,
{
    slice: &'a [T],
    sep: &'static str,
}

impl<'a, T> fmt::Display for DisplaySeparated<'a, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut delim = "";
        for t in self.slice {
            write!(f, "{delim}")?;
            delim = self.sep;
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

fn display_separated<'a, T>(slice: &'a [T], sep: &'static str) -> DisplaySeparated<'a, T>
where
    T: fmt::Display,
{
    DisplaySeparated { slice, sep }
}

fn display_comma_separated<T>(slice: &[T]) -> DisplaySeparated<'_, T>
where
    T: fmt::Display,
{
    DisplaySeparated { slice, sep: ", " }
}

/// An identifier, decomposed into its value or character data and the quote style.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Ident {
    /// The value of the identifier without quotes.
    pub value: String,
    /// The starting quote if any; only the double quote is valid.
    pub quote_style: Option<char>,
}

impl Ident {
    /// Create a new identifier with the given value and no quotes.
    pub fn new<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Ident {
            value: value.into(),
            quote_style: None,
        }
    }

    /// Create a new quoted identifier with the given quote and value.
    pub fn with_quote<S>(quote: char, value: S) -> Self
    where
        S: Into<String>,
    {
        Ident {
            value: value.into(),
            quote_style: Some(quote),
        }
    }

    /// The case-insensitive identity of the identifier, used as a map key by
    /// the executor. Display keeps the written case.
    pub fn key(&self) -> String {
        self.value.to_lowercase()
    }
}

impl From<&str> for Ident {
    fn from(value: &str) -> Self {
        Ident {
            value: value.to_string(),
            quote_style: None,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.quote_style {
            Some(q) => {
                let escaped = self.value.replace(q, &q.to_string().repeat(2));
                write!(f, "{q}{escaped}{q}")
            }
            None => f.write_str(&self.value),
        }
    }
}

/// A name of a table, view, or function, possibly multi-part, i.e. `sys.tables`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectName(pub Vec<Ident>);

impl ObjectName {
    /// The lowercased dotted form used for registry and table lookups.
    pub fn key(&self) -> String {
        self.0.iter().map(Ident::key).collect::<Vec<_>>().join(".")
    }
}

impl From<&str> for ObjectName {
    fn from(value: &str) -> Self {
        ObjectName(value.split('.').map(Ident::new).collect())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", display_separated(&self.0, "."))
    }
}

/// Binary operators
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        })
    }
}

/// Unary operators
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOperator {
    Plus,
    Minus,
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
            UnaryOperator::Not => "NOT",
        })
    }
}

/// An SQL expression of any type.
///
/// The parser does not distinguish between expressions of different types
/// (e.g. boolean vs string), so the caller must handle expressions of
/// inappropriate type, like `WHERE 1`, as necessary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Expr {
    /// Identifier e.g. table name or column name
    Identifier(Ident),
    /// Multi-part identifier, e.g. `table_alias.column`
    CompoundIdentifier(Vec<Ident>),
    /// `IS NULL` operator
    IsNull(Box<Expr>),
    /// `IS NOT NULL` operator
    IsNotNull(Box<Expr>),
    /// `[ NOT ] IN (val1, val2, ...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `<expr> [ NOT ] BETWEEN <low> AND <high>`
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// `[NOT] LIKE <pattern> [ESCAPE <escape_character>]`
    Like {
        negated: bool,
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape_char: Option<char>,
    },
    /// Binary operation e.g. `1 + 1` or `foo > bar`
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation e.g. `NOT foo`
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Nested expression e.g. `(foo > bar)` or `(1)`
    Nested(Box<Expr>),
    /// A literal value, such as string, number or NULL
    Value(Value),
    /// Scalar, aggregate, or window function call e.g. `SUM(amount)`
    Function(Function),
    /// `CASE [<operand>] WHEN <condition> THEN <result> ... [ELSE <result>] END`
    Case {
        operand: Option<Box<Expr>>,
        conditions: Vec<Expr>,
        results: Vec<Expr>,
        else_result: Option<Box<Expr>>,
    },
}

impl Expr {
    /// The lowercased printed form, used by the executor to key computed
    /// aggregate and window values into row maps.
    pub fn result_key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Identifier(s) => write!(f, "{s}"),
            Expr::CompoundIdentifier(s) => write!(f, "{}", display_separated(s, ".")),
            Expr::IsNull(ast) => write!(f, "{ast} IS NULL"),
            Expr::IsNotNull(ast) => write!(f, "{ast} IS NOT NULL"),
            Expr::InList {
                expr,
                list,
                negated,
            } => write!(
                f,
                "{} {}IN ({})",
                expr,
                if *negated { "NOT " } else { "" },
                display_comma_separated(list)
            ),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
            Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
            } => match escape_char {
                Some(ch) => write!(
                    f,
                    "{} {}LIKE {} ESCAPE '{}'",
                    expr,
                    if *negated { "NOT " } else { "" },
                    pattern,
                    ch
                ),
                _ => write!(
                    f,
                    "{} {}LIKE {}",
                    expr,
                    if *negated { "NOT " } else { "" },
                    pattern
                ),
            },
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op, expr } => {
                if op == &UnaryOperator::Not {
                    write!(f, "NOT {expr}")
                } else {
                    write!(f, "{op}{expr}")
                }
            }
            Expr::Nested(ast) => write!(f, "({ast})"),
            Expr::Value(v) => write!(f, "{v}"),
            Expr::Function(fun) => write!(f, "{fun}"),
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {operand}")?;
                }
                for (c, r) in conditions.iter().zip(results) {
                    write!(f, " WHEN {c} THEN {r}")?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {else_result}")?;
                }
                write!(f, " END")
            }
        }
    }
}

/// A function call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Function {
    pub name: ObjectName,
    pub args: Vec<FunctionArg>,
    /// `DISTINCT` argument quantifier, e.g. `COUNT(DISTINCT x)`
    pub distinct: bool,
    /// `OVER (...)` window specification for window function calls
    pub over: Option<WindowSpec>,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({}{})",
            self.name,
            if self.distinct { "DISTINCT " } else { "" },
            display_comma_separated(&self.args),
        )?;
        if let Some(o) = &self.over {
            write!(f, " OVER ({o})")?;
        }
        Ok(())
    }
}

/// An argument to a function call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FunctionArg {
    /// `*`, as in `COUNT(*)`
    Wildcard,
    Expr(Expr),
}

impl fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FunctionArg::Wildcard => f.write_str("*"),
            FunctionArg::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

/// A window specification (`OVER (PARTITION BY ... ORDER BY ...)`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut delim = "";
        if !self.partition_by.is_empty() {
            write!(
                f,
                "PARTITION BY {}",
                display_comma_separated(&self.partition_by)
            )?;
            delim = " ";
        }
        if !self.order_by.is_empty() {
            write!(
                f,
                "{delim}ORDER BY {}",
                display_comma_separated(&self.order_by)
            )?;
        }
        Ok(())
    }
}

/// The most complete variant of a `SELECT` query expression, optionally
/// including `WITH`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Query {
    /// WITH (common table expressions, or CTEs)
    pub with: Option<With>,
    /// SELECT or the chain of UNION/EXCEPT/INTERSECT operations
    pub body: Box<SetExpr>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref with) = self.with {
            write!(f, "{with} ")?;
        }
        write!(f, "{}", self.body)
    }
}

/// A node in a tree, representing a "query body" expression, roughly:
/// `SELECT ... [ {UNION|EXCEPT|INTERSECT} [ALL] SELECT ...]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SetExpr {
    /// Restricted SELECT .. FROM .. HAVING (no CTEs or set operations)
    Select(Box<Select>),
    /// UNION/EXCEPT/INTERSECT of two queries
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
    },
}

impl fmt::Display for SetExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SetExpr::Select(s) => write!(f, "{s}"),
            SetExpr::SetOperation {
                left,
                right,
                op,
                all,
            } => {
                write!(f, "{left} {op}{} {right}", if *all { " ALL" } else { "" })
            }
        }
    }
}

/// A set operator joining two query bodies
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SetOperator {
    Union,
    Except,
    Intersect,
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            SetOperator::Union => "UNION",
            SetOperator::Except => "EXCEPT",
            SetOperator::Intersect => "INTERSECT",
        })
    }
}

/// A restricted variant of `SELECT` (without CTEs or set operations),
/// carrying its own ORDER BY / LIMIT / OFFSET.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Select {
    pub distinct: bool,
    /// projection expressions
    pub projection: Vec<SelectItem>,
    /// FROM, with its chain of joins; `None` for expression-only selects
    pub from: Option<TableWithJoins>,
    /// WHERE
    pub selection: Option<Expr>,
    /// GROUP BY
    pub group_by: Vec<Expr>,
    /// HAVING
    pub having: Option<Expr>,
    /// ORDER BY
    pub order_by: Vec<OrderByExpr>,
    /// LIMIT
    pub limit: Option<Expr>,
    /// OFFSET
    pub offset: Option<Expr>,
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SELECT")?;
        if self.distinct {
            write!(f, " DISTINCT")?;
        }
        write!(f, " {}", display_comma_separated(&self.projection))?;
        if let Some(ref from) = self.from {
            write!(f, " FROM {from}")?;
        }
        if let Some(ref selection) = self.selection {
            write!(f, " WHERE {selection}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", display_comma_separated(&self.group_by))?;
        }
        if let Some(ref having) = self.having {
            write!(f, " HAVING {having}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", display_comma_separated(&self.order_by))?;
        }
        if let Some(ref limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(ref offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}

/// One item of the comma-separated list following `SELECT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SelectItem {
    /// Any expression, not followed by `[ AS ] alias`
    UnnamedExpr(Expr),
    /// An expression, followed by `[ AS ] alias`
    ExprWithAlias { expr: Expr, alias: Ident },
    /// An unqualified `*`
    Wildcard,
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectItem::UnnamedExpr(expr) => write!(f, "{expr}"),
            SelectItem::ExprWithAlias { expr, alias } => write!(f, "{expr} AS {alias}"),
            SelectItem::Wildcard => write!(f, "*"),
        }
    }
}

/// The base relation of a FROM clause together with its chain of joins
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

impl fmt::Display for TableWithJoins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.relation)?;
        for join in &self.joins {
            write!(f, "{join}")?;
        }
        Ok(())
    }
}

/// A table name or a table-valued function call appearing in FROM
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TableFactor {
    Table {
        name: ObjectName,
        alias: Option<Ident>,
    },
    /// A table-valued function call, e.g.
    /// `VEC_SEARCH('docs', 'embedding', VEC_FROM_JSON('[1,0]'), 5)`
    Function {
        name: ObjectName,
        args: Vec<Expr>,
        alias: Option<Ident>,
    },
}

impl TableFactor {
    pub fn alias(&self) -> Option<&Ident> {
        match self {
            TableFactor::Table { alias, .. } | TableFactor::Function { alias, .. } => {
                alias.as_ref()
            }
        }
    }
}

impl fmt::Display for TableFactor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableFactor::Table { name, alias } => {
                write!(f, "{name}")?;
                if let Some(alias) = alias {
                    write!(f, " {alias}")?;
                }
                Ok(())
            }
            TableFactor::Function { name, args, alias } => {
                write!(f, "{name}({})", display_comma_separated(args))?;
                if let Some(alias) = alias {
                    write!(f, " {alias}")?;
                }
                Ok(())
            }
        }
    }
}

/// A JOIN clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Join {
    pub relation: TableFactor,
    pub join_operator: JoinOperator,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (kw, constraint) = match &self.join_operator {
            JoinOperator::Inner(c) => ("", c),
            JoinOperator::LeftOuter(c) => ("LEFT ", c),
            JoinOperator::RightOuter(c) => ("RIGHT ", c),
        };
        write!(f, " {kw}JOIN {}", self.relation)?;
        if let JoinConstraint::On(expr) = constraint {
            write!(f, " ON {expr}")?;
        }
        Ok(())
    }
}

/// The kind of a JOIN, wrapping its constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum JoinOperator {
    Inner(JoinConstraint),
    LeftOuter(JoinConstraint),
    RightOuter(JoinConstraint),
}

impl JoinOperator {
    pub fn constraint(&self) -> &JoinConstraint {
        match self {
            JoinOperator::Inner(c) | JoinOperator::LeftOuter(c) | JoinOperator::RightOuter(c) => c,
        }
    }
}

/// The predicate attached to a JOIN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum JoinConstraint {
    On(Expr),
    None,
}

/// An `ORDER BY` expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OrderByExpr {
    pub expr: Expr,
    /// Optional `ASC` or `DESC`
    pub asc: Option<bool>,
}

impl fmt::Display for OrderByExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.asc {
            Some(true) => write!(f, " ASC")?,
            Some(false) => write!(f, " DESC")?,
            None => (),
        }
        Ok(())
    }
}

/// A WITH clause introducing common table expressions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct With {
    pub recursive: bool,
    pub cte_tables: Vec<Cte>,
}

impl fmt::Display for With {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "WITH {}{}",
            if self.recursive { "RECURSIVE " } else { "" },
            display_comma_separated(&self.cte_tables)
        )
    }
}

/// A single CTE: `alias AS ( query )`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cte {
    pub alias: Ident,
    pub query: Box<Query>,
}

impl fmt::Display for Cte {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} AS ({})", self.alias, self.query)
    }
}

/// The source of rows for an `INSERT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum InsertSource {
    /// `VALUES (..), (..)`
    Values(Vec<Vec<Expr>>),
    /// `INSERT INTO t SELECT ...`
    Query(Box<Query>),
}

impl fmt::Display for InsertSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InsertSource::Values(rows) => {
                write!(f, "VALUES ")?;
                let mut delim = "";
                for row in rows {
                    write!(f, "{delim}({})", display_comma_separated(row))?;
                    delim = ", ";
                }
                Ok(())
            }
            InsertSource::Query(q) => write!(f, "{q}"),
        }
    }
}

/// A `SET col = expr` assignment in an UPDATE statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Assignment {
    pub column: Ident,
    pub value: Expr,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

/// The object kind of a DROP statement
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectType {
    Table,
    View,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
        })
    }
}

/// A top-level statement (SELECT, INSERT, CREATE, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Statement {
    /// `SELECT`, optionally with CTEs and set operations
    Query(Box<Query>),
    /// `INSERT INTO`
    Insert {
        table_name: ObjectName,
        /// Optional explicit column list
        columns: Vec<Ident>,
        source: InsertSource,
    },
    /// `UPDATE`
    Update {
        table_name: ObjectName,
        assignments: Vec<Assignment>,
        selection: Option<Expr>,
    },
    /// `DELETE FROM`
    Delete {
        table_name: ObjectName,
        selection: Option<Expr>,
    },
    /// `CREATE [TEMP] TABLE`, with column definitions or `AS <query>`
    CreateTable {
        name: ObjectName,
        temporary: bool,
        columns: Vec<ColumnDef>,
        query: Option<Box<Query>>,
    },
    /// `CREATE VIEW name AS <query>`
    CreateView { name: ObjectName, query: Box<Query> },
    /// `CREATE INDEX`; accepted and ignored by the executor
    CreateIndex(IndexDef),
    /// `ALTER TABLE`
    AlterTable {
        name: ObjectName,
        operation: AlterTableOperation,
    },
    /// `DROP TABLE`/`DROP VIEW`
    Drop {
        object_type: ObjectType,
        if_exists: bool,
        name: ObjectName,
    },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statement::Query(q) => write!(f, "{q}"),
            Statement::Insert {
                table_name,
                columns,
                source,
            } => {
                write!(f, "INSERT INTO {table_name} ")?;
                if !columns.is_empty() {
                    write!(f, "({}) ", display_comma_separated(columns))?;
                }
                write!(f, "{source}")
            }
            Statement::Update {
                table_name,
                assignments,
                selection,
            } => {
                write!(
                    f,
                    "UPDATE {table_name} SET {}",
                    display_comma_separated(assignments)
                )?;
                if let Some(selection) = selection {
                    write!(f, " WHERE {selection}")?;
                }
                Ok(())
            }
            Statement::Delete {
                table_name,
                selection,
            } => {
                write!(f, "DELETE FROM {table_name}")?;
                if let Some(selection) = selection {
                    write!(f, " WHERE {selection}")?;
                }
                Ok(())
            }
            Statement::CreateTable {
                name,
                temporary,
                columns,
                query,
            } => {
                write!(
                    f,
                    "CREATE {}TABLE {name}",
                    if *temporary { "TEMP " } else { "" }
                )?;
                if !columns.is_empty() {
                    write!(f, " ({})", display_comma_separated(columns))?;
                }
                if let Some(query) = query {
                    write!(f, " AS {query}")?;
                }
                Ok(())
            }
            Statement::CreateView { name, query } => {
                write!(f, "CREATE VIEW {name} AS {query}")
            }
            Statement::CreateIndex(index) => write!(f, "CREATE INDEX {index}"),
            Statement::AlterTable { name, operation } => {
                write!(f, "ALTER TABLE {name} {operation}")
            }
            Statement::Drop {
                object_type,
                if_exists,
                name,
            } => write!(
                f,
                "DROP {object_type} {}{name}",
                if *if_exists { "IF EXISTS " } else { "" }
            ),
        }
    }
}
