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

//! SQL Parser
//!
//! A recursive-descent parser with one-token lookahead over the output of
//! [`crate::tokenizer`]. Expressions are parsed with precedence climbing.
//! The parser stops at the first error; there is no recovery.

use log::debug;

use crate::ast::*;
use crate::error::{Error, Result};
use crate::keywords::Keyword;
use crate::tokenizer::{tokenize, Token, Word};

/// Keywords that terminate a bare (no `AS`) column alias.
const RESERVED_FOR_COLUMN_ALIAS: &[Keyword] = &[
    Keyword::FROM,
    Keyword::WHERE,
    Keyword::GROUP,
    Keyword::HAVING,
    Keyword::ORDER,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::UNION,
    Keyword::EXCEPT,
    Keyword::INTERSECT,
];

/// Keywords that terminate a bare (no `AS`) table alias.
const RESERVED_FOR_TABLE_ALIAS: &[Keyword] = &[
    Keyword::JOIN,
    Keyword::LEFT,
    Keyword::RIGHT,
    Keyword::ON,
    Keyword::WHERE,
    Keyword::GROUP,
    Keyword::HAVING,
    Keyword::ORDER,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::UNION,
    Keyword::EXCEPT,
    Keyword::INTERSECT,
    Keyword::SET,
];

/// Keywords that may not begin a primary expression. Type names and
/// function-shaped keywords (LEFT, RIGHT, REPLACE, ...) stay usable as
/// column names and calls.
const RESERVED_FOR_EXPR_START: &[Keyword] = &[
    Keyword::SELECT,
    Keyword::DISTINCT,
    Keyword::FROM,
    Keyword::WHERE,
    Keyword::GROUP,
    Keyword::BY,
    Keyword::HAVING,
    Keyword::ORDER,
    Keyword::ASC,
    Keyword::DESC,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::JOIN,
    Keyword::OUTER,
    Keyword::ON,
    Keyword::AS,
    Keyword::UNION,
    Keyword::ALL,
    Keyword::EXCEPT,
    Keyword::INTERSECT,
    Keyword::WITH,
    Keyword::RECURSIVE,
    Keyword::AND,
    Keyword::OR,
    Keyword::IS,
    Keyword::IN,
    Keyword::LIKE,
    Keyword::ESCAPE,
    Keyword::BETWEEN,
    Keyword::WHEN,
    Keyword::THEN,
    Keyword::ELSE,
    Keyword::END,
    Keyword::CREATE,
    Keyword::TABLE,
    Keyword::DROP,
    Keyword::ALTER,
    Keyword::INSERT,
    Keyword::INTO,
    Keyword::VALUES,
    Keyword::UPDATE,
    Keyword::SET,
    Keyword::DELETE,
    Keyword::FOREIGN,
    Keyword::PRIMARY,
    Keyword::REFERENCES,
    Keyword::UNIQUE,
    Keyword::OVER,
    Keyword::PARTITION,
];

// Precedence levels, loosest first.
const OR_PREC: u8 = 5;
const AND_PREC: u8 = 10;
const NOT_PREC: u8 = 15;
const IS_PREC: u8 = 17;
const CMP_PREC: u8 = 20;
const PLUS_MINUS_PREC: u8 = 30;
const MUL_DIV_PREC: u8 = 40;
const UNARY_PREC: u8 = 50;

/// SQL Parser
pub struct Parser {
    tokens: Vec<Token>,
    /// The index of the first unprocessed token in `self.tokens`
    index: usize,
}

impl Parser {
    /// Tokenizes and parses `sql`, expecting a single statement (an optional
    /// trailing semicolon is allowed).
    pub fn parse_sql(sql: &str) -> Result<Statement> {
        debug!("parsing: {sql}");
        let tokens = tokenize(sql)?;
        let mut parser = Parser { tokens, index: 0 };
        let statement = parser.parse_statement()?;
        parser.consume_token(&Token::SemiColon);
        parser.expect_token(&Token::EOF)?;
        Ok(statement)
    }

    /// Parses an expression from a standalone string (used by tests and
    /// hosts embedding expression filters).
    pub fn parse_expr_sql(sql: &str) -> Result<Expr> {
        let tokens = tokenize(sql)?;
        let mut parser = Parser { tokens, index: 0 };
        let expr = parser.parse_expr()?;
        parser.expect_token(&Token::EOF)?;
        Ok(expr)
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek_token().clone() {
            Token::Word(w) => match w.keyword {
                Keyword::SELECT | Keyword::WITH => {
                    Ok(Statement::Query(Box::new(self.parse_query()?)))
                }
                Keyword::INSERT => {
                    self.next_token();
                    self.parse_insert()
                }
                Keyword::UPDATE => {
                    self.next_token();
                    self.parse_update()
                }
                Keyword::DELETE => {
                    self.next_token();
                    self.parse_delete()
                }
                Keyword::CREATE => {
                    self.next_token();
                    self.parse_create()
                }
                Keyword::DROP => {
                    self.next_token();
                    self.parse_drop()
                }
                Keyword::ALTER => {
                    self.next_token();
                    self.parse_alter()
                }
                _ => self.expected("a statement"),
            },
            _ => self.expected("a statement"),
        }
    }

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    fn parse_create(&mut self) -> Result<Statement> {
        if self.parse_keyword(Keyword::TEMP) {
            self.expect_keyword(Keyword::TABLE)?;
            return self.parse_create_table(true);
        }
        if self.parse_keyword(Keyword::TABLE) {
            return self.parse_create_table(false);
        }
        if self.parse_keyword(Keyword::VIEW) {
            let name = self.parse_object_name()?;
            self.expect_keyword(Keyword::AS)?;
            let query = Box::new(self.parse_query()?);
            return Ok(Statement::CreateView { name, query });
        }
        if self.parse_keyword(Keyword::INDEX) {
            let name = self.parse_identifier()?;
            self.expect_keyword(Keyword::ON)?;
            let table_name = self.parse_object_name()?;
            self.expect_token(&Token::LParen)?;
            let columns = self.parse_comma_separated(Parser::parse_identifier)?;
            self.expect_token(&Token::RParen)?;
            return Ok(Statement::CreateIndex(IndexDef {
                name,
                table_name,
                columns,
            }));
        }
        self.expected("TABLE, VIEW, or INDEX after CREATE")
    }

    fn parse_create_table(&mut self, temporary: bool) -> Result<Statement> {
        let name = self.parse_object_name()?;
        if self.parse_keyword(Keyword::AS) {
            let query = Some(Box::new(self.parse_query()?));
            return Ok(Statement::CreateTable {
                name,
                temporary,
                columns: vec![],
                query,
            });
        }
        self.expect_token(&Token::LParen)?;
        let columns = self.parse_comma_separated(Parser::parse_column_def)?;
        self.expect_token(&Token::RParen)?;
        Ok(Statement::CreateTable {
            name,
            temporary,
            columns,
            query: None,
        })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.parse_identifier()?;
        let data_type = self.parse_data_type()?;
        let mut options = vec![];
        loop {
            if self.parse_keywords(&[Keyword::PRIMARY, Keyword::KEY]) {
                options.push(ColumnOption::PrimaryKey);
            } else if self.parse_keyword(Keyword::UNIQUE) {
                options.push(ColumnOption::Unique);
            } else if self.parse_keywords(&[Keyword::NOT, Keyword::NULL]) {
                options.push(ColumnOption::NotNull);
            } else if self.parse_keyword(Keyword::REFERENCES)
                || self.parse_keywords(&[Keyword::FOREIGN, Keyword::KEY, Keyword::REFERENCES])
            {
                let table = self.parse_object_name()?;
                self.expect_token(&Token::LParen)?;
                let column = self.parse_identifier()?;
                self.expect_token(&Token::RParen)?;
                options.push(ColumnOption::References { table, column });
            } else {
                break;
            }
        }
        Ok(ColumnDef {
            name,
            data_type,
            options,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType> {
        let token = self.next_token().clone();
        let data_type = match &token {
            Token::Word(w) => match w.keyword {
                Keyword::INT | Keyword::INT64 => Some(DataType::Int64),
                Keyword::INT8 => Some(DataType::Int8),
                Keyword::INT16 => Some(DataType::Int16),
                Keyword::INT32 => Some(DataType::Int32),
                Keyword::UINT8 => Some(DataType::UInt8),
                Keyword::UINT16 => Some(DataType::UInt16),
                Keyword::UINT32 => Some(DataType::UInt32),
                Keyword::UINT64 => Some(DataType::UInt64),
                Keyword::FLOAT | Keyword::FLOAT64 | Keyword::DOUBLE => Some(DataType::Float64),
                Keyword::FLOAT32 => Some(DataType::Float32),
                Keyword::TEXT | Keyword::STRING => Some(DataType::Text),
                Keyword::BOOL | Keyword::BOOLEAN => Some(DataType::Bool),
                Keyword::DATE => Some(DataType::Date),
                Keyword::DATETIME => Some(DataType::DateTime),
                Keyword::TIMESTAMP => Some(DataType::Timestamp),
                Keyword::DURATION => Some(DataType::Duration),
                Keyword::JSON | Keyword::JSONB => Some(DataType::Json),
                Keyword::SLICE | Keyword::ARRAY => Some(DataType::Array),
                Keyword::MAP => Some(DataType::Map),
                Keyword::VECTOR => Some(DataType::Vector),
                Keyword::POINTER | Keyword::PTR => Some(DataType::Pointer),
                Keyword::INTERFACE => Some(DataType::Interface),
                _ => None,
            },
            _ => None,
        };
        match data_type {
            Some(data_type) => Ok(data_type),
            None => Err(Error::parse("unknown type name", token.to_string())),
        }
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        let object_type = if self.parse_keyword(Keyword::TABLE) {
            ObjectType::Table
        } else if self.parse_keyword(Keyword::VIEW) {
            ObjectType::View
        } else {
            return self.expected("TABLE or VIEW after DROP");
        };
        let if_exists = self.parse_keywords(&[Keyword::IF, Keyword::EXISTS]);
        let name = self.parse_object_name()?;
        Ok(Statement::Drop {
            object_type,
            if_exists,
            name,
        })
    }

    fn parse_alter(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::TABLE)?;
        let name = self.parse_object_name()?;
        self.expect_keyword(Keyword::ADD)?;
        self.expect_keyword(Keyword::COLUMN)?;
        let column_def = self.parse_column_def()?;
        Ok(Statement::AlterTable {
            name,
            operation: AlterTableOperation::AddColumn { column_def },
        })
    }

    // ------------------------------------------------------------------
    // DML
    // ------------------------------------------------------------------

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::INTO)?;
        let table_name = self.parse_object_name()?;
        let mut columns = vec![];
        if self.consume_token(&Token::LParen) {
            columns = self.parse_comma_separated(Parser::parse_identifier)?;
            self.expect_token(&Token::RParen)?;
        }
        let source = if self.parse_keyword(Keyword::VALUES) {
            let mut rows = vec![];
            loop {
                self.expect_token(&Token::LParen)?;
                let row = self.parse_comma_separated(Parser::parse_expr)?;
                self.expect_token(&Token::RParen)?;
                rows.push(row);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else {
            InsertSource::Query(Box::new(self.parse_query()?))
        };
        Ok(Statement::Insert {
            table_name,
            columns,
            source,
        })
    }

    fn parse_update(&mut self) -> Result<Statement> {
        let table_name = self.parse_object_name()?;
        self.expect_keyword(Keyword::SET)?;
        let assignments = self.parse_comma_separated(|parser| {
            let column = parser.parse_identifier()?;
            parser.expect_token(&Token::Eq)?;
            let value = parser.parse_expr()?;
            Ok(Assignment { column, value })
        })?;
        let selection = if self.parse_keyword(Keyword::WHERE) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update {
            table_name,
            assignments,
            selection,
        })
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::FROM)?;
        let table_name = self.parse_object_name()?;
        let selection = if self.parse_keyword(Keyword::WHERE) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete {
            table_name,
            selection,
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Parses `[WITH cte, ...] SELECT ... [UNION ... | EXCEPT ... | INTERSECT ...]`
    pub fn parse_query(&mut self) -> Result<Query> {
        let with = if self.parse_keyword(Keyword::WITH) {
            let recursive = self.parse_keyword(Keyword::RECURSIVE);
            let cte_tables = self.parse_comma_separated(|parser| {
                let alias = parser.parse_identifier()?;
                parser.expect_keyword(Keyword::AS)?;
                parser.expect_token(&Token::LParen)?;
                let query = Box::new(parser.parse_query()?);
                parser.expect_token(&Token::RParen)?;
                Ok(Cte { alias, query })
            })?;
            Some(With {
                recursive,
                cte_tables,
            })
        } else {
            None
        };

        let mut body = SetExpr::Select(Box::new(self.parse_select()?));
        loop {
            let op = if self.parse_keyword(Keyword::UNION) {
                SetOperator::Union
            } else if self.parse_keyword(Keyword::EXCEPT) {
                SetOperator::Except
            } else if self.parse_keyword(Keyword::INTERSECT) {
                SetOperator::Intersect
            } else {
                break;
            };
            let all = op == SetOperator::Union && self.parse_keyword(Keyword::ALL);
            let right = SetExpr::Select(Box::new(self.parse_select()?));
            body = SetExpr::SetOperation {
                op,
                all,
                left: Box::new(body),
                right: Box::new(right),
            };
        }

        Ok(Query {
            with,
            body: Box::new(body),
        })
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_keyword(Keyword::SELECT)?;
        let distinct = self.parse_keyword(Keyword::DISTINCT);
        let projection = self.parse_comma_separated(Parser::parse_select_item)?;

        let from = if self.parse_keyword(Keyword::FROM) {
            let relation = self.parse_table_factor()?;
            let mut joins = vec![];
            loop {
                let join_operator: fn(JoinConstraint) -> JoinOperator = if self
                    .parse_keyword(Keyword::JOIN)
                {
                    JoinOperator::Inner
                } else if self.parse_keyword(Keyword::LEFT) {
                    self.parse_keyword(Keyword::OUTER);
                    self.expect_keyword(Keyword::JOIN)?;
                    JoinOperator::LeftOuter
                } else if self.parse_keyword(Keyword::RIGHT) {
                    self.parse_keyword(Keyword::OUTER);
                    self.expect_keyword(Keyword::JOIN)?;
                    JoinOperator::RightOuter
                } else {
                    break;
                };
                let relation = self.parse_table_factor()?;
                self.expect_keyword(Keyword::ON)?;
                let constraint = JoinConstraint::On(self.parse_expr()?);
                joins.push(Join {
                    relation,
                    join_operator: join_operator(constraint),
                });
            }
            Some(TableWithJoins { relation, joins })
        } else {
            None
        };

        let selection = if self.parse_keyword(Keyword::WHERE) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.parse_keywords(&[Keyword::GROUP, Keyword::BY]) {
            self.parse_comma_separated(Parser::parse_expr)?
        } else {
            vec![]
        };

        let having = if self.parse_keyword(Keyword::HAVING) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.parse_keywords(&[Keyword::ORDER, Keyword::BY]) {
            self.parse_comma_separated(Parser::parse_order_by_expr)?
        } else {
            vec![]
        };

        let limit = if self.parse_keyword(Keyword::LIMIT) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let offset = if self.parse_keyword(Keyword::OFFSET) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            projection,
            from,
            selection,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.consume_token(&Token::Mul) {
            return Ok(SelectItem::Wildcard);
        }
        let expr = self.parse_expr()?;
        match self.parse_optional_alias(RESERVED_FOR_COLUMN_ALIAS)? {
            Some(alias) => Ok(SelectItem::ExprWithAlias { expr, alias }),
            None => Ok(SelectItem::UnnamedExpr(expr)),
        }
    }

    fn parse_table_factor(&mut self) -> Result<TableFactor> {
        let name = self.parse_object_name()?;
        if self.consume_token(&Token::LParen) {
            let args = if self.consume_token(&Token::RParen) {
                vec![]
            } else {
                let args = self.parse_comma_separated(Parser::parse_expr)?;
                self.expect_token(&Token::RParen)?;
                args
            };
            let alias = self.parse_optional_alias(RESERVED_FOR_TABLE_ALIAS)?;
            return Ok(TableFactor::Function { name, args, alias });
        }
        let alias = self.parse_optional_alias(RESERVED_FOR_TABLE_ALIAS)?;
        Ok(TableFactor::Table { name, alias })
    }

    fn parse_order_by_expr(&mut self) -> Result<OrderByExpr> {
        let expr = self.parse_expr()?;
        let asc = if self.parse_keyword(Keyword::ASC) {
            Some(true)
        } else if self.parse_keyword(Keyword::DESC) {
            Some(false)
        } else {
            None
        };
        Ok(OrderByExpr { expr, asc })
    }

    /// An alias is a bare identifier or `AS identifier`; bare identifiers
    /// matching `reserved` end the aliasable clause instead.
    fn parse_optional_alias(&mut self, reserved: &[Keyword]) -> Result<Option<Ident>> {
        let after_as = self.parse_keyword(Keyword::AS);
        match self.peek_token().clone() {
            Token::Word(w) if after_as || !reserved.contains(&w.keyword) => {
                // A bare keyword never names an alias; `AS keyword` does.
                if !after_as && w.quote_style.is_none() && w.keyword != Keyword::NoKeyword {
                    return Ok(None);
                }
                self.next_token();
                Ok(Some(word_to_ident(&w)?))
            }
            _ if after_as => self.expected("an identifier after AS"),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Parse an expression, starting at the loosest precedence.
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_subexpr(0)
    }

    /// Parse an expression whose operators all bind tighter than
    /// `precedence`.
    fn parse_subexpr(&mut self, precedence: u8) -> Result<Expr> {
        let mut expr = self.parse_prefix()?;
        loop {
            let next_precedence = self.get_next_precedence();
            if precedence >= next_precedence {
                break;
            }
            expr = self.parse_infix(expr, next_precedence)?;
        }
        Ok(expr)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        match self.peek_token().clone() {
            Token::Number(n) => {
                self.next_token();
                Ok(Expr::Value(Value::Number(n)))
            }
            Token::SingleQuotedString(s) => {
                self.next_token();
                Ok(Expr::Value(Value::SingleQuotedString(s)))
            }
            Token::LParen => {
                self.next_token();
                let expr = self.parse_expr()?;
                self.expect_token(&Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            Token::Plus => {
                self.next_token();
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Plus,
                    expr: Box::new(self.parse_subexpr(UNARY_PREC)?),
                })
            }
            Token::Minus => {
                self.next_token();
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(self.parse_subexpr(UNARY_PREC)?),
                })
            }
            Token::Word(w) => match w.keyword {
                Keyword::TRUE => {
                    self.next_token();
                    Ok(Expr::Value(Value::Boolean(true)))
                }
                Keyword::FALSE => {
                    self.next_token();
                    Ok(Expr::Value(Value::Boolean(false)))
                }
                Keyword::NULL => {
                    self.next_token();
                    Ok(Expr::Value(Value::Null))
                }
                Keyword::NOT => {
                    self.next_token();
                    Ok(Expr::UnaryOp {
                        op: UnaryOperator::Not,
                        expr: Box::new(self.parse_subexpr(NOT_PREC)?),
                    })
                }
                Keyword::CASE => {
                    self.next_token();
                    self.parse_case_expr()
                }
                _ => {
                    if self.peek_nth_token(1) == &Token::LParen && w.quote_style.is_none() {
                        self.next_token();
                        return self.parse_function(&w);
                    }
                    if w.quote_style.is_none() && RESERVED_FOR_EXPR_START.contains(&w.keyword) {
                        return self.expected("an expression");
                    }
                    self.next_token();
                    self.parse_identifier_expr(&w)
                }
            },
            _ => self.expected("an expression"),
        }
    }

    fn parse_case_expr(&mut self) -> Result<Expr> {
        let operand = if self.peek_keyword(Keyword::WHEN) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let mut conditions = vec![];
        let mut results = vec![];
        self.expect_keyword(Keyword::WHEN)?;
        loop {
            conditions.push(self.parse_expr()?);
            self.expect_keyword(Keyword::THEN)?;
            results.push(self.parse_expr()?);
            if !self.parse_keyword(Keyword::WHEN) {
                break;
            }
        }
        let else_result = if self.parse_keyword(Keyword::ELSE) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::END)?;
        Ok(Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        })
    }

    fn parse_function(&mut self, word: &Word) -> Result<Expr> {
        let name = word_to_object_name(word)?;
        self.expect_token(&Token::LParen)?;
        let mut distinct = false;
        let mut args = vec![];
        if !self.consume_token(&Token::RParen) {
            distinct = self.parse_keyword(Keyword::DISTINCT);
            args = self.parse_comma_separated(|parser| {
                if parser.consume_token(&Token::Mul) {
                    Ok(FunctionArg::Wildcard)
                } else {
                    Ok(FunctionArg::Expr(parser.parse_expr()?))
                }
            })?;
            self.expect_token(&Token::RParen)?;
        }
        let over = if self.parse_keyword(Keyword::OVER) {
            self.expect_token(&Token::LParen)?;
            let partition_by = if self.parse_keywords(&[Keyword::PARTITION, Keyword::BY]) {
                self.parse_comma_separated(Parser::parse_expr)?
            } else {
                vec![]
            };
            let order_by = if self.parse_keywords(&[Keyword::ORDER, Keyword::BY]) {
                self.parse_comma_separated(Parser::parse_order_by_expr)?
            } else {
                vec![]
            };
            self.expect_token(&Token::RParen)?;
            Some(WindowSpec {
                partition_by,
                order_by,
            })
        } else {
            None
        };
        Ok(Expr::Function(Function {
            name,
            args,
            distinct,
            over,
        }))
    }

    fn parse_identifier_expr(&mut self, word: &Word) -> Result<Expr> {
        let mut parts = word_to_idents(word)?;
        while self.consume_token(&Token::Period) {
            match self.next_token().clone() {
                Token::Word(w) => parts.extend(word_to_idents(&w)?),
                token => return Err(Error::parse("expected an identifier after '.'", token.to_string())),
            }
        }
        if parts.len() == 1 {
            Ok(Expr::Identifier(parts.pop().unwrap_or_else(|| Ident::new(""))))
        } else {
            Ok(Expr::CompoundIdentifier(parts))
        }
    }

    fn get_next_precedence(&self) -> u8 {
        match self.peek_token() {
            Token::Word(w) => match w.keyword {
                Keyword::OR => OR_PREC,
                Keyword::AND => AND_PREC,
                Keyword::IS => IS_PREC,
                Keyword::IN | Keyword::LIKE | Keyword::BETWEEN => CMP_PREC,
                Keyword::NOT => match self.peek_nth_token(1) {
                    Token::Word(next) => match next.keyword {
                        Keyword::IN | Keyword::LIKE | Keyword::BETWEEN => CMP_PREC,
                        _ => 0,
                    },
                    _ => 0,
                },
                _ => 0,
            },
            Token::Eq | Token::Neq | Token::Lt | Token::LtEq | Token::Gt | Token::GtEq => CMP_PREC,
            Token::Plus | Token::Minus => PLUS_MINUS_PREC,
            Token::Mul | Token::Div => MUL_DIV_PREC,
            _ => 0,
        }
    }

    fn parse_infix(&mut self, expr: Expr, precedence: u8) -> Result<Expr> {
        let token = self.next_token().clone();
        let regular_binary_operator = match &token {
            Token::Eq => Some(BinaryOperator::Eq),
            Token::Neq => Some(BinaryOperator::NotEq),
            Token::Lt => Some(BinaryOperator::Lt),
            Token::LtEq => Some(BinaryOperator::LtEq),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::GtEq => Some(BinaryOperator::GtEq),
            Token::Plus => Some(BinaryOperator::Plus),
            Token::Minus => Some(BinaryOperator::Minus),
            Token::Mul => Some(BinaryOperator::Multiply),
            Token::Div => Some(BinaryOperator::Divide),
            Token::Word(w) => match w.keyword {
                Keyword::AND => Some(BinaryOperator::And),
                Keyword::OR => Some(BinaryOperator::Or),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = regular_binary_operator {
            return Ok(Expr::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(self.parse_subexpr(precedence)?),
            });
        }

        match &token {
            Token::Word(w) => match w.keyword {
                Keyword::IS => {
                    let negated = self.parse_keyword(Keyword::NOT);
                    self.expect_keyword(Keyword::NULL)?;
                    if negated {
                        Ok(Expr::IsNotNull(Box::new(expr)))
                    } else {
                        Ok(Expr::IsNull(Box::new(expr)))
                    }
                }
                Keyword::IN => self.parse_in(expr, false),
                Keyword::LIKE => self.parse_like(expr, false),
                Keyword::BETWEEN => self.parse_between(expr, false),
                Keyword::NOT => {
                    if self.parse_keyword(Keyword::IN) {
                        self.parse_in(expr, true)
                    } else if self.parse_keyword(Keyword::LIKE) {
                        self.parse_like(expr, true)
                    } else if self.parse_keyword(Keyword::BETWEEN) {
                        self.parse_between(expr, true)
                    } else {
                        self.expected("IN, LIKE, or BETWEEN after NOT")
                    }
                }
                _ => self.expected("an infix operator"),
            },
            _ => self.expected("an infix operator"),
        }
    }

    fn parse_in(&mut self, expr: Expr, negated: bool) -> Result<Expr> {
        self.expect_token(&Token::LParen)?;
        let list = self.parse_comma_separated(Parser::parse_expr)?;
        self.expect_token(&Token::RParen)?;
        Ok(Expr::InList {
            expr: Box::new(expr),
            list,
            negated,
        })
    }

    fn parse_like(&mut self, expr: Expr, negated: bool) -> Result<Expr> {
        let pattern = self.parse_subexpr(CMP_PREC)?;
        let escape_char = if self.parse_keyword(Keyword::ESCAPE) {
            match self.next_token().clone() {
                Token::SingleQuotedString(s) if s.chars().count() == 1 => s.chars().next(),
                token => {
                    return Err(Error::parse(
                        "ESCAPE requires a single-character string",
                        token.to_string(),
                    ))
                }
            }
        } else {
            None
        };
        Ok(Expr::Like {
            negated,
            expr: Box::new(expr),
            pattern: Box::new(pattern),
            escape_char,
        })
    }

    fn parse_between(&mut self, expr: Expr, negated: bool) -> Result<Expr> {
        // The low bound stops before AND, which separates it from the high
        // bound rather than acting as a logical connective.
        let low = self.parse_subexpr(CMP_PREC + 1)?;
        self.expect_keyword(Keyword::AND)?;
        let high = self.parse_subexpr(CMP_PREC + 1)?;
        Ok(Expr::Between {
            expr: Box::new(expr),
            negated,
            low: Box::new(low),
            high: Box::new(high),
        })
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek_token(&self) -> &Token {
        self.peek_nth_token(0)
    }

    fn peek_nth_token(&self, n: usize) -> &Token {
        self.tokens.get(self.index + n).unwrap_or(&Token::EOF)
    }

    fn next_token(&mut self) -> &Token {
        let token = self.tokens.get(self.index).unwrap_or(&Token::EOF);
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    /// Consumes the next token if it matches the expected keyword.
    fn parse_keyword(&mut self, expected: Keyword) -> bool {
        match self.peek_token() {
            Token::Word(w) if w.keyword == expected => {
                self.next_token();
                true
            }
            _ => false,
        }
    }

    fn peek_keyword(&self, expected: Keyword) -> bool {
        matches!(self.peek_token(), Token::Word(w) if w.keyword == expected)
    }

    /// Consumes the next tokens if they match the expected sequence of
    /// keywords, otherwise leaves the position unchanged.
    fn parse_keywords(&mut self, expected: &[Keyword]) -> bool {
        let start = self.index;
        for &keyword in expected {
            if !self.parse_keyword(keyword) {
                self.index = start;
                return false;
            }
        }
        true
    }

    fn expect_keyword(&mut self, expected: Keyword) -> Result<()> {
        if self.parse_keyword(expected) {
            Ok(())
        } else {
            self.expected(&format!("keyword {expected:?}"))
        }
    }

    fn consume_token(&mut self, expected: &Token) -> bool {
        if self.peek_token() == expected {
            self.next_token();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<()> {
        if self.consume_token(expected) {
            Ok(())
        } else {
            self.expected(&format!("{expected}"))
        }
    }

    /// Parse a comma-separated list of 1+ items accepted by `f`
    fn parse_comma_separated<T, F>(&mut self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Parser) -> Result<T>,
    {
        let mut values = vec![];
        loop {
            values.push(f(self)?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(values)
    }

    fn parse_identifier(&mut self) -> Result<Ident> {
        match self.next_token().clone() {
            Token::Word(w) => {
                let mut idents = word_to_idents(&w)?;
                if idents.len() != 1 {
                    return Err(Error::parse("expected a plain identifier", w.to_string()));
                }
                Ok(idents.pop().unwrap_or_else(|| Ident::new("")))
            }
            token => Err(Error::parse("expected an identifier", token.to_string())),
        }
    }

    fn parse_object_name(&mut self) -> Result<ObjectName> {
        match self.next_token().clone() {
            Token::Word(w) => {
                let mut parts = word_to_idents(&w)?;
                while self.consume_token(&Token::Period) {
                    match self.next_token().clone() {
                        Token::Word(w) => parts.extend(word_to_idents(&w)?),
                        token => {
                            return Err(Error::parse(
                                "expected an identifier after '.'",
                                token.to_string(),
                            ))
                        }
                    }
                }
                Ok(ObjectName(parts))
            }
            token => Err(Error::parse("expected an object name", token.to_string())),
        }
    }

    fn expected<T>(&self, expected: &str) -> Result<T> {
        Err(Error::parse(
            format!("expected {expected}"),
            self.peek_token().to_string(),
        ))
    }
}

/// Splits an unquoted word on its embedded `.` separators; quoted words are
/// a single part and keep their case.
fn word_to_idents(word: &Word) -> Result<Vec<Ident>> {
    if word.quote_style.is_some() {
        return Ok(vec![Ident {
            value: word.value.clone(),
            quote_style: word.quote_style,
        }]);
    }
    let mut idents = vec![];
    for part in word.value.split('.') {
        if part.is_empty() {
            return Err(Error::parse("malformed identifier", word.value.clone()));
        }
        idents.push(Ident::new(part));
    }
    Ok(idents)
}

fn word_to_ident(word: &Word) -> Result<Ident> {
    let mut idents = word_to_idents(word)?;
    if idents.len() != 1 {
        return Err(Error::parse("expected a plain identifier", word.value.clone()));
    }
    Ok(idents.pop().unwrap_or_else(|| Ident::new("")))
}

fn word_to_object_name(word: &Word) -> Result<ObjectName> {
    Ok(ObjectName(word_to_idents(word)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified(sql: &str) {
        let statement = Parser::parse_sql(sql).unwrap();
        assert_eq!(statement.to_string(), sql);
    }

    #[test]
    fn parse_select_round_trips() {
        verified("SELECT name, age FROM users WHERE age > 25 ORDER BY age DESC");
        verified("SELECT DISTINCT region FROM sales");
        verified("SELECT * FROM t LIMIT 10 OFFSET 5");
        verified("SELECT region, SUM(amount) AS total FROM sales GROUP BY region HAVING SUM(amount) > 15");
    }

    #[test]
    fn parse_join_round_trips() {
        verified("SELECT u.name, o.amount FROM users u JOIN orders o ON u.id = o.user_id");
        verified("SELECT * FROM a LEFT JOIN b ON a.x = b.y RIGHT JOIN c ON b.y = c.z");
    }

    #[test]
    fn parse_set_operations() {
        verified("SELECT a FROM t UNION SELECT a FROM u");
        verified("SELECT a FROM t UNION ALL SELECT a FROM u EXCEPT SELECT a FROM v");
    }

    #[test]
    fn parse_with_cte() {
        verified("WITH big AS (SELECT * FROM sales WHERE amount > 10) SELECT region FROM big");
    }

    #[test]
    fn parse_case_in_like_between() {
        verified("SELECT CASE WHEN a > 1 THEN 'hi' ELSE 'lo' END FROM t");
        verified("SELECT * FROM t WHERE a IN (1, 2, 3)");
        verified("SELECT * FROM t WHERE name LIKE 'a%' ESCAPE '\\'");
        verified("SELECT * FROM t WHERE a BETWEEN 1 AND 10 AND b = 2");
        verified("SELECT * FROM t WHERE a NOT IN (1) AND b NOT LIKE 'x_'");
    }

    #[test]
    fn parse_ddl_round_trips() {
        verified("CREATE TABLE users (id INT64 PRIMARY KEY, name TEXT, org INT64 REFERENCES orgs (id))");
        verified("CREATE TEMP TABLE scratch (v FLOAT64)");
        verified("CREATE TABLE copy AS SELECT * FROM users");
        verified("DROP TABLE IF EXISTS users");
        verified("ALTER TABLE users ADD COLUMN age INT64");
        verified("CREATE VIEW adults AS SELECT * FROM users WHERE age >= 18");
    }

    #[test]
    fn parse_dml_round_trips() {
        verified("INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')");
        verified("UPDATE users SET name = 'Carol', age = 30 WHERE id = 1");
        verified("DELETE FROM users WHERE age < 18");
    }

    #[test]
    fn parse_window_function() {
        verified(
            "SELECT name, ROW_NUMBER() OVER (PARTITION BY region ORDER BY amount DESC) FROM sales",
        );
        verified("SELECT LAG(amount, 2) OVER (ORDER BY day) FROM sales");
    }

    #[test]
    fn parse_tvf_in_from() {
        verified("SELECT * FROM VEC_SEARCH('docs', 'embedding', VEC_FROM_JSON('[1,0,0]'), 2, 'l2')");
    }

    #[test]
    fn parse_precedence() {
        let expr = Parser::parse_expr_sql("1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "1 + 2 * 3");
        match expr {
            Expr::BinaryOp { op, .. } => assert_eq!(op, BinaryOperator::Plus),
            other => panic!("expected binary op, got {other:?}"),
        }
        let expr = Parser::parse_expr_sql("NOT a = 1 AND b = 2").unwrap();
        match expr {
            Expr::BinaryOp { op, left, .. } => {
                assert_eq!(op, BinaryOperator::And);
                assert!(matches!(*left, Expr::UnaryOp { .. }));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn parse_errors_stop_at_first() {
        assert!(Parser::parse_sql("SELECT FROM").is_err());
        assert!(Parser::parse_sql("CREATE TABLE t (a WIDGET)").is_err());
        assert!(Parser::parse_sql("SELECT 1 SELECT 2").is_err());
    }

    #[test]
    fn keywords_usable_as_column_names() {
        verified("SELECT timestamp FROM events");
        verified("SELECT key FROM settings");
    }
}
