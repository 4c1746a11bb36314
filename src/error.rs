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

//! Typed errors shared by the tokenizer, parser, and executor.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of the engine. Each variant carries a single-sentence
/// message; lex and parse errors additionally carry the offending text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Tokenizer failure, e.g. an unterminated string literal.
    #[error("lex error at line {line}, column {column}: {message}")]
    Lex {
        message: String,
        line: u64,
        column: u64,
    },

    /// Parser failure: unexpected token, missing keyword or symbol.
    #[error("parse error: {message} (near {token:?})")]
    Parse { message: String, token: String },

    /// A value could not be coerced, or vector dimensions disagree.
    #[error("type error: {0}")]
    Type(String),

    /// Unknown table, column, tenant, or function.
    #[error("name error: {0}")]
    Name(String),

    /// Primary key duplicate, missing foreign key target, or arity mismatch.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Wrong arity or argument kind for a builtin, bad LIMIT/OFFSET.
    #[error("argument error: {0}")]
    Argument(String),

    /// Division by zero, log of a non-positive number, invalid regex or
    /// JSON path.
    #[error("domain error: {0}")]
    Domain(String),

    /// Misuse of an aggregate or window function outside its context.
    #[error("state error: {0}")]
    State(String),

    /// The caller's cancellation token was observed.
    #[error("statement canceled")]
    Canceled,
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>, token: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            token: token.into(),
        }
    }
}
