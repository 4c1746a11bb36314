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

//! This module defines
//! 1) a `Keyword` enum with a variant for every keyword the dialect
//!    recognizes, plus `Keyword::NoKeyword` for plain identifiers;
//! 2) an `ALL_KEYWORDS` array, sorted so identifier-like tokens can be
//!    classified with a binary search.
//!
//! The keyword set is closed: most of these can still be parsed as
//! identifiers when the grammar allows it (e.g. a column named
//! `timestamp`), so adding a keyword here does not by itself reserve it.

/// Defines a string constant for a single keyword: `kw_def!(SELECT);`
/// expands to `pub const SELECT = "SELECT";`
macro_rules! kw_def {
    ($ident:ident = $string_keyword:expr) => {
        pub const $ident: &'static str = $string_keyword;
    };
    ($ident:ident) => {
        kw_def!($ident = stringify!($ident));
    };
}

/// Expands to a list of `kw_def!()` invocations for each keyword, a
/// `Keyword` enum, and the `ALL_KEYWORDS` lookup tables.
macro_rules! define_keywords {
    ($(
        $ident:ident $(= $string_keyword:expr)?
    ),*) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[allow(non_camel_case_types)]
        pub enum Keyword {
            NoKeyword,
            $($ident),*
        }

        pub const ALL_KEYWORDS_INDEX: &[Keyword] = &[
            $(Keyword::$ident),*
        ];

        $(kw_def!($ident $(= $string_keyword)?);)*

        pub const ALL_KEYWORDS: &[&str] = &[
            $($ident),*
        ];
    };
}

// The following keywords are sorted to be able to match using binary search.
define_keywords!(
    ADD,
    ALL,
    ALTER,
    AND,
    ARRAY,
    AS,
    ASC,
    BETWEEN,
    BOOL,
    BOOLEAN,
    BY,
    CASE,
    COLUMN,
    CREATE,
    CURRENT,
    DATE,
    DATETIME,
    DELETE,
    DESC,
    DISTINCT,
    DOUBLE,
    DROP,
    DURATION,
    ELSE,
    END,
    ESCAPE,
    EXCEPT,
    EXISTS,
    FALSE,
    FLOAT,
    FLOAT32,
    FLOAT64,
    FOLLOWING,
    FOREIGN,
    FROM,
    GROUP,
    HAVING,
    IF,
    IN,
    INDEX,
    INSERT,
    INT,
    INT16,
    INT32,
    INT64,
    INT8,
    INTERFACE,
    INTERSECT,
    INTO,
    IS,
    JOIN,
    JSON,
    JSONB,
    KEY,
    LEFT,
    LIKE,
    LIMIT,
    MAP,
    NOT,
    NULL,
    OFFSET,
    ON,
    OR,
    ORDER,
    OUTER,
    OVER,
    PARTITION,
    POINTER,
    PRECEDING,
    PRIMARY,
    PTR,
    RANGE,
    RECURSIVE,
    REFERENCES,
    REPLACE,
    RIGHT,
    ROW,
    ROWS,
    SELECT,
    SET,
    SLICE,
    STRING,
    TABLE,
    TEMP,
    TEXT,
    THEN,
    TIMESTAMP,
    TRUE,
    UINT16,
    UINT32,
    UINT64,
    UINT8,
    UNBOUNDED,
    UNION,
    UNIQUE,
    UPDATE,
    VALUES,
    VECTOR,
    VIEW,
    WHEN,
    WHERE,
    WITH
);

impl Keyword {
    /// Classifies an identifier-like token, returning `Keyword::NoKeyword`
    /// when the (uppercased) text is not in the closed set.
    pub fn classify(upper: &str) -> Keyword {
        match ALL_KEYWORDS.binary_search(&upper) {
            Ok(idx) => ALL_KEYWORDS_INDEX[idx],
            Err(_) => Keyword::NoKeyword,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_sorted() {
        let mut sorted = ALL_KEYWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, ALL_KEYWORDS);
    }

    #[test]
    fn classify_known_and_unknown() {
        assert_eq!(Keyword::classify("SELECT"), Keyword::SELECT);
        assert_eq!(Keyword::classify("VECTOR"), Keyword::VECTOR);
        assert_eq!(Keyword::classify("FOO"), Keyword::NoKeyword);
    }
}
