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
//! Scalar, aggregate, and window functions exercised through full SQL.

use microsql::{Engine, Error, Value};
use pretty_assertions::assert_eq;

fn scalar(engine: &Engine, expr: &str) -> Value {
    let sql = format!("SELECT {expr} AS out");
    let result = engine.execute(&sql).unwrap();
    result.rows[0].get("out").cloned().unwrap()
}

#[test]
fn string_scalars() {
    let engine = Engine::new();
    assert_eq!(scalar(&engine, "UPPER('abc')"), Value::Text("ABC".into()));
    assert_eq!(scalar(&engine, "CONCAT('a', 'b', 'c')"), Value::Text("abc".into()));
    assert_eq!(
        scalar(&engine, "CONCAT_WS('-', '1', NULL, '3')"),
        Value::Text("1-3".into())
    );
    assert_eq!(scalar(&engine, "REVERSE('abc')"), Value::Text("cba".into()));
    assert_eq!(scalar(&engine, "SUBSTR('hello', 2)"), Value::Text("ello".into()));
    assert_eq!(scalar(&engine, "STARTS_WITH('hello', 'he')"), Value::Bool(true));
    assert_eq!(scalar(&engine, "LENGTH('héllo')"), Value::Int(5));
}

#[test]
fn math_scalars() {
    let engine = Engine::new();
    assert_eq!(scalar(&engine, "ABS(-5)"), Value::Int(5));
    assert_eq!(scalar(&engine, "ROUND(2.5)"), Value::Int(3));
    assert_eq!(scalar(&engine, "GREATEST(1, 9, 4)"), Value::Int(9));
    assert_eq!(scalar(&engine, "LEAST(1, 9, NULL, 4)"), Value::Int(1));
    assert_eq!(scalar(&engine, "SIGN(-2.5)"), Value::Int(-1));
    assert_eq!(scalar(&engine, "MOD(9, 4)"), Value::Int(1));
    match scalar(&engine, "SQRT(2)") {
        Value::Float(f) => assert!((f - std::f64::consts::SQRT_2).abs() < 1e-12),
        other => panic!("expected float, got {other:?}"),
    }
    let err = engine.execute("SELECT LN(0)").unwrap_err();
    assert!(matches!(err, Error::Domain(_)), "got {err:?}");
}

#[test]
fn conditional_scalars() {
    let engine = Engine::new();
    assert_eq!(scalar(&engine, "COALESCE(NULL, NULL, 7)"), Value::Int(7));
    assert_eq!(scalar(&engine, "NULLIF(3, 3)"), Value::Null);
    assert_eq!(scalar(&engine, "IFNULL(NULL, 'x')"), Value::Text("x".into()));
    assert_eq!(scalar(&engine, "IF(1 > 0, 'yes', 'no')"), Value::Text("yes".into()));
    assert_eq!(scalar(&engine, "TYPEOF(1.5)"), Value::Text("FLOAT64".into()));
}

#[test]
fn date_scalars() {
    let engine = Engine::new();
    assert_eq!(
        scalar(&engine, "DATE_PART('year', '2024-06-30T12:00:00Z')"),
        Value::Int(2024)
    );
    assert_eq!(
        scalar(&engine, "DATE_DIFF('day', '2024-01-01', '2024-01-31')"),
        Value::Int(30)
    );
    assert_eq!(
        scalar(&engine, "STRFTIME('%Y-%m', '2024-06-30')"),
        Value::Text("2024-06".into())
    );
    // NOW is impure but must at least produce a timestamp.
    assert!(matches!(scalar(&engine, "NOW()"), Value::Timestamp(_)));
}

#[test]
fn regex_and_json_scalars() {
    let engine = Engine::new();
    assert_eq!(
        scalar(&engine, "REGEXP_REPLACE('a1b2', '[0-9]', '#')"),
        Value::Text("a#b#".into())
    );
    assert_eq!(
        scalar(&engine, r#"JSON_GET('{"user": {"tags": ["x", "y"]}}', 'user.tags[1]')"#),
        Value::Text("y".into())
    );
    assert_eq!(
        scalar(&engine, r#"JSON_ARRAY_LENGTH('[1, 2, 3]')"#),
        Value::Int(3)
    );
    assert_eq!(scalar(&engine, "JSON_VALID('{]')"), Value::Bool(false));
    let err = engine.execute("SELECT REGEXP_MATCHES('x', '(')").unwrap_err();
    assert!(matches!(err, Error::Domain(_)), "got {err:?}");
}

#[test]
fn hash_scalars() {
    let engine = Engine::new();
    assert_eq!(
        scalar(&engine, "MD5('abc')"),
        Value::Text("900150983cd24fb0d6963f7d28e17f72".into())
    );
    assert_eq!(scalar(&engine, "HEX('hi')"), Value::Text("6869".into()));
    assert_eq!(scalar(&engine, "TO_BASE64('hi')"), Value::Text("aGk=".into()));
}

fn engine_with_nums() -> Engine {
    let engine = Engine::new();
    engine.execute("CREATE TABLE nums (val INT64)").unwrap();
    engine
        .execute("INSERT INTO nums VALUES (10), (20), (30), (40), (50)")
        .unwrap();
    engine
}

#[test]
fn median_is_exact() {
    let engine = engine_with_nums();
    let result = engine.execute("SELECT MEDIAN(val) FROM nums").unwrap();
    assert_eq!(result.rows[0].get("median(val)"), Some(&Value::Int(30)));
}

#[test]
fn aggregates_over_empty_input() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE empty (v INT64)").unwrap();
    let result = engine
        .execute(
            "SELECT COUNT(*) AS c, SUM(v) AS s, AVG(v) AS a, MIN(v) AS lo, MAX(v) AS hi FROM empty",
        )
        .unwrap();
    let row = &result.rows[0];
    assert_eq!(row.get("c"), Some(&Value::Int(0)));
    assert_eq!(row.get("s"), Some(&Value::Null));
    assert_eq!(row.get("a"), Some(&Value::Null));
    assert_eq!(row.get("lo"), Some(&Value::Null));
    assert_eq!(row.get("hi"), Some(&Value::Null));
}

#[test]
fn count_distinct_ignores_nulls() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE t (v INT64)").unwrap();
    engine
        .execute("INSERT INTO t VALUES (1), (1), (2), (NULL), (NULL)")
        .unwrap();
    let result = engine
        .execute("SELECT COUNT(DISTINCT v) AS d, COUNT(v) AS c, COUNT(*) AS all_rows FROM t")
        .unwrap();
    let row = &result.rows[0];
    assert_eq!(row.get("d"), Some(&Value::Int(2)));
    assert_eq!(row.get("c"), Some(&Value::Int(3)));
    assert_eq!(row.get("all_rows"), Some(&Value::Int(5)));
}

#[test]
fn group_concat_and_argmax() {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE people (name TEXT, age INT64)")
        .unwrap();
    engine
        .execute("INSERT INTO people VALUES ('alice', 30), ('bob', 22), ('carol', 45)")
        .unwrap();
    let result = engine
        .execute(
            "SELECT GROUP_CONCAT(name) AS names, MAX_BY(name, age) AS oldest, \
             MIN_BY(name, age) AS youngest FROM people",
        )
        .unwrap();
    let row = &result.rows[0];
    assert_eq!(row.get("names"), Some(&Value::Text("alice,bob,carol".into())));
    assert_eq!(row.get("oldest"), Some(&Value::Text("carol".into())));
    assert_eq!(row.get("youngest"), Some(&Value::Text("bob".into())));
}

fn engine_with_series() -> Engine {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE series (region TEXT, day INT64, amount INT64)")
        .unwrap();
    engine
        .execute(
            "INSERT INTO series VALUES \
             ('north', 1, 10), ('north', 2, 30), ('north', 3, 20), \
             ('south', 1, 5), ('south', 2, 5)",
        )
        .unwrap();
    engine
}

#[test]
fn row_number_partitions() {
    let engine = engine_with_series();
    let result = engine
        .execute(
            "SELECT region, amount, \
             ROW_NUMBER() OVER (PARTITION BY region ORDER BY amount DESC) AS rn \
             FROM series",
        )
        .unwrap();
    // Input order is preserved; the row number reflects in-partition rank.
    let rns: Vec<_> = result
        .rows
        .iter()
        .map(|r| r.get("rn").cloned().unwrap())
        .collect();
    assert_eq!(
        rns,
        vec![
            Value::Int(3), // north 10
            Value::Int(1), // north 30
            Value::Int(2), // north 20
            Value::Int(1), // south 5 (first by input order on tie)
            Value::Int(2), // south 5
        ]
    );
}

#[test]
fn lag_and_lead() {
    let engine = engine_with_series();
    let result = engine
        .execute(
            "SELECT day, LAG(amount) OVER (PARTITION BY region ORDER BY day) AS prev, \
             LEAD(amount) OVER (PARTITION BY region ORDER BY day) AS next \
             FROM series WHERE region = 'north' ORDER BY day",
        )
        .unwrap();
    assert_eq!(result.rows[0].get("prev"), Some(&Value::Null));
    assert_eq!(result.rows[0].get("next"), Some(&Value::Int(30)));
    assert_eq!(result.rows[1].get("prev"), Some(&Value::Int(10)));
    assert_eq!(result.rows[2].get("prev"), Some(&Value::Int(30)));
    assert_eq!(result.rows[2].get("next"), Some(&Value::Null));
}

#[test]
fn rank_and_dense_rank() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE scores (s INT64)").unwrap();
    engine
        .execute("INSERT INTO scores VALUES (100), (90), (90), (80)")
        .unwrap();
    let result = engine
        .execute(
            "SELECT s, RANK() OVER (ORDER BY s DESC) AS r, \
             DENSE_RANK() OVER (ORDER BY s DESC) AS d FROM scores ORDER BY s DESC",
        )
        .unwrap();
    let pairs: Vec<_> = result
        .rows
        .iter()
        .map(|r| (r.get("r").cloned().unwrap(), r.get("d").cloned().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (Value::Int(1), Value::Int(1)),
            (Value::Int(2), Value::Int(2)),
            (Value::Int(2), Value::Int(2)),
            (Value::Int(4), Value::Int(3)),
        ]
    );
}

#[test]
fn moving_aggregates() {
    let engine = engine_with_series();
    let result = engine
        .execute(
            "SELECT day, MOVING_SUM(amount, 2) OVER (PARTITION BY region ORDER BY day) AS ms \
             FROM series WHERE region = 'north' ORDER BY day",
        )
        .unwrap();
    let sums: Vec<_> = result
        .rows
        .iter()
        .map(|r| r.get("ms").cloned().unwrap())
        .collect();
    assert_eq!(
        sums,
        vec![Value::Float(10.0), Value::Float(40.0), Value::Float(50.0)]
    );
}

#[test]
fn window_function_requires_over() {
    let engine = engine_with_series();
    let err = engine
        .execute("SELECT ROW_NUMBER() FROM series")
        .unwrap_err();
    assert!(matches!(err, Error::Name(_) | Error::State(_)), "got {err:?}");
}

#[test]
fn aggregate_outside_grouping_context_is_state_error() {
    let engine = engine_with_series();
    let err = engine
        .execute("SELECT day FROM series WHERE SUM(amount) > 10")
        .unwrap_err();
    assert!(matches!(err, Error::State(_)), "got {err:?}");
}

#[test]
fn sys_functions_lists_registries() {
    let engine = Engine::new();
    let result = engine
        .execute("SELECT name FROM sys.functions WHERE function_type = 'AGGREGATE'")
        .unwrap();
    let names: Vec<String> = result
        .rows
        .iter()
        .map(|r| r.get("name").cloned().unwrap().as_text())
        .collect();
    assert!(names.contains(&"SUM".to_string()));
    assert!(names.contains(&"MEDIAN".to_string()));

    let tvf = engine
        .execute("SELECT name FROM sys.functions WHERE function_type = 'TABLE'")
        .unwrap();
    assert_eq!(tvf.len(), 1);
    assert_eq!(tvf.rows[0].get("name"), Some(&Value::Text("VEC_SEARCH".into())));
}
