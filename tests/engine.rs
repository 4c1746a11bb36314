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
//! End-to-end statement execution tests.

use microsql::{CancelToken, Engine, Error, Value};
use pretty_assertions::assert_eq;

fn engine_with_users() -> Engine {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE users (id INT64 PRIMARY KEY, name TEXT, age INT64, city TEXT)")
        .unwrap();
    engine
        .execute(
            "INSERT INTO users VALUES \
             (1, 'Alice', 25, 'NY'), (2, 'Bob', 22, 'LDN'), (3, 'Carol', 30, 'Paris')",
        )
        .unwrap();
    engine
}

fn engine_with_sales() -> Engine {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE sales (region TEXT, amount INT64)")
        .unwrap();
    engine
        .execute("INSERT INTO sales VALUES ('north', 10), ('north', 20), ('south', 5)")
        .unwrap();
    engine
}

#[test]
fn filter_and_order() {
    let engine = engine_with_users();
    let result = engine
        .execute("SELECT name, age FROM users WHERE age > 25 ORDER BY age DESC")
        .unwrap();
    assert_eq!(result.columns, vec!["name".to_string(), "age".to_string()]);
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0].get("name"), Some(&Value::Text("Carol".into())));
    assert_eq!(result.rows[0].get("age"), Some(&Value::Int(30)));
}

#[test]
fn group_by_having() {
    let engine = engine_with_sales();
    let result = engine
        .execute(
            "SELECT region, SUM(amount) AS total FROM sales \
             GROUP BY region HAVING SUM(amount) > 15",
        )
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0].get("region"), Some(&Value::Text("north".into())));
    assert_eq!(result.rows[0].get("total"), Some(&Value::Int(30)));
}

#[test]
fn inner_join_on_equality() {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE users (id INT64 PRIMARY KEY, name TEXT)")
        .unwrap();
    engine
        .execute("CREATE TABLE orders (user_id INT64, amount FLOAT64)")
        .unwrap();
    engine
        .execute("INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob')")
        .unwrap();
    engine
        .execute("INSERT INTO orders VALUES (1, 100.50), (2, 75.25)")
        .unwrap();

    let result = engine
        .execute("SELECT u.name, o.amount FROM users u JOIN orders o ON u.id = o.user_id")
        .unwrap();
    assert_eq!(result.columns, vec!["u.name".to_string(), "o.amount".to_string()]);
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[0].get("u.name"), Some(&Value::Text("Alice".into())));
    assert_eq!(result.rows[0].get("o.amount"), Some(&Value::Float(100.50)));
    assert_eq!(result.rows[1].get("u.name"), Some(&Value::Text("Bob".into())));
    assert_eq!(result.rows[1].get("o.amount"), Some(&Value::Float(75.25)));
}

#[test]
fn hash_and_nested_loop_joins_agree() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE a (x INT64)").unwrap();
    engine.execute("CREATE TABLE b (y INT64)").unwrap();
    engine
        .execute("INSERT INTO a VALUES (1), (2), (2), (3), (NULL)")
        .unwrap();
    engine
        .execute("INSERT INTO b VALUES (2), (2), (3), (4), (NULL)")
        .unwrap();

    // The first form takes the hash-join path, the second (non-column
    // operand) falls back to the nested loop.
    let hash = engine
        .execute("SELECT a.x, b.y FROM a JOIN b ON a.x = b.y ORDER BY a.x, b.y")
        .unwrap();
    let nested = engine
        .execute("SELECT a.x, b.y FROM a JOIN b ON a.x + 0 = b.y ORDER BY a.x, b.y")
        .unwrap();
    assert_eq!(hash.rows, nested.rows);
    // 2 matches twice on each side plus one 3: 2*2 + 1.
    assert_eq!(hash.len(), 5);
}

#[test]
fn left_and_right_joins_preserve_unmatched() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE l (id INT64, v TEXT)").unwrap();
    engine.execute("CREATE TABLE r (id INT64, w TEXT)").unwrap();
    engine
        .execute("INSERT INTO l VALUES (1, 'one'), (2, 'two')")
        .unwrap();
    engine
        .execute("INSERT INTO r VALUES (2, 'deux'), (3, 'trois')")
        .unwrap();

    let left = engine
        .execute("SELECT l.id, r.w FROM l LEFT JOIN r ON l.id = r.id")
        .unwrap();
    assert_eq!(left.len(), 2);
    assert_eq!(left.rows[0].get("r.w"), Some(&Value::Null));
    assert_eq!(left.rows[1].get("r.w"), Some(&Value::Text("deux".into())));

    let right = engine
        .execute("SELECT l.v, r.id FROM l RIGHT JOIN r ON l.id = r.id")
        .unwrap();
    assert_eq!(right.len(), 2);
    assert_eq!(right.rows[0].get("l.v"), Some(&Value::Text("two".into())));
    assert_eq!(right.rows[1].get("l.v"), Some(&Value::Null));
}

#[test]
fn order_by_is_stable_with_null_rules() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE t (k INT64, tag TEXT)").unwrap();
    engine
        .execute(
            "INSERT INTO t VALUES (2, 'a'), (1, 'b'), (2, 'c'), (NULL, 'd'), (1, 'e')",
        )
        .unwrap();

    let asc = engine.execute("SELECT k, tag FROM t ORDER BY k").unwrap();
    let tags: Vec<_> = asc
        .rows
        .iter()
        .map(|r| r.get("tag").cloned().unwrap())
        .collect();
    // Ties keep insertion order; the null sorts last ascending.
    assert_eq!(
        tags,
        vec![
            Value::Text("b".into()),
            Value::Text("e".into()),
            Value::Text("a".into()),
            Value::Text("c".into()),
            Value::Text("d".into()),
        ]
    );

    let desc = engine.execute("SELECT k, tag FROM t ORDER BY k DESC").unwrap();
    assert_eq!(desc.rows[0].get("tag"), Some(&Value::Text("d".into())));
}

#[test]
fn limit_offset() {
    let engine = engine_with_users();
    let result = engine
        .execute("SELECT name FROM users ORDER BY id LIMIT 1 OFFSET 1")
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0].get("name"), Some(&Value::Text("Bob".into())));

    // LIMIT after ORDER BY, not before.
    let top = engine
        .execute("SELECT name FROM users ORDER BY age DESC LIMIT 1")
        .unwrap();
    assert_eq!(top.rows[0].get("name"), Some(&Value::Text("Carol".into())));
}

#[test]
fn set_operations() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE t1 (v INT64)").unwrap();
    engine.execute("CREATE TABLE t2 (v INT64)").unwrap();
    engine.execute("INSERT INTO t1 VALUES (1), (2), (2), (3)").unwrap();
    engine.execute("INSERT INTO t2 VALUES (3), (4)").unwrap();

    let union = engine
        .execute("SELECT v FROM t1 UNION SELECT v FROM t2 ORDER BY v")
        .unwrap();
    // Set-op suffixes attach to the last SELECT, so ORDER BY above belongs
    // to the right side; check values only.
    let mut values: Vec<i64> = union
        .rows
        .iter()
        .map(|r| match r.get("v") {
            Some(Value::Int(i)) => *i,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3, 4]);

    let union_all = engine
        .execute("SELECT v FROM t1 UNION ALL SELECT v FROM t2")
        .unwrap();
    assert_eq!(union_all.len(), 6);

    let except = engine
        .execute("SELECT v FROM t1 EXCEPT SELECT v FROM t2")
        .unwrap();
    let mut values: Vec<i64> = except
        .rows
        .iter()
        .map(|r| match r.get("v") {
            Some(Value::Int(i)) => *i,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);

    let intersect = engine
        .execute("SELECT v FROM t1 INTERSECT SELECT v FROM t2")
        .unwrap();
    assert_eq!(intersect.len(), 1);
    assert_eq!(intersect.rows[0].get("v"), Some(&Value::Int(3)));
}

#[test]
fn distinct_dedups_projected_rows() {
    let engine = engine_with_sales();
    let result = engine.execute("SELECT DISTINCT region FROM sales").unwrap();
    assert_eq!(result.len(), 2);
}

#[test]
fn with_cte() {
    let engine = engine_with_sales();
    let result = engine
        .execute(
            "WITH big AS (SELECT region, amount FROM sales WHERE amount >= 10) \
             SELECT region FROM big ORDER BY amount DESC",
        )
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[0].get("region"), Some(&Value::Text("north".into())));
}

#[test]
fn expression_only_select() {
    let engine = Engine::new();
    let result = engine.execute("SELECT 1 + 2 AS three, UPPER('ok') AS up").unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0].get("three"), Some(&Value::Int(3)));
    assert_eq!(result.rows[0].get("up"), Some(&Value::Text("OK".into())));
}

#[test]
fn update_and_delete_report_affected_rows() {
    let engine = engine_with_users();
    let updated = engine
        .execute("UPDATE users SET city = 'Berlin' WHERE age < 26")
        .unwrap();
    assert_eq!(updated.rows[0].get("rows_affected"), Some(&Value::Int(2)));

    let berlin = engine
        .execute("SELECT name FROM users WHERE city = 'Berlin' ORDER BY id")
        .unwrap();
    assert_eq!(berlin.len(), 2);

    let deleted = engine.execute("DELETE FROM users WHERE id = 1").unwrap();
    assert_eq!(deleted.rows[0].get("rows_affected"), Some(&Value::Int(1)));
    let rest = engine.execute("SELECT id FROM users").unwrap();
    assert_eq!(rest.len(), 2);
}

#[test]
fn primary_key_violation_rolls_back_multi_row_insert() {
    let engine = engine_with_users();
    let err = engine
        .execute("INSERT INTO users VALUES (10, 'Dan', 40, 'Rome'), (1, 'Eve', 41, 'Oslo')")
        .unwrap_err();
    assert!(matches!(err, Error::Constraint(_)), "got {err:?}");
    // All-or-nothing: Dan must not have been kept.
    let count = engine.execute("SELECT COUNT(*) AS n FROM users").unwrap();
    assert_eq!(count.rows[0].get("n"), Some(&Value::Int(3)));
}

#[test]
fn foreign_key_must_reference_existing_row() {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE orgs (id INT64 PRIMARY KEY, name TEXT)")
        .unwrap();
    engine
        .execute(
            "CREATE TABLE members (id INT64 PRIMARY KEY, org INT64 REFERENCES orgs (id))",
        )
        .unwrap();
    engine.execute("INSERT INTO orgs VALUES (1, 'acme')").unwrap();

    engine.execute("INSERT INTO members VALUES (1, 1)").unwrap();
    engine.execute("INSERT INTO members VALUES (2, NULL)").unwrap();
    let err = engine.execute("INSERT INTO members VALUES (3, 99)").unwrap_err();
    assert!(matches!(err, Error::Constraint(_)), "got {err:?}");
}

#[test]
fn insert_arity_mismatch_is_constraint_error() {
    let engine = engine_with_users();
    let err = engine.execute("INSERT INTO users VALUES (9, 'Zed')").unwrap_err();
    assert!(matches!(err, Error::Constraint(_)), "got {err:?}");
}

#[test]
fn create_table_as_select_and_insert_select() {
    let engine = engine_with_users();
    engine
        .execute("CREATE TABLE adults AS SELECT name, age FROM users WHERE age >= 25")
        .unwrap();
    let adults = engine.execute("SELECT name FROM adults").unwrap();
    assert_eq!(adults.len(), 2);

    engine
        .execute("INSERT INTO adults SELECT name, age FROM users WHERE age < 25")
        .unwrap();
    let all = engine.execute("SELECT COUNT(*) AS n FROM adults").unwrap();
    assert_eq!(all.rows[0].get("n"), Some(&Value::Int(3)));
}

#[test]
fn alter_table_add_column_backfills_null() {
    let engine = engine_with_users();
    engine
        .execute("ALTER TABLE users ADD COLUMN email TEXT")
        .unwrap();
    let result = engine.execute("SELECT email FROM users WHERE id = 1").unwrap();
    assert_eq!(result.rows[0].get("email"), Some(&Value::Null));
}

#[test]
fn views_replay_their_select() {
    let engine = engine_with_users();
    engine
        .execute("CREATE VIEW adults AS SELECT name FROM users WHERE age >= 25")
        .unwrap();
    let result = engine.execute("SELECT * FROM adults ORDER BY name").unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[0].get("name"), Some(&Value::Text("Alice".into())));

    engine.execute("INSERT INTO users VALUES (4, 'Dara', 50, 'Oslo')").unwrap();
    let result = engine.execute("SELECT * FROM adults").unwrap();
    assert_eq!(result.len(), 3);

    engine.execute("DROP VIEW adults").unwrap();
    assert!(engine.execute("SELECT * FROM adults").is_err());
}

#[test]
fn drop_table_if_exists() {
    let engine = Engine::new();
    assert!(engine.execute("DROP TABLE missing").is_err());
    engine.execute("DROP TABLE IF EXISTS missing").unwrap();
}

#[test]
fn tenants_are_isolated() {
    let engine = Engine::new();
    engine
        .execute_on("alpha", "CREATE TABLE t (v INT64)")
        .unwrap();
    engine.execute_on("alpha", "INSERT INTO t VALUES (1)").unwrap();

    let err = engine.execute_on("beta", "SELECT * FROM t").unwrap_err();
    assert!(matches!(err, Error::Name(_)), "got {err:?}");

    engine.execute_on("beta", "CREATE TABLE t (v INT64)").unwrap();
    let beta = engine.execute_on("beta", "SELECT COUNT(*) AS n FROM t").unwrap();
    assert_eq!(beta.rows[0].get("n"), Some(&Value::Int(0)));
}

#[test]
fn cancellation_aborts_statements() {
    let engine = engine_with_users();
    let token = CancelToken::new();
    token.cancel();
    let err = engine
        .execute_with_cancel("default", "SELECT name FROM users", &token)
        .unwrap_err();
    assert_eq!(err, Error::Canceled);
}

#[test]
fn negative_limit_is_argument_error() {
    let engine = engine_with_users();
    let err = engine.execute("SELECT name FROM users LIMIT -1").unwrap_err();
    assert!(matches!(err, Error::Argument(_)), "got {err:?}");
}

#[test]
fn unknown_column_is_name_error() {
    let engine = engine_with_users();
    let err = engine.execute("SELECT nope FROM users").unwrap_err();
    assert!(matches!(err, Error::Name(_)), "got {err:?}");
}

#[test]
fn ambiguous_unqualified_column_is_name_error() {
    let engine = Engine::new();
    engine.execute("CREATE TABLE a (id INT64)").unwrap();
    engine.execute("CREATE TABLE b (id INT64)").unwrap();
    engine.execute("INSERT INTO a VALUES (1)").unwrap();
    engine.execute("INSERT INTO b VALUES (1)").unwrap();
    let err = engine
        .execute("SELECT id FROM a JOIN b ON a.id = b.id")
        .unwrap_err();
    assert!(matches!(err, Error::Name(_)), "got {err:?}");
}

#[test]
fn case_insensitive_identifiers() {
    let engine = engine_with_users();
    let result = engine.execute("SELECT NAME FROM USERS WHERE AGE = 30").unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows[0].get("name"), Some(&Value::Text("Carol".into())));
}

#[test]
fn create_index_is_a_no_op() {
    let engine = engine_with_users();
    engine.execute("CREATE INDEX idx_age ON users (age)").unwrap();
    let indexes = engine.execute("SELECT * FROM sys.indexes").unwrap();
    assert_eq!(indexes.len(), 0);
}

#[test]
fn recursive_cte_is_rejected() {
    let engine = Engine::new();
    let err = engine
        .execute("WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r")
        .unwrap_err();
    assert!(matches!(err, Error::State(_)), "got {err:?}");
}
