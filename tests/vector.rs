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
//! Vector operators and VEC_SEARCH through full SQL.

use microsql::{Engine, Error, Value};
use pretty_assertions::assert_eq;

fn scalar(engine: &Engine, expr: &str) -> Value {
    let sql = format!("SELECT {expr} AS out");
    let result = engine.execute(&sql).unwrap();
    result.rows[0].get("out").cloned().unwrap()
}

#[test]
fn vector_construction_and_shape() {
    let engine = Engine::new();
    assert_eq!(
        scalar(&engine, "VEC_FROM_JSON('[1, 0, 0]')"),
        Value::Vector(vec![1.0, 0.0, 0.0])
    );
    assert_eq!(scalar(&engine, "VEC_DIM(VEC_FROM_JSON('[1, 2, 3]'))"), Value::Int(3));
    assert_eq!(scalar(&engine, "VEC_ZEROS(2)"), Value::Vector(vec![0.0, 0.0]));
    assert_eq!(scalar(&engine, "VEC_ONES(3)"), Value::Vector(vec![1.0, 1.0, 1.0]));
    assert_eq!(
        scalar(&engine, "VEC_CONCAT(VEC_FROM_JSON('[1]'), VEC_FROM_JSON('[2, 3]'))"),
        Value::Vector(vec![1.0, 2.0, 3.0])
    );
    assert_eq!(
        scalar(&engine, "VEC_SLICE(VEC_FROM_JSON('[1, 2, 3, 4]'), 1, 2)"),
        Value::Vector(vec![2.0, 3.0])
    );
}

#[test]
fn vector_arithmetic() {
    let engine = Engine::new();
    assert_eq!(
        scalar(&engine, "VEC_ADD(VEC_FROM_JSON('[1, 2]'), VEC_FROM_JSON('[3, 4]'))"),
        Value::Vector(vec![4.0, 6.0])
    );
    assert_eq!(
        scalar(&engine, "VEC_SCALE(VEC_FROM_JSON('[1, -2]'), 2)"),
        Value::Vector(vec![2.0, -4.0])
    );
    assert_eq!(
        scalar(&engine, "VEC_DOT(VEC_FROM_JSON('[1, 2]'), VEC_FROM_JSON('[3, 4]'))"),
        Value::Float(11.0)
    );
    assert_eq!(
        scalar(&engine, "VEC_SUM_ELEMS(VEC_FROM_JSON('[1, 2, 3]'))"),
        Value::Float(6.0)
    );
    assert_eq!(scalar(&engine, "VEC_NORM(VEC_FROM_JSON('[3, 4]'))"), Value::Float(5.0));
}

#[test]
fn vector_laws() {
    let engine = Engine::new();
    let as_float = |v: Value| match v {
        Value::Float(f) => f,
        other => panic!("expected float, got {other:?}"),
    };
    let sim = as_float(scalar(
        &engine,
        "VEC_COSINE_SIMILARITY(VEC_FROM_JSON('[1, 2, 3]'), VEC_FROM_JSON('[1, 2, 3]'))",
    ));
    assert!((sim - 1.0).abs() < 1e-12);
    let dist = as_float(scalar(
        &engine,
        "VEC_COSINE_DISTANCE(VEC_FROM_JSON('[1, 2]'), VEC_FROM_JSON('[-1, -2]'))",
    ));
    assert!((dist - 2.0).abs() < 1e-12);
    let unit = as_float(scalar(
        &engine,
        "VEC_NORM(VEC_NORMALIZE(VEC_FROM_JSON('[3, 4]')))",
    ));
    assert!((unit - 1.0).abs() < 1e-12);
}

#[test]
fn dimension_mismatch_is_type_error() {
    let engine = Engine::new();
    let err = engine
        .execute("SELECT VEC_ADD(VEC_FROM_JSON('[1]'), VEC_FROM_JSON('[1, 2]'))")
        .unwrap_err();
    assert!(matches!(err, Error::Type(_)), "got {err:?}");
}

#[test]
fn metric_selection() {
    let engine = Engine::new();
    assert_eq!(
        scalar(
            &engine,
            "VEC_DISTANCE(VEC_FROM_JSON('[0, 0]'), VEC_FROM_JSON('[3, 4]'), 'l2')",
        ),
        Value::Float(5.0)
    );
    assert_eq!(
        scalar(
            &engine,
            "VEC_DISTANCE(VEC_FROM_JSON('[0, 0]'), VEC_FROM_JSON('[3, 4]'), 'manhattan')",
        ),
        Value::Float(7.0)
    );
    assert_eq!(
        scalar(
            &engine,
            "VEC_DISTANCE(VEC_FROM_JSON('[1, 1]'), VEC_FROM_JSON('[2, 3]'), 'dot')",
        ),
        Value::Float(-5.0)
    );
    let err = engine
        .execute("SELECT VEC_DISTANCE(VEC_FROM_JSON('[1]'), VEC_FROM_JSON('[1]'), 'chebyshev')")
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)), "got {err:?}");
}

fn engine_with_docs() -> Engine {
    let engine = Engine::new();
    engine
        .execute("CREATE TABLE docs (id INT64 PRIMARY KEY, title TEXT, embedding VECTOR)")
        .unwrap();
    engine
        .execute(
            "INSERT INTO docs VALUES \
             (1, 'origin', '[0, 0, 0]'), \
             (2, 'far', '[3, 4, 0]'), \
             (3, 'near', '[1, 1, 0]')",
        )
        .unwrap();
    engine
}

#[test]
fn vec_search_returns_ranked_neighbors() {
    let engine = engine_with_docs();
    let result = engine
        .execute("SELECT * FROM VEC_SEARCH('docs', 'embedding', VEC_FROM_JSON('[1, 0, 0]'), 2, 'l2')")
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(
        result.columns,
        vec![
            "id".to_string(),
            "title".to_string(),
            "embedding".to_string(),
            "_vec_distance".to_string(),
            "_vec_rank".to_string(),
        ]
    );
    assert_eq!(result.rows[0].get("_vec_rank"), Some(&Value::Int(1)));
    assert_eq!(result.rows[1].get("_vec_rank"), Some(&Value::Int(2)));
    let d1 = match result.rows[0].get("_vec_distance") {
        Some(Value::Float(d)) => *d,
        other => panic!("expected float distance, got {other:?}"),
    };
    let d2 = match result.rows[1].get("_vec_distance") {
        Some(Value::Float(d)) => *d,
        other => panic!("expected float distance, got {other:?}"),
    };
    assert!(d1 <= d2, "distances must be non-decreasing");
}

#[test]
fn vec_search_composes_with_the_pipeline() {
    let engine = engine_with_docs();
    let result = engine
        .execute(
            "SELECT title, _vec_rank FROM \
             VEC_SEARCH('docs', 'embedding', VEC_FROM_JSON('[1, 0, 0]'), 3, 'l2') \
             WHERE _vec_rank <= 2 ORDER BY _vec_rank DESC",
        )
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[0].get("_vec_rank"), Some(&Value::Int(2)));
}

#[test]
fn vec_search_skips_mismatched_rows() {
    let engine = engine_with_docs();
    // A two-dimensional embedding among three-dimensional ones.
    engine
        .execute("INSERT INTO docs VALUES (4, 'odd', '[9, 9]')")
        .unwrap();
    let result = engine
        .execute("SELECT id FROM VEC_SEARCH('docs', 'embedding', VEC_FROM_JSON('[1, 0, 0]'), 10, 'l2')")
        .unwrap();
    assert_eq!(result.len(), 3);

    let err = engine
        .execute("SELECT * FROM VEC_SEARCH('missing', 'embedding', VEC_FROM_JSON('[1]'), 1)")
        .unwrap_err();
    assert!(matches!(err, Error::Name(_)), "got {err:?}");

    let err = engine
        .execute("SELECT * FROM VEC_SEARCH('docs', 'embedding', VEC_FROM_JSON('[1, 0, 0]'), -1)")
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)), "got {err:?}");
}
