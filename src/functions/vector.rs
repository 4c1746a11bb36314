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

//! Dense-vector kernels and distance metrics.
//!
//! Vectors are Float64 arrays; the dimension is the array length and every
//! binary operation checks it strictly.

use rand::Rng;

use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::value::Value;

/// A k-NN distance metric.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Cosine,
    L2,
    Manhattan,
    /// Distance is the negated dot product, so larger products rank first.
    Dot,
}

impl Metric {
    /// Parses a metric name; `cosine` is the default elsewhere.
    pub fn parse(name: &str) -> Result<Metric> {
        match name.to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "l2" | "euclidean" => Ok(Metric::L2),
            "manhattan" | "l1" => Ok(Metric::Manhattan),
            "dot" => Ok(Metric::Dot),
            other => Err(Error::Argument(format!("unknown distance metric {other:?}"))),
        }
    }

    pub fn distance(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        Ok(match self {
            Metric::Cosine => cosine_distance(a, b)?,
            Metric::L2 => l2_distance(a, b)?,
            Metric::Manhattan => manhattan_distance(a, b)?,
            Metric::Dot => -dot(a, b)?,
        })
    }
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.add_scalar("VEC_FROM_JSON", vec_from_json);
    registry.add_scalar("VEC_TO_JSON", vec_to_json);
    registry.add_scalar("VEC_DIM", vec_dim);
    registry.add_scalar("VEC_NORM", vec_norm);
    registry.add_scalar("VEC_NORMALIZE", vec_normalize);
    registry.add_scalar("VEC_ADD", vec_add);
    registry.add_scalar("VEC_SUB", vec_sub);
    registry.add_scalar("VEC_SCALE", vec_scale);
    registry.add_scalar("VEC_MUL", vec_mul);
    registry.add_scalar("VEC_DOT", vec_dot);
    registry.add_scalar("VEC_COSINE_SIMILARITY", vec_cosine_similarity);
    registry.add_scalar("VEC_COSINE_DISTANCE", vec_cosine_distance);
    registry.add_scalar("VEC_L2_DISTANCE", vec_l2_distance);
    registry.add_scalar("VEC_L1_DISTANCE", vec_l1_distance);
    registry.add_scalar("VEC_DISTANCE", vec_distance);
    registry.add_scalar("VEC_MEAN", vec_mean);
    registry.add_scalar("VEC_SUM_ELEMS", vec_sum_elems);
    registry.add_scalar("VEC_MIN_ELEM", vec_min_elem);
    registry.add_scalar("VEC_MAX_ELEM", vec_max_elem);
    registry.add_scalar("VEC_ABS", vec_abs);
    registry.add_scalar("VEC_CONCAT", vec_concat);
    registry.add_scalar("VEC_SLICE", vec_slice);
    registry.add_scalar("VEC_ZEROS", vec_zeros);
    registry.add_scalar("VEC_ONES", vec_ones);
    registry.add_scalar("VEC_RANDOM", vec_random);
}

fn check_dims(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(Error::Type(format!(
            "vector dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )))
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dims(a, b)?;
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return Err(Error::Domain("cosine of a zero vector".into()));
    }
    Ok(dot(a, b)? / (na * nb))
}

pub fn cosine_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

pub fn l2_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dims(a, b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

pub fn manhattan_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum())
}

fn expect(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Error::Argument(format!(
            "{name} takes {n} argument{}, got {}",
            if n == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

macro_rules! null_prop {
    ($args:expr) => {
        for arg in $args.iter() {
            if arg.is_null() {
                return Ok(Value::Null);
            }
        }
    };
}

fn vec_from_json(args: &[Value]) -> Result<Value> {
    expect("VEC_FROM_JSON", args, 1)?;
    null_prop!(args);
    Ok(Value::Vector(args[0].as_vector()?))
}

fn vec_to_json(args: &[Value]) -> Result<Value> {
    expect("VEC_TO_JSON", args, 1)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    Ok(Value::Text(serde_json::to_string(&v).unwrap_or_default()))
}

fn vec_dim(args: &[Value]) -> Result<Value> {
    expect("VEC_DIM", args, 1)?;
    null_prop!(args);
    Ok(Value::Int(args[0].as_vector()?.len() as i64))
}

fn vec_norm(args: &[Value]) -> Result<Value> {
    expect("VEC_NORM", args, 1)?;
    null_prop!(args);
    Ok(Value::Float(norm(&args[0].as_vector()?)))
}

fn vec_normalize(args: &[Value]) -> Result<Value> {
    expect("VEC_NORMALIZE", args, 1)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    let n = norm(&v);
    if n == 0.0 {
        return Err(Error::Domain("cannot normalize a zero vector".into()));
    }
    Ok(Value::Vector(v.iter().map(|x| x / n).collect()))
}

fn binary_elementwise(
    name: &str,
    args: &[Value],
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    expect(name, args, 2)?;
    null_prop!(args);
    let (a, b) = (args[0].as_vector()?, args[1].as_vector()?);
    check_dims(&a, &b)?;
    Ok(Value::Vector(a.iter().zip(&b).map(|(x, y)| f(*x, *y)).collect()))
}

fn vec_add(args: &[Value]) -> Result<Value> {
    binary_elementwise("VEC_ADD", args, |x, y| x + y)
}

fn vec_sub(args: &[Value]) -> Result<Value> {
    binary_elementwise("VEC_SUB", args, |x, y| x - y)
}

fn vec_mul(args: &[Value]) -> Result<Value> {
    binary_elementwise("VEC_MUL", args, |x, y| x * y)
}

fn vec_scale(args: &[Value]) -> Result<Value> {
    expect("VEC_SCALE", args, 2)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    let k = args[1].as_float()?;
    Ok(Value::Vector(v.iter().map(|x| x * k).collect()))
}

fn vec_dot(args: &[Value]) -> Result<Value> {
    expect("VEC_DOT", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(dot(&args[0].as_vector()?, &args[1].as_vector()?)?))
}

fn vec_cosine_similarity(args: &[Value]) -> Result<Value> {
    expect("VEC_COSINE_SIMILARITY", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(cosine_similarity(
        &args[0].as_vector()?,
        &args[1].as_vector()?,
    )?))
}

fn vec_cosine_distance(args: &[Value]) -> Result<Value> {
    expect("VEC_COSINE_DISTANCE", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(cosine_distance(
        &args[0].as_vector()?,
        &args[1].as_vector()?,
    )?))
}

fn vec_l2_distance(args: &[Value]) -> Result<Value> {
    expect("VEC_L2_DISTANCE", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(l2_distance(
        &args[0].as_vector()?,
        &args[1].as_vector()?,
    )?))
}

fn vec_l1_distance(args: &[Value]) -> Result<Value> {
    expect("VEC_L1_DISTANCE", args, 2)?;
    null_prop!(args);
    Ok(Value::Float(manhattan_distance(
        &args[0].as_vector()?,
        &args[1].as_vector()?,
    )?))
}

/// `VEC_DISTANCE(a, b, metric)`
fn vec_distance(args: &[Value]) -> Result<Value> {
    expect("VEC_DISTANCE", args, 3)?;
    null_prop!(args);
    let metric = Metric::parse(&args[2].as_text())?;
    Ok(Value::Float(metric.distance(
        &args[0].as_vector()?,
        &args[1].as_vector()?,
    )?))
}

fn vec_mean(args: &[Value]) -> Result<Value> {
    expect("VEC_MEAN", args, 1)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    if v.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Float(v.iter().sum::<f64>() / v.len() as f64))
}

fn vec_sum_elems(args: &[Value]) -> Result<Value> {
    expect("VEC_SUM_ELEMS", args, 1)?;
    null_prop!(args);
    Ok(Value::Float(args[0].as_vector()?.iter().sum()))
}

fn vec_min_elem(args: &[Value]) -> Result<Value> {
    expect("VEC_MIN_ELEM", args, 1)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    match v.iter().copied().reduce(f64::min) {
        Some(min) => Ok(Value::Float(min)),
        None => Ok(Value::Null),
    }
}

fn vec_max_elem(args: &[Value]) -> Result<Value> {
    expect("VEC_MAX_ELEM", args, 1)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    match v.iter().copied().reduce(f64::max) {
        Some(max) => Ok(Value::Float(max)),
        None => Ok(Value::Null),
    }
}

fn vec_abs(args: &[Value]) -> Result<Value> {
    expect("VEC_ABS", args, 1)?;
    null_prop!(args);
    Ok(Value::Vector(
        args[0].as_vector()?.iter().map(|x| x.abs()).collect(),
    ))
}

fn vec_concat(args: &[Value]) -> Result<Value> {
    expect("VEC_CONCAT", args, 2)?;
    null_prop!(args);
    let mut v = args[0].as_vector()?;
    v.extend(args[1].as_vector()?);
    Ok(Value::Vector(v))
}

/// `VEC_SLICE(v, start, len)` with a 0-based start.
fn vec_slice(args: &[Value]) -> Result<Value> {
    expect("VEC_SLICE", args, 3)?;
    null_prop!(args);
    let v = args[0].as_vector()?;
    let start = args[1].as_int()?;
    let len = args[2].as_int()?;
    if start < 0 || len < 0 {
        return Err(Error::Argument("VEC_SLICE start and length must be non-negative".into()));
    }
    let start = (start as usize).min(v.len());
    let end = (start + len as usize).min(v.len());
    Ok(Value::Vector(v[start..end].to_vec()))
}

fn make_filled(name: &str, args: &[Value], fill: f64) -> Result<Value> {
    expect(name, args, 1)?;
    null_prop!(args);
    let n = args[0].as_int()?;
    if n < 0 {
        return Err(Error::Argument(format!("{name} dimension must be non-negative")));
    }
    Ok(Value::Vector(vec![fill; n as usize]))
}

fn vec_zeros(args: &[Value]) -> Result<Value> {
    make_filled("VEC_ZEROS", args, 0.0)
}

fn vec_ones(args: &[Value]) -> Result<Value> {
    make_filled("VEC_ONES", args, 1.0)
}

/// A vector of uniform values in `[0, 1)`.
fn vec_random(args: &[Value]) -> Result<Value> {
    expect("VEC_RANDOM", args, 1)?;
    null_prop!(args);
    let n = args[0].as_int()?;
    if n < 0 {
        return Err(Error::Argument("VEC_RANDOM dimension must be non-negative".into()));
    }
    let mut rng = rand::thread_rng();
    Ok(Value::Vector((0..n).map(|_| rng.gen::<f64>()).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_laws() {
        let v = [1.0, 2.0, 3.0];
        let neg: Vec<f64> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &v).unwrap() - 1.0).abs() < 1e-12);
        assert!((cosine_distance(&v, &neg).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_has_unit_norm() {
        let v = Value::Vector(vec![3.0, 4.0]);
        let normalized = vec_normalize(&[v]).unwrap();
        match normalized {
            Value::Vector(n) => assert!((norm(&n) - 1.0).abs() < 1e-12),
            other => panic!("expected vector, got {other:?}"),
        }
    }

    #[test]
    fn dimension_mismatch_is_type_error() {
        let a = Value::Vector(vec![1.0, 2.0]);
        let b = Value::Vector(vec![1.0]);
        assert!(matches!(vec_dot(&[a, b]), Err(Error::Type(_))));
    }

    #[test]
    fn concat_preserves_length_sum() {
        let a = Value::Vector(vec![1.0, 2.0]);
        let b = Value::Vector(vec![3.0]);
        match vec_concat(&[a, b]).unwrap() {
            Value::Vector(v) => assert_eq!(v, vec![1.0, 2.0, 3.0]),
            other => panic!("expected vector, got {other:?}"),
        }
    }

    #[test]
    fn metric_parsing() {
        assert_eq!(Metric::parse("COSINE").unwrap(), Metric::Cosine);
        assert_eq!(Metric::parse("l2").unwrap(), Metric::L2);
        assert_eq!(Metric::parse("manhattan").unwrap(), Metric::Manhattan);
        assert!(Metric::parse("chebyshev").is_err());
    }

    #[test]
    fn dot_metric_negates() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert_eq!(Metric::Dot.distance(&a, &b).unwrap(), -2.0);
    }

    #[test]
    fn from_json_accepts_text() {
        let v = vec_from_json(&[Value::Text("[1, 0.5]".into())]).unwrap();
        assert_eq!(v, Value::Vector(vec![1.0, 0.5]));
        assert!(vec_from_json(&[Value::Text("oops".into())]).is_err());
    }
}
