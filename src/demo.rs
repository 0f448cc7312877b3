//! Built-in sample unit used by the CLI
//!
//! `numlib` is a tiny dense-matrix library with two sub-units:
//! `numlib.linalg` (inverse, determinant) and `numlib.random` (a seeded
//! generator). It also binds `sys`, a foundational unit the default denylist
//! keeps out of sub-unit tracing.

use crate::registry::{call_through, ModuleTable, UnitRegistry};
use crate::unit::{CallArgs, Callable, Unit, Value};
use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;

type Matrix = Vec<Vec<f64>>;

fn to_matrix(value: &Value) -> Result<Matrix> {
    let rows = value.as_array().context("expected a 2-D array")?;
    let matrix = rows
        .iter()
        .map(|row| {
            row.as_array()
                .context("expected a 2-D array")?
                .iter()
                .map(|x| x.as_f64().ok_or_else(|| anyhow!("non-numeric element: {}", x)))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Matrix>>()?;

    if let Some(first) = matrix.first() {
        if matrix.iter().any(|row| row.len() != first.len()) {
            bail!("ragged array: rows have different lengths");
        }
    }
    Ok(matrix)
}

fn from_matrix(matrix: &Matrix) -> Value {
    json!(matrix)
}

fn matrix_arg(args: &CallArgs, key: &str, index: usize) -> Result<Matrix> {
    let value = args
        .get(key, index)
        .ok_or_else(|| anyhow!("missing argument '{}'", key))?;
    to_matrix(value)
}

fn matmul(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let inner = a.first().map_or(0, Vec::len);
    if inner != b.len() {
        bail!("shape mismatch: {} columns vs {} rows", inner, b.len());
    }
    let cols = b.first().map_or(0, Vec::len);
    Ok(a.iter()
        .map(|row| {
            (0..cols)
                .map(|j| row.iter().zip(b).map(|(x, b_row)| x * b_row[j]).sum::<f64>())
                .collect()
        })
        .collect())
}

fn transpose(a: &Matrix) -> Matrix {
    let cols = a.first().map_or(0, Vec::len);
    (0..cols).map(|j| a.iter().map(|row| row[j]).collect()).collect()
}

fn square_2x2(a: &Matrix) -> Result<(f64, f64, f64, f64)> {
    match a.as_slice() {
        [r0, r1] if r0.len() == 2 && r1.len() == 2 => Ok((r0[0], r0[1], r1[0], r1[1])),
        _ => bail!("only 2x2 matrices are supported"),
    }
}

fn linalg_unit() -> Unit {
    Unit::new("numlib.linalg")
        .with_function("det", |args| {
            let (a, b, c, d) = square_2x2(&matrix_arg(args, "a", 0)?)?;
            Ok(json!(a * d - b * c))
        })
        .with_function("inv", |args| {
            let (a, b, c, d) = square_2x2(&matrix_arg(args, "a", 0)?)?;
            let det = a * d - b * c;
            if det == 0.0 {
                bail!("Singular matrix");
            }
            Ok(from_matrix(&vec![
                vec![d / det, -b / det],
                vec![-c / det, a / det],
            ]))
        })
}

// Linear congruential generator; deterministic so traces are reproducible.
fn random_unit() -> Unit {
    Unit::new("numlib.random").with_function("uniform", |args| {
        let seed = args.get("seed", 0).and_then(Value::as_u64).unwrap_or(0);
        let n = args.get("n", 1).and_then(Value::as_u64).unwrap_or(1);
        let mut state = seed;
        let values: Vec<f64> = (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64
            })
            .collect();
        Ok(json!(values))
    })
}

fn sys_unit() -> Unit {
    Unit::new("sys").with_function("version", |_| Ok(json!(env!("CARGO_PKG_VERSION"))))
}

/// Build and register `numlib`, its sub-units and `sys` in `table`
pub fn install(table: &ModuleTable) {
    let linalg = table.register(linalg_unit());
    let random = table.register(random_unit());
    let sys = table.register(sys_unit());

    let matmul_fn = Callable::new("matmul", |args| {
        let a = matrix_arg(args, "a", 0)?;
        let b = matrix_arg(args, "b", 1)?;
        Ok(from_matrix(&matmul(&a, &b)?))
    });

    table.register(
        Unit::new("numlib")
            .with_function("array", |args| {
                let data = args
                    .get("data", 0)
                    .ok_or_else(|| anyhow!("missing argument 'data'"))?;
                Ok(from_matrix(&to_matrix(data)?))
            })
            .with_function("zeros", |args| {
                let rows = args.get("rows", 0).and_then(Value::as_u64).unwrap_or(0) as usize;
                let cols = args.get("cols", 1).and_then(Value::as_u64).unwrap_or(rows as u64) as usize;
                Ok(from_matrix(&vec![vec![0.0; cols]; rows]))
            })
            .with_callable("matmul", matmul_fn.clone())
            .with_callable("dot", matmul_fn)
            .with_function("transpose", |args| {
                Ok(from_matrix(&transpose(&matrix_arg(args, "a", 0)?)))
            })
            .with_function("_check_shape", |args| {
                let valid = match args.get("a", 0) {
                    Some(value) => to_matrix(value).is_ok(),
                    None => false,
                };
                Ok(json!(valid))
            })
            .with_value("version", env!("CARGO_PKG_VERSION"))
            .with_subunit("linalg", linalg)
            .with_subunit("random", random)
            .with_subunit("sys", sys),
    );
}

/// Convenience: a fresh table with the demo units installed
pub fn table() -> ModuleTable {
    let table = ModuleTable::new();
    install(&table);
    table
}

/// Matrix walkthrough: build two arrays, multiply, invert, transpose
///
/// `det` is reached through the registry entry `numlib.linalg`; `inv` through
/// the `linalg` member of the current `numlib` instance, the way client code
/// would write `numlib.linalg.inv(c)`.
pub fn run_basic<R>(registry: &R) -> Result<Value>
where
    R: UnitRegistry + ?Sized,
{
    let a = call_through(registry, "numlib", "array", &CallArgs::new().with_arg(json!([[1, 0], [0, 1]])))?;
    let b = call_through(registry, "numlib", "array", &CallArgs::new().with_arg(json!([[4, 1], [2, 2]])))?;
    let c = call_through(registry, "numlib", "matmul", &CallArgs::new().with_arg(a).with_arg(b))?;
    call_through(registry, "numlib.linalg", "det", &CallArgs::new().with_arg(c.clone()))?;

    let numlib = registry
        .resolve("numlib")
        .ok_or_else(|| anyhow!("Unit not found in registry: numlib"))?;
    let linalg = numlib
        .subunit("linalg")
        .ok_or_else(|| anyhow!("numlib has no 'linalg' sub-unit"))?;
    let c = linalg.call("inv", &CallArgs::new().with_arg(c))?;

    call_through(registry, "numlib", "transpose", &CallArgs::new().with_kwarg("a", c))
}
