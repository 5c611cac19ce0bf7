//! Core value types: per-state records, the flattened array bundle and state keys.

use crate::error::{MultiStateError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Observations of a single state: coordinates, values and their errors.
///
/// The three arrays are expected to have equal length; the factories of
/// [`MultiStateData`](crate::data::MultiStateData) check this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Coordinates.
    pub x: Array1<f64>,
    /// Values, same length as `x`.
    pub y: Array1<f64>,
    /// Non-negative errors of `y`, same length as `x`.
    pub err: Array1<f64>,
}

impl StateRecord {
    pub fn new(x: Array1<f64>, y: Array1<f64>, err: Array1<f64>) -> Self {
        Self { x, y, err }
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Check that `x`, `y` and `err` have equal length.
    pub fn validate(&self) -> Result<()> {
        let n = self.x.len();
        if self.y.len() != n || self.err.len() != n {
            return Err(MultiStateError::ShapeMismatch {
                expected_shape: format!("x, y, err of length {}", n),
                actual_shape: format!(
                    "x: ({},), y: ({},), err: ({},)",
                    n,
                    self.y.len(),
                    self.err.len()
                ),
            });
        }
        Ok(())
    }
}

impl From<(Array1<f64>, Array1<f64>, Array1<f64>)> for StateRecord {
    fn from((x, y, err): (Array1<f64>, Array1<f64>, Array1<f64>)) -> Self {
        Self::new(x, y, err)
    }
}

impl From<(Vec<f64>, Vec<f64>, Vec<f64>)> for StateRecord {
    fn from((x, y, err): (Vec<f64>, Vec<f64>, Vec<f64>)) -> Self {
        Self::new(Array1::from(x), Array1::from(y), Array1::from(err))
    }
}

/// Hash a float by bit pattern, folding `-0.0` into `0.0` to agree with `==`.
fn hash_f64<H: Hasher>(value: f64, state: &mut H) {
    let bits = if value == 0.0 { 0u64 } else { value.to_bits() };
    bits.hash(state);
}

impl Hash for StateRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for arr in [&self.x, &self.y, &self.err] {
            arr.len().hash(state);
            for &v in arr.iter() {
                hash_f64(v, state);
            }
        }
    }
}

/// Flattened, model-ready view of all states.
///
/// Row `r` of `x` is `(state index, coordinate)`; `y[r]` and `err[r]` are the
/// matching value and error already divided by `norm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatArrays {
    /// Feature matrix of shape `(n, 2)`.
    pub x: Array2<f64>,
    /// Normalized values of length `n`.
    pub y: Array1<f64>,
    /// Normalized errors of length `n`.
    pub err: Array1<f64>,
    /// Positive constant that multiplies `y` and `err` back to original units.
    pub norm: f64,
}

impl FlatArrays {
    /// Bundle with `norm = 1`.
    pub fn new(x: Array2<f64>, y: Array1<f64>, err: Array1<f64>) -> Self {
        Self {
            x,
            y,
            err,
            norm: 1.0,
        }
    }

    pub fn with_norm(mut self, norm: f64) -> Self {
        self.norm = norm;
        self
    }

    /// Number of observations (rows of `x`).
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Check the `(n, 2)` / `n` / `n` shapes and that `norm` is finite and positive.
    pub fn validate(&self) -> Result<()> {
        let n = self.x.nrows();
        if self.x.ncols() != 2 || self.y.len() != n || self.err.len() != n {
            return Err(MultiStateError::ShapeMismatch {
                expected_shape: format!("x: ({}, 2), y: ({},), err: ({},)", n, n, n),
                actual_shape: format!(
                    "x: ({}, {}), y: ({},), err: ({},)",
                    n,
                    self.x.ncols(),
                    self.y.len(),
                    self.err.len()
                ),
            });
        }
        if !(self.norm.is_finite() && self.norm > 0.0) {
            return Err(MultiStateError::InvalidParameter(format!(
                "norm must be a positive finite number, got {}",
                self.norm
            )));
        }
        Ok(())
    }
}

/// Types usable as state names.
pub trait StateKey: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> StateKey for T {}

/// State keys that can be derived from the index column of a feature matrix.
///
/// Used when flat arrays are converted back without explicit keys.
pub trait IndexKey: StateKey {
    fn from_state_index(index: f64) -> Self;
}

macro_rules! impl_index_key {
    ($($t:ty),*) => {
        $(
            impl IndexKey for $t {
                fn from_state_index(index: f64) -> Self {
                    index as $t
                }
            }
        )*
    };
}

impl_index_key!(usize, u32, u64, i32, i64);

impl IndexKey for String {
    fn from_state_index(index: f64) -> Self {
        format!("{}", index.trunc() as i64)
    }
}
