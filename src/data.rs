//! Multi-state data holding a named and a flattened representation at once.
//!
//! The named view is a [`FrozenOrderedMap`] from state key to [`StateRecord`].
//! The flattened view is a [`FlatArrays`] bundle that a multi-output regression
//! model can consume directly: every observation becomes one row
//! `(state index, coordinate)` of the feature matrix, with values and errors
//! divided by a common normalization constant.
//!
//! Instances are only created through the `from_*` factories, which either
//! return a fully consistent object or an error.

use crate::error::{MultiStateError, Result};
use crate::frozen::FrozenOrderedMap;
use crate::types::{FlatArrays, IndexKey, StateKey, StateRecord};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, trace, warn};

/// Multi-state data in both named and flattened form.
///
/// # Example
///
/// ```
/// use multistate::prelude::*;
/// use ndarray::array;
///
/// let data = MultiStateData::from_items(vec![
///     ("A", (vec![1.0, 2.0], vec![10.0, 20.0], vec![1.0, 1.0])),
///     ("B", (vec![3.0], vec![30.0], vec![2.0])),
/// ])?;
///
/// assert_eq!(data.keys(), &["A", "B"]);
/// assert_eq!(data.arrays().x, array![[0.0, 1.0], [0.0, 2.0], [1.0, 3.0]]);
/// assert_eq!(data.idx(&"B")?, 1);
/// # Ok::<(), MultiStateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MultiStateData<K> {
    states: FrozenOrderedMap<K, StateRecord>,
    arrays: FlatArrays,
    keys: Vec<K>,
}

impl<K: StateKey> MultiStateData<K> {
    fn new(states: FrozenOrderedMap<K, StateRecord>, arrays: FlatArrays) -> Self {
        let keys = states.keys().cloned().collect();
        Self {
            states,
            arrays,
            keys,
        }
    }

    /// Named view: state key to its observations in original units.
    pub fn states(&self) -> &FrozenOrderedMap<K, StateRecord> {
        &self.states
    }

    /// Flattened, normalized view.
    pub fn arrays(&self) -> &FlatArrays {
        &self.arrays
    }

    pub fn norm(&self) -> f64 {
        self.arrays.norm
    }

    /// State keys in state-index order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn num_states(&self) -> usize {
        self.keys.len()
    }

    /// Number of observations in the flattened view.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Observations of the state named `key`.
    pub fn get(&self, key: &K) -> Result<&StateRecord> {
        self.states.try_get(key)
    }

    /// State key by index.
    pub fn key(&self, idx: usize) -> Result<&K> {
        self.keys.get(idx).ok_or_else(|| {
            MultiStateError::KeyNotFound(format!(
                "state index {} out of range for {} states",
                idx,
                self.keys.len()
            ))
        })
    }

    /// State index by key.
    pub fn idx(&self, key: &K) -> Result<usize> {
        self.states
            .position(key)
            .ok_or_else(|| MultiStateError::KeyNotFound(format!("{:?}", key)))
    }

    /// Feature matrix requesting every state at the same coordinates.
    ///
    /// The result has `num_states * x.len()` rows: a block of `(i, x_j)` rows
    /// for each state index `i`, blocks in key order.
    pub fn sample(&self, x: &ArrayView1<f64>) -> Array2<f64> {
        let n = x.len();
        let mut result = Array2::zeros((self.keys.len() * n, 2));
        for i in 0..self.keys.len() {
            for (j, &c) in x.iter().enumerate() {
                result[[i * n + j, 0]] = i as f64;
                result[[i * n + j, 1]] = c;
            }
        }
        result
    }

    /// New data from flat arrays on the same scale and with the same keys.
    ///
    /// The normalization constant is carried over, not recomputed: the new
    /// arrays are typically model predictions for this data.
    pub fn convert_flat_arrays(
        &self,
        x: Array2<f64>,
        y: Array1<f64>,
        err: Array1<f64>,
    ) -> Result<Self> {
        let bundle = FlatArrays::new(x, y, err).with_norm(self.norm());
        Self::from_flat_bundle_with_keys(bundle, self.keys.clone())
    }

    /// Construct from `(key, (x, y, err))` pairs.
    pub fn from_items<I, T>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, T)>,
        T: Into<StateRecord>,
    {
        Self::from_state_records(items.into_iter().map(|(k, v)| (k, v.into())))
    }

    /// Construct from `(key, StateRecord)` pairs, deriving the flattened view.
    ///
    /// Values and errors are divided by the standard deviation of all values;
    /// if that is zero, by the magnitude of the first value; if that is zero
    /// too, by one.
    pub fn from_state_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, StateRecord)>,
    {
        let states: FrozenOrderedMap<K, StateRecord> = records.into_iter().collect();
        for (key, record) in &states {
            record.validate().map_err(|e| match e {
                MultiStateError::ShapeMismatch {
                    expected_shape,
                    actual_shape,
                } => MultiStateError::ShapeMismatch {
                    expected_shape,
                    actual_shape: format!("{} in state {:?}", actual_shape, key),
                },
                other => other,
            })?;
        }

        let n_obs: usize = states.values().map(StateRecord::len).sum();
        if n_obs == 0 {
            return Err(MultiStateError::EmptyData);
        }

        let mut x_flat = Vec::with_capacity(2 * n_obs);
        for (i, record) in states.values().enumerate() {
            for &c in record.x.iter() {
                x_flat.push(i as f64);
                x_flat.push(c);
            }
        }
        let x = Array2::from_shape_vec((n_obs, 2), x_flat)?;

        let y: Array1<f64> = states
            .values()
            .flat_map(|r| r.y.iter().copied())
            .collect();
        let norm = normalization_constant(&y.view());
        let y = y / norm;
        let err: Array1<f64> = states
            .values()
            .flat_map(|r| r.err.iter().copied())
            .collect::<Array1<f64>>()
            / norm;

        debug!(
            n_states = states.len(),
            n_obs, norm, "built multi-state data from state records"
        );

        Ok(Self::new(
            states,
            FlatArrays {
                x,
                y,
                err,
                norm,
            },
        ))
    }

    /// Construct from already normalized flat arrays with explicit keys.
    pub fn from_flat_arrays_with_keys(
        x: Array2<f64>,
        y: Array1<f64>,
        err: Array1<f64>,
        norm: f64,
        keys: Vec<K>,
    ) -> Result<Self> {
        Self::from_flat_bundle_with_keys(FlatArrays::new(x, y, err).with_norm(norm), keys)
    }

    /// Rebuild the named view from a flat bundle, naming states by `keys`.
    ///
    /// Keys are matched by position: `keys[i]` receives the rows whose index
    /// column equals `i`, whatever the key's own value. Values and errors are
    /// multiplied back by `bundle.norm`; the bundle itself is kept unchanged.
    pub fn from_flat_bundle_with_keys(bundle: FlatArrays, keys: Vec<K>) -> Result<Self> {
        bundle.validate()?;

        let distinct = distinct_state_indices(&bundle.x.view());
        if keys.len() != distinct.len() {
            warn!(
                n_keys = keys.len(),
                n_indices = distinct.len(),
                "number of keys differs from distinct state indices in flat arrays"
            );
        }

        let index_column = bundle.x.column(0);
        let coordinates = bundle.x.column(1);
        let norm = bundle.norm;
        let states: FrozenOrderedMap<K, StateRecord> = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| {
                let rows: Vec<usize> = index_column
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| v == i as f64)
                    .map(|(r, _)| r)
                    .collect();
                trace!(state = ?key, index = i, n_rows = rows.len(), "selected state rows");
                let record = StateRecord::new(
                    coordinates.select(Axis(0), &rows),
                    bundle.y.select(Axis(0), &rows) * norm,
                    bundle.err.select(Axis(0), &rows) * norm,
                );
                (key, record)
            })
            .collect();

        debug!(
            n_states = states.len(),
            n_obs = bundle.len(),
            norm,
            "built multi-state data from flat arrays"
        );

        Ok(Self::new(states, bundle))
    }
}

impl<K: IndexKey> MultiStateData<K> {
    /// Construct from already normalized flat arrays.
    ///
    /// Without `keys`, states are named after the distinct values of the
    /// index column, in ascending order.
    pub fn from_flat_arrays(
        x: Array2<f64>,
        y: Array1<f64>,
        err: Array1<f64>,
        norm: f64,
        keys: Option<Vec<K>>,
    ) -> Result<Self> {
        Self::from_flat_bundle(FlatArrays::new(x, y, err).with_norm(norm), keys)
    }

    /// Rebuild the named view from a flat bundle.
    ///
    /// See [`from_flat_bundle_with_keys`](Self::from_flat_bundle_with_keys)
    /// for how keys are matched to rows. Deriving keys fails with
    /// [`MultiStateError::InvalidParameter`] if an index value is negative
    /// or not integral.
    pub fn from_flat_bundle(bundle: FlatArrays, keys: Option<Vec<K>>) -> Result<Self> {
        let keys = match keys {
            Some(keys) => keys,
            None => {
                let indices = distinct_state_indices(&bundle.x.view());
                if let Some(bad) = indices
                    .iter()
                    .find(|v| !(v.is_finite() && **v >= 0.0 && v.fract() == 0.0))
                {
                    return Err(MultiStateError::InvalidParameter(format!(
                        "state index must be a non-negative integer, got {}",
                        bad
                    )));
                }
                indices.into_iter().map(K::from_state_index).collect()
            }
        };
        Self::from_flat_bundle_with_keys(bundle, keys)
    }
}

impl<K: StateKey> PartialEq for MultiStateData<K> {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states && self.arrays == other.arrays
    }
}

/// Standard deviation of `y`, falling back to `|y[0]|` and then to one.
fn normalization_constant(y: &ArrayView1<f64>) -> f64 {
    let std = y.std(0.0);
    if std.is_finite() && std != 0.0 {
        return std;
    }
    let first = y.iter().next().copied().unwrap_or(0.0).abs();
    if first.is_finite() && first != 0.0 {
        trace!(first, "zero standard deviation, normalizing by first value");
        return first;
    }
    trace!("zero values, normalization constant set to one");
    1.0
}

/// Sorted distinct values of the index column of `x`.
fn distinct_state_indices(x: &ArrayView2<f64>) -> Vec<f64> {
    if x.ncols() == 0 {
        return Vec::new();
    }
    let mut values: Vec<f64> = x.column(0).to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values
}

/// Shortcut for [`MultiStateData::from_items`].
pub fn data_from_items<K, I, T>(items: I) -> Result<MultiStateData<K>>
where
    K: StateKey,
    I: IntoIterator<Item = (K, T)>,
    T: Into<StateRecord>,
{
    MultiStateData::from_items(items)
}

/// Shortcut for [`MultiStateData::from_state_records`].
pub fn data_from_state_data<K, I>(records: I) -> Result<MultiStateData<K>>
where
    K: StateKey,
    I: IntoIterator<Item = (K, StateRecord)>,
{
    MultiStateData::from_state_records(records)
}

/// Shortcut for [`MultiStateData::from_flat_arrays`].
pub fn data_from_arrays<K: IndexKey>(
    x: Array2<f64>,
    y: Array1<f64>,
    err: Array1<f64>,
    norm: f64,
    keys: Option<Vec<K>>,
) -> Result<MultiStateData<K>> {
    MultiStateData::from_flat_arrays(x, y, err, norm, keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_states() -> MultiStateData<&'static str> {
        MultiStateData::from_items(vec![
            ("A", (vec![1.0, 2.0], vec![10.0, 20.0], vec![1.0, 1.0])),
            ("B", (vec![3.0], vec![30.0], vec![2.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_items_flat_layout() {
        let data = two_states();
        let arrays = data.arrays();

        assert_eq!(arrays.x, array![[0.0, 1.0], [0.0, 2.0], [1.0, 3.0]]);

        let expected_norm = (200.0_f64 / 3.0).sqrt();
        assert_relative_eq!(data.norm(), expected_norm, epsilon = 1e-12);
        assert_relative_eq!(arrays.y[0], 1.224744871391589, epsilon = 1e-9);
        assert_relative_eq!(arrays.y[1], 2.449489742783178, epsilon = 1e-9);
        assert_relative_eq!(arrays.y[2], 3.674234614174767, epsilon = 1e-9);
        assert_relative_eq!(arrays.err[0], 1.0 / expected_norm, epsilon = 1e-12);
        assert_relative_eq!(arrays.err[2], 2.0 / expected_norm, epsilon = 1e-12);
    }

    #[test]
    fn test_named_view_keeps_original_units() {
        let data = two_states();
        let a = data.get(&"A").unwrap();
        assert_eq!(a.y, array![10.0, 20.0]);
        assert_eq!(data.num_states(), 2);
        assert_eq!(data.len(), 3);
        assert!(matches!(data.get(&"C"), Err(MultiStateError::KeyNotFound(_))));
    }

    #[test]
    fn test_key_idx_bijection() {
        let data = two_states();
        for i in 0..data.num_states() {
            assert_eq!(data.idx(data.key(i).unwrap()).unwrap(), i);
        }
        assert_eq!(data.key(0).unwrap(), &"A");
        assert!(matches!(data.key(2), Err(MultiStateError::KeyNotFound(_))));
        assert!(matches!(data.idx(&"Z"), Err(MultiStateError::KeyNotFound(_))));
    }

    #[test]
    fn test_empty_data() {
        let result = MultiStateData::from_items(vec![
            ("A", (Vec::<f64>::new(), Vec::new(), Vec::new())),
            ("B", (Vec::new(), Vec::new(), Vec::new())),
        ]);
        assert_eq!(result.unwrap_err(), MultiStateError::EmptyData);

        let none: Result<MultiStateData<u32>> = MultiStateData::from_state_records(vec![]);
        assert_eq!(none.unwrap_err(), MultiStateError::EmptyData);
    }

    #[test]
    fn test_shape_mismatch_in_state() {
        let result = MultiStateData::from_items(vec![(
            "A",
            (vec![1.0, 2.0], vec![10.0], vec![1.0, 1.0]),
        )]);
        assert!(matches!(result, Err(MultiStateError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_norm_fallback_to_first_value() {
        let data = MultiStateData::from_items(vec![(
            0u32,
            (vec![0.0, 1.0], vec![5.0, 5.0], vec![1.0, 1.0]),
        )])
        .unwrap();
        assert_relative_eq!(data.norm(), 5.0);
        assert_eq!(data.arrays().y, array![1.0, 1.0]);
        assert_eq!(data.arrays().err, array![0.2, 0.2]);
    }

    #[test]
    fn test_norm_fallback_negative_constant() {
        let data = MultiStateData::from_items(vec![(
            0u32,
            (vec![0.0, 1.0], vec![-4.0, -4.0], vec![1.0, 1.0]),
        )])
        .unwrap();
        assert_relative_eq!(data.norm(), 4.0);
        assert_eq!(data.arrays().y, array![-1.0, -1.0]);
    }

    #[test]
    fn test_norm_fallback_to_one() {
        let data = MultiStateData::from_items(vec![(
            0u32,
            (vec![0.0, 1.0], vec![0.0, 0.0], vec![0.5, 0.5]),
        )])
        .unwrap();
        assert_eq!(data.norm(), 1.0);
        assert_eq!(data.arrays().err, array![0.5, 0.5]);
    }

    #[test]
    fn test_sample() {
        let data = two_states();
        let sample = data.sample(&array![0.5, 1.5, 2.5].view());
        assert_eq!(sample.dim(), (6, 2));
        assert_eq!(sample.column(0), array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(sample.column(1), array![0.5, 1.5, 2.5, 0.5, 1.5, 2.5]);

        let empty = data.sample(&Array1::<f64>::zeros(0).view());
        assert_eq!(empty.dim(), (0, 2));
    }

    #[test]
    fn test_round_trip_through_flat_bundle() {
        let data = two_states();
        let restored =
            MultiStateData::from_flat_bundle_with_keys(data.arrays().clone(), data.keys().to_vec())
                .unwrap();
        assert_eq!(restored.keys(), data.keys());
        for (key, record) in data.states() {
            let other = restored.get(key).unwrap();
            assert_eq!(other.x, record.x);
            for (a, b) in other.y.iter().zip(record.y.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9);
            }
            for (a, b) in other.err.iter().zip(record.err.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9);
            }
        }
        assert_eq!(restored.arrays(), data.arrays());
    }

    #[test]
    fn test_from_flat_arrays_default_keys() {
        let data: MultiStateData<usize> = MultiStateData::from_flat_arrays(
            array![[1.0, 0.5], [0.0, 1.0], [1.0, 2.0]],
            array![1.0, 2.0, 3.0],
            array![0.1, 0.2, 0.3],
            2.0,
            None,
        )
        .unwrap();
        assert_eq!(data.keys(), &[0, 1]);
        let s1 = data.get(&1).unwrap();
        assert_eq!(s1.x, array![0.5, 2.0]);
        assert_eq!(s1.y, array![2.0, 6.0]);
        assert_eq!(data.arrays().y, array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_keys_matched_by_position() {
        // Index column holds 0 and 1; "second" gets index-0 rows because it comes first.
        let data = MultiStateData::from_flat_arrays_with_keys(
            array![[0.0, 1.0], [1.0, 2.0]],
            array![1.0, 2.0],
            array![0.0, 0.0],
            1.0,
            vec!["second", "first"],
        )
        .unwrap();
        assert_eq!(data.get(&"second").unwrap().y, array![1.0]);
        assert_eq!(data.get(&"first").unwrap().y, array![2.0]);
    }

    #[test]
    fn test_fewer_keys_than_states() {
        let data = MultiStateData::from_flat_arrays_with_keys(
            array![[0.0, 1.0], [1.0, 2.0], [0.0, 3.0]],
            array![1.0, 2.0, 3.0],
            array![0.1, 0.2, 0.3],
            2.0,
            vec!["only"],
        )
        .unwrap();
        assert_eq!(data.keys(), &["only"]);
        let only = data.get(&"only").unwrap();
        assert_eq!(only.x, array![1.0, 3.0]);
        assert_eq!(only.y, array![2.0, 6.0]);
        assert_eq!(data.arrays().x, array![[0.0, 1.0], [1.0, 2.0], [0.0, 3.0]]);
        assert_eq!(data.arrays().y, array![1.0, 2.0, 3.0]);
        assert_eq!(data.len(), 3);
    }

    #[test]
    fn test_default_keys_reject_fractional_index() {
        let result: Result<MultiStateData<usize>> = MultiStateData::from_flat_arrays(
            array![[0.0, 1.0], [0.5, 2.0]],
            array![1.0, 2.0],
            array![0.0, 0.0],
            1.0,
            None,
        );
        assert!(matches!(result, Err(MultiStateError::InvalidParameter(_))));
    }

    #[test]
    fn test_default_keys_reject_negative_index() {
        let result: Result<MultiStateData<i64>> = MultiStateData::from_flat_arrays(
            array![[-1.0, 1.0], [0.0, 2.0]],
            array![1.0, 2.0],
            array![0.0, 0.0],
            1.0,
            None,
        );
        assert!(matches!(result, Err(MultiStateError::InvalidParameter(_))));
    }

    #[test]
    fn test_sparse_default_keys_leave_gaps() {
        let data: MultiStateData<usize> = MultiStateData::from_flat_arrays(
            array![[0.0, 1.0], [2.0, 2.0]],
            array![1.0, 2.0],
            array![0.0, 0.0],
            1.0,
            None,
        )
        .unwrap();
        assert_eq!(data.keys(), &[0, 2]);
        assert!(data.get(&2).unwrap().is_empty());
    }

    #[test]
    fn test_convert_flat_arrays_carries_norm_and_keys() {
        let data = two_states();
        let sample = data.sample(&array![0.0, 5.0].view());
        let predictions = Array1::from_elem(sample.nrows(), 1.0);
        let errors = Array1::from_elem(sample.nrows(), 0.5);

        let converted = data
            .convert_flat_arrays(sample, predictions, errors)
            .unwrap();
        assert_eq!(converted.norm(), data.norm());
        assert_eq!(converted.keys(), data.keys());
        let b = converted.get(&"B").unwrap();
        assert_eq!(b.x, array![0.0, 5.0]);
        assert_relative_eq!(b.y[1], data.norm(), epsilon = 1e-12);
    }

    #[test]
    fn test_flat_shape_mismatch() {
        let result = MultiStateData::from_flat_arrays_with_keys(
            array![[0.0, 1.0], [0.0, 2.0]],
            array![1.0],
            array![0.1, 0.1],
            1.0,
            vec!["A"],
        );
        assert!(matches!(result, Err(MultiStateError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_non_positive_norm_rejected() {
        let result: Result<MultiStateData<usize>> = MultiStateData::from_flat_arrays(
            array![[0.0, 1.0]],
            array![1.0],
            array![0.1],
            -1.0,
            None,
        );
        assert!(matches!(result, Err(MultiStateError::InvalidParameter(_))));
    }

    #[test]
    fn test_convenience_functions() {
        let a = data_from_items(vec![("A", (vec![1.0], vec![2.0], vec![0.1]))]).unwrap();
        let b = data_from_state_data(vec![(
            "A",
            StateRecord::new(array![1.0], array![2.0], array![0.1]),
        )])
        .unwrap();
        assert_eq!(a, b);

        let arrays = a.arrays().clone();
        let c: MultiStateData<String> =
            data_from_arrays(arrays.x, arrays.y, arrays.err, arrays.norm, None).unwrap();
        assert_eq!(c.keys(), &["0".to_string()]);
        assert_eq!(c.get(&"0".to_string()).unwrap().y, array![2.0]);
    }
}
