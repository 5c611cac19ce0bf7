//! # multistate
//!
//! Named and flattened representations of multi-state observational data.
//!
//! Multi-state data is a set of independent named series ("states"), each a
//! triple of coordinates, values and errors. A multi-output regression model
//! instead wants one feature matrix whose rows are `(state index, coordinate)`
//! plus aligned value and error vectors on a common scale. [`MultiStateData`]
//! holds both views at once and keeps them consistent.
//!
//! ## Example
//!
//! ```
//! use multistate::prelude::*;
//! use ndarray::array;
//!
//! let data = data_from_items(vec![
//!     ("A", (vec![1.0, 2.0], vec![10.0, 20.0], vec![1.0, 1.0])),
//!     ("B", (vec![3.0], vec![30.0], vec![2.0])),
//! ])?;
//!
//! // Train a model on `data.arrays()`, then ask for predictions everywhere.
//! let grid = data.sample(&array![1.0, 2.0, 3.0].view());
//! let predicted = ndarray::Array1::zeros(grid.nrows());
//! let predicted_err = ndarray::Array1::zeros(grid.nrows());
//!
//! let predictions = data.convert_flat_arrays(grid, predicted, predicted_err)?;
//! assert_eq!(predictions.keys(), data.keys());
//! assert_eq!(predictions.get(&"B")?.x, array![1.0, 2.0, 3.0]);
//! # Ok::<(), MultiStateError>(())
//! ```

pub mod data;
pub mod error;
pub mod frozen;
pub mod types;

pub use data::{MultiStateData, data_from_arrays, data_from_items, data_from_state_data};
pub use error::{MultiStateError, Result};
pub use frozen::FrozenOrderedMap;
pub use types::{FlatArrays, IndexKey, StateKey, StateRecord};

pub mod prelude {
    //! Convenient re-exports of commonly used types.
    pub use crate::data::{MultiStateData, data_from_arrays, data_from_items, data_from_state_data};
    pub use crate::error::{MultiStateError, Result};
    pub use crate::frozen::FrozenOrderedMap;
    pub use crate::types::{FlatArrays, IndexKey, StateKey, StateRecord};
}
