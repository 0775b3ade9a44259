//! Nested sampling over a [`Problem`](crate::problem::Problem).

mod nested;

pub use nested::{NestedSampler, DEFAULT_END, DEFAULT_ENSEMBLE, DEFAULT_SEED, MIN_ENSEMBLE};
