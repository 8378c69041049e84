//! Slit-decomposition inner solver.
//!
//! Given one swath of a rectified trace, jointly estimates the oversampled
//! cross-dispersion illumination profile (slit function) and the per-column
//! spectrum that best reproduce the data, by alternating two regularized
//! banded least-squares solves with iterative 6-sigma outlier rejection.

mod omega;
mod solver;

pub use solver::{decompose_swath, DecompositionOptions, SwathDecomposition};
