//! Parameter types configuring the extraction run.

use serde::{Deserialize, Serialize};

use crate::slitdec::DecompositionOptions;

/// Extraction-wide parameters shared by both extraction modes.
///
/// Defaults mirror the production recipe: 256-column swaths, tenfold
/// oversampling, slit smoothing on, spectrum smoothing off.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractParams {
    /// Extraction window height in pixels; `None` derives it per trace from
    /// the edge polynomials.
    pub height: Option<usize>,
    /// Swath width in columns; auto-adjusted to an even value within the
    /// trace length.
    pub swath: usize,
    /// Sub-pixel oversampling factor of the slit function (>= 1).
    pub oversample: usize,
    /// Slit-function smoothing weight (`lambda_sL`).
    pub smooth_slit: f64,
    /// Spectrum smoothing weight (`lambda_sP`); zero disables it.
    pub lambda_sp: f64,
    /// Fractional spectrum-change stop condition of the inner solver.
    pub sp_stop: f64,
    /// Iteration cap of the inner solver.
    pub max_iter: usize,
    /// Restrict processing to one order.
    pub order: Option<i32>,
    /// Restrict processing to one trace number.
    pub trace_nb: Option<i32>,
    /// Trace-level parallelism controls.
    pub parallel: ParallelExtractOptions,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            height: None,
            swath: 256,
            oversample: 10,
            smooth_slit: 1.0,
            lambda_sp: 0.0,
            sp_stop: 1e-5,
            max_iter: 20,
            order: None,
            trace_nb: None,
            parallel: ParallelExtractOptions::default(),
        }
    }
}

impl ExtractParams {
    pub(crate) fn decomposition_options(&self) -> DecompositionOptions {
        DecompositionOptions {
            osample: self.oversample,
            lambda_sp: self.lambda_sp,
            lambda_sl: self.smooth_slit,
            sp_stop: self.sp_stop,
            max_iter: self.max_iter,
        }
    }

    pub(crate) fn selects(&self, order: i32, trace_nb: i32) -> bool {
        self.order.map_or(true, |o| o == order) && self.trace_nb.map_or(true, |t| t == trace_nb)
    }
}

/// Controls whether traces are extracted sequentially or with Rayon.
///
/// Each trace's extraction is independent given the shared read-only frame
/// and trace table; per-trace model rectangles are merged sequentially
/// afterwards, so no synchronized writes are needed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelExtractOptions {
    pub enabled: bool,
    pub min_traces_for_parallel: usize,
}

impl ParallelExtractOptions {
    pub fn new(enabled: bool, min_traces_for_parallel: usize) -> Self {
        Self {
            enabled,
            min_traces_for_parallel: min_traces_for_parallel.max(1),
        }
    }

    /// Disable parallel extraction regardless of trace count.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_traces_for_parallel: usize::MAX,
        }
    }

    /// Returns true when parallel extraction should be used for
    /// `trace_count` traces.
    pub fn should_parallelize(&self, trace_count: usize) -> bool {
        self.enabled && trace_count >= self.min_traces_for_parallel
    }
}

impl Default for ParallelExtractOptions {
    fn default() -> Self {
        Self {
            enabled: cfg!(feature = "parallel"),
            min_traces_for_parallel: 2,
        }
    }
}
