//! Run report: per-trace outcomes and timings.

use serde::{Deserialize, Serialize};

/// How one trace fared during the run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TraceStatus {
    /// Full (spectrum, slit function, model contribution) triple produced.
    Extracted,
    /// The trace produced no result; processing continued with the rest.
    Failed { reason: String },
}

/// Per-trace entry of the extraction report.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceOutcome {
    pub order: i32,
    pub trace_nb: i32,
    pub status: TraceStatus,
    /// Extraction window height resolved for this trace.
    pub height: Option<usize>,
    /// Number of swaths decomposed (zero in sum mode).
    pub swaths: usize,
    /// Total inner-solver iterations over all swaths.
    pub iterations: usize,
    pub elapsed_ms: f64,
}

impl TraceOutcome {
    pub fn is_extracted(&self) -> bool {
        self.status == TraceStatus::Extracted
    }
}

/// Aggregated report for one extraction run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub traces: Vec<TraceOutcome>,
    pub total_ms: f64,
}

impl ExtractionReport {
    pub fn extracted(&self) -> usize {
        self.traces.iter().filter(|t| t.is_extracted()).count()
    }

    pub fn failed(&self) -> usize {
        self.traces.len() - self.extracted()
    }
}
