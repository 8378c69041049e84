//! Error surface of the extraction core.

use thiserror::Error;

/// All failure modes of the extraction core.
///
/// Trace-local failures are caught by the orchestrator and turned into
/// per-trace report entries; only input problems shared by the whole run
/// surface from [`crate::Extractor::process`] directly.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Trace geometry that cannot be extracted (non-positive heights,
    /// empty spans, traces too short to tile).
    #[error("invalid trace geometry: {0}")]
    InvalidGeometry(String),

    /// A linear system without a unique solution: vanishing pivots in the
    /// banded solve or spectrum columns with no unmasked pixels.
    #[error("degenerate linear system: {0}")]
    DegenerateSystem(String),

    /// Buffers or tables whose shapes do not fit together.
    #[error("inconsistent input: {0}")]
    InconsistentInput(String),

    /// Non-finite values or collapsed normalizations detected mid-solve.
    #[error("numeric anomaly: {0}")]
    NumericAnomaly(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
