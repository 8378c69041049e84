#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod error;
pub mod extract;
pub mod image;
pub mod trace;

// “Expert” modules – still public, but considered unstable internals.
pub mod bandsol;
pub mod rectify;
pub mod slitdec;
pub mod swath;

// --- High-level re-exports -------------------------------------------------

// Main entry points: extractor + results.
pub use crate::extract::{ExtractParams, ExtractionResult, Extractor, ParallelExtractOptions};
pub use crate::image::DetectorImage;
pub use crate::trace::{TracePolynomial, TraceRecord, TraceTable};

// Run report and error surface.
pub use crate::error::{ExtractError, Result};
pub use crate::extract::{ExtractionReport, TraceOutcome, TraceStatus};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```
/// use echelle_extract::prelude::*;
///
/// let mut image = DetectorImage::new(64, 32);
/// for y in 0..32 {
///     for x in 0..64 {
///         // Flat-topped strip around row 15.
///         if (12..=18).contains(&y) {
///             image.set(x, y, 300.0);
///         }
///     }
/// }
/// let mut traces = TraceTable::new();
/// traces
///     .push(TraceRecord {
///         order: 1,
///         trace_nb: 1,
///         lower: TracePolynomial::constant(12.0),
///         upper: TracePolynomial::constant(18.0),
///         center: TracePolynomial::constant(15.0),
///         slit_curvature: [0.0; 3],
///     })
///     .unwrap();
///
/// let extractor = Extractor::new(ExtractParams {
///     swath: 32,
///     oversample: 2,
///     ..Default::default()
/// });
/// let result = extractor.process(&image, &traces).unwrap();
/// assert_eq!(result.report.extracted(), 1);
/// ```
pub mod prelude {
    pub use crate::extract::{ExtractParams, ExtractionResult, Extractor};
    pub use crate::image::DetectorImage;
    pub use crate::trace::{TracePolynomial, TraceRecord, TraceTable};
}
