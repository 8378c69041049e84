//! Extraction orchestrator: loops over the trace table, rectifies each
//! trace, runs the swath-tiled slit decomposition (or the fast sum
//! collapse), and assembles whole-detector outputs.
//!
//! Failures local to one trace are logged and recorded as absent outcomes;
//! processing continues with the remaining traces. Only malformed input
//! shared across all traces aborts the whole call.

pub mod params;
pub mod report;
pub mod tables;

pub use params::{ExtractParams, ParallelExtractOptions};
pub use report::{ExtractionReport, TraceOutcome, TraceStatus};
pub use tables::{ExtractionTable, TraceKey};

use std::time::Instant;

use log::{info, warn};
use nalgebra::DVector;

use crate::error::{ExtractError, Result};
use crate::image::DetectorImage;
use crate::rectify::{cut_rectify, insert_rect, ycen_rest};
use crate::swath::decompose_rectified;
use crate::trace::{TraceRecord, TraceTable};

/// Everything one extraction run produces.
#[derive(Clone, Debug)]
pub struct ExtractionResult {
    /// Per-trace spectra, one column of detector width per trace.
    pub spectra: ExtractionTable,
    /// Per-trace uncertainties, co-indexed with the spectra.
    pub uncertainties: ExtractionTable,
    /// Per-trace slit functions (lengths differ with per-trace heights).
    pub slit_funcs: ExtractionTable,
    /// Model of the full detector frame, summed over the extracted traces.
    pub model: DetectorImage,
    pub report: ExtractionReport,
}

/// Outputs of one successfully extracted trace before assembly.
struct TraceProduct {
    spectrum: DVector<f64>,
    uncertainty: DVector<f64>,
    slit_func: DVector<f64>,
    model_rect: DetectorImage,
    ycen: DVector<f64>,
    height: usize,
    swaths: usize,
    iterations: usize,
}

/// Extraction pipeline over a detector frame and its trace table.
pub struct Extractor {
    params: ExtractParams,
}

impl Extractor {
    pub fn new(params: ExtractParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ExtractParams {
        &self.params
    }

    /// Slit-decomposition extraction of every selected trace.
    pub fn process(&self, image: &DetectorImage, traces: &TraceTable) -> Result<ExtractionResult> {
        self.run(image, traces, |rec| self.extract_one(image, rec))
    }

    /// Sum extraction: a fast, non-iterative collapse of the rectified
    /// trace. Usable when slit decomposition is not needed or the signal
    /// is strong.
    pub fn process_sum(
        &self,
        image: &DetectorImage,
        traces: &TraceTable,
    ) -> Result<ExtractionResult> {
        self.run(image, traces, |rec| self.sum_one(image, rec))
    }

    fn run<F>(&self, image: &DetectorImage, traces: &TraceTable, per_trace: F) -> Result<ExtractionResult>
    where
        F: Fn(&TraceRecord) -> Result<TraceProduct> + Sync,
    {
        if image.is_empty() {
            return Err(ExtractError::InconsistentInput(
                "detector image is empty".into(),
            ));
        }
        if traces.is_empty() {
            return Err(ExtractError::InconsistentInput(
                "trace table is empty".into(),
            ));
        }

        let total_start = Instant::now();
        let selected: Vec<&TraceRecord> = traces
            .records()
            .iter()
            .filter(|r| self.params.selects(r.order, r.trace_nb))
            .collect();
        if selected.is_empty() {
            info!(
                "no trace matches the (order, trace) filter ({:?}, {:?})",
                self.params.order, self.params.trace_nb
            );
        }

        let solve = |rec: &&TraceRecord| {
            let start = Instant::now();
            let product = per_trace(rec);
            (product, start.elapsed().as_secs_f64() * 1000.0)
        };
        let solved: Vec<(Result<TraceProduct>, f64)> =
            if self.params.parallel.should_parallelize(selected.len()) {
                #[cfg(feature = "parallel")]
                {
                    use rayon::prelude::*;
                    selected.par_iter().map(solve).collect()
                }
                #[cfg(not(feature = "parallel"))]
                {
                    selected.iter().map(solve).collect()
                }
            } else {
                selected.iter().map(solve).collect()
            };

        let lenx = image.width();
        let mut result = ExtractionResult {
            spectra: ExtractionTable::uniform("SPEC", lenx),
            uncertainties: ExtractionTable::uniform("SPEC_ERR", lenx),
            slit_funcs: ExtractionTable::ragged("SLIT_FUNC"),
            model: DetectorImage::new(lenx, image.height()),
            report: ExtractionReport::default(),
        };

        for (rec, (product, elapsed_ms)) in selected.iter().zip(solved) {
            let key = TraceKey {
                order: rec.order,
                trace_nb: rec.trace_nb,
            };
            match product {
                Ok(p) => {
                    // Trace models are summed into the detector model, so
                    // overlapping extraction windows both keep their share.
                    let mut contribution = DetectorImage::new(lenx, image.height());
                    insert_rect(&p.model_rect, &p.ycen, &mut contribution)?;
                    result.model.accumulate(&contribution)?;
                    result.spectra.insert(key, p.spectrum)?;
                    result.uncertainties.insert(key, p.uncertainty)?;
                    result.slit_funcs.insert(key, p.slit_func)?;
                    result.report.traces.push(TraceOutcome {
                        order: key.order,
                        trace_nb: key.trace_nb,
                        status: TraceStatus::Extracted,
                        height: Some(p.height),
                        swaths: p.swaths,
                        iterations: p.iterations,
                        elapsed_ms,
                    });
                }
                Err(err) => {
                    warn!(
                        "trace ({}, {}) produced no result: {err}",
                        key.order, key.trace_nb
                    );
                    result.report.traces.push(TraceOutcome {
                        order: key.order,
                        trace_nb: key.trace_nb,
                        status: TraceStatus::Failed {
                            reason: err.to_string(),
                        },
                        height: None,
                        swaths: 0,
                        iterations: 0,
                        elapsed_ms,
                    });
                }
            }
        }
        result.report.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "extracted {}/{} traces in {:.1} ms",
            result.report.extracted(),
            result.report.traces.len(),
            result.report.total_ms
        );
        Ok(result)
    }

    fn resolve_height(&self, rec: &TraceRecord, lenx: usize) -> Result<usize> {
        match self.params.height {
            Some(h) if h >= 1 => Ok(h),
            Some(h) => Err(ExtractError::InvalidGeometry(format!(
                "requested extraction height {h} is not positive"
            ))),
            None => rec.height(lenx),
        }
    }

    fn extract_one(&self, image: &DetectorImage, rec: &TraceRecord) -> Result<TraceProduct> {
        let lenx = image.width();
        let height = self.resolve_height(rec, lenx)?;
        let ycen = rec.ycen(lenx);
        let rect = cut_rectify(image, &ycen, height)?;
        let rest = ycen_rest(&ycen);

        let dec = decompose_rectified(
            &rect,
            &rest,
            self.params.swath,
            &self.params.decomposition_options(),
        )?;

        Ok(TraceProduct {
            spectrum: DVector::from_vec(dec.spectrum),
            uncertainty: DVector::from_vec(dec.uncertainty),
            slit_func: DVector::from_vec(dec.slit_func),
            model_rect: dec.model,
            ycen,
            height,
            swaths: dec.swaths,
            iterations: dec.iterations,
        })
    }

    fn sum_one(&self, image: &DetectorImage, rec: &TraceRecord) -> Result<TraceProduct> {
        let lenx = image.width();
        let height = self.resolve_height(rec, lenx)?;
        let ycen = rec.ycen(lenx);
        let rect = cut_rectify(image, &ycen, height)?;

        let mut spectrum: DVector<f64> = DVector::zeros(lenx);
        let mut slit: DVector<f64> = DVector::zeros(height);
        for x in 0..lenx {
            for j in 0..height {
                if rect.is_rejected(x, j) {
                    continue;
                }
                let v = rect.get(x, j);
                if !v.is_finite() {
                    return Err(ExtractError::NumericAnomaly(format!(
                        "non-finite pixel at rectified ({x}, {j}) outside the mask"
                    )));
                }
                spectrum[x] += v;
                slit[j] += v;
            }
        }
        let total = slit.sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(ExtractError::NumericAnomaly(format!(
                "slit collapse of trace ({}, {}) sums to {total}",
                rec.order, rec.trace_nb
            )));
        }
        slit /= total;

        let mut model_rect = DetectorImage::new(lenx, height);
        for x in 0..lenx {
            for j in 0..height {
                model_rect.set(x, j, spectrum[x] * slit[j]);
            }
        }
        let uncertainty = spectrum.map(|s| s.max(0.0).sqrt());

        Ok(TraceProduct {
            spectrum,
            uncertainty,
            slit_func: slit,
            model_rect,
            ycen,
            height,
            swaths: 0,
            iterations: 0,
        })
    }
}
