//! Trace table: per-(order, trace) polynomial geometry on the detector.
//!
//! Each record carries three polynomials in the detector column coordinate
//! (evaluated at 1-based column positions): the lower edge, the upper edge
//! and the centerline of the illuminated strip. A slit-curvature polynomial
//! is carried along for downstream consumers but is not used by this core.

use nalgebra::DVector;

use crate::error::{ExtractError, Result};

/// Polynomial in the detector x-column, coefficients in ascending degree.
#[derive(Clone, Debug)]
pub struct TracePolynomial {
    coeffs: Vec<f64>,
}

impl TracePolynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    /// Constant polynomial, handy for straight horizontal traces.
    pub fn constant(c: f64) -> Self {
        Self { coeffs: vec![c] }
    }

    /// Horner evaluation at a single position.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    /// Evaluate over all detector columns, at 1-based positions `1..=lenx`.
    pub fn eval_columns(&self, lenx: usize) -> DVector<f64> {
        DVector::from_fn(lenx, |i, _| self.eval((i + 1) as f64))
    }
}

/// One row of the trace table.
#[derive(Clone, Debug)]
pub struct TraceRecord {
    pub order: i32,
    pub trace_nb: i32,
    pub lower: TracePolynomial,
    pub upper: TracePolynomial,
    pub center: TracePolynomial,
    /// Slit curvature coefficients, unused by the extraction core.
    pub slit_curvature: [f64; 3],
}

impl TraceRecord {
    /// Centerline y-position for every detector column.
    pub fn ycen(&self, lenx: usize) -> DVector<f64> {
        self.center.eval_columns(lenx)
    }

    /// Extraction height derived from the edge polynomials: the rounded
    /// mean vertical extent `upper - lower` over all columns. Fails when
    /// the result is not a positive pixel count.
    pub fn height(&self, lenx: usize) -> Result<usize> {
        if lenx == 0 {
            return Err(ExtractError::InconsistentInput(
                "cannot compute a trace height on a zero-width image".into(),
            ));
        }
        let mut sum = 0.0;
        for i in 0..lenx {
            let x = (i + 1) as f64;
            sum += self.upper.eval(x) - self.lower.eval(x);
        }
        let mean = sum / lenx as f64;
        if !mean.is_finite() {
            return Err(ExtractError::NumericAnomaly(format!(
                "trace ({}, {}) edge polynomials produced a non-finite height",
                self.order, self.trace_nb
            )));
        }
        let height = mean.round();
        if height < 1.0 {
            return Err(ExtractError::InvalidGeometry(format!(
                "trace ({}, {}) has non-positive height {:.2}",
                self.order, self.trace_nb, mean
            )));
        }
        Ok(height as usize)
    }
}

/// Table of trace records with unique `(order, trace_nb)` keys.
#[derive(Clone, Debug, Default)]
pub struct TraceTable {
    records: Vec<TraceRecord>,
}

impl TraceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; duplicate `(order, trace_nb)` pairs are rejected.
    pub fn push(&mut self, record: TraceRecord) -> Result<()> {
        if self
            .records
            .iter()
            .any(|r| r.order == record.order && r.trace_nb == record.trace_nb)
        {
            return Err(ExtractError::InconsistentInput(format!(
                "duplicate trace entry ({}, {})",
                record.order, record.trace_nb
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn get(&self, order: i32, trace_nb: i32) -> Option<&TraceRecord> {
        self.records
            .iter()
            .find(|r| r.order == order && r.trace_nb == trace_nb)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
