//! Swath tiling of a rectified trace.
//!
//! The rectified trace is cut into overlapping fixed-width column swaths at
//! half-swath stride. Each swath is decomposed independently; spectra are
//! recombined with triangular edge-taper weights, models are written in
//! place (a later swath wins in the overlap), and slit functions are
//! averaged over all swaths.

use log::debug;

use crate::error::{ExtractError, Result};
use crate::image::{median_in_place, DetectorImage};
use crate::slitdec::{decompose_swath, DecompositionOptions};

/// Smallest usable swath: two half-swath strides.
const MIN_SWATH: usize = 4;

/// Whole-trace outputs assembled from the per-swath solves.
#[derive(Clone, Debug)]
pub struct TraceDecomposition {
    /// Blended spectrum, one value per trace column.
    pub spectrum: Vec<f64>,
    /// Swath-averaged oversampled slit function.
    pub slit_func: Vec<f64>,
    /// Model reconstruction of the rectified trace.
    pub model: DetectorImage,
    /// Per-column uncertainty from Poisson statistics of the recovered
    /// spectrum plus the residual power of the masked fit.
    pub uncertainty: Vec<f64>,
    /// Number of swaths decomposed.
    pub swaths: usize,
    /// Total solver iterations over all swaths.
    pub iterations: usize,
}

/// Clamp the requested swath width to an even value in `[MIN_SWATH, lenx]`.
/// Odd widths are disallowed because the tiling stride is `swath / 2`.
pub(crate) fn adjust_swath(swath: usize, lenx: usize) -> Result<usize> {
    if lenx < MIN_SWATH {
        return Err(ExtractError::InvalidGeometry(format!(
            "trace of {} columns is too short to tile (minimum {})",
            lenx, MIN_SWATH
        )));
    }
    let mut sw = swath.max(MIN_SWATH);
    if sw % 2 != 0 {
        sw += 1;
    }
    if sw > lenx {
        sw = lenx - lenx % 2;
    }
    Ok(sw)
}

/// Triangular edge-taper weights of length `swath`, maximum 1 adjacent to
/// the swath center: `w[j] = (j+1)/halfswath` mirrored around the middle.
fn edge_taper(swath: usize) -> Vec<f64> {
    let half = swath / 2;
    let mut w = vec![0.0; swath];
    for i in 0..half {
        let v = (i + 1) as f64 / half as f64;
        w[i] = v;
        w[swath - 1 - i] = v;
    }
    w
}

struct SwathBlock {
    image: Vec<f64>,
    mask: Vec<u8>,
    sl_guess: Vec<f64>,
    sp_guess: Vec<f64>,
}

/// Copy one column window out of the rectified trace and derive the solver
/// seeds: column medians for the spectrum (robust against single-row
/// cosmic-ray hits), the overall block median for the slit function.
fn cut_block(rect: &DetectorImage, start: usize, swath: usize, ny: usize) -> SwathBlock {
    let nrows = rect.height();
    let mut image = vec![0.0; nrows * swath];
    let mut mask = vec![0u8; nrows * swath];
    let mut all = Vec::with_capacity(nrows * swath);
    let mut sp_guess = vec![0.0; swath];
    let mut col = Vec::with_capacity(nrows);

    for c in 0..swath {
        col.clear();
        for y in 0..nrows {
            let x = start + c;
            let j = y * swath + c;
            if rect.is_rejected(x, y) {
                image[j] = 0.0;
                mask[j] = 0;
                continue;
            }
            let v = rect.get(x, y);
            image[j] = v;
            mask[j] = 1;
            col.push(v);
            all.push(v);
        }
        sp_guess[c] = median_in_place(&mut col).unwrap_or(0.0);
    }
    let block_median = median_in_place(&mut all).unwrap_or(0.0);
    SwathBlock {
        image,
        mask,
        sl_guess: vec![block_median; ny],
        sp_guess,
    }
}

/// Decompose a rectified trace swath by swath.
///
/// `ycen_rest` holds the sub-pixel centerline remainder for every trace
/// column. The first swath keeps full weight on its leading half and the
/// last one on its trailing half; a remainder tail not covered by the
/// half-swath stride is handled by one extra swath anchored at
/// `lenx - swath`, blended with full weight into the uncovered columns only.
pub fn decompose_rectified(
    rect: &DetectorImage,
    ycen_rest: &[f64],
    swath_width: usize,
    opts: &DecompositionOptions,
) -> Result<TraceDecomposition> {
    let lenx = rect.width();
    let nrows = rect.height();
    if ycen_rest.len() != lenx {
        return Err(ExtractError::InconsistentInput(format!(
            "ycen_rest has {} entries for a {}-column trace",
            ycen_rest.len(),
            lenx
        )));
    }
    let swath = adjust_swath(swath_width, lenx)?;
    let half = swath / 2;
    let ny = opts.osample * (nrows + 1) + 1;
    let mut nswaths = (lenx / swath) * 2;
    if lenx % swath >= half {
        nswaths += 1;
    }
    debug!(
        "tiling {}x{} trace into {} swaths of {} columns",
        lenx, nrows, nswaths, swath
    );

    let weights = edge_taper(swath);
    let mut spectrum = vec![0.0; lenx];
    let mut slitfu_acc = vec![0.0; ny];
    let mut model = DetectorImage::new(lenx, nrows);
    let mut solved = 0usize;
    let mut iterations = 0usize;

    let run_swath = |start: usize,
                         solved: &mut usize,
                         iterations: &mut usize,
                         slitfu_acc: &mut [f64],
                         model: &mut DetectorImage|
     -> Result<Vec<f64>> {
        let block = cut_block(rect, start, swath, ny);
        let out = decompose_swath(
            &block.image,
            &block.mask,
            &ycen_rest[start..start + swath],
            nrows,
            swath,
            &block.sl_guess,
            &block.sp_guess,
            opts,
        )?;
        for c in 0..swath {
            for y in 0..nrows {
                model.set(start + c, y, out.model[y * swath + c]);
            }
        }
        for (acc, &v) in slitfu_acc.iter_mut().zip(out.slit_func.iter()) {
            *acc += v;
        }
        *solved += 1;
        *iterations += out.iterations;
        Ok(out.spectrum)
    };

    // Half-swath stride over the trace body.
    let body_swaths = nswaths.saturating_sub(1);
    for i in 0..body_swaths {
        let start = i * half;
        let mut spec_sw = run_swath(
            start,
            &mut solved,
            &mut iterations,
            &mut slitfu_acc,
            &mut model,
        )?;
        for (s, w) in spec_sw.iter_mut().zip(weights.iter()) {
            *s *= w;
        }
        if i == 0 {
            // No prior swath covers the leading half: restore full weight.
            for j in 0..half {
                spec_sw[j] /= weights[j];
            }
        }
        if i + 1 == body_swaths {
            // Symmetric treatment for the trailing half of the last swath.
            for j in half..swath {
                spec_sw[j] /= weights[j];
            }
        }
        for (j, s) in spec_sw.into_iter().enumerate() {
            spectrum[start + j] += s;
        }
    }

    // Columns past the half-swath stride coverage get one extra swath
    // anchored at the trace end, written with full weight.
    let covered = nswaths * half;
    if covered < lenx {
        let start = lenx - swath;
        let spec_sw = run_swath(
            start,
            &mut solved,
            &mut iterations,
            &mut slitfu_acc,
            &mut model,
        )?;
        for (j, s) in spec_sw.into_iter().enumerate() {
            if start + j >= covered {
                spectrum[start + j] = s;
            }
        }
    }

    let slit_func: Vec<f64> = slitfu_acc.iter().map(|v| v / solved as f64).collect();
    let uncertainty = column_uncertainty(rect, &model, &spectrum);

    Ok(TraceDecomposition {
        spectrum,
        slit_func,
        model,
        uncertainty,
        swaths: solved,
        iterations,
    })
}

/// Per-column uncertainty: Poisson variance of the recovered counts plus
/// the residual power of the model fit over the valid trace pixels.
fn column_uncertainty(rect: &DetectorImage, model: &DetectorImage, spectrum: &[f64]) -> Vec<f64> {
    let mut sigma = vec![0.0; spectrum.len()];
    for (x, s) in sigma.iter_mut().enumerate() {
        let mut resid = 0.0;
        for y in 0..rect.height() {
            if rect.is_rejected(x, y) {
                continue;
            }
            let r = rect.get(x, y) - model.get(x, y);
            resid += r * r;
        }
        *s = (spectrum[x].max(0.0) + resid).sqrt();
    }
    sigma
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_swath_clamps_and_evens() {
        assert_eq!(adjust_swath(255, 2048).unwrap(), 256);
        assert_eq!(adjust_swath(256, 2048).unwrap(), 256);
        assert_eq!(adjust_swath(3, 100).unwrap(), 4);
        assert_eq!(adjust_swath(500, 100).unwrap(), 100);
        assert_eq!(adjust_swath(500, 101).unwrap(), 100);
        assert!(adjust_swath(8, 3).is_err());
    }

    #[test]
    fn edge_taper_peaks_at_one() {
        let w = edge_taper(8);
        assert_eq!(w, vec![0.25, 0.5, 0.75, 1.0, 1.0, 0.75, 0.5, 0.25]);
    }

    #[test]
    fn flat_trace_spectrum_is_continuous_across_swaths() {
        let lenx = 96;
        let nrows = 6;
        let mut rect = DetectorImage::new(lenx, nrows);
        for y in 0..nrows {
            for x in 0..lenx {
                rect.set(x, y, 500.0);
            }
        }
        let ycen_rest = vec![0.0; lenx];
        let opts = DecompositionOptions {
            osample: 2,
            lambda_sl: 0.1,
            ..Default::default()
        };

        let multi = decompose_rectified(&rect, &ycen_rest, 32, &opts).unwrap();
        let single = decompose_rectified(&rect, &ycen_rest, lenx, &opts).unwrap();
        assert!(multi.swaths > 1);
        assert_eq!(single.swaths, 1);

        for x in 0..lenx {
            let rel = (multi.spectrum[x] - single.spectrum[x]).abs() / single.spectrum[x];
            assert!(
                rel < 0.07,
                "column {x}: multi {} vs single {} (rel {rel:.3})",
                multi.spectrum[x],
                single.spectrum[x]
            );
        }
        // Swath-averaged slit function keeps the area normalization.
        let area: f64 = multi.slit_func.iter().sum::<f64>() / opts.osample as f64;
        assert!((area - 1.0).abs() < 1e-9);
    }

    #[test]
    fn remainder_tail_columns_are_extracted() {
        // lenx % halfswath != 0 leaves a tail the stride never covers.
        let lenx = 70;
        let nrows = 5;
        let mut rect = DetectorImage::new(lenx, nrows);
        for y in 0..nrows {
            for x in 0..lenx {
                rect.set(x, y, 200.0);
            }
        }
        let opts = DecompositionOptions {
            osample: 2,
            lambda_sl: 0.1,
            ..Default::default()
        };
        let out = decompose_rectified(&rect, &vec![0.0; lenx], 32, &opts).unwrap();
        for x in 0..lenx {
            assert!(
                out.spectrum[x] > 0.0,
                "column {x} was left unextracted: {}",
                out.spectrum[x]
            );
        }
    }
}
