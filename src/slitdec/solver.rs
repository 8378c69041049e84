//! Alternating least-squares solver for one swath.

use log::debug;

use super::omega::OmegaTensor;
use crate::bandsol::BandMatrix;
use crate::error::{ExtractError, Result};

/// Outlier clip in units of the masked RMS deviation.
const REJECT_SIGMA: f64 = 6.0;

/// Knobs of the decomposition loop.
#[derive(Clone, Copy, Debug)]
pub struct DecompositionOptions {
    /// Sub-pixel oversampling factor of the slit grid (>= 1).
    pub osample: usize,
    /// Spectrum smoothing weight; zero disables the tridiagonal solve.
    pub lambda_sp: f64,
    /// Slit-function smoothing weight, usually > 0.
    pub lambda_sl: f64,
    /// Fractional spectrum-change stop condition.
    pub sp_stop: f64,
    /// Iteration cap; the only bounding mechanism of the loop.
    pub max_iter: usize,
}

impl Default for DecompositionOptions {
    fn default() -> Self {
        Self {
            osample: 10,
            lambda_sp: 0.0,
            lambda_sl: 1.0,
            sp_stop: 1e-5,
            max_iter: 20,
        }
    }
}

/// Result of one swath decomposition.
#[derive(Clone, Debug)]
pub struct SwathDecomposition {
    /// Oversampled slit function of length `osample*(nrows+1)+1`, normalized
    /// so that `sum / osample == 1`.
    pub slit_func: Vec<f64>,
    /// Integrated flux per swath column.
    pub spectrum: Vec<f64>,
    /// Model reconstruction of the swath, row-major `nrows × ncols`.
    pub model: Vec<f64>,
    /// Final pixel mask after outlier rejection (1 = used in the fit).
    pub mask: Vec<u8>,
    /// Number of alternating iterations executed.
    pub iterations: usize,
}

/// Jointly fit slit function and spectrum for one swath.
///
/// `image` and `initial_mask` are row-major `nrows × ncols`; `ycen_rest`
/// holds one sub-pixel centerline remainder per column, in `[0, 1)`.
/// `sl_guess` (length `osample*(nrows+1)+1`) and `sp_guess` (length `ncols`)
/// seed the iteration. The mask is re-derived from scratch every iteration:
/// a previously rejected pixel is re-admitted when the model improves.
pub fn decompose_swath(
    image: &[f64],
    initial_mask: &[u8],
    ycen_rest: &[f64],
    nrows: usize,
    ncols: usize,
    sl_guess: &[f64],
    sp_guess: &[f64],
    opts: &DecompositionOptions,
) -> Result<SwathDecomposition> {
    let osample = opts.osample;
    if osample < 1 {
        return Err(ExtractError::InconsistentInput(
            "oversampling factor must be >= 1".into(),
        ));
    }
    if nrows == 0 || ncols == 0 {
        return Err(ExtractError::InconsistentInput(
            "swath must have positive dimensions".into(),
        ));
    }
    let ny = osample * (nrows + 1) + 1;
    let npix = nrows * ncols;
    if image.len() != npix || initial_mask.len() != npix {
        return Err(ExtractError::InconsistentInput(format!(
            "swath buffers of {} / {} values do not match {}x{}",
            image.len(),
            initial_mask.len(),
            ncols,
            nrows
        )));
    }
    if ycen_rest.len() != ncols || sl_guess.len() != ny || sp_guess.len() != ncols {
        return Err(ExtractError::InconsistentInput(
            "swath guess vectors do not match the swath geometry".into(),
        ));
    }
    if image.iter().any(|v| !v.is_finite()) {
        return Err(ExtractError::NumericAnomaly(
            "swath image contains non-finite pixels outside the mask".into(),
        ));
    }

    let omega = OmegaTensor::build(ycen_rest, nrows, osample);
    let nd = 2 * osample + 1;

    let mut sl = sl_guess.to_vec();
    let mut sp = sp_guess.to_vec();
    let mut sp_old = vec![0.0; ncols];
    let mut mask: Vec<u8> = initial_mask.iter().map(|&m| u8::from(m != 0)).collect();
    let mut model = vec![0.0; npix];
    let mut rhs = vec![0.0; ny];
    let mut diag = vec![0.0; ncols];
    let mut e = vec![0.0; ncols];
    let mut iterations = 0;

    for iter in 0..=opts.max_iter {
        iterations = iter + 1;

        /* Slit-function update: banded system over the oversampled bins */
        let mut band = BandMatrix::zeros(ny, nd)?;
        let mut diag_tot = 0.0;
        for iy in 0..ny {
            rhs[iy] = 0.0;
            let jy_lo = iy.saturating_sub(osample);
            let jy_hi = (iy + osample).min(ny - 1);
            for jy in jy_lo..=jy_hi {
                let mut acc = 0.0;
                for x in 0..ncols {
                    let mut sum = 0.0;
                    for y in 0..nrows {
                        if mask[y * ncols + x] == 0 {
                            continue;
                        }
                        sum += omega.get(iy, y, x) * omega.get(jy, y, x);
                    }
                    acc += sum * sp[x] * sp[x];
                }
                band.set(iy, jy as isize - iy as isize, acc);
            }
            for x in 0..ncols {
                let mut sum = 0.0;
                for y in 0..nrows {
                    if mask[y * ncols + x] == 0 {
                        continue;
                    }
                    sum += omega.get(iy, y, x) * image[y * ncols + x];
                }
                rhs[iy] += sum * sp[x];
            }
            diag_tot += band.get(iy, 0);
        }

        /* Second-derivative Tikhonov penalty, one-sided at the ends */
        let lambda = opts.lambda_sl * diag_tot / ny as f64;
        band.add(0, 0, lambda);
        band.add(0, 1, -lambda);
        for iy in 1..ny - 1 {
            band.add(iy, -1, -lambda);
            band.add(iy, 0, 2.0 * lambda);
            band.add(iy, 1, -lambda);
        }
        band.add(ny - 1, -1, -lambda);
        band.add(ny - 1, 0, lambda);

        band.solve_in_place(&mut rhs)?;

        /* Area normalization at the native pixel rate fixes the scale
        ambiguity between slit function and spectrum */
        let norm: f64 = rhs.iter().sum::<f64>() / osample as f64;
        if norm == 0.0 || !norm.is_finite() {
            return Err(ExtractError::NumericAnomaly(format!(
                "slit function normalization collapsed (sum/osample = {norm})"
            )));
        }
        for (dst, &src) in sl.iter_mut().zip(rhs.iter()) {
            *dst = src / norm;
        }
        if sl.iter().any(|v| !v.is_finite()) {
            return Err(ExtractError::NumericAnomaly(
                "slit function update produced non-finite values".into(),
            ));
        }

        /* Spectrum update */
        for x in 0..ncols {
            diag[x] = 0.0;
            e[x] = 0.0;
            for y in 0..nrows {
                if mask[y * ncols + x] == 0 {
                    continue;
                }
                let proj = omega.project(&sl, y, x);
                diag[x] += proj * proj;
                e[x] += proj * image[y * ncols + x];
            }
        }
        sp_old.copy_from_slice(&sp);
        if opts.lambda_sp > 0.0 {
            let mean = sp.iter().sum::<f64>() / ncols as f64;
            let lambda = opts.lambda_sp * mean;
            let mut tri = BandMatrix::zeros(ncols, 3)?;
            for x in 0..ncols {
                tri.set(x, 0, diag[x]);
            }
            // First-derivative penalty over the spectrum, one-sided at
            // both boundaries.
            tri.add(0, 0, lambda);
            tri.set(0, 1, -lambda);
            for x in 1..ncols - 1 {
                tri.set(x, -1, -lambda);
                tri.add(x, 0, 2.0 * lambda);
                tri.set(x, 1, -lambda);
            }
            tri.set(ncols - 1, -1, -lambda);
            tri.add(ncols - 1, 0, lambda);
            tri.solve_in_place(&mut e)?;
            sp.copy_from_slice(&e);
        } else {
            for x in 0..ncols {
                if diag[x] == 0.0 {
                    return Err(ExtractError::DegenerateSystem(format!(
                        "swath column {x} has no unmasked pixels constraining the spectrum"
                    )));
                }
                sp[x] = e[x] / diag[x];
            }
        }
        if sp.iter().any(|v| !v.is_finite()) {
            return Err(ExtractError::NumericAnomaly(
                "spectrum update produced non-finite values".into(),
            ));
        }

        /* Model reconstruction */
        for y in 0..nrows {
            for x in 0..ncols {
                model[y * ncols + x] = omega.project(&sl, y, x) * sp[x];
            }
        }

        /* Outlier rejection: fresh mask from the masked RMS deviation */
        let mut sq = 0.0;
        let mut used = 0usize;
        for i in 0..npix {
            if mask[i] == 0 {
                continue;
            }
            let r = model[i] - image[i];
            sq += r * r;
            used += 1;
        }
        if used == 0 {
            return Err(ExtractError::NumericAnomaly(
                "every pixel of the swath is masked".into(),
            ));
        }
        let dev = (sq / used as f64).sqrt();
        for i in 0..npix {
            let clipped = (model[i] - image[i]).abs() > REJECT_SIGMA * dev;
            mask[i] = u8::from(initial_mask[i] != 0 && !clipped);
        }

        /* Convergence on the largest spectrum change */
        let mut sp_change = 0.0_f64;
        let mut sp_max = 1.0_f64;
        for x in 0..ncols {
            sp_max = sp_max.max(sp[x]);
            sp_change = sp_change.max((sp[x] - sp_old[x]).abs());
        }
        if sp_change <= opts.sp_stop * sp_max {
            debug!(
                "swath converged after {} iterations (dev = {:.3e})",
                iterations, dev
            );
            break;
        }
    }

    Ok(SwathDecomposition {
        slit_func: sl,
        spectrum: sp,
        model,
        mask,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat illumination with an integer centerline: the model reproduces
    /// the data exactly, so the solver must converge immediately without
    /// rejecting a single pixel.
    #[test]
    fn flat_swath_converges_without_rejection() {
        let nrows = 10;
        let ncols = 40;
        let opts = DecompositionOptions {
            osample: 2,
            lambda_sl: 0.1,
            ..Default::default()
        };
        let ny = opts.osample * (nrows + 1) + 1;
        let value = 1000.0;
        let image = vec![value; nrows * ncols];
        let mask = vec![1u8; nrows * ncols];
        let ycen_rest = vec![0.0; ncols];
        let sl_guess = vec![value; ny];
        let sp_guess = vec![value; ncols];

        let out = decompose_swath(
            &image, &mask, &ycen_rest, nrows, ncols, &sl_guess, &sp_guess, &opts,
        )
        .unwrap();

        assert!(out.mask.iter().all(|&m| m == 1), "no pixel may be rejected");
        assert!(out.iterations <= opts.max_iter);

        // Area normalization: sum(sL)/osample == 1.
        let area: f64 = out.slit_func.iter().sum::<f64>() / opts.osample as f64;
        assert!((area - 1.0).abs() < 1e-9, "slit area = {area}");

        // Flat data: expected spectrum is value * ny / osample.
        let expected = value * ny as f64 / opts.osample as f64;
        for (x, &s) in out.spectrum.iter().enumerate() {
            assert!(
                (s - expected).abs() / expected < 1e-8,
                "column {x}: spectrum {s}, expected {expected}"
            );
        }

        // Model reproduces the data.
        for (m, v) in out.model.iter().zip(image.iter()) {
            assert!((m - v).abs() / value < 1e-8);
        }
    }

    /// Data synthesized through the same geometric projection must be
    /// recovered across varying sub-pixel offsets.
    #[test]
    fn recovers_projected_truth_with_subpixel_shifts() {
        let nrows = 8;
        let ncols = 32;
        let opts = DecompositionOptions {
            osample: 3,
            lambda_sl: 1e-3,
            sp_stop: 1e-8,
            max_iter: 40,
            ..Default::default()
        };
        let ny = opts.osample * (nrows + 1) + 1;

        // A smooth bump as the true slit shape, normalized to unit area.
        let mut sl_true: Vec<f64> = (0..ny)
            .map(|i| {
                let t = (i as f64 - ny as f64 / 2.0) / (ny as f64 / 5.0);
                (-0.5 * t * t).exp()
            })
            .collect();
        let area: f64 = sl_true.iter().sum::<f64>() / opts.osample as f64;
        for v in sl_true.iter_mut() {
            *v /= area;
        }
        let sp_true: Vec<f64> = (0..ncols)
            .map(|x| 800.0 + 150.0 * (x as f64 / 7.0).sin())
            .collect();
        let ycen_rest: Vec<f64> = (0..ncols).map(|x| (x as f64 * 0.061) % 1.0).collect();

        let omega = OmegaTensor::build(&ycen_rest, nrows, opts.osample);
        let mut image = vec![0.0; nrows * ncols];
        for y in 0..nrows {
            for x in 0..ncols {
                image[y * ncols + x] = omega.project(&sl_true, y, x) * sp_true[x];
            }
        }
        let mask = vec![1u8; nrows * ncols];
        let sl_guess = vec![1.0; ny];
        let median = {
            let mut v = sp_true.clone();
            v.sort_by(f64::total_cmp);
            v[ncols / 2]
        };
        let sp_guess = vec![median; ncols];

        let out = decompose_swath(
            &image, &mask, &ycen_rest, nrows, ncols, &sl_guess, &sp_guess, &opts,
        )
        .unwrap();

        // The outer slit bins are constrained by only a few columns, which
        // caps the per-column accuracy near the swath edges: the worst
        // columns sit around 5e-2 on this geometry.
        for x in 0..ncols {
            let rel = (out.spectrum[x] - sp_true[x]).abs() / sp_true[x];
            assert!(
                rel < 6e-2,
                "column {x}: got {}, want {} (rel {rel:.2e})",
                out.spectrum[x],
                sp_true[x]
            );
        }
        let peak_true = sl_true.iter().cloned().fold(f64::MIN, f64::max);
        let peak_got = out.slit_func.iter().cloned().fold(f64::MIN, f64::max);
        assert!(
            (peak_got - peak_true).abs() / peak_true < 0.1,
            "slit peak {peak_got} vs {peak_true}"
        );
    }

    /// Pixels flagged on input carry no data (the tiler zeroes them), so
    /// the rejection pass must never re-admit them, however well the model
    /// happens to match the zeroed value.
    #[test]
    fn input_mask_is_never_readmitted() {
        let nrows = 10;
        let ncols = 40;
        let opts = DecompositionOptions {
            osample: 2,
            lambda_sl: 0.1,
            ..Default::default()
        };
        let ny = opts.osample * (nrows + 1) + 1;
        let value = 1000.0;
        let mut image = vec![value; nrows * ncols];
        let mut mask = vec![1u8; nrows * ncols];
        let gap = 3 * ncols + 7;
        image[gap] = 0.0;
        mask[gap] = 0;

        let out = decompose_swath(
            &image,
            &mask,
            &vec![0.0; ncols],
            nrows,
            ncols,
            &vec![value; ny],
            &vec![value; ncols],
            &opts,
        )
        .unwrap();

        assert_eq!(out.mask[gap], 0, "input-flagged pixel was re-admitted");
        // The gapped column is still constrained by its nine valid pixels.
        let rel = (out.spectrum[7] - out.spectrum[20]).abs() / out.spectrum[20];
        assert!(rel < 1e-8, "gap column deviates by {rel:.2e}");
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let opts = DecompositionOptions::default();
        let err = decompose_swath(&[0.0; 10], &[1; 12], &[0.0; 2], 5, 2, &[], &[], &opts);
        assert!(matches!(err, Err(ExtractError::InconsistentInput(_))));
    }

    #[test]
    fn fully_masked_column_is_degenerate() {
        let nrows = 4;
        let ncols = 6;
        let opts = DecompositionOptions {
            osample: 1,
            lambda_sl: 0.5,
            ..Default::default()
        };
        let ny = opts.osample * (nrows + 1) + 1;
        let image = vec![100.0; nrows * ncols];
        let mut mask = vec![1u8; nrows * ncols];
        for y in 0..nrows {
            mask[y * ncols + 3] = 0;
        }
        let out = decompose_swath(
            &image,
            &mask,
            &vec![0.25; ncols],
            nrows,
            ncols,
            &vec![1.0; ny],
            &vec![100.0; ncols],
            &opts,
        );
        assert!(matches!(out, Err(ExtractError::DegenerateSystem(_))));
    }
}
