//! Geometric projection weights between the oversampled slit grid and the
//! detector pixel grid.

/// Purely geometric weighting tensor of shape `ny × nrows × ncols`.
///
/// `get(iy, y, x)` is the fraction of oversampled slit bin `iy` that falls
/// into detector row `y` of column `x`, given the column's sub-pixel
/// centerline remainder. Each `(y, x)` weight vector is zero outside a
/// window of `osample + 1` bins, carries two fractional edge weights and is
/// flat at `1/osample` in between; it sums to exactly one pixel. The tensor
/// depends only on the geometry, never on the flux, so it is built once per
/// swath and read throughout the solve.
pub(crate) struct OmegaTensor {
    ny: usize,
    nrows: usize,
    data: Vec<f64>,
}

impl OmegaTensor {
    /// Build the tensor for one swath from the per-column sub-pixel
    /// remainders (each in `[0, 1)`) and the oversampling factor.
    pub(crate) fn build(ycen_rest: &[f64], nrows: usize, osample: usize) -> Self {
        let ncols = ycen_rest.len();
        let ny = osample * (nrows + 1) + 1;
        let os = osample as i64;
        let step = 1.0 / osample as f64;
        let mut data = vec![0.0; ny * nrows * ncols];

        for (x, &rest) in ycen_rest.iter().enumerate() {
            // Alignment of the oversampled grid against this column's
            // pixel boundaries.
            let mut iy2 = ((1.0 - rest) * osample as f64) as i64;
            let mut iy1 = iy2 - os;
            let d1 = if iy2 == 0 {
                step
            } else if iy1 == 0 {
                0.0
            } else {
                rest % step
            };
            let d2 = step - d1;
            for y in 0..nrows {
                iy1 += os;
                iy2 += os;
                let base = y * ny + x * ny * nrows;
                for iy in 0..ny {
                    let i = iy as i64;
                    data[base + iy] = if i < iy1 {
                        0.0
                    } else if i == iy1 {
                        d1
                    } else if i < iy2 {
                        step
                    } else if i == iy2 {
                        d2
                    } else {
                        0.0
                    };
                }
            }
        }
        Self { ny, nrows, data }
    }

    #[inline]
    fn idx(&self, iy: usize, y: usize, x: usize) -> usize {
        debug_assert!(iy < self.ny && y < self.nrows);
        iy + y * self.ny + x * self.ny * self.nrows
    }

    #[inline]
    pub(crate) fn get(&self, iy: usize, y: usize, x: usize) -> f64 {
        self.data[self.idx(iy, y, x)]
    }

    /// `Σ_iy omega[iy, y, x] · sl[iy]` — the slit function projected onto
    /// one detector pixel.
    #[inline]
    pub(crate) fn project(&self, sl: &[f64], y: usize, x: usize) -> f64 {
        let base = y * self.ny + x * self.ny * self.nrows;
        let w = &self.data[base..base + self.ny];
        w.iter().zip(sl.iter()).map(|(a, b)| a * b).sum()
    }
}
