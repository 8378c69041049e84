//! Banded Gaussian elimination without pivoting.
//!
//! The band storage follows the classic convention used by the slit
//! decomposition systems: a flat `n × nd` buffer (nd odd) where column `k`
//! holds the `k - nd/2`-th diagonal, so entry `(row, diag)` lives at
//! `a[row + (diag + nd/2) * n]`. A zero or numerically vanishing pivot is a
//! hard [`ExtractError::DegenerateSystem`]; the solver never substitutes a
//! value for a singular system.

use crate::error::{ExtractError, Result};

/// Pivot threshold relative to the largest initial main-diagonal magnitude.
const PIVOT_REL_TOL: f64 = 1e-14;

/// Symmetric-band matrix in flat column-per-diagonal storage.
#[derive(Clone, Debug)]
pub struct BandMatrix {
    n: usize,
    nd: usize,
    a: Vec<f64>,
}

impl BandMatrix {
    /// Zeroed band matrix of `n` rows with `nd` diagonals (nd odd).
    pub fn zeros(n: usize, nd: usize) -> Result<Self> {
        if n == 0 || nd % 2 == 0 || nd > 2 * n - 1 {
            return Err(ExtractError::InconsistentInput(format!(
                "band matrix of {} rows cannot hold {} diagonals",
                n, nd
            )));
        }
        Ok(Self {
            n,
            nd,
            a: vec![0.0; n * nd],
        })
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    fn half(&self) -> usize {
        self.nd / 2
    }

    #[inline]
    fn slot(&self, row: usize, diag: isize) -> usize {
        let col = (diag + self.half() as isize) as usize;
        debug_assert!(row < self.n && col < self.nd);
        row + col * self.n
    }

    /// Entry at `(row, row + diag)` of the dense equivalent.
    #[inline]
    pub fn get(&self, row: usize, diag: isize) -> f64 {
        self.a[self.slot(row, diag)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, diag: isize, v: f64) {
        let i = self.slot(row, diag);
        self.a[i] = v;
    }

    #[inline]
    pub fn add(&mut self, row: usize, diag: isize, v: f64) {
        let i = self.slot(row, diag);
        self.a[i] += v;
    }

    /// Solve `A·r = b` in place: forward sweep normalizing each row by its
    /// pivot and eliminating below, then backward substitution. Destroys the
    /// band content.
    pub fn solve_in_place(&mut self, r: &mut [f64]) -> Result<()> {
        if r.len() != self.n {
            return Err(ExtractError::InconsistentInput(format!(
                "rhs of {} entries for a system of {} equations",
                r.len(),
                self.n
            )));
        }
        let n = self.n;
        let nd = self.nd;
        let half = nd / 2;
        let a = &mut self.a;

        let scale = (0..n)
            .map(|i| a[i + half * n].abs())
            .fold(0.0_f64, f64::max);
        if scale == 0.0 || !scale.is_finite() {
            return Err(ExtractError::DegenerateSystem(
                "band matrix has an empty or non-finite main diagonal".into(),
            ));
        }
        let tol = PIVOT_REL_TOL * scale;
        let check = |pivot: f64, row: usize| -> Result<f64> {
            if !pivot.is_finite() || pivot.abs() <= tol {
                return Err(ExtractError::DegenerateSystem(format!(
                    "vanishing pivot {:e} at row {}",
                    pivot, row
                )));
            }
            Ok(pivot)
        };

        /* Forward sweep */
        for i in 0..n - 1 {
            let aa = check(a[i + n * half], i)?;
            r[i] /= aa;
            for j in 0..nd {
                a[i + j * n] /= aa;
            }
            for j in 1..(half + 1).min(n - i) {
                let aa = a[i + j + n * (half - j)];
                r[i + j] -= r[i] * aa;
                let mut k = 0;
                while k < n * (nd - j) {
                    a[i + j + k] -= a[i + k + n * j] * aa;
                    k += n;
                }
            }
        }

        /* Backward sweep */
        let last = check(a[n - 1 + n * half], n - 1)?;
        r[n - 1] /= last;
        for i in (1..n).rev() {
            for j in 1..=half.min(i) {
                r[i - j] -= r[i] * a[i - j + n * (half + j)];
            }
            let aa = check(a[i - 1 + n * half], i - 1)?;
            r[i - 1] /= aa;
        }
        Ok(())
    }
}
