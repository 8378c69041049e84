//! Owned single-channel f64 detector image in row-major layout.
//!
//! Carries a co-indexed reject mask: a flagged pixel takes no part in any
//! fit or collapse. Rectified trace sub-images reuse the same type.

mod stats;

pub(crate) use stats::median_in_place;

use crate::error::{ExtractError, Result};

/// Detector frame (or rectified trace rectangle) with a bad-pixel mask.
#[derive(Clone, Debug)]
pub struct DetectorImage {
    w: usize,
    h: usize,
    data: Vec<f64>,
    rejected: Vec<bool>,
}

impl DetectorImage {
    /// Construct a zero-initialized frame of size `w × h` with no rejected
    /// pixels.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
            rejected: vec![false; w * h],
        }
    }

    /// Wrap an existing row-major buffer. The length must equal `w * h`.
    pub fn from_vec(w: usize, h: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != w * h {
            return Err(ExtractError::InconsistentInput(format!(
                "image buffer of {} values does not match {}x{}",
                data.len(),
                w,
                h
            )));
        }
        let rejected = vec![false; w * h];
        Ok(Self {
            w,
            h,
            data,
            rejected,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.w
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.h
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    #[inline]
    /// Convert (x, y) to a linear index into the backing storage.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f64) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    #[inline]
    pub fn is_rejected(&self, x: usize, y: usize) -> bool {
        self.rejected[self.idx(x, y)]
    }

    /// Flag a pixel as bad; it is excluded from all fits and collapses.
    #[inline]
    pub fn reject(&mut self, x: usize, y: usize) {
        let i = self.idx(x, y);
        self.rejected[i] = true;
    }

    #[inline]
    pub fn accept(&mut self, x: usize, y: usize) {
        let i = self.idx(x, y);
        self.rejected[i] = false;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f64] {
        let start = y * self.w;
        &self.data[start..start + self.w]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Number of rejected pixels in the frame.
    pub fn rejected_count(&self) -> usize {
        self.rejected.iter().filter(|&&r| r).count()
    }

    /// Add `other` into this frame pixel by pixel. Rejected pixels of
    /// `other` contribute nothing; the accumulator keeps its own flags.
    pub fn accumulate(&mut self, other: &DetectorImage) -> Result<()> {
        if other.w != self.w || other.h != self.h {
            return Err(ExtractError::InconsistentInput(format!(
                "cannot accumulate {}x{} frame into {}x{}",
                other.w, other.h, self.w, self.h
            )));
        }
        for i in 0..self.data.len() {
            if other.rejected[i] {
                continue;
            }
            self.data[i] += other.data[i];
        }
        Ok(())
    }

    /// Median of all non-rejected, finite pixels. `None` when every pixel is
    /// rejected.
    pub fn median(&self) -> Option<f64> {
        let mut vals: Vec<f64> = self
            .data
            .iter()
            .zip(self.rejected.iter())
            .filter(|(v, r)| !**r && v.is_finite())
            .map(|(v, _)| *v)
            .collect();
        median_in_place(&mut vals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_bad_shape() {
        assert!(DetectorImage::from_vec(4, 4, vec![0.0; 15]).is_err());
        assert!(DetectorImage::from_vec(4, 4, vec![0.0; 16]).is_ok());
    }

    #[test]
    fn median_skips_rejected_pixels() {
        let mut img = DetectorImage::from_vec(3, 1, vec![1.0, 2.0, 1000.0]).unwrap();
        img.reject(2, 0);
        assert_eq!(img.median(), Some(1.5));
    }

    #[test]
    fn accept_reverses_reject() {
        let mut img = DetectorImage::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        img.reject(0, 1);
        assert!(img.is_rejected(0, 1));
        assert_eq!(img.rejected_count(), 1);
        img.accept(0, 1);
        assert!(!img.is_rejected(0, 1));
        assert_eq!(img.rejected_count(), 0);
        assert_eq!(img.median(), Some(2.5));
        assert_eq!(img.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn accumulate_skips_rejected_source_pixels() {
        let mut a = DetectorImage::new(2, 1);
        let mut b = DetectorImage::from_vec(2, 1, vec![3.0, 7.0]).unwrap();
        b.reject(1, 0);
        a.accumulate(&b).unwrap();
        assert_eq!(a.get(0, 0), 3.0);
        assert_eq!(a.get(1, 0), 0.0);
    }
}
