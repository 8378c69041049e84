//! Geometry resampling between native detector coordinates and the
//! rectified per-trace frame in which the centerline is a straight
//! horizontal line.
//!
//! `cut_rectify` shifts each column by the integer part of the centerline
//! position; the sub-pixel remainder is handled later by the decomposition
//! solver. `insert_rect` is the structural inverse for all in-bounds pixels.

use nalgebra::DVector;

use crate::error::{ExtractError, Result};
use crate::image::DetectorImage;

/// Integer part of the centerline, one value per column (floor).
pub fn ycen_int(ycen: &DVector<f64>) -> Vec<i64> {
    ycen.iter().map(|&y| y.floor() as i64).collect()
}

/// Non-negative fractional remainder of the centerline, in `[0, 1)`.
/// Satisfies `ycen_int[i] as f64 + ycen_rest[i] == ycen[i]` up to rounding.
pub fn ycen_rest(ycen: &DVector<f64>) -> Vec<f64> {
    ycen.iter().map(|&y| y.rem_euclid(1.0)).collect()
}

/// Vertical pixel span cut out (or written back) for one column: rows
/// `[ycen_int - height/2, ycen_int - height/2 + height)` in detector
/// coordinates, clipped to the frame.
struct ColumnSpan {
    /// First detector row of the clipped span.
    y0: usize,
    /// One past the last detector row of the clipped span.
    y1: usize,
    /// Offset of the clipped span inside the rectified column.
    offset: usize,
}

enum SpanState {
    InBounds(ColumnSpan),
    FullyOutside,
}

fn column_span(yc: i64, height: usize, leny: usize) -> Result<SpanState> {
    let ylow = yc - (height as i64) / 2;
    let yhigh = ylow + height as i64;
    if yhigh <= 0 || ylow >= leny as i64 {
        return Ok(SpanState::FullyOutside);
    }
    let y0 = ylow.max(0) as usize;
    let y1 = (yhigh.min(leny as i64)) as usize;
    if y1 <= y0 {
        // Guards the clipping arithmetic; a non-positive span here means the
        // trace geometry is inconsistent with the frame.
        return Err(ExtractError::InvalidGeometry(format!(
            "clipped span [{}, {}) is empty for center row {}",
            y0, y1, yc
        )));
    }
    Ok(SpanState::InBounds(ColumnSpan {
        y0,
        y1,
        offset: (y0 as i64 - ylow) as usize,
    }))
}

/// Cut a curved trace into a `lenx × height` rectangle, shifting each column
/// by the integer centerline position.
///
/// Columns whose span lies completely outside the frame come back as NaN and
/// rejected; partially covered columns are clipped, the uncovered rows NaN
/// and rejected. Never wraps or extrapolates.
pub fn cut_rectify(
    image: &DetectorImage,
    ycen: &DVector<f64>,
    height: usize,
) -> Result<DetectorImage> {
    if image.is_empty() || height < 1 {
        return Err(ExtractError::InconsistentInput(
            "cut_rectify needs a non-empty image and a positive height".into(),
        ));
    }
    if ycen.len() != image.width() {
        return Err(ExtractError::InconsistentInput(format!(
            "ycen has {} entries for an image of width {}",
            ycen.len(),
            image.width()
        )));
    }

    let lenx = image.width();
    let leny = image.height();
    let yc_int = ycen_int(ycen);
    let mut rect = DetectorImage::new(lenx, height);

    for x in 0..lenx {
        match column_span(yc_int[x], height, leny)? {
            SpanState::FullyOutside => {
                for j in 0..height {
                    rect.set(x, j, f64::NAN);
                    rect.reject(x, j);
                }
            }
            SpanState::InBounds(span) => {
                for j in 0..height {
                    let y = span.y0 as i64 + j as i64 - span.offset as i64;
                    if y < span.y0 as i64 || y >= span.y1 as i64 {
                        rect.set(x, j, f64::NAN);
                        rect.reject(x, j);
                        continue;
                    }
                    let y = y as usize;
                    rect.set(x, j, image.get(x, y));
                    if image.is_rejected(x, y) {
                        rect.reject(x, j);
                    }
                }
            }
        }
    }
    Ok(rect)
}

/// Write a rectified `lenx × height` rectangle back into `target` at the
/// spans it was cut from, with the same clipping policy as [`cut_rectify`].
/// Rejected rectangle pixels propagate their flag; fully out-of-bounds
/// columns are skipped.
pub fn insert_rect(
    rect: &DetectorImage,
    ycen: &DVector<f64>,
    target: &mut DetectorImage,
) -> Result<()> {
    if rect.width() != target.width() {
        return Err(ExtractError::InconsistentInput(format!(
            "rectangle width {} does not match target width {}",
            rect.width(),
            target.width()
        )));
    }
    if ycen.len() != target.width() {
        return Err(ExtractError::InconsistentInput(format!(
            "ycen has {} entries for an image of width {}",
            ycen.len(),
            target.width()
        )));
    }

    let lenx = target.width();
    let leny = target.height();
    let height = rect.height();
    let yc_int = ycen_int(ycen);

    for x in 0..lenx {
        match column_span(yc_int[x], height, leny)? {
            SpanState::FullyOutside => continue,
            SpanState::InBounds(span) => {
                for y in span.y0..span.y1 {
                    let j = y - span.y0 + span.offset;
                    target.set(x, y, rect.get(x, j));
                    if rect.is_rejected(x, j) {
                        target.reject(x, y);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wavy_image(lenx: usize, leny: usize) -> DetectorImage {
        let mut img = DetectorImage::new(lenx, leny);
        for y in 0..leny {
            for x in 0..lenx {
                img.set(x, y, (x * leny + y) as f64 + 0.25);
            }
        }
        img
    }

    #[test]
    fn ycen_split_reassembles() {
        let ycen = DVector::from_vec(vec![12.75, 3.0, -0.4, 100.999]);
        let ints = ycen_int(&ycen);
        let rests = ycen_rest(&ycen);
        for i in 0..ycen.len() {
            assert!(
                (ints[i] as f64 + rests[i] - ycen[i]).abs() < 1e-12,
                "column {i}: {} + {} != {}",
                ints[i],
                rests[i],
                ycen[i]
            );
            assert!((0.0..1.0).contains(&rests[i]));
        }
        assert_eq!(ints[2], -1);
    }

    #[test]
    fn round_trip_restores_in_bounds_pixels() {
        let lenx = 32;
        let leny = 20;
        let img = wavy_image(lenx, leny);
        // Centerline drifting off the bottom edge: some columns clip.
        let ycen = DVector::from_fn(lenx, |i, _| 2.0 + 0.5 * i as f64);
        let height = 6;

        let rect = cut_rectify(&img, &ycen, height).unwrap();
        let mut restored = img.clone();
        insert_rect(&rect, &ycen, &mut restored).unwrap();

        for x in 0..lenx {
            for y in 0..leny {
                assert_eq!(
                    restored.get(x, y).to_bits(),
                    img.get(x, y).to_bits(),
                    "pixel ({x},{y}) changed in round trip"
                );
            }
        }
    }

    #[test]
    fn out_of_bounds_columns_are_rejected() {
        let img = wavy_image(8, 16);
        // Last columns fall entirely below the frame.
        let ycen = DVector::from_fn(8, |i, _| 8.0 - 3.0 * i as f64);
        let rect = cut_rectify(&img, &ycen, 4).unwrap();
        for j in 0..4 {
            assert!(rect.is_rejected(7, j));
            assert!(rect.get(7, j).is_nan());
        }
        // First column is fully inside.
        for j in 0..4 {
            assert!(!rect.is_rejected(0, j));
        }
    }

    #[test]
    fn partially_clipped_column_keeps_covered_rows() {
        let img = wavy_image(4, 10);
        let ycen = DVector::from_vec(vec![1.0, 5.0, 5.0, 5.0]);
        let rect = cut_rectify(&img, &ycen, 6).unwrap();
        // Column 0 span is [-2, 4): bottom two rectified rows uncovered.
        assert!(rect.is_rejected(0, 0));
        assert!(rect.is_rejected(0, 1));
        for j in 2..6 {
            assert!(!rect.is_rejected(0, j));
            assert_eq!(rect.get(0, j), img.get(0, j - 2));
        }
    }

    #[test]
    fn insert_rect_checks_width() {
        let rect = DetectorImage::new(4, 2);
        let mut target = DetectorImage::new(5, 8);
        let ycen = DVector::from_element(5, 4.0);
        assert!(insert_rect(&rect, &ycen, &mut target).is_err());
    }
}
