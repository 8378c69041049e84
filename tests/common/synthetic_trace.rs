use echelle_extract::image::DetectorImage;
use echelle_extract::trace::{TracePolynomial, TraceRecord};

/// Frame with a pixel-integrated Gaussian cross-dispersion profile along
/// the linear centerline `c0 + c1 * x` (1-based column positions, matching
/// the trace polynomials). Every column carries `flux` total counts.
pub fn gaussian_trace_frame(
    width: usize,
    height: usize,
    c0: f64,
    c1: f64,
    sigma: f64,
    flux: f64,
) -> DetectorImage {
    assert!(width > 0 && height > 0, "frame dimensions must be positive");
    assert!(sigma > 0.0, "profile width must be positive");

    let mut image = DetectorImage::new(width, height);
    for x in 0..width {
        let center = c0 + c1 * (x + 1) as f64;
        for y in 0..height {
            image.set(x, y, flux * pixel_integral(y as f64 - center, sigma));
        }
    }
    image
}

/// Midpoint-rule integral of the unit-area Gaussian over one pixel whose
/// center sits `d` away from the profile center.
fn pixel_integral(d: f64, sigma: f64) -> f64 {
    const SUB: usize = 32;
    let norm = 1.0 / (sigma * std::f64::consts::TAU.sqrt());
    let mut acc = 0.0;
    for k in 0..SUB {
        let t = d - 0.5 + (k as f64 + 0.5) / SUB as f64;
        acc += (-0.5 * (t / sigma) * (t / sigma)).exp();
    }
    acc * norm / SUB as f64
}

/// Trace record with a linear centerline and edges `half_height` above and
/// below it.
pub fn linear_trace(order: i32, trace_nb: i32, c0: f64, c1: f64, half_height: f64) -> TraceRecord {
    TraceRecord {
        order,
        trace_nb,
        lower: TracePolynomial::new(vec![c0 - half_height, c1]),
        upper: TracePolynomial::new(vec![c0 + half_height, c1]),
        center: TracePolynomial::new(vec![c0, c1]),
        slit_curvature: [0.0; 3],
    }
}
