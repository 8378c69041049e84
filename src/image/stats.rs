//! Small order-statistics helpers shared by the extraction stages.

/// Median of the supplied values; reorders the buffer. `None` for an empty
/// slice. Even-length inputs return the mean of the two middle values.
pub(crate) fn median_in_place(vals: &mut [f64]) -> Option<f64> {
    if vals.is_empty() {
        return None;
    }
    let n = vals.len();
    let mid = n / 2;
    let (_, m, _) = vals.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let hi = *m;
    if n % 2 == 1 {
        Some(hi)
    } else {
        let (_, m2, _) = vals[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        Some(0.5 * (*m2 + hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        let mut a = [3.0, 1.0, 2.0];
        assert_eq!(median_in_place(&mut a), Some(2.0));
        let mut b = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median_in_place(&mut b), Some(2.5));
        let mut c: [f64; 0] = [];
        assert_eq!(median_in_place(&mut c), None);
    }
}
