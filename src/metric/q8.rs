//! Squared L2 distance over signed 8-bit codes.

/// Computes the squared distance between two Q8 vectors.
///
/// The accumulation is pure integer arithmetic, one widening subtract and
/// multiply per component; the per-vector ranges are applied once at the
/// end: `acc * (range_a * range_b) / 127^2`. When both ranges agree this
/// is the exact squared distance of the decoded vectors; when they differ
/// the shared scale is their geometric mean.
#[inline]
#[must_use]
pub fn l2_squared_q8(a: &[i8], range_a: f32, b: &[i8], range_b: f32) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dimension mismatch");

    let mut acc: i64 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let diff = i32::from(x) - i32::from(y);
        acc += i64::from(diff * diff);
    }
    acc as f32 * (range_a * range_b) / (127.0 * 127.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::scalar;

    #[test]
    fn zero_for_identical_codes() {
        let codes = [12i8, -37, 127, 0];
        assert_eq!(l2_squared_q8(&codes, 0.5, &codes, 0.5), 0.0);
    }

    #[test]
    fn agrees_with_decoded_f32_distance() {
        let u = [0.6f32, -0.64, 0.48];
        let w = [0.1f32, 0.7, -0.7];
        let (cu, ru) = scalar::encode(&u);
        let (cw, rw) = scalar::encode(&w);

        let mut du = Vec::new();
        let mut dw = Vec::new();
        scalar::decode_into(&cu, ru, &mut du);
        scalar::decode_into(&cw, rw, &mut dw);

        let integer = l2_squared_q8(&cu, ru, &cw, rw);
        let float = super::super::l2::l2_squared(&du, &dw);
        // Same codes, two evaluation orders; only cross-range bias differs.
        assert!((integer - float).abs() < 0.05, "{integer} vs {float}");
    }

    #[test]
    fn symmetric_across_ranges() {
        let a = [100i8, -50, 25];
        let b = [-100i8, 50, -25];
        let d1 = l2_squared_q8(&a, 0.9, &b, 0.3);
        let d2 = l2_squared_q8(&b, 0.3, &a, 0.9);
        assert_eq!(d1, d2);
    }
}
