//! Distance kernels.
//!
//! Every kernel takes two vectors in the same storage format and returns a
//! squared-L2-style distance on the unit sphere: identical vectors score 0,
//! orthogonal vectors score 2, and cosine similarity is recovered as
//! `1 - d / 2`. Kernels are pure (no allocation), operate on finite inputs
//! only, and are deterministic, so recall self-tests are reproducible.

use crate::quant::QuantizedVector;

pub mod hamming;
pub mod l2;
pub mod q8;

/// Distance between two vectors of the same quantization.
///
/// `dim` is the index dimensionality; it scales the Hamming kernel (the
/// bitmap words cannot recover the exact bit count on their own).
///
/// Mixing storage formats is a programming error: the engine encodes every
/// query with the index's own quantization. Debug builds assert; release
/// builds return `f32::MAX` so a mixed pair can never rank as a neighbor.
#[must_use]
pub fn distance(a: &QuantizedVector, b: &QuantizedVector, dim: usize) -> f32 {
    match (a, b) {
        (QuantizedVector::F32(x), QuantizedVector::F32(y)) => l2::l2_squared(x, y),
        (
            QuantizedVector::Q8 {
                codes: x, range: rx, ..
            },
            QuantizedVector::Q8 {
                codes: y, range: ry, ..
            },
        ) => q8::l2_squared_q8(x, *rx, y, *ry),
        (QuantizedVector::Binary(x), QuantizedVector::Binary(y)) => {
            2.0 * hamming::hamming(x, y) as f32 / dim as f32
        }
        _ => {
            debug_assert!(false, "mixed quantization variants");
            f32::MAX
        }
    }
}
