//! Vector quantization.
//!
//! Every vector in an index is L2-normalized on insertion and then
//! materialized in exactly one of three storage formats, fixed at index
//! creation:
//!
//! - [`Quantization::F32`]: 4 bytes per component, exact.
//! - [`Quantization::Q8`]: one signed byte per component plus a single
//!   per-vector `range` (the largest absolute component). Component `c`
//!   represents `c * range / 127`.
//! - [`Quantization::Binary`]: one sign bit per component, packed LSB-first
//!   into `u64` words. Decoding recovers only `±1/sqrt(D)`.
//!
//! Mixing formats within one index is forbidden; the distance kernels in
//! [`crate::metric`] assume both operands share a variant.

use serde::{Deserialize, Serialize};

pub mod binary;
pub mod scalar;

/// Storage format for vectors in an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantization {
    /// Full-precision 32-bit floats.
    F32,
    /// Signed 8-bit components with a per-vector range.
    Q8,
    /// One sign bit per component.
    Binary,
}

impl Quantization {
    /// Short human-readable name, used by stats and the demo harness.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Quantization::F32 => "f32",
            Quantization::Q8 => "q8",
            Quantization::Binary => "binary",
        }
    }
}

/// A vector materialized in one of the three storage formats.
///
/// Encoded from an already-normalized `f32` slice; the pre-normalization
/// magnitude is kept separately by the owning node.
#[derive(Clone, Debug, PartialEq)]
pub enum QuantizedVector {
    /// Exact storage.
    F32(Box<[f32]>),
    /// 8-bit codes plus the per-vector quantization range.
    Q8 {
        /// One signed code per component, in `[-127, 127]`.
        codes: Box<[i8]>,
        /// Largest absolute component of the source vector.
        range: f32,
    },
    /// Sign bitmap, bit `i` set iff component `i > 0`, packed LSB-first.
    Binary(Box<[u64]>),
}

impl QuantizedVector {
    /// Encodes a normalized vector into the requested format.
    #[must_use]
    pub fn encode(kind: Quantization, normalized: &[f32]) -> Self {
        match kind {
            Quantization::F32 => QuantizedVector::F32(normalized.into()),
            Quantization::Q8 => {
                let (codes, range) = scalar::encode(normalized);
                QuantizedVector::Q8 { codes, range }
            }
            Quantization::Binary => QuantizedVector::Binary(binary::pack(normalized)),
        }
    }

    /// Returns the storage format of this vector.
    #[must_use]
    pub fn kind(&self) -> Quantization {
        match self {
            QuantizedVector::F32(_) => Quantization::F32,
            QuantizedVector::Q8 { .. } => Quantization::Q8,
            QuantizedVector::Binary(_) => Quantization::Binary,
        }
    }

    /// Decodes the approximate normalized vector into `out`.
    ///
    /// `out` is cleared first. For `F32` the decode is exact; for `Q8` each
    /// component is within `range / 127` of the original; for `Binary` only
    /// the signs survive, scaled to `±1/sqrt(dim)`.
    pub fn decode_into(&self, dim: usize, out: &mut Vec<f32>) {
        out.clear();
        match self {
            QuantizedVector::F32(values) => out.extend_from_slice(values),
            QuantizedVector::Q8 { codes, range } => scalar::decode_into(codes, *range, out),
            QuantizedVector::Binary(words) => binary::unpack_into(words, dim, out),
        }
    }

    /// Approximate heap footprint in bytes, for stats reporting.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        match self {
            QuantizedVector::F32(values) => values.len() * std::mem::size_of::<f32>(),
            QuantizedVector::Q8 { codes, .. } => codes.len() + std::mem::size_of::<f32>(),
            QuantizedVector::Binary(words) => words.len() * std::mem::size_of::<u64>(),
        }
    }
}
