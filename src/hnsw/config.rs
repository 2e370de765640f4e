//! HNSW algorithm parameters.

use serde::{Deserialize, Serialize};

use super::graph::GraphError;
use crate::quant::Quantization;

/// HNSW configuration, fixed at index creation.
///
/// # Parameter guidelines (from the paper)
/// - `m`: 12–48 for high recall, 4–8 for speed.
/// - `ef_construction`: higher = better graph quality, slower build.
/// - `ef_search`: higher = better recall, slower search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Vector dimensionality; every vector in the index has exactly this
    /// many components.
    pub dimensions: u32,

    /// Storage format for every vector in the index.
    pub quantization: Quantization,

    /// Max connections per node in layers above 0.
    pub m: u32,

    /// Max connections per node in layer 0 (typically `2 * m`).
    pub m0: u32,

    /// Construction-time candidate list size.
    pub ef_construction: u32,

    /// Default search-time candidate list size.
    pub ef_search: u32,
}

impl HnswConfig {
    /// Hard cap on node levels, bounding adjacency memory per node.
    pub const MAX_LEVEL: u8 = 16;

    /// Creates a configuration with the conventional defaults
    /// (`m = 16`, `m0 = 32`, `ef_construction = 200`, `ef_search = 50`).
    #[must_use]
    pub fn new(dimensions: u32, quantization: Quantization) -> Self {
        Self {
            dimensions,
            quantization,
            m: 16,
            m0: 32,
            ef_construction: 200,
            ef_search: 50,
        }
    }

    /// Neighbor cap for a layer.
    pub(crate) fn cap(&self, level: u8) -> usize {
        if level == 0 {
            self.m0 as usize
        } else {
            self.m as usize
        }
    }

    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if self.dimensions == 0 {
            return Err(GraphError::InvalidConfig(
                "dimensions must be non-zero".to_string(),
            ));
        }
        if self.m <= 1 {
            return Err(GraphError::InvalidConfig(format!(
                "m must be > 1, got {}",
                self.m
            )));
        }
        if self.m0 < self.m {
            return Err(GraphError::InvalidConfig(format!(
                "m0 must be >= m, got {} < {}",
                self.m0, self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(GraphError::InvalidConfig(
                "ef_construction must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
