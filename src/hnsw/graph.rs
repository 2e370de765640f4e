//! The index handle and its shared graph state.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use super::config::HnswConfig;
use super::epoch::{ReadSlot, SlotRegistry};
use super::node::{NodeId, NodeStore};
use crate::metric;
use crate::quant::Quantization;

/// Errors from index operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Configuration rejected at index creation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A vector's length does not match the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the index was created with.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// A vector contains NaN/infinite components or has zero magnitude.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// The graph changed between `prepare_insert` and `try_commit_insert`
    /// in a way that invalidates the prepared neighborhood; retry under
    /// the locked `insert` path.
    #[error("optimistic insert conflict")]
    Conflict,
}

/// One search result: the caller id and its distance to the query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    /// Caller-assigned id of the matching node.
    pub id: u64,
    /// Distance to the (normalized) query; `1 - d/2` recovers the cosine
    /// similarity.
    pub distance: f32,
}

/// Outcome of an insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The vector was added as a new node.
    Inserted,
    /// A node with this id already exists; the index is unchanged.
    AlreadyExists,
}

/// Point-in-time counters, for logging and tests.
#[derive(Clone, Debug)]
pub struct IndexStats {
    /// Live node count.
    pub nodes: usize,
    /// Index dimensionality.
    pub dimensions: usize,
    /// Storage format of the index.
    pub quantization: Quantization,
    /// Highest layer currently populated.
    pub max_level: u8,
    /// Total directed links across all layers.
    pub links: usize,
    /// Arena slots ever allocated (live + dead + free).
    pub slots: usize,
    /// Dead slots awaiting epoch reclamation.
    pub graveyard: usize,
    /// Approximate heap usage of vectors and adjacency, in bytes.
    pub memory_bytes: usize,
}

/// Shared graph state, guarded by the index's `RwLock`.
pub(crate) struct Graph<V> {
    pub(crate) config: HnswConfig,
    pub(crate) store: NodeStore<V>,
    pub(crate) by_id: HashMap<u64, NodeId>,
    pub(crate) entry: Option<NodeId>,
    pub(crate) max_level: u8,
    rng: ChaCha8Rng,
    level_mult: f64,
}

impl<V> Graph<V> {
    fn new(config: HnswConfig) -> Self {
        // m_L = 1 / ln(M), the level multiplier from the paper.
        let level_mult = 1.0 / f64::from(config.m).ln();
        Self {
            config,
            store: NodeStore::new(),
            by_id: HashMap::new(),
            entry: None,
            max_level: 0,
            rng: ChaCha8Rng::seed_from_u64(42),
            level_mult,
        }
    }

    /// Draws a level from the geometric distribution
    /// `floor(-ln(U) * m_L)`, capped at [`HnswConfig::MAX_LEVEL`].
    pub(crate) fn random_level(&mut self) -> u8 {
        let u: f64 = self.rng.gen_range(f64::EPSILON..=1.0);
        level_from_uniform(u, self.level_mult)
    }

    /// Distance between two stored nodes; `f32::MAX` if either is gone.
    pub(crate) fn dist_nodes(&self, a: NodeId, b: NodeId) -> f32 {
        match (self.store.get(a), self.store.get(b)) {
            (Some(x), Some(y)) => {
                metric::distance(&x.vector, &y.vector, self.config.dimensions as usize)
            }
            _ => f32::MAX,
        }
    }

    /// Removes the directed link `from -> to` at a layer, if present.
    pub(crate) fn remove_link(&mut self, from: NodeId, to: NodeId, level: u8) {
        if let Some(node) = self.store.get_mut(from) {
            if let Some(list) = node.links.get_mut(level as usize) {
                list.retain(|&n| n != to);
            }
        }
    }
}

/// Maps a uniform draw to a node level.
pub(crate) fn level_from_uniform(u: f64, level_mult: f64) -> u8 {
    let level = (-u.ln() * level_mult).floor();
    if level >= f64::from(HnswConfig::MAX_LEVEL) {
        HnswConfig::MAX_LEVEL
    } else {
        level as u8
    }
}

/// Normalizes a vector, returning the unit vector and its magnitude.
pub(crate) fn normalize(vector: &[f32]) -> Result<(Vec<f32>, f32), GraphError> {
    let mut sum = 0.0f64;
    for &v in vector {
        if !v.is_finite() {
            return Err(GraphError::InvalidVector(
                "non-finite component".to_string(),
            ));
        }
        sum += f64::from(v) * f64::from(v);
    }
    let norm = sum.sqrt() as f32;
    if norm <= 0.0 {
        return Err(GraphError::InvalidVector("zero magnitude".to_string()));
    }
    Ok((vector.iter().map(|&v| v / norm).collect(), norm))
}

/// A thread-safe HNSW index over vectors of a fixed dimensionality.
///
/// `V` is an opaque per-node payload (a word, a document key, `()`),
/// returned by [`HnswIndex::remove`] and readable via
/// [`HnswIndex::get_value`].
///
/// One writer at a time mutates the graph under an internal write lock;
/// readers run concurrently and additionally register in the epoch
/// registry (see [`HnswIndex::read_slot`]) so that deletion can defer the
/// physical free of any node a reader might still resolve. Dropping the
/// index tears everything down; payloads drop with their nodes.
pub struct HnswIndex<V = ()> {
    pub(crate) graph: RwLock<Graph<V>>,
    pub(crate) registry: SlotRegistry,
}

impl<V> HnswIndex<V> {
    /// Creates an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidConfig`] for zero dimensions, `m <= 1`,
    /// `m0 < m`, or a zero `ef_construction`.
    pub fn new(config: HnswConfig) -> Result<Self, GraphError> {
        config.validate()?;
        Ok(Self {
            graph: RwLock::new(Graph::new(config)),
            registry: SlotRegistry::new(),
        })
    }

    /// Registers a read slot. Search requires one; node ids observed while
    /// the slot is held stay resolvable until it is dropped.
    #[must_use]
    pub fn read_slot(&self) -> ReadSlot<'_> {
        ReadSlot::new(&self.registry)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.read().store.len()
    }

    /// True if the index holds no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index dimensionality.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.graph.read().config.dimensions as usize
    }

    /// Storage format of the index.
    #[must_use]
    pub fn quantization(&self) -> Quantization {
        self.graph.read().config.quantization
    }

    /// True if a node with this id is live.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.graph.read().by_id.contains_key(&id)
    }

    /// Reconstructs a node's vector: dequantized and scaled back by the
    /// magnitude recorded at insertion. Exact for `F32` input that was
    /// already unit-norm; approximate under `Q8`/`Binary`.
    #[must_use]
    pub fn get_vector(&self, id: u64) -> Option<Vec<f32>> {
        let g = self.graph.read();
        let node = g.store.get(*g.by_id.get(&id)?)?;
        let mut out = Vec::with_capacity(g.config.dimensions as usize);
        node.vector
            .decode_into(g.config.dimensions as usize, &mut out);
        for v in &mut out {
            *v *= node.norm;
        }
        Some(out)
    }

    /// Returns a node's JSON attribute string, if the node exists and has
    /// one.
    #[must_use]
    pub fn get_attributes(&self, id: u64) -> Option<String> {
        let g = self.graph.read();
        let node = g.store.get(*g.by_id.get(&id)?)?;
        node.attributes.as_ref().map(ToString::to_string)
    }

    /// Replaces (or clears) a node's attribute string. Returns false when
    /// no live node has this id.
    pub fn set_attributes(&self, id: u64, attributes: Option<&str>) -> bool {
        let mut g = self.graph.write();
        let Some(&nid) = g.by_id.get(&id) else {
            return false;
        };
        let Some(node) = g.store.get_mut(nid) else {
            return false;
        };
        node.attributes = attributes.map(Box::from);
        self.registry.bump();
        true
    }

    /// Clones out a node's payload.
    #[must_use]
    pub fn get_value(&self, id: u64) -> Option<V>
    where
        V: Clone,
    {
        let g = self.graph.read();
        g.store.get(*g.by_id.get(&id)?).map(|n| n.value.clone())
    }

    /// Per-layer adjacency of a node, as caller ids. Introspection for
    /// debugging and the validator tests.
    #[must_use]
    pub fn neighbors(&self, id: u64) -> Option<Vec<Vec<u64>>> {
        let g = self.graph.read();
        let node = g.store.get(*g.by_id.get(&id)?)?;
        Some(
            node.links
                .iter()
                .map(|level| {
                    level
                        .iter()
                        .filter_map(|&nb| g.store.get(nb).map(|n| n.id))
                        .collect()
                })
                .collect(),
        )
    }

    /// Samples up to `n` live node ids, without replacement.
    #[must_use]
    pub fn random_ids(&self, n: usize) -> Vec<u64> {
        use rand::seq::SliceRandom;

        let g = self.graph.read();
        let all: Vec<u64> = g.store.iter_live().map(|(_, node)| node.id).collect();
        let mut rng = rand::thread_rng();
        all.choose_multiple(&mut rng, n.min(all.len()))
            .copied()
            .collect()
    }

    /// Collects point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let g = self.graph.read();
        let mut links = 0;
        let mut memory_bytes = 0;
        for (_, node) in g.store.iter_live() {
            memory_bytes += node.vector.memory_bytes();
            for level in node.links.iter() {
                links += level.len();
                memory_bytes += level.capacity() * std::mem::size_of::<NodeId>();
            }
        }
        IndexStats {
            nodes: g.store.len(),
            dimensions: g.config.dimensions as usize,
            quantization: g.config.quantization,
            max_level: g.max_level,
            links,
            slots: g.store.slot_count(),
            graveyard: g.store.graveyard_len(),
            memory_bytes,
        }
    }

    /// Logs [`IndexStats`] at info level.
    pub fn log_stats(&self) {
        let stats = self.stats();
        log::info!(
            "index stats: nodes={} dim={} quant={} max_level={} links={} graveyard={} mem={}B",
            stats.nodes,
            stats.dimensions,
            stats.quantization.name(),
            stats.max_level,
            stats.links,
            stats.graveyard,
            stats.memory_bytes
        );
    }

    /// Frees graves no registered reader can still observe.
    pub(crate) fn reclaim(&self, g: &mut Graph<V>) {
        g.store.reclaim(self.registry.min_active());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_distribution_is_geometric() {
        let config = HnswConfig::new(4, Quantization::F32);
        let mut g: Graph<()> = Graph::new(config);

        let levels: Vec<u8> = (0..2000).map(|_| g.random_level()).collect();
        let l0 = levels.iter().filter(|&&l| l == 0).count();
        // P(level = 0) = 1 - 1/M = 15/16 for M = 16.
        assert!(l0 > 1700, "level 0 should dominate, got {l0}/2000");
        assert!(*levels.iter().max().unwrap() <= HnswConfig::MAX_LEVEL);
    }

    #[test]
    fn level_cap_holds_for_tiny_uniform() {
        assert_eq!(level_from_uniform(1e-300, 1.0), HnswConfig::MAX_LEVEL);
        assert_eq!(level_from_uniform(1.0, 0.36), 0);
    }

    #[test]
    fn normalize_rejects_bad_vectors() {
        assert!(matches!(
            normalize(&[0.0, 0.0]),
            Err(GraphError::InvalidVector(_))
        ));
        assert!(matches!(
            normalize(&[f32::NAN, 1.0]),
            Err(GraphError::InvalidVector(_))
        ));
        assert!(matches!(
            normalize(&[f32::INFINITY, 1.0]),
            Err(GraphError::InvalidVector(_))
        ));
    }

    #[test]
    fn normalize_preserves_unit_vectors_exactly() {
        let (v, norm) = normalize(&[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
        assert_eq!(norm, 1.0);
    }

    #[test]
    fn normalize_records_magnitude() {
        let (v, norm) = normalize(&[3.0, 4.0]).unwrap();
        assert!((norm - 5.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HnswIndex<String>>();
    }
}
