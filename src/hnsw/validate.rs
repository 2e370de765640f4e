//! Graph validation and the recall self-test.

use std::collections::{HashSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::graph::HnswIndex;
use super::search::{descend_to_base, search_layer, Candidate, SearchContext};
use crate::metric;
use crate::quant::QuantizedVector;

/// Result of [`HnswIndex::validate`].
#[derive(Clone, Copy, Debug)]
pub struct ValidateReport {
    /// Live nodes at the time of the check.
    pub live_nodes: usize,
    /// Nodes reachable from the entry point over layer-0 links.
    pub connected_nodes: usize,
    /// True when every link `u -> v` has its inverse `v -> u` and points
    /// at a live node of sufficient level.
    pub reciprocal: bool,
    /// True when no adjacency list exceeds its layer cap.
    pub within_caps: bool,
}

impl ValidateReport {
    /// True when the graph upholds every checked invariant.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.reciprocal && self.within_caps && self.connected_nodes == self.live_nodes
    }
}

impl<V> HnswIndex<V> {
    /// Walks the whole graph checking the structural invariants: link
    /// reciprocity, layer caps, and layer-0 reachability from the entry
    /// point. A debug primitive, linear in nodes and links.
    #[must_use]
    pub fn validate(&self) -> ValidateReport {
        let g = self.graph.read();
        let mut reciprocal = true;
        let mut within_caps = true;

        for (nid, node) in g.store.iter_live() {
            for (lc, list) in node.links.iter().enumerate() {
                if list.len() > g.config.cap(lc as u8) {
                    within_caps = false;
                }
                for &nb in list {
                    match g.store.get(nb) {
                        Some(neighbor)
                            if usize::from(neighbor.level) >= lc
                                && neighbor.links[lc].contains(&nid) => {}
                        _ => reciprocal = false,
                    }
                }
            }
        }

        let mut connected = 0usize;
        if let Some(entry) = g.entry {
            let mut seen = HashSet::new();
            let mut queue = VecDeque::new();
            seen.insert(entry);
            queue.push_back(entry);
            while let Some(nid) = queue.pop_front() {
                connected += 1;
                if let Some(node) = g.store.get(nid) {
                    for &nb in &node.links[0] {
                        if seen.insert(nb) {
                            queue.push_back(nb);
                        }
                    }
                }
            }
        }

        ValidateReport {
            live_nodes: g.store.len(),
            connected_nodes: connected,
            reciprocal,
            within_caps,
        }
    }

    /// Measures recall@k against exact linear scan.
    ///
    /// Samples up to `samples` live nodes, queries the graph with each
    /// node's decoded vector, and reports the mean fraction of the true
    /// k-nearest found. Deterministic: sampling uses a fixed seed and the
    /// kernels are pure.
    #[must_use]
    pub fn recall_self_test(&self, samples: usize, k: usize) -> f64 {
        let g = self.graph.read();
        if g.store.is_empty() || samples == 0 || k == 0 {
            return 1.0;
        }
        let dim = g.config.dimensions as usize;
        let population: Vec<_> = g.store.iter_live().map(|(nid, _)| nid).collect();
        let k_eff = k.min(population.len());
        let ef = (g.config.ef_search as usize).max(k);

        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_CAFE);
        let mut ctx = SearchContext::new();
        let mut decoded = Vec::with_capacity(dim);
        let mut total = 0.0f64;
        let mut runs = 0usize;

        for _ in 0..samples {
            let sampled = population[rng.gen_range(0..population.len())];
            let Some(node) = g.store.get(sampled) else {
                continue;
            };
            node.vector.decode_into(dim, &mut decoded);
            let qvec = QuantizedVector::encode(g.config.quantization, &decoded);

            let Some(base_entry) = descend_to_base(&g, &mut ctx, &qvec) else {
                break;
            };
            search_layer(&g, &mut ctx, &[base_entry], &qvec, ef, 0);
            let approx: HashSet<u64> = ctx.scratch.iter().take(k_eff).map(|c| c.id).collect();

            let mut exact: Vec<Candidate> = g
                .store
                .iter_live()
                .map(|(nid, n)| Candidate {
                    distance: metric::distance(&qvec, &n.vector, dim),
                    id: n.id,
                    node: nid,
                })
                .collect();
            exact.sort_unstable();

            let found = exact
                .iter()
                .take(k_eff)
                .filter(|c| approx.contains(&c.id))
                .count();
            total += found as f64 / k_eff as f64;
            runs += 1;
        }

        if runs == 0 {
            1.0
        } else {
            total / runs as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::hnsw::{HnswConfig, HnswIndex};
    use crate::quant::Quantization;

    #[test]
    fn empty_index_validates_vacuously() {
        let idx: HnswIndex<()> =
            HnswIndex::new(HnswConfig::new(4, Quantization::F32)).unwrap();
        let report = idx.validate();
        assert!(report.is_healthy());
        assert_eq!(report.live_nodes, 0);
        assert_eq!(report.connected_nodes, 0);
    }

    #[test]
    fn recall_on_empty_or_degenerate_input_is_one() {
        let idx: HnswIndex<()> =
            HnswIndex::new(HnswConfig::new(4, Quantization::F32)).unwrap();
        assert_eq!(idx.recall_self_test(10, 10), 1.0);

        idx.insert(1, &[1.0, 0.0, 0.0, 0.0], None, ()).unwrap();
        assert_eq!(idx.recall_self_test(0, 10), 1.0);
        assert_eq!(idx.recall_self_test(10, 0), 1.0);
    }

    #[test]
    fn recall_is_perfect_on_a_tiny_exactly_searchable_set() {
        let idx: HnswIndex<()> =
            HnswIndex::new(HnswConfig::new(3, Quantization::F32)).unwrap();
        idx.insert(1, &[1.0, 0.0, 0.0], None, ()).unwrap();
        idx.insert(2, &[0.0, 1.0, 0.0], None, ()).unwrap();
        idx.insert(3, &[0.0, 0.0, 1.0], None, ()).unwrap();
        let recall = idx.recall_self_test(10, 2);
        assert!((recall - 1.0).abs() < f64::EPSILON, "recall {recall}");
    }
}
