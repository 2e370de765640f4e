//! Greedy descent and candidate search.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use super::epoch::ReadSlot;
use super::graph::{normalize, Graph, GraphError, HnswIndex, SearchHit};
use super::node::{Node, NodeId};
use crate::filter::Program;
use crate::metric;
use crate::quant::QuantizedVector;

/// A node under consideration, keyed by distance to the query.
///
/// Ordering is `(distance, id)` ascending: ties on distance resolve by the
/// caller id, which makes builds and searches reproducible.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    pub(crate) distance: f32,
    pub(crate) id: u64,
    pub(crate) node: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Per-call working set. Private to each search; nothing here is shared.
pub(crate) struct SearchContext {
    /// Nodes whose distance has been computed.
    visited: HashSet<NodeId>,
    /// Min-heap of unexplored candidates, nearest first.
    candidates: BinaryHeap<Reverse<Candidate>>,
    /// Max-heap of the current best, farthest first, capped at ef.
    results: BinaryHeap<Candidate>,
    /// Result staging area, ascending by `(distance, id)` after a layer
    /// search returns.
    pub(crate) scratch: Vec<Candidate>,
}

impl SearchContext {
    pub(crate) fn new() -> Self {
        Self {
            visited: HashSet::new(),
            candidates: BinaryHeap::new(),
            results: BinaryHeap::new(),
            scratch: Vec::new(),
        }
    }

    fn clear(&mut self) {
        self.visited.clear();
        self.candidates.clear();
        self.results.clear();
        self.scratch.clear();
    }

    fn drain_sorted(&mut self) {
        self.scratch.clear();
        while let Some(c) = self.results.pop() {
            self.scratch.push(c);
        }
        self.scratch.reverse();
    }
}

/// Candidate search within one layer.
///
/// Expands from the entry points, keeping up to `ef` best nodes; stops
/// when the nearest unexplored candidate is farther than the worst kept
/// result. `ctx.scratch` holds the results, ascending.
pub(crate) fn search_layer<V>(
    g: &Graph<V>,
    ctx: &mut SearchContext,
    entries: &[NodeId],
    query: &QuantizedVector,
    ef: usize,
    level: u8,
) {
    let dim = g.config.dimensions as usize;
    ctx.clear();

    for &ep in entries {
        let Some(node) = g.store.get(ep) else {
            continue;
        };
        if node.level < level || !ctx.visited.insert(ep) {
            continue;
        }
        let c = Candidate {
            distance: metric::distance(query, &node.vector, dim),
            id: node.id,
            node: ep,
        };
        ctx.candidates.push(Reverse(c));
        ctx.results.push(c);
    }
    while ctx.results.len() > ef {
        ctx.results.pop();
    }

    while let Some(Reverse(current)) = ctx.candidates.pop() {
        if ctx.results.len() >= ef {
            if let Some(worst) = ctx.results.peek() {
                if current > *worst {
                    break;
                }
            }
        }

        let Some(node) = g.store.get(current.node) else {
            continue;
        };
        for &nb in &node.links[level as usize] {
            if !ctx.visited.insert(nb) {
                continue;
            }
            let Some(neighbor) = g.store.get(nb) else {
                continue;
            };
            let c = Candidate {
                distance: metric::distance(query, &neighbor.vector, dim),
                id: neighbor.id,
                node: nb,
            };
            let admit = ctx.results.len() < ef
                || ctx.results.peek().is_some_and(|worst| c < *worst);
            if admit {
                ctx.candidates.push(Reverse(c));
                ctx.results.push(c);
                if ctx.results.len() > ef {
                    ctx.results.pop();
                }
            }
        }
    }

    ctx.drain_sorted();
}

/// Layer-0 candidate search under a filter predicate.
///
/// Exploration is the same greedy loop, but only candidates whose
/// attributes satisfy `program` enter the result set; the rest still feed
/// traversal. The predicate runs once per first-visited node, and the loop
/// additionally stops after `budget` predicate evaluations so that a
/// hostile selectivity cannot walk the whole graph.
fn search_layer_filtered<V>(
    g: &Graph<V>,
    ctx: &mut SearchContext,
    entry: NodeId,
    query: &QuantizedVector,
    ef: usize,
    program: &Program,
    budget: usize,
) {
    let dim = g.config.dimensions as usize;
    ctx.clear();
    let mut tested = 0usize;

    let Some(node) = g.store.get(entry) else {
        return;
    };
    let seed = Candidate {
        distance: metric::distance(query, &node.vector, dim),
        id: node.id,
        node: entry,
    };
    ctx.visited.insert(entry);
    ctx.candidates.push(Reverse(seed));
    tested += 1;
    if node_matches(program, node) {
        ctx.results.push(seed);
    }

    while let Some(Reverse(current)) = ctx.candidates.pop() {
        if tested >= budget {
            break;
        }
        if ctx.results.len() >= ef {
            if let Some(worst) = ctx.results.peek() {
                if current > *worst {
                    break;
                }
            }
        }

        let Some(node) = g.store.get(current.node) else {
            continue;
        };
        for &nb in &node.links[0] {
            if !ctx.visited.insert(nb) {
                continue;
            }
            let Some(neighbor) = g.store.get(nb) else {
                continue;
            };
            let c = Candidate {
                distance: metric::distance(query, &neighbor.vector, dim),
                id: neighbor.id,
                node: nb,
            };
            // Non-matching nodes still route the traversal.
            ctx.candidates.push(Reverse(c));
            if tested < budget {
                tested += 1;
                if node_matches(program, neighbor) {
                    ctx.results.push(c);
                    if ctx.results.len() > ef {
                        ctx.results.pop();
                    }
                }
            }
        }
    }

    ctx.drain_sorted();
}

/// Evaluates the filter against a node's attributes. A node without
/// attributes sees every selector resolve to `null`; invalid JSON is a
/// no-match.
fn node_matches<V>(program: &Program, node: &Node<V>) -> bool {
    match &node.attributes {
        Some(attributes) => program.matches(attributes),
        None => program.eval(&serde_json::Value::Null),
    }
}

/// Greedy single-step descent from the top layer down to layer 1,
/// returning the entry point for the layer-0 search.
pub(crate) fn descend_to_base<V>(
    g: &Graph<V>,
    ctx: &mut SearchContext,
    query: &QuantizedVector,
) -> Option<NodeId> {
    let mut current = g.entry?;
    for level in (1..=g.max_level).rev() {
        search_layer(g, ctx, &[current], query, 1, level);
        if let Some(best) = ctx.scratch.first() {
            current = best.node;
        }
    }
    Some(current)
}

impl<V> HnswIndex<V> {
    /// K-nearest-neighbor search with the configured `ef_search`.
    ///
    /// Results are ascending by distance, at most `k` of them. The
    /// `slot` guard proves the caller is registered with the epoch
    /// registry; ids in the result stay resolvable while it is held.
    ///
    /// # Errors
    ///
    /// [`GraphError::DimensionMismatch`] for a wrong-length query;
    /// [`GraphError::InvalidVector`] for a zero or non-finite query.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        slot: &ReadSlot<'_>,
    ) -> Result<Vec<SearchHit>, GraphError> {
        let g = self.graph.read();
        let ef = g.config.ef_search as usize;
        Self::search_graph(&g, query, k, ef, None, slot, &self.registry)
    }

    /// K-nearest-neighbor search with an explicit exploration factor.
    ///
    /// # Errors
    ///
    /// As [`HnswIndex::search`].
    pub fn search_with_ef(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        slot: &ReadSlot<'_>,
    ) -> Result<Vec<SearchHit>, GraphError> {
        let g = self.graph.read();
        Self::search_graph(&g, query, k, ef, None, slot, &self.registry)
    }

    /// Filtered k-nearest-neighbor search.
    ///
    /// Only nodes whose JSON attributes satisfy `program` are returned;
    /// non-matching nodes are still traversed. `filter_budget` caps how
    /// many candidates are tested against the predicate (default
    /// `k * 100`), compensating for predicate selectivity without letting
    /// a never-matching filter scan the whole graph.
    ///
    /// # Errors
    ///
    /// As [`HnswIndex::search`].
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        program: &Program,
        filter_budget: Option<usize>,
        slot: &ReadSlot<'_>,
    ) -> Result<Vec<SearchHit>, GraphError> {
        let g = self.graph.read();
        let budget = filter_budget
            .unwrap_or_else(|| k.saturating_mul(100))
            .max(k);
        Self::search_graph(&g, query, k, ef, Some((program, budget)), slot, &self.registry)
    }

    fn search_graph(
        g: &Graph<V>,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<(&Program, usize)>,
        slot: &ReadSlot<'_>,
        registry: &super::epoch::SlotRegistry,
    ) -> Result<Vec<SearchHit>, GraphError> {
        debug_assert!(
            std::ptr::eq(slot.registry(), registry),
            "read slot from a different index"
        );

        let dim = g.config.dimensions as usize;
        if query.len() != dim {
            return Err(GraphError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        let (normalized, _norm) = normalize(query)?;
        if k == 0 || g.store.is_empty() {
            return Ok(Vec::new());
        }

        let qvec = QuantizedVector::encode(g.config.quantization, &normalized);
        let mut ctx = SearchContext::new();
        let Some(base_entry) = descend_to_base(g, &mut ctx, &qvec) else {
            return Ok(Vec::new());
        };

        let ef = ef.max(k);
        match filter {
            None => search_layer(g, &mut ctx, &[base_entry], &qvec, ef, 0),
            Some((program, budget)) => {
                search_layer_filtered(g, &mut ctx, base_entry, &qvec, ef, program, budget);
            }
        }

        Ok(ctx
            .scratch
            .iter()
            .take(k)
            .map(|c| SearchHit {
                id: c.id,
                distance: c.distance,
            })
            .collect())
    }
}
