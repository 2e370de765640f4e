//! Insertion: the locked path and the optimistic prepare/commit split.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::graph::{level_from_uniform, normalize, Graph, GraphError, HnswIndex, InsertOutcome};
use super::node::{Node, NodeId};
use super::search::{search_layer, Candidate, SearchContext};
use crate::metric;
use crate::quant::QuantizedVector;

/// Seeds for the per-thread RNG used by off-lock level draws.
static PREP_SEED: AtomicU64 = AtomicU64::new(0x9E37_79B9_7F4A_7C15);

thread_local! {
    // The locked path draws levels from the index RNG under the write
    // lock; prepared inserts must not touch shared state, so each thread
    // carries its own stream.
    static PREP_RNG: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::seed_from_u64(
        PREP_SEED.fetch_add(0x9E37_79B9, Ordering::Relaxed),
    ));
}

/// Selected neighbors for one layer of a pending insertion.
struct LayerPlan {
    level: u8,
    neighbors: Vec<NodeId>,
}

/// A prepared insertion: the candidate-search phase of `insert`, executed
/// without the write lock.
///
/// Produced by [`HnswIndex::prepare_insert`]; spent by
/// [`HnswIndex::try_commit_insert`], which re-validates the observed
/// neighborhood under the write lock and either installs the node or
/// reports [`GraphError::Conflict`].
pub struct InsertPrep {
    id: u64,
    vector: QuantizedVector,
    norm: f32,
    attributes: Option<Box<str>>,
    level: u8,
    plans: Vec<LayerPlan>,
    /// Every neighbor the plan references, with the external id and level
    /// it had when observed. Slot reuse or relinking shows up here.
    observed: Vec<(NodeId, u64, u8)>,
    version: u64,
    had_entry: bool,
}

/// Runs the per-layer candidate searches for a node entering at `level`,
/// selecting up to `cap(l)` diverse neighbors per layer.
fn plan_layers<V>(
    g: &Graph<V>,
    qvec: &QuantizedVector,
    level: u8,
    ef: usize,
    ctx: &mut SearchContext,
) -> Vec<LayerPlan> {
    let Some(entry) = g.entry else {
        return Vec::new();
    };
    let mut current = entry;

    // Greedy zoom from the top of the graph down to just above the node's
    // own level.
    for lc in (level + 1..=g.max_level).rev() {
        search_layer(g, ctx, &[current], qvec, 1, lc);
        if let Some(best) = ctx.scratch.first() {
            current = best.node;
        }
    }

    let top = level.min(g.max_level);
    let mut plans = Vec::with_capacity(top as usize + 1);
    for lc in (0..=top).rev() {
        search_layer(g, ctx, &[current], qvec, ef, lc);
        if let Some(best) = ctx.scratch.first() {
            current = best.node;
        }
        let mut neighbors = Vec::new();
        select_diverse(g, &ctx.scratch, g.config.cap(lc), &mut neighbors);
        plans.push(LayerPlan {
            level: lc,
            neighbors,
        });
    }
    plans
}

/// The extended neighbor-selection heuristic (Malkov & Yashunin §4).
///
/// `pool` is ascending by `(distance-to-query, id)`. A candidate is taken
/// only if no already-taken neighbor sits closer to it than the query
/// does, so the kept neighborhood spreads instead of clustering.
pub(crate) fn select_diverse<V>(
    g: &Graph<V>,
    pool: &[Candidate],
    cap: usize,
    out: &mut Vec<NodeId>,
) {
    out.clear();
    for c in pool {
        if out.len() >= cap {
            break;
        }
        let dominated = out
            .iter()
            .any(|&taken| g.dist_nodes(c.node, taken) < c.distance);
        if !dominated {
            out.push(c.node);
        }
    }
}

/// Installs a fully planned node into the graph: allocates the slot,
/// writes the forward links, mirrors them onto the neighbors (pruning
/// overflow), and updates the entry point.
fn install<V>(
    g: &mut Graph<V>,
    id: u64,
    vector: QuantizedVector,
    norm: f32,
    attributes: Option<Box<str>>,
    value: V,
    level: u8,
    plans: &[LayerPlan],
) -> NodeId {
    let nid = g
        .store
        .insert(Node::new(id, value, vector, norm, level, attributes));
    g.by_id.insert(id, nid);

    for plan in plans {
        let lc = plan.level;
        if let Some(node) = g.store.get_mut(nid) {
            node.links[lc as usize] = plan.neighbors.clone();
        }
        for &nb in &plan.neighbors {
            connect_backlink(g, nb, nid, lc);
        }
    }

    if g.entry.is_none() || level > g.max_level {
        g.entry = Some(nid);
        g.max_level = level;
    }
    nid
}

/// Adds `to` into `from`'s layer-`lc` adjacency. If that overflows the
/// cap, the whole list is re-selected with the diversity heuristic and
/// every pruned link is removed symmetrically.
fn connect_backlink<V>(g: &mut Graph<V>, from: NodeId, to: NodeId, lc: u8) {
    let cap = g.config.cap(lc);
    {
        let Some(node) = g.store.get_mut(from) else {
            return;
        };
        let Some(list) = node.links.get_mut(lc as usize) else {
            return;
        };
        if list.contains(&to) {
            return;
        }
        list.push(to);
        if list.len() <= cap {
            return;
        }
    }

    // Overflow: rank the neighborhood by distance from `from` and keep a
    // diverse cap-sized subset.
    let dim = g.config.dimensions as usize;
    let mut pool: Vec<Candidate> = Vec::with_capacity(cap + 1);
    {
        let Some(node) = g.store.get(from) else {
            return;
        };
        for &nb in &node.links[lc as usize] {
            let Some(neighbor) = g.store.get(nb) else {
                continue;
            };
            pool.push(Candidate {
                distance: metric::distance(&node.vector, &neighbor.vector, dim),
                id: neighbor.id,
                node: nb,
            });
        }
    }
    pool.sort_unstable();

    let mut selected = Vec::with_capacity(cap);
    select_diverse(g, &pool, cap, &mut selected);

    if let Some(node) = g.store.get_mut(from) {
        node.links[lc as usize] = selected.clone();
    }
    for c in &pool {
        if !selected.contains(&c.node) {
            g.remove_link(c.node, from, lc);
        }
    }
}

impl<V> HnswIndex<V> {
    /// Inserts a vector under a caller-assigned id.
    ///
    /// The vector is L2-normalized, encoded in the index quantization, and
    /// linked into every layer up to its drawn level. Holds the write lock
    /// for the whole operation; see [`HnswIndex::prepare_insert`] for the
    /// optimistic alternative. Inserting an id that already exists leaves
    /// the index untouched and reports
    /// [`InsertOutcome::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// [`GraphError::DimensionMismatch`] or [`GraphError::InvalidVector`].
    pub fn insert(
        &self,
        id: u64,
        vector: &[f32],
        attributes: Option<&str>,
        value: V,
    ) -> Result<InsertOutcome, GraphError> {
        self.insert_inner(id, vector, attributes, value, None)
    }

    /// As [`HnswIndex::insert`], with an explicit build effort overriding
    /// the configured `ef_construction`.
    ///
    /// # Errors
    ///
    /// As [`HnswIndex::insert`].
    pub fn insert_with_ef(
        &self,
        id: u64,
        vector: &[f32],
        attributes: Option<&str>,
        value: V,
        ef_construction: usize,
    ) -> Result<InsertOutcome, GraphError> {
        self.insert_inner(id, vector, attributes, value, Some(ef_construction))
    }

    fn insert_inner(
        &self,
        id: u64,
        vector: &[f32],
        attributes: Option<&str>,
        value: V,
        ef_override: Option<usize>,
    ) -> Result<InsertOutcome, GraphError> {
        let mut g = self.graph.write();
        self.reclaim(&mut g);

        if g.by_id.contains_key(&id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let dim = g.config.dimensions as usize;
        if vector.len() != dim {
            return Err(GraphError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        let (normalized, norm) = normalize(vector)?;
        let qvec = QuantizedVector::encode(g.config.quantization, &normalized);
        let level = g.random_level();
        let ef = ef_override
            .unwrap_or(g.config.ef_construction as usize)
            .max(1);

        let mut ctx = SearchContext::new();
        let plans = plan_layers(&g, &qvec, level, ef, &mut ctx);
        install(
            &mut g,
            id,
            qvec,
            norm,
            attributes.map(Box::from),
            value,
            level,
            &plans,
        );
        self.registry.bump();
        Ok(InsertOutcome::Inserted)
    }

    /// Runs the candidate-search phase of an insertion without the write
    /// lock, recording the version and neighborhood it observed.
    ///
    /// The returned [`InsertPrep`] is spent by
    /// [`HnswIndex::try_commit_insert`]. The level is drawn from a
    /// thread-local RNG so concurrent preparers share nothing.
    ///
    /// # Errors
    ///
    /// [`GraphError::DimensionMismatch`] or [`GraphError::InvalidVector`].
    pub fn prepare_insert(
        &self,
        id: u64,
        vector: &[f32],
        attributes: Option<&str>,
    ) -> Result<InsertPrep, GraphError> {
        let g = self.graph.read();
        let dim = g.config.dimensions as usize;
        if vector.len() != dim {
            return Err(GraphError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        let (normalized, norm) = normalize(vector)?;
        let qvec = QuantizedVector::encode(g.config.quantization, &normalized);

        let level_mult = 1.0 / f64::from(g.config.m).ln();
        let level = PREP_RNG.with(|rng| {
            let u: f64 = rng.borrow_mut().gen_range(f64::EPSILON..=1.0);
            level_from_uniform(u, level_mult)
        });

        let version = self.registry.version();
        let mut ctx = SearchContext::new();
        let plans = plan_layers(&g, &qvec, level, g.config.ef_construction as usize, &mut ctx);

        let mut observed = Vec::new();
        for plan in &plans {
            for &nb in &plan.neighbors {
                if let Some(node) = g.store.get(nb) {
                    observed.push((nb, node.id, node.level));
                }
            }
        }

        Ok(InsertPrep {
            id,
            vector: qvec,
            norm,
            attributes: attributes.map(Box::from),
            level,
            plans,
            observed,
            version,
            had_entry: g.entry.is_some(),
        })
    }

    /// Commits a prepared insertion.
    ///
    /// Fast path: if the writer version is unchanged since the prepare,
    /// nothing can have moved and the node is installed directly.
    /// Otherwise every observed neighbor must still be live with the same
    /// external id and level (and the graph must not have gained its
    /// first entry point since an empty-graph prepare), or the commit is
    /// abandoned.
    ///
    /// # Errors
    ///
    /// [`GraphError::Conflict`] when the observed neighborhood no longer
    /// holds; callers fall back to [`HnswIndex::insert`].
    pub fn try_commit_insert(
        &self,
        prep: InsertPrep,
        value: V,
    ) -> Result<InsertOutcome, GraphError> {
        let mut g = self.graph.write();
        self.reclaim(&mut g);

        if g.by_id.contains_key(&prep.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        if self.registry.version() != prep.version {
            if g.entry.is_some() != prep.had_entry {
                return Err(GraphError::Conflict);
            }
            for &(nb, ext_id, level) in &prep.observed {
                match g.store.get(nb) {
                    Some(node) if node.id == ext_id && node.level == level => {}
                    _ => return Err(GraphError::Conflict),
                }
            }
        }

        install(
            &mut g,
            prep.id,
            prep.vector,
            prep.norm,
            prep.attributes,
            value,
            prep.level,
            &prep.plans,
        );
        self.registry.bump();
        Ok(InsertOutcome::Inserted)
    }
}
