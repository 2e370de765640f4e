//! Deletion with relinking.
//!
//! Removing a node tears its links out of every neighbor and then repairs
//! the hole: at each layer, ex-neighbors left under half their cap are
//! offered links to the other ex-neighbors, nearest first, subject to the
//! same diversity rule used at insertion. This keeps the survivors
//! mutually reachable without a global rebuild, and the node's memory is
//! only reclaimed once the epoch registry proves no reader can still
//! resolve it.

use super::graph::{Graph, HnswIndex};
use super::node::NodeId;
use super::search::Candidate;
use crate::metric;

impl<V> HnswIndex<V> {
    /// Deletes a node, returning its payload.
    ///
    /// Acquires the write lock. The slot itself stays allocated until
    /// every registered read slot has advanced past the deleting version;
    /// only then is it recycled.
    ///
    /// Returns `None` when no live node carries `id`.
    pub fn remove(&self, id: u64) -> Option<V> {
        let mut g = self.graph.write();
        let nid = g.by_id.remove(&id)?;
        let died_at = self.registry.bump();
        let node = g.store.remove(nid, died_at)?;

        // Detach every back-link first so the relink step below sees the
        // graph without the dead node.
        for (lc, peers) in node.links.iter().enumerate() {
            for &peer in peers {
                g.remove_link(peer, nid, lc as u8);
            }
        }
        for (lc, peers) in node.links.iter().enumerate() {
            relink_layer(&mut g, peers, lc as u8);
        }

        if g.entry == Some(nid) {
            elect_entry(&mut g);
        }

        self.reclaim(&mut g);
        Some(node.value)
    }
}

/// Picks the highest-level survivor as the new entry point and snaps
/// `max_level` down to it.
fn elect_entry<V>(g: &mut Graph<V>) {
    let mut best: Option<(NodeId, u8)> = None;
    for (nid, node) in g.store.iter_live() {
        match best {
            Some((_, level)) if node.level <= level => {}
            _ => best = Some((nid, node.level)),
        }
    }
    match best {
        Some((nid, level)) => {
            g.entry = Some(nid);
            g.max_level = level;
        }
        None => {
            g.entry = None;
            g.max_level = 0;
        }
    }
}

/// Repairs one layer after a deletion. `peers` are the dead node's
/// ex-neighbors there; any of them left below `cap/2` links tries to
/// adopt the others, ascending by distance, diversity-checked, and only
/// while both sides stay within cap.
fn relink_layer<V>(g: &mut Graph<V>, peers: &[NodeId], lc: u8) {
    let dim = g.config.dimensions as usize;
    let cap = g.config.cap(lc);
    let target = cap.div_ceil(2);

    for &v in peers {
        let mut pool: Vec<Candidate> = {
            let Some(v_node) = g.store.get(v) else {
                continue;
            };
            let linked = &v_node.links[lc as usize];
            if linked.len() >= target {
                continue;
            }
            peers
                .iter()
                .filter(|&&p| p != v && !linked.contains(&p))
                .filter_map(|&p| {
                    let peer = g.store.get(p)?;
                    Some(Candidate {
                        distance: metric::distance(&v_node.vector, &peer.vector, dim),
                        id: peer.id,
                        node: p,
                    })
                })
                .collect()
        };
        pool.sort_unstable();

        for c in pool {
            let accept = {
                let Some(v_node) = g.store.get(v) else {
                    break;
                };
                let linked = &v_node.links[lc as usize];
                if linked.len() >= target {
                    break;
                }
                // Same rule as the insert-time selector: skip a candidate
                // already better served by an existing neighbor.
                !linked
                    .iter()
                    .any(|&taken| g.dist_nodes(c.node, taken) < c.distance)
            };
            if !accept {
                continue;
            }
            let peer_has_room = g
                .store
                .get(c.node)
                .is_some_and(|peer| peer.links[lc as usize].len() < cap);
            if !peer_has_room {
                continue;
            }
            if let Some(v_node) = g.store.get_mut(v) {
                v_node.links[lc as usize].push(c.node);
            }
            if let Some(peer) = g.store.get_mut(c.node) {
                peer.links[lc as usize].push(v);
            }
        }
    }
}
