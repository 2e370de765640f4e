//! HNSW graph engine.
//!
//! A Hierarchical Navigable Small World index: nodes live in a slab arena
//! (`node`), layered adjacency forms the navigable graph, and operations
//! split across focused modules: construction (`insert`), querying
//! (`search`), removal with relinking (`delete`), introspection
//! (`validate`). Concurrent access follows a one-writer/many-readers
//! protocol: writers serialize on an internal lock, readers register in
//! the epoch/slot registry (`epoch`) so deleted nodes are reclaimed only
//! at quiescence.
//!
//! The public surface is re-exported here; see [`HnswIndex`] for the
//! operation set.

mod config;
mod delete;
mod epoch;
mod graph;
mod insert;
mod node;
mod search;
mod validate;

pub use config::HnswConfig;
pub use epoch::ReadSlot;
pub use graph::{GraphError, HnswIndex, IndexStats, InsertOutcome, SearchHit};
pub use insert::InsertPrep;
pub use validate::ValidateReport;
