//! # Quiver
//!
//! Concurrent in-memory HNSW vector index with quantization and filtered
//! search.
//!
//! The crate is organized around four subsystems:
//!
//! - **`hnsw`**: the graph engine: insertion (locked and optimistic),
//!   search, deletion with relinking, validation, and the epoch/read-slot
//!   registry that arbitrates readers against the deleter.
//! - **`quant`**: vector storage formats (`F32`, `Q8`, `Binary`) and the
//!   encode/decode paths between them.
//! - **`metric`**: pure distance kernels, one per storage format.
//! - **`filter`**: an infix-to-postfix expression compiler and a typed VM
//!   that evaluates predicates against per-node JSON attributes.
//!
//! ## Example
//!
//! ```rust
//! use quiver::{HnswConfig, HnswIndex, Quantization};
//!
//! let index: HnswIndex<&str> =
//!     HnswIndex::new(HnswConfig::new(3, Quantization::F32)).unwrap();
//! index.insert(1, &[1.0, 0.0, 0.0], None, "apple").unwrap();
//! index.insert(2, &[0.0, 1.0, 0.0], None, "pear").unwrap();
//!
//! let slot = index.read_slot();
//! let hits = index.search(&[1.0, 0.0, 0.1], 1, &slot).unwrap();
//! assert_eq!(hits[0].id, 1);
//! ```
//!
//! ## Filtered search
//!
//! ```rust
//! use quiver::{filter, HnswConfig, HnswIndex, Quantization};
//!
//! let index: HnswIndex<()> =
//!     HnswIndex::new(HnswConfig::new(2, Quantization::F32)).unwrap();
//! index
//!     .insert(1, &[1.0, 0.0], Some(r#"{"genre":"jazz","year":1959}"#), ())
//!     .unwrap();
//! index
//!     .insert(2, &[0.9, 0.1], Some(r#"{"genre":"rock","year":1971}"#), ())
//!     .unwrap();
//!
//! let program = filter::compile(".genre == 'jazz'").unwrap();
//! let slot = index.read_slot();
//! let hits = index
//!     .search_filtered(&[1.0, 0.0], 2, 50, &program, None, &slot)
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].id, 1);
//! ```

#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

/// Filter expression compiler and evaluator.
pub mod filter;

/// HNSW graph engine.
pub mod hnsw;

/// Distance kernels.
pub mod metric;

/// Vector quantization.
pub mod quant;

pub use filter::{compile, FilterError, Program};
pub use hnsw::{
    GraphError, HnswConfig, HnswIndex, IndexStats, InsertOutcome, InsertPrep, ReadSlot, SearchHit,
    ValidateReport,
};
pub use quant::{Quantization, QuantizedVector};

/// The crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
