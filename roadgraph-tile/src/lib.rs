//! # Road graph tiles
//!
//! Storage layer for a hierarchical, tiled road graph.
//!
//! The graph is split into square tiles over several hierarchy levels.
//! Every node and directed edge is addressed by a [`GraphId`],
//! and each tile is a single immutable byte blob that can be read without copying.
//!
//! The main entry points are:
//!
//! - [`GraphId`] and [`tile_hierarchy`] for addressing.
//! - [`graph_tile`] for the binary tile format, including the edge info codec.
//! - [`tile_provider::GraphReader`] for cached tile access and opposing edge resolution.
//! - [`pairing`] for deduplicating the two directions of each way.
//! - [`narrative`] for localized instruction phrase lookup.

pub mod graph_id;
pub mod graph_tile;
pub mod narrative;
pub mod pairing;
pub mod shape_codec;
pub mod tile_hierarchy;
pub mod tile_provider;

pub use graph_id::GraphId;
