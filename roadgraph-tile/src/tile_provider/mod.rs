//! # Graph tile providers
//!
//! Tiles come from a [`TileStore`] (a directory of tile files, memory, ...),
//! and are cached and shared by a [`GraphReader`].
//! The reader also resolves the opposing edge of each directed edge,
//! which may live in a neighbouring tile.

use crate::GraphId;
use crate::graph_id::InvalidGraphIdError;
use crate::graph_tile::{
    DirectedEdge, GraphTile, GraphTileDecodingError, LookupError, OpposingEdgeIndex,
    OwnedGraphTileHandle,
};
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

mod directory;
mod iterators;
mod memory;

pub use directory::DirectoryTileStore;
pub use iterators::{all_tile_ids, edges};
pub use memory::InMemoryTileStore;

#[derive(Debug, Error)]
pub enum GraphTileProviderError {
    #[error("Tile {0} does not exist (ex: in your extract)")]
    TileDoesNotExist(GraphId),
    #[error("The opposing edge of {edge_id} could not be resolved: {reason}")]
    InvalidOpposingEdge {
        edge_id: GraphId,
        reason: &'static str,
    },
    #[error("Tile {graph_id} is malformed: {source}")]
    MalformedTile {
        graph_id: GraphId,
        #[source]
        source: GraphTileDecodingError,
    },
    #[error("Expected tile {expected}, but the store returned tile {actual}")]
    TileIdMismatch { expected: GraphId, actual: GraphId },
    #[error("Invalid graph ID: {0}")]
    InvalidGraphId(#[from] InvalidGraphIdError),
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Decoding error: {0}")]
    DecodingError(#[from] GraphTileDecodingError),
    #[error("Graph tile lookup error: {0}")]
    GraphTileLookupError(#[from] LookupError),
    #[error("Cache lock is poisoned: {0}")]
    PoisonedCacheLock(String),
}

/// Backing storage for tiles, addressed by tile base ID.
///
/// Implementations must be safe to share across threads;
/// the [`GraphReader`] takes care of caching and load deduplication.
pub trait TileStore: Send + Sync {
    /// Whether the store has data for the tile containing `tile_id`.
    fn exists(&self, tile_id: GraphId) -> bool;

    /// Reads the raw bytes of the tile containing `tile_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphTileProviderError::TileDoesNotExist`] when there is no data for the tile,
    /// and other variants for I/O level failures.
    fn read(&self, tile_id: GraphId) -> Result<Vec<u8>, GraphTileProviderError>;
}

impl<S: TileStore + ?Sized> TileStore for Arc<S> {
    fn exists(&self, tile_id: GraphId) -> bool {
        (**self).exists(tile_id)
    }

    fn read(&self, tile_id: GraphId) -> Result<Vec<u8>, GraphTileProviderError> {
        (**self).read(tile_id)
    }
}

/// A shared, immutable tile.
///
/// Handles stay valid after the tile is evicted from the cache.
pub type TileHandle = Arc<OwnedGraphTileHandle>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphReaderConfig {
    /// The maximum number of tiles kept in the cache.
    ///
    /// `None` keeps every tile that has been loaded (until [`GraphReader::clear`]);
    /// a bound turns on least-recently-used eviction.
    pub max_cached_tiles: Option<NonZeroUsize>,
}

/// A directed edge together with the tile it lives in.
///
/// The invalid handle stands in for an edge that could not be resolved.
#[derive(Clone, Debug)]
pub struct EdgeHandle {
    id: GraphId,
    tile: Option<TileHandle>,
}

impl EdgeHandle {
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            id: GraphId::INVALID,
            tile: None,
        }
    }

    /// The edge ID ([`GraphId::INVALID`] for the invalid handle).
    #[inline]
    #[must_use]
    pub fn address(&self) -> GraphId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.tile.is_some()
    }

    /// The tile containing the edge.
    #[inline]
    #[must_use]
    pub fn tile(&self) -> Option<&TileHandle> {
        self.tile.as_ref()
    }

    /// The directed edge record.
    #[must_use]
    pub fn edge(&self) -> Option<&DirectedEdge> {
        self.tile.as_ref()?.get_directed_edge(self.id).ok()
    }
}

/// The outcome of following an edge's opposing edge index.
enum Resolution {
    Found { id: GraphId, tile: TileHandle },
    /// The data is internally inconsistent (ex: a corrupt index).
    Inconsistent(&'static str),
    /// The end node's tile is not in the store.
    MissingTile(GraphId),
}

/// Cached, thread-safe access to the tiles of a [`TileStore`].
pub struct GraphReader<S> {
    store: S,
    cache: Mutex<LruCache<GraphId, TileHandle>>,
    lock_table: LockTable<GraphId>,
}

impl<S: TileStore> GraphReader<S> {
    pub fn new(store: S, config: GraphReaderConfig) -> Self {
        let cache = match config.max_cached_tiles {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Self {
            store,
            cache: Mutex::new(cache),
            lock_table: LockTable::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the tile containing `graph_id` is cached or present in the store.
    ///
    /// This never loads the tile.
    pub fn does_tile_exist(&self, graph_id: GraphId) -> bool {
        if !graph_id.is_valid() {
            return false;
        }

        let tile_id = graph_id.tile_base_id();
        let cached = self
            .cache
            .lock()
            .is_ok_and(|cache| cache.contains(&tile_id));
        cached || self.store.exists(tile_id)
    }

    fn cached(&self, tile_id: GraphId) -> Result<Option<TileHandle>, GraphTileProviderError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| GraphTileProviderError::PoisonedCacheLock(e.to_string()))?;
        Ok(cache.get(&tile_id).cloned())
    }

    /// Gets the tile containing `graph_id`, loading it into the cache if needed.
    ///
    /// Concurrent requests for the same tile result in a single store read.
    ///
    /// # Errors
    ///
    /// Fails if the tile is missing from the store, can't be read, or is malformed.
    pub fn get_tile(&self, graph_id: GraphId) -> Result<TileHandle, GraphTileProviderError> {
        if !graph_id.is_valid() {
            return Err(InvalidGraphIdError::Value(graph_id.value()).into());
        }

        let tile_id = graph_id.tile_base_id();
        if let Some(tile) = self.cached(tile_id)? {
            trace!(%tile_id, "Cache hit");
            return Ok(tile);
        }

        let lock = self.lock_table.lock_for(tile_id);
        let _guard = lock
            .lock()
            .map_err(|e| GraphTileProviderError::PoisonedCacheLock(e.to_string()))?;

        // Another thread may have loaded the tile while we were waiting
        if let Some(tile) = self.cached(tile_id)? {
            return Ok(tile);
        }

        let loaded = self.load(tile_id);
        // Waiters already hold the lock; later callers hit the cache (or retry the load)
        self.lock_table.remove(&tile_id);
        loaded
    }

    fn load(&self, tile_id: GraphId) -> Result<TileHandle, GraphTileProviderError> {
        let bytes = self.store.read(tile_id)?;
        let size = bytes.len();
        let tile = OwnedGraphTileHandle::try_from(bytes).map_err(|source| {
            GraphTileProviderError::MalformedTile {
                graph_id: tile_id,
                source,
            }
        })?;
        if tile.graph_id() != tile_id {
            return Err(GraphTileProviderError::TileIdMismatch {
                expected: tile_id,
                actual: tile.graph_id(),
            });
        }
        debug!(%tile_id, size, "Loaded tile");

        let tile = Arc::new(tile);
        self.cache
            .lock()
            .map_err(|e| GraphTileProviderError::PoisonedCacheLock(e.to_string()))?
            .put(tile_id, tile.clone());

        Ok(tile)
    }

    /// Gets a handle for the directed edge with the given ID.
    ///
    /// # Errors
    ///
    /// Fails if the tile can't be loaded, or the edge index is out of range.
    pub fn get_edge(&self, edge_id: GraphId) -> Result<EdgeHandle, GraphTileProviderError> {
        let tile = self.get_tile(edge_id)?;
        tile.get_directed_edge(edge_id)?;
        Ok(EdgeHandle {
            id: edge_id,
            tile: Some(tile),
        })
    }

    fn resolve_opposing(&self, edge_id: GraphId) -> Result<Resolution, GraphTileProviderError> {
        let tile = self.get_tile(edge_id)?;
        let OpposingEdgeIndex {
            end_node_id,
            opposing_edge_index,
        } = tile.get_opp_edge_index(edge_id)?;

        let Ok(start_node_id) = tile.get_start_node_id(edge_id) else {
            return Ok(Resolution::Inconsistent("the edge has no start node"));
        };
        if !end_node_id.is_valid() {
            return Ok(Resolution::Inconsistent("invalid end node"));
        }

        // Fast path: the end node is in the same tile
        let end_tile = if tile.may_contain_id(end_node_id) {
            tile
        } else {
            match self.get_tile(end_node_id) {
                Ok(end_tile) => end_tile,
                Err(GraphTileProviderError::TileDoesNotExist(missing)) => {
                    return Ok(Resolution::MissingTile(missing));
                }
                Err(e) => return Err(e),
            }
        };

        let Ok(end_node) = end_tile.get_node(end_node_id) else {
            return Ok(Resolution::Inconsistent("end node index out of range"));
        };
        if opposing_edge_index >= end_node.edge_count() {
            return Ok(Resolution::Inconsistent(
                "opposing edge index exceeds the end node's edge count",
            ));
        }

        let index = u64::from(end_node.edge_index()) + u64::from(opposing_edge_index);
        let Ok(opposing_id) = end_tile.graph_id().with_index(index) else {
            return Ok(Resolution::Inconsistent("opposing edge index out of range"));
        };
        let Ok(opposing_edge) = end_tile.get_directed_edge(opposing_id) else {
            return Ok(Resolution::Inconsistent("opposing edge index out of range"));
        };
        if opposing_edge.end_node_id() != start_node_id {
            return Ok(Resolution::Inconsistent(
                "the opposing edge does not end at the start node",
            ));
        }

        Ok(Resolution::Found {
            id: opposing_id,
            tile: end_tile,
        })
    }

    /// Resolves the ID of the opposing edge.
    ///
    /// # Errors
    ///
    /// In addition to load failures,
    /// this returns [`GraphTileProviderError::InvalidOpposingEdge`] when the stored indexes
    /// are inconsistent,
    /// and [`GraphTileProviderError::TileDoesNotExist`] when the neighbouring tile is missing.
    pub fn opposing_edge_id(&self, edge_id: GraphId) -> Result<GraphId, GraphTileProviderError> {
        match self.resolve_opposing(edge_id)? {
            Resolution::Found { id, .. } => Ok(id),
            Resolution::Inconsistent(reason) => {
                Err(GraphTileProviderError::InvalidOpposingEdge { edge_id, reason })
            }
            Resolution::MissingTile(tile_id) => {
                Err(GraphTileProviderError::TileDoesNotExist(tile_id))
            }
        }
    }

    /// Gets the opposing edge, or an invalid handle if it can't be resolved.
    ///
    /// Unlike [`GraphReader::opposing_edge_id`], inconsistent indexes and missing
    /// neighbour tiles are not errors.
    ///
    /// # Errors
    ///
    /// Fails if the tile containing `edge_id` can't be loaded or is malformed,
    /// or if `edge_id` is not in its tile.
    pub fn get_opposing_edge(&self, edge_id: GraphId) -> Result<EdgeHandle, GraphTileProviderError> {
        match self.resolve_opposing(edge_id)? {
            Resolution::Found { id, tile } => Ok(EdgeHandle {
                id,
                tile: Some(tile),
            }),
            Resolution::Inconsistent(reason) => {
                debug!(%edge_id, reason, "Unable to resolve the opposing edge");
                Ok(EdgeHandle::invalid())
            }
            Resolution::MissingTile(tile_id) => {
                debug!(%edge_id, %tile_id, "The opposing edge is in a missing tile");
                Ok(EdgeHandle::invalid())
            }
        }
    }

    /// Drops every cached tile.
    ///
    /// Outstanding [`TileHandle`]s are unaffected.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// The number of tiles currently cached.
    pub fn cached_tile_count(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every tile base ID in the hierarchy, whether or not it exists.
    pub fn tile_ids(&self) -> impl Iterator<Item = GraphId> + use<S> {
        all_tile_ids()
    }

    /// The base IDs of the tiles present in the store, in hierarchy order.
    pub fn existing_tiles(&self) -> impl Iterator<Item = GraphId> + '_ {
        all_tile_ids().filter(|tile_id| self.does_tile_exist(*tile_id))
    }
}

/// A keyed lock.
///
/// This enables more granular locking than over an entire data structure.
pub(crate) struct LockTable<K>(DashMap<K, Arc<Mutex<()>>>);

impl<K: std::hash::Hash + Eq + Clone> LockTable<K> {
    pub fn new() -> Self {
        Self(DashMap::new())
    }

    pub fn lock_for(&self, k: K) -> Arc<Mutex<()>> {
        self.0
            .entry(k)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn remove(&self, k: &K) {
        self.0.remove(k);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::graph_tile::fixtures::{TwoTileGraph, two_tile_graph};
    use crate::graph_tile::{GraphTileBuilder, OwnedGraphTileHandle};

    pub(crate) fn two_tile_store() -> (TwoTileGraph, InMemoryTileStore) {
        let graph = two_tile_graph();
        let store = InMemoryTileStore::from_iter([
            (graph.tile_a, graph.tile_a_bytes.clone()),
            (graph.tile_b, graph.tile_b_bytes.clone()),
        ]);
        (graph, store)
    }

    fn reader<S: TileStore>(store: S) -> GraphReader<S> {
        GraphReader::new(store, GraphReaderConfig::default())
    }

    #[test]
    fn loads_and_caches_tiles() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);

        assert!(reader.does_tile_exist(graph.tile_a));
        assert!(reader.does_tile_exist(graph.tile_a.with_index(2).unwrap()));
        // Probing doesn't load
        assert_eq!(reader.cached_tile_count(), 0);

        let tile = reader.get_tile(graph.tile_a.with_index(1).unwrap()).unwrap();
        assert_eq!(tile.graph_id(), graph.tile_a);
        let again = reader.get_tile(graph.tile_a).unwrap();
        assert!(Arc::ptr_eq(&tile, &again));
        assert_eq!(reader.store().read_count(), 1);

        reader.clear();
        assert_eq!(reader.cached_tile_count(), 0);
        // The handle outlives the cache entry
        assert_eq!(tile.nodes().len(), 3);
        reader.get_tile(graph.tile_a).unwrap();
        assert_eq!(reader.store().read_count(), 2);
    }

    #[test]
    fn load_locks_are_released() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);
        let missing = GraphId::try_from_components(2, graph.tile_b.tile_id() + 1, 0).unwrap();

        reader.get_tile(graph.tile_a).unwrap();
        reader.get_tile(graph.tile_b).unwrap();
        assert!(reader.get_tile(missing).is_err());
        assert_eq!(reader.lock_table.len(), 0);

        reader.clear();
        reader.get_tile(graph.tile_a).unwrap();
        assert_eq!(reader.lock_table.len(), 0);
        assert_eq!(reader.cached_tile_count(), 1);
    }

    #[test]
    fn missing_and_invalid_tiles() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);
        let missing = GraphId::try_from_components(2, graph.tile_b.tile_id() + 1, 0).unwrap();

        assert!(!reader.does_tile_exist(missing));
        assert!(!reader.does_tile_exist(GraphId::INVALID));
        assert!(matches!(
            reader.get_tile(missing),
            Err(GraphTileProviderError::TileDoesNotExist(id)) if id == missing
        ));
        assert!(matches!(
            reader.get_tile(GraphId::INVALID),
            Err(GraphTileProviderError::InvalidGraphId(_))
        ));
    }

    #[test]
    fn malformed_tiles_are_errors() {
        let (graph, mut store) = two_tile_store();
        store.insert(graph.tile_a, vec![1, 2, 3]);
        // Tile B's bytes stored under another tile ID
        let other = GraphId::try_from_components(2, 1, 0).unwrap();
        store.insert(other, graph.tile_b_bytes.clone());
        let reader = reader(store);

        assert!(matches!(
            reader.get_tile(graph.tile_a),
            Err(GraphTileProviderError::MalformedTile { graph_id, .. }) if graph_id == graph.tile_a
        ));
        assert!(matches!(
            reader.get_tile(other),
            Err(GraphTileProviderError::TileIdMismatch { .. })
        ));
    }

    #[test]
    fn bounded_cache_evicts() {
        let (graph, store) = two_tile_store();
        let reader = GraphReader::new(
            store,
            GraphReaderConfig {
                max_cached_tiles: NonZeroUsize::new(1),
            },
        );

        reader.get_tile(graph.tile_a).unwrap();
        reader.get_tile(graph.tile_b).unwrap();
        assert_eq!(reader.cached_tile_count(), 1);
        reader.get_tile(graph.tile_a).unwrap();
        assert_eq!(reader.store().read_count(), 3);
    }

    #[test]
    fn concurrent_loads_read_once() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let tile = reader.get_tile(graph.tile_a).expect("Tile loads");
                    assert_eq!(tile.graph_id(), graph.tile_a);
                });
            }
        });

        assert_eq!(reader.store().read_count(), 1);
    }

    #[test]
    fn opposing_edges_in_same_tile() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);
        let e0 = graph.tile_a.with_index(0).unwrap();
        let e1 = graph.tile_a.with_index(1).unwrap();

        assert_eq!(reader.opposing_edge_id(e0).unwrap(), e1);
        assert_eq!(reader.opposing_edge_id(e1).unwrap(), e0);

        let handle = reader.get_opposing_edge(e0).unwrap();
        assert!(handle.is_valid());
        assert_eq!(handle.address(), e1);
        assert_eq!(handle.edge().unwrap().end_node_id(), e0);
        // Resolving within a tile needs a single read
        assert_eq!(reader.store().read_count(), 1);
    }

    #[test]
    fn opposing_edges_across_tiles() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);
        let e2 = graph.tile_a.with_index(2).unwrap();
        let f0 = graph.tile_b.with_index(0).unwrap();

        let handle = reader.get_opposing_edge(e2).unwrap();
        assert_eq!(handle.address(), f0);
        assert_eq!(handle.tile().unwrap().graph_id(), graph.tile_b);
        assert_eq!(reader.opposing_edge_id(f0).unwrap(), e2);

        // Still works after eviction
        reader.clear();
        assert_eq!(reader.opposing_edge_id(e2).unwrap(), f0);
    }

    #[test]
    fn missing_neighbour_tile() {
        let graph = two_tile_graph();
        let store = InMemoryTileStore::from_iter([(graph.tile_a, graph.tile_a_bytes)]);
        let reader = reader(store);
        let e2 = graph.tile_a.with_index(2).unwrap();

        let handle = reader.get_opposing_edge(e2).unwrap();
        assert!(!handle.is_valid());
        assert_eq!(handle.address(), GraphId::INVALID);
        assert!(matches!(
            reader.opposing_edge_id(e2),
            Err(GraphTileProviderError::TileDoesNotExist(id)) if id == graph.tile_b
        ));
    }

    fn corrupt_tile_a(edit: impl FnOnce(&mut [DirectedEdge])) -> GraphReader<InMemoryTileStore> {
        let (graph, mut store) = two_tile_store();
        let tile = OwnedGraphTileHandle::try_from(graph.tile_a_bytes).unwrap();
        let mut builder = GraphTileBuilder::from(&tile);
        edit(builder.directed_edges_mut());
        store.insert(graph.tile_a, builder.to_bytes());
        reader(store)
    }

    #[test]
    fn corrupted_opposing_index() {
        let graph = two_tile_graph();
        let reader = corrupt_tile_a(|edges| {
            edges[0] = edges[0].with_opposing_edge_index(5).unwrap();
        });
        let e0 = graph.tile_a.with_index(0).unwrap();

        let handle = reader.get_opposing_edge(e0).unwrap();
        assert!(!handle.is_valid());
        assert_eq!(handle.address(), GraphId::INVALID);
        assert!(handle.edge().is_none());
        assert!(handle.tile().is_none());
        assert!(matches!(
            reader.opposing_edge_id(e0),
            Err(GraphTileProviderError::InvalidOpposingEdge { edge_id, .. }) if edge_id == e0
        ));
    }

    #[test]
    fn opposing_edge_must_return_to_start() {
        let graph = two_tile_graph();
        // e1 now points back at n1 instead of n0
        let reader = corrupt_tile_a(|edges| {
            let e1_end = graph.tile_a.with_index(1).unwrap();
            edges[1] = DirectedEdge::new(e1_end, 0, edges[1].edge_use(), 0, 1).unwrap();
        });
        let e0 = graph.tile_a.with_index(0).unwrap();

        assert!(!reader.get_opposing_edge(e0).unwrap().is_valid());
    }

    #[test]
    fn edge_handles() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);
        let e2 = graph.tile_a.with_index(2).unwrap();

        let handle = reader.get_edge(e2).unwrap();
        assert_eq!(handle.address(), e2);
        assert_eq!(handle.edge().unwrap().end_node_id(), graph.tile_b);
        assert!(reader.get_edge(graph.tile_a.with_index(3).unwrap()).is_err());

        let invalid = EdgeHandle::invalid();
        assert!(!invalid.is_valid());
        assert!(invalid.edge().is_none());
    }

    #[test]
    fn existing_tiles_in_hierarchy_order() {
        let (graph, store) = two_tile_store();
        let reader = reader(store);

        let tiles: Vec<_> = reader.existing_tiles().collect();
        assert_eq!(tiles, vec![graph.tile_a, graph.tile_b]);
    }
}
