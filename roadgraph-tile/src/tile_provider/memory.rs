use super::{GraphTileProviderError, TileStore};
use crate::GraphId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A tile store holding tiles in memory.
///
/// Reads are counted, which is mostly useful for testing cache behavior.
#[derive(Debug, Default)]
pub struct InMemoryTileStore {
    tiles: HashMap<GraphId, Vec<u8>>,
    reads: AtomicUsize,
}

impl InMemoryTileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the tile containing `graph_id`.
    pub fn insert(&mut self, graph_id: GraphId, bytes: Vec<u8>) {
        self.tiles.insert(graph_id.tile_base_id(), bytes);
    }

    /// The number of successful reads so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl FromIterator<(GraphId, Vec<u8>)> for InMemoryTileStore {
    fn from_iter<T: IntoIterator<Item = (GraphId, Vec<u8>)>>(iter: T) -> Self {
        let mut store = Self::new();
        for (graph_id, bytes) in iter {
            store.insert(graph_id, bytes);
        }
        store
    }
}

impl TileStore for InMemoryTileStore {
    fn exists(&self, tile_id: GraphId) -> bool {
        self.tiles.contains_key(&tile_id.tile_base_id())
    }

    fn read(&self, tile_id: GraphId) -> Result<Vec<u8>, GraphTileProviderError> {
        let tile_id = tile_id.tile_base_id();
        let bytes = self
            .tiles
            .get(&tile_id)
            .ok_or(GraphTileProviderError::TileDoesNotExist(tile_id))?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(bytes.clone())
    }
}
