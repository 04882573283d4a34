use super::{GraphTileProviderError, TileStore};
use crate::GraphId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The file extension of tiles in a tile directory.
pub const TILE_FILE_EXTENSION: &str = "gph";

/// A tile store backed by a directory tree with one file per tile
/// (ex: `2/000/789/872.gph`).
#[derive(Clone, Debug)]
pub struct DirectoryTileStore {
    base_directory: PathBuf,
}

impl DirectoryTileStore {
    pub fn new<P: Into<PathBuf>>(base_directory: P) -> Self {
        Self {
            base_directory: base_directory.into(),
        }
    }

    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// The full path of the file for the tile containing `graph_id`.
    ///
    /// # Errors
    ///
    /// Fails if the graph ID's level is not part of the hierarchy.
    pub fn tile_path(&self, graph_id: GraphId) -> Result<PathBuf, GraphTileProviderError> {
        let relative = graph_id.tile_base_id().file_path(TILE_FILE_EXTENSION)?;
        Ok(self.base_directory.join(relative))
    }

    /// Writes a tile, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or an invalid graph ID.
    pub fn write_tile(&self, graph_id: GraphId, bytes: &[u8]) -> Result<(), GraphTileProviderError> {
        let path = self.tile_path(graph_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl TileStore for DirectoryTileStore {
    fn exists(&self, tile_id: GraphId) -> bool {
        self.tile_path(tile_id).is_ok_and(|path| path.is_file())
    }

    fn read(&self, tile_id: GraphId) -> Result<Vec<u8>, GraphTileProviderError> {
        let path = self.tile_path(tile_id)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GraphTileProviderError::TileDoesNotExist(tile_id.tile_base_id()),
            _ => GraphTileProviderError::IoError(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_tile::GraphTile;
    use crate::graph_tile::fixtures::{TwoTileGraph, two_tile_graph};
    use crate::tile_provider::{GraphReader, GraphReaderConfig};

    #[test]
    fn write_then_read() {
        let TwoTileGraph {
            tile_a,
            tile_b,
            tile_a_bytes,
            tile_b_bytes,
        } = two_tile_graph();
        let dir = tempfile::tempdir().expect("Unable to create temp dir");
        let store = DirectoryTileStore::new(dir.path());
        store.write_tile(tile_a, &tile_a_bytes).unwrap();
        store.write_tile(tile_b, &tile_b_bytes).unwrap();

        assert!(dir.path().join("2/000/789/872.gph").is_file());
        assert!(store.exists(tile_a.with_index(2).unwrap()));
        assert_eq!(store.read(tile_b).unwrap(), tile_b_bytes);

        let reader = GraphReader::new(store, GraphReaderConfig::default());
        let e2 = tile_a.with_index(2).unwrap();
        assert_eq!(reader.opposing_edge_id(e2).unwrap(), tile_b);
        assert_eq!(reader.get_tile(tile_b).unwrap().nodes().len(), 1);
    }

    #[test]
    fn missing_files() {
        let dir = tempfile::tempdir().expect("Unable to create temp dir");
        let store = DirectoryTileStore::new(dir.path());
        let tile_id = GraphId::try_from_components(0, 3015, 0).unwrap();

        assert!(!store.exists(tile_id));
        assert!(matches!(
            store.read(tile_id),
            Err(GraphTileProviderError::TileDoesNotExist(id)) if id == tile_id
        ));
    }
}
