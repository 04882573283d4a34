use crate::GraphId;
use crate::graph_tile::{DirectedEdge, GraphTile};
use crate::tile_hierarchy::{self, TRANSIT_LEVEL};

/// Every tile base ID in the hierarchy, level by level, in ascending tile ID order.
///
/// The transit level comes last.
pub fn all_tile_ids() -> impl Iterator<Item = GraphId> {
    tile_hierarchy::levels()
        .iter()
        .chain(std::iter::once(&TRANSIT_LEVEL))
        .flat_map(|level| {
            (0..level.tiling_system.tile_count())
                .map(move |tile_id| GraphId::from_components(level.level, tile_id, 0))
        })
}

/// The directed edges of a tile, along with their IDs.
pub fn edges<T: GraphTile>(tile: &T) -> impl Iterator<Item = (GraphId, &DirectedEdge)> {
    let tile_id = tile.graph_id();
    tile.directed_edges()
        .iter()
        .enumerate()
        .filter_map(move |(index, edge)| {
            tile_id
                .with_index(index as u64)
                .ok()
                .map(|edge_id| (edge_id, edge))
        })
}
