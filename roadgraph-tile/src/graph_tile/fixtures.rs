//! Small synthetic graphs for tests.

use super::{DirectedEdge, EdgeInfoBuilder, GraphTileBuilder, NameInfo, Use};
use crate::{GraphId, tile_hierarchy};
use geo::{Coord, coord};

/// Two neighbouring level 2 tiles.
///
/// Tile A holds nodes n0, n1, n2 and edges e0 (n0 -> n1), e1 (n1 -> n0), e2 (n2 -> m0).
/// Tile B holds node m0 and edge f0 (m0 -> n2).
/// Way 1001 (e0/e1) has OSM IDs 11, 12, 13; way 1002 (e2/f0) crosses the tile boundary
/// and has OSM IDs 21, 22.
pub(crate) struct TwoTileGraph {
    pub tile_a: GraphId,
    pub tile_b: GraphId,
    pub tile_a_bytes: Vec<u8>,
    pub tile_b_bytes: Vec<u8>,
}

pub(crate) const WAY_1001_SHAPE: [Coord<f64>; 3] = [
    Coord { x: 8.05, y: 47.05 },
    Coord { x: 8.075, y: 47.06 },
    Coord { x: 8.10, y: 47.05 },
];
pub(crate) const WAY_1002_SHAPE: [Coord<f64>; 2] =
    [Coord { x: 8.20, y: 47.10 }, Coord { x: 8.30, y: 47.10 }];

fn edge(end_node: GraphId, edge_info_offset: u32, forward: bool) -> DirectedEdge {
    DirectedEdge::new(end_node, 0, Use::Road, edge_info_offset, 100)
        .expect("Valid edge")
        .with_forward(forward)
}

fn way_1002() -> EdgeInfoBuilder {
    let mut builder = EdgeInfoBuilder::default();
    builder
        .set_way_id(1002)
        .set_shape(WAY_1002_SHAPE)
        .set_osmids([21, 22]);
    builder
}

pub(crate) fn two_tile_graph() -> TwoTileGraph {
    let tile_index = tile_hierarchy::tile_index_for(2, coord! { x: 8.0, y: 47.0 })
        .expect("Coordinate is in range");
    let tile_a = GraphId::try_from_components(2, tile_index, 0).expect("Valid tile");
    let tile_b = GraphId::try_from_components(2, tile_index + 1, 0).expect("Valid tile");
    let id = |tile: GraphId, index: u64| tile.with_index(index).expect("Valid index");

    let mut a = GraphTileBuilder::new(tile_a).expect("Valid tile");
    let name_offset = a.add_text("Main Street");
    let mut way_1001 = EdgeInfoBuilder::default();
    way_1001
        .set_way_id(1001)
        .set_mean_elevation(430.0)
        .set_speed_limit(50)
        .add_name_info(NameInfo::new(name_offset, false).expect("Small offset"))
        .set_shape(WAY_1001_SHAPE)
        .set_osmids([11, 12, 13]);
    let way_1001_offset = a.add_edge_info(&way_1001).expect("Valid edge info");
    let way_1002_offset = a.add_edge_info(&way_1002()).expect("Valid edge info");

    a.add_node(WAY_1001_SHAPE[0], [edge(id(tile_a, 1), way_1001_offset, true)])
        .expect("Valid node");
    a.add_node(WAY_1001_SHAPE[2], [edge(id(tile_a, 0), way_1001_offset, false)])
        .expect("Valid node");
    a.add_node(WAY_1002_SHAPE[0], [edge(id(tile_b, 0), way_1002_offset, true)])
        .expect("Valid node");

    let mut b = GraphTileBuilder::new(tile_b).expect("Valid tile");
    let way_1002_offset = b.add_edge_info(&way_1002()).expect("Valid edge info");
    b.add_node(WAY_1002_SHAPE[1], [edge(id(tile_a, 2), way_1002_offset, false)])
        .expect("Valid node");

    TwoTileGraph {
        tile_a,
        tile_b,
        tile_a_bytes: a.to_bytes(),
        tile_b_bytes: b.to_bytes(),
    }
}

/// A single level 2 tile holding `ways` isolated two-node ways.
///
/// Way `i` connects nodes `2i` and `2i + 1` with edges `2i` and `2i + 1`.
/// Uses are taken from `uses` (cycling), and every `shortcut_every`-th way is a shortcut.
pub(crate) fn isolated_ways_tile(
    ways: usize,
    uses: &[Use],
    shortcut_every: Option<usize>,
) -> (GraphId, Vec<u8>) {
    let tile_id = GraphId::try_from_components(2, 789_872, 0).expect("Valid tile");
    let mut builder = GraphTileBuilder::new(tile_id).expect("Valid tile");
    let sw = builder.sw_corner();

    for way in 0..ways {
        let mut edge_info = EdgeInfoBuilder::default();
        let first_osmid = 10 * way as u64;
        edge_info
            .set_way_id(way as u64)
            .set_osmids([first_osmid, first_osmid + 1]);
        let offset = builder.add_edge_info(&edge_info).expect("Valid edge info");

        let edge_use = uses.get(way % uses.len().max(1)).copied().unwrap_or(Use::Road);
        let shortcut = shortcut_every.is_some_and(|n| way % n == 0);
        let from = tile_id.with_index(2 * way as u64).expect("Valid index");
        let to = tile_id.with_index(2 * way as u64 + 1).expect("Valid index");
        let make_edge = |end_node: GraphId, forward: bool| {
            DirectedEdge::new(end_node, 0, edge_use, offset, 10)
                .expect("Valid edge")
                .with_shortcut(shortcut)
                .with_forward(forward)
        };

        // Spread nodes over a grid so they stay well inside the tile
        let position = coord! {
            x: sw.x + 1e-5 * (way % 10_000) as f64,
            y: sw.y + 1e-5 * (way / 10_000) as f64,
        };
        builder
            .add_node(position, [make_edge(to, true)])
            .expect("Valid node");
        builder
            .add_node(position, [make_edge(from, false)])
            .expect("Valid node");
    }

    (tile_id, builder.to_bytes())
}
