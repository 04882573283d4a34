use crate::GraphId;
use geo::{Coord, coord};
use zerocopy::{F64, LE, U32, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The tile format version written by this crate.
///
/// Tiles with any other version are rejected at decode time.
pub const TILE_FORMAT_VERSION: u32 = 1;

/// Summary information about the graph tile.
///
/// This contains metadata like the tile version, the tile's SW corner,
/// and the sizes of each section that follows the header.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct GraphTileHeader {
    graph_id: U64<LE>,
    sw_lon: F64<LE>,
    sw_lat: F64<LE>,
    version: U32<LE>,
    node_count: U32<LE>,
    directed_edge_count: U32<LE>,
    edge_info_size: U32<LE>,
    text_size: U32<LE>,
    reserved: U32<LE>,
}

impl GraphTileHeader {
    pub(crate) fn new(
        graph_id: GraphId,
        sw_corner: Coord<f64>,
        node_count: u32,
        directed_edge_count: u32,
        edge_info_size: u32,
        text_size: u32,
    ) -> Self {
        Self {
            graph_id: U64::new(graph_id.value()),
            sw_lon: F64::new(sw_corner.x),
            sw_lat: F64::new(sw_corner.y),
            version: U32::new(TILE_FORMAT_VERSION),
            node_count: U32::new(node_count),
            directed_edge_count: U32::new(directed_edge_count),
            edge_info_size: U32::new(edge_info_size),
            text_size: U32::new(text_size),
            reserved: U32::ZERO,
        }
    }

    /// The full Graph ID of this tile.
    ///
    /// Tile views validate this at decode time,
    /// so the sentinel is only ever returned for headers read by hand.
    #[inline]
    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        GraphId::try_from_id(self.raw_graph_id()).unwrap_or(GraphId::INVALID)
    }

    #[inline]
    pub(crate) fn raw_graph_id(&self) -> u64 {
        self.graph_id.get()
    }

    /// The coordinate of the south-west corner of the tile.
    ///
    /// Node positions are stored relative to this.
    #[inline]
    #[must_use]
    pub fn sw_corner(&self) -> Coord<f64> {
        coord! {
            x: self.sw_lon.get(),
            y: self.sw_lat.get(),
        }
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.get()
    }

    /// The number of nodes in this tile.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.node_count.get()
    }

    /// The number of directed edges in this tile.
    #[inline]
    #[must_use]
    pub fn directed_edge_count(&self) -> u32 {
        self.directed_edge_count.get()
    }

    /// The size of the edge info blob in bytes (always a multiple of 8).
    #[inline]
    #[must_use]
    pub fn edge_info_size(&self) -> u32 {
        self.edge_info_size.get()
    }

    /// The size of the text blob in bytes.
    #[inline]
    #[must_use]
    pub fn text_size(&self) -> u32 {
        self.text_size.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size() {
        assert_eq!(size_of::<GraphTileHeader>(), 48);
    }

    #[test]
    fn accessors() {
        let graph_id = GraphId::try_from_components(2, 763_926, 0).unwrap();
        let header = GraphTileHeader::new(graph_id, coord! { x: 1.5, y: 42.5 }, 3, 7, 64, 12);

        assert_eq!(header.graph_id(), graph_id);
        assert_eq!(header.sw_corner(), coord! { x: 1.5, y: 42.5 });
        assert_eq!(header.version(), TILE_FORMAT_VERSION);
        assert_eq!(header.node_count(), 3);
        assert_eq!(header.directed_edge_count(), 7);
        assert_eq!(header.edge_info_size(), 64);
        assert_eq!(header.text_size(), 12);
    }
}
