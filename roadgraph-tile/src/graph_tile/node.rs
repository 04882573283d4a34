use super::GraphTileBuildError;
use bitfield_struct::bitfield;
use geo::{Coord, coord};
use zerocopy::{LE, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Node positions are stored in units of 1e-7 degrees.
const NODE_COORDINATE_PRECISION: f64 = 1e7;

const OFFSET_BITS: u32 = 26;
const EDGE_INDEX_BITS: u32 = 21;
const EDGE_COUNT_BITS: u32 = 7;

#[bitfield(u64)]
struct PositionBits {
    #[bits(26)]
    lat_offset: u32,
    #[bits(26)]
    lon_offset: u32,
    #[bits(12)]
    __: u16,
}

#[bitfield(u64)]
struct EdgeRangeBits {
    #[bits(21)]
    edge_index: u32,
    #[bits(7)]
    edge_count: u8,
    #[bits(36)]
    __: u64,
}

/// A node in the graph.
///
/// The position is stored as an offset from the tile's SW corner,
/// and the outbound edges are a contiguous range of the tile's directed edges.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct NodeInfo {
    position: U64<LE>,
    edges: U64<LE>,
}

fn check_bits(field: &'static str, value: u64, bits: u32) -> Result<u64, GraphTileBuildError> {
    if value >> bits == 0 {
        Ok(value)
    } else {
        Err(GraphTileBuildError::FieldOverflow { field, value })
    }
}

impl NodeInfo {
    /// Creates a node at `coordinate` in the tile with the given SW corner.
    ///
    /// # Errors
    ///
    /// Fails if the coordinate is south or west of the corner,
    /// too far from it to encode, or if the edge range does not fit.
    pub fn new(
        sw_corner: Coord<f64>,
        coordinate: Coord<f64>,
        edge_index: u32,
        edge_count: u32,
    ) -> Result<Self, GraphTileBuildError> {
        let outside = || GraphTileBuildError::CoordinateOutsideTile {
            x: coordinate.x,
            y: coordinate.y,
        };
        let lat = ((coordinate.y - sw_corner.y) * NODE_COORDINATE_PRECISION).round();
        let lon = ((coordinate.x - sw_corner.x) * NODE_COORDINATE_PRECISION).round();
        if !(lat >= 0.0 && lon >= 0.0) {
            return Err(outside());
        }
        // Saturating casts; anything past the field width is rejected below
        let lat = check_bits("lat_offset", lat as u64, OFFSET_BITS).map_err(|_| outside())?;
        let lon = check_bits("lon_offset", lon as u64, OFFSET_BITS).map_err(|_| outside())?;
        let edge_index = check_bits("edge_index", edge_index.into(), EDGE_INDEX_BITS)?;
        let edge_count = check_bits("edge_count", edge_count.into(), EDGE_COUNT_BITS)?;

        let position = PositionBits::new()
            .with_lat_offset(lat as u32)
            .with_lon_offset(lon as u32);
        let edges = EdgeRangeBits::new()
            .with_edge_index(edge_index as u32)
            .with_edge_count(edge_count as u8);

        Ok(Self {
            position: U64::new(position.into_bits()),
            edges: U64::new(edges.into_bits()),
        })
    }

    #[inline]
    fn position_bits(&self) -> PositionBits {
        PositionBits::from_bits(self.position.get())
    }

    #[inline]
    fn edge_bits(&self) -> EdgeRangeBits {
        EdgeRangeBits::from_bits(self.edges.get())
    }

    /// The absolute coordinate of the node, given its tile's SW corner.
    #[must_use]
    pub fn coordinate(&self, sw_corner: Coord<f64>) -> Coord<f64> {
        let bits = self.position_bits();
        coord! {
            x: sw_corner.x + f64::from(bits.lon_offset()) / NODE_COORDINATE_PRECISION,
            y: sw_corner.y + f64::from(bits.lat_offset()) / NODE_COORDINATE_PRECISION,
        }
    }

    /// The index within the tile of the first outbound directed edge.
    #[inline]
    #[must_use]
    pub fn edge_index(&self) -> u32 {
        self.edge_bits().edge_index()
    }

    /// The number of outbound directed edges.
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> u32 {
        self.edge_bits().edge_count().into()
    }
}

impl std::fmt::Debug for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let position = self.position_bits();
        f.debug_struct("NodeInfo")
            .field("lat_offset", &position.lat_offset())
            .field("lon_offset", &position.lon_offset())
            .field("edge_index", &self.edge_index())
            .field("edge_count", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SW: Coord<f64> = Coord { x: 8.0, y: 47.0 };

    #[test]
    fn node_size() {
        assert_eq!(size_of::<NodeInfo>(), 16);
    }

    #[test]
    fn position_round_trip() {
        let node = NodeInfo::new(SW, coord! { x: 8.123_456_7, y: 47.2 }, 12, 3).unwrap();
        let coordinate = node.coordinate(SW);
        assert!((coordinate.x - 8.123_456_7).abs() < 1e-9);
        assert!((coordinate.y - 47.2).abs() < 1e-9);
        assert_eq!(node.edge_index(), 12);
        assert_eq!(node.edge_count(), 3);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(NodeInfo::new(SW, coord! { x: 7.9, y: 47.0 }, 0, 0).is_err());
        assert!(NodeInfo::new(SW, coord! { x: 15.0, y: 47.0 }, 0, 0).is_err());
        assert!(NodeInfo::new(SW, coord! { x: f64::NAN, y: 47.0 }, 0, 0).is_err());
        assert!(NodeInfo::new(SW, SW, 1 << 21, 0).is_err());
        assert!(NodeInfo::new(SW, SW, 0, 128).is_err());
        assert!(NodeInfo::new(SW, SW, (1 << 21) - 1, 127).is_ok());
    }
}
