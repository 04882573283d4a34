//! # Tile hierarchy
//!
//! The graph is split into several levels, each with its own regular tiling of the globe.
//! Higher-importance roads live on the coarser levels.
//! This configuration is static for the lifetime of the process.

use geo::{Coord, Rect, coord};

/// Road classification, ordered from most to least important.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RoadClass {
    Motorway = 0,
    Trunk = 1,
    Primary = 2,
    Secondary = 3,
    Tertiary = 4,
    Unclassified = 5,
    Residential = 6,
    ServiceOther = 7,
}

/// A regular grid of square tiles over a bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TilingSystem {
    /// The south-west corner of the grid.
    pub origin: Coord<f64>,
    /// Tile edge length in degrees.
    pub tile_size: f64,
    pub n_rows: u32,
    pub n_cols: u32,
    /// Number of subdivisions (bins) along each tile axis.
    pub n_subdivisions: u8,
}

impl TilingSystem {
    const fn global(tile_size: f64, n_rows: u32, n_cols: u32) -> Self {
        Self {
            origin: Coord { x: -180.0, y: -90.0 },
            tile_size,
            n_rows,
            n_cols,
            n_subdivisions: 5,
        }
    }

    /// The total number of tiles in the grid.
    #[inline]
    #[must_use]
    pub const fn tile_count(&self) -> u32 {
        self.n_rows * self.n_cols
    }

    /// The area covered by the whole grid.
    #[must_use]
    pub fn bounding_box(&self) -> Rect<f64> {
        Rect::new(
            self.origin,
            coord! {
                x: self.origin.x + f64::from(self.n_cols) * self.tile_size,
                y: self.origin.y + f64::from(self.n_rows) * self.tile_size,
            },
        )
    }

    /// The ID of the tile containing the coordinate (x = longitude, y = latitude).
    ///
    /// Points on the north/east boundary of the grid belong to the last row/column.
    /// Returns `None` for coordinates outside the grid or non-finite values.
    #[must_use]
    pub fn tile_index_for(&self, coord: Coord<f64>) -> Option<u32> {
        let bbox = self.bounding_box();
        if !(coord.x >= bbox.min().x
            && coord.x <= bbox.max().x
            && coord.y >= bbox.min().y
            && coord.y <= bbox.max().y)
        {
            return None;
        }

        // Range-checked above, so the casts can't overflow
        let col = (((coord.x - self.origin.x) / self.tile_size).floor() as u32).min(self.n_cols - 1);
        let row = (((coord.y - self.origin.y) / self.tile_size).floor() as u32).min(self.n_rows - 1);

        Some(row * self.n_cols + col)
    }

    /// The south-west corner of a tile.
    #[must_use]
    pub fn sw_corner(&self, tile_id: u32) -> Option<Coord<f64>> {
        if tile_id >= self.tile_count() {
            return None;
        }

        let row = tile_id / self.n_cols;
        let col = tile_id % self.n_cols;
        Some(coord! {
            x: self.origin.x + f64::from(col) * self.tile_size,
            y: self.origin.y + f64::from(row) * self.tile_size,
        })
    }

    /// The bounding box of a tile.
    #[must_use]
    pub fn tile_bbox(&self, tile_id: u32) -> Option<Rect<f64>> {
        let sw = self.sw_corner(tile_id)?;
        Some(Rect::new(
            sw,
            coord! { x: sw.x + self.tile_size, y: sw.y + self.tile_size },
        ))
    }
}

/// One level of the tile hierarchy.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TileLevel {
    pub level: u8,
    pub name: &'static str,
    /// The least important road class stored at this level.
    pub minimum_road_class: RoadClass,
    pub tiling_system: TilingSystem,
}

/// The road levels, ordered from coarsest (0) to finest.
pub static STANDARD_LEVELS: [TileLevel; 3] = [
    TileLevel {
        level: 0,
        name: "highway",
        minimum_road_class: RoadClass::Primary,
        tiling_system: TilingSystem::global(4.0, 45, 90),
    },
    TileLevel {
        level: 1,
        name: "arterial",
        minimum_road_class: RoadClass::Tertiary,
        tiling_system: TilingSystem::global(1.0, 180, 360),
    },
    TileLevel {
        level: 2,
        name: "local",
        minimum_road_class: RoadClass::ServiceOther,
        tiling_system: TilingSystem::global(0.25, 720, 1440),
    },
];

/// The transit level, which shares the local tiling.
pub static TRANSIT_LEVEL: TileLevel = TileLevel {
    level: 3,
    name: "transit",
    minimum_road_class: RoadClass::ServiceOther,
    tiling_system: TilingSystem::global(0.25, 720, 1440),
};

/// The highest level number that a [`GraphId`](crate::GraphId) may reference.
pub const MAX_LEVEL: u8 = 3;

/// The road levels, ordered by level number.
#[inline]
#[must_use]
pub fn levels() -> &'static [TileLevel] {
    &STANDARD_LEVELS
}

/// Looks up a level (including the transit level) by number.
#[must_use]
pub fn level(level: u8) -> Option<&'static TileLevel> {
    STANDARD_LEVELS
        .get(usize::from(level))
        .or_else(|| (level == TRANSIT_LEVEL.level).then_some(&TRANSIT_LEVEL))
}

/// The number of tiles at a level.
#[must_use]
pub fn tile_count(level_number: u8) -> Option<u32> {
    level(level_number).map(|level| level.tiling_system.tile_count())
}

/// The ID of the tile containing a coordinate at the given level.
#[must_use]
pub fn tile_index_for(level_number: u8, coord: Coord<f64>) -> Option<u32> {
    level(level_number)?.tiling_system.tile_index_for(coord)
}

/// The bounding box of a tile at the given level.
#[must_use]
pub fn tile_bbox(level_number: u8, tile_id: u32) -> Option<Rect<f64>> {
    level(level_number)?.tiling_system.tile_bbox(tile_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        let levels = levels();
        assert_eq!(levels.len(), 3);
        for (i, level) in levels.iter().enumerate() {
            assert_eq!(usize::from(level.level), i);
        }
        assert!(levels.windows(2).all(|w| {
            w[0].minimum_road_class <= w[1].minimum_road_class
                && w[0].tiling_system.tile_size > w[1].tiling_system.tile_size
        }));
    }

    #[test]
    fn tile_counts() {
        assert_eq!(tile_count(0), Some(4050));
        assert_eq!(tile_count(1), Some(64_800));
        assert_eq!(tile_count(2), Some(1_036_800));
        assert_eq!(tile_count(3), Some(1_036_800));
        assert_eq!(tile_count(4), None);
    }

    #[test]
    fn tile_index_lookup() {
        // Andorra la Vella
        let coord = coord! { x: 1.5218, y: 42.5063 };
        assert_eq!(tile_index_for(0, coord), Some(3015));
        assert_eq!(tile_index_for(2, coord), Some(763_926));

        // Corners
        assert_eq!(tile_index_for(0, coord! { x: -180.0, y: -90.0 }), Some(0));
        assert_eq!(tile_index_for(0, coord! { x: 180.0, y: 90.0 }), Some(4049));

        // Out of range
        assert_eq!(tile_index_for(0, coord! { x: 180.1, y: 0.0 }), None);
        assert_eq!(tile_index_for(0, coord! { x: f64::NAN, y: 0.0 }), None);
    }

    #[test]
    fn tile_bbox_contains_its_points() {
        let coord = coord! { x: 1.5218, y: 42.5063 };
        let tile_id = tile_index_for(2, coord).unwrap();
        let bbox = tile_bbox(2, tile_id).unwrap();
        assert!(bbox.min().x <= coord.x && coord.x < bbox.max().x);
        assert!(bbox.min().y <= coord.y && coord.y < bbox.max().y);
        assert!((bbox.width() - 0.25).abs() < 1e-12);

        assert_eq!(tile_bbox(0, 4050), None);
    }
}
