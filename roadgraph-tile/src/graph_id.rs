use crate::tile_hierarchy;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

const LEVEL_BITS: u64 = 3;
const TILE_ID_BITS: u64 = 22;
const INDEX_BITS: u64 = 21;

const TILE_ID_SHIFT: u64 = LEVEL_BITS;
const INDEX_SHIFT: u64 = LEVEL_BITS + TILE_ID_BITS;

const LEVEL_MASK: u64 = (1 << LEVEL_BITS) - 1;
const TILE_ID_MASK: u64 = (1 << TILE_ID_BITS) - 1;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// The largest tile ID representable at any level.
pub const MAX_TILE_ID: u32 = TILE_ID_MASK as u32;
/// The largest feature index representable within a tile.
pub const MAX_INDEX: u64 = INDEX_MASK;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidGraphIdError {
    #[error("Level {0} is not part of the tile hierarchy.")]
    Level(u8),
    #[error("Tile ID {0} is larger than the maximum supported value.")]
    TileId(u32),
    #[error("Index {0} is larger than the maximum supported value.")]
    Index(u64),
    #[error("The raw value {0:#x} is not a valid graph ID.")]
    Value(u64),
}

/// An identifier of a node or an edge within the tiled, hierarchical graph.
///
/// The value packs three components into 46 bits:
///
/// | bits   | component                            |
/// |--------|--------------------------------------|
/// | 0..3   | hierarchy level                      |
/// | 3..25  | tile ID within the level             |
/// | 25..46 | feature index (node or edge) in tile |
///
/// Equality, hashing, and ordering all operate on the packed value.
/// A *tile base ID* has a zero index and names the tile itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct GraphId(u64);

impl GraphId {
    /// The sentinel for "no graph ID".
    ///
    /// All 46 bits are set, so no real level/tile/index combination can produce it.
    pub const INVALID: GraphId = GraphId((1 << (INDEX_SHIFT + INDEX_BITS)) - 1);

    /// Creates a graph ID from its components.
    ///
    /// # Errors
    ///
    /// Fails if the level is not part of the hierarchy,
    /// or if the tile ID or index do not fit in their bit ranges.
    pub const fn try_from_components(
        level: u8,
        tile_id: u32,
        index: u64,
    ) -> Result<Self, InvalidGraphIdError> {
        if level > tile_hierarchy::MAX_LEVEL {
            Err(InvalidGraphIdError::Level(level))
        } else if tile_id > MAX_TILE_ID {
            Err(InvalidGraphIdError::TileId(tile_id))
        } else if index > MAX_INDEX {
            Err(InvalidGraphIdError::Index(index))
        } else {
            Ok(Self(
                (level as u64) | ((tile_id as u64) << TILE_ID_SHIFT) | (index << INDEX_SHIFT),
            ))
        }
    }

    /// Packs the components into a graph ID,
    /// returning [`GraphId::INVALID`] if they are out of range.
    #[must_use]
    pub const fn from_components(level: u8, tile_id: u32, index: u64) -> Self {
        match Self::try_from_components(level, tile_id, index) {
            Ok(id) => id,
            Err(_) => Self::INVALID,
        }
    }

    /// Interprets a raw packed value as a graph ID.
    ///
    /// # Errors
    ///
    /// Fails for the invalid sentinel, values with bits set above bit 46,
    /// and values referring to an unknown hierarchy level.
    pub const fn try_from_id(value: u64) -> Result<Self, InvalidGraphIdError> {
        if value >= Self::INVALID.0 {
            return Err(InvalidGraphIdError::Value(value));
        }

        let level = (value & LEVEL_MASK) as u8;
        if level > tile_hierarchy::MAX_LEVEL {
            Err(InvalidGraphIdError::Level(level))
        } else {
            Ok(Self(value))
        }
    }

    /// The raw packed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The hierarchy level.
    #[inline]
    #[must_use]
    pub const fn level(self) -> u8 {
        (self.0 & LEVEL_MASK) as u8
    }

    /// The tile ID within the hierarchy level.
    #[inline]
    #[must_use]
    pub const fn tile_id(self) -> u32 {
        ((self.0 >> TILE_ID_SHIFT) & TILE_ID_MASK) as u32
    }

    /// The index of the node or edge within its tile.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u64 {
        (self.0 >> INDEX_SHIFT) & INDEX_MASK
    }

    /// The ID of the tile containing this feature (the index is cleared).
    ///
    /// This is the key used for tile storage and caching.
    #[inline]
    #[must_use]
    pub const fn tile_base_id(self) -> GraphId {
        Self(self.0 & ((1 << INDEX_SHIFT) - 1))
    }

    /// Returns a graph ID in the same tile with a different feature index.
    ///
    /// # Errors
    ///
    /// Fails if the index does not fit in the index bit range.
    pub const fn with_index(self, index: u64) -> Result<GraphId, InvalidGraphIdError> {
        if index > MAX_INDEX {
            Err(InvalidGraphIdError::Index(index))
        } else {
            Ok(Self(self.tile_base_id().0 | (index << INDEX_SHIFT)))
        }
    }

    /// Structural validity.
    ///
    /// A `true` result means the ID is not the sentinel and its level is known.
    /// Whether the index actually exists can only be checked against the tile.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 < Self::INVALID.0 && self.level() <= tile_hierarchy::MAX_LEVEL
    }

    /// The path of the tile file containing this ID, relative to the tile directory.
    ///
    /// The tile ID is zero-padded to a multiple of three digits
    /// (enough for the largest tile ID at the level) and split into directories,
    /// e.g. `2/000/762/485.gph`.
    ///
    /// # Errors
    ///
    /// Fails if the level is not part of the hierarchy.
    pub fn file_path(self, extension: &str) -> Result<PathBuf, InvalidGraphIdError> {
        let level = tile_hierarchy::level(self.level())
            .ok_or(InvalidGraphIdError::Level(self.level()))?;
        let max_tile_id = level.tiling_system.tile_count().saturating_sub(1);
        let digits = max_tile_id.max(1).ilog10() as usize + 1;
        let padded_width = digits.div_ceil(3) * 3;
        let padded = format!("{:0width$}", self.tile_id(), width = padded_width);

        let mut path = PathBuf::from(self.level().to_string());
        let groups: Vec<&str> = padded
            .as_bytes()
            .chunks(3)
            // Chunks of ASCII digits are always valid UTF-8
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        if let Some((last, dirs)) = groups.split_last() {
            for dir in dirs {
                path.push(dir);
            }
            path.push(format!("{last}.{extension}"));
        }

        Ok(path)
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<GraphId> for u64 {
    fn from(value: GraphId) -> Self {
        value.0
    }
}

impl TryFrom<u64> for GraphId {
    type Error = InvalidGraphIdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::try_from_id(value)
    }
}

impl Display for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == Self::INVALID {
            write!(f, "invalid")
        } else {
            write!(f, "{}/{}/{}", self.level(), self.tile_id(), self.index())
        }
    }
}

impl Debug for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == Self::INVALID {
            write!(f, "GraphId(INVALID)")
        } else {
            f.debug_struct("GraphId")
                .field("level", &self.level())
                .field("tile_id", &self.tile_id())
                .field("index", &self.index())
                .finish()
        }
    }
}
