use super::GraphTileDecodingError;
use crate::shape_codec::{self, ShapeDecoder};
use bitfield_struct::bitfield;
use bytes::Buf;
use bytes_varint::VarIntSupport;
use geo::Coord;
use std::fmt::{self, Write};
use zerocopy::{FromBytes, LE, U32, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Edge info records start at (and are padded to) multiples of this many bytes.
pub const EDGE_INFO_ALIGNMENT: usize = 8;

/// The lowest representable mean elevation, in meters.
pub const MIN_ELEVATION: f32 = -500.0;

/// The width of one elevation bin, in meters.
pub const ELEVATION_BIN_SIZE: f32 = 2.0;

pub(crate) const MAX_ELEVATION_BIN: u16 = (1 << 12) - 1;
pub(crate) const MAX_NAME_COUNT: usize = (1 << 4) - 1;
pub(crate) const WAY_ID_LOW_BITS: u32 = 48;

#[bitfield(u64)]
pub(crate) struct WayBits {
    #[bits(48)]
    pub(crate) way_id: u64,
    #[bits(12)]
    pub(crate) mean_elevation: u16,
    #[bits(4)]
    pub(crate) bike_network: u8,
}

#[bitfield(u64)]
pub(crate) struct LayoutBits {
    pub(crate) speed_limit: u8,
    #[bits(4)]
    pub(crate) name_count: u8,
    #[bits(16)]
    pub(crate) encoded_shape_size: u16,
    #[bits(16)]
    pub(crate) osmids_size: u16,
    #[bits(2)]
    pub(crate) extended_way_id_size: u8,
    pub(crate) has_osmids: bool,
    #[bits(17)]
    __: u32,
}

/// The fixed-size prefix of an edge info record.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy)]
#[repr(C)]
pub(crate) struct EdgeInfoHeader {
    pub(crate) way: U64<LE>,
    pub(crate) layout: U64<LE>,
}

#[bitfield(u32)]
struct NameInfoBits {
    #[bits(24)]
    name_offset: u32,
    #[bits(4)]
    additional_fields: u8,
    is_route_number: bool,
    tagged: bool,
    #[bits(2)]
    __: u8,
}

/// A reference to a name in the tile's text blob.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct NameInfo(U32<LE>);

impl NameInfo {
    /// Creates a name info entry pointing at `name_offset` in the text blob.
    ///
    /// Returns `None` if the offset does not fit in 24 bits.
    #[must_use]
    pub fn new(name_offset: u32, is_route_number: bool) -> Option<Self> {
        (name_offset >> 24 == 0).then(|| {
            let bits = NameInfoBits::new()
                .with_name_offset(name_offset)
                .with_is_route_number(is_route_number);
            Self(U32::new(bits.into_bits()))
        })
    }

    #[inline]
    fn bits(self) -> NameInfoBits {
        NameInfoBits::from_bits(self.0.get())
    }

    /// The byte offset of the NUL-terminated name in the text blob.
    #[inline]
    #[must_use]
    pub fn name_offset(self) -> u32 {
        self.bits().name_offset()
    }

    /// The number of extra text entries that follow the name (0 for plain names).
    #[inline]
    #[must_use]
    pub fn additional_fields(self) -> u8 {
        self.bits().additional_fields()
    }

    /// Is the name a route number (ex: "A1") rather than a street name?
    #[inline]
    #[must_use]
    pub fn is_route_number(self) -> bool {
        self.bits().is_route_number()
    }

    /// Is this a tagged value (ex: a pronunciation) rather than a name?
    #[inline]
    #[must_use]
    pub fn is_tagged(self) -> bool {
        self.bits().tagged()
    }
}

impl fmt::Debug for NameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameInfo")
            .field("name_offset", &self.name_offset())
            .field("additional_fields", &self.additional_fields())
            .field("is_route_number", &self.is_route_number())
            .field("is_tagged", &self.is_tagged())
            .finish()
    }
}

/// Per-way data shared by both directed edges of a way.
///
/// This is a view over one record in the tile's edge info blob.
pub struct EdgeInfo<'a> {
    offset: usize,
    way: WayBits,
    layout: LayoutBits,
    name_info_list: &'a [NameInfo],
    extended_way_id: &'a [u8],
    encoded_shape: &'a [u8],
    encoded_osmids: &'a [u8],
    text_memory: &'a [u8],
}

impl<'a> EdgeInfo<'a> {
    /// Decodes the record starting at `offset` within the edge info blob.
    ///
    /// # Errors
    ///
    /// Fails when the offset is misaligned or the record runs past the end of the blob.
    pub fn try_from_blob(
        blob: &'a [u8],
        offset: usize,
        text_memory: &'a [u8],
    ) -> Result<Self, GraphTileDecodingError> {
        let malformed = |reason| GraphTileDecodingError::MalformedEdgeInfo { offset, reason };

        if offset % EDGE_INFO_ALIGNMENT != 0 {
            return Err(malformed("misaligned offset"));
        }
        let record = blob.get(offset..).ok_or_else(|| malformed("offset out of bounds"))?;

        let (header, rest) =
            EdgeInfoHeader::read_from_prefix(record).map_err(|_| malformed("truncated header"))?;
        let way = WayBits::from_bits(header.way.get());
        let layout = LayoutBits::from_bits(header.layout.get());

        let (name_info_list, rest) =
            <[NameInfo]>::ref_from_prefix_with_elems(rest, layout.name_count().into())
                .map_err(|_| malformed("truncated name list"))?;
        let (extended_way_id, rest) = rest
            .split_at_checked(layout.extended_way_id_size().into())
            .ok_or_else(|| malformed("truncated extended way ID"))?;
        if extended_way_id.len() > 2 {
            return Err(malformed("extended way ID is too long"));
        }
        let (encoded_shape, rest) = rest
            .split_at_checked(layout.encoded_shape_size().into())
            .ok_or_else(|| malformed("truncated shape"))?;
        let (encoded_osmids, _) = rest
            .split_at_checked(layout.osmids_size().into())
            .ok_or_else(|| malformed("truncated OSM IDs"))?;

        Ok(Self {
            offset,
            way,
            layout,
            name_info_list,
            extended_way_id,
            encoded_shape,
            encoded_osmids,
            text_memory,
        })
    }

    /// The offset of this record within the edge info blob.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The full 64-bit OSM way ID.
    ///
    /// The low 48 bits are stored in the header, and any higher bytes follow the name list.
    #[must_use]
    pub fn way_id(&self) -> u64 {
        self.extended_way_id
            .iter()
            .enumerate()
            .fold(self.way.way_id(), |id, (i, byte)| {
                id | (u64::from(*byte) << (WAY_ID_LOW_BITS as usize + 8 * i))
            })
    }

    /// The mean elevation in meters, at [`ELEVATION_BIN_SIZE`] resolution.
    #[must_use]
    pub fn mean_elevation(&self) -> f32 {
        MIN_ELEVATION + f32::from(self.way.mean_elevation()) * ELEVATION_BIN_SIZE
    }

    /// Bicycle network membership (a bit mask).
    #[inline]
    #[must_use]
    pub fn bike_network(&self) -> u8 {
        self.way.bike_network()
    }

    /// The posted speed limit in km/h (0 when unknown).
    #[inline]
    #[must_use]
    pub fn speed_limit(&self) -> u8 {
        self.layout.speed_limit()
    }

    #[inline]
    #[must_use]
    pub fn name_info_list(&self) -> &'a [NameInfo] {
        self.name_info_list
    }

    fn text_at(&self, offset: u32) -> Result<&'a str, GraphTileDecodingError> {
        let offset = offset as usize;
        let tail = self
            .text_memory
            .get(offset..)
            .ok_or(GraphTileDecodingError::InvalidText(offset))?;
        let end = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(GraphTileDecodingError::InvalidText(offset))?;
        std::str::from_utf8(&tail[..end]).map_err(|_| GraphTileDecodingError::InvalidText(offset))
    }

    /// Resolves all (untagged) names against the text blob.
    ///
    /// # Errors
    ///
    /// Fails if a name offset is out of bounds, unterminated, or not valid UTF-8.
    pub fn get_names(&self) -> Result<Vec<&'a str>, GraphTileDecodingError> {
        self.name_info_list
            .iter()
            .filter(|name_info| !name_info.is_tagged())
            .map(|name_info| self.text_at(name_info.name_offset()))
            .collect()
    }

    /// The raw encoded shape bytes.
    #[inline]
    #[must_use]
    pub fn encoded_shape(&self) -> &'a [u8] {
        self.encoded_shape
    }

    /// A lazy decoder over the shape.
    #[must_use]
    pub fn shape(&self) -> ShapeDecoder<'a> {
        ShapeDecoder::new(self.encoded_shape)
    }

    /// Decodes the full shape, in stored order.
    ///
    /// The shape is stored in the direction of the edge with `forward` set.
    ///
    /// # Errors
    ///
    /// Fails if the encoded shape is malformed.
    pub fn decode_raw_shape(&self) -> Result<Vec<Coord<f64>>, GraphTileDecodingError> {
        shape_codec::decode(self.encoded_shape).map_err(|source| {
            GraphTileDecodingError::MalformedShape {
                offset: self.offset,
                source,
            }
        })
    }

    /// Decodes only the first point of the shape.
    ///
    /// # Errors
    ///
    /// Fails if the shape is empty or malformed.
    pub fn decode_first_coordinate(&self) -> Result<Coord<f64>, GraphTileDecodingError> {
        shape_codec::decode_first(self.encoded_shape).map_err(|source| {
            GraphTileDecodingError::MalformedShape {
                offset: self.offset,
                source,
            }
        })
    }

    /// Whether the record carries a list of OSM node IDs.
    #[inline]
    #[must_use]
    pub fn has_osmids(&self) -> bool {
        self.layout.has_osmids()
    }

    /// The OSM node IDs along the way, in shape order.
    ///
    /// Returns `None` when the record was written without them.
    ///
    /// # Errors
    ///
    /// Fails if the encoded list is malformed.
    pub fn osmids(&self) -> Result<Option<Vec<u64>>, GraphTileDecodingError> {
        if !self.has_osmids() {
            return Ok(None);
        }

        let malformed = || GraphTileDecodingError::MalformedEdgeInfo {
            offset: self.offset,
            reason: "malformed OSM ID list",
        };
        let mut buf = self.encoded_osmids;
        let mut ids = Vec::new();
        if buf.has_remaining() {
            let mut last = buf.try_get_u64_varint().map_err(|_| malformed())?;
            ids.push(last);
            while buf.has_remaining() {
                let delta = buf.try_get_i64_varint().map_err(|_| malformed())?;
                last = last.wrapping_add_signed(delta);
                ids.push(last);
            }
        }

        Ok(Some(ids))
    }

    /// The OSM node IDs along the way, empty when the record has none.
    ///
    /// # Errors
    ///
    /// Fails if the encoded list is malformed.
    pub fn osmids_vector(&self) -> Result<Vec<u64>, GraphTileDecodingError> {
        Ok(self.osmids()?.unwrap_or_default())
    }

    /// The record size without trailing padding.
    #[must_use]
    pub fn base_size_of(&self) -> usize {
        size_of::<EdgeInfoHeader>()
            + size_of_val(self.name_info_list)
            + self.extended_way_id.len()
            + self.encoded_shape.len()
            + self.encoded_osmids.len()
    }

    /// The size the record occupies in the blob, including padding.
    #[must_use]
    pub fn size_of(&self) -> usize {
        self.base_size_of().next_multiple_of(EDGE_INFO_ALIGNMENT)
    }
}

impl fmt::Debug for EdgeInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeInfo")
            .field("offset", &self.offset)
            .field("way_id", &self.way_id())
            .field("mean_elevation", &self.mean_elevation())
            .field("bike_network", &self.bike_network())
            .field("speed_limit", &self.speed_limit())
            .field("name_info_list", &self.name_info_list)
            .field("encoded_shape_size", &self.encoded_shape.len())
            .field("has_osmids", &self.has_osmids())
            .finish()
    }
}

/// Writes a one-line, human-readable summary of an edge info record.
///
/// # Errors
///
/// Only fails if the writer does.
pub fn write_summary<W: Write>(out: &mut W, edge_info: &EdgeInfo) -> fmt::Result {
    write!(
        out,
        "way_id={} mean_elevation={} bike_network={} speed_limit={}",
        edge_info.way_id(),
        edge_info.mean_elevation(),
        edge_info.bike_network(),
        edge_info.speed_limit(),
    )?;
    match edge_info.get_names() {
        Ok(names) => write!(out, " names={names:?}")?,
        Err(_) => write!(out, " names=<unreadable>")?,
    }
    write!(out, " shape_bytes={}", edge_info.encoded_shape().len())?;
    match edge_info.osmids() {
        Ok(Some(ids)) => write!(out, " osmids={ids:?}"),
        Ok(None) => write!(out, " osmids=none"),
        Err(_) => write!(out, " osmids=<unreadable>"),
    }
}
