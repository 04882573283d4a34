use super::edge_info::{
    EDGE_INFO_ALIGNMENT, ELEVATION_BIN_SIZE, EdgeInfoHeader, LayoutBits, MAX_ELEVATION_BIN,
    MAX_NAME_COUNT, MIN_ELEVATION, NameInfo, WAY_ID_LOW_BITS, WayBits,
};
use crate::shape_codec;
use bytes_varint::VarIntSupportMut;
use geo::Coord;
use thiserror::Error;
use zerocopy::{IntoBytes, U64};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EdgeInfoBuildError {
    #[error("Too many names ({0}); at most 15 fit in a record.")]
    TooManyNames(usize),
    #[error("The encoded shape is too large ({0} bytes).")]
    ShapeTooLarge(usize),
    #[error("The encoded OSM ID list is too large ({0} bytes).")]
    OsmIdsTooLarge(usize),
}

/// Assembles a single edge info record.
///
/// Setters return `&mut Self` so they can be chained.
/// Limits are checked when the record is written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeInfoBuilder {
    way_id: u64,
    mean_elevation_bin: u16,
    bike_network: u8,
    speed_limit: u8,
    name_info_list: Vec<NameInfo>,
    encoded_shape: Vec<u8>,
    encoded_osmids: Option<Vec<u8>>,
}

impl EdgeInfoBuilder {
    pub fn set_way_id(&mut self, way_id: u64) -> &mut Self {
        self.way_id = way_id;
        self
    }

    #[must_use]
    pub fn way_id(&self) -> u64 {
        self.way_id
    }

    /// Sets the mean elevation in meters.
    ///
    /// Values are truncated to [`ELEVATION_BIN_SIZE`] bins starting at [`MIN_ELEVATION`],
    /// and clamped to the representable range.
    pub fn set_mean_elevation(&mut self, meters: f32) -> &mut Self {
        let bin = (meters - MIN_ELEVATION) / ELEVATION_BIN_SIZE;
        self.mean_elevation_bin = if bin.is_nan() || bin <= 0.0 {
            0
        } else {
            // Saturating cast
            (bin as u16).min(MAX_ELEVATION_BIN)
        };
        self
    }

    #[must_use]
    pub fn mean_elevation(&self) -> f32 {
        MIN_ELEVATION + f32::from(self.mean_elevation_bin) * ELEVATION_BIN_SIZE
    }

    /// Sets the bicycle network mask (only the low 4 bits are kept).
    pub fn set_bike_network(&mut self, bike_network: u8) -> &mut Self {
        self.bike_network = bike_network & 0x0f;
        self
    }

    pub fn set_speed_limit(&mut self, speed_limit: u8) -> &mut Self {
        self.speed_limit = speed_limit;
        self
    }

    pub fn set_name_info_list<I: IntoIterator<Item = NameInfo>>(&mut self, names: I) -> &mut Self {
        self.name_info_list = names.into_iter().collect();
        self
    }

    pub fn add_name_info(&mut self, name_info: NameInfo) -> &mut Self {
        self.name_info_list.push(name_info);
        self
    }

    /// Encodes and stores the shape (x = longitude, y = latitude).
    pub fn set_shape<I: IntoIterator<Item = Coord<f64>>>(&mut self, shape: I) -> &mut Self {
        self.encoded_shape = shape_codec::encode(shape);
        self
    }

    /// Stores a shape that is already encoded.
    pub fn set_encoded_shape(&mut self, encoded_shape: Vec<u8>) -> &mut Self {
        self.encoded_shape = encoded_shape;
        self
    }

    /// Stores the OSM node IDs of the way.
    ///
    /// The first ID is written as an unsigned varint,
    /// and each following ID as a zig-zag varint delta from its predecessor.
    /// An empty list is still recorded as present.
    pub fn set_osmids<I: IntoIterator<Item = u64>>(&mut self, osmids: I) -> &mut Self {
        let mut buf = Vec::new();
        let mut last: Option<u64> = None;
        for id in osmids {
            match last {
                None => buf.put_u64_varint(id),
                // Wrapping keeps the deltas exact for the full u64 range
                Some(prev) => buf.put_i64_varint(id.wrapping_sub(prev) as i64),
            }
            last = Some(id);
        }
        self.encoded_osmids = Some(buf);
        self
    }

    /// Removes the OSM node IDs, if any.
    pub fn clear_osmids(&mut self) -> &mut Self {
        self.encoded_osmids = None;
        self
    }

    fn extended_way_id_size(&self) -> usize {
        if self.way_id >> 56 != 0 {
            2
        } else if self.way_id >> WAY_ID_LOW_BITS != 0 {
            1
        } else {
            0
        }
    }

    /// The record size without trailing padding.
    #[must_use]
    pub fn base_size_of(&self) -> usize {
        size_of::<EdgeInfoHeader>()
            + size_of_val(self.name_info_list.as_slice())
            + self.extended_way_id_size()
            + self.encoded_shape.len()
            + self.encoded_osmids.as_ref().map_or(0, Vec::len)
    }

    /// The size the record will occupy, including padding.
    #[must_use]
    pub fn size_of(&self) -> usize {
        self.base_size_of().next_multiple_of(EDGE_INFO_ALIGNMENT)
    }

    fn header(&self) -> Result<EdgeInfoHeader, EdgeInfoBuildError> {
        let name_count = self.name_info_list.len();
        if name_count > MAX_NAME_COUNT {
            return Err(EdgeInfoBuildError::TooManyNames(name_count));
        }
        let shape_size = u16::try_from(self.encoded_shape.len())
            .map_err(|_| EdgeInfoBuildError::ShapeTooLarge(self.encoded_shape.len()))?;
        let osmids_len = self.encoded_osmids.as_ref().map_or(0, Vec::len);
        let osmids_size =
            u16::try_from(osmids_len).map_err(|_| EdgeInfoBuildError::OsmIdsTooLarge(osmids_len))?;

        let way = WayBits::new()
            .with_way_id(self.way_id & ((1 << WAY_ID_LOW_BITS) - 1))
            .with_mean_elevation(self.mean_elevation_bin)
            .with_bike_network(self.bike_network);
        let layout = LayoutBits::new()
            .with_speed_limit(self.speed_limit)
            .with_name_count(name_count as u8)
            .with_encoded_shape_size(shape_size)
            .with_osmids_size(osmids_size)
            .with_extended_way_id_size(self.extended_way_id_size() as u8)
            .with_has_osmids(self.encoded_osmids.is_some());

        Ok(EdgeInfoHeader {
            way: U64::new(way.into_bits()),
            layout: U64::new(layout.into_bits()),
        })
    }

    /// Appends the record, including padding, to `out`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Fails if a variable-length section exceeds what the record header can describe.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<usize, EdgeInfoBuildError> {
        let header = self.header()?;
        let start = out.len();

        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(self.name_info_list.as_bytes());
        let way_id_bytes = self.way_id.to_le_bytes();
        let low_bytes = WAY_ID_LOW_BITS as usize / 8;
        out.extend_from_slice(&way_id_bytes[low_bytes..low_bytes + self.extended_way_id_size()]);
        out.extend_from_slice(&self.encoded_shape);
        if let Some(osmids) = &self.encoded_osmids {
            out.extend_from_slice(osmids);
        }
        out.resize(start + self.size_of(), 0);

        Ok(out.len() - start)
    }

    /// The serialized record, including padding.
    ///
    /// # Errors
    ///
    /// See [`EdgeInfoBuilder::write_to`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, EdgeInfoBuildError> {
        let mut out = Vec::with_capacity(self.size_of());
        self.write_to(&mut out)?;
        Ok(out)
    }
}
