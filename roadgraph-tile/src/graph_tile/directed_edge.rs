use super::GraphTileBuildError;
use crate::GraphId;
use bitfield_struct::bitfield;
use enumset::EnumSetType;
use zerocopy::{LE, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The use of an edge (what kind of way or connection it represents).
///
/// The discriminants are part of the tile format.
#[derive(Debug, EnumSetType, Hash)]
pub enum Use {
    // Road specific uses
    Road = 0,
    Ramp = 1,
    TurnChannel = 2,
    Track = 3,
    Driveway = 4,
    Alley = 5,
    ParkingAisle = 6,
    EmergencyAccess = 7,
    DriveThru = 8,
    Culdesac = 9,
    LivingStreet = 10,
    ServiceRoad = 11,

    // Bicycle specific uses
    Cycleway = 20,
    MountainBike = 21,

    // Pedestrian specific uses
    Sidewalk = 24,
    Footway = 25,
    Steps = 26,
    Path = 27,
    Pedestrian = 28,
    Bridleway = 29,
    RestArea = 30,
    ServiceArea = 31,
    PedestrianCrossing = 32,
    Elevator = 33,
    Escalator = 34,
    Platform = 35,

    // Other
    Other = 40,
    Ferry = 41,
    RailFerry = 42,
    Construction = 43,

    // Transit specific uses
    Rail = 50,
    Bus = 51,
    EgressConnection = 52,
    PlatformConnection = 53,
    TransitConnection = 54,
}

impl Use {
    /// Is this a scheduled transit line (rail or bus)?
    #[inline]
    #[must_use]
    pub fn is_transit_line(self) -> bool {
        matches!(self, Use::Rail | Use::Bus)
    }

    /// Is this a ferry of any kind?
    #[inline]
    #[must_use]
    pub fn is_ferry(self) -> bool {
        matches!(self, Use::Ferry | Use::RailFerry)
    }
}

impl TryFrom<u8> for Use {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Use::Road,
            1 => Use::Ramp,
            2 => Use::TurnChannel,
            3 => Use::Track,
            4 => Use::Driveway,
            5 => Use::Alley,
            6 => Use::ParkingAisle,
            7 => Use::EmergencyAccess,
            8 => Use::DriveThru,
            9 => Use::Culdesac,
            10 => Use::LivingStreet,
            11 => Use::ServiceRoad,
            20 => Use::Cycleway,
            21 => Use::MountainBike,
            24 => Use::Sidewalk,
            25 => Use::Footway,
            26 => Use::Steps,
            27 => Use::Path,
            28 => Use::Pedestrian,
            29 => Use::Bridleway,
            30 => Use::RestArea,
            31 => Use::ServiceArea,
            32 => Use::PedestrianCrossing,
            33 => Use::Elevator,
            34 => Use::Escalator,
            35 => Use::Platform,
            40 => Use::Other,
            41 => Use::Ferry,
            42 => Use::RailFerry,
            43 => Use::Construction,
            50 => Use::Rail,
            51 => Use::Bus,
            52 => Use::EgressConnection,
            53 => Use::PlatformConnection,
            54 => Use::TransitConnection,
            _ => return Err(value),
        })
    }
}

const OPPOSING_INDEX_BITS: u32 = 7;
const EDGE_INFO_OFFSET_BITS: u32 = 25;
const LENGTH_BITS: u32 = 24;

#[bitfield(u64)]
struct EndpointBits {
    #[bits(46)]
    end_node: u64,
    #[bits(7)]
    opposing_edge_index: u8,
    #[bits(6)]
    edge_use: u8,
    shortcut: bool,
    forward: bool,
    #[bits(3)]
    __: u8,
}

#[bitfield(u64)]
struct AttributeBits {
    #[bits(25)]
    edge_info_offset: u32,
    #[bits(24)]
    length: u32,
    speed: u8,
    #[bits(7)]
    __: u8,
}

/// A directed edge within the routing graph.
///
/// Every way is stored as two directed edges, one in each direction,
/// which share a single edge info record.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DirectedEdge {
    endpoint: U64<LE>,
    attributes: U64<LE>,
}

fn check_bits(field: &'static str, value: u64, bits: u32) -> Result<u64, GraphTileBuildError> {
    if value >> bits == 0 {
        Ok(value)
    } else {
        Err(GraphTileBuildError::FieldOverflow { field, value })
    }
}

impl DirectedEdge {
    /// Creates a new directed edge.
    ///
    /// The shortcut flag is cleared, and the forward flag is set.
    ///
    /// # Errors
    ///
    /// Fails if any value does not fit in its field.
    pub fn new(
        end_node_id: GraphId,
        opposing_edge_index: u32,
        edge_use: Use,
        edge_info_offset: u32,
        length: u32,
    ) -> Result<Self, GraphTileBuildError> {
        if !end_node_id.is_valid() {
            return Err(GraphTileBuildError::FieldOverflow {
                field: "end_node",
                value: end_node_id.value(),
            });
        }
        let edge_info_offset =
            check_bits("edge_info_offset", edge_info_offset.into(), EDGE_INFO_OFFSET_BITS)?;
        let length = check_bits("length", length.into(), LENGTH_BITS)?;

        let endpoint = EndpointBits::new()
            .with_end_node(end_node_id.value())
            .with_edge_use(edge_use as u8)
            .with_forward(true);
        let attributes = AttributeBits::new()
            .with_edge_info_offset(edge_info_offset as u32)
            .with_length(length as u32);

        Self {
            endpoint: U64::new(endpoint.into_bits()),
            attributes: U64::new(attributes.into_bits()),
        }
        .with_opposing_edge_index(opposing_edge_index)
    }

    #[inline]
    fn endpoint_bits(&self) -> EndpointBits {
        EndpointBits::from_bits(self.endpoint.get())
    }

    #[inline]
    fn attribute_bits(&self) -> AttributeBits {
        AttributeBits::from_bits(self.attributes.get())
    }

    /// Replaces the opposing edge index.
    ///
    /// # Errors
    ///
    /// Fails if the index does not fit in 7 bits.
    pub fn with_opposing_edge_index(mut self, index: u32) -> Result<Self, GraphTileBuildError> {
        let index = check_bits("opposing_edge_index", index.into(), OPPOSING_INDEX_BITS)?;
        let bits = self.endpoint_bits().with_opposing_edge_index(index as u8);
        self.endpoint = U64::new(bits.into_bits());
        Ok(self)
    }

    /// Marks the edge as a shortcut (or not).
    #[must_use]
    pub fn with_shortcut(mut self, shortcut: bool) -> Self {
        self.endpoint = U64::new(self.endpoint_bits().with_shortcut(shortcut).into_bits());
        self
    }

    /// Sets whether the edge runs in the same direction as its shape.
    #[must_use]
    pub fn with_forward(mut self, forward: bool) -> Self {
        self.endpoint = U64::new(self.endpoint_bits().with_forward(forward).into_bits());
        self
    }

    #[must_use]
    pub fn with_speed(mut self, speed: u8) -> Self {
        self.attributes = U64::new(self.attribute_bits().with_speed(speed).into_bits());
        self
    }

    /// The ID of the node at the end of this edge (possibly in another tile).
    #[inline]
    #[must_use]
    pub fn end_node_id(&self) -> GraphId {
        GraphId::try_from_id(self.endpoint_bits().end_node()).unwrap_or(GraphId::INVALID)
    }

    /// The index of the opposing edge among the end node's outbound edges.
    #[inline]
    #[must_use]
    pub fn opposing_edge_index(&self) -> u32 {
        self.endpoint_bits().opposing_edge_index().into()
    }

    /// The use of the edge.
    ///
    /// Unknown values decode as [`Use::Other`]; see [`DirectedEdge::raw_use`].
    #[inline]
    #[must_use]
    pub fn edge_use(&self) -> Use {
        Use::try_from(self.raw_use()).unwrap_or(Use::Other)
    }

    /// The stored use value, without interpretation.
    #[inline]
    #[must_use]
    pub fn raw_use(&self) -> u8 {
        self.endpoint_bits().edge_use()
    }

    /// Is this a shortcut edge (a shortcut bypassing several edges)?
    #[inline]
    #[must_use]
    pub fn is_shortcut(&self) -> bool {
        self.endpoint_bits().shortcut()
    }

    /// Does the edge run in the same direction as the stored shape?
    #[inline]
    #[must_use]
    pub fn forward(&self) -> bool {
        self.endpoint_bits().forward()
    }

    /// Is this edge a transit line (rail or bus)?
    #[inline]
    #[must_use]
    pub fn is_transit_line(&self) -> bool {
        self.edge_use().is_transit_line()
    }

    /// The byte offset of this edge's record within the tile's edge info blob.
    #[inline]
    #[must_use]
    pub fn edge_info_offset(&self) -> u32 {
        self.attribute_bits().edge_info_offset()
    }

    /// The length of the edge in meters.
    #[inline]
    #[must_use]
    pub fn length(&self) -> u32 {
        self.attribute_bits().length()
    }

    /// The typical speed, in km/h.
    #[inline]
    #[must_use]
    pub fn speed(&self) -> u8 {
        self.attribute_bits().speed()
    }
}

impl std::fmt::Debug for DirectedEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectedEdge")
            .field("end_node_id", &self.end_node_id())
            .field("opposing_edge_index", &self.opposing_edge_index())
            .field("edge_use", &self.edge_use())
            .field("is_shortcut", &self.is_shortcut())
            .field("forward", &self.forward())
            .field("edge_info_offset", &self.edge_info_offset())
            .field("length", &self.length())
            .field("speed", &self.speed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumset::EnumSet;

    fn end_node() -> GraphId {
        GraphId::try_from_components(2, 763_926, 17).unwrap()
    }

    #[test]
    fn edge_size() {
        assert_eq!(size_of::<DirectedEdge>(), 16);
    }

    #[test]
    fn fields_round_trip() {
        let edge = DirectedEdge::new(end_node(), 5, Use::Ferry, 4096, 1234)
            .unwrap()
            .with_speed(90)
            .with_forward(false);

        assert_eq!(edge.end_node_id(), end_node());
        assert_eq!(edge.opposing_edge_index(), 5);
        assert_eq!(edge.edge_use(), Use::Ferry);
        assert!(!edge.is_shortcut());
        assert!(!edge.forward());
        assert_eq!(edge.edge_info_offset(), 4096);
        assert_eq!(edge.length(), 1234);
        assert_eq!(edge.speed(), 90);

        let shortcut = edge.with_shortcut(true);
        assert!(shortcut.is_shortcut());
        // Other fields are untouched
        assert_eq!(shortcut.end_node_id(), end_node());
        assert_eq!(shortcut.opposing_edge_index(), 5);
    }

    #[test]
    fn field_overflow() {
        assert!(DirectedEdge::new(end_node(), 128, Use::Road, 0, 0).is_err());
        assert!(DirectedEdge::new(end_node(), 0, Use::Road, 1 << 25, 0).is_err());
        assert!(DirectedEdge::new(end_node(), 0, Use::Road, 0, 1 << 24).is_err());
        assert!(DirectedEdge::new(GraphId::INVALID, 0, Use::Road, 0, 0).is_err());
    }

    #[test]
    fn use_discriminants() {
        for value in 0..=u8::MAX {
            if let Ok(edge_use) = Use::try_from(value) {
                assert_eq!(edge_use as u8, value);
            }
        }
        assert_eq!(Use::try_from(12), Err(12));
        assert_eq!(EnumSet::<Use>::all().len(), 35);
        assert!(Use::Rail.is_transit_line());
        assert!(!Use::TransitConnection.is_transit_line());
        assert!(Use::RailFerry.is_ferry());
    }

    #[test]
    fn unknown_use_decodes_as_other() {
        let edge = DirectedEdge::new(end_node(), 0, Use::Road, 0, 0).unwrap();
        let bits = EndpointBits::from_bits(edge.endpoint.get()).with_edge_use(63);
        let edge = DirectedEdge {
            endpoint: U64::new(bits.into_bits()),
            ..edge
        };
        assert_eq!(edge.raw_use(), 63);
        assert_eq!(edge.edge_use(), Use::Other);
    }
}
