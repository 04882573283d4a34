//! # Graph tiles
//!
//! A graph tile is one immutable byte blob holding every node and directed edge
//! of a single (level, tile) cell, plus the variable-length edge info and text they point into.
//!
//! ```text
//! header | nodes | directed edges | edge info blob | text blob
//! ```
//!
//! All fixed-size records are read in place (zero copy) via `zerocopy`.

use thiserror::Error;
use zerocopy::FromBytes;

// To keep files manageable, each record type lives in its own internal module,
// and the public types are re-exported here.

mod builder;
mod directed_edge;
mod edge_info;
mod edge_info_builder;
mod handles;
mod header;
mod node;

use crate::shape_codec::ShapeDecodingError;
pub use crate::graph_id::{GraphId, InvalidGraphIdError};
pub use builder::GraphTileBuilder;
pub use directed_edge::{DirectedEdge, Use};
pub use edge_info::{
    EDGE_INFO_ALIGNMENT, ELEVATION_BIN_SIZE, EdgeInfo, MIN_ELEVATION, NameInfo, write_summary,
};
pub use edge_info_builder::{EdgeInfoBuildError, EdgeInfoBuilder};
pub use handles::OwnedGraphTileHandle;
pub use header::{GraphTileHeader, TILE_FORMAT_VERSION};
pub use node::NodeInfo;

#[derive(Debug, Error)]
pub enum GraphTileDecodingError {
    #[error("Unable to extract a slice of the correct length; the tile data is malformed.")]
    SliceLength,
    #[error("The tile has {0} unexpected trailing bytes.")]
    TrailingBytes(usize),
    #[error("Data cast failed (this almost always means invalid data): {0}")]
    CastError(String),
    #[error("Invalid graph ID: {0}")]
    GraphIdParseError(#[from] InvalidGraphIdError),
    #[error("The header graph ID {0} is not a tile base ID.")]
    NotATileId(GraphId),
    #[error("Unsupported tile format version {0}.")]
    UnsupportedTileVersion(u32),
    #[error("The {section} section size ({size}) is not a multiple of 8 bytes.")]
    MisalignedSection { section: &'static str, size: usize },
    #[error("Malformed edge info at offset {offset}: {reason}")]
    MalformedEdgeInfo { offset: usize, reason: &'static str },
    #[error("Malformed shape in edge info at offset {offset}: {source}")]
    MalformedShape {
        offset: usize,
        #[source]
        source: ShapeDecodingError,
    },
    #[error("Invalid text at offset {0}.")]
    InvalidText(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Mismatched base; the graph ID cannot exist in this tile.")]
    MismatchedBase,
    #[error("The feature at the index specified does not exist in this tile.")]
    InvalidIndex,
}

#[derive(Debug, Error)]
pub enum GraphTileBuildError {
    #[error("The value {value} does not fit in the {field} field.")]
    FieldOverflow { field: &'static str, value: u64 },
    #[error("The graph ID {0} is not a valid tile base ID.")]
    InvalidTileId(GraphId),
    #[error("Coordinate {x}, {y} is outside the tile.")]
    CoordinateOutsideTile { x: f64, y: f64 },
    #[error("Edge info error: {0}")]
    EdgeInfo(#[from] EdgeInfoBuildError),
}

/// The information needed to locate the opposing edge of a directed edge.
///
/// The opposing edge is an outbound edge of this edge's end node,
/// `opposing_edge_index` positions into that node's outbound edge list.
/// The end node may live in another tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpposingEdgeIndex {
    pub end_node_id: GraphId,
    pub opposing_edge_index: u32,
}

pub trait GraphTile {
    /// Gets the Graph ID of the tile.
    fn graph_id(&self) -> GraphId;

    /// Does the supplied graph ID belong in this tile?
    ///
    /// A true result does not necessarily guarantee that an object with this ID exists,
    /// but in that case, either you've cooked up an invalid ID for fun,
    /// or the graph is invalid.
    fn may_contain_id(&self, id: GraphId) -> bool;

    /// Gets a reference to the [`GraphTileHeader`].
    fn header(&self) -> &GraphTileHeader;

    /// Gets a reference to a node in this tile with the given graph ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph ID cannot be contained in this tile
    /// or the index is invalid.
    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError>;

    /// The outbound edges of a node in this tile.
    ///
    /// An empty slice is returned if the node's edge range is out of bounds.
    fn get_outbound_edges_from_node(&self, node_info: &NodeInfo) -> &[DirectedEdge];

    /// Gets a reference to the directed edge in this tile by graph ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph ID cannot be contained in this tile
    /// or the index is invalid.
    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError>;

    /// Gets the index for the opposing edge of a directed edge.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] if the graph ID is not present in the tile.
    fn get_opp_edge_index(&self, graph_id: GraphId) -> Result<OpposingEdgeIndex, LookupError>;

    /// Gets the ID of the node that a directed edge in this tile starts from.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] if the edge is not in this tile
    /// or no node claims it in its outbound edge range.
    fn get_start_node_id(&self, edge_id: GraphId) -> Result<GraphId, LookupError>;

    /// Gets edge info for a directed edge.
    ///
    /// # Errors
    ///
    /// Since this accepts a directed edge reference,
    /// any errors that arise are due to invalid/corrupt graph tiles.
    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError>;

    // Lower level "raw" accessors

    /// A raw slice of the tile's directed edges (i.e. for iteration).
    fn directed_edges(&self) -> &[DirectedEdge];

    /// A raw slice of the tile's nodes.
    fn nodes(&self) -> &[NodeInfo];

    /// The concatenated edge info records.
    fn edge_info_memory(&self) -> &[u8];

    /// The concatenated NUL-terminated strings referenced by edge info names.
    fn text_memory(&self) -> &[u8];
}

/// A view over a single tile in the tiled graph.
///
/// Access should normally go through the [`GraphTile`] trait.
/// A view borrows the tile bytes; see [`OwnedGraphTileHandle`] for an owned variant.
pub struct GraphTileView<'a> {
    graph_id: GraphId,
    /// Header with various metadata about the tile and internal sizes.
    header: GraphTileHeader,
    /// The list of nodes in the graph tile.
    nodes: &'a [NodeInfo],
    directed_edges: &'a [DirectedEdge],
    edge_info_memory: &'a [u8],
    text_memory: &'a [u8],
}

impl GraphTile for GraphTileView<'_> {
    #[inline]
    fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    #[inline]
    fn may_contain_id(&self, id: GraphId) -> bool {
        id.tile_base_id() == self.graph_id
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        &self.header
    }

    #[inline]
    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError> {
        if self.may_contain_id(id) {
            self.nodes
                .get(id.index() as usize)
                .ok_or(LookupError::InvalidIndex)
        } else {
            Err(LookupError::MismatchedBase)
        }
    }

    fn get_outbound_edges_from_node(&self, node_info: &NodeInfo) -> &[DirectedEdge] {
        let start = node_info.edge_index() as usize;
        let end = start + node_info.edge_count() as usize;
        self.directed_edges.get(start..end).unwrap_or_default()
    }

    #[inline]
    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError> {
        if self.may_contain_id(id) {
            self.directed_edges
                .get(id.index() as usize)
                .ok_or(LookupError::InvalidIndex)
        } else {
            Err(LookupError::MismatchedBase)
        }
    }

    fn get_opp_edge_index(&self, graph_id: GraphId) -> Result<OpposingEdgeIndex, LookupError> {
        let edge = self.get_directed_edge(graph_id)?;

        // The edge might leave the tile, so the caller may have to look at another tile
        Ok(OpposingEdgeIndex {
            end_node_id: edge.end_node_id(),
            opposing_edge_index: edge.opposing_edge_index(),
        })
    }

    fn get_start_node_id(&self, edge_id: GraphId) -> Result<GraphId, LookupError> {
        // Validates the base and index
        self.get_directed_edge(edge_id)?;
        let edge_index = edge_id.index();

        // Nodes are sorted by their first outbound edge,
        // so the owner is the last node starting at or before this edge.
        let pos = self
            .nodes
            .partition_point(|node| u64::from(node.edge_index()) <= edge_index);
        let node_index = pos.checked_sub(1).ok_or(LookupError::InvalidIndex)?;
        let node = &self.nodes[node_index];
        if edge_index >= u64::from(node.edge_index()) + u64::from(node.edge_count()) {
            return Err(LookupError::InvalidIndex);
        }

        self.graph_id
            .with_index(node_index as u64)
            .map_err(|_| LookupError::InvalidIndex)
    }

    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError> {
        EdgeInfo::try_from_blob(
            self.edge_info_memory,
            directed_edge.edge_info_offset() as usize,
            self.text_memory,
        )
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        self.directed_edges
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        self.nodes
    }

    #[inline]
    fn edge_info_memory(&self) -> &[u8] {
        self.edge_info_memory
    }

    #[inline]
    fn text_memory(&self) -> &[u8] {
        self.text_memory
    }
}

impl<'a> TryFrom<&'a [u8]> for GraphTileView<'a> {
    type Error = GraphTileDecodingError;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        // The basic pattern here is to consume a known number of elements
        // from the front of the byte slice, re-binding the tail as we go.
        // In this way, we don't need to track manual offsets.
        let (header, buffer) = GraphTileHeader::read_from_prefix(bytes)
            .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;

        if header.version() != TILE_FORMAT_VERSION {
            return Err(GraphTileDecodingError::UnsupportedTileVersion(
                header.version(),
            ));
        }

        let graph_id = GraphId::try_from_id(header.raw_graph_id())?;
        if graph_id.index() != 0 {
            return Err(GraphTileDecodingError::NotATileId(graph_id));
        }

        let (nodes, buffer) =
            <[NodeInfo]>::ref_from_prefix_with_elems(buffer, header.node_count() as usize)
                .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;
        let (directed_edges, buffer) = <[DirectedEdge]>::ref_from_prefix_with_elems(
            buffer,
            header.directed_edge_count() as usize,
        )
        .map_err(|e| GraphTileDecodingError::CastError(e.to_string()))?;

        let edge_info_size = header.edge_info_size() as usize;
        if edge_info_size % EDGE_INFO_ALIGNMENT != 0 {
            return Err(GraphTileDecodingError::MisalignedSection {
                section: "edge info",
                size: edge_info_size,
            });
        }
        let (edge_info_memory, buffer) = buffer
            .split_at_checked(edge_info_size)
            .ok_or(GraphTileDecodingError::SliceLength)?;
        let (text_memory, buffer) = buffer
            .split_at_checked(header.text_size() as usize)
            .ok_or(GraphTileDecodingError::SliceLength)?;

        if !buffer.is_empty() {
            return Err(GraphTileDecodingError::TrailingBytes(buffer.len()));
        }

        Ok(Self {
            graph_id,
            header,
            nodes,
            directed_edges,
            edge_info_memory,
            text_memory,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures;
