use super::{
    DirectedEdge, EDGE_INFO_ALIGNMENT, EdgeInfoBuilder, GraphTile, GraphTileBuildError,
    GraphTileHeader, NodeInfo, OwnedGraphTileHandle,
};
use crate::{GraphId, tile_hierarchy};
use geo::Coord;
use std::borrow::Cow;
use zerocopy::IntoBytes;

/// A builder for constructing new / modified graph tiles.
///
/// # Design principles
///
/// ## Use of copy-on-write internal fields
///
/// One of the more common usage patterns is to construct the builder
/// from an existing graph tile handle.
/// To avoid needless copying (especially when the edits are localized to a small section of the tile),
/// we lazily copy as needed.
///
/// ## Late materialization of derived structures
///
/// Things like headers are not computed every time.
/// Rather, we keep enough information around to derive what the header fields should be.
pub struct GraphTileBuilder<'a> {
    graph_id: GraphId,
    sw_corner: Coord<f64>,
    nodes: Cow<'a, [NodeInfo]>,
    directed_edges: Cow<'a, [DirectedEdge]>,
    edge_info_memory: Cow<'a, [u8]>,
    text_memory: Cow<'a, [u8]>,
}

impl<'a> From<&'a OwnedGraphTileHandle> for GraphTileBuilder<'a> {
    fn from(value: &'a OwnedGraphTileHandle) -> Self {
        GraphTileBuilder {
            graph_id: value.graph_id(),
            sw_corner: value.header().sw_corner(),
            nodes: Cow::Borrowed(value.nodes()),
            directed_edges: Cow::Borrowed(value.directed_edges()),
            edge_info_memory: Cow::Borrowed(value.edge_info_memory()),
            text_memory: Cow::Borrowed(value.text_memory()),
        }
    }
}

impl GraphTileBuilder<'_> {
    /// Creates an empty tile.
    ///
    /// # Errors
    ///
    /// Fails if the ID is not a tile base ID in a known level.
    pub fn new(graph_id: GraphId) -> Result<Self, GraphTileBuildError> {
        if !graph_id.is_valid() || graph_id.index() != 0 {
            return Err(GraphTileBuildError::InvalidTileId(graph_id));
        }
        let sw_corner = tile_hierarchy::level(graph_id.level())
            .and_then(|level| level.tiling_system.sw_corner(graph_id.tile_id()))
            .ok_or(GraphTileBuildError::InvalidTileId(graph_id))?;

        Ok(GraphTileBuilder {
            graph_id,
            sw_corner,
            nodes: Cow::Borrowed(&[]),
            directed_edges: Cow::Borrowed(&[]),
            edge_info_memory: Cow::Borrowed(&[]),
            text_memory: Cow::Borrowed(&[]),
        })
    }

    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    #[must_use]
    pub fn sw_corner(&self) -> Coord<f64> {
        self.sw_corner
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    #[must_use]
    pub fn directed_edges(&self) -> &[DirectedEdge] {
        &self.directed_edges
    }

    /// Mutable access to the directed edges (copies them on first use).
    pub fn directed_edges_mut(&mut self) -> &mut [DirectedEdge] {
        self.directed_edges.to_mut()
    }

    /// Appends a NUL-terminated string to the text blob, returning its offset.
    pub fn add_text(&mut self, text: &str) -> u32 {
        let text_memory = self.text_memory.to_mut();
        let offset = text_memory.len() as u32;
        text_memory.extend_from_slice(text.as_bytes());
        text_memory.push(0);
        offset
    }

    /// Appends an edge info record, returning its offset for use in [`DirectedEdge::new`].
    ///
    /// # Errors
    ///
    /// Fails if the record can't be encoded.
    pub fn add_edge_info(&mut self, edge_info: &EdgeInfoBuilder) -> Result<u32, GraphTileBuildError> {
        let edge_info_memory = self.edge_info_memory.to_mut();
        let offset = edge_info_memory.len();
        debug_assert_eq!(offset % EDGE_INFO_ALIGNMENT, 0);
        edge_info.write_to(edge_info_memory)?;
        Ok(offset as u32)
    }

    /// Adds a node along with its outbound edges, returning the node's ID.
    ///
    /// Nodes own contiguous edge ranges, so a node's edges must all be supplied here.
    ///
    /// # Errors
    ///
    /// Fails if the node is outside the tile or the edge range does not fit.
    pub fn add_node<I: IntoIterator<Item = DirectedEdge>>(
        &mut self,
        coordinate: Coord<f64>,
        outbound_edges: I,
    ) -> Result<GraphId, GraphTileBuildError> {
        let node_id = self
            .graph_id
            .with_index(self.nodes.len() as u64)
            .map_err(|_| GraphTileBuildError::FieldOverflow {
                field: "node index",
                value: self.nodes.len() as u64,
            })?;

        let edge_index = self.directed_edges.len();
        let directed_edges = self.directed_edges.to_mut();
        directed_edges.extend(outbound_edges);
        let edge_count = directed_edges.len() - edge_index;

        let node = NodeInfo::new(
            self.sw_corner,
            coordinate,
            edge_index as u32,
            edge_count as u32,
        );
        match node {
            Ok(node) => {
                self.nodes.to_mut().push(node);
                Ok(node_id)
            }
            Err(e) => {
                // Leave the builder as it was
                self.directed_edges.to_mut().truncate(edge_index);
                Err(e)
            }
        }
    }

    /// The serialized tile.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = GraphTileHeader::new(
            self.graph_id,
            self.sw_corner,
            self.nodes.len() as u32,
            self.directed_edges.len() as u32,
            self.edge_info_memory.len() as u32,
            self.text_memory.len() as u32,
        );

        let mut result = Vec::with_capacity(
            size_of::<GraphTileHeader>()
                + size_of_val(self.nodes.as_ref())
                + size_of_val(self.directed_edges.as_ref())
                + self.edge_info_memory.len()
                + self.text_memory.len(),
        );
        result.extend_from_slice(header.as_bytes());
        result.extend_from_slice(self.nodes.as_bytes());
        result.extend_from_slice(self.directed_edges.as_bytes());
        result.extend_from_slice(&self.edge_info_memory);
        result.extend_from_slice(&self.text_memory);

        result
    }
}
