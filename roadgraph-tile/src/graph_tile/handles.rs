//! # Graph Tile Handles
//!
//! An owned handle to graph tile data,
//! for cases where longer-lived access is needed (ex: caches shared across threads).

use super::{
    DirectedEdge, EdgeInfo, GraphTile, GraphTileDecodingError, GraphTileHeader, GraphTileView,
    LookupError, NodeInfo, OpposingEdgeIndex,
};
use crate::GraphId;
use self_cell::self_cell;

self_cell! {
    /// A read-only view of a graph tile.
    ///
    /// The bytes are fully owned by the handle, and access is infallible after construction.
    pub struct OwnedGraphTileHandle {
        owner: Vec<u8>,
        #[covariant]
        dependent: GraphTileView,
    }
}

impl TryFrom<Vec<u8>> for OwnedGraphTileHandle {
    type Error = GraphTileDecodingError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        OwnedGraphTileHandle::try_new(value, |data| GraphTileView::try_from(data.as_slice()))
    }
}

impl OwnedGraphTileHandle {
    /// The raw tile bytes, exactly as they were loaded.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.borrow_owner()
    }
}

impl std::fmt::Debug for OwnedGraphTileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedGraphTileHandle")
            .field("graph_id", &self.graph_id())
            .field("size", &self.borrow_owner().len())
            .finish_non_exhaustive()
    }
}

impl GraphTile for OwnedGraphTileHandle {
    #[inline]
    fn graph_id(&self) -> GraphId {
        self.borrow_dependent().graph_id()
    }

    #[inline]
    fn may_contain_id(&self, id: GraphId) -> bool {
        self.borrow_dependent().may_contain_id(id)
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        self.borrow_dependent().header()
    }

    #[inline]
    fn get_node(&self, id: GraphId) -> Result<&NodeInfo, LookupError> {
        self.borrow_dependent().get_node(id)
    }

    #[inline]
    fn get_outbound_edges_from_node(&self, node_info: &NodeInfo) -> &[DirectedEdge] {
        self.borrow_dependent()
            .get_outbound_edges_from_node(node_info)
    }

    #[inline]
    fn get_directed_edge(&self, id: GraphId) -> Result<&DirectedEdge, LookupError> {
        self.borrow_dependent().get_directed_edge(id)
    }

    #[inline]
    fn get_opp_edge_index(&self, graph_id: GraphId) -> Result<OpposingEdgeIndex, LookupError> {
        self.borrow_dependent().get_opp_edge_index(graph_id)
    }

    #[inline]
    fn get_start_node_id(&self, edge_id: GraphId) -> Result<GraphId, LookupError> {
        self.borrow_dependent().get_start_node_id(edge_id)
    }

    #[inline]
    fn get_edge_info(
        &self,
        directed_edge: &DirectedEdge,
    ) -> Result<EdgeInfo<'_>, GraphTileDecodingError> {
        self.borrow_dependent().get_edge_info(directed_edge)
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        self.borrow_dependent().directed_edges()
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        self.borrow_dependent().nodes()
    }

    #[inline]
    fn edge_info_memory(&self) -> &[u8] {
        self.borrow_dependent().edge_info_memory()
    }

    #[inline]
    fn text_memory(&self) -> &[u8] {
        self.borrow_dependent().text_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_tile::fixtures::{TwoTileGraph, two_tile_graph};

    #[test]
    fn owned_handle_matches_view() {
        let TwoTileGraph { tile_b_bytes, .. } = two_tile_graph();
        let view = GraphTileView::try_from(tile_b_bytes.as_slice()).unwrap();
        let handle = OwnedGraphTileHandle::try_from(tile_b_bytes.clone()).unwrap();

        assert_eq!(handle.graph_id(), view.graph_id());
        assert_eq!(handle.nodes(), view.nodes());
        assert_eq!(handle.directed_edges(), view.directed_edges());
        assert_eq!(handle.as_bytes(), tile_b_bytes.as_slice());
    }

    #[test]
    fn invalid_bytes_are_rejected() {
        assert!(OwnedGraphTileHandle::try_from(vec![0u8; 7]).is_err());
    }
}
