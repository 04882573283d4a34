//! # Edge pairing
//!
//! Every way is stored as two directed edges.
//! Pairing picks each way once, as a canonical `(edge, opposing edge)` pair,
//! skipping edges that don't correspond to a way in the road network (shortcuts, transit, ...).

use crate::GraphId;
use crate::graph_tile::{DirectedEdge, GraphTile, Use};
use crate::tile_provider::{
    EdgeHandle, GraphReader, GraphTileProviderError, TileHandle, TileStore, edges,
};
use bit_set::BitSet;
use enumset::{EnumSet, enum_set};
use std::collections::HashMap;
use tracing::debug;

const FERRIES: EnumSet<Use> = enum_set!(Use::Ferry | Use::RailFerry);

/// Which edges take part in pairing.
///
/// Shortcuts are always skipped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PairingOptions {
    pub skip_uses: EnumSet<Use>,
}

impl Default for PairingOptions {
    /// Skips transit connections, transit lines, and ferries.
    fn default() -> Self {
        Self {
            skip_uses: enum_set!(
                Use::TransitConnection
                    | Use::EgressConnection
                    | Use::PlatformConnection
                    | Use::Rail
                    | Use::Bus
                    | Use::Ferry
                    | Use::RailFerry
            ),
        }
    }
}

impl PairingOptions {
    /// Includes (or excludes) ferry edges.
    #[must_use]
    pub fn with_ferries(mut self, include_ferries: bool) -> Self {
        if include_ferries {
            self.skip_uses -= FERRIES;
        } else {
            self.skip_uses |= FERRIES;
        }
        self
    }

    #[must_use]
    pub fn is_eligible(&self, edge: &DirectedEdge) -> bool {
        !edge.is_shortcut() && !self.skip_uses.contains(edge.edge_use())
    }
}

/// Dense, global edge ordinals.
///
/// Tiles are assigned consecutive ordinal ranges in the order they are registered,
/// so per-edge flags over a whole graph fit in a bit set.
#[derive(Clone, Debug, Default)]
pub struct EdgeOrdinals {
    /// Tile base ID to (first ordinal, edge count)
    ranges: HashMap<GraphId, (usize, usize)>,
    len: usize,
}

impl EdgeOrdinals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns an ordinal range to the tile if it doesn't have one yet.
    ///
    /// Returns the first ordinal of the tile.
    pub fn register<T: GraphTile>(&mut self, tile: &T) -> usize {
        let next = self.len;
        let (offset, count) = *self
            .ranges
            .entry(tile.graph_id())
            .or_insert((next, tile.directed_edges().len()));
        if offset == next {
            self.len += count;
        }
        offset
    }

    /// The ordinal of an edge in a registered tile.
    #[must_use]
    pub fn ordinal(&self, edge_id: GraphId) -> Option<usize> {
        let (offset, count) = self.ranges.get(&edge_id.tile_base_id())?;
        let index = usize::try_from(edge_id.index()).ok()?;
        (index < *count).then_some(offset + index)
    }

    /// The total number of edges in all registered tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An eligible edge together with its resolved opposing edge.
#[derive(Clone, Debug)]
pub struct EdgePair<'a> {
    pub edge_id: GraphId,
    pub edge: &'a DirectedEdge,
    pub tile: &'a TileHandle,
    pub opposing: EdgeHandle,
    /// Whether `(edge_id, opposing)` was recorded as the canonical pair for its way.
    ///
    /// Exactly one of the two directions of a way is canonical.
    pub is_canonical: bool,
}

/// Collects canonical edge pairs, recording each edge at most once.
#[derive(Clone, Debug, Default)]
pub struct EdgePairs {
    ordinals: EdgeOrdinals,
    paired: BitSet,
    pairs: Vec<(GraphId, GraphId)>,
}

impl EdgePairs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the tile's edges known; see [`EdgeOrdinals::register`].
    pub fn register_tile<T: GraphTile>(&mut self, tile: &T) {
        self.ordinals.register(tile);
    }

    /// Whether the edge is part of a recorded pair.
    #[must_use]
    pub fn is_paired(&self, edge_id: GraphId) -> bool {
        self.ordinals
            .ordinal(edge_id)
            .is_some_and(|ordinal| self.paired.contains(ordinal))
    }

    /// Records `(edge_id, opposing_id)` unless either edge is already paired.
    ///
    /// Both edges must be in registered tiles.
    /// Returns whether the pair was recorded.
    pub fn offer(&mut self, edge_id: GraphId, opposing_id: GraphId) -> bool {
        let (Some(edge), Some(opposing)) = (
            self.ordinals.ordinal(edge_id),
            self.ordinals.ordinal(opposing_id),
        ) else {
            return false;
        };
        if edge == opposing || self.paired.contains(edge) || self.paired.contains(opposing) {
            return false;
        }

        self.paired.insert(edge);
        self.paired.insert(opposing);
        self.pairs.push((edge_id, opposing_id));
        true
    }

    /// Pairs the eligible edges of one tile.
    ///
    /// Every eligible edge with a resolvable opposing edge is passed to `visit`,
    /// in both directions; [`EdgePair::is_canonical`] marks the newly recorded pairs.
    /// Edges whose opposing edge can't be resolved are skipped.
    ///
    /// # Errors
    ///
    /// Fails if a tile can't be loaded, or with the first error from `visit`.
    pub fn scan_tile<S, F, E>(
        &mut self,
        reader: &GraphReader<S>,
        options: &PairingOptions,
        tile: &TileHandle,
        mut visit: F,
    ) -> Result<(), E>
    where
        S: TileStore,
        F: FnMut(EdgePair<'_>) -> Result<(), E>,
        E: From<GraphTileProviderError>,
    {
        self.register_tile(&**tile);

        for (edge_id, edge) in edges(&**tile) {
            if !options.is_eligible(edge) {
                continue;
            }

            let opposing = reader.get_opposing_edge(edge_id)?;
            let Some(opposing_tile) = opposing.tile() else {
                debug!(%edge_id, "Skipping edge without an opposing edge");
                continue;
            };
            self.register_tile(&**opposing_tile);

            let is_canonical = self.offer(edge_id, opposing.address());
            visit(EdgePair {
                edge_id,
                edge,
                tile,
                opposing,
                is_canonical,
            })?;
        }

        Ok(())
    }

    #[must_use]
    pub fn pairs(&self) -> &[(GraphId, GraphId)] {
        &self.pairs
    }

    #[must_use]
    pub fn into_pairs(self) -> Vec<(GraphId, GraphId)> {
        self.pairs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Pairs every eligible edge in the reader's store.
///
/// # Errors
///
/// Fails if a tile can't be loaded or is malformed.
pub fn pair_edges<S: TileStore>(
    reader: &GraphReader<S>,
    options: &PairingOptions,
) -> Result<Vec<(GraphId, GraphId)>, GraphTileProviderError> {
    let mut pairs = EdgePairs::new();
    let tile_ids: Vec<GraphId> = reader.existing_tiles().collect();
    for tile_id in tile_ids {
        let tile = reader.get_tile(tile_id)?;
        pairs.scan_tile(reader, options, &tile, |_| Ok::<_, GraphTileProviderError>(()))?;
    }

    Ok(pairs.into_pairs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_tile::fixtures::isolated_ways_tile;
    use crate::tile_provider::tests::two_tile_store;
    use crate::tile_provider::{GraphReaderConfig, InMemoryTileStore};
    use rand::rng;
    use rand::seq::SliceRandom;
    use std::collections::HashSet;

    fn reader_for(tile_id: GraphId, bytes: Vec<u8>) -> GraphReader<InMemoryTileStore> {
        GraphReader::new(
            InMemoryTileStore::from_iter([(tile_id, bytes)]),
            GraphReaderConfig::default(),
        )
    }

    #[test]
    fn default_options() {
        let options = PairingOptions::default();
        assert!(options.skip_uses.contains(Use::Ferry));
        assert!(options.skip_uses.contains(Use::TransitConnection));
        assert!(!options.skip_uses.contains(Use::Road));

        let with_ferries = options.with_ferries(true);
        assert!(!with_ferries.skip_uses.contains(Use::Ferry));
        assert!(!with_ferries.skip_uses.contains(Use::RailFerry));
        assert!(with_ferries.skip_uses.contains(Use::Bus));
        assert_eq!(with_ferries.with_ferries(false), options);
    }

    #[test]
    fn shortcuts_are_never_eligible() {
        let end = GraphId::try_from_components(0, 0, 0).unwrap();
        let edge = DirectedEdge::new(end, 0, Use::Road, 0, 1).unwrap();
        let options = PairingOptions {
            skip_uses: EnumSet::empty(),
        };
        assert!(options.is_eligible(&edge));
        assert!(!options.is_eligible(&edge.with_shortcut(true)));
    }

    #[test]
    fn ordinals_are_dense() {
        let (graph, store) = two_tile_store();
        let reader = GraphReader::new(store, GraphReaderConfig::default());
        let a = reader.get_tile(graph.tile_a).unwrap();
        let b = reader.get_tile(graph.tile_b).unwrap();

        let mut ordinals = EdgeOrdinals::new();
        assert_eq!(ordinals.register(&*a), 0);
        assert_eq!(ordinals.register(&*b), 3);
        // Registering again is a no-op
        assert_eq!(ordinals.register(&*a), 0);
        assert_eq!(ordinals.len(), 4);

        assert_eq!(ordinals.ordinal(graph.tile_b), Some(3));
        assert_eq!(ordinals.ordinal(graph.tile_a.with_index(2).unwrap()), Some(2));
        assert_eq!(ordinals.ordinal(graph.tile_a.with_index(3).unwrap()), None);
    }

    #[test]
    fn shuffled_offers_produce_one_pair_per_way() {
        const WAYS: usize = 500;
        let (tile_id, bytes) = isolated_ways_tile(WAYS, &[Use::Road], None);
        let reader = reader_for(tile_id, bytes);
        let tile = reader.get_tile(tile_id).unwrap();

        let mut edge_ids: Vec<GraphId> = edges(&*tile).map(|(id, _)| id).collect();
        assert_eq!(edge_ids.len(), 2 * WAYS);
        edge_ids.shuffle(&mut rng());

        let mut pairs = EdgePairs::new();
        pairs.register_tile(&*tile);
        for edge_id in edge_ids {
            let opposing = reader.opposing_edge_id(edge_id).unwrap();
            pairs.offer(edge_id, opposing);
        }

        assert_eq!(pairs.len(), WAYS);
        let mut seen = HashSet::new();
        for (edge, opposing) in pairs.pairs() {
            assert!(seen.insert(*edge));
            assert!(seen.insert(*opposing));
            assert_eq!(edge.index() / 2, opposing.index() / 2);
        }
        assert_eq!(seen.len(), 2 * WAYS);
    }

    #[test]
    fn offer_rejects_unknown_and_repeated_edges() {
        let (tile_id, bytes) = isolated_ways_tile(2, &[Use::Road], None);
        let reader = reader_for(tile_id, bytes);
        let tile = reader.get_tile(tile_id).unwrap();
        let id = |index| tile_id.with_index(index).unwrap();

        let mut pairs = EdgePairs::new();
        // Not registered yet
        assert!(!pairs.offer(id(0), id(1)));
        pairs.register_tile(&*tile);
        assert!(pairs.offer(id(0), id(1)));
        assert!(!pairs.offer(id(1), id(0)));
        assert!(!pairs.offer(id(1), id(2)));
        assert!(!pairs.offer(id(2), id(2)));
        assert!(pairs.is_paired(id(1)));
        assert!(!pairs.is_paired(id(2)));
    }

    #[test]
    fn pair_edges_applies_filters() {
        let uses = [Use::Road, Use::Ferry, Use::Bus, Use::Footway];
        let (tile_id, bytes) = isolated_ways_tile(40, &uses, Some(5));
        let reader = reader_for(tile_id, bytes);

        let pairs = pair_edges(&reader, &PairingOptions::default()).unwrap();
        let tile = reader.get_tile(tile_id).unwrap();
        // Road and Footway ways are kept, every fifth way is a shortcut
        let expected = (0..40)
            .filter(|way| way % 5 != 0 && matches!(uses[way % 4], Use::Road | Use::Footway))
            .count();
        assert_eq!(pairs.len(), expected);
        for (edge, _) in &pairs {
            let edge = tile.get_directed_edge(*edge).unwrap();
            assert!(!edge.is_shortcut());
            assert!(!edge.edge_use().is_ferry());
        }

        let options = PairingOptions::default().with_ferries(true);
        let with_ferries = pair_edges(&reader, &options).unwrap();
        let ferries = (0..40).filter(|way| way % 5 != 0 && way % 4 == 1).count();
        assert_eq!(with_ferries.len(), expected + ferries);
    }

    #[test]
    fn pairs_across_tiles() {
        let (graph, store) = two_tile_store();
        let reader = GraphReader::new(store, GraphReaderConfig::default());

        let pairs = pair_edges(&reader, &PairingOptions::default()).unwrap();
        assert_eq!(
            pairs,
            vec![
                (graph.tile_a.with_index(0).unwrap(), graph.tile_a.with_index(1).unwrap()),
                (graph.tile_a.with_index(2).unwrap(), graph.tile_b),
            ]
        );
    }

    #[test]
    fn scan_visits_both_directions() {
        let (graph, store) = two_tile_store();
        let reader = GraphReader::new(store, GraphReaderConfig::default());
        let mut pairs = EdgePairs::new();
        let mut visited = Vec::new();

        for tile_id in [graph.tile_a, graph.tile_b] {
            let tile = reader.get_tile(tile_id).unwrap();
            pairs
                .scan_tile(&reader, &PairingOptions::default(), &tile, |pair| {
                    visited.push((pair.edge_id, pair.opposing.address(), pair.is_canonical));
                    Ok::<_, GraphTileProviderError>(())
                })
                .unwrap();
        }

        let id = |tile: GraphId, index| tile.with_index(index).unwrap();
        let (e0, e1, e2) = (id(graph.tile_a, 0), id(graph.tile_a, 1), id(graph.tile_a, 2));
        let f0 = graph.tile_b;
        assert_eq!(
            visited,
            vec![
                (e0, e1, true),
                (e1, e0, false),
                (e2, f0, true),
                (f0, e2, false),
            ]
        );
        assert_eq!(pairs.pairs(), &[(e0, e1), (e2, f0)]);
    }

    #[test]
    fn scan_skips_unresolvable_edges() {
        let graph = crate::graph_tile::fixtures::two_tile_graph();
        let store = InMemoryTileStore::from_iter([(graph.tile_a, graph.tile_a_bytes)]);
        let reader = GraphReader::new(store, GraphReaderConfig::default());

        let pairs = pair_edges(&reader, &PairingOptions::default()).unwrap();
        assert_eq!(pairs.len(), 1);
    }
}
