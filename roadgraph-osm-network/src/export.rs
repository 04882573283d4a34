//! # Network export
//!
//! Streams every eligible edge that has an opposing edge to a set of JSON artifacts:
//!
//! - `edge-ids.json`: the exported edge IDs
//! - `osm-ids.json`: the OSM node IDs of each edge, in shape order
//! - `lls.json`: the `[lon, lat]` shape of each edge
//! - `network.json`: all of the above keyed by edge ID, plus the way ID
//! - `edge-pairs.json`: `[edge, opposing edge]`, once per way
//!
//! Both directions of a way are exported.
//! The first three are parallel arrays (entry `i` describes the same edge).

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use roadgraph_tile::GraphId;
use roadgraph_tile::graph_tile::GraphTile;
use roadgraph_tile::pairing::{EdgePair, EdgePairs, PairingOptions};
use roadgraph_tile::tile_provider::{GraphReader, TileStore};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, trace};

const ZSTD_LEVEL: i32 = 3;

/// A single exported edge.
#[derive(Debug, Serialize)]
struct NetworkEdge<'a> {
    lls: &'a [[f64; 2]],
    way_id: u64,
    osmids: &'a [u64],
}

/// An artifact file, optionally zstd compressed.
enum Sink {
    Plain(BufWriter<File>),
    Zstd(zstd::Encoder<'static, BufWriter<File>>),
}

impl Sink {
    fn create(output_dir: &Path, name: &str, compress: bool) -> anyhow::Result<Self> {
        let file_name = if compress {
            format!("{name}.json.zst")
        } else {
            format!("{name}.json")
        };
        let path = output_dir.join(file_name);
        let file = File::create(&path)
            .with_context(|| format!("Unable to create {}", path.display()))?;
        let writer = BufWriter::new(file);

        Ok(if compress {
            Self::Zstd(zstd::Encoder::new(writer, ZSTD_LEVEL)?)
        } else {
            Self::Plain(writer)
        })
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut writer) => writer.flush(),
            Self::Zstd(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Writes a JSON array or object one element at a time, one element per line.
struct JsonStream<W> {
    out: W,
    close: &'static [u8],
    len: usize,
}

impl<W: Write> JsonStream<W> {
    fn array(out: W) -> io::Result<Self> {
        Self::open(out, b"[", b"\n]")
    }

    fn object(out: W) -> io::Result<Self> {
        Self::open(out, b"{", b"\n}")
    }

    fn open(mut out: W, open: &[u8], close: &'static [u8]) -> io::Result<Self> {
        out.write_all(open)?;
        Ok(Self { out, close, len: 0 })
    }

    fn next_element(&mut self) -> io::Result<()> {
        let separator: &[u8] = if self.len == 0 { b"\n" } else { b",\n" };
        self.len += 1;
        self.out.write_all(separator)
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> anyhow::Result<()> {
        self.next_element()?;
        serde_json::to_writer(&mut self.out, value)?;
        Ok(())
    }

    fn push_entry<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.next_element()?;
        serde_json::to_writer(&mut self.out, key)?;
        self.out.write_all(b":")?;
        serde_json::to_writer(&mut self.out, value)?;
        Ok(())
    }

    fn finish(mut self) -> io::Result<W> {
        self.out.write_all(self.close)?;
        Ok(self.out)
    }
}

/// The open artifact files.
pub struct Artifacts {
    edge_ids: JsonStream<Sink>,
    osm_ids: JsonStream<Sink>,
    lls: JsonStream<Sink>,
    network: JsonStream<Sink>,
    edge_pairs: JsonStream<Sink>,
}

impl Artifacts {
    /// Creates (or truncates) the artifact files in `output_dir`.
    pub fn create(output_dir: &Path, compress: bool) -> anyhow::Result<Self> {
        let sink = |name: &str| Sink::create(output_dir, name, compress);
        Ok(Self {
            edge_ids: JsonStream::array(sink("edge-ids")?)?,
            osm_ids: JsonStream::array(sink("osm-ids")?)?,
            lls: JsonStream::array(sink("lls")?)?,
            network: JsonStream::object(sink("network")?)?,
            edge_pairs: JsonStream::array(sink("edge-pairs")?)?,
        })
    }

    fn write_edge(&mut self, edge_id: GraphId, edge: &NetworkEdge) -> anyhow::Result<()> {
        self.edge_ids.push(&edge_id)?;
        self.osm_ids.push(edge.osmids)?;
        self.lls.push(edge.lls)?;
        self.network.push_entry(&edge_id.value().to_string(), edge)?;
        Ok(())
    }

    fn write_pair(&mut self, edge_id: GraphId, opposing_id: GraphId) -> anyhow::Result<()> {
        self.edge_pairs.push(&[edge_id, opposing_id])
    }

    /// Closes every artifact, flushing buffered output.
    pub fn finish(self) -> anyhow::Result<()> {
        for stream in [
            self.edge_ids,
            self.osm_ids,
            self.lls,
            self.network,
            self.edge_pairs,
        ] {
            stream.finish()?.finish()?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub tiles: usize,
    pub edges: usize,
    pub pairs: usize,
}

fn export_edge(artifacts: &mut Artifacts, tile_id: GraphId, pair: &EdgePair) -> anyhow::Result<()> {
    let edge_id = pair.edge_id;
    let edge_info = pair
        .tile
        .get_edge_info(pair.edge)
        .with_context(|| format!("Malformed edge info for edge {edge_id} in tile {tile_id}"))?;
    let lls: Vec<[f64; 2]> = edge_info
        .decode_raw_shape()
        .with_context(|| format!("Malformed shape for edge {edge_id} in tile {tile_id}"))?
        .into_iter()
        .map(|coord| [coord.x, coord.y])
        .collect();
    let osmids = edge_info
        .osmids()
        .with_context(|| format!("Malformed OSM IDs for edge {edge_id} in tile {tile_id}"))?
        .unwrap_or_else(|| {
            trace!(%edge_id, "Edge has no OSM node IDs");
            Vec::new()
        });

    artifacts.write_edge(
        edge_id,
        &NetworkEdge {
            lls: &lls,
            way_id: edge_info.way_id(),
            osmids: &osmids,
        },
    )?;
    if pair.is_canonical {
        artifacts.write_pair(edge_id, pair.opposing.address())?;
    }
    Ok(())
}

/// Exports every eligible edge in the store.
///
/// Edges whose opposing edge can't be resolved (ex: the neighbouring tile is missing)
/// are left out. Malformed tiles abort the export.
pub fn export_network<S: TileStore>(
    reader: &GraphReader<S>,
    options: &PairingOptions,
    artifacts: &mut Artifacts,
) -> anyhow::Result<ExportSummary> {
    info!("Enumerating tiles...");
    let tile_ids: Vec<GraphId> = reader.existing_tiles().collect();
    info!("Exporting {} tiles", tile_ids.len());

    let progress = ProgressBar::new(tile_ids.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} tiles {msg}")?,
    );

    let mut pairs = EdgePairs::new();
    let mut edges = 0;
    for &tile_id in &tile_ids {
        // Only the current tile and its neighbours are needed at any one time
        reader.clear();
        let tile = reader
            .get_tile(tile_id)
            .with_context(|| format!("Unable to load tile {tile_id}"))?;

        let before = edges;
        pairs
            .scan_tile(reader, options, &tile, |pair| {
                edges += 1;
                export_edge(artifacts, tile_id, &pair)
            })
            .with_context(|| format!("Failed to export tile {tile_id}"))?;
        debug!(%tile_id, edges = edges - before, "Exported tile");

        progress.inc(1);
        progress.set_message(format!("{} ways", pairs.len()));
    }
    progress.finish_and_clear();

    Ok(ExportSummary {
        tiles: tile_ids.len(),
        edges,
        pairs: pairs.len(),
    })
}
