//! Dumps a representation of the road network with respect to OSM IDs.
//!
//! Each way is written once, with its shape, way ID, and OSM node IDs.
//! See [`export`] for the artifact layout.
//!
//! # Example
//!
//! ```bash
//! roadgraph-osm-network graph.json --output-dir network --compress
//! ```

use anyhow::Context;
use clap::Parser;
use roadgraph_tile::pairing::PairingOptions;
use roadgraph_tile::tile_provider::{DirectoryTileStore, GraphReader};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod export;

use config::Config;
use export::Artifacts;

#[derive(Parser, Debug)]
#[command(version, about = "Dumps a tiled road graph as OSM-keyed JSON network artifacts")]
struct Cli {
    /// Graph configuration file (JSON, with a `mjolnir` section)
    #[arg(env = "ROADGRAPH_CONFIG")]
    config: PathBuf,

    /// Directory to write the artifacts to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Write zstd-compressed `.json.zst` artifacts
    #[arg(long)]
    compress: bool,

    /// Export ferry edges too
    #[arg(long)]
    include_ferries: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_path(&cli.config)?;
    info!(tile_dir = %config.mjolnir.tile_dir.display(), "Reading tiles");

    let reader = GraphReader::new(
        DirectoryTileStore::new(&config.mjolnir.tile_dir),
        config.mjolnir.reader_config(),
    );
    let options = PairingOptions::default().with_ferries(cli.include_ferries);

    fs::create_dir_all(&cli.output_dir).with_context(|| {
        format!(
            "Unable to create output directory {}",
            cli.output_dir.display()
        )
    })?;
    let mut artifacts = Artifacts::create(&cli.output_dir, cli.compress)?;
    let summary = export::export_network(&reader, &options, &mut artifacts)?;
    artifacts.finish()?;

    info!(
        tiles = summary.tiles,
        edges = summary.edges,
        ways = summary.pairs,
        "Done"
    );
    Ok(())
}
