//! Graph configuration file loading.

use anyhow::Context;
use roadgraph_tile::tile_provider::GraphReaderConfig;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// The subset of a graph configuration file that the export needs.
///
/// Unknown sections and keys are ignored, so full routing configs can be passed as-is.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub mjolnir: MjolnirConfig,
}

/// Tile storage settings.
#[derive(Debug, Deserialize)]
pub struct MjolnirConfig {
    /// The root of the tile directory tree.
    pub tile_dir: PathBuf,
    /// Cache bound; unbounded when absent.
    #[serde(default)]
    pub max_cached_tiles: Option<NonZeroUsize>,
}

impl Config {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Unable to open config file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}

impl MjolnirConfig {
    pub fn reader_config(&self) -> GraphReaderConfig {
        GraphReaderConfig {
            max_cached_tiles: self.max_cached_tiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "mjolnir": {{
                    "tile_dir": "/data/tiles",
                    "max_cached_tiles": 64,
                    "concurrency": 8
                }},
                "loki": {{"actions": ["route"]}}
            }}"#
        )
        .unwrap();

        let config = Config::from_path(file.path()).expect("Valid config");
        assert_eq!(config.mjolnir.tile_dir, Path::new("/data/tiles"));
        assert_eq!(
            config.mjolnir.reader_config().max_cached_tiles,
            NonZeroUsize::new(64)
        );
    }

    #[test]
    fn cache_defaults_to_unbounded() {
        let config: Config =
            serde_json::from_str(r#"{"mjolnir": {"tile_dir": "tiles"}}"#).unwrap();
        assert_eq!(config.mjolnir.reader_config(), GraphReaderConfig::default());
    }

    #[test]
    fn missing_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"loki": {{}}}}"#).unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("mjolnir"), "{err:#}");
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_path(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().starts_with("Unable to open config file"));
    }
}
