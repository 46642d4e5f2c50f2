// config.rs - Viewer configuration loaded from life.toml

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use conway::{EngineError, GridConstraints};
use conway_worker::WorkerOptions;
use log::info;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PATH: &str = "life.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid [grid] section: {0}")]
    Grid(#[from] EngineError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LifeConfig {
    pub grid: GridConstraints,
    pub worker: WorkerOptions,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Side of one cell in points.
    pub cell_size: f32,
    pub frame_delay_ms: u64,
    /// When non-zero, print this many generations as text and exit.
    pub headless_generations: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cell_size: 10.0,
            frame_delay_ms: 50,
            headless_generations: 0,
        }
    }
}

impl LifeConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = Self::parse(&contents)?;
                info!("loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("no {} found, using default configuration", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.grid.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conway_worker::UnknownMethodPolicy;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = LifeConfig::parse("").unwrap();
        assert_eq!(config.grid, GridConstraints::default());
        assert_eq!(config.worker, WorkerOptions::default());
        assert_eq!(config.display.frame_delay_ms, 50);
        assert_eq!(config.display.headless_generations, 0);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = LifeConfig::parse(
            r#"
            [grid]
            rows = 20
            isTorus = false
            livingColor = 0x00ff00

            [worker]
            unknown_method = "ignore"

            [display]
            headless_generations = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.grid.rows, 20);
        assert_eq!(config.grid.cols, 64);
        assert!(!config.grid.is_torus);
        assert_eq!(config.grid.living_color, 0x00_FF_00);
        assert_eq!(config.worker.unknown_method, UnknownMethodPolicy::Ignore);
        assert_eq!(config.worker.thread_name, "conway-worker");
        assert_eq!(config.display.headless_generations, 5);
        assert_eq!(config.display.cell_size, 10.0);
    }

    #[test]
    fn test_colour_collision_is_rejected() {
        let err = LifeConfig::parse("[grid]\nlivingColor = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Grid(EngineError::ColorCollision(0))));
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        assert!(matches!(LifeConfig::parse("[grid\n"), Err(ConfigError::Parse(_))));
        assert!(matches!(LifeConfig::parse("[grid]\nrows = \"many\"\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = LifeConfig::load(Path::new("no/such/dir/life.toml")).unwrap();
        assert_eq!(config.grid, GridConstraints::default());
    }
}
