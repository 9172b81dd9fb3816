//! Configuration system for VPCsim runs.
//!
//! Supports YAML configuration files with sensible defaults. Every section
//! may be omitted, but a section that is present must spell out all of its
//! keys, and unknown keys are rejected.

use crate::environment::{EnvironmentConfig, HealthConfig};
use crate::initializer::{InitMode, InitializationConfig, StartingMatrixError};
use crate::replacement::DispersalWeights;
use crate::species::{AffinityMatrix, SpeciesCatalog, SpeciesTable};
use crate::succession::EngineConfig;
use crate::terrain::ElevationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
///
/// All of them surface before generation 0 is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("missing configuration key `{0}`")]
    MissingKey(&'static str),
    #[error("species {id} is not in the catalog ({catalog_size} entries)")]
    UnknownSpecies { id: usize, catalog_size: usize },
    #[error("`{key}` level code {code} is not one of 0..={max}")]
    UnknownLevel { key: &'static str, code: u8, max: usize },
    #[error("affinity matrix must be {expected}x{expected}, got {rows} rows (offending width {cols})")]
    AffinityShape { expected: usize, rows: usize, cols: usize },
    #[error("dispersal weights must be non-negative and sum to 1, got {sum}")]
    DispersalWeights { sum: f32 },
    #[error("invalid starting matrix: {0}")]
    StartingMatrix(#[from] StartingMatrixError),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub community: CommunityConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub dispersal: DispersalWeights,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub initialization: InitializationConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Landscape dimensions and relief
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldConfig {
    /// Cells along x
    pub x_cells: usize,
    /// Cells along z
    pub z_cells: usize,
    /// Elevation model
    pub elevation: ElevationConfig,
}

/// Which species take part and how they interact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityConfig {
    /// Catalog ids of the community members; member i gets species id i+1
    pub species: Vec<usize>,
    /// Explicit (N+1)x(N+1) affinity rows; generated when absent
    pub affinity: Option<Vec<Vec<f32>>>,
    /// YAML catalog replacing the built-in prototypes
    pub catalog_file: Option<PathBuf>,
}

/// Logging and checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Generations between summary lines
    pub stats_interval: u64,
    /// Generations between checkpoints
    pub checkpoint_interval: u64,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            x_cells: 200,
            z_cells: 200,
            elevation: ElevationConfig::default(),
        }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            species: vec![11, 1, 5, 16, 17],
            affinity: None,
            catalog_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stats_interval: 10,
            checkpoint_interval: 100,
            log_level: "info".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Total number of cells in the grid
    pub fn total_cells(&self) -> usize {
        self.world.x_cells * self.world.z_cells
    }

    /// Validate configuration values that need no catalog lookup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.x_cells == 0 || self.world.z_cells == 0 {
            return Err(ConfigError::Invalid("x_cells and z_cells must be > 0".to_string()));
        }
        if self.world.elevation.scale <= 0.0 || self.world.elevation.octaves == 0 {
            return Err(ConfigError::Invalid(
                "elevation scale and octaves must be > 0".to_string(),
            ));
        }
        if self.community.species.is_empty() {
            return Err(ConfigError::Invalid("community.species must not be empty".to_string()));
        }

        // Decoding doubles as the level-code check
        self.environment.parameters()?;
        self.dispersal.validate()?;
        self.health.validate()?;

        if let Some(rows) = &self.community.affinity {
            AffinityMatrix::from_rows(self.community.species.len(), rows)?;
        }

        let init = &self.initialization;
        if !(0.0..=1.0).contains(&init.initial_age_fraction) {
            return Err(ConfigError::Invalid(
                "initial_age_fraction must be between 0 and 1".to_string(),
            ));
        }
        if init.mode == InitMode::Matrix {
            if init.starting_matrix.is_none() {
                return Err(ConfigError::MissingKey("initialization.starting_matrix"));
            }
            if init.control_x == 0 || init.control_z == 0 {
                return Err(ConfigError::Invalid("control grid must be at least 1x1".to_string()));
            }
        }
        if self.logging.stats_interval == 0 {
            return Err(ConfigError::Invalid("stats_interval must be > 0".to_string()));
        }
        Ok(())
    }

    /// Load the catalog (built-in or from file)
    pub fn catalog(&self) -> Result<SpeciesCatalog, ConfigError> {
        match &self.community.catalog_file {
            Some(path) => SpeciesCatalog::from_file(path),
            None => Ok(SpeciesCatalog::default()),
        }
    }

    /// Resolve the community into its species table and affinity matrix
    pub fn community(&self) -> Result<(SpeciesTable, AffinityMatrix), ConfigError> {
        let table = self.catalog()?.select(&self.community.species)?;
        let affinity = match &self.community.affinity {
            Some(rows) => AffinityMatrix::from_rows(table.len(), rows)?,
            None => AffinityMatrix::uniform(
                table.len(),
                AffinityMatrix::DEFAULT_COLONIZATION,
                AffinityMatrix::DEFAULT_REPLACEMENT,
            ),
        };
        Ok((table, affinity))
    }
}
