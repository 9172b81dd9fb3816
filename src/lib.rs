//! # VPCSIM
//!
//! Spatial, stochastic plant-community succession on a 2D grid.
//!
//! ## Features
//!
//! - **Cellular**: each cell holds a gap, a permanent gap or one plant
//! - **Environmental**: survival and establishment follow water, light,
//!   temperature, elevation and age responses
//! - **Parallel**: optional per-cell random sub-streams stepped on Rayon
//! - **Configurable**: YAML configuration files
//! - **Reproducible**: seeded ChaCha random streams and binary checkpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vpcsim::{SimulationConfig, SimulationRun};
//!
//! let config = SimulationConfig::default();
//! let mut run = SimulationRun::new_with_seed(config, 42)?;
//!
//! run.run(100);
//!
//! println!("{}", run.latest().stats().summary());
//! # Ok::<(), vpcsim::ConfigError>(())
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use vpcsim::SimulationConfig;
//!
//! let mut config = SimulationConfig::default();
//! config.world.x_cells = 50;
//! config.world.z_cells = 50;
//! config.environment.disturbance = 3;
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Checkpoints
//!
//! ```rust,no_run
//! use vpcsim::{SimulationConfig, SimulationRun};
//! use vpcsim::checkpoint::Checkpoint;
//!
//! let mut run = SimulationRun::new(SimulationConfig::default()).unwrap();
//! run.run(100);
//!
//! run.create_checkpoint().save("checkpoint.bin").unwrap();
//!
//! let loaded = Checkpoint::load("checkpoint.bin").unwrap();
//! let mut resumed = SimulationRun::from_checkpoint(loaded).unwrap();
//! resumed.run(100);
//! ```

pub mod checkpoint;
pub mod config;
pub mod disturbance;
pub mod environment;
pub mod export;
pub mod generation;
pub mod grid;
pub mod initializer;
pub mod replacement;
pub mod run;
pub mod species;
pub mod stats;
pub mod succession;
pub mod terrain;

// Re-export main types
pub use config::{ConfigError, SimulationConfig};
pub use generation::Generation;
pub use grid::{Cell, CellGrid, Occupant};
pub use run::{simulate, SimulationRun};
pub use stats::GenerationStats;
pub use succession::{RngMode, SuccessionEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time `generations` steps on a `size` x `size` default community
pub fn benchmark(generations: u64, size: usize, rng_mode: RngMode) -> Result<BenchmarkResult, ConfigError> {
    use std::time::Instant;

    let mut config = SimulationConfig::default();
    config.world.x_cells = size;
    config.world.z_cells = size;
    config.engine.rng_mode = rng_mode;

    let mut run = SimulationRun::new_with_seed(config, 42)?;

    let start = Instant::now();
    run.run(generations);
    let elapsed = start.elapsed();

    Ok(BenchmarkResult {
        generations,
        cells: size * size,
        rng_mode,
        elapsed_secs: elapsed.as_secs_f64(),
        generations_per_second: generations as f64 / elapsed.as_secs_f64(),
        final_richness: run.latest().stats().richness(),
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub generations: u64,
    pub cells: usize,
    pub rng_mode: RngMode,
    pub elapsed_secs: f64,
    pub generations_per_second: f64,
    pub final_richness: usize,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Generations: {}", self.generations)?;
        writeln!(f, "Cells: {} ({:?})", self.cells, self.rng_mode)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} generations/s", self.generations_per_second)?;
        writeln!(f, "Cell updates: {:.0}/s", self.generations_per_second * self.cells as f64)?;
        writeln!(f, "Surviving species: {}", self.final_richness)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_quick_simulation() {
        let mut config = SimulationConfig::default();
        config.world.x_cells = 40;
        config.world.z_cells = 40;
        let mut run = SimulationRun::new(config).unwrap();

        run.run(20);

        assert_eq!(run.latest().index(), 20);
    }

    #[test]
    fn test_benchmark() {
        let result = benchmark(10, 20, RngMode::Substream).unwrap();

        assert_eq!(result.generations, 10);
        assert_eq!(result.cells, 400);
        assert!(result.generations_per_second > 0.0);
    }
}
