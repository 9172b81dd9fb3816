//! Simulation run: owns the random stream and steps generations in order.

use crate::checkpoint::Checkpoint;
use crate::config::{ConfigError, SimulationConfig};
use crate::generation::Generation;
use crate::grid::PermanentDisturbanceMap;
use crate::initializer::{matrix_generation, random_generation, InitMode, StartingMatrix};
use crate::stats::StatsHistory;
use crate::succession::SuccessionEngine;
use crate::terrain::{ElevationMap, Landscape};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::ops::ControlFlow;

/// Offset applied to the run seed for the elevation noise
const ELEVATION_SEED_OFFSET: u64 = 12345;

/// Step `engine` from `initial` until `generation_count` generations exist
/// (including `initial`). Returns them in order.
pub fn simulate<R: Rng + ?Sized>(
    initial: Generation,
    generation_count: usize,
    engine: &SuccessionEngine,
    rng: &mut R,
) -> Vec<Generation> {
    let mut history = Vec::with_capacity(generation_count);
    if generation_count == 0 {
        return history;
    }
    history.push(initial);
    while history.len() < generation_count {
        let next = engine.step(&history[history.len() - 1], rng);
        history.push(next);
    }
    history
}

/// A simulation in progress and everything it has produced so far
pub struct SimulationRun {
    // Configuration
    config: SimulationConfig,

    // Model, fixed for the run
    engine: SuccessionEngine,

    // Generations 0..=latest, never modified once pushed
    history: Vec<Generation>,

    // Random number generator (seeded for reproducibility)
    rng: ChaCha8Rng,
    seed: u64,
}

impl SimulationRun {
    /// Create a run with a random seed
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        let seed = rand::thread_rng().gen();
        Self::new_with_seed(config, seed)
    }

    /// Create a run with a specific seed for reproducibility.
    ///
    /// Every configuration error, including a malformed starting matrix, is
    /// reported here before generation 0 exists.
    pub fn new_with_seed(config: SimulationConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let (x_cells, z_cells) = (config.world.x_cells, config.world.z_cells);
        let species_count = config.community()?.0.len();

        let init = &config.initialization;
        let matrix = match init.mode {
            InitMode::Random => None,
            InitMode::Matrix => {
                let encoded = init
                    .starting_matrix
                    .as_deref()
                    .ok_or(ConfigError::MissingKey("initialization.starting_matrix"))?;
                Some(StartingMatrix::parse(encoded, init.control_x, init.control_z, species_count)?)
            }
        };

        let permanent = match &matrix {
            Some(m) => m.permanent_map(x_cells, z_cells),
            None => PermanentDisturbanceMap::empty(x_cells, z_cells),
        };
        let elevation = ElevationMap::generate(
            x_cells,
            z_cells,
            &config.world.elevation,
            seed.wrapping_add(ELEVATION_SEED_OFFSET),
        );
        let engine = SuccessionEngine::from_config(&config, Landscape::new(elevation, permanent))?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let age_fraction = init.initial_age_fraction;
        let first = match &matrix {
            Some(m) => matrix_generation(m, engine.species(), x_cells, z_cells, age_fraction, &mut rng),
            None => random_generation(engine.species(), x_cells, z_cells, age_fraction, &mut rng),
        };

        log::info!(
            "New run: seed={} grid={}x{} species={} permanent_gaps={}",
            seed,
            x_cells,
            z_cells,
            species_count,
            first.stats().permanent_gaps
        );

        Ok(Self {
            config,
            engine,
            history: vec![first],
            rng,
            seed,
        })
    }

    /// Start from an externally supplied engine and generation 0
    pub fn from_parts(
        config: SimulationConfig,
        engine: SuccessionEngine,
        initial: Generation,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        initial
            .verify(&engine.landscape().permanent, engine.species().len())
            .map_err(ConfigError::Invalid)?;

        Ok(Self {
            config,
            engine,
            history: vec![initial],
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        })
    }

    /// Restore a run from a checkpoint; stepping continues the same stream
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self, ConfigError> {
        if checkpoint.history.is_empty() {
            return Err(ConfigError::Invalid("checkpoint holds no generations".to_string()));
        }
        log::info!(
            "Restored run: seed={} generations={}",
            checkpoint.random_seed,
            checkpoint.history.len()
        );
        Ok(Self {
            config: checkpoint.config,
            engine: checkpoint.engine,
            history: checkpoint.history,
            rng: checkpoint.rng,
            seed: checkpoint.random_seed,
        })
    }

    /// Create checkpoint of current state
    pub fn create_checkpoint(&self) -> Checkpoint {
        Checkpoint::new(
            self.config.clone(),
            self.engine.clone(),
            self.history.clone(),
            self.rng.clone(),
            self.seed,
        )
    }

    /// Compute and publish the next generation
    pub fn step(&mut self) -> &Generation {
        let previous = &self.history[self.history.len() - 1];
        let next = self.engine.step(previous, &mut self.rng);
        self.history.push(next);
        self.latest()
    }

    /// Step `generations` more times
    pub fn run(&mut self, generations: u64) {
        for _ in 0..generations {
            self.step();
        }
    }

    /// Step up to `generations` more times, handing each completed
    /// generation to `callback`. Breaking stops further stepping; the
    /// history computed so far is kept. Returns the number of steps taken.
    pub fn run_with_callback<F>(&mut self, generations: u64, mut callback: F) -> u64
    where
        F: FnMut(&Generation) -> ControlFlow<()>,
    {
        for i in 0..generations {
            let generation = self.step();
            if callback(generation).is_break() {
                log::info!("Run stopped after generation {}", generation.index());
                return i + 1;
            }
        }
        generations
    }

    /// Most recent generation
    pub fn latest(&self) -> &Generation {
        // Construction always leaves generation 0 in place
        &self.history[self.history.len() - 1]
    }

    pub fn generation(&self, index: usize) -> Option<&Generation> {
        self.history.get(index)
    }

    pub fn history(&self) -> &[Generation] {
        &self.history
    }

    /// Aggregates of every generation so far
    pub fn stats_history(&self) -> StatsHistory {
        StatsHistory {
            snapshots: self.history.iter().map(|g| g.stats().clone()).collect(),
        }
    }

    pub fn engine(&self) -> &SuccessionEngine {
        &self.engine
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Get seed for reproducibility
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.world.x_cells = 24;
        config.world.z_cells = 16;
        config
    }

    #[test]
    fn test_run_creation() {
        let run = SimulationRun::new(test_config()).unwrap();
        assert_eq!(run.history().len(), 1);
        assert_eq!(run.latest().index(), 0);
        assert_eq!(run.latest().stats().total_cells(), 24 * 16);
    }

    #[test]
    fn test_run_steps() {
        let mut run = SimulationRun::new_with_seed(test_config(), 1).unwrap();
        run.run(15);
        assert_eq!(run.history().len(), 16);
        for (i, g) in run.history().iter().enumerate() {
            assert_eq!(g.index(), i as u64);
        }
    }

    #[test]
    fn test_callback_can_stop() {
        let mut run = SimulationRun::new_with_seed(test_config(), 2).unwrap();
        let taken = run.run_with_callback(100, |g| {
            if g.index() == 5 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(taken, 5);
        assert_eq!(run.latest().index(), 5);
    }

    #[test]
    fn test_reproducibility() {
        let mut run1 = SimulationRun::new_with_seed(test_config(), 42).unwrap();
        let mut run2 = SimulationRun::new_with_seed(test_config(), 42).unwrap();
        run1.run(20);
        run2.run(20);
        assert_eq!(run1.history(), run2.history());
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let mut run = SimulationRun::new_with_seed(test_config(), 12345).unwrap();
        run.run(5);

        let mut restored = SimulationRun::from_checkpoint(run.create_checkpoint()).unwrap();
        assert_eq!(restored.history(), run.history());
        assert_eq!(restored.seed(), run.seed());

        run.run(5);
        restored.run(5);
        assert_eq!(restored.latest(), run.latest());
    }

    #[test]
    fn test_simulate_counts() {
        let run = SimulationRun::new_with_seed(test_config(), 3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let history = simulate(run.latest().clone(), 4, run.engine(), &mut rng);
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].index(), 3);
        assert!(simulate(run.latest().clone(), 0, run.engine(), &mut rng).is_empty());
    }

    #[test]
    fn test_unmarked_permanent_gap_stays_permanent() {
        use crate::environment::{EnvironmentParameters, HealthConfig};
        use crate::grid::{Cell, CellGrid};
        use crate::replacement::DispersalWeights;
        use crate::species::{AffinityMatrix, SpeciesProfile, SpeciesTable};
        use crate::succession::RngMode;

        for mode in [RngMode::Sequential, RngMode::Substream] {
            let environment = EnvironmentParameters {
                ongoing_disturbance_rate: 0.1,
                ..EnvironmentParameters::default()
            };
            // Nothing in the landscape marks (1, 1)
            let engine = SuccessionEngine::new(
                SpeciesTable::new(vec![SpeciesProfile::tolerant("a", 25)]).unwrap(),
                AffinityMatrix::uniform(1, 0.4, 0.1),
                &environment,
                HealthConfig::default(),
                DispersalWeights::default(),
                Landscape::flat(3, 3, 35.0),
                mode,
            );

            let mut grid = CellGrid::from_cells(3, 3, vec![Cell::established(1, 1.0); 9]);
            grid.set(1, 1, Cell::PERMANENT_GAP);
            let initial = Generation::new(0, grid, 1);

            let mut rng = ChaCha8Rng::seed_from_u64(8);
            let history = simulate(initial, 200, &engine, &mut rng);

            assert_eq!(history.len(), 200);
            for generation in &history {
                assert_eq!(*generation.cell(1, 1), Cell::PERMANENT_GAP, "{:?} generation {}", mode, generation.index());
                assert_eq!(generation.stats().permanent_gaps, 1);
            }
        }
    }

    #[test]
    fn test_bad_matrix_rejected_before_generation_zero() {
        let mut config = test_config();
        config.initialization.mode = InitMode::Matrix;
        config.initialization.starting_matrix = Some("RRR".to_string());
        assert!(matches!(
            SimulationRun::new_with_seed(config, 1),
            Err(ConfigError::StartingMatrix(_))
        ));
    }
}
