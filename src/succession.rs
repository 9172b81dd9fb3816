//! Succession engine: turns generation g into generation g+1.
//!
//! Each cell's next state depends only on the previous generation (its
//! grid and aggregates), never on other cells' new values, so cells can be
//! computed in any order. Per cell the decision runs:
//!
//! 1. permanent gap -> stays a permanent gap
//! 2. disturbed -> gap, no replacement draw
//! 3. live plant -> survival draw on its overall health, then
//!    - survived: replacement draw against the occupant; none means it
//!      persists, ages and grows
//!    - died: colonisation draw against a gap in the same step
//! 4. gap -> colonisation draw
//!
//! Random draws come either from the run's single stream in row-major order
//! ([`RngMode::Sequential`]) or from per-cell ChaCha sub-streams keyed by a
//! per-generation key ([`RngMode::Substream`]), which lets rows run on the
//! rayon pool. Both are reproducible from the run seed; a run uses one mode
//! throughout.

use crate::config::{ConfigError, SimulationConfig};
use crate::disturbance::DisturbanceModel;
use crate::environment::{EnvironmentParameters, HealthConfig, HealthModel};
use crate::generation::Generation;
use crate::grid::{Cell, CellGrid, Occupant};
use crate::replacement::{select_next_species, DispersalWeights, ReplacementModel, Selection};
use crate::species::{AffinityMatrix, SpeciesId, SpeciesTable};
use crate::stats::GenerationStats;
use crate::terrain::Landscape;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How random draws are assigned to cells
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RngMode {
    /// One stream: disturbance mask row-major, then transitions row-major
    #[default]
    Sequential,
    /// One key per generation from the run stream, one sub-stream per cell
    Substream,
}

/// Engine section of the configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub rng_mode: RngMode,
}

/// What happened to a cell during one step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    PermanentGap,
    Disturbed,
    /// Survived and was not displaced
    Persisted,
    /// Survived but was displaced by a new plant
    Replaced(SpeciesId),
    /// Died and nothing took its place
    Died,
    /// Died and was recolonised in the same step
    Recolonized(SpeciesId),
    StayedGap,
    /// A gap was colonised
    Established(SpeciesId),
}

/// Next state of one cell
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellUpdate {
    pub cell: Cell,
    pub transition: Transition,
    /// The selection draw had to clamp its cumulative probability
    pub clamped: bool,
}

impl CellUpdate {
    const PERMANENT_GAP: CellUpdate = CellUpdate {
        cell: Cell::PERMANENT_GAP,
        transition: Transition::PermanentGap,
        clamped: false,
    };
}

/// Per-worker buffers reused across cells
struct Scratch {
    neighbors: Vec<u32>,
    probabilities: Vec<f32>,
}

impl Scratch {
    fn new(species_count: usize) -> Self {
        Self {
            neighbors: vec![0; species_count + 1],
            probabilities: vec![0.0; species_count + 1],
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    disturbed: u32,
    clamped: u32,
}

impl Tally {
    fn record(&mut self, update: &CellUpdate) {
        if update.transition == Transition::Disturbed {
            self.disturbed += 1;
        }
        if update.clamped {
            self.clamped += 1;
        }
    }

    fn merge(self, other: Tally) -> Tally {
        Tally {
            disturbed: self.disturbed + other.disturbed,
            clamped: self.clamped + other.clamped,
        }
    }
}

/// The per-generation state-transition function
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccessionEngine {
    species: SpeciesTable,
    health: HealthModel,
    replacement: ReplacementModel,
    disturbance: DisturbanceModel,
    landscape: Landscape,
    rng_mode: RngMode,
}

impl SuccessionEngine {
    /// Assemble an engine; all inputs stay fixed for the run
    pub fn new(
        species: SpeciesTable,
        affinity: AffinityMatrix,
        environment: &EnvironmentParameters,
        health: HealthConfig,
        dispersal: DispersalWeights,
        landscape: Landscape,
        rng_mode: RngMode,
    ) -> Self {
        assert_eq!(
            species.len(),
            affinity.species_count(),
            "affinity matrix does not match the species table"
        );
        assert!(
            dispersal.validate().is_ok(),
            "invalid dispersal weights: {:?}",
            dispersal
        );
        let health = HealthModel::new(&species, environment, health);
        Self {
            species,
            health,
            replacement: ReplacementModel::new(dispersal, affinity),
            disturbance: DisturbanceModel::new(environment.ongoing_disturbance_rate),
            landscape,
            rng_mode,
        }
    }

    /// Build an engine from a configuration and an already-built landscape
    pub fn from_config(config: &SimulationConfig, landscape: Landscape) -> Result<Self, ConfigError> {
        config.validate()?;
        if landscape.dimensions() != (config.world.x_cells, config.world.z_cells) {
            return Err(ConfigError::Invalid(format!(
                "landscape is {:?} but the world is {}x{}",
                landscape.dimensions(),
                config.world.x_cells,
                config.world.z_cells
            )));
        }
        let (species, affinity) = config.community()?;
        let environment = config.environment.parameters()?;
        Ok(Self::new(
            species,
            affinity,
            &environment,
            config.health.clone(),
            config.dispersal,
            landscape,
            config.engine.rng_mode,
        ))
    }

    pub fn species(&self) -> &SpeciesTable {
        &self.species
    }

    pub fn health(&self) -> &HealthModel {
        &self.health
    }

    pub fn replacement(&self) -> &ReplacementModel {
        &self.replacement
    }

    pub fn disturbance(&self) -> &DisturbanceModel {
        &self.disturbance
    }

    pub fn landscape(&self) -> &Landscape {
        &self.landscape
    }

    pub fn rng_mode(&self) -> RngMode {
        self.rng_mode
    }

    /// Produce the next generation from `previous`
    pub fn step<R: Rng + ?Sized>(&self, previous: &Generation, rng: &mut R) -> Generation {
        let (x_cells, z_cells) = self.landscape.dimensions();
        let grid = previous.grid();
        assert_eq!(
            (grid.x_cells(), grid.z_cells()),
            (x_cells, z_cells),
            "generation grid does not match the landscape"
        );
        let n = self.species.len();

        let (cells, tally) = match self.rng_mode {
            RngMode::Sequential => {
                let mask = self.disturbance.mask(&self.landscape.permanent, rng);
                let mut scratch = Scratch::new(n);
                let mut tally = Tally::default();
                let mut cells = Vec::with_capacity(x_cells * z_cells);
                for z in 0..z_cells {
                    for x in 0..x_cells {
                        let update = self.transition_cell(previous, x, z, mask.get(x, z), rng, &mut scratch);
                        tally.record(&update);
                        cells.push(update.cell);
                    }
                }
                (cells, tally)
            }
            RngMode::Substream => {
                let key: u64 = rng.gen();
                let rows: Vec<(Vec<Cell>, Tally)> = (0..z_cells)
                    .into_par_iter()
                    .map(|z| {
                        let mut scratch = Scratch::new(n);
                        let mut tally = Tally::default();
                        let mut row = Vec::with_capacity(x_cells);
                        for x in 0..x_cells {
                            let mut cell_rng = cell_stream(key, (z * x_cells + x) as u64);
                            let permanent = self.landscape.permanent.is_disturbed(x, z);
                            let disturbed = self.disturbance.is_disturbed(permanent, &mut cell_rng);
                            let update =
                                self.transition_cell(previous, x, z, disturbed, &mut cell_rng, &mut scratch);
                            tally.record(&update);
                            row.push(update.cell);
                        }
                        (row, tally)
                    })
                    .collect();

                let mut tally = Tally::default();
                let mut cells = Vec::with_capacity(x_cells * z_cells);
                for (row, row_tally) in rows {
                    cells.extend(row);
                    tally = tally.merge(row_tally);
                }
                (cells, tally)
            }
        };

        let index = previous.index() + 1;
        let grid = CellGrid::from_cells(x_cells, z_cells, cells);
        let mut stats = GenerationStats::from_grid(index, &grid, n);
        stats.disturbed = tally.disturbed;
        stats.clamped_selections = tally.clamped;

        if tally.clamped > 0 {
            log::warn!(
                "generation {}: {} selection draws had replacement probabilities summing above 1; check dispersal weights and affinities",
                index,
                tally.clamped
            );
        }
        log::debug!("{}", stats.summary());

        Generation::with_stats(grid, stats)
    }

    /// Compute one cell's next state.
    ///
    /// `disturbed` is this cell's entry of the generation's disturbance mask.
    pub fn next_cell<R: Rng + ?Sized>(
        &self,
        previous: &Generation,
        x: usize,
        z: usize,
        disturbed: bool,
        rng: &mut R,
    ) -> CellUpdate {
        let mut scratch = Scratch::new(self.species.len());
        self.transition_cell(previous, x, z, disturbed, rng, &mut scratch)
    }

    fn transition_cell<R: Rng + ?Sized>(
        &self,
        previous: &Generation,
        x: usize,
        z: usize,
        disturbed: bool,
        rng: &mut R,
        scratch: &mut Scratch,
    ) -> CellUpdate {
        let current = *previous.cell(x, z);

        // Once -1, always -1, whether or not the landscape marks the cell
        if self.landscape.permanent.is_disturbed(x, z) || current.occupant == Occupant::PermanentGap {
            return CellUpdate::PERMANENT_GAP;
        }
        if disturbed {
            return CellUpdate {
                cell: Cell::GAP,
                transition: Transition::Disturbed,
                clamped: false,
            };
        }

        let elevation = self.landscape.elevation.get(x, z);

        match current.occupant {
            Occupant::Species(species) => {
                let vigor = self.health.overall_health(species, current.age, elevation);
                let survives = rng.gen::<f32>() < vigor;

                if survives {
                    let selection = self.draw_successor(previous, x, z, current.occupant, elevation, rng, scratch);
                    let (cell, transition) = match selection.species {
                        None => {
                            let growth = self.species.profile(species).biomass_increase_rate * vigor;
                            let cell = Cell {
                                occupant: current.occupant,
                                age: current.age + 1,
                                biomass: current.biomass + growth,
                            };
                            (cell, Transition::Persisted)
                        }
                        Some(successor) => (self.seedling(successor), Transition::Replaced(successor)),
                    };
                    CellUpdate {
                        cell,
                        transition,
                        clamped: selection.clamped,
                    }
                } else {
                    let selection = self.draw_successor(previous, x, z, Occupant::Gap, elevation, rng, scratch);
                    let (cell, transition) = match selection.species {
                        None => (Cell::GAP, Transition::Died),
                        Some(successor) => (self.seedling(successor), Transition::Recolonized(successor)),
                    };
                    CellUpdate {
                        cell,
                        transition,
                        clamped: selection.clamped,
                    }
                }
            }
            Occupant::PermanentGap => CellUpdate::PERMANENT_GAP,
            Occupant::Gap => {
                let selection = self.draw_successor(previous, x, z, Occupant::Gap, elevation, rng, scratch);
                let (cell, transition) = match selection.species {
                    None => (Cell::GAP, Transition::StayedGap),
                    Some(successor) => (self.seedling(successor), Transition::Established(successor)),
                };
                CellUpdate {
                    cell,
                    transition,
                    clamped: selection.clamped,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_successor<R: Rng + ?Sized>(
        &self,
        previous: &Generation,
        x: usize,
        z: usize,
        occupant: Occupant,
        elevation: f32,
        rng: &mut R,
        scratch: &mut Scratch,
    ) -> Selection {
        previous.grid().neighbor_species_counts_into(x, z, &mut scratch.neighbors);
        self.replacement.probabilities_into(
            occupant,
            &scratch.neighbors,
            previous.stats(),
            &self.health,
            elevation,
            &mut scratch.probabilities,
        );
        select_next_species(&scratch.probabilities, rng)
    }

    #[inline]
    fn seedling(&self, species: SpeciesId) -> Cell {
        Cell::established(species, self.species.profile(species).base_biomass)
    }
}

/// Independent ChaCha stream for one cell of one generation
fn cell_stream(generation_key: u64, cell_index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(generation_key);
    rng.set_stream(cell_index);
    rng
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::SpeciesProfile;

    fn engine(profiles: Vec<SpeciesProfile>, disturbance: f32, landscape: Landscape, mode: RngMode) -> SuccessionEngine {
        let n = profiles.len();
        let env = EnvironmentParameters {
            ongoing_disturbance_rate: disturbance,
            ..EnvironmentParameters::default()
        };
        SuccessionEngine::new(
            SpeciesTable::new(profiles).unwrap(),
            AffinityMatrix::uniform(n, 0.4, 0.1),
            &env,
            HealthConfig::default(),
            DispersalWeights::default(),
            landscape,
            mode,
        )
    }

    fn forest(x_cells: usize, z_cells: usize, species: SpeciesId, age: u32) -> CellGrid {
        let cell = Cell {
            occupant: Occupant::Species(species),
            age,
            biomass: 2.0,
        };
        CellGrid::from_cells(x_cells, z_cells, vec![cell; x_cells * z_cells])
    }

    #[test]
    fn test_disturbance_clears_everything() {
        let engine = engine(
            vec![SpeciesProfile::tolerant("a", 50), SpeciesProfile::tolerant("b", 50)],
            1.0,
            Landscape::flat(6, 6, 35.0),
            RngMode::Sequential,
        );
        let previous = Generation::new(0, forest(6, 6, 1, 3), 2);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let next = engine.step(&previous, &mut rng);

        assert_eq!(next.index(), 1);
        assert!(next.cells().all(|(_, c)| *c == Cell::GAP));
        assert_eq!(next.stats().disturbed, 36);
        assert_eq!(next.stats().counts_by_species, vec![36, 0, 0]);
    }

    #[test]
    fn test_permanent_gap_is_terminal() {
        let mut landscape = Landscape::flat(3, 3, 35.0);
        landscape.permanent.mark(1, 1);
        let engine = engine(vec![SpeciesProfile::tolerant("a", 50)], 0.0, landscape, RngMode::Sequential);

        let mut grid = forest(3, 3, 1, 1);
        grid.set(1, 1, Cell::PERMANENT_GAP);
        let mut generation = Generation::new(0, grid, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        for _ in 0..20 {
            generation = engine.step(&generation, &mut rng);
            assert_eq!(*generation.cell(1, 1), Cell::PERMANENT_GAP);
            assert_eq!(generation.stats().permanent_gaps, 1);
        }
    }

    #[test]
    fn test_lifespan_one_always_dies() {
        // Neighbours are all species 1, but an aged annual can never survive
        let engine = engine(vec![SpeciesProfile::tolerant("annual", 1)], 0.0, Landscape::flat(3, 3, 0.0), RngMode::Sequential);
        let previous = Generation::new(0, forest(3, 3, 1, 1), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..50 {
            let update = engine.next_cell(&previous, 1, 1, false, &mut rng);
            assert!(matches!(
                update.transition,
                Transition::Died | Transition::Recolonized(1)
            ));
            assert_eq!(update.cell.age, 0);
        }
    }

    #[test]
    fn test_persisting_plant_ages_and_grows() {
        let mut profile = SpeciesProfile::tolerant("oak", 1000);
        profile.biomass_increase_rate = 1.5;
        let engine = engine(vec![profile], 0.0, Landscape::flat(1, 1, 0.0), RngMode::Sequential);
        // Single cell: no neighbours; distant share is 1
        let previous = Generation::new(0, forest(1, 1, 1, 0), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let mut persisted = 0;
        for _ in 0..200 {
            let update = engine.next_cell(&previous, 0, 0, false, &mut rng);
            match update.transition {
                Transition::Persisted => {
                    persisted += 1;
                    assert_eq!(update.cell.age, 1);
                    assert!((update.cell.biomass - 3.5).abs() < 1e-6);
                }
                Transition::Replaced(1) => {
                    assert_eq!(update.cell.age, 0);
                    assert_eq!(update.cell.biomass, 1.0);
                }
                other => panic!("unexpected transition {:?}", other),
            }
        }
        assert!(persisted > 100);
    }

    #[test]
    fn test_gap_consistency_and_conservation() {
        let engine = engine(
            vec![
                SpeciesProfile::tolerant("a", 5),
                SpeciesProfile::tolerant("b", 10),
                SpeciesProfile::tolerant("c", 3),
            ],
            0.05,
            Landscape::flat(12, 9, 35.0),
            RngMode::Sequential,
        );
        let mut generation = Generation::new(0, forest(12, 9, 2, 0), 3);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..30 {
            generation = engine.step(&generation, &mut rng);
            assert_eq!(generation.stats().total_cells(), 12 * 9);
            for (_, cell) in generation.cells() {
                if cell.occupant == Occupant::Gap {
                    assert_eq!(cell.age, 0);
                    assert_eq!(cell.biomass, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_modes_are_each_deterministic() {
        for mode in [RngMode::Sequential, RngMode::Substream] {
            let engine = engine(
                vec![SpeciesProfile::tolerant("a", 8), SpeciesProfile::tolerant("b", 12)],
                0.02,
                Landscape::flat(10, 10, 35.0),
                mode,
            );
            let start = Generation::new(0, forest(10, 10, 1, 2), 2);

            let run = |seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let mut g = start.clone();
                for _ in 0..10 {
                    g = engine.step(&g, &mut rng);
                }
                g
            };

            assert_eq!(run(11), run(11), "{:?}", mode);
        }
    }

    #[test]
    fn test_oversubscribed_draws_are_counted() {
        let _ = env_logger::builder().is_test(true).try_init();

        // Full affinity plus a heavy immigration share pushes the summed
        // probabilities to 1.5 inside the forest
        let weights = DispersalWeights {
            local: 0.5,
            distant: 0.0,
            immigration: 0.5,
        };
        let engine = SuccessionEngine::new(
            SpeciesTable::new(vec![SpeciesProfile::tolerant("a", 100), SpeciesProfile::tolerant("b", 100)]).unwrap(),
            AffinityMatrix::uniform(2, 1.0, 1.0),
            &EnvironmentParameters::default(),
            HealthConfig::default(),
            weights,
            Landscape::flat(6, 6, 35.0),
            RngMode::Sequential,
        );
        let previous = Generation::new(0, forest(6, 6, 2, 0), 2);
        let mut rng = ChaCha8Rng::seed_from_u64(12);

        let next = engine.step(&previous, &mut rng);

        assert!(next.stats().clamped_selections > 0);
        assert!(next.stats().clamped_selections <= 36);
        assert_eq!(next.stats().total_cells(), 36);
    }

    #[test]
    #[should_panic(expected = "invalid dispersal weights")]
    fn test_rejects_nan_dispersal_weights() {
        SuccessionEngine::new(
            SpeciesTable::new(vec![SpeciesProfile::tolerant("a", 10)]).unwrap(),
            AffinityMatrix::uniform(1, 0.4, 0.1),
            &EnvironmentParameters::default(),
            HealthConfig::default(),
            DispersalWeights {
                local: f32::NAN,
                distant: 0.5,
                immigration: 0.5,
            },
            Landscape::flat(2, 2, 35.0),
            RngMode::Sequential,
        );
    }

    #[test]
    #[should_panic(expected = "invalid dispersal weights")]
    fn test_rejects_negative_dispersal_weights() {
        SuccessionEngine::new(
            SpeciesTable::new(vec![SpeciesProfile::tolerant("a", 10)]).unwrap(),
            AffinityMatrix::uniform(1, 0.4, 0.1),
            &EnvironmentParameters::default(),
            HealthConfig::default(),
            DispersalWeights {
                local: 1.2,
                distant: -0.2,
                immigration: 0.0,
            },
            Landscape::flat(2, 2, 35.0),
            RngMode::Sequential,
        );
    }

    #[test]
    fn test_cell_streams_differ() {
        let mut a = cell_stream(7, 0);
        let mut b = cell_stream(7, 1);
        assert_ne!(a.gen::<u64>(), b.gen::<u64>());
    }
}
