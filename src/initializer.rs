//! Generation 0: a random community or a decoded starting matrix.
//!
//! A starting matrix describes a coarse control grid, one token per control
//! cell in row-major order (z outer, x inner):
//!
//! - `R`: every simulation cell under it is drawn at random
//! - `N`: permanent gap
//! - a digit `0..=9`: that species id (`0` is an open gap)
//!
//! Whitespace is ignored. Each control cell covers the block of simulation
//! cells that maps onto it, so the control grid need not divide the
//! simulation grid evenly.

use crate::generation::Generation;
use crate::grid::{Cell, CellGrid, Occupant, PermanentDisturbanceMap};
use crate::species::{SpeciesId, SpeciesTable};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How generation 0 is built
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Independent random draw per cell
    #[default]
    Random,
    /// Decode `starting_matrix`
    Matrix,
}

/// Initialization section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitializationConfig {
    pub mode: InitMode,
    /// Control-grid encoding, required in matrix mode
    pub starting_matrix: Option<String>,
    /// Control grid columns
    pub control_x: usize,
    /// Control grid rows
    pub control_z: usize,
    /// Initial ages are drawn from `0..=lifespan * initial_age_fraction`
    pub initial_age_fraction: f32,
}

impl Default for InitializationConfig {
    fn default() -> Self {
        Self {
            mode: InitMode::Random,
            starting_matrix: None,
            control_x: 10,
            control_z: 10,
            initial_age_fraction: 0.5,
        }
    }
}

/// Reasons a starting matrix is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartingMatrixError {
    #[error("expected {expected} tokens for the control grid, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("unrecognized token '{token}' at position {index}")]
    UnrecognizedToken { index: usize, token: char },
    #[error("species {species} at position {index} is outside the community of {max}")]
    SpeciesOutOfRange { index: usize, species: u32, max: usize },
}

/// One control-grid cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlToken {
    Random,
    PermanentGap,
    /// Species id, 0 meaning open gap
    Literal(SpeciesId),
}

/// A decoded starting matrix
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingMatrix {
    control_x: usize,
    control_z: usize,
    tokens: Vec<ControlToken>,
}

impl StartingMatrix {
    /// Decode `encoded` for a `control_x` x `control_z` grid and a
    /// community of `species_count` species
    pub fn parse(
        encoded: &str,
        control_x: usize,
        control_z: usize,
        species_count: usize,
    ) -> Result<Self, StartingMatrixError> {
        let symbols: Vec<char> = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let expected = control_x * control_z;
        if symbols.len() != expected {
            return Err(StartingMatrixError::LengthMismatch {
                expected,
                found: symbols.len(),
            });
        }

        let tokens = symbols
            .into_iter()
            .enumerate()
            .map(|(index, token)| match token {
                'R' => Ok(ControlToken::Random),
                'N' => Ok(ControlToken::PermanentGap),
                c => match c.to_digit(10) {
                    Some(species) if species as usize <= species_count => {
                        Ok(ControlToken::Literal(species as SpeciesId))
                    }
                    Some(species) => Err(StartingMatrixError::SpeciesOutOfRange {
                        index,
                        species,
                        max: species_count,
                    }),
                    None => Err(StartingMatrixError::UnrecognizedToken { index, token }),
                },
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            control_x,
            control_z,
            tokens,
        })
    }

    /// Token governing simulation cell (x, z) of an `x_cells` x `z_cells` grid
    pub fn token_at(&self, x: usize, z: usize, x_cells: usize, z_cells: usize) -> ControlToken {
        let cx = x * self.control_x / x_cells;
        let cz = z * self.control_z / z_cells;
        self.tokens[cz * self.control_x + cx]
    }

    /// Cells pinned as permanent gaps by `N` tokens
    pub fn permanent_map(&self, x_cells: usize, z_cells: usize) -> PermanentDisturbanceMap {
        let mut map = PermanentDisturbanceMap::empty(x_cells, z_cells);
        for z in 0..z_cells {
            for x in 0..x_cells {
                if self.token_at(x, z, x_cells, z_cells) == ControlToken::PermanentGap {
                    map.mark(x, z);
                }
            }
        }
        map
    }

    pub fn tokens(&self) -> &[ControlToken] {
        &self.tokens
    }
}

/// A plant of `species` with an age spread over part of its lifespan, so
/// the starting cohort does not die off all at once
fn staggered_plant<R: Rng + ?Sized>(
    species_table: &SpeciesTable,
    species: SpeciesId,
    age_fraction: f32,
    rng: &mut R,
) -> Cell {
    let profile = species_table.profile(species);
    let oldest = ((profile.lifespan as f32 * age_fraction) as u32).min(profile.lifespan - 1);
    let age = rng.gen_range(0..=oldest);
    Cell {
        occupant: Occupant::Species(species),
        age,
        biomass: profile.base_biomass + profile.biomass_increase_rate * age as f32,
    }
}

/// Species uniform over `0..=N` (0 = gap), age staggered
pub fn random_cell<R: Rng + ?Sized>(species_table: &SpeciesTable, age_fraction: f32, rng: &mut R) -> Cell {
    let species: SpeciesId = rng.gen_range(0..=species_table.len() as SpeciesId);
    if species == 0 {
        Cell::GAP
    } else {
        staggered_plant(species_table, species, age_fraction, rng)
    }
}

/// Fully random generation 0
pub fn random_generation<R: Rng + ?Sized>(
    species_table: &SpeciesTable,
    x_cells: usize,
    z_cells: usize,
    age_fraction: f32,
    rng: &mut R,
) -> Generation {
    let mut cells = Vec::with_capacity(x_cells * z_cells);
    for _ in 0..x_cells * z_cells {
        cells.push(random_cell(species_table, age_fraction, rng));
    }
    Generation::new(0, CellGrid::from_cells(x_cells, z_cells, cells), species_table.len())
}

/// Generation 0 expanded from a starting matrix
pub fn matrix_generation<R: Rng + ?Sized>(
    matrix: &StartingMatrix,
    species_table: &SpeciesTable,
    x_cells: usize,
    z_cells: usize,
    age_fraction: f32,
    rng: &mut R,
) -> Generation {
    let mut cells = Vec::with_capacity(x_cells * z_cells);
    for z in 0..z_cells {
        for x in 0..x_cells {
            let cell = match matrix.token_at(x, z, x_cells, z_cells) {
                ControlToken::Random => random_cell(species_table, age_fraction, rng),
                ControlToken::PermanentGap => Cell::PERMANENT_GAP,
                ControlToken::Literal(0) => Cell::GAP,
                ControlToken::Literal(species) => staggered_plant(species_table, species, age_fraction, rng),
            };
            cells.push(cell);
        }
    }
    Generation::new(0, CellGrid::from_cells(x_cells, z_cells, cells), species_table.len())
}
