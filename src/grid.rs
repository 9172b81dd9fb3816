//! Cell grid and neighbourhood queries.
//!
//! Grids are stored row-major: z is the outer (row) index, x the inner one.
//! There is no wraparound; edge cells simply have fewer neighbours.

use crate::species::SpeciesId;
use serde::{Deserialize, Serialize};

/// Integer cell coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub z: usize,
}

impl Position {
    pub const fn new(x: usize, z: usize) -> Self {
        Self { x, z }
    }
}

/// What holds a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occupant {
    /// Never colonisable for the rest of the run
    PermanentGap,
    /// Open ground
    Gap,
    /// A live plant of species `1..=N`
    Species(SpeciesId),
}

impl Occupant {
    /// Numeric id: -1 permanent gap, 0 gap, 1..=N species
    #[inline]
    pub fn id(self) -> i32 {
        match self {
            Occupant::PermanentGap => -1,
            Occupant::Gap => 0,
            Occupant::Species(s) => s as i32,
        }
    }

    #[inline]
    pub fn species(self) -> Option<SpeciesId> {
        match self {
            Occupant::Species(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, Occupant::Species(_))
    }

    /// Index into per-species statistics; both gap kinds count as 0
    #[inline]
    pub fn stats_index(self) -> usize {
        match self {
            Occupant::Species(s) => s as usize,
            _ => 0,
        }
    }
}

/// One grid position's state
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub occupant: Occupant,
    /// Generations since establishment
    pub age: u32,
    /// Accumulated growth
    pub biomass: f32,
}

impl Cell {
    pub const GAP: Cell = Cell {
        occupant: Occupant::Gap,
        age: 0,
        biomass: 0.0,
    };

    pub const PERMANENT_GAP: Cell = Cell {
        occupant: Occupant::PermanentGap,
        age: 0,
        biomass: 0.0,
    };

    /// A newly established plant
    #[inline]
    pub fn established(species: SpeciesId, biomass: f32) -> Self {
        Self {
            occupant: Occupant::Species(species),
            age: 0,
            biomass,
        }
    }

    #[inline]
    pub fn species_id(&self) -> i32 {
        self.occupant.id()
    }
}

/// Fixed-size grid of cells
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellGrid {
    x_cells: usize,
    z_cells: usize,
    cells: Vec<Cell>,
}

impl CellGrid {
    /// A grid of open gaps
    pub fn new(x_cells: usize, z_cells: usize) -> Self {
        Self {
            x_cells,
            z_cells,
            cells: vec![Cell::GAP; x_cells * z_cells],
        }
    }

    /// Wrap row-major cells
    ///
    /// # Panics
    ///
    /// Panics if `cells.len() != x_cells * z_cells`.
    pub fn from_cells(x_cells: usize, z_cells: usize, cells: Vec<Cell>) -> Self {
        assert_eq!(cells.len(), x_cells * z_cells, "cell count does not match grid dimensions");
        Self {
            x_cells,
            z_cells,
            cells,
        }
    }

    #[inline]
    pub fn x_cells(&self) -> usize {
        self.x_cells
    }

    #[inline]
    pub fn z_cells(&self) -> usize {
        self.z_cells
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, x: usize, z: usize) -> &Cell {
        &self.cells[z * self.x_cells + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, z: usize, cell: Cell) {
        self.cells[z * self.x_cells + x] = cell;
    }

    /// Row-major cell slice
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cells with their positions, z outer and x inner
    pub fn iter(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        let x_cells = self.x_cells;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (Position::new(i % x_cells, i / x_cells), cell))
    }

    /// Count live species among the up-to-8 Moore neighbours of (x, z).
    ///
    /// `counts` is indexed by species id and must hold at least N+1 slots;
    /// slot 0 is left at zero.
    pub fn neighbor_species_counts_into(&self, x: usize, z: usize, counts: &mut [u32]) {
        counts.iter_mut().for_each(|c| *c = 0);

        let x_min = x.saturating_sub(1);
        let x_max = (x + 1).min(self.x_cells - 1);
        let z_min = z.saturating_sub(1);
        let z_max = (z + 1).min(self.z_cells - 1);

        for nz in z_min..=z_max {
            for nx in x_min..=x_max {
                if nx == x && nz == z {
                    continue;
                }
                if let Occupant::Species(s) = self.get(nx, nz).occupant {
                    counts[s as usize] += 1;
                }
            }
        }
    }

    /// Allocating form of [`neighbor_species_counts_into`](Self::neighbor_species_counts_into)
    pub fn neighbor_species_counts(&self, x: usize, z: usize, species_count: usize) -> Vec<u32> {
        let mut counts = vec![0; species_count + 1];
        self.neighbor_species_counts_into(x, z, &mut counts);
        counts
    }
}

/// Cells that are barren for the whole run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermanentDisturbanceMap {
    x_cells: usize,
    z_cells: usize,
    cells: Vec<bool>,
}

impl PermanentDisturbanceMap {
    /// No permanent gaps
    pub fn empty(x_cells: usize, z_cells: usize) -> Self {
        Self {
            x_cells,
            z_cells,
            cells: vec![false; x_cells * z_cells],
        }
    }

    pub fn mark(&mut self, x: usize, z: usize) {
        self.cells[z * self.x_cells + x] = true;
    }

    #[inline]
    pub fn is_disturbed(&self, x: usize, z: usize) -> bool {
        self.cells[z * self.x_cells + x]
    }

    /// Number of permanently barren cells
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.x_cells, self.z_cells)
    }
}
